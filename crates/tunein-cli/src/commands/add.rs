use std::path::Path;

use tunein_core::models::{Exchange, Transcript};
use tunein_core::reflection::fallback_prompts;
use tunein_core::{EntryDraft, Mood};

use crate::commands::common::{normalize_content, open_app, read_piped_stdin, short_id};
use crate::error::CliError;

pub struct AddOptions {
    pub mood: Option<Mood>,
    pub prompts: Vec<String>,
    pub responses: Vec<String>,
    pub text: Vec<String>,
    pub reflect: bool,
}

pub async fn run_add(
    options: AddOptions,
    db_path: &Path,
    config_path: Option<&Path>,
) -> Result<(), CliError> {
    let content = match build_content(&options.prompts, &options.responses, &options.text)? {
        Some(content) => content,
        None => read_piped_stdin()?.ok_or(CliError::EmptyContent)?,
    };

    let mut draft = EntryDraft::new(content);
    if let Some(mood) = options.mood {
        draft = draft.with_mood(mood);
    }

    let app = open_app(db_path, config_path, options.reflect).await?;
    let entry = app.coordinator.append(draft).await?;

    if entry.is_pending() {
        println!("Saved {} (offline, will sync later)", short_id(&entry.id));
    } else {
        println!("Saved {}", short_id(&entry.id));
    }
    let lines = reflection_lines(entry.reflection.as_deref(), options.reflect);
    if !lines.is_empty() {
        println!();
    }
    for line in lines {
        println!("{line}");
    }

    Ok(())
}

/// The entry's reflection, or follow-up prompts when one was asked for
/// and none came back.
pub fn reflection_lines(reflection: Option<&str>, requested: bool) -> Vec<String> {
    match reflection {
        Some(text) => vec![text.to_string()],
        None if requested => {
            let mut lines = vec!["No reflection this time. Some prompts to sit with:".to_string()];
            lines.extend(fallback_prompts().into_iter().map(|prompt| format!("  - {prompt}")));
            lines
        }
        None => Vec::new(),
    }
}

/// Entry text from `--prompt`/`--response` pairs or free-form words.
///
/// `Ok(None)` means nothing was given on the command line.
pub fn build_content(
    prompts: &[String],
    responses: &[String],
    text: &[String],
) -> Result<Option<String>, CliError> {
    if !prompts.is_empty() || !responses.is_empty() {
        if prompts.len() != responses.len() {
            return Err(CliError::UnpairedTranscript {
                prompts: prompts.len(),
                responses: responses.len(),
            });
        }

        let transcript = Transcript::new(
            prompts
                .iter()
                .zip(responses)
                .map(|(prompt, response)| Exchange::new(prompt.trim(), response.trim()))
                .collect(),
        );
        if transcript.is_empty() {
            return Err(CliError::EmptyContent);
        }
        return Ok(Some(transcript.render()));
    }

    if text.is_empty() {
        return Ok(None);
    }
    normalize_content(&text.join(" "))
        .map(Some)
        .ok_or(CliError::EmptyContent)
}
