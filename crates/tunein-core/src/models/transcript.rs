//! Guided-session transcripts stored as entry content

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

const BLOCK_SEPARATOR: &str = "\n\n";

/// One prompt and the user's answer to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exchange {
    pub prompt: String,
    pub response: String,
}

impl Exchange {
    pub fn new(prompt: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            response: response.into(),
        }
    }
}

/// Ordered prompt/response pairs of a guided writing session.
///
/// Rendered text is `prompt`, blank line, `response`, blank line, and so on.
/// Blank-line runs inside a block are collapsed to a single newline when
/// rendering so the text always parses back into the same pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    pub exchanges: Vec<Exchange>,
}

impl Transcript {
    #[must_use]
    pub const fn new(exchanges: Vec<Exchange>) -> Self {
        Self { exchanges }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.exchanges
            .iter()
            .all(|exchange| exchange.prompt.trim().is_empty() && exchange.response.trim().is_empty())
    }

    /// Render to the text form stored in `EntryRecord::content`
    #[must_use]
    pub fn render(&self) -> String {
        self.exchanges
            .iter()
            .map(|exchange| {
                format!(
                    "{}{BLOCK_SEPARATOR}{}",
                    normalize_block(&exchange.prompt),
                    normalize_block(&exchange.response)
                )
            })
            .collect::<Vec<_>>()
            .join(BLOCK_SEPARATOR)
    }

    /// Parse stored content back into exchanges.
    ///
    /// A trailing prompt without an answer gets an empty response.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        if text.trim().is_empty() {
            return Self::default();
        }

        let blocks = text.split(BLOCK_SEPARATOR).collect::<Vec<_>>();
        let exchanges = blocks
            .chunks(2)
            .map(|pair| Exchange {
                prompt: pair[0].trim().to_string(),
                response: pair.get(1).map_or_else(String::new, |r| r.trim().to_string()),
            })
            .collect();

        Self { exchanges }
    }

    /// First non-empty response, used as a short preview of the entry
    #[must_use]
    pub fn first_response(&self) -> Option<&str> {
        self.exchanges
            .iter()
            .map(|exchange| exchange.response.as_str())
            .find(|response| !response.trim().is_empty())
    }
}

fn blank_line_run() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n[ \t\r]*\n[\s]*").expect("Invalid regex"))
}

fn normalize_block(block: &str) -> String {
    blank_line_run().replace_all(block.trim(), "\n").into_owned()
}
