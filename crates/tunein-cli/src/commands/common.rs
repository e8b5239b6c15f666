use std::env;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Local, NaiveDate, TimeZone};
use serde::Serialize;
use tunein_core::auth::{AuthSession, StaticSessionProvider};
use tunein_core::config::ClientConfig;
use tunein_core::local::LocalStore;
use tunein_core::analytics::group_by_month;
use tunein_core::models::EntryRecord;
use tunein_core::reflection::EdgeFunctionReflectionService;
use tunein_core::remote::{DisconnectedStore, RemoteStore, SupabaseEntryStore};
use tunein_core::{EntryId, SyncCoordinator, SyncOptions};

use crate::error::CliError;

/// Everything a command needs, built once per invocation
pub struct App {
    pub coordinator: SyncCoordinator,
    pub config: ClientConfig,
}

#[derive(Debug, Serialize)]
pub struct EntryListItem {
    pub id: String,
    pub timestamp: i64,
    pub date: String,
    pub relative_time: String,
    pub mood: Option<String>,
    pub preview: String,
    pub content: String,
    pub reflection: Option<String>,
    pub pending: bool,
}

pub async fn open_app(
    db_path: &Path,
    config_path: Option<&Path>,
    reflect: bool,
) -> Result<App, CliError> {
    let config = ClientConfig::load(config_path)?;
    let local = LocalStore::open_path(db_path).await?;
    let options = SyncOptions::from(&config);

    let sessions = Arc::new(StaticSessionProvider::new(session_from_lookup(|key| {
        env::var(key).ok()
    })));

    let remote: Arc<dyn RemoteStore> = if config.is_remote_configured() {
        Arc::new(SupabaseEntryStore::from_config(&config, sessions.clone())?)
    } else {
        tracing::debug!("No Supabase configuration; working offline");
        Arc::new(DisconnectedStore)
    };

    let mut coordinator = SyncCoordinator::new(local, remote, options);
    if reflect && config.is_remote_configured() {
        match EdgeFunctionReflectionService::from_config(&config, sessions) {
            Ok(service) => coordinator = coordinator.with_reflection(Arc::new(service)),
            Err(error) => tracing::warn!("Reflections disabled: {error}"),
        }
    }

    Ok(App {
        coordinator,
        config,
    })
}

/// Session from `TUNEIN_ACCESS_TOKEN` and `TUNEIN_USER_ID`.
pub fn session_from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<AuthSession> {
    let token = normalize_content(&lookup("TUNEIN_ACCESS_TOKEN")?)?;
    let user_id = normalize_content(&lookup("TUNEIN_USER_ID")?)?;
    Some(AuthSession::new(token, user_id))
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> Result<PathBuf, CliError> {
    if let Some(path) = cli_db_path.or_else(|| env::var_os("TUNEIN_DB_PATH").map(PathBuf::from)) {
        return Ok(path);
    }
    default_db_path()
}

pub fn default_db_path() -> Result<PathBuf, CliError> {
    dirs::data_dir()
        .map(|dir| dir.join("tunein").join("tunein.db"))
        .ok_or(CliError::NoDataDir)
}

/// Find an entry by full id or unique id prefix among cached entries.
pub async fn resolve_entry(query: &str, local: &LocalStore) -> Result<EntryRecord, CliError> {
    let query = normalize_entry_identifier(query)?;
    if let Ok(id) = query.parse::<EntryId>() {
        if let Some(entry) = local.get(&id).await? {
            return Ok(entry);
        }
    }

    let mut matches = local
        .get_all()
        .await
        .into_iter()
        .filter(|entry| entry.id.as_str().starts_with(&query))
        .collect::<Vec<_>>();

    match matches.len() {
        0 => Err(CliError::EntryNotFound(query)),
        1 => Ok(matches.remove(0)),
        _ => {
            let options = matches
                .iter()
                .take(3)
                .map(|entry| short_id(&entry.id))
                .collect::<Vec<_>>()
                .join(", ");

            Err(CliError::AmbiguousEntryId(format!(
                "ID prefix '{query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

pub fn normalize_entry_identifier(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyEntryId)
    } else {
        Ok(trimmed.to_ascii_lowercase())
    }
}

pub fn short_id(id: &EntryId) -> String {
    id.as_str().chars().take(13).collect()
}

pub fn format_entry_lines(entries: &[EntryRecord], now: i64) -> Vec<String> {
    entries
        .iter()
        .map(|entry| {
            let short_id = short_id(&entry.id);
            let mood = entry
                .mood
                .map_or_else(|| "-".to_string(), |mood| format!("{} {mood}", mood.emoji()));
            let preview = entry_preview(entry, 40);
            let relative_time = format_relative_time(entry.timestamp, now);
            let marker = if entry.is_pending() { "  (pending)" } else { "" };

            format!("{short_id:<13}  {mood:<10}  {preview:<40}  {relative_time}{marker}")
        })
        .collect()
}

/// Entry lines under a header per calendar month, newest month first
pub fn format_month_sections<Tz: TimeZone>(
    entries: &[EntryRecord],
    now: i64,
    tz: &Tz,
) -> Vec<String> {
    let mut lines = Vec::new();
    for group in group_by_month(entries, tz) {
        if !lines.is_empty() {
            lines.push(String::new());
        }
        let header = NaiveDate::from_ymd_opt(group.year, group.month, 1).map_or_else(
            || format!("{}-{:02}", group.year, group.month),
            |first| first.format("%B %Y").to_string(),
        );
        lines.push(header);
        lines.extend(format_entry_lines(&group.entries, now));
    }
    lines
}

pub fn entry_to_list_item(entry: &EntryRecord, now: i64) -> EntryListItem {
    EntryListItem {
        id: entry.id.to_string(),
        timestamp: entry.timestamp,
        date: format_entry_date(entry.timestamp, &Local),
        relative_time: format_relative_time(entry.timestamp, now),
        mood: entry.mood.map(|mood| mood.label().to_string()),
        preview: entry_preview(entry, 80),
        content: entry.content.clone(),
        reflection: entry.reflection.clone(),
        pending: entry.is_pending(),
    }
}

/// First answer of a guided session, or the first line of free text
pub fn entry_preview(entry: &EntryRecord, max_chars: usize) -> String {
    let transcript = entry.transcript();
    let source = transcript
        .first_response()
        .unwrap_or_else(|| entry.content.lines().next().unwrap_or(""));
    let collapsed = source.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = collapsed.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn format_entry_date<Tz: TimeZone>(timestamp: i64, tz: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    chrono::DateTime::from_timestamp(timestamp, 0).map_or_else(
        || timestamp.to_string(),
        |date_time| {
            date_time
                .with_timezone(tz)
                .format("%Y-%m-%d %H:%M")
                .to_string()
        },
    )
}

/// Human-friendly age of a timestamp; both values are Unix seconds.
pub fn format_relative_time(timestamp: i64, now: i64) -> String {
    let diff = now.saturating_sub(timestamp);
    let minute = 60;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

pub fn normalize_content(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn read_piped_stdin() -> Result<Option<String>, CliError> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }

    let mut buffer = String::new();
    stdin.lock().read_to_string(&mut buffer)?;
    Ok(normalize_content(&buffer))
}
