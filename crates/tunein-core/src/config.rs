//! Client configuration for the sync engine.
//!
//! Values come from an optional JSON file and then the environment, with the
//! environment winning. These are public endpoints and keys; secret
//! credentials never belong here.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::util::{is_http_url, normalize_text_option};
use crate::{Error, Result};

pub const DEFAULT_ENTRIES_TABLE: &str = "entries";
pub const DEFAULT_REFLECTION_FUNCTION: &str = "clever-processor";
pub const DEFAULT_REMOTE_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_REFLECTION_TIMEOUT_SECS: u64 = 20;
pub const DEFAULT_PAGE_SIZE: usize = 20;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    #[serde(default)]
    pub supabase_url: Option<String>,
    #[serde(default)]
    pub supabase_anon_key: Option<String>,
    #[serde(default = "default_entries_table")]
    pub entries_table: String,
    #[serde(default = "default_reflection_function")]
    pub reflection_function: String,
    #[serde(default = "default_remote_timeout_secs")]
    pub remote_timeout_secs: u64,
    #[serde(default = "default_reflection_timeout_secs")]
    pub reflection_timeout_secs: u64,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_entries_table() -> String {
    DEFAULT_ENTRIES_TABLE.to_string()
}

fn default_reflection_function() -> String {
    DEFAULT_REFLECTION_FUNCTION.to_string()
}

const fn default_remote_timeout_secs() -> u64 {
    DEFAULT_REMOTE_TIMEOUT_SECS
}

const fn default_reflection_timeout_secs() -> u64 {
    DEFAULT_REFLECTION_TIMEOUT_SECS
}

const fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            supabase_url: None,
            supabase_anon_key: None,
            entries_table: default_entries_table(),
            reflection_function: default_reflection_function(),
            remote_timeout_secs: DEFAULT_REMOTE_TIMEOUT_SECS,
            reflection_timeout_secs: DEFAULT_REFLECTION_TIMEOUT_SECS,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl ClientConfig {
    /// Load from an optional file, apply environment overrides, then validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let base = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        let config = base
            .with_overrides(|key| std::env::var(key).ok())?
            .normalized();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|error| Error::Config(format!("invalid config file: {error}")))
    }

    /// Apply overrides from a key lookup (normally the process environment).
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let text = |key: &str| normalize_text_option(lookup(key));

        if let Some(url) = text("SUPABASE_URL") {
            self.supabase_url = Some(url);
        }
        if let Some(key) = text("SUPABASE_ANON_KEY") {
            self.supabase_anon_key = Some(key);
        }
        if let Some(table) = text("TUNEIN_ENTRIES_TABLE") {
            self.entries_table = table;
        }
        if let Some(function) = text("TUNEIN_REFLECTION_FUNCTION") {
            self.reflection_function = function;
        }
        if let Some(raw) = text("TUNEIN_REMOTE_TIMEOUT_SECS") {
            self.remote_timeout_secs = parse_number("TUNEIN_REMOTE_TIMEOUT_SECS", &raw)?;
        }
        if let Some(raw) = text("TUNEIN_REFLECTION_TIMEOUT_SECS") {
            self.reflection_timeout_secs =
                parse_number("TUNEIN_REFLECTION_TIMEOUT_SECS", &raw)?;
        }
        if let Some(raw) = text("TUNEIN_PAGE_SIZE") {
            self.page_size = parse_number("TUNEIN_PAGE_SIZE", &raw)?;
        }

        Ok(self)
    }

    /// Trim values, drop empties and strip trailing slashes from the URL.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.supabase_url = normalize_text_option(self.supabase_url)
            .map(|url| url.trim_end_matches('/').to_string());
        self.supabase_anon_key = normalize_text_option(self.supabase_anon_key);
        self.entries_table = self.entries_table.trim().to_string();
        self.reflection_function = self.reflection_function.trim().to_string();
        self
    }

    /// Report the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        if let Some(url) = &self.supabase_url {
            if !is_http_url(url) {
                return Err(Error::Config(
                    "supabase_url must include http:// or https://".to_string(),
                ));
            }
        }
        if self.supabase_url.is_some() != self.supabase_anon_key.is_some() {
            return Err(Error::Config(
                "supabase_url and supabase_anon_key must be set together".to_string(),
            ));
        }
        if !is_identifier(&self.entries_table) {
            return Err(Error::Config(format!(
                "entries_table '{}' must be a plain table name",
                self.entries_table
            )));
        }
        if !is_identifier(&self.reflection_function.replace('-', "_")) {
            return Err(Error::Config(format!(
                "reflection_function '{}' must be a plain function name",
                self.reflection_function
            )));
        }
        if self.remote_timeout_secs == 0 || self.reflection_timeout_secs == 0 {
            return Err(Error::Config("timeouts must be at least one second".to_string()));
        }
        if self.page_size == 0 {
            return Err(Error::Config("page_size must be positive".to_string()));
        }
        Ok(())
    }

    /// Whether a remote store can be reached at all with this config
    #[must_use]
    pub const fn is_remote_configured(&self) -> bool {
        self.supabase_url.is_some() && self.supabase_anon_key.is_some()
    }

    #[must_use]
    pub const fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_timeout_secs)
    }

    #[must_use]
    pub const fn reflection_timeout(&self) -> Duration {
        Duration::from_secs(self.reflection_timeout_secs)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.parse()
        .map_err(|_| Error::Config(format!("{key} must be a non-negative integer, got '{raw}'")))
}

fn is_identifier(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|character| character.is_ascii_alphanumeric() || character == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_remote_schema() {
        let config = ClientConfig::from_json("{}").unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.entries_table, "entries");
        assert_eq!(config.reflection_function, "clever-processor");
        assert_eq!(config.page_size, 20);
        assert!(!config.is_remote_configured());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_unknown_fields() {
        let result = ClientConfig::from_json(r#"{"supabase_url":"https://x.supabase.co","extra":1}"#);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn environment_overrides_file_values() {
        let file = ClientConfig::from_json(
            r#"{"supabase_url":"https://file.supabase.co","supabase_anon_key":"file-key","page_size":5}"#,
        )
        .unwrap();

        let config = file
            .with_overrides(env(&[
                ("SUPABASE_URL", " https://env.supabase.co/ "),
                ("TUNEIN_REMOTE_TIMEOUT_SECS", "3"),
                ("SUPABASE_ANON_KEY", "   "),
            ]))
            .unwrap()
            .normalized();

        assert_eq!(config.supabase_url.as_deref(), Some("https://env.supabase.co"));
        assert_eq!(config.supabase_anon_key.as_deref(), Some("file-key"));
        assert_eq!(config.remote_timeout(), Duration::from_secs(3));
        assert_eq!(config.page_size, 5);
        assert!(config.is_remote_configured());
    }

    #[test]
    fn invalid_numbers_are_config_errors() {
        let result =
            ClientConfig::default().with_overrides(env(&[("TUNEIN_PAGE_SIZE", "twenty")]));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn validate_reports_bad_values() {
        let bad_url = ClientConfig {
            supabase_url: Some("example.supabase.co".to_string()),
            supabase_anon_key: Some("key".to_string()),
            ..ClientConfig::default()
        };
        assert!(bad_url.validate().is_err());

        let missing_key = ClientConfig {
            supabase_url: Some("https://example.supabase.co".to_string()),
            ..ClientConfig::default()
        };
        assert!(missing_key.validate().is_err());

        let bad_table = ClientConfig {
            entries_table: "entries; drop".to_string(),
            ..ClientConfig::default()
        };
        assert!(bad_table.validate().is_err());

        let zero_page = ClientConfig {
            page_size: 0,
            ..ClientConfig::default()
        };
        assert!(zero_page.validate().is_err());
    }
}
