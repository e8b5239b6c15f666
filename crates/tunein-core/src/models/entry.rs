//! Journal entry model

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::{Mood, Transcript};
use crate::util::unix_timestamp_now;

/// A unique identifier for an entry, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(Uuid);

impl EntryId {
    /// Create a new unique entry ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EntryId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Whether the remote store has confirmed an entry.
///
/// Local bookkeeping only; never sent to the remote store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    #[default]
    Pending,
    Synced,
}

impl SyncState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Synced => "synced",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(Self::Pending),
            "synced" => Some(Self::Synced),
            _ => None,
        }
    }
}

/// What the UI hands over when the user finishes writing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryDraft {
    /// Session transcript as text
    pub content: String,
    pub mood: Option<Mood>,
    /// Pre-computed reflection, if the UI already has one
    pub reflection: Option<String>,
}

impl EntryDraft {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    /// Build a draft from a guided-session transcript
    #[must_use]
    pub fn from_transcript(transcript: &Transcript) -> Self {
        Self::new(transcript.render())
    }

    #[must_use]
    pub const fn with_mood(mut self, mood: Mood) -> Self {
        self.mood = Some(mood);
        self
    }

    #[must_use]
    pub fn with_reflection(mut self, reflection: impl Into<String>) -> Self {
        self.reflection = Some(reflection.into());
        self
    }

    /// Whitespace-only content counts as empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty()
    }
}

/// A journal entry.
///
/// `timestamp` is seconds since the Unix epoch and never changes after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryRecord {
    /// Unique identifier, the only de-duplication key
    pub id: EntryId,
    /// Session transcript as text
    pub content: String,
    pub mood: Option<Mood>,
    /// Opaque text from the reflection service
    pub reflection: Option<String>,
    /// Creation time (Unix seconds)
    pub timestamp: i64,
    #[serde(default)]
    pub sync_state: SyncState,
}

impl EntryRecord {
    /// Stamp a draft with a fresh id and the current time, pending sync
    #[must_use]
    pub fn from_draft(draft: EntryDraft) -> Self {
        Self {
            id: EntryId::new(),
            content: draft.content,
            mood: draft.mood,
            reflection: draft.reflection,
            timestamp: unix_timestamp_now(),
            sync_state: SyncState::Pending,
        }
    }

    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self.sync_state, SyncState::Pending)
    }

    /// Copy of this record marked as confirmed by the remote store
    #[must_use]
    pub fn into_synced(mut self) -> Self {
        self.sync_state = SyncState::Synced;
        self
    }

    /// Compare the fields the remote store keeps, ignoring `sync_state`
    #[must_use]
    pub fn same_payload(&self, other: &Self) -> bool {
        self.id == other.id
            && self.content == other.content
            && self.mood == other.mood
            && self.reflection == other.reflection
            && self.timestamp == other.timestamp
    }

    /// Parse the content as a guided-session transcript
    #[must_use]
    pub fn transcript(&self) -> Transcript {
        Transcript::parse(&self.content)
    }

    /// Calendar date of the entry in the given timezone
    pub fn local_date<Tz: chrono::TimeZone>(&self, tz: &Tz) -> Option<chrono::NaiveDate> {
        chrono::DateTime::from_timestamp(self.timestamp, 0)
            .map(|utc| utc.with_timezone(tz).date_naive())
    }
}

/// Newest-first ordering; equal timestamps fall back to id (creation order)
pub fn newest_first(a: &EntryRecord, b: &EntryRecord) -> Ordering {
    b.timestamp.cmp(&a.timestamp).then_with(|| b.id.cmp(&a.id))
}

/// Sort entries in presentation order (newest first)
pub fn sort_newest_first(entries: &mut [EntryRecord]) {
    entries.sort_by(newest_first);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Exchange;

    fn record(timestamp: i64) -> EntryRecord {
        EntryRecord {
            timestamp,
            ..EntryRecord::from_draft(EntryDraft::new("entry"))
        }
    }

    #[test]
    fn test_entry_id_unique() {
        let id1 = EntryId::new();
        let id2 = EntryId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_entry_id_parse() {
        let id = EntryId::new();
        let parsed: EntryId = id.as_str().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn from_draft_is_pending_with_seconds_timestamp() {
        let entry = EntryRecord::from_draft(EntryDraft::new("Hello").with_mood(Mood::Calm));
        assert!(entry.is_pending());
        assert_eq!(entry.mood, Some(Mood::Calm));
        // Seconds, not milliseconds: stays well below 10^11 for centuries
        assert!(entry.timestamp > 1_600_000_000 && entry.timestamp < 100_000_000_000);
    }

    #[test]
    fn serde_roundtrip_keeps_every_field() {
        let entry = EntryRecord {
            reflection: Some("You sound rested.".to_string()),
            ..EntryRecord::from_draft(EntryDraft::new("Q\n\nA").with_mood(Mood::Happy))
        }
        .into_synced();

        let json = serde_json::to_string(&entry).unwrap();
        let back: EntryRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entry);
        assert!(json.contains("\"mood\":\"Happy\""));
    }

    #[test]
    fn newest_first_orders_by_timestamp_then_id() {
        let older = record(100);
        let newer = record(200);
        let first_id: EntryId = "00000000-0000-7000-8000-000000000001".parse().unwrap();
        let second_id: EntryId = "00000000-0000-7000-8000-000000000002".parse().unwrap();
        let tie_a = EntryRecord {
            id: first_id,
            ..record(300)
        };
        let tie_b = EntryRecord {
            id: second_id,
            ..record(300)
        };

        let mut entries = vec![older.clone(), tie_a, newer.clone(), tie_b];
        sort_newest_first(&mut entries);

        assert_eq!(entries[0].id, second_id);
        assert_eq!(entries[1].id, first_id);
        assert_eq!(entries[2].id, newer.id);
        assert_eq!(entries[3].id, older.id);
    }

    #[test]
    fn same_payload_ignores_sync_state() {
        let entry = record(10);
        let synced = entry.clone().into_synced();
        assert!(entry.same_payload(&synced));

        let edited = EntryRecord {
            content: "different".to_string(),
            ..synced
        };
        assert!(!entry.same_payload(&edited));
    }

    #[test]
    fn draft_from_transcript() {
        let transcript = Transcript::new(vec![Exchange::new("How was today?", "Good")]);
        let draft = EntryDraft::from_transcript(&transcript);
        assert_eq!(draft.content, "How was today?\n\nGood");
        assert!(!draft.is_empty());
        assert!(EntryDraft::new("  \n ").is_empty());
    }
}
