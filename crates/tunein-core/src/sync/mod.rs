//! Local-first sync between the libSQL cache and the remote entry store.

mod coordinator;
mod merge;
mod write_log;

use std::time::Duration;

use serde::Serialize;

use crate::config::ClientConfig;
use crate::models::EntryRecord;

pub use coordinator::SyncCoordinator;

/// Timeouts applied around collaborator calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    /// Upper bound for any single remote store call
    pub remote_timeout: Duration,
    /// Upper bound for the reflection request during append
    pub reflection_timeout: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            remote_timeout: Duration::from_secs(crate::config::DEFAULT_REMOTE_TIMEOUT_SECS),
            reflection_timeout: Duration::from_secs(
                crate::config::DEFAULT_REFLECTION_TIMEOUT_SECS,
            ),
        }
    }
}

impl From<&ClientConfig> for SyncOptions {
    fn from(config: &ClientConfig) -> Self {
        Self {
            remote_timeout: config.remote_timeout(),
            reflection_timeout: config.reflection_timeout(),
        }
    }
}

/// Outcome of one bounded remote call.
///
/// Permanent rejections are not a reachability state and travel as errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reachability<T> {
    Reachable(T),
    Unreachable(String),
}

/// Where a page's entries came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PageSource {
    /// Remote rows merged with pending local entries
    Remote,
    /// Every cached entry; pagination was ignored
    LocalFallback,
}

/// Immutable view returned by `load` and published to subscribers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryPage {
    pub entries: Vec<EntryRecord>,
    pub has_more: bool,
    pub source: PageSource,
}

impl EntryPage {
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            entries: Vec::new(),
            has_more: false,
            source: PageSource::LocalFallback,
        }
    }
}

/// Summary of one queue drain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    /// Mutations applied remotely and removed from the queue
    pub replayed: usize,
    /// Mutations the remote store refused; dropped from the queue
    pub rejected: usize,
    /// Mutations still queued afterwards
    pub remaining: usize,
    /// Another drain was already running
    pub skipped: bool,
}

/// What `reset` wipes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetScope {
    /// Sign-out: local cache and queue only
    LocalOnly,
    /// Account reset: remote rows first, then local state
    Everywhere,
}
