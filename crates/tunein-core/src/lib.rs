//! tunein-core - Core library for Tune In
//!
//! The entry model, a libSQL-backed local cache with a durable mutation
//! queue, the Supabase remote store, the sync coordinator that merges them,
//! and mood analytics over the merged history.

pub mod analytics;
pub mod auth;
pub mod config;
pub mod error;
pub mod local;
pub mod models;
pub mod network;
pub mod reflection;
pub mod remote;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{EntryDraft, EntryId, EntryRecord, Mood};
pub use remote::{DisconnectedStore, PageRequest, RemoteError, RemoteStore};
pub use sync::{DrainReport, EntryPage, PageSource, ResetScope, SyncCoordinator, SyncOptions};
