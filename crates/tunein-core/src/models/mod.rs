//! Data models for Tune In

mod entry;
mod mood;
mod mutation;
mod transcript;

pub use entry::{newest_first, sort_newest_first, EntryDraft, EntryId, EntryRecord, SyncState};
pub use mood::{valence_of, Mood, UnknownMood, NEUTRAL_VALENCE};
pub use mutation::{Mutation, QueuedMutation};
pub use transcript::{Exchange, Transcript};
