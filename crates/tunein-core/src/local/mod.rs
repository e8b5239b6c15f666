//! libSQL-backed local cache and mutation queue

mod connection;
mod entry_repository;
mod migrations;
mod queue_repository;
mod store;

pub use connection::Database;
pub use entry_repository::{EntryRepository, LibSqlEntryRepository};
pub use queue_repository::{LibSqlMutationQueue, MutationQueue};
pub use store::LocalStore;
