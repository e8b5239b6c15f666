use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] tunein_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("No entry content provided")]
    EmptyContent,
    #[error("Every --prompt needs a matching --response ({prompts} prompts, {responses} responses)")]
    UnpairedTranscript { prompts: usize, responses: usize },
    #[error("Entry ID cannot be empty")]
    EmptyEntryId,
    #[error("Entry not found for id/prefix: {0}")]
    EntryNotFound(String),
    #[error("{0}")]
    AmbiguousEntryId(String),
    #[error("Failed to resolve a data directory; pass --db-path or set TUNEIN_DB_PATH")]
    NoDataDir,
}
