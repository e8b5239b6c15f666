use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tunein_core::Mood;

#[derive(Parser)]
#[command(name = "tunein")]
#[command(about = "A local-first mood journal for the terminal")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Optional JSON config file (environment variables override it)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Quick capture: tunein "today felt long"
    #[arg(trailing_var_arg = true)]
    pub entry: Vec<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a journal entry
    #[command(alias = "new")]
    Add {
        /// Mood for this entry (Happy, Calm, Anxious, Sad, Angry)
        #[arg(short, long)]
        mood: Option<Mood>,
        /// Guided prompt; pair each with a --response
        #[arg(long)]
        prompt: Vec<String>,
        /// Answer to the matching --prompt
        #[arg(long)]
        response: Vec<String>,
        /// Skip asking the reflection service
        #[arg(long)]
        no_reflect: bool,
        /// Free-form entry text
        text: Vec<String>,
    },
    /// List entries, newest first
    List {
        /// Number of entries per page (defaults to the configured page size)
        #[arg(short, long)]
        limit: Option<usize>,
        /// Number of entries to skip
        #[arg(long, default_value = "0")]
        offset: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete an entry
    Delete {
        /// Entry ID or unique ID prefix
        id: String,
    },
    /// Push queued offline changes to the remote store
    Sync,
    /// Show streaks, mood distribution and trends
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove journal data
    Reset {
        /// Also delete every entry stored remotely for this account
        #[arg(long)]
        everywhere: bool,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}
