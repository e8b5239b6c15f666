//! Tune In CLI - a local-first mood journal for the terminal
//!
//! Entries are written to a local libSQL cache first and pushed to Supabase
//! when it can be reached.

mod cli;
mod commands;
mod error;


use std::path::Path;

use clap::{CommandFactory, Parser};
use tracing_subscriber::filter::{Directive, EnvFilter};

use crate::cli::{Cli, Commands};
use crate::commands::add::{run_add, AddOptions};
use crate::commands::common::resolve_db_path;
use crate::commands::completions::run_completions;
use crate::commands::delete::run_delete;
use crate::commands::list::run_list;
use crate::commands::reset::run_reset;
use crate::commands::stats::run_stats;
use crate::commands::sync::run_sync;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    if let Some(Commands::Completions { shell, output }) = &cli.command {
        return run_completions(*shell, output.as_deref());
    }

    let db_path = resolve_db_path(cli.db_path.clone())?;
    let db_path = db_path.as_path();

    match cli.command {
        Some(Commands::Add {
            mood,
            prompt,
            response,
            no_reflect,
            text,
        }) => {
            let options = AddOptions {
                mood,
                prompts: prompt,
                responses: response,
                text,
                reflect: !no_reflect,
            };
            run_add(options, db_path, config_path).await
        }
        Some(Commands::List {
            limit,
            offset,
            json,
        }) => run_list(limit, offset, json, db_path, config_path).await,
        Some(Commands::Delete { id }) => run_delete(&id, db_path, config_path).await,
        Some(Commands::Sync) => run_sync(db_path, config_path).await,
        Some(Commands::Stats { json }) => run_stats(json, db_path, config_path).await,
        Some(Commands::Reset { everywhere }) => run_reset(everywhere, db_path, config_path).await,
        Some(Commands::Completions { .. }) => Ok(()),
        None => quick_capture(cli.entry, db_path, config_path).await,
    }
}

async fn quick_capture(
    words: Vec<String>,
    db_path: &Path,
    config_path: Option<&Path>,
) -> Result<(), CliError> {
    if words.is_empty() {
        Cli::command().print_help()?;
        println!();
        return Ok(());
    }

    let options = AddOptions {
        mood: None,
        prompts: Vec::new(),
        responses: Vec::new(),
        text: words,
        reflect: true,
    };
    run_add(options, db_path, config_path).await
}

fn init_tracing() {
    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = "tunein=info".parse::<Directive>() {
        filter = filter.add_directive(directive);
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
