use std::path::Path;

use tunein_core::ResetScope;

use crate::commands::common::open_app;
use crate::error::CliError;

pub async fn run_reset(
    everywhere: bool,
    db_path: &Path,
    config_path: Option<&Path>,
) -> Result<(), CliError> {
    let app = open_app(db_path, config_path, false).await?;
    let scope = if everywhere {
        ResetScope::Everywhere
    } else {
        ResetScope::LocalOnly
    };

    app.coordinator.reset(scope).await?;

    match scope {
        ResetScope::Everywhere => println!("All entries deleted"),
        ResetScope::LocalOnly => println!("Local journal data cleared"),
    }
    Ok(())
}
