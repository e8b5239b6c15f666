use std::path::Path;

use crate::commands::common::{open_app, resolve_entry, short_id};
use crate::error::CliError;

pub async fn run_delete(
    id: &str,
    db_path: &Path,
    config_path: Option<&Path>,
) -> Result<(), CliError> {
    let app = open_app(db_path, config_path, false).await?;
    let entry = resolve_entry(id, app.coordinator.local()).await?;

    app.coordinator.delete(&entry.id).await?;

    let queued = app.coordinator.pending_count().await;
    if queued > 0 {
        println!("Deleted {} ({queued} change(s) waiting to sync)", short_id(&entry.id));
    } else {
        println!("Deleted {}", short_id(&entry.id));
    }
    Ok(())
}
