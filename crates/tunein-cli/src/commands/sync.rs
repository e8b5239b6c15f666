use std::path::Path;

use tunein_core::DrainReport;

use crate::commands::common::open_app;
use crate::error::CliError;

pub async fn run_sync(db_path: &Path, config_path: Option<&Path>) -> Result<(), CliError> {
    let app = open_app(db_path, config_path, false).await?;
    if !app.config.is_remote_configured() {
        eprintln!("Supabase is not configured; changes stay on this device");
    }

    let report = app.coordinator.drain_on_reconnect().await;
    println!("{}", format_drain_report(&report));
    Ok(())
}

pub fn format_drain_report(report: &DrainReport) -> String {
    if report.skipped {
        return "Another sync is already running".to_string();
    }

    let mut summary = format!("Synced {} change(s)", report.replayed);
    if report.rejected > 0 {
        summary.push_str(&format!(", {} rejected by the server", report.rejected));
    }
    if report.remaining > 0 {
        summary.push_str(&format!(", {} still queued", report.remaining));
    }
    summary
}
