use std::path::Path;

use chrono::Local;
use tunein_core::util::unix_timestamp_now;
use tunein_core::{PageRequest, PageSource};

use crate::commands::common::{entry_to_list_item, format_month_sections, open_app, EntryListItem};
use crate::error::CliError;

pub async fn run_list(
    limit: Option<usize>,
    offset: usize,
    as_json: bool,
    db_path: &Path,
    config_path: Option<&Path>,
) -> Result<(), CliError> {
    let app = open_app(db_path, config_path, false).await?;
    let limit = limit.unwrap_or(app.config.page_size).max(1);
    let request = PageRequest::new(offset, limit);
    let page = app.coordinator.load(request).await?;
    let now = unix_timestamp_now();

    if as_json {
        let json_items = page
            .entries
            .iter()
            .map(|entry| entry_to_list_item(entry, now))
            .collect::<Vec<EntryListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if page.source == PageSource::LocalFallback {
        eprintln!("Remote store unavailable; showing cached entries");
    }

    if page.entries.is_empty() {
        println!("No entries yet.");
        return Ok(());
    }

    for line in format_month_sections(&page.entries, now, &Local) {
        println!("{line}");
    }
    if page.has_more {
        println!();
        println!("More entries: tunein list --offset {}", request.next().offset);
    }

    Ok(())
}
