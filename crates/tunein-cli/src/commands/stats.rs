use std::path::Path;

use tunein_core::analytics::AnalyticsReport;
use tunein_core::models::EntryRecord;
use tunein_core::{PageRequest, PageSource, SyncCoordinator};

use crate::commands::common::open_app;
use crate::error::CliError;

pub async fn run_stats(
    as_json: bool,
    db_path: &Path,
    config_path: Option<&Path>,
) -> Result<(), CliError> {
    let app = open_app(db_path, config_path, false).await?;
    let entries = load_history(&app.coordinator, app.config.page_size).await?;
    let report = app.coordinator.analytics(&entries);

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for line in format_report_lines(&report) {
            println!("{line}");
        }
    }
    Ok(())
}

/// Walk every page until the history is exhausted.
async fn load_history(
    coordinator: &SyncCoordinator,
    page_size: usize,
) -> Result<Vec<EntryRecord>, CliError> {
    let mut entries = Vec::new();
    let mut request = PageRequest::first(page_size.max(1));

    loop {
        let page = coordinator.load(request).await?;
        // The cached fallback already holds everything
        if page.source == PageSource::LocalFallback {
            return Ok(page.entries);
        }

        let fetched = page.entries.len();
        entries.extend(page.entries);
        if !page.has_more || fetched == 0 {
            return Ok(entries);
        }
        request = request.next();
    }
}

pub fn format_report_lines(report: &AnalyticsReport) -> Vec<String> {
    if report.total_entries == 0 {
        return vec!["No entries yet.".to_string()];
    }

    let mut lines = vec![
        format!("Entries:         {}", report.total_entries),
        format!(
            "Current streak:  {} day{}",
            report.current_streak,
            if report.current_streak == 1 { "" } else { "s" }
        ),
    ];

    match report.mood_distribution.most_frequent {
        Some(mood) => lines.push(format!("Most frequent:   {} {mood}", mood.emoji())),
        None => lines.push("Most frequent:   -".to_string()),
    }

    if let Some(trend) = report.trend {
        lines.push(format!(
            "Trend:           {} (avg {:.1} over {} entries)",
            trend.direction.label(),
            trend.average,
            trend.sample_size
        ));
    }

    if !report.mood_distribution.counts.is_empty() {
        lines.push(String::new());
        lines.push("Moods:".to_string());
        for (mood, count) in &report.mood_distribution.counts {
            let longest = report
                .longest_streak_per_mood
                .get(mood)
                .copied()
                .unwrap_or_default();
            lines.push(format!(
                "  {} {:<8} {count:>4}  longest streak {longest}",
                mood.emoji(),
                mood.label()
            ));
        }
    }

    if !report.weekday_pattern.is_empty() {
        lines.push(String::new());
        lines.push("By weekday:".to_string());
        for day in &report.weekday_pattern {
            lines.push(format!(
                "  {}  {} {} ({})",
                day.weekday,
                day.mood.emoji(),
                day.mood,
                day.count
            ));
        }
    }

    lines
}
