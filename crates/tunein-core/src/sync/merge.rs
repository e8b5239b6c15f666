//! Merging one remote page with the local cache.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use crate::models::{newest_first, sort_newest_first, EntryId, EntryRecord};

/// Span of the newest-first list covered by one remote fetch.
///
/// `upper` is the last row of the previous page (`None` on the first page);
/// `lower` is the last row of this page (`None` when nothing older exists).
#[derive(Debug, Clone, Copy)]
pub(crate) struct PageWindow<'a> {
    pub upper: Option<&'a EntryRecord>,
    pub lower: Option<&'a EntryRecord>,
}

impl PageWindow<'_> {
    fn contains(&self, entry: &EntryRecord) -> bool {
        let after_upper = self
            .upper
            .map_or(true, |upper| newest_first(upper, entry) == Ordering::Less);
        let through_lower = self
            .lower
            .map_or(true, |lower| newest_first(entry, lower) != Ordering::Greater);
        after_upper && through_lower
    }
}

/// Local state a remote page is merged against.
#[derive(Debug, Default)]
pub(crate) struct LocalView {
    /// Cache contents read after the fetch returned
    pub entries: Vec<EntryRecord>,
    /// Ids with a queued delete
    pub tombstones: HashSet<EntryId>,
    /// Ids cached as synced before the fetch started
    pub synced_before: HashSet<EntryId>,
    /// Ids written locally while the fetch was in flight
    pub touched: HashSet<EntryId>,
}

#[derive(Debug, Default)]
pub(crate) struct MergedPage {
    /// Remote rows plus spliced local entries, newest first
    pub entries: Vec<EntryRecord>,
    /// Remote rows safe to write into the cache
    pub cacheable: Vec<EntryRecord>,
    /// Remote copies of entries the cache still holds as pending
    pub retired: Vec<EntryRecord>,
    /// Synced cache rows inside the window that the remote store no longer has
    pub stale: Vec<EntryId>,
    pub discrepancies: usize,
}

/// Merge remote rows with cached entries by id.
///
/// Remote copies win unless the entry was written locally during the fetch,
/// in which case the cache is newer than the remote snapshot. Entries with a
/// queued delete are dropped. Pending-only entries are placed by timestamp
/// when they fall inside `window`; a `None` window splices nothing.
pub(crate) fn merge_page(
    remote: Vec<EntryRecord>,
    local: LocalView,
    window: Option<PageWindow<'_>>,
) -> MergedPage {
    let LocalView {
        entries: cached,
        tombstones,
        synced_before,
        touched,
    } = local;
    let local_by_id = cached
        .iter()
        .map(|entry| (entry.id, entry))
        .collect::<HashMap<_, _>>();

    let mut merged = MergedPage::default();
    let mut remote_ids = HashSet::with_capacity(remote.len());

    for entry in remote {
        remote_ids.insert(entry.id);
        if tombstones.contains(&entry.id) {
            continue;
        }
        let cached_copy = local_by_id.get(&entry.id);
        if touched.contains(&entry.id) {
            // Missing from the cache means deleted after the remote snapshot
            if let Some(cached) = cached_copy {
                merged.entries.push((*cached).clone());
            }
            continue;
        }

        if let Some(cached) = cached_copy {
            if !cached.same_payload(&entry) {
                tracing::warn!(
                    "Entry {} differs between local cache and remote store; keeping remote copy",
                    entry.id
                );
                merged.discrepancies += 1;
            }
            if cached.is_pending() {
                merged.retired.push(entry.clone());
            }
        }
        merged.cacheable.push(entry.clone());
        merged.entries.push(entry);
    }

    if let Some(window) = window {
        for entry in cached {
            if remote_ids.contains(&entry.id)
                || tombstones.contains(&entry.id)
                || !window.contains(&entry)
            {
                continue;
            }
            if entry.is_pending() || touched.contains(&entry.id) {
                merged.entries.push(entry);
            } else if synced_before.contains(&entry.id) {
                merged.stale.push(entry.id);
            }
        }
    }

    sort_newest_first(&mut merged.entries);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntryDraft, SyncState};
    use pretty_assertions::assert_eq;

    fn entry(timestamp: i64, sync_state: SyncState) -> EntryRecord {
        EntryRecord {
            timestamp,
            sync_state,
            ..EntryRecord::from_draft(EntryDraft::new(format!("entry at {timestamp}")))
        }
    }

    fn timestamps(entries: &[EntryRecord]) -> Vec<i64> {
        entries.iter().map(|entry| entry.timestamp).collect()
    }

    /// Cache view as it looked before the fetch, with nothing written since
    fn view(entries: Vec<EntryRecord>) -> LocalView {
        LocalView {
            synced_before: entries
                .iter()
                .filter(|entry| !entry.is_pending())
                .map(|entry| entry.id)
                .collect(),
            entries,
            ..LocalView::default()
        }
    }

    const OPEN: PageWindow<'static> = PageWindow {
        upper: None,
        lower: None,
    };

    #[test]
    fn pending_entries_are_placed_by_timestamp() {
        let remote = vec![entry(300, SyncState::Synced), entry(100, SyncState::Synced)];
        let local = vec![entry(200, SyncState::Pending), entry(50, SyncState::Pending)];

        let merged = merge_page(remote, view(local), Some(OPEN));
        assert_eq!(timestamps(&merged.entries), vec![300, 200, 100, 50]);
    }

    #[test]
    fn remote_copy_wins_and_retires_pending() {
        let pending = entry(100, SyncState::Pending);
        let remote_copy = EntryRecord {
            reflection: Some("added by server".to_string()),
            ..pending.clone().into_synced()
        };

        let merged = merge_page(vec![remote_copy.clone()], view(vec![pending]), Some(OPEN));

        assert_eq!(merged.entries, vec![remote_copy.clone()]);
        assert_eq!(merged.retired, vec![remote_copy]);
        assert_eq!(merged.discrepancies, 1);
    }

    #[test]
    fn tombstoned_rows_are_hidden() {
        let doomed = entry(100, SyncState::Synced);
        let local = LocalView {
            tombstones: HashSet::from([doomed.id]),
            ..LocalView::default()
        };

        let merged = merge_page(vec![doomed], local, Some(OPEN));
        assert!(merged.entries.is_empty());
    }

    #[test]
    fn window_limits_splicing_to_its_span() {
        let previous_last = entry(500, SyncState::Synced);
        let this_last = entry(300, SyncState::Synced);
        let remote = vec![entry(400, SyncState::Synced), this_last.clone()];
        let local = vec![
            entry(600, SyncState::Pending),
            entry(450, SyncState::Pending),
            entry(200, SyncState::Pending),
        ];
        let window = PageWindow {
            upper: Some(&previous_last),
            lower: Some(&this_last),
        };

        let merged = merge_page(remote, view(local), Some(window));
        assert_eq!(timestamps(&merged.entries), vec![450, 400, 300]);
    }

    #[test]
    fn missing_synced_rows_are_reported_stale() {
        let kept = entry(300, SyncState::Synced);
        let deleted_elsewhere = entry(200, SyncState::Synced);
        let outside_window = entry(50, SyncState::Synced);
        let lower = entry(100, SyncState::Synced);
        let window = PageWindow {
            upper: None,
            lower: Some(&lower),
        };

        let merged = merge_page(
            vec![kept.clone(), lower.clone()],
            view(vec![kept, deleted_elsewhere.clone(), outside_window]),
            Some(window),
        );
        assert_eq!(merged.stale, vec![deleted_elsewhere.id]);
    }

    #[test]
    fn no_window_splices_nothing() {
        let merged = merge_page(
            Vec::new(),
            view(vec![entry(10, SyncState::Pending)]),
            None,
        );
        assert!(merged.entries.is_empty());
        assert!(merged.stale.is_empty());
    }

    #[test]
    fn entry_deleted_during_fetch_is_not_restored() {
        let deleted = entry(200, SyncState::Synced);
        let kept = entry(100, SyncState::Synced);
        let local = LocalView {
            touched: HashSet::from([deleted.id]),
            ..view(vec![kept.clone()])
        };

        let merged = merge_page(vec![deleted, kept.clone()], local, Some(OPEN));

        assert_eq!(merged.entries, vec![kept.clone()]);
        assert_eq!(merged.cacheable, vec![kept]);
    }

    #[test]
    fn entry_synced_during_fetch_is_kept() {
        let older = entry(100, SyncState::Synced);
        let appended = entry(300, SyncState::Synced);
        let local = LocalView {
            entries: vec![older.clone(), appended.clone()],
            synced_before: HashSet::from([older.id]),
            touched: HashSet::from([appended.id]),
            ..LocalView::default()
        };

        let merged = merge_page(vec![older.clone()], local, Some(OPEN));

        assert_eq!(merged.entries, vec![appended, older]);
        assert!(merged.stale.is_empty());
    }

    #[test]
    fn rows_cached_after_capture_are_never_stale() {
        let cached_meanwhile = entry(100, SyncState::Synced);
        let local = LocalView {
            entries: vec![cached_meanwhile],
            ..LocalView::default()
        };

        let merged = merge_page(Vec::new(), local, Some(OPEN));
        assert!(merged.stale.is_empty());
        assert!(merged.entries.is_empty());
    }

    #[test]
    fn rewritten_rows_are_not_cached_from_the_snapshot() {
        let row = entry(100, SyncState::Synced);
        let snapshot = EntryRecord {
            content: "before the rewrite".to_string(),
            ..row.clone()
        };
        let local = LocalView {
            touched: HashSet::from([row.id]),
            ..view(vec![row.clone()])
        };

        let merged = merge_page(vec![snapshot], local, Some(OPEN));
        assert_eq!(merged.entries, vec![row]);
        assert!(merged.cacheable.is_empty());
        assert_eq!(merged.discrepancies, 0);
    }
}
