use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use super::merge::{merge_page, LocalView, PageWindow};
use super::write_log::WriteLog;
use super::{DrainReport, EntryPage, PageSource, Reachability, ResetScope, SyncOptions};
use crate::analytics::{self, AnalyticsReport};
use crate::local::LocalStore;
use crate::models::{sort_newest_first, EntryDraft, EntryId, EntryRecord, Mutation};
use crate::reflection::{ReflectionRequest, ReflectionService};
use crate::remote::{PageRequest, RemoteError, RemoteResult, RemoteStore};
use crate::{Error, Result};

/// Local state recorded before a remote fetch starts
struct Capture {
    mark: u64,
    synced_before: HashSet<EntryId>,
}

/// The one entry point callers use for journal data.
///
/// Writes land in the local store first and reach the remote store either
/// immediately or on the next drain. Reads merge both stores and fall back to
/// the cache when the remote store cannot be reached. Cloning is cheap and
/// clones share state.
#[derive(Clone)]
pub struct SyncCoordinator {
    local: LocalStore,
    remote: Arc<dyn RemoteStore>,
    reflection: Option<Arc<dyn ReflectionService>>,
    options: SyncOptions,
    drain_lock: Arc<Mutex<()>>,
    /// Serializes cache writes that race with a load's merge
    cache_lock: Arc<Mutex<()>>,
    writes: Arc<WriteLog>,
    load_generation: Arc<AtomicU64>,
    snapshot: Arc<watch::Sender<Arc<EntryPage>>>,
}

impl SyncCoordinator {
    pub fn new(local: LocalStore, remote: Arc<dyn RemoteStore>, options: SyncOptions) -> Self {
        let (snapshot, _) = watch::channel(Arc::new(EntryPage::empty()));
        Self {
            local,
            remote,
            reflection: None,
            options,
            drain_lock: Arc::new(Mutex::new(())),
            cache_lock: Arc::new(Mutex::new(())),
            writes: Arc::new(WriteLog::default()),
            load_generation: Arc::new(AtomicU64::new(0)),
            snapshot: Arc::new(snapshot),
        }
    }

    /// Ask this service for a reflection when a draft has none.
    #[must_use]
    pub fn with_reflection(mut self, reflection: Arc<dyn ReflectionService>) -> Self {
        self.reflection = Some(reflection);
        self
    }

    /// Latest page accepted by `load`.
    pub fn subscribe(&self) -> watch::Receiver<Arc<EntryPage>> {
        self.snapshot.subscribe()
    }

    pub fn local(&self) -> &LocalStore {
        &self.local
    }

    /// Run one remote call under the configured timeout.
    async fn attempt<T>(
        &self,
        operation: &str,
        call: impl Future<Output = RemoteResult<T>>,
    ) -> RemoteResult<Reachability<T>> {
        match tokio::time::timeout(self.options.remote_timeout, call).await {
            Ok(Ok(value)) => Ok(Reachability::Reachable(value)),
            Ok(Err(RemoteError::Unreachable(reason))) => {
                tracing::debug!("Remote {operation} unreachable: {reason}");
                Ok(Reachability::Unreachable(reason))
            }
            Ok(Err(rejected)) => Err(rejected),
            Err(_) => {
                tracing::warn!(
                    "Remote {operation} timed out after {:?}",
                    self.options.remote_timeout
                );
                Ok(Reachability::Unreachable(format!("{operation} timed out")))
            }
        }
    }

    /// Load one page of entries, newest first.
    ///
    /// Returns `Error::Superseded` when a newer `load` started before this
    /// one finished.
    pub async fn load(&self, request: PageRequest) -> Result<EntryPage> {
        let generation = self.load_generation.fetch_add(1, Ordering::SeqCst) + 1;

        // Later pages overlap the previous one by a row to learn its boundary
        let fetch = if request.is_first() {
            request
        } else {
            PageRequest::new(request.offset - 1, request.limit.saturating_add(1))
        };
        // Writes landing while the fetch is in flight beat its snapshot
        let capture = self.capture().await;

        let outcome = match self.attempt("fetch", self.remote.fetch_page(fetch)).await {
            Ok(outcome) => outcome,
            Err(rejected) => {
                tracing::warn!("Remote fetch rejected, using local cache: {rejected}");
                Reachability::Unreachable(rejected.to_string())
            }
        };

        let page = match outcome {
            Reachability::Reachable(remote_page) => {
                if self.is_superseded(generation) {
                    tracing::debug!("Discarding superseded load of offset {}", request.offset);
                    return Err(Error::Superseded);
                }
                let has_more = remote_page.has_more(fetch);
                let mut rows = remote_page.entries;
                let boundary = if !request.is_first() && !rows.is_empty() {
                    Some(rows.remove(0))
                } else {
                    None
                };
                let entries = self
                    .merge_remote(request, rows, boundary, has_more, capture)
                    .await?;
                EntryPage {
                    entries,
                    has_more,
                    source: PageSource::Remote,
                }
            }
            Reachability::Unreachable(reason) => {
                tracing::info!("Remote store unavailable ({reason}); showing cached entries");
                let mut entries = self.local.get_all().await;
                sort_newest_first(&mut entries);
                EntryPage {
                    entries,
                    has_more: false,
                    source: PageSource::LocalFallback,
                }
            }
        };

        if self.is_superseded(generation) {
            tracing::debug!("Discarding superseded load of offset {}", request.offset);
            return Err(Error::Superseded);
        }

        self.snapshot.send_replace(Arc::new(page.clone()));
        Ok(page)
    }

    fn is_superseded(&self, generation: u64) -> bool {
        self.load_generation.load(Ordering::SeqCst) != generation
    }

    async fn capture(&self) -> Capture {
        let mark = self.writes.mark();
        let synced_before = self
            .local
            .get_all()
            .await
            .into_iter()
            .filter(|entry| !entry.is_pending())
            .map(|entry| entry.id)
            .collect();
        Capture {
            mark,
            synced_before,
        }
    }

    async fn merge_remote(
        &self,
        request: PageRequest,
        rows: Vec<EntryRecord>,
        boundary: Option<EntryRecord>,
        has_more: bool,
        capture: Capture,
    ) -> Result<Vec<EntryRecord>> {
        let _cache = self.cache_lock.lock().await;
        let Some(touched) = self.writes.touched_since(capture.mark) else {
            tracing::debug!("Journal reset during load of offset {}", request.offset);
            return Err(Error::Superseded);
        };
        let local = LocalView {
            entries: self.local.get_all().await,
            tombstones: self.local.pending_deletes().await,
            synced_before: capture.synced_before,
            touched,
        };

        let lower = if has_more { rows.last().cloned() } else { None };
        // A later page with no boundary row is past the end of the list
        let window = (request.is_first() || boundary.is_some()).then(|| PageWindow {
            upper: boundary.as_ref(),
            lower: lower.as_ref(),
        });
        let merged = merge_page(rows, local, window);

        for remote_copy in &merged.retired {
            if let Err(error) = self.local.mark_synced(remote_copy).await {
                tracing::warn!("Failed to retire pending entry {}: {error}", remote_copy.id);
            }
        }
        if let Err(error) = self.local.cache_synced(&merged.cacheable).await {
            tracing::warn!("Failed to refresh local cache: {error}");
        }
        for id in &merged.stale {
            match self.local.remove(id).await {
                Ok(_) => tracing::debug!("Removed entry {id} deleted on another device"),
                Err(error) => tracing::warn!("Failed to drop stale cached entry {id}: {error}"),
            }
        }

        Ok(merged.entries)
    }

    /// Save a new entry.
    ///
    /// The entry is durable locally before any network call. When the remote
    /// store is unreachable the pending record is returned and the write is
    /// replayed by the next drain. A rejection is permanent: the local copy
    /// is discarded and the error returned.
    pub async fn append(&self, draft: EntryDraft) -> Result<EntryRecord> {
        if draft.is_empty() {
            return Err(Error::InvalidInput(
                "entry content must not be empty".to_string(),
            ));
        }

        let mut entry = EntryRecord::from_draft(draft);
        let durable = match self.local.record_append(&entry).await {
            Ok(_) => true,
            Err(error) => {
                tracing::error!("Failed to persist entry {} locally: {error}", entry.id);
                false
            }
        };

        if entry.reflection.is_none() {
            if let Some(reflection) = self.request_reflection(&entry).await {
                entry.reflection = Some(reflection);
                if durable {
                    if let Err(error) = self.local.update_pending(&entry).await {
                        tracing::warn!("Failed to store reflection for {}: {error}", entry.id);
                    }
                }
            }
        }

        match self.attempt("append", self.remote.append(&entry)).await {
            Ok(Reachability::Reachable(stored)) => {
                if !stored.same_payload(&entry) {
                    tracing::warn!(
                        "Remote copy of entry {} differs from the local draft; keeping remote copy",
                        entry.id
                    );
                }
                let _cache = self.cache_lock.lock().await;
                if let Err(error) = self.local.mark_synced(&stored).await {
                    tracing::warn!("Failed to mark entry {} synced: {error}", stored.id);
                }
                self.writes.touch(stored.id);
                Ok(stored.into_synced())
            }
            Ok(Reachability::Unreachable(reason)) => {
                if durable {
                    tracing::info!("Entry {} queued for sync ({reason})", entry.id);
                    Ok(entry)
                } else {
                    Err(RemoteError::Unreachable(reason).into())
                }
            }
            Err(rejected) => {
                tracing::warn!("Remote store rejected entry {}: {rejected}", entry.id);
                let _cache = self.cache_lock.lock().await;
                if let Err(error) = self.local.discard_unsynced(&entry.id).await {
                    tracing::warn!("Failed to discard rejected entry {}: {error}", entry.id);
                }
                self.writes.touch(entry.id);
                Err(rejected.into())
            }
        }
    }

    async fn request_reflection(&self, entry: &EntryRecord) -> Option<String> {
        let service = self.reflection.as_ref()?;
        let request = ReflectionRequest {
            content: entry.content.clone(),
            mood: entry.mood,
        };

        match tokio::time::timeout(self.options.reflection_timeout, service.reflect(&request)).await
        {
            Ok(Ok(reflection)) => Some(reflection.into_text()),
            Ok(Err(error)) => {
                tracing::warn!("Saving entry {} without reflection: {error}", entry.id);
                None
            }
            Err(_) => {
                tracing::warn!("Reflection for entry {} timed out", entry.id);
                None
            }
        }
    }

    /// Delete an entry everywhere.
    ///
    /// An entry that never reached the remote store is simply forgotten.
    /// Otherwise a delete is queued so a stale remote copy cannot come back,
    /// and one remote attempt is made. If the remote store rejects the delete
    /// the cached row is restored, since the remote copy still exists.
    pub async fn delete(&self, id: &EntryId) -> Result<()> {
        let (queued, previous) = {
            // Keep a running drain from replaying the entry underneath us
            let _drain = self.drain_lock.lock().await;
            let _cache = self.cache_lock.lock().await;

            match self.local.pending_append_for(id).await {
                Ok(Some(_)) => {
                    self.local.discard_unsynced(id).await?;
                    self.writes.touch(*id);
                    tracing::info!("Discarded unsynced entry {id}");
                    self.forget_in_snapshot(id);
                    return Ok(());
                }
                Ok(None) => {}
                Err(error) => tracing::warn!("Failed to inspect queue for {id}: {error}"),
            }

            let previous = self.local.get(id).await.unwrap_or_else(|error| {
                tracing::warn!("Failed to read entry {id} before deleting: {error}");
                None
            });
            let queued = match self.local.record_delete(id).await {
                Ok(seq) => Some(seq),
                Err(error) => {
                    tracing::error!("Failed to queue delete of {id}: {error}");
                    None
                }
            };
            self.writes.touch(*id);
            (queued, previous)
        };
        self.forget_in_snapshot(id);

        match self.attempt("delete", self.remote.delete(id)).await {
            Ok(Reachability::Reachable(())) => {
                let _cache = self.cache_lock.lock().await;
                self.writes.touch(*id);
                if let Some(seq) = queued {
                    if let Err(error) = self.local.acknowledge(seq).await {
                        tracing::warn!("Failed to acknowledge delete of {id}: {error}");
                    }
                }
                Ok(())
            }
            Ok(Reachability::Unreachable(reason)) => {
                if queued.is_some() {
                    tracing::info!("Delete of {id} queued for sync ({reason})");
                    Ok(())
                } else {
                    Err(RemoteError::Unreachable(reason).into())
                }
            }
            Err(rejected) => {
                tracing::warn!("Remote store rejected delete of {id}: {rejected}");
                let _cache = self.cache_lock.lock().await;
                if let Some(seq) = queued {
                    if let Err(error) = self.local.acknowledge(seq).await {
                        tracing::warn!("Failed to drop rejected delete of {id}: {error}");
                    }
                }
                if let Some(row) = &previous {
                    if let Err(error) = self.local.put(row).await {
                        tracing::warn!("Failed to restore entry {id}: {error}");
                    }
                }
                self.writes.touch(*id);
                Err(rejected.into())
            }
        }
    }

    fn forget_in_snapshot(&self, id: &EntryId) {
        self.snapshot.send_if_modified(|page| {
            if !page.entries.iter().any(|entry| entry.id == *id) {
                return false;
            }
            let mut updated = (**page).clone();
            updated.entries.retain(|entry| entry.id != *id);
            *page = Arc::new(updated);
            true
        });
    }

    /// Replay queued mutations oldest first.
    ///
    /// Stops at the first unreachable call and leaves the rest queued. A
    /// rejected mutation is dropped so it cannot block the queue forever.
    /// Returns immediately with `skipped` set if another drain is running.
    pub async fn drain_on_reconnect(&self) -> DrainReport {
        let Ok(_guard) = self.drain_lock.try_lock() else {
            tracing::debug!("Drain already in progress");
            return DrainReport {
                skipped: true,
                ..DrainReport::default()
            };
        };

        let mut report = DrainReport::default();
        loop {
            let queued = match self.local.next_mutation().await {
                Ok(Some(queued)) => queued,
                Ok(None) => break,
                Err(error) => {
                    tracing::warn!("Stopping drain, queue unreadable: {error}");
                    break;
                }
            };

            let outcome = match &queued.mutation {
                Mutation::Append(entry) => self
                    .attempt("append", self.remote.append(entry))
                    .await
                    .map(|reach| match reach {
                        Reachability::Reachable(stored) => Reachability::Reachable(Some(stored)),
                        Reachability::Unreachable(reason) => Reachability::Unreachable(reason),
                    }),
                Mutation::Delete(id) => self
                    .attempt("delete", self.remote.delete(id))
                    .await
                    .map(|reach| match reach {
                        Reachability::Reachable(()) => Reachability::Reachable(None),
                        Reachability::Unreachable(reason) => Reachability::Unreachable(reason),
                    }),
            };

            match outcome {
                Ok(Reachability::Reachable(stored)) => {
                    let _cache = self.cache_lock.lock().await;
                    self.writes.touch(queued.mutation.entry_id());
                    if let Some(stored) = stored {
                        if let Err(error) = self.local.mark_synced(&stored).await {
                            tracing::warn!("Failed to mark entry {} synced: {error}", stored.id);
                        }
                    }
                    if let Err(error) = self.local.acknowledge(queued.seq).await {
                        tracing::warn!("Stopping drain, failed to acknowledge: {error}");
                        break;
                    }
                    report.replayed += 1;
                }
                Ok(Reachability::Unreachable(reason)) => {
                    tracing::info!("Remote store unreachable, pausing drain: {reason}");
                    break;
                }
                Err(rejected) => {
                    tracing::error!(
                        "Dropping queued {} of entry {}: {rejected}",
                        queued.mutation.kind(),
                        queued.mutation.entry_id()
                    );
                    let _cache = self.cache_lock.lock().await;
                    self.writes.touch(queued.mutation.entry_id());
                    let dropped = match &queued.mutation {
                        Mutation::Append(entry) => {
                            self.local.discard_unsynced(&entry.id).await.map(|_| ())
                        }
                        Mutation::Delete(_) => self.local.acknowledge(queued.seq).await.map(|_| ()),
                    };
                    if let Err(error) = dropped {
                        tracing::warn!("Stopping drain, failed to drop mutation: {error}");
                        break;
                    }
                    report.rejected += 1;
                }
            }
        }

        report.remaining = self.local.pending_count().await;
        tracing::info!(
            "Drain finished: {} replayed, {} rejected, {} remaining",
            report.replayed,
            report.rejected,
            report.remaining
        );
        report
    }

    /// Drain the queue whenever the signal goes from offline to online.
    ///
    /// Also drains once at start when the signal already reads online, so a
    /// queue left by a previous run is not stuck until the next transition.
    pub fn spawn_reconnect_listener(&self, mut online: watch::Receiver<bool>) -> JoinHandle<()> {
        let coordinator = self.clone();
        tokio::spawn(async move {
            let mut was_online = *online.borrow_and_update();
            if was_online {
                coordinator.drain_on_reconnect().await;
            }

            while online.changed().await.is_ok() {
                let is_online = *online.borrow_and_update();
                if is_online && !was_online {
                    tracing::debug!("Connectivity restored, draining queue");
                    coordinator.drain_on_reconnect().await;
                }
                was_online = is_online;
            }
        })
    }

    /// Wipe journal data.
    ///
    /// `Everywhere` clears the remote rows before touching local state; when
    /// the remote store cannot be reached nothing is wiped.
    pub async fn reset(&self, scope: ResetScope) -> Result<()> {
        let _drain = self.drain_lock.lock().await;

        if scope == ResetScope::Everywhere {
            match self.attempt("clear", self.remote.clear()).await? {
                Reachability::Reachable(()) => {}
                Reachability::Unreachable(reason) => {
                    return Err(RemoteError::Unreachable(reason).into());
                }
            }
        }

        let _cache = self.cache_lock.lock().await;
        self.writes.clear();
        self.local.clear().await?;
        self.snapshot.send_replace(Arc::new(EntryPage::empty()));
        tracing::info!("Journal reset ({scope:?})");
        Ok(())
    }

    /// Analytics over an entry list as of today in the local timezone.
    #[allow(clippy::unused_self)]
    pub fn analytics(&self, entries: &[EntryRecord]) -> AnalyticsReport {
        analytics::analyze_now(entries)
    }

    /// Number of mutations waiting for the remote store.
    pub async fn pending_count(&self) -> usize {
        self.local.pending_count().await
    }
}
