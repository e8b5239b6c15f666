//! Remote entry store: the server-ordered source of truth when reachable.

mod supabase;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{EntryId, EntryRecord};

pub use supabase::SupabaseEntryStore;

/// How a remote call failed.
///
/// Only `Unreachable` is retried through the mutation queue; `Rejected` is
/// permanent for that payload and surfaced to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("Remote store unreachable: {0}")]
    Unreachable(String),
    #[error("Remote store rejected the request: {0}")]
    Rejected(String),
}

impl RemoteError {
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Unreachable(_))
    }
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// A window into the newest-first entry list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub offset: usize,
    pub limit: usize,
}

impl PageRequest {
    #[must_use]
    pub const fn new(offset: usize, limit: usize) -> Self {
        Self { offset, limit }
    }

    /// The first page of the given size
    #[must_use]
    pub const fn first(limit: usize) -> Self {
        Self::new(0, limit)
    }

    /// Offset just past this window, clamped at `usize::MAX`
    #[must_use]
    pub const fn end(self) -> usize {
        self.offset.saturating_add(self.limit)
    }

    /// The page following this one
    #[must_use]
    pub const fn next(self) -> Self {
        Self::new(self.end(), self.limit)
    }

    #[must_use]
    pub const fn is_first(self) -> bool {
        self.offset == 0
    }
}

/// One page of remote rows plus the total row count at fetch time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemotePage {
    pub entries: Vec<EntryRecord>,
    pub total_count: usize,
}

impl RemotePage {
    /// Whether rows exist past the requested window
    #[must_use]
    pub const fn has_more(&self, request: PageRequest) -> bool {
        self.total_count > request.end()
    }
}

/// Paginated remote persistence scoped to the signed-in user.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetch a window of entries ordered newest first.
    async fn fetch_page(&self, request: PageRequest) -> RemoteResult<RemotePage>;

    /// Store an entry and return the authoritative copy.
    ///
    /// Replaying an append whose confirmation was lost must not create a
    /// second row.
    async fn append(&self, entry: &EntryRecord) -> RemoteResult<EntryRecord>;

    /// Delete an entry; deleting a missing id is not an error.
    async fn delete(&self, id: &EntryId) -> RemoteResult<()>;

    /// Delete every entry of the current user.
    async fn clear(&self) -> RemoteResult<()>;
}

/// Stand-in when no remote store is configured; every call is unreachable,
/// so the coordinator works purely from the local cache.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisconnectedStore;

const NOT_CONFIGURED: &str = "remote store is not configured";

#[async_trait]
impl RemoteStore for DisconnectedStore {
    async fn fetch_page(&self, _request: PageRequest) -> RemoteResult<RemotePage> {
        Err(RemoteError::Unreachable(NOT_CONFIGURED.to_string()))
    }

    async fn append(&self, _entry: &EntryRecord) -> RemoteResult<EntryRecord> {
        Err(RemoteError::Unreachable(NOT_CONFIGURED.to_string()))
    }

    async fn delete(&self, _id: &EntryId) -> RemoteResult<()> {
        Err(RemoteError::Unreachable(NOT_CONFIGURED.to_string()))
    }

    async fn clear(&self) -> RemoteResult<()> {
        Err(RemoteError::Unreachable(NOT_CONFIGURED.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn has_more_compares_total_with_window_end() {
        let page = RemotePage {
            entries: Vec::new(),
            total_count: 45,
        };
        assert!(page.has_more(PageRequest::first(20)));
        assert!(page.has_more(PageRequest::new(20, 20)));
        assert!(!page.has_more(PageRequest::new(40, 20)));
        assert!(!page.has_more(PageRequest::new(25, 20)));
    }

    #[test]
    fn next_page_advances_by_limit() {
        let request = PageRequest::first(20).next();
        assert_eq!(request, PageRequest::new(20, 20));
        assert!(!request.is_first());
    }

    #[test]
    fn huge_windows_saturate_instead_of_overflowing() {
        let request = PageRequest::new(usize::MAX - 5, 20);
        assert_eq!(request.end(), usize::MAX);
        assert_eq!(request.next().offset, usize::MAX);

        let page = RemotePage {
            entries: Vec::new(),
            total_count: 3,
        };
        assert!(!page.has_more(request));
    }

    #[tokio::test]
    async fn disconnected_store_is_always_unreachable() {
        let store = DisconnectedStore;
        assert!(store
            .fetch_page(PageRequest::first(20))
            .await
            .unwrap_err()
            .is_retryable());
        assert!(store.clear().await.unwrap_err().is_retryable());
    }

    #[test]
    fn only_unreachable_is_retryable() {
        assert!(RemoteError::Unreachable("offline".to_string()).is_retryable());
        assert!(!RemoteError::Rejected("bad mood".to_string()).is_retryable());
    }
}
