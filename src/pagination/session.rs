use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::core::error::AppResult;
use crate::storage::db::{self, DbConnection, Record, RecordFilter};

/// One ephemeral listing window.
///
/// `total_count` and `total_pages` are frozen at creation and never recomputed
/// on navigation, so a browse that outlives concurrent edits may show stale
/// page numbers. Accepted: sessions are short-lived and best-effort.
#[derive(Debug, Clone)]
pub struct PageSession {
    pub filter: RecordFilter,
    pub total_count: u64,
    pub total_pages: usize,
    created_at: Instant,
}

impl PageSession {
    fn expired(&self, ttl: Duration) -> bool {
        self.created_at.elapsed() > ttl
    }
}

/// Owner of all live pagination sessions.
///
/// Process-local and in-memory only; sessions are garbage-collected lazily,
/// inside the same lock as each new insert, so there is no background timer.
/// Safe for concurrent use from independent chats.
pub struct SessionManager {
    sessions: Arc<Mutex<HashMap<String, PageSession>>>,
    ttl: Duration,
    page_size: usize,
}

impl SessionManager {
    /// Create a manager with the given page size and session TTL.
    pub fn new(page_size: usize, ttl: Duration) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            ttl,
            page_size,
        }
    }

    /// Max records rendered per listing screen.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Page count for a frozen record count: `ceil(count / page_size)`, never
    /// less than 1 even for an empty table.
    pub fn total_pages(count: u64, page_size: usize) -> usize {
        ((count as usize).div_ceil(page_size)).max(1)
    }

    /// Open a new session for the given filter and return its token.
    ///
    /// The record count is snapshotted here; expired sessions are swept under
    /// the same lock as the insert.
    pub async fn create(&self, conn: &DbConnection, filter: RecordFilter) -> AppResult<String> {
        self.create_blocking(conn, filter)
    }

    /// Synchronous core of [`Self::create`]. Usable where a borrowed
    /// connection must not be captured in a `Send` future.
    pub(crate) fn create_blocking(
        &self,
        conn: &DbConnection,
        filter: RecordFilter,
    ) -> AppResult<String> {
        let total_count = db::count_records(conn, &filter)?;
        let session = PageSession {
            filter,
            total_count,
            total_pages: Self::total_pages(total_count, self.page_size),
            created_at: Instant::now(),
        };

        let token = Uuid::new_v4().simple().to_string();

        let mut sessions = self.sessions.lock().unwrap();
        let ttl = self.ttl;
        sessions.retain(|_, s| !s.expired(ttl));
        sessions.insert(token.clone(), session);

        Ok(token)
    }

    /// Look up a live session by token. Expired tokens read as missing.
    pub async fn resolve(&self, token: &str) -> Option<PageSession> {
        self.resolve_blocking(token)
    }

    fn resolve_blocking(&self, token: &str) -> Option<PageSession> {
        let sessions = self.sessions.lock().unwrap();
        sessions.get(token).filter(|s| !s.expired(self.ttl)).cloned()
    }

    /// Fetch one page slice for a session.
    ///
    /// Returns `None` when the token is unknown or expired. A `page` at or
    /// past `total_pages` yields an empty slice together with the stored page
    /// count; clamping is the caller's concern.
    pub async fn fetch_page(
        &self,
        conn: &DbConnection,
        token: &str,
        page: usize,
    ) -> AppResult<Option<(Vec<Record>, usize)>> {
        self.fetch_page_blocking(conn, token, page)
    }

    /// Synchronous core of [`Self::fetch_page`]. Usable where a borrowed
    /// connection must not be captured in a `Send` future.
    pub(crate) fn fetch_page_blocking(
        &self,
        conn: &DbConnection,
        token: &str,
        page: usize,
    ) -> AppResult<Option<(Vec<Record>, usize)>> {
        let session = match self.resolve_blocking(token) {
            Some(s) => s,
            None => return Ok(None),
        };

        let offset = page * self.page_size;
        let rows = db::select_page(conn, &session.filter, self.page_size, offset)?;
        Ok(Some((rows, session.total_pages)))
    }

    /// Number of live sessions (tests / diagnostics).
    pub async fn len(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    /// Whether no live session exists.
    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().unwrap().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::db::{create_memory_pool, get_connection, upsert_record};
    use pretty_assertions::assert_eq;

    fn seeded_conn(count: i64) -> (crate::storage::DbPool, DbConnection) {
        let pool = create_memory_pool().unwrap();
        let conn = get_connection(&pool).unwrap();
        for i in 0..count {
            upsert_record(&conn, 1000 + i, &format!("@user{}", i), &format!("Name{}", i), "", "")
                .unwrap();
        }
        (pool, conn)
    }

    #[test]
    fn test_total_pages_is_ceil_with_floor_of_one() {
        assert_eq!(SessionManager::total_pages(0, 20), 1);
        assert_eq!(SessionManager::total_pages(1, 20), 1);
        assert_eq!(SessionManager::total_pages(20, 20), 1);
        assert_eq!(SessionManager::total_pages(21, 20), 2);
        assert_eq!(SessionManager::total_pages(40, 20), 2);
        assert_eq!(SessionManager::total_pages(41, 20), 3);
    }

    #[tokio::test]
    async fn test_create_snapshots_count() {
        let (_pool, conn) = seeded_conn(25);
        let manager = SessionManager::new(20, Duration::from_secs(3600));

        let token = manager.create(&conn, RecordFilter::All).await.unwrap();
        let session = manager.resolve(&token).await.unwrap();
        assert_eq!(session.total_count, 25);
        assert_eq!(session.total_pages, 2);

        // Mutating the table does not touch the frozen snapshot
        upsert_record(&conn, 9999, "@late", "Late", "", "").unwrap();
        let session = manager.resolve(&token).await.unwrap();
        assert_eq!(session.total_count, 25);
    }

    #[tokio::test]
    async fn test_fetch_page_slices_and_out_of_range() {
        let (_pool, conn) = seeded_conn(25);
        let manager = SessionManager::new(20, Duration::from_secs(3600));
        let token = manager.create(&conn, RecordFilter::All).await.unwrap();

        let (rows, total_pages) = manager.fetch_page(&conn, &token, 0).await.unwrap().unwrap();
        assert_eq!(rows.len(), 20);
        assert_eq!(total_pages, 2);

        let (rows, _) = manager.fetch_page(&conn, &token, 1).await.unwrap().unwrap();
        assert_eq!(rows.len(), 5);

        // Out-of-range page is an empty slice with the stored page count
        let (rows, total_pages) = manager.fetch_page(&conn, &token, 7).await.unwrap().unwrap();
        assert!(rows.is_empty());
        assert_eq!(total_pages, 2);
    }

    #[tokio::test]
    async fn test_unknown_token_reads_as_missing() {
        let (_pool, conn) = seeded_conn(3);
        let manager = SessionManager::new(20, Duration::from_secs(3600));

        assert!(manager.resolve("no-such-token").await.is_none());
        assert!(manager.fetch_page(&conn, "no-such-token", 0).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_session_reads_as_missing_and_is_swept() {
        let (_pool, conn) = seeded_conn(3);
        let manager = SessionManager::new(20, Duration::ZERO);

        let token = manager.create(&conn, RecordFilter::All).await.unwrap();
        std::thread::sleep(Duration::from_millis(5));

        assert!(manager.resolve(&token).await.is_none());
        assert!(manager.fetch_page(&conn, &token, 0).await.unwrap().is_none());

        // The next create sweeps the dead entry
        let _fresh = manager.create(&conn, RecordFilter::All).await.unwrap();
        assert_eq!(manager.len().await, 1);
    }

    #[tokio::test]
    async fn test_tokens_are_unique_per_session() {
        let (_pool, conn) = seeded_conn(1);
        let manager = SessionManager::new(20, Duration::from_secs(3600));

        let a = manager.create(&conn, RecordFilter::All).await.unwrap();
        let b = manager.create(&conn, RecordFilter::ByName("Name0".into())).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(manager.len().await, 2);
    }
}
