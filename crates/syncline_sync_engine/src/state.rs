//! Sync engine state machine.

use crate::applier::{LocalApplier, MergeReport};
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::transport::SyncTransport;
use parking_lot::RwLock;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Instant;
use syncline_storage::{CursorStore, KeyValueStore, LocalStore};
use syncline_sync_protocol::{SyncRequest, SyncableEntity, Timestamp};
use tracing::{debug, info, warn};

const IDLE: u8 = 0;
const SYNCING: u8 = 1;

/// The current state of the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Engine is idle, not syncing.
    Idle,
    /// A cycle is running.
    Syncing,
}

impl SyncState {
    /// Returns true if a cycle is running.
    pub fn is_active(&self) -> bool {
        matches!(self, SyncState::Syncing)
    }

    /// Returns true if the engine can start a new cycle.
    pub fn can_start_sync(&self) -> bool {
        matches!(self, SyncState::Idle)
    }
}

/// Statistics about sync operations.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Total number of sync cycles completed.
    pub cycles_completed: u64,
    /// Total number of sync cycles that failed.
    pub cycles_failed: u64,
    /// Total number of rows acknowledged by the endpoint.
    pub items_pushed: u64,
    /// Total number of live rows pulled.
    pub items_pulled: u64,
    /// Cursor persisted by the last successful cycle.
    pub last_sync_timestamp: Option<Timestamp>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Result of a sync cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Rows the endpoint reported written.
    pub synced: u64,
    /// Live rows pulled and merged.
    pub pulled: u64,
    /// Push requests issued.
    pub push_batches: u64,
    /// Pull requests issued.
    pub pull_pages: u64,
    /// Ids the endpoint could not write.
    pub unprocessed_ids: Vec<String>,
    /// Tombstones merged into local rows.
    pub tombstones_applied: u64,
    /// Cursor persisted by this cycle, `None` if it was held back.
    pub cursor: Option<Timestamp>,
}

/// Returns the state to `Idle` on every exit path of a cycle.
struct SyncingGuard<'a> {
    state: &'a AtomicU8,
}

impl<'a> SyncingGuard<'a> {
    fn acquire(state: &'a AtomicU8) -> SyncResult<Self> {
        state
            .compare_exchange(IDLE, SYNCING, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| SyncError::AlreadySyncing)?;
        Ok(Self { state })
    }
}

impl Drop for SyncingGuard<'_> {
    fn drop(&mut self) {
        self.state.store(IDLE, Ordering::Release);
    }
}

/// The sync engine reconciles one entity type between a local store and the
/// sync endpoint.
///
/// A cycle pushes every row changed since the cursor, pulls every remote row
/// changed since the cursor, merges them, and advances the cursor to the
/// server's timestamp.
///
/// # Concurrency
///
/// One cycle runs at a time per engine; a concurrent call fails with
/// [`SyncError::AlreadySyncing`] before any network request. Share one
/// engine (e.g. in an `Arc`) per entity type.
pub struct SyncEngine<E, T, L, K>
where
    E: SyncableEntity,
    T: SyncTransport,
    L: LocalStore<E>,
    K: KeyValueStore,
{
    config: SyncConfig,
    transport: T,
    local: L,
    cursors: CursorStore<K>,
    state: AtomicU8,
    stats: RwLock<SyncStats>,
    _entity: PhantomData<fn() -> E>,
}

impl<E, T, L, K> SyncEngine<E, T, L, K>
where
    E: SyncableEntity,
    T: SyncTransport,
    L: LocalStore<E>,
    K: KeyValueStore,
{
    /// Creates a new sync engine.
    pub fn new(config: SyncConfig, transport: T, local: L, kv: K) -> Self {
        Self {
            config,
            transport,
            local,
            cursors: CursorStore::new(kv),
            state: AtomicU8::new(IDLE),
            stats: RwLock::new(SyncStats::default()),
            _entity: PhantomData,
        }
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        match self.state.load(Ordering::Acquire) {
            SYNCING => SyncState::Syncing,
            _ => SyncState::Idle,
        }
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Gets the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Gets the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Gets the local store.
    pub fn local(&self) -> &L {
        &self.local
    }

    /// Reads the persisted cursor.
    pub fn cursor(&self) -> SyncResult<Option<Timestamp>> {
        Ok(self.cursors.load(E::ENTITY_TYPE)?)
    }

    /// Forgets the cursor so the next cycle is a first sync.
    pub fn reset_cursor(&self) -> SyncResult<()> {
        let _guard = SyncingGuard::acquire(&self.state)?;
        self.cursors.clear(E::ENTITY_TYPE)?;
        info!(entity_type = E::ENTITY_TYPE, "sync cursor reset");
        Ok(())
    }

    /// Runs one cycle with the configured page size.
    pub fn sync(&self) -> SyncResult<SyncOutcome> {
        self.run_sync(self.config.page_size)
    }

    /// Runs one cycle, pushing in batches and pulling in pages of
    /// `page_size` rows.
    ///
    /// On error the cursor is left unchanged; pages merged before the
    /// failure stay merged.
    pub fn run_sync(&self, page_size: u32) -> SyncResult<SyncOutcome> {
        if page_size == 0 {
            return Err(SyncError::InvalidConfig("page size must be positive".into()));
        }
        let _guard = SyncingGuard::acquire(&self.state)?;

        let start = Instant::now();
        info!(entity_type = E::ENTITY_TYPE, page_size, "sync cycle started");

        match self.cycle(page_size) {
            Ok(outcome) => {
                {
                    let mut stats = self.stats.write();
                    stats.cycles_completed += 1;
                    stats.items_pushed += outcome.synced;
                    stats.items_pulled += outcome.pulled;
                    if outcome.cursor.is_some() {
                        stats.last_sync_timestamp = outcome.cursor;
                    }
                    stats.last_error = None;
                }
                info!(
                    entity_type = E::ENTITY_TYPE,
                    synced = outcome.synced,
                    pulled = outcome.pulled,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "sync cycle finished"
                );
                Ok(outcome)
            }
            Err(e) => {
                {
                    let mut stats = self.stats.write();
                    stats.cycles_failed += 1;
                    stats.last_error = Some(e.to_string());
                }
                warn!(entity_type = E::ENTITY_TYPE, error = %e, "sync cycle failed");
                Err(e)
            }
        }
    }

    fn cycle(&self, page_size: u32) -> SyncResult<SyncOutcome> {
        let cursor = self.cursors.load(E::ENTITY_TYPE)?;
        let mut outcome = SyncOutcome::default();

        self.push_all(cursor, page_size, &mut outcome)?;
        let sync_timestamp = self.pull_all(cursor, page_size, &mut outcome)?;

        if outcome.unprocessed_ids.is_empty() {
            outcome.cursor = Some(self.cursors.save(E::ENTITY_TYPE, sync_timestamp)?);
        } else {
            warn!(
                entity_type = E::ENTITY_TYPE,
                unprocessed = outcome.unprocessed_ids.len(),
                "endpoint left rows unwritten, holding cursor back"
            );
        }

        Ok(outcome)
    }

    /// Pushes every dirty row in consecutive batches.
    fn push_all(
        &self,
        cursor: Option<Timestamp>,
        page_size: u32,
        outcome: &mut SyncOutcome,
    ) -> SyncResult<()> {
        let dirty = self.local.dirty_since(cursor)?;
        debug!(entity_type = E::ENTITY_TYPE, dirty = dirty.len(), "push phase");

        for (batch, chunk) in dirty.chunks(page_size as usize).enumerate() {
            let request = SyncRequest::push(cursor, chunk.to_vec(), page_size);
            let response = self.transport.exchange(&request)?;

            outcome.synced += response.synced;
            outcome.push_batches += 1;
            outcome.unprocessed_ids.extend(response.unprocessed);
            debug!(
                entity_type = E::ENTITY_TYPE,
                batch,
                items = chunk.len(),
                synced = response.synced,
                "pushed batch"
            );
        }

        Ok(())
    }

    /// Pulls pages until the endpoint reports no more, merging each page as
    /// it arrives. Returns the final page's server timestamp.
    fn pull_all(
        &self,
        cursor: Option<Timestamp>,
        page_size: u32,
        outcome: &mut SyncOutcome,
    ) -> SyncResult<Timestamp> {
        let applier = LocalApplier::new(&self.local)
            .with_tie_break(self.config.tie_break)
            .with_tombstone_pull(self.config.pull_tombstones);
        let mut merged = MergeReport::default();
        let mut page = 0u32;
        let mut token = None;

        loop {
            let request = SyncRequest::pull(cursor, page, page_size, token.take());
            let response = self.transport.exchange(&request)?;
            outcome.pull_pages += 1;

            let report = applier.apply(&response.items)?;
            merged.absorb(report);
            outcome.pulled = merged.pulled;
            outcome.tombstones_applied = merged.tombstones_applied;
            debug!(
                entity_type = E::ENTITY_TYPE,
                page,
                items = response.items.len(),
                has_more = response.has_more,
                "pulled page"
            );

            if !response.has_more {
                return Ok(response.sync_timestamp);
            }
            token = response.next_page_token;
            page += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use std::sync::atomic::AtomicBool;
    use std::sync::{mpsc, Arc, Barrier};
    use syncline_storage::{MemoryKvStore, MemoryLocalStore};
    use syncline_sync_protocol::{SyncResponse, Todo};

    type TestEngine =
        SyncEngine<Todo, Arc<MockTransport>, Arc<MemoryLocalStore<Todo>>, Arc<MemoryKvStore>>;

    fn response(items: Vec<Todo>, sync_timestamp: i64, has_more: bool) -> SyncResponse<Todo> {
        SyncResponse {
            items,
            sync_timestamp,
            synced: 0,
            has_more,
            page: 0,
            page_size: 100,
            next_page_token: None,
            unprocessed: vec![],
        }
    }

    fn pushed(synced: u64, unprocessed: Vec<String>) -> SyncResponse<Todo> {
        SyncResponse {
            synced,
            unprocessed,
            ..response(vec![], 1, false)
        }
    }

    fn engine(rows: Vec<Todo>) -> (TestEngine, Arc<MockTransport>, Arc<MemoryKvStore>) {
        let transport = Arc::new(MockTransport::new());
        let kv = Arc::new(MemoryKvStore::new());
        let engine = SyncEngine::new(
            SyncConfig::default(),
            Arc::clone(&transport),
            Arc::new(MemoryLocalStore::with_rows(rows)),
            Arc::clone(&kv),
        );
        (engine, transport, kv)
    }

    #[test]
    fn sync_state_checks() {
        assert!(SyncState::Idle.can_start_sync());
        assert!(!SyncState::Syncing.can_start_sync());
        assert!(SyncState::Syncing.is_active());
        assert!(!SyncState::Idle.is_active());
    }

    #[test]
    fn sync_engine_initial_state() {
        let (engine, _, _) = engine(vec![]);
        assert_eq!(engine.state(), SyncState::Idle);
        assert_eq!(engine.stats().cycles_completed, 0);
        assert_eq!(engine.cursor().unwrap(), None);
    }

    #[test]
    fn empty_cycle_pulls_once_and_saves_cursor() {
        let (engine, transport, _) = engine(vec![]);
        transport.push_response(response(vec![], 1_000, false));

        let outcome = engine.sync().unwrap();
        assert_eq!(outcome.push_batches, 0);
        assert_eq!(outcome.pull_pages, 1);
        assert_eq!(outcome.cursor, Some(1_000));
        assert_eq!(engine.cursor().unwrap(), Some(1_000));
        assert_eq!(engine.state(), SyncState::Idle);
        assert_eq!(engine.stats().last_sync_timestamp, Some(1_000));
    }

    #[test]
    fn push_batches_carry_cursor() {
        let rows = (0..5).map(|i| Todo::new(format!("t{i}"), "x", 10 + i)).collect();
        let (engine, transport, kv) = engine(rows);
        kv.set("lastSyncTimestamp:todos", "5").unwrap();

        transport.push_response(pushed(2, vec![]));
        transport.push_response(pushed(2, vec![]));
        transport.push_response(pushed(1, vec![]));
        transport.push_response(response(vec![], 2_000, false));

        let outcome = engine.run_sync(2).unwrap();
        assert_eq!(outcome.synced, 5);
        assert_eq!(outcome.push_batches, 3);

        let requests = transport.requests();
        assert_eq!(requests.len(), 4);
        for request in &requests[..3] {
            assert_eq!(request.body["lastSyncTimestamp"], 5);
            assert_eq!(request.body["pageSize"], 2);
        }
        assert_eq!(requests[3].body["items"].as_array().unwrap().len(), 0);
        assert_eq!(requests[3].body["page"], 0);
    }

    #[test]
    fn pull_follows_tokens_and_saves_final_timestamp() {
        let (engine, transport, _) = engine(vec![]);
        let mut first = response(vec![Todo::new("a", "x", 10)], 500, true);
        first.next_page_token = Some("tok1".into());
        transport.push_response(first);
        transport.push_response(response(vec![Todo::new("b", "y", 20)], 900, false));

        let outcome = engine.run_sync(1).unwrap();
        assert_eq!(outcome.pulled, 2);
        assert_eq!(outcome.pull_pages, 2);
        assert_eq!(outcome.cursor, Some(900));

        let requests = transport.requests();
        assert!(requests[0].body.get("pageToken").is_none());
        assert_eq!(requests[1].body["pageToken"], "tok1");
        assert_eq!(requests[1].body["page"], 1);
        assert_eq!(engine.local().len(), 2);
    }

    #[test]
    fn failure_keeps_merged_pages_and_cursor() {
        let (engine, transport, kv) = engine(vec![]);
        kv.set("lastSyncTimestamp:todos", "100").unwrap();
        transport.push_response(response(vec![Todo::new("a", "x", 150)], 500, true));
        transport.push_failure(500, "internal_error");

        let err = engine.sync().unwrap_err();
        assert_eq!(err.http_status(), Some(500));
        assert_eq!(engine.cursor().unwrap(), Some(100));
        assert!(engine.local().get("a").unwrap().is_some());
        assert_eq!(engine.state(), SyncState::Idle);

        let stats = engine.stats();
        assert_eq!(stats.cycles_failed, 1);
        assert!(stats.last_error.unwrap().contains("internal_error"));
    }

    #[test]
    fn unprocessed_ids_hold_cursor_back() {
        let (engine, transport, _) = engine(vec![Todo::new("a", "x", 10), Todo::new("b", "y", 11)]);
        transport.push_response(pushed(1, vec!["b".into()]));
        transport.push_response(response(vec![], 700, false));

        let outcome = engine.sync().unwrap();
        assert_eq!(outcome.synced, 1);
        assert_eq!(outcome.unprocessed_ids, vec!["b".to_string()]);
        assert_eq!(outcome.cursor, None);
        assert_eq!(engine.cursor().unwrap(), None);
    }

    #[test]
    fn stale_server_timestamp_never_rewinds_cursor() {
        let (engine, transport, kv) = engine(vec![]);
        kv.set("lastSyncTimestamp:todos", "800").unwrap();
        transport.push_response(response(vec![], 600, false));

        let outcome = engine.sync().unwrap();
        assert_eq!(outcome.cursor, Some(800));
        assert_eq!(engine.cursor().unwrap(), Some(800));
    }

    #[test]
    fn zero_page_size_is_rejected() {
        let (engine, transport, _) = engine(vec![]);
        assert!(matches!(
            engine.run_sync(0),
            Err(SyncError::InvalidConfig(_))
        ));
        assert_eq!(transport.request_count(), 0);
    }

    #[test]
    fn reset_cursor_clears_watermark() {
        let (engine, _, kv) = engine(vec![]);
        kv.set("lastSyncTimestamp:todos", "42").unwrap();
        engine.reset_cursor().unwrap();
        assert_eq!(engine.cursor().unwrap(), None);
    }

    /// Blocks inside `exchange` until released.
    struct GateTransport {
        entered: Barrier,
        release: parking_lot::Mutex<mpsc::Receiver<()>>,
        calls: AtomicU8,
        open: AtomicBool,
    }

    impl SyncTransport for GateTransport {
        fn exchange<E: SyncableEntity>(
            &self,
            _request: &SyncRequest<E>,
        ) -> SyncResult<SyncResponse<E>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.open.swap(true, Ordering::SeqCst) {
                self.entered.wait();
                let _ = self.release.lock().recv();
            }
            Ok(SyncResponse {
                items: vec![],
                sync_timestamp: 1,
                synced: 0,
                has_more: false,
                page: 0,
                page_size: 1,
                next_page_token: None,
                unprocessed: vec![],
            })
        }

        fn is_connected(&self) -> bool {
            true
        }
    }

    #[test]
    fn concurrent_sync_is_refused_without_network_call() {
        let (release_tx, release_rx) = mpsc::channel();
        let transport = Arc::new(GateTransport {
            entered: Barrier::new(2),
            release: parking_lot::Mutex::new(release_rx),
            calls: AtomicU8::new(0),
            open: AtomicBool::new(false),
        });
        let engine = Arc::new(SyncEngine::new(
            SyncConfig::default(),
            Arc::clone(&transport),
            MemoryLocalStore::<Todo>::new(),
            MemoryKvStore::new(),
        ));

        let worker = {
            let engine = Arc::clone(&engine);
            std::thread::spawn(move || engine.sync())
        };

        transport.entered.wait();
        assert_eq!(engine.state(), SyncState::Syncing);
        assert!(matches!(engine.sync(), Err(SyncError::AlreadySyncing)));
        assert!(matches!(
            engine.reset_cursor(),
            Err(SyncError::AlreadySyncing)
        ));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);

        release_tx.send(()).unwrap();
        worker.join().unwrap().unwrap();
        assert_eq!(engine.state(), SyncState::Idle);
        assert!(engine.sync().is_ok());
    }
}
