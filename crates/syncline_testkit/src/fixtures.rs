//! Test fixtures and client/server helpers.
//!
//! Provides an in-process endpoint with any number of clients wired to it
//! through the real HTTP transport and JSON codec.

use std::sync::Arc;
use syncline_storage::{FileKvStore, MemoryKvStore, MemoryLocalStore, MemoryRemoteStore};
use syncline_sync_engine::{HttpTransport, LoopbackClient, SyncConfig, SyncEngine};
use syncline_sync_protocol::{ManualClock, Timestamp, Todo};
use syncline_sync_server::{ServerConfig, SyncServer};
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

/// Base URL clients use to reach the in-process endpoint.
pub const LOOPBACK_URL: &str = "http://loopback.test";

/// Transport from a client to the in-process endpoint.
pub type LoopbackTransport = HttpTransport<LoopbackClient<Arc<SyncServer>>>;

/// Engine syncing [`Todo`] rows over the loopback transport.
pub type TodoEngine = SyncEngine<
    Todo,
    Arc<LoopbackTransport>,
    Arc<MemoryLocalStore<Todo>>,
    Arc<MemoryKvStore>,
>;

/// Installs a test log subscriber filtered by `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Builds a todo with explicit timestamps.
pub fn todo_at(id: &str, title: &str, updated_at: Timestamp) -> Todo {
    Todo::new(id, title, updated_at)
}

/// Builds a tombstone deleted at `deleted_at`.
pub fn tombstone_at(id: &str, title: &str, deleted_at: Timestamp) -> Todo {
    let mut todo = todo_at(id, title, deleted_at);
    todo.deleted_at = Some(deleted_at);
    todo
}

/// An endpoint over an in-memory store, driven by a manual clock.
pub struct ClientServerHarness {
    /// The endpoint.
    pub server: Arc<SyncServer>,
    /// The endpoint's canonical store.
    pub remote: Arc<MemoryRemoteStore>,
    /// Server clock; also handy for stamping client edits.
    pub clock: Arc<ManualClock>,
}

impl ClientServerHarness {
    /// Creates a harness with default endpoint limits.
    pub fn new() -> Self {
        Self::with_config(ServerConfig::default())
    }

    /// Creates a harness with the given endpoint configuration.
    pub fn with_config(config: ServerConfig) -> Self {
        Self::with_remote(config, MemoryRemoteStore::new())
    }

    /// Creates a harness over a preconfigured store.
    pub fn with_remote(config: ServerConfig, remote: MemoryRemoteStore) -> Self {
        let remote = Arc::new(remote);
        let clock = Arc::new(ManualClock::new(1_000_000));
        let server = Arc::new(SyncServer::with_parts(
            config,
            remote.clone(),
            clock.clone(),
        ));
        Self {
            server,
            remote,
            clock,
        }
    }

    /// Connects a fresh client with the default engine configuration.
    pub fn client(&self) -> TestClient {
        self.client_with(SyncConfig::new(LOOPBACK_URL))
    }

    /// Connects a fresh client with the given engine configuration.
    pub fn client_with(&self, config: SyncConfig) -> TestClient {
        self.client_over(
            config,
            Arc::new(MemoryLocalStore::new()),
            Arc::new(MemoryKvStore::new()),
        )
    }

    /// Connects a client over existing stores, as after an app restart.
    pub fn client_over(
        &self,
        config: SyncConfig,
        local: Arc<MemoryLocalStore<Todo>>,
        kv: Arc<MemoryKvStore>,
    ) -> TestClient {
        let transport = Arc::new(HttpTransport::from_config(
            &config,
            LoopbackClient::new(Arc::clone(&self.server)),
        ));
        let engine = SyncEngine::new(config, transport.clone(), local.clone(), kv.clone());
        TestClient {
            engine,
            local,
            kv,
            transport,
        }
    }

    /// Moves the server clock forward and returns the new reading.
    pub fn advance(&self, millis: Timestamp) -> Timestamp {
        self.clock.advance(millis)
    }
}

impl Default for ClientServerHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// One client device.
pub struct TestClient {
    /// The sync engine.
    pub engine: TodoEngine,
    /// Local rows.
    pub local: Arc<MemoryLocalStore<Todo>>,
    /// Cursor storage.
    pub kv: Arc<MemoryKvStore>,
    /// Transport to the endpoint.
    pub transport: Arc<LoopbackTransport>,
}

/// A file-backed key-value store in a temporary directory.
pub struct TempKvStore {
    /// The store.
    pub store: FileKvStore,
    dir: TempDir,
}

impl TempKvStore {
    /// Opens a store in a fresh temporary directory.
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let store = FileKvStore::open(dir.path().join("cursors.json"))
            .expect("Failed to open key-value store");
        Self { store, dir }
    }

    /// Drops the open store and reopens the same file.
    pub fn reopen(self) -> Self {
        let Self { store, dir } = self;
        let path = store.path().to_path_buf();
        drop(store);
        let store = FileKvStore::open(path).expect("Failed to reopen key-value store");
        Self { store, dir }
    }
}

impl Default for TempKvStore {
    fn default() -> Self {
        Self::new()
    }
}
