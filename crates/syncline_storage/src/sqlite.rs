//! SQLite-backed local store.

use crate::error::{StorageError, StorageResult};
use crate::local::LocalStore;
use parking_lot::Mutex;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::marker::PhantomData;
use std::path::Path;
use syncline_sync_protocol::{SyncableEntity, Timestamp};
use tracing::debug;

/// A local store kept in an embedded SQLite database.
///
/// Each entity type gets a table named after [`SyncableEntity::ENTITY_TYPE`]
/// with the sync columns broken out and indexed, and the full row stored as
/// JSON in `body`.
///
/// # Example
///
/// ```rust
/// use syncline_storage::{LocalStore, SqliteLocalStore};
/// use syncline_sync_protocol::Todo;
///
/// let store = SqliteLocalStore::<Todo>::open_in_memory().unwrap();
/// store.insert(&Todo::new("a", "milk", 100)).unwrap();
/// assert_eq!(store.dirty_since(Some(99)).unwrap().len(), 1);
/// ```
pub struct SqliteLocalStore<E> {
    conn: Mutex<Connection>,
    table: &'static str,
    _entity: PhantomData<fn() -> E>,
}

impl<E: SyncableEntity> SqliteLocalStore<E> {
    /// Opens or creates a database file.
    pub fn open(path: &Path) -> StorageResult<Self> {
        Self::with_connection(Connection::open(path)?)
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    /// Wraps an existing connection and creates the table if needed.
    pub fn with_connection(conn: Connection) -> StorageResult<Self> {
        let table = E::ENTITY_TYPE;
        if table.is_empty()
            || !table
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(StorageError::InvalidName(table.to_string()));
        }

        let store = Self {
            conn: Mutex::new(conn),
            table,
            _entity: PhantomData,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> StorageResult<()> {
        let table = self.table;
        self.conn.lock().execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id TEXT PRIMARY KEY NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                deleted_at INTEGER,
                body TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_{table}_updated_at ON {table}(updated_at);
            CREATE INDEX IF NOT EXISTS idx_{table}_deleted_at ON {table}(deleted_at);"
        ))?;
        debug!(table, "local table ready");
        Ok(())
    }

    /// Number of rows, tombstones included.
    pub fn len(&self) -> StorageResult<usize> {
        let count: i64 = self.conn.lock().query_row(
            &format!("SELECT COUNT(*) FROM {}", self.table),
            [],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Returns true if the table holds no rows.
    pub fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len()? == 0)
    }

    fn select_where(
        &self,
        clause: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> StorageResult<Vec<E>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT body FROM {} WHERE {clause} ORDER BY id",
            self.table
        ))?;
        let bodies = stmt.query_map(params, |row| row.get::<_, String>(0))?;

        let mut rows = Vec::new();
        for body in bodies {
            rows.push(serde_json::from_str(&body?)?);
        }
        Ok(rows)
    }
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

impl<E: SyncableEntity> LocalStore<E> for SqliteLocalStore<E> {
    fn insert(&self, entity: &E) -> StorageResult<()> {
        let body = serde_json::to_string(entity)?;
        let result = self.conn.lock().execute(
            &format!(
                "INSERT INTO {} (id, created_at, updated_at, deleted_at, body)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                self.table
            ),
            params![
                entity.id(),
                entity.created_at(),
                entity.updated_at(),
                entity.deleted_at(),
                body
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(e) if is_constraint_violation(&e) => {
                Err(StorageError::DuplicateId(entity.id().to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn update(&self, entity: &E) -> StorageResult<bool> {
        let body = serde_json::to_string(entity)?;
        let changed = self.conn.lock().execute(
            &format!(
                "UPDATE {} SET created_at = ?2, updated_at = ?3, deleted_at = ?4, body = ?5
                 WHERE id = ?1",
                self.table
            ),
            params![
                entity.id(),
                entity.created_at(),
                entity.updated_at(),
                entity.deleted_at(),
                body
            ],
        )?;
        Ok(changed > 0)
    }

    fn get(&self, id: &str) -> StorageResult<Option<E>> {
        let body: Option<String> = self
            .conn
            .lock()
            .query_row(
                &format!("SELECT body FROM {} WHERE id = ?1", self.table),
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        match body {
            Some(body) => Ok(Some(serde_json::from_str(&body)?)),
            None => Ok(None),
        }
    }

    fn select(&self, predicate: &dyn Fn(&E) -> bool) -> StorageResult<Vec<E>> {
        let mut rows = self.select_where("1 = 1", &[])?;
        rows.retain(|row| predicate(row));
        Ok(rows)
    }

    fn dirty_since(&self, cursor: Option<Timestamp>) -> StorageResult<Vec<E>> {
        match cursor {
            None => self.select_where("1 = 1", &[]),
            Some(cursor) => self.select_where(
                "updated_at > ?1 OR (deleted_at IS NOT NULL AND deleted_at > ?1)",
                &[&cursor as &dyn rusqlite::ToSql],
            ),
        }
    }

    fn active(&self) -> StorageResult<Vec<E>> {
        self.select_where("deleted_at IS NULL", &[])
    }
}

impl<E> std::fmt::Debug for SqliteLocalStore<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteLocalStore")
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}
