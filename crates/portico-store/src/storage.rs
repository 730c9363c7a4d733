//! Durable key-value storage with change notifications
//!
//! Models browser localStorage plus its cross-tab `storage` event: a string
//! key-value map shared by every execution context, where each write
//! notifies all watchers. Stores persist their whole state under one slot
//! per entity kind, and the watch channel doubles as the cross-tab sync
//! signal.

use std::collections::HashMap;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Mutex;

use uuid::Uuid;

use crate::error::StorageError;

/// A key changed; `value` is the new content of the slot and `origin` the
/// tab that wrote it. Watchers skip events carrying their own origin,
/// matching browser storage events never firing in the writing document.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageEvent {
    pub key: String,
    pub value: String,
    pub origin: Uuid,
}

/// The trait that all storage backends implement.
pub trait KeyValueStorage: Send + Sync {
    /// Read a slot.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Replace a slot's value wholesale, notifying all watchers with the
    /// writer's origin tag.
    fn set(&self, key: &str, value: &str, origin: Uuid) -> Result<(), StorageError>;

    /// Remove a slot.
    fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Subscribe to change notifications for every key.
    fn watch(&self) -> Receiver<StorageEvent>;
}

/// In-memory storage backend. Shared across "tabs" via `Arc` in tests and
/// single-process deployments.
#[derive(Default)]
pub struct MemoryStorage {
    slots: Mutex<HashMap<String, String>>,
    watchers: Mutex<Vec<Sender<StorageEvent>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn notify(&self, key: &str, value: &str, origin: Uuid) {
        let Ok(mut watchers) = self.watchers.lock() else {
            return;
        };
        // Drop watchers whose receiver side is gone
        watchers.retain(|watcher| {
            watcher
                .send(StorageEvent {
                    key: key.to_string(),
                    value: value.to_string(),
                    origin,
                })
                .is_ok()
        });
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let slots = self.slots.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(slots.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str, origin: Uuid) -> Result<(), StorageError> {
        {
            let mut slots = self.slots.lock().map_err(|_| StorageError::Poisoned)?;
            slots.insert(key.to_string(), value.to_string());
        }
        self.notify(key, value, origin);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut slots = self.slots.lock().map_err(|_| StorageError::Poisoned)?;
        slots.remove(key);
        Ok(())
    }

    fn watch(&self) -> Receiver<StorageEvent> {
        let (tx, rx) = channel();
        if let Ok(mut watchers) = self.watchers.lock() {
            watchers.push(tx);
        }
        rx
    }
}

/// SQLite-backed storage (requires the `sqlite` feature). A single `kv`
/// table keyed by slot name; watch semantics match [`MemoryStorage`].
#[cfg(feature = "sqlite")]
pub struct SqliteStorage {
    conn: Mutex<rusqlite::Connection>,
    watchers: Mutex<Vec<Sender<StorageEvent>>>,
}

#[cfg(feature = "sqlite")]
impl SqliteStorage {
    pub fn open(path: &str) -> Result<Self, StorageError> {
        let conn = rusqlite::Connection::open(path)?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            watchers: Mutex::new(Vec::new()),
        })
    }

    pub fn in_memory() -> Result<Self, StorageError> {
        Self::open(":memory:")
    }

    fn notify(&self, key: &str, value: &str, origin: Uuid) {
        let Ok(mut watchers) = self.watchers.lock() else {
            return;
        };
        watchers.retain(|watcher| {
            watcher
                .send(StorageEvent {
                    key: key.to_string(),
                    value: value.to_string(),
                    origin,
                })
                .is_ok()
        });
    }
}

#[cfg(feature = "sqlite")]
impl KeyValueStorage for SqliteStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let conn = self.conn.lock().map_err(|_| StorageError::Poisoned)?;
        let value = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| {
                row.get::<_, String>(0)
            })
            .map(Some)
            .or_else(|err| match err {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(StorageError::from(other)),
            })?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str, origin: Uuid) -> Result<(), StorageError> {
        {
            let conn = self.conn.lock().map_err(|_| StorageError::Poisoned)?;
            conn.execute(
                "INSERT INTO kv (key, value) VALUES (?1, ?2) \
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                rusqlite::params![key, value],
            )?;
        }
        self.notify(key, value, origin);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let conn = self.conn.lock().map_err(|_| StorageError::Poisoned)?;
        conn.execute("DELETE FROM kv WHERE key = ?1", [key])?;
        Ok(())
    }

    fn watch(&self) -> Receiver<StorageEvent> {
        let (tx, rx) = channel();
        if let Ok(mut watchers) = self.watchers.lock() {
            watchers.push(tx);
        }
        rx
    }
}
