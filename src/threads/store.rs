// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Checkpoint storage
//!
//! A checkpoint is a full snapshot of one thread's message history. Threads
//! only exist through their checkpoints: a thread with no checkpoint is not
//! in the store. Every store call either completes or fails as a whole.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::error::{ParleyError, Result};
use crate::llm::message::{Message, Role};

/// Snapshot of a thread's history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub thread_id: Uuid,
    pub checkpoint_id: Uuid,
    pub created_at: DateTime<Utc>,
    /// Model active when the snapshot was taken
    pub model: String,
    pub messages: Vec<Message>,
}

impl Checkpoint {
    pub fn new(thread_id: Uuid, model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            thread_id,
            checkpoint_id: Uuid::new_v4(),
            created_at: Utc::now(),
            model: model.into(),
            messages,
        }
    }

    pub fn meta(&self) -> CheckpointMeta {
        CheckpointMeta {
            thread_id: self.thread_id,
            checkpoint_id: self.checkpoint_id,
            created_at: self.created_at,
            message_count: self.messages.len(),
            first_user_message: first_user_text(&self.messages),
        }
    }
}

/// Listing row for one checkpoint, without the messages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointMeta {
    pub thread_id: Uuid,
    pub checkpoint_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub message_count: usize,
    pub first_user_message: Option<String>,
}

fn first_user_text(messages: &[Message]) -> Option<String> {
    messages
        .iter()
        .find(|m| m.role == Role::User)
        .map(|m| m.full_text())
        .filter(|t| !t.trim().is_empty())
}

/// Persisted checkpoint storage
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Store a new checkpoint
    async fn append(&self, checkpoint: &Checkpoint) -> Result<()>;

    /// Most recent checkpoints across all threads, newest first
    async fn list_recent(&self, limit: usize) -> Result<Vec<CheckpointMeta>>;

    /// Newest checkpoint of a thread
    async fn latest(&self, thread_id: Uuid) -> Result<Option<Checkpoint>>;

    /// Number of checkpoints stored for a thread
    async fn checkpoint_count(&self, thread_id: Uuid) -> Result<usize>;

    /// Remove a thread's checkpoints and name, returning how many checkpoints went
    async fn delete_thread(&self, thread_id: Uuid) -> Result<usize>;

    async fn set_name(&self, thread_id: Uuid, name: &str) -> Result<()>;

    async fn name(&self, thread_id: Uuid) -> Result<Option<String>>;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// In-memory store for tests and ephemeral sessions
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    checkpoints: Mutex<Vec<Checkpoint>>,
    names: Mutex<HashMap<Uuid, String>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total checkpoints across all threads
    pub fn len(&self) -> usize {
        lock(&self.checkpoints).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn append(&self, checkpoint: &Checkpoint) -> Result<()> {
        lock(&self.checkpoints).push(checkpoint.clone());
        Ok(())
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<CheckpointMeta>> {
        Ok(lock(&self.checkpoints)
            .iter()
            .rev()
            .take(limit)
            .map(Checkpoint::meta)
            .collect())
    }

    async fn latest(&self, thread_id: Uuid) -> Result<Option<Checkpoint>> {
        Ok(lock(&self.checkpoints)
            .iter()
            .rev()
            .find(|c| c.thread_id == thread_id)
            .cloned())
    }

    async fn checkpoint_count(&self, thread_id: Uuid) -> Result<usize> {
        Ok(lock(&self.checkpoints)
            .iter()
            .filter(|c| c.thread_id == thread_id)
            .count())
    }

    async fn delete_thread(&self, thread_id: Uuid) -> Result<usize> {
        let mut checkpoints = lock(&self.checkpoints);
        let before = checkpoints.len();
        checkpoints.retain(|c| c.thread_id != thread_id);
        lock(&self.names).remove(&thread_id);
        Ok(before - checkpoints.len())
    }

    async fn set_name(&self, thread_id: Uuid, name: &str) -> Result<()> {
        lock(&self.names).insert(thread_id, name.to_string());
        Ok(())
    }

    async fn name(&self, thread_id: Uuid) -> Result<Option<String>> {
        Ok(lock(&self.names).get(&thread_id).cloned())
    }
}

/// Parse a UUID from a database string, converting errors to rusqlite errors
fn parse_uuid_from_db(id: &str, column: usize) -> std::result::Result<Uuid, rusqlite::Error> {
    Uuid::parse_str(id).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Parse a DateTime from a database RFC3339 string, converting errors to rusqlite errors
fn parse_datetime_from_db(
    timestamp: &str,
    column: usize,
) -> std::result::Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                column,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
}

/// SQLite-backed checkpoint store
pub struct SqliteCheckpointStore {
    conn: Mutex<Connection>,
}

impl SqliteCheckpointStore {
    /// Open or create a store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path.as_ref()).map_err(|e| {
            ParleyError::Store(format!("Failed to open checkpoint store: {}", e))
        })?;
        Self::with_connection(conn)
    }

    /// Store that lives only as long as the process
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            ParleyError::Store(format!("Failed to open checkpoint store: {}", e))
        })?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Initialize database schema
    fn init_schema(&self) -> Result<()> {
        let conn = lock(&self.conn);
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS checkpoints (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                checkpoint_id TEXT NOT NULL UNIQUE,
                thread_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                model TEXT NOT NULL,
                message_count INTEGER NOT NULL,
                first_user_message TEXT,
                messages TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_checkpoints_thread ON checkpoints(thread_id, seq);
            CREATE TABLE IF NOT EXISTS thread_names (
                thread_id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );",
        )
        .map_err(|e| ParleyError::Store(format!("Failed to create schema: {}", e)))?;
        Ok(())
    }

    fn append_sync(&self, checkpoint: &Checkpoint) -> Result<()> {
        let messages = serde_json::to_string(&checkpoint.messages)?;
        let meta = checkpoint.meta();
        lock(&self.conn)
            .execute(
                "INSERT INTO checkpoints
                (checkpoint_id, thread_id, created_at, model, message_count, first_user_message, messages)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    checkpoint.checkpoint_id.to_string(),
                    checkpoint.thread_id.to_string(),
                    checkpoint.created_at.to_rfc3339(),
                    &checkpoint.model,
                    meta.message_count as i64,
                    meta.first_user_message,
                    messages
                ],
            )
            .map_err(|e| ParleyError::Store(format!("Failed to store checkpoint: {}", e)))?;
        Ok(())
    }

    fn list_recent_sync(&self, limit: usize) -> Result<Vec<CheckpointMeta>> {
        let conn = lock(&self.conn);
        let mut stmt = conn.prepare(
            "SELECT thread_id, checkpoint_id, created_at, message_count, first_user_message
             FROM checkpoints ORDER BY seq DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            let thread_id: String = row.get(0)?;
            let checkpoint_id: String = row.get(1)?;
            let created_at: String = row.get(2)?;
            let message_count: i64 = row.get(3)?;
            Ok(CheckpointMeta {
                thread_id: parse_uuid_from_db(&thread_id, 0)?,
                checkpoint_id: parse_uuid_from_db(&checkpoint_id, 1)?,
                created_at: parse_datetime_from_db(&created_at, 2)?,
                message_count: message_count.max(0) as usize,
                first_user_message: row.get(4)?,
            })
        })?;

        let mut metas = Vec::new();
        for row in rows {
            metas.push(row?);
        }
        Ok(metas)
    }

    fn latest_sync(&self, thread_id: Uuid) -> Result<Option<Checkpoint>> {
        let conn = lock(&self.conn);
        let row = conn
            .query_row(
                "SELECT checkpoint_id, created_at, model, messages
                 FROM checkpoints WHERE thread_id = ?1 ORDER BY seq DESC LIMIT 1",
                params![thread_id.to_string()],
                |row| {
                    let checkpoint_id: String = row.get(0)?;
                    let created_at: String = row.get(1)?;
                    Ok((
                        parse_uuid_from_db(&checkpoint_id, 0)?,
                        parse_datetime_from_db(&created_at, 1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;

        let Some((checkpoint_id, created_at, model, messages)) = row else {
            return Ok(None);
        };
        let messages: Vec<Message> = serde_json::from_str(&messages).map_err(|e| {
            ParleyError::Store(format!("Checkpoint {} is corrupt: {}", checkpoint_id, e))
        })?;
        Ok(Some(Checkpoint {
            thread_id,
            checkpoint_id,
            created_at,
            model,
            messages,
        }))
    }

    fn checkpoint_count_sync(&self, thread_id: Uuid) -> Result<usize> {
        let count: i64 = lock(&self.conn).query_row(
            "SELECT COUNT(*) FROM checkpoints WHERE thread_id = ?1",
            params![thread_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as usize)
    }

    fn delete_thread_sync(&self, thread_id: Uuid) -> Result<usize> {
        let mut conn = lock(&self.conn);
        let tx = conn.transaction()?;
        let id = thread_id.to_string();
        let removed = tx.execute("DELETE FROM checkpoints WHERE thread_id = ?1", params![id])?;
        tx.execute("DELETE FROM thread_names WHERE thread_id = ?1", params![id])?;
        tx.commit()?;
        Ok(removed)
    }

    fn set_name_sync(&self, thread_id: Uuid, name: &str) -> Result<()> {
        lock(&self.conn).execute(
            "INSERT INTO thread_names (thread_id, name, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(thread_id) DO UPDATE SET name = excluded.name, updated_at = excluded.updated_at",
            params![thread_id.to_string(), name, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn name_sync(&self, thread_id: Uuid) -> Result<Option<String>> {
        Ok(lock(&self.conn)
            .query_row(
                "SELECT name FROM thread_names WHERE thread_id = ?1",
                params![thread_id.to_string()],
                |row| row.get(0),
            )
            .optional()?)
    }
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn append(&self, checkpoint: &Checkpoint) -> Result<()> {
        self.append_sync(checkpoint)
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<CheckpointMeta>> {
        self.list_recent_sync(limit)
    }

    async fn latest(&self, thread_id: Uuid) -> Result<Option<Checkpoint>> {
        self.latest_sync(thread_id)
    }

    async fn checkpoint_count(&self, thread_id: Uuid) -> Result<usize> {
        self.checkpoint_count_sync(thread_id)
    }

    async fn delete_thread(&self, thread_id: Uuid) -> Result<usize> {
        self.delete_thread_sync(thread_id)
    }

    async fn set_name(&self, thread_id: Uuid, name: &str) -> Result<()> {
        self.set_name_sync(thread_id, name)
    }

    async fn name(&self, thread_id: Uuid) -> Result<Option<String>> {
        self.name_sync(thread_id)
    }
}
