// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Thread lifecycle
//!
//! Lists, resumes, renames and deletes threads on top of a
//! [`CheckpointStore`]. Listing is bounded twice: at most `scan_limit`
//! checkpoints are read, and at most `preview_limit` threads are returned.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use super::store::{Checkpoint, CheckpointMeta, CheckpointStore};
use crate::agent::truncate_preview;
use crate::config::Settings;
use crate::error::{ParleyError, Result};
use crate::llm::message::Message;

/// Name shown for threads with neither a given name nor a user message
pub const UNTITLED: &str = "Untitled";

const AUTO_NAME_LIMIT: usize = 50;

/// One row of a thread listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadSummary {
    pub id: Uuid,
    pub name: String,
    pub last_active: DateTime<Utc>,
    pub message_count: usize,
}

/// A thread loaded for continuation
#[derive(Debug, Clone, PartialEq)]
pub struct ResumedThread {
    pub id: Uuid,
    pub name: String,
    /// Model recorded with the newest checkpoint
    pub model: String,
    pub messages: Vec<Message>,
}

/// What the user picked from the thread menu
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThreadAction {
    Resume(Uuid),
    Delete(Uuid),
    Rename(Uuid, String),
    New,
    Quit,
}

pub struct ThreadManager {
    store: Arc<dyn CheckpointStore>,
    preview_limit: usize,
    scan_limit: usize,
}

impl ThreadManager {
    pub fn new(store: Arc<dyn CheckpointStore>) -> Self {
        Self::from_settings(store, &Settings::default())
    }

    pub fn from_settings(store: Arc<dyn CheckpointStore>, settings: &Settings) -> Self {
        Self {
            store,
            preview_limit: settings.threads.preview_limit,
            scan_limit: settings.threads.scan_limit,
        }
    }

    pub fn with_limits(mut self, preview_limit: usize, scan_limit: usize) -> Self {
        self.preview_limit = preview_limit;
        self.scan_limit = scan_limit;
        self
    }

    pub fn preview_limit(&self) -> usize {
        self.preview_limit
    }

    pub fn store(&self) -> &Arc<dyn CheckpointStore> {
        &self.store
    }

    /// Most recently active threads, one row per thread
    pub async fn list(&self, limit: usize) -> Result<Vec<ThreadSummary>> {
        let cap = limit.min(self.preview_limit);
        if cap == 0 {
            return Ok(Vec::new());
        }

        let recent = self.store.list_recent(self.scan_limit).await?;
        let mut seen = HashSet::new();
        let mut summaries = Vec::new();
        for meta in recent {
            if !seen.insert(meta.thread_id) {
                continue;
            }
            summaries.push(self.summarize(meta).await?);
            if summaries.len() == cap {
                break;
            }
        }
        Ok(summaries)
    }

    async fn summarize(&self, meta: CheckpointMeta) -> Result<ThreadSummary> {
        let name = match self.store.name(meta.thread_id).await? {
            Some(name) => name,
            None => auto_name(meta.first_user_message.as_deref()),
        };
        Ok(ThreadSummary {
            id: meta.thread_id,
            name,
            last_active: meta.created_at,
            message_count: meta.message_count,
        })
    }

    /// Load a thread's newest checkpoint
    pub async fn resume(&self, id: Uuid) -> Result<ResumedThread> {
        let checkpoint = self
            .store
            .latest(id)
            .await?
            .ok_or_else(|| not_found(id))?;

        let name = match self.store.name(id).await? {
            Some(name) => name,
            None => auto_name(checkpoint.meta().first_user_message.as_deref()),
        };
        tracing::info!(target: "parley.threads", thread = %id, messages = checkpoint.messages.len(), "resumed thread");
        Ok(ResumedThread {
            id,
            name,
            model: checkpoint.model,
            messages: checkpoint.messages,
        })
    }

    /// Give a thread a display name; checkpoint content is untouched
    pub async fn rename(&self, id: Uuid, name: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ParleyError::InvalidInput(
                "thread name cannot be empty".to_string(),
            ));
        }
        if self.store.checkpoint_count(id).await? == 0 {
            return Err(not_found(id));
        }
        self.store.set_name(id, name).await?;
        tracing::info!(target: "parley.threads", thread = %id, name, "renamed thread");
        Ok(())
    }

    /// Remove a thread; other threads are unaffected
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        let removed = self.store.delete_thread(id).await?;
        if removed == 0 {
            return Err(not_found(id));
        }
        tracing::info!(target: "parley.threads", thread = %id, checkpoints = removed, "deleted thread");
        Ok(())
    }

    /// Fresh thread identifier. Nothing is stored until the first checkpoint.
    pub fn create(&self) -> Uuid {
        Uuid::new_v4()
    }

    /// Snapshot `messages` as the newest checkpoint of `id`.
    ///
    /// The first checkpoint carrying user text fixes the thread's auto name.
    pub async fn persist(&self, id: Uuid, model: &str, messages: &[Message]) -> Result<()> {
        let checkpoint = Checkpoint::new(id, model, messages.to_vec());
        self.store.append(&checkpoint).await?;
        if let Err(e) = self.fix_auto_name(&checkpoint).await {
            tracing::warn!(target: "parley.threads", thread = %id, error = %e, "could not record thread name");
        }
        tracing::debug!(
            target: "parley.threads",
            thread = %id,
            checkpoint = %checkpoint.checkpoint_id,
            messages = messages.len(),
            "checkpoint written"
        );
        Ok(())
    }

    async fn fix_auto_name(&self, checkpoint: &Checkpoint) -> Result<()> {
        let Some(first) = checkpoint.meta().first_user_message else {
            return Ok(());
        };
        if self.store.name(checkpoint.thread_id).await?.is_none() {
            self.store
                .set_name(checkpoint.thread_id, &auto_name(Some(&first)))
                .await?;
        }
        Ok(())
    }
}

fn not_found(id: Uuid) -> ParleyError {
    ParleyError::NotFound(format!("thread {}", id))
}

/// Display name derived from the first user message
pub fn auto_name(first_user_message: Option<&str>) -> String {
    match first_user_message.map(str::trim) {
        Some(text) if !text.is_empty() => {
            let first_line = text.lines().next().unwrap_or(text);
            truncate_preview(first_line, AUTO_NAME_LIMIT)
        }
        _ => UNTITLED.to_string(),
    }
}
