// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Conversation threads and their persisted checkpoints

pub mod manager;
pub mod store;

pub use manager::{auto_name, ResumedThread, ThreadAction, ThreadManager, ThreadSummary, UNTITLED};
pub use store::{
    Checkpoint, CheckpointMeta, CheckpointStore, MemoryCheckpointStore, SqliteCheckpointStore,
};
