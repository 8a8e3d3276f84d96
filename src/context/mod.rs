// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Context window management
//!
//! Estimates how much of the model's context the in-memory history uses and
//! folds older messages into a summary before the window overflows.

pub mod budget;
pub mod summarizer;

pub use budget::{should_summarize, ContextBudget, ContextUsage, UsageBand};
pub use summarizer::{compact_history, Compaction, ModelSummarizer, Summarizer};
