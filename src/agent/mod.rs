// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Agent turns and the events they produce

pub mod accumulator;
pub mod events;
pub mod turn;

pub use events::{
    truncate_preview, AgentEvent, AgentEventKind, ApprovalDecision, ApprovalRequest,
    PendingToolCall, TurnOutcome,
};
pub use turn::{TurnRunner, TurnStream, DENIED_MESSAGE};
