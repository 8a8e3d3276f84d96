// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Interactive chat sessions
//!
//! Input resolution, the session state machine, and the frontends that
//! connect it to a user.

pub mod commands;
pub mod frontend;
pub mod scripted;
pub mod session;

pub use commands::{resolve_input, ChatCommand, SessionInput};
pub use frontend::{Notice, SessionFrontend, TerminalFrontend};
pub use scripted::ScriptedFrontend;
pub use session::{ChatSession, ChatSessionBuilder, SessionState};
