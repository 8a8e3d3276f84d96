// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Control commands recognized in chat input
//!
//! Pure parsing only: no side effects, so every rule is unit tested here.
//! Anything that is not a known command is sent to the model unchanged,
//! including unknown slash words.

use std::fmt;

/// Session control commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChatCommand {
    /// Leave the current thread and pick or start another
    New,
    /// End the session
    Exit,
    /// Switch the active model
    Model,
    /// Re-discover tools from the tool servers
    McpReload,
}

impl ChatCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatCommand::New => "NEW",
            ChatCommand::Exit => "EXIT",
            ChatCommand::Model => "MODEL",
            ChatCommand::McpReload => "MCP_RELOAD",
        }
    }

    /// One-line help text
    pub fn help(&self) -> &'static str {
        match self {
            ChatCommand::New => "/new                 switch threads or start a new one",
            ChatCommand::Exit => "/exit, /quit         leave the session",
            ChatCommand::Model => "/model [provider/name] show or switch the model",
            ChatCommand::McpReload => "/mcp                 reload tool servers",
        }
    }

    pub const ALL: [ChatCommand; 4] = [
        ChatCommand::New,
        ChatCommand::Exit,
        ChatCommand::Model,
        ChatCommand::McpReload,
    ];
}

impl fmt::Display for ChatCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified line of user input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionInput {
    /// Blank line
    Empty,
    Command {
        command: ChatCommand,
        argument: Option<String>,
    },
    /// Text for the model
    Turn(String),
}

/// Classify one line of input
pub fn resolve_input(input: &str) -> SessionInput {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return SessionInput::Empty;
    }

    let (word, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (trimmed, ""),
    };
    let argument = (!rest.is_empty()).then(|| rest.to_string());

    let command = match word.to_lowercase().as_str() {
        "/new" if argument.is_none() => Some(ChatCommand::New),
        "/exit" | "/quit" | "exit" | "quit" if argument.is_none() => Some(ChatCommand::Exit),
        "/model" => Some(ChatCommand::Model),
        "/mcp" | "/mcp-reload" if argument.is_none() => Some(ChatCommand::McpReload),
        _ => None,
    };

    match command {
        Some(command) => SessionInput::Command { command, argument },
        None => SessionInput::Turn(trimmed.to_string()),
    }
}
