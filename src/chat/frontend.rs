// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Session frontends
//!
//! The session loop talks to the user only through [`SessionFrontend`].
//! [`TerminalFrontend`] is the interactive implementation; tests drive the
//! loop with scripted frontends instead.
//!
//! Formatting lives in plain functions that return strings so it can be
//! tested without a terminal.

use async_trait::async_trait;
use crossterm::style::{Color, ResetColor, SetForegroundColor};
use crossterm::ExecutableCommand;
use std::fmt;
use std::io::{self, Write};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use uuid::Uuid;

use super::commands::ChatCommand;
use crate::agent::{AgentEvent, ApprovalDecision, PendingToolCall};
use crate::context::{Compaction, ContextUsage, UsageBand};
use crate::error::Result;
use crate::threads::{ThreadAction, ThreadSummary};

/// Status messages from the session to the user
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    /// Context usage after a turn
    Usage(ContextUsage),
    /// Older history was folded into a summary
    Summarized(Compaction),
    /// Active model and the models selectable for its provider
    ModelInfo {
        current: String,
        available: Vec<String>,
    },
    ModelSwitched {
        from: String,
        to: String,
    },
    ToolsReloaded {
        names: Vec<String>,
    },
    ThreadStarted(Uuid),
    ThreadResumed {
        id: Uuid,
        name: String,
        messages: usize,
    },
    ThreadRenamed {
        id: Uuid,
        name: String,
    },
    ThreadDeleted(Uuid),
    /// The running turn was interrupted; nothing from it was kept
    Interrupted,
    Error(String),
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::Usage(usage) => write!(f, "Context: {}", usage),
            Notice::Summarized(c) => write!(
                f,
                "Summarized {} older messages ({} kept verbatim)",
                c.replaced, c.kept
            ),
            Notice::ModelInfo { current, available } => {
                write!(f, "Model: {}", current)?;
                if !available.is_empty() {
                    write!(f, "\nAvailable: {}", available.join(", "))?;
                }
                Ok(())
            }
            Notice::ModelSwitched { from, to } => write!(f, "Switched model: {} -> {}", from, to),
            Notice::ToolsReloaded { names } if names.is_empty() => {
                write!(f, "Tool servers reloaded: no tools available")
            }
            Notice::ToolsReloaded { names } => write!(
                f,
                "Tool servers reloaded: {} tools ({})",
                names.len(),
                names.join(", ")
            ),
            Notice::ThreadStarted(id) => write!(f, "New thread {}", short_id(id)),
            Notice::ThreadResumed { id, name, messages } => write!(
                f,
                "Resumed \"{}\" ({}, {} messages)",
                name,
                short_id(id),
                messages
            ),
            Notice::ThreadRenamed { id, name } => {
                write!(f, "Renamed thread {} to \"{}\"", short_id(id), name)
            }
            Notice::ThreadDeleted(id) => write!(f, "Deleted thread {}", short_id(id)),
            Notice::Interrupted => write!(f, "Interrupted; the turn was discarded"),
            Notice::Error(message) => write!(f, "Error: {}", message),
        }
    }
}

/// User-facing side of a chat session
#[async_trait]
pub trait SessionFrontend: Send {
    /// Next line of input, or `None` at end of input
    async fn read_input(&mut self) -> Result<Option<String>>;

    /// Pick what to do from the thread menu
    async fn choose_thread(&mut self, threads: &[ThreadSummary]) -> Result<ThreadAction>;

    /// Show one turn event. Approval requests are routed to [`Self::decide`].
    async fn render(&mut self, event: &AgentEvent) -> Result<()>;

    /// Ask whether a gated tool call may run
    async fn decide(&mut self, call: &PendingToolCall) -> Result<ApprovalDecision>;

    fn notify(&mut self, notice: Notice);
}

pub(crate) fn short_id(id: &Uuid) -> String {
    id.simple().to_string().chars().take(8).collect()
}

/// Thread menu text, newest first
pub fn format_thread_menu(threads: &[ThreadSummary]) -> String {
    let mut out = String::new();
    if threads.is_empty() {
        out.push_str("No saved threads.\n");
    } else {
        out.push_str("Recent threads:\n");
        for (i, thread) in threads.iter().enumerate() {
            out.push_str(&format!(
                "  {:>2}. {}  [{}]  {} messages, {}\n",
                i + 1,
                thread.name,
                short_id(&thread.id),
                thread.message_count,
                thread.last_active.format("%Y-%m-%d %H:%M")
            ));
        }
    }
    out.push_str("[n]ew thread, <number> resume, d<number> delete, r<number> <name> rename, [q]uit");
    out
}

/// Parse a thread menu answer; `None` when it does not make sense
pub fn parse_thread_choice(input: &str, threads: &[ThreadSummary]) -> Option<ThreadAction> {
    let input = input.trim();
    let pick = |digits: &str| -> Option<Uuid> {
        let index: usize = digits.trim().parse().ok()?;
        threads.get(index.checked_sub(1)?).map(|t| t.id)
    };

    match input.to_lowercase().as_str() {
        "" | "n" | "new" => return Some(ThreadAction::New),
        "q" | "quit" | "exit" => return Some(ThreadAction::Quit),
        _ => {}
    }

    if let Some(rest) = input.strip_prefix(['d', 'D']) {
        return pick(rest).map(ThreadAction::Delete);
    }
    if let Some(rest) = input.strip_prefix(['r', 'R']) {
        let (digits, name) = rest.trim_start().split_once(char::is_whitespace)?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        return pick(digits).map(|id| ThreadAction::Rename(id, name.to_string()));
    }
    pick(input).map(ThreadAction::Resume)
}

/// Parse an approval answer; anything unrecognized denies
pub fn parse_approval(input: &str) -> ApprovalDecision {
    match input.trim().to_lowercase().as_str() {
        "y" | "yes" => ApprovalDecision::Approve,
        "a" | "always" => ApprovalDecision::ApproveForSession,
        _ => ApprovalDecision::Deny,
    }
}

fn band_color(band: UsageBand) -> Color {
    match band {
        UsageBand::Normal => Color::DarkGrey,
        UsageBand::Warning => Color::Yellow,
        UsageBand::Danger | UsageBand::Over => Color::Red,
    }
}

/// Interactive frontend on stdin/stdout
pub struct TerminalFrontend {
    lines: Lines<BufReader<Stdin>>,
    history_path: Option<PathBuf>,
    mid_line: bool,
}

impl TerminalFrontend {
    pub fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
            history_path: None,
            mid_line: false,
        }
    }

    /// Append every entered line to `path`
    pub fn with_history_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.history_path = Some(path.into());
        self
    }

    fn colored(&self, color: Color, text: &str) -> io::Result<()> {
        let mut stdout = io::stdout();
        stdout.execute(SetForegroundColor(color))?;
        print!("{}", text);
        stdout.execute(ResetColor)?;
        stdout.flush()
    }

    fn end_line(&mut self) {
        if self.mid_line {
            println!();
            self.mid_line = false;
        }
    }

    async fn prompt(&mut self, prompt: &str) -> Result<Option<String>> {
        self.end_line();
        self.colored(Color::Cyan, prompt)?;
        Ok(self.lines.next_line().await?)
    }

    fn remember(&self, line: &str) {
        let Some(path) = &self.history_path else {
            return;
        };
        if line.trim().is_empty() {
            return;
        }
        let result = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut file| writeln!(file, "{}", line));
        if let Err(e) = result {
            tracing::debug!(target: "parley.chat", path = %path.display(), error = %e, "could not append input history");
        }
    }

    /// Print the command list
    pub fn print_help(&self) {
        println!("Commands:");
        for command in ChatCommand::ALL {
            println!("  {}", command.help());
        }
    }
}

impl Default for TerminalFrontend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionFrontend for TerminalFrontend {
    async fn read_input(&mut self) -> Result<Option<String>> {
        let line = self.prompt("> ").await?;
        if let Some(line) = &line {
            self.remember(line);
        }
        Ok(line)
    }

    async fn choose_thread(&mut self, threads: &[ThreadSummary]) -> Result<ThreadAction> {
        self.end_line();
        println!();
        println!("{}", format_thread_menu(threads));
        loop {
            let Some(answer) = self.prompt("thread> ").await? else {
                return Ok(ThreadAction::Quit);
            };
            match parse_thread_choice(&answer, threads) {
                Some(action) => return Ok(action),
                None => self.colored(Color::Yellow, "Not a valid choice.\n")?,
            }
        }
    }

    async fn render(&mut self, event: &AgentEvent) -> Result<()> {
        match event {
            AgentEvent::Token(text) => {
                print!("{}", text);
                io::stdout().flush()?;
                self.mid_line = !text.ends_with('\n');
            }
            AgentEvent::ToolStart {
                name,
                input_preview,
                ..
            } => {
                self.end_line();
                self.colored(Color::Blue, &format!("⚙ {} {}\n", name, input_preview))?;
            }
            AgentEvent::ToolEnd {
                name,
                output_preview,
                is_error,
                ..
            } => {
                let (color, mark) = if *is_error {
                    (Color::Red, "✗")
                } else {
                    (Color::Green, "✓")
                };
                self.colored(color, &format!("{} {} {}\n", mark, name, output_preview))?;
            }
            AgentEvent::Response(_) => {
                self.end_line();
                println!();
            }
            AgentEvent::ToolApprovalRequired(_) => {}
        }
        Ok(())
    }

    async fn decide(&mut self, call: &PendingToolCall) -> Result<ApprovalDecision> {
        self.end_line();
        self.colored(Color::Yellow, "⚠ ")?;
        println!("Tool '{}' wants to run with:", call.name);
        println!("  {}", call.arguments);
        let answer = self
            .prompt("Allow? [y]es / [n]o / [a]lways for this session: ")
            .await?;
        Ok(answer.as_deref().map(parse_approval).unwrap_or(ApprovalDecision::Deny))
    }

    fn notify(&mut self, notice: Notice) {
        self.end_line();
        let color = match &notice {
            Notice::Usage(usage) => band_color(usage.band),
            Notice::Error(_) | Notice::Interrupted => Color::Red,
            Notice::Summarized(_) => Color::Yellow,
            _ => Color::Cyan,
        };
        if let Err(e) = self.colored(color, &format!("{}\n", notice)) {
            tracing::debug!(target: "parley.chat", error = %e, "could not write notice");
        }
    }
}
