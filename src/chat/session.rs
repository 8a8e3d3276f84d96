// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Chat session state machine
//!
//! The session alternates between two states. In [`SessionState::Idle`] the
//! user picks a thread from the menu; in [`SessionState::ThreadActive`] each
//! input line is either a control command or a conversation turn.
//!
//! A turn runs in this order: budget check, optional compaction, agent
//! turn, checkpoint, rendering of the final response. History only changes
//! once a turn has completed, so an interrupted or failed turn leaves it at
//! its last known-good state.

use std::sync::Arc;
use tokio::sync::Notify;
use uuid::Uuid;

use super::commands::{resolve_input, ChatCommand, SessionInput};
use super::frontend::{Notice, SessionFrontend};
use crate::agent::{AgentEvent, ApprovalDecision, TurnOutcome, TurnRunner, TurnStream};
use crate::config::Settings;
use crate::context::{compact_history, should_summarize, ContextBudget, ModelSummarizer, Summarizer};
use crate::error::{ApiError, ParleyError, Result};
use crate::llm::message::Message;
use crate::llm::model_spec::ModelSpec;
use crate::llm::registry::{available_models, ChatModelHandle, ProviderRegistry};
use crate::mcp::McpToolSource;
use crate::threads::{CheckpointStore, SqliteCheckpointStore, ThreadAction, ThreadManager};
use crate::tools::{ApprovalPolicy, ToolServerSource, ToolSet};

/// Where the session loop currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No thread loaded; the thread menu comes next
    Idle,
    ThreadActive { thread_id: Uuid },
}

enum Flow {
    Continue,
    Exit,
}

/// One interactive session
pub struct ChatSession {
    settings: Settings,
    registry: ProviderRegistry,
    handle: ChatModelHandle,
    tool_source: Arc<dyn ToolServerSource>,
    tools: ToolSet,
    policy: ApprovalPolicy,
    threads: ThreadManager,
    budget: ContextBudget,
    summarizer: Option<Arc<dyn Summarizer>>,
    system_prompt: Option<String>,
    interrupt: Option<Arc<Notify>>,
    history: Vec<Message>,
    state: SessionState,
    unsaved: bool,
    last_command: Option<ChatCommand>,
}

/// Builder for [`ChatSession`]
pub struct ChatSessionBuilder {
    settings: Settings,
    registry: Option<ProviderRegistry>,
    tool_source: Option<Arc<dyn ToolServerSource>>,
    store: Option<Arc<dyn CheckpointStore>>,
    summarizer: Option<Arc<dyn Summarizer>>,
    policy: Option<ApprovalPolicy>,
    system_prompt: Option<String>,
    interrupt: Option<Arc<Notify>>,
}

impl ChatSessionBuilder {
    pub fn registry(mut self, registry: ProviderRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn tool_source(mut self, source: Arc<dyn ToolServerSource>) -> Self {
        self.tool_source = Some(source);
        self
    }

    /// Checkpoint store; defaults to the SQLite database from the settings
    pub fn store(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Summarizer for compaction; defaults to asking the active model
    pub fn summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    pub fn policy(mut self, policy: ApprovalPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Interrupt source; defaults to Ctrl-C
    pub fn interrupt(mut self, notify: Arc<Notify>) -> Self {
        self.interrupt = Some(notify);
        self
    }

    /// Validate the settings, build the model handle and discover tools
    pub async fn build(self) -> Result<ChatSession> {
        let settings = self.settings;
        let spec = ModelSpec::parse(&settings.model);
        settings.ensure_valid_for(&spec)?;

        let registry = self.registry.unwrap_or_else(ProviderRegistry::with_defaults);
        let handle = registry.build(&spec, &settings)?;

        let store: Arc<dyn CheckpointStore> = match self.store {
            Some(store) => store,
            None => Arc::new(SqliteCheckpointStore::open(settings.database_path())?),
        };
        let tool_source: Arc<dyn ToolServerSource> = match self.tool_source {
            Some(source) => source,
            None => Arc::new(McpToolSource::new(settings.tools.mcp_servers_file.clone())),
        };
        let tools = match tool_source.discover().await {
            Ok(tools) => tools,
            Err(e) => {
                tracing::warn!(target: "parley.chat", error = %e, "tool discovery failed, starting without tools");
                ToolSet::new()
            }
        };

        let policy = self
            .policy
            .unwrap_or_else(|| ApprovalPolicy::from_settings(&settings));

        Ok(ChatSession {
            threads: ThreadManager::from_settings(store, &settings),
            budget: ContextBudget::from_settings(&settings),
            registry,
            handle,
            tool_source,
            tools,
            policy,
            summarizer: self.summarizer,
            system_prompt: self.system_prompt,
            interrupt: self.interrupt,
            history: Vec::new(),
            state: SessionState::Idle,
            unsaved: false,
            last_command: None,
            settings,
        })
    }
}

impl ChatSession {
    pub fn builder(settings: Settings) -> ChatSessionBuilder {
        ChatSessionBuilder {
            settings,
            registry: None,
            tool_source: None,
            store: None,
            summarizer: None,
            policy: None,
            system_prompt: None,
            interrupt: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn model(&self) -> &ModelSpec {
        &self.handle.spec
    }

    pub fn tools(&self) -> &ToolSet {
        &self.tools
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn threads(&self) -> &ThreadManager {
        &self.threads
    }

    /// The most recent control command handled
    pub fn last_command(&self) -> Option<ChatCommand> {
        self.last_command
    }

    /// Drive the session until the user exits or input ends
    pub async fn run(&mut self, frontend: &mut dyn SessionFrontend) -> Result<()> {
        loop {
            match self.state {
                SessionState::Idle => {
                    if let Flow::Exit = self.pick_thread(frontend).await? {
                        return Ok(());
                    }
                }
                SessionState::ThreadActive { .. } => {
                    let line = tokio::select! {
                        line = frontend.read_input() => line?,
                        _ = wait_for_interrupt(&self.interrupt) => None,
                    };
                    let Some(line) = line else {
                        return self.exit().await;
                    };
                    match self.step(&line, frontend).await {
                        Ok(Flow::Continue) => {}
                        Ok(Flow::Exit) => return Ok(()),
                        Err(e) if e.is_recoverable() => frontend.notify(Notice::Error(e.to_string())),
                        Err(e) => return Err(e),
                    }
                }
            }
        }
    }

    async fn step(&mut self, line: &str, frontend: &mut dyn SessionFrontend) -> Result<Flow> {
        match resolve_input(line) {
            SessionInput::Empty => Ok(Flow::Continue),
            SessionInput::Command { command, argument } => {
                self.handle_command(command, argument, frontend).await
            }
            SessionInput::Turn(text) => {
                self.run_turn(text, frontend).await?;
                Ok(Flow::Continue)
            }
        }
    }

    async fn pick_thread(&mut self, frontend: &mut dyn SessionFrontend) -> Result<Flow> {
        let threads = match self.threads.list(self.threads.preview_limit()).await {
            Ok(threads) => threads,
            Err(e) => {
                frontend.notify(Notice::Error(format!("Could not list threads: {}", e)));
                Vec::new()
            }
        };

        let outcome = match frontend.choose_thread(&threads).await? {
            ThreadAction::New => {
                self.start_thread(frontend);
                Ok(())
            }
            ThreadAction::Quit => return Ok(Flow::Exit),
            ThreadAction::Resume(id) => self.resume_thread(id, frontend).await,
            ThreadAction::Rename(id, name) => {
                self.threads.rename(id, &name).await.map(|()| {
                    frontend.notify(Notice::ThreadRenamed {
                        id,
                        name: name.trim().to_string(),
                    })
                })
            }
            ThreadAction::Delete(id) => self
                .threads
                .delete(id)
                .await
                .map(|()| frontend.notify(Notice::ThreadDeleted(id))),
        };

        match outcome {
            Ok(()) => Ok(Flow::Continue),
            Err(e) if e.is_recoverable() => {
                frontend.notify(Notice::Error(e.to_string()));
                Ok(Flow::Continue)
            }
            Err(e) => Err(e),
        }
    }

    fn start_thread(&mut self, frontend: &mut dyn SessionFrontend) {
        let thread_id = self.threads.create();
        self.history.clear();
        self.unsaved = false;
        self.state = SessionState::ThreadActive { thread_id };
        tracing::info!(target: "parley.chat", thread = %thread_id, "started thread");
        frontend.notify(Notice::ThreadStarted(thread_id));
    }

    async fn resume_thread(&mut self, id: Uuid, frontend: &mut dyn SessionFrontend) -> Result<()> {
        let resumed = self.threads.resume(id).await?;
        if resumed.model != self.handle.spec.to_string() {
            tracing::debug!(
                target: "parley.chat",
                recorded = %resumed.model,
                active = %self.handle.spec,
                "resuming with the active model"
            );
        }
        frontend.notify(Notice::ThreadResumed {
            id,
            name: resumed.name,
            messages: resumed.messages.len(),
        });
        self.history = resumed.messages;
        self.unsaved = false;
        self.state = SessionState::ThreadActive { thread_id: id };
        Ok(())
    }

    /// Apply one control command
    async fn handle_command(
        &mut self,
        command: ChatCommand,
        argument: Option<String>,
        frontend: &mut dyn SessionFrontend,
    ) -> Result<Flow> {
        tracing::debug!(target: "parley.chat", %command, ?argument, "command");
        self.last_command = Some(command);

        match command {
            ChatCommand::Exit => {
                self.exit().await?;
                Ok(Flow::Exit)
            }
            ChatCommand::New => {
                self.flush().await?;
                self.history.clear();
                self.state = SessionState::Idle;
                Ok(Flow::Continue)
            }
            ChatCommand::Model => {
                match argument {
                    Some(model) => self.switch_model(&model, frontend),
                    None => {
                        let available =
                            match available_models(self.handle.spec.provider, &self.settings).await
                            {
                                Ok(models) => models,
                                Err(e) => {
                                    tracing::debug!(target: "parley.chat", error = %e, "model listing unavailable");
                                    Vec::new()
                                }
                            };
                        frontend.notify(Notice::ModelInfo {
                            current: self.handle.spec.to_string(),
                            available,
                        });
                    }
                }
                Ok(Flow::Continue)
            }
            ChatCommand::McpReload => {
                match self.tool_source.discover().await {
                    Ok(tools) => {
                        let names = tools.names().iter().map(|n| n.to_string()).collect();
                        tracing::info!(target: "parley.chat", tools = tools.len(), "tools reloaded");
                        self.tools = tools;
                        frontend.notify(Notice::ToolsReloaded { names });
                    }
                    Err(e) => frontend.notify(Notice::Error(format!(
                        "Tool reload failed, keeping {} tools: {}",
                        self.tools.len(),
                        e
                    ))),
                }
                Ok(Flow::Continue)
            }
        }
    }

    /// Swap the active model. On failure the previous model stays active.
    fn switch_model(&mut self, model: &str, frontend: &mut dyn SessionFrontend) {
        let spec = ModelSpec::parse(model.trim());
        let built = self
            .settings
            .ensure_valid_for(&spec)
            .and_then(|()| self.registry.build(&spec, &self.settings));

        match built {
            Ok(handle) => {
                let from = self.handle.spec.to_string();
                self.handle = handle;
                self.settings.model = spec.to_string();
                frontend.notify(Notice::ModelSwitched {
                    from,
                    to: spec.to_string(),
                });
            }
            Err(e) => {
                tracing::warn!(target: "parley.chat", model = %spec, error = %e, "model switch failed");
                frontend.notify(Notice::Error(format!(
                    "{} (still using {})",
                    e, self.handle.spec
                )));
            }
        }
    }

    async fn exit(&mut self) -> Result<()> {
        self.flush().await?;
        tracing::info!(target: "parley.chat", "session ended");
        Ok(())
    }

    /// Write history that a failed checkpoint left unsaved
    async fn flush(&mut self) -> Result<()> {
        if !self.unsaved {
            return Ok(());
        }
        if let SessionState::ThreadActive { thread_id } = self.state {
            self.threads
                .persist(thread_id, &self.handle.spec.to_string(), &self.history)
                .await?;
        }
        self.unsaved = false;
        Ok(())
    }

    fn summarizer(&self) -> Arc<dyn Summarizer> {
        match &self.summarizer {
            Some(summarizer) => Arc::clone(summarizer),
            None => Arc::new(ModelSummarizer::from_handle(&self.handle)),
        }
    }

    /// Run one conversation turn for `text`
    pub async fn run_turn(&mut self, text: String, frontend: &mut dyn SessionFrontend) -> Result<()> {
        let SessionState::ThreadActive { thread_id } = self.state else {
            return Err(ParleyError::InvalidInput(
                "no active thread for this turn".to_string(),
            ));
        };
        let user = Message::user(text);

        let mut projected = self.history.clone();
        projected.push(user.clone());
        let usage = self.budget.snapshot(&projected);
        tracing::debug!(target: "parley.context", used = usage.used, ceiling = usage.ceiling, band = %usage.band, "budget check");
        if should_summarize(usage.band) {
            let summarizer = self.summarizer();
            let keep = self.settings.context.keep_recent_messages;
            match compact_history(&mut self.history, summarizer.as_ref(), keep).await {
                Ok(Some(compaction)) => frontend.notify(Notice::Summarized(compaction)),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(target: "parley.context", error = %e, "summarization failed");
                    frontend.notify(Notice::Error(format!("Summarization failed: {}", e)));
                }
            }
        }

        let mut runner = TurnRunner::from_settings(
            self.handle.clone(),
            self.tools.clone(),
            self.policy.clone(),
            &self.settings,
        );
        if let Some(prompt) = &self.system_prompt {
            runner = runner.with_system_prompt(prompt.clone());
        }

        let mut transcript = self.history.clone();
        transcript.push(user.clone());
        let mut stream = runner.start(transcript);

        let finished = tokio::select! {
            result = drive(&mut stream, frontend) => Some(result),
            _ = wait_for_interrupt(&self.interrupt) => None,
        };
        let outcome = match finished {
            Some(result) => result?,
            None => {
                stream.cancel();
                tracing::info!(target: "parley.chat", thread = %thread_id, "turn interrupted");
                frontend.notify(Notice::Interrupted);
                return Ok(());
            }
        };

        self.history.push(user);
        self.history.extend(outcome.new_messages.iter().cloned());
        if let Err(e) = self
            .threads
            .persist(thread_id, &self.handle.spec.to_string(), &self.history)
            .await
        {
            self.unsaved = true;
            tracing::warn!(target: "parley.threads", thread = %thread_id, error = %e, "checkpoint failed");
            frontend.notify(Notice::Error(format!("Could not save this turn: {}", e)));
        } else {
            self.unsaved = false;
        }

        frontend.render(&AgentEvent::Response(outcome)).await?;
        frontend.notify(Notice::Usage(self.budget.snapshot(&self.history)));
        Ok(())
    }
}

/// Consume a turn's events up to its response
async fn drive(stream: &mut TurnStream, frontend: &mut dyn SessionFrontend) -> Result<TurnOutcome> {
    while let Some(item) = stream.next().await {
        match item? {
            AgentEvent::ToolApprovalRequired(request) => {
                let decision = match frontend.decide(request.call()).await {
                    Ok(decision) => decision,
                    Err(e) => {
                        tracing::warn!(target: "parley.chat", error = %e, "approval prompt failed, denying");
                        ApprovalDecision::Deny
                    }
                };
                tracing::info!(
                    target: "parley.chat",
                    tool = %request.call().name,
                    approved = decision.is_approved(),
                    "approval decided"
                );
                request.decide(decision);
            }
            AgentEvent::Response(outcome) => return Ok(outcome),
            event => frontend.render(&event).await?,
        }
    }
    Err(ApiError::StreamError("turn ended without a response".to_string()).into())
}

async fn wait_for_interrupt(signal: &Option<Arc<Notify>>) {
    match signal {
        Some(notify) => notify.notified().await,
        None => {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::debug!(target: "parley.chat", error = %e, "no interrupt handler");
                std::future::pending::<()>().await;
            }
        }
    }
}
