// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parley::agent::{AgentEventKind, ApprovalDecision, DENIED_MESSAGE};
use parley::chat::{ChatCommand, ChatSession, Notice, ScriptedFrontend, SessionState};
use parley::config::Settings;
use parley::error::Result;
use parley::llm::registry::ProviderFactory;
use parley::llm::{LlmProvider, MockProvider, ModelSpec, ProviderKind, ProviderRegistry, Role, ToolDefinition};
use parley::threads::{MemoryCheckpointStore, ThreadAction, ThreadManager};
use parley::tools::{StaticToolSource, Tool, ToolOutput, ToolSet};
use serde_json::{json, Value};
use tokio::sync::Notify;

fn registry_for(provider: MockProvider) -> ProviderRegistry {
    let factory: ProviderFactory = Arc::new(move |_: &ModelSpec, _: &Settings| {
        Ok(Arc::new(provider.clone()) as Arc<dyn LlmProvider>)
    });
    let mut registry = ProviderRegistry::new();
    registry.register(ProviderKind::Ollama, factory);
    registry
}

async fn session(
    provider: MockProvider,
    store: Arc<MemoryCheckpointStore>,
    tools: ToolSet,
) -> ChatSession {
    ChatSession::builder(Settings::default())
        .registry(registry_for(provider))
        .store(store)
        .tool_source(Arc::new(StaticToolSource::new(tools)))
        .interrupt(Arc::new(Notify::new()))
        .build()
        .await
        .unwrap()
}

/// Deletes nothing, but counts how often it was asked to
struct DeleteFile {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Tool for DeleteFile {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "delete_file",
            "Delete a file",
            json!({"type": "object", "properties": {"path": {"type": "string"}}}),
        )
    }

    fn requires_approval(&self) -> bool {
        true
    }

    async fn call(&self, input: Value) -> Result<ToolOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let path = input.get("path").and_then(Value::as_str).unwrap_or("?");
        Ok(ToolOutput::success(format!("deleted {}", path)))
    }
}

fn delete_tool() -> (ToolSet, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let tools = ToolSet::new().with(Arc::new(DeleteFile {
        calls: calls.clone(),
    }));
    (tools, calls)
}

#[tokio::test]
async fn test_new_two_turns_exit_persists_one_thread() {
    let store = Arc::new(MemoryCheckpointStore::new());
    let provider = MockProvider::new()
        .reply("Hello there.")
        .reply("Goodbye for now.");
    let mut session = session(provider.clone(), store.clone(), ToolSet::new()).await;
    let mut frontend = ScriptedFrontend::new()
        .thread_action(ThreadAction::New)
        .thread_action(ThreadAction::New)
        .input("/new")
        .input("hi")
        .input("see you")
        .input("/exit")
        .input("never read");

    session.run(&mut frontend).await.unwrap();

    assert_eq!(session.last_command(), Some(ChatCommand::Exit));
    assert_eq!(frontend.pending_inputs(), 1);
    assert_eq!(frontend.responses(), vec!["Hello there.", "Goodbye for now."]);
    assert_eq!(provider.requests().len(), 2);

    let manager = ThreadManager::new(store.clone());
    let threads = manager.list(10).await.unwrap();
    assert_eq!(threads.len(), 1);

    let resumed = manager.resume(threads[0].id).await.unwrap();
    let assistant_replies = resumed
        .messages
        .iter()
        .filter(|m| m.role == Role::Assistant)
        .count();
    assert_eq!(assistant_replies, 2);
    assert_eq!(resumed.name, "hi");
    assert_eq!(
        session.state(),
        SessionState::ThreadActive {
            thread_id: threads[0].id
        }
    );
}

#[tokio::test]
async fn test_denied_tool_call_feeds_denial_back_to_model() {
    let store = Arc::new(MemoryCheckpointStore::new());
    let (tools, calls) = delete_tool();
    let provider = MockProvider::new()
        .tool_call("call_1", "delete_file", json!({"path": "/tmp/notes.txt"}))
        .reply("Understood, I left the file alone.");
    let mut session = session(provider.clone(), store, tools).await;
    let mut frontend = ScriptedFrontend::new()
        .thread_action(ThreadAction::New)
        .input("clean up my notes")
        .approval(ApprovalDecision::Deny);

    session.run(&mut frontend).await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(frontend.approval_requests().len(), 1);
    assert_eq!(frontend.approval_requests()[0].name, "delete_file");

    let kinds: Vec<_> = frontend.events().iter().map(|(kind, _)| *kind).collect();
    assert!(kinds.contains(&AgentEventKind::ToolStart));
    assert!(!kinds.contains(&AgentEventKind::ToolEnd));
    assert_eq!(kinds.last(), Some(&AgentEventKind::Response));

    let last_request = provider.requests().pop().unwrap();
    assert!(format!("{:?}", last_request.messages).contains(DENIED_MESSAGE));
    assert_eq!(
        frontend.responses(),
        vec!["Understood, I left the file alone."]
    );
}

#[tokio::test]
async fn test_approved_tool_call_runs_and_reports() {
    let store = Arc::new(MemoryCheckpointStore::new());
    let (tools, calls) = delete_tool();
    let provider = MockProvider::new()
        .tool_call("call_1", "delete_file", json!({"path": "/tmp/old.log"}))
        .reply("Done.");
    let mut session = session(provider, store.clone(), tools).await;
    let mut frontend = ScriptedFrontend::new()
        .thread_action(ThreadAction::New)
        .input("remove the old log")
        .approval(ApprovalDecision::Approve);

    session.run(&mut frontend).await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let kinds: Vec<_> = frontend.events().iter().map(|(kind, _)| *kind).collect();
    let start = kinds.iter().position(|k| *k == AgentEventKind::ToolStart);
    let end = kinds.iter().position(|k| *k == AgentEventKind::ToolEnd);
    assert!(start.is_some() && start < end);
    // user, assistant tool call, tool result, final reply
    assert_eq!(session.history().len(), 4);
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn test_resume_continues_thread_in_new_session() {
    let store = Arc::new(MemoryCheckpointStore::new());

    let mut first = session(MockProvider::new().reply("Paris."), store.clone(), ToolSet::new()).await;
    let mut frontend = ScriptedFrontend::new()
        .thread_action(ThreadAction::New)
        .input("capital of France?");
    first.run(&mut frontend).await.unwrap();

    let thread_id = ThreadManager::new(store.clone()).list(1).await.unwrap()[0].id;

    let provider = MockProvider::new().reply("About 2 million people.");
    let mut second = session(provider.clone(), store.clone(), ToolSet::new()).await;
    let mut frontend = ScriptedFrontend::new()
        .thread_action(ThreadAction::Resume(thread_id))
        .input("how many live there?");
    second.run(&mut frontend).await.unwrap();

    assert_eq!(frontend.menus()[0].len(), 1);
    assert_eq!(second.history().len(), 4);
    let request = &provider.requests()[0];
    assert_eq!(request.messages[0].full_text(), "capital of France?");

    let threads = ThreadManager::new(store).list(10).await.unwrap();
    assert_eq!(threads.len(), 1);
    assert_eq!(threads[0].message_count, 4);
}

#[tokio::test]
async fn test_delete_from_menu_then_quit() {
    let store = Arc::new(MemoryCheckpointStore::new());
    let mut first = session(MockProvider::new().reply("ok"), store.clone(), ToolSet::new()).await;
    let mut frontend = ScriptedFrontend::new()
        .thread_action(ThreadAction::New)
        .input("temporary");
    first.run(&mut frontend).await.unwrap();
    let thread_id = ThreadManager::new(store.clone()).list(1).await.unwrap()[0].id;

    let mut second = session(MockProvider::new(), store.clone(), ToolSet::new()).await;
    let mut frontend = ScriptedFrontend::new()
        .thread_action(ThreadAction::Delete(thread_id))
        .thread_action(ThreadAction::Quit);
    second.run(&mut frontend).await.unwrap();

    assert!(store.is_empty());
    assert_eq!(frontend.menus().len(), 2);
    assert!(frontend.menus()[1].is_empty());
    assert_eq!(second.state(), SessionState::Idle);
}

#[tokio::test]
async fn test_interrupt_while_awaiting_approval_discards_turn() {
    let store = Arc::new(MemoryCheckpointStore::new());
    let interrupt = Arc::new(Notify::new());
    let (tools, calls) = delete_tool();
    let provider = MockProvider::new()
        .tool_call("call_1", "delete_file", json!({"path": "/tmp/report.pdf"}))
        .reply("unreachable");
    let mut session = ChatSession::builder(Settings::default())
        .registry(registry_for(provider))
        .store(store.clone())
        .tool_source(Arc::new(StaticToolSource::new(tools)))
        .interrupt(interrupt.clone())
        .build()
        .await
        .unwrap();
    let mut frontend = ScriptedFrontend::new()
        .thread_action(ThreadAction::New)
        .input("tidy my downloads")
        .interrupt_on_approval(interrupt);

    let finished =
        tokio::time::timeout(std::time::Duration::from_secs(5), session.run(&mut frontend)).await;

    assert!(matches!(finished, Ok(Ok(()))));
    assert_eq!(frontend.approval_requests().len(), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(frontend.notices().contains(&Notice::Interrupted));
    assert!(frontend.responses().is_empty());
    assert!(session.history().is_empty());
    assert!(store.is_empty());
}
