// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Subcommand runners
//!
//! Settings layering is file, then environment, then command-line flags.

use std::sync::Arc;
use uuid::Uuid;

use super::args::{ChatArgs, Cli, ModelsArgs, ThreadsArgs, ThreadsCommand};
use crate::chat::{ChatSession, TerminalFrontend};
use crate::config::Settings;
use crate::error::{ParleyError, Result};
use crate::llm::model_spec::{ModelSpec, ProviderKind};
use crate::llm::registry::available_models;
use crate::threads::{
    CheckpointStore, MemoryCheckpointStore, SqliteCheckpointStore, ThreadManager, ThreadSummary,
};
use crate::tools::ApprovalPolicy;

/// Settings for this invocation
pub fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = match &cli.settings {
        Some(path) => Settings::load_from(path)?,
        None => Settings::load()?,
    };
    settings.apply_env();
    apply_cli_overrides(&mut settings, cli);
    Ok(settings)
}

/// Command-line flags win over file and environment
pub fn apply_cli_overrides(settings: &mut Settings, cli: &Cli) {
    if let Some(model) = &cli.model {
        settings.model = model.clone();
    }
    if let Some(database) = &cli.database {
        settings.threads.database = Some(database.clone());
    }
}

/// Checkpoint store for this invocation
pub fn open_store(cli: &Cli, settings: &Settings) -> Result<Arc<dyn CheckpointStore>> {
    if cli.ephemeral {
        return Ok(Arc::new(MemoryCheckpointStore::new()));
    }
    Ok(Arc::new(SqliteCheckpointStore::open(settings.database_path())?))
}

/// Interactive chat on the terminal
pub async fn run_chat(
    args: ChatArgs,
    settings: Settings,
    store: Arc<dyn CheckpointStore>,
) -> Result<()> {
    let mut builder = ChatSession::builder(settings).store(store);
    if args.trust {
        builder = builder.policy(ApprovalPolicy::trusting());
    }
    if let Some(system) = args.system {
        builder = builder.system_prompt(system);
    }
    let mut session = builder.build().await?;

    println!("parley {} using {}", env!("CARGO_PKG_VERSION"), session.model());
    if !session.tools().is_empty() {
        println!("Tools: {}", session.tools().names().join(", "));
    }
    let mut frontend = TerminalFrontend::new().with_history_file(Settings::input_history_path());
    frontend.print_help();

    session.run(&mut frontend).await
}

/// Models selectable for a provider
pub async fn run_models(args: ModelsArgs, settings: &Settings) -> Result<()> {
    let kind = match &args.provider {
        Some(tag) => tag.parse::<ProviderKind>()?,
        None => ModelSpec::parse(&settings.model).provider,
    };
    let models = available_models(kind, settings).await?;

    if models.is_empty() {
        println!("\nNo models available for {}.\n", kind);
        return Ok(());
    }
    println!("\n{} models:\n", kind);
    for model in models {
        println!("  {}", ModelSpec::new(kind, model));
    }
    println!();
    Ok(())
}

/// Thread list, delete and rename
pub async fn run_threads(args: ThreadsArgs, manager: &ThreadManager) -> Result<()> {
    match args.command {
        ThreadsCommand::List { limit } => {
            let threads = manager
                .list(limit.unwrap_or_else(|| manager.preview_limit()))
                .await?;
            if threads.is_empty() {
                println!("\nNo saved threads.\n");
                return Ok(());
            }
            println!("\nRecent threads:\n");
            for thread in &threads {
                println!("  {}", format_thread_row(thread));
            }
            println!();
        }
        ThreadsCommand::Delete { id } => {
            let id = resolve_thread_id(manager, &id).await?;
            manager.delete(id).await?;
            println!("Deleted thread {}", id);
        }
        ThreadsCommand::Rename { id, name } => {
            let id = resolve_thread_id(manager, &id).await?;
            let name = name.join(" ");
            manager.rename(id, &name).await?;
            println!("Renamed thread {} to \"{}\"", id, name.trim());
        }
    }
    Ok(())
}

pub fn format_thread_row(thread: &ThreadSummary) -> String {
    format!(
        "{} | {} | {:>3} messages | {}",
        &thread.id.simple().to_string()[..8],
        thread.last_active.format("%Y-%m-%d %H:%M"),
        thread.message_count,
        thread.name
    )
}

/// Accept a full id or a unique prefix of a listed thread
pub async fn resolve_thread_id(manager: &ThreadManager, input: &str) -> Result<Uuid> {
    let input = input.trim();
    if let Ok(id) = Uuid::parse_str(input) {
        return Ok(id);
    }
    if input.is_empty() {
        return Err(ParleyError::InvalidInput("thread id cannot be empty".to_string()));
    }

    let needle = input.to_lowercase().replace('-', "");
    let threads = manager.list(usize::MAX).await?;
    let matches: Vec<Uuid> = threads
        .iter()
        .map(|t| t.id)
        .filter(|id| id.simple().to_string().starts_with(&needle))
        .collect();

    match matches.as_slice() {
        [id] => Ok(*id),
        [] => Err(ParleyError::NotFound(format!("no thread matching '{}'", input))),
        _ => Err(ParleyError::InvalidInput(format!(
            "'{}' matches {} threads; use more characters",
            input,
            matches.len()
        ))),
    }
}
