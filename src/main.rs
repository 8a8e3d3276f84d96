// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Parley - chat with tool-using language models from your terminal
//!
//! Entry point for the Parley CLI application.

use std::io;

use clap::Parser;
use crossterm::{
    style::{Color, ResetColor, SetForegroundColor},
    ExecutableCommand,
};

use parley::cli::run::{load_settings, open_store, run_chat, run_models, run_threads};
use parley::cli::{ChatArgs, Cli, Commands};
use parley::config::Settings;
use parley::error::Result;
use parley::llm::ModelSpec;
use parley::threads::ThreadManager;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        let mut stderr = io::stderr();
        let _ = stderr.execute(SetForegroundColor(Color::Red));
        eprintln!("Error: {}", e);
        let _ = stderr.execute(ResetColor);
        std::process::exit(1);
    }
}

async fn run(mut cli: Cli) -> Result<()> {
    let settings = load_settings(&cli)?;
    init_tracing(cli.verbose, &settings);

    match cli.command.take() {
        None => {
            start_chat(&cli, ChatArgs::default(), settings).await?;
        }
        Some(Commands::Chat(args)) => {
            start_chat(&cli, args, settings).await?;
        }
        Some(Commands::Models(args)) => {
            run_models(args, &settings).await?;
        }
        Some(Commands::Threads(args)) => {
            let store = open_store(&cli, &settings)?;
            let manager = ThreadManager::from_settings(store, &settings);
            run_threads(args, &manager).await?;
        }
    }

    Ok(())
}

async fn start_chat(cli: &Cli, args: ChatArgs, settings: Settings) -> Result<()> {
    // Report every configuration problem at once, before anything is built.
    settings.ensure_valid_for(&ModelSpec::parse(&settings.model))?;
    let store = open_store(cli, &settings)?;
    run_chat(args, settings, store).await
}

fn init_tracing(verbose: u8, settings: &Settings) {
    let mut env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&settings.log_level));

    // `-v` turns on parley diagnostics without knowing target names.
    let level = match verbose {
        0 => None,
        1 => Some("debug"),
        _ => Some("trace"),
    };
    if let Some(level) = level {
        if let Ok(directive) = format!("parley={}", level).parse() {
            env_filter = env_filter.add_directive(directive);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .init();
}
