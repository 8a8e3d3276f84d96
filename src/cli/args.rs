// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! CLI argument definitions using Clap

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Parley - chat with tool-using language models from your terminal
#[derive(Parser, Debug)]
#[command(name = "parley")]
#[command(version, about = "Chat with tool-using language models from your terminal")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Model to use (`provider/name` or a bare local model name)
    #[arg(short, long, global = true)]
    pub model: Option<String>,

    /// Settings file path
    #[arg(long, global = true)]
    pub settings: Option<PathBuf>,

    /// Thread database path
    #[arg(long, global = true)]
    pub database: Option<PathBuf>,

    /// Keep threads in memory only
    #[arg(long, global = true)]
    pub ephemeral: bool,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start an interactive chat session (default when no command given)
    Chat(ChatArgs),

    /// List models for a provider
    Models(ModelsArgs),

    /// Manage saved threads
    Threads(ThreadsArgs),
}

/// Arguments for the chat subcommand
#[derive(clap::Args, Debug, Default)]
pub struct ChatArgs {
    /// Run every tool without asking
    #[arg(long)]
    pub trust: bool,

    /// System prompt for every turn
    #[arg(long)]
    pub system: Option<String>,
}

/// Arguments for the models subcommand
#[derive(clap::Args, Debug, Default)]
pub struct ModelsArgs {
    /// Provider tag (ollama, openai, deepseek); defaults to the active model's provider
    pub provider: Option<String>,
}

/// Arguments for the threads subcommand
#[derive(clap::Args, Debug)]
pub struct ThreadsArgs {
    #[command(subcommand)]
    pub command: ThreadsCommand,
}

#[derive(Subcommand, Debug)]
pub enum ThreadsCommand {
    /// List recent threads
    List {
        /// Maximum number of threads to show
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// Delete a thread by id or id prefix
    Delete { id: String },

    /// Rename a thread
    Rename {
        id: String,
        /// New display name
        #[arg(num_args = 1.., required = true)]
        name: Vec<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_cli_default_no_command() {
        let cli = parse(&["parley"]);
        assert!(cli.command.is_none());
        assert!(cli.model.is_none());
        assert!(!cli.ephemeral);
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn test_cli_verbose_multiple() {
        assert_eq!(parse(&["parley", "-vv"]).verbose, 2);
    }

    #[test]
    fn test_cli_global_flags_after_subcommand() {
        let cli = parse(&[
            "parley",
            "chat",
            "--model",
            "deepseek/deepseek-chat",
            "--database",
            "/tmp/t.db",
            "--ephemeral",
        ]);
        assert_eq!(cli.model.as_deref(), Some("deepseek/deepseek-chat"));
        assert_eq!(cli.database, Some(PathBuf::from("/tmp/t.db")));
        assert!(cli.ephemeral);
        assert!(matches!(cli.command, Some(Commands::Chat(_))));
    }

    #[test]
    fn test_chat_trust() {
        match parse(&["parley", "chat", "--trust"]).command {
            Some(Commands::Chat(args)) => assert!(args.trust),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_models_provider() {
        match parse(&["parley", "models", "openai"]).command {
            Some(Commands::Models(args)) => assert_eq!(args.provider.as_deref(), Some("openai")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_threads_list_limit() {
        match parse(&["parley", "threads", "list", "-n", "5"]).command {
            Some(Commands::Threads(ThreadsArgs {
                command: ThreadsCommand::List { limit },
            })) => assert_eq!(limit, Some(5)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_threads_rename_joins_words() {
        match parse(&["parley", "threads", "rename", "1a2b", "Trip", "plans"]).command {
            Some(Commands::Threads(ThreadsArgs {
                command: ThreadsCommand::Rename { id, name },
            })) => {
                assert_eq!(id, "1a2b");
                assert_eq!(name.join(" "), "Trip plans");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_threads_rename_requires_name() {
        assert!(Cli::try_parse_from(["parley", "threads", "rename", "1a2b"]).is_err());
    }
}
