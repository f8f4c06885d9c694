use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "deskmate")]
#[command(about = "Chat assistant for local files and Gmail, with approval before every action", long_about = None)]
#[command(version)]
pub(crate) struct Cli {
    /// Config file (default: <config dir>/deskmate/config.json)
    #[arg(long, global = true)]
    pub(crate) config: Option<PathBuf>,
    /// Debug logging to stderr (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    pub(crate) verbose: bool,
    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Start an interactive session.
    Chat {
        /// Continue an archived session by id
        #[arg(long)]
        resume: Option<String>,
    },

    /// Inspect archived sessions.
    Sessions {
        #[command(subcommand)]
        command: SessionsCommand,
    },

    /// Manage the config file.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// List the tools the assistant can propose.
    Tools {
        /// Output full JSON definitions
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub(crate) enum SessionsCommand {
    /// Most recent sessions first.
    List {
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
    /// Print one session's transcript.
    Show {
        id: String,
        /// Output the archived document as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub(crate) enum ConfigCommand {
    /// Write a config file with every default filled in.
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
