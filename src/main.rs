// Module declarations
mod error;
mod types;
mod util;
mod config;
mod prompt;
mod tool_args;
mod tool_defs;
mod tool_exec;
mod file_ops;
mod gmail;
mod email_ops;
mod model;
mod agent;
mod archive;
mod logging;
mod console;
mod cli;

// Every module's items are re-exported at the crate root, so modules refer to
// each other through `super::`.
#[allow(unused_imports)]
pub(crate) use error::*;
#[allow(unused_imports)]
pub(crate) use types::*;
#[allow(unused_imports)]
pub(crate) use util::*;
#[allow(unused_imports)]
pub(crate) use config::*;
#[allow(unused_imports)]
pub(crate) use prompt::*;
#[allow(unused_imports)]
pub(crate) use tool_args::*;
#[allow(unused_imports)]
pub(crate) use tool_defs::*;
#[allow(unused_imports)]
pub(crate) use tool_exec::*;
#[allow(unused_imports)]
pub(crate) use file_ops::*;
#[allow(unused_imports)]
pub(crate) use gmail::*;
#[allow(unused_imports)]
pub(crate) use email_ops::*;
#[allow(unused_imports)]
pub(crate) use model::*;
#[allow(unused_imports)]
pub(crate) use agent::*;
#[allow(unused_imports)]
pub(crate) use archive::*;
#[allow(unused_imports)]
pub(crate) use logging::*;
#[allow(unused_imports)]
pub(crate) use console::*;
#[allow(unused_imports)]
pub(crate) use cli::*;

use std::io;

use clap::Parser;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    // `config init` must work while the existing file is malformed.
    let config = match cli.command {
        Command::Config { .. } => AppConfig::default(),
        _ => load_app_config(cli.config.as_deref())?,
    };

    match cli.command {
        Command::Chat { resume } => {
            let archive = match open_archive(&config) {
                Ok(archive) => archive,
                Err(err) if resume.is_none() => {
                    tracing::warn!(error = %err, "session archive unavailable");
                    eprintln!("Warning: session archive unavailable, this session will not be saved: {err}");
                    None
                }
                Err(err) => return Err(err.into()),
            };

            let mut session = match resume {
                Some(id) => {
                    let Some(archive) = archive.as_ref() else {
                        eprintln!("Cannot resume: the session archive is disabled.");
                        std::process::exit(2);
                    };
                    let Some(doc) = archive.load(&id)? else {
                        eprintln!("No archived session with id {id}");
                        std::process::exit(2);
                    };
                    Session::from_document(doc)?
                }
                None => Session::new(),
            };

            let registry = ToolRegistry::new(build_tool_context(&config));
            let model = build_model(&config.model)?;
            let agent = Agent::new(&registry, model.as_ref(), resolve_system_prompt(&config));
            let mut reader = EditorReader::new()?;
            let mut console = Console::new(
                &agent,
                archive.as_ref().map(|a| a as &dyn SessionArchive),
                io::stdout(),
            );
            console.run(&mut reader, &mut session)?;
            Ok(())
        }

        Command::Sessions { command } => {
            let Some(archive) = open_archive(&config)? else {
                eprintln!("The session archive is disabled (archive.enabled = false).");
                std::process::exit(2);
            };
            match command {
                SessionsCommand::List { limit, json } => {
                    let sessions = archive.list(limit)?;
                    if json {
                        println!("{}", serde_json::to_string_pretty(&sessions)?);
                        return Ok(());
                    }
                    if sessions.is_empty() {
                        println!("No archived sessions.");
                        return Ok(());
                    }
                    for s in sessions {
                        let first = s
                            .first_input
                            .as_deref()
                            .map(|t| truncate_chars(t, 60))
                            .unwrap_or_default();
                        println!(
                            "{}  {}  {:<11} {:>4} msgs  {}",
                            s.session_id,
                            s.session_start.format("%Y-%m-%d %H:%M"),
                            s.status.as_str(),
                            s.total_messages,
                            first
                        );
                    }
                    Ok(())
                }
                SessionsCommand::Show { id, json } => {
                    let Some(doc) = archive.load(&id)? else {
                        eprintln!("No archived session with id {id}");
                        std::process::exit(2);
                    };
                    if json {
                        println!("{}", serde_json::to_string_pretty(&doc)?);
                        return Ok(());
                    }
                    println!("Session {}", doc.session_id);
                    println!("Started:  {}", doc.session_start.to_rfc3339());
                    if let Some(end) = doc.session_end {
                        println!("Ended:    {}", end.to_rfc3339());
                    }
                    println!("Status:   {}", doc.status.as_str());
                    println!("Messages: {}", doc.total_messages);
                    if let Some(pending) = &doc.pending_approval {
                        println!("Pending approval: {} call(s)", pending.invocations.len());
                    }
                    println!();
                    write_transcript(&mut io::stdout(), &doc.conversation_history)?;
                    Ok(())
                }
            }
        }

        Command::Config {
            command: ConfigCommand::Init { force },
        } => {
            let path = init_config_file(cli.config.as_deref(), force)?;
            println!("Wrote {}", path.display());
            Ok(())
        }

        Command::Tools { json } => {
            let paths = PathResolver::from_system(config.paths.desktop_dir.clone());
            let registry = ToolRegistry::new(ToolContext::new(paths, None));
            if json {
                println!("{}", serde_json::to_string_pretty(&registry.definitions())?);
                return Ok(());
            }
            for tool in registry.tools() {
                let marker = if tool.mutating { "*" } else { " " };
                println!("{marker} {:<34} {}", tool.name, tool.description);
            }
            println!("\n* modifies files or mail");
            Ok(())
        }
    }
}

fn open_archive(config: &AppConfig) -> Result<Option<SqliteArchive>, ArchiveError> {
    if !config.archive.enabled {
        return Ok(None);
    }
    SqliteArchive::open_or_create(&config.archive.resolved_path()).map(Some)
}

/// Email tools stay registered without a mailbox; they fail with the reason.
fn build_tool_context(config: &AppConfig) -> ToolContext {
    let paths = PathResolver::from_system(config.paths.desktop_dir.clone());
    if !config.gmail.enabled {
        return ToolContext::new(paths, None).with_mailbox_error("disabled in config (gmail.enabled = false)");
    }
    match GmailClient::from_config(&config.gmail) {
        Ok(client) => ToolContext::new(paths, Some(Box::new(client))),
        Err(reason) => {
            tracing::warn!(%reason, "Gmail unavailable; email tools will report it");
            ToolContext::new(paths, None).with_mailbox_error(reason)
        }
    }
}
