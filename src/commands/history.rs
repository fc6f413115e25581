use std::sync::Arc;

use colored::Colorize;
use prettytable::{format, Table};

use super::{open_storage, resolve_session, strategy_label};
use crate::cli::HistoryCommand;
use crate::config::Config;
use crate::error::{Result, RouterError};
use crate::session::{Role, SessionManager, SessionStatus};
use crate::storage::{ChatStore, SqliteStorage};

/// Handle history commands
pub fn handle_history(config: &Config, command: HistoryCommand) -> Result<()> {
    let storage = open_storage(config)?;

    match command {
        HistoryCommand::List => list(&storage)?,
        HistoryCommand::Show { id } => {
            let id = resolve_session(&storage, &id)?;
            let session = storage
                .load_sessions()?
                .into_iter()
                .find(|s| s.id == id)
                .ok_or_else(|| RouterError::session_unavailable(id, "unknown session"))?;

            println!(
                "\n{} {} [{}] {}/{} interacoes",
                session.id.to_string().cyan(),
                session.title.bold(),
                status_label(session.status),
                session.interactions,
                config.session.max_interactions
            );
            if let Some(next) = session.successor {
                println!("{}", format!("continua em {}", next).dimmed());
            }
            println!();

            for message in &session.messages {
                match message.role {
                    Role::User => println!("{} {}", "voce:".bold(), message.content),
                    Role::Assistant => {
                        let strategy = message
                            .strategy
                            .map(strategy_label)
                            .unwrap_or_else(|| "-".to_string());
                        println!(
                            "{} [{} {}ms] {}",
                            "router:".bold(),
                            strategy,
                            message.execution_ms.unwrap_or(0),
                            message.content
                        );
                        println!("{}", format!("  id {}", message.id).dimmed());
                    }
                }
            }
            println!();
        }
        HistoryCommand::Delete { id } => {
            let id = resolve_session(&storage, &id)?;
            let store: Arc<dyn ChatStore> = Arc::new(storage);
            let sessions = SessionManager::with_store(config.session.clone(), store)?;
            sessions.delete_session(id)?;
            println!("{}", format!("Deleted session {}", id).green());
        }
    }

    Ok(())
}

fn list(storage: &SqliteStorage) -> Result<()> {
    let sessions = storage.list_sessions()?;

    if sessions.is_empty() {
        println!("{}", "No chat history found.".yellow());
        return Ok(());
    }

    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);

    table.add_row(prettytable::row![
        "ID".bold(),
        "Title".bold(),
        "Status".bold(),
        "Interactions".bold(),
        "Messages".bold(),
        "Last Updated".bold()
    ]);

    for session in sessions {
        let id = session.id.to_string();
        let title = if session.title.chars().count() > 40 {
            format!("{}...", session.title.chars().take(37).collect::<String>())
        } else {
            session.title
        };
        let updated = session.updated_at.format("%Y-%m-%d %H:%M").to_string();

        table.add_row(prettytable::row![
            id[..8].cyan(),
            title,
            status_label(session.status),
            session.interactions,
            session.message_count,
            updated
        ]);
    }

    println!("\nChat History:");
    table.printstd();
    println!();
    println!(
        "Use {} to resume a session.",
        "warehouse-router chat --resume <ID>".cyan()
    );
    println!();
    Ok(())
}

fn status_label(status: SessionStatus) -> String {
    match status {
        SessionStatus::Active => status.as_str().green().to_string(),
        SessionStatus::Rotated => status.as_str().yellow().to_string(),
        SessionStatus::Deleted => status.as_str().red().to_string(),
    }
}
