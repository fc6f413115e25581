//! Command handlers for the CLI
//!
//! Each handler builds what it needs from the configuration and drives
//! the library components:
//!
//! - `ask`: Single question and dry-run classification
//! - `chat`: Interactive chat loop with inline feedback
//! - `learning`: Feedback, optimization and insights
//! - `history`: Stored session listing, display and deletion

use colored::Colorize;

use crate::classifier::Strategy;
use crate::config::Config;
use crate::error::{Result, RouterError};
use crate::executors::PayloadData;
use crate::orchestrator::ResponseEnvelope;
use crate::session::SessionId;
use crate::storage::SqliteStorage;

pub mod ask;
pub mod chat;
pub mod history;
pub mod learning;
pub mod special_commands;

/// Opens the chat history database named by the configuration
///
/// # Errors
///
/// Returns error if the database cannot be opened or initialized
pub fn open_storage(config: &Config) -> Result<SqliteStorage> {
    match &config.storage.history_db {
        Some(path) => SqliteStorage::new_with_path(path),
        None => SqliteStorage::new(),
    }
}

/// Resolves a full session id or unique prefix against stored sessions
///
/// # Errors
///
/// Returns `RouterError::SessionUnavailable` if nothing matches
pub fn resolve_session(storage: &SqliteStorage, id: &str) -> Result<SessionId> {
    storage
        .resolve_session_id(id)?
        .ok_or_else(|| RouterError::session_unavailable(id, "no stored session matches").into())
}

/// Colored label for a strategy
pub(crate) fn strategy_label(strategy: Strategy) -> String {
    let label = strategy.as_str().to_uppercase();
    match strategy {
        Strategy::Sql => label.cyan().to_string(),
        Strategy::Retrieval => label.magenta().to_string(),
        Strategy::General => label.green().to_string(),
    }
}

/// Prints an answer the way `ask` and `chat` show it
pub(crate) fn print_envelope(envelope: &ResponseEnvelope) {
    println!(
        "{} {} ({}ms, confianca {:.2})",
        "▶".bold(),
        strategy_label(envelope.strategy()),
        envelope.elapsed_ms,
        envelope.decision.confidence
    );
    println!("{}", envelope.payload.text);

    if let PayloadData::Rows { query, rows, .. } = &envelope.payload.data {
        println!("{}", format!("({} linhas de {})", rows.len(), query).dimmed());
    }

    println!(
        "{}",
        format!(
            "mensagem {} · interacao {}",
            envelope.message.id, envelope.interactions
        )
        .dimmed()
    );

    if let Some(next) = envelope.next_session {
        println!(
            "{}",
            format!(
                "Limite de mensagens atingido. As proximas perguntas vao para a sessao {}.",
                next
            )
            .yellow()
        );
    }
}
