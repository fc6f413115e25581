//! Single question handler
//!
//! `ask` sends one question through the full pipeline, continuing an
//! existing session or starting a new one. `classify` only shows where a
//! question would be routed.

use colored::Colorize;

use super::{print_envelope, resolve_session, strategy_label};
use crate::config::Config;
use crate::error::Result;
use crate::orchestrator::Orchestrator;

/// Answers one question
///
/// # Arguments
///
/// * `config` - Global configuration
/// * `question` - The question to answer
/// * `session` - Optional session id or prefix to continue
/// * `json` - Print the full response envelope as JSON
///
/// # Errors
///
/// Returns error if the session is unavailable or the strategy fails
pub async fn run_ask(
    config: &Config,
    question: &str,
    session: Option<&str>,
    json: bool,
) -> Result<()> {
    let orchestrator = Orchestrator::from_config(config)?;

    let session_id = match session {
        Some(prefix) => resolve_session(&super::open_storage(config)?, prefix)?,
        None => orchestrator.create_session(Some(&title_from(question)))?.id,
    };

    let envelope = orchestrator.handle(session_id, question).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&envelope)?);
    } else {
        println!("{}", format!("sessao {}", envelope.session_id).dimmed());
        print_envelope(&envelope);
    }
    Ok(())
}

/// Prints the routing decision for a question without answering it
///
/// # Errors
///
/// Returns error if the pattern archive cannot be opened
pub fn run_classify(config: &Config, question: &str) -> Result<()> {
    let orchestrator = Orchestrator::from_config(config)?;
    let decision = orchestrator.classify(question);

    println!(
        "{} (confianca {:.2})",
        strategy_label(decision.strategy),
        decision.confidence
    );
    println!(
        "  sql={:.3} retrieval={:.3} general={:.3}",
        decision.scores.sql, decision.scores.retrieval, decision.scores.general
    );
    if !decision.matched_patterns.is_empty() {
        println!("  padroes: {}", decision.matched_patterns.join(", "));
    }
    println!("  motivo: {}", decision.rationale.join(", ").dimmed());
    Ok(())
}

/// Session title derived from the first question
pub(crate) fn title_from(question: &str) -> String {
    const MAX_TITLE_CHARS: usize = 50;

    let trimmed = question.trim();
    if trimmed.chars().count() <= MAX_TITLE_CHARS {
        trimmed.to_string()
    } else {
        let cut: String = trimmed.chars().take(MAX_TITLE_CHARS - 3).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_from_short_question() {
        assert_eq!(title_from("  Quantos clientes? "), "Quantos clientes?");
    }

    #[test]
    fn test_title_from_long_question_is_truncated() {
        let question = "Qual foi a receita total por cliente em cada trimestre do último ano fiscal?";
        let title = title_from(question);
        assert_eq!(title.chars().count(), 50);
        assert!(title.ends_with("..."));
    }
}
