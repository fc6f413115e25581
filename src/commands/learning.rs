//! Feedback, optimization and insights handlers

use colored::Colorize;
use prettytable::{format, Table};
use uuid::Uuid;

use super::strategy_label;
use crate::config::Config;
use crate::error::{Result, RouterError};
use crate::learning::{LearningInsights, OptimizationReport, Polarity};
use crate::orchestrator::Orchestrator;

/// Records feedback on a stored assistant reply
///
/// # Errors
///
/// Returns error if the id or polarity cannot be parsed, or the message
/// is not a known assistant reply
pub fn run_feedback(
    config: &Config,
    message_id: &str,
    polarity: &str,
    comment: Option<String>,
) -> Result<()> {
    let message_id = Uuid::parse_str(message_id)
        .map_err(|e| RouterError::Config(format!("Invalid message id '{}': {}", message_id, e)))?;
    let polarity = Polarity::parse_str(polarity).ok_or_else(|| {
        RouterError::Config(format!(
            "Invalid polarity '{}', expected good or bad",
            polarity
        ))
    })?;

    let orchestrator = Orchestrator::from_config(config)?;
    let record = orchestrator.record_feedback(message_id, polarity, comment)?;

    println!(
        "{}",
        format!("Feedback {} registrado ({})", record.polarity, record.id).green()
    );
    Ok(())
}

/// Runs one optimization pass and prints what changed
///
/// # Errors
///
/// Returns error if another optimization is running or storage fails
pub fn run_optimize(config: &Config, json: bool) -> Result<()> {
    let orchestrator = Orchestrator::from_config(config)?;
    let report = orchestrator.optimize()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

/// Prints accumulated learning insights
///
/// # Errors
///
/// Returns error if stored counts cannot be read
pub fn run_insights(config: &Config, json: bool) -> Result<()> {
    let orchestrator = Orchestrator::from_config(config)?;
    let insights = orchestrator.insights()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&insights)?);
    } else {
        print_insights(&insights);
    }
    Ok(())
}

fn print_report(report: &OptimizationReport) {
    if report.problematic_patterns > 0 {
        println!(
            "{}",
            format!(
                "{} padroes com taxa de acerto abaixo de 70%",
                report.problematic_patterns
            )
            .yellow()
        );
    }

    if report.is_empty() {
        println!(
            "{}",
            format!(
                "Nada a otimizar ({} padroes mantidos).",
                report.patterns_retained
            )
            .yellow()
        );
        return;
    }

    println!("{}", "Otimizacao concluida".green().bold());
    println!("  padroes removidos:      {}", report.patterns_pruned.len());
    println!("  padroes mantidos:       {}", report.patterns_retained);
    println!("  taxas recalculadas:     {}", report.rates_recomputed);
    println!("  feedbacks expirados:    {}", report.feedback_pruned);
    println!("  decisoes expiradas:     {}", report.decisions_expired);
    println!("  referencias aprendidas: {}", report.references_added);
    if !report.patterns_pruned.is_empty() {
        println!("  {}", report.patterns_pruned.join(", ").dimmed());
    }
}

/// Prints learning insights as tables
pub fn print_insights(insights: &LearningInsights) {
    println!(
        "\n{} padroes ({} maduros)",
        insights.total_patterns.to_string().bold(),
        insights.mature_patterns
    );

    let rate = insights
        .overall_success_rate()
        .map(|r| format!("{:.0}%", r * 100.0))
        .unwrap_or_else(|| "-".to_string());
    println!(
        "Feedback: {} positivos, {} negativos (taxa de acerto {})",
        insights.feedback.positive, insights.feedback.negative, rate
    );

    if !insights.messages_by_strategy.is_empty() {
        let by_strategy: Vec<String> = insights
            .messages_by_strategy
            .iter()
            .map(|(strategy, count)| format!("{} {}", strategy_label(*strategy), count))
            .collect();
        println!("Respostas: {}", by_strategy.join(" · "));
    }

    if insights.top_patterns.is_empty() {
        println!();
        return;
    }

    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
    table.add_row(prettytable::row![
        "Padrao".bold(),
        "Observacoes".bold(),
        "Taxa".bold(),
        "Preferida".bold()
    ]);
    for pattern in &insights.top_patterns {
        let preferred = pattern
            .preferred
            .map(strategy_label)
            .unwrap_or_else(|| "-".to_string());
        table.add_row(prettytable::row![
            pattern.key.cyan(),
            pattern.observations,
            format!("{:.2}", pattern.success_rate),
            preferred
        ]);
    }

    println!();
    table.printstd();
    println!();
}
