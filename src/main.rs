//! Warehouse router CLI
//!
//! Main entry point for the warehouse router application.

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use warehouse_router::cli::{Cli, Commands};
use warehouse_router::commands;
use warehouse_router::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    init_tracing(cli.verbose, cli.json_logs);

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;

    // Validate configuration
    config.validate()?;

    match cli.command {
        Commands::Ask {
            question,
            session,
            json,
        } => {
            tracing::info!("Starting ask command");
            commands::ask::run_ask(&config, &question, session.as_deref(), json).await
        }
        Commands::Chat { resume } => {
            tracing::info!("Starting interactive chat mode");
            if let Some(r) = &resume {
                tracing::debug!("Resuming session: {}", r);
            }
            commands::chat::run_chat(&config, resume.as_deref()).await
        }
        Commands::Feedback {
            message_id,
            polarity,
            comment,
        } => commands::learning::run_feedback(&config, &message_id, &polarity, comment),
        Commands::Optimize { json } => commands::learning::run_optimize(&config, json),
        Commands::Insights { json } => commands::learning::run_insights(&config, json),
        Commands::Classify { question } => commands::ask::run_classify(&config, &question),
        Commands::History { command } => {
            tracing::info!("Starting history command");
            commands::history::handle_history(&config, command)
        }
    }
}

/// Initialize tracing subscriber with environment filter
fn init_tracing(verbose: bool, json: bool) {
    let default_level = if verbose {
        "warehouse_router=debug"
    } else {
        "warehouse_router=info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
