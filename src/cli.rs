//! Command-line interface definition for the warehouse router
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for asking questions, interactive chat, feedback,
//! learning maintenance and chat history.

use clap::{Parser, Subcommand};

/// Warehouse router - questions to SQL, documents or conversation
///
/// Classifies each question, answers it with the matching strategy and
/// learns from feedback which strategy fits which kind of question.
#[derive(Parser, Debug, Clone)]
#[command(name = "warehouse-router")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,

    /// Override the chat history database path
    #[arg(long, env = "WAREHOUSE_ROUTER_HISTORY_DB")]
    pub storage_path: Option<String>,

    /// Override the warehouse database path
    #[arg(long)]
    pub warehouse_db: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Ask a single question and print the answer
    Ask {
        /// The question
        question: String,

        /// Session to continue (full id or unique prefix)
        #[arg(short, long)]
        session: Option<String>,

        /// Print the full response envelope as JSON
        #[arg(long)]
        json: bool,
    },

    /// Start an interactive chat session
    Chat {
        /// Session to resume (full id or unique prefix)
        #[arg(short, long)]
        resume: Option<String>,
    },

    /// Rate an assistant reply
    Feedback {
        /// Identifier of the assistant message
        message_id: String,

        /// good or bad
        polarity: String,

        /// Optional comment stored with the feedback
        #[arg(short, long)]
        comment: Option<String>,
    },

    /// Prune stale patterns and recompute success rates
    Optimize {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show what the router has learned
    Insights {
        /// Print the insights as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the strategy a question would be routed to
    Classify {
        /// The question
        question: String,
    },

    /// Manage chat history
    History {
        /// History subcommand
        #[command(subcommand)]
        command: HistoryCommand,
    },
}

/// Chat history subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum HistoryCommand {
    /// List stored chat sessions
    List,

    /// Show the messages of a session
    Show {
        /// Session id or unique prefix
        id: String,
    },

    /// Delete a session
    Delete {
        /// Session id or unique prefix
        id: String,
    },
}

impl Cli {
    /// Parse command line arguments
    ///
    /// # Returns
    ///
    /// Returns the parsed CLI structure
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: Some("config/config.yaml".to_string()),
            verbose: false,
            json_logs: false,
            storage_path: None,
            warehouse_db: None,
            command: Commands::Insights { json: false },
        }
    }
}
