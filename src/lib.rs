//! Warehouse router - question routing library
//!
//! Routes natural-language questions about a company's data warehouse to
//! one of three strategies (SQL analytics, document retrieval or general
//! conversation), keeps conversations in bounded chat sessions and learns
//! from user feedback which strategy suits which kind of question.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `classifier`: Feature extraction and strategy selection
//! - `patterns`: Learned query patterns and their copy-on-write store
//! - `learning`: Feedback application, optimization and insights
//! - `session`: Bounded chat sessions with rotation
//! - `executors`: SQL, retrieval and conversation executors
//! - `orchestrator`: The per-message pipeline tying it all together
//! - `storage`: SQLite persistence for chats, messages and feedback
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli` and `commands`: Command-line interface
//!
//! # Example
//!
//! ```no_run
//! use warehouse_router::{Config, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config/config.yaml", &Default::default())?;
//!     config.validate()?;
//!
//!     let router = Orchestrator::from_config(&config)?;
//!     let session = router.create_session(None)?;
//!     let reply = router.handle(session.id, "Quantos clientes temos?").await?;
//!     println!("{}", reply.payload.text);
//!     Ok(())
//! }
//! ```

pub mod classifier;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod executors;
pub mod learning;
pub mod orchestrator;
pub mod patterns;
pub mod session;
pub mod storage;

// Re-export commonly used types
pub use classifier::{ClassificationDecision, Classifier, Strategy};
pub use config::Config;
pub use error::{Result, RouterError};
pub use learning::{FeedbackRecord, LearningSystem, Polarity};
pub use orchestrator::{Orchestrator, ResponseEnvelope};
pub use session::{ChatSession, Message, SessionManager};

#[cfg(test)]
pub mod test_utils;
