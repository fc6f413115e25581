//! Strategy executors
//!
//! Each [`Strategy`] has one executor behind the [`StrategyExecutor`]
//! trait. The orchestrator picks the executor by the strategy tag through
//! [`ExecutorSet::for_strategy`] and applies its timeout and retry policy
//! based on the [`ExecutorError`] variant.

pub mod general;
pub mod retrieval;
pub mod sql;

pub use general::OllamaExecutor;
pub use retrieval::{
    KeywordIndex, KnowledgeBase, KnowledgeDocument, Passage, PassageSearch, RetrievalExecutor,
};
pub use sql::{AnalyticsCatalog, CatalogQuery, SqliteAnalyticsExecutor};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::classifier::Strategy;
use crate::session::{Message, SessionId};

/// Failure of a single executor call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutorError {
    /// Timeout or temporarily unavailable backend; retried once
    #[error("transient: {0}")]
    Transient(String),

    /// Malformed request or nothing the executor can do; never retried
    #[error("permanent: {0}")]
    Permanent(String),
}

impl ExecutorError {
    /// Whether a retry may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, ExecutorError::Transient(_))
    }

    /// Label used for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            ExecutorError::Transient(_) => "transient",
            ExecutorError::Permanent(_) => "permanent",
        }
    }
}

/// Structured part of an executor result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PayloadData {
    /// Plain conversational text only
    None,
    /// Rows from a named analytical query
    Rows {
        /// Catalog query that ran
        query: String,
        /// Column names in order
        columns: Vec<String>,
        /// Row values in column order
        rows: Vec<Vec<serde_json::Value>>,
    },
    /// Retrieved passages with relevance scores
    Passages {
        /// Best passages first
        passages: Vec<Passage>,
    },
}

/// Result of a successful executor call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    /// Human-readable answer
    pub text: String,
    /// Structured data behind the answer
    pub data: PayloadData,
}

impl Payload {
    /// A text-only payload
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            data: PayloadData::None,
        }
    }
}

/// What an executor may see of the conversation
///
/// Only messages of the session the request belongs to are included.
#[derive(Debug, Clone)]
pub struct SessionContext {
    /// Session the request belongs to
    pub session_id: SessionId,
    /// Recent messages of that session, oldest first
    pub history: Vec<Message>,
}

/// Contract every strategy executor satisfies
#[async_trait]
pub trait StrategyExecutor: Send + Sync {
    /// Performs the strategy for one message
    async fn execute(
        &self,
        content: &str,
        context: &SessionContext,
    ) -> std::result::Result<Payload, ExecutorError>;
}

/// One executor per strategy
#[derive(Clone)]
pub struct ExecutorSet {
    /// Analytical SQL executor
    pub sql: Arc<dyn StrategyExecutor>,
    /// Document retrieval executor
    pub retrieval: Arc<dyn StrategyExecutor>,
    /// General conversation executor
    pub general: Arc<dyn StrategyExecutor>,
}

impl ExecutorSet {
    /// Returns the executor for a strategy
    pub fn for_strategy(&self, strategy: Strategy) -> &Arc<dyn StrategyExecutor> {
        match strategy {
            Strategy::Sql => &self.sql,
            Strategy::Retrieval => &self.retrieval,
            Strategy::General => &self.general,
        }
    }
}
