//! Per-message pipeline
//!
//! [`Orchestrator::handle`] runs one message through a linear pipeline:
//!
//! 1. Admit the message into its session (may rotate the session).
//! 2. Classify it against the current pattern snapshot.
//! 3. Dispatch to the executor of the chosen strategy with the session's
//!    recent messages, under a timeout. A transient failure is retried
//!    once; a failure after that surfaces as
//!    `RouterError::StrategyExecutionFailed` and is never replaced by
//!    another strategy.
//! 4. Record the assistant reply, archive the decision for feedback and
//!    record the execution outcome in the pattern store.
//!
//! Messages in different sessions run fully in parallel; messages in the
//! same session serialize on that session's admission.

pub mod metrics;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::classifier::{ClassificationDecision, Classifier, Strategy};
use crate::config::Config;
use crate::error::{Result, RouterError};
use crate::executors::{
    ExecutorError, ExecutorSet, KeywordIndex, KnowledgeBase, OllamaExecutor, Payload,
    RetrievalExecutor, SessionContext, SqliteAnalyticsExecutor, StrategyExecutor,
};
use crate::learning::{
    Exchange, FeedbackRecord, LearningInsights, LearningSystem, OptimizationReport,
    PatternArchive, Polarity,
};
use crate::session::{
    AdmitResult, ChatSession, Message, MessageId, Role, SessionId, SessionManager,
};
use crate::storage::{default_data_dir, ChatStore, SqliteStorage};
use self::metrics::DispatchMetrics;

/// Everything produced by handling one message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// Session the message was admitted into
    pub session_id: SessionId,
    /// Identifier of the recorded user message
    pub user_message_id: MessageId,
    /// The assistant reply, tagged with strategy and execution time
    pub message: Message,
    /// Classification behind the reply
    pub decision: ClassificationDecision,
    /// Executor output
    pub payload: Payload,
    /// Time from admission to reply
    pub elapsed_ms: u64,
    /// Interaction counter of the session after this message
    pub interactions: usize,
    /// Session that receives the next message, when this one rotated
    pub next_session: Option<SessionId>,
}

impl ResponseEnvelope {
    /// Strategy that produced the reply
    pub fn strategy(&self) -> Strategy {
        self.decision.strategy
    }

    /// Whether the session rotated on this message
    pub fn rotated(&self) -> bool {
        self.next_session.is_some()
    }
}

/// Composes session admission, classification, dispatch and learning
pub struct Orchestrator {
    sessions: SessionManager,
    classifier: Classifier,
    learning: LearningSystem,
    executors: ExecutorSet,
    store: Option<Arc<dyn ChatStore>>,
    timeout: Duration,
}

impl Orchestrator {
    /// Creates an orchestrator from its parts
    ///
    /// # Arguments
    ///
    /// * `config` - Classifier vocabulary and executor timeout
    /// * `sessions` - Session lifecycle manager
    /// * `learning` - Learning system owning the pattern store
    /// * `executors` - One executor per strategy
    pub fn new(
        config: &Config,
        sessions: SessionManager,
        learning: LearningSystem,
        executors: ExecutorSet,
    ) -> Self {
        Self {
            sessions,
            classifier: Classifier::new(&config.classifier, config.learning.min_observations),
            learning,
            executors,
            store: None,
            timeout: Duration::from_secs(config.executors.timeout_seconds),
        }
    }

    /// Uses `store` to resolve feedback for replies from earlier runs
    pub fn with_store(mut self, store: Arc<dyn ChatStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Builds a fully wired orchestrator from configuration
    ///
    /// Opens the chat history database and the pattern archive, restores
    /// sessions and patterns, and creates the SQL, retrieval and Ollama
    /// executors.
    ///
    /// # Errors
    ///
    /// Returns error if a database cannot be opened or the knowledge file
    /// cannot be loaded
    pub fn from_config(config: &Config) -> Result<Self> {
        let storage = match &config.storage.history_db {
            Some(path) => SqliteStorage::new_with_path(path)?,
            None => SqliteStorage::new()?,
        };
        let store: Arc<dyn ChatStore> = Arc::new(storage);

        let patterns_path = match &config.storage.patterns_db {
            Some(path) => PathBuf::from(path),
            None => default_data_dir()?.join("patterns"),
        };
        let archive = PatternArchive::open(patterns_path)?;
        let index = Arc::new(match &config.executors.knowledge_path {
            Some(path) => KeywordIndex::from_file(path)?,
            None => KeywordIndex::builtin(),
        });
        let learning = LearningSystem::with_archive(config.learning.clone(), archive)?
            .with_chat_store(Arc::clone(&store))
            .with_knowledge(Arc::clone(&index) as Arc<dyn KnowledgeBase>)?;

        let sessions = SessionManager::with_store(config.session.clone(), Arc::clone(&store))?;

        let timeout = Duration::from_secs(config.executors.timeout_seconds);
        let sql = SqliteAnalyticsExecutor::new(&config.executors.warehouse_db)
            .map_err(|e| RouterError::Config(e.to_string()))?;
        let executors = ExecutorSet {
            sql: Arc::new(sql),
            retrieval: Arc::new(RetrievalExecutor::new(
                index,
                config.executors.retrieval_top_k,
            )),
            general: Arc::new(OllamaExecutor::new(config.executors.ollama.clone(), timeout)?),
        };

        Ok(Self::new(config, sessions, learning, executors).with_store(store))
    }

    /// Session lifecycle manager
    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Learning system
    pub fn learning(&self) -> &LearningSystem {
        &self.learning
    }

    /// Classifier
    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Creates a new active session
    ///
    /// # Errors
    ///
    /// Returns error if the session cannot be persisted
    pub fn create_session(&self, title: Option<&str>) -> Result<ChatSession> {
        self.sessions.create_session(title)
    }

    /// Classifies a message without admitting or dispatching it
    pub fn classify(&self, content: &str) -> ClassificationDecision {
        self.classifier.classify(content, &self.learning.snapshot())
    }

    /// Handles one user message
    ///
    /// # Errors
    ///
    /// - `RouterError::SessionUnavailable` if the session is unknown,
    ///   deleted or already rotated
    /// - `RouterError::StrategyExecutionFailed` if the executor failed
    ///   permanently, or transiently twice
    /// - storage errors from recording the exchange
    pub async fn handle(&self, session_id: SessionId, content: &str) -> Result<ResponseEnvelope> {
        let started = Instant::now();

        let (admitted, next_session) = match self.sessions.admit(session_id, content)? {
            AdmitResult::Accepted(admitted) => (admitted, None),
            AdmitResult::AcceptedWithRotation {
                admitted,
                next_session,
            } => (admitted, Some(next_session)),
            AdmitResult::Rejected(reason) => {
                warn!(session_id = %session_id, reason = %reason.describe(), "Message rejected");
                return Err(RouterError::session_unavailable(session_id, reason.describe()).into());
            }
        };

        let decision = self.classify(content);
        let strategy = decision.strategy;
        info!(
            session_id = %session_id,
            strategy = %strategy,
            confidence = decision.confidence,
            matched_patterns = decision.matched_patterns.len(),
            "Message classified"
        );
        debug!(rationale = ?decision.rationale, scores = ?decision.scores, "Classification detail");

        let context = SessionContext {
            session_id,
            history: admitted.context,
        };
        let dispatch = DispatchMetrics::new(strategy);
        let executor = self.executors.for_strategy(strategy);

        let payload = match self.dispatch(executor, content, &context, &dispatch).await {
            Ok(payload) => payload,
            Err(error) => {
                dispatch.record_failure();
                warn!(
                    session_id = %session_id,
                    strategy = %strategy,
                    error = %error,
                    "Strategy execution failed"
                );
                if let Err(observe_error) =
                    self.learning.observe(&decision.signature, strategy, false)
                {
                    warn!("Failed to record execution outcome: {}", observe_error);
                }
                return Err(RouterError::StrategyExecutionFailed {
                    strategy,
                    cause: error.to_string(),
                }
                .into());
            }
        };
        dispatch.record_success();

        let elapsed = started.elapsed();
        let reply = Message::assistant(session_id, payload.text.clone(), strategy, elapsed);
        self.sessions.record_reply(&reply)?;
        let exchange = Exchange {
            question: content.to_string(),
            answer: reply.content.clone(),
        };
        self.learning
            .archive(reply.id, decision.signature.clone(), strategy, Some(exchange))?;
        self.learning.observe(&decision.signature, strategy, true)?;

        info!(
            session_id = %session_id,
            strategy = %strategy,
            elapsed_ms = elapsed.as_millis() as u64,
            rotated = next_session.is_some(),
            "Message handled"
        );

        Ok(ResponseEnvelope {
            session_id,
            user_message_id: admitted.message.id,
            message: reply,
            decision,
            payload,
            elapsed_ms: elapsed.as_millis() as u64,
            interactions: admitted.interactions,
            next_session,
        })
    }

    /// Runs the executor, retrying one transient failure
    async fn dispatch(
        &self,
        executor: &Arc<dyn StrategyExecutor>,
        content: &str,
        context: &SessionContext,
        dispatch: &DispatchMetrics,
    ) -> std::result::Result<Payload, ExecutorError> {
        match self.attempt(executor, content, context).await {
            Ok(payload) => Ok(payload),
            Err(error) if error.is_transient() => {
                dispatch.record_attempt_failure(error.kind());
                dispatch.record_retry();
                warn!(
                    strategy = %dispatch.strategy(),
                    error = %error,
                    "Transient executor failure, retrying once"
                );
                let retried = self.attempt(executor, content, context).await;
                if let Err(error) = &retried {
                    dispatch.record_attempt_failure(error.kind());
                }
                retried
            }
            Err(error) => {
                dispatch.record_attempt_failure(error.kind());
                Err(error)
            }
        }
    }

    async fn attempt(
        &self,
        executor: &Arc<dyn StrategyExecutor>,
        content: &str,
        context: &SessionContext,
    ) -> std::result::Result<Payload, ExecutorError> {
        match tokio::time::timeout(self.timeout, executor.execute(content, context)).await {
            Ok(result) => result,
            Err(_) => Err(ExecutorError::Transient(format!(
                "timed out after {}ms",
                self.timeout.as_millis()
            ))),
        }
    }

    /// Records feedback on an assistant reply
    ///
    /// Replies handled by this process are found in the decision archive.
    /// Older replies are resolved from storage: the originating question
    /// is the user message preceding the reply in the same session.
    ///
    /// # Errors
    ///
    /// - `RouterError::FeedbackTargetUnknown` if the message cannot be found
    /// - `RouterError::InvalidFeedbackTarget` if it is not an assistant reply
    /// - storage errors from persisting the feedback or patterns
    pub fn record_feedback(
        &self,
        message_id: MessageId,
        polarity: Polarity,
        comment: Option<String>,
    ) -> Result<FeedbackRecord> {
        if self.learning.decision(message_id)?.is_none() {
            self.resolve_from_store(message_id)?;
        }

        let feedback = FeedbackRecord::new(message_id, polarity, comment);
        if let Some(store) = &self.store {
            store.save_feedback(&feedback)?;
        }
        self.learning.record(&feedback)?;
        Ok(feedback)
    }

    fn resolve_from_store(&self, message_id: MessageId) -> Result<()> {
        let unknown = || RouterError::FeedbackTargetUnknown(message_id.to_string());
        let store = self.store.as_ref().ok_or_else(unknown)?;

        let message = store.load_message(message_id)?.ok_or_else(unknown)?;
        if message.role != Role::Assistant {
            return Err(RouterError::InvalidFeedbackTarget(message_id.to_string()).into());
        }
        let strategy = message
            .strategy
            .ok_or_else(|| RouterError::InvalidFeedbackTarget(message_id.to_string()))?;
        let question = store.preceding_user_message(&message)?.ok_or_else(unknown)?;

        let signature = self.classifier.extractor().extract(&question.content).signature;
        debug!(
            message_id = %message_id,
            strategy = %strategy,
            "Resolved feedback target from storage"
        );
        let exchange = Exchange {
            question: question.content,
            answer: message.content,
        };
        self.learning
            .archive(message_id, signature, strategy, Some(exchange))
    }

    /// Runs a learning optimization pass
    ///
    /// # Errors
    ///
    /// Returns `RouterError::OptimizationInProgress` if one is already running
    pub fn optimize(&self) -> Result<OptimizationReport> {
        self.learning.optimize()
    }

    /// Summarizes what the learning system has accumulated
    ///
    /// # Errors
    ///
    /// Returns error if stored counts cannot be read
    pub fn insights(&self) -> Result<LearningInsights> {
        self.learning.insights()
    }
}
