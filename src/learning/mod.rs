//! Learning loop over classification outcomes and user feedback
//!
//! The [`LearningSystem`] is the only writer of the [`PatternStore`]. It
//! records execution outcomes of handled messages, applies feedback to
//! the patterns of the message that was rated, and runs the explicit
//! `optimize` cleanup that keeps the store bounded.
//!
//! Feedback moves a strategy's weight toward the feedback signal with
//! exponential smoothing: `new = old + alpha * (signal - old)`.
//!
//! When a [`KnowledgeBase`] is attached, feedback also grows the retrieval
//! knowledge: a negative rating with a comment adds a correction document
//! right away, and `optimize` adds positively rated answers as reference
//! documents.

pub mod archive;
pub mod feedback;
pub mod report;

pub use archive::PatternArchive;
pub use feedback::{FeedbackRecord, Polarity};
pub use report::{FeedbackCounts, LearningInsights, OptimizationReport, PatternSummary};

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::classifier::Strategy;
use crate::config::{LearningConfig, MAX_RETENTION_DAYS};
use crate::error::{Result, RouterError};
use crate::executors::{KnowledgeBase, KnowledgeDocument};
use crate::patterns::{OptimizationCommit, PatternSnapshot, PatternStore, QueryPattern};
use crate::session::MessageId;
use crate::storage::ChatStore;

/// Weight a strategy starts with the first time a pattern sees it
pub const INITIAL_WEIGHT: f64 = 0.5;

/// Number of patterns listed in [`LearningInsights::top_patterns`]
const TOP_PATTERNS: usize = 10;

/// Patterns used at least this often are checked for a poor success rate
const PROBLEMATIC_MIN_OBSERVATIONS: u64 = 5;

/// Success rate below which a well-used pattern is reported as problematic
const PROBLEMATIC_SUCCESS_RATE: f64 = 0.7;

/// Most recent positively rated replies considered per optimization
const REFERENCE_LIMIT: usize = 50;

/// A question and the reply it received
#[derive(Debug, Clone, PartialEq)]
pub struct Exchange {
    /// User question
    pub question: String,
    /// Assistant reply
    pub answer: String,
}

/// What was decided for an assistant message, kept so feedback can find it
#[derive(Debug, Clone, PartialEq)]
pub struct ArchivedDecision {
    /// Pattern signature of the originating user message
    pub signature: Vec<String>,
    /// Strategy that produced the reply
    pub strategy: Strategy,
    /// The rated exchange, when its text is known
    pub exchange: Option<Exchange>,
    /// When the decision was archived
    pub recorded_at: DateTime<Utc>,
}

fn correction_document(
    feedback: &FeedbackRecord,
    exchange: &Exchange,
    comment: &str,
) -> KnowledgeDocument {
    KnowledgeDocument {
        id: format!("feedback:{}", feedback.id),
        content: format!(
            "Consulta: {}\nResposta original: {}\nFeedback do usuário: {}",
            exchange.question.trim(),
            exchange.answer.trim(),
            comment
        ),
        category: Some("feedback".to_string()),
    }
}

fn reference_document(message_id: MessageId, exchange: &Exchange) -> KnowledgeDocument {
    KnowledgeDocument {
        id: format!("reference:{}", message_id),
        content: format!(
            "Consulta de referência: {}\nResposta aprovada: {}",
            exchange.question.trim(),
            exchange.answer.trim()
        ),
        category: Some("reference".to_string()),
    }
}

/// Releases the optimization flag when dropped
struct OptimizeGuard<'a>(&'a AtomicBool);

impl Drop for OptimizeGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Feedback-driven pattern learning
pub struct LearningSystem {
    patterns: PatternStore,
    config: LearningConfig,
    decisions: Mutex<HashMap<MessageId, ArchivedDecision>>,
    archive: Option<PatternArchive>,
    chat_store: Option<Arc<dyn ChatStore>>,
    knowledge: Option<Arc<dyn KnowledgeBase>>,
    references: Mutex<BTreeMap<MessageId, Exchange>>,
    optimizing: AtomicBool,
    routed: [AtomicU64; 3],
    positive: AtomicU64,
    negative: AtomicU64,
}

fn strategy_slot(strategy: Strategy) -> usize {
    match strategy {
        Strategy::Sql => 0,
        Strategy::Retrieval => 1,
        Strategy::General => 2,
    }
}

fn lock_poisoned<T>(_: T) -> RouterError {
    RouterError::Storage("decision archive lock poisoned".to_string())
}

impl LearningSystem {
    /// Creates an in-memory learning system with an empty pattern store
    pub fn new(config: LearningConfig) -> Self {
        Self::with_patterns(config, PatternStore::new())
    }

    /// Creates a learning system over an existing pattern store
    pub fn with_patterns(config: LearningConfig, patterns: PatternStore) -> Self {
        Self {
            patterns,
            config,
            decisions: Mutex::new(HashMap::new()),
            archive: None,
            chat_store: None,
            knowledge: None,
            references: Mutex::new(BTreeMap::new()),
            optimizing: AtomicBool::new(false),
            routed: Default::default(),
            positive: AtomicU64::new(0),
            negative: AtomicU64::new(0),
        }
    }

    /// Opens a learning system backed by a durable pattern archive
    ///
    /// Patterns already in the archive are loaded into the store.
    ///
    /// # Errors
    ///
    /// Returns error if the archive cannot be read
    pub fn with_archive(config: LearningConfig, archive: PatternArchive) -> Result<Self> {
        let restored = archive.load_all()?;
        info!("Loaded {} learned patterns", restored.len());
        let mut system = Self::with_patterns(config, PatternStore::from_patterns(restored));
        system.archive = Some(archive);
        Ok(system)
    }

    /// Uses `store` for feedback retention and insights
    pub fn with_chat_store(mut self, store: Arc<dyn ChatStore>) -> Self {
        self.chat_store = Some(store);
        self
    }

    /// Feeds learned documents into `knowledge`
    ///
    /// Documents learned in earlier runs are replayed from the archive.
    ///
    /// # Errors
    ///
    /// Returns error if archived documents cannot be read or indexed
    pub fn with_knowledge(mut self, knowledge: Arc<dyn KnowledgeBase>) -> Result<Self> {
        if let Some(archive) = &self.archive {
            let documents = archive.load_documents()?;
            let count = documents.len();
            for document in documents {
                knowledge.add_document(document)?;
            }
            info!("Restored {} learned knowledge documents", count);
        }
        self.knowledge = Some(knowledge);
        Ok(self)
    }

    /// Returns the learning configuration
    pub fn config(&self) -> &LearningConfig {
        &self.config
    }

    /// Current pattern snapshot for classification
    pub fn snapshot(&self) -> Arc<PatternSnapshot> {
        self.patterns.snapshot()
    }

    /// Runs under the pattern store's writer lock, so sled sees updates
    /// in the order they are published
    fn persist(&self, updated: &[Arc<QueryPattern>]) -> Result<()> {
        if let Some(archive) = &self.archive {
            archive.save(updated.iter().map(Arc::as_ref))?;
        }
        Ok(())
    }

    /// Adds a learned document to the knowledge base and the archive
    ///
    /// Returns whether the document was new.
    fn learn(&self, document: KnowledgeDocument) -> Result<bool> {
        let Some(knowledge) = &self.knowledge else {
            return Ok(false);
        };
        if !knowledge.add_document(document.clone())? {
            return Ok(false);
        }
        if let Some(archive) = &self.archive {
            archive.save_document(&document)?;
        }
        info!(id = %document.id, "Learned knowledge document");
        Ok(true)
    }

    /// Records the execution outcome of one handled message
    ///
    /// Every pattern in `signature` gets a hit for `strategy`, plus a
    /// failure when the executor did not succeed.
    ///
    /// # Errors
    ///
    /// Returns error if the updated patterns cannot be persisted
    pub fn observe(&self, signature: &[String], strategy: Strategy, succeeded: bool) -> Result<()> {
        self.routed[strategy_slot(strategy)].fetch_add(1, Ordering::Relaxed);

        let updated = self.patterns.try_update(
            signature,
            Utc::now(),
            |pattern| {
                let stats = pattern.stats_mut(strategy, INITIAL_WEIGHT);
                stats.hits += 1;
                if !succeeded {
                    stats.failures += 1;
                }
                pattern.observations += 1;
            },
            |updated| self.persist(updated),
        )?;
        debug!(
            strategy = %strategy,
            succeeded,
            patterns = updated.len(),
            "Recorded classification outcome"
        );
        Ok(())
    }

    /// Remembers the decision behind an assistant message
    pub fn archive(
        &self,
        message_id: MessageId,
        signature: Vec<String>,
        strategy: Strategy,
        exchange: Option<Exchange>,
    ) -> Result<()> {
        self.archive_at(message_id, signature, strategy, exchange, Utc::now())
    }

    fn archive_at(
        &self,
        message_id: MessageId,
        signature: Vec<String>,
        strategy: Strategy,
        exchange: Option<Exchange>,
        recorded_at: DateTime<Utc>,
    ) -> Result<()> {
        self.decisions.lock().map_err(lock_poisoned)?.insert(
            message_id,
            ArchivedDecision {
                signature,
                strategy,
                exchange,
                recorded_at,
            },
        );
        Ok(())
    }

    /// Returns the archived decision for an assistant message
    pub fn decision(&self, message_id: MessageId) -> Result<Option<ArchivedDecision>> {
        Ok(self
            .decisions
            .lock()
            .map_err(lock_poisoned)?
            .get(&message_id)
            .cloned())
    }

    /// Applies a feedback event
    ///
    /// Positive feedback raises the weight of the strategy used for every
    /// pattern of the originating message. Negative feedback lowers it and
    /// bumps the penalty counter. A negative rating with a comment also
    /// teaches the knowledge base a correction for the rated exchange.
    ///
    /// # Errors
    ///
    /// Returns `RouterError::FeedbackTargetUnknown` if no decision was
    /// archived for the message, or a storage error if persisting fails
    pub fn record(&self, feedback: &FeedbackRecord) -> Result<()> {
        let decision = self
            .decision(feedback.message_id)?
            .ok_or_else(|| RouterError::FeedbackTargetUnknown(feedback.message_id.to_string()))?;

        let alpha = self.config.smoothing_alpha;
        let polarity = feedback.polarity;
        let updated = self.patterns.try_update(
            &decision.signature,
            feedback.created_at,
            |pattern| {
                let stats = pattern.stats_mut(decision.strategy, INITIAL_WEIGHT);
                stats.smooth(polarity.signal(), alpha);
                match polarity {
                    Polarity::Positive => stats.positive += 1,
                    Polarity::Negative => {
                        stats.negative += 1;
                        stats.penalties += 1;
                    }
                }
                pattern.observations += 1;
            },
            |updated| self.persist(updated),
        )?;

        match polarity {
            Polarity::Positive => self.positive.fetch_add(1, Ordering::Relaxed),
            Polarity::Negative => self.negative.fetch_add(1, Ordering::Relaxed),
        };
        metrics::increment_counter!("router_feedback_total", "polarity" => polarity.as_str());
        info!(
            message_id = %feedback.message_id,
            strategy = %decision.strategy,
            polarity = %polarity,
            patterns = updated.len(),
            "Feedback applied"
        );

        let Some(exchange) = &decision.exchange else {
            return Ok(());
        };
        match polarity {
            Polarity::Negative => {
                let comment = feedback.comment.as_deref().map(str::trim).unwrap_or("");
                if !comment.is_empty() {
                    self.learn(correction_document(feedback, exchange, comment))?;
                }
            }
            Polarity::Positive => {
                if self.knowledge.is_some() && self.chat_store.is_none() {
                    self.references
                        .lock()
                        .map_err(lock_poisoned)?
                        .insert(feedback.message_id, exchange.clone());
                }
            }
        }
        Ok(())
    }

    /// Positively rated exchanges that may become reference documents
    ///
    /// With a chat store these come from stored feedback, so ratings given
    /// by earlier runs count too.
    fn reference_candidates(&self) -> Result<Vec<(MessageId, Exchange)>> {
        let Some(store) = &self.chat_store else {
            let references = self.references.lock().map_err(lock_poisoned)?;
            return Ok(references.iter().map(|(id, e)| (*id, e.clone())).collect());
        };

        let mut candidates = Vec::new();
        for message_id in store.positive_feedback_targets(REFERENCE_LIMIT)? {
            let Some(answer) = store.load_message(message_id)? else {
                continue;
            };
            let Some(question) = store.preceding_user_message(&answer)? else {
                continue;
            };
            candidates.push((
                message_id,
                Exchange {
                    question: question.content,
                    answer: answer.content,
                },
            ));
        }
        Ok(candidates)
    }

    fn add_references(&self) -> Result<usize> {
        if self.knowledge.is_none() {
            return Ok(0);
        }
        let candidates = self.reference_candidates()?;
        let mut added = 0;
        for (message_id, exchange) in &candidates {
            if self.learn(reference_document(*message_id, exchange))? {
                added += 1;
            }
        }
        if self.chat_store.is_none() {
            let mut references = self.references.lock().map_err(lock_poisoned)?;
            for (message_id, _) in &candidates {
                references.remove(message_id);
            }
        }
        Ok(added)
    }

    /// Runs an optimization pass now
    ///
    /// # Errors
    ///
    /// Returns `RouterError::OptimizationInProgress` if another pass is
    /// running, or a storage error if persisting the result fails
    pub fn optimize(&self) -> Result<OptimizationReport> {
        self.optimize_at(Utc::now())
    }

    /// Runs an optimization pass as of `now`
    ///
    /// Patterns below the minimum observation count that were last seen
    /// before the retention window are pruned. Success rates are
    /// recomputed where they changed. Feedback and archived decisions
    /// older than the window are dropped. Positively rated answers are
    /// added to the knowledge base as references, once each. The pass reads a snapshot
    /// without blocking classification or feedback and swaps its result
    /// in atomically, so running it twice without new feedback changes
    /// nothing the second time.
    ///
    /// # Errors
    ///
    /// Same as [`LearningSystem::optimize`]
    pub fn optimize_at(&self, now: DateTime<Utc>) -> Result<OptimizationReport> {
        if self
            .optimizing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("Optimization requested while another run is active");
            return Err(RouterError::OptimizationInProgress.into());
        }
        let _guard = OptimizeGuard(&self.optimizing);

        let retention = Duration::days(self.config.retention_days.clamp(0, MAX_RETENTION_DAYS));
        let cutoff = now
            .checked_sub_signed(retention)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let min_observations = self.config.min_observations;
        let prunable =
            |p: &QueryPattern| p.observations < min_observations && p.last_seen < cutoff;

        let base = self.patterns.snapshot();
        let mut candidates = Vec::new();
        let mut recomputed = Vec::new();
        for pattern in base.iter() {
            if prunable(pattern) {
                candidates.push(pattern.key.clone());
                continue;
            }
            let rate = pattern.computed_success_rate();
            if (rate - pattern.success_rate).abs() > f64::EPSILON {
                let mut fresh = pattern.clone();
                fresh.success_rate = rate;
                recomputed.push(fresh);
            }
        }
        candidates.sort();

        let commit = self.patterns.try_commit_optimization(
            &base,
            &candidates,
            recomputed,
            prunable,
            |commit: &OptimizationCommit| -> Result<()> {
                if let Some(archive) = &self.archive {
                    archive.remove(&commit.pruned)?;
                    archive.save(commit.recomputed.iter().map(Arc::as_ref))?;
                }
                Ok(())
            },
        )?;

        let problematic_patterns = self
            .patterns
            .snapshot()
            .iter()
            .filter(|p| {
                p.observations >= PROBLEMATIC_MIN_OBSERVATIONS
                    && p.computed_success_rate() < PROBLEMATIC_SUCCESS_RATE
            })
            .count();

        let decisions_expired = {
            let mut decisions = self.decisions.lock().map_err(lock_poisoned)?;
            let before = decisions.len();
            decisions.retain(|_, d| d.recorded_at >= cutoff);
            before - decisions.len()
        };

        let feedback_pruned = match &self.chat_store {
            Some(store) => store.prune_feedback(cutoff)?,
            None => 0,
        };

        let references_added = self.add_references()?;

        let report = OptimizationReport {
            patterns_pruned: commit.pruned,
            patterns_retained: commit.retained,
            rates_recomputed: commit.recomputed.len(),
            feedback_pruned,
            decisions_expired,
            references_added,
            problematic_patterns,
        };

        metrics::counter!(
            "router_patterns_pruned_total",
            report.patterns_pruned.len() as u64
        );
        info!(
            pruned = report.patterns_pruned.len(),
            retained = report.patterns_retained,
            rates_recomputed = report.rates_recomputed,
            feedback_pruned = report.feedback_pruned,
            decisions_expired = report.decisions_expired,
            references_added = report.references_added,
            problematic = report.problematic_patterns,
            "Optimization complete"
        );
        Ok(report)
    }

    /// Summarizes the accumulated patterns and feedback
    ///
    /// Message and feedback counts come from the chat store when one is
    /// attached, otherwise from what this process has seen.
    ///
    /// # Errors
    ///
    /// Returns error if the chat store cannot be queried
    pub fn insights(&self) -> Result<LearningInsights> {
        let snapshot = self.patterns.snapshot();

        let mut patterns: Vec<&QueryPattern> = snapshot.iter().collect();
        patterns.sort_by(|a, b| {
            b.observations
                .cmp(&a.observations)
                .then_with(|| a.key.cmp(&b.key))
        });

        let top_patterns = patterns
            .iter()
            .take(TOP_PATTERNS)
            .map(|p| PatternSummary {
                key: p.key.clone(),
                observations: p.observations,
                success_rate: p.success_rate,
                preferred: p
                    .stats
                    .iter()
                    .max_by(|a, b| a.1.weight.total_cmp(&b.1.weight))
                    .map(|(s, _)| *s),
            })
            .collect();

        let mature_patterns = patterns
            .iter()
            .filter(|p| p.observations >= self.config.min_observations)
            .count();

        let (messages_by_strategy, feedback) = match &self.chat_store {
            Some(store) => (store.strategy_counts()?, store.feedback_counts()?),
            None => {
                let counts: BTreeMap<Strategy, u64> = Strategy::ALL
                    .into_iter()
                    .map(|s| (s, self.routed[strategy_slot(s)].load(Ordering::Relaxed)))
                    .filter(|(_, n)| *n > 0)
                    .collect();
                let feedback = FeedbackCounts {
                    positive: self.positive.load(Ordering::Relaxed),
                    negative: self.negative.load(Ordering::Relaxed),
                };
                (counts, feedback)
            }
        };

        Ok(LearningInsights {
            total_patterns: snapshot.len(),
            mature_patterns,
            top_patterns,
            messages_by_strategy,
            feedback,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executors::KeywordIndex;
    use uuid::Uuid;

    fn signature() -> Vec<String> {
        vec!["kw:receita".to_string(), "question".to_string()]
    }

    fn system() -> LearningSystem {
        LearningSystem::new(LearningConfig::default())
    }

    #[test]
    fn test_observe_counts_hits_and_failures() {
        let learning = system();
        learning.observe(&signature(), Strategy::Sql, true).unwrap();
        learning.observe(&signature(), Strategy::Sql, false).unwrap();

        let snapshot = learning.snapshot();
        let pattern = snapshot.get("kw:receita").unwrap();
        assert_eq!(pattern.observations, 2);
        assert_eq!(pattern.stats[&Strategy::Sql].hits, 2);
        assert_eq!(pattern.stats[&Strategy::Sql].failures, 1);
        assert_eq!(pattern.weight(Strategy::Sql), Some(INITIAL_WEIGHT));
    }

    #[test]
    fn test_record_unknown_target_fails() {
        let learning = system();
        let feedback = FeedbackRecord::new(Uuid::new_v4(), Polarity::Positive, None);
        let err = learning.record(&feedback).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RouterError>(),
            Some(RouterError::FeedbackTargetUnknown(_))
        ));
    }

    #[test]
    fn test_negative_feedback_lowers_weight_and_penalizes() {
        let learning = system();
        let message_id = Uuid::new_v4();
        learning.archive(message_id, signature(), Strategy::Sql, None).unwrap();

        let feedback = FeedbackRecord::new(message_id, Polarity::Negative, None);
        learning.record(&feedback).unwrap();

        let snapshot = learning.snapshot();
        let stats = &snapshot.get("question").unwrap().stats[&Strategy::Sql];
        assert!((stats.weight - 0.35).abs() < 1e-9);
        assert_eq!(stats.penalties, 1);
        assert_eq!(stats.negative, 1);
    }

    #[test]
    fn test_repeated_positive_feedback_is_bounded() {
        let learning = system();
        let message_id = Uuid::new_v4();
        learning.archive(message_id, signature(), Strategy::Retrieval, None).unwrap();

        for _ in 0..100 {
            let feedback = FeedbackRecord::new(message_id, Polarity::Positive, None);
            learning.record(&feedback).unwrap();
        }

        let weight = learning
            .snapshot()
            .get("kw:receita")
            .unwrap()
            .weight(Strategy::Retrieval)
            .unwrap();
        assert!(weight <= 1.0);
        assert!(weight > 0.99);
    }

    #[test]
    fn test_optimize_prunes_only_old_immature_patterns() {
        let learning = system();
        learning
            .observe(&["old".to_string()], Strategy::General, true)
            .unwrap();
        for _ in 0..3 {
            learning
                .observe(&["mature".to_string()], Strategy::Sql, true)
                .unwrap();
        }

        let later = Utc::now() + Duration::days(LearningConfig::default().retention_days + 1);
        let report = learning.optimize_at(later).unwrap();
        assert_eq!(report.patterns_pruned, vec!["old".to_string()]);
        assert_eq!(report.patterns_retained, 1);

        // a fresh immature pattern is within the window and survives
        learning
            .observe(&["fresh".to_string()], Strategy::Sql, true)
            .unwrap();
        let report = learning.optimize().unwrap();
        assert!(report.patterns_pruned.is_empty());
    }

    #[test]
    fn test_optimize_twice_second_report_empty() {
        let learning = system();
        let message_id = Uuid::new_v4();
        learning.observe(&signature(), Strategy::Sql, true).unwrap();
        learning.archive(message_id, signature(), Strategy::Sql, None).unwrap();
        learning
            .record(&FeedbackRecord::new(message_id, Polarity::Positive, None))
            .unwrap();

        let first = learning.optimize().unwrap();
        assert_eq!(first.rates_recomputed, 2);

        let second = learning.optimize().unwrap();
        assert!(second.is_empty(), "second report: {:?}", second);
        assert_eq!(second.patterns_retained, first.patterns_retained);
    }

    #[test]
    fn test_optimize_expires_old_decisions() {
        let learning = system();
        let old = Utc::now() - Duration::days(200);
        learning
            .archive_at(Uuid::new_v4(), signature(), Strategy::Sql, None, old)
            .unwrap();
        learning.archive(Uuid::new_v4(), signature(), Strategy::Sql, None).unwrap();

        let report = learning.optimize().unwrap();
        assert_eq!(report.decisions_expired, 1);
    }

    #[test]
    fn test_concurrent_optimize_is_rejected() {
        let learning = system();
        learning.optimizing.store(true, Ordering::Release);
        let err = learning.optimize().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RouterError>(),
            Some(RouterError::OptimizationInProgress)
        ));

        learning.optimizing.store(false, Ordering::Release);
        assert!(learning.optimize().is_ok());
    }

    #[test]
    fn test_insights_without_store() {
        let learning = system();
        let message_id = Uuid::new_v4();
        for _ in 0..3 {
            learning.observe(&signature(), Strategy::Sql, true).unwrap();
        }
        learning.archive(message_id, signature(), Strategy::Sql, None).unwrap();
        learning
            .record(&FeedbackRecord::new(message_id, Polarity::Positive, None))
            .unwrap();

        let insights = learning.insights().unwrap();
        assert_eq!(insights.total_patterns, 2);
        assert_eq!(insights.mature_patterns, 2);
        assert_eq!(insights.messages_by_strategy.get(&Strategy::Sql), Some(&3));
        assert_eq!(insights.feedback.positive, 1);
        assert_eq!(insights.overall_success_rate(), Some(1.0));
        assert_eq!(insights.top_patterns[0].preferred, Some(Strategy::Sql));
    }

    #[test]
    fn test_archive_roundtrip_through_sled() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("patterns");
        {
            let learning =
                LearningSystem::with_archive(LearningConfig::default(), PatternArchive::open(&path).unwrap())
                    .unwrap();
            learning.observe(&signature(), Strategy::Sql, true).unwrap();
        }

        let learning =
            LearningSystem::with_archive(LearningConfig::default(), PatternArchive::open(&path).unwrap())
                .unwrap();
        assert_eq!(learning.snapshot().len(), 2);
    }

    #[test]
    fn test_concurrent_updates_reach_archive_in_order() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("patterns");
        let shared = vec!["shared".to_string()];
        {
            let learning = LearningSystem::with_archive(
                LearningConfig::default(),
                PatternArchive::open(&path).unwrap(),
            )
            .unwrap();
            std::thread::scope(|scope| {
                for _ in 0..8 {
                    scope.spawn(|| {
                        for _ in 0..25 {
                            learning.observe(&shared, Strategy::Sql, true).unwrap();
                        }
                    });
                }
            });
            assert_eq!(learning.snapshot().get("shared").unwrap().observations, 200);
        }

        let stored = PatternArchive::open(&path).unwrap().load_all().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].observations, 200);
        assert_eq!(stored[0].stats[&Strategy::Sql].hits, 200);
    }

    #[test]
    fn test_optimize_counts_problematic_patterns() {
        let learning = system();
        for _ in 0..5 {
            learning
                .observe(&["kw:sla".to_string()], Strategy::Sql, false)
                .unwrap();
        }
        for _ in 0..5 {
            learning
                .observe(&["kw:receita".to_string()], Strategy::Sql, true)
                .unwrap();
        }
        for _ in 0..4 {
            learning
                .observe(&["kw:horas".to_string()], Strategy::Sql, false)
                .unwrap();
        }

        let report = learning.optimize().unwrap();
        assert_eq!(report.problematic_patterns, 1);

        let again = learning.optimize().unwrap();
        assert_eq!(again.problematic_patterns, 1);
        assert!(again.is_empty());
    }

    fn exchange() -> Exchange {
        Exchange {
            question: "Qual foi a receita por regiao?".to_string(),
            answer: "Receita total: 100".to_string(),
        }
    }

    fn with_index() -> (LearningSystem, Arc<KeywordIndex>) {
        let index = Arc::new(KeywordIndex::new(Vec::new()));
        let learning = system()
            .with_knowledge(Arc::clone(&index) as Arc<dyn KnowledgeBase>)
            .unwrap();
        (learning, index)
    }

    #[test]
    fn test_negative_comment_adds_correction() {
        let (learning, index) = with_index();
        let message_id = Uuid::new_v4();
        learning
            .archive(message_id, signature(), Strategy::Sql, Some(exchange()))
            .unwrap();

        learning
            .record(&FeedbackRecord::new(message_id, Polarity::Negative, None))
            .unwrap();
        assert!(index.is_empty());

        let feedback = FeedbackRecord::new(
            message_id,
            Polarity::Negative,
            Some("use a tabela de vendas regionais".into()),
        );
        learning.record(&feedback).unwrap();

        let passages = index.rank("vendas regionais", 3);
        assert_eq!(passages.len(), 1);
        assert_eq!(passages[0].id, format!("feedback:{}", feedback.id));
        assert!(passages[0].content.contains("Consulta: Qual foi a receita por regiao?"));
    }

    #[test]
    fn test_optimize_adds_positive_answers_once() {
        let (learning, index) = with_index();
        let message_id = Uuid::new_v4();
        learning
            .archive(message_id, signature(), Strategy::Sql, Some(exchange()))
            .unwrap();
        for _ in 0..2 {
            learning
                .record(&FeedbackRecord::new(message_id, Polarity::Positive, None))
                .unwrap();
        }
        assert!(index.is_empty());

        let first = learning.optimize().unwrap();
        assert_eq!(first.references_added, 1);
        assert_eq!(index.len(), 1);
        assert_eq!(
            index.rank("receita regiao", 1)[0].id,
            format!("reference:{}", message_id)
        );

        let second = learning.optimize().unwrap();
        assert_eq!(second.references_added, 0);
        assert!(second.is_empty(), "second report: {:?}", second);
    }

    #[test]
    fn test_learned_documents_are_restored_from_archive() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("patterns");
        let open = |index: &Arc<KeywordIndex>| {
            LearningSystem::with_archive(
                LearningConfig::default(),
                PatternArchive::open(&path).unwrap(),
            )
            .unwrap()
            .with_knowledge(Arc::clone(index) as Arc<dyn KnowledgeBase>)
            .unwrap()
        };

        {
            let index = Arc::new(KeywordIndex::new(Vec::new()));
            let learning = open(&index);
            let message_id = Uuid::new_v4();
            learning
                .archive(message_id, signature(), Strategy::Sql, Some(exchange()))
                .unwrap();
            learning
                .record(&FeedbackRecord::new(
                    message_id,
                    Polarity::Negative,
                    Some("faltou o filtro de regiao".into()),
                ))
                .unwrap();
            assert_eq!(index.len(), 1);
        }

        let index = Arc::new(KeywordIndex::new(Vec::new()));
        let _learning = open(&index);
        assert_eq!(index.len(), 1);
        assert_eq!(index.rank("filtro", 1)[0].category.as_deref(), Some("feedback"));
    }

    #[test]
    fn test_huge_retention_does_not_overflow() {
        let config = LearningConfig {
            retention_days: i64::MAX,
            ..LearningConfig::default()
        };
        let learning = LearningSystem::new(config);
        learning.observe(&signature(), Strategy::Sql, true).unwrap();
        let report = learning.optimize().unwrap();
        assert!(report.patterns_pruned.is_empty());
    }
}
