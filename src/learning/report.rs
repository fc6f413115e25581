//! Results of optimization runs and learning summaries

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::classifier::Strategy;

/// What one `optimize` run changed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimizationReport {
    /// Keys of the patterns removed
    pub patterns_pruned: Vec<String>,
    /// Patterns left in the store
    pub patterns_retained: usize,
    /// Patterns whose aggregate success rate changed
    pub rates_recomputed: usize,
    /// Feedback records older than the retention window that were deleted
    pub feedback_pruned: usize,
    /// Archived decisions older than the retention window that were dropped
    pub decisions_expired: usize,
    /// Positively rated answers added to the knowledge base as references
    #[serde(default)]
    pub references_added: usize,
    /// Well-used patterns whose success rate is below 0.7
    #[serde(default)]
    pub problematic_patterns: usize,
}

impl OptimizationReport {
    /// Whether the run changed nothing
    ///
    /// The retained and problematic counts are state, not change, and are
    /// ignored.
    pub fn is_empty(&self) -> bool {
        self.patterns_pruned.is_empty()
            && self.rates_recomputed == 0
            && self.feedback_pruned == 0
            && self.decisions_expired == 0
            && self.references_added == 0
    }
}

/// Summary of one pattern for reporting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternSummary {
    /// Pattern key
    pub key: String,
    /// Observation count
    pub observations: u64,
    /// Aggregate success rate as of the last optimization
    pub success_rate: f64,
    /// Strategy with the highest learned weight
    pub preferred: Option<Strategy>,
}

/// Positive and negative feedback totals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackCounts {
    /// Positive events
    pub positive: u64,
    /// Negative events
    pub negative: u64,
}

impl FeedbackCounts {
    /// Share of positive feedback, if there is any feedback
    pub fn success_rate(&self) -> Option<f64> {
        let total = self.positive + self.negative;
        if total == 0 {
            None
        } else {
            Some(self.positive as f64 / total as f64)
        }
    }
}

/// Overview of what the learning system has accumulated
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LearningInsights {
    /// All patterns in the store
    pub total_patterns: usize,
    /// Patterns at or above the minimum observation count
    pub mature_patterns: usize,
    /// Most observed patterns, highest first
    pub top_patterns: Vec<PatternSummary>,
    /// Handled messages per strategy
    pub messages_by_strategy: BTreeMap<Strategy, u64>,
    /// Feedback totals
    pub feedback: FeedbackCounts,
}

impl LearningInsights {
    /// Share of positive feedback across all rated replies
    pub fn overall_success_rate(&self) -> Option<f64> {
        self.feedback.success_rate()
    }
}
