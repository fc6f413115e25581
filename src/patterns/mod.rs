//! Query patterns learned from classification outcomes and feedback
//!
//! A pattern is one key of a message's feature signature (for example
//! `kw:receita` or `shape:short`) together with per-strategy statistics.

pub mod store;

pub use store::{OptimizationCommit, PatternSnapshot, PatternStore};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::classifier::Strategy;

/// Statistics of one strategy within a pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyStats {
    /// Messages with this pattern routed to the strategy
    pub hits: u64,
    /// Of those, how many failed in the executor
    pub failures: u64,
    /// Positive feedback events
    pub positive: u64,
    /// Negative feedback events
    pub negative: u64,
    /// Penalty counter, bumped on each negative feedback
    pub penalties: u64,
    /// Smoothed success weight in [0, 1]
    pub weight: f64,
}

impl StrategyStats {
    /// Creates empty statistics starting at `initial_weight`
    pub fn new(initial_weight: f64) -> Self {
        Self {
            hits: 0,
            failures: 0,
            positive: 0,
            negative: 0,
            penalties: 0,
            weight: initial_weight.clamp(0.0, 1.0),
        }
    }

    /// Moves the weight toward `signal` by `alpha`
    ///
    /// `new = old + alpha * (signal - old)`. With `alpha` in (0, 1] and
    /// `signal` in {0, 1} the weight stays in [0, 1].
    ///
    /// # Examples
    ///
    /// ```
    /// use warehouse_router::patterns::StrategyStats;
    ///
    /// let mut stats = StrategyStats::new(0.5);
    /// stats.smooth(1.0, 0.5);
    /// assert_eq!(stats.weight, 0.75);
    /// ```
    pub fn smooth(&mut self, signal: f64, alpha: f64) {
        let next = self.weight + alpha * (signal - self.weight);
        self.weight = next.clamp(0.0, 1.0);
    }
}

/// A learned pattern keyed by one signature feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPattern {
    /// Signature key
    pub key: String,
    /// Per-strategy statistics
    pub stats: BTreeMap<Strategy, StrategyStats>,
    /// Outcome and feedback events seen for this pattern
    pub observations: u64,
    /// Aggregate success rate, recomputed during optimization
    pub success_rate: f64,
    /// First time the pattern was observed
    pub first_seen: DateTime<Utc>,
    /// Most recent observation
    pub last_seen: DateTime<Utc>,
}

impl QueryPattern {
    /// Creates an empty pattern
    pub fn new(key: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            key: key.into(),
            stats: BTreeMap::new(),
            observations: 0,
            success_rate: 0.0,
            first_seen: now,
            last_seen: now,
        }
    }

    /// Learned weight of a strategy, if the pattern has data for it
    pub fn weight(&self, strategy: Strategy) -> Option<f64> {
        self.stats.get(&strategy).map(|s| s.weight)
    }

    /// Statistics of a strategy, created at `initial_weight` when missing
    pub fn stats_mut(&mut self, strategy: Strategy, initial_weight: f64) -> &mut StrategyStats {
        self.stats
            .entry(strategy)
            .or_insert_with(|| StrategyStats::new(initial_weight))
    }

    /// Success rate derived from the current statistics
    ///
    /// Feedback takes precedence: with any feedback recorded the rate is
    /// the share of positive events. Without feedback it is the share of
    /// executions that did not fail.
    pub fn computed_success_rate(&self) -> f64 {
        let (positive, feedback, hits, failures) = self.stats.values().fold(
            (0u64, 0u64, 0u64, 0u64),
            |(p, f, h, x), s| (p + s.positive, f + s.positive + s.negative, h + s.hits, x + s.failures),
        );

        if feedback > 0 {
            positive as f64 / feedback as f64
        } else if hits > 0 {
            hits.saturating_sub(failures) as f64 / hits as f64
        } else {
            0.0
        }
    }

    /// Total feedback events across strategies
    pub fn feedback_count(&self) -> u64 {
        self.stats.values().map(|s| s.positive + s.negative).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_smooth_positive_never_overshoots() {
        let mut stats = StrategyStats::new(0.5);
        for _ in 0..200 {
            stats.smooth(1.0, 0.3);
            assert!(stats.weight <= 1.0);
        }
        assert!(stats.weight > 0.999);
    }

    #[test]
    fn test_smooth_negative_never_goes_below_zero() {
        let mut stats = StrategyStats::new(0.5);
        for _ in 0..200 {
            stats.smooth(0.0, 0.3);
            assert!(stats.weight >= 0.0);
        }
        assert!(stats.weight < 0.001);
    }

    #[test]
    fn test_smooth_with_full_alpha_jumps_to_signal() {
        let mut stats = StrategyStats::new(0.2);
        stats.smooth(1.0, 1.0);
        assert_eq!(stats.weight, 1.0);
    }

    #[test]
    fn test_success_rate_prefers_feedback() {
        let mut pattern = QueryPattern::new("kw:receita", Utc::now());
        let sql = pattern.stats_mut(Strategy::Sql, 0.5);
        sql.hits = 10;
        sql.failures = 5;
        sql.positive = 3;
        sql.negative = 1;
        assert_eq!(pattern.computed_success_rate(), 0.75);
    }

    #[test]
    fn test_success_rate_falls_back_to_executions() {
        let mut pattern = QueryPattern::new("kw:receita", Utc::now());
        let sql = pattern.stats_mut(Strategy::Sql, 0.5);
        sql.hits = 4;
        sql.failures = 1;
        assert_eq!(pattern.computed_success_rate(), 0.75);
        assert_eq!(QueryPattern::new("x", Utc::now()).computed_success_rate(), 0.0);
    }

    #[test]
    fn test_pattern_serializes_with_strategy_keys() {
        let mut pattern = QueryPattern::new("question", Utc::now());
        pattern.stats_mut(Strategy::Retrieval, 0.5).hits = 2;
        let json = serde_json::to_string(&pattern).unwrap();
        assert!(json.contains("\"retrieval\""));
        let back: QueryPattern = serde_json::from_str(&json).unwrap();
        assert_eq!(back, pattern);
    }
}
