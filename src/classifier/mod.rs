//! Strategy classification for incoming questions
//!
//! The [`Classifier`] blends two signals per strategy:
//!
//! 1. Static keyword rules. Metric, temporal and numeric vocabulary favors
//!    SQL, conceptual vocabulary favors retrieval, greetings favor general
//!    conversation. Each strategy's static score is its share of all hits.
//! 2. Learned weights from the [`PatternSnapshot`]. Only patterns with at
//!    least `min_observations` observations contribute; a strategy that a
//!    mature pattern has no data for counts as `neutral_weight`. Keyword
//!    patterns (`kw:*`, `conv:*`) carry the learning. Structural patterns
//!    (`question`, `numeric`, `shape:*`) are shared by unrelated messages,
//!    so they count at a fraction of a keyword's weight and only alongside
//!    a matching keyword pattern.
//!
//! `score = (1 - b) * static + b * learned` with
//! `b = blend_ratio * coverage`, where coverage is the share of the
//! message's keyword patterns that are mature. Without any mature keyword
//! pattern the static score stands alone. Scores within
//! `tie_epsilon` of the best are resolved SQL, then retrieval, then
//! general. A message with no SQL or retrieval keyword at all is routed to
//! general conversation outright.
//!
//! Classification is a pure function of the message and the snapshot.

pub mod features;

pub use features::{FeatureExtractor, MessageFeatures};

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::ClassifierConfig;
use crate::patterns::PatternSnapshot;

/// Weight of a structural pattern relative to a keyword pattern
const STRUCTURAL_PATTERN_WEIGHT: f64 = 0.25;

fn is_keyword_pattern(key: &str) -> bool {
    key.starts_with("kw:") || key.starts_with("conv:")
}

/// Handling path for a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Named analytical query over the warehouse
    Sql,
    /// Semantic document retrieval
    Retrieval,
    /// Open conversation
    General,
}

impl Strategy {
    /// All strategies in tie-break order (most actionable first)
    pub const ALL: [Strategy; 3] = [Strategy::Sql, Strategy::Retrieval, Strategy::General];

    /// Returns the strategy tag as stored and logged
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Sql => "sql",
            Strategy::Retrieval => "retrieval",
            Strategy::General => "general",
        }
    }

    /// Parses a stored strategy tag
    ///
    /// Accepts `rag` as an alias of `retrieval`.
    pub fn parse_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "sql" => Some(Strategy::Sql),
            "retrieval" | "rag" => Some(Strategy::Retrieval),
            "general" => Some(Strategy::General),
            _ => None,
        }
    }

    fn index(&self) -> usize {
        match self {
            Strategy::Sql => 0,
            Strategy::Retrieval => 1,
            Strategy::General => 2,
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-strategy scores
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StrategyScores {
    /// Score for [`Strategy::Sql`]
    pub sql: f64,
    /// Score for [`Strategy::Retrieval`]
    pub retrieval: f64,
    /// Score for [`Strategy::General`]
    pub general: f64,
}

impl StrategyScores {
    fn from_array(values: [f64; 3]) -> Self {
        Self {
            sql: values[0],
            retrieval: values[1],
            general: values[2],
        }
    }

    /// Score of one strategy
    pub fn get(&self, strategy: Strategy) -> f64 {
        match strategy {
            Strategy::Sql => self.sql,
            Strategy::Retrieval => self.retrieval,
            Strategy::General => self.general,
        }
    }
}

/// Outcome of classifying one message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationDecision {
    /// Chosen strategy
    pub strategy: Strategy,
    /// Normalized margin over the runner-up, in [0, 1]
    pub confidence: f64,
    /// Final blended scores
    pub scores: StrategyScores,
    /// Pattern keys whose learned weights contributed
    pub matched_patterns: Vec<String>,
    /// Short tags explaining the decision
    pub rationale: Vec<String>,
    /// Pattern signature of the message, used for learning
    pub signature: Vec<String>,
}

/// Rule-and-pattern based strategy classifier
#[derive(Debug, Clone)]
pub struct Classifier {
    extractor: FeatureExtractor,
    blend_ratio: f64,
    tie_epsilon: f64,
    neutral_weight: f64,
    min_observations: u64,
}

impl Classifier {
    /// Creates a classifier
    ///
    /// # Arguments
    ///
    /// * `config` - Keyword vocabulary and blend constants
    /// * `min_observations` - Observations a pattern needs before it counts
    pub fn new(config: &ClassifierConfig, min_observations: u64) -> Self {
        Self {
            extractor: FeatureExtractor::new(config),
            blend_ratio: config.blend_ratio.clamp(0.0, 1.0),
            tie_epsilon: config.tie_epsilon.max(0.0),
            neutral_weight: config.neutral_weight.clamp(0.0, 1.0),
            min_observations,
        }
    }

    /// Returns the feature extractor used by this classifier
    pub fn extractor(&self) -> &FeatureExtractor {
        &self.extractor
    }

    /// Classifies a message against a pattern snapshot
    ///
    /// # Examples
    ///
    /// ```
    /// use warehouse_router::classifier::{Classifier, Strategy};
    /// use warehouse_router::config::ClassifierConfig;
    /// use warehouse_router::patterns::PatternSnapshot;
    ///
    /// let classifier = Classifier::new(&ClassifierConfig::default(), 3);
    /// let decision = classifier.classify("Como funciona nosso Data Warehouse?", &PatternSnapshot::default());
    /// assert_eq!(decision.strategy, Strategy::Retrieval);
    /// ```
    pub fn classify(&self, message: &str, patterns: &PatternSnapshot) -> ClassificationDecision {
        let features = self.extractor.extract(message);

        if !features.has_category_keywords() {
            return ClassificationDecision {
                strategy: Strategy::General,
                confidence: 1.0,
                scores: StrategyScores::from_array([0.0, 0.0, 1.0]),
                matched_patterns: Vec::new(),
                rationale: vec!["no_category_keywords".to_string()],
                signature: features.signature,
            };
        }

        let mut rationale = Vec::new();
        let static_scores = static_scores(&features, &mut rationale);

        let mut matched_patterns = Vec::new();
        let mut learned = [0.0_f64; 3];
        let mut total_weight = 0.0;
        let mut keyword_keys = 0usize;
        let mut matched_keywords = 0usize;
        for key in &features.signature {
            let keyword = is_keyword_pattern(key);
            if keyword {
                keyword_keys += 1;
            }
            let Some(pattern) = patterns.get(key) else {
                continue;
            };
            if pattern.observations < self.min_observations {
                continue;
            }
            let weight = if keyword {
                matched_keywords += 1;
                1.0
            } else {
                STRUCTURAL_PATTERN_WEIGHT
            };
            for strategy in Strategy::ALL {
                learned[strategy.index()] +=
                    weight * pattern.weight(strategy).unwrap_or(self.neutral_weight);
            }
            total_weight += weight;
            matched_patterns.push(key.clone());
        }

        if matched_keywords == 0 {
            matched_patterns.clear();
        }

        let scores = if matched_patterns.is_empty() {
            static_scores
        } else {
            let coverage = matched_keywords as f64 / keyword_keys as f64;
            let blend = self.blend_ratio * coverage;
            rationale.push(format!("learned_patterns:{}", matched_patterns.len()));
            let mut blended = [0.0_f64; 3];
            for (i, value) in blended.iter_mut().enumerate() {
                *value = (1.0 - blend) * static_scores[i] + blend * learned[i] / total_weight;
            }
            blended
        };

        let best = scores.iter().cloned().fold(f64::MIN, f64::max);
        let tied: Vec<Strategy> = Strategy::ALL
            .into_iter()
            .filter(|s| best - scores[s.index()] <= self.tie_epsilon)
            .collect();
        let strategy = tied[0];
        if tied.len() > 1 {
            rationale.push(format!(
                "tie_break:{}",
                tied.iter().map(Strategy::as_str).collect::<Vec<_>>().join(">")
            ));
        }

        let winner = scores[strategy.index()];
        let runner_up = Strategy::ALL
            .into_iter()
            .filter(|s| *s != strategy)
            .map(|s| scores[s.index()])
            .fold(f64::MIN, f64::max);
        let confidence = if winner > 0.0 {
            ((winner - runner_up) / winner).clamp(0.0, 1.0)
        } else {
            0.0
        };

        ClassificationDecision {
            strategy,
            confidence,
            scores: StrategyScores::from_array(scores),
            matched_patterns,
            rationale,
            signature: features.signature,
        }
    }
}

fn static_scores(features: &MessageFeatures, rationale: &mut Vec<String>) -> [f64; 3] {
    let hits = [
        features.sql_hits(),
        features.retrieval_hits(),
        features.general_hits(),
    ];
    if !features.metric.is_empty() {
        rationale.push(format!("metric_keywords:{}", features.metric.len()));
    }
    if !features.temporal.is_empty() {
        rationale.push(format!("temporal_keywords:{}", features.temporal.len()));
    }
    if !features.numeric.is_empty() {
        rationale.push(format!("numeric_tokens:{}", features.numeric.len()));
    }
    if !features.conceptual.is_empty() {
        rationale.push(format!("conceptual_keywords:{}", features.conceptual.len()));
    }
    if !features.conversational.is_empty() {
        rationale.push(format!(
            "conversational_markers:{}",
            features.conversational.len()
        ));
    }

    let total: usize = hits.iter().sum();
    let mut scores = [0.0; 3];
    for (score, hit) in scores.iter_mut().zip(hits) {
        *score = hit as f64 / total as f64;
    }
    scores
}
