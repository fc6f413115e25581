//! Message normalization and feature extraction
//!
//! Messages are lowercased, accent-folded and stripped of punctuation
//! before matching. Keyword vocabularies may contain single words or
//! two-word phrases; phrases are matched against adjacent token pairs.

use std::collections::{BTreeSet, HashSet};

use crate::config::ClassifierConfig;

/// Messages with at most this many tokens are considered short
const SHORT_QUERY_TOKENS: usize = 3;
/// Messages with at most this many tokens are considered medium length
const MEDIUM_QUERY_TOKENS: usize = 10;

/// Keyword matches and the pattern signature of one message
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageFeatures {
    /// Normalized tokens in order
    pub tokens: Vec<String>,
    /// Matched aggregation/metric keywords
    pub metric: Vec<String>,
    /// Matched time-range keywords
    pub temporal: Vec<String>,
    /// Tokens containing digits (years, quantities)
    pub numeric: Vec<String>,
    /// Matched conceptual/explanatory keywords
    pub conceptual: Vec<String>,
    /// Matched greetings and acknowledgments
    pub conversational: Vec<String>,
    /// Sorted, deduplicated pattern keys for this message
    pub signature: Vec<String>,
}

impl MessageFeatures {
    /// Hits that favor the analytical SQL strategy
    pub fn sql_hits(&self) -> usize {
        self.metric.len() + self.temporal.len() + self.numeric.len()
    }

    /// Hits that favor document retrieval
    pub fn retrieval_hits(&self) -> usize {
        self.conceptual.len()
    }

    /// Hits that favor open conversation
    pub fn general_hits(&self) -> usize {
        self.conversational.len()
    }

    /// Whether any SQL or retrieval category keyword matched
    pub fn has_category_keywords(&self) -> bool {
        self.sql_hits() + self.retrieval_hits() > 0
    }
}

/// Extracts [`MessageFeatures`] using a configured vocabulary
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    metric: HashSet<String>,
    temporal: HashSet<String>,
    conceptual: HashSet<String>,
    conversational: HashSet<String>,
}

fn vocabulary(words: &[String]) -> HashSet<String> {
    words
        .iter()
        .map(|w| normalize(w).join(" "))
        .filter(|w| !w.is_empty())
        .collect()
}

impl FeatureExtractor {
    /// Builds an extractor from the classifier configuration
    pub fn new(config: &ClassifierConfig) -> Self {
        Self {
            metric: vocabulary(&config.metric_keywords),
            temporal: vocabulary(&config.temporal_keywords),
            conceptual: vocabulary(&config.conceptual_keywords),
            conversational: vocabulary(&config.conversational_markers),
        }
    }

    /// Extracts features from a raw message
    ///
    /// # Examples
    ///
    /// ```
    /// use warehouse_router::classifier::FeatureExtractor;
    /// use warehouse_router::config::ClassifierConfig;
    ///
    /// let extractor = FeatureExtractor::new(&ClassifierConfig::default());
    /// let features = extractor.extract("Qual a receita de 2024?");
    /// assert!(features.metric.contains(&"receita".to_string()));
    /// assert_eq!(features.numeric, vec!["2024".to_string()]);
    /// ```
    pub fn extract(&self, message: &str) -> MessageFeatures {
        let tokens = normalize(message);

        let mut candidates: Vec<String> = tokens.clone();
        candidates.extend(tokens.windows(2).map(|pair| pair.join(" ")));

        let matching = |set: &HashSet<String>| -> Vec<String> {
            let found: BTreeSet<&String> = candidates.iter().filter(|c| set.contains(*c)).collect();
            found.into_iter().cloned().collect()
        };

        let metric = matching(&self.metric);
        let temporal = matching(&self.temporal);
        let conceptual = matching(&self.conceptual);
        let conversational = matching(&self.conversational);
        let numeric: Vec<String> = tokens
            .iter()
            .filter(|t| t.chars().any(|c| c.is_ascii_digit()))
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut signature = BTreeSet::new();
        for kw in metric.iter().chain(&temporal).chain(&conceptual) {
            signature.insert(format!("kw:{}", kw));
        }
        for marker in &conversational {
            signature.insert(format!("conv:{}", marker));
        }
        if !numeric.is_empty() {
            signature.insert("numeric".to_string());
        }
        if message.contains('?') {
            signature.insert("question".to_string());
        }
        let shape = match tokens.len() {
            n if n <= SHORT_QUERY_TOKENS => "shape:short",
            n if n <= MEDIUM_QUERY_TOKENS => "shape:medium",
            _ => "shape:long",
        };
        signature.insert(shape.to_string());

        MessageFeatures {
            tokens,
            metric,
            temporal,
            numeric,
            conceptual,
            conversational,
            signature: signature.into_iter().collect(),
        }
    }
}

/// Lowercases, folds accents and splits a message into tokens
///
/// # Examples
///
/// ```
/// use warehouse_router::classifier::features::normalize;
///
/// assert_eq!(normalize("Último trimestre!"), vec!["ultimo", "trimestre"]);
/// ```
pub fn normalize(text: &str) -> Vec<String> {
    let folded: String = text
        .chars()
        .flat_map(char::to_lowercase)
        .map(fold_accent)
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    folded.split_whitespace().map(str::to_string).collect()
}

fn fold_accent(c: char) -> char {
    match c {
        'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'ç' => 'c',
        'ñ' => 'n',
        other => other,
    }
}
