//! Configuration management for the warehouse router
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::error::{Result, RouterError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure
///
/// Holds the policy constants of the routing core (session bound,
/// classification blend, learning rates) and the settings of the
/// collaborators it talks to.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Chat session lifecycle settings
    #[serde(default)]
    pub session: SessionConfig,
    /// Classifier policy constants and keyword vocabulary
    #[serde(default)]
    pub classifier: ClassifierConfig,
    /// Feedback learning settings
    #[serde(default)]
    pub learning: LearningConfig,
    /// Strategy executor settings
    #[serde(default)]
    pub executors: ExecutorConfig,
    /// Storage locations
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Chat session lifecycle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Completed exchanges allowed per session before it rotates
    #[serde(default = "default_max_interactions")]
    pub max_interactions: usize,

    /// Number of recent messages handed to executors as context
    #[serde(default = "default_context_messages")]
    pub context_messages: usize,

    /// Title given to sessions created without one
    #[serde(default = "default_session_title")]
    pub default_title: String,
}

fn default_max_interactions() -> usize {
    10
}

fn default_context_messages() -> usize {
    5
}

fn default_session_title() -> String {
    "Nova Conversa".to_string()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_interactions: default_max_interactions(),
            context_messages: default_context_messages(),
            default_title: default_session_title(),
        }
    }
}

/// Classifier configuration
///
/// Keyword lists are matched against accent-folded, lowercased tokens.
/// Entries may be single words or two-word phrases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Share of the final score taken from learned pattern weights (0.0-1.0)
    #[serde(default = "default_blend_ratio")]
    pub blend_ratio: f64,

    /// Scores closer than this are resolved by the tie-break order
    #[serde(default = "default_tie_epsilon")]
    pub tie_epsilon: f64,

    /// Learned weight assumed for a strategy a mature pattern has no data for
    #[serde(default = "default_neutral_weight")]
    pub neutral_weight: f64,

    /// Aggregation, metric and dimensional vocabulary
    #[serde(default = "default_metric_keywords")]
    pub metric_keywords: Vec<String>,

    /// Time-range vocabulary
    #[serde(default = "default_temporal_keywords")]
    pub temporal_keywords: Vec<String>,

    /// Conceptual and explanatory vocabulary
    #[serde(default = "default_conceptual_keywords")]
    pub conceptual_keywords: Vec<String>,

    /// Greetings and acknowledgments
    #[serde(default = "default_conversational_markers")]
    pub conversational_markers: Vec<String>,
}

fn default_blend_ratio() -> f64 {
    0.8
}

fn default_tie_epsilon() -> f64 {
    0.05
}

fn default_neutral_weight() -> f64 {
    0.5
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|w| w.to_string()).collect()
}

fn default_metric_keywords() -> Vec<String> {
    words(&[
        "quantos", "quanto", "quantas", "qual", "quais", "total", "soma", "media", "maximo",
        "minimo", "receita", "faturamento", "vendas", "cliente", "clientes", "projeto",
        "projetos", "funcionarios", "empregados", "ticket", "tickets", "sla", "horas",
        "utilizacao", "performance", "relatorio", "dados", "numero", "valor", "custo", "lucro",
        "margem", "crescimento", "tendencia", "comparar", "comparacao", "ranking", "top",
        "melhor", "pior", "maior", "menor", "revenue", "count", "sum", "average", "clients",
        "projects", "hours", "utilization",
    ])
}

fn default_temporal_keywords() -> Vec<String> {
    words(&[
        "ultimo", "ultima", "ultimos", "ultimas", "recente", "trimestre", "mes", "mensal",
        "ano", "anual", "semana", "semanal", "hoje", "ontem", "periodo", "quarter", "month",
        "year", "este ano", "ano passado",
    ])
}

fn default_conceptual_keywords() -> Vec<String> {
    words(&[
        "como", "por que", "porque", "explique", "explicar", "definir", "definicao",
        "conceito", "significado", "diferenca", "vantagem", "desvantagem", "beneficio",
        "processo", "metodologia", "estrategia", "analise", "interpretacao", "insight",
        "funciona", "descreva", "descrever", "how", "why", "explain", "describe",
    ])
}

fn default_conversational_markers() -> Vec<String> {
    words(&[
        "ola", "oi", "obrigado", "obrigada", "valeu", "bom dia", "boa tarde", "boa noite",
        "tchau", "ok", "beleza", "hello", "hi", "thanks",
    ])
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            blend_ratio: default_blend_ratio(),
            tie_epsilon: default_tie_epsilon(),
            neutral_weight: default_neutral_weight(),
            metric_keywords: default_metric_keywords(),
            temporal_keywords: default_temporal_keywords(),
            conceptual_keywords: default_conceptual_keywords(),
            conversational_markers: default_conversational_markers(),
        }
    }
}

/// Feedback learning configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningConfig {
    /// Exponential smoothing factor applied per feedback event (0.0-1.0]
    #[serde(default = "default_smoothing_alpha")]
    pub smoothing_alpha: f64,

    /// Observations a pattern needs before its learned weight counts
    #[serde(default = "default_min_observations")]
    pub min_observations: u64,

    /// Days after which idle, immature patterns and old feedback are pruned
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
}

fn default_smoothing_alpha() -> f64 {
    0.3
}

fn default_min_observations() -> u64 {
    3
}

/// Upper bound for `learning.retention_days` (one hundred years)
pub const MAX_RETENTION_DAYS: i64 = 36_500;

fn default_retention_days() -> i64 {
    90
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            smoothing_alpha: default_smoothing_alpha(),
            min_observations: default_min_observations(),
            retention_days: default_retention_days(),
        }
    }
}

/// Strategy executor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Upper bound for a single executor call (seconds)
    #[serde(default = "default_executor_timeout")]
    pub timeout_seconds: u64,

    /// SQLite file holding the dimensional warehouse
    #[serde(default = "default_warehouse_db")]
    pub warehouse_db: String,

    /// Passages returned per retrieval
    #[serde(default = "default_retrieval_top_k")]
    pub retrieval_top_k: usize,

    /// Optional YAML file with knowledge-base documents
    #[serde(default)]
    pub knowledge_path: Option<String>,

    /// Ollama settings for general conversation
    #[serde(default)]
    pub ollama: OllamaConfig,
}

fn default_executor_timeout() -> u64 {
    30
}

fn default_warehouse_db() -> String {
    "data/warehouse.db".to_string()
}

fn default_retrieval_top_k() -> usize {
    3
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_executor_timeout(),
            warehouse_db: default_warehouse_db(),
            retrieval_top_k: default_retrieval_top_k(),
            knowledge_path: None,
            ollama: OllamaConfig::default(),
        }
    }
}

/// Ollama configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Ollama server host
    #[serde(default = "default_ollama_host")]
    pub host: String,

    /// Model to use for Ollama
    #[serde(default = "default_ollama_model")]
    pub model: String,
}

fn default_ollama_host() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "llama3.2:latest".to_string()
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: default_ollama_host(),
            model: default_ollama_model(),
        }
    }
}

/// Storage locations
///
/// `None` means the platform data directory is used.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    /// SQLite file with chats, messages and feedback
    #[serde(default)]
    pub history_db: Option<String>,

    /// sled directory with learned patterns
    #[serde(default)]
    pub patterns_db: Option<String>,
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| RouterError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| RouterError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(value) = std::env::var("WAREHOUSE_ROUTER_MAX_INTERACTIONS") {
            if let Ok(parsed) = value.parse() {
                self.session.max_interactions = parsed;
            } else {
                tracing::warn!("Invalid WAREHOUSE_ROUTER_MAX_INTERACTIONS: {}", value);
            }
        }

        if let Ok(value) = std::env::var("WAREHOUSE_ROUTER_BLEND_RATIO") {
            if let Ok(parsed) = value.parse() {
                self.classifier.blend_ratio = parsed;
            } else {
                tracing::warn!("Invalid WAREHOUSE_ROUTER_BLEND_RATIO: {}", value);
            }
        }

        if let Ok(value) = std::env::var("WAREHOUSE_ROUTER_MIN_OBSERVATIONS") {
            if let Ok(parsed) = value.parse() {
                self.learning.min_observations = parsed;
            } else {
                tracing::warn!("Invalid WAREHOUSE_ROUTER_MIN_OBSERVATIONS: {}", value);
            }
        }

        if let Ok(value) = std::env::var("WAREHOUSE_ROUTER_SMOOTHING_ALPHA") {
            if let Ok(parsed) = value.parse() {
                self.learning.smoothing_alpha = parsed;
            } else {
                tracing::warn!("Invalid WAREHOUSE_ROUTER_SMOOTHING_ALPHA: {}", value);
            }
        }

        if let Ok(value) = std::env::var("WAREHOUSE_ROUTER_RETENTION_DAYS") {
            if let Ok(parsed) = value.parse() {
                self.learning.retention_days = parsed;
            } else {
                tracing::warn!("Invalid WAREHOUSE_ROUTER_RETENTION_DAYS: {}", value);
            }
        }

        if let Ok(value) = std::env::var("WAREHOUSE_ROUTER_EXECUTOR_TIMEOUT") {
            if let Ok(parsed) = value.parse() {
                self.executors.timeout_seconds = parsed;
            } else {
                tracing::warn!("Invalid WAREHOUSE_ROUTER_EXECUTOR_TIMEOUT: {}", value);
            }
        }

        if let Ok(path) = std::env::var("WAREHOUSE_ROUTER_WAREHOUSE_DB") {
            tracing::debug!(path = %path, "Env override: WAREHOUSE_ROUTER_WAREHOUSE_DB");
            self.executors.warehouse_db = path;
        }

        if let Ok(path) = std::env::var("WAREHOUSE_ROUTER_KNOWLEDGE_PATH") {
            self.executors.knowledge_path = Some(path);
        }

        if let Ok(host) = std::env::var("WAREHOUSE_ROUTER_OLLAMA_HOST") {
            self.executors.ollama.host = host;
        }

        if let Ok(model) = std::env::var("WAREHOUSE_ROUTER_OLLAMA_MODEL") {
            self.executors.ollama.model = model;
        }

        if let Ok(path) = std::env::var("WAREHOUSE_ROUTER_HISTORY_DB") {
            self.storage.history_db = Some(path);
        }

        if let Ok(path) = std::env::var("WAREHOUSE_ROUTER_PATTERNS_DB") {
            self.storage.patterns_db = Some(path);
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if let Some(path) = &cli.storage_path {
            tracing::debug!("Using history DB override from CLI: {}", path);
            self.storage.history_db = Some(path.clone());
        }
        if let Some(path) = &cli.warehouse_db {
            self.executors.warehouse_db = path.clone();
        }
    }

    /// Validate the configuration
    ///
    /// Ensures all policy constants are within acceptable ranges.
    ///
    /// # Errors
    ///
    /// Returns `RouterError::Config` describing the first failed check
    pub fn validate(&self) -> Result<()> {
        if self.session.max_interactions == 0 {
            return Err(RouterError::Config(
                "session.max_interactions must be greater than 0".to_string(),
            )
            .into());
        }

        if !(0.0..=1.0).contains(&self.classifier.blend_ratio) {
            return Err(RouterError::Config(
                "classifier.blend_ratio must be between 0.0 and 1.0".to_string(),
            )
            .into());
        }

        if !(0.0..1.0).contains(&self.classifier.tie_epsilon) {
            return Err(RouterError::Config(
                "classifier.tie_epsilon must be between 0.0 and 1.0".to_string(),
            )
            .into());
        }

        if !(0.0..=1.0).contains(&self.classifier.neutral_weight) {
            return Err(RouterError::Config(
                "classifier.neutral_weight must be between 0.0 and 1.0".to_string(),
            )
            .into());
        }

        if self.learning.smoothing_alpha <= 0.0 || self.learning.smoothing_alpha > 1.0 {
            return Err(RouterError::Config(
                "learning.smoothing_alpha must be in (0.0, 1.0]".to_string(),
            )
            .into());
        }

        if self.learning.retention_days <= 0
            || self.learning.retention_days > MAX_RETENTION_DAYS
        {
            return Err(RouterError::Config(format!(
                "learning.retention_days must be between 1 and {}",
                MAX_RETENTION_DAYS
            ))
            .into());
        }

        if self.executors.timeout_seconds == 0 {
            return Err(RouterError::Config(
                "executors.timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.executors.retrieval_top_k == 0 {
            return Err(RouterError::Config(
                "executors.retrieval_top_k must be greater than 0".to_string(),
            )
            .into());
        }

        Ok(())
    }
}
