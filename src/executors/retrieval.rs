//! Document retrieval executor
//!
//! Retrieval goes through the [`PassageSearch`] collaborator, which returns
//! the top-k passages for a query with relevance scores. The bundled
//! [`KeywordIndex`] scores passages by lexical overlap with the query.
//!
//! The index also implements [`KnowledgeBase`], so documents learned from
//! feedback can be added while the router is running.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, RwLock, RwLockReadGuard};

use super::{ExecutorError, Payload, PayloadData, SessionContext, StrategyExecutor};
use crate::classifier::features::normalize;
use crate::error::{Result, RouterError};

/// Tokens shorter than this are ignored when scoring
const MIN_TERM_LEN: usize = 3;

/// A scored passage returned by a search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    /// Source document identifier
    pub id: String,
    /// Passage text
    pub content: String,
    /// Relevance in [0, 1], higher is better
    pub score: f64,
    /// Optional category of the source document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

/// Top-k passage search
#[async_trait]
pub trait PassageSearch: Send + Sync {
    /// Returns at most `top_k` passages, best first
    async fn search(
        &self,
        query: &str,
        top_k: usize,
    ) -> std::result::Result<Vec<Passage>, ExecutorError>;
}

/// Knowledge that can grow while the router runs
pub trait KnowledgeBase: Send + Sync {
    /// Adds `document` unless one with the same id is already present
    ///
    /// Returns whether the document was added.
    ///
    /// # Errors
    ///
    /// Returns error if the backing store rejects the document
    fn add_document(&self, document: KnowledgeDocument) -> Result<bool>;
}

/// A document in the knowledge file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeDocument {
    /// Document identifier
    pub id: String,
    /// Full text
    pub content: String,
    /// Optional category
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Deserialize)]
struct KnowledgeFile {
    documents: Vec<KnowledgeDocument>,
}

#[derive(Debug, Clone)]
struct IndexedDocument {
    document: KnowledgeDocument,
    terms: HashSet<String>,
}

fn terms(text: &str) -> HashSet<String> {
    normalize(text)
        .into_iter()
        .filter(|t| t.chars().count() >= MIN_TERM_LEN)
        .collect()
}

/// In-memory lexical passage index
///
/// # Examples
///
/// ```
/// use warehouse_router::executors::retrieval::{KeywordIndex, KnowledgeDocument};
///
/// let index = KeywordIndex::new(vec![KnowledgeDocument {
///     id: "dw".into(),
///     content: "O Data Warehouse usa modelagem dimensional".into(),
///     category: None,
/// }]);
/// assert_eq!(index.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct KeywordIndex {
    documents: RwLock<Vec<IndexedDocument>>,
}

fn indexed(document: KnowledgeDocument) -> IndexedDocument {
    IndexedDocument {
        terms: terms(&document.content),
        document,
    }
}

impl KeywordIndex {
    /// Indexes the given documents
    pub fn new(documents: Vec<KnowledgeDocument>) -> Self {
        Self {
            documents: RwLock::new(documents.into_iter().map(indexed).collect()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<IndexedDocument>> {
        // Writers only push whole documents, so a poisoned lock holds a valid list.
        self.documents.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Loads documents from a YAML knowledge file
    ///
    /// The file holds a `documents` list with `id`, `content` and an
    /// optional `category` per entry.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            RouterError::Config(format!(
                "Failed to read knowledge file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_yaml(&contents)
    }

    /// Parses documents from YAML text
    ///
    /// # Errors
    ///
    /// Returns `RouterError::Yaml` if the text is not a valid knowledge file
    pub fn from_yaml(contents: &str) -> Result<Self> {
        let file: KnowledgeFile = serde_yaml::from_str(contents).map_err(RouterError::from)?;
        Ok(Self::new(file.documents))
    }

    /// Built-in company overview used when no knowledge file is configured
    pub fn builtin() -> Self {
        let doc = |id: &str, category: &str, content: &str| KnowledgeDocument {
            id: id.to_string(),
            content: content.to_string(),
            category: Some(category.to_string()),
        };
        Self::new(vec![
            doc(
                "company_overview",
                "empresa",
                "Somos uma consultoria de analise de dados e business intelligence que \
                 desenvolve projetos, implementa solucoes de tecnologia e presta consultoria estrategica.",
            ),
            doc(
                "data_warehouse",
                "tecnologia",
                "O Data Warehouse segue modelagem dimensional. Tabelas de fatos guardam metricas \
                 como receita, horas trabalhadas e tickets; dimensoes dao contexto de clientes, \
                 funcionarios, projetos e datas.",
            ),
            doc(
                "kpis",
                "metricas",
                "Os principais KPIs sao receita mensal e anual por cliente e projeto, utilizacao \
                 de recursos, SLA de tickets de suporte, margem por projeto e tempo medio de resolucao.",
            ),
            doc(
                "currencies",
                "financeiro",
                "Trabalhamos com BRL, USD e EUR. As analises financeiras convertem valores para USD \
                 como moeda base de comparacao.",
            ),
            doc(
                "projects",
                "projetos",
                "Projetos sao classificados por tipo de contrato (fixo, por hora, retainer), \
                 tecnologia principal, status e cliente, cada um com equipe dedicada.",
            ),
            doc(
                "teams",
                "organizacao",
                "A estrutura organizacional tem departamentos de desenvolvimento, analise de dados, \
                 consultoria, suporte, vendas e marketing.",
            ),
        ])
    }

    /// Number of indexed documents
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether the index is empty
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Scores every document against `query` and returns the best `top_k`
    ///
    /// The score is the share of query terms found in the document.
    /// Documents sharing no term are omitted; ties keep file order.
    pub fn rank(&self, query: &str, top_k: usize) -> Vec<Passage> {
        let query_terms = terms(query);
        if query_terms.is_empty() {
            return Vec::new();
        }

        let documents = self.read();
        let mut scored: Vec<(usize, f64)> = documents
            .iter()
            .enumerate()
            .filter_map(|(i, doc)| {
                let shared = query_terms.intersection(&doc.terms).count();
                (shared > 0).then(|| (i, shared as f64 / query_terms.len() as f64))
            })
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        scored
            .into_iter()
            .take(top_k)
            .map(|(i, score)| {
                let doc = &documents[i].document;
                Passage {
                    id: doc.id.clone(),
                    content: doc.content.clone(),
                    score,
                    category: doc.category.clone(),
                }
            })
            .collect()
    }
}

#[async_trait]
impl PassageSearch for KeywordIndex {
    async fn search(
        &self,
        query: &str,
        top_k: usize,
    ) -> std::result::Result<Vec<Passage>, ExecutorError> {
        Ok(self.rank(query, top_k))
    }
}

impl KnowledgeBase for KeywordIndex {
    fn add_document(&self, document: KnowledgeDocument) -> Result<bool> {
        let mut documents = self
            .documents
            .write()
            .unwrap_or_else(|e| e.into_inner());
        if documents.iter().any(|d| d.document.id == document.id) {
            return Ok(false);
        }
        tracing::debug!(id = %document.id, "Indexed learned document");
        documents.push(indexed(document));
        Ok(true)
    }
}

/// Answers conceptual questions from retrieved passages
pub struct RetrievalExecutor {
    search: Arc<dyn PassageSearch>,
    top_k: usize,
}

impl RetrievalExecutor {
    /// Creates an executor returning up to `top_k` passages
    pub fn new(search: Arc<dyn PassageSearch>, top_k: usize) -> Self {
        Self {
            search,
            top_k: top_k.max(1),
        }
    }
}

#[async_trait]
impl StrategyExecutor for RetrievalExecutor {
    async fn execute(
        &self,
        content: &str,
        _context: &SessionContext,
    ) -> std::result::Result<Payload, ExecutorError> {
        let passages = self.search.search(content, self.top_k).await?;
        tracing::debug!(passages = passages.len(), "Retrieved passages");

        let text = if passages.is_empty() {
            "Não encontrei informações relevantes na base de conhecimento.".to_string()
        } else {
            let mut text = String::from("Informações relevantes da base de conhecimento:");
            for (i, passage) in passages.iter().enumerate() {
                text.push_str(&format!("\n{}. {}", i + 1, passage.content.trim()));
            }
            text
        };

        Ok(Payload {
            text,
            data: PayloadData::Passages { passages },
        })
    }
}
