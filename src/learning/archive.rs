//! Durable storage of learned patterns
//!
//! Patterns are kept in an embedded `sled` database keyed by pattern key,
//! with JSON-encoded values. Documents learned from feedback live in a
//! separate `knowledge` tree keyed by document id.

use sled::{Db, Tree};
use std::path::Path;

use crate::error::{Result, RouterError};
use crate::executors::KnowledgeDocument;
use crate::patterns::QueryPattern;

const KNOWLEDGE_TREE: &str = "knowledge";

/// Embedded key-value store for [`QueryPattern`]s
pub struct PatternArchive {
    db: Db,
    knowledge: Tree,
}

impl PatternArchive {
    /// Open or create a pattern archive
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the database directory
    ///
    /// # Errors
    ///
    /// Returns `RouterError::Storage` if the database cannot be opened
    ///
    /// # Examples
    ///
    /// ```
    /// use warehouse_router::learning::PatternArchive;
    ///
    /// # fn main() -> warehouse_router::error::Result<()> {
    /// let dir = tempfile::tempdir()?;
    /// let archive = PatternArchive::open(dir.path().join("patterns"))?;
    /// assert!(archive.load_all()?.is_empty());
    /// # Ok(())
    /// # }
    /// ```
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path)
            .map_err(|e| RouterError::Storage(format!("Failed to open pattern database: {}", e)))?;
        let knowledge = db
            .open_tree(KNOWLEDGE_TREE)
            .map_err(|e| RouterError::Storage(format!("Failed to open knowledge tree: {}", e)))?;
        Ok(Self { db, knowledge })
    }

    /// Writes the given patterns and flushes
    ///
    /// # Errors
    ///
    /// Returns `RouterError::Storage` if serialization or insertion fails
    pub fn save<'a, I>(&self, patterns: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a QueryPattern>,
    {
        for pattern in patterns {
            let value = serde_json::to_vec(pattern)
                .map_err(|e| RouterError::Storage(format!("Serialization failed: {}", e)))?;
            self.db
                .insert(pattern.key.as_bytes(), value)
                .map_err(|e| RouterError::Storage(format!("Insert failed: {}", e)))?;
        }

        self.db
            .flush()
            .map_err(|e| RouterError::Storage(format!("Flush failed: {}", e)))?;
        Ok(())
    }

    /// Removes patterns by key
    ///
    /// # Errors
    ///
    /// Returns `RouterError::Storage` if removal fails
    pub fn remove(&self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        for key in keys {
            self.db
                .remove(key.as_bytes())
                .map_err(|e| RouterError::Storage(format!("Remove failed: {}", e)))?;
        }
        self.db
            .flush()
            .map_err(|e| RouterError::Storage(format!("Flush failed: {}", e)))?;
        Ok(())
    }

    /// Loads every stored pattern
    ///
    /// # Errors
    ///
    /// Returns `RouterError::Storage` if iteration or deserialization fails
    pub fn load_all(&self) -> Result<Vec<QueryPattern>> {
        let mut patterns = Vec::new();
        for item in self.db.iter() {
            let (_, value) =
                item.map_err(|e| RouterError::Storage(format!("Iteration failed: {}", e)))?;
            let pattern: QueryPattern = serde_json::from_slice(&value)
                .map_err(|e| RouterError::Storage(format!("Deserialization failed: {}", e)))?;
            patterns.push(pattern);
        }
        Ok(patterns)
    }

    /// Stores a learned knowledge document and flushes
    ///
    /// # Errors
    ///
    /// Returns `RouterError::Storage` if serialization or insertion fails
    pub fn save_document(&self, document: &KnowledgeDocument) -> Result<()> {
        let value = serde_json::to_vec(document)
            .map_err(|e| RouterError::Storage(format!("Serialization failed: {}", e)))?;
        self.knowledge
            .insert(document.id.as_bytes(), value)
            .map_err(|e| RouterError::Storage(format!("Insert failed: {}", e)))?;
        self.knowledge
            .flush()
            .map_err(|e| RouterError::Storage(format!("Flush failed: {}", e)))?;
        Ok(())
    }

    /// Loads every learned knowledge document, ordered by id
    ///
    /// # Errors
    ///
    /// Returns `RouterError::Storage` if iteration or deserialization fails
    pub fn load_documents(&self) -> Result<Vec<KnowledgeDocument>> {
        let mut documents = Vec::new();
        for item in self.knowledge.iter() {
            let (_, value) =
                item.map_err(|e| RouterError::Storage(format!("Iteration failed: {}", e)))?;
            let document: KnowledgeDocument = serde_json::from_slice(&value)
                .map_err(|e| RouterError::Storage(format!("Deserialization failed: {}", e)))?;
            documents.push(document);
        }
        Ok(documents)
    }
}
