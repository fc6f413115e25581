use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::Connection;
use tempfile::TempDir;
use warehouse_router::config::Config;
use warehouse_router::executors::{
    ExecutorError, ExecutorSet, KeywordIndex, KnowledgeBase, Payload, SessionContext,
    StrategyExecutor,
};
use warehouse_router::learning::{LearningSystem, PatternArchive};
use warehouse_router::session::{Message, SessionManager};
use warehouse_router::storage::{ChatStore, SqliteStorage};
use warehouse_router::Orchestrator;

#[allow(dead_code)]
pub fn create_temp_storage() -> (SqliteStorage, TempDir) {
    let tmp = TempDir::new().expect("failed to create tempdir");
    let db_path = tmp.path().join("history.db");
    let storage =
        SqliteStorage::new_with_path(db_path).expect("failed to create sqlite storage with path");
    (storage, tmp)
}

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

/// Executor that replays scripted results, then answers with its tag
///
/// Every call is counted and the history it was given is kept.
#[allow(dead_code)]
pub struct ScriptedExecutor {
    tag: &'static str,
    script: Mutex<Vec<Result<Payload, ExecutorError>>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    contexts: Mutex<Vec<Vec<Message>>>,
}

#[allow(dead_code)]
impl ScriptedExecutor {
    pub fn new(tag: &'static str) -> Arc<Self> {
        Self::build(tag, Vec::new(), None)
    }

    pub fn with_script(tag: &'static str, script: Vec<Result<Payload, ExecutorError>>) -> Arc<Self> {
        Self::build(tag, script, None)
    }

    pub fn slow(tag: &'static str, delay: Duration) -> Arc<Self> {
        Self::build(tag, Vec::new(), Some(delay))
    }

    fn build(
        tag: &'static str,
        mut script: Vec<Result<Payload, ExecutorError>>,
        delay: Option<Duration>,
    ) -> Arc<Self> {
        script.reverse();
        Arc::new(Self {
            tag,
            script: Mutex::new(script),
            delay,
            calls: AtomicUsize::new(0),
            contexts: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn contexts(&self) -> Vec<Vec<Message>> {
        self.contexts.lock().unwrap().clone()
    }
}

#[async_trait]
impl StrategyExecutor for ScriptedExecutor {
    async fn execute(
        &self,
        _content: &str,
        context: &SessionContext,
    ) -> Result<Payload, ExecutorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.contexts.lock().unwrap().push(context.history.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.script.lock().unwrap().pop();
        match next {
            Some(result) => result,
            None => Ok(Payload::text(self.tag)),
        }
    }
}

/// Scripted executors for the three strategies
#[allow(dead_code)]
pub struct Executors {
    pub sql: Arc<ScriptedExecutor>,
    pub retrieval: Arc<ScriptedExecutor>,
    pub general: Arc<ScriptedExecutor>,
}

#[allow(dead_code)]
impl Executors {
    pub fn new() -> Self {
        Self::with_sql(ScriptedExecutor::new("sql"))
    }

    pub fn with_sql(sql: Arc<ScriptedExecutor>) -> Self {
        Self {
            sql,
            retrieval: ScriptedExecutor::new("retrieval"),
            general: ScriptedExecutor::new("general"),
        }
    }

    pub fn set(&self) -> ExecutorSet {
        ExecutorSet {
            sql: self.sql.clone(),
            retrieval: self.retrieval.clone(),
            general: self.general.clone(),
        }
    }
}

/// In-memory router over the given executors
#[allow(dead_code)]
pub fn in_memory_router(config: &Config, executors: ExecutorSet) -> Orchestrator {
    Orchestrator::new(
        config,
        SessionManager::new(config.session.clone()),
        LearningSystem::new(config.learning.clone()),
        executors,
    )
}

/// Router persisting chats under `dir`, as a fresh process would open it
#[allow(dead_code)]
pub fn persistent_router(config: &Config, dir: &TempDir, executors: ExecutorSet) -> Orchestrator {
    let store: Arc<dyn ChatStore> = Arc::new(
        SqliteStorage::new_with_path(dir.path().join("history.db"))
            .expect("failed to open history"),
    );
    let archive =
        PatternArchive::open(dir.path().join("patterns")).expect("failed to open pattern archive");
    let learning = LearningSystem::with_archive(config.learning.clone(), archive)
        .expect("failed to load patterns")
        .with_chat_store(store.clone());
    let sessions = SessionManager::with_store(config.session.clone(), store.clone())
        .expect("failed to restore sessions");

    Orchestrator::new(config, sessions, learning, executors).with_store(store)
}

/// Persistent router whose learning feeds the returned knowledge index
#[allow(dead_code)]
pub fn knowledge_router(
    config: &Config,
    dir: &TempDir,
    executors: ExecutorSet,
) -> (Orchestrator, Arc<KeywordIndex>) {
    let store: Arc<dyn ChatStore> = Arc::new(
        SqliteStorage::new_with_path(dir.path().join("history.db"))
            .expect("failed to open history"),
    );
    let index = Arc::new(KeywordIndex::new(Vec::new()));
    let archive =
        PatternArchive::open(dir.path().join("patterns")).expect("failed to open pattern archive");
    let learning = LearningSystem::with_archive(config.learning.clone(), archive)
        .expect("failed to load patterns")
        .with_chat_store(store.clone())
        .with_knowledge(index.clone() as Arc<dyn KnowledgeBase>)
        .expect("failed to restore knowledge");
    let sessions = SessionManager::with_store(config.session.clone(), store.clone())
        .expect("failed to restore sessions");

    let router = Orchestrator::new(config, sessions, learning, executors).with_store(store);
    (router, index)
}

/// Small warehouse with three clients and 2024 billing
#[allow(dead_code)]
pub fn create_test_warehouse(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("warehouse.db");
    let conn = Connection::open(&path).expect("failed to create warehouse");
    conn.execute_batch(
        "CREATE TABLE dw_dim_client (client_key INTEGER PRIMARY KEY, client_name TEXT);
        CREATE TABLE dw_dim_project (project_key INTEGER PRIMARY KEY, project_name TEXT);
        CREATE TABLE dw_dim_date (
            date_key INTEGER PRIMARY KEY, year INTEGER, quarter INTEGER, month INTEGER
        );
        CREATE TABLE dw_dim_currency (currency_key INTEGER PRIMARY KEY, currency_code TEXT);
        CREATE TABLE dw_fact_billing (
            client_key INTEGER, project_key INTEGER, date_key INTEGER, currency_key INTEGER,
            amount REAL, amount_usd REAL
        );
        INSERT INTO dw_dim_client VALUES (1, 'Acme'), (2, 'Globex'), (3, 'Initech');
        INSERT INTO dw_dim_project VALUES (1, 'Portal'), (2, 'Data Lake');
        INSERT INTO dw_dim_date VALUES (20240210, 2024, 1, 2), (20240520, 2024, 2, 5);
        INSERT INTO dw_dim_currency VALUES (1, 'BRL'), (2, 'USD');
        INSERT INTO dw_fact_billing VALUES
            (1, 1, 20240210, 1, 1500.0, 300.0),
            (2, 2, 20240520, 2, 1200.0, 1200.0),
            (3, 2, 20240520, 2, 800.0, 800.0);",
    )
    .expect("failed to populate warehouse");
    path
}
