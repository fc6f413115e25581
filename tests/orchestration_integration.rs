//! Integration tests for the per-message pipeline
//!
//! Covers dispatch retries and timeouts, session rotation, context
//! isolation between sessions and concurrent traffic.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{create_test_warehouse, in_memory_router, Executors, ScriptedExecutor};
use futures::future::join_all;
use tempfile::TempDir;
use warehouse_router::config::Config;
use warehouse_router::executors::{
    ExecutorError, ExecutorSet, KeywordIndex, PayloadData, RetrievalExecutor,
    SqliteAnalyticsExecutor,
};
use warehouse_router::session::{Role, SessionStatus};
use warehouse_router::{RouterError, Strategy};

const REVENUE: &str = "Qual foi a receita total do último trimestre?";

fn config_with_bound(bound: usize) -> Config {
    let mut config = Config::default();
    config.session.max_interactions = bound;
    config
}

fn router_error(err: &anyhow::Error) -> &RouterError {
    err.downcast_ref::<RouterError>()
        .unwrap_or_else(|| panic!("expected RouterError, got {:#}", err))
}

#[tokio::test]
async fn test_each_strategy_is_dispatched_to_its_executor() {
    let executors = Executors::new();
    let router = in_memory_router(&Config::default(), executors.set());
    let session = router.create_session(None).unwrap();

    let sql = router.handle(session.id, REVENUE).await.unwrap();
    let retrieval = router
        .handle(session.id, "Como funciona nosso Data Warehouse?")
        .await
        .unwrap();
    let general = router.handle(session.id, "Olá, obrigado!").await.unwrap();

    assert_eq!(sql.strategy(), Strategy::Sql);
    assert_eq!(retrieval.strategy(), Strategy::Retrieval);
    assert_eq!(general.strategy(), Strategy::General);
    assert_eq!(executors.sql.calls(), 1);
    assert_eq!(executors.retrieval.calls(), 1);
    assert_eq!(executors.general.calls(), 1);
    assert_eq!(general.payload.text, "general");
}

#[tokio::test]
async fn test_transient_failure_succeeds_on_retry() {
    let sql = ScriptedExecutor::with_script(
        "sql",
        vec![Err(ExecutorError::Transient("database is locked".into()))],
    );
    let executors = Executors::with_sql(sql);
    let router = in_memory_router(&Config::default(), executors.set());
    let session = router.create_session(None).unwrap();

    let envelope = router.handle(session.id, REVENUE).await.unwrap();

    assert_eq!(envelope.payload.text, "sql");
    assert_eq!(executors.sql.calls(), 2);
    assert_eq!(executors.retrieval.calls(), 0);
    assert_eq!(executors.general.calls(), 0);
}

#[tokio::test]
async fn test_second_transient_failure_surfaces_without_fallback() {
    let sql = ScriptedExecutor::with_script(
        "sql",
        vec![
            Err(ExecutorError::Transient("database is locked".into())),
            Err(ExecutorError::Transient("database is locked".into())),
        ],
    );
    let executors = Executors::with_sql(sql);
    let router = in_memory_router(&Config::default(), executors.set());
    let session = router.create_session(None).unwrap();

    let err = router.handle(session.id, REVENUE).await.unwrap_err();

    match router_error(&err) {
        RouterError::StrategyExecutionFailed { strategy, cause } => {
            assert_eq!(*strategy, Strategy::Sql);
            assert!(cause.contains("database is locked"));
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(executors.sql.calls(), 2);
    assert_eq!(executors.general.calls(), 0);
}

#[tokio::test]
async fn test_timeout_is_treated_as_transient() {
    let mut config = Config::default();
    config.executors.timeout_seconds = 1;
    let executors = Executors::with_sql(ScriptedExecutor::slow("sql", Duration::from_secs(5)));
    let router = in_memory_router(&config, executors.set());
    let session = router.create_session(None).unwrap();

    let err = router.handle(session.id, REVENUE).await.unwrap_err();

    match router_error(&err) {
        RouterError::StrategyExecutionFailed { strategy, cause } => {
            assert_eq!(*strategy, Strategy::Sql);
            assert!(cause.contains("timed out"), "cause: {}", cause);
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(executors.sql.calls(), 2);
}

#[tokio::test]
async fn test_failed_message_still_counts_toward_bound() {
    let sql = ScriptedExecutor::with_script(
        "sql",
        vec![Err(ExecutorError::Permanent("no matching analytical query".into()))],
    );
    let executors = Executors::with_sql(sql);
    let router = in_memory_router(&config_with_bound(2), executors.set());
    let session = router.create_session(None).unwrap();

    assert!(router.handle(session.id, REVENUE).await.is_err());
    let envelope = router.handle(session.id, REVENUE).await.unwrap();

    assert_eq!(envelope.interactions, 2);
    assert!(envelope.rotated());
}

#[tokio::test]
async fn test_rotation_at_bound_and_continuation() {
    let executors = Executors::new();
    let router = in_memory_router(&config_with_bound(2), executors.set());
    let session = router.create_session(Some("trimestre")).unwrap();

    let first = router.handle(session.id, REVENUE).await.unwrap();
    assert!(!first.rotated());
    assert_eq!(first.interactions, 1);

    let second = router.handle(session.id, REVENUE).await.unwrap();
    let next = second.next_session.expect("session should rotate at the bound");
    assert_eq!(second.interactions, 2);

    // The reply that completed the bound is still recorded in the old session
    let old = router.sessions().get(session.id).unwrap().unwrap();
    assert_eq!(old.status, SessionStatus::Rotated);
    assert_eq!(old.successor, Some(next));
    assert_eq!(old.messages.len(), 4);
    assert_eq!(old.messages[3].id, second.message.id);

    let err = router.handle(session.id, REVENUE).await.unwrap_err();
    assert!(matches!(
        router_error(&err),
        RouterError::SessionUnavailable { .. }
    ));
    assert!(err.to_string().contains(&next.to_string()));

    let third = router.handle(next, REVENUE).await.unwrap();
    assert_eq!(third.interactions, 1);
    assert_eq!(third.session_id, next);

    let successor = router.sessions().get(next).unwrap().unwrap();
    assert_eq!(successor.title, "trimestre");
}

#[tokio::test]
async fn test_deleted_session_rejects_messages() {
    let router = in_memory_router(&Config::default(), Executors::new().set());
    let session = router.create_session(None).unwrap();
    router.sessions().delete_session(session.id).unwrap();

    let err = router.handle(session.id, REVENUE).await.unwrap_err();
    match router_error(&err) {
        RouterError::SessionUnavailable { reason, .. } => assert_eq!(reason, "session deleted"),
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn test_context_never_crosses_sessions() {
    let executors = Executors::new();
    let router = in_memory_router(&Config::default(), executors.set());
    let a = router.create_session(None).unwrap();
    let b = router.create_session(None).unwrap();

    router.handle(a.id, REVENUE).await.unwrap();
    router.handle(a.id, "Quantos clientes temos?").await.unwrap();
    router.handle(b.id, "Qual o faturamento de 2024?").await.unwrap();

    let contexts = executors.sql.contexts();
    assert_eq!(contexts.len(), 3);
    assert!(contexts[0].is_empty());
    assert_eq!(contexts[1].len(), 2);
    assert!(contexts[1].iter().all(|m| m.session_id == a.id));
    assert!(contexts[2].is_empty(), "session b must not see session a");
}

#[tokio::test]
async fn test_context_is_limited_to_recent_messages() {
    let mut config = Config::default();
    config.session.context_messages = 3;
    let executors = Executors::new();
    let router = in_memory_router(&config, executors.set());
    let session = router.create_session(None).unwrap();

    for _ in 0..4 {
        router.handle(session.id, REVENUE).await.unwrap();
    }

    let last = executors.sql.contexts().pop().unwrap();
    assert_eq!(last.len(), 3);
    assert_eq!(last.last().unwrap().role, Role::Assistant);
}

#[tokio::test]
async fn test_concurrent_sessions_are_independent() {
    let executors = Executors::with_sql(ScriptedExecutor::slow("sql", Duration::from_millis(50)));
    let router = Arc::new(in_memory_router(&Config::default(), executors.set()));

    let sessions: Vec<_> = (0..8)
        .map(|_| router.create_session(None).unwrap().id)
        .collect();

    let handles: Vec<_> = sessions
        .iter()
        .map(|id| {
            let router = Arc::clone(&router);
            let id = *id;
            tokio::spawn(async move { router.handle(id, REVENUE).await })
        })
        .collect();

    for handle in join_all(handles).await {
        let envelope = handle.unwrap().unwrap();
        assert_eq!(envelope.interactions, 1);
    }
    for id in sessions {
        let session = router.sessions().get(id).unwrap().unwrap();
        assert_eq!(session.messages.len(), 2);
        assert!(session.messages.iter().all(|m| m.session_id == id));
    }
}

#[tokio::test]
async fn test_concurrent_messages_respect_the_bound() {
    let router = in_memory_router(&config_with_bound(3), Executors::new().set());
    let session = router.create_session(None).unwrap();

    let results = join_all((0..6).map(|_| router.handle(session.id, REVENUE))).await;

    let accepted: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(accepted.len(), 3);
    let mut counters: Vec<_> = accepted.iter().map(|e| e.interactions).collect();
    counters.sort();
    assert_eq!(counters, vec![1, 2, 3]);
    assert_eq!(accepted.iter().filter(|e| e.rotated()).count(), 1);

    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert!(matches!(
            router_error(err),
            RouterError::SessionUnavailable { .. }
        ));
    }

    let stored = router.sessions().get(session.id).unwrap().unwrap();
    assert_eq!(stored.interactions, 3);
}

#[tokio::test]
async fn test_sql_answers_from_warehouse() {
    let dir = TempDir::new().unwrap();
    let warehouse = create_test_warehouse(&dir);
    let executors = ExecutorSet {
        sql: Arc::new(SqliteAnalyticsExecutor::new(&warehouse).unwrap()),
        retrieval: Arc::new(RetrievalExecutor::new(Arc::new(KeywordIndex::builtin()), 3)),
        general: ScriptedExecutor::new("general"),
    };
    let router = in_memory_router(&Config::default(), executors);
    let session = router.create_session(None).unwrap();

    let envelope = router
        .handle(session.id, "Quantos clientes temos?")
        .await
        .unwrap();

    assert_eq!(envelope.strategy(), Strategy::Sql);
    match &envelope.payload.data {
        PayloadData::Rows { query, rows, .. } => {
            assert_eq!(query, "count_clients");
            assert_eq!(rows[0][0], serde_json::json!(3));
        }
        other => panic!("expected rows, got {:?}", other),
    }
    assert_eq!(envelope.message.content, envelope.payload.text);
}

#[tokio::test]
async fn test_missing_warehouse_table_is_a_permanent_failure() {
    let dir = TempDir::new().unwrap();
    let warehouse = create_test_warehouse(&dir);
    let sql = Arc::new(SqliteAnalyticsExecutor::new(&warehouse).unwrap());
    let executors = ExecutorSet {
        sql,
        retrieval: ScriptedExecutor::new("retrieval"),
        general: ScriptedExecutor::new("general"),
    };
    let router = in_memory_router(&Config::default(), executors);
    let session = router.create_session(None).unwrap();

    let err = router
        .handle(session.id, "Qual o SLA dos tickets por prioridade?")
        .await
        .unwrap_err();

    match router_error(&err) {
        RouterError::StrategyExecutionFailed { strategy, cause } => {
            assert_eq!(*strategy, Strategy::Sql);
            assert!(cause.contains("no such table"), "cause: {}", cause);
        }
        other => panic!("unexpected error {:?}", other),
    }
}
