//! Test utilities for the warehouse router
//!
//! Temporary directories, a small SQLite warehouse fixture, a sample
//! knowledge file and error assertion helpers.

use crate::config::Config;
use crate::error::RouterError;
use rusqlite::Connection;
use std::path::PathBuf;
use tempfile::TempDir;

/// Create a temporary directory for testing
///
/// # Returns
///
/// Returns a TempDir that will be cleaned up when dropped
pub fn temp_dir() -> TempDir {
    TempDir::new().expect("Failed to create temporary directory")
}

/// Create a test file with the given content
///
/// # Panics
///
/// Panics if file creation or writing fails
pub fn create_test_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).expect("Failed to write test file");
    path
}

/// Create a small warehouse database inside `dir`
///
/// Contains three clients, two projects and billing rows for 2023 and
/// 2024 (2024 revenue totals 3500.0, of which 2000.0 in Q2). Ticket and
/// timesheet tables are deliberately absent.
///
/// # Panics
///
/// Panics if the database cannot be created
pub fn create_test_warehouse(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("warehouse.db");
    let conn = Connection::open(&path).expect("Failed to create warehouse");
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
        INSERT INTO dw_dim_date VALUES
            (20230315, 2023, 1, 3), (20240210, 2024, 1, 2), (20240520, 2024, 2, 5);
        INSERT INTO dw_dim_currency VALUES (1, 'BRL'), (2, 'USD');
        INSERT INTO dw_fact_billing VALUES
            (1, 1, 20230315, 1, 800.0, 160.0),
            (1, 1, 20240210, 1, 1500.0, 300.0),
            (2, 2, 20240520, 2, 1200.0, 1200.0),
            (3, 2, 20240520, 2, 800.0, 800.0);",
    )
    .expect("Failed to populate warehouse");
    path
}

/// Sample knowledge base in the YAML format read by the keyword index
pub fn test_knowledge_yaml() -> String {
    r#"
documents:
  - id: data_warehouse
    category: tecnologia
    content: >
      O Data Warehouse segue modelagem dimensional, com tabelas de fatos
      para receita, horas e tickets e dimensoes de clientes e datas.
  - id: currencies
    category: financeiro
    content: >
      Trabalhamos com BRL, USD e EUR; analises financeiras convertem para USD.
  - id: teams
    category: organizacao
    content: >
      A empresa se organiza em departamentos de desenvolvimento, dados e suporte.
"#
    .to_string()
}

/// Assert that an error contains the expected message
///
/// # Panics
///
/// Panics if the result is Ok or if the error doesn't contain the expected message
pub fn assert_error_contains<T>(result: crate::error::Result<T>, expected: &str) {
    match result {
        Ok(_) => panic!("Expected error containing '{}' but got Ok", expected),
        Err(e) => {
            let error_msg = e.to_string();
            assert!(
                error_msg.contains(expected),
                "Error message '{}' does not contain '{}'",
                error_msg,
                expected
            );
        }
    }
}

/// Create a test configuration with default values
pub fn test_config() -> Config {
    Config::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_dir_creation() {
        let dir = temp_dir();
        assert!(dir.path().exists());
    }

    #[test]
    fn test_create_test_file() {
        let dir = temp_dir();
        let path = create_test_file(&dir, "test.txt", "content");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "content");
    }

    #[test]
    fn test_warehouse_fixture_has_clients() {
        let dir = temp_dir();
        let path = create_test_warehouse(&dir);
        let conn = Connection::open(path).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM dw_dim_client", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 3);
    }

    #[test]
    fn test_assert_error_contains_success() {
        let result: crate::error::Result<()> =
            Err(RouterError::Config("test error message".to_string()).into());
        assert_error_contains(result, "test error");
    }

    #[test]
    #[should_panic(expected = "Expected error containing")]
    fn test_assert_error_contains_ok() {
        assert_error_contains(Ok(()), "error");
    }

    #[test]
    fn test_test_config_validates() {
        assert!(test_config().validate().is_ok());
    }
}
