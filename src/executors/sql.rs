//! Analytical SQL executor over a fixed query catalog
//!
//! Questions are mapped to named, parameterized queries by regex intent
//! rules; no SQL is ever synthesized from the question text. Queries run
//! read-only against the SQLite warehouse on a blocking task.

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, Utc};
use regex::Regex;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, ErrorCode, OpenFlags};
use std::path::PathBuf;

use super::{ExecutorError, Payload, PayloadData, SessionContext, StrategyExecutor};
use crate::classifier::features::normalize;

/// Rows shown in the answer text
const PREVIEW_ROWS: usize = 5;

const MONTHLY_REVENUE: &str = "
    SELECT dd.year, dd.month, dc.currency_code AS currency,
           ROUND(SUM(fb.amount), 2) AS amount,
           ROUND(SUM(fb.amount_usd), 2) AS amount_usd
    FROM dw_fact_billing fb
    JOIN dw_dim_date dd ON fb.date_key = dd.date_key
    JOIN dw_dim_currency dc ON fb.currency_key = dc.currency_key
    GROUP BY dd.year, dd.month, dc.currency_code
    ORDER BY dd.year, dd.month, dc.currency_code";

const TOP_CLIENTS: &str = "
    SELECT dc.client_name, ROUND(SUM(fb.amount), 2) AS amount
    FROM dw_fact_billing fb
    JOIN dw_dim_client dc ON fb.client_key = dc.client_key
    GROUP BY dc.client_name
    ORDER BY amount DESC
    LIMIT 10";

const RESOURCE_UTILIZATION: &str = "
    SELECT dd.year, dd.month,
           SUM(ft.hours) AS hours,
           COUNT(DISTINCT de.employee_id) AS active_employees,
           COUNT(DISTINCT de.employee_id) * 168 AS capacity_hours,
           ROUND((SUM(ft.hours) * 100.0) / (COUNT(DISTINCT de.employee_id) * 168), 2) AS utilization_pct
    FROM dw_fact_timesheet ft
    JOIN dw_dim_date dd ON ft.date_key = dd.date_key
    JOIN dw_dim_employee de ON ft.employee_key = de.employee_key
    GROUP BY dd.year, dd.month
    ORDER BY dd.year, dd.month";

const SLA_BY_PRIORITY: &str = "
    SELECT dt.priority,
           COUNT(*) AS tickets,
           SUM(CASE WHEN ft.sla_met = 1 THEN 1 ELSE 0 END) AS within_sla,
           ROUND((SUM(CASE WHEN ft.sla_met = 1 THEN 1 ELSE 0 END) * 100.0) / COUNT(*), 2) AS sla_pct
    FROM dw_fact_ticket ft
    JOIN dw_dim_ticket dt ON ft.ticket_key = dt.ticket_key
    GROUP BY dt.priority
    ORDER BY dt.priority";

const REVENUE_HOURS_BY_PROJECT: &str = "
    SELECT dp.project_name,
           ROUND(COALESCE(b.amount, 0), 2) AS amount,
           COALESCE(t.hours, 0) AS hours
    FROM dw_dim_project dp
    LEFT JOIN (SELECT project_key, SUM(amount) AS amount
               FROM dw_fact_billing GROUP BY project_key) b
           ON b.project_key = dp.project_key
    LEFT JOIN (SELECT project_key, SUM(hours) AS hours
               FROM dw_fact_timesheet GROUP BY project_key) t
           ON t.project_key = dp.project_key
    WHERE dp.project_name IS NOT NULL
    ORDER BY amount DESC
    LIMIT 100";

const COUNT_CLIENTS: &str = "SELECT COUNT(*) AS total_clients FROM dw_dim_client";

const LIST_CLIENTS: &str =
    "SELECT DISTINCT client_name FROM dw_dim_client ORDER BY client_name LIMIT 100";

const TOP_PROJECTS: &str = "
    SELECT dp.project_name, ROUND(SUM(fb.amount), 2) AS total_amount
    FROM dw_fact_billing fb
    JOIN dw_dim_project dp ON dp.project_key = fb.project_key
    WHERE dp.project_name IS NOT NULL
    GROUP BY dp.project_name
    ORDER BY total_amount DESC
    LIMIT 10";

const REVENUE_BY_QUARTER: &str = "
    SELECT dd.year, dd.quarter, ROUND(SUM(fb.amount), 2) AS total_revenue
    FROM dw_fact_billing fb
    JOIN dw_dim_date dd ON dd.date_key = fb.date_key
    WHERE dd.year = ?1 AND dd.quarter = ?2
    GROUP BY dd.year, dd.quarter";

const REVENUE_BY_YEAR: &str = "
    SELECT dd.year, ROUND(SUM(fb.amount), 2) AS total_revenue
    FROM dw_fact_billing fb
    JOIN dw_dim_date dd ON dd.date_key = fb.date_key
    WHERE dd.year = ?1
    GROUP BY dd.year";

/// A catalog query selected for a question, with bound parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogQuery {
    /// Catalog name of the query
    pub name: &'static str,
    /// SQL text with positional parameters
    pub sql: &'static str,
    /// Values bound to `?1`, `?2`, ...
    pub params: Vec<i64>,
}

impl CatalogQuery {
    fn fixed(name: &'static str, sql: &'static str) -> Self {
        Self {
            name,
            sql,
            params: Vec::new(),
        }
    }
}

/// Year and quarter of the last fully completed quarter before `today`
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use warehouse_router::executors::sql::last_completed_quarter;
///
/// let today = NaiveDate::from_ymd_opt(2024, 2, 10).unwrap();
/// assert_eq!(last_completed_quarter(today), (2023, 4));
/// ```
pub fn last_completed_quarter(today: NaiveDate) -> (i32, u32) {
    let quarter = (today.month() - 1) / 3 + 1;
    if quarter == 1 {
        (today.year() - 1, 4)
    } else {
        (today.year(), quarter - 1)
    }
}

/// Intent rules mapping questions to catalog queries
#[derive(Debug, Clone)]
pub struct AnalyticsCatalog {
    count_clients: Regex,
    top_clients: Regex,
    list_clients: Regex,
    projects: Regex,
    project_hours: Regex,
    last_quarter: Regex,
    year: Regex,
    revenue: Regex,
    current_year: Regex,
    monthly: Regex,
    utilization: Regex,
    sla: Regex,
}

impl AnalyticsCatalog {
    /// Builds the rule set
    ///
    /// # Errors
    ///
    /// Returns `ExecutorError::Permanent` if a rule fails to compile
    pub fn new() -> std::result::Result<Self, ExecutorError> {
        let re = |pattern: &str| {
            Regex::new(pattern)
                .map_err(|e| ExecutorError::Permanent(format!("invalid intent rule: {}", e)))
        };

        Ok(Self {
            count_clients: re(r"\b(quantos|qnt|qtde|how many)\s+(clientes?|clients?)\b|^(total\s+)?clientes$")?,
            top_clients: re(r"\b(top|melhores|maiores|ranking|principais)\b.*\b(clientes?|clients?)\b")?,
            list_clients: re(r"\b(quem|quais|lista|listar|list)\b.*\b(clientes?|clients?)\b")?,
            projects: re(r"\b(produtos?|projetos?|projects?)\b")?,
            project_hours: re(r"\bhoras?\b|\bhours?\b")?,
            last_quarter: re(r"\b(ultim[oa]|passad[oa]|last)\s+(trimest|quarter)")?,
            year: re(r"\b(20\d{2})\b")?,
            revenue: re(r"\b(receita|faturamento|revenue)\b")?,
            current_year: re(r"\b(este|deste|atual|corrente|this)\s+(ano|year)\b")?,
            monthly: re(r"\b(mensal|mes|mensais|monthly|month)\b")?,
            utilization: re(r"\b(utilizacao|capacidade|utilization|capacity)\b|\bhoras\s+trabalhadas\b")?,
            sla: re(r"\b(sla|tickets?|chamados?)\b")?,
        })
    }

    /// Selects the catalog query for a question as of today
    pub fn detect(&self, question: &str) -> Option<CatalogQuery> {
        self.detect_at(question, Utc::now().date_naive())
    }

    /// Selects the catalog query for a question as of `today`
    ///
    /// Rules are checked in a fixed order; the first match wins.
    pub fn detect_at(&self, question: &str, today: NaiveDate) -> Option<CatalogQuery> {
        let text = normalize(question).join(" ");

        if self.count_clients.is_match(&text) {
            return Some(CatalogQuery::fixed("count_clients", COUNT_CLIENTS));
        }
        if self.top_clients.is_match(&text) {
            return Some(CatalogQuery::fixed("top_clients", TOP_CLIENTS));
        }
        if self.list_clients.is_match(&text) {
            return Some(CatalogQuery::fixed("list_clients", LIST_CLIENTS));
        }
        if self.projects.is_match(&text) {
            if self.project_hours.is_match(&text) {
                return Some(CatalogQuery::fixed(
                    "revenue_hours_by_project",
                    REVENUE_HOURS_BY_PROJECT,
                ));
            }
            return Some(CatalogQuery::fixed("top_projects", TOP_PROJECTS));
        }
        if self.last_quarter.is_match(&text) {
            let (year, quarter) = last_completed_quarter(today);
            return Some(CatalogQuery {
                name: "revenue_by_quarter",
                sql: REVENUE_BY_QUARTER,
                params: vec![year as i64, quarter as i64],
            });
        }

        let revenue = self.revenue.is_match(&text);
        if revenue {
            if let Some(year) = self
                .year
                .captures(&text)
                .and_then(|c| c.get(1))
                .and_then(|m| m.as_str().parse::<i64>().ok())
            {
                return Some(CatalogQuery {
                    name: "revenue_by_year",
                    sql: REVENUE_BY_YEAR,
                    params: vec![year],
                });
            }
            if self.current_year.is_match(&text) {
                return Some(CatalogQuery {
                    name: "revenue_by_year",
                    sql: REVENUE_BY_YEAR,
                    params: vec![today.year() as i64],
                });
            }
        }
        if revenue && self.monthly.is_match(&text) {
            return Some(CatalogQuery::fixed("monthly_revenue", MONTHLY_REVENUE));
        }
        if self.utilization.is_match(&text) {
            return Some(CatalogQuery::fixed(
                "resource_utilization",
                RESOURCE_UTILIZATION,
            ));
        }
        if self.sla.is_match(&text) {
            return Some(CatalogQuery::fixed("sla_by_priority", SLA_BY_PRIORITY));
        }
        if revenue {
            return Some(CatalogQuery::fixed("monthly_revenue", MONTHLY_REVENUE));
        }
        None
    }
}

/// Result of running a catalog query
#[derive(Debug, Clone, PartialEq)]
struct QueryRows {
    columns: Vec<String>,
    rows: Vec<Vec<serde_json::Value>>,
}

fn classify_sqlite_error(error: rusqlite::Error) -> ExecutorError {
    match &error {
        rusqlite::Error::SqliteFailure(failure, _)
            if matches!(
                failure.code,
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked | ErrorCode::CannotOpen
            ) =>
        {
            ExecutorError::Transient(format!("warehouse unavailable: {}", error))
        }
        _ => ExecutorError::Permanent(format!("query failed: {}", error)),
    }
}

fn to_json(value: ValueRef<'_>) -> serde_json::Value {
    match value {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(i) => serde_json::Value::from(i),
        ValueRef::Real(f) => serde_json::Value::from(f),
        ValueRef::Text(t) => serde_json::Value::from(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => serde_json::Value::from(format!("<{} bytes>", b.len())),
    }
}

fn run_query(path: &PathBuf, query: &CatalogQuery) -> rusqlite::Result<QueryRows> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    let mut stmt = conn.prepare(query.sql)?;
    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

    let mut rows = Vec::new();
    let mut cursor = stmt.query(rusqlite::params_from_iter(query.params.iter()))?;
    while let Some(row) = cursor.next()? {
        let mut values = Vec::with_capacity(columns.len());
        for i in 0..columns.len() {
            values.push(to_json(row.get_ref(i)?));
        }
        rows.push(values);
    }
    Ok(QueryRows { columns, rows })
}

fn format_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "-".to_string(),
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() => format!("{:.2}", f),
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}

fn summarize(query: &CatalogQuery, result: &QueryRows) -> String {
    if result.rows.is_empty() {
        return "Não foram encontrados dados para sua consulta.".to_string();
    }

    if result.rows.len() == 1 && result.columns.len() <= 3 {
        let fields: Vec<String> = result
            .columns
            .iter()
            .zip(&result.rows[0])
            .map(|(c, v)| format!("{}: {}", c, format_value(v)))
            .collect();
        return format!("Resultado de {}: {}", query.name, fields.join(", "));
    }

    let mut text = format!(
        "Encontrei {} registro(s) em {}.",
        result.rows.len(),
        query.name
    );
    for row in result.rows.iter().take(PREVIEW_ROWS) {
        let cells: Vec<String> = row.iter().map(format_value).collect();
        text.push_str(&format!("\n- {}", cells.join(" | ")));
    }
    if result.rows.len() > PREVIEW_ROWS {
        text.push_str(&format!("\n(+{} linhas)", result.rows.len() - PREVIEW_ROWS));
    }
    text
}

/// Runs catalog queries against a SQLite warehouse file
///
/// # Examples
///
/// ```no_run
/// use warehouse_router::executors::SqliteAnalyticsExecutor;
///
/// let executor = SqliteAnalyticsExecutor::new("data/warehouse.db").unwrap();
/// ```
pub struct SqliteAnalyticsExecutor {
    db_path: PathBuf,
    catalog: AnalyticsCatalog,
}

impl SqliteAnalyticsExecutor {
    /// Creates an executor for the warehouse at `db_path`
    ///
    /// # Errors
    ///
    /// Returns `ExecutorError::Permanent` if the intent rules fail to build
    pub fn new(db_path: impl Into<PathBuf>) -> std::result::Result<Self, ExecutorError> {
        Ok(Self {
            db_path: db_path.into(),
            catalog: AnalyticsCatalog::new()?,
        })
    }
}

#[async_trait]
impl StrategyExecutor for SqliteAnalyticsExecutor {
    async fn execute(
        &self,
        content: &str,
        _context: &SessionContext,
    ) -> std::result::Result<Payload, ExecutorError> {
        let query = self
            .catalog
            .detect(content)
            .ok_or_else(|| ExecutorError::Permanent("no matching analytical query".to_string()))?;

        tracing::debug!(query = query.name, params = ?query.params, "Running catalog query");

        let path = self.db_path.clone();
        let selected = query.clone();
        let result = tokio::task::spawn_blocking(move || run_query(&path, &selected))
            .await
            .map_err(|e| ExecutorError::Permanent(format!("query task failed: {}", e)))?
            .map_err(classify_sqlite_error)?;

        Ok(Payload {
            text: summarize(&query, &result),
            data: PayloadData::Rows {
                query: query.name.to_string(),
                columns: result.columns,
                rows: result.rows,
            },
        })
    }
}
