use crate::classifier::Strategy;
use crate::error::{Result, RouterError};
use crate::learning::{FeedbackCounts, FeedbackRecord, Polarity};
use crate::session::{ChatSession, Message, MessageId, Role, SessionId, SessionStatus};
use anyhow::Context;
use chrono::{DateTime, SecondsFormat, Utc};
use directories::ProjectDirs;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

pub mod types;
pub use types::StoredSession;

/// How long a connection waits on a locked database before giving up
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Persistence collaborator for chats, messages and feedback
///
/// Calls are synchronous. The session manager invokes them while holding
/// a session's lock, so an implementation must not call back into it.
pub trait ChatStore: Send + Sync {
    /// Inserts or updates a session header (messages are not written)
    fn save_session(&self, session: &ChatSession) -> Result<()>;

    /// Writes a session header and appends one message in a single transaction
    fn record_message(&self, session: &ChatSession, message: &Message) -> Result<()>;

    /// Loads every session with its messages
    fn load_sessions(&self) -> Result<Vec<ChatSession>>;

    /// Loads one message by id
    fn load_message(&self, id: MessageId) -> Result<Option<Message>>;

    /// Returns the latest user message before `message` in the same session
    fn preceding_user_message(&self, message: &Message) -> Result<Option<Message>>;

    /// Stores a feedback record
    fn save_feedback(&self, feedback: &FeedbackRecord) -> Result<()>;

    /// Deletes feedback created before `before`, returning how many were removed
    fn prune_feedback(&self, before: DateTime<Utc>) -> Result<usize>;

    /// Messages with positive feedback, most recently rated first
    fn positive_feedback_targets(&self, limit: usize) -> Result<Vec<MessageId>>;

    /// Totals of stored feedback by polarity
    fn feedback_counts(&self) -> Result<FeedbackCounts>;

    /// Number of assistant replies per strategy
    fn strategy_counts(&self) -> Result<BTreeMap<Strategy, u64>>;
}

/// Default data directory for the history and pattern databases
///
/// # Errors
///
/// Returns `RouterError::Storage` if no home directory can be determined
pub fn default_data_dir() -> Result<PathBuf> {
    let proj_dirs = ProjectDirs::from("com", "warehouse", "warehouse-router")
        .ok_or_else(|| RouterError::Storage("Could not determine data directory".into()))?;
    Ok(proj_dirs.data_dir().to_path_buf())
}

fn timestamp(at: &DateTime<Utc>) -> String {
    // Fixed-width UTC form so that text comparison orders by time.
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)
        .map_err(|e| RouterError::Storage(format!("Invalid timestamp '{}': {}", value, e)))?
        .with_timezone(&Utc))
}

fn parse_id(value: &str) -> Result<Uuid> {
    Ok(Uuid::parse_str(value)
        .map_err(|e| RouterError::Storage(format!("Invalid identifier '{}': {}", value, e)))?)
}

/// Raw `messages` row before conversion
struct MessageRow {
    id: String,
    chat_id: String,
    role: String,
    content: String,
    strategy: Option<String>,
    execution_ms: Option<i64>,
    created_at: String,
}

const MESSAGE_COLUMNS: &str = "id, chat_id, role, content, strategy, execution_ms, created_at";

impl MessageRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            chat_id: row.get(1)?,
            role: row.get(2)?,
            content: row.get(3)?,
            strategy: row.get(4)?,
            execution_ms: row.get(5)?,
            created_at: row.get(6)?,
        })
    }

    fn into_message(self) -> Result<Message> {
        let role = Role::parse_str(&self.role)
            .ok_or_else(|| RouterError::Storage(format!("Invalid role '{}'", self.role)))?;
        let strategy = match self.strategy {
            Some(s) => Some(
                Strategy::parse_str(&s)
                    .ok_or_else(|| RouterError::Storage(format!("Invalid strategy '{}'", s)))?,
            ),
            None => None,
        };
        Ok(Message {
            id: parse_id(&self.id)?,
            session_id: parse_id(&self.chat_id)?,
            role,
            content: self.content,
            strategy,
            execution_ms: self.execution_ms.map(|ms| ms.max(0) as u64),
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

/// Storage backend for chat history and feedback
pub struct SqliteStorage {
    db_path: PathBuf,
}

impl SqliteStorage {
    /// Create a new storage instance
    ///
    /// Initializes the database file in the user's data directory.
    pub fn new() -> Result<Self> {
        let data_dir = default_data_dir()?;
        std::fs::create_dir_all(&data_dir)
            .context("Failed to create data directory")
            .map_err(|e| RouterError::Storage(e.to_string()))?;

        let storage = Self {
            db_path: data_dir.join("history.db"),
        };
        storage.init()?;
        Ok(storage)
    }

    /// Create a new storage instance that uses the specified database path.
    ///
    /// # Examples
    ///
    /// ```
    /// use warehouse_router::storage::SqliteStorage;
    ///
    /// let dir = tempfile::tempdir().unwrap();
    /// let storage = SqliteStorage::new_with_path(dir.path().join("history.db")).unwrap();
    /// assert!(storage.list_sessions().unwrap().is_empty());
    /// ```
    pub fn new_with_path<P: Into<PathBuf>>(db_path: P) -> Result<Self> {
        let db_path = db_path.into();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create parent directory for database")
                .map_err(|e| RouterError::Storage(e.to_string()))?;
        }

        let storage = Self { db_path };
        storage.init()?;
        Ok(storage)
    }

    fn open(&self) -> Result<Connection> {
        let conn = Connection::open(&self.db_path)
            .context("Failed to open database")
            .map_err(|e| RouterError::Storage(e.to_string()))?;
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| RouterError::Storage(e.to_string()))?;
        Ok(conn)
    }

    /// Initialize the database schema
    fn init(&self) -> Result<()> {
        let conn = self.open()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS chats (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                status TEXT NOT NULL,
                interactions INTEGER NOT NULL DEFAULT 0,
                successor TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                chat_id TEXT NOT NULL REFERENCES chats(id),
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                strategy TEXT,
                execution_ms INTEGER,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_messages_chat ON messages(chat_id);
            CREATE TABLE IF NOT EXISTS feedback (
                id TEXT PRIMARY KEY,
                message_id TEXT NOT NULL,
                polarity TEXT NOT NULL,
                comment TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_feedback_created ON feedback(created_at);",
        )
        .context("Failed to create tables")
        .map_err(|e| RouterError::Storage(e.to_string()))?;

        Ok(())
    }

    fn upsert_chat(tx: &Transaction<'_>, session: &ChatSession) -> Result<()> {
        tx.execute(
            "INSERT INTO chats (id, title, status, interactions, successor, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                status = excluded.status,
                interactions = excluded.interactions,
                successor = excluded.successor,
                updated_at = excluded.updated_at",
            params![
                session.id.to_string(),
                session.title,
                session.status.as_str(),
                session.interactions as i64,
                session.successor.map(|s| s.to_string()),
                timestamp(&session.created_at),
                timestamp(&session.updated_at),
            ],
        )
        .context("Failed to save chat")
        .map_err(|e| RouterError::Storage(e.to_string()))?;
        Ok(())
    }

    /// List all stored sessions, most recently updated first
    pub fn list_sessions(&self) -> Result<Vec<StoredSession>> {
        let conn = self.open()?;

        let mut stmt = conn
            .prepare(
                "SELECT c.id, c.title, c.status, c.interactions, c.successor,
                        c.created_at, c.updated_at,
                        (SELECT COUNT(*) FROM messages m WHERE m.chat_id = c.id)
                FROM chats c
                ORDER BY c.updated_at DESC",
            )
            .context("Failed to prepare statement")
            .map_err(|e| RouterError::Storage(e.to_string()))?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, i64>(7)?,
                ))
            })
            .context("Failed to query sessions")
            .map_err(|e| RouterError::Storage(e.to_string()))?;

        let mut sessions = Vec::new();
        for row in rows {
            let (id, title, status, interactions, successor, created_at, updated_at, count) =
                row.map_err(|e| RouterError::Storage(e.to_string()))?;
            sessions.push(StoredSession {
                id: parse_id(&id)?,
                title,
                status: SessionStatus::parse_str(&status)
                    .ok_or_else(|| RouterError::Storage(format!("Invalid status '{}'", status)))?,
                interactions: interactions.max(0) as usize,
                successor: successor.as_deref().map(parse_id).transpose()?,
                created_at: parse_timestamp(&created_at)?,
                updated_at: parse_timestamp(&updated_at)?,
                message_count: count.max(0) as usize,
            });
        }

        Ok(sessions)
    }

    /// Resolve a session id from its full form or a unique prefix
    ///
    /// # Errors
    ///
    /// Returns `RouterError::Storage` if the prefix matches more than one session
    pub fn resolve_session_id(&self, id: &str) -> Result<Option<SessionId>> {
        if let Ok(full) = Uuid::parse_str(id) {
            return Ok(Some(full));
        }

        let conn = self.open()?;
        let mut stmt = conn
            .prepare("SELECT id FROM chats WHERE id LIKE ?")
            .map_err(|e| RouterError::Storage(e.to_string()))?;
        let matches: Vec<String> = stmt
            .query_map(params![format!("{}%", id)], |row| row.get(0))
            .map_err(|e| RouterError::Storage(e.to_string()))?
            .collect::<rusqlite::Result<_>>()
            .map_err(|e| RouterError::Storage(e.to_string()))?;

        match matches.as_slice() {
            [] => Ok(None),
            [only] => Ok(Some(parse_id(only)?)),
            _ => Err(RouterError::Storage(format!(
                "Session prefix '{}' is ambiguous ({} matches)",
                id,
                matches.len()
            ))
            .into()),
        }
    }

    fn load_messages(conn: &Connection) -> Result<HashMap<String, Vec<Message>>> {
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM messages ORDER BY rowid",
                MESSAGE_COLUMNS
            ))
            .map_err(|e| RouterError::Storage(e.to_string()))?;
        let rows = stmt
            .query_map([], MessageRow::from_row)
            .context("Failed to query messages")
            .map_err(|e| RouterError::Storage(e.to_string()))?;

        let mut by_chat: HashMap<String, Vec<Message>> = HashMap::new();
        for row in rows {
            let row = row.map_err(|e| RouterError::Storage(e.to_string()))?;
            let chat_id = row.chat_id.clone();
            by_chat.entry(chat_id).or_default().push(row.into_message()?);
        }
        Ok(by_chat)
    }
}

impl ChatStore for SqliteStorage {
    fn save_session(&self, session: &ChatSession) -> Result<()> {
        let mut conn = self.open()?;
        let tx = conn
            .transaction()
            .context("Failed to start transaction")
            .map_err(|e| RouterError::Storage(e.to_string()))?;
        Self::upsert_chat(&tx, session)?;
        tx.commit()
            .context("Failed to commit transaction")
            .map_err(|e| RouterError::Storage(e.to_string()))?;
        Ok(())
    }

    fn record_message(&self, session: &ChatSession, message: &Message) -> Result<()> {
        let mut conn = self.open()?;
        let tx = conn
            .transaction()
            .context("Failed to start transaction")
            .map_err(|e| RouterError::Storage(e.to_string()))?;

        Self::upsert_chat(&tx, session)?;
        tx.execute(
            &format!(
                "INSERT INTO messages ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                MESSAGE_COLUMNS
            ),
            params![
                message.id.to_string(),
                message.session_id.to_string(),
                message.role.as_str(),
                message.content,
                message.strategy.map(|s| s.as_str()),
                message.execution_ms.map(|ms| ms as i64),
                timestamp(&message.created_at),
            ],
        )
        .context("Failed to insert message")
        .map_err(|e| RouterError::Storage(e.to_string()))?;

        tx.commit()
            .context("Failed to commit transaction")
            .map_err(|e| RouterError::Storage(e.to_string()))?;
        Ok(())
    }

    fn load_sessions(&self) -> Result<Vec<ChatSession>> {
        let conn = self.open()?;
        let mut messages = Self::load_messages(&conn)?;

        let mut stmt = conn
            .prepare(
                "SELECT id, title, status, interactions, successor, created_at, updated_at
                FROM chats",
            )
            .map_err(|e| RouterError::Storage(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                ))
            })
            .context("Failed to query chats")
            .map_err(|e| RouterError::Storage(e.to_string()))?;

        let mut sessions = Vec::new();
        for row in rows {
            let (id, title, status, interactions, successor, created_at, updated_at) =
                row.map_err(|e| RouterError::Storage(e.to_string()))?;
            sessions.push(ChatSession {
                id: parse_id(&id)?,
                title,
                created_at: parse_timestamp(&created_at)?,
                updated_at: parse_timestamp(&updated_at)?,
                messages: messages.remove(&id).unwrap_or_default(),
                interactions: interactions.max(0) as usize,
                status: SessionStatus::parse_str(&status)
                    .ok_or_else(|| RouterError::Storage(format!("Invalid status '{}'", status)))?,
                successor: successor.as_deref().map(parse_id).transpose()?,
            });
        }
        Ok(sessions)
    }

    fn load_message(&self, id: MessageId) -> Result<Option<Message>> {
        let conn = self.open()?;
        let row = conn
            .query_row(
                &format!("SELECT {} FROM messages WHERE id = ?", MESSAGE_COLUMNS),
                params![id.to_string()],
                MessageRow::from_row,
            )
            .optional()
            .context("Failed to query message")
            .map_err(|e| RouterError::Storage(e.to_string()))?;
        row.map(MessageRow::into_message).transpose()
    }

    fn preceding_user_message(&self, message: &Message) -> Result<Option<Message>> {
        let conn = self.open()?;
        let row = conn
            .query_row(
                &format!(
                    "SELECT {} FROM messages
                    WHERE chat_id = ?1 AND role = 'user'
                      AND rowid < (SELECT rowid FROM messages WHERE id = ?2)
                    ORDER BY rowid DESC
                    LIMIT 1",
                    MESSAGE_COLUMNS
                ),
                params![message.session_id.to_string(), message.id.to_string()],
                MessageRow::from_row,
            )
            .optional()
            .context("Failed to query preceding message")
            .map_err(|e| RouterError::Storage(e.to_string()))?;
        row.map(MessageRow::into_message).transpose()
    }

    fn save_feedback(&self, feedback: &FeedbackRecord) -> Result<()> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO feedback (id, message_id, polarity, comment, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                feedback.id,
                feedback.message_id.to_string(),
                feedback.polarity.as_str(),
                feedback.comment,
                timestamp(&feedback.created_at),
            ],
        )
        .context("Failed to insert feedback")
        .map_err(|e| RouterError::Storage(e.to_string()))?;
        Ok(())
    }

    fn prune_feedback(&self, before: DateTime<Utc>) -> Result<usize> {
        let conn = self.open()?;
        let removed = conn
            .execute(
                "DELETE FROM feedback WHERE created_at < ?",
                params![timestamp(&before)],
            )
            .context("Failed to prune feedback")
            .map_err(|e| RouterError::Storage(e.to_string()))?;
        Ok(removed)
    }

    fn positive_feedback_targets(&self, limit: usize) -> Result<Vec<MessageId>> {
        let conn = self.open()?;
        let mut stmt = conn
            .prepare(
                "SELECT message_id FROM feedback
                WHERE polarity = 'positive'
                GROUP BY message_id
                ORDER BY MAX(created_at) DESC
                LIMIT ?1",
            )
            .map_err(|e| RouterError::Storage(e.to_string()))?;
        let rows = stmt
            .query_map(params![limit as i64], |row| row.get::<_, String>(0))
            .map_err(|e| RouterError::Storage(e.to_string()))?;

        let mut targets = Vec::new();
        for row in rows {
            let id = row.map_err(|e| RouterError::Storage(e.to_string()))?;
            targets.push(parse_id(&id)?);
        }
        Ok(targets)
    }

    fn feedback_counts(&self) -> Result<FeedbackCounts> {
        let conn = self.open()?;
        let mut stmt = conn
            .prepare("SELECT polarity, COUNT(*) FROM feedback GROUP BY polarity")
            .map_err(|e| RouterError::Storage(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
            .map_err(|e| RouterError::Storage(e.to_string()))?;

        let mut counts = FeedbackCounts::default();
        for row in rows {
            let (polarity, count) = row.map_err(|e| RouterError::Storage(e.to_string()))?;
            match Polarity::parse_str(&polarity) {
                Some(Polarity::Positive) => counts.positive += count.max(0) as u64,
                Some(Polarity::Negative) => counts.negative += count.max(0) as u64,
                None => {}
            }
        }
        Ok(counts)
    }

    fn strategy_counts(&self) -> Result<BTreeMap<Strategy, u64>> {
        let conn = self.open()?;
        let mut stmt = conn
            .prepare(
                "SELECT strategy, COUNT(*) FROM messages
                WHERE role = 'assistant' AND strategy IS NOT NULL
                GROUP BY strategy",
            )
            .map_err(|e| RouterError::Storage(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
            .map_err(|e| RouterError::Storage(e.to_string()))?;

        let mut counts = BTreeMap::new();
        for row in rows {
            let (strategy, count) = row.map_err(|e| RouterError::Storage(e.to_string()))?;
            if let Some(strategy) = Strategy::parse_str(&strategy) {
                *counts.entry(strategy).or_insert(0) += count.max(0) as u64;
            }
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use std::time::Duration;
    use tempfile::tempdir;

    /// Helper: create a temporary storage instance backed by a temp directory.
    ///
    /// Returns both the `SqliteStorage` and the `TempDir` so the caller keeps
    /// ownership of the directory (preventing it from being removed).
    fn create_test_storage() -> (SqliteStorage, tempfile::TempDir) {
        let dir = tempdir().expect("failed to create tempdir");
        let db_path = dir.path().join("history.db");
        let storage = SqliteStorage::new_with_path(db_path).expect("failed to create storage");
        (storage, dir)
    }

    fn exchange(storage: &SqliteStorage, session: &mut ChatSession, question: &str) -> Message {
        let user = Message::user(session.id, question);
        session.interactions += 1;
        storage.record_message(session, &user).unwrap();
        let reply = Message::assistant(
            session.id,
            "answer",
            Strategy::Sql,
            Duration::from_millis(12),
        );
        storage.record_message(session, &reply).unwrap();
        reply
    }

    #[test]
    fn test_sqlite_storage_init_creates_tables() {
        let (storage, _dir) = create_test_storage();
        let conn = Connection::open(&storage.db_path).expect("open connection");
        let count: i64 = conn
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE type='table'
                 AND name IN ('chats', 'messages', 'feedback')",
                [],
                |r| r.get(0),
            )
            .expect("query row");
        assert_eq!(count, 3);
    }

    #[test]
    fn test_sessions_roundtrip_with_messages_in_order() {
        let (storage, _dir) = create_test_storage();
        let mut session = ChatSession::new("Receita");
        storage.save_session(&session).unwrap();
        exchange(&storage, &mut session, "primeira");
        exchange(&storage, &mut session, "segunda");

        let loaded = storage.load_sessions().unwrap();
        assert_eq!(loaded.len(), 1);
        let loaded = &loaded[0];
        assert_eq!(loaded.id, session.id);
        assert_eq!(loaded.interactions, 2);
        assert_eq!(loaded.created_at, session.created_at);
        let contents: Vec<_> = loaded.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["primeira", "answer", "segunda", "answer"]);
        assert_eq!(loaded.messages[1].strategy, Some(Strategy::Sql));
        assert_eq!(loaded.messages[1].execution_ms, Some(12));
    }

    #[test]
    fn test_save_session_preserves_created_at_and_updates_status() {
        let (storage, _dir) = create_test_storage();
        let mut session = ChatSession::new("t");
        storage.save_session(&session).unwrap();

        let original_created = session.created_at;
        session.created_at = Utc::now() + ChronoDuration::days(1);
        session.status = SessionStatus::Rotated;
        session.successor = Some(Uuid::new_v4());
        storage.save_session(&session).unwrap();

        let listed = storage.list_sessions().unwrap();
        assert_eq!(listed[0].created_at, original_created);
        assert_eq!(listed[0].status, SessionStatus::Rotated);
        assert_eq!(listed[0].successor, session.successor);
    }

    #[test]
    fn test_preceding_user_message_stays_in_session() {
        let (storage, _dir) = create_test_storage();
        let mut a = ChatSession::new("a");
        let mut b = ChatSession::new("b");
        exchange(&storage, &mut a, "pergunta a1");
        exchange(&storage, &mut b, "pergunta b1");
        let reply = exchange(&storage, &mut a, "pergunta a2");

        let user = storage.preceding_user_message(&reply).unwrap().unwrap();
        assert_eq!(user.content, "pergunta a2");
        assert_eq!(user.session_id, a.id);
    }

    #[test]
    fn test_load_message_returns_none_for_missing_id() {
        let (storage, _dir) = create_test_storage();
        assert!(storage.load_message(Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn test_feedback_counts_and_pruning() {
        let (storage, _dir) = create_test_storage();
        let mut session = ChatSession::new("t");
        let reply = exchange(&storage, &mut session, "q");

        let mut old = FeedbackRecord::new(reply.id, Polarity::Negative, None);
        old.created_at = Utc::now() - ChronoDuration::days(120);
        storage.save_feedback(&old).unwrap();
        storage
            .save_feedback(&FeedbackRecord::new(reply.id, Polarity::Positive, None))
            .unwrap();

        let counts = storage.feedback_counts().unwrap();
        assert_eq!((counts.positive, counts.negative), (1, 1));

        let cutoff = Utc::now() - ChronoDuration::days(90);
        assert_eq!(storage.prune_feedback(cutoff).unwrap(), 1);
        assert_eq!(storage.prune_feedback(cutoff).unwrap(), 0);
        assert_eq!(storage.feedback_counts().unwrap().negative, 0);
    }

    #[test]
    fn test_positive_feedback_targets_are_distinct_and_recent_first() {
        let (storage, _dir) = create_test_storage();
        let mut session = ChatSession::new("t");
        let first = exchange(&storage, &mut session, "q1");
        let second = exchange(&storage, &mut session, "q2");

        let mut older = FeedbackRecord::new(first.id, Polarity::Positive, None);
        older.created_at = Utc::now() - ChronoDuration::minutes(5);
        storage.save_feedback(&older).unwrap();
        storage
            .save_feedback(&FeedbackRecord::new(second.id, Polarity::Positive, None))
            .unwrap();
        storage
            .save_feedback(&FeedbackRecord::new(second.id, Polarity::Positive, None))
            .unwrap();
        storage
            .save_feedback(&FeedbackRecord::new(first.id, Polarity::Negative, None))
            .unwrap();

        assert_eq!(
            storage.positive_feedback_targets(10).unwrap(),
            vec![second.id, first.id]
        );
        assert_eq!(storage.positive_feedback_targets(1).unwrap(), vec![second.id]);
    }

    #[test]
    fn test_strategy_counts_only_count_replies() {
        let (storage, _dir) = create_test_storage();
        let mut session = ChatSession::new("t");
        exchange(&storage, &mut session, "q1");
        exchange(&storage, &mut session, "q2");

        let counts = storage.strategy_counts().unwrap();
        assert_eq!(counts.get(&Strategy::Sql), Some(&2));
        assert_eq!(counts.len(), 1);
    }

    #[test]
    fn test_resolve_session_id_by_prefix() {
        let (storage, _dir) = create_test_storage();
        let session = ChatSession::new("t");
        storage.save_session(&session).unwrap();

        let prefix = &session.id.to_string()[..8];
        assert_eq!(storage.resolve_session_id(prefix).unwrap(), Some(session.id));
        assert_eq!(storage.resolve_session_id("zzzzzzzz").unwrap(), None);
    }
}
