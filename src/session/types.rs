//! Chat session and message types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use crate::classifier::Strategy;

/// Identifier of a chat session
pub type SessionId = Uuid;

/// Identifier of a message
pub type MessageId = Uuid;

/// Author of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The person asking questions
    User,
    /// The router's reply
    Assistant,
}

impl Role {
    /// Returns the role as stored in the database
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    /// Parses a stored role value
    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a chat session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Accepting new messages
    Active,
    /// Reached its interaction bound; a successor receives new messages
    Rotated,
    /// Removed by the user
    Deleted,
}

impl SessionStatus {
    /// Returns the status as stored in the database
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Rotated => "rotated",
            SessionStatus::Deleted => "deleted",
        }
    }

    /// Parses a stored status value
    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(SessionStatus::Active),
            "rotated" => Some(SessionStatus::Rotated),
            "deleted" => Some(SessionStatus::Deleted),
            _ => None,
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single chat message
///
/// Messages are immutable once created. Only assistant messages carry the
/// strategy that produced them and the time it took.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message identifier
    pub id: MessageId,
    /// Session the message belongs to
    pub session_id: SessionId,
    /// Author of the message
    pub role: Role,
    /// Message text
    pub content: String,
    /// Strategy used to produce an assistant reply
    pub strategy: Option<Strategy>,
    /// Execution time of an assistant reply in milliseconds
    pub execution_ms: Option<u64>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Creates a user message
    ///
    /// # Examples
    ///
    /// ```
    /// use warehouse_router::session::{Message, Role};
    /// use uuid::Uuid;
    ///
    /// let msg = Message::user(Uuid::new_v4(), "Quantos clientes temos?");
    /// assert_eq!(msg.role, Role::User);
    /// assert!(msg.strategy.is_none());
    /// ```
    pub fn user(session_id: SessionId, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            role: Role::User,
            content: content.into(),
            strategy: None,
            execution_ms: None,
            created_at: Utc::now(),
        }
    }

    /// Creates an assistant reply tagged with its strategy and duration
    pub fn assistant(
        session_id: SessionId,
        content: impl Into<String>,
        strategy: Strategy,
        elapsed: Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            role: Role::Assistant,
            content: content.into(),
            strategy: Some(strategy),
            execution_ms: Some(elapsed.as_millis() as u64),
            created_at: Utc::now(),
        }
    }
}

/// A bounded chat session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    /// Unique session identifier
    pub id: SessionId,
    /// User-facing title
    pub title: String,
    /// When the session was created
    pub created_at: DateTime<Utc>,
    /// When the session last changed
    pub updated_at: DateTime<Utc>,
    /// Messages in arrival order
    pub messages: Vec<Message>,
    /// Admitted user+assistant exchanges
    pub interactions: usize,
    /// Lifecycle state
    pub status: SessionStatus,
    /// Session created when this one rotated
    pub successor: Option<SessionId>,
}

impl ChatSession {
    /// Creates an empty active session
    ///
    /// # Examples
    ///
    /// ```
    /// use warehouse_router::session::{ChatSession, SessionStatus};
    ///
    /// let session = ChatSession::new("Receita");
    /// assert_eq!(session.status, SessionStatus::Active);
    /// assert_eq!(session.interactions, 0);
    /// ```
    pub fn new(title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            created_at: now,
            updated_at: now,
            messages: Vec::new(),
            interactions: 0,
            status: SessionStatus::Active,
            successor: None,
        }
    }

    /// Returns the last `limit` messages of this session
    pub fn recent_messages(&self, limit: usize) -> Vec<Message> {
        let start = self.messages.len().saturating_sub(limit);
        self.messages[start..].to_vec()
    }
}
