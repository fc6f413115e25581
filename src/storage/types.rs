use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::session::{SessionId, SessionStatus};

/// Summary of a stored chat session for listings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredSession {
    /// Unique identifier for the session
    pub id: SessionId,
    /// User-friendly title
    pub title: String,
    /// Lifecycle state
    pub status: SessionStatus,
    /// Completed interactions
    pub interactions: usize,
    /// Session that replaced this one after rotation
    pub successor: Option<SessionId>,
    /// When the session was created
    pub created_at: DateTime<Utc>,
    /// When the session was last updated
    pub updated_at: DateTime<Utc>,
    /// Number of messages in the session
    pub message_count: usize,
}
