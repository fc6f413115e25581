//! Feedback events on assistant replies

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

use crate::session::MessageId;

/// Direction of a feedback event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    /// The reply was useful
    Positive,
    /// The reply was wrong or unhelpful
    Negative,
}

impl Polarity {
    /// Returns the polarity tag as stored and logged
    pub fn as_str(&self) -> &'static str {
        match self {
            Polarity::Positive => "positive",
            Polarity::Negative => "negative",
        }
    }

    /// Parses a stored polarity tag
    ///
    /// Accepts the shorthands used by the chat commands.
    pub fn parse_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "positive" | "good" | "up" | "+" => Some(Polarity::Positive),
            "negative" | "bad" | "down" | "-" => Some(Polarity::Negative),
            _ => None,
        }
    }

    /// Smoothing target for this polarity
    pub fn signal(&self) -> f64 {
        match self {
            Polarity::Positive => 1.0,
            Polarity::Negative => 0.0,
        }
    }
}

impl fmt::Display for Polarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A feedback event on one assistant message
///
/// Records are immutable once created.
///
/// # Examples
///
/// ```
/// use uuid::Uuid;
/// use warehouse_router::learning::{FeedbackRecord, Polarity};
///
/// let record = FeedbackRecord::new(Uuid::new_v4(), Polarity::Negative, Some("wrong table".into()));
/// assert_eq!(record.id.len(), 26);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    /// Unique identifier (ULID)
    pub id: String,
    /// The assistant message being rated
    pub message_id: MessageId,
    /// Positive or negative
    pub polarity: Polarity,
    /// Optional free-text comment
    pub comment: Option<String>,
    /// When the feedback was given
    pub created_at: DateTime<Utc>,
}

impl FeedbackRecord {
    /// Creates a feedback record stamped now
    pub fn new(message_id: MessageId, polarity: Polarity, comment: Option<String>) -> Self {
        Self {
            id: Ulid::new().to_string(),
            message_id,
            polarity,
            comment: comment.filter(|c| !c.trim().is_empty()),
            created_at: Utc::now(),
        }
    }
}
