//! Bounded chat session lifecycle
//!
//! The [`SessionManager`] owns every [`ChatSession`]. Each session sits
//! behind its own mutex so that admitting a message, bumping the
//! interaction counter and (when the bound is reached) rotating to a new
//! session happen as one transition. Sessions never share a lock, so
//! traffic on one session does not wait on another.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use chrono::Utc;
use tracing::{debug, info, warn};

use super::types::{ChatSession, Message, Role, SessionId, SessionStatus};
use crate::config::SessionConfig;
use crate::error::{Result, RouterError};
use crate::storage::ChatStore;

/// Why a message was not admitted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// No session with this identifier exists
    Unknown,
    /// The session was deleted
    Deleted,
    /// The session rotated; new messages belong to its successor
    Rotated {
        /// The session that replaced it
        successor: Option<SessionId>,
    },
}

impl RejectReason {
    /// Short description used in error messages
    pub fn describe(&self) -> String {
        match self {
            RejectReason::Unknown => "unknown session".to_string(),
            RejectReason::Deleted => "session deleted".to_string(),
            RejectReason::Rotated {
                successor: Some(id),
            } => format!("session rotated, continue in {}", id),
            RejectReason::Rotated { successor: None } => "session rotated".to_string(),
        }
    }
}

/// A user message that was admitted into a session
#[derive(Debug, Clone)]
pub struct Admitted {
    /// The recorded user message
    pub message: Message,
    /// Interaction counter after this message
    pub interactions: usize,
    /// Recent messages of the same session that preceded this one
    pub context: Vec<Message>,
}

/// Outcome of [`SessionManager::admit`]
#[derive(Debug, Clone)]
pub enum AdmitResult {
    /// The message was appended and the session stays active
    Accepted(Admitted),
    /// The message completed the bound; the session rotated
    AcceptedWithRotation {
        /// The admitted message
        admitted: Admitted,
        /// Active session that receives the next message
        next_session: SessionId,
    },
    /// The session cannot take messages
    Rejected(RejectReason),
}

/// Owner of all chat sessions
pub struct SessionManager {
    sessions: RwLock<HashMap<SessionId, Arc<Mutex<ChatSession>>>>,
    config: SessionConfig,
    store: Option<Arc<dyn ChatStore>>,
}

fn lock_poisoned<T>(_: T) -> RouterError {
    RouterError::Storage("session lock poisoned".to_string())
}

impl SessionManager {
    /// Creates an in-memory session manager
    ///
    /// # Examples
    ///
    /// ```
    /// use warehouse_router::config::SessionConfig;
    /// use warehouse_router::session::SessionManager;
    ///
    /// let manager = SessionManager::new(SessionConfig::default());
    /// let session = manager.create_session(None).unwrap();
    /// assert_eq!(session.interactions, 0);
    /// ```
    pub fn new(config: SessionConfig) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            config,
            store: None,
        }
    }

    /// Creates a session manager that writes every change through to `store`
    ///
    /// Sessions already present in the store are loaded.
    ///
    /// # Errors
    ///
    /// Returns error if the stored sessions cannot be loaded
    pub fn with_store(config: SessionConfig, store: Arc<dyn ChatStore>) -> Result<Self> {
        let restored = store.load_sessions()?;
        debug!("Restored {} sessions from storage", restored.len());

        let sessions = restored
            .into_iter()
            .map(|s| (s.id, Arc::new(Mutex::new(s))))
            .collect();

        Ok(Self {
            sessions: RwLock::new(sessions),
            config,
            store: Some(store),
        })
    }

    /// Returns the configured interaction bound
    pub fn max_interactions(&self) -> usize {
        self.config.max_interactions
    }

    /// Creates a new active session
    ///
    /// # Errors
    ///
    /// Returns error if the session cannot be persisted
    pub fn create_session(&self, title: Option<&str>) -> Result<ChatSession> {
        let session = ChatSession::new(title.unwrap_or(&self.config.default_title));
        if let Some(store) = &self.store {
            store.save_session(&session)?;
        }

        let snapshot = session.clone();
        self.sessions
            .write()
            .map_err(lock_poisoned)?
            .insert(session.id, Arc::new(Mutex::new(session)));

        info!(session_id = %snapshot.id, "Created chat session");
        Ok(snapshot)
    }

    fn slot(&self, id: &SessionId) -> Result<Option<Arc<Mutex<ChatSession>>>> {
        Ok(self.sessions.read().map_err(lock_poisoned)?.get(id).cloned())
    }

    /// Admits a user message into a session
    ///
    /// The counter increment, the message append and any rotation happen
    /// while the session's lock is held, and storage is written before
    /// the in-memory state changes, so a failure leaves no partial state.
    ///
    /// # Errors
    ///
    /// Returns error only for storage or lock failures; unavailable
    /// sessions are reported as [`AdmitResult::Rejected`].
    pub fn admit(&self, session_id: SessionId, content: &str) -> Result<AdmitResult> {
        let Some(slot) = self.slot(&session_id)? else {
            warn!(session_id = %session_id, "Rejected message for unknown session");
            return Ok(AdmitResult::Rejected(RejectReason::Unknown));
        };

        let mut session = slot.lock().map_err(lock_poisoned)?;

        match session.status {
            SessionStatus::Deleted => {
                warn!(session_id = %session_id, "Rejected message for deleted session");
                return Ok(AdmitResult::Rejected(RejectReason::Deleted));
            }
            SessionStatus::Rotated => {
                return Ok(AdmitResult::Rejected(RejectReason::Rotated {
                    successor: session.successor,
                }));
            }
            SessionStatus::Active => {}
        }

        let bound = self.config.max_interactions;
        if session.interactions >= bound {
            // Only reachable when the bound was lowered after the session was stored.
            let next = self.rotate_locked(&mut session)?;
            return Ok(AdmitResult::Rejected(RejectReason::Rotated {
                successor: Some(next),
            }));
        }

        let context = session.recent_messages(self.config.context_messages);
        let message = Message::user(session_id, content);

        let mut updated = ChatSession {
            messages: Vec::new(),
            ..session.clone()
        };
        updated.interactions += 1;
        updated.updated_at = Utc::now();
        if let Some(store) = &self.store {
            store.record_message(&updated, &message)?;
        }

        session.messages.push(message.clone());
        session.interactions = updated.interactions;
        session.updated_at = updated.updated_at;

        let admitted = Admitted {
            message,
            interactions: session.interactions,
            context,
        };

        if session.interactions >= bound {
            let next = self.rotate_locked(&mut session)?;
            info!(
                session_id = %session_id,
                next_session = %next,
                "Interaction bound reached, session rotated"
            );
            metrics::increment_counter!("router_rotations_total");
            return Ok(AdmitResult::AcceptedWithRotation {
                admitted,
                next_session: next,
            });
        }

        debug!(
            session_id = %session_id,
            interactions = session.interactions,
            bound,
            "Message admitted"
        );
        Ok(AdmitResult::Accepted(admitted))
    }

    /// Marks a locked session as rotated and registers its successor
    fn rotate_locked(&self, session: &mut ChatSession) -> Result<SessionId> {
        let successor = ChatSession::new(session.title.clone());
        let mut rotated = ChatSession {
            messages: Vec::new(),
            ..session.clone()
        };
        rotated.status = SessionStatus::Rotated;
        rotated.successor = Some(successor.id);
        rotated.updated_at = Utc::now();

        if let Some(store) = &self.store {
            store.save_session(&successor)?;
            store.save_session(&rotated)?;
        }

        session.status = rotated.status;
        session.successor = rotated.successor;
        session.updated_at = rotated.updated_at;

        let next = successor.id;
        self.sessions
            .write()
            .map_err(lock_poisoned)?
            .insert(next, Arc::new(Mutex::new(successor)));
        Ok(next)
    }

    /// Appends the assistant reply that completes an admitted exchange
    ///
    /// Rotated sessions still accept the reply to the message that
    /// rotated them. The interaction counter is not touched.
    ///
    /// # Errors
    ///
    /// Returns `RouterError::SessionUnavailable` for unknown or deleted
    /// sessions, and `RouterError::Config` if `message` is not an
    /// assistant message.
    pub fn record_reply(&self, message: &Message) -> Result<()> {
        if message.role != Role::Assistant {
            return Err(RouterError::Config(
                "record_reply only accepts assistant messages".to_string(),
            )
            .into());
        }

        let slot = self.slot(&message.session_id)?.ok_or_else(|| {
            RouterError::session_unavailable(message.session_id, "unknown session")
        })?;
        let mut session = slot.lock().map_err(lock_poisoned)?;

        if session.status == SessionStatus::Deleted {
            return Err(
                RouterError::session_unavailable(message.session_id, "session deleted").into(),
            );
        }

        let mut updated = ChatSession {
            messages: Vec::new(),
            ..session.clone()
        };
        updated.updated_at = Utc::now();
        if let Some(store) = &self.store {
            store.record_message(&updated, message)?;
        }

        session.messages.push(message.clone());
        session.updated_at = updated.updated_at;
        Ok(())
    }

    /// Marks a session as deleted
    ///
    /// # Errors
    ///
    /// Returns `RouterError::SessionUnavailable` if the session is unknown
    pub fn delete_session(&self, session_id: SessionId) -> Result<()> {
        let slot = self
            .slot(&session_id)?
            .ok_or_else(|| RouterError::session_unavailable(session_id, "unknown session"))?;
        let mut session = slot.lock().map_err(lock_poisoned)?;

        let mut deleted = ChatSession {
            messages: Vec::new(),
            ..session.clone()
        };
        deleted.status = SessionStatus::Deleted;
        deleted.updated_at = Utc::now();
        if let Some(store) = &self.store {
            store.save_session(&deleted)?;
        }

        session.status = SessionStatus::Deleted;
        session.updated_at = deleted.updated_at;
        info!(session_id = %session_id, "Deleted chat session");
        Ok(())
    }

    /// Returns a copy of a session
    pub fn get(&self, session_id: SessionId) -> Result<Option<ChatSession>> {
        match self.slot(&session_id)? {
            Some(slot) => Ok(Some(slot.lock().map_err(lock_poisoned)?.clone())),
            None => Ok(None),
        }
    }

    /// Returns copies of all sessions, most recently updated first
    pub fn list(&self) -> Result<Vec<ChatSession>> {
        let slots: Vec<_> = self
            .sessions
            .read()
            .map_err(lock_poisoned)?
            .values()
            .cloned()
            .collect();

        let mut sessions = Vec::with_capacity(slots.len());
        for slot in slots {
            sessions.push(slot.lock().map_err(lock_poisoned)?.clone());
        }
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(sessions)
    }
}
