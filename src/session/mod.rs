//! Chat sessions with a bounded number of interactions
//!
//! Sessions rotate once they reach the configured interaction bound so
//! that conversation context stays small and relevant.

pub mod manager;
pub mod types;

pub use manager::{AdmitResult, Admitted, RejectReason, SessionManager};
pub use types::{ChatSession, Message, MessageId, Role, SessionId, SessionStatus};
