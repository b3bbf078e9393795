use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Actor role. Closed set — every authorization decision in the system
/// derives from this enum, never from free-form role strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Customer,
    Staff,
    Admin,
}

impl Role {
    /// Staff and admin share the same thread-access privileges.
    pub fn is_staff(self) -> bool {
        matches!(self, Role::Staff | Role::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Customer => write!(f, "customer"),
            Role::Staff => write!(f, "staff"),
            Role::Admin => write!(f, "admin"),
        }
    }
}

/// An authenticated actor. Produced only by the session resolver;
/// immutable for the duration of a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    pub display_name: String,
    pub email: String,
    pub role: Role,
}

impl Identity {
    /// The thread a customer identity owns. Threads are keyed 1:1 by
    /// customer id, so this is just the id wrapped.
    pub fn own_thread(&self) -> ThreadId {
        ThreadId(self.id)
    }
}

/// Conversation thread key — equal to the owning customer's user id.
/// One thread per customer, created implicitly on first append.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadId(pub Uuid);

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<Uuid> for ThreadId {
    fn from(id: Uuid) -> Self {
        ThreadId(id)
    }
}

/// A stored message. Immutable once created — no edit, no delete.
/// `sender_role` is derived from the authenticated identity at write
/// time, never supplied by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub thread_id: ThreadId,
    pub sender_id: Uuid,
    pub sender_name: String,
    pub sender_role: Role,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// Denormalized per-thread entry backing the staff dashboard. Best-effort
/// cache with last-write-wins semantics; overwritten on every append and
/// never read back into the message log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterRecord {
    pub thread_id: ThreadId,
    pub customer_name: String,
    pub customer_email: String,
    pub last_activity: DateTime<Utc>,
    pub last_snippet: String,
    pub last_sender_id: Uuid,
    pub last_sender_role: Role,
}

/// Directory entry for roster denormalization when staff touch a thread
/// before the customer has sent anything.
#[derive(Debug, Clone)]
pub struct UserProfile {
    pub id: Uuid,
    pub display_name: String,
    pub email: String,
}
