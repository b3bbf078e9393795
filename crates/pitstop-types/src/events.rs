use serde::{Deserialize, Serialize};

use crate::models::{ChatMessage, RosterRecord, ThreadId};

/// Change notifications published by the thread store after a successful
/// append. Feed tasks react by re-reading the affected snapshot; the event
/// itself carries no message payload, so a lagged receiver loses nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreEvent {
    ThreadChanged { thread_id: ThreadId },
}

/// Commands sent FROM client TO server over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },

    /// Start pushing snapshots of one thread
    SubscribeThread { thread_id: ThreadId },

    /// Start pushing roster snapshots (staff/admin only)
    SubscribeRoster,
}

/// Events pushed FROM server TO client over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user_id: uuid::Uuid, display_name: String },

    /// Full ordered snapshot of a thread; sent once on subscribe and again
    /// after every change
    ThreadSnapshot {
        thread_id: ThreadId,
        messages: Vec<ChatMessage>,
    },

    /// Full roster ordered by recency, descending
    RosterSnapshot { records: Vec<RosterRecord> },

    /// A command was rejected; the subscription it asked for was not created
    Denied { reason: String },
}
