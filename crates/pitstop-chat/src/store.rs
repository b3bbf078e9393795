use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use tokio::sync::broadcast;
use tracing::warn;
use uuid::Uuid;

use pitstop_db::Database;
use pitstop_db::models::{MessageRow, NewMessage, RosterRow, RosterUpsert};
use pitstop_types::error::ChatError;
use pitstop_types::events::StoreEvent;
use pitstop_types::models::{ChatMessage, Identity, Role, RosterRecord, ThreadId};

use crate::policy;
use crate::session::{UserDirectory, fallback_profile};

/// Maximum message length after trimming, in characters.
pub const MAX_MESSAGE_LEN: usize = 1000;

/// Roster preview length, in characters.
pub const SNIPPET_LEN: usize = 100;

const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// Append-only per-customer message log plus the denormalized roster.
///
/// Every caller-facing operation checks the access policy before touching
/// storage; a denial leaves no side effects. Successful appends publish a
/// [`StoreEvent`] that the feed components react to.
#[derive(Clone)]
pub struct ThreadStore {
    db: Arc<Database>,
    directory: Arc<dyn UserDirectory>,
    changes: broadcast::Sender<StoreEvent>,
}

impl ThreadStore {
    pub fn new(db: Arc<Database>, directory: Arc<dyn UserDirectory>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            db,
            directory,
            changes,
        }
    }

    /// Subscribe to change notifications. Events carry only the thread id;
    /// consumers re-read the snapshot they care about.
    pub fn subscribe_changes(&self) -> broadcast::Receiver<StoreEvent> {
        self.changes.subscribe()
    }

    /// Append a message to a thread on behalf of `author`.
    ///
    /// The message and the thread's roster record are written in one
    /// transaction. `client_token`, when supplied, makes the call
    /// idempotent: a retry after a storage failure returns the already
    /// stored message instead of double-posting.
    pub async fn append(
        &self,
        thread_id: ThreadId,
        author: &Identity,
        text: &str,
        client_token: Option<&str>,
    ) -> Result<ChatMessage, ChatError> {
        policy::authorize_write(author, thread_id)?;

        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::Validation("message is empty".into()));
        }
        if text.chars().count() > MAX_MESSAGE_LEN {
            return Err(ChatError::Validation(format!(
                "message exceeds {} characters",
                MAX_MESSAGE_LEN
            )));
        }

        // Roster customer fields: the customer's own identity when they are
        // the sender, otherwise the directory (staff can open a thread
        // before the customer has ever written).
        let (customer_name, customer_email, refresh_customer) = if author.role == Role::Customer {
            (author.display_name.clone(), author.email.clone(), true)
        } else {
            let profile = self
                .directory
                .lookup(thread_id.0)
                .unwrap_or_else(|| fallback_profile(thread_id.0));
            (profile.display_name, profile.email, false)
        };

        let message = ChatMessage {
            id: Uuid::new_v4(),
            thread_id,
            sender_id: author.id,
            sender_name: author.display_name.clone(),
            sender_role: author.role,
            text: text.to_string(),
            created_at: Utc::now(),
        };

        let db = self.db.clone();
        let stored = message.clone();
        let token = client_token.map(str::to_string);

        // (message, inserted) — inserted=false means a token dedupe hit,
        // which must not publish a change event.
        let (message, inserted) = tokio::task::spawn_blocking(move || {
            persist_append(&db, stored, token.as_deref(), PersistRoster {
                customer_name: &customer_name,
                customer_email: &customer_email,
                refresh_customer,
            })
        })
        .await
        .map_err(ChatError::storage)?
        .map_err(ChatError::Storage)?;

        if inserted {
            let _ = self.changes.send(StoreEvent::ThreadChanged { thread_id });
        }

        Ok(message)
    }

    /// Full ordered snapshot of a thread, ascending by creation time.
    pub async fn read(
        &self,
        reader: &Identity,
        thread_id: ThreadId,
    ) -> Result<Vec<ChatMessage>, ChatError> {
        policy::authorize_read(reader, thread_id)?;
        self.snapshot(thread_id).await
    }

    /// Staff-facing roster, most recently active thread first.
    pub async fn list_roster(&self, viewer: &Identity) -> Result<Vec<RosterRecord>, ChatError> {
        policy::authorize_roster(viewer)?;
        self.roster_snapshot().await
    }

    /// Unchecked snapshot read. Callers inside this crate authorize at
    /// subscribe time.
    pub(crate) async fn snapshot(&self, thread_id: ThreadId) -> Result<Vec<ChatMessage>, ChatError> {
        let db = self.db.clone();
        let rows = tokio::task::spawn_blocking(move || db.get_messages(&thread_id.to_string()))
            .await
            .map_err(ChatError::storage)?
            .map_err(ChatError::Storage)?;

        Ok(rows.into_iter().map(message_from_row).collect())
    }

    pub(crate) async fn roster_snapshot(&self) -> Result<Vec<RosterRecord>, ChatError> {
        let db = self.db.clone();
        let rows = tokio::task::spawn_blocking(move || db.list_roster())
            .await
            .map_err(ChatError::storage)?
            .map_err(ChatError::Storage)?;

        Ok(rows.into_iter().map(roster_from_row).collect())
    }
}

struct PersistRoster<'a> {
    customer_name: &'a str,
    customer_email: &'a str,
    refresh_customer: bool,
}

fn persist_append(
    db: &Database,
    message: ChatMessage,
    token: Option<&str>,
    roster: PersistRoster<'_>,
) -> anyhow::Result<(ChatMessage, bool)> {
    let thread_key = message.thread_id.to_string();

    if let Some(tok) = token {
        if let Some(row) = db.find_by_client_token(&thread_key, tok)? {
            return Ok((message_from_row(row), false));
        }
    }

    let result = db.append_message(
        &NewMessage {
            id: &message.id.to_string(),
            thread_id: &thread_key,
            sender_id: &message.sender_id.to_string(),
            sender_name: &message.sender_name,
            sender_role: &message.sender_role.to_string(),
            body: &message.text,
            client_token: token,
            created_at: &message
                .created_at
                .to_rfc3339_opts(SecondsFormat::Micros, true),
        },
        &RosterUpsert {
            customer_name: roster.customer_name,
            customer_email: roster.customer_email,
            last_snippet: &snippet(&message.text),
            refresh_customer: roster.refresh_customer,
        },
    );

    if let Err(err) = result {
        // Two retries racing on the same token: the loser's insert hits the
        // unique index, the original row wins.
        if let Some(tok) = token {
            if let Some(row) = db.find_by_client_token(&thread_key, tok)? {
                return Ok((message_from_row(row), false));
            }
        }
        return Err(err);
    }

    Ok((message, true))
}

/// Roster preview: first SNIPPET_LEN characters of the message.
fn snippet(text: &str) -> String {
    text.chars().take(SNIPPET_LEN).collect()
}

fn message_from_row(row: MessageRow) -> ChatMessage {
    ChatMessage {
        id: parse_uuid(&row.id, "message id"),
        thread_id: ThreadId(parse_uuid(&row.thread_id, "thread id")),
        sender_id: parse_uuid(&row.sender_id, "sender id"),
        sender_name: row.sender_name,
        sender_role: parse_role(&row.sender_role),
        text: row.body,
        created_at: parse_timestamp(&row.created_at, &row.id),
    }
}

fn roster_from_row(row: RosterRow) -> RosterRecord {
    RosterRecord {
        thread_id: ThreadId(parse_uuid(&row.thread_id, "roster thread id")),
        customer_name: row.customer_name,
        customer_email: row.customer_email,
        last_activity: parse_timestamp(&row.last_activity, &row.thread_id),
        last_snippet: row.last_snippet,
        last_sender_id: parse_uuid(&row.last_sender_id, "roster sender id"),
        last_sender_role: parse_role(&row.last_sender_role),
    }
}

fn parse_uuid(value: &str, what: &str) -> Uuid {
    value.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}': {}", what, value, e);
        Uuid::default()
    })
}

fn parse_role(value: &str) -> Role {
    match value {
        "customer" => Role::Customer,
        "staff" => Role::Staff,
        "admin" => Role::Admin,
        other => {
            warn!("Corrupt role '{}', treating as customer", other);
            Role::Customer
        }
    }
}

fn parse_timestamp(value: &str, row_id: &str) -> DateTime<Utc> {
    value
        .parse::<DateTime<Utc>>()
        .unwrap_or_else(|e| {
            warn!("Corrupt created_at '{}' on row '{}': {}", value, row_id, e);
            DateTime::default()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::StaticDirectory;
    use pitstop_types::models::UserProfile;

    fn customer(name: &str) -> Identity {
        Identity {
            id: Uuid::new_v4(),
            display_name: name.into(),
            email: format!("{}@example.com", name.to_lowercase()),
            role: Role::Customer,
        }
    }

    fn staff(name: &str) -> Identity {
        Identity {
            id: Uuid::new_v4(),
            display_name: name.into(),
            email: format!("{}@pitstop.example", name.to_lowercase()),
            role: Role::Staff,
        }
    }

    fn store() -> ThreadStore {
        store_with_directory(StaticDirectory::default())
    }

    fn store_with_directory(directory: StaticDirectory) -> ThreadStore {
        let db = Arc::new(Database::open_in_memory().unwrap());
        ThreadStore::new(db, Arc::new(directory))
    }

    #[tokio::test]
    async fn customer_append_then_read_roundtrip() {
        let store = store();
        let u1 = customer("Casey");
        let thread = u1.own_thread();

        let sent = store
            .append(thread, &u1, "Is my car ready?", None)
            .await
            .unwrap();

        let messages = store.read(&u1, thread).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, sent.id);
        assert_eq!(messages[0].sender_id, u1.id);
        assert_eq!(messages[0].sender_role, Role::Customer);
        assert_eq!(messages[0].text, "Is my car ready?");

        let admin = Identity {
            role: Role::Admin,
            ..staff("Alex")
        };
        let roster = store.list_roster(&admin).await.unwrap();
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].thread_id, thread);
        assert_eq!(roster[0].customer_name, "Casey");
        assert_eq!(roster[0].last_snippet, "Is my car ready?");
    }

    #[tokio::test]
    async fn staff_reply_lands_in_send_order() {
        let store = store();
        let u1 = customer("Casey");
        let s1 = staff("Sam");
        let thread = u1.own_thread();

        store.append(thread, &u1, "Is my car ready?", None).await.unwrap();
        store
            .append(thread, &s1, "Yes, ready for pickup!", None)
            .await
            .unwrap();

        let messages = store.read(&s1, thread).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].sender_role, Role::Customer);
        assert_eq!(messages[1].sender_role, Role::Staff);
        assert_eq!(messages[1].text, "Yes, ready for pickup!");

        let roster = store.list_roster(&s1).await.unwrap();
        assert_eq!(roster[0].last_sender_role, Role::Staff);
    }

    #[tokio::test]
    async fn empty_message_is_rejected_without_side_effects() {
        let store = store();
        let u1 = customer("Casey");
        let thread = u1.own_thread();

        let err = store.append(thread, &u1, "   \n ", None).await.unwrap_err();
        assert!(matches!(err, ChatError::Validation(_)));
        assert!(store.read(&u1, thread).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn over_length_message_is_rejected() {
        let store = store();
        let u1 = customer("Casey");

        let long = "x".repeat(MAX_MESSAGE_LEN + 1);
        let err = store
            .append(u1.own_thread(), &u1, &long, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Validation(_)));

        // Exactly at the limit is fine
        let max = "x".repeat(MAX_MESSAGE_LEN);
        store.append(u1.own_thread(), &u1, &max, None).await.unwrap();
    }

    #[tokio::test]
    async fn customer_cannot_write_into_a_foreign_thread() {
        let store = store();
        let u1 = customer("Casey");
        let u2 = customer("Robin");

        store
            .append(u1.own_thread(), &u1, "mine", None)
            .await
            .unwrap();

        let err = store
            .append(u1.own_thread(), &u2, "hi", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Authorization(_)));

        // Thread untouched
        let messages = store.read(&u1, u1.own_thread()).await.unwrap();
        assert_eq!(messages.len(), 1);

        // And u2 cannot even read it
        assert!(store.read(&u2, u1.own_thread()).await.is_err());
    }

    #[tokio::test]
    async fn roster_is_denied_to_customers() {
        let store = store();
        let u1 = customer("Casey");
        assert!(matches!(
            store.list_roster(&u1).await,
            Err(ChatError::Authorization(_))
        ));
    }

    #[tokio::test]
    async fn concurrent_appends_both_land() {
        let store = store();
        let u1 = customer("Casey");
        let s1 = staff("Sam");
        let thread = u1.own_thread();

        let store_a = store.clone();
        let store_b = store.clone();
        let ua = u1.clone();
        let sa = s1.clone();
        let (a, b) = tokio::join!(
            tokio::spawn(async move { store_a.append(thread, &ua, "from customer", None).await }),
            tokio::spawn(async move { store_b.append(thread, &sa, "from staff", None).await }),
        );
        a.unwrap().unwrap();
        b.unwrap().unwrap();

        let first = store.read(&s1, thread).await.unwrap();
        assert_eq!(first.len(), 2);

        // Order is whatever the store assigned, but it is stable
        let second = store.read(&s1, thread).await.unwrap();
        let ids = |v: &[ChatMessage]| v.iter().map(|m| m.id).collect::<Vec<_>>();
        assert_eq!(ids(&first), ids(&second));
    }

    #[tokio::test]
    async fn client_token_makes_append_idempotent() {
        let store = store();
        let u1 = customer("Casey");
        let thread = u1.own_thread();

        let first = store
            .append(thread, &u1, "did this send?", Some("tok-7"))
            .await
            .unwrap();
        let retry = store
            .append(thread, &u1, "did this send?", Some("tok-7"))
            .await
            .unwrap();

        assert_eq!(first.id, retry.id);
        assert_eq!(store.read(&u1, thread).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn staff_first_touch_uses_directory_profile() {
        let u1 = customer("Casey");
        let store = store_with_directory(StaticDirectory::new([UserProfile {
            id: u1.id,
            display_name: u1.display_name.clone(),
            email: u1.email.clone(),
        }]));
        let s1 = staff("Sam");

        store
            .append(u1.own_thread(), &s1, "Your invoice is ready", None)
            .await
            .unwrap();

        let roster = store.list_roster(&s1).await.unwrap();
        assert_eq!(roster[0].customer_name, "Casey");
        assert_eq!(roster[0].customer_email, "casey@example.com");
    }

    #[tokio::test]
    async fn staff_first_touch_without_directory_falls_back() {
        let store = store();
        let u1 = customer("Casey");
        let s1 = staff("Sam");

        store
            .append(u1.own_thread(), &s1, "Hello?", None)
            .await
            .unwrap();

        let roster = store.list_roster(&s1).await.unwrap();
        assert!(roster[0].customer_name.starts_with("Customer "));

        // Once the customer writes, their real identity takes over
        store
            .append(u1.own_thread(), &u1, "Hi!", None)
            .await
            .unwrap();
        let roster = store.list_roster(&s1).await.unwrap();
        assert_eq!(roster[0].customer_name, "Casey");
    }
}
