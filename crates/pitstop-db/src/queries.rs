use crate::Database;
use crate::models::{MessageRow, NewMessage, RosterRow, RosterUpsert};
use anyhow::Result;
use rusqlite::Connection;

impl Database {
    // -- Messages --

    /// Insert a message and upsert its thread's roster record in one
    /// transaction. The roster is a display cache, but doing both atomically
    /// is free here and rules out dangling roster pointers entirely.
    pub fn append_message(&self, msg: &NewMessage<'_>, roster: &RosterUpsert<'_>) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            tx.execute(
                "INSERT INTO messages
                     (id, thread_id, sender_id, sender_name, sender_role, body, client_token, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    msg.id,
                    msg.thread_id,
                    msg.sender_id,
                    msg.sender_name,
                    msg.sender_role,
                    msg.body,
                    msg.client_token,
                    msg.created_at,
                ],
            )?;

            // Customer identity fields only refresh when the customer is the
            // sender; see RosterUpsert.
            tx.execute(
                "INSERT INTO roster
                     (thread_id, customer_name, customer_email, last_activity,
                      last_snippet, last_sender_id, last_sender_role)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(thread_id) DO UPDATE SET
                     customer_name    = CASE WHEN ?8 THEN excluded.customer_name
                                             ELSE roster.customer_name END,
                     customer_email   = CASE WHEN ?8 THEN excluded.customer_email
                                             ELSE roster.customer_email END,
                     last_activity    = excluded.last_activity,
                     last_snippet     = excluded.last_snippet,
                     last_sender_id   = excluded.last_sender_id,
                     last_sender_role = excluded.last_sender_role",
                rusqlite::params![
                    msg.thread_id,
                    roster.customer_name,
                    roster.customer_email,
                    msg.created_at,
                    roster.last_snippet,
                    msg.sender_id,
                    msg.sender_role,
                    roster.refresh_customer,
                ],
            )?;

            tx.commit()?;
            Ok(())
        })
    }

    /// Full ordered snapshot of one thread, ascending by timestamp with the
    /// insertion sequence breaking ties, so repeated reads always agree.
    pub fn get_messages(&self, thread_id: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| query_messages(conn, thread_id))
    }

    /// Look up a previously stored append by its idempotency token.
    pub fn find_by_client_token(
        &self,
        thread_id: &str,
        client_token: &str,
    ) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT seq, id, thread_id, sender_id, sender_name, sender_role, body, created_at
                 FROM messages
                 WHERE thread_id = ?1 AND client_token = ?2",
            )?;

            let row = stmt
                .query_row([thread_id, client_token], message_from_row)
                .optional()?;

            Ok(row)
        })
    }

    pub fn count_messages(&self, thread_id: &str) -> Result<i64> {
        self.with_conn(|conn| {
            let n = conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE thread_id = ?1",
                [thread_id],
                |row| row.get(0),
            )?;
            Ok(n)
        })
    }

    // -- Roster --

    pub fn list_roster(&self) -> Result<Vec<RosterRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT thread_id, customer_name, customer_email, last_activity,
                        last_snippet, last_sender_id, last_sender_role
                 FROM roster
                 ORDER BY last_activity DESC, thread_id",
            )?;

            let rows = stmt
                .query_map([], |row| {
                    Ok(RosterRow {
                        thread_id: row.get(0)?,
                        customer_name: row.get(1)?,
                        customer_email: row.get(2)?,
                        last_activity: row.get(3)?,
                        last_snippet: row.get(4)?,
                        last_sender_id: row.get(5)?,
                        last_sender_role: row.get(6)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }
}

fn query_messages(conn: &Connection, thread_id: &str) -> Result<Vec<MessageRow>> {
    let mut stmt = conn.prepare(
        "SELECT seq, id, thread_id, sender_id, sender_name, sender_role, body, created_at
         FROM messages
         WHERE thread_id = ?1
         ORDER BY created_at, seq",
    )?;

    let rows = stmt
        .query_map([thread_id], message_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn message_from_row(row: &rusqlite::Row<'_>) -> std::result::Result<MessageRow, rusqlite::Error> {
    Ok(MessageRow {
        seq: row.get(0)?,
        id: row.get(1)?,
        thread_id: row.get(2)?,
        sender_id: row.get(3)?,
        sender_name: row.get(4)?,
        sender_role: row.get(5)?,
        body: row.get(6)?,
        created_at: row.get(7)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
