use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS messages (
            seq          INTEGER PRIMARY KEY AUTOINCREMENT,
            id           TEXT NOT NULL UNIQUE,
            thread_id    TEXT NOT NULL,
            sender_id    TEXT NOT NULL,
            sender_name  TEXT NOT NULL,
            sender_role  TEXT NOT NULL,
            body         TEXT NOT NULL,
            client_token TEXT,
            created_at   TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_thread
            ON messages(thread_id, created_at);

        -- Idempotency: a retried append with the same client token must not
        -- produce a second row.
        CREATE UNIQUE INDEX IF NOT EXISTS idx_messages_client_token
            ON messages(thread_id, client_token)
            WHERE client_token IS NOT NULL;

        CREATE TABLE IF NOT EXISTS roster (
            thread_id        TEXT PRIMARY KEY,
            customer_name    TEXT NOT NULL,
            customer_email   TEXT NOT NULL,
            last_activity    TEXT NOT NULL,
            last_snippet     TEXT NOT NULL,
            last_sender_id   TEXT NOT NULL,
            last_sender_role TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_roster_activity
            ON roster(last_activity);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
