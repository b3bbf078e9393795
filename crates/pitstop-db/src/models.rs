/// Database row types — these map directly to SQLite rows.
/// Distinct from the pitstop-types API models to keep the DB layer
/// independent; timestamps and roles stay as text until the service
/// layer converts them.

pub struct MessageRow {
    pub seq: i64,
    pub id: String,
    pub thread_id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub sender_role: String,
    pub body: String,
    pub created_at: String,
}

pub struct RosterRow {
    pub thread_id: String,
    pub customer_name: String,
    pub customer_email: String,
    pub last_activity: String,
    pub last_snippet: String,
    pub last_sender_id: String,
    pub last_sender_role: String,
}

/// Message insert parameters, fully resolved by the service layer
/// (store-assigned id and timestamp included).
pub struct NewMessage<'a> {
    pub id: &'a str,
    pub thread_id: &'a str,
    pub sender_id: &'a str,
    pub sender_name: &'a str,
    pub sender_role: &'a str,
    pub body: &'a str,
    pub client_token: Option<&'a str>,
    pub created_at: &'a str,
}

/// Roster upsert parameters for the same append. `refresh_customer`
/// controls whether the denormalized customer identity fields overwrite
/// an existing row: true when the sender is the customer themself, false
/// for staff appends (a directory-miss fallback must not clobber a good
/// name).
pub struct RosterUpsert<'a> {
    pub customer_name: &'a str,
    pub customer_email: &'a str,
    pub last_snippet: &'a str,
    pub refresh_customer: bool,
}
