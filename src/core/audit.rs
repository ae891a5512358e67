//! Short-lived audit trail of ticket submissions, kept in Redis.

use chrono::{DateTime, Utc};

pub const AUDIT_TTL_SECS: i64 = 30 * 24 * 60 * 60;

#[derive(Debug, Clone)]
pub struct TicketAuditRecord {
    pub created_at: DateTime<Utc>,
    pub description: String,
    pub email: String,
    pub ip: String,
    pub name: String,
    pub reason: String,
}

impl TicketAuditRecord {
    pub fn key(&self) -> String {
        format!(
            "ticket:{}:{}",
            self.created_at.timestamp_millis(),
            uuid::Uuid::new_v4().simple()
        )
    }

    pub fn fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("createdAt", self.created_at.to_rfc3339()),
            ("description", self.description.clone()),
            ("email", self.email.clone()),
            ("ip", self.ip.clone()),
            ("name", self.name.clone()),
            ("reason", self.reason.clone()),
        ]
    }
}

/// Store the record as a hash that expires after 30 days. Returns the key.
pub async fn record_ticket_submission(
    client: &redis::Client,
    record: &TicketAuditRecord,
) -> Result<String, redis::RedisError> {
    let key = record.key();
    let fields = record.fields();
    let mut conn = client.get_multiplexed_async_connection().await?;
    redis::pipe()
        .atomic()
        .hset_multiple(&key, &fields[..])
        .ignore()
        .expire(&key, AUDIT_TTL_SECS)
        .ignore()
        .query_async::<()>(&mut conn)
        .await?;
    log::debug!("Recorded ticket audit entry {}", key);
    Ok(key)
}
