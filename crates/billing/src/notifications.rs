//! Notification outbox
//!
//! Durable queue the delivery collaborators (email, WhatsApp) drain.
//! The core only ever enqueues; `sent_at` stays NULL until a sender
//! claims the row.

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::BillingResult;

/// Urgency levels for subscription warnings, keyed by days remaining.
pub fn warning_urgency(days_left: i64) -> &'static str {
    match days_left {
        d if d <= 1 => "urgent",
        d if d <= 3 => "warning",
        _ => "notice",
    }
}

pub struct NotificationQueue {
    pool: PgPool,
}

impl NotificationQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn enqueue(
        &self,
        tenant_id: Uuid,
        kind: &str,
        urgency: &str,
        payload: serde_json::Value,
    ) -> BillingResult<Uuid> {
        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO notifications (tenant_id, kind, urgency, payload)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(tenant_id)
        .bind(kind)
        .bind(urgency)
        .bind(payload)
        .fetch_one(&self.pool)
        .await?;

        tracing::debug!(tenant_id = %tenant_id, kind = kind, urgency = urgency, "Notification enqueued");
        Ok(id)
    }

    /// Pending (undelivered) notification count, for operational checks.
    pub async fn pending_count(&self) -> BillingResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE sent_at IS NULL")
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urgency_escalates_with_proximity() {
        assert_eq!(warning_urgency(7), "notice");
        assert_eq!(warning_urgency(3), "warning");
        assert_eq!(warning_urgency(2), "warning");
        assert_eq!(warning_urgency(1), "urgent");
        assert_eq!(warning_urgency(0), "urgent");
    }
}
