//! Subscription expiry pass
//!
//! One pass per day: warn tenants whose period ends in 7, 3, or 1 day(s),
//! expire tenants whose period has lapsed, deactivate the branch
//! entitlements that covered it, and queue the notifications. All state
//! lives in storage, so a missed day catches up on the next run, and the
//! `scheduler_runs` day-claim keeps multiple replicas from double-running.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use dukapo_billing::{warning_urgency, NotificationQueue};
use dukapo_shared::SubscriptionStatus;

/// Warning thresholds, in days before the period end.
const WARNING_THRESHOLDS: [i64; 3] = [7, 3, 1];

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ExpiryOutcome {
    pub warnings_sent: usize,
    pub tenants_expired: usize,
}

#[derive(Debug, FromRow)]
struct TenantClockRow {
    id: Uuid,
    name: String,
    subscription_status: String,
    trial_ends_at: Option<DateTime<Utc>>,
    next_billing_date: Option<DateTime<Utc>>,
    auto_renewal_enabled: bool,
}

/// The date a tenant's current entitlement runs out: the trial clock
/// while on trial, the billing clock otherwise.
fn effective_end(
    status: SubscriptionStatus,
    trial_ends_at: Option<DateTime<Utc>>,
    next_billing_date: Option<DateTime<Utc>>,
) -> Option<DateTime<Utc>> {
    match status {
        SubscriptionStatus::Trial => trial_ends_at,
        SubscriptionStatus::Active | SubscriptionStatus::Cancelled => next_billing_date,
        SubscriptionStatus::Expired => None,
    }
}

/// Which thresholds are due for a period ending `days_left` days out.
/// A threshold is due once `days_left` is at or inside it; the per-
/// `(tenant, threshold, period_end)` marker keeps each one to a single
/// send even when a daily run was missed.
fn thresholds_due(days_left: i64) -> Vec<i64> {
    if days_left < 0 {
        return vec![];
    }
    WARNING_THRESHOLDS
        .iter()
        .copied()
        .filter(|&t| days_left <= t)
        .collect()
}

/// Whether a lapsed tenant should expire now. Auto-renewal tenants get
/// the grace window first: the gateway's recurring charge is the renewal
/// mechanism and may land a little after the boundary; this pass only
/// reconciles state, it never initiates charges.
fn should_expire(end: DateTime<Utc>, now: DateTime<Utc>, auto_renewal: bool, grace_days: i64) -> bool {
    if auto_renewal {
        now > end + chrono::Duration::days(grace_days)
    } else {
        now > end
    }
}

/// Run the daily pass if this replica wins today's claim.
/// Returns `None` when another replica (or an earlier restart) already ran.
pub async fn run_daily_pass(
    pool: &PgPool,
    notifications: &NotificationQueue,
    grace_period_days: i64,
) -> anyhow::Result<Option<ExpiryOutcome>> {
    let claimed: Option<NaiveDate> = sqlx::query_scalar(
        r#"
        INSERT INTO scheduler_runs (run_date)
        VALUES (CURRENT_DATE)
        ON CONFLICT (run_date) DO NOTHING
        RETURNING run_date
        "#,
    )
    .fetch_optional(pool)
    .await?;

    if claimed.is_none() {
        tracing::info!("Daily expiry pass already ran today; skipping");
        return Ok(None);
    }

    let now = Utc::now();
    let mut outcome = ExpiryOutcome::default();

    let tenants: Vec<TenantClockRow> = sqlx::query_as(
        r#"
        SELECT id, name, subscription_status, trial_ends_at, next_billing_date,
               auto_renewal_enabled
        FROM tenants
        WHERE parent_id IS NULL
          AND is_active = TRUE
          AND subscription_status IN ('trial', 'active', 'cancelled')
        "#,
    )
    .fetch_all(pool)
    .await?;

    for tenant in &tenants {
        let Some(status) = SubscriptionStatus::parse_str(&tenant.subscription_status) else {
            continue;
        };
        let Some(end) = effective_end(status, tenant.trial_ends_at, tenant.next_billing_date)
        else {
            continue;
        };

        let days_left = (end.date_naive() - now.date_naive()).num_days();

        // Warnings only while the clock still runs; cancelled tenants
        // chose to lapse and are not nagged.
        if end > now && status != SubscriptionStatus::Cancelled {
            for threshold in thresholds_due(days_left) {
                outcome.warnings_sent +=
                    send_warning(pool, notifications, tenant, threshold, days_left, end).await?;
            }
        }

        if end <= now
            && should_expire(end, now, tenant.auto_renewal_enabled, grace_period_days)
        {
            expire_tenant(pool, notifications, tenant, now).await?;
            outcome.tenants_expired += 1;
        }
    }

    sqlx::query("UPDATE scheduler_runs SET finished_at = NOW() WHERE run_date = CURRENT_DATE")
        .execute(pool)
        .await?;

    tracing::info!(
        tenants_scanned = tenants.len(),
        warnings_sent = outcome.warnings_sent,
        tenants_expired = outcome.tenants_expired,
        "Daily expiry pass complete"
    );

    Ok(Some(outcome))
}

/// Send one warning if the `(tenant, threshold, period_end)` marker is
/// still unclaimed. Returns 1 when a notification was queued.
async fn send_warning(
    pool: &PgPool,
    notifications: &NotificationQueue,
    tenant: &TenantClockRow,
    threshold: i64,
    days_left: i64,
    period_end: DateTime<Utc>,
) -> anyhow::Result<usize> {
    let marker: Option<Uuid> = sqlx::query_scalar(
        r#"
        INSERT INTO expiry_warnings (tenant_id, threshold_days, period_end)
        VALUES ($1, $2, $3)
        ON CONFLICT (tenant_id, threshold_days, period_end) DO NOTHING
        RETURNING tenant_id
        "#,
    )
    .bind(tenant.id)
    .bind(threshold as i32)
    .bind(period_end)
    .fetch_optional(pool)
    .await?;

    if marker.is_none() {
        return Ok(0);
    }

    notifications
        .enqueue(
            tenant.id,
            "subscription_warning",
            warning_urgency(days_left),
            serde_json::json!({
                "tenant_name": tenant.name,
                "days_left": days_left,
                "threshold_days": threshold,
                "period_end": period_end,
            }),
        )
        .await?;

    tracing::info!(
        tenant_id = %tenant.id,
        threshold_days = threshold,
        days_left = days_left,
        "Expiry warning queued"
    );
    Ok(1)
}

/// Expire one tenant: flip its status (branches included), deactivate the
/// entitlements that covered the lapsed period, queue the notification.
async fn expire_tenant(
    pool: &PgPool,
    notifications: &NotificationQueue,
    tenant: &TenantClockRow,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        UPDATE tenants
        SET subscription_status = 'expired', updated_at = NOW()
        WHERE id = $1 OR parent_id = $1
        "#,
    )
    .bind(tenant.id)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        UPDATE branch_subscriptions bs
        SET is_active = FALSE
        FROM subscription_transactions st
        WHERE st.id = bs.transaction_id
          AND st.tenant_id = $1
          AND bs.subscription_end <= $2
        "#,
    )
    .bind(tenant.id)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    notifications
        .enqueue(
            tenant.id,
            "subscription_expired",
            "urgent",
            serde_json::json!({ "tenant_name": tenant.name }),
        )
        .await?;

    tracing::warn!(
        tenant_id = %tenant.id,
        previous_status = %tenant.subscription_status,
        "Tenant subscription expired"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    #[test]
    fn effective_end_follows_the_status() {
        let trial = Some(at(2025, 5, 1));
        let billing = Some(at(2025, 6, 1));
        assert_eq!(
            effective_end(SubscriptionStatus::Trial, trial, billing),
            trial
        );
        assert_eq!(
            effective_end(SubscriptionStatus::Active, trial, billing),
            billing
        );
        assert_eq!(
            effective_end(SubscriptionStatus::Cancelled, trial, billing),
            billing
        );
        assert_eq!(effective_end(SubscriptionStatus::Expired, trial, billing), None);
    }

    #[test]
    fn thresholds_fire_at_and_inside_their_day() {
        assert_eq!(thresholds_due(10), Vec::<i64>::new());
        assert_eq!(thresholds_due(8), Vec::<i64>::new());
        assert_eq!(thresholds_due(7), vec![7]);
        assert_eq!(thresholds_due(5), vec![7]);
        assert_eq!(thresholds_due(3), vec![7, 3]);
        assert_eq!(thresholds_due(2), vec![7, 3]);
        assert_eq!(thresholds_due(1), vec![7, 3, 1]);
        assert_eq!(thresholds_due(0), vec![7, 3, 1]);
        assert_eq!(thresholds_due(-1), Vec::<i64>::new());
    }

    #[test]
    fn missed_day_still_catches_each_threshold_once() {
        // Run skipped on day 7; day 6's run still owes the 7-day warning.
        assert_eq!(thresholds_due(6), vec![7]);
    }

    #[test]
    fn lapsed_without_auto_renewal_expires_immediately() {
        let end = at(2025, 5, 1);
        let now = end + Duration::hours(1);
        assert!(should_expire(end, now, false, 3));
    }

    #[test]
    fn auto_renewal_gets_the_grace_window() {
        let end = at(2025, 5, 1);
        assert!(!should_expire(end, end + Duration::days(2), true, 3));
        assert!(should_expire(end, end + Duration::days(4), true, 3));
    }
}
