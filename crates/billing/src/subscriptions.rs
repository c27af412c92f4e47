//! Subscription ledger
//!
//! The single authoritative mutation path for an organization's
//! entitlements. The database is the source of truth; the gateway is for
//! payment processing only. Verification is idempotent under arbitrary
//! repetition: the `branch_subscriptions (transaction_id, tenant_id)`
//! uniqueness constraint is the concurrency primitive, and no
//! application-level lock is taken anywhere on this path.

use chrono::{DateTime, Duration, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use dukapo_shared::{BillingCycle, SubscriptionStatus, TransactionKind, TransactionStatus};

use crate::error::{BillingError, BillingResult};
use crate::gateway::{new_reference, GatewayClient};
use crate::pricing;

/// How many times a verify re-enters after losing a uniqueness race.
/// The winner's committed state satisfies the retry via the early return,
/// so one retry is normally enough.
const VERIFY_RETRIES: u32 = 3;

#[derive(Debug, FromRow)]
struct TransactionRow {
    id: Uuid,
    tenant_id: Uuid,
    reference: String,
    billing_cycle: String,
    kind: String,
    status: String,
    branch_ids: Vec<Uuid>,
    subscription_end: Option<DateTime<Utc>>,
}

#[derive(Debug, FromRow)]
struct TenantBillingRow {
    owner_email: String,
    currency: String,
    parent_id: Option<Uuid>,
    subscription_status: String,
    trial_ends_at: Option<DateTime<Utc>>,
    next_billing_date: Option<DateTime<Utc>>,
    auto_renewal_enabled: bool,
    gateway_authorization: Option<String>,
    saved_branch_selection: Vec<Uuid>,
}

/// Outcome of `initialize` / `add_branches`: where to send the customer.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CheckoutInit {
    pub reference: String,
    pub authorization_url: String,
    pub amount_minor: i64,
}

/// Outcome of `verify`; identical across repeated calls.
#[derive(Debug, Clone, serde::Serialize)]
pub struct VerifyOutcome {
    pub reference: String,
    pub status: TransactionStatus,
    pub subscription_end: Option<DateTime<Utc>>,
    pub branches_enabled: Vec<Uuid>,
}

/// One row of the payment history.
#[derive(Debug, Clone, serde::Serialize, FromRow)]
pub struct TransactionView {
    pub reference: String,
    pub amount_minor: i64,
    pub billing_cycle: String,
    pub kind: String,
    pub status: String,
    pub subscription_start: Option<DateTime<Utc>>,
    pub subscription_end: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub verified_at: Option<DateTime<Utc>>,
}

/// Snapshot for the status endpoint.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SubscriptionSnapshot {
    pub status: SubscriptionStatus,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub next_billing_date: Option<DateTime<Utc>>,
    pub auto_renewal_enabled: bool,
    pub covered_branches: Vec<Uuid>,
}

pub struct SubscriptionService {
    pool: PgPool,
    gateway: GatewayClient,
    base_price_minor: i64,
}

impl SubscriptionService {
    pub fn new(pool: PgPool, gateway: GatewayClient, base_price_minor: i64) -> Self {
        Self {
            pool,
            gateway,
            base_price_minor,
        }
    }

    async fn load_org(&self, org_id: Uuid) -> BillingResult<TenantBillingRow> {
        let row: Option<TenantBillingRow> = sqlx::query_as(
            r#"
            SELECT owner_email, currency, parent_id, subscription_status,
                   trial_ends_at, next_billing_date, auto_renewal_enabled,
                   gateway_authorization, saved_branch_selection
            FROM tenants
            WHERE id = $1
            "#,
        )
        .bind(org_id)
        .fetch_optional(&self.pool)
        .await?;

        let row = row.ok_or_else(|| BillingError::NotFound("tenant".to_string()))?;
        if row.parent_id.is_some() {
            return Err(BillingError::InvalidInput(
                "subscriptions are managed on the organization, not a branch".to_string(),
            ));
        }
        Ok(row)
    }

    /// Resolve a branch selection into the billed location list: the org
    /// root first, then each selected branch. Rejects ids that are not
    /// active branches of this organization.
    async fn billed_locations(&self, org_id: Uuid, selected: &[Uuid]) -> BillingResult<Vec<Uuid>> {
        let valid: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT id FROM tenants
            WHERE parent_id = $1 AND is_active = TRUE AND id = ANY($2)
            "#,
        )
        .bind(org_id)
        .bind(selected)
        .fetch_all(&self.pool)
        .await?;

        let mut locations = vec![org_id];
        for id in selected {
            if *id == org_id || locations.contains(id) {
                continue;
            }
            if !valid.contains(id) {
                return Err(BillingError::InvalidInput(format!(
                    "branch {id} is not an active branch of this organization"
                )));
            }
            locations.push(*id);
        }
        Ok(locations)
    }

    /// Start a checkout for a full billing cycle covering the selected
    /// branches (the main location is always included).
    pub async fn initialize(
        &self,
        org_id: Uuid,
        cycle: BillingCycle,
        selected_branch_ids: &[Uuid],
    ) -> BillingResult<CheckoutInit> {
        let org = self.load_org(org_id).await?;
        let locations = self.billed_locations(org_id, selected_branch_ids).await?;
        let amount_minor =
            pricing::cycle_total_minor(self.base_price_minor, cycle, locations.len())
                .map_err(|e| BillingError::InvalidInput(e.to_string()))?;

        let reference = new_reference();

        sqlx::query(
            r#"
            INSERT INTO subscription_transactions
                (tenant_id, reference, amount_minor, billing_cycle, kind, status, branch_ids)
            VALUES ($1, $2, $3, $4, 'new_cycle', 'pending', $5)
            "#,
        )
        .bind(org_id)
        .bind(&reference)
        .bind(amount_minor)
        .bind(cycle.as_str())
        .bind(&locations)
        .execute(&self.pool)
        .await?;

        let init = self
            .gateway
            .initialize_transaction(
                &reference,
                amount_minor,
                &org.currency,
                &org.owner_email,
                serde_json::json!({ "tenant_id": org_id }),
            )
            .await?;

        tracing::info!(
            org_id = %org_id,
            reference = %reference,
            amount_minor = amount_minor,
            cycle = cycle.as_str(),
            locations = locations.len(),
            "Subscription checkout initialized"
        );

        Ok(CheckoutInit {
            reference,
            authorization_url: init.authorization_url,
            amount_minor,
        })
    }

    /// Start a pro-rata checkout adding branches mid-cycle. The new
    /// branches are covered until the organization's current billing date.
    pub async fn add_branches(
        &self,
        org_id: Uuid,
        new_branch_ids: &[Uuid],
    ) -> BillingResult<CheckoutInit> {
        if new_branch_ids.is_empty() {
            return Err(BillingError::InvalidInput(
                "no branches selected".to_string(),
            ));
        }

        let org = self.load_org(org_id).await?;
        if SubscriptionStatus::parse_str(&org.subscription_status)
            != Some(SubscriptionStatus::Active)
        {
            return Err(BillingError::Precondition(
                "subscription.add_branches".to_string(),
            ));
        }
        let next_billing = org
            .next_billing_date
            .ok_or_else(|| BillingError::Precondition("subscription.add_branches".to_string()))?;

        let cycle = self.current_cycle(org_id).await?;
        // billed_locations prepends the org root; only the added branches
        // are billed pro-rata.
        let added: Vec<Uuid> = self
            .billed_locations(org_id, new_branch_ids)
            .await?
            .into_iter()
            .filter(|id| *id != org_id)
            .collect();
        if added.is_empty() {
            return Err(BillingError::InvalidInput(
                "no branches selected".to_string(),
            ));
        }

        let period_days = cycle.period_days();
        let remaining_days = (next_billing - Utc::now()).num_days().clamp(0, period_days);
        let per_branch = pricing::per_branch_price_minor(self.base_price_minor, cycle);
        let prorata = pricing::prorata_minor(per_branch, remaining_days, period_days)
            .map_err(|e| BillingError::InvalidInput(e.to_string()))?;
        let amount_minor = prorata * added.len() as i64;

        let reference = new_reference();

        sqlx::query(
            r#"
            INSERT INTO subscription_transactions
                (tenant_id, reference, amount_minor, billing_cycle, kind, status,
                 branch_ids, subscription_end)
            VALUES ($1, $2, $3, $4, 'branch_add', 'pending', $5, $6)
            "#,
        )
        .bind(org_id)
        .bind(&reference)
        .bind(amount_minor)
        .bind(cycle.as_str())
        .bind(&added)
        .bind(next_billing)
        .execute(&self.pool)
        .await?;

        let init = self
            .gateway
            .initialize_transaction(
                &reference,
                amount_minor,
                &org.currency,
                &org.owner_email,
                serde_json::json!({ "tenant_id": org_id }),
            )
            .await?;

        tracing::info!(
            org_id = %org_id,
            reference = %reference,
            amount_minor = amount_minor,
            added = added.len(),
            remaining_days = remaining_days,
            "Pro-rata branch addition initialized"
        );

        Ok(CheckoutInit {
            reference,
            authorization_url: init.authorization_url,
            amount_minor,
        })
    }

    /// Billing cycle of the organization's current period, taken from the
    /// most recent successful full-cycle transaction.
    async fn current_cycle(&self, org_id: Uuid) -> BillingResult<BillingCycle> {
        let cycle: Option<String> = sqlx::query_scalar(
            r#"
            SELECT billing_cycle FROM subscription_transactions
            WHERE tenant_id = $1 AND kind = 'new_cycle' AND status = 'success'
            ORDER BY verified_at DESC
            LIMIT 1
            "#,
        )
        .bind(org_id)
        .fetch_optional(&self.pool)
        .await?;

        cycle
            .and_then(|c| BillingCycle::parse_str(&c))
            .ok_or_else(|| BillingError::Precondition("subscription.add_branches".to_string()))
    }

    /// Idempotent payment verification.
    ///
    /// Safe under user refreshes, webhook retries, and concurrent calls:
    /// a transaction already `success` returns its cached outcome without
    /// touching the gateway, and a racing writer that loses on the
    /// `branch_subscriptions` uniqueness constraint re-enters here and is
    /// absorbed by that early return.
    pub async fn verify(&self, reference: &str) -> BillingResult<VerifyOutcome> {
        let mut attempt = 0;
        loop {
            match self.verify_once(reference).await {
                Err(e) if e.is_unique_violation() && attempt + 1 < VERIFY_RETRIES => {
                    attempt += 1;
                    tracing::debug!(
                        reference = %reference,
                        attempt = attempt,
                        "Verify lost a uniqueness race; re-entering"
                    );
                }
                other => return other,
            }
        }
    }

    async fn verify_once(&self, reference: &str) -> BillingResult<VerifyOutcome> {
        // Step 1: the transaction must be ours.
        let tx: Option<TransactionRow> = sqlx::query_as(
            r#"
            SELECT id, tenant_id, reference, billing_cycle, kind,
                   status, branch_ids, subscription_end
            FROM subscription_transactions
            WHERE reference = $1
            "#,
        )
        .bind(reference)
        .fetch_optional(&self.pool)
        .await?;
        let tx = tx.ok_or(BillingError::InvalidReference)?;

        // Step 2: already verified -> cached outcome, no gateway call,
        // no writes. Mandatory for idempotency.
        if tx.status == TransactionStatus::Success.as_str() {
            let branches: Vec<Uuid> = sqlx::query_scalar(
                "SELECT tenant_id FROM branch_subscriptions WHERE transaction_id = $1",
            )
            .bind(tx.id)
            .fetch_all(&self.pool)
            .await?;
            return Ok(VerifyOutcome {
                reference: tx.reference,
                status: TransactionStatus::Success,
                subscription_end: tx.subscription_end,
                branches_enabled: branches,
            });
        }

        // Step 3: ask the gateway. A gateway failure propagates and the
        // transaction stays `pending` for the next verify.
        let verification = self.gateway.verify_transaction(reference).await?;
        if !verification.is_success() {
            sqlx::query(
                "UPDATE subscription_transactions SET status = 'failed' \
                 WHERE id = $1 AND status = 'pending'",
            )
            .bind(tx.id)
            .execute(&self.pool)
            .await?;
            tracing::warn!(
                reference = %reference,
                gateway_status = %verification.status,
                "Gateway reported non-success; transaction marked failed"
            );
            return Ok(VerifyOutcome {
                reference: tx.reference,
                status: TransactionStatus::Failed,
                subscription_end: None,
                branches_enabled: vec![],
            });
        }

        let kind = TransactionKind::parse_str(&tx.kind)
            .ok_or_else(|| BillingError::InvalidInput(format!("unknown kind `{}`", tx.kind)))?;
        let cycle = BillingCycle::parse_str(&tx.billing_cycle).ok_or_else(|| {
            BillingError::InvalidInput(format!("unknown cycle `{}`", tx.billing_cycle))
        })?;

        let now = Utc::now();
        let mut db = self.pool.begin().await?;

        // Step 4: the entitlement window this payment buys.
        let subscription_end = match kind {
            TransactionKind::NewCycle => now + Duration::days(cycle.period_days()),
            TransactionKind::BranchAdd => {
                // Pro-rata additions ride the current period.
                let next: Option<DateTime<Utc>> =
                    sqlx::query_scalar("SELECT next_billing_date FROM tenants WHERE id = $1")
                        .bind(tx.tenant_id)
                        .fetch_one(&mut *db)
                        .await?;
                next.ok_or_else(|| {
                    BillingError::Precondition("subscription.add_branches".to_string())
                })?
            }
        };

        // Step 5: one entitlement row per covered location. Plain inserts:
        // a racing verify trips the (transaction_id, tenant_id) constraint
        // here, rolls back, and retries into the step-2 early return.
        for branch_id in &tx.branch_ids {
            sqlx::query(
                r#"
                INSERT INTO branch_subscriptions
                    (transaction_id, tenant_id, is_main_location, is_active, subscription_end)
                VALUES ($1, $2, $3, TRUE, $4)
                "#,
            )
            .bind(tx.id)
            .bind(branch_id)
            .bind(*branch_id == tx.tenant_id)
            .bind(subscription_end)
            .execute(&mut *db)
            .await?;
        }

        // Step 6: reflect the payment on the tenant.
        match kind {
            TransactionKind::NewCycle => {
                sqlx::query(
                    r#"
                    UPDATE tenants
                    SET subscription_status = 'active',
                        next_billing_date = $2,
                        last_payment_date = $3,
                        gateway_authorization = COALESCE($4, gateway_authorization),
                        saved_branch_selection = $5,
                        updated_at = NOW()
                    WHERE id = $1
                    "#,
                )
                .bind(tx.tenant_id)
                .bind(subscription_end)
                .bind(now)
                .bind(&verification.authorization_code)
                .bind(&tx.branch_ids)
                .execute(&mut *db)
                .await?;

                // Branch rows mirror the organization's status.
                sqlx::query(
                    "UPDATE tenants SET subscription_status = 'active', updated_at = NOW() \
                     WHERE parent_id = $1",
                )
                .bind(tx.tenant_id)
                .execute(&mut *db)
                .await?;
            }
            TransactionKind::BranchAdd => {
                sqlx::query(
                    r#"
                    UPDATE tenants
                    SET last_payment_date = $2,
                        gateway_authorization = COALESCE($3, gateway_authorization),
                        saved_branch_selection = (
                            SELECT ARRAY(
                                SELECT DISTINCT e
                                FROM unnest(saved_branch_selection || $4) AS e
                            )
                        ),
                        updated_at = NOW()
                    WHERE id = $1
                    "#,
                )
                .bind(tx.tenant_id)
                .bind(now)
                .bind(&verification.authorization_code)
                .bind(&tx.branch_ids)
                .execute(&mut *db)
                .await?;
            }
        }

        // Step 7: seal the transaction.
        sqlx::query(
            r#"
            UPDATE subscription_transactions
            SET status = 'success',
                subscription_start = $2,
                subscription_end = $3,
                gateway_authorization = $4,
                verified_at = $2
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(tx.id)
        .bind(now)
        .bind(subscription_end)
        .bind(&verification.authorization_code)
        .execute(&mut *db)
        .await?;

        db.commit().await?;

        tracing::info!(
            reference = %reference,
            org_id = %tx.tenant_id,
            kind = %tx.kind,
            subscription_end = %subscription_end,
            branches = tx.branch_ids.len(),
            "Subscription payment verified"
        );

        Ok(VerifyOutcome {
            reference: tx.reference,
            status: TransactionStatus::Success,
            subscription_end: Some(subscription_end),
            branches_enabled: tx.branch_ids,
        })
    }

    /// Record a gateway-initiated recurring charge (auto-renewal webhook).
    /// Idempotent by reference. The saved branch selection is validated
    /// against currently-active branches; branches disabled since the last
    /// renewal are dropped rather than billed.
    pub async fn record_renewal(
        &self,
        org_id: Uuid,
        reference: &str,
        amount_minor: i64,
    ) -> BillingResult<()> {
        let org = self.load_org(org_id).await?;
        if !org.auto_renewal_enabled {
            tracing::warn!(
                org_id = %org_id,
                reference = %reference,
                "Renewal webhook for tenant without auto-renewal; ignoring"
            );
            return Ok(());
        }

        let cycle = self.current_cycle(org_id).await?;

        let still_active: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT id FROM tenants
            WHERE parent_id = $1 AND is_active = TRUE AND id = ANY($2)
            "#,
        )
        .bind(org_id)
        .bind(&org.saved_branch_selection)
        .fetch_all(&self.pool)
        .await?;

        let mut selection = vec![org_id];
        for id in &org.saved_branch_selection {
            if still_active.contains(id) && !selection.contains(id) {
                selection.push(*id);
            }
        }

        let now = Utc::now();
        // Renewal extends from the period boundary, not from whenever the
        // webhook happened to arrive.
        let period_start = org.next_billing_date.filter(|d| *d > now).unwrap_or(now);
        let subscription_end = period_start + Duration::days(cycle.period_days());

        let mut db = self.pool.begin().await?;

        let tx_id: Option<Uuid> = sqlx::query_scalar(
            r#"
            INSERT INTO subscription_transactions
                (tenant_id, reference, amount_minor, billing_cycle, kind, status,
                 branch_ids, subscription_start, subscription_end, verified_at)
            VALUES ($1, $2, $3, $4, 'new_cycle', 'success', $5, $6, $7, $6)
            ON CONFLICT (reference) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(org_id)
        .bind(reference)
        .bind(amount_minor)
        .bind(cycle.as_str())
        .bind(&selection)
        .bind(now)
        .bind(subscription_end)
        .fetch_optional(&mut *db)
        .await?;

        let Some(tx_id) = tx_id else {
            // Duplicate delivery; the first one did the work.
            db.rollback().await?;
            return Ok(());
        };

        for branch_id in &selection {
            sqlx::query(
                r#"
                INSERT INTO branch_subscriptions
                    (transaction_id, tenant_id, is_main_location, is_active, subscription_end)
                VALUES ($1, $2, $3, TRUE, $4)
                ON CONFLICT (transaction_id, tenant_id) DO NOTHING
                "#,
            )
            .bind(tx_id)
            .bind(branch_id)
            .bind(*branch_id == org_id)
            .bind(subscription_end)
            .execute(&mut *db)
            .await?;
        }

        sqlx::query(
            r#"
            UPDATE tenants
            SET subscription_status = 'active',
                next_billing_date = $2,
                last_payment_date = $3,
                saved_branch_selection = $4,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(org_id)
        .bind(subscription_end)
        .bind(now)
        .bind(&selection)
        .execute(&mut *db)
        .await?;

        sqlx::query(
            "UPDATE tenants SET subscription_status = 'active', updated_at = NOW() \
             WHERE parent_id = $1",
        )
        .bind(org_id)
        .execute(&mut *db)
        .await?;

        db.commit().await?;

        tracing::info!(
            org_id = %org_id,
            reference = %reference,
            subscription_end = %subscription_end,
            locations = selection.len(),
            "Auto-renewal recorded"
        );

        Ok(())
    }

    /// Cancel: access is retained until the billing date; the expiry
    /// scheduler performs the final transition.
    pub async fn cancel(&self, org_id: Uuid) -> BillingResult<SubscriptionSnapshot> {
        let org = self.load_org(org_id).await?;
        match SubscriptionStatus::parse_str(&org.subscription_status) {
            Some(SubscriptionStatus::Trial) | Some(SubscriptionStatus::Active) => {}
            _ => {
                return Err(BillingError::Precondition(
                    "subscription.cancel".to_string(),
                ));
            }
        }

        sqlx::query(
            r#"
            UPDATE tenants
            SET subscription_status = 'cancelled',
                auto_renewal_enabled = CASE WHEN id = $1 THEN FALSE ELSE auto_renewal_enabled END,
                updated_at = NOW()
            WHERE id = $1 OR parent_id = $1
            "#,
        )
        .bind(org_id)
        .execute(&self.pool)
        .await?;

        tracing::info!(org_id = %org_id, "Subscription cancelled");
        self.snapshot(org_id).await
    }

    /// Reactivate a cancelled subscription before its period lapses.
    /// Back to `trial` while the trial clock still runs, otherwise `active`.
    pub async fn reactivate(&self, org_id: Uuid) -> BillingResult<SubscriptionSnapshot> {
        let org = self.load_org(org_id).await?;
        if SubscriptionStatus::parse_str(&org.subscription_status)
            != Some(SubscriptionStatus::Cancelled)
        {
            return Err(BillingError::Precondition(
                "subscription.reactivate".to_string(),
            ));
        }

        let now = Utc::now();
        let trial_running = org.trial_ends_at.is_some_and(|t| t > now);
        let period_running = org.next_billing_date.is_some_and(|t| t > now);
        if !trial_running && !period_running {
            return Err(BillingError::Precondition(
                "subscription.reactivate".to_string(),
            ));
        }

        let new_status = if trial_running {
            SubscriptionStatus::Trial
        } else {
            SubscriptionStatus::Active
        };

        sqlx::query(
            "UPDATE tenants SET subscription_status = $2, updated_at = NOW() \
             WHERE id = $1 OR parent_id = $1",
        )
        .bind(org_id)
        .bind(new_status.as_str())
        .execute(&self.pool)
        .await?;

        tracing::info!(org_id = %org_id, status = new_status.as_str(), "Subscription reactivated");
        self.snapshot(org_id).await
    }

    pub async fn enable_auto_renewal(
        &self,
        org_id: Uuid,
        authorization_token: Option<&str>,
    ) -> BillingResult<()> {
        let org = self.load_org(org_id).await?;
        if authorization_token.is_none() && org.gateway_authorization.is_none() {
            return Err(BillingError::Precondition(
                "subscription.auto_renewal".to_string(),
            ));
        }

        sqlx::query(
            r#"
            UPDATE tenants
            SET auto_renewal_enabled = TRUE,
                gateway_authorization = COALESCE($2, gateway_authorization),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(org_id)
        .bind(authorization_token)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn disable_auto_renewal(&self, org_id: Uuid) -> BillingResult<()> {
        self.load_org(org_id).await?;
        sqlx::query(
            "UPDATE tenants SET auto_renewal_enabled = FALSE, updated_at = NOW() WHERE id = $1",
        )
        .bind(org_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Payment history, newest first.
    pub async fn list_transactions(
        &self,
        org_id: Uuid,
        limit: i64,
    ) -> BillingResult<Vec<TransactionView>> {
        self.load_org(org_id).await?;
        let rows = sqlx::query_as::<_, TransactionView>(
            r#"
            SELECT reference, amount_minor, billing_cycle, kind, status,
                   subscription_start, subscription_end, created_at, verified_at
            FROM subscription_transactions
            WHERE tenant_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(org_id)
        .bind(limit.clamp(1, 200))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Current entitlement snapshot for the status endpoint.
    pub async fn snapshot(&self, org_id: Uuid) -> BillingResult<SubscriptionSnapshot> {
        let org = self.load_org(org_id).await?;
        let status = SubscriptionStatus::parse_str(&org.subscription_status)
            .unwrap_or(SubscriptionStatus::Expired);

        let covered: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT bs.tenant_id
            FROM branch_subscriptions bs
            JOIN subscription_transactions st ON st.id = bs.transaction_id
            WHERE st.tenant_id = $1
              AND bs.is_active = TRUE
              AND bs.subscription_end > NOW()
            "#,
        )
        .bind(org_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(SubscriptionSnapshot {
            status,
            trial_ends_at: org.trial_ends_at,
            next_billing_date: org.next_billing_date,
            auto_renewal_enabled: org.auto_renewal_enabled,
            covered_branches: covered,
        })
    }
}
