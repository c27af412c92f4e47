//! Billing Invariants Module
//!
//! Provides runnable consistency checks for tenant and billing state.
//! These can be run after any mutation or webhook replay to ensure the
//! system is in a valid state.
//!
//! ## Design Principles
//!
//! 1. **Executable**: Each invariant is a real SQL query that can be run
//! 2. **Explanatory**: Violations include enough context to debug
//! 3. **Non-destructive**: Checks only read, never write

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::BillingResult;

/// Result of running a single invariant check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvariantViolation {
    /// Which invariant was violated
    pub invariant: String,
    /// Tenant(s) affected
    pub tenant_ids: Vec<Uuid>,
    /// Human-readable description of the violation
    pub description: String,
    /// Additional context for debugging
    pub context: serde_json::Value,
    /// Severity level
    pub severity: ViolationSeverity,
}

/// Severity of an invariant violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViolationSeverity {
    /// Critical - money or stock is being accounted incorrectly
    Critical,
    /// High - data inconsistency that needs attention
    High,
    /// Medium - potential issue, should investigate
    Medium,
}

impl std::fmt::Display for ViolationSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViolationSeverity::Critical => write!(f, "CRITICAL"),
            ViolationSeverity::High => write!(f, "HIGH"),
            ViolationSeverity::Medium => write!(f, "MEDIUM"),
        }
    }
}

/// Summary of all invariant checks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvariantCheckSummary {
    pub checked_at: DateTime<Utc>,
    pub checks_run: usize,
    pub checks_passed: usize,
    pub checks_failed: usize,
    pub violations: Vec<InvariantViolation>,
    pub healthy: bool,
}

#[derive(Debug, sqlx::FromRow)]
struct SaleTotalRow {
    sale_id: Uuid,
    tenant_id: Uuid,
    total_minor: i64,
    items_total_minor: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct DeepBranchRow {
    tenant_id: Uuid,
    parent_id: Uuid,
}

#[derive(Debug, sqlx::FromRow)]
struct OrphanTransactionRow {
    tx_id: Uuid,
    tenant_id: Uuid,
    reference: String,
}

#[derive(Debug, sqlx::FromRow)]
struct ExpiredWithFutureRow {
    tenant_id: Uuid,
    next_billing_date: Option<DateTime<Utc>>,
}

#[derive(Debug, sqlx::FromRow)]
struct BadPinRow {
    membership_id: Uuid,
    tenant_id: Uuid,
    branch_id: Uuid,
}

/// Service for running invariant checks
pub struct InvariantChecker {
    pool: PgPool,
}

impl InvariantChecker {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run all invariant checks and return summary.
    ///
    /// `org_id` scopes every check to one organization and its branches;
    /// `None` scans the whole platform. Tenant-facing callers must scope
    /// so one organization never sees another's rows.
    pub async fn run_all_checks(&self, org_id: Option<Uuid>) -> BillingResult<InvariantCheckSummary> {
        let now = Utc::now();
        let mut violations = Vec::new();

        violations.extend(self.check_sale_totals_match_items(org_id).await?);
        violations.extend(self.check_branch_depth_is_one(org_id).await?);
        violations.extend(self.check_success_has_entitlements(org_id).await?);
        violations.extend(self.check_expired_has_no_future_billing(org_id).await?);
        violations.extend(self.check_membership_pins_reference_own_branch(org_id).await?);

        let checks_run = 5;
        let checks_failed = violations
            .iter()
            .map(|v| &v.invariant)
            .collect::<std::collections::HashSet<_>>()
            .len();
        let checks_passed = checks_run - checks_failed;

        Ok(InvariantCheckSummary {
            checked_at: now,
            checks_run,
            checks_passed,
            checks_failed,
            healthy: violations.is_empty(),
            violations,
        })
    }

    /// Invariant 1: Sale totals equal the sum of their items
    ///
    /// `total = sum(quantity * unit_price)` exactly, and the stored
    /// subtotal/tax must recombine into the total.
    async fn check_sale_totals_match_items(
        &self,
        org_id: Option<Uuid>,
    ) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<SaleTotalRow> = sqlx::query_as(
            r#"
            SELECT s.id AS sale_id,
                   s.tenant_id,
                   s.total_minor,
                   COALESCE(SUM(si.quantity::BIGINT * si.unit_price_minor), 0) AS items_total_minor
            FROM sales s
            LEFT JOIN sale_items si ON si.sale_id = s.id
            WHERE ($1::uuid IS NULL
                   OR s.tenant_id IN (SELECT id FROM tenants WHERE id = $1 OR parent_id = $1))
            GROUP BY s.id, s.tenant_id, s.total_minor, s.subtotal_minor, s.tax_minor
            HAVING s.total_minor != COALESCE(SUM(si.quantity::BIGINT * si.unit_price_minor), 0)
                OR s.subtotal_minor + s.tax_minor != s.total_minor
            "#,
        )
        .bind(org_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "sale_totals_match_items".to_string(),
                tenant_ids: vec![row.tenant_id],
                description: format!(
                    "Sale {} stores total {} but its items sum to {}",
                    row.sale_id, row.total_minor, row.items_total_minor
                ),
                context: serde_json::json!({
                    "sale_id": row.sale_id,
                    "total_minor": row.total_minor,
                    "items_total_minor": row.items_total_minor,
                }),
                severity: ViolationSeverity::Critical,
            })
            .collect())
    }

    /// Invariant 2: Branch nesting never exceeds depth one
    async fn check_branch_depth_is_one(
        &self,
        org_id: Option<Uuid>,
    ) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<DeepBranchRow> = sqlx::query_as(
            r#"
            SELECT t.id AS tenant_id, t.parent_id
            FROM tenants t
            JOIN tenants p ON p.id = t.parent_id
            WHERE p.parent_id IS NOT NULL
              AND ($1::uuid IS NULL OR p.id = $1 OR p.parent_id = $1)
            "#,
        )
        .bind(org_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "branch_depth_is_one".to_string(),
                tenant_ids: vec![row.tenant_id],
                description: "Branch points at another branch as its parent".to_string(),
                context: serde_json::json!({
                    "tenant_id": row.tenant_id,
                    "parent_id": row.parent_id,
                }),
                severity: ViolationSeverity::High,
            })
            .collect())
    }

    /// Invariant 3: Successful transactions carry entitlement rows
    ///
    /// A `success` transaction with no branch_subscriptions rows means a
    /// verify committed halfway, which the transactional protocol forbids.
    async fn check_success_has_entitlements(
        &self,
        org_id: Option<Uuid>,
    ) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<OrphanTransactionRow> = sqlx::query_as(
            r#"
            SELECT st.id AS tx_id, st.tenant_id, st.reference
            FROM subscription_transactions st
            WHERE st.status = 'success'
              AND ($1::uuid IS NULL OR st.tenant_id = $1)
              AND NOT EXISTS (
                  SELECT 1 FROM branch_subscriptions bs WHERE bs.transaction_id = st.id
              )
            "#,
        )
        .bind(org_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "success_has_entitlements".to_string(),
                tenant_ids: vec![row.tenant_id],
                description: format!(
                    "Transaction {} is success but enabled no locations",
                    row.reference
                ),
                context: serde_json::json!({
                    "transaction_id": row.tx_id,
                    "reference": row.reference,
                }),
                severity: ViolationSeverity::Critical,
            })
            .collect())
    }

    /// Invariant 4: Expired tenants have no future billing date
    async fn check_expired_has_no_future_billing(
        &self,
        org_id: Option<Uuid>,
    ) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<ExpiredWithFutureRow> = sqlx::query_as(
            r#"
            SELECT id AS tenant_id, next_billing_date
            FROM tenants
            WHERE subscription_status = 'expired'
              AND next_billing_date > NOW()
              AND ($1::uuid IS NULL OR id = $1 OR parent_id = $1)
            "#,
        )
        .bind(org_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "expired_has_no_future_billing".to_string(),
                tenant_ids: vec![row.tenant_id],
                description: "Tenant is expired but its billing date is in the future"
                    .to_string(),
                context: serde_json::json!({
                    "tenant_id": row.tenant_id,
                    "next_billing_date": row.next_billing_date,
                }),
                severity: ViolationSeverity::Medium,
            })
            .collect())
    }

    /// Invariant 5: Membership pins reference a branch of the same org
    async fn check_membership_pins_reference_own_branch(
        &self,
        org_id: Option<Uuid>,
    ) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<BadPinRow> = sqlx::query_as(
            r#"
            SELECT m.id AS membership_id, m.tenant_id, m.branch_id
            FROM memberships m
            JOIN tenants b ON b.id = m.branch_id
            WHERE m.branch_id IS NOT NULL
              AND (b.parent_id IS NULL OR b.parent_id != m.tenant_id)
              AND ($1::uuid IS NULL OR m.tenant_id = $1)
            "#,
        )
        .bind(org_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "membership_pins_reference_own_branch".to_string(),
                tenant_ids: vec![row.tenant_id],
                description: "Membership is pinned to a branch outside its organization"
                    .to_string(),
                context: serde_json::json!({
                    "membership_id": row.membership_id,
                    "branch_id": row.branch_id,
                }),
                severity: ViolationSeverity::High,
            })
            .collect())
    }

    /// Run a single invariant check by name
    pub async fn run_check(
        &self,
        name: &str,
        org_id: Option<Uuid>,
    ) -> BillingResult<Vec<InvariantViolation>> {
        match name {
            "sale_totals_match_items" => self.check_sale_totals_match_items(org_id).await,
            "branch_depth_is_one" => self.check_branch_depth_is_one(org_id).await,
            "success_has_entitlements" => self.check_success_has_entitlements(org_id).await,
            "expired_has_no_future_billing" => {
                self.check_expired_has_no_future_billing(org_id).await
            }
            "membership_pins_reference_own_branch" => {
                self.check_membership_pins_reference_own_branch(org_id).await
            }
            _ => Ok(vec![]),
        }
    }

    /// Get list of all available invariant checks
    pub fn available_checks() -> Vec<&'static str> {
        vec![
            "sale_totals_match_items",
            "branch_depth_is_one",
            "success_has_entitlements",
            "expired_has_no_future_billing",
            "membership_pins_reference_own_branch",
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_violation_severity_display() {
        assert_eq!(ViolationSeverity::Critical.to_string(), "CRITICAL");
        assert_eq!(ViolationSeverity::High.to_string(), "HIGH");
        assert_eq!(ViolationSeverity::Medium.to_string(), "MEDIUM");
    }

    #[test]
    fn test_available_checks() {
        let checks = InvariantChecker::available_checks();
        assert_eq!(checks.len(), 5);
        assert!(checks.contains(&"sale_totals_match_items"));
        assert!(checks.contains(&"success_has_entitlements"));
    }
}
