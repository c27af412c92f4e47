//! Administrative routes
//!
//! Owner-facing consistency checks over the organization's own data.
//! Read-only: the checks never write.

use axum::extract::{Extension, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use dukapo_shared::Action;

use crate::authz::{self, Principal};
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct InvariantsResponse {
    pub healthy: bool,
    pub checks_run: usize,
    pub checks_passed: usize,
    pub checks_failed: usize,
    pub violations: Vec<InvariantViolationResponse>,
    pub checked_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct InvariantViolationResponse {
    pub invariant: String,
    pub severity: String,
    pub description: String,
    pub tenant_ids: Vec<Uuid>,
    pub context: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct InvariantsQuery {
    /// Run a single named check instead of the full suite.
    pub check: Option<String>,
}

/// Run the consistency checks for the caller's organization
///
/// Covers:
/// - Sale totals equal the sum of their items
/// - Branch nesting never exceeds depth one
/// - Successful transactions carry entitlement rows
/// - Expired tenants have no future billing date
/// - Membership pins reference a branch of the same org
pub async fn check_invariants(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<InvariantsQuery>,
) -> ApiResult<Json<InvariantsResponse>> {
    authz::require(&principal, Action::SettingsEdit, None)?;

    tracing::info!(
        user_id = %principal.user_id,
        org_id = %principal.org_id,
        check = ?query.check,
        "Owner running consistency checks"
    );

    // Always scoped to the caller's organization; the platform-wide scan
    // is for operational tooling, never a tenant session.
    let scope = Some(principal.org_id);

    let summary = match query.check.as_deref() {
        Some(name) => {
            let violations = state.billing.invariants.run_check(name, scope).await?;
            dukapo_billing::InvariantCheckSummary {
                checked_at: Utc::now(),
                checks_run: 1,
                checks_passed: usize::from(violations.is_empty()),
                checks_failed: usize::from(!violations.is_empty()),
                healthy: violations.is_empty(),
                violations,
            }
        }
        None => state.billing.invariants.run_all_checks(scope).await?,
    };

    let violations: Vec<InvariantViolationResponse> = summary
        .violations
        .into_iter()
        .map(|v| InvariantViolationResponse {
            invariant: v.invariant,
            severity: v.severity.to_string(),
            description: v.description,
            tenant_ids: v.tenant_ids,
            context: v.context,
        })
        .collect();

    Ok(Json(InvariantsResponse {
        healthy: summary.healthy,
        checks_run: summary.checks_run,
        checks_passed: summary.checks_passed,
        checks_failed: summary.checks_failed,
        violations,
        checked_at: summary.checked_at,
    }))
}
