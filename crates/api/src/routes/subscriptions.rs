//! Subscription routes + the gateway webhook

use axum::body::Bytes;
use axum::extract::{Extension, Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use dukapo_billing::{CheckoutInit, SubscriptionSnapshot, VerifyOutcome};
use dukapo_shared::{Action, AppError, BillingCycle};

use crate::authz::{self, Principal};
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct InitializeRequest {
    /// monthly | semi_annual | annual
    pub cycle: String,
    #[serde(default)]
    pub branch_ids: Vec<Uuid>,
}

pub async fn initialize(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<InitializeRequest>,
) -> ApiResult<Json<CheckoutInit>> {
    authz::require(&principal, Action::SubscriptionManage, None)?;
    let cycle = BillingCycle::parse_str(&req.cycle)
        .ok_or_else(|| AppError::invalid_argument("cycle", "unknown billing cycle"))?;

    let init = state
        .billing
        .subscriptions
        .initialize(principal.org_id, cycle, &req.branch_ids)
        .await?;
    Ok(Json(init))
}

#[derive(Debug, Deserialize)]
pub struct AddBranchesRequest {
    pub branch_ids: Vec<Uuid>,
}

/// Pro-rata mid-cycle addition; covered until the current billing date.
pub async fn add_branches(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<AddBranchesRequest>,
) -> ApiResult<Json<CheckoutInit>> {
    authz::require(&principal, Action::SubscriptionManage, None)?;
    let init = state
        .billing
        .subscriptions
        .add_branches(principal.org_id, &req.branch_ids)
        .await?;
    Ok(Json(init))
}

/// Idempotent: refreshes, retries, and webhooks may all land here for the
/// same reference. Any authenticated member may complete a payment.
pub async fn verify(
    State(state): State<AppState>,
    Extension(_principal): Extension<Principal>,
    Path(reference): Path<String>,
) -> ApiResult<Json<VerifyOutcome>> {
    let outcome = state.billing.subscriptions.verify(&reference).await?;
    Ok(Json(outcome))
}

pub async fn status(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<Json<SubscriptionSnapshot>> {
    let snapshot = state.billing.subscriptions.snapshot(principal.org_id).await?;
    Ok(Json(snapshot))
}

pub async fn transactions(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<Json<Vec<dukapo_billing::TransactionView>>> {
    authz::require(&principal, Action::SubscriptionManage, None)?;
    let rows = state
        .billing
        .subscriptions
        .list_transactions(principal.org_id, 100)
        .await?;
    Ok(Json(rows))
}

pub async fn cancel(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<Json<SubscriptionSnapshot>> {
    authz::require(&principal, Action::SubscriptionManage, None)?;
    let snapshot = state.billing.subscriptions.cancel(principal.org_id).await?;
    Ok(Json(snapshot))
}

pub async fn reactivate(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<Json<SubscriptionSnapshot>> {
    authz::require(&principal, Action::SubscriptionManage, None)?;
    let snapshot = state
        .billing
        .subscriptions
        .reactivate(principal.org_id)
        .await?;
    Ok(Json(snapshot))
}

#[derive(Debug, Deserialize)]
pub struct AutoRenewalRequest {
    pub enabled: bool,
    pub authorization_token: Option<String>,
}

pub async fn auto_renewal(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<AutoRenewalRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    authz::require(&principal, Action::SubscriptionManage, None)?;

    if req.enabled {
        state
            .billing
            .subscriptions
            .enable_auto_renewal(principal.org_id, req.authorization_token.as_deref())
            .await?;
    } else {
        state
            .billing
            .subscriptions
            .disable_auto_renewal(principal.org_id)
            .await?;
    }
    Ok(Json(serde_json::json!({ "auto_renewal_enabled": req.enabled })))
}

/// Gateway event intake. Signature is the only authentication; duplicate
/// deliveries acknowledge 2xx like first deliveries.
pub async fn gateway_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<serde_json::Value>> {
    let signature = headers
        .get("x-gateway-signature")
        .and_then(|h| h.to_str().ok())
        .ok_or(AppError::Forbidden)?;

    state
        .billing
        .webhooks
        .handle(&state.billing.subscriptions, &body, signature)
        .await?;

    Ok(Json(serde_json::json!({ "received": true })))
}
