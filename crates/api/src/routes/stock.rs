//! Stock routes

use axum::extract::{Extension, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use dukapo_shared::{Action, AppError, MovementReason};

use crate::authz::Principal;
use crate::catalog::ProductView;
use crate::error::ApiResult;
use crate::routes::guard;
use crate::state::AppState;
use crate::stock::MovementView;

#[derive(Debug, Deserialize)]
pub struct ReceiveRequest {
    pub product_id: Uuid,
    pub quantity: i32,
    pub branch_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct QuantityResponse {
    pub product_id: Uuid,
    pub quantity: i32,
}

/// Positive movement: goods received into the branch.
pub async fn receive(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<ReceiveRequest>,
) -> ApiResult<Json<QuantityResponse>> {
    if req.quantity <= 0 {
        return Err(AppError::invalid_argument("quantity", "must be positive").into());
    }
    let branch = guard(&state, &principal, Action::StockEdit, req.branch_id).await?;

    let quantity = state
        .stock()
        .apply_movement(
            branch,
            req.product_id,
            principal.org_id,
            req.quantity,
            MovementReason::Receive,
            None,
            principal.user_id,
        )
        .await?;
    Ok(Json(QuantityResponse {
        product_id: req.product_id,
        quantity,
    }))
}

#[derive(Debug, Deserialize)]
pub struct AdjustRequest {
    pub product_id: Uuid,
    /// Signed correction; a negative delta cannot take stock below zero.
    pub delta: i32,
    pub branch_id: Option<Uuid>,
}

pub async fn adjust(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<AdjustRequest>,
) -> ApiResult<Json<QuantityResponse>> {
    if req.delta == 0 {
        return Err(AppError::invalid_argument("delta", "must not be zero").into());
    }
    let branch = guard(&state, &principal, Action::StockEdit, req.branch_id).await?;

    let quantity = state
        .stock()
        .apply_movement(
            branch,
            req.product_id,
            principal.org_id,
            req.delta,
            MovementReason::Adjust,
            None,
            principal.user_id,
        )
        .await?;
    Ok(Json(QuantityResponse {
        product_id: req.product_id,
        quantity,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ReturnRequest {
    pub product_id: Uuid,
    pub quantity: i32,
    /// Sale the goods came back from, kept on the audit row.
    pub sale_id: Option<Uuid>,
    pub branch_id: Option<Uuid>,
}

/// Customer return: goods back on the shelf, audited against the sale.
pub async fn return_stock(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<ReturnRequest>,
) -> ApiResult<Json<QuantityResponse>> {
    if req.quantity <= 0 {
        return Err(AppError::invalid_argument("quantity", "must be positive").into());
    }
    let branch = guard(&state, &principal, Action::StockEdit, req.branch_id).await?;

    let quantity = state
        .stock()
        .apply_movement(
            branch,
            req.product_id,
            principal.org_id,
            req.quantity,
            MovementReason::Return,
            req.sale_id,
            principal.user_id,
        )
        .await?;
    Ok(Json(QuantityResponse {
        product_id: req.product_id,
        quantity,
    }))
}

#[derive(Debug, Deserialize)]
pub struct MovementsQuery {
    pub product_id: Option<Uuid>,
    pub branch_id: Option<Uuid>,
    pub limit: Option<i64>,
}

/// Audit trail of a branch's stock, newest first.
pub async fn movements(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<MovementsQuery>,
) -> ApiResult<Json<Vec<MovementView>>> {
    let branch = guard(&state, &principal, Action::DashboardView, query.branch_id).await?;
    let movements = state
        .stock()
        .list_movements(branch, query.product_id, query.limit.unwrap_or(100))
        .await?;
    Ok(Json(movements))
}

#[derive(Debug, Deserialize)]
pub struct LowStockQuery {
    pub branch_id: Option<Uuid>,
}

pub async fn low(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<LowStockQuery>,
) -> ApiResult<Json<Vec<ProductView>>> {
    let branch = guard(&state, &principal, Action::DashboardView, query.branch_id).await?;
    let products = state.catalog().low_stock(principal.org_id, branch).await?;
    Ok(Json(products))
}

#[derive(Debug, Deserialize)]
pub struct ReorderLevelRequest {
    pub product_id: Uuid,
    pub reorder_level: i32,
    pub branch_id: Option<Uuid>,
}

pub async fn set_reorder_level(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<ReorderLevelRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let branch = guard(&state, &principal, Action::StockEdit, req.branch_id).await?;
    state
        .stock()
        .set_reorder_level(branch, req.product_id, req.reorder_level)
        .await?;
    Ok(Json(serde_json::json!({ "updated": true })))
}
