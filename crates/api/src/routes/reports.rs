//! Reporting routes

use axum::extract::{Extension, Query, State};
use axum::Json;
use chrono::{Duration, NaiveDate, Utc};
use serde::Deserialize;
use uuid::Uuid;

use dukapo_shared::{Action, AppError};

use crate::authz::Principal;
use crate::error::ApiResult;
use crate::reports::{Dashboard, VarianceDimension, VarianceEntry};
use crate::routes::{guard, visible_branches};
use crate::state::AppState;
use crate::tenants::load_tenant_context;

#[derive(Debug, Deserialize)]
pub struct DashboardQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub branch_id: Option<Uuid>,
}

fn default_range(from: Option<NaiveDate>, to: Option<NaiveDate>) -> (NaiveDate, NaiveDate) {
    let to = to.unwrap_or_else(|| Utc::now().date_naive());
    let from = from.unwrap_or(to - Duration::days(29));
    (from, to)
}

pub async fn dashboard(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<DashboardQuery>,
) -> ApiResult<Json<Dashboard>> {
    let branch_ids = match query.branch_id {
        Some(b) => vec![guard(&state, &principal, Action::DashboardView, Some(b)).await?],
        None => {
            guard(&state, &principal, Action::DashboardView, None).await?;
            match principal.scope_branch_id {
                Some(b) => vec![b],
                None => visible_branches(&state, &principal).await?,
            }
        }
    };

    let ctx = load_tenant_context(&state.pool, principal.tenant_id).await?;
    let (from, to) = default_range(query.from, query.to);

    let dashboard = state
        .reports()
        .dashboard(&ctx, &branch_ids, from, to)
        .await?;
    Ok(Json(dashboard))
}

#[derive(Debug, Deserialize)]
pub struct VarianceQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub branch_id: Option<Uuid>,
    /// product | staff | branch
    pub dimension: Option<String>,
}

pub async fn price_variance(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<VarianceQuery>,
) -> ApiResult<Json<Vec<VarianceEntry>>> {
    let dimension = match query.dimension.as_deref() {
        None => VarianceDimension::Branch,
        Some(s) => VarianceDimension::parse_str(s)
            .ok_or_else(|| AppError::invalid_argument("dimension", "must be product, staff, or branch"))?,
    };

    let branch_ids = match query.branch_id {
        Some(b) => vec![guard(&state, &principal, Action::ReportsView, Some(b)).await?],
        None => {
            guard(&state, &principal, Action::ReportsView, None).await?;
            match principal.scope_branch_id {
                Some(b) => vec![b],
                None => visible_branches(&state, &principal).await?,
            }
        }
    };

    let ctx = load_tenant_context(&state.pool, principal.tenant_id).await?;
    let (from, to) = default_range(query.from, query.to);

    let entries = state
        .reports()
        .price_variance(&ctx, &branch_ids, dimension, from, to)
        .await?;
    Ok(Json(entries))
}
