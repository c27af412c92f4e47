//! Session routes: login, logout, switch, principal context

use axum::extract::{Extension, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use dukapo_shared::RoleType;

use crate::authz::Principal;
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub credential: String,
    pub password: String,
    pub subdomain: String,
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<crate::auth::Session>> {
    let session = state
        .identity()
        .authenticate(&req.credential, &req.password, &req.subdomain)
        .await?;
    Ok(Json(session))
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<Json<serde_json::Value>> {
    state.identity().logout(&principal).await?;
    Ok(Json(serde_json::json!({ "logged_out": true })))
}

#[derive(Debug, Deserialize)]
pub struct SwitchRequest {
    pub tenant_id: Uuid,
}

pub async fn switch_tenant(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<SwitchRequest>,
) -> ApiResult<Json<crate::auth::Session>> {
    let session = state
        .identity()
        .switch_tenant(&principal, req.tenant_id)
        .await?;
    Ok(Json(session))
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub org_id: Uuid,
    pub role_type: RoleType,
    pub pinned_branch_id: Option<Uuid>,
}

/// The principal as recomputed for this request; role or pin edits show
/// up here immediately, no token reissue.
pub async fn me(Extension(principal): Extension<Principal>) -> ApiResult<Json<MeResponse>> {
    Ok(Json(MeResponse {
        user_id: principal.user_id,
        tenant_id: principal.tenant_id,
        org_id: principal.org_id,
        role_type: principal.role_type,
        pinned_branch_id: principal.scope_branch_id,
    }))
}
