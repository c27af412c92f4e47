//! Tenant routes: registration and branches

use axum::extract::{Extension, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use dukapo_shared::Action;

use crate::authz::{self, Principal};
use crate::error::ApiResult;
use crate::state::AppState;
use crate::tenants::{BranchView, RegisterOrganization};

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub subdomain: String,
    pub name: String,
    pub owner_email: String,
    pub owner_username: String,
    pub owner_password: String,
    pub timezone: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub tenant_id: Uuid,
    pub subdomain: String,
}

/// Self-service organization registration; starts the trial clock.
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<Json<RegisterResponse>> {
    let subdomain = req.subdomain.clone();
    let tenant_id = state
        .tenants()
        .register_organization(
            &state.config,
            RegisterOrganization {
                subdomain: req.subdomain,
                name: req.name,
                owner_email: req.owner_email,
                owner_username: req.owner_username,
                owner_password: req.owner_password,
                timezone: req.timezone,
            },
        )
        .await?;
    Ok(Json(RegisterResponse {
        tenant_id,
        subdomain,
    }))
}

#[derive(Debug, Deserialize)]
pub struct CreateBranchRequest {
    pub subdomain: String,
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct CreateBranchResponse {
    pub branch_id: Uuid,
}

/// Branch creation is an organization-level change: owners only.
pub async fn create_branch(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<CreateBranchRequest>,
) -> ApiResult<Json<CreateBranchResponse>> {
    authz::require(&principal, Action::SettingsEdit, None)?;

    let branch_id = state
        .tenants()
        .create_branch(principal.org_id, &req.subdomain, &req.name)
        .await?;
    Ok(Json(CreateBranchResponse { branch_id }))
}

pub async fn list_branches(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<Json<Vec<BranchView>>> {
    let branches = state.tenants().list_branches(principal.org_id).await?;
    Ok(Json(branches))
}
