//! Membership routes
//!
//! Owners manage the whole organization; branch admins manage within
//! their own branch only — the gate plus an explicit pin on what they
//! create enforces that.

use axum::extract::{Extension, Path, State};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use dukapo_shared::{Action, AppError, RoleType};

use crate::authz::Principal;
use crate::error::ApiResult;
use crate::routes::guard;
use crate::state::AppState;
use crate::tenants::{MemberView, NewMember};

#[derive(Debug, Deserialize)]
pub struct AddMemberRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: String,
    pub branch_id: Option<Uuid>,
}

pub async fn add(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<AddMemberRequest>,
) -> ApiResult<Json<MemberView>> {
    // A branch admin may only add members into their own branch.
    let branch_id = match principal.role_type {
        RoleType::Owner => req.branch_id,
        _ => {
            let own = principal
                .scope_branch_id
                .ok_or(AppError::Forbidden)?;
            if req.branch_id.is_some_and(|b| b != own) {
                return Err(AppError::Forbidden.into());
            }
            Some(own)
        }
    };
    guard(&state, &principal, Action::MemberManage, branch_id).await?;

    let member = state
        .tenants()
        .add_member(
            principal.org_id,
            NewMember {
                username: req.username,
                email: req.email,
                password: req.password,
                role: req.role,
                branch_id,
            },
        )
        .await?;
    Ok(Json(member))
}

pub async fn list(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<Json<Vec<MemberView>>> {
    guard(&state, &principal, Action::MemberManage, None).await?;

    let mut members = state.tenants().list_members(principal.org_id).await?;
    // Branch admins see their branch roster, not the whole organization.
    if principal.role_type != RoleType::Owner {
        let own = principal.scope_branch_id;
        members.retain(|m| m.branch_id == own);
    }
    Ok(Json(members))
}

#[derive(Debug, Deserialize)]
pub struct UpdateMemberRequest {
    pub role: Option<String>,
    /// Present-and-null clears the pin; absent leaves it untouched.
    #[serde(default, with = "double_option")]
    pub branch_id: Option<Option<Uuid>>,
    pub is_active: Option<bool>,
}

mod double_option {
    use serde::{Deserialize, Deserializer};
    use uuid::Uuid;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Option<Uuid>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<Uuid>::deserialize(deserializer).map(Some)
    }
}

pub async fn update(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(membership_id): Path<Uuid>,
    Json(req): Json<UpdateMemberRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    // Non-owners may only touch memberships pinned to their branch, and
    // may not move anyone out of it.
    if principal.role_type != RoleType::Owner {
        let own = principal.scope_branch_id;
        let target_branch: Option<Option<Uuid>> = sqlx::query_scalar(
            "SELECT branch_id FROM memberships WHERE id = $1 AND tenant_id = $2",
        )
        .bind(membership_id)
        .bind(principal.org_id)
        .fetch_optional(&state.pool)
        .await
        .map_err(AppError::Database)?;
        match target_branch {
            Some(branch) if branch == own => {}
            Some(_) => return Err(AppError::Forbidden.into()),
            None => return Err(AppError::not_found("membership").into()),
        }
        if req.branch_id.is_some_and(|b| b != own) {
            return Err(AppError::Forbidden.into());
        }
    }
    guard(&state, &principal, Action::MemberManage, None).await?;

    state
        .tenants()
        .update_member(
            principal.org_id,
            membership_id,
            req.role.as_deref(),
            req.branch_id,
            req.is_active,
        )
        .await?;
    Ok(Json(serde_json::json!({ "updated": true })))
}
