//! HTTP routes
//!
//! Thin handlers over the domain services: parse, guard, delegate,
//! serialize. Every guarded handler runs the same sequence — pure
//! authorization matrix, tenant-scope containment, subscription
//! cross-cut — via [`guard`].

pub mod admin;
pub mod auth;
pub mod members;
pub mod products;
pub mod reports;
pub mod sales;
pub mod stock;
pub mod subscriptions;
pub mod tenants;

use axum::extract::State;
use axum::middleware;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde_json::json;
use uuid::Uuid;

use dukapo_shared::{Action, AppError};

use crate::auth::middleware::require_auth;
use crate::authz::{self, Principal};
use crate::error::ApiResult;
use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    let auth_state = state.auth_state();

    let public = Router::new()
        .route("/health", get(health))
        .route("/api/auth/login", post(auth::login))
        .route("/api/tenants/register", post(tenants::register))
        .route("/api/webhooks/gateway", post(subscriptions::gateway_webhook));

    let protected = Router::new()
        .route("/api/admin/invariants", get(admin::check_invariants))
        .route("/api/auth/me", get(auth::me))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/switch", post(auth::switch_tenant))
        .route(
            "/api/tenants/branches",
            get(tenants::list_branches).post(tenants::create_branch),
        )
        .route("/api/members", get(members::list).post(members::add))
        .route("/api/members/:id", put(members::update))
        .route(
            "/api/products",
            get(products::list).post(products::create),
        )
        .route("/api/products/:id", put(products::update))
        .route("/api/products/:id/deactivate", post(products::deactivate))
        .route(
            "/api/categories",
            get(products::categories).post(products::create_category),
        )
        .route("/api/units", get(products::units).post(products::create_unit))
        .route("/api/stock/receive", post(stock::receive))
        .route("/api/stock/adjust", post(stock::adjust))
        .route("/api/stock/return", post(stock::return_stock))
        .route("/api/stock/movements", get(stock::movements))
        .route("/api/stock/low", get(stock::low))
        .route("/api/stock/reorder-level", put(stock::set_reorder_level))
        .route("/api/sales", get(sales::list).post(sales::create))
        .route("/api/sales/:id", get(sales::get_sale))
        .route("/api/sales/:id/receipt/email", post(sales::mark_email))
        .route(
            "/api/sales/:id/receipt/whatsapp",
            post(sales::mark_whatsapp),
        )
        .route("/api/reports/dashboard", get(reports::dashboard))
        .route("/api/reports/price-variance", get(reports::price_variance))
        .route(
            "/api/subscription/initialize",
            post(subscriptions::initialize),
        )
        .route(
            "/api/subscription/verify/:reference",
            get(subscriptions::verify),
        )
        .route("/api/subscription/status", get(subscriptions::status))
        .route(
            "/api/subscription/transactions",
            get(subscriptions::transactions),
        )
        .route("/api/subscription/cancel", post(subscriptions::cancel))
        .route(
            "/api/subscription/reactivate",
            post(subscriptions::reactivate),
        )
        .route(
            "/api/subscription/auto-renewal",
            post(subscriptions::auto_renewal),
        )
        .route(
            "/api/subscription/branches",
            post(subscriptions::add_branches),
        )
        .layer(middleware::from_fn_with_state(auth_state, require_auth));

    public.merge(protected).with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let db_ok = sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(&state.pool)
        .await
        .is_ok();
    Json(json!({ "status": if db_ok { "ok" } else { "degraded" }, "database": db_ok }))
}

/// The guarded-request preamble: resolve the target branch, check the
/// permission matrix, confirm the target lies inside the principal's
/// organization (a foreign id reads as `not_found`, never as "exists"),
/// and apply the subscription cross-cut. Returns the resolved branch id.
pub(crate) async fn guard(
    state: &AppState,
    principal: &Principal,
    action: Action,
    target_branch: Option<Uuid>,
) -> ApiResult<Uuid> {
    let target = target_branch.unwrap_or_else(|| principal.default_branch());

    authz::require(principal, action, Some(target))?;

    if target != principal.org_id {
        let in_org: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM tenants WHERE id = $1 AND parent_id = $2)",
        )
        .bind(target)
        .bind(principal.org_id)
        .fetch_one(&state.pool)
        .await
        .map_err(AppError::Database)?;
        if !in_org {
            return Err(AppError::not_found("branch").into());
        }
    }

    authz::ensure_entitled(&state.pool, principal.org_id, target, action).await?;
    Ok(target)
}

/// Branch ids a read-scope query may span: every location of the org for
/// owners, exactly the scope branch for everyone else.
pub(crate) async fn visible_branches(
    state: &AppState,
    principal: &Principal,
) -> ApiResult<Vec<Uuid>> {
    match principal.scope_branch_id {
        Some(branch) => Ok(vec![branch]),
        None => {
            let mut ids: Vec<Uuid> =
                sqlx::query_scalar("SELECT id FROM tenants WHERE parent_id = $1")
                    .bind(principal.org_id)
                    .fetch_all(&state.pool)
                    .await
                    .map_err(AppError::Database)?;
            ids.insert(0, principal.org_id);
            Ok(ids)
        }
    }
}
