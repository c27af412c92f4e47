//! Catalog routes

use axum::extract::{Extension, Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use dukapo_shared::{Action, AppError};

use crate::authz::{self, Principal};
use crate::catalog::{CategoryView, NewProduct, ProductUpdate, ProductView, UnitView};
use crate::error::ApiResult;
use crate::routes::guard;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    /// View another branch's quantities (owners; others see their own).
    pub branch_view: Option<Uuid>,
    #[serde(default)]
    pub include_unavailable: bool,
}

/// Effective catalog: org products joined with the viewed location's
/// stock. Any authenticated member may read their own branch; crossing
/// into another branch's quantities needs cross-branch read rights.
pub async fn list(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<ProductView>>> {
    let view = match query.branch_view {
        None => principal.default_branch(),
        Some(b) if b == principal.default_branch() => b,
        Some(b) => {
            authz::require(&principal, Action::DashboardView, Some(b))?;
            if b != principal.org_id {
                let in_org: bool = sqlx::query_scalar(
                    "SELECT EXISTS (SELECT 1 FROM tenants WHERE id = $1 AND parent_id = $2)",
                )
                .bind(b)
                .bind(principal.org_id)
                .fetch_one(&state.pool)
                .await
                .map_err(AppError::Database)?;
                if !in_org {
                    return Err(AppError::not_found("branch").into());
                }
            }
            b
        }
    };

    let products = state
        .catalog()
        .list_products(principal.org_id, view, query.include_unavailable)
        .await?;
    Ok(Json(products))
}

#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    pub sku: String,
    pub name: String,
    pub category_id: Option<Uuid>,
    pub unit_id: Option<Uuid>,
    #[serde(default)]
    pub base_cost_minor: i64,
    pub selling_price_minor: i64,
    #[serde(default)]
    pub is_service: bool,
    pub image_key: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreatedResponse {
    pub id: Uuid,
}

pub async fn create(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<CreateProductRequest>,
) -> ApiResult<Json<CreatedResponse>> {
    guard(&state, &principal, Action::CatalogEdit, None).await?;

    let id = state
        .catalog()
        .create_product(
            principal.org_id,
            NewProduct {
                sku: req.sku,
                name: req.name,
                category_id: req.category_id,
                unit_id: req.unit_id,
                base_cost_minor: req.base_cost_minor,
                selling_price_minor: req.selling_price_minor,
                is_service: req.is_service,
                image_key: req.image_key,
            },
        )
        .await?;
    Ok(Json(CreatedResponse { id }))
}

#[derive(Debug, Deserialize)]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub sku: Option<String>,
    pub category_id: Option<Uuid>,
    pub unit_id: Option<Uuid>,
    pub base_cost_minor: Option<i64>,
    pub selling_price_minor: Option<i64>,
    pub image_key: Option<String>,
}

pub async fn update(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(product_id): Path<Uuid>,
    Json(req): Json<UpdateProductRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    guard(&state, &principal, Action::CatalogEdit, None).await?;

    state
        .catalog()
        .update_product(
            principal.org_id,
            product_id,
            ProductUpdate {
                name: req.name,
                sku: req.sku,
                category_id: req.category_id,
                unit_id: req.unit_id,
                base_cost_minor: req.base_cost_minor,
                selling_price_minor: req.selling_price_minor,
                image_key: req.image_key,
            },
        )
        .await?;
    Ok(Json(serde_json::json!({ "updated": true })))
}

pub async fn deactivate(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(product_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    guard(&state, &principal, Action::CatalogEdit, None).await?;
    state
        .catalog()
        .deactivate_product(principal.org_id, product_id)
        .await?;
    Ok(Json(serde_json::json!({ "deactivated": true })))
}

pub async fn categories(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<Json<Vec<CategoryView>>> {
    let rows = state.catalog().get_categories(principal.org_id).await?;
    Ok(Json(rows))
}

#[derive(Debug, Deserialize)]
pub struct CreateCategoryRequest {
    pub name: String,
}

pub async fn create_category(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<CreateCategoryRequest>,
) -> ApiResult<Json<CreatedResponse>> {
    guard(&state, &principal, Action::CatalogEdit, None).await?;
    let id = state
        .catalog()
        .create_category(principal.org_id, &req.name)
        .await?;
    Ok(Json(CreatedResponse { id }))
}

pub async fn units(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<Json<Vec<UnitView>>> {
    let rows = state.catalog().get_units(principal.org_id).await?;
    Ok(Json(rows))
}

#[derive(Debug, Deserialize)]
pub struct CreateUnitRequest {
    pub name: String,
    #[serde(default)]
    pub abbreviation: String,
}

pub async fn create_unit(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<CreateUnitRequest>,
) -> ApiResult<Json<CreatedResponse>> {
    guard(&state, &principal, Action::CatalogEdit, None).await?;
    let id = state
        .catalog()
        .create_unit(principal.org_id, &req.name, &req.abbreviation)
        .await?;
    Ok(Json(CreatedResponse { id }))
}
