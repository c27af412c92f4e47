//! Sales routes

use axum::extract::{Extension, Path, Query, State};
use axum::Json;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use uuid::Uuid;

use dukapo_shared::{Action, AppError, PaymentMethod, RoleType};

use crate::authz::{self, Principal};
use crate::error::ApiResult;
use crate::routes::{guard, visible_branches};
use crate::sales::{CreateSale, SaleItemRequest, SaleView, SaleWithItems};
use crate::state::AppState;
use crate::tenants::load_tenant_context;

#[derive(Debug, Deserialize)]
pub struct SaleItemBody {
    pub product_id: Uuid,
    pub quantity: i32,
    pub price_override_minor: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateSaleRequest {
    pub items: Vec<SaleItemBody>,
    pub payment_method: String,
    pub branch_id: Option<Uuid>,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    pub notes: Option<String>,
}

pub async fn create(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<CreateSaleRequest>,
) -> ApiResult<Json<SaleWithItems>> {
    let payment_method = PaymentMethod::parse_str(&req.payment_method).ok_or_else(|| {
        AppError::invalid_argument("payment_method", "unknown payment method")
    })?;

    let branch = guard(&state, &principal, Action::SaleCreate, req.branch_id).await?;
    let ctx = load_tenant_context(&state.pool, branch).await?;

    let sale = state
        .sales()
        .create_sale(
            &ctx,
            principal.user_id,
            CreateSale {
                items: req
                    .items
                    .into_iter()
                    .map(|i| SaleItemRequest {
                        product_id: i.product_id,
                        quantity: i.quantity,
                        price_override_minor: i.price_override_minor,
                    })
                    .collect(),
                payment_method,
                customer_name: req.customer_name,
                customer_email: req.customer_email,
                customer_phone: req.customer_phone,
                notes: req.notes,
            },
        )
        .await?;
    Ok(Json(sale))
}

#[derive(Debug, Deserialize)]
pub struct ListSalesQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub branch_id: Option<Uuid>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Staff get their own sales; branch admins their branch; owners any
/// branch or the whole organization.
pub async fn list(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<ListSalesQuery>,
) -> ApiResult<Json<Vec<SaleView>>> {
    let can_view_all = authz::authorize(&principal, Action::SaleViewAll, query.branch_id);

    let (branch_ids, cashier) = if can_view_all {
        let ids = match query.branch_id {
            Some(b) => vec![guard(&state, &principal, Action::SaleViewAll, Some(b)).await?],
            None => visible_branches(&state, &principal).await?,
        };
        (ids, None)
    } else {
        // Own sales only, and only in the principal's own branch.
        authz::require(&principal, Action::SaleViewOwn, None)?;
        if query.branch_id.is_some_and(|b| b != principal.default_branch()) {
            return Err(AppError::Forbidden.into());
        }
        (vec![principal.default_branch()], Some(principal.user_id))
    };

    let to = query.to.unwrap_or_else(Utc::now);
    let from = query.from.unwrap_or(to - Duration::days(30));

    let sales = state
        .sales()
        .list_sales(
            &branch_ids,
            cashier,
            from,
            to,
            query.limit.unwrap_or(50),
            query.offset.unwrap_or(0),
        )
        .await?;
    Ok(Json(sales))
}

pub async fn get_sale(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(sale_id): Path<Uuid>,
) -> ApiResult<Json<SaleWithItems>> {
    let branch_ids = visible_branches(&state, &principal).await?;
    let sale = state.sales().get_sale(&branch_ids, sale_id).await?;

    // Staff may only open their own receipts.
    if principal.role_type == RoleType::Staff && sale.sale.user_id != principal.user_id {
        return Err(AppError::not_found("sale").into());
    }
    Ok(Json(sale))
}

pub async fn mark_email(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(sale_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let branch_ids = visible_branches(&state, &principal).await?;
    state.sales().mark_email_sent(&branch_ids, sale_id).await?;
    Ok(Json(serde_json::json!({ "email_sent": true })))
}

pub async fn mark_whatsapp(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(sale_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let branch_ids = visible_branches(&state, &principal).await?;
    state
        .sales()
        .mark_whatsapp_sent(&branch_ids, sale_id)
        .await?;
    Ok(Json(serde_json::json!({ "whatsapp_sent": true })))
}
