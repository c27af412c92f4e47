//! Stock store
//!
//! Per-branch quantity ledger. Every mutation goes through
//! `apply_movement`: a row lock on `(branch_id, product_id)`, a
//! non-negativity check, the new quantity, and an append-only audit row,
//! all in one transaction. Concurrent sales of different products never
//! block each other; `bulk_apply` locks in ascending product-id order so
//! two multi-item sales sharing products cannot deadlock.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use dukapo_shared::{AppError, AppResult, MovementReason};

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct MovementView {
    pub id: Uuid,
    pub product_id: Uuid,
    pub sku: String,
    pub delta: i32,
    pub reason: String,
    pub reference_id: Option<Uuid>,
    pub actor_user_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// One pending mutation for `bulk_apply`.
#[derive(Debug, Clone)]
pub struct Movement {
    pub product_id: Uuid,
    pub delta: i32,
    pub reason: MovementReason,
    pub reference_id: Option<Uuid>,
}

/// Minimal product facts the ledger needs.
#[derive(Debug, Clone, FromRow)]
pub struct ProductFacts {
    pub id: Uuid,
    pub sku: String,
    pub is_service: bool,
}

pub struct StockService {
    pool: PgPool,
}

impl StockService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply one movement in its own transaction and return the new
    /// quantity. Services are not tracked and fail fast.
    pub async fn apply_movement(
        &self,
        branch_id: Uuid,
        product_id: Uuid,
        org_id: Uuid,
        delta: i32,
        reason: MovementReason,
        reference_id: Option<Uuid>,
        actor_user_id: Uuid,
    ) -> AppResult<i32> {
        let product: Option<ProductFacts> = sqlx::query_as(
            "SELECT id, sku, is_service FROM products WHERE id = $1 AND tenant_id = $2",
        )
        .bind(product_id)
        .bind(org_id)
        .fetch_optional(&self.pool)
        .await?;
        let product = product.ok_or_else(|| AppError::not_found("product"))?;

        if product.is_service {
            return Err(AppError::invalid_argument(
                "product_id",
                "services are not stock-tracked",
            ));
        }

        let mut tx = self.pool.begin().await?;
        let new_quantity =
            apply_movement_tx(&mut tx, branch_id, &product, delta, reason, reference_id, actor_user_id)
                .await?;
        tx.commit().await?;

        Ok(new_quantity)
    }

    /// All-or-nothing application of several movements inside the caller's
    /// transaction. Locks are taken in ascending product-id order.
    pub async fn bulk_apply(
        tx: &mut Transaction<'_, Postgres>,
        branch_id: Uuid,
        products: &[ProductFacts],
        movements: &[Movement],
        actor_user_id: Uuid,
    ) -> AppResult<()> {
        let mut ordered: Vec<&Movement> = movements.iter().collect();
        ordered.sort_by_key(|m| m.product_id);

        for movement in ordered {
            let product = products
                .iter()
                .find(|p| p.id == movement.product_id)
                .ok_or_else(|| AppError::not_found("product"))?;
            if product.is_service {
                continue;
            }
            apply_movement_tx(
                tx,
                branch_id,
                product,
                movement.delta,
                movement.reason,
                movement.reference_id,
                actor_user_id,
            )
            .await?;
        }
        Ok(())
    }

    pub async fn get_quantity(&self, branch_id: Uuid, product_id: Uuid) -> AppResult<i32> {
        let quantity: Option<i32> = sqlx::query_scalar(
            "SELECT quantity FROM branch_stock WHERE tenant_id = $1 AND product_id = $2",
        )
        .bind(branch_id)
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;
        quantity.ok_or_else(|| AppError::not_found("product"))
    }

    /// Audit trail, newest first.
    pub async fn list_movements(
        &self,
        branch_id: Uuid,
        product_id: Option<Uuid>,
        limit: i64,
    ) -> AppResult<Vec<MovementView>> {
        let movements = sqlx::query_as::<_, MovementView>(
            r#"
            SELECT sm.id, sm.product_id, p.sku, sm.delta, sm.reason,
                   sm.reference_id, sm.actor_user_id, sm.created_at
            FROM stock_movements sm
            JOIN products p ON p.id = sm.product_id
            WHERE sm.tenant_id = $1
              AND ($2::uuid IS NULL OR sm.product_id = $2)
            ORDER BY sm.created_at DESC
            LIMIT $3
            "#,
        )
        .bind(branch_id)
        .bind(product_id)
        .bind(limit.clamp(1, 500))
        .fetch_all(&self.pool)
        .await?;
        Ok(movements)
    }

    /// Set the reorder level for a product in one branch.
    pub async fn set_reorder_level(
        &self,
        branch_id: Uuid,
        product_id: Uuid,
        reorder_level: i32,
    ) -> AppResult<()> {
        if reorder_level < 0 {
            return Err(AppError::invalid_argument(
                "reorder_level",
                "must not be negative",
            ));
        }
        let rows = sqlx::query(
            "UPDATE branch_stock SET reorder_level = $3 WHERE tenant_id = $1 AND product_id = $2",
        )
        .bind(branch_id)
        .bind(product_id)
        .bind(reorder_level)
        .execute(&self.pool)
        .await?
        .rows_affected();
        if rows == 0 {
            return Err(AppError::not_found("product"));
        }
        Ok(())
    }
}

/// The locked read-check-write-audit cycle for one `(branch, product)`
/// row. The `FOR UPDATE` scope is exactly that row.
pub async fn apply_movement_tx(
    tx: &mut Transaction<'_, Postgres>,
    branch_id: Uuid,
    product: &ProductFacts,
    delta: i32,
    reason: MovementReason,
    reference_id: Option<Uuid>,
    actor_user_id: Uuid,
) -> AppResult<i32> {
    let quantity: Option<i32> = sqlx::query_scalar(
        r#"
        SELECT quantity FROM branch_stock
        WHERE tenant_id = $1 AND product_id = $2
        FOR UPDATE
        "#,
    )
    .bind(branch_id)
    .bind(product.id)
    .fetch_optional(&mut **tx)
    .await?;
    let quantity = quantity.ok_or_else(|| AppError::not_found("product"))?;

    let new_quantity = quantity + delta;
    if new_quantity < 0 {
        return Err(AppError::Insufficient {
            product: product.sku.clone(),
        });
    }

    sqlx::query(
        "UPDATE branch_stock SET quantity = $3 WHERE tenant_id = $1 AND product_id = $2",
    )
    .bind(branch_id)
    .bind(product.id)
    .bind(new_quantity)
    .execute(&mut **tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO stock_movements (tenant_id, product_id, delta, reason, reference_id, actor_user_id)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(branch_id)
    .bind(product.id)
    .bind(delta)
    .bind(reason.as_str())
    .bind(reference_id)
    .bind(actor_user_id)
    .execute(&mut **tx)
    .await?;

    Ok(new_quantity)
}
