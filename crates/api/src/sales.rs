//! Sales engine
//!
//! One serializable transaction per sale: validate the effective catalog,
//! decrement stock (locks in product-id order), then persist the sale, its
//! items, and the movement audit rows. Any failure rolls the whole thing
//! back; quantities and movements never reflect an attempted sale.
//!
//! Prices are VAT-inclusive. The total is the exact sum the customer pays;
//! subtotal and tax are extracted from it (`money::vat_breakdown`), never
//! added on top.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use dukapo_shared::{vat_breakdown, AppError, AppResult, MovementReason, PaymentMethod};

use crate::stock::{Movement, ProductFacts, StockService};
use crate::tenants::TenantContext;

#[derive(Debug, Clone)]
pub struct SaleItemRequest {
    pub product_id: Uuid,
    pub quantity: i32,
    /// Effective VAT-inclusive unit price when the cashier overrides the
    /// list price; the product's current selling price otherwise.
    pub price_override_minor: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct CreateSale {
    pub items: Vec<SaleItemRequest>,
    pub payment_method: PaymentMethod,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SaleView {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub subtotal_minor: i64,
    pub tax_minor: i64,
    pub total_minor: i64,
    pub payment_method: String,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    pub notes: Option<String>,
    pub email_sent: bool,
    pub whatsapp_sent: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SaleItemView {
    pub product_id: Uuid,
    pub sku: String,
    pub product_name: String,
    pub position: i32,
    pub quantity: i32,
    pub unit_price_minor: i64,
    pub is_price_override: bool,
    pub variance_minor: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SaleWithItems {
    #[serde(flatten)]
    pub sale: SaleView,
    pub items: Vec<SaleItemView>,
}

#[derive(Debug, FromRow)]
struct SaleProductRow {
    id: Uuid,
    sku: String,
    name: String,
    is_service: bool,
    selling_price_minor: i64,
}

pub struct SalesService {
    pool: PgPool,
}

impl SalesService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a multi-item sale atomically in the branch `ctx` describes.
    pub async fn create_sale(
        &self,
        ctx: &TenantContext,
        cashier_id: Uuid,
        req: CreateSale,
    ) -> AppResult<SaleWithItems> {
        if req.items.is_empty() {
            return Err(AppError::invalid_argument("items", "must not be empty"));
        }
        for item in &req.items {
            if item.quantity <= 0 {
                return Err(AppError::invalid_argument("quantity", "must be positive"));
            }
            if item.price_override_minor.is_some_and(|p| p <= 0) {
                return Err(AppError::invalid_argument(
                    "price_override",
                    "must be positive",
                ));
            }
        }

        let branch_id = ctx.id;
        let org_id = ctx.org_id();
        let product_ids: Vec<Uuid> = req.items.iter().map(|i| i.product_id).collect();

        let mut tx = self.pool.begin().await?;

        // Products must exist in the org catalog and be visible to this
        // branch (a stock row is what makes them visible).
        let products: Vec<SaleProductRow> = sqlx::query_as(
            r#"
            SELECT p.id, p.sku, p.name, p.is_service, p.selling_price_minor
            FROM products p
            JOIN branch_stock bs ON bs.product_id = p.id AND bs.tenant_id = $2
            WHERE p.tenant_id = $1
              AND p.is_available
              AND p.id = ANY($3)
            "#,
        )
        .bind(org_id)
        .bind(branch_id)
        .bind(&product_ids)
        .fetch_all(&mut *tx)
        .await?;

        for item in &req.items {
            if !products.iter().any(|p| p.id == item.product_id) {
                return Err(AppError::not_found("product"));
            }
        }

        // Exact total in minor units, then the VAT-inclusive split.
        let mut total_minor: i64 = 0;
        for item in &req.items {
            let product = product_of(&products, item.product_id)?;
            let unit_price = item.price_override_minor.unwrap_or(product.selling_price_minor);
            total_minor += unit_price * item.quantity as i64;
        }
        let totals = vat_breakdown(total_minor, ctx.tax_rate)?;

        // Stock decrements, aggregated per product, locked in id order.
        let sale_id = Uuid::new_v4();
        let mut deltas: Vec<Movement> = Vec::new();
        for item in &req.items {
            let product = product_of(&products, item.product_id)?;
            if product.is_service {
                continue;
            }
            match deltas.iter_mut().find(|m| m.product_id == item.product_id) {
                Some(m) => m.delta -= item.quantity,
                None => deltas.push(Movement {
                    product_id: item.product_id,
                    delta: -item.quantity,
                    reason: MovementReason::Sale,
                    reference_id: Some(sale_id),
                }),
            }
        }
        let facts: Vec<ProductFacts> = products
            .iter()
            .map(|p| ProductFacts {
                id: p.id,
                sku: p.sku.clone(),
                is_service: p.is_service,
            })
            .collect();
        StockService::bulk_apply(&mut tx, branch_id, &facts, &deltas, cashier_id).await?;

        let sale: SaleView = sqlx::query_as(
            r#"
            INSERT INTO sales
                (id, tenant_id, user_id, subtotal_minor, tax_minor, total_minor,
                 payment_method, customer_name, customer_email, customer_phone, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING id, tenant_id, user_id, subtotal_minor, tax_minor, total_minor,
                      payment_method, customer_name, customer_email, customer_phone,
                      notes, email_sent, whatsapp_sent, created_at
            "#,
        )
        .bind(sale_id)
        .bind(branch_id)
        .bind(cashier_id)
        .bind(totals.subtotal_minor)
        .bind(totals.tax_minor)
        .bind(totals.total_minor)
        .bind(req.payment_method.as_str())
        .bind(&req.customer_name)
        .bind(&req.customer_email)
        .bind(&req.customer_phone)
        .bind(&req.notes)
        .fetch_one(&mut *tx)
        .await?;

        // Items keep the caller's order; the locking order above was
        // internal only.
        let mut items = Vec::with_capacity(req.items.len());
        for (position, item) in req.items.iter().enumerate() {
            let product = product_of(&products, item.product_id)?;
            let unit_price = item.price_override_minor.unwrap_or(product.selling_price_minor);
            let variance = unit_price - product.selling_price_minor;
            let is_override = variance != 0;

            sqlx::query(
                r#"
                INSERT INTO sale_items
                    (sale_id, product_id, position, quantity, unit_price_minor,
                     is_price_override, variance_minor)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(sale_id)
            .bind(item.product_id)
            .bind(position as i32)
            .bind(item.quantity)
            .bind(unit_price)
            .bind(is_override)
            .bind(variance)
            .execute(&mut *tx)
            .await?;

            items.push(SaleItemView {
                product_id: item.product_id,
                sku: product.sku.clone(),
                product_name: product.name.clone(),
                position: position as i32,
                quantity: item.quantity,
                unit_price_minor: unit_price,
                is_price_override: is_override,
                variance_minor: variance,
            });
        }

        tx.commit().await?;

        tracing::info!(
            sale_id = %sale_id,
            branch_id = %branch_id,
            cashier_id = %cashier_id,
            total_minor = totals.total_minor,
            items = items.len(),
            "Sale recorded"
        );

        Ok(SaleWithItems { sale, items })
    }

    /// Sale with items and the product snapshot each references.
    pub async fn get_sale(&self, branch_ids: &[Uuid], sale_id: Uuid) -> AppResult<SaleWithItems> {
        let sale: Option<SaleView> = sqlx::query_as(
            r#"
            SELECT id, tenant_id, user_id, subtotal_minor, tax_minor, total_minor,
                   payment_method, customer_name, customer_email, customer_phone,
                   notes, email_sent, whatsapp_sent, created_at
            FROM sales
            WHERE id = $1 AND tenant_id = ANY($2)
            "#,
        )
        .bind(sale_id)
        .bind(branch_ids)
        .fetch_optional(&self.pool)
        .await?;
        let sale = sale.ok_or_else(|| AppError::not_found("sale"))?;

        let items = sqlx::query_as::<_, SaleItemView>(
            r#"
            SELECT si.product_id, p.sku, p.name AS product_name, si.position,
                   si.quantity, si.unit_price_minor, si.is_price_override,
                   si.variance_minor
            FROM sale_items si
            JOIN products p ON p.id = si.product_id
            WHERE si.sale_id = $1
            ORDER BY si.position
            "#,
        )
        .bind(sale_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(SaleWithItems { sale, items })
    }

    /// Paginated listing, optionally restricted to one cashier (staff see
    /// only their own sales).
    pub async fn list_sales(
        &self,
        branch_ids: &[Uuid],
        cashier_id: Option<Uuid>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<SaleView>> {
        let sales = sqlx::query_as::<_, SaleView>(
            r#"
            SELECT id, tenant_id, user_id, subtotal_minor, tax_minor, total_minor,
                   payment_method, customer_name, customer_email, customer_phone,
                   notes, email_sent, whatsapp_sent, created_at
            FROM sales
            WHERE tenant_id = ANY($1)
              AND ($2::uuid IS NULL OR user_id = $2)
              AND created_at >= $3
              AND created_at < $4
            ORDER BY created_at DESC
            LIMIT $5 OFFSET $6
            "#,
        )
        .bind(branch_ids)
        .bind(cashier_id)
        .bind(from)
        .bind(to)
        .bind(limit.clamp(1, 200))
        .bind(offset.max(0))
        .fetch_all(&self.pool)
        .await?;
        Ok(sales)
    }

    /// Idempotent receipt-delivery flags; external collaborators deliver.
    pub async fn mark_email_sent(&self, branch_ids: &[Uuid], sale_id: Uuid) -> AppResult<()> {
        self.mark_flag(branch_ids, sale_id, "email_sent").await
    }

    pub async fn mark_whatsapp_sent(&self, branch_ids: &[Uuid], sale_id: Uuid) -> AppResult<()> {
        self.mark_flag(branch_ids, sale_id, "whatsapp_sent").await
    }

    async fn mark_flag(&self, branch_ids: &[Uuid], sale_id: Uuid, flag: &str) -> AppResult<()> {
        let sql = match flag {
            "email_sent" => {
                "UPDATE sales SET email_sent = TRUE WHERE id = $1 AND tenant_id = ANY($2)"
            }
            _ => "UPDATE sales SET whatsapp_sent = TRUE WHERE id = $1 AND tenant_id = ANY($2)",
        };
        let rows = sqlx::query(sql)
            .bind(sale_id)
            .bind(branch_ids)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if rows == 0 {
            // Idempotent: the flag may already be set, but the sale itself
            // must exist within scope.
            let exists: bool = sqlx::query_scalar(
                "SELECT EXISTS (SELECT 1 FROM sales WHERE id = $1 AND tenant_id = ANY($2))",
            )
            .bind(sale_id)
            .bind(branch_ids)
            .fetch_one(&self.pool)
            .await?;
            if !exists {
                return Err(AppError::not_found("sale"));
            }
        }
        Ok(())
    }
}

fn product_of(products: &[SaleProductRow], id: Uuid) -> AppResult<&SaleProductRow> {
    products
        .iter()
        .find(|p| p.id == id)
        .ok_or_else(|| AppError::not_found("product"))
}
