//! Catalog store
//!
//! Products belong to the organization; branches never define their own
//! SKUs. A branch's effective catalog is the parent's products joined
//! against the branch's own stock rows, which are opened at quantity zero
//! the moment a product is created.

use serde::Serialize;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use dukapo_shared::{AppError, AppResult};

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ProductView {
    pub id: Uuid,
    pub sku: String,
    pub name: String,
    pub category_id: Option<Uuid>,
    pub unit_id: Option<Uuid>,
    pub base_cost_minor: i64,
    pub selling_price_minor: i64,
    pub is_service: bool,
    pub image_key: Option<String>,
    pub is_available: bool,
    /// Stock in the viewed branch, not the organization.
    pub quantity: i32,
    pub reorder_level: i32,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CategoryView {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct UnitView {
    pub id: Uuid,
    pub name: String,
    pub abbreviation: String,
}

pub struct NewProduct {
    pub sku: String,
    pub name: String,
    pub category_id: Option<Uuid>,
    pub unit_id: Option<Uuid>,
    pub base_cost_minor: i64,
    pub selling_price_minor: i64,
    pub is_service: bool,
    pub image_key: Option<String>,
}

pub struct ProductUpdate {
    pub name: Option<String>,
    pub sku: Option<String>,
    pub category_id: Option<Uuid>,
    pub unit_id: Option<Uuid>,
    pub base_cost_minor: Option<i64>,
    pub selling_price_minor: Option<i64>,
    pub image_key: Option<String>,
}

pub struct CatalogService {
    pool: PgPool,
}

impl CatalogService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn check_lookup_refs(
        &self,
        org_id: Uuid,
        category_id: Option<Uuid>,
        unit_id: Option<Uuid>,
    ) -> AppResult<()> {
        if let Some(category_id) = category_id {
            let exists: bool = sqlx::query_scalar(
                "SELECT EXISTS (SELECT 1 FROM categories WHERE id = $1 AND tenant_id = $2)",
            )
            .bind(category_id)
            .bind(org_id)
            .fetch_one(&self.pool)
            .await?;
            if !exists {
                return Err(AppError::invalid_argument("category_id", "unknown category"));
            }
        }
        if let Some(unit_id) = unit_id {
            let exists: bool = sqlx::query_scalar(
                "SELECT EXISTS (SELECT 1 FROM units WHERE id = $1 AND tenant_id = $2)",
            )
            .bind(unit_id)
            .bind(org_id)
            .fetch_one(&self.pool)
            .await?;
            if !exists {
                return Err(AppError::invalid_argument("unit_id", "unknown unit"));
            }
        }
        Ok(())
    }

    /// Create a product under the organization and open a stock row for
    /// the org root and every branch.
    pub async fn create_product(&self, org_id: Uuid, req: NewProduct) -> AppResult<Uuid> {
        if req.sku.trim().is_empty() {
            return Err(AppError::invalid_argument("sku", "must not be empty"));
        }
        if req.selling_price_minor <= 0 {
            return Err(AppError::invalid_argument(
                "selling_price",
                "must be positive",
            ));
        }
        self.check_lookup_refs(org_id, req.category_id, req.unit_id)
            .await?;

        let mut tx = self.pool.begin().await?;

        let product_id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO products
                (tenant_id, sku, name, category_id, unit_id, base_cost_minor,
                 selling_price_minor, is_service, image_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id
            "#,
        )
        .bind(org_id)
        .bind(req.sku.trim())
        .bind(&req.name)
        .bind(req.category_id)
        .bind(req.unit_id)
        .bind(req.base_cost_minor)
        .bind(req.selling_price_minor)
        .bind(req.is_service)
        .bind(&req.image_key)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sku_conflict(e, req.sku.trim()))?;

        // Visible everywhere from birth, with nothing on the shelf yet.
        sqlx::query(
            r#"
            INSERT INTO branch_stock (tenant_id, product_id, quantity, reorder_level)
            SELECT t.id, $1, 0, 0
            FROM tenants t
            WHERE t.id = $2 OR t.parent_id = $2
            "#,
        )
        .bind(product_id)
        .bind(org_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(org_id = %org_id, product_id = %product_id, sku = req.sku.trim(), "Product created");
        Ok(product_id)
    }

    pub async fn update_product(
        &self,
        org_id: Uuid,
        product_id: Uuid,
        req: ProductUpdate,
    ) -> AppResult<()> {
        if let Some(price) = req.selling_price_minor {
            if price <= 0 {
                return Err(AppError::invalid_argument(
                    "selling_price",
                    "must be positive",
                ));
            }
        }
        if let Some(sku) = &req.sku {
            if sku.trim().is_empty() {
                return Err(AppError::invalid_argument("sku", "must not be empty"));
            }
        }
        self.check_lookup_refs(org_id, req.category_id, req.unit_id)
            .await?;

        let rows = sqlx::query(
            r#"
            UPDATE products
            SET name = COALESCE($3, name),
                sku = COALESCE($4, sku),
                category_id = COALESCE($5, category_id),
                unit_id = COALESCE($6, unit_id),
                base_cost_minor = COALESCE($7, base_cost_minor),
                selling_price_minor = COALESCE($8, selling_price_minor),
                image_key = COALESCE($9, image_key),
                updated_at = NOW()
            WHERE id = $1 AND tenant_id = $2
            "#,
        )
        .bind(product_id)
        .bind(org_id)
        .bind(&req.name)
        .bind(req.sku.as_deref().map(str::trim))
        .bind(req.category_id)
        .bind(req.unit_id)
        .bind(req.base_cost_minor)
        .bind(req.selling_price_minor)
        .bind(&req.image_key)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sku_conflict(e, req.sku.as_deref().unwrap_or("")))?
        .rows_affected();

        if rows == 0 {
            return Err(AppError::not_found("product"));
        }
        Ok(())
    }

    /// Soft-deactivate; sales already referencing the product keep their
    /// snapshot.
    pub async fn deactivate_product(&self, org_id: Uuid, product_id: Uuid) -> AppResult<()> {
        let rows = sqlx::query(
            "UPDATE products SET is_available = FALSE, updated_at = NOW() \
             WHERE id = $1 AND tenant_id = $2",
        )
        .bind(product_id)
        .bind(org_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if rows == 0 {
            return Err(AppError::not_found("product"));
        }
        tracing::info!(org_id = %org_id, product_id = %product_id, "Product deactivated");
        Ok(())
    }

    /// Effective catalog for a branch (or the org root): org products
    /// joined against the viewed location's stock rows.
    pub async fn list_products(
        &self,
        org_id: Uuid,
        view_branch_id: Uuid,
        include_unavailable: bool,
    ) -> AppResult<Vec<ProductView>> {
        let view_belongs: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM tenants WHERE id = $1 AND (id = $2 OR parent_id = $2))",
        )
        .bind(view_branch_id)
        .bind(org_id)
        .fetch_one(&self.pool)
        .await?;
        if !view_belongs {
            return Err(AppError::not_found("branch"));
        }

        let products = sqlx::query_as::<_, ProductView>(
            r#"
            SELECT p.id, p.sku, p.name, p.category_id, p.unit_id,
                   p.base_cost_minor, p.selling_price_minor, p.is_service,
                   p.image_key, p.is_available,
                   bs.quantity, bs.reorder_level
            FROM products p
            JOIN branch_stock bs ON bs.product_id = p.id AND bs.tenant_id = $2
            WHERE p.tenant_id = $1
              AND (p.is_available OR $3)
            ORDER BY p.name
            "#,
        )
        .bind(org_id)
        .bind(view_branch_id)
        .bind(include_unavailable)
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }

    /// Products at or below their reorder level in a branch; services
    /// carry no stock and never appear.
    pub async fn low_stock(&self, org_id: Uuid, branch_id: Uuid) -> AppResult<Vec<ProductView>> {
        let products = sqlx::query_as::<_, ProductView>(
            r#"
            SELECT p.id, p.sku, p.name, p.category_id, p.unit_id,
                   p.base_cost_minor, p.selling_price_minor, p.is_service,
                   p.image_key, p.is_available,
                   bs.quantity, bs.reorder_level
            FROM products p
            JOIN branch_stock bs ON bs.product_id = p.id AND bs.tenant_id = $2
            WHERE p.tenant_id = $1
              AND p.is_available
              AND p.is_service = FALSE
              AND bs.quantity <= bs.reorder_level
            ORDER BY bs.quantity
            "#,
        )
        .bind(org_id)
        .bind(branch_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(products)
    }

    pub async fn get_categories(&self, org_id: Uuid) -> AppResult<Vec<CategoryView>> {
        let rows = sqlx::query_as::<_, CategoryView>(
            "SELECT id, name FROM categories WHERE tenant_id = $1 ORDER BY name",
        )
        .bind(org_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn create_category(&self, org_id: Uuid, name: &str) -> AppResult<Uuid> {
        if name.trim().is_empty() {
            return Err(AppError::invalid_argument("name", "must not be empty"));
        }
        let id: Uuid = sqlx::query_scalar(
            "INSERT INTO categories (tenant_id, name) VALUES ($1, $2) RETURNING id",
        )
        .bind(org_id)
        .bind(name.trim())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_unique(e, "category already exists"))?;
        Ok(id)
    }

    pub async fn get_units(&self, org_id: Uuid) -> AppResult<Vec<UnitView>> {
        let rows = sqlx::query_as::<_, UnitView>(
            "SELECT id, name, abbreviation FROM units WHERE tenant_id = $1 ORDER BY name",
        )
        .bind(org_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn create_unit(
        &self,
        org_id: Uuid,
        name: &str,
        abbreviation: &str,
    ) -> AppResult<Uuid> {
        if name.trim().is_empty() {
            return Err(AppError::invalid_argument("name", "must not be empty"));
        }
        let id: Uuid = sqlx::query_scalar(
            "INSERT INTO units (tenant_id, name, abbreviation) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(org_id)
        .bind(name.trim())
        .bind(abbreviation)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_unique(e, "unit already exists"))?;
        Ok(id)
    }
}

fn map_unique(e: sqlx::Error, message: &str) -> AppError {
    match &e {
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
            AppError::conflict(message)
        }
        _ => AppError::Database(e),
    }
}

fn map_sku_conflict(e: sqlx::Error, sku: &str) -> AppError {
    match &e {
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
            AppError::conflict(format!("sku `{sku}` already exists in this organization"))
        }
        _ => AppError::Database(e),
    }
}
