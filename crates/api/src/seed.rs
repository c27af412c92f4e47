//! Demo seeding
//!
//! With `SEED_DEMO=true` and an empty datastore at boot, creates one demo
//! organization with an admin, a branch, a small catalog, and opening
//! stock. Never touches a datastore that already has tenants.

use chrono::{Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use dukapo_shared::Config;

use crate::auth::password;

pub async fn seed_if_empty(pool: &PgPool, config: &Config) -> anyhow::Result<()> {
    if !config.seed_demo {
        return Ok(());
    }

    let tenant_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tenants")
        .fetch_one(pool)
        .await?;
    if tenant_count > 0 {
        tracing::info!("Datastore not empty; demo seed skipped");
        return Ok(());
    }

    tracing::info!("Seeding demo tenant");

    let password_hash = password::hash_password("demo-admin-1")
        .map_err(|e| anyhow::anyhow!("seed password hash: {e}"))?;
    let trial_ends_at = Utc::now() + Duration::days(config.trial_period_days);

    let mut tx = pool.begin().await?;

    let org_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO tenants
            (subdomain, name, owner_email, currency, tax_rate, timezone,
             subscription_status, trial_ends_at)
        VALUES ('demo', 'Demo Traders', 'owner@demo.example', $1, $2, 'Africa/Nairobi',
                'trial', $3)
        RETURNING id
        "#,
    )
    .bind(&config.currency_default)
    .bind(config.tax_rate_default)
    .bind(trial_ends_at)
    .fetch_one(&mut *tx)
    .await?;

    let admin_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO users (username, email, full_name, password_hash)
        VALUES ('demo-admin', 'owner@demo.example', 'Demo Admin', $1)
        RETURNING id
        "#,
    )
    .bind(&password_hash)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query(
        "INSERT INTO memberships (tenant_id, user_id, role, is_owner) VALUES ($1, $2, 'admin', TRUE)",
    )
    .bind(org_id)
    .bind(admin_id)
    .execute(&mut *tx)
    .await?;

    let branch_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO tenants
            (subdomain, name, owner_email, currency, tax_rate, timezone,
             parent_id, subscription_status, trial_ends_at)
        VALUES ('demo-westside', 'Demo Traders Westside', 'owner@demo.example', $1, $2,
                'Africa/Nairobi', $3, 'trial', $4)
        RETURNING id
        "#,
    )
    .bind(&config.currency_default)
    .bind(config.tax_rate_default)
    .bind(org_id)
    .bind(trial_ends_at)
    .fetch_one(&mut *tx)
    .await?;

    let category_id: Uuid = sqlx::query_scalar(
        "INSERT INTO categories (tenant_id, name) VALUES ($1, 'Beverages') RETURNING id",
    )
    .bind(org_id)
    .fetch_one(&mut *tx)
    .await?;

    let unit_id: Uuid = sqlx::query_scalar(
        "INSERT INTO units (tenant_id, name, abbreviation) VALUES ($1, 'Piece', 'pc') RETURNING id",
    )
    .bind(org_id)
    .fetch_one(&mut *tx)
    .await?;

    let demo_products: [(&str, &str, i64, i64); 3] = [
        ("BEV-001", "Bottled Water 500ml", 3_000, 5_000),
        ("BEV-002", "Mango Juice 1L", 9_000, 15_000),
        ("BEV-003", "Drinking Chocolate 400g", 28_000, 45_000),
    ];

    for (sku, name, cost, price) in demo_products {
        let product_id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO products
                (tenant_id, sku, name, category_id, unit_id, base_cost_minor,
                 selling_price_minor)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(org_id)
        .bind(sku)
        .bind(name)
        .bind(category_id)
        .bind(unit_id)
        .bind(cost)
        .bind(price)
        .fetch_one(&mut *tx)
        .await?;

        // Opening stock in both locations.
        sqlx::query(
            r#"
            INSERT INTO branch_stock (tenant_id, product_id, quantity, reorder_level)
            VALUES ($1, $3, 50, 10), ($2, $3, 25, 5)
            "#,
        )
        .bind(org_id)
        .bind(branch_id)
        .bind(product_id)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    tracing::info!(
        org_id = %org_id,
        branch_id = %branch_id,
        "Demo tenant seeded (subdomain `demo`, admin `demo-admin`)"
    );
    Ok(())
}
