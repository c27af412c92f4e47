//! Tenant service
//!
//! Organization self-registration, branch creation (one level deep, no
//! exceptions), and membership management. Branches inherit the
//! organization's business settings at creation and share its product
//! catalog; their stock is their own.

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use dukapo_shared::{AppError, AppResult, Config, RoleType};

use crate::auth::password;
use crate::authz::{role_for, MembershipFacts};

/// Business context of the tenant a request operates on; loaded once per
/// request by the services that price or report.
#[derive(Debug, Clone, FromRow)]
pub struct TenantContext {
    pub id: Uuid,
    pub parent_id: Option<Uuid>,
    pub currency: String,
    pub tax_rate: Decimal,
    pub timezone: String,
}

impl TenantContext {
    pub fn org_id(&self) -> Uuid {
        self.parent_id.unwrap_or(self.id)
    }
}

pub async fn load_tenant_context(pool: &PgPool, tenant_id: Uuid) -> AppResult<TenantContext> {
    let ctx: Option<TenantContext> = sqlx::query_as(
        "SELECT id, parent_id, currency, tax_rate, timezone FROM tenants WHERE id = $1",
    )
    .bind(tenant_id)
    .fetch_optional(pool)
    .await?;
    ctx.ok_or_else(|| AppError::not_found("tenant"))
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct BranchView {
    pub id: Uuid,
    pub subdomain: String,
    pub name: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct MemberRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    pub role: String,
    pub branch_id: Option<Uuid>,
    pub is_owner: bool,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemberView {
    pub id: Uuid,
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    pub role_type: RoleType,
    pub branch_id: Option<Uuid>,
    pub is_active: bool,
}

pub struct RegisterOrganization {
    pub subdomain: String,
    pub name: String,
    pub owner_email: String,
    pub owner_username: String,
    pub owner_password: String,
    pub timezone: Option<String>,
}

pub struct NewMember {
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: String,
    pub branch_id: Option<Uuid>,
}

pub struct TenantService {
    pool: PgPool,
}

impl TenantService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Self-service organization registration: tenant on trial, owner
    /// user, owner membership — atomically.
    pub async fn register_organization(
        &self,
        config: &Config,
        req: RegisterOrganization,
    ) -> AppResult<Uuid> {
        validate_subdomain(&req.subdomain)?;
        if req.owner_password.len() < 8 {
            return Err(AppError::invalid_argument(
                "password",
                "must be at least 8 characters",
            ));
        }

        let password_hash = password::hash_password(&req.owner_password)?;
        let trial_ends_at = Utc::now() + Duration::days(config.trial_period_days);
        let timezone = req.timezone.unwrap_or_else(|| "UTC".to_string());

        let mut tx = self.pool.begin().await?;

        let tenant_id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO tenants
                (subdomain, name, owner_email, currency, tax_rate, timezone,
                 subscription_status, trial_ends_at)
            VALUES ($1, $2, $3, $4, $5, $6, 'trial', $7)
            RETURNING id
            "#,
        )
        .bind(&req.subdomain)
        .bind(&req.name)
        .bind(&req.owner_email)
        .bind(&config.currency_default)
        .bind(config.tax_rate_default)
        .bind(&timezone)
        .bind(trial_ends_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_unique(e, "subdomain already taken"))?;

        let user_id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO users (username, email, full_name, password_hash)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(&req.owner_username)
        .bind(&req.owner_email)
        .bind(&req.name)
        .bind(&password_hash)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_unique(e, "username or email already taken"))?;

        sqlx::query(
            r#"
            INSERT INTO memberships (tenant_id, user_id, role, is_owner)
            VALUES ($1, $2, 'admin', TRUE)
            "#,
        )
        .bind(tenant_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            tenant_id = %tenant_id,
            subdomain = %req.subdomain,
            trial_ends_at = %trial_ends_at,
            "Organization registered"
        );
        Ok(tenant_id)
    }

    /// Create a branch under an organization. Rejects nesting a branch
    /// under a branch; business settings are copied from the parent, and a
    /// stock row is opened for every existing product at quantity zero.
    pub async fn create_branch(
        &self,
        org_id: Uuid,
        subdomain: &str,
        name: &str,
    ) -> AppResult<Uuid> {
        validate_subdomain(subdomain)?;

        let parent: Option<(Option<Uuid>, String, Decimal, String, String, String)> =
            sqlx::query_as(
                r#"
                SELECT parent_id, currency, tax_rate, timezone, owner_email, subscription_status
                FROM tenants
                WHERE id = $1
                "#,
            )
            .bind(org_id)
            .fetch_optional(&self.pool)
            .await?;

        let Some((parent_id, currency, tax_rate, timezone, owner_email, status)) = parent else {
            return Err(AppError::not_found("tenant"));
        };
        if parent_id.is_some() {
            return Err(AppError::conflict(
                "branches cannot own branches; create under the organization",
            ));
        }

        let mut tx = self.pool.begin().await?;

        let branch_id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO tenants
                (subdomain, name, owner_email, currency, tax_rate, timezone,
                 parent_id, subscription_status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(subdomain)
        .bind(name)
        .bind(&owner_email)
        .bind(&currency)
        .bind(tax_rate)
        .bind(&timezone)
        .bind(org_id)
        .bind(&status)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_unique(e, "subdomain already taken"))?;

        // The branch sees the whole org catalog, starting empty-handed.
        sqlx::query(
            r#"
            INSERT INTO branch_stock (tenant_id, product_id, quantity, reorder_level)
            SELECT $1, id, 0, 0 FROM products WHERE tenant_id = $2
            "#,
        )
        .bind(branch_id)
        .bind(org_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(org_id = %org_id, branch_id = %branch_id, subdomain = subdomain, "Branch created");
        Ok(branch_id)
    }

    pub async fn list_branches(&self, org_id: Uuid) -> AppResult<Vec<BranchView>> {
        let branches = sqlx::query_as::<_, BranchView>(
            r#"
            SELECT id, subdomain, name, is_active
            FROM tenants
            WHERE parent_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(org_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(branches)
    }

    /// Add a member to the organization, creating the user account when
    /// the email is new. Branch-admins may only add into their own branch;
    /// the route layer enforces that via the authorization gate and the
    /// `pin_to` argument.
    pub async fn add_member(&self, org_id: Uuid, req: NewMember) -> AppResult<MemberView> {
        if req.role != "admin" && req.role != "staff" {
            return Err(AppError::invalid_argument("role", "must be admin or staff"));
        }
        if req.password.len() < 8 {
            return Err(AppError::invalid_argument(
                "password",
                "must be at least 8 characters",
            ));
        }
        if let Some(branch_id) = req.branch_id {
            let belongs: bool = sqlx::query_scalar(
                "SELECT EXISTS (SELECT 1 FROM tenants WHERE id = $1 AND parent_id = $2)",
            )
            .bind(branch_id)
            .bind(org_id)
            .fetch_one(&self.pool)
            .await?;
            if !belongs {
                return Err(AppError::invalid_argument(
                    "branch_id",
                    "not a branch of this organization",
                ));
            }
        }

        let password_hash = password::hash_password(&req.password)?;

        let mut tx = self.pool.begin().await?;

        let existing: Option<Uuid> = sqlx::query_scalar("SELECT id FROM users WHERE email = $1")
            .bind(&req.email)
            .fetch_optional(&mut *tx)
            .await?;

        let user_id = match existing {
            Some(id) => id,
            None => {
                sqlx::query_scalar(
                    r#"
                    INSERT INTO users (username, email, password_hash)
                    VALUES ($1, $2, $3)
                    RETURNING id
                    "#,
                )
                .bind(&req.username)
                .bind(&req.email)
                .bind(&password_hash)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| map_unique(e, "username already taken"))?
            }
        };

        let membership_id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO memberships (tenant_id, user_id, role, branch_id)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(org_id)
        .bind(user_id)
        .bind(&req.role)
        .bind(req.branch_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_unique(e, "user is already a member of this tenant"))?;

        tx.commit().await?;

        tracing::info!(
            org_id = %org_id,
            user_id = %user_id,
            role = %req.role,
            branch_id = ?req.branch_id,
            "Member added"
        );

        Ok(MemberView {
            id: membership_id,
            user_id,
            username: req.username,
            email: req.email,
            role_type: role_for(MembershipFacts {
                is_admin: req.role == "admin",
                is_owner: false,
                branch_id: req.branch_id,
                tenant_is_root: true,
            }),
            branch_id: req.branch_id,
            is_active: true,
        })
    }

    pub async fn list_members(&self, org_id: Uuid) -> AppResult<Vec<MemberView>> {
        let rows = sqlx::query_as::<_, MemberRow>(
            r#"
            SELECT m.id, m.user_id, u.username, u.email, m.role, m.branch_id,
                   m.is_owner, m.is_active
            FROM memberships m
            JOIN users u ON u.id = m.user_id
            WHERE m.tenant_id = $1
            ORDER BY m.joined_at
            "#,
        )
        .bind(org_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| MemberView {
                id: r.id,
                user_id: r.user_id,
                username: r.username,
                email: r.email,
                role_type: role_for(MembershipFacts {
                    is_admin: r.role == "admin",
                    is_owner: r.is_owner,
                    branch_id: r.branch_id,
                    tenant_is_root: true,
                }),
                branch_id: r.branch_id,
                is_active: r.is_active,
            })
            .collect())
    }

    /// Update a membership's role, pin, or active flag. The owner
    /// membership itself cannot be demoted.
    pub async fn update_member(
        &self,
        org_id: Uuid,
        membership_id: Uuid,
        role: Option<&str>,
        branch_id: Option<Option<Uuid>>,
        is_active: Option<bool>,
    ) -> AppResult<()> {
        if let Some(role) = role {
            if role != "admin" && role != "staff" {
                return Err(AppError::invalid_argument("role", "must be admin or staff"));
            }
        }

        let target: Option<(bool, Uuid)> = sqlx::query_as(
            "SELECT is_owner, user_id FROM memberships WHERE id = $1 AND tenant_id = $2",
        )
        .bind(membership_id)
        .bind(org_id)
        .fetch_optional(&self.pool)
        .await?;
        let Some((is_owner, user_id)) = target else {
            return Err(AppError::not_found("membership"));
        };
        if is_owner && (role == Some("staff") || is_active == Some(false)) {
            return Err(AppError::conflict("the owner membership cannot be demoted"));
        }

        if let Some(Some(b)) = branch_id {
            let belongs: bool = sqlx::query_scalar(
                "SELECT EXISTS (SELECT 1 FROM tenants WHERE id = $1 AND parent_id = $2)",
            )
            .bind(b)
            .bind(org_id)
            .fetch_one(&self.pool)
            .await?;
            if !belongs {
                return Err(AppError::invalid_argument(
                    "branch_id",
                    "not a branch of this organization",
                ));
            }
        }

        sqlx::query(
            r#"
            UPDATE memberships
            SET role = COALESCE($3, role),
                branch_id = CASE WHEN $4 THEN $5 ELSE branch_id END,
                is_active = COALESCE($6, is_active)
            WHERE id = $1 AND tenant_id = $2
            "#,
        )
        .bind(membership_id)
        .bind(org_id)
        .bind(role)
        .bind(branch_id.is_some())
        .bind(branch_id.flatten())
        .bind(is_active)
        .execute(&self.pool)
        .await?;

        // Deactivation cuts existing sessions immediately.
        if is_active == Some(false) {
            crate::auth::sessions::revoke_all_sessions(
                &self.pool,
                user_id,
                "membership_deactivated",
            )
            .await?;
        }

        Ok(())
    }
}

fn validate_subdomain(subdomain: &str) -> AppResult<()> {
    let ok = !subdomain.is_empty()
        && subdomain.len() <= 63
        && subdomain
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !subdomain.starts_with('-')
        && !subdomain.ends_with('-');
    if ok {
        Ok(())
    } else {
        Err(AppError::invalid_argument(
            "subdomain",
            "must be lowercase letters, digits, and hyphens",
        ))
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subdomain_rules() {
        assert!(validate_subdomain("acme").is_ok());
        assert!(validate_subdomain("acme-westlands2").is_ok());
        assert!(validate_subdomain("").is_err());
        assert!(validate_subdomain("Acme").is_err());
        assert!(validate_subdomain("-acme").is_err());
        assert!(validate_subdomain("acme-").is_err());
        assert!(validate_subdomain("has space").is_err());
        assert!(validate_subdomain(&"a".repeat(64)).is_err());
    }
}
