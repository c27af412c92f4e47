//! Identity & tenant resolver
//!
//! Binds a credential to exactly one tenant per session. The token carries
//! only `(user_id, tenant_id, jti)`; the effective role type is recomputed
//! from the live membership row on every request.
//!
//! The switch-tenant rule is the load-bearing piece: an admin membership
//! on an organization is a super-user across every branch of that
//! organization, while `branch_id` pins restrict staff only.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use dukapo_shared::{AppError, AppResult, IdentityError, RoleType};

use crate::auth::jwt::JwtManager;
use crate::auth::{password, sessions};
use crate::authz::{role_for, MembershipFacts, Principal};

#[derive(Debug, Clone, FromRow)]
pub struct TenantRow {
    pub id: Uuid,
    pub subdomain: String,
    pub name: String,
    pub currency: String,
    pub tax_rate: Decimal,
    pub timezone: String,
    pub parent_id: Option<Uuid>,
    pub is_active: bool,
}

#[derive(Debug, FromRow)]
struct UserRow {
    id: Uuid,
    username: String,
    password_hash: String,
    is_active: bool,
}

#[derive(Debug, Clone, FromRow)]
struct MembershipRow {
    tenant_id: Uuid,
    role: String,
    branch_id: Option<Uuid>,
    is_owner: bool,
    is_active: bool,
}

/// An established session, returned by login and switch.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub session_token: String,
    pub expires_at: DateTime<Utc>,
    pub tenant: TenantSummary,
    pub user: UserContext,
}

#[derive(Debug, Clone, Serialize)]
pub struct TenantSummary {
    pub id: Uuid,
    pub subdomain: String,
    pub name: String,
    pub currency: String,
    pub tax_rate: Decimal,
    pub timezone: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserContext {
    pub id: Uuid,
    pub username: String,
    pub role_type: RoleType,
    pub pinned_branch_id: Option<Uuid>,
}

#[derive(Clone)]
pub struct IdentityService {
    pool: PgPool,
    jwt: JwtManager,
}

impl IdentityService {
    pub fn new(pool: PgPool, jwt: JwtManager) -> Self {
        Self { pool, jwt }
    }

    async fn load_tenant(&self, id: Uuid) -> AppResult<Option<TenantRow>> {
        let row = sqlx::query_as::<_, TenantRow>(
            r#"
            SELECT id, subdomain, name, currency, tax_rate, timezone, parent_id, is_active
            FROM tenants
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// A tenant is reachable only while it and (for branches) its parent
    /// organization are unsuspended.
    async fn tenant_reachable(&self, tenant: &TenantRow) -> AppResult<bool> {
        if !tenant.is_active {
            return Ok(false);
        }
        if let Some(parent_id) = tenant.parent_id {
            let parent_active: Option<bool> =
                sqlx::query_scalar("SELECT is_active FROM tenants WHERE id = $1")
                    .bind(parent_id)
                    .fetch_optional(&self.pool)
                    .await?;
            return Ok(parent_active.unwrap_or(false));
        }
        Ok(true)
    }

    /// Find the membership row that grants `user_id` access to `tenant`:
    /// a direct membership, or a qualifying membership on the parent
    /// organization (admin super-user, or staff pinned to this branch).
    async fn qualifying_membership(
        &self,
        user_id: Uuid,
        tenant: &TenantRow,
    ) -> AppResult<Option<MembershipRow>> {
        let direct: Option<MembershipRow> = sqlx::query_as(
            r#"
            SELECT tenant_id, role, branch_id, is_owner, is_active
            FROM memberships
            WHERE tenant_id = $1 AND user_id = $2
            "#,
        )
        .bind(tenant.id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(m) = direct {
            if !m.is_active {
                return Err(AppError::Identity(IdentityError::Inactive));
            }
            return Ok(Some(m));
        }

        let Some(parent_id) = tenant.parent_id else {
            return Ok(None);
        };

        let parent: Option<MembershipRow> = sqlx::query_as(
            r#"
            SELECT tenant_id, role, branch_id, is_owner, is_active
            FROM memberships
            WHERE tenant_id = $1 AND user_id = $2
            "#,
        )
        .bind(parent_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(m) = parent else {
            return Ok(None);
        };
        if !m.is_active {
            return Err(AppError::Identity(IdentityError::Inactive));
        }

        // Admins on the organization reach every branch regardless of
        // their own pin; staff reach only the branch they are pinned to.
        let qualifies = m.role == "admin" || m.branch_id == Some(tenant.id);
        Ok(qualifies.then_some(m))
    }

    /// Build the request principal from a membership in the context of the
    /// session tenant.
    fn principal_from(
        &self,
        user_id: Uuid,
        session_tenant: &TenantRow,
        membership: &MembershipRow,
        membership_tenant_is_root: bool,
        jti: Option<String>,
    ) -> Principal {
        let role_type = role_for(MembershipFacts {
            is_admin: membership.role == "admin",
            is_owner: membership.is_owner,
            branch_id: membership.branch_id,
            tenant_is_root: membership_tenant_is_root,
        });

        let scope_branch_id = match role_type {
            RoleType::Owner => None,
            // The pin if there is one, otherwise the tenant the membership
            // lives on (a direct branch membership scopes to that branch;
            // an unpinned root membership works the main location).
            _ => Some(membership.branch_id.unwrap_or(membership.tenant_id)),
        };

        Principal {
            user_id,
            tenant_id: session_tenant.id,
            org_id: session_tenant.parent_id.unwrap_or(session_tenant.id),
            role_type,
            scope_branch_id,
            session_jti: jti,
        }
    }

    async fn establish_session(
        &self,
        user_id: Uuid,
        username: String,
        tenant: TenantRow,
        membership: MembershipRow,
    ) -> AppResult<Session> {
        let membership_tenant_is_root = if membership.tenant_id == tenant.id {
            tenant.parent_id.is_none()
        } else {
            // Qualified via the parent organization, which is a root.
            true
        };

        let (token, jti, expires_at) = self.jwt.issue(user_id, tenant.id)?;
        sessions::save_session(&self.pool, user_id, tenant.id, &jti, expires_at).await?;

        let principal = self.principal_from(
            user_id,
            &tenant,
            &membership,
            membership_tenant_is_root,
            Some(jti),
        );

        Ok(Session {
            session_token: token,
            expires_at,
            tenant: TenantSummary {
                id: tenant.id,
                subdomain: tenant.subdomain,
                name: tenant.name,
                currency: tenant.currency,
                tax_rate: tenant.tax_rate,
                timezone: tenant.timezone,
            },
            user: UserContext {
                id: user_id,
                username,
                role_type: principal.role_type,
                pinned_branch_id: principal.scope_branch_id,
            },
        })
    }

    /// Authenticate `(credential, password, subdomain)` into a session.
    pub async fn authenticate(
        &self,
        credential: &str,
        password_input: &str,
        subdomain: &str,
    ) -> AppResult<Session> {
        let tenant: Option<TenantRow> = sqlx::query_as(
            r#"
            SELECT id, subdomain, name, currency, tax_rate, timezone, parent_id, is_active
            FROM tenants
            WHERE subdomain = $1
            "#,
        )
        .bind(subdomain)
        .fetch_optional(&self.pool)
        .await?;

        let Some(tenant) = tenant else {
            return Err(AppError::Identity(IdentityError::UnknownTenant));
        };
        if !self.tenant_reachable(&tenant).await? {
            return Err(AppError::Identity(IdentityError::Inactive));
        }

        let user: Option<UserRow> = sqlx::query_as(
            r#"
            SELECT id, username, password_hash, is_active
            FROM users
            WHERE username = $1 OR email = $1
            "#,
        )
        .bind(credential)
        .fetch_optional(&self.pool)
        .await?;

        let Some(user) = user else {
            // Same cost as a real verification.
            password::verify_dummy(password_input);
            return Err(AppError::Identity(IdentityError::InvalidCredentials));
        };

        if !password::verify_password(password_input, &user.password_hash) {
            return Err(AppError::Identity(IdentityError::InvalidCredentials));
        }
        if !user.is_active {
            return Err(AppError::Identity(IdentityError::Inactive));
        }

        let membership = self
            .qualifying_membership(user.id, &tenant)
            .await?
            .ok_or(AppError::Identity(IdentityError::NotAMember))?;

        tracing::info!(
            user_id = %user.id,
            tenant_id = %tenant.id,
            subdomain = %tenant.subdomain,
            "Login successful"
        );

        self.establish_session(user.id, user.username.clone(), tenant, membership)
            .await
    }

    /// Resolve a bearer token into the request principal. Role type and
    /// pin come from the membership row as it is now, not as it was at
    /// login.
    pub async fn resolve(&self, token: &str) -> AppResult<Principal> {
        let claims = self.jwt.validate(token)?;

        if !sessions::is_session_valid(&self.pool, &claims.jti, claims.sub).await? {
            return Err(AppError::Unauthenticated);
        }

        let tenant = self
            .load_tenant(claims.tenant_id)
            .await?
            .ok_or(AppError::Unauthenticated)?;
        if !self.tenant_reachable(&tenant).await? {
            return Err(AppError::Unauthenticated);
        }

        let membership = match self.qualifying_membership(claims.sub, &tenant).await {
            Ok(Some(m)) => m,
            Ok(None) | Err(AppError::Identity(_)) => return Err(AppError::Unauthenticated),
            Err(e) => return Err(e),
        };

        let membership_tenant_is_root = if membership.tenant_id == tenant.id {
            tenant.parent_id.is_none()
        } else {
            true
        };

        Ok(self.principal_from(
            claims.sub,
            &tenant,
            &membership,
            membership_tenant_is_root,
            Some(claims.jti),
        ))
    }

    /// Switch an authenticated principal to another tenant.
    ///
    /// Allowed when the target is the current tenant, the user holds a
    /// direct active membership on the target, or the target is a branch
    /// whose parent organization carries an active membership that is
    /// either admin (super-user, independent of its `branch_id`) or staff
    /// pinned to exactly this branch. Everything else is `forbidden`.
    pub async fn switch_tenant(&self, principal: &Principal, target: Uuid) -> AppResult<Session> {
        let tenant = self
            .load_tenant(target)
            .await?
            .ok_or(AppError::Forbidden)?;
        if !self.tenant_reachable(&tenant).await? {
            return Err(AppError::Forbidden);
        }

        let membership = match self.qualifying_membership(principal.user_id, &tenant).await {
            Ok(Some(m)) => m,
            Ok(None) | Err(AppError::Identity(_)) => return Err(AppError::Forbidden),
            Err(e) => return Err(e),
        };

        let username: String = sqlx::query_scalar("SELECT username FROM users WHERE id = $1")
            .bind(principal.user_id)
            .fetch_one(&self.pool)
            .await?;

        tracing::info!(
            user_id = %principal.user_id,
            from_tenant = %principal.tenant_id,
            to_tenant = %target,
            "Tenant switch"
        );

        self.establish_session(principal.user_id, username, tenant, membership)
            .await
    }

    /// Revoke the session behind a token.
    pub async fn logout(&self, principal: &Principal) -> AppResult<()> {
        if let Some(jti) = &principal.session_jti {
            sessions::revoke_session(&self.pool, jti, "logout").await?;
        }
        Ok(())
    }
}
