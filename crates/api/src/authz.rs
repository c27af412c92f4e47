//! Authorization gate
//!
//! `role_for` and `authorize` are pure: same inputs, same answer, no I/O.
//! They encode the permission matrix as a compile-time table, keyed by the
//! derived role type. The async `ensure_entitled` adds the subscription
//! cross-cut on mutating actions.
//!
//! Tests construct principals directly and call these functions without a
//! server or database.

use sqlx::PgPool;
use uuid::Uuid;

use dukapo_shared::{Action, AppError, AppResult, RoleType, SubscriptionStatus};

/// Authenticated request context; passed explicitly down the call chain.
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: Uuid,
    /// Tenant the session is bound to (an organization or a branch).
    pub tenant_id: Uuid,
    /// Root organization of `tenant_id` (equal to it when it is a root).
    pub org_id: Uuid,
    pub role_type: RoleType,
    /// The one branch a non-owner operates on. `None` for owners.
    pub scope_branch_id: Option<Uuid>,
    pub session_jti: Option<String>,
}

impl Principal {
    /// The branch an unqualified request addresses.
    pub fn default_branch(&self) -> Uuid {
        self.scope_branch_id.unwrap_or(self.tenant_id)
    }
}

/// Membership row fields the role derivation reads.
#[derive(Debug, Clone, Copy)]
pub struct MembershipFacts {
    pub is_admin: bool,
    pub is_owner: bool,
    pub branch_id: Option<Uuid>,
    /// Whether the membership's tenant is a root organization.
    pub tenant_is_root: bool,
}

/// Derive the role type for one (user, tenant) pair.
///
/// Pure by construction: the same membership and tenant rows produce the
/// same value across processes and time.
pub fn role_for(m: MembershipFacts) -> RoleType {
    if m.tenant_is_root {
        if m.is_admin && (m.branch_id.is_none() || m.is_owner) {
            RoleType::Owner
        } else if m.is_admin {
            RoleType::BranchAdmin
        } else {
            RoleType::Staff
        }
    } else if m.is_admin {
        RoleType::BranchAdmin
    } else {
        RoleType::Staff
    }
}

/// Permission matrix: may `role` perform `action` at all, branch scope
/// aside?
fn matrix_allows(role: RoleType, action: Action) -> bool {
    match role {
        RoleType::Owner => true,
        RoleType::BranchAdmin => matches!(
            action,
            Action::DashboardView
                | Action::ReportsView
                | Action::SaleCreate
                | Action::SaleViewAll
                | Action::SaleViewOwn
                | Action::CatalogEdit
                | Action::StockEdit
                | Action::MemberManage
        ),
        RoleType::Staff => matches!(action, Action::SaleCreate | Action::SaleViewOwn),
    }
}

/// Does `action` care which branch it targets?
fn is_branch_scoped(action: Action) -> bool {
    !matches!(
        action,
        Action::SaleViewOwn | Action::SettingsEdit | Action::SubscriptionManage
    )
}

/// The per-request decision: may `principal` perform `action`, addressed
/// at `target_branch` (defaulting to the principal's own context)?
pub fn authorize(principal: &Principal, action: Action, target_branch: Option<Uuid>) -> bool {
    if !matrix_allows(principal.role_type, action) {
        return false;
    }
    // Owners roam every branch of their organization; everyone else is
    // pinned to exactly one.
    if principal.role_type != RoleType::Owner && is_branch_scoped(action) {
        let target = target_branch.unwrap_or_else(|| principal.default_branch());
        if target != principal.default_branch() {
            return false;
        }
    }
    true
}

/// Authorize or fail with `forbidden`.
pub fn require(principal: &Principal, action: Action, target_branch: Option<Uuid>) -> AppResult<()> {
    if authorize(principal, action, target_branch) {
        Ok(())
    } else {
        tracing::debug!(
            user_id = %principal.user_id,
            role = principal.role_type.as_str(),
            action = action.as_str(),
            target = ?target_branch,
            "Authorization denied"
        );
        Err(AppError::Forbidden)
    }
}

/// Subscription cross-cut: mutating actions additionally require the
/// target branch's entitlement to be live.
///
/// `expired` collapses every mutating action to `precondition_failed`
/// while reads keep working (read-only degradation). `cancelled` retains
/// full capability until the scheduler expires it at the billing date.
/// A branch whose covering rows lapsed degrades even when its
/// organization is still active.
pub async fn ensure_entitled(
    pool: &PgPool,
    org_id: Uuid,
    branch_id: Uuid,
    action: Action,
) -> AppResult<()> {
    if !action.is_mutating() {
        return Ok(());
    }

    let status: Option<String> =
        sqlx::query_scalar("SELECT subscription_status FROM tenants WHERE id = $1")
            .bind(org_id)
            .fetch_optional(pool)
            .await?;
    let status = status
        .and_then(|s| SubscriptionStatus::parse_str(&s))
        .ok_or_else(|| AppError::not_found("tenant"))?;

    if !status.allows_mutation() {
        return Err(AppError::precondition_failed(action.as_str()));
    }

    // Trials cover the whole organization; paid periods cover exactly the
    // locations their transactions enabled.
    if status == SubscriptionStatus::Trial || branch_id == org_id {
        return Ok(());
    }

    let covered: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS (
            SELECT 1
            FROM branch_subscriptions bs
            WHERE bs.tenant_id = $1
              AND bs.is_active = TRUE
              AND bs.subscription_end > NOW()
        )
        "#,
    )
    .bind(branch_id)
    .fetch_one(pool)
    .await?;

    if covered {
        Ok(())
    } else {
        Err(AppError::precondition_failed(action.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(role: RoleType, scope: Option<Uuid>) -> Principal {
        let org = Uuid::new_v4();
        Principal {
            user_id: Uuid::new_v4(),
            tenant_id: scope.unwrap_or(org),
            org_id: org,
            role_type: role,
            scope_branch_id: scope,
            session_jti: None,
        }
    }

    #[test]
    fn owner_on_root_with_no_pin() {
        let role = role_for(MembershipFacts {
            is_admin: true,
            is_owner: false,
            branch_id: None,
            tenant_is_root: true,
        });
        assert_eq!(role, RoleType::Owner);
    }

    #[test]
    fn explicit_owner_flag_survives_a_pin() {
        let role = role_for(MembershipFacts {
            is_admin: true,
            is_owner: true,
            branch_id: Some(Uuid::new_v4()),
            tenant_is_root: true,
        });
        assert_eq!(role, RoleType::Owner);
    }

    #[test]
    fn pinned_admin_on_root_is_branch_admin() {
        let role = role_for(MembershipFacts {
            is_admin: true,
            is_owner: false,
            branch_id: Some(Uuid::new_v4()),
            tenant_is_root: true,
        });
        assert_eq!(role, RoleType::BranchAdmin);
    }

    #[test]
    fn admin_on_branch_tenant_is_branch_admin() {
        let role = role_for(MembershipFacts {
            is_admin: true,
            is_owner: false,
            branch_id: None,
            tenant_is_root: false,
        });
        assert_eq!(role, RoleType::BranchAdmin);
    }

    #[test]
    fn everyone_else_is_staff() {
        for tenant_is_root in [true, false] {
            let role = role_for(MembershipFacts {
                is_admin: false,
                is_owner: false,
                branch_id: Some(Uuid::new_v4()),
                tenant_is_root,
            });
            assert_eq!(role, RoleType::Staff);
        }
    }

    #[test]
    fn role_derivation_is_deterministic() {
        let facts = MembershipFacts {
            is_admin: true,
            is_owner: false,
            branch_id: None,
            tenant_is_root: true,
        };
        for _ in 0..100 {
            assert_eq!(role_for(facts), RoleType::Owner);
        }
    }

    #[test]
    fn owner_may_do_everything_anywhere() {
        let p = principal(RoleType::Owner, None);
        let other_branch = Uuid::new_v4();
        for action in [
            Action::DashboardView,
            Action::ReportsView,
            Action::SaleCreate,
            Action::SaleViewAll,
            Action::SaleViewOwn,
            Action::CatalogEdit,
            Action::StockEdit,
            Action::MemberManage,
            Action::SettingsEdit,
            Action::SubscriptionManage,
        ] {
            assert!(authorize(&p, action, Some(other_branch)), "{action:?}");
        }
    }

    #[test]
    fn branch_admin_is_confined_to_own_branch() {
        let own = Uuid::new_v4();
        let other = Uuid::new_v4();
        let p = principal(RoleType::BranchAdmin, Some(own));

        assert!(authorize(&p, Action::SaleCreate, Some(own)));
        assert!(!authorize(&p, Action::SaleCreate, Some(other)));
        assert!(authorize(&p, Action::CatalogEdit, Some(own)));
        assert!(!authorize(&p, Action::CatalogEdit, Some(other)));
        assert!(authorize(&p, Action::DashboardView, Some(own)));
        assert!(!authorize(&p, Action::DashboardView, Some(other)));
        assert!(authorize(&p, Action::MemberManage, Some(own)));
        assert!(!authorize(&p, Action::MemberManage, Some(other)));
    }

    #[test]
    fn branch_admin_lacks_org_level_powers() {
        let own = Uuid::new_v4();
        let p = principal(RoleType::BranchAdmin, Some(own));
        assert!(!authorize(&p, Action::SettingsEdit, None));
        assert!(!authorize(&p, Action::SubscriptionManage, None));
    }

    #[test]
    fn staff_sell_in_their_branch_and_nothing_more() {
        let own = Uuid::new_v4();
        let other = Uuid::new_v4();
        let p = principal(RoleType::Staff, Some(own));

        assert!(authorize(&p, Action::SaleCreate, Some(own)));
        assert!(!authorize(&p, Action::SaleCreate, Some(other)));
        assert!(authorize(&p, Action::SaleViewOwn, None));
        assert!(!authorize(&p, Action::SaleViewAll, Some(own)));
        assert!(!authorize(&p, Action::DashboardView, Some(own)));
        assert!(!authorize(&p, Action::ReportsView, Some(own)));
        assert!(!authorize(&p, Action::CatalogEdit, Some(own)));
        assert!(!authorize(&p, Action::StockEdit, Some(own)));
        assert!(!authorize(&p, Action::MemberManage, Some(own)));
    }

    #[test]
    fn unqualified_target_defaults_to_own_context() {
        let own = Uuid::new_v4();
        let p = principal(RoleType::BranchAdmin, Some(own));
        assert!(authorize(&p, Action::SaleCreate, None));
        assert!(authorize(&p, Action::ReportsView, None));
    }

    #[test]
    fn require_maps_to_forbidden() {
        let p = principal(RoleType::Staff, Some(Uuid::new_v4()));
        let err = require(&p, Action::CatalogEdit, None).unwrap_err();
        assert_eq!(err.kind(), "forbidden");
    }
}
