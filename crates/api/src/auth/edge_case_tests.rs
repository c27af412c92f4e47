// Test file - these are expected patterns in test code
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

//! Edge Case Tests for Identity & Authorization
//!
//! Boundary conditions in:
//! - Role-type derivation (super-user, pins, branch tenants)
//! - The permission matrix under branch scoping
//! - Read-only degradation when an entitlement lapses
//! - Session token shape

#[cfg(test)]
mod role_derivation_tests {
    use crate::authz::{role_for, MembershipFacts};
    use dukapo_shared::RoleType;
    use uuid::Uuid;

    // =========================================================================
    // Org admin with no pin is a super-user across every branch
    // =========================================================================
    #[test]
    fn org_admin_without_pin_is_owner() {
        let role = role_for(MembershipFacts {
            is_admin: true,
            is_owner: false,
            branch_id: None,
            tenant_is_root: true,
        });
        assert_eq!(role, RoleType::Owner);
    }

    // =========================================================================
    // A pin restricts admins into branch_admin unless is_owner overrides
    // =========================================================================
    #[test]
    fn pin_vs_owner_flag_precedence() {
        let pinned = MembershipFacts {
            is_admin: true,
            is_owner: false,
            branch_id: Some(Uuid::new_v4()),
            tenant_is_root: true,
        };
        assert_eq!(role_for(pinned), RoleType::BranchAdmin);

        let pinned_owner = MembershipFacts {
            is_owner: true,
            ..pinned
        };
        assert_eq!(role_for(pinned_owner), RoleType::Owner);
    }

    // =========================================================================
    // Staff never escalate, pin or no pin, root or branch
    // =========================================================================
    #[test]
    fn staff_never_escalate() {
        for tenant_is_root in [true, false] {
            for branch_id in [None, Some(Uuid::new_v4())] {
                let role = role_for(MembershipFacts {
                    is_admin: false,
                    is_owner: false,
                    branch_id,
                    tenant_is_root,
                });
                assert_eq!(role, RoleType::Staff);
            }
        }
    }

    // =========================================================================
    // is_owner on a staff membership is meaningless
    // =========================================================================
    #[test]
    fn owner_flag_requires_admin() {
        let role = role_for(MembershipFacts {
            is_admin: false,
            is_owner: true,
            branch_id: None,
            tenant_is_root: true,
        });
        assert_eq!(role, RoleType::Staff);
    }
}

#[cfg(test)]
mod branch_scope_tests {
    use crate::authz::{authorize, Principal};
    use dukapo_shared::{Action, RoleType};
    use uuid::Uuid;

    fn principal(role: RoleType, org: Uuid, scope: Option<Uuid>) -> Principal {
        Principal {
            user_id: Uuid::new_v4(),
            tenant_id: scope.unwrap_or(org),
            org_id: org,
            role_type: role,
            scope_branch_id: scope,
            session_jti: None,
        }
    }

    // =========================================================================
    // Super-user reaches a branch they were never explicitly pinned to
    // =========================================================================
    #[test]
    fn owner_creates_sales_in_any_branch() {
        let org = Uuid::new_v4();
        let b2 = Uuid::new_v4();
        let owner = principal(RoleType::Owner, org, None);
        assert!(authorize(&owner, Action::SaleCreate, Some(b2)));
        assert!(authorize(&owner, Action::ReportsView, Some(b2)));
    }

    // =========================================================================
    // Staff pinned to B1 addressing B2 is denied even for selling
    // =========================================================================
    #[test]
    fn pinned_staff_denied_in_foreign_branch() {
        let org = Uuid::new_v4();
        let b1 = Uuid::new_v4();
        let b2 = Uuid::new_v4();
        let staff = principal(RoleType::Staff, org, Some(b1));
        assert!(authorize(&staff, Action::SaleCreate, Some(b1)));
        assert!(!authorize(&staff, Action::SaleCreate, Some(b2)));
    }

    // =========================================================================
    // Unpinned staff on the org root operate the main location
    // =========================================================================
    #[test]
    fn root_staff_default_to_main_location() {
        let org = Uuid::new_v4();
        let staff = principal(RoleType::Staff, org, Some(org));
        assert!(authorize(&staff, Action::SaleCreate, None));
        assert!(authorize(&staff, Action::SaleCreate, Some(org)));
        assert!(!authorize(&staff, Action::SaleCreate, Some(Uuid::new_v4())));
    }

    // =========================================================================
    // Branch admin edits catalog at home, reads nothing across the fence
    // =========================================================================
    #[test]
    fn branch_admin_fence() {
        let org = Uuid::new_v4();
        let home = Uuid::new_v4();
        let away = Uuid::new_v4();
        let admin = principal(RoleType::BranchAdmin, org, Some(home));
        assert!(authorize(&admin, Action::CatalogEdit, Some(home)));
        assert!(authorize(&admin, Action::StockEdit, Some(home)));
        assert!(!authorize(&admin, Action::CatalogEdit, Some(away)));
        assert!(!authorize(&admin, Action::DashboardView, Some(away)));
        assert!(!authorize(&admin, Action::SaleViewAll, Some(away)));
    }
}

#[cfg(test)]
mod degradation_tests {
    use dukapo_shared::{Action, SubscriptionStatus};

    // =========================================================================
    // Expired collapses exactly the mutating actions; reads survive
    // =========================================================================
    #[test]
    fn expired_is_read_only() {
        let status = SubscriptionStatus::Expired;
        assert!(!status.allows_mutation());

        let blocked: Vec<Action> = [
            Action::SaleCreate,
            Action::CatalogEdit,
            Action::StockEdit,
            Action::MemberManage,
            Action::SettingsEdit,
        ]
        .into_iter()
        .filter(|a| a.is_mutating())
        .collect();
        assert_eq!(blocked.len(), 5);

        for read in [
            Action::DashboardView,
            Action::ReportsView,
            Action::SaleViewAll,
            Action::SaleViewOwn,
        ] {
            assert!(!read.is_mutating(), "{read:?} must stay available");
        }
    }

    // =========================================================================
    // Subscription management survives expiry - the path back to active
    // =========================================================================
    #[test]
    fn renewal_path_never_locks_out() {
        assert!(!Action::SubscriptionManage.is_mutating());
    }

    // =========================================================================
    // Cancelled keeps capability until the scheduler flips it
    // =========================================================================
    #[test]
    fn cancelled_retains_capability() {
        assert!(SubscriptionStatus::Cancelled.allows_mutation());
    }
}

#[cfg(test)]
mod session_token_tests {
    use crate::auth::jwt::JwtManager;
    use uuid::Uuid;

    // =========================================================================
    // A token issued for tenant A resolves to tenant A, not whatever the
    // caller claims
    // =========================================================================
    #[test]
    fn token_binds_the_tenant() {
        let manager = JwtManager::new("edge-case-secret", 1);
        let tenant_a = Uuid::new_v4();
        let (token, _, _) = manager.issue(Uuid::new_v4(), tenant_a).unwrap();
        let claims = manager.validate(&token).unwrap();
        assert_eq!(claims.tenant_id, tenant_a);
    }

    // =========================================================================
    // Tokens from different issuances never share a jti
    // =========================================================================
    #[test]
    fn jti_unique_per_issue() {
        let manager = JwtManager::new("edge-case-secret", 1);
        let user = Uuid::new_v4();
        let tenant = Uuid::new_v4();
        let (_, jti1, _) = manager.issue(user, tenant).unwrap();
        let (_, jti2, _) = manager.issue(user, tenant).unwrap();
        assert_ne!(jti1, jti2);
    }
}
