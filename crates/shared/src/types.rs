//! Domain enums
//!
//! Stored as TEXT columns; every enum carries `as_str`/`parse_str` so the
//! query layer binds plain strings and row types stay `String`-shaped.

use serde::{Deserialize, Serialize};

/// Subscription lifecycle state of a root tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Trial,
    Active,
    Cancelled,
    Expired,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Trial => "trial",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Cancelled => "cancelled",
            SubscriptionStatus::Expired => "expired",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "trial" => Some(SubscriptionStatus::Trial),
            "active" => Some(SubscriptionStatus::Active),
            "cancelled" => Some(SubscriptionStatus::Cancelled),
            "expired" => Some(SubscriptionStatus::Expired),
            _ => None,
        }
    }

    /// Whether mutating operations are permitted in this state.
    ///
    /// `cancelled` keeps full capability until the scheduler flips it to
    /// `expired` at the billing date; only `expired` degrades to read-only.
    pub fn allows_mutation(&self) -> bool {
        !matches!(self, SubscriptionStatus::Expired)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingCycle {
    Monthly,
    SemiAnnual,
    Annual,
}

impl BillingCycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingCycle::Monthly => "monthly",
            BillingCycle::SemiAnnual => "semi_annual",
            BillingCycle::Annual => "annual",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "monthly" => Some(BillingCycle::Monthly),
            "semi_annual" => Some(BillingCycle::SemiAnnual),
            "annual" => Some(BillingCycle::Annual),
            _ => None,
        }
    }

    /// Multiplier applied to the monthly base price.
    /// Semi-annual and annual each carry a two-month discount.
    pub fn base_multiplier(&self) -> i64 {
        match self {
            BillingCycle::Monthly => 1,
            BillingCycle::SemiAnnual => 5,
            BillingCycle::Annual => 10,
        }
    }

    /// Covered period length in days.
    pub fn period_days(&self) -> i64 {
        match self {
            BillingCycle::Monthly => 30,
            BillingCycle::SemiAnnual => 182,
            BillingCycle::Annual => 365,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    MobileMoney,
    BankTransfer,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
            PaymentMethod::MobileMoney => "mobile_money",
            PaymentMethod::BankTransfer => "bank_transfer",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "cash" => Some(PaymentMethod::Cash),
            "card" => Some(PaymentMethod::Card),
            "mobile_money" => Some(PaymentMethod::MobileMoney),
            "bank_transfer" => Some(PaymentMethod::BankTransfer),
            _ => None,
        }
    }
}

/// Reason attached to a stock-movement audit row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementReason {
    Sale,
    Receive,
    Adjust,
    Return,
}

impl MovementReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementReason::Sale => "sale",
            MovementReason::Receive => "receive",
            MovementReason::Adjust => "adjust",
            MovementReason::Return => "return",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "sale" => Some(MovementReason::Sale),
            "receive" => Some(MovementReason::Receive),
            "adjust" => Some(MovementReason::Adjust),
            "return" => Some(MovementReason::Return),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Success,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Success => "success",
            TransactionStatus::Failed => "failed",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TransactionStatus::Pending),
            "success" => Some(TransactionStatus::Success),
            "failed" => Some(TransactionStatus::Failed),
            _ => None,
        }
    }
}

/// What a subscription transaction pays for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// A full billing cycle for the selected branch set.
    NewCycle,
    /// Pro-rata addition of branches for the remainder of the current cycle.
    BranchAdd,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::NewCycle => "new_cycle",
            TransactionKind::BranchAdd => "branch_add",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "new_cycle" => Some(TransactionKind::NewCycle),
            "branch_add" => Some(TransactionKind::BranchAdd),
            _ => None,
        }
    }
}

/// Derived per (user, tenant); never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleType {
    Owner,
    BranchAdmin,
    Staff,
}

impl RoleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoleType::Owner => "owner",
            RoleType::BranchAdmin => "branch_admin",
            RoleType::Staff => "staff",
        }
    }
}

/// The closed action set the authorization gate decides over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    DashboardView,
    ReportsView,
    SaleCreate,
    SaleViewAll,
    SaleViewOwn,
    CatalogEdit,
    StockEdit,
    MemberManage,
    SettingsEdit,
    SubscriptionManage,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::DashboardView => "dashboard.view",
            Action::ReportsView => "reports.view",
            Action::SaleCreate => "sale.create",
            Action::SaleViewAll => "sale.view_all",
            Action::SaleViewOwn => "sale.view_own",
            Action::CatalogEdit => "catalog.edit",
            Action::StockEdit => "stock.edit",
            Action::MemberManage => "member.manage",
            Action::SettingsEdit => "settings.edit",
            Action::SubscriptionManage => "subscription.manage",
        }
    }

    /// Mutating actions are the ones an expired subscription collapses.
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Action::SaleCreate
                | Action::CatalogEdit
                | Action::StockEdit
                | Action::MemberManage
                | Action::SettingsEdit
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enum_round_trips() {
        for s in ["trial", "active", "cancelled", "expired"] {
            let parsed = SubscriptionStatus::parse_str(s).unwrap();
            assert_eq!(parsed.as_str(), s);
        }
        for s in ["monthly", "semi_annual", "annual"] {
            assert_eq!(BillingCycle::parse_str(s).unwrap().as_str(), s);
        }
        for s in ["cash", "card", "mobile_money", "bank_transfer"] {
            assert_eq!(PaymentMethod::parse_str(s).unwrap().as_str(), s);
        }
        for s in ["sale", "receive", "adjust", "return"] {
            assert_eq!(MovementReason::parse_str(s).unwrap().as_str(), s);
        }
        assert!(SubscriptionStatus::parse_str("bogus").is_none());
    }

    #[test]
    fn cycle_multipliers_carry_two_month_discount() {
        assert_eq!(BillingCycle::Monthly.base_multiplier(), 1);
        assert_eq!(BillingCycle::SemiAnnual.base_multiplier(), 5);
        assert_eq!(BillingCycle::Annual.base_multiplier(), 10);
    }

    #[test]
    fn only_expired_blocks_mutation() {
        assert!(SubscriptionStatus::Trial.allows_mutation());
        assert!(SubscriptionStatus::Active.allows_mutation());
        assert!(SubscriptionStatus::Cancelled.allows_mutation());
        assert!(!SubscriptionStatus::Expired.allows_mutation());
    }

    #[test]
    fn mutating_action_set() {
        assert!(Action::SaleCreate.is_mutating());
        assert!(Action::CatalogEdit.is_mutating());
        assert!(!Action::DashboardView.is_mutating());
        assert!(!Action::SaleViewOwn.is_mutating());
        assert!(!Action::SubscriptionManage.is_mutating());
    }
}
