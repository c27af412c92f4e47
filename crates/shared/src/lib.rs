// Test code patterns:
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Dukapo shared crate
//!
//! Foundation types used by every other crate in the workspace:
//! configuration, database pool + migrations, the error taxonomy,
//! domain enums, money/VAT math, and tenant-timezone helpers.

pub mod config;
pub mod db;
pub mod error;
pub mod money;
pub mod types;
pub mod tz;

pub use config::Config;
pub use db::{create_pool, run_migrations};
pub use error::{AppError, AppResult, IdentityError};
pub use money::{round_minor, vat_breakdown, VatBreakdown};
pub use types::{
    Action, BillingCycle, MovementReason, PaymentMethod, RoleType, SubscriptionStatus,
    TransactionKind, TransactionStatus,
};
pub use tz::{local_date_range_utc, local_day_bounds};
