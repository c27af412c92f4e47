// API crate clippy configuration
// Test code patterns:
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Dukapo API Library
//!
//! The request-plane components: identity & tenant resolution, the
//! authorization gate, catalog/stock/sales/reporting services, and the
//! HTTP routes over them.

pub mod auth;
pub mod authz;
pub mod catalog;
pub mod error;
pub mod reports;
pub mod routes;
pub mod sales;
pub mod seed;
pub mod state;
pub mod stock;
pub mod tenants;

pub use error::{ApiError, ApiResult};
pub use state::AppState;
