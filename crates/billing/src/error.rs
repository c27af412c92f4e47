//! Billing error type
//!
//! Crate-local error; the API layer converts it into the shared taxonomy
//! via the `From` impl at the bottom.

use dukapo_shared::AppError;
use thiserror::Error;

pub type BillingResult<T> = Result<T, BillingError>;

#[derive(Debug, Error)]
pub enum BillingError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("unknown transaction reference")]
    InvalidReference,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("subscription state does not permit `{0}`")]
    Precondition(String),

    #[error("gateway error: {0}")]
    Gateway(String),

    #[error("webhook signature invalid")]
    WebhookSignatureInvalid,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl BillingError {
    /// True when a Postgres unique-constraint violation is wrapped inside.
    /// Racing verifies detect the duplicate through this and re-enter the
    /// idempotent path.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            BillingError::Database(sqlx::Error::Database(db)) => {
                db.code().as_deref() == Some("23505")
            }
            _ => false,
        }
    }
}

impl From<BillingError> for AppError {
    fn from(e: BillingError) -> Self {
        match e {
            BillingError::InvalidInput(msg) => AppError::invalid_argument("request", msg),
            BillingError::NotFound(entity) => AppError::not_found(entity),
            BillingError::InvalidReference => AppError::not_found("transaction reference"),
            BillingError::Conflict(msg) => AppError::conflict(msg),
            BillingError::Precondition(action) => AppError::precondition_failed(action),
            BillingError::Gateway(msg) => AppError::GatewayUnavailable(msg),
            BillingError::WebhookSignatureInvalid => AppError::Forbidden,
            BillingError::Database(e) => AppError::Database(e),
        }
    }
}
