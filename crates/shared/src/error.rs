//! Error taxonomy
//!
//! The closed set of error kinds every crate in the workspace speaks.
//! The API crate maps kinds onto HTTP statuses; domain code only ever
//! constructs these variants, never transport-level errors.

use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

/// Identity failures surfaced by session establishment.
///
/// All four share one response shape so a caller cannot enumerate
/// accounts; `unknown_tenant` is distinguishable only because subdomains
/// are public.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityError {
    InvalidCredentials,
    UnknownTenant,
    NotAMember,
    Inactive,
}

impl IdentityError {
    pub fn kind(&self) -> &'static str {
        match self {
            IdentityError::InvalidCredentials => "invalid_credentials",
            IdentityError::UnknownTenant => "unknown_tenant",
            IdentityError::NotAMember => "not_a_member",
            IdentityError::Inactive => "inactive",
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid argument `{field}`: {message}")]
    InvalidArgument { field: String, message: String },

    #[error("authentication required")]
    Unauthenticated,

    #[error("authentication failed")]
    Identity(IdentityError),

    #[error("forbidden")]
    Forbidden,

    #[error("{0} not found")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("insufficient stock for product `{product}`")]
    Insufficient { product: String },

    #[error("subscription state does not permit `{action}`")]
    PreconditionFailed { action: String },

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("payment gateway unavailable: {0}")]
    GatewayUnavailable(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn invalid_argument(field: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::InvalidArgument {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn not_found(entity: impl Into<String>) -> Self {
        AppError::NotFound(entity.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        AppError::Conflict(message.into())
    }

    pub fn precondition_failed(action: impl Into<String>) -> Self {
        AppError::PreconditionFailed {
            action: action.into(),
        }
    }

    /// Contractual kind string (spec'd error surface, stable for clients).
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::InvalidArgument { .. } => "invalid_argument",
            AppError::Unauthenticated => "unauthenticated",
            AppError::Identity(e) => e.kind(),
            AppError::Forbidden => "forbidden",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict(_) => "conflict",
            AppError::Insufficient { .. } => "insufficient",
            AppError::PreconditionFailed { .. } => "precondition_failed",
            AppError::DeadlineExceeded => "deadline_exceeded",
            AppError::GatewayUnavailable(_) => "gateway_unavailable",
            AppError::Database(_) | AppError::Internal(_) => "internal",
        }
    }

    /// True when a Postgres unique-constraint violation is wrapped inside.
    ///
    /// Subscription verification leans on this: a racing writer detects
    /// the duplicate and re-enters the idempotent path instead of failing.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            AppError::Database(sqlx::Error::Database(db)) => {
                db.code().as_deref() == Some("23505")
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_strings_are_contractual() {
        assert_eq!(
            AppError::invalid_argument("sku", "empty").kind(),
            "invalid_argument"
        );
        assert_eq!(AppError::Unauthenticated.kind(), "unauthenticated");
        assert_eq!(
            AppError::Identity(IdentityError::UnknownTenant).kind(),
            "unknown_tenant"
        );
        assert_eq!(AppError::Forbidden.kind(), "forbidden");
        assert_eq!(AppError::not_found("sale").kind(), "not_found");
        assert_eq!(AppError::conflict("duplicate sku").kind(), "conflict");
        assert_eq!(
            AppError::Insufficient {
                product: "SKU-1".into()
            }
            .kind(),
            "insufficient"
        );
        assert_eq!(
            AppError::precondition_failed("sale.create").kind(),
            "precondition_failed"
        );
        assert_eq!(AppError::DeadlineExceeded.kind(), "deadline_exceeded");
        assert_eq!(
            AppError::GatewayUnavailable("timeout".into()).kind(),
            "gateway_unavailable"
        );
    }

    #[test]
    fn identity_errors_share_one_variant() {
        // One response shape for all four; only the kind string differs.
        for e in [
            IdentityError::InvalidCredentials,
            IdentityError::NotAMember,
            IdentityError::Inactive,
        ] {
            assert!(matches!(AppError::Identity(e), AppError::Identity(_)));
        }
    }
}
