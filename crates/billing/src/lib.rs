// Billing crate clippy configuration
// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Dukapo Billing Module
//!
//! Handles the subscription lifecycle and the external payment gateway.
//!
//! ## Features
//!
//! - **Pricing**: billing-cycle variants, 80% volume rate for additional
//!   branches, pro-rata mid-cycle additions
//! - **Subscription Ledger**: initialize, idempotent verification,
//!   cancellation, reactivation, auto-renewal
//! - **Gateway Adapter**: transaction initialize/verify over HTTP
//! - **Webhooks**: signature-verified gateway event intake
//! - **Notifications**: durable outbox for expiry warnings
//! - **Invariants**: runnable consistency checks over the billing state

pub mod error;
pub mod gateway;
pub mod invariants;
pub mod notifications;
pub mod pricing;
pub mod subscriptions;
pub mod webhooks;

#[cfg(test)]
mod edge_case_tests;

// Error
pub use error::{BillingError, BillingResult};

// Gateway
pub use gateway::{GatewayClient, GatewayConfig, GatewayInitialization, GatewayVerification};

// Invariants
pub use invariants::{
    InvariantCheckSummary, InvariantChecker, InvariantViolation, ViolationSeverity,
};

// Notifications
pub use notifications::{warning_urgency, NotificationQueue};

// Subscriptions
pub use subscriptions::{
    CheckoutInit, SubscriptionService, SubscriptionSnapshot, TransactionView, VerifyOutcome,
};

// Webhooks
pub use webhooks::{WebhookEvent, WebhookHandler};

use dukapo_shared::Config;
use sqlx::PgPool;
use std::time::Duration;

/// Main billing service that combines all billing functionality
pub struct BillingService {
    pub subscriptions: SubscriptionService,
    pub webhooks: WebhookHandler,
    pub notifications: NotificationQueue,
    pub invariants: InvariantChecker,
}

impl BillingService {
    pub fn from_config(config: &Config, pool: PgPool) -> BillingResult<Self> {
        let gateway = GatewayClient::new(GatewayConfig {
            base_url: config.gateway_base_url.clone(),
            secret_key: config.gateway_secret.clone(),
            public_key: config.gateway_public.clone(),
            timeout: Duration::from_secs(config.gateway_timeout_secs),
        })?;

        Ok(Self {
            subscriptions: SubscriptionService::new(
                pool.clone(),
                gateway,
                config.subscription_base_price_minor,
            ),
            webhooks: WebhookHandler::new(config.gateway_webhook_secret.clone()),
            notifications: NotificationQueue::new(pool.clone()),
            invariants: InvariantChecker::new(pool),
        })
    }
}
