//! Payment gateway client
//!
//! Thin HTTP adapter over the external redirect gateway: initialize a
//! transaction (returns the URL the customer is sent to) and verify a
//! transaction by reference. The gateway never sees card data from us and
//! we never see it from the gateway; the reference string is the only
//! shared identifier.
//!
//! Every call has its own timeout, deliberately shorter than the request
//! deadline: a timed-out verify leaves the transaction `pending` and the
//! next verify completes it.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BillingError, BillingResult};

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    /// Secret key; sent as a bearer credential.
    pub secret_key: String,
    /// Public (client-side) key; surfaced to the UI, never used here.
    pub public_key: String,
    pub timeout: Duration,
}

#[derive(Clone)]
pub struct GatewayClient {
    http: reqwest::Client,
    config: GatewayConfig,
}

/// Outcome of `POST /transaction/initialize`.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayInitialization {
    pub authorization_url: String,
    pub reference: String,
}

/// Outcome of `GET /transaction/verify/{reference}`.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayVerification {
    pub status: String,
    pub reference: String,
    /// Token reusable for recurring charges when the customer opted in.
    pub authorization_code: Option<String>,
}

impl GatewayVerification {
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

#[derive(Debug, Serialize)]
struct InitializeRequest<'a> {
    reference: &'a str,
    amount: i64,
    currency: &'a str,
    email: &'a str,
    metadata: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: bool,
    message: Option<String>,
    data: Option<T>,
}

impl GatewayClient {
    pub fn new(config: GatewayConfig) -> BillingResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| BillingError::Gateway(e.to_string()))?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Create a transaction on the gateway and return the redirect URL.
    pub async fn initialize_transaction(
        &self,
        reference: &str,
        amount_minor: i64,
        currency: &str,
        email: &str,
        metadata: serde_json::Value,
    ) -> BillingResult<GatewayInitialization> {
        let url = format!("{}/transaction/initialize", self.config.base_url);
        let body = InitializeRequest {
            reference,
            amount: amount_minor,
            currency,
            email,
            metadata,
        };

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.secret_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| BillingError::Gateway(e.to_string()))?;

        let envelope: Envelope<GatewayInitialization> = response
            .error_for_status()
            .map_err(|e| BillingError::Gateway(e.to_string()))?
            .json()
            .await
            .map_err(|e| BillingError::Gateway(e.to_string()))?;

        match envelope {
            Envelope {
                status: true,
                data: Some(data),
                ..
            } => Ok(data),
            Envelope { message, .. } => Err(BillingError::Gateway(
                message.unwrap_or_else(|| "initialize rejected".to_string()),
            )),
        }
    }

    /// Ask the gateway for the authoritative state of a transaction.
    pub async fn verify_transaction(&self, reference: &str) -> BillingResult<GatewayVerification> {
        let url = format!("{}/transaction/verify/{reference}", self.config.base_url);

        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.config.secret_key)
            .send()
            .await
            .map_err(|e| BillingError::Gateway(e.to_string()))?;

        let envelope: Envelope<GatewayVerification> = response
            .error_for_status()
            .map_err(|e| BillingError::Gateway(e.to_string()))?
            .json()
            .await
            .map_err(|e| BillingError::Gateway(e.to_string()))?;

        match envelope {
            Envelope {
                status: true,
                data: Some(data),
                ..
            } => Ok(data),
            Envelope { message, .. } => Err(BillingError::Gateway(
                message.unwrap_or_else(|| "verify rejected".to_string()),
            )),
        }
    }
}

/// Generate an externally-visible transaction reference.
pub fn new_reference() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let suffix: String = (0..16)
        .map(|_| {
            let chars = b"abcdefghijklmnopqrstuvwxyz0123456789";
            chars[rng.gen_range(0..chars.len())] as char
        })
        .collect();
    format!("dkp_{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client(base_url: String) -> GatewayClient {
        GatewayClient::new(GatewayConfig {
            base_url,
            secret_key: "sk_test".to_string(),
            public_key: "pk_test".to_string(),
            timeout: Duration::from_secs(2),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn initialize_returns_redirect_url() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/transaction/initialize")
            .match_header("authorization", "Bearer sk_test")
            .with_status(200)
            .with_body(
                r#"{"status":true,"message":"ok","data":{"authorization_url":"https://pay.example/abc","reference":"dkp_x1"}}"#,
            )
            .create_async()
            .await;

        let client = test_client(server.url());
        let init = client
            .initialize_transaction("dkp_x1", 3600, "KES", "owner@example.com", serde_json::json!({}))
            .await
            .unwrap();

        assert_eq!(init.authorization_url, "https://pay.example/abc");
        assert_eq!(init.reference, "dkp_x1");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn verify_parses_success() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/transaction/verify/dkp_x1")
            .with_status(200)
            .with_body(
                r#"{"status":true,"data":{"status":"success","reference":"dkp_x1","authorization_code":"AUTH_9"}}"#,
            )
            .create_async()
            .await;

        let client = test_client(server.url());
        let v = client.verify_transaction("dkp_x1").await.unwrap();
        assert!(v.is_success());
        assert_eq!(v.authorization_code.as_deref(), Some("AUTH_9"));
    }

    #[tokio::test]
    async fn verify_parses_failure_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/transaction/verify/dkp_bad")
            .with_status(200)
            .with_body(
                r#"{"status":true,"data":{"status":"failed","reference":"dkp_bad","authorization_code":null}}"#,
            )
            .create_async()
            .await;

        let client = test_client(server.url());
        let v = client.verify_transaction("dkp_bad").await.unwrap();
        assert!(!v.is_success());
    }

    #[tokio::test]
    async fn http_error_maps_to_gateway_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/transaction/verify/dkp_x1")
            .with_status(503)
            .create_async()
            .await;

        let client = test_client(server.url());
        let err = client.verify_transaction("dkp_x1").await.unwrap_err();
        assert!(matches!(err, BillingError::Gateway(_)));
    }

    #[test]
    fn references_are_prefixed_and_unique() {
        let a = new_reference();
        let b = new_reference();
        assert!(a.starts_with("dkp_"));
        assert_eq!(a.len(), 20);
        assert_ne!(a, b);
    }
}
