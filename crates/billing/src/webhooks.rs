//! Gateway webhook handling
//!
//! Signature-verified event intake from the payment gateway. The signature
//! check runs before any side effect; processing itself is delegated to the
//! idempotent subscription ledger, so duplicate deliveries acknowledge
//! cleanly.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};
use crate::subscriptions::SubscriptionService;

type HmacSha256 = Hmac<Sha256>;

/// Parsed webhook body: `{event, data: {reference, status, ...}}`.
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    pub event: String,
    pub data: WebhookData,
}

#[derive(Debug, Deserialize)]
pub struct WebhookData {
    pub reference: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub metadata: Option<WebhookMetadata>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookMetadata {
    #[serde(default)]
    pub tenant_id: Option<Uuid>,
}

pub struct WebhookHandler {
    webhook_secret: String,
}

impl WebhookHandler {
    pub fn new(webhook_secret: String) -> Self {
        Self { webhook_secret }
    }

    /// Verify the HMAC-SHA256 signature over the raw body.
    ///
    /// Comparison is constant-time; a mismatch reveals nothing about which
    /// prefix byte diverged.
    pub fn verify_signature(&self, payload: &[u8], signature: &str) -> BillingResult<()> {
        if self.webhook_secret.is_empty() {
            tracing::error!("Webhook secret not configured; rejecting event");
            return Err(BillingError::WebhookSignatureInvalid);
        }

        let mut mac = HmacSha256::new_from_slice(self.webhook_secret.as_bytes())
            .map_err(|_| BillingError::WebhookSignatureInvalid)?;
        mac.update(payload);
        let computed = hex::encode(mac.finalize().into_bytes());

        let provided = signature.trim().to_ascii_lowercase();
        if computed.as_bytes().ct_eq(provided.as_bytes()).into() {
            Ok(())
        } else {
            Err(BillingError::WebhookSignatureInvalid)
        }
    }

    /// Parse a verified payload.
    pub fn parse_event(&self, payload: &[u8]) -> BillingResult<WebhookEvent> {
        serde_json::from_slice(payload)
            .map_err(|e| BillingError::InvalidInput(format!("malformed webhook body: {e}")))
    }

    /// Verify, parse, and process in one call. Returns `Ok(())` for
    /// acknowledged events, including duplicates and event types we do not
    /// act on.
    pub async fn handle(
        &self,
        subscriptions: &SubscriptionService,
        payload: &[u8],
        signature: &str,
    ) -> BillingResult<()> {
        self.verify_signature(payload, signature)?;
        let event = self.parse_event(payload)?;

        match event.event.as_str() {
            "charge.success" => {
                // A charge for a checkout we initialized verifies by
                // reference; a recurring auto-renewal charge carries a
                // gateway-minted reference and our tenant in metadata.
                match subscriptions.verify(&event.data.reference).await {
                    Ok(outcome) => {
                        tracing::info!(
                            reference = %event.data.reference,
                            status = outcome.status.as_str(),
                            "Webhook charge processed"
                        );
                        Ok(())
                    }
                    Err(BillingError::InvalidReference) => {
                        let Some(tenant_id) =
                            event.data.metadata.as_ref().and_then(|m| m.tenant_id)
                        else {
                            tracing::warn!(
                                reference = %event.data.reference,
                                "charge.success with unknown reference and no tenant metadata"
                            );
                            return Ok(());
                        };
                        subscriptions
                            .record_renewal(
                                tenant_id,
                                &event.data.reference,
                                event.data.amount.unwrap_or(0),
                            )
                            .await
                    }
                    Err(e) => Err(e),
                }
            }
            other => {
                tracing::debug!(event = other, "Ignoring unhandled webhook event type");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &str, payload: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(payload);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn valid_signature_accepted() {
        let handler = WebhookHandler::new("whsec_test".to_string());
        let body = br#"{"event":"charge.success","data":{"reference":"dkp_a"}}"#;
        let sig = sign("whsec_test", body);
        assert!(handler.verify_signature(body, &sig).is_ok());
    }

    #[test]
    fn tampered_body_rejected() {
        let handler = WebhookHandler::new("whsec_test".to_string());
        let body = br#"{"event":"charge.success","data":{"reference":"dkp_a"}}"#;
        let sig = sign("whsec_test", body);
        let tampered = br#"{"event":"charge.success","data":{"reference":"dkp_b"}}"#;
        assert!(matches!(
            handler.verify_signature(tampered, &sig),
            Err(BillingError::WebhookSignatureInvalid)
        ));
    }

    #[test]
    fn wrong_secret_rejected() {
        let handler = WebhookHandler::new("whsec_test".to_string());
        let body = b"{}";
        let sig = sign("whsec_other", body);
        assert!(handler.verify_signature(body, &sig).is_err());
    }

    #[test]
    fn missing_secret_rejects_everything() {
        let handler = WebhookHandler::new(String::new());
        let body = b"{}";
        let sig = sign("", body);
        assert!(handler.verify_signature(body, &sig).is_err());
    }

    #[test]
    fn signature_case_insensitive() {
        let handler = WebhookHandler::new("whsec_test".to_string());
        let body = b"payload";
        let sig = sign("whsec_test", body).to_ascii_uppercase();
        assert!(handler.verify_signature(body, &sig).is_ok());
    }

    #[test]
    fn event_payload_parses() {
        let handler = WebhookHandler::new("s".to_string());
        let body = br#"{
            "event": "charge.success",
            "data": {
                "reference": "dkp_ref1",
                "status": "success",
                "amount": 3600,
                "metadata": {"tenant_id": "7f8a1f34-5f2b-4c44-9f59-2f6a1d9f0b11"}
            }
        }"#;
        let event = handler.parse_event(body).unwrap();
        assert_eq!(event.event, "charge.success");
        assert_eq!(event.data.reference, "dkp_ref1");
        assert_eq!(event.data.amount, Some(3600));
        assert!(event.data.metadata.unwrap().tenant_id.is_some());
    }

    #[test]
    fn malformed_payload_is_invalid_input() {
        let handler = WebhookHandler::new("s".to_string());
        assert!(matches!(
            handler.parse_event(b"not json"),
            Err(BillingError::InvalidInput(_))
        ));
    }
}
