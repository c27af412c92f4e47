// Test file - these are expected patterns in test code
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

//! Edge Case Tests for the Billing System
//!
//! Boundary conditions in:
//! - Cycle pricing and the 80% additional-branch rate
//! - Pro-rata math at period boundaries
//! - VAT extraction interplay with subscription amounts
//! - Webhook signature handling

#[cfg(test)]
mod pricing_edge_tests {
    use crate::pricing::*;
    use dukapo_shared::BillingCycle;

    const BASE: i64 = 2000;

    // =========================================================================
    // Pro-rata at the very start of a period - full per-branch price
    // =========================================================================
    #[test]
    fn prorata_on_day_zero_is_full_price() {
        let per_branch = per_branch_price_minor(BASE, BillingCycle::Monthly);
        assert_eq!(prorata_minor(per_branch, 30, 30).unwrap(), per_branch);
    }

    // =========================================================================
    // Pro-rata on the final day - one day's worth
    // =========================================================================
    #[test]
    fn prorata_on_final_day() {
        // 1600 / 30 = 53.33 -> 53
        assert_eq!(prorata_minor(1600, 1, 30).unwrap(), 53);
    }

    // =========================================================================
    // Pro-rata rounding uses banker's rounding
    // =========================================================================
    #[test]
    fn prorata_midpoint_rounds_to_even() {
        // 1500 * 15 / 30 = 750 exactly; 25 * 3 / 10 = 7.5 -> 8 (even)
        assert_eq!(prorata_minor(1500, 15, 30).unwrap(), 750);
        assert_eq!(prorata_minor(25, 3, 10).unwrap(), 8);
        // 15 * 1 / 2 = 7.5 -> 8; 5 * 1 / 2 = 2.5 -> 2
        assert_eq!(prorata_minor(15, 1, 2).unwrap(), 8);
        assert_eq!(prorata_minor(5, 1, 2).unwrap(), 2);
    }

    // =========================================================================
    // Annual cycle with many branches
    // =========================================================================
    #[test]
    fn annual_total_with_ten_branches() {
        // base 20000 + 9 * 16000 = 164000
        assert_eq!(
            cycle_total_minor(BASE, BillingCycle::Annual, 10).unwrap(),
            164_000
        );
    }

    // =========================================================================
    // Main location alone carries no discount
    // =========================================================================
    #[test]
    fn single_location_pays_full_base() {
        for cycle in [
            BillingCycle::Monthly,
            BillingCycle::SemiAnnual,
            BillingCycle::Annual,
        ] {
            assert_eq!(
                cycle_total_minor(BASE, cycle, 1).unwrap(),
                cycle_base_minor(BASE, cycle)
            );
        }
    }

    // =========================================================================
    // Odd base prices keep the 80% rate exact where possible
    // =========================================================================
    #[test]
    fn odd_base_price_rounds_per_branch() {
        // 2499 * 0.8 = 1999.2 -> 1999
        assert_eq!(per_branch_price_minor(2499, BillingCycle::Monthly), 1999);
        // 2505 * 0.8 = 2004 exactly
        assert_eq!(per_branch_price_minor(2505, BillingCycle::Monthly), 2004);
    }
}

#[cfg(test)]
mod vat_edge_tests {
    use dukapo_shared::vat_breakdown;
    use rust_decimal_macros::dec;

    // =========================================================================
    // One minor unit still decomposes losslessly
    // =========================================================================
    #[test]
    fn single_minor_unit() {
        let b = vat_breakdown(1, dec!(0.16)).unwrap();
        assert_eq!(b.subtotal_minor + b.tax_minor, 1);
        assert!(b.tax_minor >= 0);
    }

    // =========================================================================
    // Tax component is monotonic in the total
    // =========================================================================
    #[test]
    fn tax_grows_with_total() {
        let mut last_tax = -1;
        for total in (0..5000).step_by(37) {
            let b = vat_breakdown(total, dec!(0.16)).unwrap();
            assert!(b.tax_minor >= last_tax - 1, "tax regressed at {total}");
            last_tax = b.tax_minor;
        }
    }

    // =========================================================================
    // High tax rates stay consistent
    // =========================================================================
    #[test]
    fn high_rate_consistency() {
        let b = vat_breakdown(100_000, dec!(0.25)).unwrap();
        assert_eq!(b.subtotal_minor, 80_000);
        assert_eq!(b.tax_minor, 20_000);
    }
}

#[cfg(test)]
mod webhook_edge_tests {
    use crate::error::BillingError;
    use crate::webhooks::WebhookHandler;
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    fn sign(secret: &str, payload: &[u8]) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(payload);
        hex::encode(mac.finalize().into_bytes())
    }

    // =========================================================================
    // Empty body still signature-checks
    // =========================================================================
    #[test]
    fn empty_body_signs_and_verifies() {
        let handler = WebhookHandler::new("secret".to_string());
        let sig = sign("secret", b"");
        assert!(handler.verify_signature(b"", &sig).is_ok());
    }

    // =========================================================================
    // Garbage signature strings never panic, always reject
    // =========================================================================
    #[test]
    fn garbage_signatures_rejected() {
        let handler = WebhookHandler::new("secret".to_string());
        for sig in ["", "zz", "not-hex-at-all", "deadbeef"] {
            assert!(matches!(
                handler.verify_signature(b"payload", sig),
                Err(BillingError::WebhookSignatureInvalid)
            ));
        }
    }

    // =========================================================================
    // Truncated valid signature rejected
    // =========================================================================
    #[test]
    fn truncated_signature_rejected() {
        let handler = WebhookHandler::new("secret".to_string());
        let sig = sign("secret", b"payload");
        let truncated = &sig[..sig.len() - 2];
        assert!(handler.verify_signature(b"payload", truncated).is_err());
    }

    // =========================================================================
    // Unknown event types parse and are ignorable
    // =========================================================================
    #[test]
    fn unknown_event_type_parses() {
        let handler = WebhookHandler::new("s".to_string());
        let body = br#"{"event":"transfer.success","data":{"reference":"x"}}"#;
        let event = handler.parse_event(body).unwrap();
        assert_eq!(event.event, "transfer.success");
    }

    // =========================================================================
    // Events without optional fields parse
    // =========================================================================
    #[test]
    fn minimal_event_parses() {
        let handler = WebhookHandler::new("s".to_string());
        let body = br#"{"event":"charge.success","data":{"reference":"dkp_1"}}"#;
        let event = handler.parse_event(body).unwrap();
        assert!(event.data.status.is_none());
        assert!(event.data.amount.is_none());
        assert!(event.data.metadata.is_none());
    }
}
