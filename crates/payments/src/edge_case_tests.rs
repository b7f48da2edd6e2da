// Test file - these are expected patterns in test code
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

//! Edge Case Tests for the Payments Pipeline
//!
//! Tests boundary conditions that need no database:
//! - Webhook signature verification (PAY-W01 to PAY-W05)
//! - Error taxonomy / retry classification (PAY-E01 to PAY-E04)
//! - Dispatch outcomes (PAY-D01 to PAY-D02)

#[cfg(test)]
mod signature_tests {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    use crate::error::PaymentsError;
    use crate::webhooks::verify_with_secret;

    const SECRET: &str = "whsec_test_secret";

    fn sign(payload: &str, timestamp: i64) -> String {
        let key = SECRET.strip_prefix("whsec_").unwrap();
        let mut mac = Hmac::<Sha256>::new_from_slice(key.as_bytes()).unwrap();
        mac.update(format!("{}.{}", timestamp, payload).as_bytes());
        let sig = hex::encode(mac.finalize().into_bytes());
        format!("t={},v1={}", timestamp, sig)
    }

    fn now() -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64
    }

    // =========================================================================
    // PAY-W01: Header without a timestamp - rejected
    // =========================================================================
    #[test]
    fn test_missing_timestamp_rejected() {
        let err = verify_with_secret("{}", "v1=deadbeef", SECRET).unwrap_err();
        assert!(matches!(err, PaymentsError::WebhookSignatureInvalid));
    }

    // =========================================================================
    // PAY-W02: Header without a v1 signature - rejected
    // =========================================================================
    #[test]
    fn test_missing_v1_signature_rejected() {
        let header = format!("t={}", now());
        let err = verify_with_secret("{}", &header, SECRET).unwrap_err();
        assert!(matches!(err, PaymentsError::WebhookSignatureInvalid));
    }

    // =========================================================================
    // PAY-W03: Timestamp older than the 5-minute tolerance - rejected even
    // with a valid signature
    // =========================================================================
    #[test]
    fn test_stale_timestamp_rejected() {
        let stale = now() - 600;
        let header = sign("{}", stale);
        let err = verify_with_secret("{}", &header, SECRET).unwrap_err();
        assert!(matches!(err, PaymentsError::WebhookSignatureInvalid));
    }

    // =========================================================================
    // PAY-W04: Wrong signature with a fresh timestamp - rejected
    // =========================================================================
    #[test]
    fn test_wrong_signature_rejected() {
        let header = format!("t={},v1={}", now(), "0".repeat(64));
        let err = verify_with_secret("{}", &header, SECRET).unwrap_err();
        assert!(matches!(err, PaymentsError::WebhookSignatureInvalid));
    }

    // =========================================================================
    // PAY-W05: Tampered payload - signature over the original no longer
    // matches
    // =========================================================================
    #[test]
    fn test_tampered_payload_rejected() {
        let header = sign("{\"amount\":999}", now());
        let err = verify_with_secret("{\"amount\":1}", &header, SECRET).unwrap_err();
        assert!(matches!(err, PaymentsError::WebhookSignatureInvalid));
    }
}

#[cfg(test)]
mod error_taxonomy_tests {
    use uuid::Uuid;

    use crate::error::PaymentsError;

    // =========================================================================
    // PAY-E01: Transient failures are retryable
    // =========================================================================
    #[test]
    fn test_transient_failures_retryable() {
        assert!(PaymentsError::Database("connection reset".to_string()).retryable());
        assert!(PaymentsError::StripeApi("503".to_string()).retryable());
    }

    // =========================================================================
    // PAY-E02: A lost duplicate-delivery race is retryable - the retry finds
    // the winner's result and converges
    // =========================================================================
    #[test]
    fn test_duplicate_event_retryable() {
        assert!(PaymentsError::DuplicateEvent("evt_1".to_string()).retryable());
    }

    // =========================================================================
    // PAY-E03: Fatal input errors are not retryable - redelivery cannot fix
    // bad metadata or a missing deliverable
    // =========================================================================
    #[test]
    fn test_fatal_input_not_retryable() {
        let product_id = Uuid::new_v4();
        assert!(!PaymentsError::UnsupportedEvent("invoice.paid".to_string()).retryable());
        assert!(!PaymentsError::MissingMetadata("fan_user_id".to_string()).retryable());
        assert!(!PaymentsError::InvalidInput("bad uuid".to_string()).retryable());
        assert!(!PaymentsError::ProductNotFound(product_id).retryable());
        assert!(!PaymentsError::MissingFileReference(product_id).retryable());
        assert!(!PaymentsError::CustomerNotFound("cus_1".to_string()).retryable());
    }

    // =========================================================================
    // PAY-E04: Consistency faults page an operator instead of retrying
    // =========================================================================
    #[test]
    fn test_consistency_fault_not_retryable() {
        assert!(!PaymentsError::ConsistencyFault("ledger/order divergence".to_string())
            .retryable());
    }
}

#[cfg(test)]
mod dispatch_outcome_tests {
    use crate::webhooks::DispatchOutcome;

    // =========================================================================
    // PAY-D01: Only the no-op outcome reports already_processed
    // =========================================================================
    #[test]
    fn test_already_processed_flag() {
        let dup = DispatchOutcome::AlreadyProcessed {
            event_id: "evt_1".to_string(),
        };
        assert!(dup.already_processed());

        let removed = DispatchOutcome::PaymentMethodRemoved { deleted: false };
        assert!(!removed.already_processed());
    }

    // =========================================================================
    // PAY-D02: Outcomes serialize with a stable result tag for the HTTP
    // receipt
    // =========================================================================
    #[test]
    fn test_outcome_serialization_tag() {
        let outcome = DispatchOutcome::PaymentMethodRemoved { deleted: true };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["result"], "payment_method_removed");
        assert_eq!(json["deleted"], true);
    }
}
