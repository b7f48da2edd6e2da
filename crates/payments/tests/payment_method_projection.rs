// Test file - these are expected patterns in test code
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

//! Payment-method read-model integration tests
//!
//! Database-backed checks of the projector: upsert convergence across the two
//! attach-shaped event types, idempotent detach, default exclusivity, and the
//! listing sort rule.

mod common;

use sqlx::PgPool;
use time::OffsetDateTime;

use common::*;
use encore_payments::{
    DispatchOutcome, EventPayload, PaymentMethodProjector, PaymentsError, SetupSucceeded,
    WebhookEvent,
};

#[sqlx::test(migrations = "../../migrations")]
async fn attach_creates_read_model_row(pool: PgPool) {
    let user = seed_user(&pool, "fan@example.com", Some("cus_1")).await;

    let dispatcher = dispatcher(StubProvider::empty(), pool.clone());
    let event = attach_event("evt_1", attach_payload("pm_1", "cus_1"));

    let outcome = dispatcher.dispatch(&event).await.unwrap();
    assert!(matches!(
        outcome,
        DispatchOutcome::PaymentMethodUpserted { ref payment_method_id } if payment_method_id == "pm_1"
    ));

    let projector = PaymentMethodProjector::new(pool.clone());
    let methods = projector.list_for_user(user).await.unwrap();
    assert_eq!(methods.len(), 1);
    assert_eq!(methods[0].brand, "visa");
    assert_eq!(methods[0].last4, "4242");
    assert_eq!(methods[0].billing_name.as_deref(), Some("Alex Fan"));
    assert!(!methods[0].is_default);

    assert!(dispatcher.is_event_processed("evt_1").await.unwrap());
}

#[sqlx::test(migrations = "../../migrations")]
async fn attach_for_unknown_customer_is_fatal(pool: PgPool) {
    seed_user(&pool, "fan@example.com", Some("cus_1")).await;

    let dispatcher = dispatcher(StubProvider::empty(), pool.clone());
    let event = attach_event("evt_1", attach_payload("pm_1", "cus_unknown"));

    let err = dispatcher.dispatch(&event).await.unwrap_err();
    assert!(matches!(err, PaymentsError::CustomerNotFound(_)));
    assert!(!err.retryable());

    // Failed handler leaves the event unmarked so a corrected retry can land.
    assert!(!dispatcher.is_event_processed("evt_1").await.unwrap());
    assert_eq!(count(&pool, "payment_methods").await, 0);
}

#[sqlx::test(migrations = "../../migrations")]
async fn setup_and_attach_double_delivery_converge_to_one_row(pool: PgPool) {
    let user = seed_user(&pool, "fan@example.com", Some("cus_1")).await;

    // setup_intent.succeeded carries only the reference; the stub provider
    // resolves it to the same card the attached event carries inline.
    let provider = StubProvider::with_attach(attach_payload("pm_1", "cus_1"));
    let dispatcher = dispatcher(provider, pool.clone());

    let setup = WebhookEvent {
        id: "evt_setup".to_string(),
        payload: EventPayload::SetupSucceeded(SetupSucceeded {
            payment_method_id: "pm_1".to_string(),
        }),
    };
    let attached = attach_event("evt_attach", attach_payload("pm_1", "cus_1"));

    dispatcher.dispatch(&setup).await.unwrap();
    dispatcher.dispatch(&attached).await.unwrap();

    assert_eq!(count(&pool, "payment_methods").await, 1);

    let projector = PaymentMethodProjector::new(pool.clone());
    let methods = projector.list_for_user(user).await.unwrap();
    assert_eq!(methods[0].stripe_payment_method_id, "pm_1");
}

#[sqlx::test(migrations = "../../migrations")]
async fn detach_then_reattach_round_trip(pool: PgPool) {
    seed_user(&pool, "fan@example.com", Some("cus_1")).await;

    let dispatcher = dispatcher(StubProvider::empty(), pool.clone());

    dispatcher
        .dispatch(&attach_event("evt_1", attach_payload("pm_1", "cus_1")))
        .await
        .unwrap();

    // First detach removes the row.
    let outcome = dispatcher
        .dispatch(&detach_event("evt_2", "pm_1"))
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        DispatchOutcome::PaymentMethodRemoved { deleted: true }
    ));

    // A second detach (new event id, same instrument) is a no-op, not an error.
    let outcome = dispatcher
        .dispatch(&detach_event("evt_3", "pm_1"))
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        DispatchOutcome::PaymentMethodRemoved { deleted: false }
    ));

    assert_eq!(count(&pool, "payment_methods").await, 0);

    // Re-attach works after removal.
    dispatcher
        .dispatch(&attach_event("evt_4", attach_payload("pm_1", "cus_1")))
        .await
        .unwrap();
    assert_eq!(count(&pool, "payment_methods").await, 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn set_default_is_exclusive_per_customer(pool: PgPool) {
    let user = seed_user(&pool, "fan@example.com", Some("cus_1")).await;

    let projector = PaymentMethodProjector::new(pool.clone());
    projector
        .upsert_from_attach(&attach_payload("pm_1", "cus_1"), true)
        .await
        .unwrap();
    projector
        .upsert_from_attach(&attach_payload("pm_2", "cus_1"), false)
        .await
        .unwrap();

    let changed = projector
        .set_default_by_customer("cus_1", "pm_2")
        .await
        .unwrap();
    assert_eq!(changed, 2, "previous default cleared, new default set");

    let methods = projector.list_for_user(user).await.unwrap();
    let defaults: Vec<_> = methods.iter().filter(|m| m.is_default).collect();
    assert_eq!(defaults.len(), 1);
    assert_eq!(defaults[0].stripe_payment_method_id, "pm_2");

    // Re-applying the same default touches nothing.
    let changed = projector
        .set_default_by_customer("cus_1", "pm_2")
        .await
        .unwrap();
    assert_eq!(changed, 0);
}

#[sqlx::test(migrations = "../../migrations")]
async fn default_on_attach_displaces_previous_default(pool: PgPool) {
    let user = seed_user(&pool, "fan@example.com", Some("cus_1")).await;

    let projector = PaymentMethodProjector::new(pool.clone());
    projector
        .upsert_from_attach(&attach_payload("pm_1", "cus_1"), true)
        .await
        .unwrap();
    projector
        .upsert_from_attach(&attach_payload("pm_2", "cus_1"), true)
        .await
        .unwrap();

    let methods = projector.list_for_user(user).await.unwrap();
    let defaults: Vec<_> = methods.iter().filter(|m| m.is_default).collect();
    assert_eq!(defaults.len(), 1);
    assert_eq!(defaults[0].stripe_payment_method_id, "pm_2");
}

#[sqlx::test(migrations = "../../migrations")]
async fn listing_sorts_default_first_then_newest(pool: PgPool) {
    let user = seed_user(&pool, "fan@example.com", Some("cus_1")).await;

    let projector = PaymentMethodProjector::new(pool.clone());
    for pm in ["pm_a", "pm_b", "pm_c"] {
        projector
            .upsert_from_attach(&attach_payload(pm, "cus_1"), false)
            .await
            .unwrap();
    }

    // Pin creation times: A oldest, B middle, C newest.
    let base = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
    for (pm, offset) in [("pm_a", 1), ("pm_b", 2), ("pm_c", 3)] {
        sqlx::query(
            "UPDATE payment_methods SET created_at = $1 WHERE stripe_payment_method_id = $2",
        )
        .bind(base + time::Duration::seconds(offset))
        .bind(pm)
        .execute(&pool)
        .await
        .unwrap();
    }

    projector
        .set_default_by_customer("cus_1", "pm_b")
        .await
        .unwrap();

    let methods = projector.list_for_user(user).await.unwrap();
    let order: Vec<_> = methods
        .iter()
        .map(|m| m.stripe_payment_method_id.as_str())
        .collect();
    assert_eq!(order, ["pm_b", "pm_c", "pm_a"]);
}

#[sqlx::test(migrations = "../../migrations")]
async fn customer_update_without_default_is_ignored_but_marked(pool: PgPool) {
    seed_user(&pool, "fan@example.com", Some("cus_1")).await;

    let dispatcher = dispatcher(StubProvider::empty(), pool.clone());
    let event = WebhookEvent {
        id: "evt_1".to_string(),
        payload: EventPayload::CustomerUpdated(encore_payments::CustomerUpdate {
            customer_id: "cus_1".to_string(),
            default_payment_method_id: None,
        }),
    };

    let outcome = dispatcher.dispatch(&event).await.unwrap();
    assert!(matches!(outcome, DispatchOutcome::Ignored { .. }));
    assert!(dispatcher.is_event_processed("evt_1").await.unwrap());
}
