mod common;

use common::{quiet_config, Harness, Reply, ScriptedGateway};
use databundle_store::application::SignalOutcome;
use databundle_store::config::ReconcileConfig;
use databundle_store::domain::aggregates::{OrderRecord, OrderStatus, SignalKind};
use databundle_store::domain::ports::OrderStore;
use databundle_store::StorefrontError;
use std::time::Duration;

#[tokio::test]
async fn test_matching_payment_marks_order_paid() {
    let h = Harness::new(ScriptedGateway::new(Reply::paid(2200)));
    let order = h.pending_order("100200").await;

    let outcome = h.engine.handle_signal(order.tracking_code(), SignalKind::WidgetSuccess).await.unwrap();

    assert_eq!(outcome, SignalOutcome::Settled(OrderStatus::Paid));
    assert_eq!(h.stored_status(&order).await, OrderStatus::Paid);
    assert_eq!(h.store.update_calls(), 1);
    assert!(!h.engine.has_session(order.tracking_code()).await);
}

#[tokio::test]
async fn test_underpayment_fails_order_and_never_marks_it_paid() {
    let h = Harness::new(ScriptedGateway::new(Reply::paid(2000)));
    let order = h.pending_order("100201").await;

    let outcome = h.engine.handle_signal(order.tracking_code(), SignalKind::WidgetSuccess).await.unwrap();
    assert_eq!(outcome, SignalOutcome::Settled(OrderStatus::Failed));

    let later = h.engine.handle_signal(order.tracking_code(), SignalKind::ManualConfirmation).await.unwrap();
    assert_eq!(later, SignalOutcome::AlreadySettled(OrderStatus::Failed));
    assert_eq!(h.stored_status(&order).await, OrderStatus::Failed);
    assert_eq!(h.store.update_calls(), 1);
}

#[tokio::test]
async fn test_currency_mismatch_fails_order() {
    let h = Harness::new(ScriptedGateway::new(Reply::Status("success", 2200, "NGN")));
    let order = h.pending_order("100202").await;

    let outcome = h.engine.handle_signal(order.tracking_code(), SignalKind::Webhook).await.unwrap();
    assert_eq!(outcome, SignalOutcome::Settled(OrderStatus::Failed));
}

#[tokio::test]
async fn test_gateway_decline_cancels_order() {
    let h = Harness::new(ScriptedGateway::new(Reply::Status("failed", 2200, "GHS")));
    let order = h.pending_order("100203").await;

    let outcome = h.engine.handle_signal(order.tracking_code(), SignalKind::WidgetClosed).await.unwrap();
    assert_eq!(outcome, SignalOutcome::Settled(OrderStatus::Cancelled));
    assert_eq!(h.stored_status(&order).await, OrderStatus::Cancelled);
}

#[tokio::test]
async fn test_close_and_success_racing_produce_one_write() {
    let h = Harness::new(ScriptedGateway::new(Reply::paid(2200)).with_delay(Duration::from_millis(50)));
    let order = h.pending_order("100204").await;
    let code = order.tracking_code();

    let (closed, success) = tokio::join!(
        h.engine.handle_signal(code, SignalKind::WidgetClosed),
        h.engine.handle_signal(code, SignalKind::WidgetSuccess),
    );

    let mut outcomes = vec![closed.unwrap(), success.unwrap()];
    outcomes.sort_by_key(|o| matches!(o, SignalOutcome::Settled(_)));
    assert_eq!(outcomes, vec![SignalOutcome::Coalesced, SignalOutcome::Settled(OrderStatus::Paid)]);
    assert_eq!(h.store.update_calls(), 1);
    assert_eq!(h.gateway.verify_calls(), 1);
    assert_eq!(h.stored_status(&order).await, OrderStatus::Paid);
}

#[tokio::test]
async fn test_many_concurrent_signals_apply_at_most_one_change() {
    let h = Harness::new(ScriptedGateway::new(Reply::paid(2200)).with_delay(Duration::from_millis(20)));
    let order = h.pending_order("100205").await;

    let signals = [
        SignalKind::WidgetSuccess, SignalKind::Poll, SignalKind::Webhook, SignalKind::PageReturn,
        SignalKind::ManualConfirmation, SignalKind::Poll,
    ];
    let mut tasks = Vec::new();
    for signal in signals {
        let engine = h.engine.clone();
        let code = order.tracking_code().clone();
        tasks.push(tokio::spawn(async move { engine.handle_signal(&code, signal).await }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(h.store.update_calls(), 1);
    assert_eq!(h.stored_status(&order).await, OrderStatus::Paid);
}

#[tokio::test]
async fn test_repeated_signals_after_settlement_are_dropped() {
    let h = Harness::new(ScriptedGateway::new(Reply::paid(2200)));
    let order = h.pending_order("100206").await;

    h.engine.handle_signal(order.tracking_code(), SignalKind::WidgetSuccess).await.unwrap();
    for signal in [SignalKind::Poll, SignalKind::PageReturn, SignalKind::Webhook, SignalKind::ManualConfirmation] {
        let outcome = h.engine.handle_signal(order.tracking_code(), signal).await.unwrap();
        assert_eq!(outcome, SignalOutcome::AlreadySettled(OrderStatus::Paid));
    }
    assert_eq!(h.store.update_calls(), 1);
    assert_eq!(h.gateway.verify_calls(), 1);
}

#[tokio::test]
async fn test_indeterminate_twice_awaits_manual_confirmation() {
    let gateway = ScriptedGateway::new(Reply::paid(2200)).then([Reply::Transport, Reply::Transport]);
    let h = Harness::new(gateway);
    let order = h.pending_order("100207").await;
    let code = order.tracking_code();

    assert_eq!(h.engine.handle_signal(code, SignalKind::WidgetSuccess).await.unwrap(), SignalOutcome::RetryScheduled);
    assert_eq!(h.engine.handle_signal(code, SignalKind::FallbackTimer).await.unwrap(), SignalOutcome::PendingManualVerification);

    // Further automatic signals do not reach the gateway.
    assert_eq!(h.engine.handle_signal(code, SignalKind::Poll).await.unwrap(), SignalOutcome::PendingManualVerification);
    assert_eq!(h.gateway.verify_calls(), 2);
    assert_eq!(h.stored_status(&order).await, OrderStatus::Pending);
    assert_eq!(h.store.update_calls(), 0);

    let manual = h.engine.handle_signal(code, SignalKind::ManualConfirmation).await.unwrap();
    assert_eq!(manual, SignalOutcome::Settled(OrderStatus::Paid));
}

#[tokio::test]
async fn test_unsettled_payment_is_rechecked_by_fallback_timer() {
    let gateway = ScriptedGateway::new(Reply::paid(2200)).then([Reply::Status("ongoing", 2200, "GHS")]);
    let config = ReconcileConfig { retry_delay: Duration::from_millis(20), ..quiet_config() };
    let h = Harness::with_config(gateway, config);
    let order = h.pending_order("100208").await;

    let first = h.engine.handle_signal(order.tracking_code(), SignalKind::WidgetClosed).await.unwrap();
    assert_eq!(first, SignalOutcome::RetryScheduled);

    let mut status = OrderStatus::Pending;
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        status = h.stored_status(&order).await;
        if status != OrderStatus::Pending {
            break;
        }
    }
    assert_eq!(status, OrderStatus::Paid);
    assert_eq!(h.gateway.verify_calls(), 2);
}

#[tokio::test]
async fn test_unknown_reference_is_not_a_decline() {
    let gateway = ScriptedGateway::new(Reply::paid(2200)).then([Reply::UnknownReference]);
    let h = Harness::new(gateway);
    let order = h.pending_order("100209").await;

    let outcome = h.engine.handle_signal(order.tracking_code(), SignalKind::PageReturn).await.unwrap();
    assert_eq!(outcome, SignalOutcome::RetryScheduled);
    assert_eq!(h.stored_status(&order).await, OrderStatus::Pending);
}

#[tokio::test]
async fn test_failed_write_is_retried_without_reverifying() {
    let h = Harness::new(ScriptedGateway::new(Reply::paid(2200)));
    let order = h.pending_order("100210").await;
    h.store.fail_next_updates(1);

    let err = h.engine.handle_signal(order.tracking_code(), SignalKind::WidgetSuccess).await.unwrap_err();
    assert_eq!(err, StorefrontError::StoreUnavailable);
    assert_eq!(h.stored_status(&order).await, OrderStatus::Pending);

    let retried = h.engine.handle_signal(order.tracking_code(), SignalKind::Poll).await.unwrap();
    assert_eq!(retried, SignalOutcome::Settled(OrderStatus::Paid));
    assert_eq!(h.gateway.verify_calls(), 1);
    assert_eq!(h.store.update_calls(), 2);
}

#[tokio::test]
async fn test_terminal_orders_ignore_late_confirmation() {
    let h = Harness::new(ScriptedGateway::new(Reply::paid(2200)));
    let order = h.pending_order("100211").await;

    h.engine.admin_transition(order.id(), OrderStatus::Cancelled).await.unwrap();
    let outcome = h.engine.handle_signal(order.tracking_code(), SignalKind::Webhook).await.unwrap();

    assert_eq!(outcome, SignalOutcome::AlreadySettled(OrderStatus::Cancelled));
    assert_eq!(h.stored_status(&order).await, OrderStatus::Cancelled);
    assert_eq!(h.store.update_calls(), 1);
}

#[tokio::test]
async fn test_failed_order_cannot_be_marked_paid_by_admin() {
    let h = Harness::new(ScriptedGateway::new(Reply::paid(1000)));
    let order = h.pending_order("100212").await;
    h.engine.handle_signal(order.tracking_code(), SignalKind::WidgetSuccess).await.unwrap();

    let err = h.engine.admin_transition(order.id(), OrderStatus::Paid).await.unwrap_err();
    assert!(matches!(err, StorefrontError::InvalidTransition { from: OrderStatus::Failed, to: OrderStatus::Paid, .. }));
}

#[tokio::test]
async fn test_admin_walks_order_through_fulfilment() {
    let h = Harness::new(ScriptedGateway::new(Reply::paid(2200)));
    let order = h.pending_order("100213").await;
    h.engine.handle_signal(order.tracking_code(), SignalKind::WidgetSuccess).await.unwrap();

    let processing = h.engine.admin_transition(order.id(), OrderStatus::Processing).await.unwrap();
    assert_eq!(processing.status(), OrderStatus::Processing);
    let fulfilled = h.engine.admin_transition(order.id(), OrderStatus::Fulfilled).await.unwrap();
    assert_eq!(fulfilled.status(), OrderStatus::Fulfilled);

    // Same-status request is a no-op, not a write.
    let before = h.store.update_calls();
    h.engine.admin_transition(order.id(), OrderStatus::Fulfilled).await.unwrap();
    assert_eq!(h.store.update_calls(), before);
}

#[tokio::test]
async fn test_session_resumes_after_restart() {
    let h = Harness::new(ScriptedGateway::new(Reply::paid(2200)));
    let order = h.pending_order("100214").await;

    // A second engine over the same store has no sessions, like after a restart.
    let restarted = Harness::new(ScriptedGateway::new(Reply::paid(2200)));
    let stored = restarted.store.create_order(h.store.find_by_id(order.id()).await.unwrap().unwrap()).await.unwrap();
    assert!(!restarted.engine.has_session(stored.tracking_code()).await);

    let outcome = restarted.engine.handle_signal(stored.tracking_code(), SignalKind::PageReturn).await.unwrap();
    assert_eq!(outcome, SignalOutcome::Settled(OrderStatus::Paid));
}

#[tokio::test]
async fn test_store_round_trip_keeps_order_snapshot_through_status_changes() {
    let h = Harness::new(ScriptedGateway::new(Reply::paid(2200)));
    let order = h.pending_order("100215").await;

    let assert_snapshot = |found: &OrderRecord, status: OrderStatus| {
        assert_eq!(found.id(), order.id());
        assert_eq!(found.tracking_code(), order.tracking_code());
        assert_eq!(found.package_name(), "5GB MTN");
        assert_eq!(found.quantity_gb(), 5);
        assert_eq!(found.price(), order.price());
        assert_eq!(found.customer_contact(), order.customer_contact());
        assert_eq!(found.status(), status);
    };

    let found = h.store.find_by_tracking_code(order.tracking_code()).await.unwrap().unwrap();
    assert_snapshot(&found, OrderStatus::Pending);

    h.engine.handle_signal(order.tracking_code(), SignalKind::WidgetSuccess).await.unwrap();
    let found = h.store.find_by_tracking_code(order.tracking_code()).await.unwrap().unwrap();
    assert_snapshot(&found, OrderStatus::Paid);

    for status in [OrderStatus::Processing, OrderStatus::Cancelled] {
        h.engine.admin_transition(order.id(), status).await.unwrap();
        let found = h.store.find_by_tracking_code(order.tracking_code()).await.unwrap().unwrap();
        assert_snapshot(&found, status);
    }
}

#[tokio::test]
async fn test_unwritten_outcome_expires_and_is_verified_again() {
    let config = ReconcileConfig { session_ttl: Duration::ZERO, ..quiet_config() };
    let h = Harness::with_config(ScriptedGateway::new(Reply::paid(2200)), config);
    let order = h.pending_order("100216").await;
    h.store.fail_next_updates(1);

    let err = h.engine.handle_signal(order.tracking_code(), SignalKind::WidgetSuccess).await.unwrap_err();
    assert_eq!(err, StorefrontError::StoreUnavailable);

    tokio::time::sleep(Duration::from_millis(5)).await;
    assert_eq!(h.engine.expire_stale_sessions().await, 1);
    assert!(!h.engine.has_session(order.tracking_code()).await);
    assert_eq!(h.stored_status(&order).await, OrderStatus::Pending);

    let outcome = h.engine.handle_signal(order.tracking_code(), SignalKind::PageReturn).await.unwrap();
    assert_eq!(outcome, SignalOutcome::Settled(OrderStatus::Paid));
    assert_eq!(h.gateway.verify_calls(), 2);
    assert_eq!(h.store.update_calls(), 2);
}
