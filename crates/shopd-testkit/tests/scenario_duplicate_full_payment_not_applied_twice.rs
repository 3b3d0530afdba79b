//! Scenario: duplicate concurrent transitions on one order commit once.
//!
//! # Invariant under test
//! The order row serializes transition attempts: from any given observed
//! state, at most one commit lands. Two racing `fully_paid` attempts (a
//! duplicate payment webhook, say) must consume the reservation exactly
//! once — the loser re-reads the terminal row and is refused, never
//! double-consuming. The same holds when consume races release: exactly one
//! of the two ever applies for a given reservation.
//!
//! Each round runs a fresh shop so a scheduling fluke in one round cannot
//! mask a double-apply in another.

use shopd_coordinator::{Coordinator, CoordinatorError, Identity};
use shopd_schemas::{OrderStatus, PaymentStatus};
use shopd_testkit::shop_with_stock;
use uuid::Uuid;

const ROUNDS: usize = 25;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Fire the given payment events against one order, all at once, and return
/// (successful orders, refusals).
async fn race_events(
    coordinator: &Coordinator,
    admin: Identity,
    order_id: Uuid,
    events: &[PaymentStatus],
) -> (Vec<shopd_schemas::Order>, Vec<CoordinatorError>) {
    let mut handles = Vec::new();
    for &target in events {
        let coord = coordinator.clone();
        handles.push(tokio::spawn(async move {
            coord.apply_payment(order_id, target, None, &admin).await
        }));
    }

    let mut wins = Vec::new();
    let mut refusals = Vec::new();
    for handle in handles {
        match handle.await.expect("payment task panicked") {
            Ok(order) => wins.push(order),
            Err(err) => refusals.push(err),
        }
    }
    (wins, refusals)
}

// ---------------------------------------------------------------------------
// 1. Two racing full payments consume the reservation once
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn duplicate_full_payments_commit_exactly_once() {
    for _ in 0..ROUNDS {
        let shop = shop_with_stock(5).await.unwrap();
        let order = shop.place(2).await.unwrap();
        shop.advance(order.id).await.unwrap();

        let (wins, refusals) = race_events(
            &shop.coordinator,
            shop.admin,
            order.id,
            &[PaymentStatus::FullyPaid, PaymentStatus::FullyPaid],
        )
        .await;

        assert_eq!(wins.len(), 1, "exactly one duplicate may commit");
        assert_eq!(refusals.len(), 1);
        assert_eq!(wins[0].status, OrderStatus::Completed);
        assert_eq!(wins[0].payment_status, PaymentStatus::FullyPaid);

        // The loser either re-read the terminal row or ran out of commit
        // attempts; both leave the world untouched.
        assert!(
            matches!(
                refusals[0],
                CoordinatorError::OrderTerminal { .. } | CoordinatorError::Conflict { .. }
            ),
            "unexpected refusal: {}",
            refusals[0]
        );

        // Consumed once: stock down by the order's quantity, nothing held.
        assert_eq!(
            shop.counters().await.unwrap(),
            (3, 0),
            "a duplicate must never double-consume"
        );

        let committed = shop
            .coordinator
            .get_order(order.id, &shop.admin)
            .await
            .unwrap();
        assert_eq!(committed.status, OrderStatus::Completed);
        assert!(committed.completed_at.is_some());
    }
}

// ---------------------------------------------------------------------------
// 2. Consume racing release: one resolution, never both
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_full_payment_and_refund_resolve_exactly_once() {
    for _ in 0..ROUNDS {
        let shop = shop_with_stock(5).await.unwrap();
        let order = shop.place(2).await.unwrap();
        shop.advance(order.id).await.unwrap();

        let (wins, refusals) = race_events(
            &shop.coordinator,
            shop.admin,
            order.id,
            &[PaymentStatus::FullyPaid, PaymentStatus::Refunded],
        )
        .await;

        assert_eq!(wins.len(), 1, "consume and release are mutually exclusive");
        assert_eq!(refusals.len(), 1);
        assert!(
            matches!(
                refusals[0],
                CoordinatorError::OrderTerminal { .. } | CoordinatorError::Conflict { .. }
            ),
            "unexpected refusal: {}",
            refusals[0]
        );

        // Whichever won, the counters must tell the same story as the order.
        let counters = shop.counters().await.unwrap();
        match wins[0].payment_status {
            PaymentStatus::FullyPaid => {
                assert_eq!(wins[0].status, OrderStatus::Completed);
                assert_eq!(counters, (3, 0), "consumed: stock down, nothing held");
            }
            PaymentStatus::Refunded => {
                assert_eq!(wins[0].status, OrderStatus::Cancelled);
                assert_eq!(counters, (5, 0), "released: stock intact, nothing held");
            }
            other => panic!("impossible winning payment status: {other:?}"),
        }
    }
}
