//! Conflict injection at the store seam.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use shopd_schemas::{Order, Product};
use shopd_store::{
    CommitOutcome, OrderFilter, OrderRecord, ProductFilter, ProductRecord, RowStore,
    TransitionCommit,
};
use uuid::Uuid;

/// [`RowStore`] wrapper that reports [`CommitOutcome::Conflict`] for the
/// first `n` conditional commits without applying them, then delegates to
/// the wrapped store. Reads and inserts always pass straight through.
///
/// With `n = 0` it is a pure pass-through that still counts commit calls,
/// which is enough to show that a refusal never reached the store.
pub struct FlakyStore {
    inner: Arc<dyn RowStore>,
    forced_conflicts: AtomicU32,
    commit_calls: AtomicU32,
}

impl FlakyStore {
    pub fn conflicts(inner: Arc<dyn RowStore>, n: u32) -> Self {
        Self {
            inner,
            forced_conflicts: AtomicU32::new(n),
            commit_calls: AtomicU32::new(0),
        }
    }

    /// How many conditional commits reached this store, forced or real.
    pub fn commit_calls(&self) -> u32 {
        self.commit_calls.load(Ordering::SeqCst)
    }
}

/// Decrement-if-positive. A plain `fetch_sub` would wrap through `u32::MAX`
/// once the forced conflicts are used up.
fn claim_forced(remaining: &AtomicU32) -> bool {
    remaining
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl RowStore for FlakyStore {
    async fn insert_product(&self, product: &Product) -> Result<()> {
        self.inner.insert_product(product).await
    }

    async fn fetch_product(&self, product_id: Uuid) -> Result<Option<ProductRecord>> {
        self.inner.fetch_product(product_id).await
    }

    async fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>> {
        self.inner.list_products(filter).await
    }

    async fn insert_order(&self, order: &Order) -> Result<()> {
        self.inner.insert_order(order).await
    }

    async fn fetch_order(&self, order_id: Uuid) -> Result<Option<OrderRecord>> {
        self.inner.fetch_order(order_id).await
    }

    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>> {
        self.inner.list_orders(filter).await
    }

    async fn commit_transition(&self, commit: &TransitionCommit) -> Result<CommitOutcome> {
        self.commit_calls.fetch_add(1, Ordering::SeqCst);
        if claim_forced(&self.forced_conflicts) {
            return Ok(CommitOutcome::Conflict);
        }
        self.inner.commit_transition(commit).await
    }

    async fn update_order_notes(
        &self,
        order_id: Uuid,
        expected_version: i64,
        notes: &str,
    ) -> Result<CommitOutcome> {
        self.commit_calls.fetch_add(1, Ordering::SeqCst);
        if claim_forced(&self.forced_conflicts) {
            return Ok(CommitOutcome::Conflict);
        }
        self.inner
            .update_order_notes(order_id, expected_version, notes)
            .await
    }
}
