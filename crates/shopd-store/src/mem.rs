//! In-memory [`RowStore`] — deterministic twin of the Postgres backend.
//!
//! Versioning, conditional commits, and field mutability match [`PgStore`]
//! (crate::pg) exactly: scenario tests that pass against `MemStore` pin the
//! same behavior the production store must exhibit. A single `RwLock` write
//! scope stands in for the database transaction.

use std::collections::HashMap;

use anyhow::{bail, Result};
use async_trait::async_trait;
use shopd_schemas::{Order, Product};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    CommitOutcome, OrderFilter, OrderRecord, ProductFilter, ProductRecord, RowStore,
    TransitionCommit,
};

struct Versioned<T> {
    row: T,
    version: i64,
}

#[derive(Default)]
struct MemInner {
    products: HashMap<Uuid, Versioned<Product>>,
    orders: HashMap<Uuid, Versioned<Order>>,
}

/// In-memory store. Not durable; dev mode and tests only.
#[derive(Default)]
pub struct MemStore {
    inner: RwLock<MemInner>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Copy the mutable order fields onto the stored row. Identity and amount
/// fields deliberately never move, mirroring the UPDATE column list in the
/// Postgres store.
fn apply_order_update(stored: &mut Order, updated: &Order) {
    stored.status = updated.status;
    stored.payment_status = updated.payment_status;
    stored.admin_notes = updated.admin_notes.clone();
    stored.verified_at = updated.verified_at;
    stored.paid_at = updated.paid_at;
    stored.completed_at = updated.completed_at;
}

fn matches_product(filter: &ProductFilter, p: &Product) -> bool {
    if let Some(category) = &filter.category {
        if &p.category != category {
            return false;
        }
    }
    if let Some(brand) = &filter.brand {
        if &p.brand != brand {
            return false;
        }
    }
    if let Some(featured) = filter.featured {
        if p.featured != featured {
            return false;
        }
    }
    if let Some(min) = filter.min_price_cents {
        if p.price_cents < min {
            return false;
        }
    }
    if let Some(max) = filter.max_price_cents {
        if p.price_cents > max {
            return false;
        }
    }
    true
}

#[async_trait]
impl RowStore for MemStore {
    async fn insert_product(&self, product: &Product) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.products.contains_key(&product.id) {
            bail!("duplicate product id {}", product.id);
        }
        inner.products.insert(
            product.id,
            Versioned {
                row: product.clone(),
                version: 1,
            },
        );
        Ok(())
    }

    async fn fetch_product(&self, product_id: Uuid) -> Result<Option<ProductRecord>> {
        let inner = self.inner.read().await;
        Ok(inner.products.get(&product_id).map(|v| ProductRecord {
            product: v.row.clone(),
            version: v.version,
        }))
    }

    async fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>> {
        let inner = self.inner.read().await;
        let mut rows: Vec<Product> = inner
            .products
            .values()
            .filter(|v| matches_product(filter, &v.row))
            .map(|v| v.row.clone())
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(rows)
    }

    async fn insert_order(&self, order: &Order) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.orders.contains_key(&order.id) {
            bail!("duplicate order id {}", order.id);
        }
        inner.orders.insert(
            order.id,
            Versioned {
                row: order.clone(),
                version: 1,
            },
        );
        Ok(())
    }

    async fn fetch_order(&self, order_id: Uuid) -> Result<Option<OrderRecord>> {
        let inner = self.inner.read().await;
        Ok(inner.orders.get(&order_id).map(|v| OrderRecord {
            order: v.row.clone(),
            version: v.version,
        }))
    }

    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>> {
        let inner = self.inner.read().await;
        let mut rows: Vec<Order> = inner
            .orders
            .values()
            .filter(|v| match filter.user_id {
                Some(user_id) => v.row.user_id == user_id,
                None => true,
            })
            .map(|v| v.row.clone())
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(rows)
    }

    async fn commit_transition(&self, commit: &TransitionCommit) -> Result<CommitOutcome> {
        let mut inner = self.inner.write().await;

        // Validate every version check before writing anything; a late miss
        // must not leave the earlier row half-applied.
        match inner.orders.get(&commit.order.id) {
            Some(v) if v.version == commit.expected_order_version => {}
            _ => return Ok(CommitOutcome::Conflict),
        }
        if let Some(c) = &commit.counters {
            match inner.products.get(&c.product_id) {
                Some(v) if v.version == c.expected_version => {}
                _ => return Ok(CommitOutcome::Conflict),
            }
        }

        if let Some(v) = inner.orders.get_mut(&commit.order.id) {
            apply_order_update(&mut v.row, &commit.order);
            v.version += 1;
        }
        if let Some(c) = &commit.counters {
            if let Some(v) = inner.products.get_mut(&c.product_id) {
                v.row.stock = c.stock;
                v.row.reserved = c.reserved;
                v.version += 1;
            }
        }

        Ok(CommitOutcome::Committed)
    }

    async fn update_order_notes(
        &self,
        order_id: Uuid,
        expected_version: i64,
        notes: &str,
    ) -> Result<CommitOutcome> {
        let mut inner = self.inner.write().await;
        match inner.orders.get_mut(&order_id) {
            Some(v) if v.version == expected_version => {
                v.row.admin_notes = Some(notes.to_string());
                v.version += 1;
                Ok(CommitOutcome::Committed)
            }
            _ => Ok(CommitOutcome::Conflict),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
