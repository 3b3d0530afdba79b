//! Row store seam.
//!
//! # Contract
//!
//! [`RowStore`] is the only persistence surface the coordinator sees. Two
//! implementations exist and must behave identically:
//!
//! - [`MemStore`] — in-memory, used in dev mode and by the scenario tests.
//! - [`PgStore`] — PostgreSQL via sqlx; the production backend.
//!
//! Every row carries a `row_version`, incremented on each committed update.
//! Mutations are **conditional** on the version observed at read time:
//! [`RowStore::commit_transition`] applies one updated order row plus, when
//! the transition carries a ledger effect, one product counter update — both
//! or neither, returning [`CommitOutcome::Conflict`] when any version check
//! misses. That conditional two-row commit is what turns the coordinator's
//! read-decide-commit sequence into an atomic read-modify-write.
//!
//! The store never interprets domain rules: callers hand it fully computed
//! rows. Infrastructure failures surface as `anyhow::Error`; version misses
//! are an expected outcome, not an error.

use anyhow::Result;
use async_trait::async_trait;
use shopd_schemas::{Order, Product};
use uuid::Uuid;

mod mem;
mod pg;

pub use mem::MemStore;
pub use pg::{PgStore, PgStoreStatus, ENV_DB_URL};

/// A product row plus the version stamp to condition updates on.
#[derive(Debug, Clone)]
pub struct ProductRecord {
    pub product: Product,
    pub version: i64,
}

/// An order row plus the version stamp to condition updates on.
#[derive(Debug, Clone)]
pub struct OrderRecord {
    pub order: Order,
    pub version: i64,
}

/// Outcome of a conditional commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// All version checks passed; every row in the commit is applied.
    Committed,
    /// Some row moved (or vanished) since it was read; nothing is applied.
    Conflict,
}

impl CommitOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, CommitOutcome::Committed)
    }
}

/// New counter values for one product, conditioned on the version the
/// counters were read at.
#[derive(Debug, Clone)]
pub struct CounterUpdate {
    pub product_id: Uuid,
    pub expected_version: i64,
    pub stock: i64,
    pub reserved: i64,
}

/// One order transition ready to commit: the fully updated order row, the
/// order version it was computed from, and the product counter update that
/// must land with it (absent for stock-neutral transitions).
#[derive(Debug, Clone)]
pub struct TransitionCommit {
    pub order: Order,
    pub expected_order_version: i64,
    pub counters: Option<CounterUpdate>,
}

/// Owner scoping for order listings. `user_id: None` lists every order.
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub user_id: Option<Uuid>,
}

/// Catalog listing filters; all optional, combined with AND.
#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
    pub category: Option<String>,
    pub brand: Option<String>,
    pub featured: Option<bool>,
    pub min_price_cents: Option<i64>,
    pub max_price_cents: Option<i64>,
}

#[async_trait]
pub trait RowStore: Send + Sync {
    /// Insert a new product row at version 1. The id must be fresh.
    async fn insert_product(&self, product: &Product) -> Result<()>;

    async fn fetch_product(&self, product_id: Uuid) -> Result<Option<ProductRecord>>;

    /// Catalog listing, newest first.
    async fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>>;

    /// Insert a new order row at version 1. The id must be fresh.
    async fn insert_order(&self, order: &Order) -> Result<()>;

    async fn fetch_order(&self, order_id: Uuid) -> Result<Option<OrderRecord>>;

    /// Order listing, newest first, optionally scoped to one owner.
    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>>;

    /// Conditionally commit one transition: the order row update and the
    /// optional counter update apply together or not at all.
    ///
    /// Only the mutable order fields (status, payment status, notes,
    /// lifecycle timestamps) are written; identity and amount fields are
    /// never touched by an update.
    async fn commit_transition(&self, commit: &TransitionCommit) -> Result<CommitOutcome>;

    /// Conditionally replace `admin_notes` without touching the state pair.
    async fn update_order_notes(
        &self,
        order_id: Uuid,
        expected_version: i64,
        notes: &str,
    ) -> Result<CommitOutcome>;
}
