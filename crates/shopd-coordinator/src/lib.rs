//! Reservation coordinator — the single choke-point for catalog and order
//! mutations.
//!
//! # Invariants
//!
//! **Atomicity.** Every transition that moves stock commits the order row and
//! the product counters through one conditional
//! [`RowStore::commit_transition`] call: both rows or neither. No reader ever
//! observes an order that paid without its reservation, or a reservation
//! without its order.
//!
//! **Read-decide-commit.** Mutations never write blindly. Each attempt reads
//! fresh versioned rows, computes successor values through the pure
//! `shopd-orders` / `shopd-stock` rules, and commits conditioned on the
//! versions it read. A version miss means another writer won the row; the
//! attempt restarts from a fresh read, at most [`COMMIT_RETRY_BUDGET`] times,
//! then surfaces as [`CoordinatorError::Conflict`]. Deterministic refusals
//! (insufficient stock, illegal transition, forbidden caller) are never
//! retried.
//!
//! **Authorization.** Role checks happen here and nowhere deeper: admin-only
//! payment events, owner-scoped reads and cancellation. The pure crates below
//! this one know nothing about callers.
//!
//! ```text
//! HTTP layer
//!     │  Identity (resolved upstream)
//!     ▼
//! Coordinator::{create_order, apply_payment, mark_verified, cancel_order, …}
//!     │    1. fetch_order / fetch_product      (versioned reads)
//!     │    2. transition table + stock arithmetic  (pure, no IO)
//!     │    3. commit_transition                (both rows or neither)
//!     │         └─ Conflict → back to 1., bounded
//!     ▼
//! RowStore (MemStore | PgStore)
//! ```

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use shopd_orders::money;
use shopd_orders::{transition, LedgerEffect, OrderEvent, TransitionError};
use shopd_schemas::{NewOrder, NewProduct, Order, OrderStatus, PaymentStatus, Product, Role};
use shopd_stock::{StockCounters, StockError};
use shopd_store::{
    CommitOutcome, CounterUpdate, OrderFilter, ProductFilter, RowStore, TransitionCommit,
};

/// How many times a conflicted commit is retried from a fresh read before
/// the operation fails with [`CoordinatorError::Conflict`].
pub const COMMIT_RETRY_BUDGET: u32 = 3;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// The resolved caller of a coordinator operation.
///
/// Credential verification happens upstream; the coordinator trusts these
/// fields and enforces authorization from them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Uuid,
    pub role: Role,
}

impl Identity {
    pub fn new(user_id: Uuid, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

// ---------------------------------------------------------------------------
// CoordinatorError
// ---------------------------------------------------------------------------

/// Every refusal a coordinator operation can surface.
///
/// All variants except `Conflict` and `Store` are deterministic outcomes of
/// the rows as read; retrying them without changing the world is pointless,
/// and the coordinator does not.
#[derive(Debug)]
pub enum CoordinatorError {
    ProductNotFound {
        product_id: Uuid,
    },
    OrderNotFound {
        order_id: Uuid,
    },
    /// Request input failed validation before any row was touched.
    Validation {
        detail: String,
    },
    /// Reservation would exceed the available headroom.
    InsufficientStock {
        requested: i64,
        available: i64,
    },
    /// The event does not match the order's current state pair.
    InvalidTransition {
        status: OrderStatus,
        payment_status: PaymentStatus,
        event: OrderEvent,
    },
    /// The order already reached `completed` or `cancelled`.
    OrderTerminal {
        status: OrderStatus,
    },
    /// Caller lacks the role or the ownership the operation requires.
    Forbidden,
    /// Conditional commits kept losing to concurrent writers.
    Conflict {
        attempts: u32,
    },
    /// Stored state contradicts the transition rules. Always a defect
    /// upstream of the request, never a user error; logged as an alarm at
    /// the point of detection.
    InvariantViolation {
        detail: String,
    },
    /// The backing store failed outright.
    Store(anyhow::Error),
}

impl std::fmt::Display for CoordinatorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ProductNotFound { product_id } => {
                write!(f, "product not found: {product_id}")
            }
            Self::OrderNotFound { order_id } => write!(f, "order not found: {order_id}"),
            Self::Validation { detail } => write!(f, "invalid request: {detail}"),
            Self::InsufficientStock {
                requested,
                available,
            } => write!(
                f,
                "insufficient stock: requested {requested}, available {available}"
            ),
            Self::InvalidTransition {
                status,
                payment_status,
                event,
            } => write!(
                f,
                "illegal order transition: ({}, {}) + {:?}",
                status.as_str(),
                payment_status.as_str(),
                event
            ),
            Self::OrderTerminal { status } => {
                write!(f, "order is terminal ({})", status.as_str())
            }
            Self::Forbidden => write!(f, "forbidden: caller may not perform this operation"),
            Self::Conflict { attempts } => {
                write!(f, "commit kept conflicting after {attempts} attempts")
            }
            Self::InvariantViolation { detail } => write!(f, "invariant violation: {detail}"),
            Self::Store(err) => write!(f, "store failure: {err:#}"),
        }
    }
}

impl std::error::Error for CoordinatorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Store(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<TransitionError> for CoordinatorError {
    fn from(err: TransitionError) -> Self {
        match err {
            TransitionError::Terminal { status } => CoordinatorError::OrderTerminal { status },
            TransitionError::Illegal {
                status,
                payment_status,
                event,
            } => CoordinatorError::InvalidTransition {
                status,
                payment_status,
                event,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

/// The single mutation entry point for products and orders.
///
/// Holds the store behind `Arc<dyn RowStore>` so the daemon, the tests, and
/// any background task share one backend. Cloning is cheap.
#[derive(Clone)]
pub struct Coordinator {
    store: Arc<dyn RowStore>,
}

impl Coordinator {
    pub fn new(store: Arc<dyn RowStore>) -> Self {
        Self { store }
    }

    // -----------------------------------------------------------------------
    // Catalog
    // -----------------------------------------------------------------------

    /// Admin-only: add a product to the catalog. Counters start fully
    /// explicit (`reserved = 0`, `stock` as given); there is no defaulting
    /// of a missing counter.
    pub async fn create_product(
        &self,
        new: NewProduct,
        caller: &Identity,
    ) -> Result<Product, CoordinatorError> {
        require_admin(caller)?;
        require_nonempty("brand", &new.brand)?;
        require_nonempty("model", &new.model)?;
        require_nonempty("category", &new.category)?;
        if new.price_cents <= 0 {
            return Err(CoordinatorError::Validation {
                detail: format!("price_cents must be positive, got {}", new.price_cents),
            });
        }
        if new.stock < 0 {
            return Err(CoordinatorError::Validation {
                detail: format!("stock must be non-negative, got {}", new.stock),
            });
        }

        let product = Product {
            id: Uuid::new_v4(),
            brand: new.brand,
            model: new.model,
            category: new.category,
            specs: new.specs,
            featured: new.featured,
            price_cents: new.price_cents,
            stock: new.stock,
            reserved: 0,
            created_at: Utc::now(),
        };
        self.store
            .insert_product(&product)
            .await
            .map_err(CoordinatorError::Store)?;
        tracing::info!(
            product_id = %product.id,
            name = %product.display_name(),
            stock = product.stock,
            "product created"
        );
        Ok(product)
    }

    pub async fn get_product(&self, product_id: Uuid) -> Result<Product, CoordinatorError> {
        let rec = self
            .store
            .fetch_product(product_id)
            .await
            .map_err(CoordinatorError::Store)?
            .ok_or(CoordinatorError::ProductNotFound { product_id })?;
        Ok(rec.product)
    }

    pub async fn list_products(
        &self,
        filter: &ProductFilter,
    ) -> Result<Vec<Product>, CoordinatorError> {
        self.store
            .list_products(filter)
            .await
            .map_err(CoordinatorError::Store)
    }

    // -----------------------------------------------------------------------
    // Order creation and reads
    // -----------------------------------------------------------------------

    /// Create an order for the caller. Amounts are derived server-side from
    /// the product row; client-supplied prices are never accepted.
    ///
    /// The headroom check here is advisory: nothing is reserved until the
    /// advance payment, which re-checks against fresh counters.
    pub async fn create_order(
        &self,
        new: NewOrder,
        caller: &Identity,
    ) -> Result<Order, CoordinatorError> {
        if new.quantity < 1 {
            return Err(CoordinatorError::Validation {
                detail: format!("quantity must be at least 1, got {}", new.quantity),
            });
        }
        require_nonempty("customer_name", &new.customer_name)?;
        require_nonempty("phone", &new.phone)?;
        require_nonempty("address", &new.address)?;

        let rec = self
            .store
            .fetch_product(new.product_id)
            .await
            .map_err(CoordinatorError::Store)?
            .ok_or(CoordinatorError::ProductNotFound {
                product_id: new.product_id,
            })?;
        let product = rec.product;

        let available = product.available();
        if available < new.quantity {
            return Err(CoordinatorError::InsufficientStock {
                requested: new.quantity,
                available,
            });
        }

        let total_amount_cents = money::order_total(product.price_cents, new.quantity)
            .map_err(|err| CoordinatorError::Validation {
                detail: err.to_string(),
            })?;
        let advance_amount_cents = money::advance_from_total(total_amount_cents);

        let order = Order {
            id: Uuid::new_v4(),
            user_id: caller.user_id,
            product_id: product.id,
            product_name: product.display_name(),
            quantity: new.quantity,
            unit_price_cents: product.price_cents,
            total_amount_cents,
            advance_amount_cents,
            customer_name: new.customer_name,
            phone: new.phone,
            address: new.address,
            status: OrderStatus::PendingVerification,
            payment_status: PaymentStatus::Unpaid,
            admin_notes: None,
            created_at: Utc::now(),
            verified_at: None,
            paid_at: None,
            completed_at: None,
        };
        self.store
            .insert_order(&order)
            .await
            .map_err(CoordinatorError::Store)?;
        tracing::info!(
            order_id = %order.id,
            product_id = %order.product_id,
            quantity = order.quantity,
            total_cents = order.total_amount_cents,
            "order created"
        );
        Ok(order)
    }

    /// Fetch one order. Owners see their own; admins see any.
    pub async fn get_order(
        &self,
        order_id: Uuid,
        caller: &Identity,
    ) -> Result<Order, CoordinatorError> {
        let rec = self
            .store
            .fetch_order(order_id)
            .await
            .map_err(CoordinatorError::Store)?
            .ok_or(CoordinatorError::OrderNotFound { order_id })?;
        if !caller.is_admin() && rec.order.user_id != caller.user_id {
            return Err(CoordinatorError::Forbidden);
        }
        Ok(rec.order)
    }

    /// List orders, newest first. Admins get every order; everyone else gets
    /// only their own.
    pub async fn list_orders(&self, caller: &Identity) -> Result<Vec<Order>, CoordinatorError> {
        let filter = if caller.is_admin() {
            OrderFilter::default()
        } else {
            OrderFilter {
                user_id: Some(caller.user_id),
            }
        };
        self.store
            .list_orders(&filter)
            .await
            .map_err(CoordinatorError::Store)
    }

    // -----------------------------------------------------------------------
    // Order transitions
    // -----------------------------------------------------------------------

    /// Admin-only: record a payment-status change. The matching transition
    /// table row decides the new state pair plus the ledger effect, and the
    /// whole thing commits atomically. `notes` rides along in the same
    /// commit when present.
    pub async fn apply_payment(
        &self,
        order_id: Uuid,
        target: PaymentStatus,
        notes: Option<String>,
        caller: &Identity,
    ) -> Result<Order, CoordinatorError> {
        require_admin(caller)?;
        let event =
            OrderEvent::from_payment_status(target).ok_or_else(|| CoordinatorError::Validation {
                detail: "unpaid is the initial payment status, not a transition target"
                    .to_string(),
            })?;
        self.run_order_transition(order_id, event, notes, |_| Ok(())).await
    }

    /// Admin-only: stamp the order as verified. Stock no-op; the stamp is
    /// set-once even when re-verified.
    pub async fn mark_verified(
        &self,
        order_id: Uuid,
        notes: Option<String>,
        caller: &Identity,
    ) -> Result<Order, CoordinatorError> {
        require_admin(caller)?;
        self.run_order_transition(order_id, OrderEvent::MarkVerified, notes, |_| Ok(()))
            .await
    }

    /// Cancel an order. Owners may cancel their own order only while it is
    /// still `pending_verification`; admins may cancel from any non-terminal
    /// state, which releases the reservation if one exists.
    ///
    /// The ownership gate re-runs on every retry read: if the order gets
    /// paid between the read and the commit, an owner's cancel must flip to
    /// `Forbidden` rather than silently become a release.
    pub async fn cancel_order(
        &self,
        order_id: Uuid,
        caller: &Identity,
    ) -> Result<Order, CoordinatorError> {
        let caller = *caller;
        self.run_order_transition(order_id, OrderEvent::Cancel, None, move |order: &Order| {
            if caller.is_admin() {
                return Ok(());
            }
            if order.user_id != caller.user_id {
                return Err(CoordinatorError::Forbidden);
            }
            if order.status.is_terminal() {
                return Err(CoordinatorError::OrderTerminal {
                    status: order.status,
                });
            }
            if order.status != OrderStatus::PendingVerification {
                // Money already moved; owners go through an admin refund.
                return Err(CoordinatorError::Forbidden);
            }
            Ok(())
        })
        .await
    }

    /// Admin-only: replace the free-text note on an order. Annotation only;
    /// the state pair, counters, and timestamps are untouched, and terminal
    /// orders may still be annotated.
    pub async fn update_admin_notes(
        &self,
        order_id: Uuid,
        notes: String,
        caller: &Identity,
    ) -> Result<Order, CoordinatorError> {
        require_admin(caller)?;
        for attempt in 1..=COMMIT_RETRY_BUDGET {
            let rec = self
                .store
                .fetch_order(order_id)
                .await
                .map_err(CoordinatorError::Store)?
                .ok_or(CoordinatorError::OrderNotFound { order_id })?;
            match self
                .store
                .update_order_notes(order_id, rec.version, &notes)
                .await
                .map_err(CoordinatorError::Store)?
            {
                CommitOutcome::Committed => {
                    let mut order = rec.order;
                    order.admin_notes = Some(notes);
                    return Ok(order);
                }
                CommitOutcome::Conflict => {
                    tracing::debug!(order_id = %order_id, attempt, "notes update conflicted, retrying");
                }
            }
        }
        Err(CoordinatorError::Conflict {
            attempts: COMMIT_RETRY_BUDGET,
        })
    }

    // -----------------------------------------------------------------------
    // The read-decide-commit loop
    // -----------------------------------------------------------------------

    /// Run one lifecycle event against an order: read fresh rows, gate,
    /// resolve the transition, compute the counter successor, and commit
    /// conditionally. Retries from a fresh read on version conflicts, up to
    /// the budget.
    async fn run_order_transition(
        &self,
        order_id: Uuid,
        event: OrderEvent,
        notes: Option<String>,
        gate: impl Fn(&Order) -> Result<(), CoordinatorError>,
    ) -> Result<Order, CoordinatorError> {
        for attempt in 1..=COMMIT_RETRY_BUDGET {
            let rec = self
                .store
                .fetch_order(order_id)
                .await
                .map_err(CoordinatorError::Store)?
                .ok_or(CoordinatorError::OrderNotFound { order_id })?;
            let mut order = rec.order;

            gate(&order)?;
            let step = transition(order.status, order.payment_status, event)?;

            let counters = match step.effect {
                None => None,
                Some(effect) => Some(self.counters_after(&order, effect).await?),
            };

            step.apply_to(&mut order, Utc::now());
            if let Some(notes) = notes.as_deref() {
                order.admin_notes = Some(notes.to_string());
            }

            let commit = TransitionCommit {
                order: order.clone(),
                expected_order_version: rec.version,
                counters,
            };
            match self
                .store
                .commit_transition(&commit)
                .await
                .map_err(CoordinatorError::Store)?
            {
                CommitOutcome::Committed => {
                    tracing::info!(
                        order_id = %order.id,
                        status = order.status.as_str(),
                        payment_status = order.payment_status.as_str(),
                        event = ?event,
                        "order transition committed"
                    );
                    return Ok(order);
                }
                CommitOutcome::Conflict => {
                    tracing::debug!(
                        order_id = %order_id,
                        attempt,
                        "transition commit conflicted, retrying from a fresh read"
                    );
                }
            }
        }
        tracing::warn!(
            order_id = %order_id,
            attempts = COMMIT_RETRY_BUDGET,
            "transition commit kept conflicting, giving up"
        );
        Err(CoordinatorError::Conflict {
            attempts: COMMIT_RETRY_BUDGET,
        })
    }

    /// Compute the post-transition counter pair for the order's product,
    /// conditioned on the product version read here.
    async fn counters_after(
        &self,
        order: &Order,
        effect: LedgerEffect,
    ) -> Result<CounterUpdate, CoordinatorError> {
        let rec = self
            .store
            .fetch_product(order.product_id)
            .await
            .map_err(CoordinatorError::Store)?
            .ok_or_else(|| {
                tracing::error!(
                    order_id = %order.id,
                    product_id = %order.product_id,
                    "order references a product row that no longer exists"
                );
                CoordinatorError::InvariantViolation {
                    detail: format!(
                        "order {} references missing product {}",
                        order.id, order.product_id
                    ),
                }
            })?;

        let current = StockCounters::new(rec.product.stock, rec.product.reserved)
            .map_err(|err| ledger_failure(order, err))?;
        let next = match effect {
            LedgerEffect::Reserve => current
                .reserve(order.quantity)
                .map_err(|err| ledger_failure(order, err))?,
            LedgerEffect::Consume => current
                .consume(order.quantity)
                .map_err(|err| ledger_failure(order, err))?,
            LedgerEffect::Release => {
                let out = current
                    .release(order.quantity)
                    .map_err(|err| ledger_failure(order, err))?;
                if out.clamped() {
                    tracing::warn!(
                        order_id = %order.id,
                        product_id = %order.product_id,
                        requested = out.requested,
                        released = out.released,
                        "release clamped: row held fewer reserved units than the order"
                    );
                }
                out.counters
            }
        };

        Ok(CounterUpdate {
            product_id: order.product_id,
            expected_version: rec.version,
            stock: next.stock,
            reserved: next.reserved,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn require_admin(caller: &Identity) -> Result<(), CoordinatorError> {
    if caller.is_admin() {
        Ok(())
    } else {
        Err(CoordinatorError::Forbidden)
    }
}

fn require_nonempty(field: &str, value: &str) -> Result<(), CoordinatorError> {
    if value.trim().is_empty() {
        return Err(CoordinatorError::Validation {
            detail: format!("{field} must not be empty"),
        });
    }
    Ok(())
}

/// Map a stock arithmetic refusal onto the coordinator's error surface.
///
/// `InsufficientStock` is an expected caller-facing outcome. Anything else
/// means the stored counters or the transition wiring are broken; that is
/// logged as a correctness alarm before surfacing.
fn ledger_failure(order: &Order, err: StockError) -> CoordinatorError {
    match err {
        StockError::InsufficientStock {
            requested,
            available,
        } => CoordinatorError::InsufficientStock {
            requested,
            available,
        },
        other => {
            tracing::error!(
                order_id = %order.id,
                product_id = %order.product_id,
                error = %other,
                "stock ledger alarm: transition effect rejected"
            );
            CoordinatorError::InvariantViolation {
                detail: other.to_string(),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use shopd_store::MemStore;

    fn admin() -> Identity {
        Identity::new(Uuid::new_v4(), Role::Admin)
    }

    fn customer() -> Identity {
        Identity::new(Uuid::new_v4(), Role::User)
    }

    fn coordinator() -> Coordinator {
        Coordinator::new(Arc::new(MemStore::new()))
    }

    fn phone_product(stock: i64) -> NewProduct {
        NewProduct {
            brand: "Axion".to_string(),
            model: "12 Pro".to_string(),
            category: "smartphone".to_string(),
            specs: serde_json::json!({ "ram_gb": 12 }),
            featured: false,
            price_cents: 99_999,
            stock,
        }
    }

    fn order_request(product_id: Uuid, quantity: i64) -> NewOrder {
        NewOrder {
            product_id,
            quantity,
            customer_name: "Test Customer".to_string(),
            phone: "0170000000".to_string(),
            address: "12 Test Lane".to_string(),
        }
    }

    /// Coordinator over a fresh MemStore with one seeded product.
    async fn seeded(stock: i64) -> (Coordinator, Identity, Uuid) {
        let coord = coordinator();
        let staff = admin();
        let product = coord
            .create_product(phone_product(stock), &staff)
            .await
            .unwrap();
        (coord, staff, product.id)
    }

    // -- Catalog --------------------------------------------------------------

    #[tokio::test]
    async fn create_product_requires_admin() {
        let coord = coordinator();
        let err = coord
            .create_product(phone_product(5), &customer())
            .await
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::Forbidden));
    }

    #[tokio::test]
    async fn create_product_rejects_nonpositive_price() {
        let coord = coordinator();
        let mut new = phone_product(5);
        new.price_cents = 0;
        let err = coord.create_product(new, &admin()).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::Validation { .. }));
    }

    #[tokio::test]
    async fn create_product_rejects_negative_stock() {
        let coord = coordinator();
        let mut new = phone_product(5);
        new.stock = -1;
        let err = coord.create_product(new, &admin()).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::Validation { .. }));
    }

    #[tokio::test]
    async fn new_product_starts_with_zero_reserved() {
        let (coord, _, product_id) = seeded(7).await;
        let product = coord.get_product(product_id).await.unwrap();
        assert_eq!(product.stock, 7);
        assert_eq!(product.reserved, 0);
        assert_eq!(product.available(), 7);
    }

    // -- Order creation -------------------------------------------------------

    #[tokio::test]
    async fn create_order_derives_amounts_from_the_product_row() {
        let (coord, _, product_id) = seeded(10).await;
        let buyer = customer();
        let order = coord
            .create_order(order_request(product_id, 2), &buyer)
            .await
            .unwrap();

        assert_eq!(order.user_id, buyer.user_id);
        assert_eq!(order.product_name, "Axion 12 Pro");
        assert_eq!(order.unit_price_cents, 99_999);
        assert_eq!(order.total_amount_cents, 199_998);
        // 1999.98 × 0.20 = 399.996 → 400.00
        assert_eq!(order.advance_amount_cents, 40_000);
        assert_eq!(order.status, OrderStatus::PendingVerification);
        assert_eq!(order.payment_status, PaymentStatus::Unpaid);
        assert!(order.verified_at.is_none() && order.paid_at.is_none());
    }

    #[tokio::test]
    async fn create_order_rejects_zero_quantity() {
        let (coord, _, product_id) = seeded(10).await;
        let err = coord
            .create_order(order_request(product_id, 0), &customer())
            .await
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::Validation { .. }));
    }

    #[tokio::test]
    async fn create_order_rejects_blank_customer_name() {
        let (coord, _, product_id) = seeded(10).await;
        let mut new = order_request(product_id, 1);
        new.customer_name = "   ".to_string();
        let err = coord.create_order(new, &customer()).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::Validation { .. }));
    }

    #[tokio::test]
    async fn create_order_for_unknown_product_fails() {
        let coord = coordinator();
        let missing = Uuid::new_v4();
        let err = coord
            .create_order(order_request(missing, 1), &customer())
            .await
            .unwrap_err();
        assert!(
            matches!(err, CoordinatorError::ProductNotFound { product_id } if product_id == missing)
        );
    }

    #[tokio::test]
    async fn create_order_checks_headroom_but_reserves_nothing() {
        let (coord, _, product_id) = seeded(5).await;
        coord
            .create_order(order_request(product_id, 3), &customer())
            .await
            .unwrap();

        // Creation is advisory: counters untouched, so a second order for
        // the same units is still accepted.
        let product = coord.get_product(product_id).await.unwrap();
        assert_eq!(product.reserved, 0);
        coord
            .create_order(order_request(product_id, 3), &customer())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn create_order_beyond_headroom_is_rejected() {
        let (coord, _, product_id) = seeded(1).await;
        let err = coord
            .create_order(order_request(product_id, 2), &customer())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CoordinatorError::InsufficientStock {
                requested: 2,
                available: 1
            }
        ));
    }

    // -- Payment transitions ----------------------------------------------------

    #[tokio::test]
    async fn advance_payment_reserves_and_stamps() {
        let (coord, staff, product_id) = seeded(10).await;
        let order = coord
            .create_order(order_request(product_id, 2), &customer())
            .await
            .unwrap();

        let paid = coord
            .apply_payment(order.id, PaymentStatus::AdvanceReceived, None, &staff)
            .await
            .unwrap();
        assert_eq!(paid.status, OrderStatus::AdvancePaid);
        assert_eq!(paid.payment_status, PaymentStatus::AdvanceReceived);
        assert!(paid.paid_at.is_some());

        let product = coord.get_product(product_id).await.unwrap();
        assert_eq!(product.stock, 10);
        assert_eq!(product.reserved, 2);
    }

    #[tokio::test]
    async fn apply_payment_requires_admin() {
        let (coord, _, product_id) = seeded(10).await;
        let buyer = customer();
        let order = coord
            .create_order(order_request(product_id, 1), &buyer)
            .await
            .unwrap();

        let err = coord
            .apply_payment(order.id, PaymentStatus::AdvanceReceived, None, &buyer)
            .await
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::Forbidden));
    }

    #[tokio::test]
    async fn apply_payment_rejects_unpaid_as_target() {
        let (coord, staff, product_id) = seeded(10).await;
        let order = coord
            .create_order(order_request(product_id, 1), &customer())
            .await
            .unwrap();

        let err = coord
            .apply_payment(order.id, PaymentStatus::Unpaid, None, &staff)
            .await
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::Validation { .. }));
    }

    #[tokio::test]
    async fn duplicate_advance_payment_is_rejected() {
        let (coord, staff, product_id) = seeded(10).await;
        let order = coord
            .create_order(order_request(product_id, 2), &customer())
            .await
            .unwrap();
        coord
            .apply_payment(order.id, PaymentStatus::AdvanceReceived, None, &staff)
            .await
            .unwrap();

        let err = coord
            .apply_payment(order.id, PaymentStatus::AdvanceReceived, None, &staff)
            .await
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::InvalidTransition { .. }));

        // The reservation must not have doubled.
        let product = coord.get_product(product_id).await.unwrap();
        assert_eq!(product.reserved, 2);
    }

    #[tokio::test]
    async fn advance_payment_without_headroom_fails_and_mutates_nothing() {
        let (coord, staff, product_id) = seeded(5).await;
        let first = coord
            .create_order(order_request(product_id, 3), &customer())
            .await
            .unwrap();
        let second = coord
            .create_order(order_request(product_id, 3), &customer())
            .await
            .unwrap();

        coord
            .apply_payment(first.id, PaymentStatus::AdvanceReceived, None, &staff)
            .await
            .unwrap();

        // available = 5 - 3 = 2 < 3: the second advance must fail.
        let err = coord
            .apply_payment(second.id, PaymentStatus::AdvanceReceived, None, &staff)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CoordinatorError::InsufficientStock {
                requested: 3,
                available: 2
            }
        ));

        let untouched = coord.get_order(second.id, &staff).await.unwrap();
        assert_eq!(untouched.status, OrderStatus::PendingVerification);
        assert_eq!(untouched.payment_status, PaymentStatus::Unpaid);
        let product = coord.get_product(product_id).await.unwrap();
        assert_eq!(product.reserved, 3);
    }

    #[tokio::test]
    async fn full_payment_consumes_the_reservation() {
        let (coord, staff, product_id) = seeded(10).await;
        let order = coord
            .create_order(order_request(product_id, 2), &customer())
            .await
            .unwrap();
        coord
            .apply_payment(order.id, PaymentStatus::AdvanceReceived, None, &staff)
            .await
            .unwrap();

        let done = coord
            .apply_payment(order.id, PaymentStatus::FullyPaid, None, &staff)
            .await
            .unwrap();
        assert_eq!(done.status, OrderStatus::Completed);
        assert_eq!(done.payment_status, PaymentStatus::FullyPaid);
        assert!(done.completed_at.is_some());

        let product = coord.get_product(product_id).await.unwrap();
        assert_eq!(product.stock, 8);
        assert_eq!(product.reserved, 0);
    }

    #[tokio::test]
    async fn refund_releases_the_reservation() {
        let (coord, staff, product_id) = seeded(10).await;
        let order = coord
            .create_order(order_request(product_id, 2), &customer())
            .await
            .unwrap();
        coord
            .apply_payment(order.id, PaymentStatus::AdvanceReceived, None, &staff)
            .await
            .unwrap();

        let refunded = coord
            .apply_payment(order.id, PaymentStatus::Refunded, None, &staff)
            .await
            .unwrap();
        assert_eq!(refunded.status, OrderStatus::Cancelled);
        assert_eq!(refunded.payment_status, PaymentStatus::Refunded);

        // Stock untouched, reservation handed back.
        let product = coord.get_product(product_id).await.unwrap();
        assert_eq!(product.stock, 10);
        assert_eq!(product.reserved, 0);
    }

    #[tokio::test]
    async fn terminal_orders_reject_further_events() {
        let (coord, staff, product_id) = seeded(10).await;
        let order = coord
            .create_order(order_request(product_id, 2), &customer())
            .await
            .unwrap();
        coord
            .apply_payment(order.id, PaymentStatus::AdvanceReceived, None, &staff)
            .await
            .unwrap();
        coord
            .apply_payment(order.id, PaymentStatus::FullyPaid, None, &staff)
            .await
            .unwrap();

        let err = coord
            .apply_payment(order.id, PaymentStatus::Refunded, None, &staff)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CoordinatorError::OrderTerminal {
                status: OrderStatus::Completed
            }
        ));

        // Counters exactly as the full payment left them.
        let product = coord.get_product(product_id).await.unwrap();
        assert_eq!(product.stock, 8);
        assert_eq!(product.reserved, 0);
    }

    #[tokio::test]
    async fn mark_verified_stamps_without_moving_the_pair() {
        let (coord, staff, product_id) = seeded(10).await;
        let order = coord
            .create_order(order_request(product_id, 1), &customer())
            .await
            .unwrap();

        let verified = coord.mark_verified(order.id, None, &staff).await.unwrap();
        assert_eq!(verified.status, OrderStatus::PendingVerification);
        assert_eq!(verified.payment_status, PaymentStatus::Unpaid);
        let first_stamp = verified.verified_at.unwrap();

        // Re-verify: accepted, stamp unchanged.
        let again = coord.mark_verified(order.id, None, &staff).await.unwrap();
        assert_eq!(again.verified_at, Some(first_stamp));
    }

    // -- Cancellation -----------------------------------------------------------

    #[tokio::test]
    async fn owner_cancels_own_pending_order() {
        let (coord, _, product_id) = seeded(10).await;
        let buyer = customer();
        let order = coord
            .create_order(order_request(product_id, 2), &buyer)
            .await
            .unwrap();

        let cancelled = coord.cancel_order(order.id, &buyer).await.unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(cancelled.payment_status, PaymentStatus::Unpaid);

        let product = coord.get_product(product_id).await.unwrap();
        assert_eq!(product.reserved, 0);
    }

    #[tokio::test]
    async fn non_owner_cancel_is_forbidden() {
        let (coord, staff, product_id) = seeded(10).await;
        let buyer = customer();
        let stranger = customer();
        let order = coord
            .create_order(order_request(product_id, 2), &buyer)
            .await
            .unwrap();

        let err = coord.cancel_order(order.id, &stranger).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::Forbidden));

        let untouched = coord.get_order(order.id, &staff).await.unwrap();
        assert_eq!(untouched.status, OrderStatus::PendingVerification);
    }

    #[tokio::test]
    async fn owner_cannot_cancel_after_advance_payment() {
        let (coord, staff, product_id) = seeded(10).await;
        let buyer = customer();
        let order = coord
            .create_order(order_request(product_id, 2), &buyer)
            .await
            .unwrap();
        coord
            .apply_payment(order.id, PaymentStatus::AdvanceReceived, None, &staff)
            .await
            .unwrap();

        let err = coord.cancel_order(order.id, &buyer).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::Forbidden));

        // The reservation stands.
        let product = coord.get_product(product_id).await.unwrap();
        assert_eq!(product.reserved, 2);
    }

    #[tokio::test]
    async fn admin_cancel_of_paid_order_refunds_and_releases() {
        let (coord, staff, product_id) = seeded(10).await;
        let order = coord
            .create_order(order_request(product_id, 2), &customer())
            .await
            .unwrap();
        coord
            .apply_payment(order.id, PaymentStatus::AdvanceReceived, None, &staff)
            .await
            .unwrap();

        let cancelled = coord.cancel_order(order.id, &staff).await.unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(cancelled.payment_status, PaymentStatus::Refunded);

        let product = coord.get_product(product_id).await.unwrap();
        assert_eq!(product.stock, 10);
        assert_eq!(product.reserved, 0);
    }

    #[tokio::test]
    async fn owner_cancel_of_cancelled_order_is_terminal() {
        let (coord, _, product_id) = seeded(10).await;
        let buyer = customer();
        let order = coord
            .create_order(order_request(product_id, 1), &buyer)
            .await
            .unwrap();
        coord.cancel_order(order.id, &buyer).await.unwrap();

        let err = coord.cancel_order(order.id, &buyer).await.unwrap_err();
        assert!(matches!(
            err,
            CoordinatorError::OrderTerminal {
                status: OrderStatus::Cancelled
            }
        ));
    }

    // -- Notes ------------------------------------------------------------------

    #[tokio::test]
    async fn notes_ride_along_with_a_payment_commit() {
        let (coord, staff, product_id) = seeded(10).await;
        let order = coord
            .create_order(order_request(product_id, 1), &customer())
            .await
            .unwrap();

        let paid = coord
            .apply_payment(
                order.id,
                PaymentStatus::AdvanceReceived,
                Some("bKash txn 8841".to_string()),
                &staff,
            )
            .await
            .unwrap();
        assert_eq!(paid.admin_notes.as_deref(), Some("bKash txn 8841"));
    }

    #[tokio::test]
    async fn update_admin_notes_requires_admin() {
        let (coord, _, product_id) = seeded(10).await;
        let buyer = customer();
        let order = coord
            .create_order(order_request(product_id, 1), &buyer)
            .await
            .unwrap();

        let err = coord
            .update_admin_notes(order.id, "mine now".to_string(), &buyer)
            .await
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::Forbidden));
    }

    #[tokio::test]
    async fn notes_update_leaves_the_state_pair_alone() {
        let (coord, staff, product_id) = seeded(10).await;
        let buyer = customer();
        let order = coord
            .create_order(order_request(product_id, 1), &buyer)
            .await
            .unwrap();

        let noted = coord
            .update_admin_notes(order.id, "call before delivery".to_string(), &staff)
            .await
            .unwrap();
        assert_eq!(noted.status, OrderStatus::PendingVerification);
        assert_eq!(noted.payment_status, PaymentStatus::Unpaid);
        assert_eq!(noted.admin_notes.as_deref(), Some("call before delivery"));

        // Annotation still works once the order is terminal.
        coord.cancel_order(order.id, &buyer).await.unwrap();
        let noted = coord
            .update_admin_notes(order.id, "customer withdrew".to_string(), &staff)
            .await
            .unwrap();
        assert_eq!(noted.status, OrderStatus::Cancelled);
        assert_eq!(noted.admin_notes.as_deref(), Some("customer withdrew"));
    }

    // -- Read scoping -------------------------------------------------------------

    #[tokio::test]
    async fn get_order_is_owner_scoped() {
        let (coord, staff, product_id) = seeded(10).await;
        let buyer = customer();
        let stranger = customer();
        let order = coord
            .create_order(order_request(product_id, 1), &buyer)
            .await
            .unwrap();

        assert!(coord.get_order(order.id, &buyer).await.is_ok());
        assert!(coord.get_order(order.id, &staff).await.is_ok());
        let err = coord.get_order(order.id, &stranger).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::Forbidden));
    }

    #[tokio::test]
    async fn list_orders_scopes_to_owner_unless_admin() {
        let (coord, staff, product_id) = seeded(10).await;
        let alice = customer();
        let bob = customer();
        coord
            .create_order(order_request(product_id, 1), &alice)
            .await
            .unwrap();
        coord
            .create_order(order_request(product_id, 1), &alice)
            .await
            .unwrap();
        coord
            .create_order(order_request(product_id, 1), &bob)
            .await
            .unwrap();

        assert_eq!(coord.list_orders(&alice).await.unwrap().len(), 2);
        assert_eq!(coord.list_orders(&bob).await.unwrap().len(), 1);
        assert_eq!(coord.list_orders(&staff).await.unwrap().len(), 3);
    }
}
