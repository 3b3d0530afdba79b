//! Shared fixtures and fault injection for shopd scenario tests.
//!
//! Everything here runs against [`MemStore`]. The scenario tests under
//! `tests/` pin coordinator behavior that the Postgres backend must match;
//! see the ignored tests in `shopd-store` for the live-database half.

use std::sync::Arc;

use anyhow::Result;
use serde_json::json;
use shopd_coordinator::{Coordinator, CoordinatorError, Identity};
use shopd_schemas::{NewOrder, NewProduct, Order, PaymentStatus, Role};
use shopd_store::MemStore;
use uuid::Uuid;

mod flaky;

pub use flaky::FlakyStore;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// The standard catalog fixture: a 999.99 phone with configurable stock.
pub fn phone(stock: i64) -> NewProduct {
    NewProduct {
        brand: "Axion".to_string(),
        model: "12 Pro".to_string(),
        category: "smartphone".to_string(),
        specs: json!({"ram_gb": 12}),
        featured: false,
        price_cents: 99_999,
        stock,
    }
}

/// An order request for `quantity` units of `product_id`.
pub fn order_for(product_id: Uuid, quantity: i64) -> NewOrder {
    NewOrder {
        product_id,
        quantity,
        customer_name: "Test Customer".to_string(),
        phone: "0170000000".to_string(),
        address: "12 Test Lane".to_string(),
    }
}

pub fn admin() -> Identity {
    Identity::new(Uuid::new_v4(), Role::Admin)
}

pub fn customer() -> Identity {
    Identity::new(Uuid::new_v4(), Role::User)
}

// ---------------------------------------------------------------------------
// Shop
// ---------------------------------------------------------------------------

/// A coordinator with one seeded product and the identities the scenario
/// tests drive it with.
pub struct Shop {
    pub coordinator: Coordinator,
    pub admin: Identity,
    pub buyer: Identity,
    pub product_id: Uuid,
}

/// Stand up a [`Shop`] over a fresh `MemStore` with `stock` units of the
/// phone fixture on the shelf.
pub async fn shop_with_stock(stock: i64) -> Result<Shop> {
    shop_over(Coordinator::new(Arc::new(MemStore::new())), stock).await
}

/// Same as [`shop_with_stock`] but over a caller-supplied coordinator, for
/// tests that wrap the store (see [`FlakyStore`]).
pub async fn shop_over(coordinator: Coordinator, stock: i64) -> Result<Shop> {
    let admin = admin();
    let product = coordinator.create_product(phone(stock), &admin).await?;
    Ok(Shop {
        coordinator,
        admin,
        buyer: customer(),
        product_id: product.id,
    })
}

impl Shop {
    /// Place an order for `quantity` units as the shop's buyer.
    pub async fn place(&self, quantity: i64) -> Result<Order, CoordinatorError> {
        self.coordinator
            .create_order(order_for(self.product_id, quantity), &self.buyer)
            .await
    }

    /// Record the advance payment, the reservation point.
    pub async fn advance(&self, order_id: Uuid) -> Result<Order, CoordinatorError> {
        self.coordinator
            .apply_payment(order_id, PaymentStatus::AdvanceReceived, None, &self.admin)
            .await
    }

    /// Record full payment, completing the order.
    pub async fn complete(&self, order_id: Uuid) -> Result<Order, CoordinatorError> {
        self.coordinator
            .apply_payment(order_id, PaymentStatus::FullyPaid, None, &self.admin)
            .await
    }

    /// Record a refund, cancelling the order and releasing its hold.
    pub async fn refund(&self, order_id: Uuid) -> Result<Order, CoordinatorError> {
        self.coordinator
            .apply_payment(order_id, PaymentStatus::Refunded, None, &self.admin)
            .await
    }

    /// Stamp the payment-proof verification timestamp.
    pub async fn verify(&self, order_id: Uuid) -> Result<Order, CoordinatorError> {
        self.coordinator
            .mark_verified(order_id, None, &self.admin)
            .await
    }

    /// Current `(stock, reserved)` of the seeded product.
    pub async fn counters(&self) -> Result<(i64, i64), CoordinatorError> {
        let p = self.coordinator.get_product(self.product_id).await?;
        Ok((p.stock, p.reserved))
    }
}
