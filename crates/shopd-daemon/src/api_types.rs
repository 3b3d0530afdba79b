//! Request and response types for all shopd HTTP endpoints.
//!
//! These types are `Serialize + Deserialize` so they can be JSON-encoded by
//! Axum and decoded by tests. Amounts cross the wire as `f64` currency
//! units; everything internal is integer cents, and the conversion happens
//! here and in `shopd_orders::money`, nowhere else.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use shopd_orders::money;
use shopd_schemas::{NewOrder, Order, OrderStatus, PaymentStatus, Product};

// ---------------------------------------------------------------------------
// Error envelope
// ---------------------------------------------------------------------------

/// Every non-2xx response carries exactly this body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ---------------------------------------------------------------------------
// /api/health and /api/status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub ok: bool,
    pub service: String,
    pub version: String,
    pub uptime_secs: u64,
    /// "postgres" | "memory"
    pub store_backend: String,
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// Admin input for POST /api/products. `price` arrives in currency units
/// and is converted to cents at this boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProductRequest {
    pub brand: String,
    pub model: String,
    pub category: String,
    #[serde(default)]
    pub specs: Value,
    #[serde(default)]
    pub featured: bool,
    pub price: f64,
    pub stock: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductResponse {
    pub id: Uuid,
    pub brand: String,
    pub model: String,
    pub category: String,
    pub specs: Value,
    pub featured: bool,
    pub price: f64,
    pub stock: i64,
    pub reserved: i64,
    pub available: i64,
    pub created_at: DateTime<Utc>,
}

impl From<Product> for ProductResponse {
    fn from(p: Product) -> Self {
        let available = p.available();
        Self {
            id: p.id,
            brand: p.brand,
            model: p.model,
            category: p.category,
            specs: p.specs,
            featured: p.featured,
            price: money::cents_to_price(p.price_cents),
            stock: p.stock,
            reserved: p.reserved,
            available,
            created_at: p.created_at,
        }
    }
}

/// Query string for GET /api/products. Price bounds arrive in currency
/// units, inclusive on both ends.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductListQuery {
    pub category: Option<String>,
    pub brand: Option<String>,
    pub featured: Option<bool>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

/// Input for POST /api/orders. Deliberately carries no price fields:
/// amounts are derived server-side from the product row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrderRequest {
    pub product_id: Uuid,
    pub quantity: i64,
    pub customer_name: String,
    pub phone: String,
    pub address: String,
}

impl From<NewOrderRequest> for NewOrder {
    fn from(req: NewOrderRequest) -> Self {
        NewOrder {
            product_id: req.product_id,
            quantity: req.quantity,
            customer_name: req.customer_name,
            phone: req.phone,
            address: req.address,
        }
    }
}

/// Body for PUT /api/orders/:id. At most one of `status` / `payment_status`
/// per request; `admin_notes` may accompany either or stand alone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateOrderRequest {
    pub status: Option<String>,
    pub payment_status: Option<String>,
    pub admin_notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: i64,
    pub unit_price: f64,
    pub total_amount: f64,
    pub advance_amount: f64,
    pub customer_name: String,
    pub phone: String,
    pub address: String,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub admin_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub verified_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<Order> for OrderResponse {
    fn from(o: Order) -> Self {
        Self {
            id: o.id,
            user_id: o.user_id,
            product_id: o.product_id,
            product_name: o.product_name,
            quantity: o.quantity,
            unit_price: money::cents_to_price(o.unit_price_cents),
            total_amount: money::cents_to_price(o.total_amount_cents),
            advance_amount: money::cents_to_price(o.advance_amount_cents),
            customer_name: o.customer_name,
            phone: o.phone,
            address: o.address,
            status: o.status,
            payment_status: o.payment_status,
            admin_notes: o.admin_notes,
            created_at: o.created_at,
            verified_at: o.verified_at,
            paid_at: o.paid_at,
            completed_at: o.completed_at,
        }
    }
}
