use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "user" => Some(Role::User),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

/// Order lifecycle status. `Completed` and `Cancelled` are terminal: no
/// transition ever leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    PendingVerification,
    AdvancePaid,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::PendingVerification => "pending_verification",
            OrderStatus::AdvancePaid => "advance_paid",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<OrderStatus> {
        match s {
            "pending_verification" => Some(OrderStatus::PendingVerification),
            "advance_paid" => Some(OrderStatus::AdvancePaid),
            "completed" => Some(OrderStatus::Completed),
            "cancelled" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Unpaid,
    AdvanceReceived,
    FullyPaid,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::AdvanceReceived => "advance_received",
            PaymentStatus::FullyPaid => "fully_paid",
            PaymentStatus::Refunded => "refunded",
        }
    }

    pub fn parse(s: &str) -> Option<PaymentStatus> {
        match s {
            "unpaid" => Some(PaymentStatus::Unpaid),
            "advance_received" => Some(PaymentStatus::AdvanceReceived),
            "fully_paid" => Some(PaymentStatus::FullyPaid),
            "refunded" => Some(PaymentStatus::Refunded),
            _ => None,
        }
    }
}

/// Catalog entry. `stock`/`reserved` are the contended counters; every
/// committed row satisfies `0 <= reserved <= stock`. Amounts are integer
/// cents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub brand: String,
    pub model: String,
    pub category: String,
    pub specs: serde_json::Value,
    pub featured: bool,
    pub price_cents: i64,
    pub stock: i64,
    pub reserved: i64,
    pub created_at: DateTime<Utc>,
}

impl Product {
    /// Units a new reservation may still claim.
    pub fn available(&self) -> i64 {
        self.stock - self.reserved
    }

    pub fn display_name(&self) -> String {
        format!("{} {}", self.brand, self.model)
    }
}

/// Input record for admin product creation. `reserved` always starts at
/// zero; `stock` must be supplied explicitly (no defaulting).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProduct {
    pub brand: String,
    pub model: String,
    pub category: String,
    #[serde(default)]
    pub specs: serde_json::Value,
    #[serde(default)]
    pub featured: bool,
    pub price_cents: i64,
    pub stock: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub product_id: Uuid,
    /// Display snapshot taken from the product row at creation.
    pub product_name: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub total_amount_cents: i64,
    pub advance_amount_cents: i64,
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

/// Input record for order creation. Prices are not accepted from the
/// caller; totals are derived from the product row server-side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    pub product_id: Uuid,
    pub quantity: i64,
    pub customer_name: String,
    pub phone: String,
    pub address: String,
}
