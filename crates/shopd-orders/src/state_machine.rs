//! Order lifecycle state machine.
//!
//! # Design
//!
//! An order occupies exactly one `(status, payment_status)` pair. Every
//! lifecycle event is resolved through [`transition`], which either returns
//! the [`Transition`] to commit or rejects the event:
//!
//! 1. **Legal transitions only.** Events that do not match the current pair
//!    return [`TransitionError::Illegal`]; events on a terminal order return
//!    [`TransitionError::Terminal`]. Nothing is coerced.
//! 2. **One-directional flow.** No transition re-enters an earlier pair, so
//!    replaying a transition against the committed row always fails rather
//!    than double-applying its ledger effect.
//!
//! # State diagram
//!
//! ```text
//!                          MarkVerified (stamps verified_at, stays put)
//!                            ┌────┐
//!                            ▼    │
//!    create ──► (pending_verification, unpaid)
//!                 │                        │
//!                 │ AdvanceReceived        │ Cancel
//!                 │   reserve(qty)         │
//!                 ▼                        ▼
//!      (advance_paid, advance_received)  (cancelled, unpaid)  [terminal]
//!         │                │       │
//!         │ FullyPaid      │ Refunded | Cancel
//!         │  consume(qty)  │   release(qty)
//!         ▼                ▼
//!  (completed, fully_paid)  (cancelled, refunded)   [both terminal]
//! ```
//!
//! The table row an event lands on also names the stock-ledger effect the
//! coordinator must commit atomically with the order row, and which
//! lifecycle timestamp to stamp (set-once).

use chrono::{DateTime, Utc};
use shopd_schemas::{Order, OrderStatus, PaymentStatus};

// ---------------------------------------------------------------------------
// OrderEvent
// ---------------------------------------------------------------------------

/// Events that drive order lifecycle transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderEvent {
    /// Admin verified the order details. Stock no-op; audit stamp only.
    MarkVerified,
    /// Admin recorded the 20% advance payment (→ reservation).
    AdvanceReceived,
    /// Admin recorded the remaining balance (→ reservation consumed).
    FullyPaid,
    /// Admin refunded the advance (→ reservation released).
    Refunded,
    /// Owner or admin cancelled the order.
    Cancel,
}

impl OrderEvent {
    /// Map a requested target payment status onto the event it represents.
    /// `Unpaid` is the initial state, never a legal target.
    pub fn from_payment_status(target: PaymentStatus) -> Option<OrderEvent> {
        match target {
            PaymentStatus::Unpaid => None,
            PaymentStatus::AdvanceReceived => Some(OrderEvent::AdvanceReceived),
            PaymentStatus::FullyPaid => Some(OrderEvent::FullyPaid),
            PaymentStatus::Refunded => Some(OrderEvent::Refunded),
        }
    }
}

// ---------------------------------------------------------------------------
// Transition
// ---------------------------------------------------------------------------

/// Stock-ledger side effect carried by a transition. The quantity is always
/// the order's own `quantity`; no transition moves a partial amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerEffect {
    Reserve,
    Consume,
    Release,
}

/// Which set-once lifecycle timestamp a transition stamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stamp {
    Verified,
    Paid,
    Completed,
}

/// A resolved table row: the pair to move to, the ledger effect to commit
/// with it, and the timestamp to stamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub effect: Option<LedgerEffect>,
    pub stamp: Option<Stamp>,
}

impl Transition {
    /// Write this transition onto an order row. Timestamps are set-once:
    /// an already-stamped field is left untouched.
    pub fn apply_to(&self, order: &mut Order, now: DateTime<Utc>) {
        order.status = self.status;
        order.payment_status = self.payment_status;
        match self.stamp {
            Some(Stamp::Verified) => {
                order.verified_at.get_or_insert(now);
            }
            Some(Stamp::Paid) => {
                order.paid_at.get_or_insert(now);
            }
            Some(Stamp::Completed) => {
                order.completed_at.get_or_insert(now);
            }
            None => {}
        }
    }
}

// ---------------------------------------------------------------------------
// TransitionError
// ---------------------------------------------------------------------------

/// Returned when an event cannot legally be applied to the current pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionError {
    /// The order is in a terminal status; nothing ever applies again.
    Terminal { status: OrderStatus },
    /// The event does not match the current `(status, payment_status)` pair.
    Illegal {
        status: OrderStatus,
        payment_status: PaymentStatus,
        event: OrderEvent,
    },
}

impl std::fmt::Display for TransitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Terminal { status } => {
                write!(f, "order is terminal ({})", status.as_str())
            }
            Self::Illegal {
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
        }
    }
}

impl std::error::Error for TransitionError {}

// ---------------------------------------------------------------------------
// The table
// ---------------------------------------------------------------------------

/// Resolve one event against the current pair.
///
/// # Errors
/// [`TransitionError::Terminal`] for any event on `completed`/`cancelled`;
/// [`TransitionError::Illegal`] for every (pair, event) combination not in
/// the table. The caller's row is untouched either way.
pub fn transition(
    status: OrderStatus,
    payment_status: PaymentStatus,
    event: OrderEvent,
) -> Result<Transition, TransitionError> {
    // OrderEvent and PaymentStatus share variant names (AdvanceReceived,
    // FullyPaid, Refunded), so only OrderStatus is safe to glob here.
    use OrderStatus::*;

    if status.is_terminal() {
        return Err(TransitionError::Terminal { status });
    }

    match (status, payment_status, event) {
        // Verification: audit stamp only, pair unchanged. Re-verifying is
        // accepted; the stamp itself is set-once.
        (PendingVerification, PaymentStatus::Unpaid, OrderEvent::MarkVerified) => Ok(Transition {
            status: PendingVerification,
            payment_status: PaymentStatus::Unpaid,
            effect: None,
            stamp: Some(Stamp::Verified),
        }),

        // Advance payment: the authoritative reservation point.
        (PendingVerification, PaymentStatus::Unpaid, OrderEvent::AdvanceReceived) => {
            Ok(Transition {
                status: AdvancePaid,
                payment_status: PaymentStatus::AdvanceReceived,
                effect: Some(LedgerEffect::Reserve),
                stamp: Some(Stamp::Paid),
            })
        }

        // Full payment: the reservation becomes a permanent deduction.
        (AdvancePaid, PaymentStatus::AdvanceReceived, OrderEvent::FullyPaid) => Ok(Transition {
            status: Completed,
            payment_status: PaymentStatus::FullyPaid,
            effect: Some(LedgerEffect::Consume),
            stamp: Some(Stamp::Completed),
        }),

        // Refund of the advance: reservation handed back.
        (AdvancePaid, PaymentStatus::AdvanceReceived, OrderEvent::Refunded) => Ok(Transition {
            status: Cancelled,
            payment_status: PaymentStatus::Refunded,
            effect: Some(LedgerEffect::Release),
            stamp: None,
        }),

        // Cancel before anything was reserved.
        (PendingVerification, PaymentStatus::Unpaid, OrderEvent::Cancel) => Ok(Transition {
            status: Cancelled,
            payment_status: PaymentStatus::Unpaid,
            effect: None,
            stamp: None,
        }),

        // Admin cancel of a paid order: payment-wise identical to a refund.
        // Who may trigger it is the coordinator's concern, not the table's.
        (AdvancePaid, PaymentStatus::AdvanceReceived, OrderEvent::Cancel) => Ok(Transition {
            status: Cancelled,
            payment_status: PaymentStatus::Refunded,
            effect: Some(LedgerEffect::Release),
            stamp: None,
        }),

        (status, payment_status, event) => Err(TransitionError::Illegal {
            status,
            payment_status,
            event,
        }),
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
