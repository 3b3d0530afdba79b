//! Stock ledger arithmetic — the two per-product counters and the rules
//! that keep them legal.
//!
//! # Purpose
//! A product owns `stock` (units physically held) and `reserved` (units
//! earmarked by in-flight orders). Every committed counter pair must satisfy
//!
//! ```text
//! 0 <= reserved <= stock        available = stock - reserved
//! ```
//!
//! This module owns the three mutations and their preconditions:
//!
//! - [`StockCounters::reserve`] — earmark units for an order that just
//!   received its advance payment. Requires `available >= qty`.
//! - [`StockCounters::consume`] — convert a reservation into a permanent
//!   deduction on full payment. Requires `reserved >= qty`.
//! - [`StockCounters::release`] — hand a reservation back on refund or
//!   cancellation. Saturates at zero and reports the clamp so the caller
//!   can raise an anomaly.
//!
//! # Determinism
//! Pure value arithmetic — no IO, no time, no interior mutability. The
//! caller reads a counter snapshot, computes the successor value here, and
//! commits it conditionally on the snapshot it read; the conditional commit
//! (not this module) is what makes the read-modify-write atomic under
//! concurrency.

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// All refusals the stock arithmetic can surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockError {
    /// Quantities must be strictly positive.
    NonPositiveQty { qty: i64 },
    /// `reserve` would exceed the available headroom.
    InsufficientStock { requested: i64, available: i64 },
    /// `consume` found fewer reserved units than the order holds. This is
    /// never a user error: it means a transition upstream consumed or
    /// released units it did not own.
    ReservedUnderflow { reserved: i64, requested: i64 },
    /// The input counters already violate `0 <= reserved <= stock`; the row
    /// was corrupted before it reached this module (bad migration or manual
    /// edit, not a runtime race).
    CorruptCounters { stock: i64, reserved: i64 },
}

impl std::fmt::Display for StockError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NonPositiveQty { qty } => {
                write!(f, "stock invariant: qty must be > 0, got {qty}")
            }
            Self::InsufficientStock {
                requested,
                available,
            } => write!(
                f,
                "insufficient stock: requested {requested}, available {available}"
            ),
            Self::ReservedUnderflow {
                reserved,
                requested,
            } => write!(
                f,
                "stock invariant: cannot take {requested} from reserved {reserved}"
            ),
            Self::CorruptCounters { stock, reserved } => write!(
                f,
                "stock invariant: counters corrupt (stock {stock}, reserved {reserved})"
            ),
        }
    }
}

impl std::error::Error for StockError {}

// ---------------------------------------------------------------------------
// Counters
// ---------------------------------------------------------------------------

/// A product's counter pair at one observed instant.
///
/// Operations take the pair by value and return the successor pair; the
/// input is never half-applied. Constructing via [`StockCounters::new`]
/// validates the invariant once, so downstream arithmetic can rely on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockCounters {
    pub stock: i64,
    pub reserved: i64,
}

/// Result of a [`StockCounters::release`].
///
/// `released` may be less than `requested` when the row held fewer reserved
/// units than the order claims — a recovery-path clamp the caller must log
/// as an anomaly, never treat as normal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReleaseOutcome {
    pub counters: StockCounters,
    pub requested: i64,
    pub released: i64,
}

impl ReleaseOutcome {
    pub fn clamped(&self) -> bool {
        self.released < self.requested
    }
}

impl StockCounters {
    /// Build a validated counter pair from stored values.
    ///
    /// # Errors
    /// [`StockError::CorruptCounters`] if the pair violates
    /// `0 <= reserved <= stock`.
    pub fn new(stock: i64, reserved: i64) -> Result<Self, StockError> {
        let c = Self { stock, reserved };
        c.validate()?;
        Ok(c)
    }

    /// Units a new reservation may still claim.
    pub fn available(&self) -> i64 {
        self.stock - self.reserved
    }

    // -----------------------------------------------------------------------
    // Mutations (value in, successor value out)
    // -----------------------------------------------------------------------

    /// Earmark `qty` units: `reserved += qty`.
    ///
    /// # Errors
    /// [`StockError::InsufficientStock`] when `available < qty`.
    pub fn reserve(self, qty: i64) -> Result<StockCounters, StockError> {
        Self::validate_qty(qty)?;
        self.validate()?;
        if self.available() < qty {
            return Err(StockError::InsufficientStock {
                requested: qty,
                available: self.available(),
            });
        }
        Ok(StockCounters {
            stock: self.stock,
            reserved: self.reserved + qty,
        })
    }

    /// Convert `qty` reserved units into a permanent deduction:
    /// `stock -= qty; reserved -= qty`.
    ///
    /// # Errors
    /// [`StockError::ReservedUnderflow`] when `reserved < qty`. Given the
    /// input invariant, success implies the resulting stock stays >= 0.
    pub fn consume(self, qty: i64) -> Result<StockCounters, StockError> {
        Self::validate_qty(qty)?;
        self.validate()?;
        if self.reserved < qty {
            return Err(StockError::ReservedUnderflow {
                reserved: self.reserved,
                requested: qty,
            });
        }
        Ok(StockCounters {
            stock: self.stock - qty,
            reserved: self.reserved - qty,
        })
    }

    /// Hand back up to `qty` reserved units: `reserved -= min(qty, reserved)`.
    ///
    /// Never fails on shortfall; instead the outcome records how many units
    /// were actually released so the caller can log the clamp.
    pub fn release(self, qty: i64) -> Result<ReleaseOutcome, StockError> {
        Self::validate_qty(qty)?;
        self.validate()?;
        let released = qty.min(self.reserved);
        Ok(ReleaseOutcome {
            counters: StockCounters {
                stock: self.stock,
                reserved: self.reserved - released,
            },
            requested: qty,
            released,
        })
    }

    // -----------------------------------------------------------------------
    // Private helpers
    // -----------------------------------------------------------------------

    fn validate(self) -> Result<(), StockError> {
        if self.stock < 0 || self.reserved < 0 || self.reserved > self.stock {
            return Err(StockError::CorruptCounters {
                stock: self.stock,
                reserved: self.reserved,
            });
        }
        Ok(())
    }

    fn validate_qty(qty: i64) -> Result<(), StockError> {
        if qty <= 0 {
            return Err(StockError::NonPositiveQty { qty });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
