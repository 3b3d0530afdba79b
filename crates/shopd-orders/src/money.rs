//! Integer-cents money representation.
//!
//! # Design invariant
//!
//! All amounts inside the service are `i64` integer cents (1 currency unit =
//! 100 cents). This keeps totals, the advance computation, and equality
//! checks exact; `f64` appears **only** at the wire boundary:
//!
//! | Direction               | Function          | Notes                  |
//! |-------------------------|-------------------|------------------------|
//! | internal → API response | [`cents_to_price`] | Serialization only    |
//! | API request → internal  | [`price_to_cents`] | Parsing only          |
//!
//! The advance is a fixed 20% of the order total, rounded half-up in cents,
//! which is exactly `round(total × 0.20, 2 decimals)` on the wire
//! (999.99 → 200.00).

/// Scale factor: 1 currency unit = 100 cents.
pub const CENTS_PER_UNIT: i64 = 100;

/// Advance payment rate, percent of the order total.
pub const ADVANCE_RATE_PERCENT: i64 = 20;

// ---------------------------------------------------------------------------
// MoneyError
// ---------------------------------------------------------------------------

/// Errors returned when an amount is not representable in integer cents.
///
/// All variants fire in **all** build profiles, debug and release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoneyError {
    /// Input was `NaN` or infinite. Indicates a broken upstream value that
    /// must not propagate into the internal `i64` representation.
    NotFinite,
    /// Input would overflow `i64` after scaling to cents.
    OutOfRange,
    /// `unit_price × quantity` overflows `i64`.
    TotalOverflow {
        unit_price_cents: i64,
        quantity: i64,
    },
}

impl std::fmt::Display for MoneyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MoneyError::NotFinite => {
                write!(f, "price_to_cents: non-finite input (NaN or Inf)")
            }
            MoneyError::OutOfRange => {
                write!(f, "price_to_cents: amount out of i64 range after scaling")
            }
            MoneyError::TotalOverflow {
                unit_price_cents,
                quantity,
            } => write!(
                f,
                "order total overflows: {unit_price_cents} cents x {quantity}"
            ),
        }
    }
}

impl std::error::Error for MoneyError {}

// ---------------------------------------------------------------------------
// Wire-boundary conversion
// ---------------------------------------------------------------------------

/// Convert integer cents to `f64` currency units for an API response.
///
/// `f64` has a 53-bit mantissa, exact for any realistic amount well below
/// 2^53 cents.
pub fn cents_to_price(cents: i64) -> f64 {
    cents as f64 / CENTS_PER_UNIT as f64
}

/// Convert an `f64` currency amount from the wire into integer cents,
/// rounding to the nearest cent.
///
/// # Errors
/// [`MoneyError::NotFinite`] for `NaN`/infinite input; [`MoneyError::OutOfRange`]
/// when the scaled value would overflow `i64`.
pub fn price_to_cents(price: f64) -> Result<i64, MoneyError> {
    if !price.is_finite() {
        return Err(MoneyError::NotFinite);
    }
    let scaled = price * CENTS_PER_UNIT as f64;
    // Guard against f64→i64 cast overflow (the cast saturates; we must reject).
    if scaled > i64::MAX as f64 || scaled < i64::MIN as f64 {
        return Err(MoneyError::OutOfRange);
    }
    Ok(scaled.round() as i64)
}

// ---------------------------------------------------------------------------
// Order amounts
// ---------------------------------------------------------------------------

/// Total owed for `quantity` units at `unit_price_cents` each.
///
/// # Errors
/// [`MoneyError::TotalOverflow`] when the product overflows `i64`. Positivity
/// of both inputs is the caller's validation concern.
pub fn order_total(unit_price_cents: i64, quantity: i64) -> Result<i64, MoneyError> {
    unit_price_cents
        .checked_mul(quantity)
        .ok_or(MoneyError::TotalOverflow {
            unit_price_cents,
            quantity,
        })
}

/// The advance owed on a total: 20%, rounded half-up to the cent.
///
/// Widens through `i128` so the intermediate `total × 20` cannot overflow;
/// the result is at most `total / 5 + 1` and always fits back in `i64`.
pub fn advance_from_total(total_cents: i64) -> i64 {
    debug_assert!(total_cents >= 0, "order totals are never negative");
    ((total_cents as i128 * ADVANCE_RATE_PERCENT as i128 + 50) / 100) as i64
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // --- Advance computation ---

    #[test]
    fn advance_is_twenty_percent_of_round_total() {
        // 1000.00 → 200.00
        assert_eq!(advance_from_total(100_000), 20_000);
    }

    #[test]
    fn advance_rounds_199_998_up_to_200() {
        // 999.99 × 0.20 = 199.998 → 200.00, the documented rounding case.
        assert_eq!(advance_from_total(99_999), 20_000);
    }

    #[test]
    fn advance_rounds_down_below_the_half_cent() {
        // 1.02 × 0.20 = 0.204 → 0.20
        assert_eq!(advance_from_total(102), 20);
        // 0.02 × 0.20 = 0.004 → 0.00
        assert_eq!(advance_from_total(2), 0);
    }

    #[test]
    fn advance_rounds_up_from_the_half_cent() {
        // 0.03 × 0.20 = 0.006 → 0.01
        assert_eq!(advance_from_total(3), 1);
    }

    #[test]
    fn advance_handles_huge_totals_without_overflow() {
        let total = i64::MAX / 2;
        let advance = advance_from_total(total);
        assert!(advance > 0 && advance <= total);
    }

    // --- Totals ---

    #[test]
    fn order_total_multiplies_exactly() {
        assert_eq!(order_total(49_999, 2), Ok(99_998));
    }

    #[test]
    fn order_total_rejects_overflow() {
        assert_eq!(
            order_total(i64::MAX, 2),
            Err(MoneyError::TotalOverflow {
                unit_price_cents: i64::MAX,
                quantity: 2,
            })
        );
    }

    // --- Wire round-trips ---

    #[test]
    fn round_trip_whole_unit_amount() {
        let cents = 150 * CENTS_PER_UNIT;
        let back = price_to_cents(cents_to_price(cents)).unwrap();
        assert_eq!(back, cents, "whole-unit round-trip must be exact");
    }

    #[test]
    fn round_trip_fractional_amount() {
        // 999.99 — the advance-rounding fixture price.
        let cents = 99_999;
        let back = price_to_cents(cents_to_price(cents)).unwrap();
        assert_eq!(back, cents, "999.99 round-trip must be exact");
    }

    #[test]
    fn price_to_cents_rounds_to_nearest() {
        assert_eq!(price_to_cents(0.005).unwrap(), 1);
        assert_eq!(price_to_cents(10.004).unwrap(), 1_000);
    }

    // --- Rejections (all build profiles) ---

    #[test]
    fn nan_is_rejected() {
        assert_eq!(price_to_cents(f64::NAN), Err(MoneyError::NotFinite));
    }

    #[test]
    fn infinities_are_rejected() {
        assert_eq!(price_to_cents(f64::INFINITY), Err(MoneyError::NotFinite));
        assert_eq!(
            price_to_cents(f64::NEG_INFINITY),
            Err(MoneyError::NotFinite)
        );
    }

    #[test]
    fn out_of_range_is_rejected() {
        assert_eq!(price_to_cents(f64::MAX), Err(MoneyError::OutOfRange));
    }
}
