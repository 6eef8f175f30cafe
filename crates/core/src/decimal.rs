//! Fixed-point decimal conventions.
//!
//! Quantities and money are carried as [`rust_decimal::Decimal`] at 4
//! fractional digits throughout the engine. Rounding to an account's display
//! precision (2 digits, half-up) happens exactly once: when a journal entry
//! is posted. Intermediate arithmetic never rounds.

use rust_decimal::{Decimal, RoundingStrategy};

/// Fractional digits carried on quantities.
pub const QTY_SCALE: u32 = 4;

/// Fractional digits carried on monetary amounts between postings.
pub const MONEY_SCALE: u32 = 4;

/// Display precision applied when money hits a journal line.
pub const POSTING_SCALE: u32 = 2;

/// Round a monetary amount half-up to posting precision.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(POSTING_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Normalize a quantity to the engine's fixed 4-digit scale.
pub fn normalize_qty(qty: Decimal) -> Decimal {
    qty.round_dp_with_strategy(QTY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Normalize a carried monetary amount to the engine's 4-digit scale.
pub fn normalize_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}
