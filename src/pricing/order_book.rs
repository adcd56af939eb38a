//! Greedy fills across a price ladder.
//!
//! A level's `price` is quoted in input units per output unit, and its
//! `quantity` is in output units.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

use super::FEE_DENOMINATOR;
use crate::state::OrderBookOrder;

pub(crate) fn dec(n: i128) -> Decimal {
    Decimal::from_i128(n).unwrap_or(Decimal::MAX)
}

pub(crate) fn truncate(d: Decimal) -> i128 {
    d.trunc().to_i128().unwrap_or(0)
}

/// Output received for `in_qty`, walking levels from the best price.
pub fn fill_out(book: &[OrderBookOrder], in_qty: Decimal) -> Decimal {
    let mut remaining = in_qty;
    let mut out = Decimal::ZERO;
    for level in book {
        if remaining <= Decimal::ZERO {
            break;
        }
        if level.price.is_zero() {
            continue;
        }
        let quantity = dec(level.quantity);
        let available = quantity * level.price;
        if available > remaining {
            out += remaining / level.price;
            remaining = Decimal::ZERO;
        } else {
            out += quantity;
            remaining -= available;
        }
    }
    out
}

/// Input needed for `out_qty`, walking levels from the best price.
pub fn fill_in(book: &[OrderBookOrder], out_qty: Decimal) -> Decimal {
    let mut remaining = out_qty;
    let mut paid = Decimal::ZERO;
    for level in book {
        if remaining <= Decimal::ZERO {
            break;
        }
        let quantity = dec(level.quantity);
        if quantity > remaining {
            paid += remaining * level.price;
            remaining = Decimal::ZERO;
        } else {
            paid += quantity * level.price;
            remaining -= quantity;
        }
    }
    paid
}

pub fn deduct_fee(in_qty: i128, fee: i128) -> i128 {
    in_qty * (FEE_DENOMINATOR - fee) / FEE_DENOMINATOR
}

pub fn add_fee(amount: Decimal, fee: i128) -> Decimal {
    amount + amount * dec(fee) / dec(FEE_DENOMINATOR)
}
