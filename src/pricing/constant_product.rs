//! `x * y = k` quoting with exact integer arithmetic.

use num_bigint::BigInt;
use num_traits::Zero;

use super::{big, ratio, to_i128, FEE_DENOMINATOR};
use crate::error::PricingError;

fn fee_modifier(fee: i128) -> Result<BigInt, PricingError> {
    if !(0..FEE_DENOMINATOR).contains(&fee) {
        return Err(PricingError::InvalidFee(fee));
    }
    Ok(big(FEE_DENOMINATOR - fee))
}

/// Output for `in_qty` sold into the pool, with the price impact ratio.
///
/// A zero output returns `(0, 0.0)` instead of an error, as does a fee
/// outside `0..FEE_DENOMINATOR`.
pub fn amount_out(in_qty: i128, reserve_in: i128, reserve_out: i128, fee: i128) -> (i128, f64) {
    let Ok(fee_modifier) = fee_modifier(fee) else {
        return (0, 0.0);
    };
    let in_qty = big(in_qty);
    let reserve_in = big(reserve_in);
    let reserve_out = big(reserve_out);
    let scale = big(FEE_DENOMINATOR);

    let numerator = &in_qty * &fee_modifier * &reserve_out;
    let denominator = &in_qty * &fee_modifier + &reserve_in * &scale;
    if denominator.is_zero() {
        return (0, 0.0);
    }
    let out = &numerator / &denominator;
    if out.is_zero() {
        return (0, 0.0);
    }

    let impact_num = &reserve_out * &in_qty * &denominator * &fee_modifier
        - &numerator * &reserve_in * &scale;
    let impact_den = &reserve_out * &in_qty * &denominator * &scale;
    (to_i128(&out), ratio(&impact_num, &impact_den))
}

/// Input needed to take `out_qty` of the asset held in `reserve_out`.
pub fn amount_in(
    out_qty: i128,
    reserve_in: i128,
    reserve_out: i128,
    fee: i128,
) -> Result<(i128, f64), PricingError> {
    if out_qty == 0 {
        return Ok((0, 0.0));
    }
    if out_qty >= reserve_out {
        return Err(PricingError::InsufficientLiquidity {
            requested: out_qty,
            reserve: reserve_out,
        });
    }
    let fee_modifier = fee_modifier(fee)?;
    let scale = big(FEE_DENOMINATOR);
    let out: BigInt = big(out_qty);
    let reserve_in = big(reserve_in);
    let reserve_out = big(reserve_out);

    let numerator = &out * &scale * &reserve_in;
    let denominator = (&reserve_out - &out) * &fee_modifier;
    if denominator.sign() != num_bigint::Sign::Plus {
        return Err(PricingError::InsufficientLiquidity {
            requested: out_qty,
            reserve: to_i128(&reserve_out),
        });
    }
    let amount = &numerator / &denominator;

    let impact_num =
        &reserve_out * &numerator * &fee_modifier - &out * &denominator * &reserve_in * &scale;
    let impact_den = &reserve_out * &numerator * &scale;
    Ok((to_i128(&amount), ratio(&impact_num, &impact_den)))
}
