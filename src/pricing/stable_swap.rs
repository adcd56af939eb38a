//! Two-asset stableswap invariant solved with integer fixed-point iteration.
//!
//! Reserves are scaled by the per-asset multipliers before solving and the
//! solved balance is divided back down before it is compared with the raw
//! reserve.

use num_bigint::BigInt;
use num_traits::{Signed, Zero};

use super::{big, to_i128, AnnPolicy, StableSwapParams, FEE_DENOMINATOR};
use crate::error::PricingError;

const N_COINS: i128 = 2;
const MAX_ITERATIONS: usize = 256;

/// Outcome of one fixed-point solve. `converged` is false when the
/// iteration cap was hit or a step would divide by zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Solution {
    pub value: BigInt,
    pub iterations: usize,
    pub converged: bool,
}

impl StableSwapParams {
    pub fn ann(&self) -> i128 {
        match self.ann {
            AnnPolicy::Exponent => self.amp.saturating_mul(N_COINS.pow(N_COINS as u32)),
            AnnPolicy::Linear => self.amp.saturating_mul(N_COINS),
        }
    }

    /// Amplification and both multipliers are positive.
    pub fn is_valid(&self) -> bool {
        self.ann() > 0 && self.multipliers.iter().all(|m| *m > 0)
    }

    fn check(&self, fee: i128) -> Result<(), PricingError> {
        if !self.is_valid() {
            return Err(PricingError::InvalidAmplification(self.amp));
        }
        if !(0..FEE_DENOMINATOR).contains(&fee) {
            return Err(PricingError::InvalidFee(fee));
        }
        Ok(())
    }

    fn scaled(&self, reserves: [i128; 2]) -> [BigInt; 2] {
        [
            big(reserves[0] * self.multipliers[0]),
            big(reserves[1] * self.multipliers[1]),
        ]
    }

    /// Solve the invariant `D` for raw reserves.
    pub fn invariant(&self, reserves: [i128; 2]) -> Solution {
        let [ra, rb] = self.scaled(reserves);
        solve_d(self.ann(), &ra, &rb)
    }

    /// Scaled balance of the opposite asset once one side holds `balance`,
    /// keeping `d` fixed.
    fn solve_y(&self, d: &BigInt, balance: &BigInt) -> Solution {
        let ann = big(self.ann());
        if !ann.is_positive() || balance.is_zero() {
            return Solution {
                value: BigInt::zero(),
                iterations: 0,
                converged: false,
            };
        }
        let d_cubed = d * d * d;
        let c = &d_cubed / (big(N_COINS * N_COINS) * &ann * balance);
        let b = balance + d / &ann;

        let mut y = d.clone();
        for i in 0..MAX_ITERATIONS {
            let prev = y.clone();
            let denominator = big(2) * &y + &b - d;
            if denominator.is_zero() {
                return Solution {
                    value: y,
                    iterations: i + 1,
                    converged: false,
                };
            }
            y = (&y * &y + &c) / denominator;
            // stop once successive estimates are within one unit
            if (&y - &prev).abs() <= big(1) {
                return Solution {
                    value: y,
                    iterations: i + 1,
                    converged: true,
                };
            }
        }
        Solution {
            value: y,
            iterations: MAX_ITERATIONS,
            converged: false,
        }
    }

    /// Quote the output for selling `in_qty` of asset `a` (`input_is_a`) or `b`.
    pub fn amount_out(
        &self,
        reserves: [i128; 2],
        input_is_a: bool,
        in_qty: i128,
        fee: i128,
    ) -> Result<i128, PricingError> {
        self.check(fee)?;
        let in_qty = if self.fee_on_input {
            in_qty * (FEE_DENOMINATOR - fee) / FEE_DENOMINATOR
        } else {
            in_qty
        };
        let (i, o) = if input_is_a { (0, 1) } else { (1, 0) };
        let d = self.invariant(reserves).value;
        let scaled = self.scaled(reserves);
        let balance = &scaled[i] + big(in_qty * self.multipliers[i]);
        if !balance.is_positive() || d.is_zero() {
            return Ok(0);
        }
        let y = self.solve_y(&d, &balance).value / big(self.multipliers[o]);
        let mut out = reserves[o] - to_i128(&y);
        if !self.fee_on_input {
            out = out * (FEE_DENOMINATOR - fee) / FEE_DENOMINATOR;
        }
        Ok(out.max(0))
    }

    /// Quote the input needed to take `out_qty` of asset `a` (`output_is_a`) or `b`.
    pub fn amount_in(
        &self,
        reserves: [i128; 2],
        output_is_a: bool,
        out_qty: i128,
        fee: i128,
    ) -> Result<i128, PricingError> {
        self.check(fee)?;
        let out_qty = if self.fee_on_input {
            out_qty
        } else {
            out_qty * FEE_DENOMINATOR / (FEE_DENOMINATOR - fee)
        };
        let (o, i) = if output_is_a { (0, 1) } else { (1, 0) };
        if out_qty >= reserves[o] {
            return Err(PricingError::InsufficientLiquidity {
                requested: out_qty,
                reserve: reserves[o],
            });
        }
        let d = self.invariant(reserves).value;
        let scaled = self.scaled(reserves);
        let balance = &scaled[o] - big(out_qty * self.multipliers[o]);
        if d.is_zero() {
            return Ok(0);
        }
        let y = self.solve_y(&d, &balance).value / big(self.multipliers[i]);
        let mut amount = to_i128(&y) - reserves[i];
        if self.fee_on_input {
            amount = amount * FEE_DENOMINATOR / (FEE_DENOMINATOR - fee);
        }
        Ok(amount.max(0))
    }
}

/// Newton iteration for `D`, stopping once successive iterates differ by at
/// most one unit. With floor division the iterates can alternate between
/// two neighbours, so a strict `< 1` would only stop on equality.
fn solve_d(ann: i128, ra: &BigInt, rb: &BigInt) -> Solution {
    let s = ra + rb;
    if s.is_zero() || ra.is_zero() || rb.is_zero() {
        return Solution {
            value: BigInt::zero(),
            iterations: 0,
            converged: true,
        };
    }
    if ann <= 0 {
        return Solution {
            value: BigInt::zero(),
            iterations: 0,
            converged: false,
        };
    }
    let ann = big(ann);
    let n = big(N_COINS);
    let nn = big(N_COINS.pow(N_COINS as u32));

    let mut d = s.clone();
    for i in 0..MAX_ITERATIONS {
        let d_p = &d * &d * &d / (&nn * ra * rb);
        let prev = d.clone();
        let denominator = (&ann - big(1)) * &d + (&n + big(1)) * &d_p;
        if denominator.is_zero() {
            return Solution {
                value: d,
                iterations: i + 1,
                converged: false,
            };
        }
        d = &d * (&ann * &s + &d_p * &n) / denominator;
        if (&d - &prev).abs() <= big(1) {
            return Solution {
                value: d,
                iterations: i + 1,
                converged: true,
            };
        }
    }
    Solution {
        value: d,
        iterations: MAX_ITERATIONS,
        converged: false,
    }
}
