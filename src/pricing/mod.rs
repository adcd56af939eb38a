//! Swap quoting strategies shared by every protocol.
//!
//! A pool picks exactly one strategy at construction time; order-book
//! protocols quote through [`crate::state::OrderBookState`] instead.

use num_bigint::BigInt;
use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::models::AssetBag;

pub mod constant_product;
pub mod order_book;
pub mod stable_swap;

/// Basis-point denominator: 10000 = 100%.
pub const FEE_DENOMINATOR: i128 = 10_000;

/// Volume fee in basis points, either one value or one per direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VolumeFee {
    Flat(i128),
    Split([i128; 2]),
}

impl Default for VolumeFee {
    fn default() -> Self {
        VolumeFee::Flat(0)
    }
}

impl VolumeFee {
    /// Fee charged when `input_is_a` selects the direction of a forward quote.
    pub fn for_amount_out(&self, input_is_a: bool) -> i128 {
        match self {
            VolumeFee::Flat(fee) => *fee,
            VolumeFee::Split([a, b]) => {
                if input_is_a {
                    *a
                } else {
                    *b
                }
            }
        }
    }

    /// Fee charged for a reverse quote that requests `output_is_b`.
    pub fn for_amount_in(&self, output_is_b: bool) -> i128 {
        self.for_amount_out(output_is_b)
    }

    /// Every component lies in `0..FEE_DENOMINATOR`.
    pub fn is_valid(&self) -> bool {
        let in_range = |fee: &i128| (0..FEE_DENOMINATOR).contains(fee);
        match self {
            VolumeFee::Flat(fee) => in_range(fee),
            VolumeFee::Split(fees) => fees.iter().all(in_range),
        }
    }
}

/// How the stable-swap amplification is turned into `Ann`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnnPolicy {
    /// `amp * N^N`, as in the original stableswap paper.
    Exponent,
    /// `amp * N`, the common variant.
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StableSwapParams {
    pub amp: i128,
    pub ann: AnnPolicy,
    pub multipliers: [i128; 2],
    pub fee_on_input: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Pricing {
    ConstantProduct,
    StableSwap(StableSwapParams),
}

impl Pricing {
    pub fn is_valid(&self) -> bool {
        match self {
            Pricing::ConstantProduct => true,
            Pricing::StableSwap(params) => params.is_valid(),
        }
    }
}

/// Result of a quote: the asset to receive (or pay) and an informational
/// price impact ratio.
#[derive(Debug, Clone, PartialEq)]
pub struct SwapQuote {
    pub assets: AssetBag,
    pub price_impact: f64,
}

impl SwapQuote {
    pub fn new(unit: &str, quantity: i128, price_impact: f64) -> Self {
        Self {
            assets: AssetBag::single(unit, quantity),
            price_impact,
        }
    }

    pub fn quantity(&self) -> i128 {
        self.assets.quantity(0).unwrap_or(0)
    }
}

pub(crate) fn big(n: i128) -> BigInt {
    BigInt::from(n)
}

pub(crate) fn to_i128(n: &BigInt) -> i128 {
    n.to_i128().unwrap_or(if n.sign() == num_bigint::Sign::Minus {
        i128::MIN
    } else {
        i128::MAX
    })
}

pub(crate) fn ratio(numerator: &BigInt, denominator: &BigInt) -> f64 {
    match (numerator.to_f64(), denominator.to_f64()) {
        (Some(n), Some(d)) if d != 0.0 => n / d,
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fee_direction_selection() {
        let fee = VolumeFee::Split([30, 50]);
        assert_eq!(fee.for_amount_out(true), 30);
        assert_eq!(fee.for_amount_out(false), 50);
        assert_eq!(fee.for_amount_in(true), 30);
        assert_eq!(VolumeFee::Flat(35).for_amount_in(false), 35);
    }

    #[test]
    fn test_fee_serde_shapes() {
        assert_eq!(serde_json::to_string(&VolumeFee::Flat(30)).unwrap(), "30");
        let split: VolumeFee = serde_json::from_str("[30,100]").unwrap();
        assert_eq!(split, VolumeFee::Split([30, 100]));
    }

    #[test]
    fn test_fee_range() {
        assert!(VolumeFee::Flat(0).is_valid());
        assert!(VolumeFee::Split([30, 9_999]).is_valid());
        assert!(!VolumeFee::Flat(FEE_DENOMINATOR).is_valid());
        assert!(!VolumeFee::Flat(-10).is_valid());
        assert!(!VolumeFee::Split([30, 10_050]).is_valid());
    }
}
