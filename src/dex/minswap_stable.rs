//! Minswap stable pools (DJED/iUSD, DJED/USDC, DJED/USDM).
//!
//! Each pool is its own script with a fixed pair, so every pool gets its own
//! descriptor. Reserves come from the datum balances, not the UTxO value.
//!
//! Pool datum (constructor 0):
//!   [0] balances         [int, int]
//!   [1] total_liquidity  int
//!   [2] amp              int
//!   [3] order_hash       bytes
use ciborium::value::Value;

use super::cbor::{
    bytes_value, constr, constr_value, int_list_value, int_value, Fields, FromPlutus, ToPlutus,
};
use super::minswap::{pair_placeholder, OrderStep};
use super::{BatcherFee, PoolDatum, PoolDescriptor, PoolProtocol, PoolSelector};
use crate::error::{DatumError, PoolError};
use crate::models::{AssetBag, OrderType};
use crate::pricing::{AnnPolicy, Pricing, StableSwapParams, VolumeFee};
use crate::state::PoolDraft;

pub use super::minswap::MinswapOrderDatum;

pub const DEX_NAME: &str = "MinswapStable";

const DJED: &str =
    "8db269c3ec630e06ae29f74bc39edd1f87c819f1056206e879a1cd61446a65644d6963726f555344";
const IUSD: &str = "f66d78b4a3cb3d37afa0ec36461e51ecbde00f26c8f0a68f94b6988069555344";
const USDC: &str = "25c5de5f5b286073c593edfd77b48abc7a48e5a4f3d4cd9d428ff93555534443";
const USDM: &str = "c48cbb3d5e57ed56e276bc45f99ab39abe94e6cd7ac39fb402da47ad0014df105553444d";

const DJED_IUSD_NFT: &str =
    "5d4b6afd3344adcf37ccef5558bb87f522874578c32f17160512e398444a45442d695553442d534c50";
const DJED_USDC_NFT: &str =
    "d97fa91daaf63559a253970365fb219dc4364c028e5fe0606cdbfff9555344432d444a45442d534c50";
const DJED_USDM_NFT: &str =
    "07b0869ed7488657e24ac9b27b3f0fb4f76757f444197b2a38a15c3c444a45442d5553444d2d534c50";

type Units = &'static [&'static str];

const fn descriptor(nft: Units, pool: Units, order: Units) -> PoolDescriptor {
    PoolDescriptor {
        dex_name: DEX_NAME,
        pool_policy: Some(nft),
        lp_policy: None,
        dex_policy: None,
        order_selector: order,
        pool_selector: PoolSelector {
            addresses: pool,
            assets: nft,
        },
        default_fee: VolumeFee::Flat(1),
        batcher_fee: BatcherFee::MinDiscount {
            base: 2_000_000,
            divisor: 100_000,
            cap: 500_000,
        },
        deposit: 2_000_000,
    }
}

static DJED_IUSD_DESCRIPTOR: PoolDescriptor = descriptor(
    &[DJED_IUSD_NFT],
    &["addr1wy7kkcpuf39tusnnyga5t2zcul65dwx9yqzg7sep3cjscesx2q5m5"],
    &["addr1w9xy6edqv9hkptwzewns75ehq53nk8t73je7np5vmj3emps698n9g"],
);

static DJED_USDC_DESCRIPTOR: PoolDescriptor = descriptor(
    &[DJED_USDC_NFT],
    &["addr1wx8d45xlfrlxd7tctve8xgdtk59j849n00zz2pgyvv47t8sxa6t53"],
    &["addr1w93d8cuht3hvqt2qqfjqgyek3gk5d6ss2j93e5sh505m0ng8cmze2"],
);

static DJED_USDM_DESCRIPTOR: PoolDescriptor = descriptor(
    &[DJED_USDM_NFT],
    &["addr1wxxdvtj6y4fut4tmu796qpvy2xujtd836yg69ahat3e6jjcelrf94"],
    &["addr1wxr9ppdymqgw6g0hvaaa7wc6j0smwh730ujx6lczgdynehsguav8d"],
);

/// One stable pool: its pair in reserve order, descriptor and decimal scaling.
#[derive(Debug, Clone, Copy)]
pub struct MinswapStable {
    pub name: &'static str,
    pub pair: [&'static str; 2],
    pub multipliers: [i128; 2],
    descriptor: &'static PoolDescriptor,
}

pub const DJED_IUSD: MinswapStable = MinswapStable {
    name: "DJED-iUSD",
    pair: [DJED, IUSD],
    multipliers: [1, 1],
    descriptor: &DJED_IUSD_DESCRIPTOR,
};

pub const DJED_USDC: MinswapStable = MinswapStable {
    name: "DJED-USDC",
    pair: [USDC, DJED],
    multipliers: [1, 100],
    descriptor: &DJED_USDC_DESCRIPTOR,
};

pub const DJED_USDM: MinswapStable = MinswapStable {
    name: "DJED-USDM",
    pair: [DJED, USDM],
    multipliers: [1, 1],
    descriptor: &DJED_USDM_DESCRIPTOR,
};

pub const POOLS: [MinswapStable; 3] = [DJED_IUSD, DJED_USDC, DJED_USDM];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinswapStablePoolDatum {
    pub balances: Vec<i128>,
    pub total_liquidity: i128,
    pub amp: i128,
    pub order_hash: Vec<u8>,
    /// Filled in from the pool being decoded; not part of the encoding.
    pub pair: Option<[&'static str; 2]>,
}

impl FromPlutus for MinswapStablePoolDatum {
    fn from_plutus(value: &Value) -> Result<Self, DatumError> {
        let mut f = Fields::expect(value, "MinswapStablePoolDatum", 0, 4)?;
        Ok(Self {
            balances: f.int_list()?,
            total_liquidity: f.int()?,
            amp: f.int()?,
            order_hash: f.bytes()?,
            pair: None,
        })
    }
}

impl ToPlutus for MinswapStablePoolDatum {
    fn to_plutus(&self) -> Value {
        constr_value(
            0,
            vec![
                int_list_value(&self.balances),
                int_value(self.total_liquidity),
                int_value(self.amp),
                bytes_value(&self.order_hash),
            ],
        )
    }
}

impl PoolDatum for MinswapStablePoolDatum {
    fn pool_pair(&self) -> Option<Vec<String>> {
        self.pair.map(|pair| pair.iter().map(|u| u.to_string()).collect())
    }
}

/// Stable order steps, addressing coins by their index in the pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StableStep {
    SwapExactIn {
        input_coin: i128,
        output_coin: i128,
        minimum_receive: i128,
    },
    Deposit {
        expected_receive: i128,
    },
    Withdraw {
        expected_receive: Vec<i128>,
    },
    WithdrawOneCoin {
        coin: i128,
        expected_receive: i128,
    },
}

impl FromPlutus for StableStep {
    fn from_plutus(value: &Value) -> Result<Self, DatumError> {
        let (alt, items) = constr(value)?;
        match alt {
            0 => {
                let mut f = Fields::from_items(items, "StableSwapExactIn", 3)?;
                Ok(StableStep::SwapExactIn {
                    input_coin: f.int()?,
                    output_coin: f.int()?,
                    minimum_receive: f.int()?,
                })
            }
            1 => Ok(StableStep::Deposit {
                expected_receive: Fields::from_items(items, "StableDeposit", 1)?.int()?,
            }),
            2 => Ok(StableStep::Withdraw {
                expected_receive: Fields::from_items(items, "StableWithdraw", 1)?.int_list()?,
            }),
            4 => {
                let mut f = Fields::from_items(items, "StableWithdrawOneCoin", 2)?;
                Ok(StableStep::WithdrawOneCoin {
                    coin: f.int()?,
                    expected_receive: f.int()?,
                })
            }
            found => Err(DatumError::UnknownVariant {
                schema: "StableStep",
                found,
            }),
        }
    }
}

impl ToPlutus for StableStep {
    fn to_plutus(&self) -> Value {
        match self {
            StableStep::SwapExactIn {
                input_coin,
                output_coin,
                minimum_receive,
            } => constr_value(
                0,
                vec![int_value(*input_coin), int_value(*output_coin), int_value(*minimum_receive)],
            ),
            StableStep::Deposit { expected_receive } => {
                constr_value(1, vec![int_value(*expected_receive)])
            }
            StableStep::Withdraw { expected_receive } => {
                constr_value(2, vec![int_list_value(expected_receive)])
            }
            StableStep::WithdrawOneCoin {
                coin,
                expected_receive,
            } => constr_value(4, vec![int_value(*coin), int_value(*expected_receive)]),
        }
    }
}

fn coin_placeholder(coin: i128, quantity: i128) -> AssetBag {
    AssetBag::single(if coin == 0 { "asset_a" } else { "asset_b" }, quantity)
}

impl OrderStep for StableStep {
    fn requested_amount(&self) -> AssetBag {
        match self {
            StableStep::SwapExactIn {
                output_coin,
                minimum_receive,
                ..
            } => coin_placeholder(*output_coin, *minimum_receive),
            StableStep::Deposit { expected_receive } => AssetBag::single("lp", *expected_receive),
            StableStep::Withdraw { expected_receive } => pair_placeholder(
                expected_receive.first().copied().unwrap_or(0),
                expected_receive.get(1).copied().unwrap_or(0),
            ),
            StableStep::WithdrawOneCoin {
                coin,
                expected_receive,
            } => coin_placeholder(*coin, *expected_receive),
        }
    }

    fn order_type(&self) -> OrderType {
        match self {
            StableStep::SwapExactIn { .. } => OrderType::Swap,
            StableStep::Deposit { .. } => OrderType::Deposit,
            StableStep::Withdraw { .. } | StableStep::WithdrawOneCoin { .. } => OrderType::Withdraw,
        }
    }
}

pub type MinswapStableOrderDatum = MinswapOrderDatum<StableStep>;

impl PoolProtocol for MinswapStable {
    type Datum = MinswapStablePoolDatum;

    fn descriptor(&self) -> &'static PoolDescriptor {
        self.descriptor
    }

    fn decode_datum(&self, cbor_hex: &str) -> Result<MinswapStablePoolDatum, DatumError> {
        let mut datum = MinswapStablePoolDatum::from_cbor(cbor_hex)?;
        datum.pair = Some(self.pair);
        Ok(datum)
    }

    fn supports_fast_path(&self) -> bool {
        true
    }

    fn post_init(
        &self,
        draft: &mut PoolDraft,
        datum: &MinswapStablePoolDatum,
    ) -> Result<(), PoolError> {
        let [balance_a, balance_b] = match datum.balances.as_slice() {
            [a, b] => [*a, *b],
            other => {
                return Err(PoolError::InvalidPool(format!(
                    "{} {}: expected 2 balances, found {}",
                    DEX_NAME,
                    self.name,
                    other.len()
                )))
            }
        };
        for (index, balance) in [balance_a, balance_b].into_iter().enumerate() {
            if let Ok(unit) = draft.assets.unit(index).map(str::to_string) {
                draft.assets.insert(unit, balance);
            }
        }
        Ok(())
    }

    fn pricing(&self, datum: Option<&MinswapStablePoolDatum>) -> Pricing {
        Pricing::StableSwap(StableSwapParams {
            amp: datum.map(|d| d.amp).unwrap_or_default(),
            ann: AnnPolicy::Linear,
            multipliers: self.multipliers,
            fee_on_input: false,
        })
    }
}
