//! SundaeSwap v1 constant-product pools.
//!
//! Pool datum (constructor 0):
//!   [0] assets     constr 0 [AssetClass, AssetClass]
//!   [1] ident      bytes
//!   [2] last_swap  int
//!   [3] fee        constr 0 [numerator, denominator]
//!
//! The pool NFT is `<pool policy>70<ident>`; the LP token carries the same
//! ident and is dropped together with it.
use ciborium::value::Value;

use super::cbor::{bytes_value, constr, constr_value, int_value, FromPlutus, Fields, ToPlutus};
use super::datums::{
    AssetClass, Direction, FullAddress, PartAddress, Rational, ReceiverDatum, WrappedInt,
};
use super::{BatcherFee, OrderDatum, PoolDatum, PoolDescriptor, PoolProtocol, PoolSelector};
use crate::error::{DatumError, PoolError};
use crate::models::{AssetBag, OrderType};
use crate::pricing::{VolumeFee, FEE_DENOMINATOR};
use crate::state::pool::PoolDraft;

pub const DEX_NAME: &str = "SundaeSwap";

/// Policy followed by the `p` prefix of pool NFT names.
pub const POOL_POLICY: &str = "0029cb7c88c7567b63d1a512c0ed626aa169688ec980730c0473b91370";

const POOL_ADDRESS: &str = "addr1w9qzpelu9hn45pefc0xr4ac4kdxeswq7pndul2vuj59u8tqaxdznu";
const ORDER_ADDRESS: &str = "addr1wxaptpmxcxawvr3pzlhgnpmzz3ql43n2tc8mn3av5kx0yzs09tqh8";

/// Minimum-UTxO lovelace locked in every pool on top of the reserve.
const LOCKED_LOVELACE: i128 = 2_000_000;

pub static DESCRIPTOR: PoolDescriptor = PoolDescriptor {
    dex_name: DEX_NAME,
    pool_policy: Some(&[POOL_POLICY]),
    lp_policy: None,
    dex_policy: None,
    order_selector: &[ORDER_ADDRESS],
    pool_selector: PoolSelector {
        addresses: &[POOL_ADDRESS],
        assets: &[],
    },
    default_fee: VolumeFee::Flat(0),
    batcher_fee: BatcherFee::Flat(2_500_000),
    deposit: 2_000_000,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SundaePoolDatum {
    pub asset_a: AssetClass,
    pub asset_b: AssetClass,
    pub ident: Vec<u8>,
    pub last_swap: i128,
    pub fee: Rational,
}

impl FromPlutus for SundaePoolDatum {
    fn from_plutus(value: &Value) -> Result<Self, DatumError> {
        let mut f = Fields::expect(value, "SundaePoolDatum", 0, 4)?;
        let mut pair = Fields::expect(f.value()?, "LiquidityPoolAssets", 0, 2)?;
        Ok(Self {
            asset_a: pair.next()?,
            asset_b: pair.next()?,
            ident: f.bytes()?,
            last_swap: f.int()?,
            fee: f.next()?,
        })
    }
}

impl ToPlutus for SundaePoolDatum {
    fn to_plutus(&self) -> Value {
        constr_value(
            0,
            vec![
                constr_value(0, vec![self.asset_a.to_plutus(), self.asset_b.to_plutus()]),
                bytes_value(&self.ident),
                int_value(self.last_swap),
                self.fee.to_plutus(),
            ],
        )
    }
}

impl PoolDatum for SundaePoolDatum {
    fn pool_pair(&self) -> Option<Vec<String>> {
        Some(vec![self.asset_a.unit(), self.asset_b.unit()])
    }
}

/// Order action. Variant index is the constructor tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SundaeAction {
    Swap {
        direction: Direction,
        amount_in: i128,
        min_receive: i128,
    },
    Withdraw {
        amount_lp: i128,
    },
    Deposit {
        amount_a: i128,
        amount_b: i128,
    },
}

impl FromPlutus for SundaeAction {
    fn from_plutus(value: &Value) -> Result<Self, DatumError> {
        let (alt, items) = constr(value)?;
        match alt {
            0 => {
                let mut f = Fields::from_items(items, "SwapConfig", 3)?;
                Ok(SundaeAction::Swap {
                    direction: f.next()?,
                    amount_in: f.int()?,
                    min_receive: f.next::<WrappedInt>()?.0,
                })
            }
            1 => Ok(SundaeAction::Withdraw {
                amount_lp: Fields::from_items(items, "WithdrawConfig", 1)?.int()?,
            }),
            2 => {
                let mut f = Fields::from_items(items, "DepositConfig", 1)?;
                let mut pair = Fields::expect(f.value()?, "DepositPair", 1, 1)?;
                let mut quantities = Fields::expect(pair.value()?, "DepositPairQuantity", 0, 2)?;
                Ok(SundaeAction::Deposit {
                    amount_a: quantities.int()?,
                    amount_b: quantities.int()?,
                })
            }
            found => Err(DatumError::UnknownVariant {
                schema: "SundaeAction",
                found,
            }),
        }
    }
}

impl ToPlutus for SundaeAction {
    fn to_plutus(&self) -> Value {
        match self {
            SundaeAction::Swap {
                direction,
                amount_in,
                min_receive,
            } => constr_value(
                0,
                vec![
                    direction.to_plutus(),
                    int_value(*amount_in),
                    WrappedInt(*min_receive).to_plutus(),
                ],
            ),
            SundaeAction::Withdraw { amount_lp } => constr_value(1, vec![int_value(*amount_lp)]),
            SundaeAction::Deposit { amount_a, amount_b } => constr_value(
                2,
                vec![constr_value(
                    1,
                    vec![constr_value(0, vec![int_value(*amount_a), int_value(*amount_b)])],
                )],
            ),
        }
    }
}

/// Order owner: the payout address, its datum and an optional destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SundaeOrderAddress {
    pub address: FullAddress,
    pub datum: Option<ReceiverDatum>,
    pub destination: Option<PartAddress>,
}

impl FromPlutus for SundaeOrderAddress {
    fn from_plutus(value: &Value) -> Result<Self, DatumError> {
        let mut outer = Fields::expect(value, "SundaeAddressWithDestination", 0, 2)?;
        let mut inner = Fields::expect(outer.value()?, "SundaeAddressWithDatum", 0, 2)?;
        Ok(Self {
            address: inner.next()?,
            datum: inner.next()?,
            destination: outer.next()?,
        })
    }
}

impl ToPlutus for SundaeOrderAddress {
    fn to_plutus(&self) -> Value {
        constr_value(
            0,
            vec![
                constr_value(0, vec![self.address.to_plutus(), self.datum.to_plutus()]),
                self.destination.to_plutus(),
            ],
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SundaeOrderDatum {
    pub ident: Vec<u8>,
    pub address: SundaeOrderAddress,
    pub fee: i128,
    pub action: SundaeAction,
}

impl SundaeOrderDatum {
    /// A swap of `in_assets` for at least `out_assets` in the pool `ident`.
    ///
    /// The direction follows the canonical order of the two units.
    pub fn swap(
        ident: Vec<u8>,
        owner: FullAddress,
        in_assets: &AssetBag,
        out_assets: &AssetBag,
        fee: i128,
    ) -> Result<Self, DatumError> {
        let single = |bag: &AssetBag| -> Result<(String, i128), DatumError> {
            match (bag.unit(0), bag.quantity(0)) {
                (Ok(unit), Ok(quantity)) => Ok((unit.to_string(), quantity)),
                (Err(e), _) | (_, Err(e)) => Err(DatumError::Kind {
                    expected: "single asset",
                    found: e.to_string(),
                }),
            }
        };
        let (in_unit, amount_in) = single(in_assets)?;
        let (_, min_receive) = single(out_assets)?;
        let merged = in_assets + out_assets;
        let direction = if merged.unit(0).ok() == Some(in_unit.as_str()) {
            Direction::AtoB
        } else {
            Direction::BtoA
        };
        Ok(Self {
            ident,
            address: SundaeOrderAddress {
                address: owner,
                datum: None,
                destination: None,
            },
            fee,
            action: SundaeAction::Swap {
                direction,
                amount_in,
                min_receive,
            },
        })
    }
}

impl FromPlutus for SundaeOrderDatum {
    fn from_plutus(value: &Value) -> Result<Self, DatumError> {
        let mut f = Fields::expect(value, "SundaeOrderDatum", 0, 4)?;
        Ok(Self {
            ident: f.bytes()?,
            address: f.next()?,
            fee: f.int()?,
            action: f.next()?,
        })
    }
}

impl ToPlutus for SundaeOrderDatum {
    fn to_plutus(&self) -> Value {
        constr_value(
            0,
            vec![
                bytes_value(&self.ident),
                self.address.to_plutus(),
                int_value(self.fee),
                self.action.to_plutus(),
            ],
        )
    }
}

impl OrderDatum for SundaeOrderDatum {
    fn address_source(&self) -> Result<Option<String>, DatumError> {
        self.address.address.to_address().map(Some)
    }

    fn requested_amount(&self) -> AssetBag {
        match &self.action {
            SundaeAction::Swap {
                direction: Direction::AtoB,
                min_receive,
                ..
            } => AssetBag::single("asset_b", *min_receive),
            SundaeAction::Swap {
                direction: Direction::BtoA,
                min_receive,
                ..
            } => AssetBag::single("asset_a", *min_receive),
            _ => AssetBag::new(),
        }
    }

    fn order_type(&self) -> Option<OrderType> {
        Some(match self.action {
            SundaeAction::Swap { .. } => OrderType::Swap,
            SundaeAction::Deposit { .. } => OrderType::Deposit,
            SundaeAction::Withdraw { .. } => OrderType::Withdraw,
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SundaeSwap;

impl PoolProtocol for SundaeSwap {
    type Datum = SundaePoolDatum;

    fn descriptor(&self) -> &'static PoolDescriptor {
        &DESCRIPTOR
    }

    fn supports_fast_path(&self) -> bool {
        true
    }

    fn extract_pool_nft(&self, draft: &mut PoolDraft) -> Result<(), PoolError> {
        match crate::state::pool::extract_pool_nft(&DESCRIPTOR, draft) {
            Err(PoolError::InvalidPool(reason)) => Err(PoolError::not_a_pool(reason)),
            other => other,
        }
    }

    fn post_init(&self, draft: &mut PoolDraft, datum: &SundaePoolDatum) -> Result<(), PoolError> {
        if draft.assets.len() == 2 {
            let unit = draft.unit_at(0)?;
            let reserve = draft.assets.get(&unit).unwrap_or(0);
            draft.assets.insert(unit, reserve - LOCKED_LOVELACE);
        }
        let Rational { numerator, denominator } = datum.fee;
        let fee = numerator
            .checked_mul(FEE_DENOMINATOR)
            .filter(|_| denominator > 0)
            .map(|scaled| scaled / denominator)
            .ok_or_else(|| {
                PoolError::InvalidPool(format!(
                    "{}: fee {}/{} (tx_hash={})",
                    DEX_NAME, numerator, denominator, draft.tx_hash
                ))
            })?;
        draft.fee = VolumeFee::Flat(fee);
        Ok(())
    }
}
