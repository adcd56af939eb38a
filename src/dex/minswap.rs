//! Minswap v1 constant-product pools.
//!
//! Pool datum (constructor 0):
//!   [0] asset_a          AssetClass
//!   [1] asset_b          AssetClass
//!   [2] total_liquidity  int
//!   [3] root_k_last      int
//!   [4] fee_sharing      FeeSharing | None
//!
//! Order datum (constructor 0):
//!   [0] sender               FullAddress
//!   [1] receiver             FullAddress
//!   [2] receiver_datum_hash  ReceiverDatum | None
//!   [3] step                 SwapStep
//!   [4] batcher_fee          int
//!   [5] deposit              int
use ciborium::value::Value;

use super::cbor::{constr, constr_value, int_value, FromPlutus, Fields, ToPlutus};
use super::datums::{AssetClass, FullAddress, ReceiverDatum};
use super::{BatcherFee, OrderDatum, PoolDatum, PoolDescriptor, PoolProtocol, PoolSelector};
use crate::error::DatumError;
use crate::models::{AssetBag, OrderType};
use crate::pricing::VolumeFee;

pub const DEX_NAME: &str = "Minswap";

pub const POOL_POLICY: &str = "0be55d262b29f564998ff81efe21bdc0022621c12f15af08d0f2ddb1";
pub const LP_POLICY: &str = "e4214b7cce62ac6fbba385d164df48e157eae5863521b4b67ca71d86";
pub const FACTORY_POLICY: &str = "13aa2accf2e1561723aa26871e071fdf32c867cff7e7d50ad470d62f";
/// Factory token every v1 pool holds, `<factory policy>MINSWAP`.
pub const FACTORY_TOKEN: &str =
    "13aa2accf2e1561723aa26871e071fdf32c867cff7e7d50ad470d62f4d494e53574150";

const POOL_ADDRESS: &str = "addr1w8snz7c4974vzdpxu65ruphl3zjdvtxw8strf2c2tmqnxzgusf9xw";
const ORDER_ADDRESSES: &[&str] = &[
    concat!(
        "addr1zxn9efv2f6w82hagxqtn62ju4m293tqvw0uhmdl64ch8uw6j2c79g",
        "y9l76sdg0xwhd7r0c0kna0tycz4y5s6mlenh8pq6s3z70"
    ),
    "addr1wxn9efv2f6w82hagxqtn62ju4m293tqvw0uhmdl64ch8uwc0h43gt",
];

pub static DESCRIPTOR: PoolDescriptor = PoolDescriptor {
    dex_name: DEX_NAME,
    pool_policy: Some(&[POOL_POLICY]),
    lp_policy: Some(&[LP_POLICY]),
    dex_policy: Some(&[FACTORY_POLICY]),
    order_selector: ORDER_ADDRESSES,
    pool_selector: PoolSelector {
        addresses: &[POOL_ADDRESS],
        assets: &[FACTORY_TOKEN],
    },
    default_fee: VolumeFee::Flat(30),
    // 2 ADA, reduced by up to 0.5 ADA for MIN held by the trader
    batcher_fee: BatcherFee::MinDiscount {
        base: 2_000_000,
        divisor: 100_000,
        cap: 500_000,
    },
    deposit: 2_000_000,
};

/// Protocol fee switch: where the fee share is paid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeeSharing {
    pub fee_to: FullAddress,
}

impl FromPlutus for FeeSharing {
    fn from_plutus(value: &Value) -> Result<Self, DatumError> {
        let mut outer = Fields::expect(value, "FeeSharing", 0, 1)?;
        let mut switch = Fields::expect(outer.value()?, "FeeSwitchOn", 0, 2)?;
        let fee_to = switch.next()?;
        let _datum_hash: Option<Value> = switch.next()?;
        Ok(Self { fee_to })
    }
}

impl ToPlutus for FeeSharing {
    fn to_plutus(&self) -> Value {
        let switch = constr_value(0, vec![self.fee_to.to_plutus(), constr_value(1, vec![])]);
        constr_value(0, vec![switch])
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinswapPoolDatum {
    pub asset_a: AssetClass,
    pub asset_b: AssetClass,
    pub total_liquidity: i128,
    pub root_k_last: i128,
    pub fee_sharing: Option<FeeSharing>,
}

impl FromPlutus for MinswapPoolDatum {
    fn from_plutus(value: &Value) -> Result<Self, DatumError> {
        let mut f = Fields::expect(value, "MinswapPoolDatum", 0, 5)?;
        Ok(Self {
            asset_a: f.next()?,
            asset_b: f.next()?,
            total_liquidity: f.int()?,
            root_k_last: f.int()?,
            fee_sharing: f.next()?,
        })
    }
}

impl ToPlutus for MinswapPoolDatum {
    fn to_plutus(&self) -> Value {
        constr_value(
            0,
            vec![
                self.asset_a.to_plutus(),
                self.asset_b.to_plutus(),
                int_value(self.total_liquidity),
                int_value(self.root_k_last),
                self.fee_sharing.to_plutus(),
            ],
        )
    }
}

impl PoolDatum for MinswapPoolDatum {
    fn pool_pair(&self) -> Option<Vec<String>> {
        Some(vec![self.asset_a.unit(), self.asset_b.unit()])
    }
}

/// Behaviour shared by the step variants of Minswap order datums.
pub trait OrderStep: FromPlutus + ToPlutus {
    fn requested_amount(&self) -> AssetBag;

    fn order_type(&self) -> OrderType;
}

/// What a v1 order asks the batcher to do. Variant index is the constructor tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwapStep {
    SwapExactIn {
        desired_coin: AssetClass,
        minimum_receive: i128,
    },
    SwapExactOut {
        desired_coin: AssetClass,
        expected_receive: i128,
    },
    Deposit {
        minimum_lp: i128,
    },
    Withdraw {
        min_asset_a: i128,
        min_asset_b: i128,
    },
    ZapIn {
        desired_coin: AssetClass,
        minimum_lp: i128,
    },
}

impl FromPlutus for SwapStep {
    fn from_plutus(value: &Value) -> Result<Self, DatumError> {
        let (alt, items) = constr(value)?;
        match alt {
            0 => {
                let mut f = Fields::from_items(items, "SwapExactIn", 2)?;
                Ok(SwapStep::SwapExactIn {
                    desired_coin: f.next()?,
                    minimum_receive: f.int()?,
                })
            }
            1 => {
                let mut f = Fields::from_items(items, "SwapExactOut", 2)?;
                Ok(SwapStep::SwapExactOut {
                    desired_coin: f.next()?,
                    expected_receive: f.int()?,
                })
            }
            2 => Ok(SwapStep::Deposit {
                minimum_lp: Fields::from_items(items, "Deposit", 1)?.int()?,
            }),
            3 => {
                let mut f = Fields::from_items(items, "Withdraw", 2)?;
                Ok(SwapStep::Withdraw {
                    min_asset_a: f.int()?,
                    min_asset_b: f.int()?,
                })
            }
            4 => {
                let mut f = Fields::from_items(items, "ZapIn", 2)?;
                Ok(SwapStep::ZapIn {
                    desired_coin: f.next()?,
                    minimum_lp: f.int()?,
                })
            }
            found => Err(DatumError::UnknownVariant {
                schema: "SwapStep",
                found,
            }),
        }
    }
}

impl ToPlutus for SwapStep {
    fn to_plutus(&self) -> Value {
        match self {
            SwapStep::SwapExactIn {
                desired_coin,
                minimum_receive,
            } => constr_value(0, vec![desired_coin.to_plutus(), int_value(*minimum_receive)]),
            SwapStep::SwapExactOut {
                desired_coin,
                expected_receive,
            } => constr_value(1, vec![desired_coin.to_plutus(), int_value(*expected_receive)]),
            SwapStep::Deposit { minimum_lp } => constr_value(2, vec![int_value(*minimum_lp)]),
            SwapStep::Withdraw {
                min_asset_a,
                min_asset_b,
            } => constr_value(3, vec![int_value(*min_asset_a), int_value(*min_asset_b)]),
            SwapStep::ZapIn {
                desired_coin,
                minimum_lp,
            } => constr_value(4, vec![desired_coin.to_plutus(), int_value(*minimum_lp)]),
        }
    }
}

/// Placeholder units for amounts whose asset is only known from the pool.
pub(crate) fn pair_placeholder(a: i128, b: i128) -> AssetBag {
    let mut bag = AssetBag::new();
    bag.insert("asset_a", a);
    bag.insert("asset_b", b);
    bag
}

impl OrderStep for SwapStep {
    fn requested_amount(&self) -> AssetBag {
        match self {
            SwapStep::SwapExactIn {
                desired_coin,
                minimum_receive,
            } => desired_coin.with_quantity(*minimum_receive),
            SwapStep::SwapExactOut {
                desired_coin,
                expected_receive,
            } => desired_coin.with_quantity(*expected_receive),
            SwapStep::Deposit { minimum_lp } => AssetBag::single("lp", *minimum_lp),
            SwapStep::Withdraw {
                min_asset_a,
                min_asset_b,
            } => pair_placeholder(*min_asset_a, *min_asset_b),
            SwapStep::ZapIn {
                desired_coin,
                minimum_lp,
            } => desired_coin.with_quantity(*minimum_lp),
        }
    }

    fn order_type(&self) -> OrderType {
        match self {
            SwapStep::SwapExactIn { .. } | SwapStep::SwapExactOut { .. } => OrderType::Swap,
            SwapStep::Deposit { .. } | SwapStep::ZapIn { .. } => OrderType::Deposit,
            SwapStep::Withdraw { .. } => OrderType::Withdraw,
        }
    }
}

/// Order datum, generic over the step so the stable pools can reuse it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinswapOrderDatum<S = SwapStep> {
    pub sender: FullAddress,
    pub receiver: FullAddress,
    pub receiver_datum_hash: Option<ReceiverDatum>,
    pub step: S,
    pub batcher_fee: i128,
    pub deposit: i128,
}

impl MinswapOrderDatum<SwapStep> {
    /// A market order paying out to the sender.
    pub fn swap_exact_in(
        sender: FullAddress,
        out_assets: &AssetBag,
        batcher_fee: i128,
        deposit: i128,
    ) -> Result<Self, DatumError> {
        let unit = out_assets.unit(0).map_err(|e| DatumError::Kind {
            expected: "single output asset",
            found: e.to_string(),
        })?;
        Ok(Self {
            receiver: sender.clone(),
            sender,
            receiver_datum_hash: None,
            step: SwapStep::SwapExactIn {
                desired_coin: AssetClass::from_unit(unit)?,
                minimum_receive: out_assets.quantity(0).unwrap_or(0),
            },
            batcher_fee,
            deposit,
        })
    }
}

impl<S: FromPlutus> FromPlutus for MinswapOrderDatum<S> {
    fn from_plutus(value: &Value) -> Result<Self, DatumError> {
        let mut f = Fields::expect(value, "MinswapOrderDatum", 0, 6)?;
        Ok(Self {
            sender: f.next()?,
            receiver: f.next()?,
            receiver_datum_hash: f.next()?,
            step: f.next()?,
            batcher_fee: f.int()?,
            deposit: f.int()?,
        })
    }
}

impl<S: ToPlutus> ToPlutus for MinswapOrderDatum<S> {
    fn to_plutus(&self) -> Value {
        constr_value(
            0,
            vec![
                self.sender.to_plutus(),
                self.receiver.to_plutus(),
                self.receiver_datum_hash.to_plutus(),
                self.step.to_plutus(),
                int_value(self.batcher_fee),
                int_value(self.deposit),
            ],
        )
    }
}

impl<S: OrderStep> OrderDatum for MinswapOrderDatum<S> {
    fn address_source(&self) -> Result<Option<String>, DatumError> {
        self.sender.to_address().map(Some)
    }

    fn requested_amount(&self) -> AssetBag {
        self.step.requested_amount()
    }

    fn order_type(&self) -> Option<OrderType> {
        Some(self.step.order_type())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Minswap;

impl PoolProtocol for Minswap {
    type Datum = MinswapPoolDatum;

    fn descriptor(&self) -> &'static PoolDescriptor {
        &DESCRIPTOR
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dex::datums::PartAddress;
    use crate::dex::{test_record, MIN_TOKEN};
    use crate::error::PoolError;
    use crate::models::LOVELACE;
    use crate::state::PoolState;

    const TOKEN: &str = "f66d78b4a3cb3d37afa0ec36461e51ecbde00f26c8f0a68f94b6988069555344";
    const POOL_NAME: &str = "6aa2153e1ae896a95539c9d62f76cedcdabdcdf144e564b8955f609d660cf6a2";

    fn datum() -> MinswapPoolDatum {
        MinswapPoolDatum {
            asset_a: AssetClass::lovelace(),
            asset_b: AssetClass::from_unit(TOKEN).unwrap(),
            total_liquidity: 22_360_679_774,
            root_k_last: 0,
            fee_sharing: None,
        }
    }

    fn pool_assets<'a>(nft: &'a str, lp: &'a str) -> Vec<(&'a str, i128)> {
        vec![
            (LOVELACE, 1_000_000_000_000),
            (TOKEN, 500_000_000),
            (nft, 1),
            (FACTORY_TOKEN, 1),
            (lp, 1_000),
        ]
    }

    #[test]
    fn test_pool_datum_round_trip() {
        let mut datum = datum();
        datum.fee_sharing = Some(FeeSharing {
            fee_to: FullAddress {
                payment: PartAddress::Key(vec![4; 28]),
                stake: None,
            },
        });
        let decoded = MinswapPoolDatum::from_cbor(&datum.to_cbor().unwrap()).unwrap();
        assert_eq!(decoded, datum);
        assert_eq!(decoded.pool_pair().unwrap(), vec![LOVELACE.to_string(), TOKEN.to_string()]);
    }

    #[test]
    fn test_pool_from_utxo() {
        let nft = format!("{}{}", POOL_POLICY, POOL_NAME);
        let lp = format!("{}{}", LP_POLICY, POOL_NAME);
        let record = test_record(datum().to_cbor().unwrap(), pool_assets(&nft, &lp));
        let pool = PoolState::build(&Minswap, record).unwrap();
        assert_eq!(pool.pool_id, nft);
        assert_eq!(pool.unit_a(), LOVELACE);
        assert_eq!(pool.reserve_b(), 500_000_000);
        assert_eq!(pool.dex_nft.as_ref().and_then(|d| d.get(FACTORY_TOKEN)), Some(1));
        assert_eq!(pool.lp_tokens.as_ref().and_then(|l| l.get(&lp)), Some(1_000));

        let out = pool.get_amount_out(&AssetBag::lovelace(1_000_000)).unwrap();
        assert_eq!(out.quantity(), 498);
    }

    #[test]
    fn test_missing_factory_token_is_not_a_pool() {
        let nft = format!("{}{}", POOL_POLICY, POOL_NAME);
        let record = test_record(
            datum().to_cbor().unwrap(),
            vec![(LOVELACE, 1_000_000_000_000), (TOKEN, 500_000_000), (nft.as_str(), 1)],
        );
        let err = PoolState::build(&Minswap, record).unwrap_err();
        assert!(matches!(err, PoolError::NotAPool { .. }));
    }

    #[test]
    fn test_batcher_fee_discount() {
        let nft = format!("{}{}", POOL_POLICY, POOL_NAME);
        let lp = format!("{}{}", LP_POLICY, POOL_NAME);
        let pool = PoolState::build(
            &Minswap,
            test_record(datum().to_cbor().unwrap(), pool_assets(&nft, &lp)),
        )
        .unwrap();
        assert_eq!(pool.batcher_fee(None).get(LOVELACE), Some(2_000_000));
        let min = AssetBag::single(MIN_TOKEN, 25_000_000_000);
        assert_eq!(pool.batcher_fee(Some(&min)).get(LOVELACE), Some(1_750_000));
        assert_eq!(pool.deposit().get(LOVELACE), Some(2_000_000));
    }

    #[test]
    fn test_order_datum() {
        let sender = FullAddress {
            payment: PartAddress::Key(vec![7; 28]),
            stake: Some(PartAddress::Key(vec![8; 28])),
        };
        let offer = AssetBag::single(TOKEN, 1_234);
        let order =
            MinswapOrderDatum::swap_exact_in(sender, &offer, 2_000_000, 2_000_000).unwrap();
        let decoded: MinswapOrderDatum =
            MinswapOrderDatum::from_cbor(&order.to_cbor().unwrap()).unwrap();
        assert_eq!(decoded, order);
        assert_eq!(decoded.requested_amount().get(TOKEN), Some(1_234));
        assert_eq!(decoded.order_type(), Some(OrderType::Swap));
        assert!(decoded.address_source().unwrap().unwrap().starts_with("addr1q"));

        let withdraw = SwapStep::Withdraw {
            min_asset_a: 5,
            min_asset_b: 6,
        };
        assert_eq!(withdraw.requested_amount().get("asset_b"), Some(6));
        assert_eq!(withdraw.order_type(), OrderType::Withdraw);
    }
}
