//! Minswap V2 pools. Reserves and the per-direction fee come from the datum.
//!
//! Pool datum (constructor 0):
//!   [0] pool_batching_stake_credential  (opaque)
//!   [1] asset_a                         AssetClass
//!   [2] asset_b                         AssetClass
//!   [3] total_liquidity                 int
//!   [4] reserve_a                       int
//!   [5] reserve_b                       int
//!   [6] base_fee_a_numerator            int
//!   [7] base_fee_b_numerator            int
//!   [8] fee_sharing_numerator           WrappedInt | None
//!   [9] allow_dynamic_fee               bool
use ciborium::value::Value;

use super::cbor::{
    bytes_value, constr, constr_value, int_list_value, int_value, list_value, Fields, FromPlutus,
    ToPlutus,
};
use super::datums::{AssetClass, FullAddress, OutputDatum, WrappedInt};
use super::minswap::pair_placeholder;
use super::{BatcherFee, OrderDatum, PoolDatum, PoolDescriptor, PoolProtocol, PoolSelector};
use crate::error::{DatumError, PoolError};
use crate::models::{AssetBag, OrderType};
use crate::pricing::VolumeFee;
use crate::state::PoolDraft;
use crate::utils::{shelley_address, Credential};

pub const DEX_NAME: &str = "MinswapV2";

pub const LP_POLICY: &str = "f5808c2c990d86da54bfc97d89cee6efa20cd8461616359478d96b4c";
/// Authentication token held by every V2 pool, `<lp policy>MSP`.
pub const POOL_VALIDITY_ASSET: &str =
    "f5808c2c990d86da54bfc97d89cee6efa20cd8461616359478d96b4c4d5350";

const POOL_ADDRESS: &str = "addr1w84q0denmyep98ph3tmzwsmw0j7zau9ljmsqx6a4rvaau6ca7j5v4";
const ORDER_ADDRESSES: &[&str] = &["addr1w8p79rpkcdz8x9d6tft0x0dx5mwuzac2sa4gm8cvkw5hcnqst2ctf"];

pub static DESCRIPTOR: PoolDescriptor = PoolDescriptor {
    dex_name: DEX_NAME,
    pool_policy: None,
    lp_policy: Some(&[LP_POLICY]),
    dex_policy: Some(&[POOL_VALIDITY_ASSET]),
    order_selector: ORDER_ADDRESSES,
    pool_selector: PoolSelector {
        addresses: &[POOL_ADDRESS],
        assets: &[POOL_VALIDITY_ASSET],
    },
    default_fee: VolumeFee::Split([30, 30]),
    batcher_fee: BatcherFee::MinDiscount {
        base: 1_000_000,
        divisor: 200_000,
        cap: 250_000,
    },
    deposit: 2_000_000,
};

#[derive(Debug, Clone, PartialEq)]
pub struct MinswapV2PoolDatum {
    pub pool_batching_stake_credential: Value,
    pub asset_a: AssetClass,
    pub asset_b: AssetClass,
    pub total_liquidity: i128,
    pub reserve_a: i128,
    pub reserve_b: i128,
    pub base_fee_a_numerator: i128,
    pub base_fee_b_numerator: i128,
    pub fee_sharing_numerator: Option<WrappedInt>,
    pub allow_dynamic_fee: bool,
}

impl FromPlutus for MinswapV2PoolDatum {
    fn from_plutus(value: &Value) -> Result<Self, DatumError> {
        let mut f = Fields::expect(value, "MinswapV2PoolDatum", 0, 10)?;
        Ok(Self {
            pool_batching_stake_credential: f.value()?.clone(),
            asset_a: f.next()?,
            asset_b: f.next()?,
            total_liquidity: f.int()?,
            reserve_a: f.int()?,
            reserve_b: f.int()?,
            base_fee_a_numerator: f.int()?,
            base_fee_b_numerator: f.int()?,
            fee_sharing_numerator: f.next()?,
            allow_dynamic_fee: f.next()?,
        })
    }
}

impl ToPlutus for MinswapV2PoolDatum {
    fn to_plutus(&self) -> Value {
        constr_value(
            0,
            vec![
                self.pool_batching_stake_credential.clone(),
                self.asset_a.to_plutus(),
                self.asset_b.to_plutus(),
                int_value(self.total_liquidity),
                int_value(self.reserve_a),
                int_value(self.reserve_b),
                int_value(self.base_fee_a_numerator),
                int_value(self.base_fee_b_numerator),
                self.fee_sharing_numerator.to_plutus(),
                self.allow_dynamic_fee.to_plutus(),
            ],
        )
    }
}

impl PoolDatum for MinswapV2PoolDatum {
    fn pool_pair(&self) -> Option<Vec<String>> {
        Some(vec![self.asset_a.unit(), self.asset_b.unit()])
    }
}

/// Who may cancel the order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderAuthorization {
    Signature(Vec<u8>),
    Spend(Vec<u8>),
    Withdraw(Vec<u8>),
    Mint(Vec<u8>),
}

impl OrderAuthorization {
    fn hash(&self) -> &[u8] {
        match self {
            OrderAuthorization::Signature(h)
            | OrderAuthorization::Spend(h)
            | OrderAuthorization::Withdraw(h)
            | OrderAuthorization::Mint(h) => h,
        }
    }
}

impl FromPlutus for OrderAuthorization {
    fn from_plutus(value: &Value) -> Result<Self, DatumError> {
        let (alt, items) = constr(value)?;
        let hash = Fields::from_items(items, "OrderAuthorization", 1)?.bytes()?;
        match alt {
            0 => Ok(OrderAuthorization::Signature(hash)),
            1 => Ok(OrderAuthorization::Spend(hash)),
            2 => Ok(OrderAuthorization::Withdraw(hash)),
            3 => Ok(OrderAuthorization::Mint(hash)),
            found => Err(DatumError::UnknownVariant {
                schema: "OrderAuthorization",
                found,
            }),
        }
    }
}

impl ToPlutus for OrderAuthorization {
    fn to_plutus(&self) -> Value {
        let alt = match self {
            OrderAuthorization::Signature(_) => 0,
            OrderAuthorization::Spend(_) => 1,
            OrderAuthorization::Withdraw(_) => 2,
            OrderAuthorization::Mint(_) => 3,
        };
        constr_value(alt, vec![bytes_value(self.hash())])
    }
}

/// How much of the order input is swapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapAmount {
    Specific(i128),
    /// Everything except this deducted amount.
    All(i128),
}

impl FromPlutus for SwapAmount {
    fn from_plutus(value: &Value) -> Result<Self, DatumError> {
        let (alt, items) = constr(value)?;
        let amount = Fields::from_items(items, "SwapAmount", 1)?.int()?;
        match alt {
            0 => Ok(SwapAmount::Specific(amount)),
            1 => Ok(SwapAmount::All(amount)),
            found => Err(DatumError::UnknownVariant {
                schema: "SwapAmount",
                found,
            }),
        }
    }
}

impl ToPlutus for SwapAmount {
    fn to_plutus(&self) -> Value {
        match self {
            SwapAmount::Specific(n) => constr_value(0, vec![int_value(*n)]),
            SwapAmount::All(n) => constr_value(1, vec![int_value(*n)]),
        }
    }
}

/// V2 order steps. Variant index is the constructor tag. Amount options of
/// the liquidity steps are kept opaque.
#[derive(Debug, Clone, PartialEq)]
pub enum V2Step {
    SwapExactIn {
        a_to_b: bool,
        amount: SwapAmount,
        minimum_receive: i128,
        killable: bool,
    },
    StopLoss {
        a_to_b: bool,
        amount: SwapAmount,
        stop_loss_receive: i128,
    },
    Oco {
        a_to_b: bool,
        amount: SwapAmount,
        minimum_receive: i128,
        stop_loss_receive: i128,
    },
    SwapExactOut {
        a_to_b: bool,
        amount: SwapAmount,
        expected_receive: i128,
        killable: bool,
    },
    Deposit {
        amount: Value,
        minimum_lp: i128,
        killable: bool,
    },
    Withdraw {
        amount: Value,
        minimum_asset_a: i128,
        minimum_asset_b: i128,
        killable: bool,
    },
    ZapOut {
        a_to_b: bool,
        amount: Value,
        minimum_receive: i128,
        killable: bool,
    },
    PartialSwap {
        a_to_b: bool,
        total_swap_amount: i128,
        io_ratio_numerator: i128,
        io_ratio_denominator: i128,
        hops: i128,
        minimum_swap_amount_required: i128,
        max_batcher_fee_each_time: i128,
    },
    WithdrawImbalance {
        amount: Value,
        ratio_asset_a: i128,
        ratio_asset_b: i128,
        minimum_asset_a: i128,
        killable: bool,
    },
    MultiRouting {
        routings: Vec<Value>,
        amount: SwapAmount,
        minimum_receive: i128,
    },
    Donation,
}

impl FromPlutus for V2Step {
    fn from_plutus(value: &Value) -> Result<Self, DatumError> {
        let (alt, items) = constr(value)?;
        let step = match alt {
            0 => {
                let mut f = Fields::from_items(items, "SwapExactInV2", 4)?;
                V2Step::SwapExactIn {
                    a_to_b: f.next()?,
                    amount: f.next()?,
                    minimum_receive: f.int()?,
                    killable: f.next()?,
                }
            }
            1 => {
                let mut f = Fields::from_items(items, "StopLossV2", 3)?;
                V2Step::StopLoss {
                    a_to_b: f.next()?,
                    amount: f.next()?,
                    stop_loss_receive: f.int()?,
                }
            }
            2 => {
                let mut f = Fields::from_items(items, "OcoV2", 4)?;
                V2Step::Oco {
                    a_to_b: f.next()?,
                    amount: f.next()?,
                    minimum_receive: f.int()?,
                    stop_loss_receive: f.int()?,
                }
            }
            3 => {
                let mut f = Fields::from_items(items, "SwapExactOutV2", 4)?;
                V2Step::SwapExactOut {
                    a_to_b: f.next()?,
                    amount: f.next()?,
                    expected_receive: f.int()?,
                    killable: f.next()?,
                }
            }
            4 => {
                let mut f = Fields::from_items(items, "DepositV2", 3)?;
                V2Step::Deposit {
                    amount: f.value()?.clone(),
                    minimum_lp: f.int()?,
                    killable: f.next()?,
                }
            }
            5 => {
                let mut f = Fields::from_items(items, "WithdrawV2", 4)?;
                V2Step::Withdraw {
                    amount: f.value()?.clone(),
                    minimum_asset_a: f.int()?,
                    minimum_asset_b: f.int()?,
                    killable: f.next()?,
                }
            }
            6 => {
                let mut f = Fields::from_items(items, "ZapOutV2", 4)?;
                V2Step::ZapOut {
                    a_to_b: f.next()?,
                    amount: f.value()?.clone(),
                    minimum_receive: f.int()?,
                    killable: f.next()?,
                }
            }
            7 => {
                let mut f = Fields::from_items(items, "PartialSwapV2", 7)?;
                V2Step::PartialSwap {
                    a_to_b: f.next()?,
                    total_swap_amount: f.int()?,
                    io_ratio_numerator: f.int()?,
                    io_ratio_denominator: f.int()?,
                    hops: f.int()?,
                    minimum_swap_amount_required: f.int()?,
                    max_batcher_fee_each_time: f.int()?,
                }
            }
            8 => {
                let mut f = Fields::from_items(items, "WithdrawImbalanceV2", 5)?;
                V2Step::WithdrawImbalance {
                    amount: f.value()?.clone(),
                    ratio_asset_a: f.int()?,
                    ratio_asset_b: f.int()?,
                    minimum_asset_a: f.int()?,
                    killable: f.next()?,
                }
            }
            9 => {
                let mut f = Fields::from_items(items, "SwapMultiRoutingV2", 3)?;
                V2Step::MultiRouting {
                    routings: f.list_of()?,
                    amount: f.next()?,
                    minimum_receive: f.int()?,
                }
            }
            10 => {
                Fields::from_items(items, "DonationV2", 0)?;
                V2Step::Donation
            }
            found => {
                return Err(DatumError::UnknownVariant {
                    schema: "V2Step",
                    found,
                })
            }
        };
        Ok(step)
    }
}

impl ToPlutus for V2Step {
    fn to_plutus(&self) -> Value {
        match self {
            V2Step::SwapExactIn {
                a_to_b,
                amount,
                minimum_receive,
                killable,
            } => constr_value(
                0,
                vec![
                    a_to_b.to_plutus(),
                    amount.to_plutus(),
                    int_value(*minimum_receive),
                    killable.to_plutus(),
                ],
            ),
            V2Step::StopLoss {
                a_to_b,
                amount,
                stop_loss_receive,
            } => constr_value(
                1,
                vec![a_to_b.to_plutus(), amount.to_plutus(), int_value(*stop_loss_receive)],
            ),
            V2Step::Oco {
                a_to_b,
                amount,
                minimum_receive,
                stop_loss_receive,
            } => constr_value(
                2,
                vec![
                    a_to_b.to_plutus(),
                    amount.to_plutus(),
                    int_value(*minimum_receive),
                    int_value(*stop_loss_receive),
                ],
            ),
            V2Step::SwapExactOut {
                a_to_b,
                amount,
                expected_receive,
                killable,
            } => constr_value(
                3,
                vec![
                    a_to_b.to_plutus(),
                    amount.to_plutus(),
                    int_value(*expected_receive),
                    killable.to_plutus(),
                ],
            ),
            V2Step::Deposit {
                amount,
                minimum_lp,
                killable,
            } => constr_value(
                4,
                vec![amount.clone(), int_value(*minimum_lp), killable.to_plutus()],
            ),
            V2Step::Withdraw {
                amount,
                minimum_asset_a,
                minimum_asset_b,
                killable,
            } => constr_value(
                5,
                vec![
                    amount.clone(),
                    int_value(*minimum_asset_a),
                    int_value(*minimum_asset_b),
                    killable.to_plutus(),
                ],
            ),
            V2Step::ZapOut {
                a_to_b,
                amount,
                minimum_receive,
                killable,
            } => constr_value(
                6,
                vec![
                    a_to_b.to_plutus(),
                    amount.clone(),
                    int_value(*minimum_receive),
                    killable.to_plutus(),
                ],
            ),
            V2Step::PartialSwap {
                a_to_b,
                total_swap_amount,
                io_ratio_numerator,
                io_ratio_denominator,
                hops,
                minimum_swap_amount_required,
                max_batcher_fee_each_time,
            } => constr_value(
                7,
                vec![
                    a_to_b.to_plutus(),
                    int_value(*total_swap_amount),
                    int_value(*io_ratio_numerator),
                    int_value(*io_ratio_denominator),
                    int_value(*hops),
                    int_value(*minimum_swap_amount_required),
                    int_value(*max_batcher_fee_each_time),
                ],
            ),
            V2Step::WithdrawImbalance {
                amount,
                ratio_asset_a,
                ratio_asset_b,
                minimum_asset_a,
                killable,
            } => constr_value(
                8,
                vec![
                    amount.clone(),
                    int_value(*ratio_asset_a),
                    int_value(*ratio_asset_b),
                    int_value(*minimum_asset_a),
                    killable.to_plutus(),
                ],
            ),
            V2Step::MultiRouting {
                routings,
                amount,
                minimum_receive,
            } => constr_value(
                9,
                vec![list_value(routings), amount.to_plutus(), int_value(*minimum_receive)],
            ),
            V2Step::Donation => constr_value(10, vec![]),
        }
    }
}

/// Time-to-live of an order, constructor 0 around a list of integers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expiration {
    pub ttl: Vec<i128>,
}

impl FromPlutus for Expiration {
    fn from_plutus(value: &Value) -> Result<Self, DatumError> {
        Ok(Self {
            ttl: Fields::expect(value, "Expiration", 0, 1)?.int_list()?,
        })
    }
}

impl ToPlutus for Expiration {
    fn to_plutus(&self) -> Value {
        constr_value(0, vec![int_list_value(&self.ttl)])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MinswapV2OrderDatum {
    pub owner: OrderAuthorization,
    pub refund_address: FullAddress,
    pub refund_datum: OutputDatum,
    pub receiver_address: FullAddress,
    pub receiver_datum: OutputDatum,
    pub lp_asset: AssetClass,
    pub step: V2Step,
    pub max_batcher_fee: i128,
    pub expiration: Option<Expiration>,
}

impl FromPlutus for MinswapV2OrderDatum {
    fn from_plutus(value: &Value) -> Result<Self, DatumError> {
        let mut f = Fields::expect(value, "MinswapV2OrderDatum", 0, 9)?;
        Ok(Self {
            owner: f.next()?,
            refund_address: f.next()?,
            refund_datum: f.next()?,
            receiver_address: f.next()?,
            receiver_datum: f.next()?,
            lp_asset: f.next()?,
            step: f.next()?,
            max_batcher_fee: f.int()?,
            expiration: f.next()?,
        })
    }
}

impl ToPlutus for MinswapV2OrderDatum {
    fn to_plutus(&self) -> Value {
        constr_value(
            0,
            vec![
                self.owner.to_plutus(),
                self.refund_address.to_plutus(),
                self.refund_datum.to_plutus(),
                self.receiver_address.to_plutus(),
                self.receiver_datum.to_plutus(),
                self.lp_asset.to_plutus(),
                self.step.to_plutus(),
                int_value(self.max_batcher_fee),
                self.expiration.to_plutus(),
            ],
        )
    }
}

fn side(a_to_b: bool, quantity: i128) -> AssetBag {
    AssetBag::single(if a_to_b { "asset_b" } else { "asset_a" }, quantity)
}

impl OrderDatum for MinswapV2OrderDatum {
    /// The owner's hash as an enterprise key address.
    fn address_source(&self) -> Result<Option<String>, DatumError> {
        shelley_address(Credential::Key(self.owner.hash()), None)
            .map(Some)
            .map_err(|e| DatumError::Address(e.to_string()))
    }

    fn requested_amount(&self) -> AssetBag {
        match &self.step {
            V2Step::SwapExactIn {
                a_to_b,
                minimum_receive,
                ..
            } => side(*a_to_b, *minimum_receive),
            V2Step::SwapExactOut {
                a_to_b,
                expected_receive,
                ..
            } => side(*a_to_b, *expected_receive),
            V2Step::Deposit { minimum_lp, .. } => AssetBag::single("lp", *minimum_lp),
            V2Step::Withdraw {
                minimum_asset_a,
                minimum_asset_b,
                ..
            } => pair_placeholder(*minimum_asset_a, *minimum_asset_b),
            _ => AssetBag::new(),
        }
    }

    fn order_type(&self) -> Option<OrderType> {
        Some(match self.step {
            V2Step::SwapExactIn { .. }
            | V2Step::StopLoss { .. }
            | V2Step::Oco { .. }
            | V2Step::SwapExactOut { .. }
            | V2Step::PartialSwap { .. }
            | V2Step::MultiRouting { .. } => OrderType::Swap,
            V2Step::Deposit { .. } | V2Step::Donation => OrderType::Deposit,
            V2Step::Withdraw { .. } | V2Step::ZapOut { .. } | V2Step::WithdrawImbalance { .. } => {
                OrderType::Withdraw
            }
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MinswapV2;

impl PoolProtocol for MinswapV2 {
    type Datum = MinswapV2PoolDatum;

    fn descriptor(&self) -> &'static PoolDescriptor {
        &DESCRIPTOR
    }

    /// Zap pools pair an asset with an LP token and are not tradeable; the
    /// datum reserves replace the UTxO quantities.
    fn post_init(
        &self,
        draft: &mut PoolDraft,
        datum: &MinswapV2PoolDatum,
    ) -> Result<(), PoolError> {
        if hex::encode(&datum.asset_b.policy) == LP_POLICY {
            return Err(PoolError::not_a_pool(format!(
                "{}: zap pool (tx_hash={})",
                DEX_NAME, draft.tx_hash
            )));
        }
        let unit_a = draft.assets.unit(0).map(str::to_string);
        let unit_b = draft.assets.unit(1).map(str::to_string);
        if let (Ok(a), Ok(b)) = (unit_a, unit_b) {
            draft.assets.insert(a, datum.reserve_a);
            draft.assets.insert(b, datum.reserve_b);
        }
        draft.fee = VolumeFee::Split([datum.base_fee_a_numerator, datum.base_fee_b_numerator]);
        Ok(())
    }

    /// V2 pools are identified by their LP token.
    fn pool_id(&self, draft: &PoolDraft) -> Result<String, PoolError> {
        draft
            .lp_tokens
            .as_ref()
            .and_then(|lp| lp.unit(0).ok())
            .map(str::to_string)
            .ok_or_else(|| {
                PoolError::InvalidPool(format!(
                    "{}: pool has no LP token (tx_hash={})",
                    DEX_NAME, draft.tx_hash
                ))
            })
    }
}
