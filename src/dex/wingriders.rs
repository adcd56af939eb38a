//! WingRiders constant-product and stableswap pools.
//!
//! Pool datum (constructor 0):
//!   [0] lp_hash  bytes
//!   [1] pool     constr 0:
//!         [0] assets     constr 0 [AssetClass, AssetClass]
//!         [1] last_swap  int
//!         [2] treasury_a int
//!         [3] treasury_b int
//!
//! Pools are located by the validity token (`L` under the pool policy) and
//! carry a protocol treasury inside their value, which is not tradeable.
use ciborium::value::Value;

use super::cbor::{bytes_value, constr, constr_value, int_value, Fields, FromPlutus, ToPlutus};
use super::datums::{AssetClass, Direction, FullAddress, PartAddress};
use super::{BatcherFee, OrderDatum, PoolDatum, PoolDescriptor, PoolProtocol, PoolSelector};
use crate::error::{DatumError, PoolError};
use crate::models::{AssetBag, OrderType};
use crate::pricing::{AnnPolicy, Pricing, StableSwapParams, VolumeFee};
use crate::state::pool::PoolDraft;

pub const DEX_NAME: &str = "WingRiders";
pub const SSP_DEX_NAME: &str = "WingRidersSSP";

const POOL_POLICY: &str = "026a18d04a0c642759bb3d83b12e3344894e5c1c7b2aeb1a2113a570";
/// Validity token: the pool policy with asset name `L`.
const VALIDITY_ASSET: &str = "026a18d04a0c642759bb3d83b12e3344894e5c1c7b2aeb1a2113a5704c";
const ORDER_ADDRESS: &str = "addr1wxr2a8htmzuhj39y2gq7ftkpxv98y2g67tg8zezthgq4jkg0a4ul4";

const SSP_POOL_POLICY: &str = "980e8c567670d34d4ec13a0c3b6de6199f260ae5dc9dc9e867bc5c93";
const SSP_VALIDITY_ASSET: &str = "980e8c567670d34d4ec13a0c3b6de6199f260ae5dc9dc9e867bc5c934c";
const SSP_ORDER_ADDRESS: &str = "addr1w8z7qwzszt2lqy93m3atg2axx22yq5k7yvs9rmrvuwlawts2wzadz";

/// Lovelace an ADA pool keeps locked besides its reserve.
const LOCKED_LOVELACE: i128 = 3_000_000;

pub static DESCRIPTOR: PoolDescriptor = PoolDescriptor {
    dex_name: DEX_NAME,
    pool_policy: Some(&[POOL_POLICY]),
    lp_policy: None,
    dex_policy: Some(&[VALIDITY_ASSET]),
    order_selector: &[ORDER_ADDRESS],
    pool_selector: PoolSelector {
        addresses: &[],
        assets: &[VALIDITY_ASSET],
    },
    default_fee: VolumeFee::Flat(35),
    batcher_fee: BatcherFee::Flat(2_000_000),
    deposit: 2_000_000,
};

pub static SSP_DESCRIPTOR: PoolDescriptor = PoolDescriptor {
    dex_name: SSP_DEX_NAME,
    pool_policy: Some(&[SSP_POOL_POLICY]),
    lp_policy: None,
    dex_policy: Some(&[SSP_VALIDITY_ASSET]),
    order_selector: &[SSP_ORDER_ADDRESS],
    pool_selector: PoolSelector {
        addresses: &[],
        assets: &[SSP_VALIDITY_ASSET],
    },
    default_fee: VolumeFee::Flat(6),
    batcher_fee: BatcherFee::Flat(1_500_000),
    deposit: 2_000_000,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WingRidersPoolDatum {
    pub lp_hash: Vec<u8>,
    pub asset_a: AssetClass,
    pub asset_b: AssetClass,
    pub last_swap: i128,
    pub treasury_a: i128,
    pub treasury_b: i128,
}

impl FromPlutus for WingRidersPoolDatum {
    fn from_plutus(value: &Value) -> Result<Self, DatumError> {
        let mut f = Fields::expect(value, "WingRidersPoolDatum", 0, 2)?;
        let lp_hash = f.bytes()?;
        let mut pool = Fields::expect(f.value()?, "LiquidityPool", 0, 4)?;
        let mut assets = Fields::expect(pool.value()?, "LiquidityPoolAssets", 0, 2)?;
        Ok(Self {
            lp_hash,
            asset_a: assets.next()?,
            asset_b: assets.next()?,
            last_swap: pool.int()?,
            treasury_a: pool.int()?,
            treasury_b: pool.int()?,
        })
    }
}

impl ToPlutus for WingRidersPoolDatum {
    fn to_plutus(&self) -> Value {
        constr_value(
            0,
            vec![
                bytes_value(&self.lp_hash),
                constr_value(
                    0,
                    vec![
                        constr_value(0, vec![self.asset_a.to_plutus(), self.asset_b.to_plutus()]),
                        int_value(self.last_swap),
                        int_value(self.treasury_a),
                        int_value(self.treasury_b),
                    ],
                ),
            ],
        )
    }
}

impl PoolDatum for WingRidersPoolDatum {
    fn pool_pair(&self) -> Option<Vec<String>> {
        Some(vec![self.asset_a.unit(), self.asset_b.unit()])
    }
}

/// Order parameters shared by every action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WingRidersOrderConfig {
    pub owner: FullAddress,
    pub owner_payment: Vec<u8>,
    /// POSIX milliseconds after which the order can only be reclaimed.
    pub expiration: i128,
    pub asset_a: AssetClass,
    pub asset_b: AssetClass,
}

impl FromPlutus for WingRidersOrderConfig {
    fn from_plutus(value: &Value) -> Result<Self, DatumError> {
        let mut f = Fields::expect(value, "WingRidersOrderConfig", 0, 4)?;
        let owner = f.next()?;
        let owner_payment = f.bytes()?;
        let expiration = f.int()?;
        let mut assets = Fields::expect(f.value()?, "WingRidersAssetClass", 0, 2)?;
        Ok(Self {
            owner,
            owner_payment,
            expiration,
            asset_a: assets.next()?,
            asset_b: assets.next()?,
        })
    }
}

impl ToPlutus for WingRidersOrderConfig {
    fn to_plutus(&self) -> Value {
        constr_value(
            0,
            vec![
                self.owner.to_plutus(),
                bytes_value(&self.owner_payment),
                int_value(self.expiration),
                constr_value(0, vec![self.asset_a.to_plutus(), self.asset_b.to_plutus()]),
            ],
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WingRidersAction {
    Swap { direction: Direction, min_receive: i128 },
    Deposit { min_lp: i128 },
    Withdraw { min_a: i128, min_b: i128 },
    FeeClaim,
    StakeReward,
}

impl FromPlutus for WingRidersAction {
    fn from_plutus(value: &Value) -> Result<Self, DatumError> {
        let (alt, items) = constr(value)?;
        match alt {
            0 => {
                let mut f = Fields::from_items(items, "WingRidersSwap", 2)?;
                Ok(WingRidersAction::Swap {
                    direction: f.next()?,
                    min_receive: f.int()?,
                })
            }
            1 => Ok(WingRidersAction::Deposit {
                min_lp: Fields::from_items(items, "WingRidersDeposit", 1)?.int()?,
            }),
            2 => {
                let mut f = Fields::from_items(items, "WingRidersWithdraw", 2)?;
                Ok(WingRidersAction::Withdraw {
                    min_a: f.int()?,
                    min_b: f.int()?,
                })
            }
            3 => {
                Fields::from_items(items, "WingRidersFeeClaim", 0)?;
                Ok(WingRidersAction::FeeClaim)
            }
            4 => {
                Fields::from_items(items, "WingRidersStakeReward", 0)?;
                Ok(WingRidersAction::StakeReward)
            }
            found => Err(DatumError::UnknownVariant {
                schema: "WingRidersAction",
                found,
            }),
        }
    }
}

impl ToPlutus for WingRidersAction {
    fn to_plutus(&self) -> Value {
        match self {
            WingRidersAction::Swap { direction, min_receive } => {
                constr_value(0, vec![direction.to_plutus(), int_value(*min_receive)])
            }
            WingRidersAction::Deposit { min_lp } => constr_value(1, vec![int_value(*min_lp)]),
            WingRidersAction::Withdraw { min_a, min_b } => {
                constr_value(2, vec![int_value(*min_a), int_value(*min_b)])
            }
            WingRidersAction::FeeClaim => constr_value(3, vec![]),
            WingRidersAction::StakeReward => constr_value(4, vec![]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WingRidersOrderDatum {
    pub config: WingRidersOrderConfig,
    pub action: WingRidersAction,
}

impl WingRidersOrderDatum {
    /// A swap of `in_assets` for at least `out_assets`, valid until `expiration_ms`.
    pub fn swap(
        owner: FullAddress,
        in_assets: &AssetBag,
        out_assets: &AssetBag,
        expiration_ms: i128,
    ) -> Result<Self, DatumError> {
        let in_unit = in_assets.unit(0).map_err(|e| DatumError::Kind {
            expected: "single input asset",
            found: e.to_string(),
        })?;
        let out_unit = out_assets.unit(0).map_err(|e| DatumError::Kind {
            expected: "single output asset",
            found: e.to_string(),
        })?;
        let min_receive = out_assets.quantity(0).unwrap_or(0);
        let merged = in_assets + out_assets;
        let (direction, first, second) = if merged.unit(0).ok() == Some(in_unit) {
            (Direction::AtoB, in_unit, out_unit)
        } else {
            (Direction::BtoA, out_unit, in_unit)
        };
        let owner_payment = match &owner.payment {
            PartAddress::Key(h) | PartAddress::Script(h) => h.clone(),
        };
        Ok(Self {
            config: WingRidersOrderConfig {
                owner,
                owner_payment,
                expiration: expiration_ms,
                asset_a: AssetClass::from_unit(first)?,
                asset_b: AssetClass::from_unit(second)?,
            },
            action: WingRidersAction::Swap { direction, min_receive },
        })
    }
}

impl FromPlutus for WingRidersOrderDatum {
    fn from_plutus(value: &Value) -> Result<Self, DatumError> {
        let mut f = Fields::expect(value, "WingRidersOrderDatum", 0, 2)?;
        Ok(Self {
            config: f.next()?,
            action: f.next()?,
        })
    }
}

impl ToPlutus for WingRidersOrderDatum {
    fn to_plutus(&self) -> Value {
        constr_value(0, vec![self.config.to_plutus(), self.action.to_plutus()])
    }
}

impl OrderDatum for WingRidersOrderDatum {
    fn address_source(&self) -> Result<Option<String>, DatumError> {
        self.config.owner.to_address().map(Some)
    }

    fn requested_amount(&self) -> AssetBag {
        let config = &self.config;
        match &self.action {
            WingRidersAction::Deposit { min_lp } => AssetBag::single("lp", *min_lp),
            WingRidersAction::Swap {
                direction: Direction::BtoA,
                min_receive,
            } => config.asset_a.with_quantity(*min_receive),
            WingRidersAction::Swap {
                direction: Direction::AtoB,
                min_receive,
            } => config.asset_b.with_quantity(*min_receive),
            WingRidersAction::Withdraw { min_a, min_b } => {
                let mut bag = config.asset_a.with_quantity(*min_a);
                bag.insert(config.asset_b.unit(), *min_b);
                bag
            }
            WingRidersAction::FeeClaim | WingRidersAction::StakeReward => AssetBag::new(),
        }
    }

    fn order_type(&self) -> Option<OrderType> {
        match self.action {
            WingRidersAction::Swap { .. } => Some(OrderType::Swap),
            WingRidersAction::Deposit { .. } => Some(OrderType::Deposit),
            WingRidersAction::Withdraw { .. } | WingRidersAction::FeeClaim => {
                Some(OrderType::Withdraw)
            }
            WingRidersAction::StakeReward => None,
        }
    }
}

/// Remove the locked lovelace and the protocol treasury from the reserves.
fn strip_treasury(draft: &mut PoolDraft, datum: &WingRidersPoolDatum) -> Result<(), PoolError> {
    let unit_a = draft.unit_at(0)?;
    let unit_b = draft.unit_at(1)?;
    let mut reserve_a = draft.assets.get(&unit_a).unwrap_or(0);
    if draft.assets.len() == 2 {
        reserve_a -= LOCKED_LOVELACE;
    }
    let reserve_b = draft.assets.get(&unit_b).unwrap_or(0);
    draft.assets.insert(unit_a, reserve_a - datum.treasury_a);
    draft.assets.insert(unit_b, reserve_b - datum.treasury_b);
    Ok(())
}

/// A known pool must name a validity token under `desc`'s dex policy.
fn check_validity_token(desc: &PoolDescriptor, draft: &mut PoolDraft) -> Result<(), PoolError> {
    let policies = desc.dex_policy.unwrap_or_default();
    let valid = draft
        .dex_nft
        .as_ref()
        .is_some_and(|nft| nft.units().any(|u| policies.iter().any(|p| u.starts_with(p))));
    if !valid {
        return Err(PoolError::not_a_pool(format!(
            "{}: invalid DEX NFT (tx_hash={})",
            desc.dex_name, draft.tx_hash
        )));
    }
    for policy in policies {
        draft.assets.pop(policy);
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WingRiders;

impl PoolProtocol for WingRiders {
    type Datum = WingRidersPoolDatum;

    fn descriptor(&self) -> &'static PoolDescriptor {
        &DESCRIPTOR
    }

    fn supports_fast_path(&self) -> bool {
        true
    }

    fn fast_path(
        &self,
        draft: &mut PoolDraft,
        _datum: &WingRidersPoolDatum,
    ) -> Result<(), PoolError> {
        check_validity_token(&DESCRIPTOR, draft)
    }

    fn post_init(
        &self,
        draft: &mut PoolDraft,
        datum: &WingRidersPoolDatum,
    ) -> Result<(), PoolError> {
        strip_treasury(draft, datum)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WingRidersSsp;

impl PoolProtocol for WingRidersSsp {
    type Datum = WingRidersPoolDatum;

    fn descriptor(&self) -> &'static PoolDescriptor {
        &SSP_DESCRIPTOR
    }

    fn supports_fast_path(&self) -> bool {
        true
    }

    fn fast_path(
        &self,
        draft: &mut PoolDraft,
        _datum: &WingRidersPoolDatum,
    ) -> Result<(), PoolError> {
        check_validity_token(&SSP_DESCRIPTOR, draft)
    }

    fn post_init(
        &self,
        draft: &mut PoolDraft,
        datum: &WingRidersPoolDatum,
    ) -> Result<(), PoolError> {
        strip_treasury(draft, datum)
    }

    fn pricing(&self, _datum: Option<&WingRidersPoolDatum>) -> Pricing {
        Pricing::StableSwap(StableSwapParams {
            amp: 75,
            ann: AnnPolicy::Exponent,
            multipliers: [1, 1],
            fee_on_input: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dex::test_record;
    use crate::models::LOVELACE;
    use crate::state::{KnownPool, PoolBuilder, PoolState};

    const TOKEN: &str = "8a1cfae21368b8bebbbed9800fec304e95cce39a2a57dc35e2e3ebaa4d494c4b";
    const DJED: &str =
        "8db269c3ec630e06ae29f74bc39edd1f87c819f1056206e879a1cd61446a65644d6963726f555344";
    const IUSD: &str = "f66d78b4a3cb3d37afa0ec36461e51ecbde00f26c8f0a68f94b6988069555344";

    fn pool_datum(asset_b: &str, treasury_a: i128, treasury_b: i128) -> WingRidersPoolDatum {
        WingRidersPoolDatum {
            lp_hash: vec![7; 28],
            asset_a: AssetClass::lovelace(),
            asset_b: AssetClass::from_unit(asset_b).unwrap(),
            last_swap: 1_700_000_000_000,
            treasury_a,
            treasury_b,
        }
    }

    fn nft() -> String {
        format!("{}aa11", POOL_POLICY)
    }

    fn build() -> PoolState {
        let record = test_record(
            pool_datum(TOKEN, 500_000, 1_000).to_cbor().unwrap(),
            vec![
                (LOVELACE, 1_003_500_000),
                (TOKEN, 500_001_000),
                (VALIDITY_ASSET, 1),
                (nft().as_str(), 1),
            ],
        );
        PoolState::build(&WingRiders, record).unwrap()
    }

    #[test]
    fn test_treasury_and_locked_ada_removed() {
        let pool = build();
        assert_eq!(pool.reserve_a(), 1_000_000_000);
        assert_eq!(pool.reserve_b(), 500_000_000);
        assert_eq!(pool.pool_id, nft());
        assert_eq!(pool.dex_nft.as_ref().and_then(|d| d.get(VALIDITY_ASSET)), Some(1));
        let out = pool.get_amount_out(&AssetBag::lovelace(1_000_000)).unwrap();
        assert_eq!(out.quantity(), 497_753);
    }

    #[test]
    fn test_missing_validity_token() {
        let record = test_record(
            pool_datum(TOKEN, 0, 0).to_cbor().unwrap(),
            vec![(LOVELACE, 1_003_000_000), (TOKEN, 500_000_000), (nft().as_str(), 1)],
        );
        let err = PoolState::build(&WingRiders, record).unwrap_err();
        assert!(matches!(err, PoolError::NotAPool { .. }));
    }

    #[test]
    fn test_fast_path_checks_validity_token() {
        let pool = build();
        let record = test_record(
            pool_datum(TOKEN, 0, 0).to_cbor().unwrap(),
            vec![(LOVELACE, 1_000_000_000), (TOKEN, 500_000_000)],
        );
        let again = PoolBuilder::new(&WingRiders, record.clone())
            .known(pool.known().unwrap())
            .build()
            .unwrap();
        assert_eq!(again.reserve_a(), 1_000_000_000);
        assert_eq!(again.fee, VolumeFee::Flat(35));

        let forged = KnownPool {
            pool_nft: AssetBag::single(nft(), 1),
            dex_nft: Some(AssetBag::single(TOKEN, 1)),
            fee: VolumeFee::Flat(35),
        };
        let err = PoolBuilder::new(&WingRiders, record).known(forged).build().unwrap_err();
        assert!(matches!(err, PoolError::NotAPool { .. }));
    }

    #[test]
    fn test_stable_pool() {
        let datum = WingRidersPoolDatum {
            asset_a: AssetClass::from_unit(DJED).unwrap(),
            asset_b: AssetClass::from_unit(IUSD).unwrap(),
            ..pool_datum(TOKEN, 2_000, 3_000)
        };
        let nft = format!("{}bb22", SSP_POOL_POLICY);
        let record = test_record(
            datum.to_cbor().unwrap(),
            vec![
                (LOVELACE, 3_000_000),
                (DJED, 1_000_002_000),
                (IUSD, 1_000_003_000),
                (SSP_VALIDITY_ASSET, 1),
                (nft.as_str(), 1),
            ],
        );
        let pool = PoolState::build(&WingRidersSsp, record).unwrap();
        assert_eq!(pool.unit_a(), DJED);
        assert_eq!(pool.reserve_a(), 1_000_000_000);
        assert_eq!(pool.reserve_b(), 1_000_000_000);
        assert_eq!(pool.assets.unit(2).unwrap(), LOVELACE);
        let out = pool.get_amount_out(&AssetBag::single(DJED, 1_000_000)).unwrap();
        assert!(out.quantity() > 998_000 && out.quantity() < 999_400);
        assert_eq!(pool.batcher_fee(None).get(LOVELACE), Some(1_500_000));
    }

    #[test]
    fn test_order_datum() {
        let owner = FullAddress {
            payment: PartAddress::Key(vec![4; 28]),
            stake: Some(PartAddress::Key(vec![5; 28])),
        };
        let order = WingRidersOrderDatum::swap(
            owner,
            &AssetBag::single(TOKEN, 1_000),
            &AssetBag::lovelace(400),
            1_731_000_000_000,
        )
        .unwrap();
        assert_eq!(order.config.asset_a, AssetClass::lovelace());
        assert_eq!(order.config.owner_payment, vec![4; 28]);
        let decoded = WingRidersOrderDatum::from_cbor(&order.to_cbor().unwrap()).unwrap();
        assert_eq!(decoded, order);
        assert_eq!(decoded.requested_amount().get(LOVELACE), Some(400));
        assert_eq!(decoded.order_type(), Some(OrderType::Swap));

        let claim = WingRidersOrderDatum {
            action: WingRidersAction::FeeClaim,
            ..decoded.clone()
        };
        assert_eq!(claim.order_type(), Some(OrderType::Withdraw));
        assert!(claim.requested_amount().is_empty());
        let withdraw = WingRidersOrderDatum {
            action: WingRidersAction::Withdraw { min_a: 1, min_b: 2 },
            ..decoded
        };
        let amounts = withdraw.requested_amount();
        assert_eq!(amounts.get(LOVELACE), Some(1));
        assert_eq!(amounts.get(TOKEN), Some(2));
    }
}
