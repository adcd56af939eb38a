//! MuesliSwap constant-product pools.
//!
//! Pools are found by the MuesliSwap AMM token they hold. The pool NFT has no
//! fixed policy: it is whatever single unit is left with quantity one.
use ciborium::value::Value;

use super::cbor::{bytes_value, constr_value, int_value, Fields, FromPlutus, ToPlutus};
use super::datums::{AssetClass, FullAddress};
use super::{
    normalize_unit, BatcherFee, OrderDatum, PoolDatum, PoolDescriptor, PoolProtocol, PoolSelector,
};
use crate::error::{DatumError, PoolError};
use crate::models::{AssetBag, OrderType, LOVELACE};
use crate::pricing::VolumeFee;
use crate::state::pool::{self, PoolDraft};

pub const DEX_NAME: &str = "MuesliSwap";

const AMM_TOKENS: &[&str] = &[
    "de9b756719341e79785aa13c164e7fe68c189ed04d61c9876b2fe53f4d7565736c69537761705f414d4d",
    "ffcdbb9155da0602280c04d8b36efde35e3416567f9241aff09552694d7565736c69537761705f414d4d",
];

/// NFT of MuesliSwap's own test pool, never a tradeable market.
const TEST_POOL: &str =
    "a8512101cb1163cc218e616bb4d4070349a1c9395313f1323cc583634d7565736c695377617054657374506f6f6c";

const ORDER_ADDRESS: &str = concat!(
    "addr1zyq0kyrml023kwjk8zr86d5gaxrt5w8lxnah8r6m6s4jp4g3r6dxn",
    "zml343sx8jweqn4vn3fz2kj8kgu9czghx0jrsyqqktyhv"
);

pub static DESCRIPTOR: PoolDescriptor = PoolDescriptor {
    dex_name: DEX_NAME,
    pool_policy: None,
    lp_policy: None,
    dex_policy: Some(AMM_TOKENS),
    order_selector: &[ORDER_ADDRESS],
    pool_selector: PoolSelector {
        addresses: &[],
        assets: AMM_TOKENS,
    },
    default_fee: VolumeFee::Flat(30),
    batcher_fee: BatcherFee::Flat(950_000),
    deposit: 1_700_000,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MuesliPoolDatum {
    pub asset_a: AssetClass,
    pub asset_b: AssetClass,
    pub lp: i128,
    pub fee: i128,
}

impl FromPlutus for MuesliPoolDatum {
    fn from_plutus(value: &Value) -> Result<Self, DatumError> {
        let mut f = Fields::expect(value, "MuesliPoolDatum", 0, 4)?;
        Ok(Self {
            asset_a: f.next()?,
            asset_b: f.next()?,
            lp: f.int()?,
            fee: f.int()?,
        })
    }
}

impl ToPlutus for MuesliPoolDatum {
    fn to_plutus(&self) -> Value {
        constr_value(
            0,
            vec![
                self.asset_a.to_plutus(),
                self.asset_b.to_plutus(),
                int_value(self.lp),
                int_value(self.fee),
            ],
        )
    }
}

impl PoolDatum for MuesliPoolDatum {
    fn pool_pair(&self) -> Option<Vec<String>> {
        Some(vec![self.asset_a.unit(), self.asset_b.unit()])
    }
}

/// A swap order. Muesli orders carry only swaps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MuesliOrderDatum {
    pub owner: FullAddress,
    /// Asset bought (received) by the order.
    pub buy: AssetClass,
    /// Asset sold (paid) by the order.
    pub sell: AssetClass,
    pub min_receive: i128,
    pub allow_partial: bool,
    /// Lovelace attached for the batcher and the returned deposit.
    pub lovelace_attached: i128,
}

impl MuesliOrderDatum {
    pub fn swap(
        owner: FullAddress,
        in_assets: &AssetBag,
        out_assets: &AssetBag,
        batcher_fee: i128,
        deposit: i128,
    ) -> Result<Self, DatumError> {
        let unit_of = |bag: &AssetBag| {
            bag.unit(0)
                .map(str::to_string)
                .map_err(|e| DatumError::Kind {
                    expected: "single asset",
                    found: e.to_string(),
                })
        };
        Ok(Self {
            owner,
            buy: AssetClass::from_unit(&unit_of(out_assets)?)?,
            sell: AssetClass::from_unit(&unit_of(in_assets)?)?,
            min_receive: out_assets.quantity(0).unwrap_or(0),
            allow_partial: true,
            lovelace_attached: batcher_fee + deposit,
        })
    }
}

impl FromPlutus for MuesliOrderDatum {
    fn from_plutus(value: &Value) -> Result<Self, DatumError> {
        let mut outer = Fields::expect(value, "MuesliOrderDatum", 0, 1)?;
        let mut f = Fields::expect(outer.value()?, "MuesliOrderConfig", 0, 8)?;
        let owner = f.next()?;
        let buy = AssetClass {
            policy: f.bytes()?,
            name: f.bytes()?,
        };
        let sell = AssetClass {
            policy: f.bytes()?,
            name: f.bytes()?,
        };
        Ok(Self {
            owner,
            buy,
            sell,
            min_receive: f.int()?,
            allow_partial: f.next()?,
            lovelace_attached: f.int()?,
        })
    }
}

impl ToPlutus for MuesliOrderDatum {
    fn to_plutus(&self) -> Value {
        constr_value(
            0,
            vec![constr_value(
                0,
                vec![
                    self.owner.to_plutus(),
                    bytes_value(&self.buy.policy),
                    bytes_value(&self.buy.name),
                    bytes_value(&self.sell.policy),
                    bytes_value(&self.sell.name),
                    int_value(self.min_receive),
                    self.allow_partial.to_plutus(),
                    int_value(self.lovelace_attached),
                ],
            )],
        )
    }
}

impl OrderDatum for MuesliOrderDatum {
    fn address_source(&self) -> Result<Option<String>, DatumError> {
        self.owner.to_address().map(Some)
    }

    fn requested_amount(&self) -> AssetBag {
        let unit = format!("{}{}", hex::encode(&self.buy.policy), hex::encode(&self.buy.name));
        AssetBag::single(normalize_unit(unit), self.min_receive)
    }

    fn order_type(&self) -> Option<OrderType> {
        Some(OrderType::Swap)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MuesliSwap;

impl PoolProtocol for MuesliSwap {
    type Datum = MuesliPoolDatum;

    fn descriptor(&self) -> &'static PoolDescriptor {
        &DESCRIPTOR
    }

    fn extract_dex_nft(&self, draft: &mut PoolDraft) -> Result<(), PoolError> {
        let in_dex_nft = draft.dex_nft.as_ref().is_some_and(|nft| nft.contains(TEST_POOL));
        if in_dex_nft || draft.assets.contains(TEST_POOL) {
            return Err(PoolError::InvalidPool(format!(
                "{}: this is a test pool (tx_hash={})",
                DEX_NAME, draft.tx_hash
            )));
        }
        pool::extract_dex_nft(&DESCRIPTOR, draft)
    }

    fn extract_pool_nft(&self, draft: &mut PoolDraft) -> Result<(), PoolError> {
        if let Some(known) = &draft.pool_nft {
            let units: Vec<String> = known.units().map(str::to_string).collect();
            for unit in units {
                draft.assets.pop(&unit);
            }
            return Ok(());
        }
        let nfts: Vec<String> = draft
            .assets
            .iter()
            .filter(|(unit, quantity)| *quantity == 1 && *unit != LOVELACE)
            .map(|(unit, _)| unit.to_string())
            .collect();
        if nfts.len() != 1 {
            return Err(PoolError::InvalidPool(format!(
                "{}: pools must have exactly one pool nft, found {} (tx_hash={})",
                DEX_NAME,
                nfts.len(),
                draft.tx_hash
            )));
        }
        let quantity = draft.assets.pop(&nfts[0]).unwrap_or(1);
        draft.pool_nft = Some(AssetBag::single(nfts[0].clone(), quantity));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dex::datums::PartAddress;
    use crate::dex::test_record;
    use crate::state::PoolState;

    const TOKEN: &str = "8a1cfae21368b8bebbbed9800fec304e95cce39a2a57dc35e2e3ebaa4d494c4b";
    const NFT: &str = "909133088303c49f3a30f1cc8ed553a73857a29779f6c6561cd8093f4d5350";

    fn datum() -> MuesliPoolDatum {
        MuesliPoolDatum {
            asset_a: AssetClass::lovelace(),
            asset_b: AssetClass::from_unit(TOKEN).unwrap(),
            lp: 707_106_781,
            fee: 30,
        }
    }

    #[test]
    fn test_single_quantity_one_asset_is_the_pool_nft() {
        let record = test_record(
            datum().to_cbor().unwrap(),
            vec![(LOVELACE, 1_000_000_000), (TOKEN, 500_000_000), (AMM_TOKENS[0], 1), (NFT, 1)],
        );
        let pool = PoolState::build(&MuesliSwap, record).unwrap();
        assert_eq!(pool.pool_id, NFT);
        assert_eq!(pool.assets.len(), 2);
        let out = pool.get_amount_out(&AssetBag::lovelace(1_000_000)).unwrap();
        assert_eq!(out.quantity(), 498_003);
        assert_eq!(pool.deposit().get(LOVELACE), Some(1_700_000));
    }

    #[test]
    fn test_ambiguous_and_test_pools_rejected() {
        let other = format!("{}01", &NFT[..56]);
        let record = test_record(
            datum().to_cbor().unwrap(),
            vec![
                (LOVELACE, 1_000_000_000),
                (TOKEN, 500_000_000),
                (AMM_TOKENS[0], 1),
                (NFT, 1),
                (other.as_str(), 1),
            ],
        );
        assert!(matches!(
            PoolState::build(&MuesliSwap, record),
            Err(PoolError::InvalidPool(_))
        ));

        let record = test_record(
            datum().to_cbor().unwrap(),
            vec![
                (LOVELACE, 1_000_000_000),
                (TOKEN, 500_000_000),
                (AMM_TOKENS[1], 1),
                (TEST_POOL, 1),
            ],
        );
        assert!(matches!(
            PoolState::build(&MuesliSwap, record),
            Err(PoolError::InvalidPool(_))
        ));
    }

    #[test]
    fn test_order_datum() {
        let owner = FullAddress {
            payment: PartAddress::Key(vec![8; 28]),
            stake: None,
        };
        let order = MuesliOrderDatum::swap(
            owner,
            &AssetBag::lovelace(10_000_000),
            &AssetBag::single(TOKEN, 4_000),
            950_000,
            1_700_000,
        )
        .unwrap();
        assert_eq!(order.lovelace_attached, 2_650_000);
        assert!(order.sell.is_lovelace());
        let decoded = MuesliOrderDatum::from_cbor(&order.to_cbor().unwrap()).unwrap();
        assert_eq!(decoded, order);
        assert_eq!(decoded.requested_amount().get(TOKEN), Some(4_000));

        let reverse = MuesliOrderDatum {
            buy: AssetClass::lovelace(),
            ..decoded
        };
        assert_eq!(reverse.requested_amount().get(LOVELACE), Some(4_000));
    }
}
