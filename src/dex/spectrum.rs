//! Spectrum (ErgoDEX on Cardano) constant-product pools.
//!
//! Pool tokens carry no fixed policy. They are recognised by asset name,
//! `<a>_<b>_nft` for the pool NFT and `<a>_<b>_lq` for the LP tokens.
//!
//! Pool datum (constructor 0):
//!   [0] pool_nft  AssetClass
//!   [1] asset_a   AssetClass
//!   [2] asset_b   AssetClass
//!   [3] pool_lq   AssetClass
//!   [4] fee_mod   int, out of 1000
//!   [5] stake_admin  [bytes]
//!   [6] lq_bound  int
use ciborium::value::Value;

use super::cbor::{bytes_value, constr_value, int_value, FromPlutus, Fields, ToPlutus};
use super::datums::{AssetClass, PartAddress};
use super::{BatcherFee, OrderDatum, PoolDatum, PoolDescriptor, PoolProtocol, PoolSelector};
use crate::error::{DatumError, PoolError};
use crate::models::{AssetBag, OrderType};
use crate::pricing::VolumeFee;
use crate::state::pool::PoolDraft;
use crate::utils::{shelley_address, Credential, CREDENTIAL_LEN};

pub const DEX_NAME: &str = "Spectrum";

const POOL_ADDRESSES: &[&str] = &[
    concat!(
        "addr1x8nz307k3sr60gu0e47cmajssy4fmld7u493a4xztjrll0aj764lv",
        "rxdayh2ux30fl0ktuh27csgmpevdu89jlxppvrswgxsta"
    ),
    concat!(
        "addr1x94ec3t25egvhqy2n265xfhq882jxhkknurfe9ny4rl9k6dj764lv",
        "rxdayh2ux30fl0ktuh27csgmpevdu89jlxppvrst84slu"
    ),
];
const ORDER_ADDRESS: &str = "addr1wynp362vmvr8jtc946d3a3utqgclfdl5y9d3kn849e359hsskr20n";

pub static DESCRIPTOR: PoolDescriptor = PoolDescriptor {
    dex_name: DEX_NAME,
    pool_policy: None,
    lp_policy: None,
    dex_policy: None,
    order_selector: &[ORDER_ADDRESS],
    pool_selector: PoolSelector {
        addresses: POOL_ADDRESSES,
        assets: &[],
    },
    default_fee: VolumeFee::Flat(0),
    batcher_fee: BatcherFee::Flat(1_500_000),
    deposit: 2_000_000,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpectrumPoolDatum {
    pub pool_nft: AssetClass,
    pub asset_a: AssetClass,
    pub asset_b: AssetClass,
    pub pool_lq: AssetClass,
    pub fee_mod: i128,
    pub stake_admin: Vec<Vec<u8>>,
    pub lq_bound: i128,
}

impl FromPlutus for SpectrumPoolDatum {
    fn from_plutus(value: &Value) -> Result<Self, DatumError> {
        let mut f = Fields::expect(value, "SpectrumPoolDatum", 0, 7)?;
        Ok(Self {
            pool_nft: f.next()?,
            asset_a: f.next()?,
            asset_b: f.next()?,
            pool_lq: f.next()?,
            fee_mod: f.int()?,
            stake_admin: super::cbor::list(f.value()?)?
                .iter()
                .map(|v| super::cbor::bytes(v).map(<[u8]>::to_vec))
                .collect::<Result<_, _>>()?,
            lq_bound: f.int()?,
        })
    }
}

impl ToPlutus for SpectrumPoolDatum {
    fn to_plutus(&self) -> Value {
        constr_value(
            0,
            vec![
                self.pool_nft.to_plutus(),
                self.asset_a.to_plutus(),
                self.asset_b.to_plutus(),
                self.pool_lq.to_plutus(),
                int_value(self.fee_mod),
                Value::Array(self.stake_admin.iter().map(|b| bytes_value(b)).collect()),
                int_value(self.lq_bound),
            ],
        )
    }
}

impl PoolDatum for SpectrumPoolDatum {
    fn pool_pair(&self) -> Option<Vec<String>> {
        Some(vec![self.asset_a.unit(), self.asset_b.unit()])
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpectrumOrderDatum {
    pub in_asset: AssetClass,
    pub out_asset: AssetClass,
    pub pool_token: AssetClass,
    /// Fee numerator out of 1000.
    pub fee: i128,
    /// Batcher fee per unit received, as a fraction.
    pub numerator: i128,
    pub denominator: i128,
    pub address_payment: Vec<u8>,
    pub address_stake: Option<PartAddress>,
    pub amount: i128,
    pub min_receive: i128,
}

fn gcd(mut a: i128, mut b: i128) -> i128 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a.abs()
}

impl SpectrumOrderDatum {
    pub fn swap(
        payment_key: Vec<u8>,
        stake_key: Option<Vec<u8>>,
        in_assets: &AssetBag,
        out_assets: &AssetBag,
        pool_nft: &AssetBag,
        batcher_fee: i128,
        volume_fee: i128,
    ) -> Result<Self, DatumError> {
        let class = |bag: &AssetBag| {
            bag.unit(0)
                .map_err(|e| DatumError::Kind {
                    expected: "single asset",
                    found: e.to_string(),
                })
                .and_then(AssetClass::from_unit)
        };
        let min_receive = out_assets.quantity(0).unwrap_or(0);
        let divisor = gcd(batcher_fee, min_receive).max(1);
        Ok(Self {
            in_asset: class(in_assets)?,
            out_asset: class(out_assets)?,
            pool_token: class(pool_nft)?,
            fee: (10_000 - volume_fee) / 10,
            numerator: batcher_fee / divisor,
            denominator: min_receive / divisor,
            address_payment: payment_key,
            address_stake: stake_key.map(PartAddress::Key),
            amount: in_assets.quantity(0).unwrap_or(0),
            min_receive,
        })
    }
}

impl FromPlutus for SpectrumOrderDatum {
    fn from_plutus(value: &Value) -> Result<Self, DatumError> {
        let mut f = Fields::expect(value, "SpectrumOrderDatum", 0, 10)?;
        Ok(Self {
            in_asset: f.next()?,
            out_asset: f.next()?,
            pool_token: f.next()?,
            fee: f.int()?,
            numerator: f.int()?,
            denominator: f.int()?,
            address_payment: f.bytes()?,
            address_stake: f.next()?,
            amount: f.int()?,
            min_receive: f.int()?,
        })
    }
}

impl ToPlutus for SpectrumOrderDatum {
    fn to_plutus(&self) -> Value {
        constr_value(
            0,
            vec![
                self.in_asset.to_plutus(),
                self.out_asset.to_plutus(),
                self.pool_token.to_plutus(),
                int_value(self.fee),
                int_value(self.numerator),
                int_value(self.denominator),
                bytes_value(&self.address_payment),
                self.address_stake.to_plutus(),
                int_value(self.amount),
                int_value(self.min_receive),
            ],
        )
    }
}

impl OrderDatum for SpectrumOrderDatum {
    fn address_source(&self) -> Result<Option<String>, DatumError> {
        let stake = self.address_stake.as_ref().map(PartAddress::credential);
        shelley_address(Credential::Key(&self.address_payment), stake)
            .map(Some)
            .map_err(|e| DatumError::Address(e.to_string()))
    }

    fn requested_amount(&self) -> AssetBag {
        self.out_asset.with_quantity(self.min_receive)
    }

    fn order_type(&self) -> Option<OrderType> {
        Some(OrderType::Swap)
    }
}

/// Third `_`-separated part of the asset name, lowercased.
fn name_tag(unit: &str) -> Option<String> {
    let name = hex::decode(unit.get(2 * CREDENTIAL_LEN..)?).ok()?;
    let parts: Vec<&[u8]> = name.split(|b| *b == b'_').collect();
    if parts.len() != 3 {
        return None;
    }
    Some(String::from_utf8_lossy(parts[2]).to_lowercase())
}

fn find_tagged(assets: &AssetBag, tag: &str) -> Option<String> {
    assets
        .units()
        .find(|u| name_tag(u).as_deref() == Some(tag))
        .map(str::to_string)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Spectrum;

impl PoolProtocol for Spectrum {
    type Datum = SpectrumPoolDatum;

    fn descriptor(&self) -> &'static PoolDescriptor {
        &DESCRIPTOR
    }

    fn extract_pool_nft(&self, draft: &mut PoolDraft) -> Result<(), PoolError> {
        if let Some(known) = &draft.pool_nft {
            let tagged = known.unit(0).ok().and_then(name_tag);
            if tagged.as_deref() != Some("nft") {
                return Err(PoolError::not_a_pool(format!(
                    "{}: invalid pool NFT {}",
                    DEX_NAME, known
                )));
            }
            return Ok(());
        }
        let unit = find_tagged(&draft.assets, "nft").ok_or_else(|| {
            PoolError::not_a_pool(format!("{}: a pool must have one pool NFT token", DEX_NAME))
        })?;
        let quantity = draft.assets.pop(&unit).unwrap_or(0);
        draft.pool_nft = Some(AssetBag::single(unit, quantity));
        Ok(())
    }

    fn extract_lp_tokens(&self, draft: &mut PoolDraft) -> Result<(), PoolError> {
        if draft.lp_tokens.is_some() {
            return Ok(());
        }
        let unit = find_tagged(&draft.assets, "lq").ok_or_else(|| {
            let names: Vec<String> = draft
                .assets
                .units()
                .filter_map(|u| u.get(2 * CREDENTIAL_LEN..))
                .filter_map(|n| hex::decode(n).ok())
                .map(|n| String::from_utf8_lossy(&n).into_owned())
                .collect();
            PoolError::InvalidLp(format!(
                "{}: a pool must have pool LP tokens, names: {:?}",
                DEX_NAME, names
            ))
        })?;
        let quantity = draft.assets.pop(&unit).unwrap_or(0);
        draft.lp_tokens = Some(AssetBag::single(unit, quantity));
        Ok(())
    }

    /// Inactive when twice the checked reserve falls to the liquidity bound.
    /// The checked reserve is lovelace in ADA pairs and the second token otherwise.
    fn post_init(&self, draft: &mut PoolDraft, datum: &SpectrumPoolDatum) -> Result<(), PoolError> {
        let index = if draft.assets.len() == 2 { 0 } else { 1 };
        let quantity = draft.quantity_at(index)?;
        if 2 * quantity <= datum.lq_bound {
            draft.inactive = true;
        }
        let fee = 1000i128
            .checked_sub(datum.fee_mod)
            .and_then(|f| f.checked_mul(10))
            .ok_or_else(|| {
                PoolError::InvalidPool(format!(
                    "{}: fee modifier {}",
                    draft.context(),
                    datum.fee_mod
                ))
            })?;
        draft.fee = VolumeFee::Flat(fee);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dex::test_record;
    use crate::models::LOVELACE;
    use crate::state::PoolState;

    const TOKEN: &str = "8a1cfae21368b8bebbbed9800fec304e95cce39a2a57dc35e2e3ebaa4d494c4b";
    const NFT_POLICY: &str = "1a1c0e2cd6e3a3b1ee8a8f1bd4a7cc4fd4b7f1ba7c55c6a4b5a47e2f";
    const LQ_POLICY: &str = "2b2c0e2cd6e3a3b1ee8a8f1bd4a7cc4fd4b7f1ba7c55c6a4b5a47e2f";

    fn nft() -> String {
        format!("{}{}", NFT_POLICY, hex::encode("ADA_MILK_nft"))
    }

    fn lq() -> String {
        format!("{}{}", LQ_POLICY, hex::encode("ADA_MILK_lq"))
    }

    fn datum(lq_bound: i128) -> SpectrumPoolDatum {
        SpectrumPoolDatum {
            pool_nft: AssetClass::from_unit(&nft()).unwrap(),
            asset_a: AssetClass::lovelace(),
            asset_b: AssetClass::from_unit(TOKEN).unwrap(),
            pool_lq: AssetClass::from_unit(&lq()).unwrap(),
            fee_mod: 997,
            stake_admin: vec![vec![7; 28]],
            lq_bound,
        }
    }

    fn build_from(datum: SpectrumPoolDatum, with_lq: bool) -> Result<PoolState, PoolError> {
        let nft = nft();
        let lq = lq();
        let mut assets = vec![(LOVELACE, 1_000_000_000), (TOKEN, 500_000_000), (nft.as_str(), 1)];
        if with_lq {
            assets.push((lq.as_str(), 9_223_372_036_000_000_000));
        }
        PoolState::build(&Spectrum, test_record(datum.to_cbor().unwrap(), assets))
    }

    fn build(lq_bound: i128, with_lq: bool) -> Result<PoolState, PoolError> {
        build_from(datum(lq_bound), with_lq)
    }

    #[test]
    fn test_tokens_found_by_name() {
        let pool = build(0, true).unwrap();
        assert_eq!(pool.pool_id, nft());
        let lp = pool.lp_tokens.as_ref().and_then(|l| l.get(&lq()));
        assert_eq!(lp, Some(9_223_372_036_000_000_000));
        assert_eq!(pool.fee, VolumeFee::Flat(30));
        assert!(!pool.inactive);
        let out = pool.get_amount_out(&AssetBag::lovelace(1_000_000)).unwrap();
        assert_eq!(out.quantity(), 498_003);
    }

    #[test]
    fn test_liquidity_bound_marks_inactive() {
        assert!(build(2_000_000_000, true).unwrap().inactive);
        assert!(!build(1_999_999_999, true).unwrap().inactive);
    }

    #[test]
    fn test_fee_modifier_outside_range_is_invalid() {
        // 0 would charge the whole input, 1001 a negative fee
        for fee_mod in [0, 1_001] {
            let mut d = datum(0);
            d.fee_mod = fee_mod;
            assert!(matches!(build_from(d, true), Err(PoolError::InvalidPool(_))));
        }
        let mut d = datum(0);
        d.fee_mod = 1_000;
        assert_eq!(build_from(d, true).unwrap().fee, VolumeFee::Flat(0));
    }

    #[test]
    fn test_missing_lp_is_invalid_lp() {
        assert!(matches!(build(0, false), Err(PoolError::InvalidLp(_))));
    }

    #[test]
    fn test_name_tag() {
        assert_eq!(name_tag(&nft()).as_deref(), Some("nft"));
        assert_eq!(name_tag(TOKEN), None);
        assert_eq!(name_tag(LOVELACE), None);
    }

    #[test]
    fn test_order_datum() {
        let order = SpectrumOrderDatum::swap(
            vec![3; 28],
            Some(vec![4; 28]),
            &AssetBag::lovelace(10_000_000),
            &AssetBag::single(TOKEN, 4_000_000),
            &AssetBag::single(nft(), 1),
            1_500_000,
            30,
        )
        .unwrap();
        assert_eq!(order.fee, 997);
        assert_eq!((order.numerator, order.denominator), (3, 8));
        let decoded = SpectrumOrderDatum::from_cbor(&order.to_cbor().unwrap()).unwrap();
        assert_eq!(decoded, order);
        assert_eq!(decoded.requested_amount().get(TOKEN), Some(4_000_000));
        assert!(decoded.address_source().unwrap().unwrap().starts_with("addr1q"));
    }
}
