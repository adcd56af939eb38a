//! Validated pool state and the construction pipeline that produces it.
//!
//! A raw record is threaded through [`PoolBuilder::build`]:
//!
//! 1. assets must be present
//! 2. optional fast path for already-parsed pools
//! 3. datum decode (failure is `NotAPool`)
//! 4. pool pair moved into a side bag
//! 5. dex NFT, 6. LP tokens, 7. pool NFT extracted from what remains
//! 8. pair merged back
//! 9. structural check on the remaining reserves
//! 10. protocol adjustments, 11. inactivity

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dex::{BatcherFee, PoolDatum, PoolDescriptor, PoolProtocol};
use crate::error::{PoolError, PricingError};
use crate::models::{AssetBag, RawUtxoRecord, LOVELACE};
use crate::pricing::{constant_product, Pricing, SwapQuote, VolumeFee, FEE_DENOMINATOR};

/// Working state while a pool is being validated.
///
/// The token fields start out holding whatever the caller already knows
/// about the pool; extraction steps validate those instead of searching.
#[derive(Debug, Clone)]
pub struct PoolDraft {
    pub dex_name: &'static str,
    pub tx_hash: String,
    pub assets: AssetBag,
    pub pool_nft: Option<AssetBag>,
    pub dex_nft: Option<AssetBag>,
    pub lp_tokens: Option<AssetBag>,
    pub fee: VolumeFee,
    pub inactive: bool,
}

impl PoolDraft {
    pub(crate) fn context(&self) -> String {
        format!("{} (tx_hash={}, assets={})", self.dex_name, self.tx_hash, self.assets)
    }

    pub fn unit_at(&self, index: usize) -> Result<String, PoolError> {
        self.assets
            .unit(index)
            .map(str::to_string)
            .map_err(|e| PoolError::InvalidPool(e.to_string()))
    }

    pub fn quantity_at(&self, index: usize) -> Result<i128, PoolError> {
        self.assets.quantity(index).map_err(|e| PoolError::InvalidPool(e.to_string()))
    }
}

/// Policy lists that are empty behave as if no list was declared.
fn declared(policies: Option<&'static [&'static str]>) -> Option<&'static [&'static str]> {
    policies.filter(|p| !p.is_empty())
}

fn matching_policy<'a>(unit: &str, policies: &[&'a str]) -> Option<&'a str> {
    policies.iter().copied().find(|p| unit.starts_with(p))
}

fn holds_policy(bag: &AssetBag, policies: &[&str]) -> bool {
    bag.units().any(|u| matching_policy(u, policies).is_some())
}

fn pop_single(assets: &mut AssetBag, unit: &str) -> AssetBag {
    let quantity = assets.pop(unit).unwrap_or(0);
    AssetBag::single(unit, quantity)
}

/// Default dex NFT step: the first asset under a declared dex policy.
pub fn extract_dex_nft(desc: &PoolDescriptor, draft: &mut PoolDraft) -> Result<(), PoolError> {
    let Some(policies) = declared(desc.dex_policy) else {
        return Ok(());
    };
    if let Some(known) = &draft.dex_nft {
        if !holds_policy(known, policies) {
            return Err(PoolError::not_a_pool(format!(
                "invalid DEX NFT {} for {}",
                known, desc.dex_name
            )));
        }
        return Ok(());
    }
    let unit = draft
        .assets
        .units()
        .find(|u| matching_policy(u, policies).is_some())
        .map(str::to_string)
        .ok_or_else(|| {
            PoolError::not_a_pool(format!("{}: pool must have one DEX NFT token", draft.context()))
        })?;
    draft.dex_nft = Some(pop_single(&mut draft.assets, &unit));
    Ok(())
}

/// Default LP step: LP tokens are optional, so finding none is not an error.
pub fn extract_lp_tokens(desc: &PoolDescriptor, draft: &mut PoolDraft) -> Result<(), PoolError> {
    let Some(policies) = declared(desc.lp_policy) else {
        return Ok(());
    };
    if let Some(known) = &draft.lp_tokens {
        if !holds_policy(known, policies) {
            return Err(PoolError::InvalidPool(format!(
                "{}: pool has invalid LP tokens {}",
                desc.dex_name, known
            )));
        }
        return Ok(());
    }
    let unit = draft
        .assets
        .units()
        .find(|u| matching_policy(u, policies).is_some())
        .map(str::to_string);
    if let Some(unit) = unit {
        draft.lp_tokens = Some(pop_single(&mut draft.assets, &unit));
    }
    Ok(())
}

/// Default pool NFT step: exactly one asset under a declared pool policy.
///
/// Anything else sharing the NFT's name is removed too, which catches LP
/// tokens minted under the pool identifier.
pub fn extract_pool_nft(desc: &PoolDescriptor, draft: &mut PoolDraft) -> Result<(), PoolError> {
    let Some(policies) = declared(desc.pool_policy) else {
        return Ok(());
    };
    let nft = match draft.pool_nft.clone() {
        Some(known) => {
            if !holds_policy(&known, policies) {
                return Err(PoolError::InvalidPool(format!(
                    "{}: invalid pool NFT {}",
                    desc.dex_name, known
                )));
            }
            let units: Vec<String> = known.units().map(str::to_string).collect();
            for unit in units {
                draft.assets.pop(&unit);
            }
            known
        }
        None => {
            let found: Vec<String> = draft
                .assets
                .units()
                .filter(|u| matching_policy(u, policies).is_some())
                .map(str::to_string)
                .collect();
            if found.len() != 1 {
                return Err(PoolError::InvalidPool(format!(
                    "{}: a pool must have one pool NFT token, found {}",
                    draft.context(),
                    found.len()
                )));
            }
            let nft = pop_single(&mut draft.assets, &found[0]);
            draft.pool_nft = Some(nft.clone());
            nft
        }
    };

    let Ok(nft_unit) = nft.unit(0) else {
        return Ok(());
    };
    let suffix = matching_policy(nft_unit, policies)
        .map(|p| &nft_unit[p.len()..])
        .unwrap_or_default();
    if !suffix.is_empty() {
        let shadows: Vec<String> = draft
            .assets
            .units()
            .filter(|u| u.ends_with(suffix))
            .map(str::to_string)
            .collect();
        for unit in shadows {
            debug!(dex = desc.dex_name, unit = %unit, "dropping asset named after the pool NFT");
            draft.assets.pop(&unit);
        }
    }
    Ok(())
}

/// Pair-shape check: 2 assets with one non-native, or 3 assets with two
/// non-native and `lovelace` moved last.
/// Rejects fees that leave no positive fee modifier.
pub fn check_fee(draft: &PoolDraft) -> Result<(), PoolError> {
    if draft.fee.is_valid() {
        return Ok(());
    }
    Err(PoolError::InvalidPool(format!(
        "{}: fee {:?} is outside 0..{} basis points",
        draft.context(),
        draft.fee,
        FEE_DENOMINATOR
    )))
}

pub fn check_reserves(draft: &mut PoolDraft) -> Result<(), PoolError> {
    let non_native = draft.assets.non_native().len();
    match (draft.assets.len(), non_native) {
        (2, 1) => Ok(()),
        (2, _) => Err(PoolError::InvalidPool(format!(
            "{}: pool must only have 1 non-ADA asset",
            draft.context()
        ))),
        (3, 2) => {
            draft.assets.move_to_end(LOVELACE);
            Ok(())
        }
        (3, _) => Err(PoolError::InvalidPool(format!(
            "{}: pool must only have 2 non-ADA assets",
            draft.context()
        ))),
        (1, 0) => Err(PoolError::NoAssets(format!(
            "{}: invalid pool, only contains lovelace",
            draft.context()
        ))),
        _ => Err(PoolError::InvalidPool(format!(
            "{}: pool must have 2 or 3 assets except factor, NFT, and LP tokens",
            draft.context()
        ))),
    }
}

pub fn default_pool_id(draft: &PoolDraft) -> Result<String, PoolError> {
    draft
        .pool_nft
        .as_ref()
        .and_then(|nft| nft.unit(0).ok())
        .map(str::to_string)
        .ok_or_else(|| {
            PoolError::InvalidPool(format!("{}: no pool NFT to identify the pool", draft.context()))
        })
}

/// Pool NFT, dex NFT and fee of a pool parsed earlier.
#[derive(Debug, Clone)]
pub struct KnownPool {
    pub pool_nft: AssetBag,
    pub dex_nft: Option<AssetBag>,
    pub fee: VolumeFee,
}

pub struct PoolBuilder<'a, P: PoolProtocol> {
    protocol: &'a P,
    record: RawUtxoRecord,
    known: Option<KnownPool>,
    lp_tokens: Option<AssetBag>,
    settings_fee: Option<i128>,
}

impl<'a, P: PoolProtocol> PoolBuilder<'a, P> {
    pub fn new(protocol: &'a P, record: RawUtxoRecord) -> Self {
        Self {
            protocol,
            record,
            known: None,
            lp_tokens: None,
            settings_fee: None,
        }
    }

    /// Revalidate a pool whose tokens were already extracted.
    pub fn known(mut self, known: KnownPool) -> Self {
        self.known = Some(known);
        self
    }

    pub fn lp_tokens(mut self, lp_tokens: AssetBag) -> Self {
        self.lp_tokens = Some(lp_tokens);
        self
    }

    /// Batcher fee read from the protocol settings datum.
    pub fn settings_fee(mut self, fee: Option<i128>) -> Self {
        self.settings_fee = fee;
        self
    }

    pub fn build(self) -> Result<PoolState, PoolError> {
        let desc = self.protocol.descriptor();
        let record = self.record;
        let assets = record
            .assets
            .clone()
            .filter(|a| !a.is_empty())
            .ok_or_else(|| {
                PoolError::NoAssets(format!("no assets in the pool (tx_hash={})", record.tx_hash))
            })?;

        let mut draft = PoolDraft {
            dex_name: desc.dex_name,
            tx_hash: record.tx_hash.clone(),
            assets,
            pool_nft: self.known.as_ref().map(|k| k.pool_nft.clone()),
            dex_nft: self.known.as_ref().and_then(|k| k.dex_nft.clone()),
            lp_tokens: self.lp_tokens,
            fee: self.known.as_ref().map(|k| k.fee).unwrap_or(desc.default_fee),
            inactive: false,
        };

        let datum = self
            .protocol
            .decode_datum(record.datum_cbor())
            .map_err(|e| PoolError::undecodable(&record.tx_hash, record.datum_cbor(), e))?;

        if self.known.is_some() && self.protocol.supports_fast_path() {
            self.protocol.extract_pool_nft(&mut draft).map_err(|e| match e {
                PoolError::InvalidPool(reason) => PoolError::not_a_pool(reason),
                other => other,
            })?;
            self.protocol.fast_path(&mut draft, &datum)?;
            if draft.assets.len() == 3 {
                draft.assets.move_to_end(LOVELACE);
            }
        } else {
            let mut pair = AssetBag::new();
            for unit in datum.pool_pair().unwrap_or_default() {
                let quantity = draft.assets.pop(&unit).ok_or_else(|| {
                    PoolError::InvalidPool(format!(
                        "pool does not contain expected asset {} ({})",
                        unit,
                        draft.context()
                    ))
                })?;
                pair.insert(unit, quantity);
            }

            self.protocol.extract_dex_nft(&mut draft)?;
            self.protocol.extract_lp_tokens(&mut draft)?;
            self.protocol.extract_pool_nft(&mut draft)?;

            pair.canonicalize();
            draft.assets.extend(pair);
            check_reserves(&mut draft)?;
            self.protocol.post_init(&mut draft, &datum)?;
        }
        check_fee(&draft)?;
        let pricing = self.protocol.pricing(Some(&datum));
        if !pricing.is_valid() {
            return Err(PoolError::InvalidPool(format!(
                "{}: invalid pricing parameters {:?}",
                draft.context(),
                pricing
            )));
        }

        let pool_id = self.protocol.pool_id(&draft)?;
        Ok(PoolState {
            dex: desc.dex_name.to_string(),
            pool_id,
            assets: draft.assets,
            pool_nft: draft.pool_nft,
            dex_nft: draft.dex_nft,
            lp_tokens: draft.lp_tokens,
            fee: draft.fee,
            pricing,
            inactive: draft.inactive,
            address: record.address.clone(),
            tx_hash: record.tx_hash.clone(),
            tx_index: record.tx_index,
            block_time: record.block_time,
            block_index: record.block_index,
            datum_cbor: record.datum_cbor().to_string(),
            datum_hash: record.datum_hash.clone(),
            plutus_v2: record.plutus_v2,
            batcher_fee: desc.batcher_fee,
            settings_fee: self.settings_fee,
            deposit: desc.deposit,
        })
    }
}

/// A validated liquidity pool at one point in chain time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolState {
    pub dex: String,
    pub pool_id: String,
    pub assets: AssetBag,
    pub pool_nft: Option<AssetBag>,
    pub dex_nft: Option<AssetBag>,
    pub lp_tokens: Option<AssetBag>,
    pub fee: VolumeFee,
    pub pricing: Pricing,
    pub inactive: bool,
    pub address: String,
    pub tx_hash: String,
    pub tx_index: u32,
    pub block_time: i64,
    pub block_index: u32,
    pub datum_cbor: String,
    pub datum_hash: Option<String>,
    pub plutus_v2: bool,
    pub batcher_fee: BatcherFee,
    pub settings_fee: Option<i128>,
    pub deposit: i128,
}

impl PoolState {
    pub fn build<P: PoolProtocol>(protocol: &P, record: RawUtxoRecord) -> Result<Self, PoolError> {
        PoolBuilder::new(protocol, record).build()
    }

    pub fn unit_a(&self) -> &str {
        self.assets.unit(0).unwrap_or_default()
    }

    pub fn unit_b(&self) -> &str {
        self.assets.unit(1).unwrap_or_default()
    }

    pub fn reserve_a(&self) -> i128 {
        self.assets.quantity(0).unwrap_or(0)
    }

    pub fn reserve_b(&self) -> i128 {
        self.assets.quantity(1).unwrap_or(0)
    }

    /// Returns whether `asset` is a single unit of this pool, and if it is `unit_a`.
    fn side_of(&self, asset: &AssetBag) -> Result<(bool, i128), PricingError> {
        if asset.len() != 1 {
            return Err(PricingError::AssetCount(asset.len()));
        }
        let unit = asset.unit(0)?;
        if unit != self.unit_a() && unit != self.unit_b() {
            return Err(PricingError::UnitNotInPool {
                unit: unit.to_string(),
                unit_a: self.unit_a().to_string(),
                unit_b: self.unit_b().to_string(),
            });
        }
        Ok((unit == self.unit_a(), asset.quantity(0)?))
    }

    /// Quote what selling `asset` into the pool returns.
    pub fn get_amount_out(&self, asset: &AssetBag) -> Result<SwapQuote, PricingError> {
        let (input_is_a, quantity) = self.side_of(asset)?;
        let (reserve_in, reserve_out, unit_out) = if input_is_a {
            (self.reserve_a(), self.reserve_b(), self.unit_b())
        } else {
            (self.reserve_b(), self.reserve_a(), self.unit_a())
        };
        let fee = self.fee.for_amount_out(input_is_a);
        match &self.pricing {
            Pricing::ConstantProduct => {
                let (out, impact) =
                    constant_product::amount_out(quantity, reserve_in, reserve_out, fee);
                Ok(SwapQuote::new(unit_out, out, impact))
            }
            Pricing::StableSwap(params) => {
                let reserves = [self.reserve_a(), self.reserve_b()];
                let out = params.amount_out(reserves, input_is_a, quantity, fee)?;
                Ok(SwapQuote::new(unit_out, out, 0.0))
            }
        }
    }

    /// Quote what must be paid in to receive `asset` from the pool.
    pub fn get_amount_in(&self, asset: &AssetBag) -> Result<SwapQuote, PricingError> {
        let (output_is_a, quantity) = self.side_of(asset)?;
        let (reserve_in, reserve_out, unit_in) = if output_is_a {
            (self.reserve_b(), self.reserve_a(), self.unit_b())
        } else {
            (self.reserve_a(), self.reserve_b(), self.unit_a())
        };
        match &self.pricing {
            Pricing::ConstantProduct => {
                let fee = self.fee.for_amount_in(!output_is_a);
                let (amount, impact) =
                    constant_product::amount_in(quantity, reserve_in, reserve_out, fee)?;
                Ok(SwapQuote::new(unit_in, amount, impact))
            }
            Pricing::StableSwap(params) => {
                let fee = self.fee.for_amount_out(output_is_a);
                let reserves = [self.reserve_a(), self.reserve_b()];
                let amount = params.amount_in(reserves, output_is_a, quantity, fee)?;
                Ok(SwapQuote::new(unit_in, amount, 0.0))
            }
        }
    }

    /// `(price of b in a, price of a in b)` from raw reserves.
    pub fn price(&self) -> Result<(Decimal, Decimal), PricingError> {
        let a = Decimal::from_i128(self.reserve_a()).unwrap_or_default();
        let b = Decimal::from_i128(self.reserve_b()).unwrap_or_default();
        match (a.checked_div(b), b.checked_div(a)) {
            (Some(ab), Some(ba)) => Ok((ab, ba)),
            _ => Err(PricingError::Unsupported(format!(
                "pool {} has an empty reserve",
                self.pool_id
            ))),
        }
    }

    /// Total value locked in ADA; only defined when `unit_a` is lovelace.
    pub fn tvl(&self) -> Result<Decimal, PricingError> {
        if self.unit_a() != LOVELACE {
            return Err(PricingError::Unsupported(
                "tvl for non-ADA pools is not implemented".to_string(),
            ));
        }
        let reserve = Decimal::from_i128(self.reserve_a()).unwrap_or_default();
        Ok((reserve / Decimal::from(1_000_000u32)).round_dp(6) * Decimal::from(2u32))
    }

    pub fn batcher_fee(&self, extra: Option<&AssetBag>) -> AssetBag {
        AssetBag::lovelace(self.batcher_fee.evaluate(self.settings_fee, extra))
    }

    pub fn deposit(&self) -> AssetBag {
        AssetBag::lovelace(self.deposit)
    }

    /// Tokens that authenticate the pool, for revalidating it later.
    pub fn known(&self) -> Option<KnownPool> {
        self.pool_nft.as_ref().map(|nft| KnownPool {
            pool_nft: nft.clone(),
            dex_nft: self.dex_nft.clone(),
            fee: self.fee,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dex::cbor::{FromPlutus, ToPlutus};
    use crate::dex::{PoolDatum, PoolSelector};
    use crate::error::DatumError;
    use ciborium::value::Value;

    const TOKEN: &str = "aa000000000000000000000000000000000000000000000000000000544f4b";
    const NFT_POLICY: &str = "bb00000000000000000000000000000000000000000000000000000000";

    static TEST_DESC: PoolDescriptor = PoolDescriptor {
        dex_name: "Test",
        pool_policy: Some(&["bb00000000000000000000000000000000000000000000000000000000"]),
        lp_policy: Some(&["cc00000000000000000000000000000000000000000000000000000000"]),
        dex_policy: None,
        order_selector: &[],
        pool_selector: PoolSelector { addresses: &[], assets: &[] },
        default_fee: VolumeFee::Flat(30),
        batcher_fee: BatcherFee::Flat(2_000_000),
        deposit: 2_000_000,
    };

    struct PairDatum(Vec<String>);

    impl FromPlutus for PairDatum {
        fn from_plutus(value: &Value) -> Result<Self, DatumError> {
            match value {
                Value::Text(t) => Ok(PairDatum(t.split(',').map(str::to_string).collect())),
                other => Err(DatumError::kind("text", other)),
            }
        }
    }

    impl ToPlutus for PairDatum {
        fn to_plutus(&self) -> Value {
            Value::Text(self.0.join(","))
        }
    }

    impl PoolDatum for PairDatum {
        fn pool_pair(&self) -> Option<Vec<String>> {
            Some(self.0.clone())
        }
    }

    struct TestDex;

    impl PoolProtocol for TestDex {
        type Datum = PairDatum;

        fn descriptor(&self) -> &'static PoolDescriptor {
            &TEST_DESC
        }
    }

    fn record(assets: Vec<(&str, i128)>) -> RawUtxoRecord {
        RawUtxoRecord {
            address: "addr_test".into(),
            tx_hash: "ab".repeat(32),
            tx_index: 0,
            block_time: 0,
            block_index: 0,
            block_hash: String::new(),
            datum_hash: None,
            datum_cbor: PairDatum(vec![LOVELACE.into(), TOKEN.into()]).to_cbor().ok(),
            assets: Some(AssetBag::from_pairs(assets).unwrap()),
            plutus_v2: false,
        }
    }

    fn nft() -> String {
        format!("{}01", NFT_POLICY)
    }

    #[test]
    fn test_builds_and_strips_tokens() {
        let lp = format!("cc00000000000000000000000000000000000000000000000000000000{}", "01");
        let pool = PoolState::build(
            &TestDex,
            record(vec![
                (LOVELACE, 5_000_000),
                (TOKEN, 900),
                (nft().as_str(), 1),
                (lp.as_str(), 77),
            ]),
        )
        .unwrap();
        assert_eq!(pool.unit_a(), LOVELACE);
        assert_eq!(pool.unit_b(), TOKEN);
        assert_eq!(pool.assets.len(), 2);
        assert_eq!(pool.pool_id, nft());
        assert_eq!(pool.lp_tokens.as_ref().and_then(|l| l.get(&lp)), Some(77));
    }

    #[test]
    fn test_missing_pool_nft_is_invalid() {
        let record = record(vec![(LOVELACE, 5_000_000), (TOKEN, 900)]);
        let err = PoolState::build(&TestDex, record).unwrap_err();
        assert!(matches!(err, PoolError::InvalidPool(_)));
    }

    #[test]
    fn test_shadow_tokens_removed() {
        let shadow = format!("dd00000000000000000000000000000000000000000000000000000000{}", "01");
        let pool = PoolState::build(
            &TestDex,
            record(vec![
                (LOVELACE, 5_000_000),
                (TOKEN, 900),
                (nft().as_str(), 1),
                (shadow.as_str(), 5),
            ]),
        )
        .unwrap();
        assert!(!pool.assets.contains(&shadow));
    }

    #[test]
    fn test_reserve_shapes() {
        let mut draft = PoolDraft {
            dex_name: "Test",
            tx_hash: String::new(),
            assets: AssetBag::from_pairs(vec![(LOVELACE, 1), ("x", 2), ("y", 3)]).unwrap(),
            pool_nft: None,
            dex_nft: None,
            lp_tokens: None,
            fee: VolumeFee::Flat(30),
            inactive: false,
        };
        check_reserves(&mut draft).unwrap();
        assert_eq!(draft.assets.unit(2).unwrap(), LOVELACE);

        draft.assets = AssetBag::lovelace(1);
        assert!(matches!(check_reserves(&mut draft), Err(PoolError::NoAssets(_))));
        draft.assets = AssetBag::from_pairs(vec![("x", 2), ("y", 3)]).unwrap();
        assert!(matches!(check_reserves(&mut draft), Err(PoolError::InvalidPool(_))));
    }

    struct FastDex;

    impl PoolProtocol for FastDex {
        type Datum = PairDatum;

        fn descriptor(&self) -> &'static PoolDescriptor {
            &TEST_DESC
        }

        fn supports_fast_path(&self) -> bool {
            true
        }
    }

    #[test]
    fn test_fee_outside_basis_points_is_invalid() {
        let mut draft = PoolDraft {
            dex_name: "Test",
            tx_hash: String::new(),
            assets: AssetBag::lovelace(1),
            pool_nft: None,
            dex_nft: None,
            lp_tokens: None,
            fee: VolumeFee::Split([30, 9_999]),
            inactive: false,
        };
        assert!(check_fee(&draft).is_ok());
        for fee in [VolumeFee::Flat(10_000), VolumeFee::Flat(-1), VolumeFee::Split([30, 12_000])] {
            draft.fee = fee;
            assert!(matches!(check_fee(&draft), Err(PoolError::InvalidPool(_))));
        }
    }

    #[test]
    fn test_known_pool_with_full_fee_is_invalid() {
        let known = KnownPool {
            pool_nft: AssetBag::single(nft(), 1),
            dex_nft: None,
            fee: VolumeFee::Flat(10_000),
        };
        let nft = nft();
        let assets = vec![(LOVELACE, 5_000_000), (TOKEN, 900), (nft.as_str(), 1)];
        let err = PoolBuilder::new(&FastDex, record(assets))
            .known(known)
            .build()
            .unwrap_err();
        assert!(matches!(err, PoolError::InvalidPool(_)));
    }

    #[test]
    fn test_fast_path_rejects_foreign_nft() {
        let known = KnownPool {
            pool_nft: AssetBag::single("ee", 1),
            dex_nft: None,
            fee: VolumeFee::Flat(30),
        };
        let err = PoolBuilder::new(&FastDex, record(vec![(LOVELACE, 5_000_000), (TOKEN, 900)]))
            .known(known)
            .build()
            .unwrap_err();
        assert!(matches!(err, PoolError::NotAPool { .. }));
    }
}
