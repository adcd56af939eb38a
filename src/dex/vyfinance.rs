//! VyFi constant-product pools.
//!
//! VyFi pools share no policy or address; every pool (its NFT, addresses and
//! fee split) is listed by a hosted registry. The pool datum only carries the
//! accumulated bar fees and the LP supply:
//!
//!   constr 0 [bar_fee_a int, bar_fee_b int, lp_tokens int]
use std::collections::BTreeMap;

use anyhow::{anyhow, Result};
use ciborium::value::Value;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::cbor::{bytes_value, constr, constr_value, int_value, Fields, FromPlutus, ToPlutus};
use super::{BatcherFee, OrderDatum, PoolDatum, PoolDescriptor, PoolProtocol, PoolSelector};
use crate::cache::RegistryCache;
use crate::error::{DatumError, PoolError};
use crate::models::{AssetBag, OrderType};
use crate::pricing::VolumeFee;
use crate::state::pool::PoolDraft;
use crate::utils::{shelley_address, Credential, CREDENTIAL_LEN};

pub const DEX_NAME: &str = "VyFi";

pub const REGISTRY_URL: &str = "https://api.vyfi.io/lp?networkId=1&v2=true";

pub static DESCRIPTOR: PoolDescriptor = PoolDescriptor {
    dex_name: DEX_NAME,
    pool_policy: None,
    lp_policy: None,
    dex_policy: None,
    order_selector: &[],
    pool_selector: PoolSelector {
        addresses: &[],
        assets: &[],
    },
    default_fee: VolumeFee::Flat(0),
    batcher_fee: BatcherFee::Flat(1_900_000),
    deposit: 2_000_000,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VyFiToken {
    #[serde(rename = "currencySymbol", alias = "currency_symbol")]
    pub currency_symbol: String,
    #[serde(rename = "tokenName", alias = "token_name", default)]
    pub token_name: String,
}

impl VyFiToken {
    pub fn unit(&self) -> String {
        format!("{}{}", self.currency_symbol, self.token_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VyFiFees {
    #[serde(rename = "barFee", alias = "bar_fee")]
    pub bar_fee: i128,
    #[serde(rename = "processFee", alias = "process_fee")]
    pub process_fee: i128,
    #[serde(rename = "liqFee", alias = "liq_fee")]
    pub liq_fee: i128,
}

/// The pool description embedded (as a JSON string) in each registry entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VyFiPoolTokens {
    #[serde(rename = "aAsset", alias = "a_asset", default)]
    pub a_asset: Option<VyFiToken>,
    #[serde(rename = "bAsset", alias = "b_asset", default)]
    pub b_asset: Option<VyFiToken>,
    #[serde(rename = "mainNFT", alias = "main_nft")]
    pub main_nft: VyFiToken,
    #[serde(rename = "operatorToken", alias = "operator_token", default)]
    pub operator_token: Option<VyFiToken>,
    #[serde(rename = "feesSettings", alias = "fees_settings")]
    pub fees_settings: VyFiFees,
    #[serde(rename = "stakeKey", alias = "stake_key", default)]
    pub stake_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VyFiPoolDefinition {
    #[serde(rename = "unitsPair", alias = "units_pair", default)]
    pub units_pair: String,
    #[serde(rename = "poolValidatorUtxoAddress", alias = "pool_validator_utxo_address")]
    pub pool_address: String,
    #[serde(rename = "orderValidatorUtxoAddress", alias = "order_validator_utxo_address")]
    pub order_address: String,
    #[serde(rename = "lpPolicyId-assetId", default)]
    pub lp_unit: String,
    #[serde(default)]
    pub pair: String,
    #[serde(rename = "isLive", alias = "is_live", default)]
    pub is_live: bool,
    pub json: VyFiPoolTokens,
}

/// Registry entry as served, with the pool description still a string.
#[derive(Deserialize)]
struct RawPoolDefinition {
    json: String,
    #[serde(flatten)]
    rest: serde_json::Map<String, serde_json::Value>,
}

/// Hosted list of VyFi pools keyed by pool NFT unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VyFiRegistry {
    pub pools: BTreeMap<String, VyFiPoolDefinition>,
}

impl VyFiRegistry {
    pub fn from_definitions(definitions: Vec<VyFiPoolDefinition>) -> Self {
        let pools = definitions
            .into_iter()
            .map(|d| (d.json.main_nft.unit(), d))
            .collect();
        Self { pools }
    }

    /// Parse the registry response body.
    pub fn from_json(body: &str) -> Result<Self> {
        let raw: Vec<RawPoolDefinition> = serde_json::from_str(body)
            .map_err(|e| anyhow!("VyFi registry JSON parse failed: {}", e))?;
        let mut definitions = Vec::with_capacity(raw.len());
        for entry in raw {
            let mut fields = entry.rest;
            let tokens: serde_json::Value = serde_json::from_str(&entry.json)
                .map_err(|e| anyhow!("VyFi registry: embedded pool JSON is invalid: {}", e))?;
            fields.insert("json".to_string(), tokens);
            let definition: VyFiPoolDefinition =
                serde_json::from_value(serde_json::Value::Object(fields))
                    .map_err(|e| anyhow!("VyFi registry: malformed pool entry: {}", e))?;
            definitions.push(definition);
        }
        Ok(Self::from_definitions(definitions))
    }

    pub fn get(&self, nft_unit: &str) -> Option<&VyFiPoolDefinition> {
        self.pools.get(nft_unit)
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }
}

pub async fn fetch_registry(client: &reqwest::Client, url: &str) -> Result<VyFiRegistry> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| anyhow!("VyFi registry fetch failed: {}", e))?;
    if !response.status().is_success() {
        return Err(anyhow!("VyFi registry returned status {}", response.status()));
    }
    let body = response
        .text()
        .await
        .map_err(|e| anyhow!("VyFi registry body read failed: {}", e))?;
    let registry = VyFiRegistry::from_json(&body)?;
    info!(pools = registry.len(), "fetched VyFi pool registry");
    Ok(registry)
}

/// Registry from `cache`, refetched from `url` once the cached copy is stale.
pub async fn load_registry(
    cache: &RegistryCache<VyFiRegistry>,
    client: &reqwest::Client,
    url: &str,
) -> Result<VyFiRegistry> {
    cache.get_or_refresh(|| fetch_registry(client, url)).await
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VyFiPoolDatum {
    pub bar_fee_a: i128,
    pub bar_fee_b: i128,
    pub lp_tokens: i128,
}

impl FromPlutus for VyFiPoolDatum {
    fn from_plutus(value: &Value) -> Result<Self, DatumError> {
        let mut f = Fields::expect(value, "VyFiPoolDatum", 0, 3)?;
        Ok(Self {
            bar_fee_a: f.int()?,
            bar_fee_b: f.int()?,
            lp_tokens: f.int()?,
        })
    }
}

impl ToPlutus for VyFiPoolDatum {
    fn to_plutus(&self) -> Value {
        constr_value(
            0,
            vec![
                int_value(self.bar_fee_a),
                int_value(self.bar_fee_b),
                int_value(self.lp_tokens),
            ],
        )
    }
}

impl PoolDatum for VyFiPoolDatum {
    fn pool_pair(&self) -> Option<Vec<String>> {
        None
    }
}

/// Order action. Variant index is the constructor tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VyFiAction {
    Deposit { min_lp: i128 },
    Withdraw { min_a: i128, min_b: i128 },
    LpFlush,
    AtoB { min_receive: i128 },
    BtoA { min_receive: i128 },
    ZapInA { min_lp: i128 },
    ZapInB { min_lp: i128 },
}

impl FromPlutus for VyFiAction {
    fn from_plutus(value: &Value) -> Result<Self, DatumError> {
        let (alt, items) = constr(value)?;
        let single = |schema: &'static str| -> Result<i128, DatumError> {
            Fields::from_items(items, schema, 1)?.int()
        };
        Ok(match alt {
            0 => VyFiAction::Deposit {
                min_lp: single("VyFiDeposit")?,
            },
            1 => {
                let mut f = Fields::from_items(items, "VyFiWithdraw", 1)?;
                let mut pair = Fields::expect(f.value()?, "VyFiWithdrawPair", 0, 2)?;
                VyFiAction::Withdraw {
                    min_a: pair.int()?,
                    min_b: pair.int()?,
                }
            }
            2 => {
                Fields::from_items(items, "VyFiLpFlush", 0)?;
                VyFiAction::LpFlush
            }
            3 => VyFiAction::AtoB {
                min_receive: single("VyFiAtoB")?,
            },
            4 => VyFiAction::BtoA {
                min_receive: single("VyFiBtoA")?,
            },
            5 => VyFiAction::ZapInA {
                min_lp: single("VyFiZapInA")?,
            },
            6 => VyFiAction::ZapInB {
                min_lp: single("VyFiZapInB")?,
            },
            found => {
                return Err(DatumError::UnknownVariant {
                    schema: "VyFiAction",
                    found,
                })
            }
        })
    }
}

impl ToPlutus for VyFiAction {
    fn to_plutus(&self) -> Value {
        match *self {
            VyFiAction::Deposit { min_lp } => constr_value(0, vec![int_value(min_lp)]),
            VyFiAction::Withdraw { min_a, min_b } => {
                constr_value(1, vec![constr_value(0, vec![int_value(min_a), int_value(min_b)])])
            }
            VyFiAction::LpFlush => constr_value(2, vec![]),
            VyFiAction::AtoB { min_receive } => constr_value(3, vec![int_value(min_receive)]),
            VyFiAction::BtoA { min_receive } => constr_value(4, vec![int_value(min_receive)]),
            VyFiAction::ZapInA { min_lp } => constr_value(5, vec![int_value(min_lp)]),
            VyFiAction::ZapInB { min_lp } => constr_value(6, vec![int_value(min_lp)]),
        }
    }
}

/// Order datum: owner key hashes (payment, then optional stake) and the action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VyFiOrderDatum {
    pub address: Vec<u8>,
    pub action: VyFiAction,
}

impl VyFiOrderDatum {
    pub fn swap(
        payment: &[u8],
        stake: Option<&[u8]>,
        in_assets: &AssetBag,
        out_assets: &AssetBag,
    ) -> Result<Self, DatumError> {
        let in_unit = in_assets.unit(0).map_err(|e| DatumError::Kind {
            expected: "single input asset",
            found: e.to_string(),
        })?;
        let min_receive = out_assets.quantity(0).map_err(|e| DatumError::Kind {
            expected: "single output asset",
            found: e.to_string(),
        })?;
        let merged = in_assets + out_assets;
        let action = if merged.unit(0).ok() == Some(in_unit) {
            VyFiAction::AtoB { min_receive }
        } else {
            VyFiAction::BtoA { min_receive }
        };
        let mut address = payment.to_vec();
        address.extend_from_slice(stake.unwrap_or_default());
        Ok(Self { address, action })
    }
}

impl FromPlutus for VyFiOrderDatum {
    fn from_plutus(value: &Value) -> Result<Self, DatumError> {
        let mut f = Fields::expect(value, "VyFiOrderDatum", 0, 2)?;
        Ok(Self {
            address: f.bytes()?,
            action: f.next()?,
        })
    }
}

impl ToPlutus for VyFiOrderDatum {
    fn to_plutus(&self) -> Value {
        constr_value(0, vec![bytes_value(&self.address), self.action.to_plutus()])
    }
}

impl OrderDatum for VyFiOrderDatum {
    fn address_source(&self) -> Result<Option<String>, DatumError> {
        if self.address.len() < CREDENTIAL_LEN {
            return Err(DatumError::Address(format!(
                "owner hash is {} bytes",
                self.address.len()
            )));
        }
        let (payment, rest) = self.address.split_at(CREDENTIAL_LEN);
        let stake = (!rest.is_empty())
            .then(|| Credential::Key(&rest[..rest.len().min(CREDENTIAL_LEN)]));
        shelley_address(Credential::Key(payment), stake)
            .map(Some)
            .map_err(|e| DatumError::Address(e.to_string()))
    }

    fn requested_amount(&self) -> AssetBag {
        match self.action {
            VyFiAction::BtoA { min_receive } => AssetBag::single("asset_a", min_receive),
            VyFiAction::AtoB { min_receive } => AssetBag::single("asset_b", min_receive),
            VyFiAction::Deposit { min_lp }
            | VyFiAction::ZapInA { min_lp }
            | VyFiAction::ZapInB { min_lp } => AssetBag::single("lp", min_lp),
            VyFiAction::Withdraw { min_a, min_b } => {
                let mut bag = AssetBag::single("asset_a", min_a);
                bag.insert("asset_b", min_b);
                bag
            }
            VyFiAction::LpFlush => AssetBag::new(),
        }
    }

    fn order_type(&self) -> Option<OrderType> {
        match self.action {
            VyFiAction::AtoB { .. } | VyFiAction::BtoA { .. } => Some(OrderType::Swap),
            VyFiAction::Deposit { .. } => Some(OrderType::Deposit),
            VyFiAction::Withdraw { .. } => Some(OrderType::Withdraw),
            VyFiAction::ZapInA { .. } | VyFiAction::ZapInB { .. } => Some(OrderType::ZapIn),
            VyFiAction::LpFlush => None,
        }
    }
}

/// VyFi pools, resolved against a snapshot of the hosted registry.
#[derive(Debug, Clone, Default)]
pub struct VyFi {
    registry: VyFiRegistry,
}

impl VyFi {
    pub fn new(registry: VyFiRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &VyFiRegistry {
        &self.registry
    }

    fn addresses(&self, pick: impl Fn(&VyFiPoolDefinition) -> &str) -> Vec<String> {
        let mut addresses: Vec<String> =
            self.registry.pools.values().map(|p| pick(p).to_string()).collect();
        addresses.sort();
        addresses.dedup();
        addresses
    }
}

impl PoolProtocol for VyFi {
    type Datum = VyFiPoolDatum;

    fn descriptor(&self) -> &'static PoolDescriptor {
        &DESCRIPTOR
    }

    fn pool_addresses(&self) -> Vec<String> {
        self.addresses(|p| &p.pool_address)
    }

    fn order_addresses(&self) -> Vec<String> {
        self.addresses(|p| &p.order_address)
    }

    fn extract_pool_nft(&self, draft: &mut PoolDraft) -> Result<(), PoolError> {
        let unit = match &draft.pool_nft {
            Some(known) => {
                let unit = known
                    .units()
                    .find(|u| self.registry.get(u).is_some())
                    .map(str::to_string)
                    .ok_or_else(|| {
                        PoolError::not_a_pool(format!(
                            "{}: none of the pool NFTs {} are listed",
                            DEX_NAME, known
                        ))
                    })?;
                draft.assets.pop(&unit);
                unit
            }
            None => {
                let unit = draft
                    .assets
                    .units()
                    .find(|u| self.registry.get(u).is_some())
                    .map(str::to_string)
                    .ok_or_else(|| {
                        PoolError::not_a_pool(format!(
                            "{}: pool must have one listed pool NFT (tx_hash={})",
                            DEX_NAME, draft.tx_hash
                        ))
                    })?;
                let quantity = draft.assets.pop(&unit).unwrap_or(1);
                draft.pool_nft = Some(AssetBag::single(unit.clone(), quantity));
                unit
            }
        };
        if let Some(definition) = self.registry.get(&unit) {
            let fees = &definition.json.fees_settings;
            draft.fee = VolumeFee::Flat(fees.liq_fee + fees.bar_fee);
            debug!(pool = %unit, fee = fees.liq_fee + fees.bar_fee, "VyFi fee from registry");
        }
        Ok(())
    }

    fn post_init(&self, draft: &mut PoolDraft, datum: &VyFiPoolDatum) -> Result<(), PoolError> {
        for (index, bar_fee) in [(0, datum.bar_fee_a), (1, datum.bar_fee_b)] {
            let unit = draft
                .assets
                .unit(index)
                .map_err(|e| PoolError::InvalidPool(e.to_string()))?
                .to_string();
            let reserve = draft.assets.get(&unit).unwrap_or(0);
            draft.assets.insert(unit, reserve - bar_fee);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dex::test_record;
    use crate::models::LOVELACE;
    use crate::state::{KnownPool, PoolBuilder, PoolState};
    use serde_json::json;

    const TOKEN: &str = "804f5544c1962a40546827cab750a88404dc7108c0f588b72964754f56594649";
    const NFT_POLICY: &str = "b2b1d9b0b6b6a56d3f6c2ed3cba2e5d89a3c9d1b7e5f2a4c6d8e0f1a";

    fn registry_body() -> String {
        let tokens = json!({
            "aAsset": {"tokenName": "", "currencySymbol": ""},
            "bAsset": {"tokenName": "56594649", "currencySymbol": &TOKEN[..56]},
            "mainNFT": {"tokenName": "", "currencySymbol": NFT_POLICY},
            "operatorToken": {"tokenName": "", "currencySymbol": "aa"},
            "feesSettings": {"barFee": 5, "processFee": 2, "liqFee": 25},
            "stakeKey": null
        });
        json!([{
            "unitsPair": format!("lovelace/{}", TOKEN),
            "poolValidatorUtxoAddress": "addr1pool",
            "orderValidatorUtxoAddress": "addr1order",
            "lpPolicyId-assetId": "cc",
            "json": tokens.to_string(),
            "pair": "ADA/VYFI",
            "isLive": true
        }])
        .to_string()
    }

    fn protocol() -> VyFi {
        VyFi::new(VyFiRegistry::from_json(&registry_body()).unwrap())
    }

    fn record(assets: Vec<(&str, i128)>) -> crate::models::RawUtxoRecord {
        let datum = VyFiPoolDatum {
            bar_fee_a: 0,
            bar_fee_b: 1_000,
            lp_tokens: 707_106_781,
        };
        test_record(datum.to_cbor().unwrap(), assets)
    }

    #[test]
    fn test_registry_parse() {
        let registry = VyFiRegistry::from_json(&registry_body()).unwrap();
        assert_eq!(registry.len(), 1);
        let pool = registry.get(NFT_POLICY).unwrap();
        assert_eq!(pool.json.fees_settings.liq_fee, 25);
        assert!(pool.is_live);
        assert!(VyFiRegistry::from_json("[{\"json\": \"not json\"}]").is_err());
        assert_eq!(protocol().pool_addresses(), vec!["addr1pool".to_string()]);
        assert_eq!(protocol().order_addresses(), vec!["addr1order".to_string()]);
    }

    #[test]
    fn test_pool_from_registry() {
        let pool = PoolState::build(
            &protocol(),
            record(vec![(LOVELACE, 1_000_000_000), (TOKEN, 500_001_000), (NFT_POLICY, 1)]),
        )
        .unwrap();
        assert_eq!(pool.pool_id, NFT_POLICY);
        assert_eq!(pool.fee, VolumeFee::Flat(30));
        assert_eq!(pool.reserve_b(), 500_000_000);
        let out = pool.get_amount_out(&AssetBag::lovelace(1_000_000)).unwrap();
        assert_eq!(out.quantity(), 498_003);
    }

    #[test]
    fn test_unlisted_pool_is_not_a_pool() {
        let unlisted = record(vec![(LOVELACE, 1_000_000_000), (TOKEN, 500_000_000)]);
        let err = PoolState::build(&protocol(), unlisted).unwrap_err();
        assert!(matches!(err, PoolError::NotAPool { .. }));

        let known = KnownPool {
            pool_nft: AssetBag::single("dd", 1),
            dex_nft: None,
            fee: VolumeFee::Flat(30),
        };
        let err = PoolBuilder::new(&protocol(), record(vec![(LOVELACE, 1), (TOKEN, 1)]))
            .known(known)
            .build()
            .unwrap_err();
        assert!(matches!(err, PoolError::NotAPool { .. }));
    }

    #[test]
    fn test_order_datum() {
        let order = VyFiOrderDatum::swap(
            &[1; 28],
            Some(&[2; 28]),
            &AssetBag::single(TOKEN, 5_000),
            &AssetBag::lovelace(2_000),
        )
        .unwrap();
        assert_eq!(order.action, VyFiAction::BtoA { min_receive: 2_000 });
        let decoded = VyFiOrderDatum::from_cbor(&order.to_cbor().unwrap()).unwrap();
        assert_eq!(decoded, order);
        assert!(decoded.address_source().unwrap().unwrap().starts_with("addr1q"));
        assert_eq!(decoded.requested_amount().get("asset_a"), Some(2_000));

        let zap = VyFiOrderDatum {
            action: VyFiAction::ZapInB { min_lp: 9 },
            ..decoded
        };
        assert_eq!(zap.order_type(), Some(OrderType::ZapIn));
        assert_eq!(VyFiAction::from_plutus(&zap.action.to_plutus()).unwrap(), zap.action);
    }

    #[tokio::test]
    async fn test_registry_fetch_is_cached() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/lp")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(registry_body())
            .expect(1)
            .create_async()
            .await;
        let url = format!("{}/lp?networkId=1&v2=true", server.url());
        let cache = RegistryCache::new("vyfi", crate::cache::DEFAULT_TTL);
        let client = reqwest::Client::new();
        for _ in 0..2 {
            let registry = load_registry(&cache, &client, &url).await.unwrap();
            assert_eq!(registry.len(), 1);
        }
        mock.assert_async().await;
    }
}
