//! `Backend` over a Kupo chain indexer.
//!
//! Kupo indexes outputs by address or asset pattern and stores datums and
//! scripts by hash. It has no notion of blocks by number, order history or
//! Axo strategies; those queries fail with [`Unsupported`].
use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::backend::{Backend, OrderUtxoQuery, Unsupported};
use crate::config::ScanConfig;
use crate::models::{
    AssetBag, BlockInfo, RawUtxoRecord, ScriptReference, SwapTransactionList, LOVELACE,
};
use crate::utils::{remove_trailing_slash, RetryPolicy};

/// Unix time of the first Shelley slot.
pub const SHELLEY_START: i64 = 1_596_491_091;
/// Slot number at the start of Shelley.
pub const SHELLEY_SLOT_OFFSET: i64 = 4_924_800;

const POLICY_HEX_LEN: usize = 56;

pub fn slot_to_time(slot: u64) -> i64 {
    SHELLEY_START + slot as i64 - SHELLEY_SLOT_OFFSET
}

#[derive(Debug, Clone, Deserialize)]
struct KupoValue {
    coins: u64,
    #[serde(default)]
    assets: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Deserialize)]
struct KupoPoint {
    slot_no: u64,
    header_hash: String,
}

#[derive(Debug, Clone, Deserialize)]
struct KupoMatch {
    transaction_index: u32,
    transaction_id: String,
    output_index: u32,
    address: String,
    value: KupoValue,
    datum_hash: Option<String>,
    datum_type: Option<String>,
    script_hash: Option<String>,
    created_at: KupoPoint,
}

impl KupoMatch {
    fn assets(&self) -> AssetBag {
        let mut bag = AssetBag::lovelace(self.value.coins as i128);
        for (unit, quantity) in &self.value.assets {
            bag.insert(unit.replace('.', ""), *quantity as i128);
        }
        bag
    }

    fn holds(&self, unit: &str) -> bool {
        unit == LOVELACE || self.value.assets.keys().any(|k| k.replace('.', "") == unit)
    }

    fn into_record(self, datum_cbor: Option<String>) -> RawUtxoRecord {
        RawUtxoRecord {
            assets: Some(self.assets()),
            plutus_v2: self.datum_type.as_deref() == Some("inline"),
            address: self.address,
            tx_hash: self.transaction_id,
            tx_index: self.output_index,
            block_time: slot_to_time(self.created_at.slot_no),
            block_index: self.transaction_index,
            block_hash: self.created_at.header_hash,
            datum_hash: self.datum_hash,
            datum_cbor,
        }
    }
}

#[derive(Debug, Deserialize)]
struct KupoDatum {
    datum: String,
}

#[derive(Debug, Deserialize)]
struct KupoScript {
    script: String,
}

/// `policy.name` (or `policy.*` for a bare policy) as Kupo expects.
pub fn asset_pattern(unit: &str) -> String {
    if unit.len() <= POLICY_HEX_LEN {
        format!("{}.*", unit)
    } else {
        format!("{}.{}", &unit[..POLICY_HEX_LEN], &unit[POLICY_HEX_LEN..])
    }
}

pub struct KupoBackend {
    api_url: String,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl KupoBackend {
    pub fn new(api_url: &str) -> Result<Self> {
        Self::from_config(&ScanConfig {
            kupo_url: api_url.to_string(),
            ..ScanConfig::default()
        })
    }

    pub fn from_config(config: &ScanConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| anyhow!("failed to build HTTP client: {}", e))?;
        Ok(Self::with_client(&config.kupo_url, client).with_retries(config.retry_policy()))
    }

    pub fn with_client(api_url: &str, client: reqwest::Client) -> Self {
        Self {
            api_url: remove_trailing_slash(api_url),
            client,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retries(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    fn unsupported(operation: &'static str) -> anyhow::Error {
        Unsupported {
            backend: "Kupo",
            operation,
        }
        .into()
    }

    async fn fetch<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}/{}", self.api_url, path);
        self.retry.run(path, || async {
            let response = self.client.get(&url).send().await?;
            if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
                return Err(anyhow!("rate_limited"));
            }
            if !response.status().is_success() {
                return Err(anyhow!("{} returned {}", url, response.status()));
            }
            let body = response.text().await?;
            Ok(serde_json::from_str::<T>(&body)?)
        })
        .await
    }

    async fn matches(
        &self,
        pattern: &str,
        unspent: bool,
        asset: Option<&str>,
    ) -> Result<Vec<KupoMatch>> {
        let mut params = Vec::new();
        if unspent {
            params.push("unspent".to_string());
        }
        if let Some(unit) = asset.filter(|u| *u != LOVELACE) {
            if unit.len() >= POLICY_HEX_LEN {
                params.push(format!("policy_id={}", &unit[..POLICY_HEX_LEN]));
                if unit.len() > POLICY_HEX_LEN {
                    params.push(format!("asset_name={}", &unit[POLICY_HEX_LEN..]));
                }
            }
        }
        let path = if params.is_empty() {
            format!("matches/{}", pattern)
        } else {
            format!("matches/{}?{}", pattern, params.join("&"))
        };
        let found: Vec<KupoMatch> = self.fetch(&path).await?;
        debug!(pattern, count = found.len(), "kupo matches");
        Ok(found)
    }

    pub async fn datum(&self, hash: &str) -> Result<Option<String>> {
        let datum: Option<KupoDatum> = self.fetch(&format!("datums/{}", hash)).await?;
        Ok(datum.map(|d| d.datum))
    }

    pub async fn script(&self, hash: &str) -> Result<Option<String>> {
        let script: Option<KupoScript> = self.fetch(&format!("scripts/{}", hash)).await?;
        Ok(script.map(|s| s.script))
    }

    async fn resolve(&self, found: Vec<KupoMatch>) -> Result<Vec<RawUtxoRecord>> {
        let mut records = Vec::with_capacity(found.len());
        for m in found {
            let datum = match &m.datum_hash {
                Some(hash) => self.datum(hash).await?,
                None => None,
            };
            records.push(m.into_record(datum));
        }
        Ok(records)
    }
}

#[async_trait]
impl Backend for KupoBackend {
    async fn get_pool_utxos(
        &self,
        addresses: &[&str],
        assets: Option<&[&str]>,
        limit: usize,
        page: usize,
        historical: bool,
    ) -> Result<Vec<RawUtxoRecord>> {
        let asset = assets.and_then(|a| a.last().copied());
        let mut found = Vec::new();
        if addresses.is_empty() {
            let unit = asset.ok_or_else(|| anyhow!("pool query needs an address or an asset"))?;
            found.extend(self.matches(&asset_pattern(unit), !historical, None).await?);
        } else {
            for address in addresses {
                found.extend(self.matches(address, !historical, asset).await?);
            }
        }
        found.sort_by(|a, b| {
            (b.created_at.slot_no, &a.transaction_id, a.output_index).cmp(&(
                a.created_at.slot_no,
                &b.transaction_id,
                b.output_index,
            ))
        });
        let page: Vec<KupoMatch> = found.into_iter().skip(page * limit).take(limit).collect();
        self.resolve(page).await
    }

    async fn get_pool_in_tx(
        &self,
        tx_hash: &str,
        addresses: &[&str],
        assets: Option<&[&str]>,
    ) -> Result<Vec<RawUtxoRecord>> {
        let asset = assets.and_then(|a| a.last().copied());
        let found = self
            .matches(&format!("*@{}", tx_hash), false, None)
            .await?
            .into_iter()
            .filter(|m| addresses.is_empty() || addresses.contains(&m.address.as_str()))
            .filter(|m| asset.map_or(true, |unit| m.holds(unit)))
            .collect();
        self.resolve(found).await
    }

    async fn get_pool_utxos_in_block(&self, _block_no: u64) -> Result<Vec<RawUtxoRecord>> {
        Err(Self::unsupported("block queries"))
    }

    async fn last_block(&self, _last_n_blocks: u32) -> Result<Vec<BlockInfo>> {
        Err(Self::unsupported("block queries"))
    }

    async fn get_script_from_address(&self, address: &str) -> Result<ScriptReference> {
        let found = self.matches(address, true, None).await?;
        let Some(m) = found.into_iter().find(|m| m.script_hash.is_some()) else {
            return Err(anyhow!("no reference script at {}", address));
        };
        let script = match &m.script_hash {
            Some(hash) => self.script(hash).await?,
            None => None,
        };
        let datum_cbor = match &m.datum_hash {
            Some(hash) => self.datum(hash).await?,
            None => None,
        };
        Ok(ScriptReference {
            tx_hash: Some(m.transaction_id.clone()),
            tx_index: Some(m.output_index),
            address: Some(m.address.clone()),
            assets: Some(m.assets()),
            datum_hash: m.datum_hash.clone(),
            datum_cbor,
            script,
        })
    }

    async fn get_datum_from_address(
        &self,
        address: &str,
        asset: Option<&str>,
    ) -> Result<Option<ScriptReference>> {
        let found = self.matches(address, true, asset).await?;
        let Some(m) = found
            .into_iter()
            .filter(|m| m.datum_hash.is_some())
            .max_by_key(|m| m.created_at.slot_no)
        else {
            return Ok(None);
        };
        let datum_cbor = match &m.datum_hash {
            Some(hash) => self.datum(hash).await?,
            None => None,
        };
        Ok(Some(ScriptReference {
            tx_hash: Some(m.transaction_id.clone()),
            tx_index: Some(m.output_index),
            address: Some(m.address.clone()),
            assets: Some(m.assets()),
            datum_hash: m.datum_hash.clone(),
            datum_cbor,
            script: None,
        }))
    }

    async fn get_historical_order_utxos(
        &self,
        _stake_addresses: &[&str],
        _after_time: Option<i64>,
        _limit: usize,
        _page: usize,
    ) -> Result<SwapTransactionList> {
        Err(Self::unsupported("order history"))
    }

    async fn get_order_utxos_by_block_or_tx(
        &self,
        _query: &OrderUtxoQuery,
    ) -> Result<SwapTransactionList> {
        Err(Self::unsupported("order history"))
    }

    async fn get_cancel_utxos(
        &self,
        _stake_addresses: &[&str],
        _block_no: Option<u64>,
        _after_time: Option<i64>,
        _limit: usize,
        _page: usize,
    ) -> Result<SwapTransactionList> {
        Err(Self::unsupported("order history"))
    }

    async fn get_axo_target(
        &self,
        _assets: &AssetBag,
        _block_time: Option<i64>,
    ) -> Result<Option<String>> {
        Err(Self::unsupported("Axo targets"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    const POLICY: &str = "29d222ce763455e3d7a09a665ce554f00ac89d2e99a1a83d267170c6";

    fn match_json(tx: &str, slot: u64, datum_hash: Option<&str>) -> serde_json::Value {
        serde_json::json!({
            "transaction_index": 3,
            "transaction_id": tx,
            "output_index": 1,
            "address": "addr1pool",
            "value": {
                "coins": 5_000_000,
                "assets": { format!("{}.4d494e", POLICY): 42 }
            },
            "datum_hash": datum_hash,
            "datum_type": datum_hash.map(|_| "inline"),
            "script_hash": null,
            "created_at": { "slot_no": slot, "header_hash": "ff".repeat(32) },
            "spent_at": null
        })
    }

    fn backend(server: &mockito::Server) -> KupoBackend {
        KupoBackend::with_client(&server.url(), reqwest::Client::new()).with_retries(RetryPolicy {
            retries: 0,
            base_delay_ms: 1,
        })
    }

    #[test]
    fn test_slot_to_time() {
        assert_eq!(slot_to_time(4_924_800), SHELLEY_START);
        assert_eq!(slot_to_time(100_000_000), 1_596_491_091 + 100_000_000 - 4_924_800);
    }

    #[test]
    fn test_asset_pattern() {
        assert_eq!(asset_pattern(POLICY), format!("{}.*", POLICY));
        assert_eq!(asset_pattern(&format!("{}4d494e", POLICY)), format!("{}.4d494e", POLICY));
    }

    #[tokio::test]
    async fn test_pool_utxos_with_datums() {
        let mut server = mockito::Server::new_async().await;
        let body = serde_json::json!([
            match_json(&"aa".repeat(32), 10_000_000, Some("d1")),
            match_json(&"bb".repeat(32), 20_000_000, None),
        ]);
        let matches = server
            .mock("GET", "/matches/addr1pool")
            .match_query(Matcher::Any)
            .with_body(body.to_string())
            .create_async()
            .await;
        let datum = server
            .mock("GET", "/datums/d1")
            .with_body(r#"{"datum":"d87980"}"#)
            .create_async()
            .await;

        let records = backend(&server)
            .get_pool_utxos(&["addr1pool"], None, 10, 0, false)
            .await
            .unwrap();
        matches.assert_async().await;
        datum.assert_async().await;

        assert_eq!(records.len(), 2);
        // newest first
        assert_eq!(records[0].tx_hash, "bb".repeat(32));
        assert_eq!(records[0].datum_cbor, None);
        let older = &records[1];
        assert_eq!(older.datum_cbor.as_deref(), Some("d87980"));
        assert!(older.plutus_v2);
        assert_eq!(older.block_time, slot_to_time(10_000_000));
        assert_eq!(older.tx_index, 1);
        assert_eq!(older.block_index, 3);
        let assets = older.assets.as_ref().unwrap();
        assert_eq!(assets.get(LOVELACE), Some(5_000_000));
        assert_eq!(assets.get(&format!("{}4d494e", POLICY)), Some(42));

        let second_page = backend(&server)
            .get_pool_utxos(&["addr1pool"], None, 1, 1, false)
            .await
            .unwrap();
        assert_eq!(second_page.len(), 1);
        assert_eq!(second_page[0].tx_hash, "aa".repeat(32));
    }

    #[tokio::test]
    async fn test_asset_pattern_when_no_address() {
        let mut server = mockito::Server::new_async().await;
        let path = format!("/matches/{}.4d494e", POLICY);
        let mock = server
            .mock("GET", path.as_str())
            .match_query(Matcher::Any)
            .with_body("[]")
            .create_async()
            .await;
        let unit = format!("{}4d494e", POLICY);
        let records = backend(&server)
            .get_pool_utxos(&[], Some(&[unit.as_str()]), 10, 0, false)
            .await
            .unwrap();
        mock.assert_async().await;
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_operations() {
        let server = mockito::Server::new_async().await;
        let kupo = backend(&server);
        let err = kupo.last_block(1).await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<Unsupported>().map(|u| u.operation),
            Some("block queries")
        );
        let err = kupo.get_axo_target(&AssetBag::new(), None).await.unwrap_err();
        assert!(err.downcast_ref::<Unsupported>().is_some());
        let err = kupo
            .get_historical_order_utxos(&[], None, 10, 0)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("order history"));
    }

    #[tokio::test]
    async fn test_server_error_surfaces() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/matches/addr1pool")
            .match_query(Matcher::Any)
            .with_status(500)
            .create_async()
            .await;
        assert!(backend(&server)
            .get_pool_utxos(&["addr1pool"], None, 10, 0, false)
            .await
            .is_err());
    }
}
