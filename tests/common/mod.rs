#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use dexter_pools_rs::backend::{Backend, OrderUtxoQuery, Unsupported};
use dexter_pools_rs::dex::cbor::ToPlutus;
use dexter_pools_rs::dex::datums::AssetClass;
use dexter_pools_rs::dex::minswap::{MinswapPoolDatum, FACTORY_TOKEN, LP_POLICY, POOL_POLICY};
use dexter_pools_rs::models::{BlockInfo, ScriptReference, SwapTransactionList};
use dexter_pools_rs::{AssetBag, RawUtxoRecord, LOVELACE};

pub const TOKEN: &str = "f66d78b4a3cb3d37afa0ec36461e51ecbde00f26c8f0a68f94b6988069555344";
pub const POOL_NAME: &str = "6aa2153e1ae896a95539c9d62f76cedcdabdcdf144e564b8955f609d660cf6a2";

pub fn record(
    address: &str,
    tx_index: u32,
    datum_cbor: &str,
    assets: &[(&str, i128)],
) -> RawUtxoRecord {
    RawUtxoRecord {
        address: address.to_string(),
        tx_hash: "cd".repeat(32),
        tx_index,
        block_time: 1_700_000_000,
        block_index: 0,
        block_hash: String::new(),
        datum_hash: None,
        datum_cbor: Some(datum_cbor.to_string()),
        assets: AssetBag::from_pairs(assets.iter().map(|(u, q)| (u.to_string(), *q))).ok(),
        plutus_v2: false,
    }
}

pub fn minswap_datum() -> MinswapPoolDatum {
    MinswapPoolDatum {
        asset_a: AssetClass::lovelace(),
        asset_b: AssetClass::from_unit(TOKEN).unwrap(),
        total_liquidity: 22_360_679_774,
        root_k_last: 0,
        fee_sharing: None,
    }
}

pub fn pool_nft() -> String {
    format!("{}{}", POOL_POLICY, POOL_NAME)
}

/// A Minswap pool holding 1,000,000 ADA against 500,000,000 TOKEN.
pub fn minswap_pool_record(address: &str, tx_index: u32) -> RawUtxoRecord {
    let nft = pool_nft();
    let lp = format!("{}{}", LP_POLICY, POOL_NAME);
    record(
        address,
        tx_index,
        &minswap_datum().to_cbor().unwrap(),
        &[
            (LOVELACE, 1_000_000_000_000),
            (TOKEN, 500_000_000),
            (nft.as_str(), 1),
            (FACTORY_TOKEN, 1),
            (lp.as_str(), 1_000),
        ],
    )
}

/// Serves a fixed set of records, paged the way a chain indexer does.
pub struct MockBackend {
    pub records: Vec<RawUtxoRecord>,
    pub datum: Option<ScriptReference>,
    pub calls: AtomicUsize,
}

impl MockBackend {
    pub fn new(records: Vec<RawUtxoRecord>) -> Self {
        Self {
            records,
            datum: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Answer every datum lookup with `datum_cbor`.
    pub fn with_datum(mut self, datum_cbor: String) -> Self {
        self.datum = Some(ScriptReference {
            datum_cbor: Some(datum_cbor),
            ..ScriptReference::default()
        });
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn unsupported<T>(operation: &'static str) -> Result<T> {
        Err(Unsupported {
            backend: "mock",
            operation,
        }
        .into())
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn get_pool_utxos(
        &self,
        addresses: &[&str],
        assets: Option<&[&str]>,
        limit: usize,
        page: usize,
        _historical: bool,
    ) -> Result<Vec<RawUtxoRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let asset = assets.and_then(|a| a.last().copied());
        Ok(self
            .records
            .iter()
            .filter(|r| addresses.is_empty() || addresses.contains(&r.address.as_str()))
            .filter(|r| match asset {
                Some(unit) => r.assets.as_ref().is_some_and(|a| a.contains(unit)),
                None => true,
            })
            .skip(page * limit)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get_pool_in_tx(
        &self,
        tx_hash: &str,
        _addresses: &[&str],
        _assets: Option<&[&str]>,
    ) -> Result<Vec<RawUtxoRecord>> {
        Ok(self.records.iter().filter(|r| r.tx_hash == tx_hash).cloned().collect())
    }

    async fn get_pool_utxos_in_block(&self, _block_no: u64) -> Result<Vec<RawUtxoRecord>> {
        Self::unsupported("block queries")
    }

    async fn last_block(&self, _last_n_blocks: u32) -> Result<Vec<BlockInfo>> {
        Self::unsupported("block queries")
    }

    async fn get_script_from_address(&self, address: &str) -> Result<ScriptReference> {
        Err(anyhow!("no script at {}", address))
    }

    async fn get_datum_from_address(
        &self,
        _address: &str,
        _asset: Option<&str>,
    ) -> Result<Option<ScriptReference>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.datum.clone())
    }

    async fn get_historical_order_utxos(
        &self,
        _stake_addresses: &[&str],
        _after_time: Option<i64>,
        _limit: usize,
        _page: usize,
    ) -> Result<SwapTransactionList> {
        Self::unsupported("order history")
    }

    async fn get_order_utxos_by_block_or_tx(
        &self,
        _query: &OrderUtxoQuery,
    ) -> Result<SwapTransactionList> {
        Self::unsupported("order history")
    }

    async fn get_cancel_utxos(
        &self,
        _stake_addresses: &[&str],
        _block_no: Option<u64>,
        _after_time: Option<i64>,
        _limit: usize,
        _page: usize,
    ) -> Result<SwapTransactionList> {
        Self::unsupported("order history")
    }

    async fn get_axo_target(
        &self,
        _assets: &AssetBag,
        _block_time: Option<i64>,
    ) -> Result<Option<String>> {
        Ok(None)
    }
}
