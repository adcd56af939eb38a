//! Chain data source consumed by the scanner and the registry loaders.
//!
//! Protocol modules never talk to the network themselves; everything they
//! need from the chain comes through this trait.

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

use crate::models::{AssetBag, BlockInfo, RawUtxoRecord, ScriptReference, SwapTransactionList};

/// A backend cannot answer this kind of query at all.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{backend} does not support {operation}")]
pub struct Unsupported {
    pub backend: &'static str,
    pub operation: &'static str,
}

/// Filters for order UTxOs located by block or by transaction.
#[derive(Debug, Clone, Default)]
pub struct OrderUtxoQuery {
    pub stake_addresses: Vec<String>,
    pub out_tx_hash: Option<Vec<String>>,
    pub in_tx_hash: Option<Vec<String>>,
    pub block_no: Option<u64>,
    pub after_block: Option<u64>,
    pub limit: usize,
    pub page: usize,
}

#[async_trait]
pub trait Backend: Send + Sync {
    /// UTxOs at any of `addresses`, optionally narrowed to those holding the
    /// last listed asset.
    async fn get_pool_utxos(
        &self,
        addresses: &[&str],
        assets: Option<&[&str]>,
        limit: usize,
        page: usize,
        historical: bool,
    ) -> Result<Vec<RawUtxoRecord>>;

    async fn get_pool_in_tx(
        &self,
        tx_hash: &str,
        addresses: &[&str],
        assets: Option<&[&str]>,
    ) -> Result<Vec<RawUtxoRecord>>;

    async fn get_pool_utxos_in_block(&self, block_no: u64) -> Result<Vec<RawUtxoRecord>>;

    async fn last_block(&self, last_n_blocks: u32) -> Result<Vec<BlockInfo>>;

    async fn get_script_from_address(&self, address: &str) -> Result<ScriptReference>;

    /// Latest UTxO at `address` (holding `asset`, if given) together with its datum.
    async fn get_datum_from_address(
        &self,
        address: &str,
        asset: Option<&str>,
    ) -> Result<Option<ScriptReference>>;

    async fn get_historical_order_utxos(
        &self,
        stake_addresses: &[&str],
        after_time: Option<i64>,
        limit: usize,
        page: usize,
    ) -> Result<SwapTransactionList>;

    async fn get_order_utxos_by_block_or_tx(
        &self,
        query: &OrderUtxoQuery,
    ) -> Result<SwapTransactionList>;

    async fn get_cancel_utxos(
        &self,
        stake_addresses: &[&str],
        block_no: Option<u64>,
        after_time: Option<i64>,
        limit: usize,
        page: usize,
    ) -> Result<SwapTransactionList>;

    /// Address an Axo order for `assets` pays out to.
    async fn get_axo_target(
        &self,
        assets: &AssetBag,
        block_time: Option<i64>,
    ) -> Result<Option<String>>;
}
