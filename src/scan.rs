//! Batch scanning of protocol addresses.
//!
//! Shared script addresses hold plenty of UTxOs that are not pools. Every
//! skippable [`PoolError`] is counted and logged, never fatal.
use std::collections::{BTreeMap, HashSet};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::backend::Backend;
use crate::config::ScanConfig;
use crate::dex::{geniusyield, PoolProtocol};
use crate::error::PoolError;
use crate::models::{AssetBag, RawUtxoRecord};
use crate::state::{OrderBookState, OrderState, PoolState};

/// Outcome counts of one scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanReport {
    pub dex: String,
    pub total: usize,
    pub built: usize,
    pub no_assets: usize,
    pub not_a_pool: usize,
    pub invalid_pool: usize,
    pub invalid_lp: usize,
}

impl ScanReport {
    pub fn new(dex: &str) -> Self {
        Self {
            dex: dex.to_string(),
            ..Self::default()
        }
    }

    pub fn skipped(&self) -> usize {
        self.no_assets + self.not_a_pool + self.invalid_pool + self.invalid_lp
    }

    /// Fold another scan of the same protocol into this one.
    pub fn absorb(&mut self, other: &ScanReport) {
        self.total += other.total;
        self.built += other.built;
        self.no_assets += other.no_assets;
        self.not_a_pool += other.not_a_pool;
        self.invalid_pool += other.invalid_pool;
        self.invalid_lp += other.invalid_lp;
    }

    fn count(&mut self, err: &PoolError) {
        match err {
            PoolError::NoAssets(_) => self.no_assets += 1,
            PoolError::NotAPool { .. } => self.not_a_pool += 1,
            PoolError::InvalidPool(_) => self.invalid_pool += 1,
            PoolError::InvalidLp(_) => self.invalid_lp += 1,
        }
    }
}

/// Build every record with `build`, keeping what succeeds. Only an error
/// that is not skippable ends the scan.
pub fn scan_with<T, F>(
    dex: &str,
    records: Vec<RawUtxoRecord>,
    mut build: F,
) -> Result<(Vec<T>, ScanReport), PoolError>
where
    F: FnMut(RawUtxoRecord) -> Result<T, PoolError>,
{
    let mut report = ScanReport::new(dex);
    let mut built = Vec::with_capacity(records.len());
    for record in records {
        report.total += 1;
        let tx_hash = record.tx_hash.clone();
        match build(record) {
            Ok(state) => built.push(state),
            Err(err) if !err.is_skippable() => return Err(err),
            Err(err) => {
                if err.is_suspicious() {
                    warn!(dex, tx_hash = %tx_hash, reason = %err, "skipping inconsistent record");
                } else {
                    debug!(dex, tx_hash = %tx_hash, reason = %err, "skipping record");
                }
                report.count(&err);
            }
        }
    }
    report.built = built.len();
    info!(
        dex,
        total = report.total,
        built = report.built,
        skipped = report.skipped(),
        "scan finished"
    );
    Ok((built, report))
}

pub fn scan_pools<P: PoolProtocol>(
    protocol: &P,
    records: Vec<RawUtxoRecord>,
) -> Result<(Vec<PoolState>, ScanReport), PoolError> {
    scan_with(protocol.descriptor().dex_name, records, |record| {
        PoolState::build(protocol, record)
    })
}

/// Every page of UTxOs at `addresses`, once per selector asset. Records seen
/// under more than one asset are kept once.
pub async fn fetch_records(
    backend: &dyn Backend,
    addresses: &[String],
    assets: &[&str],
    page_limit: usize,
) -> Result<Vec<RawUtxoRecord>> {
    let addresses: Vec<&str> = addresses.iter().map(String::as_str).collect();
    let filters: Vec<Option<&str>> = if assets.is_empty() {
        vec![None]
    } else {
        assets.iter().copied().map(Some).collect()
    };

    let mut seen = HashSet::new();
    let mut records = Vec::new();
    for filter in filters {
        let asset_filter = filter.map(|a| [a]);
        let mut page = 0;
        loop {
            let assets = asset_filter.as_ref().map(|a| &a[..]);
            let batch = backend
                .get_pool_utxos(&addresses, assets, page_limit, page, false)
                .await?;
            let fetched = batch.len();
            for record in batch {
                if seen.insert((record.tx_hash.clone(), record.tx_index)) {
                    records.push(record);
                }
            }
            if fetched < page_limit {
                break;
            }
            page += 1;
        }
    }
    debug!(records = records.len(), "fetched records");
    Ok(records)
}

/// Fetch a protocol's pool UTxOs and scan them. Backend failures propagate.
pub async fn scan_protocol<P: PoolProtocol>(
    backend: &dyn Backend,
    protocol: &P,
    config: &ScanConfig,
) -> Result<(Vec<PoolState>, ScanReport)> {
    let desc = protocol.descriptor();
    let addresses = protocol.pool_addresses();
    let records =
        fetch_records(backend, &addresses, desc.pool_selector.assets, config.page_limit).await?;
    Ok(scan_pools(protocol, records)?)
}

/// Fetch and validate the GeniusYield order UTxOs, then assemble one book per pair.
pub async fn scan_geniusyield(
    backend: &dyn Backend,
    config: &ScanConfig,
    now_ms: i64,
) -> Result<(Vec<OrderBookState>, ScanReport)> {
    let addresses: Vec<String> = geniusyield::DESCRIPTOR
        .pool_selector
        .addresses
        .iter()
        .map(|a| a.to_string())
        .collect();
    let records = fetch_records(backend, &addresses, &[], config.page_limit).await?;
    let (orders, report) =
        scan_with(geniusyield::DEX_NAME, records, |r| geniusyield::order_state(r, now_ms))?;
    Ok((assemble_books(orders), report))
}

/// Group orders by pair and build a book for each, `unit_a` being the
/// canonical first unit of the pair.
pub fn assemble_books(orders: Vec<OrderState>) -> Vec<OrderBookState> {
    let mut pairs: BTreeMap<(String, String), Vec<OrderState>> = BTreeMap::new();
    for order in orders {
        let mut pair = AssetBag::new();
        pair.insert(order.in_unit.clone(), 0);
        pair.insert(order.out_unit.clone(), 0);
        pair.canonicalize();
        let (Ok(a), Ok(b)) = (pair.unit(0), pair.unit(1)) else {
            continue;
        };
        pairs.entry((a.to_string(), b.to_string())).or_default().push(order);
    }
    pairs
        .into_iter()
        .map(|((a, b), orders)| geniusyield::get_book(&a, &b, orders))
        .collect()
}
