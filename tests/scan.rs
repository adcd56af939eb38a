mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use common::{minswap_pool_record, record, MockBackend, TOKEN};
use dexter_pools_rs::config::ScanConfig;
use dexter_pools_rs::dex::minswap::{Minswap, FACTORY_TOKEN};
use dexter_pools_rs::dex::cbor::{constr_value, ToPlutus};
use dexter_pools_rs::dex::datums::{FullAddress, PartAddress};
use dexter_pools_rs::dex::sundaeswap_v3::{load_batcher_fee, SundaeV3Settings};
use dexter_pools_rs::dex::PoolProtocol;
use dexter_pools_rs::scan::{fetch_records, scan_protocol};
use dexter_pools_rs::{RegistryCache, LOVELACE};

fn pool_address() -> String {
    Minswap.pool_addresses()[0].clone()
}

#[tokio::test]
async fn test_fetch_pages_until_short_page() {
    let address = pool_address();
    let records: Vec<_> = (0..5).map(|i| minswap_pool_record(&address, i)).collect();
    let backend = MockBackend::new(records);
    let fetched = fetch_records(&backend, &[address], &[], 2).await.unwrap();
    assert_eq!(fetched.len(), 5);
    // pages of 2, 2 and 1
    assert_eq!(backend.calls(), 3);
}

#[tokio::test]
async fn test_fetch_dedupes_across_asset_filters() {
    let address = pool_address();
    let backend = MockBackend::new(vec![
        minswap_pool_record(&address, 0),
        record(&address, 1, "d87980", &[(LOVELACE, 2_000_000), (TOKEN, 5)]),
    ]);
    let fetched = fetch_records(&backend, &[address], &[FACTORY_TOKEN, TOKEN], 10)
        .await
        .unwrap();
    let mut indexes: Vec<u32> = fetched.iter().map(|r| r.tx_index).collect();
    indexes.sort();
    assert_eq!(indexes, vec![0, 1]);
}

#[tokio::test]
async fn test_scan_protocol_skips_noise() {
    let address = pool_address();
    let backend = MockBackend::new(vec![
        minswap_pool_record(&address, 0),
        record(&address, 1, "d87a80", &[(LOVELACE, 2_000_000), (FACTORY_TOKEN, 1)]),
        minswap_pool_record("addr1elsewhere", 2),
    ]);
    let config = ScanConfig {
        page_limit: 10,
        ..ScanConfig::default()
    };
    let (pools, report) = scan_protocol(&backend, &Minswap, &config).await.unwrap();
    assert_eq!(pools.len(), 1);
    assert_eq!(pools[0].tx_index, 0);
    assert_eq!(report.total, 2);
    assert_eq!(report.not_a_pool, 1);
    assert_eq!(report.skipped(), 1);
}

#[tokio::test]
async fn test_registry_cache_refreshes_after_ttl() {
    let counter = AtomicUsize::new(0);
    let loads = &counter;
    let load = move || async move {
        Ok::<usize, anyhow::Error>(loads.fetch_add(1, Ordering::SeqCst))
    };

    let cache = RegistryCache::new("test", Duration::from_secs(3600));
    assert_eq!(cache.get_or_refresh(load).await.unwrap(), 0);
    assert_eq!(cache.get_or_refresh(load).await.unwrap(), 0);
    assert_eq!(loads.load(Ordering::SeqCst), 1);

    let expired = RegistryCache::new("test", Duration::ZERO);
    expired.get_or_refresh(load).await.unwrap();
    expired.get_or_refresh(load).await.unwrap();
    assert_eq!(loads.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_failed_refresh_keeps_last_value() {
    let cache = RegistryCache::new("test", Duration::ZERO);
    cache.get_or_refresh(|| async { Ok(vec![1, 2]) }).await.unwrap();
    let err = cache
        .get_or_refresh(|| async { Err::<Vec<i32>, _>(anyhow::anyhow!("registry down")) })
        .await;
    assert!(err.is_err());
    assert_eq!(cache.peek().await, Some(vec![1, 2]));
}

fn sundae_settings(base_fee: i128, simple_fee: i128) -> String {
    let admin = FullAddress {
        payment: PartAddress::Script(vec![5; 28]),
        stake: None,
    };
    SundaeV3Settings {
        settings_admin: constr_value(0, vec![]),
        metadata_admin: admin.clone(),
        treasury_admin: constr_value(0, vec![]),
        treasury_address: admin,
        treasury_allowance: vec![1, 10],
        authorized_scoopers: constr_value(1, vec![]),
        authorized_staking_keys: ciborium::value::Value::Array(vec![]),
        base_fee,
        simple_fee,
        strategy_fee: 0,
        pool_creation_fee: 0,
        extensions: constr_value(0, vec![]),
    }
    .to_cbor()
    .unwrap()
}

#[tokio::test]
async fn test_settings_fee_read_once_per_ttl() {
    let backend = MockBackend::new(vec![]).with_datum(sundae_settings(332_000, 168_000));
    let cache = RegistryCache::new("SundaeSwapV3", Duration::from_secs(3600));
    assert_eq!(load_batcher_fee(&cache, &backend).await.unwrap(), 500_000);
    assert_eq!(load_batcher_fee(&cache, &backend).await.unwrap(), 500_000);
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn test_missing_settings_is_an_error() {
    let backend = MockBackend::new(vec![]);
    let cache = RegistryCache::new("SundaeSwapV3", Duration::from_secs(3600));
    assert!(load_batcher_fee(&cache, &backend).await.is_err());
    assert_eq!(cache.peek().await, None);
}
