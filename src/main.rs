use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Result};
use serde::Serialize;
use tracing::{info, warn};

use dexter_pools_rs::backend::Backend;
use dexter_pools_rs::cache::{save_snapshot, RegistryCache};
use dexter_pools_rs::config::ScanConfig;
use dexter_pools_rs::dex::{
    geniusyield, minswap, minswap_stable, minswap_v2, muesli, spectrum, sundaeswap_v1,
    sundaeswap_v3, vyfinance, wingriders, PoolProtocol,
};
use dexter_pools_rs::kupo::KupoBackend;
use dexter_pools_rs::scan::{self, ScanReport};
use dexter_pools_rs::state::{OrderBookState, PoolBuilder, PoolState};
use dexter_pools_rs::utils::init_logging;

#[derive(Debug, Default, Serialize)]
struct Snapshot {
    pools: Vec<PoolState>,
    books: Vec<OrderBookState>,
    reports: Vec<ScanReport>,
}

impl Snapshot {
    fn add_pools(&mut self, (pools, report): Scanned) {
        self.pools.extend(pools);
        self.reports.push(report);
    }
}

struct Args {
    config: Option<PathBuf>,
    kupo: Option<String>,
    dexes: Vec<String>,
    out: Option<PathBuf>,
}

fn print_usage(bin: &str) {
    eprintln!("Usage:");
    eprintln!("  {} [--config <file>] [--kupo <url>] [--dex <name>]... [--out <file>]", bin);
    eprintln!();
    eprintln!("  --config   JSON scan configuration");
    eprintln!("  --kupo     Kupo URL, overrides the configuration");
    eprintln!("  --dex      protocol to scan, repeatable (default: all)");
    eprintln!("  --out      snapshot file (default: pools.json)");
    eprintln!();
    eprintln!("  Available protocols:");
    for name in dexter_pools_rs::dex::PROTOCOL_NAMES {
        eprintln!("    {}", name);
    }
}

fn parse_args(raw: &[String]) -> Result<Args> {
    let mut args = Args {
        config: None,
        kupo: None,
        dexes: Vec::new(),
        out: None,
    };
    let mut i = 1;
    while i < raw.len() {
        let flag = raw[i].as_str();
        let value = raw.get(i + 1).cloned();
        match flag {
            "--config" | "--kupo" | "--dex" | "--out" => {
                let value = value.ok_or_else(|| anyhow!("{} requires a value", flag))?;
                match flag {
                    "--config" => args.config = Some(PathBuf::from(value)),
                    "--kupo" => args.kupo = Some(value),
                    "--dex" => args.dexes.push(value),
                    _ => args.out = Some(PathBuf::from(value)),
                }
                i += 2;
            }
            other => return Err(anyhow!("unknown argument '{}'", other)),
        }
    }
    Ok(args)
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

type Scanned = (Vec<PoolState>, ScanReport);

async fn scan_sundae_v3(backend: &dyn Backend, config: &ScanConfig) -> Result<Scanned> {
    let cache = RegistryCache::new(sundaeswap_v3::DEX_NAME, config.registry_ttl());
    let settings_fee = match sundaeswap_v3::load_batcher_fee(&cache, backend).await {
        Ok(fee) => Some(fee),
        Err(e) => {
            warn!(error = %e, "SundaeSwapV3 settings unavailable, using the fallback batcher fee");
            None
        }
    };
    let protocol = sundaeswap_v3::SundaeSwapV3;
    let desc = protocol.descriptor();
    let addresses = protocol.pool_addresses();
    let records =
        scan::fetch_records(backend, &addresses, desc.pool_selector.assets, config.page_limit)
            .await?;
    Ok(scan::scan_with(desc.dex_name, records, |record| {
        PoolBuilder::new(&protocol, record).settings_fee(settings_fee).build()
    })?)
}

async fn scan_stable(backend: &dyn Backend, config: &ScanConfig) -> Result<Scanned> {
    let mut pools = Vec::new();
    let mut report = ScanReport::new(minswap_stable::DEX_NAME);
    for protocol in minswap_stable::POOLS {
        let (found, partial) = scan::scan_protocol(backend, &protocol, config).await?;
        pools.extend(found);
        report.absorb(&partial);
    }
    Ok((pools, report))
}

async fn scan_vyfi(backend: &dyn Backend, config: &ScanConfig) -> Result<Scanned> {
    let client = reqwest::Client::new();
    let cache = RegistryCache::new(vyfinance::DEX_NAME, config.registry_ttl());
    let registry = vyfinance::load_registry(&cache, &client, vyfinance::REGISTRY_URL).await?;
    scan::scan_protocol(backend, &vyfinance::VyFi::new(registry), config).await
}

async fn scan_one(
    name: &str,
    backend: &dyn Backend,
    config: &ScanConfig,
    snapshot: &mut Snapshot,
) -> Result<()> {
    let scanned = match name {
        minswap::DEX_NAME => scan::scan_protocol(backend, &minswap::Minswap, config).await?,
        minswap_v2::DEX_NAME => scan::scan_protocol(backend, &minswap_v2::MinswapV2, config).await?,
        minswap_stable::DEX_NAME => scan_stable(backend, config).await?,
        sundaeswap_v1::DEX_NAME => {
            scan::scan_protocol(backend, &sundaeswap_v1::SundaeSwap, config).await?
        }
        sundaeswap_v3::DEX_NAME => scan_sundae_v3(backend, config).await?,
        spectrum::DEX_NAME => scan::scan_protocol(backend, &spectrum::Spectrum, config).await?,
        wingriders::DEX_NAME => {
            scan::scan_protocol(backend, &wingriders::WingRiders, config).await?
        }
        wingriders::SSP_DEX_NAME => {
            scan::scan_protocol(backend, &wingriders::WingRidersSsp, config).await?
        }
        muesli::DEX_NAME => scan::scan_protocol(backend, &muesli::MuesliSwap, config).await?,
        vyfinance::DEX_NAME => scan_vyfi(backend, config).await?,
        geniusyield::DEX_NAME => {
            let (books, report) = scan::scan_geniusyield(backend, config, now_ms()).await?;
            snapshot.books.extend(books);
            snapshot.reports.push(report);
            return Ok(());
        }
        other => return Err(anyhow!("unknown protocol '{}'", other)),
    };
    snapshot.add_pools(scanned);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let raw: Vec<String> = std::env::args().collect();
    let bin = raw.first().map(String::as_str).unwrap_or("dexter-scan");
    let args = match parse_args(&raw) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}", e);
            print_usage(bin);
            std::process::exit(1);
        }
    };

    let mut config = match &args.config {
        Some(path) => ScanConfig::load(path)?,
        None => ScanConfig::default(),
    };
    if let Some(kupo) = args.kupo {
        config.kupo_url = kupo;
    }
    if !args.dexes.is_empty() {
        config.protocols = args.dexes;
    }
    if let Some(out) = args.out {
        config.output = out;
    }
    config.validate()?;

    let backend = KupoBackend::from_config(&config)?;
    info!(kupo = backend.api_url(), protocols = config.protocols.len(), "starting scan");

    let mut snapshot = Snapshot::default();
    for name in &config.protocols {
        if let Err(e) = scan_one(name, &backend, &config, &mut snapshot).await {
            warn!(dex = %name, error = %e, "protocol scan failed");
        }
    }

    save_snapshot(&snapshot, &config.output)?;

    println!("{:<16} {:>8} {:>8} {:>8}", "protocol", "records", "built", "skipped");
    for report in &snapshot.reports {
        println!(
            "{:<16} {:>8} {:>8} {:>8}",
            report.dex,
            report.total,
            report.built,
            report.skipped()
        );
    }
    println!(
        "wrote {} pools and {} books to {}",
        snapshot.pools.len(),
        snapshot.books.len(),
        config.output.display()
    );
    Ok(())
}
