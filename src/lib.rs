//! # dexter-pools-rs
//!
//! Decodes Cardano DEX pool and order UTxOs into validated states and
//! quotes swaps against them.
//!
//! ## Supported protocols
//!
//! | DEX | Model | Discovery |
//! |-----|-------|-----------|
//! | Minswap | constant product | factory token |
//! | MinswapV2 | constant product, split fee | pool address + validity token |
//! | MinswapStable | stable swap | one address per pool |
//! | SundaeSwap | constant product | pool address |
//! | SundaeSwapV3 | constant product, bid/ask fee | pool address |
//! | Spectrum | constant product | `_nft`/`_lq` token names |
//! | WingRiders | constant product | validity token |
//! | WingRidersSSP | stable swap | validity token |
//! | MuesliSwap | constant product | AMM token |
//! | VyFi | constant product | hosted registry |
//! | GeniusYield | order book | order addresses + beacon NFT |
//! | Axo | order book | hosted book API |
//!
//! ## Quick start
//!
//! ```no_run
//! use dexter_pools_rs::config::ScanConfig;
//! use dexter_pools_rs::dex::minswap::Minswap;
//! use dexter_pools_rs::kupo::KupoBackend;
//! use dexter_pools_rs::models::AssetBag;
//! use dexter_pools_rs::scan::scan_protocol;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = ScanConfig::default();
//! let kupo = KupoBackend::from_config(&config)?;
//! let (pools, report) = scan_protocol(&kupo, &Minswap, &config).await?;
//! for pool in pools.iter().filter(|p| p.unit_a() == "lovelace") {
//!     let quote = pool.get_amount_out(&AssetBag::lovelace(10_000_000))?;
//!     println!("{} -> {} {}", pool.pool_id, quote.quantity(), pool.unit_b());
//! }
//! println!("skipped {} records", report.skipped());
//! # Ok(())
//! # }
//! ```
//!
//! ## CLI
//!
//! ```bash
//! dexter-scan --kupo http://localhost:1442 --dex Minswap --dex SundaeSwapV3 --out pools.json
//! ```

pub mod backend;
pub mod cache;
pub mod config;
pub mod dex;
pub mod error;
pub mod kupo;
pub mod models;
pub mod pricing;
pub mod scan;
pub mod state;
pub mod utils;

pub use backend::Backend;
pub use cache::{load_snapshot, save_snapshot, RegistryCache};
pub use error::{AssetBagError, DatumError, PoolError, PricingError};
pub use kupo::KupoBackend;
pub use models::{AssetBag, RawUtxoRecord, LOVELACE};
pub use state::{OrderBookState, OrderState, PoolBuilder, PoolState};
