//! Protocol descriptors and the hooks each DEX plugs into pool construction.
//!
//! A protocol is static configuration (`PoolDescriptor`) plus a datum schema
//! and a handful of overridable steps (`PoolProtocol`). The construction
//! pipeline itself lives in [`crate::state::pool`].

use serde::{Deserialize, Serialize};

use crate::error::{DatumError, PoolError};
use crate::models::{AssetBag, OrderType, LOVELACE};
use crate::pricing::{Pricing, VolumeFee};
use crate::state::pool::{self, PoolDraft};

pub mod cbor;
pub mod datums;

pub mod axo;
pub mod geniusyield;
pub mod minswap;
pub mod minswap_stable;
pub mod minswap_v2;
pub mod muesli;
pub mod spectrum;
pub mod sundaeswap_v1;
pub mod sundaeswap_v3;
pub mod vyfinance;
pub mod wingriders;

use cbor::{FromPlutus, ToPlutus};

/// How pool UTxOs are found on chain: by address, optionally narrowed to
/// UTxOs holding one of the listed asset policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSelector {
    pub addresses: &'static [&'static str],
    pub assets: &'static [&'static str],
}

/// Fee paid to the off-chain batcher for executing an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatcherFee {
    Flat(i128),
    /// `base - min(MIN held / divisor, cap)`: holders of the MIN token get a discount.
    MinDiscount { base: i128, divisor: i128, cap: i128 },
    /// Read from the protocol settings datum at scan time, `fallback` until then.
    Settings { fallback: i128 },
}

/// Unit of the MIN token, used by the Minswap batcher discount.
pub const MIN_TOKEN: &str = "29d222ce763455e3d7a09a665ce554f00ac89d2e99a1a83d267170c64d494e";

impl BatcherFee {
    /// Evaluate the rule. `settings` is the fee read from the settings datum,
    /// `extra` is whatever the trader attaches to the order.
    pub fn evaluate(&self, settings: Option<i128>, extra: Option<&AssetBag>) -> i128 {
        match *self {
            BatcherFee::Flat(fee) => fee,
            BatcherFee::MinDiscount { base, divisor, cap } => {
                let held = extra.and_then(|bag| bag.get(MIN_TOKEN)).unwrap_or(0);
                base - (held / divisor).min(cap)
            }
            BatcherFee::Settings { fallback } => settings.unwrap_or(fallback),
        }
    }
}

/// Static per-protocol configuration.
#[derive(Debug, Clone, Copy)]
pub struct PoolDescriptor {
    pub dex_name: &'static str,
    pub pool_policy: Option<&'static [&'static str]>,
    pub lp_policy: Option<&'static [&'static str]>,
    pub dex_policy: Option<&'static [&'static str]>,
    pub order_selector: &'static [&'static str],
    pub pool_selector: PoolSelector,
    pub default_fee: VolumeFee,
    pub batcher_fee: BatcherFee,
    pub deposit: i128,
}

pub trait PoolDatum: FromPlutus + ToPlutus {
    /// Units of the tradeable reserve pair, if the datum names them.
    fn pool_pair(&self) -> Option<Vec<String>>;
}

pub trait OrderDatum: FromPlutus + ToPlutus {
    /// Address that placed the order and receives refunds.
    fn address_source(&self) -> Result<Option<String>, DatumError>;

    /// Minimum (or exact) amount the order asks for.
    fn requested_amount(&self) -> AssetBag;

    fn order_type(&self) -> Option<OrderType>;
}

/// The overridable steps of pool construction.
///
/// Default extraction steps match tokens by policy prefix using the
/// descriptor's policy lists. A protocol with no list for a token kind skips
/// that step.
pub trait PoolProtocol: Send + Sync {
    type Datum: PoolDatum;

    fn descriptor(&self) -> &'static PoolDescriptor;

    /// Addresses holding pool UTxOs. Protocols whose pools are listed in a
    /// hosted registry override this.
    fn pool_addresses(&self) -> Vec<String> {
        self.descriptor()
            .pool_selector
            .addresses
            .iter()
            .map(|a| a.to_string())
            .collect()
    }

    fn order_addresses(&self) -> Vec<String> {
        self.descriptor().order_selector.iter().map(|a| a.to_string()).collect()
    }

    fn decode_datum(&self, cbor_hex: &str) -> Result<Self::Datum, DatumError> {
        Self::Datum::from_cbor(cbor_hex)
    }

    /// Whether a caller that already knows the pool NFT, dex NFT and fee may
    /// skip extraction and protocol adjustments.
    fn supports_fast_path(&self) -> bool {
        false
    }

    /// Adjustments applied when the fast path is taken instead of `post_init`.
    fn fast_path(&self, _draft: &mut PoolDraft, _datum: &Self::Datum) -> Result<(), PoolError> {
        Ok(())
    }

    fn extract_dex_nft(&self, draft: &mut PoolDraft) -> Result<(), PoolError> {
        pool::extract_dex_nft(self.descriptor(), draft)
    }

    fn extract_lp_tokens(&self, draft: &mut PoolDraft) -> Result<(), PoolError> {
        pool::extract_lp_tokens(self.descriptor(), draft)
    }

    fn extract_pool_nft(&self, draft: &mut PoolDraft) -> Result<(), PoolError> {
        pool::extract_pool_nft(self.descriptor(), draft)
    }

    /// Protocol adjustments after the structural check: reserve corrections,
    /// fee derivation and inactivity.
    fn post_init(&self, _draft: &mut PoolDraft, _datum: &Self::Datum) -> Result<(), PoolError> {
        Ok(())
    }

    fn pricing(&self, _datum: Option<&Self::Datum>) -> Pricing {
        Pricing::ConstantProduct
    }

    fn pool_id(&self, draft: &PoolDraft) -> Result<String, PoolError> {
        pool::default_pool_id(draft)
    }
}

/// Units are stored with `lovelace` for the native currency; datums that use
/// an empty string map to it here.
pub(crate) fn normalize_unit(unit: String) -> String {
    if unit.is_empty() {
        LOVELACE.to_string()
    } else {
        unit
    }
}

/// Names accepted by the scanner and the CLI, in scan order.
pub const PROTOCOL_NAMES: &[&str] = &[
    minswap::DEX_NAME,
    minswap_v2::DEX_NAME,
    minswap_stable::DEX_NAME,
    sundaeswap_v1::DEX_NAME,
    sundaeswap_v3::DEX_NAME,
    spectrum::DEX_NAME,
    wingriders::DEX_NAME,
    wingriders::SSP_DEX_NAME,
    muesli::DEX_NAME,
    vyfinance::DEX_NAME,
    geniusyield::DEX_NAME,
];

/// A pool-address UTxO carrying `datum_cbor` and `assets`, for protocol tests.
#[cfg(test)]
pub(crate) fn test_record(
    datum_cbor: String,
    assets: Vec<(&str, i128)>,
) -> crate::models::RawUtxoRecord {
    crate::models::RawUtxoRecord {
        address: "addr1test".to_string(),
        tx_hash: "ab".repeat(32),
        tx_index: 0,
        block_time: 1_700_000_000,
        block_index: 0,
        block_hash: String::new(),
        datum_hash: None,
        datum_cbor: Some(datum_cbor),
        assets: AssetBag::from_pairs(assets).ok(),
        plutus_v2: false,
    }
}
