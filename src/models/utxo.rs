use serde::{Deserialize, Serialize};

use super::AssetBag;

/// A UTxO as handed over by a backend, before any protocol validation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawUtxoRecord {
    pub address: String,
    pub tx_hash: String,
    pub tx_index: u32,
    pub block_time: i64,
    pub block_index: u32,
    #[serde(default)]
    pub block_hash: String,
    pub datum_hash: Option<String>,
    pub datum_cbor: Option<String>,
    pub assets: Option<AssetBag>,
    #[serde(default)]
    pub plutus_v2: bool,
}

impl RawUtxoRecord {
    pub fn datum_cbor(&self) -> &str {
        self.datum_cbor.as_deref().unwrap_or_default()
    }

    pub fn has_datum(&self) -> bool {
        self.datum_cbor.as_deref().is_some_and(|d| !d.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockInfo {
    pub epoch_slot_no: u64,
    pub block_no: u64,
    pub tx_count: u64,
    pub block_time: i64,
}

/// Location of a reference script or a settings datum on chain.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScriptReference {
    pub tx_hash: Option<String>,
    pub tx_index: Option<u32>,
    pub address: Option<String>,
    pub assets: Option<AssetBag>,
    pub datum_hash: Option<String>,
    pub datum_cbor: Option<String>,
    pub script: Option<String>,
}
