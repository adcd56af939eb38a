use serde::{Deserialize, Serialize};

use super::{AssetBag, RawUtxoRecord};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Swap,
    Deposit,
    Withdraw,
    ZapIn,
}

/// The transaction that placed an order at a protocol's order address.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SwapSubmitInfo {
    pub address_inputs: Vec<String>,
    pub address_stake: String,
    pub assets: AssetBag,
    pub block_hash: String,
    pub block_time: i64,
    pub block_index: u32,
    pub datum_hash: String,
    pub datum_cbor: String,
    pub metadata: Option<serde_json::Value>,
    pub tx_hash: String,
    pub tx_index: u32,
}

/// Where the order went after it was consumed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SwapExecuteInfo {
    pub address: String,
    pub tx_hash: String,
    pub tx_index: u32,
    pub block_time: i64,
    pub block_index: u32,
    pub block_hash: String,
    pub assets: AssetBag,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum SwapOutput {
    /// The order was consumed into a pool; the output is the new pool UTxO.
    Pool(RawUtxoRecord),
    Execute(SwapExecuteInfo),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SwapStatusInfo {
    pub swap_input: SwapSubmitInfo,
    pub swap_output: Option<SwapOutput>,
}

/// All order statuses that share one submitting transaction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SwapTransactionInfo(Vec<SwapStatusInfo>);

impl SwapTransactionInfo {
    /// Fails if the statuses were submitted by different transactions.
    pub fn new(statuses: Vec<SwapStatusInfo>) -> Result<Self, String> {
        if let Some(first) = statuses.first() {
            let tx_hash = &first.swap_input.tx_hash;
            if statuses.iter().any(|s| &s.swap_input.tx_hash != tx_hash) {
                return Err(format!(
                    "all statuses must share submit transaction {}",
                    tx_hash
                ));
            }
        }
        Ok(Self(statuses))
    }

    pub fn submit_tx_hash(&self) -> Option<&str> {
        self.0.first().map(|s| s.swap_input.tx_hash.as_str())
    }

    pub fn statuses(&self) -> &[SwapStatusInfo] {
        &self.0
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SwapTransactionList(Vec<SwapTransactionInfo>);

impl SwapTransactionList {
    /// Groups consecutive statuses by submitting transaction hash.
    pub fn from_statuses(statuses: Vec<SwapStatusInfo>) -> Self {
        let mut groups: Vec<Vec<SwapStatusInfo>> = Vec::new();
        for status in statuses {
            match groups.last_mut() {
                Some(group)
                    if group[0].swap_input.tx_hash == status.swap_input.tx_hash =>
                {
                    group.push(status)
                }
                _ => groups.push(vec![status]),
            }
        }
        Self(groups.into_iter().map(SwapTransactionInfo).collect())
    }

    pub fn transactions(&self) -> &[SwapTransactionInfo] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
