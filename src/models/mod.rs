pub mod asset_bag;
pub mod order;
pub mod utxo;

pub use asset_bag::{AssetBag, LOVELACE};
pub use order::{
    OrderType, SwapExecuteInfo, SwapOutput, SwapStatusInfo, SwapSubmitInfo, SwapTransactionInfo,
    SwapTransactionList,
};
pub use utxo::{BlockInfo, RawUtxoRecord, ScriptReference};
