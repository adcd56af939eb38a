//! Validated states built from raw UTxO records.

pub mod order;
pub mod pool;

pub use order::{FillRounding, OrderBookOrder, OrderBookState, OrderState};
pub use pool::{KnownPool, PoolBuilder, PoolDraft, PoolState};
