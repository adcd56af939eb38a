//! GeniusYield limit orders.
//!
//! GeniusYield has no pools: every order UTxO is a resting limit order
//! identified by a beacon NFT. Orders for one pair are assembled into a
//! shallow order book.
use ciborium::value::Value;
use rust_decimal::Decimal;

use super::cbor::{bytes_value, constr_value, int_value, list, Fields, FromPlutus, ToPlutus};
use super::datums::{AssetClass, FullAddress, Rational, WrappedInt};
use super::{BatcherFee, OrderDatum, PoolDatum, PoolDescriptor, PoolSelector};
use crate::error::{DatumError, PoolError};
use crate::models::{AssetBag, OrderType, RawUtxoRecord};
use crate::pricing::order_book::dec;
use crate::pricing::VolumeFee;
use crate::state::pool::{self, PoolDraft};
use crate::state::{FillRounding, OrderBookOrder, OrderBookState, OrderState};

pub const DEX_NAME: &str = "GeniusYield";

/// Taker fee in basis points, 0.3% net of the 0.3% protocol share.
pub const FEE: i128 = 29;

/// Levels kept on each side of an assembled book.
pub const BOOK_DEPTH: usize = 3;

const BEACON_POLICIES: &[&str] = &[
    "22f6999d4effc0ade05f6e1a70b702c65d6b3cdf0e301e4a8267f585",
    "642c1f7bf79ca48c0f97239fcb2f3b42b92f2548184ab394e1e1e503",
];

const ORDER_ADDRESSES: &[&str] = &[
    "addr1wx5d0l6u7nq3wfcz3qmjlxkgu889kav2u9d8s5wyzes6frqktgru2",
    "addr1w8kllanr6dlut7t480zzytsd52l7pz4y3kcgxlfvx2ddavcshakwd",
];

pub static DESCRIPTOR: PoolDescriptor = PoolDescriptor {
    dex_name: DEX_NAME,
    pool_policy: None,
    lp_policy: None,
    dex_policy: Some(BEACON_POLICIES),
    order_selector: ORDER_ADDRESSES,
    pool_selector: PoolSelector {
        addresses: ORDER_ADDRESSES,
        assets: &[],
    },
    default_fee: VolumeFee::Flat(FEE),
    batcher_fee: BatcherFee::Flat(1_000_000),
    deposit: 0,
};

/// Fees already collected inside an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContainedFee {
    pub lovelaces: i128,
    pub offered_tokens: i128,
    pub asked_tokens: i128,
}

impl FromPlutus for ContainedFee {
    fn from_plutus(value: &Value) -> Result<Self, DatumError> {
        let mut f = Fields::expect(value, "ContainedFee", 0, 3)?;
        Ok(Self {
            lovelaces: f.int()?,
            offered_tokens: f.int()?,
            asked_tokens: f.int()?,
        })
    }
}

impl ToPlutus for ContainedFee {
    fn to_plutus(&self) -> Value {
        constr_value(
            0,
            vec![
                int_value(self.lovelaces),
                int_value(self.offered_tokens),
                int_value(self.asked_tokens),
            ],
        )
    }
}

/// A partially fillable limit order offering `offered_asset` at `price`
/// units of `asked_asset` per offered unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeniusYieldOrderDatum {
    pub owner_key: Vec<u8>,
    pub owner_address: FullAddress,
    pub offered_asset: AssetClass,
    pub offered_original_amount: i128,
    pub offered_amount: i128,
    pub asked_asset: AssetClass,
    pub price: Rational,
    pub nft: Vec<u8>,
    /// POSIX milliseconds.
    pub start_time: Option<WrappedInt>,
    pub end_time: Option<WrappedInt>,
    pub partial_fills: i128,
    pub maker_lovelace_fee: i128,
    pub taker_lovelace_fee: i128,
    pub contained_fee: ContainedFee,
    pub contained_payment: i128,
}

impl GeniusYieldOrderDatum {
    /// Whether the order is outside its trading window at `now_ms`.
    pub fn is_inactive(&self, now_ms: i64) -> bool {
        let now = now_ms as i128;
        let not_started = self.start_time.is_some_and(|t| t.0 > now);
        let ended = self.end_time.is_some_and(|t| t.0 < now);
        not_started || ended
    }
}

impl FromPlutus for GeniusYieldOrderDatum {
    fn from_plutus(value: &Value) -> Result<Self, DatumError> {
        let mut f = Fields::expect(value, "GeniusYieldOrderDatum", 0, 15)?;
        Ok(Self {
            owner_key: f.bytes()?,
            owner_address: f.next()?,
            offered_asset: f.next()?,
            offered_original_amount: f.int()?,
            offered_amount: f.int()?,
            asked_asset: f.next()?,
            price: f.next()?,
            nft: f.bytes()?,
            start_time: f.next()?,
            end_time: f.next()?,
            partial_fills: f.int()?,
            maker_lovelace_fee: f.int()?,
            taker_lovelace_fee: f.int()?,
            contained_fee: f.next()?,
            contained_payment: f.int()?,
        })
    }
}

impl ToPlutus for GeniusYieldOrderDatum {
    fn to_plutus(&self) -> Value {
        constr_value(
            0,
            vec![
                bytes_value(&self.owner_key),
                self.owner_address.to_plutus(),
                self.offered_asset.to_plutus(),
                int_value(self.offered_original_amount),
                int_value(self.offered_amount),
                self.asked_asset.to_plutus(),
                self.price.to_plutus(),
                bytes_value(&self.nft),
                self.start_time.to_plutus(),
                self.end_time.to_plutus(),
                int_value(self.partial_fills),
                int_value(self.maker_lovelace_fee),
                int_value(self.taker_lovelace_fee),
                self.contained_fee.to_plutus(),
                int_value(self.contained_payment),
            ],
        )
    }
}

impl PoolDatum for GeniusYieldOrderDatum {
    fn pool_pair(&self) -> Option<Vec<String>> {
        Some(vec![self.offered_asset.unit(), self.asked_asset.unit()])
    }
}

impl OrderDatum for GeniusYieldOrderDatum {
    fn address_source(&self) -> Result<Option<String>, DatumError> {
        Ok(None)
    }

    fn requested_amount(&self) -> AssetBag {
        self.offered_asset.with_quantity(self.offered_amount)
    }

    fn order_type(&self) -> Option<OrderType> {
        Some(OrderType::Swap)
    }
}

/// Protocol parameters held in the GeniusYield settings UTxO.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeniusYieldSettings {
    pub signatories: Vec<Vec<u8>>,
    pub req_signatories: i128,
    pub nft_symbol: Vec<u8>,
    pub fee_address: FullAddress,
    pub maker_fee_flat: i128,
    pub maker_fee_ratio: Rational,
    pub taker_fee: i128,
    pub min_deposit: i128,
}

impl FromPlutus for GeniusYieldSettings {
    fn from_plutus(value: &Value) -> Result<Self, DatumError> {
        let mut f = Fields::expect(value, "GeniusYieldSettings", 0, 8)?;
        let signatories = list(f.value()?)?
            .iter()
            .map(|v| super::cbor::bytes(v).map(<[u8]>::to_vec))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            signatories,
            req_signatories: f.int()?,
            nft_symbol: f.bytes()?,
            fee_address: f.next()?,
            maker_fee_flat: f.int()?,
            maker_fee_ratio: f.next()?,
            taker_fee: f.int()?,
            min_deposit: f.int()?,
        })
    }
}

impl ToPlutus for GeniusYieldSettings {
    fn to_plutus(&self) -> Value {
        constr_value(
            0,
            vec![
                Value::Array(self.signatories.iter().map(|s| bytes_value(s)).collect()),
                int_value(self.req_signatories),
                bytes_value(&self.nft_symbol),
                self.fee_address.to_plutus(),
                int_value(self.maker_fee_flat),
                self.maker_fee_ratio.to_plutus(),
                int_value(self.taker_fee),
                int_value(self.min_deposit),
            ],
        )
    }
}

/// Validate one order UTxO. `now_ms` decides whether the order is inside its
/// trading window.
pub fn order_state(record: RawUtxoRecord, now_ms: i64) -> Result<OrderState, PoolError> {
    let assets = record
        .assets
        .clone()
        .filter(|a| !a.is_empty())
        .ok_or_else(|| {
            PoolError::NoAssets(format!("no assets in the order (tx_hash={})", record.tx_hash))
        })?;

    let datum = GeniusYieldOrderDatum::from_cbor(record.datum_cbor())
        .map_err(|e| PoolError::undecodable(&record.tx_hash, record.datum_cbor(), e))?;
    let Rational { numerator, denominator } = &datum.price;
    if *numerator <= 0 || *denominator <= 0 {
        return Err(PoolError::InvalidPool(format!(
            "{}: order price {}/{} is not positive (tx_hash={})",
            DEX_NAME, numerator, denominator, record.tx_hash
        )));
    }

    let mut draft = PoolDraft {
        dex_name: DEX_NAME,
        tx_hash: record.tx_hash.clone(),
        assets,
        pool_nft: None,
        dex_nft: None,
        lp_tokens: None,
        fee: DESCRIPTOR.default_fee,
        inactive: false,
    };

    // The traded pair is set aside so a token under a beacon policy is
    // never mistaken for the beacon itself.
    let mut pair = AssetBag::new();
    for unit in datum.pool_pair().unwrap_or_default() {
        if let Some(quantity) = draft.assets.pop(&unit) {
            pair.insert(unit, quantity);
        }
    }
    pool::extract_dex_nft(&DESCRIPTOR, &mut draft)?;
    draft.assets.extend(pair);

    let in_unit = datum.asked_asset.unit();
    let out_unit = datum.offered_asset.unit();
    if draft.assets.unit(0).map_or(true, |u| u != in_unit) {
        draft.assets.move_to_end(&out_unit);
    }

    Ok(OrderState {
        dex: DEX_NAME.to_string(),
        in_unit,
        out_unit,
        assets: draft.assets,
        price: (datum.price.numerator, datum.price.denominator),
        available: datum.offered_amount,
        fee: FEE,
        rounding: FillRounding::Stepped,
        inactive: datum.is_inactive(now_ms),
        dex_nft: draft.dex_nft,
        address: record.address.clone(),
        tx_hash: record.tx_hash.clone(),
        tx_index: record.tx_index,
        block_time: record.block_time,
        block_index: record.block_index,
        datum_cbor: record.datum_cbor().to_string(),
        datum_hash: record.datum_hash.clone(),
        batcher_fee: DESCRIPTOR.batcher_fee.evaluate(None, None),
        deposit: DESCRIPTOR.deposit,
    })
}

/// Assemble a `unit_a`/`unit_b` book from order states. Orders going
/// `unit_a -> unit_b` are sells, the reverse are buys; inactive orders and
/// other pairs are dropped.
pub fn get_book(unit_a: &str, unit_b: &str, orders: Vec<OrderState>) -> OrderBookState {
    let mut sell = Vec::new();
    let mut buy = Vec::new();
    for order in orders.into_iter().filter(|o| !o.inactive) {
        let (num, den) = order.price;
        let Some(price) = dec(num).checked_div(dec(den)) else {
            continue;
        };
        let quantity = order.available;
        if order.in_unit == unit_a && order.out_unit == unit_b {
            sell.push(OrderBookOrder::with_state(price, quantity, order));
        } else if order.in_unit == unit_b && order.out_unit == unit_a {
            buy.push(OrderBookOrder::with_state(price, quantity, order));
        }
    }
    let mut book =
        OrderBookState::new(DEX_NAME, DEX_NAME.to_string(), unit_a, unit_b, FEE, sell, buy)
            .truncate(BOOK_DEPTH);
    book.block_time = book
        .sell_book
        .iter()
        .chain(book.buy_book.iter())
        .filter_map(|o| o.state.as_ref().map(|s| s.block_time))
        .max()
        .unwrap_or_default();
    book
}

/// Best price in a book side, if any.
pub fn best_price(book: &[OrderBookOrder]) -> Option<Decimal> {
    book.first().map(|o| o.price)
}
