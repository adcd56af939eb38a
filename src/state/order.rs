//! Resting limit orders and the books assembled from them.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::PricingError;
use crate::models::{AssetBag, LOVELACE};
use crate::pricing::order_book::{add_fee, dec, deduct_fee, fill_in, fill_out, truncate};
use crate::pricing::{SwapQuote, FEE_DENOMINATOR};

/// Upper bound on the one-unit steps taken by a stepped reverse quote.
const MAX_FILL_STEPS: i128 = 100_000;

/// How an order's quotes are rounded to what the order script accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FillRounding {
    /// Plain floor division against the order price.
    Exact,
    /// Quotes are stepped one unit at a time until they land on an amount
    /// the price ratio can actually settle.
    Stepped,
}

/// One order UTxO, offering `out_unit` for `in_unit` at `price`
/// (`numerator` input units per `denominator` output units).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderState {
    pub dex: String,
    pub in_unit: String,
    pub out_unit: String,
    pub assets: AssetBag,
    pub price: (i128, i128),
    pub available: i128,
    pub fee: i128,
    pub rounding: FillRounding,
    pub inactive: bool,
    pub dex_nft: Option<AssetBag>,
    pub address: String,
    pub tx_hash: String,
    pub tx_index: u32,
    pub block_time: i64,
    pub block_index: u32,
    pub datum_cbor: String,
    pub datum_hash: Option<String>,
    pub batcher_fee: i128,
    pub deposit: i128,
}

impl OrderState {
    fn single_of(&self, asset: &AssetBag, unit: &str) -> Result<i128, PricingError> {
        if asset.len() != 1 {
            return Err(PricingError::AssetCount(asset.len()));
        }
        if asset.unit(0)? != unit {
            return Err(PricingError::UnitNotInPool {
                unit: asset.unit(0)?.to_string(),
                unit_a: self.in_unit.clone(),
                unit_b: self.out_unit.clone(),
            });
        }
        Ok(asset.quantity(0)?)
    }

    fn base_amount_out(&self, in_qty: i128) -> i128 {
        let (num, den) = self.price;
        if num == 0 {
            return self.available;
        }
        let in_qty = deduct_fee(in_qty, self.fee);
        (in_qty * den).div_euclid(num).min(self.available)
    }

    fn base_amount_in(&self, out_qty: i128, fee: i128) -> i128 {
        let (num, den) = self.price;
        if den == 0 {
            return 0;
        }
        let base = out_qty.min(self.available) * num / den;
        match self.rounding {
            FillRounding::Exact => base * (FEE_DENOMINATOR + fee) / FEE_DENOMINATOR,
            FillRounding::Stepped => {
                (base * (FEE_DENOMINATOR + fee) + FEE_DENOMINATOR - 1) / FEE_DENOMINATOR
            }
        }
    }

    fn amount_out(&self, in_qty: i128) -> i128 {
        let out = self.base_amount_out(in_qty);
        let (num, den) = self.price;
        if self.rounding == FillRounding::Exact || num <= den || out == 0 {
            return out;
        }
        if self.base_amount_out(in_qty + 1) != out {
            return out;
        }
        // The next unit of input would buy nothing more, so the script will
        // only accept the largest output strictly below this one.
        let mut step = in_qty;
        while step > 0 && self.base_amount_out(step) == out {
            step -= 1;
        }
        self.base_amount_out(step)
    }

    pub fn get_amount_out(&self, asset: &AssetBag) -> Result<SwapQuote, PricingError> {
        let in_qty = self.single_of(asset, &self.in_unit)?;
        Ok(SwapQuote::new(&self.out_unit, self.amount_out(in_qty), 0.0))
    }

    pub fn get_amount_in(&self, asset: &AssetBag) -> Result<SwapQuote, PricingError> {
        let out_qty = self.single_of(asset, &self.out_unit)?;
        let (num, den) = self.price;
        if num <= 0 || den <= 0 {
            return Err(PricingError::Unsupported(format!(
                "order {}#{} has price {}/{}",
                self.tx_hash, self.tx_index, num, den
            )));
        }
        let amount = match self.rounding {
            FillRounding::Exact => self.base_amount_in(out_qty, self.fee),
            FillRounding::Stepped => self.stepped_amount_in(out_qty)?,
        };
        Ok(SwapQuote::new(&self.in_unit, amount, 0.0))
    }

    fn stepped_amount_in(&self, out_qty: i128) -> Result<i128, PricingError> {
        let fee = self.fee * 1003 / 1000;
        let start = self.base_amount_in(out_qty, fee);
        for amount in start..start.saturating_add(MAX_FILL_STEPS) {
            let out = self.amount_out(amount);
            if out >= out_qty || out >= self.available {
                return Ok(amount);
            }
        }
        Err(PricingError::Unsupported(format!(
            "order {}#{} settles no input within {} units of {}",
            self.tx_hash, self.tx_index, MAX_FILL_STEPS, start
        )))
    }

    /// Price as a ratio of input units per output unit.
    pub fn price_ratio(&self) -> Decimal {
        let (num, den) = self.price;
        dec(num).checked_div(dec(den)).unwrap_or_default()
    }

    pub fn available(&self) -> AssetBag {
        AssetBag::single(&self.out_unit, self.available)
    }

    pub fn tvl(&self) -> AssetBag {
        self.available()
    }

    pub fn pool_id(&self) -> Option<&str> {
        self.dex_nft.as_ref().and_then(|nft| nft.unit(0).ok())
    }
}

/// One price level of a book, optionally backed by an order UTxO.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBookOrder {
    pub price: Decimal,
    pub quantity: i128,
    pub state: Option<Box<OrderState>>,
}

impl OrderBookOrder {
    pub fn new(price: Decimal, quantity: i128) -> Self {
        Self {
            price,
            quantity,
            state: None,
        }
    }

    pub fn with_state(price: Decimal, quantity: i128, state: OrderState) -> Self {
        Self {
            price,
            quantity,
            state: Some(Box::new(state)),
        }
    }
}

/// Sell and buy ladders for one pair, each sorted ascending by price.
///
/// Selling `unit_a` walks the sell ladder; selling `unit_b` walks the buy
/// ladder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBookState {
    pub dex: String,
    pub pool_id: String,
    pub unit_a: String,
    pub unit_b: String,
    pub fee: i128,
    pub sell_book: Vec<OrderBookOrder>,
    pub buy_book: Vec<OrderBookOrder>,
    pub block_time: i64,
    pub deposit: i128,
}

impl OrderBookState {
    pub fn new(
        dex: &str,
        pool_id: String,
        unit_a: &str,
        unit_b: &str,
        fee: i128,
        mut sell_book: Vec<OrderBookOrder>,
        mut buy_book: Vec<OrderBookOrder>,
    ) -> Self {
        sell_book.sort_by(|a, b| a.price.cmp(&b.price));
        buy_book.sort_by(|a, b| a.price.cmp(&b.price));
        Self {
            dex: dex.to_string(),
            pool_id,
            unit_a: unit_a.to_string(),
            unit_b: unit_b.to_string(),
            fee,
            sell_book,
            buy_book,
            block_time: 0,
            deposit: 0,
        }
    }

    /// Keep only the best `depth` levels on each side.
    pub fn truncate(mut self, depth: usize) -> Self {
        self.sell_book.truncate(depth);
        self.buy_book.truncate(depth);
        self
    }

    fn side_of(&self, asset: &AssetBag) -> Result<(bool, i128), PricingError> {
        if asset.len() != 1 {
            return Err(PricingError::AssetCount(asset.len()));
        }
        let unit = asset.unit(0)?;
        if unit != self.unit_a && unit != self.unit_b {
            return Err(PricingError::UnitNotInPool {
                unit: unit.to_string(),
                unit_a: self.unit_a.clone(),
                unit_b: self.unit_b.clone(),
            });
        }
        Ok((unit == self.unit_a, asset.quantity(0)?))
    }

    pub fn get_amount_out(
        &self,
        asset: &AssetBag,
        apply_fee: bool,
    ) -> Result<SwapQuote, PricingError> {
        let (input_is_a, quantity) = self.side_of(asset)?;
        let (book, unit_out) = if input_is_a {
            (&self.sell_book, &self.unit_b)
        } else {
            (&self.buy_book, &self.unit_a)
        };
        let quantity = if apply_fee {
            deduct_fee(quantity, self.fee)
        } else {
            quantity
        };
        let out = fill_out(book, dec(quantity));
        Ok(SwapQuote::new(unit_out, truncate(out), 0.0))
    }

    pub fn get_amount_in(
        &self,
        asset: &AssetBag,
        apply_fee: bool,
    ) -> Result<SwapQuote, PricingError> {
        let (output_is_a, quantity) = self.side_of(asset)?;
        let (book, unit_in) = if output_is_a {
            (&self.buy_book, &self.unit_b)
        } else {
            (&self.sell_book, &self.unit_a)
        };
        let mut paid = fill_in(book, dec(quantity));
        if apply_fee {
            paid = add_fee(paid, self.fee);
        }
        Ok(SwapQuote::new(unit_in, truncate(paid), 0.0))
    }

    /// Mid prices from the best level of each side:
    /// `((buy + 1/sell) / 2, (sell + 1/buy) / 2)`.
    pub fn price(&self) -> Result<(Decimal, Decimal), PricingError> {
        let (Some(buy), Some(sell)) = (self.buy_book.first(), self.sell_book.first()) else {
            return Err(PricingError::Unsupported(format!(
                "{} book has an empty side",
                self.pool_id
            )));
        };
        let two = Decimal::TWO;
        match (Decimal::ONE.checked_div(sell.price), Decimal::ONE.checked_div(buy.price)) {
            (Some(inv_sell), Some(inv_buy)) => {
                Ok(((buy.price + inv_sell) / two, (sell.price + inv_buy) / two))
            }
            _ => Err(PricingError::Unsupported(format!("{} book has a zero price", self.pool_id))),
        }
    }

    /// Value of both ladders in ADA; only defined when `unit_a` is lovelace.
    pub fn tvl(&self) -> Result<Decimal, PricingError> {
        if self.unit_a != LOVELACE {
            return Err(PricingError::Unsupported(
                "tvl for non-ADA pools is not implemented".to_string(),
            ));
        }
        let buys: Decimal = self
            .buy_book
            .iter()
            .filter_map(|o| dec(o.quantity).checked_div(o.price))
            .sum();
        let sells: Decimal = self
            .sell_book
            .iter()
            .map(|o| dec(o.quantity) * o.price)
            .sum();
        Ok(dec(truncate(buys + sells)) / dec(1_000_000))
    }
}
