//! Axo algorithmic order books.
//!
//! Axo orders are strategies executed off chain, so the book is not
//! rebuilt from UTxOs: it comes from Axo's hosted API and is rescaled from
//! display units to on-chain units with each token's decimals.
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Result};
use ciborium::value::Value;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::cbor::{self, constr, constr_value, int_value, Fields, FromPlutus, ToPlutus};
use super::datums::{AssetClass, Rational};
use super::{normalize_unit, BatcherFee, OrderDatum, PoolDescriptor, PoolSelector};
use crate::backend::Backend;
use crate::error::{DatumError, PoolError, PricingError};
use crate::models::{AssetBag, OrderType, LOVELACE};
use crate::pricing::order_book::{dec, truncate};
use crate::pricing::VolumeFee;
use crate::state::{OrderBookOrder, OrderBookState};

pub const DEX_NAME: &str = "Axo";

pub const API_URL: &str = "https://api.axo.trade/";

/// Volume fee in basis points.
pub const FEE: i128 = 10;

const MIN_VOLUME_FEE: i128 = 1_200_000;
const OUTPUT_COST: i128 = 250_000;
const FILL_COST: i128 = 600_000;

const ORDER_ADDRESS: &str = concat!(
    "addr1z92l7rnra7sxjn5qv5fzc4fwsrrm29mgkleqj9a0y46j5lrryf9mt",
    "f9layje8u7u7wmap6alr28l90ry5t9nlyldjjsse4mxc9"
);

pub static DESCRIPTOR: PoolDescriptor = PoolDescriptor {
    dex_name: DEX_NAME,
    pool_policy: None,
    lp_policy: None,
    dex_policy: None,
    order_selector: &[ORDER_ADDRESS],
    pool_selector: PoolSelector {
        addresses: &[],
        assets: &[],
    },
    default_fee: VolumeFee::Flat(FEE),
    batcher_fee: BatcherFee::Flat(MIN_VOLUME_FEE + OUTPUT_COST),
    deposit: 8_000_000,
};

/// `policy -> name -> quantity`
pub type TokenMap = Vec<(Vec<u8>, Vec<(Vec<u8>, i128)>)>;

fn token_map(value: &Value) -> Result<TokenMap, DatumError> {
    cbor::map(value)?
        .iter()
        .map(|(policy, names)| {
            let names = cbor::map(names)?
                .iter()
                .map(|(name, qty)| Ok((cbor::bytes(name)?.to_vec(), cbor::int(qty)?)))
                .collect::<Result<Vec<_>, DatumError>>()?;
            Ok((cbor::bytes(policy)?.to_vec(), names))
        })
        .collect()
}

fn token_map_value(tokens: &TokenMap) -> Value {
    Value::Map(
        tokens
            .iter()
            .map(|(policy, names)| {
                let names = names
                    .iter()
                    .map(|(name, qty)| (cbor::bytes_value(name), int_value(*qty)))
                    .collect();
                (cbor::bytes_value(policy), Value::Map(names))
            })
            .collect(),
    )
}

/// Strategy parameter: either a price or a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxoParameter {
    Price(Rational),
    TimeMilliseconds(i128),
}

impl FromPlutus for AxoParameter {
    fn from_plutus(value: &Value) -> Result<Self, DatumError> {
        let (alt, items) = constr(value)?;
        match alt {
            2 => Ok(AxoParameter::Price(
                Fields::from_items(items, "AxoParameter::Price", 1)?.next()?,
            )),
            7 => Ok(AxoParameter::TimeMilliseconds(
                Fields::from_items(items, "AxoParameter::TimeMilliseconds", 1)?.int()?,
            )),
            found => Err(DatumError::UnknownVariant {
                schema: "AxoParameter",
                found,
            }),
        }
    }
}

impl ToPlutus for AxoParameter {
    fn to_plutus(&self) -> Value {
        match self {
            AxoParameter::Price(price) => constr_value(2, vec![price.to_plutus()]),
            AxoParameter::TimeMilliseconds(ms) => constr_value(7, vec![int_value(*ms)]),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AxoOrderDatum {
    /// Tokens allocated to each node, keyed by node index.
    pub node_allocation: Vec<(i128, TokenMap)>,
    /// Asset traded by each node index.
    pub asset_mapping: Vec<AssetClass>,
    pub instance_token: AssetClass,
    pub parameters: Vec<(Vec<u8>, AxoParameter)>,
    /// Strategy state, kept opaque.
    pub variables: Value,
}

impl AxoOrderDatum {
    fn allocated(&self, node: usize) -> i128 {
        let Some(asset) = self.asset_mapping.get(node) else {
            return 0;
        };
        self.node_allocation
            .iter()
            .find(|(index, _)| *index == node as i128)
            .and_then(|(_, tokens)| tokens.iter().find(|(policy, _)| *policy == asset.policy))
            .and_then(|(_, names)| names.iter().find(|(name, _)| *name == asset.name))
            .map(|(_, qty)| *qty)
            .unwrap_or(0)
    }

    pub fn price(&self) -> Option<Rational> {
        self.parameters.iter().find_map(|(_, p)| match p {
            AxoParameter::Price(price) => Some(*price),
            AxoParameter::TimeMilliseconds(_) => None,
        })
    }

    /// The payout address is not in the datum; Axo tracks it against the
    /// strategy's instance token.
    pub async fn resolve_address(
        &self,
        backend: &dyn Backend,
        block_time: Option<i64>,
    ) -> Result<Option<String>> {
        backend
            .get_axo_target(&self.instance_token.with_quantity(1), block_time)
            .await
    }
}

impl FromPlutus for AxoOrderDatum {
    fn from_plutus(value: &Value) -> Result<Self, DatumError> {
        let mut f = Fields::expect(value, "AxoOrderDatum", 0, 5)?;
        let node_allocation = cbor::map(f.value()?)?
            .iter()
            .map(|(node, tokens)| Ok((cbor::int(node)?, token_map(tokens)?)))
            .collect::<Result<Vec<_>, DatumError>>()?;
        let asset_mapping = f.list_of()?;
        let instance_token = f.next()?;
        let parameters = cbor::map(f.value()?)?
            .iter()
            .map(|(key, param)| Ok((cbor::bytes(key)?.to_vec(), AxoParameter::from_plutus(param)?)))
            .collect::<Result<Vec<_>, DatumError>>()?;
        Ok(Self {
            node_allocation,
            asset_mapping,
            instance_token,
            parameters,
            variables: f.value()?.clone(),
        })
    }
}

impl ToPlutus for AxoOrderDatum {
    fn to_plutus(&self) -> Value {
        let allocation = self
            .node_allocation
            .iter()
            .map(|(node, tokens)| (int_value(*node), token_map_value(tokens)))
            .collect();
        let parameters = self
            .parameters
            .iter()
            .map(|(key, param)| (cbor::bytes_value(key), param.to_plutus()))
            .collect();
        constr_value(
            0,
            vec![
                Value::Map(allocation),
                cbor::list_value(&self.asset_mapping),
                self.instance_token.to_plutus(),
                Value::Map(parameters),
                self.variables.clone(),
            ],
        )
    }
}

impl OrderDatum for AxoOrderDatum {
    /// Always `None` here; see [`AxoOrderDatum::resolve_address`].
    fn address_source(&self) -> Result<Option<String>, DatumError> {
        Ok(None)
    }

    /// Second-node holdings plus the first node's holdings converted at the
    /// strategy price. Empty when the strategy has no price.
    fn requested_amount(&self) -> AssetBag {
        let (Some(price), Some(asset)) = (self.price(), self.asset_mapping.get(1)) else {
            return AssetBag::new();
        };
        if price.denominator == 0 {
            return AssetBag::new();
        }
        let quantity = self.allocated(1) + self.allocated(0) * price.numerator / price.denominator;
        AssetBag::single(normalize_unit(asset.unit()), quantity)
    }

    fn order_type(&self) -> Option<OrderType> {
        Some(OrderType::Swap)
    }
}

/// Book snapshot as served by the `ob` endpoint, in display units.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AxoBookResponse {
    pub left: String,
    pub right: String,
    #[serde(default)]
    pub pair: Option<String>,
    #[serde(default)]
    pub buy_side_amount: Vec<f64>,
    #[serde(default)]
    pub buy_side_price: Vec<f64>,
    #[serde(default)]
    pub buy_side_depth: Option<u64>,
    #[serde(default)]
    pub sell_side_amount: Vec<f64>,
    #[serde(default)]
    pub sell_side_price: Vec<f64>,
    #[serde(default)]
    pub sell_side_depth: Option<u64>,
}

fn pow10(exp: i64) -> Decimal {
    let magnitude = Decimal::from(10i64.pow(exp.unsigned_abs().min(18) as u32));
    if exp >= 0 {
        magnitude
    } else {
        Decimal::ONE / magnitude
    }
}

fn float(value: f64) -> Result<Decimal, PricingError> {
    Decimal::from_f64(value)
        .ok_or_else(|| PricingError::Unsupported(format!("non-finite book value {}", value)))
}

/// Rescale a hosted book to on-chain units, returning `(buy, sell)` ladders.
///
/// Sell levels are priced in `unit_a` per `unit_b` and sized in `unit_b`;
/// buy levels are inverted into `unit_b` per `unit_a` and sized in `unit_a`.
pub fn process_book(
    response: &AxoBookResponse,
    decimals_a: u32,
    decimals_b: u32,
) -> Result<(Vec<OrderBookOrder>, Vec<OrderBookOrder>), PricingError> {
    let (da, db) = (decimals_a as i64, decimals_b as i64);
    if response.sell_side_price.len() != response.sell_side_amount.len()
        || response.buy_side_price.len() != response.buy_side_amount.len()
    {
        return Err(PricingError::Unsupported(format!(
            "mismatched {} book side lengths",
            DEX_NAME
        )));
    }

    let mut sell = Vec::with_capacity(response.sell_side_price.len());
    for (price, amount) in response.sell_side_price.iter().zip(&response.sell_side_amount) {
        let price = float(*price)? * pow10(da - db);
        let quantity = truncate(float(*amount)? * pow10(db));
        sell.push(OrderBookOrder::new(price, quantity));
    }

    let mut buy = Vec::with_capacity(response.buy_side_price.len());
    for (price, amount) in response.buy_side_price.iter().zip(&response.buy_side_amount) {
        let raw = float(*price)?;
        let Some(inverse) = Decimal::ONE.checked_div(raw) else {
            continue;
        };
        let quantity = truncate(float(*amount)? * pow10(da) * raw);
        buy.push(OrderBookOrder::new(inverse * pow10(db - da), quantity));
    }
    Ok((buy, sell))
}

/// An Axo book together with the spot price used for non-ADA fees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxoMarket {
    pub book: OrderBookState,
    pub spot: Decimal,
}

impl AxoMarket {
    pub fn new(
        unit_a: &str,
        unit_b: &str,
        spot: Decimal,
        buy: Vec<OrderBookOrder>,
        sell: Vec<OrderBookOrder>,
    ) -> Self {
        let id = pool_id(unit_a, unit_b);
        let mut book = OrderBookState::new(DEX_NAME, id, unit_a, unit_b, FEE, sell, buy);
        book.deposit = DESCRIPTOR.deposit;
        let spot = if unit_a == LOVELACE || unit_b == LOVELACE {
            Decimal::ONE
        } else {
            spot
        };
        Self { book, spot }
    }

    /// Volume fee (at least 1.2 ADA) plus the output cost plus a fill cost
    /// for every book level the order is expected to touch.
    pub fn batcher_fee(
        &self,
        in_assets: &AssetBag,
        out_assets: &AssetBag,
    ) -> Result<AssetBag, PricingError> {
        let in_unit = in_assets.unit(0)?;
        let in_qty = in_assets.quantity(0)?;
        let volume = if in_unit == LOVELACE {
            FEE * in_qty / 10_000
        } else if out_assets.unit(0)? == LOVELACE {
            FEE * out_assets.quantity(0)? / 10_000
        } else {
            truncate(dec(FEE * in_qty) * self.spot / dec(10_000))
        };
        let mut fees = volume.max(MIN_VOLUME_FEE) + OUTPUT_COST;

        let book = if in_unit == self.book.unit_a {
            &self.book.sell_book
        } else {
            &self.book.buy_book
        };
        let mut remaining = dec(in_qty);
        for level in book {
            if remaining <= Decimal::ZERO {
                break;
            }
            fees += FILL_COST;
            let available = dec(level.quantity) * level.price;
            if available > remaining {
                remaining = Decimal::ZERO;
            } else {
                remaining -= available;
            }
        }
        Ok(AssetBag::lovelace(fees))
    }

    pub fn pool_id(&self) -> &str {
        &self.book.pool_id
    }
}

pub fn pool_id(unit_a: &str, unit_b: &str) -> String {
    format!("{}.{}.{}", DEX_NAME, unit_a, unit_b)
}

/// The API names ADA with an empty string.
fn api_unit(unit: &str) -> &str {
    if unit == LOVELACE {
        ""
    } else {
        unit
    }
}

/// Client for Axo's hosted book API.
pub struct AxoClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl AxoClient {
    pub fn new(api_key: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| anyhow!("failed to build Axo HTTP client: {}", e))?;
        Ok(Self::with_client(API_URL, api_key, client))
    }

    pub fn with_client(base_url: &str, api_key: &str, client: reqwest::Client) -> Self {
        Self {
            base_url: crate::utils::remove_trailing_slash(base_url),
            api_key: api_key.to_string(),
            client,
        }
    }

    async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        unit_a: &str,
        unit_b: &str,
    ) -> Result<T> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let response = self
            .client
            .get(&url)
            .header("x-api-key", &self.api_key)
            .query(&[("left", api_unit(unit_a)), ("right", api_unit(unit_b))])
            .send()
            .await
            .map_err(|e| anyhow!("Axo {} request failed: {}", endpoint, e))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Axo {} returned {}: {}", endpoint, status, body));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| anyhow!("Axo {} response could not be parsed: {}", endpoint, e))
    }

    pub async fn order_book(&self, unit_a: &str, unit_b: &str) -> Result<AxoBookResponse> {
        self.get("ob", unit_a, unit_b).await
    }

    pub async fn spot(&self, unit_a: &str, unit_b: &str) -> Result<Option<f64>> {
        self.get("spot", unit_a, unit_b).await
    }

    /// Fetch and rescale the full book for a pair. A pair without a spot
    /// price is not traded on Axo.
    pub async fn get_book(
        &self,
        unit_a: &str,
        unit_b: &str,
        decimals_a: u32,
        decimals_b: u32,
    ) -> Result<AxoMarket> {
        let Some(spot) = self.spot(unit_a, unit_b).await? else {
            return Err(PoolError::InvalidPool(format!(
                "{}: no spot price for {}-{}",
                DEX_NAME, unit_a, unit_b
            ))
            .into());
        };
        let response = self.order_book(unit_a, unit_b).await?;
        let (buy, sell) = process_book(&response, decimals_a, decimals_b).map_err(|e| {
            warn!(unit_a, unit_b, error = %e, "could not process Axo book");
            PoolError::InvalidPool(format!("{}: {}", DEX_NAME, e))
        })?;
        debug!(unit_a, unit_b, buys = buy.len(), sells = sell.len(), "fetched Axo book");

        let spot = float(spot).unwrap_or(Decimal::ONE);
        let mut market = AxoMarket::new(unit_a, unit_b, spot, buy, sell);
        market.book.block_time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default();
        Ok(market)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    const TOKEN: &str = "8a1cfae21368b8bebbbed9800fec304e95cce39a2a57dc35e2e3ebaa4d494c4b";

    fn response() -> AxoBookResponse {
        AxoBookResponse {
            left: String::new(),
            right: TOKEN.to_string(),
            sell_side_price: vec![0.5, 1.0],
            sell_side_amount: vec![10.0, 20.0],
            buy_side_price: vec![0.25],
            buy_side_amount: vec![100.0],
            ..Default::default()
        }
    }

    #[test]
    fn test_process_book_scales_decimals() {
        let (buy, sell) = process_book(&response(), 6, 0).unwrap();
        assert_eq!(sell[0].price, Decimal::from(500_000));
        assert_eq!(sell[0].quantity, 10);
        assert_eq!(sell[1].price, Decimal::from(1_000_000));
        assert_eq!(buy[0].price, Decimal::new(4, 6));
        assert_eq!(buy[0].quantity, 25_000_000);

        let mut broken = response();
        broken.sell_side_amount.pop();
        assert!(process_book(&broken, 6, 0).is_err());
    }

    #[test]
    fn test_batcher_fee_counts_levels() {
        let (buy, sell) = process_book(&response(), 6, 0).unwrap();
        let market = AxoMarket::new(LOVELACE, TOKEN, Decimal::from(3), buy, sell);
        assert_eq!(market.spot, Decimal::ONE);
        assert_eq!(market.pool_id(), format!("Axo.lovelace.{}", TOKEN));
        assert_eq!(market.book.deposit, 8_000_000);

        // first level holds 5 ADA worth, so 3 ADA touches one level
        let fee = market
            .batcher_fee(&AssetBag::lovelace(3_000_000), &AssetBag::single(TOKEN, 6))
            .unwrap();
        assert_eq!(fee.get(LOVELACE), Some(1_200_000 + 250_000 + 600_000));

        // 10 ADA spills into the second level
        let fee = market
            .batcher_fee(&AssetBag::lovelace(10_000_000), &AssetBag::single(TOKEN, 15))
            .unwrap();
        assert_eq!(fee.get(LOVELACE), Some(1_200_000 + 250_000 + 1_200_000));

        // 5000 ADA pays the percentage fee instead of the minimum
        let fee = market
            .batcher_fee(&AssetBag::lovelace(5_000_000_000), &AssetBag::single(TOKEN, 1))
            .unwrap();
        assert_eq!(fee.get(LOVELACE), Some(5_000_000 + 250_000 + 1_200_000));
    }

    #[test]
    fn test_order_datum() {
        let token = AssetClass::from_unit(TOKEN).unwrap();
        let datum = AxoOrderDatum {
            node_allocation: vec![
                (0, vec![(vec![], vec![(vec![], 4_000_000)])]),
                (1, vec![(token.policy.clone(), vec![(token.name.clone(), 10)])]),
            ],
            asset_mapping: vec![AssetClass::lovelace(), token.clone()],
            instance_token: AssetClass::from_unit(&format!("{}01", &TOKEN[..56])).unwrap(),
            parameters: vec![
                (b"start".to_vec(), AxoParameter::TimeMilliseconds(1_700_000_000_000)),
                (
                    b"price".to_vec(),
                    AxoParameter::Price(Rational {
                        numerator: 1,
                        denominator: 2_000_000,
                    }),
                ),
            ],
            variables: Value::Map(vec![]),
        };
        let decoded = AxoOrderDatum::from_cbor(&datum.to_cbor().unwrap()).unwrap();
        assert_eq!(decoded, datum);
        // 10 held + 4 ADA at 2 ADA per token
        assert_eq!(decoded.requested_amount().get(TOKEN), Some(12));
        assert_eq!(decoded.address_source().unwrap(), None);

        let no_price = AxoOrderDatum {
            parameters: vec![],
            ..datum
        };
        assert!(no_price.requested_amount().is_empty());
    }

    #[tokio::test]
    async fn test_get_book_from_api() {
        let mut server = mockito::Server::new_async().await;
        let spot = server
            .mock("GET", "/spot")
            .match_header("x-api-key", "secret")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("left".into(), "".into()),
                Matcher::UrlEncoded("right".into(), TOKEN.into()),
            ]))
            .with_body("0.5")
            .create_async()
            .await;
        let ob = server
            .mock("GET", "/ob")
            .match_header("x-api-key", "secret")
            .match_query(Matcher::Any)
            .with_body(serde_json::to_string(&response()).unwrap())
            .create_async()
            .await;

        let client = AxoClient::with_client(&server.url(), "secret", reqwest::Client::new());
        let market = client.get_book(LOVELACE, TOKEN, 6, 0).await.unwrap();
        spot.assert_async().await;
        ob.assert_async().await;
        assert_eq!(market.book.sell_book.len(), 2);
        assert_eq!(market.book.buy_book.len(), 1);
        let out = market.book.get_amount_out(&AssetBag::lovelace(5_000_000), false).unwrap();
        assert_eq!(out.quantity(), 10);
    }

    #[tokio::test]
    async fn test_pair_without_spot_is_invalid() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/spot")
            .match_query(Matcher::Any)
            .with_body("null")
            .create_async()
            .await;
        let client = AxoClient::with_client(&server.url(), "secret", reqwest::Client::new());
        let err = client.get_book(LOVELACE, TOKEN, 6, 0).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<PoolError>(), Some(PoolError::InvalidPool(_))));
    }
}
