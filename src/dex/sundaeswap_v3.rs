//! SundaeSwap V3 pools: constant product with separate bid and ask fees.
//!
//! Pool datum (constructor 0):
//!   [0] ident                     bytes
//!   [1] assets                    [[policy, name], [policy, name]]
//!   [2] circulating_lp            int
//!   [3] bid_fees_per_10_thousand  int
//!   [4] ask_fees_per_10_thousand  int
//!   [5] fee_manager               any | None
//!   [6] market_open               int (ms)
//!   [7] protocol_fees             int (lovelace held for the protocol)
//!
//! The batcher fee is `base_fee + simple_fee` from the settings datum held
//! under [`SETTINGS_TOKEN`].
use anyhow::anyhow;
use ciborium::value::Value;

use super::cbor::{
    bytes, bytes_value, constr, constr_value, int, int_value, list, Fields, FromPlutus, ToPlutus,
};
use super::datums::{FullAddress, OutputDatum, PartAddress};
use super::{
    normalize_unit, BatcherFee, OrderDatum, PoolDatum, PoolDescriptor, PoolProtocol, PoolSelector,
};
use crate::backend::Backend;
use crate::cache::RegistryCache;
use crate::error::{DatumError, PoolError};
use crate::models::{AssetBag, OrderType, LOVELACE};
use crate::pricing::VolumeFee;
use crate::state::pool::PoolDraft;
use crate::utils::CREDENTIAL_LEN;

pub const DEX_NAME: &str = "SundaeSwapV3";

pub const POOL_POLICY: &str = "e0302560ced2fdcbfcb2602697df970cd0d6a38f94b32703f51c312b";

const POOL_ADDRESS: &str = "addr1w8srqftqemf0mjlukfszd97ljuxdp44r372txfcr75wrz2cp9h6f8";
const ORDER_ADDRESS: &str = concat!(
    "addr1z8ax5k9mutg07p2ngscu3chsauktmstq92z9de938j8nqa7zcka2k",
    "2tsgmuedt4xl2j5awftvqzmmv3vs2yduzqxfcmsyun6n3"
);

pub const SETTINGS_ADDRESS: &str = "addr1w9ke67k2ckdyg60v22ajqugxze79e0ax3yqgl7nway4vc5q84hpqs";
/// `<settings policy>settings`
pub const SETTINGS_TOKEN: &str =
    "6d9d7acac59a4469ec52bb207106167c5cbfa689008ffa6ee92acc5073657474696e6773";

pub static DESCRIPTOR: PoolDescriptor = PoolDescriptor {
    dex_name: DEX_NAME,
    pool_policy: Some(&[POOL_POLICY]),
    lp_policy: None,
    dex_policy: None,
    order_selector: &[ORDER_ADDRESS],
    pool_selector: PoolSelector {
        addresses: &[POOL_ADDRESS],
        assets: &[],
    },
    default_fee: VolumeFee::Split([30, 30]),
    batcher_fee: BatcherFee::Settings { fallback: 1_000_000 },
    deposit: 2_000_000,
};

fn asset_pair_unit(policy: &[u8], name: &[u8]) -> String {
    normalize_unit(format!("{}{}", hex::encode(policy), hex::encode(name)))
}

#[derive(Debug, Clone, PartialEq)]
pub struct SundaeV3PoolDatum {
    pub ident: Vec<u8>,
    /// `(policy, name)` of both reserve assets; empty for lovelace.
    pub assets: [(Vec<u8>, Vec<u8>); 2],
    pub circulating_lp: i128,
    pub bid_fee: i128,
    pub ask_fee: i128,
    pub fee_manager: Option<Value>,
    pub market_open: i128,
    pub protocol_fees: i128,
}

fn read_asset(value: &Value) -> Result<(Vec<u8>, Vec<u8>), DatumError> {
    match list(value)? {
        [policy, name] => Ok((bytes(policy)?.to_vec(), bytes(name)?.to_vec())),
        other => Err(DatumError::FieldCount {
            schema: "SundaeV3Asset",
            expected: 2,
            found: other.len(),
        }),
    }
}

impl FromPlutus for SundaeV3PoolDatum {
    fn from_plutus(value: &Value) -> Result<Self, DatumError> {
        let mut f = Fields::expect(value, "SundaeV3PoolDatum", 0, 8)?;
        let ident = f.bytes()?;
        let assets = match list(f.value()?)? {
            [a, b] => [read_asset(a)?, read_asset(b)?],
            other => {
                return Err(DatumError::FieldCount {
                    schema: "SundaeV3PoolDatum.assets",
                    expected: 2,
                    found: other.len(),
                })
            }
        };
        Ok(Self {
            ident,
            assets,
            circulating_lp: f.int()?,
            bid_fee: f.int()?,
            ask_fee: f.int()?,
            fee_manager: f.next()?,
            market_open: f.int()?,
            protocol_fees: f.int()?,
        })
    }
}

impl ToPlutus for SundaeV3PoolDatum {
    fn to_plutus(&self) -> Value {
        let assets = self
            .assets
            .iter()
            .map(|(policy, name)| Value::Array(vec![bytes_value(policy), bytes_value(name)]))
            .collect();
        constr_value(
            0,
            vec![
                bytes_value(&self.ident),
                Value::Array(assets),
                int_value(self.circulating_lp),
                int_value(self.bid_fee),
                int_value(self.ask_fee),
                self.fee_manager.to_plutus(),
                int_value(self.market_open),
                int_value(self.protocol_fees),
            ],
        )
    }
}

impl PoolDatum for SundaeV3PoolDatum {
    fn pool_pair(&self) -> Option<Vec<String>> {
        Some(
            self.assets
                .iter()
                .map(|(policy, name)| asset_pair_unit(policy, name))
                .collect(),
        )
    }
}

/// `[policy, name, amount]` as carried in V3 orders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SundaeV3Value {
    pub policy: Vec<u8>,
    pub name: Vec<u8>,
    pub amount: i128,
}

impl SundaeV3Value {
    pub fn from_bag(bag: &AssetBag) -> Result<Self, DatumError> {
        let unit = bag.unit(0).map_err(|e| DatumError::Kind {
            expected: "single asset",
            found: e.to_string(),
        })?;
        let (policy, name) = if unit == LOVELACE {
            (Vec::new(), Vec::new())
        } else {
            let raw = hex::decode(unit)?;
            if raw.len() < CREDENTIAL_LEN {
                return Err(DatumError::Kind {
                    expected: "policy id plus asset name",
                    found: unit.to_string(),
                });
            }
            (raw[..CREDENTIAL_LEN].to_vec(), raw[CREDENTIAL_LEN..].to_vec())
        };
        Ok(Self {
            policy,
            name,
            amount: bag.quantity(0).unwrap_or(0),
        })
    }

    pub fn unit(&self) -> String {
        asset_pair_unit(&self.policy, &self.name)
    }
}

impl FromPlutus for SundaeV3Value {
    fn from_plutus(value: &Value) -> Result<Self, DatumError> {
        match list(value)? {
            [policy, name, amount] => Ok(Self {
                policy: bytes(policy)?.to_vec(),
                name: bytes(name)?.to_vec(),
                amount: int(amount)?,
            }),
            other => Err(DatumError::FieldCount {
                schema: "SundaeV3Value",
                expected: 3,
                found: other.len(),
            }),
        }
    }
}

impl ToPlutus for SundaeV3Value {
    fn to_plutus(&self) -> Value {
        Value::Array(vec![
            bytes_value(&self.policy),
            bytes_value(&self.name),
            int_value(self.amount),
        ])
    }
}

/// Order action. Variant index is the constructor tag; tag 0 (strategy) is
/// not decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SundaeV3Action {
    Swap {
        offer: SundaeV3Value,
        min_received: SundaeV3Value,
    },
    Deposit {
        assets: [SundaeV3Value; 2],
    },
    Withdraw {
        lp: SundaeV3Value,
    },
    Donate {
        assets: [SundaeV3Value; 2],
    },
}

impl FromPlutus for SundaeV3Action {
    fn from_plutus(value: &Value) -> Result<Self, DatumError> {
        let (alt, items) = constr(value)?;
        match alt {
            1 => {
                let mut f = Fields::from_items(items, "SwapV3", 2)?;
                Ok(SundaeV3Action::Swap {
                    offer: f.next()?,
                    min_received: f.next()?,
                })
            }
            2 => {
                let mut f = Fields::from_items(items, "DepositV3", 1)?;
                match list(f.value()?)? {
                    [a, b] => Ok(SundaeV3Action::Deposit {
                        assets: [SundaeV3Value::from_plutus(a)?, SundaeV3Value::from_plutus(b)?],
                    }),
                    other => Err(DatumError::FieldCount {
                        schema: "DepositV3.values",
                        expected: 2,
                        found: other.len(),
                    }),
                }
            }
            3 => Ok(SundaeV3Action::Withdraw {
                lp: Fields::from_items(items, "WithdrawV3", 1)?.next()?,
            }),
            4 => {
                let mut f = Fields::from_items(items, "DonateV3", 2)?;
                Ok(SundaeV3Action::Donate {
                    assets: [f.next()?, f.next()?],
                })
            }
            found => Err(DatumError::UnknownVariant {
                schema: "SundaeV3Action",
                found,
            }),
        }
    }
}

impl ToPlutus for SundaeV3Action {
    fn to_plutus(&self) -> Value {
        match self {
            SundaeV3Action::Swap { offer, min_received } => {
                constr_value(1, vec![offer.to_plutus(), min_received.to_plutus()])
            }
            SundaeV3Action::Deposit { assets } => constr_value(
                2,
                vec![Value::Array(assets.iter().map(ToPlutus::to_plutus).collect())],
            ),
            SundaeV3Action::Withdraw { lp } => constr_value(3, vec![lp.to_plutus()]),
            SundaeV3Action::Donate { assets } => {
                constr_value(4, vec![assets[0].to_plutus(), assets[1].to_plutus()])
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SundaeV3OrderDatum {
    pub ident: Vec<u8>,
    pub owner: PartAddress,
    pub max_protocol_fee: i128,
    pub destination: FullAddress,
    pub destination_datum: OutputDatum,
    pub action: SundaeV3Action,
    pub extension: Value,
}

impl SundaeV3OrderDatum {
    /// A swap paying out to `owner`, signed by its staking key when present.
    pub fn swap(
        ident: Vec<u8>,
        owner: FullAddress,
        in_assets: &AssetBag,
        out_assets: &AssetBag,
        max_protocol_fee: i128,
    ) -> Result<Self, DatumError> {
        let signer = owner.stake.clone().unwrap_or_else(|| owner.payment.clone());
        Ok(Self {
            ident,
            owner: signer,
            max_protocol_fee,
            destination: owner,
            destination_datum: OutputDatum::NoDatum,
            action: SundaeV3Action::Swap {
                offer: SundaeV3Value::from_bag(in_assets)?,
                min_received: SundaeV3Value::from_bag(out_assets)?,
            },
            extension: bytes_value(&[0xd8, 0x79, 0x80]),
        })
    }
}

impl FromPlutus for SundaeV3OrderDatum {
    fn from_plutus(value: &Value) -> Result<Self, DatumError> {
        let mut f = Fields::expect(value, "SundaeV3OrderDatum", 0, 6)?;
        let mut ident = Fields::expect(f.value()?, "Ident", 0, 1)?;
        let ident = ident.bytes()?;
        let owner = f.next()?;
        let max_protocol_fee = f.int()?;
        let mut destination = Fields::expect(f.value()?, "SundaeV3Destination", 0, 2)?;
        Ok(Self {
            ident,
            owner,
            max_protocol_fee,
            destination: destination.next()?,
            destination_datum: destination.next()?,
            action: f.next()?,
            extension: f.value()?.clone(),
        })
    }
}

impl ToPlutus for SundaeV3OrderDatum {
    fn to_plutus(&self) -> Value {
        constr_value(
            0,
            vec![
                constr_value(0, vec![bytes_value(&self.ident)]),
                self.owner.to_plutus(),
                int_value(self.max_protocol_fee),
                constr_value(
                    0,
                    vec![self.destination.to_plutus(), self.destination_datum.to_plutus()],
                ),
                self.action.to_plutus(),
                self.extension.clone(),
            ],
        )
    }
}

impl OrderDatum for SundaeV3OrderDatum {
    /// The owner is only a key hash, so the payout destination stands in.
    fn address_source(&self) -> Result<Option<String>, DatumError> {
        self.destination.to_address().map(Some)
    }

    fn requested_amount(&self) -> AssetBag {
        match &self.action {
            SundaeV3Action::Swap { min_received, .. } => {
                AssetBag::single(min_received.unit(), min_received.amount)
            }
            _ => AssetBag::new(),
        }
    }

    fn order_type(&self) -> Option<OrderType> {
        match self.action {
            SundaeV3Action::Swap { .. } => Some(OrderType::Swap),
            SundaeV3Action::Deposit { .. } => Some(OrderType::Deposit),
            SundaeV3Action::Withdraw { .. } => Some(OrderType::Withdraw),
            SundaeV3Action::Donate { .. } => None,
        }
    }
}

/// Protocol settings datum. Only the fee fields are interpreted.
#[derive(Debug, Clone, PartialEq)]
pub struct SundaeV3Settings {
    pub settings_admin: Value,
    pub metadata_admin: FullAddress,
    pub treasury_admin: Value,
    pub treasury_address: FullAddress,
    pub treasury_allowance: Vec<i128>,
    pub authorized_scoopers: Value,
    pub authorized_staking_keys: Value,
    pub base_fee: i128,
    pub simple_fee: i128,
    pub strategy_fee: i128,
    pub pool_creation_fee: i128,
    pub extensions: Value,
}

impl SundaeV3Settings {
    pub fn batcher_fee(&self) -> i128 {
        self.base_fee + self.simple_fee
    }
}

impl FromPlutus for SundaeV3Settings {
    fn from_plutus(value: &Value) -> Result<Self, DatumError> {
        let mut f = Fields::expect(value, "SundaeV3Settings", 0, 12)?;
        Ok(Self {
            settings_admin: f.value()?.clone(),
            metadata_admin: f.next()?,
            treasury_admin: f.value()?.clone(),
            treasury_address: f.next()?,
            treasury_allowance: f.int_list()?,
            authorized_scoopers: f.value()?.clone(),
            authorized_staking_keys: f.value()?.clone(),
            base_fee: f.int()?,
            simple_fee: f.int()?,
            strategy_fee: f.int()?,
            pool_creation_fee: f.int()?,
            extensions: f.value()?.clone(),
        })
    }
}

impl ToPlutus for SundaeV3Settings {
    fn to_plutus(&self) -> Value {
        constr_value(
            0,
            vec![
                self.settings_admin.clone(),
                self.metadata_admin.to_plutus(),
                self.treasury_admin.clone(),
                self.treasury_address.to_plutus(),
                Value::Array(self.treasury_allowance.iter().copied().map(int_value).collect()),
                self.authorized_scoopers.clone(),
                self.authorized_staking_keys.clone(),
                int_value(self.base_fee),
                int_value(self.simple_fee),
                int_value(self.strategy_fee),
                int_value(self.pool_creation_fee),
                self.extensions.clone(),
            ],
        )
    }
}

async fn fetch_batcher_fee(backend: &dyn Backend) -> anyhow::Result<i128> {
    let reference = backend
        .get_datum_from_address(SETTINGS_ADDRESS, Some(SETTINGS_TOKEN))
        .await?
        .ok_or_else(|| anyhow!("{}: settings UTxO not found", DEX_NAME))?;
    let cbor = reference
        .datum_cbor
        .ok_or_else(|| anyhow!("{}: settings UTxO carries no datum", DEX_NAME))?;
    Ok(SundaeV3Settings::from_cbor(&cbor)?.batcher_fee())
}

/// Current batcher fee from the settings UTxO, read again once `cache` is stale.
pub async fn load_batcher_fee(
    cache: &RegistryCache<i128>,
    backend: &dyn Backend,
) -> anyhow::Result<i128> {
    cache.get_or_refresh(|| fetch_batcher_fee(backend)).await
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SundaeSwapV3;

fn not_a_pool_without_nft(result: Result<(), PoolError>) -> Result<(), PoolError> {
    match result {
        Err(PoolError::InvalidPool(reason)) => Err(PoolError::not_a_pool(reason)),
        other => other,
    }
}

impl PoolProtocol for SundaeSwapV3 {
    type Datum = SundaeV3PoolDatum;

    fn descriptor(&self) -> &'static PoolDescriptor {
        &DESCRIPTOR
    }

    fn supports_fast_path(&self) -> bool {
        true
    }

    fn fast_path(&self, draft: &mut PoolDraft, datum: &SundaeV3PoolDatum) -> Result<(), PoolError> {
        draft.fee = VolumeFee::Flat(datum.bid_fee);
        Ok(())
    }

    fn extract_pool_nft(&self, draft: &mut PoolDraft) -> Result<(), PoolError> {
        not_a_pool_without_nft(crate::state::pool::extract_pool_nft(&DESCRIPTOR, draft))
    }

    fn post_init(&self, draft: &mut PoolDraft, datum: &SundaeV3PoolDatum) -> Result<(), PoolError> {
        if draft.assets.len() == 2 {
            let unit = draft.unit_at(0)?;
            let reserve = draft.assets.get(&unit).unwrap_or(0);
            draft.assets.insert(unit, reserve - datum.protocol_fees);
        }
        draft.fee = VolumeFee::Split([datum.bid_fee, datum.ask_fee]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dex::test_record;
    use crate::state::PoolBuilder;
    use crate::state::PoolState;

    const TOKEN_POLICY: &str = "8a1cfae21368b8bebbbed9800fec304e95cce39a2a57dc35e2e3ebaa";
    const TOKEN_NAME: &str = "4d494c4b";
    const IDENT: &str = "b1a2c3d4e5f60718293a4b5c6d7e8f90a1b2c3d4e5f60718293a4b5c";

    fn token() -> String {
        format!("{}{}", TOKEN_POLICY, TOKEN_NAME)
    }

    fn nft() -> String {
        format!("{}000de140{}", POOL_POLICY, IDENT)
    }

    fn datum() -> SundaeV3PoolDatum {
        SundaeV3PoolDatum {
            ident: hex::decode(IDENT).unwrap(),
            assets: [
                (Vec::new(), Vec::new()),
                (hex::decode(TOKEN_POLICY).unwrap(), hex::decode(TOKEN_NAME).unwrap()),
            ],
            circulating_lp: 700_000_000,
            bid_fee: 30,
            ask_fee: 50,
            fee_manager: None,
            market_open: 0,
            protocol_fees: 3_000_000,
        }
    }

    fn build() -> PoolState {
        let record = test_record(
            datum().to_cbor().unwrap(),
            vec![(LOVELACE, 1_003_000_000), (token().as_str(), 500_000_000), (nft().as_str(), 1)],
        );
        PoolState::build(&SundaeSwapV3, record).unwrap()
    }

    #[test]
    fn test_protocol_fees_removed_and_split_fee() {
        let pool = build();
        assert_eq!(pool.reserve_a(), 1_000_000_000);
        assert_eq!(pool.fee, VolumeFee::Split([30, 50]));
        assert_eq!(pool.pool_id, nft());
        let sell_ada = pool.get_amount_out(&AssetBag::lovelace(1_000_000)).unwrap();
        assert_eq!(sell_ada.quantity(), 498_003);
        let sell_token = pool.get_amount_out(&AssetBag::single(token(), 1_000_000)).unwrap();
        assert_eq!(sell_token.quantity(), 1_986_047);
    }

    #[test]
    fn test_batcher_fee_from_settings() {
        let pool = build();
        assert_eq!(pool.batcher_fee(None).get(LOVELACE), Some(1_000_000));
        let record = test_record(
            datum().to_cbor().unwrap(),
            vec![(LOVELACE, 1_003_000_000), (token().as_str(), 500_000_000), (nft().as_str(), 1)],
        );
        let pool = PoolBuilder::new(&SundaeSwapV3, record)
            .settings_fee(Some(1_280_000))
            .build()
            .unwrap();
        assert_eq!(pool.batcher_fee(None).get(LOVELACE), Some(1_280_000));
    }

    #[test]
    fn test_fast_path_takes_bid_fee() {
        let known = build().known().unwrap();
        let record = test_record(
            datum().to_cbor().unwrap(),
            vec![(LOVELACE, 1_000_000_000), (token().as_str(), 500_000_000), (nft().as_str(), 1)],
        );
        let pool = PoolBuilder::new(&SundaeSwapV3, record).known(known).build().unwrap();
        assert_eq!(pool.fee, VolumeFee::Flat(30));
        assert_eq!(pool.reserve_a(), 1_000_000_000);
    }

    #[test]
    fn test_fee_outside_basis_points_is_invalid() {
        let (token, nft) = (token(), nft());
        let assets =
            vec![(LOVELACE, 1_003_000_000), (token.as_str(), 500_000_000), (nft.as_str(), 1)];
        let mut d = datum();
        d.ask_fee = 10_000;
        let record = test_record(d.to_cbor().unwrap(), assets.clone());
        let err = PoolState::build(&SundaeSwapV3, record).unwrap_err();
        assert!(matches!(err, PoolError::InvalidPool(_)));

        let known = build().known().unwrap();
        let mut d = datum();
        d.bid_fee = -1;
        let record = test_record(d.to_cbor().unwrap(), assets);
        let err = PoolBuilder::new(&SundaeSwapV3, record).known(known).build().unwrap_err();
        assert!(matches!(err, PoolError::InvalidPool(_)));
    }

    #[test]
    fn test_order_datum() {
        let owner = FullAddress {
            payment: PartAddress::Key(vec![1; 28]),
            stake: Some(PartAddress::Key(vec![2; 28])),
        };
        let order = SundaeV3OrderDatum::swap(
            hex::decode(IDENT).unwrap(),
            owner,
            &AssetBag::lovelace(10_000_000),
            &AssetBag::single(token(), 4_000_000),
            1_000_000,
        )
        .unwrap();
        let decoded = SundaeV3OrderDatum::from_cbor(&order.to_cbor().unwrap()).unwrap();
        assert_eq!(decoded, order);
        assert_eq!(decoded.owner, PartAddress::Key(vec![2; 28]));
        assert_eq!(decoded.requested_amount().get(&token()), Some(4_000_000));
        assert_eq!(decoded.order_type(), Some(OrderType::Swap));
        match &decoded.action {
            SundaeV3Action::Swap { offer, .. } => assert_eq!(offer.unit(), LOVELACE),
            other => panic!("unexpected action {:?}", other),
        }
    }

    #[test]
    fn test_settings_fee() {
        let admin = FullAddress {
            payment: PartAddress::Script(vec![5; 28]),
            stake: None,
        };
        let settings = SundaeV3Settings {
            settings_admin: constr_value(0, vec![]),
            metadata_admin: admin.clone(),
            treasury_admin: constr_value(0, vec![]),
            treasury_address: admin,
            treasury_allowance: vec![1, 10],
            authorized_scoopers: constr_value(1, vec![]),
            authorized_staking_keys: Value::Array(vec![]),
            base_fee: 332_000,
            simple_fee: 168_000,
            strategy_fee: 168_000,
            pool_creation_fee: 0,
            extensions: constr_value(0, vec![]),
        };
        let decoded = SundaeV3Settings::from_cbor(&settings.to_cbor().unwrap()).unwrap();
        assert_eq!(decoded, settings);
        assert_eq!(decoded.batcher_fee(), 500_000);
    }
}
