/// Datum records shared across protocols: asset classes, addresses, receiver
/// datums, booleans and rationals.
use ciborium::value::Value;

use super::cbor::{bytes_value, constr, constr_value, int_value, FromPlutus, Fields, ToPlutus};
use crate::error::DatumError;
use crate::models::{AssetBag, LOVELACE};
use crate::utils::{shelley_address, Credential, CREDENTIAL_LEN};

/// `(policy, name)` constructor 0. Both empty means the native currency.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct AssetClass {
    pub policy: Vec<u8>,
    pub name: Vec<u8>,
}

impl AssetClass {
    pub fn lovelace() -> Self {
        Self::default()
    }

    /// Parse a unit string (`lovelace` or policy hex followed by name hex).
    pub fn from_unit(unit: &str) -> Result<Self, DatumError> {
        if unit == LOVELACE || unit.is_empty() {
            return Ok(Self::lovelace());
        }
        let raw = hex::decode(unit)?;
        if raw.len() < CREDENTIAL_LEN {
            return Err(DatumError::Kind {
                expected: "policy id plus asset name",
                found: unit.to_string(),
            });
        }
        Ok(Self {
            policy: raw[..CREDENTIAL_LEN].to_vec(),
            name: raw[CREDENTIAL_LEN..].to_vec(),
        })
    }

    pub fn is_lovelace(&self) -> bool {
        self.policy.is_empty() && self.name.is_empty()
    }

    pub fn unit(&self) -> String {
        if self.is_lovelace() {
            LOVELACE.to_string()
        } else {
            format!("{}{}", hex::encode(&self.policy), hex::encode(&self.name))
        }
    }

    pub fn with_quantity(&self, quantity: i128) -> AssetBag {
        AssetBag::single(self.unit(), quantity)
    }
}

impl FromPlutus for AssetClass {
    fn from_plutus(value: &Value) -> Result<Self, DatumError> {
        let mut f = Fields::expect(value, "AssetClass", 0, 2)?;
        Ok(Self {
            policy: f.bytes()?,
            name: f.bytes()?,
        })
    }
}

impl ToPlutus for AssetClass {
    fn to_plutus(&self) -> Value {
        constr_value(0, vec![bytes_value(&self.policy), bytes_value(&self.name)])
    }
}

/// A payment or stake credential: key hash (0) or script hash (1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartAddress {
    Key(Vec<u8>),
    Script(Vec<u8>),
}

impl PartAddress {
    pub fn credential(&self) -> Credential<'_> {
        match self {
            PartAddress::Key(h) => Credential::Key(h),
            PartAddress::Script(h) => Credential::Script(h),
        }
    }
}

impl FromPlutus for PartAddress {
    fn from_plutus(value: &Value) -> Result<Self, DatumError> {
        let (alt, items) = constr(value)?;
        let mut f = Fields::from_items(items, "PartAddress", 1)?;
        match alt {
            0 => Ok(PartAddress::Key(f.bytes()?)),
            1 => Ok(PartAddress::Script(f.bytes()?)),
            found => Err(DatumError::UnknownVariant {
                schema: "PartAddress",
                found,
            }),
        }
    }
}

impl ToPlutus for PartAddress {
    fn to_plutus(&self) -> Value {
        match self {
            PartAddress::Key(h) => constr_value(0, vec![bytes_value(h)]),
            PartAddress::Script(h) => constr_value(1, vec![bytes_value(h)]),
        }
    }
}

/// On-chain address record: payment credential plus optional staking part,
/// where the staking part is wrapped twice (`StakingHash(StakeCredential)`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FullAddress {
    pub payment: PartAddress,
    pub stake: Option<PartAddress>,
}

impl FullAddress {
    pub fn to_address(&self) -> Result<String, DatumError> {
        shelley_address(
            self.payment.credential(),
            self.stake.as_ref().map(PartAddress::credential),
        )
        .map_err(|e| DatumError::Address(e.to_string()))
    }
}

impl FromPlutus for FullAddress {
    fn from_plutus(value: &Value) -> Result<Self, DatumError> {
        let mut f = Fields::expect(value, "FullAddress", 0, 2)?;
        let payment = f.next()?;
        let stake_value = f.value()?;
        let stake = match constr(stake_value)? {
            (1, items) if items.is_empty() => None,
            (0, _) => {
                let mut outer = Fields::expect(stake_value, "StakingHash", 0, 1)?;
                let mut inner = Fields::expect(outer.value()?, "StakeCredential", 0, 1)?;
                Some(inner.next()?)
            }
            (found, _) => {
                return Err(DatumError::UnknownVariant {
                    schema: "FullAddress.stake",
                    found,
                })
            }
        };
        Ok(Self { payment, stake })
    }
}

impl ToPlutus for FullAddress {
    fn to_plutus(&self) -> Value {
        let stake = match &self.stake {
            Some(part) => constr_value(0, vec![constr_value(0, vec![part.to_plutus()])]),
            None => constr_value(1, vec![]),
        };
        constr_value(0, vec![self.payment.to_plutus(), stake])
    }
}

/// Hash of a datum the receiver expects, constructor 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiverDatum {
    pub datum_hash: Vec<u8>,
}

impl FromPlutus for ReceiverDatum {
    fn from_plutus(value: &Value) -> Result<Self, DatumError> {
        let mut f = Fields::expect(value, "ReceiverDatum", 0, 1)?;
        Ok(Self {
            datum_hash: f.bytes()?,
        })
    }
}

impl ToPlutus for ReceiverDatum {
    fn to_plutus(&self) -> Value {
        constr_value(0, vec![bytes_value(&self.datum_hash)])
    }
}

/// Output datum attached to a payout: none, by hash, or inline.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputDatum {
    NoDatum,
    Hash(Vec<u8>),
    Inline(Value),
}

impl FromPlutus for OutputDatum {
    fn from_plutus(value: &Value) -> Result<Self, DatumError> {
        let (alt, items) = constr(value)?;
        match alt {
            0 => {
                Fields::from_items(items, "OutputDatum.NoDatum", 0)?;
                Ok(OutputDatum::NoDatum)
            }
            1 => Ok(OutputDatum::Hash(
                Fields::from_items(items, "OutputDatum.Hash", 1)?.bytes()?,
            )),
            2 => Ok(OutputDatum::Inline(
                Fields::from_items(items, "OutputDatum.Inline", 1)?.value()?.clone(),
            )),
            found => Err(DatumError::UnknownVariant {
                schema: "OutputDatum",
                found,
            }),
        }
    }
}

impl ToPlutus for OutputDatum {
    fn to_plutus(&self) -> Value {
        match self {
            OutputDatum::NoDatum => constr_value(0, vec![]),
            OutputDatum::Hash(h) => constr_value(1, vec![bytes_value(h)]),
            OutputDatum::Inline(v) => constr_value(2, vec![v.clone()]),
        }
    }
}

/// Swap direction relative to the pool's asset order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    AtoB,
    BtoA,
}

impl FromPlutus for Direction {
    fn from_plutus(value: &Value) -> Result<Self, DatumError> {
        match constr(value)? {
            (0, []) => Ok(Direction::AtoB),
            (1, []) => Ok(Direction::BtoA),
            (found, _) => Err(DatumError::UnknownVariant {
                schema: "Direction",
                found,
            }),
        }
    }
}

impl ToPlutus for Direction {
    fn to_plutus(&self) -> Value {
        match self {
            Direction::AtoB => constr_value(0, vec![]),
            Direction::BtoA => constr_value(1, vec![]),
        }
    }
}

/// Plutus booleans: False is constructor 0, True is constructor 1.
impl FromPlutus for bool {
    fn from_plutus(value: &Value) -> Result<Self, DatumError> {
        match constr(value)? {
            (0, items) if items.is_empty() => Ok(false),
            (1, items) if items.is_empty() => Ok(true),
            (found, _) => Err(DatumError::UnknownVariant {
                schema: "Bool",
                found,
            }),
        }
    }
}

impl ToPlutus for bool {
    fn to_plutus(&self) -> Value {
        constr_value(*self as u64, vec![])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rational {
    pub numerator: i128,
    pub denominator: i128,
}

impl FromPlutus for Rational {
    fn from_plutus(value: &Value) -> Result<Self, DatumError> {
        let mut f = Fields::expect(value, "Rational", 0, 2)?;
        Ok(Self {
            numerator: f.int()?,
            denominator: f.int()?,
        })
    }
}

impl ToPlutus for Rational {
    fn to_plutus(&self) -> Value {
        constr_value(0, vec![int_value(self.numerator), int_value(self.denominator)])
    }
}

/// A single-field constructor 0 carrying an integer, used for optional amounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WrappedInt(pub i128);

impl FromPlutus for WrappedInt {
    fn from_plutus(value: &Value) -> Result<Self, DatumError> {
        Ok(Self(Fields::expect(value, "WrappedInt", 0, 1)?.int()?))
    }
}

impl ToPlutus for WrappedInt {
    fn to_plutus(&self) -> Value {
        constr_value(0, vec![int_value(self.0)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLICY: &str = "29d222ce763455e3d7a09a665ce554f00ac89d2e99a1a83d267170c6";

    #[test]
    fn test_asset_class_units() {
        assert_eq!(AssetClass::lovelace().unit(), LOVELACE);
        let unit = format!("{}4d494e", POLICY);
        let class = AssetClass::from_unit(&unit).unwrap();
        assert_eq!(class.name, b"MIN".to_vec());
        assert_eq!(class.unit(), unit);
        let decoded = AssetClass::from_plutus(&class.to_plutus()).unwrap();
        assert_eq!(decoded, class);
        assert!(AssetClass::from_unit("abcd").is_err());
    }

    #[test]
    fn test_full_address_with_stake() {
        let addr = FullAddress {
            payment: PartAddress::Key(vec![1; 28]),
            stake: Some(PartAddress::Key(vec![2; 28])),
        };
        let decoded = FullAddress::from_plutus(&addr.to_plutus()).unwrap();
        assert_eq!(decoded, addr);
        assert!(decoded.to_address().unwrap().starts_with("addr1q"));
        let enterprise = FullAddress {
            payment: PartAddress::Script(vec![3; 28]),
            stake: None,
        };
        let decoded = FullAddress::from_plutus(&enterprise.to_plutus()).unwrap();
        assert_eq!(decoded.stake, None);
        assert!(decoded.to_address().unwrap().starts_with("addr1w"));
    }

    #[test]
    fn test_bool_and_output_datum() {
        assert!(bool::from_plutus(&true.to_plutus()).unwrap());
        assert!(!bool::from_plutus(&false.to_plutus()).unwrap());
        let datum = OutputDatum::Hash(vec![9; 32]);
        assert_eq!(OutputDatum::from_plutus(&datum.to_plutus()).unwrap(), datum);
        assert!(OutputDatum::from_plutus(&constr_value(5, vec![])).is_err());
    }
}
