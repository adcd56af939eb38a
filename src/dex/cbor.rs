/// Plutus data codec helpers shared by every protocol schema.
///
/// Plutus constructors are CBOR-tagged values:
///   alternatives 0..=6    -> Tag(121 + alt, [fields...])
///   alternatives 7..=127  -> Tag(1280 + alt - 7, [fields...])
///   anything else         -> Tag(102, [alt, [fields...]])
use ciborium::value::{Integer, Value};

use crate::error::DatumError;

const SMALL_CONSTR_BASE: u64 = 121;
const LARGE_CONSTR_BASE: u64 = 1280;
const GENERAL_CONSTR_TAG: u64 = 102;
const POS_BIGNUM_TAG: u64 = 2;
const NEG_BIGNUM_TAG: u64 = 3;

/// Split a constructor value into its alternative index and fields.
pub fn constr(v: &Value) -> Result<(u64, &[Value]), DatumError> {
    match v {
        Value::Tag(tag, inner) => match (*tag, inner.as_ref()) {
            (t @ 121..=127, Value::Array(fields)) => Ok((t - SMALL_CONSTR_BASE, fields.as_slice())),
            (t @ 1280..=1400, Value::Array(fields)) => {
                Ok((t - LARGE_CONSTR_BASE + 7, fields.as_slice()))
            }
            (GENERAL_CONSTR_TAG, Value::Array(pair)) if pair.len() == 2 => {
                let alt = int(&pair[0])?;
                let alt =
                    u64::try_from(alt).map_err(|_| DatumError::IntegerRange(alt.to_string()))?;
                match &pair[1] {
                    Value::Array(fields) => Ok((alt, fields.as_slice())),
                    other => Err(DatumError::kind("constructor field array", other)),
                }
            }
            _ => Err(DatumError::kind("Plutus constructor", v)),
        },
        _ => Err(DatumError::kind("Plutus constructor", v)),
    }
}

/// Build a constructor value using the compact tag for the alternative.
pub fn constr_value(alt: u64, fields: Vec<Value>) -> Value {
    match alt {
        0..=6 => Value::Tag(SMALL_CONSTR_BASE + alt, Box::new(Value::Array(fields))),
        7..=127 => Value::Tag(LARGE_CONSTR_BASE + alt - 7, Box::new(Value::Array(fields))),
        _ => Value::Tag(
            GENERAL_CONSTR_TAG,
            Box::new(Value::Array(vec![int_value(alt as i128), Value::Array(fields)])),
        ),
    }
}

pub fn int(v: &Value) -> Result<i128, DatumError> {
    match v {
        Value::Integer(i) => Ok(i128::from(*i)),
        Value::Tag(POS_BIGNUM_TAG, inner) => bignum(inner).map(|n| n as i128),
        Value::Tag(NEG_BIGNUM_TAG, inner) => bignum(inner).map(|n| -1 - n as i128),
        _ => Err(DatumError::kind("integer", v)),
    }
}

fn bignum(inner: &Value) -> Result<u128, DatumError> {
    let bytes = match inner {
        Value::Bytes(b) => b,
        other => return Err(DatumError::kind("bignum bytes", other)),
    };
    if bytes.len() > 15 {
        return Err(DatumError::IntegerRange(hex::encode(bytes)));
    }
    Ok(bytes.iter().fold(0u128, |acc, b| (acc << 8) | *b as u128))
}

pub fn int_value(n: i128) -> Value {
    match Integer::try_from(n) {
        Ok(i) => Value::Integer(i),
        Err(_) => {
            let (tag, magnitude) = if n < 0 {
                (NEG_BIGNUM_TAG, (-1 - n) as u128)
            } else {
                (POS_BIGNUM_TAG, n as u128)
            };
            let bytes: Vec<u8> = magnitude
                .to_be_bytes()
                .into_iter()
                .skip_while(|b| *b == 0)
                .collect();
            Value::Tag(tag, Box::new(Value::Bytes(bytes)))
        }
    }
}

pub fn bytes(v: &Value) -> Result<&[u8], DatumError> {
    match v {
        Value::Bytes(b) => Ok(b.as_slice()),
        _ => Err(DatumError::kind("bytes", v)),
    }
}

pub fn bytes_value(b: &[u8]) -> Value {
    Value::Bytes(b.to_vec())
}

pub fn list(v: &Value) -> Result<&[Value], DatumError> {
    match v {
        Value::Array(items) => Ok(items.as_slice()),
        _ => Err(DatumError::kind("list", v)),
    }
}

pub fn map(v: &Value) -> Result<&[(Value, Value)], DatumError> {
    match v {
        Value::Map(entries) => Ok(entries.as_slice()),
        _ => Err(DatumError::kind("map", v)),
    }
}

/// Decode a CBOR hex string into a ciborium Value.
pub fn decode_cbor(cbor_hex: &str) -> Result<Value, DatumError> {
    let raw = hex::decode(cbor_hex)?;
    ciborium::de::from_reader(raw.as_slice()).map_err(|e| DatumError::Cbor(e.to_string()))
}

pub fn encode_cbor(value: &Value) -> Result<String, DatumError> {
    let mut out = Vec::new();
    ciborium::ser::into_writer(value, &mut out).map_err(|e| DatumError::Cbor(e.to_string()))?;
    Ok(hex::encode(out))
}

pub trait FromPlutus: Sized {
    fn from_plutus(value: &Value) -> Result<Self, DatumError>;

    fn from_cbor(cbor_hex: &str) -> Result<Self, DatumError> {
        Self::from_plutus(&decode_cbor(cbor_hex)?)
    }
}

pub trait ToPlutus {
    fn to_plutus(&self) -> Value;

    fn to_cbor(&self) -> Result<String, DatumError> {
        encode_cbor(&self.to_plutus())
    }
}

/// Opaque data kept as-is.
impl FromPlutus for Value {
    fn from_plutus(value: &Value) -> Result<Self, DatumError> {
        Ok(value.clone())
    }
}

impl ToPlutus for Value {
    fn to_plutus(&self) -> Value {
        self.clone()
    }
}

/// `PlutusNone` is the empty constructor 1; anything else is the wrapped value.
impl<T: FromPlutus> FromPlutus for Option<T> {
    fn from_plutus(value: &Value) -> Result<Self, DatumError> {
        match constr(value) {
            Ok((1, fields)) if fields.is_empty() => Ok(None),
            _ => T::from_plutus(value).map(Some),
        }
    }
}

impl<T: ToPlutus> ToPlutus for Option<T> {
    fn to_plutus(&self) -> Value {
        match self {
            Some(inner) => inner.to_plutus(),
            None => constr_value(1, vec![]),
        }
    }
}

/// Sequential reader over the fields of one expected constructor.
pub struct Fields<'a> {
    schema: &'static str,
    items: &'a [Value],
    pos: usize,
}

impl<'a> Fields<'a> {
    /// Check the alternative and the exact field count.
    pub fn expect(
        v: &'a Value,
        schema: &'static str,
        alt: u64,
        count: usize,
    ) -> Result<Self, DatumError> {
        let (found, items) = constr(v)?;
        if found != alt {
            return Err(DatumError::Constructor {
                schema,
                expected: alt,
                found,
            });
        }
        Self::from_items(items, schema, count)
    }

    /// For sum types where the caller has already matched the alternative.
    pub fn from_items(
        items: &'a [Value],
        schema: &'static str,
        count: usize,
    ) -> Result<Self, DatumError> {
        if items.len() != count {
            return Err(DatumError::FieldCount {
                schema,
                expected: count,
                found: items.len(),
            });
        }
        Ok(Self {
            schema,
            items,
            pos: 0,
        })
    }

    pub fn value(&mut self) -> Result<&'a Value, DatumError> {
        let v = self.items.get(self.pos).ok_or(DatumError::FieldCount {
            schema: self.schema,
            expected: self.pos + 1,
            found: self.items.len(),
        })?;
        self.pos += 1;
        Ok(v)
    }

    pub fn int(&mut self) -> Result<i128, DatumError> {
        int(self.value()?)
    }

    pub fn bytes(&mut self) -> Result<Vec<u8>, DatumError> {
        bytes(self.value()?).map(<[u8]>::to_vec)
    }

    pub fn next<T: FromPlutus>(&mut self) -> Result<T, DatumError> {
        T::from_plutus(self.value()?)
    }

    pub fn list_of<T: FromPlutus>(&mut self) -> Result<Vec<T>, DatumError> {
        list(self.value()?)?.iter().map(T::from_plutus).collect()
    }

    pub fn int_list(&mut self) -> Result<Vec<i128>, DatumError> {
        list(self.value()?)?.iter().map(int).collect()
    }
}

pub fn list_value<T: ToPlutus>(items: &[T]) -> Value {
    Value::Array(items.iter().map(ToPlutus::to_plutus).collect())
}

pub fn int_list_value(items: &[i128]) -> Value {
    Value::Array(items.iter().copied().map(int_value).collect())
}
