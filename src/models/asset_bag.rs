use std::collections::HashSet;
use std::fmt;
use std::ops::{Add, Sub};

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::AssetBagError;

/// Unit string of the native currency.
pub const LOVELACE: &str = "lovelace";

/// Ordered mapping of asset unit to quantity.
///
/// Constructors and arithmetic produce the canonical order: `lovelace` first,
/// remaining units lexicographic. Pool normalization may reorder entries in
/// place (`pop`, `insert`, `move_to_end`), and indexed access always follows
/// the stored order.
///
/// Equality is by value: a unit that is absent equals a unit held at zero.
#[derive(Debug, Clone, Default)]
pub struct AssetBag {
    entries: Vec<(String, i128)>,
}

fn canonical_key(unit: &str) -> (bool, &str) {
    (unit != LOVELACE, unit)
}

impl AssetBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from (unit, quantity) pairs, rejecting repeated units.
    pub fn from_pairs<I, S>(pairs: I) -> Result<Self, AssetBagError>
    where
        I: IntoIterator<Item = (S, i128)>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let mut entries = Vec::new();
        for (unit, quantity) in pairs {
            let unit = unit.into();
            if !seen.insert(unit.clone()) {
                return Err(AssetBagError::DuplicateUnit(unit));
            }
            entries.push((unit, quantity));
        }
        let mut bag = Self { entries };
        bag.canonicalize();
        Ok(bag)
    }

    pub fn single(unit: impl Into<String>, quantity: i128) -> Self {
        Self {
            entries: vec![(unit.into(), quantity)],
        }
    }

    pub fn lovelace(quantity: i128) -> Self {
        Self::single(LOVELACE, quantity)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn unit(&self, index: usize) -> Result<&str, AssetBagError> {
        self.entries
            .get(index)
            .map(|(u, _)| u.as_str())
            .ok_or(AssetBagError::IndexOutOfRange {
                index,
                len: self.entries.len(),
            })
    }

    pub fn quantity(&self, index: usize) -> Result<i128, AssetBagError> {
        self.entries
            .get(index)
            .map(|(_, q)| *q)
            .ok_or(AssetBagError::IndexOutOfRange {
                index,
                len: self.entries.len(),
            })
    }

    pub fn get(&self, unit: &str) -> Option<i128> {
        self.entries.iter().find(|(u, _)| u == unit).map(|(_, q)| *q)
    }

    pub fn contains(&self, unit: &str) -> bool {
        self.entries.iter().any(|(u, _)| u == unit)
    }

    pub fn units(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(u, _)| u.as_str())
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (&str, i128)> {
        self.entries.iter().map(|(u, q)| (u.as_str(), *q))
    }

    /// Remove a unit, keeping the relative order of the rest.
    pub fn pop(&mut self, unit: &str) -> Option<i128> {
        let pos = self.entries.iter().position(|(u, _)| u == unit)?;
        Some(self.entries.remove(pos).1)
    }

    /// Overwrite the quantity of a held unit, or append a new one at the end.
    pub fn insert(&mut self, unit: impl Into<String>, quantity: i128) {
        let unit = unit.into();
        match self.entries.iter_mut().find(|(u, _)| *u == unit) {
            Some(entry) => entry.1 = quantity,
            None => self.entries.push((unit, quantity)),
        }
    }

    /// Merge another bag in insertion order, overwriting shared units.
    pub fn extend(&mut self, other: AssetBag) {
        for (unit, quantity) in other.entries {
            self.insert(unit, quantity);
        }
    }

    pub fn move_to_end(&mut self, unit: &str) {
        if let Some(quantity) = self.pop(unit) {
            self.entries.push((unit.to_string(), quantity));
        }
    }

    pub fn canonicalize(&mut self) {
        self.entries
            .sort_by(|(a, _), (b, _)| canonical_key(a).cmp(&canonical_key(b)));
    }

    /// Units that are not the native currency.
    pub fn non_native(&self) -> Vec<&str> {
        self.units().filter(|u| *u != LOVELACE).collect()
    }

    fn combine(&self, other: &AssetBag, sign: i128) -> AssetBag {
        let mut out = self.clone();
        for (unit, quantity) in &other.entries {
            let current = out.get(unit).unwrap_or(0);
            out.insert(unit.clone(), current + sign * quantity);
        }
        out.canonicalize();
        out
    }
}

impl PartialEq for AssetBag {
    fn eq(&self, other: &Self) -> bool {
        self.iter()
            .all(|(u, q)| other.get(u).unwrap_or(0) == q)
            && other.iter().all(|(u, q)| self.get(u).unwrap_or(0) == q)
    }
}

impl Eq for AssetBag {}

impl Add<&AssetBag> for &AssetBag {
    type Output = AssetBag;

    fn add(self, rhs: &AssetBag) -> AssetBag {
        self.combine(rhs, 1)
    }
}

impl Add for AssetBag {
    type Output = AssetBag;

    fn add(self, rhs: AssetBag) -> AssetBag {
        self.combine(&rhs, 1)
    }
}

impl Sub<&AssetBag> for &AssetBag {
    type Output = AssetBag;

    fn sub(self, rhs: &AssetBag) -> AssetBag {
        self.combine(rhs, -1)
    }
}

impl Sub for AssetBag {
    type Output = AssetBag;

    fn sub(self, rhs: AssetBag) -> AssetBag {
        self.combine(&rhs, -1)
    }
}

impl fmt::Display for AssetBag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (unit, quantity)) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", unit, quantity)?;
        }
        write!(f, "}}")
    }
}

impl Serialize for AssetBag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (unit, quantity) in &self.entries {
            map.serialize_entry(unit, &quantity.to_string())?;
        }
        map.end()
    }
}

/// Indexers report quantities either as JSON numbers or as decimal strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum Quantity {
    Num(i64),
    Str(String),
}

impl Quantity {
    fn into_i128<E: serde::de::Error>(self) -> Result<i128, E> {
        match self {
            Quantity::Num(n) => Ok(n as i128),
            Quantity::Str(s) => s.parse().map_err(E::custom),
        }
    }
}

impl<'de> Deserialize<'de> for AssetBag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct BagVisitor;

        impl<'de> Visitor<'de> for BagVisitor {
            type Value = AssetBag;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of asset unit to quantity")
            }

            fn visit_map<M: MapAccess<'de>>(self, mut access: M) -> Result<AssetBag, M::Error> {
                let mut pairs = Vec::new();
                while let Some((unit, quantity)) = access.next_entry::<String, Quantity>()? {
                    pairs.push((unit, quantity.into_i128()?));
                }
                AssetBag::from_pairs(pairs).map_err(serde::de::Error::custom)
            }
        }

        deserializer.deserialize_map(BagVisitor)
    }
}
