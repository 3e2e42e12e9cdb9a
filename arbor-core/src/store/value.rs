//! Attribute Values
//!
//! An entity's attributes form a plain data tree. Composite nodes are
//! reference counted and copy-on-write: reading a subtree is a cheap
//! clone, and a write clones only the containers along the written path.
//! Two composites that share an allocation are trivially identical, which
//! the diff engine uses as its fast path.

use std::fmt;
use std::rc::Rc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::warn;

use super::path::parse_index;
use super::Entity;
use crate::error::{Error, Result};

/// Keyed container; iteration follows insertion order.
pub type Map = IndexMap<String, Value>;

/// A node in an entity's attribute tree.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
    /// Absent or empty.
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    /// A point in time, compared by instant.
    Date(DateTime<Utc>),
    /// Ordered sequence.
    Seq(Rc<Vec<Value>>),
    /// Keyed map.
    Map(Rc<Map>),
    /// A nested entity. Queries through this slot are delegated to it.
    Entity(Entity),
}

impl Value {
    pub fn seq<I, V>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Value::Seq(Rc::new(items.into_iter().map(Into::into).collect()))
    }

    pub fn map<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Value::Map(Rc::new(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        ))
    }

    /// Parse JSON text into a value.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let json: serde_json::Value = serde_json::from_str(json)?;
        Ok(json.into())
    }

    /// The empty container implied by the next path segment: a sequence
    /// for a numeric segment, a map otherwise.
    pub fn container_for(segment: &str) -> Self {
        if parse_index(segment).is_some() {
            Value::Seq(Rc::default())
        } else {
            Value::Map(Rc::default())
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_composite(&self) -> bool {
        matches!(self, Value::Seq(_) | Value::Map(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_seq(&self) -> Option<&[Value]> {
        match self {
            Value::Seq(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Map> {
        match self {
            Value::Map(map) => Some(&**map),
            _ => None,
        }
    }

    pub fn as_entity(&self) -> Option<&Entity> {
        match self {
            Value::Entity(entity) => Some(entity),
            _ => None,
        }
    }

    /// Loose truthiness, used by `toggle`.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    /// Read one path segment. Sequences and strings answer `length`.
    /// Anything missing reads as `Null`.
    pub fn child(&self, segment: &str) -> Value {
        match self {
            Value::Seq(items) if segment == "length" => Value::Number(items.len() as f64),
            Value::String(s) if segment == "length" => Value::Number(s.chars().count() as f64),
            _ => self.child_ref(segment).cloned().unwrap_or_default(),
        }
    }

    /// Borrow a stored child, without synthesized segments.
    pub fn child_ref(&self, segment: &str) -> Option<&Value> {
        match self {
            Value::Seq(items) => parse_index(segment).and_then(|i| items.get(i)),
            Value::Map(map) => map.get(segment),
            _ => None,
        }
    }

    /// Walk `segments` through plain data. Nested entities are opaque here.
    pub fn lookup(&self, segments: &[String]) -> Value {
        let mut current = self.clone();
        for segment in segments {
            current = current.child(segment);
            if current.is_null() {
                break;
            }
        }
        current
    }

    /// Identity in the sense of "nothing could have changed": equal
    /// scalars, the same composite allocation, or the same entity.
    pub(crate) fn identical(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Seq(a), Value::Seq(b)) => Rc::ptr_eq(a, b),
            (Value::Map(a), Value::Map(b)) => Rc::ptr_eq(a, b),
            (Value::Entity(a), Value::Entity(b)) => a == b,
            (a, b) if a.is_composite() || b.is_composite() => false,
            (a, b) => a == b,
        }
    }

    /// Write `value` at `segments`, creating missing containers and
    /// replacing primitives in the way. `None` removes the slot.
    pub(crate) fn set_path(&mut self, segments: &[String], value: Option<Value>) {
        let Some((last, parents)) = segments.split_last() else {
            *self = value.unwrap_or_default();
            return;
        };
        let mut slot = self;
        for segment in parents {
            slot = slot.slot_mut(segment);
        }
        match value {
            Some(value) => *slot.slot_mut(last) = value,
            None => slot.remove_child(last),
        }
    }

    fn slot_mut(&mut self, segment: &str) -> &mut Value {
        if let Value::Seq(items) = self {
            if parse_index(segment).is_none() {
                warn!(segment, "keyed write into a sequence; converting it to a map");
                let converted = items
                    .iter()
                    .enumerate()
                    .map(|(i, v)| (i.to_string(), v.clone()))
                    .collect();
                *self = Value::Map(Rc::new(converted));
            }
        }
        if !self.is_composite() {
            *self = Value::container_for(segment);
        }
        match self {
            Value::Seq(items) => {
                let items = Rc::make_mut(items);
                let index = parse_index(segment).unwrap_or(items.len());
                if index >= items.len() {
                    items.resize(index + 1, Value::Null);
                }
                &mut items[index]
            }
            Value::Map(map) => Rc::make_mut(map).entry(segment.to_owned()).or_default(),
            other => other,
        }
    }

    fn remove_child(&mut self, segment: &str) {
        match self {
            Value::Seq(items) => {
                if let Some(index) = parse_index(segment).filter(|i| *i < items.len()) {
                    Rc::make_mut(items)[index] = Value::Null;
                }
            }
            Value::Map(map) => {
                if map.contains_key(segment) {
                    Rc::make_mut(map).shift_remove(segment);
                }
            }
            _ => {}
        }
    }

    /// Check that a value is plain, live data.
    pub(crate) fn validate(&self, path: &str) -> Result<()> {
        match self {
            Value::Number(n) if !n.is_finite() => Err(Error::NonFiniteNumber {
                path: path.to_string(),
            }),
            Value::Entity(entity) if entity.is_destroyed() => Err(Error::DestroyedEntity {
                path: path.to_string(),
                entity: entity.id(),
            }),
            Value::Seq(items) => items
                .iter()
                .enumerate()
                .try_for_each(|(i, item)| item.validate(&join(path, &i.to_string()))),
            Value::Map(map) => map
                .iter()
                .try_for_each(|(k, item)| item.validate(&join(path, k))),
            _ => Ok(()),
        }
    }

    /// Convert to JSON. Nested entities contribute their current data.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

fn join(path: &str, segment: &str) -> String {
    if path.is_empty() {
        segment.to_string()
    } else {
        format!("{path}.{segment}")
    }
}

// ----------------------------------------------------------------------------
// Conversions
// ----------------------------------------------------------------------------

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

macro_rules! from_number {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(n: $t) -> Self {
                    Value::Number(n as f64)
                }
            }
        )*
    };
}

from_number!(f64, f32, i32, i64, u32, u64, usize);

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(d: DateTime<Utc>) -> Self {
        Value::Date(d)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Seq(Rc::new(items))
    }
}

impl From<Map> for Value {
    fn from(map: Map) -> Self {
        Value::Map(Rc::new(map))
    }
}

impl From<Entity> for Value {
    fn from(entity: Entity) -> Self {
        Value::Entity(entity)
    }
}

impl From<&Entity> for Value {
    fn from(entity: &Entity) -> Self {
        Value::Entity(entity.clone())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => n.as_f64().map_or(Value::Null, Value::Number),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => Value::seq(items),
            serde_json::Value::Object(map) => Value::map(map),
        }
    }
}

impl PartialEq<&str> for Value {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == Some(*other)
    }
}

impl PartialEq<f64> for Value {
    fn eq(&self, other: &f64) -> bool {
        self.as_f64() == Some(*other)
    }
}

impl PartialEq<i32> for Value {
    fn eq(&self, other: &i32) -> bool {
        self.as_f64() == Some(f64::from(*other))
    }
}

impl PartialEq<bool> for Value {
    fn eq(&self, other: &bool) -> bool {
        self.as_bool() == Some(*other)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => f.write_str(s),
            Value::Date(d) => write!(f, "{}", d.to_rfc3339()),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

// ----------------------------------------------------------------------------
// Serde
// ----------------------------------------------------------------------------

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 => {
                serializer.serialize_i64(*n as i64)
            }
            Value::Number(n) => serializer.serialize_f64(*n),
            Value::String(s) => serializer.serialize_str(s),
            Value::Date(d) => serializer.serialize_str(&d.to_rfc3339()),
            Value::Seq(items) => serializer.collect_seq(items.iter()),
            Value::Map(map) => serializer.collect_map(map.iter()),
            Value::Entity(entity) => entity.read_silent("").serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from)
    }
}
