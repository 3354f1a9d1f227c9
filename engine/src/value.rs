//! Application values stored in object fields.
//!
//! A [`Value`] is what getters return and what mutators accept. It is richer
//! than plain JSON: dates, bytes, geo points, files, object references and
//! relations are first-class and only become tagged JSON at the wire boundary
//! (see [`crate::encode`]).

use crate::{error::Result, Acl, Error, ParseObject, Relation};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Number;
use std::collections::BTreeMap;

/// A field value.
///
/// Equality is strict: plain data compares structurally, while
/// [`Value::Pointer`] compares by instance identity. Use [`Equivalence`]
/// when remote identity is wanted instead.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Date(DateTime<Utc>),
    Bytes(Vec<u8>),
    GeoPoint(GeoPoint),
    File(ParseFile),
    Pointer(ParseObject),
    Relation(Relation),
    Acl(Acl),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

impl Value {
    /// Short type name, used in error reporting.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Bool(_) => "Bool",
            Value::Number(_) => "Number",
            Value::String(_) => "String",
            Value::Date(_) => "Date",
            Value::Bytes(_) => "Bytes",
            Value::GeoPoint(_) => "GeoPoint",
            Value::File(_) => "File",
            Value::Pointer(_) => "Pointer",
            Value::Relation(_) => "Relation",
            Value::Acl(_) => "ACL",
            Value::Array(_) => "Array",
            Value::Object(_) => "Object",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<&Number> {
        match self {
            Value::Number(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_number().and_then(Number::as_i64)
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.as_number().and_then(Number::as_f64)
    }

    pub fn as_array(&self) -> Option<&Vec<Value>> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    /// The referenced object, if this value is a pointer.
    pub fn as_pointer(&self) -> Option<&ParseObject> {
        match self {
            Value::Pointer(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn as_relation(&self) -> Option<&Relation> {
        match self {
            Value::Relation(rel) => Some(rel),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<&DateTime<Utc>> {
        match self {
            Value::Date(d) => Some(d),
            _ => None,
        }
    }

    /// Coerce into a list: null becomes empty, a list stays a list, and any
    /// other value becomes a single-element list.
    pub fn into_list(self) -> Vec<Value> {
        match self {
            Value::Null => Vec::new(),
            Value::Array(items) => items,
            other => vec![other],
        }
    }
}

/// Sum two numbers. Integers stay integral unless the sum overflows.
pub fn add_numbers(a: &Number, b: &Number) -> Result<Number> {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        if let Some(sum) = x.checked_add(y) {
            return Ok(Number::from(sum));
        }
    }
    let x = a.as_f64().unwrap_or_default();
    let y = b.as_f64().unwrap_or_default();
    Number::from_f64(x + y).ok_or_else(|| Error::InvalidNumber(format!("{} + {}", a, b)))
}

/// How two list entries are compared when deduplicating or removing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Equivalence {
    /// Strict equality: same instance for object references, structural
    /// equality for everything else.
    SameInstance,
    /// Both entries reference objects of the same class with the same
    /// server-assigned objectId.
    SameRemoteId,
}

impl Equivalence {
    pub fn matches(self, a: &Value, b: &Value) -> bool {
        match self {
            Equivalence::SameInstance => a == b,
            Equivalence::SameRemoteId => match (a, b) {
                (Value::Pointer(x), Value::Pointer(y)) => x.has_same_remote_id(y),
                _ => false,
            },
        }
    }
}

/// A latitude/longitude pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    /// Create a geo point, validating coordinate ranges.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return Err(Error::InvalidGeoPoint {
                latitude: latitude.to_string(),
                longitude: longitude.to_string(),
            });
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }
}

/// A file previously uploaded to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseFile {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl ParseFile {
    pub fn new(name: impl Into<String>, url: Option<String>) -> Self {
        Self {
            name: name.into(),
            url,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

macro_rules! from_integer {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(n: $t) -> Self {
                Value::Number(Number::from(n))
            }
        })*
    };
}

from_integer!(i8, i16, i32, i64, u8, u16, u32, u64);

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Number::from_f64(n).map_or(Value::Null, Value::Number)
    }
}

impl From<Number> for Value {
    fn from(n: Number) -> Self {
        Value::Number(n)
    }
}

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

impl From<GeoPoint> for Value {
    fn from(p: GeoPoint) -> Self {
        Value::GeoPoint(p)
    }
}

impl From<ParseFile> for Value {
    fn from(f: ParseFile) -> Self {
        Value::File(f)
    }
}

impl From<ParseObject> for Value {
    fn from(obj: ParseObject) -> Self {
        Value::Pointer(obj)
    }
}

impl From<&ParseObject> for Value {
    fn from(obj: &ParseObject) -> Self {
        Value::Pointer(obj.clone())
    }
}

impl From<Relation> for Value {
    fn from(rel: Relation) -> Self {
        Value::Relation(rel)
    }
}

impl From<Acl> for Value {
    fn from(acl: Acl) -> Self {
        Value::Acl(acl)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::Array(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<BTreeMap<String, T>> for Value {
    fn from(map: BTreeMap<String, T>) -> Self {
        Value::Object(map.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_sum_stays_integral() {
        let sum = add_numbers(&Number::from(12), &Number::from(1)).unwrap();
        assert_eq!(sum.as_i64(), Some(13));
    }

    #[test]
    fn mixed_sum_is_float() {
        let half = Number::from_f64(0.5).unwrap();
        let sum = add_numbers(&Number::from(2), &half).unwrap();
        assert_eq!(sum.as_f64(), Some(2.5));
        assert!(sum.as_i64().is_none());
    }

    #[test]
    fn overflowing_sum_falls_back_to_float() {
        let sum = add_numbers(&Number::from(i64::MAX), &Number::from(1)).unwrap();
        assert!(sum.as_i64().is_none());
        assert!(sum.as_f64().unwrap() > 9.2e18);
    }

    #[test]
    fn into_list_coerces() {
        assert_eq!(Value::Null.into_list(), Vec::<Value>::new());
        assert_eq!(Value::from("a").into_list(), vec![Value::from("a")]);
        assert_eq!(
            Value::from(vec![1, 2]).into_list(),
            vec![Value::from(1), Value::from(2)]
        );
    }

    #[test]
    fn geo_point_range() {
        assert!(GeoPoint::new(40.0, -30.0).is_ok());
        assert!(matches!(
            GeoPoint::new(91.0, 0.0),
            Err(Error::InvalidGeoPoint { .. })
        ));
        assert!(GeoPoint::new(0.0, -180.5).is_err());
    }

    #[test]
    fn pointer_equality_is_identity() {
        let a = ParseObject::create_without_data("Item", "abc");
        let b = ParseObject::create_without_data("Item", "abc");

        assert_eq!(Value::from(&a), Value::from(a.clone()));
        assert_ne!(Value::from(&a), Value::from(&b));
        assert!(Equivalence::SameRemoteId.matches(&Value::from(&a), &Value::from(&b)));
        assert!(!Equivalence::SameInstance.matches(&Value::from(&a), &Value::from(&b)));
    }

    #[test]
    fn remote_id_requires_ids() {
        let a = ParseObject::new("Item");
        let b = ParseObject::new("Item");
        assert!(!Equivalence::SameRemoteId.matches(&Value::from(&a), &Value::from(&b)));
        assert!(!Equivalence::SameRemoteId.matches(&Value::from("x"), &Value::from("x")));
    }
}
