//! Wire codec between [`Value`] and the server's tagged JSON.
//!
//! Typed values travel as JSON objects carrying a `__type` tag:
//!
//! ```text
//! {"__type": "Pointer", "className": "Post", "objectId": "xWMyZ4YEGZ"}
//! {"__type": "Date", "iso": "2024-02-01T12:30:00.000Z"}
//! {"__type": "Bytes", "base64": "aGVsbG8="}
//! {"__type": "GeoPoint", "latitude": 40.0, "longitude": -30.0}
//! {"__type": "File", "name": "a.png", "url": "https://..."}
//! {"__type": "Relation", "className": "Comment"}
//! {"__type": "Object", "className": "Post", "objectId": "...", ...fields}
//! ```

use crate::{error::Result, Acl, Error, GeoPoint, ParseFile, ParseObject, Relation, Value};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Map, Value as Json};
use std::collections::BTreeMap;

/// Encode a value for the wire.
///
/// `allow_objects` controls whether object references may appear; when it
/// is false any [`Value::Pointer`] yields [`Error::ObjectsNotAllowed`].
pub fn encode(value: &Value, allow_objects: bool) -> Result<Json> {
    Ok(match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Number(n) => Json::Number(n.clone()),
        Value::String(s) => Json::String(s.clone()),
        Value::Date(d) => encode_date(d),
        Value::Bytes(bytes) => json!({"__type": "Bytes", "base64": STANDARD.encode(bytes)}),
        Value::GeoPoint(p) => json!({
            "__type": "GeoPoint",
            "latitude": p.latitude,
            "longitude": p.longitude,
        }),
        Value::File(f) => {
            let mut map = Map::new();
            map.insert("__type".into(), "File".into());
            map.insert("name".into(), f.name.clone().into());
            if let Some(url) = &f.url {
                map.insert("url".into(), url.clone().into());
            }
            Json::Object(map)
        }
        Value::Pointer(obj) => {
            if !allow_objects {
                return Err(Error::ObjectsNotAllowed);
            }
            obj.to_pointer()?
        }
        Value::Relation(rel) => json!({
            "__type": "Relation",
            "className": rel.target_class(),
        }),
        Value::Acl(acl) => acl.to_json(),
        Value::Array(items) => encode_list(items, allow_objects)?,
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, item) in map {
                out.insert(key.clone(), encode(item, allow_objects)?);
            }
            Json::Object(out)
        }
    })
}

/// Encode a list of values as a JSON array.
pub fn encode_list(items: &[Value], allow_objects: bool) -> Result<Json> {
    items
        .iter()
        .map(|item| encode(item, allow_objects))
        .collect::<Result<Vec<_>>>()
        .map(Json::Array)
}

/// Encode a value as a keyed map even when it is list-shaped.
///
/// Lists become `{"0": .., "1": ..}` and an empty list becomes `{}`.
/// Anything that is not a list encodes normally.
pub fn encode_associative(value: &Value, allow_objects: bool) -> Result<Json> {
    match value {
        Value::Array(items) => {
            let mut out = Map::new();
            for (index, item) in items.iter().enumerate() {
                out.insert(index.to_string(), encode(item, allow_objects)?);
            }
            Ok(Json::Object(out))
        }
        Value::Null => Ok(Json::Object(Map::new())),
        other => encode(other, allow_objects),
    }
}

pub fn encode_date(date: &DateTime<Utc>) -> Json {
    json!({"__type": "Date", "iso": format_date(date)})
}

/// ISO-8601 with millisecond precision and a `Z` suffix.
pub fn format_date(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_date(iso: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(iso)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| Error::InvalidWireValue(format!("date '{iso}': {e}")))
}

/// Decode wire JSON into a value.
pub fn decode(json: &Json) -> Result<Value> {
    Ok(match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => Value::Number(n.clone()),
        Json::String(s) => Value::String(s.clone()),
        Json::Array(items) => Value::Array(items.iter().map(decode).collect::<Result<_>>()?),
        Json::Object(map) => match map.get("__type").and_then(Json::as_str) {
            Some(tag) => decode_typed(tag, map)?,
            None => Value::Object(decode_map(map)?),
        },
    })
}

/// Decode every entry of a JSON object.
pub fn decode_map(map: &Map<String, Json>) -> Result<BTreeMap<String, Value>> {
    map.iter()
        .map(|(key, item)| Ok((key.clone(), decode(item)?)))
        .collect()
}

fn decode_typed(tag: &str, map: &Map<String, Json>) -> Result<Value> {
    match tag {
        "Date" => Ok(Value::Date(parse_date(required_str(map, tag, "iso")?)?)),
        "Bytes" => {
            let encoded = required_str(map, tag, "base64")?;
            STANDARD
                .decode(encoded)
                .map(Value::Bytes)
                .map_err(|e| Error::InvalidWireValue(format!("Bytes: {e}")))
        }
        "GeoPoint" => {
            let latitude = required_f64(map, tag, "latitude")?;
            let longitude = required_f64(map, tag, "longitude")?;
            GeoPoint::new(latitude, longitude).map(Value::GeoPoint)
        }
        "File" => Ok(Value::File(ParseFile::new(
            required_str(map, tag, "name")?,
            map.get("url").and_then(Json::as_str).map(str::to_string),
        ))),
        "Pointer" => Ok(Value::Pointer(ParseObject::create_without_data(
            required_str(map, tag, "className")?,
            required_str(map, tag, "objectId")?,
        ))),
        "Object" => {
            let class_name = required_str(map, tag, "className")?;
            let mut fields = map.clone();
            fields.remove("__type");
            fields.remove("className");
            Ok(Value::Pointer(ParseObject::from_server(class_name, &fields)?))
        }
        "Relation" => Ok(Value::Relation(Relation::detached(
            map.get("className").and_then(Json::as_str).map(str::to_string),
        ))),
        other => Err(Error::InvalidWireValue(format!("unknown __type '{other}'"))),
    }
}

/// Decode the `ACL` field, which travels as a plain JSON map.
pub fn decode_acl(json: &Json) -> Result<Value> {
    Acl::from_json(json).map(Value::Acl)
}

fn required_str<'a>(map: &'a Map<String, Json>, tag: &str, field: &str) -> Result<&'a str> {
    map.get(field)
        .and_then(Json::as_str)
        .ok_or_else(|| Error::InvalidWireValue(format!("{tag} is missing '{field}'")))
}

fn required_f64(map: &Map<String, Json>, tag: &str, field: &str) -> Result<f64> {
    map.get(field)
        .and_then(Json::as_f64)
        .ok_or_else(|| Error::InvalidWireValue(format!("{tag} is missing '{field}'")))
}
