// SPDX-License-Identifier: MIT OR Apache-2.0
//! Typed access to loosely-shaped JSON item fields.

use crate::color::Color;
use crate::error::SerializeError;
use crate::geometry::Vec2;
use crate::id::Uid;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};

pub(crate) type Fields = Map<String, Value>;

fn invalid(field: &'static str, reason: impl Into<String>) -> SerializeError {
    SerializeError::InvalidField {
        field,
        reason: reason.into(),
    }
}

/// Decode an optional field into any deserializable type
pub(crate) fn opt<T: DeserializeOwned>(
    map: &Fields,
    field: &'static str,
) -> Result<Option<T>, SerializeError> {
    match map.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => T::deserialize(v)
            .map(Some)
            .map_err(|e| invalid(field, e.to_string())),
    }
}

/// Decode a required field
pub(crate) fn req<T: DeserializeOwned>(
    map: &Fields,
    field: &'static str,
) -> Result<T, SerializeError> {
    opt(map, field)?.ok_or(SerializeError::MissingField(field))
}

pub(crate) fn opt_color(map: &Fields, field: &'static str) -> Result<Option<Color>, SerializeError> {
    match map.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Color::from_hex(s)
            .map(Some)
            .ok_or_else(|| SerializeError::BadColor(s.clone())),
        Some(v) => Color::deserialize(v)
            .map(Some)
            .map_err(|_| SerializeError::BadColor(v.to_string())),
    }
}

pub(crate) fn req_color(map: &Fields, field: &'static str) -> Result<Color, SerializeError> {
    opt_color(map, field)?.ok_or(SerializeError::MissingField(field))
}

pub(crate) fn parse_uid(s: &str) -> Result<Uid, SerializeError> {
    s.parse().map_err(|_| SerializeError::BadUid(s.to_owned()))
}

/// Read a point stored either as `{x, y}` or as a two-element array
pub(crate) fn point(value: &Value, field: &'static str) -> Result<Vec2, SerializeError> {
    match value {
        Value::Object(_) => Vec2::deserialize(value).map_err(|e| invalid(field, e.to_string())),
        Value::Array(items) if items.len() == 2 => {
            let coord = |v: &Value| {
                v.as_f64()
                    .map(|f| f as f32)
                    .ok_or_else(|| invalid(field, "coordinates must be numbers"))
            };
            Ok(Vec2::new(coord(&items[0])?, coord(&items[1])?))
        }
        _ => Err(invalid(field, "expected [x, y] or {x, y}")),
    }
}

pub(crate) fn put<T: serde::Serialize>(map: &mut Fields, field: &str, value: T) {
    match serde_json::to_value(value) {
        Ok(v) => {
            map.insert(field.to_owned(), v);
        }
        Err(err) => tracing::error!("failed to encode field {field}: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(v: Value) -> Fields {
        match v {
            Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_required_and_optional() {
        let map = fields(json!({"name": "a", "size": 3.5}));
        assert_eq!(req::<String>(&map, "name").unwrap(), "a");
        assert!(matches!(
            req::<String>(&map, "type"),
            Err(SerializeError::MissingField("type"))
        ));
        assert!(matches!(
            opt::<String>(&map, "size"),
            Err(SerializeError::InvalidField { field: "size", .. })
        ));
        assert_eq!(opt::<f32>(&map, "size").unwrap(), Some(3.5));
    }

    #[test]
    fn test_point_forms() {
        assert_eq!(point(&json!([3, 4]), "pos").unwrap(), Vec2::new(3.0, 4.0));
        assert_eq!(
            point(&json!({"x": 1.5, "y": -2.0}), "pos").unwrap(),
            Vec2::new(1.5, -2.0)
        );
        assert!(point(&json!("nope"), "pos").is_err());
    }

    #[test]
    fn test_bad_color() {
        let map = fields(json!({"color": "#zz"}));
        assert!(matches!(
            opt_color(&map, "color"),
            Err(SerializeError::BadColor(_))
        ));
    }
}
