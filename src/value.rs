//! Runtime values and the evaluation inputs (map globals + feature).

use std::collections::BTreeMap;

use serde_json::Value as Json;

use crate::color::Color;
use crate::types::Type;

/// A value flowing through the evaluator. Mirrors the JSON data model plus
/// the `Color` type produced by color operators.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Number(f64),
    String(String),
    Color(Color),
    Object(BTreeMap<String, Value>),
    Array(Vec<Value>),
}

impl Value {
    /// Convert a raw JSON value. Numbers become `f64`.
    pub fn from_json(json: &Json) -> Value {
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Boolean(*b),
            Json::Number(n) => Value::Number(n.as_f64().unwrap_or_default()),
            Json::String(s) => Value::String(s.clone()),
            Json::Array(items) => Value::Array(items.iter().map(Value::from_json).collect()),
            Json::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Convert back to JSON. Colors render as their `rgba(...)` string; a
    /// non-finite number becomes `null` (JSON has no representation for it).
    pub fn to_json(&self) -> Json {
        match self {
            Value::Null => Json::Null,
            Value::Boolean(b) => Json::Bool(*b),
            Value::Number(n) => serde_json::Number::from_f64(*n).map_or(Json::Null, Json::Number),
            Value::String(s) => Json::String(s.clone()),
            Value::Color(c) => Json::String(c.to_string()),
            Value::Object(map) => Json::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Value::Array(items) => Json::Array(items.iter().map(Value::to_json).collect()),
        }
    }

    /// The concrete type of this value. Arrays get an item type by the same
    /// rule as literal promotion: a uniform primitive kind, else `Value`.
    pub fn type_of(&self) -> Type {
        match self {
            Value::Null => Type::Null,
            Value::Boolean(_) => Type::Boolean,
            Value::Number(_) => Type::Number,
            Value::String(_) => Type::String,
            Value::Color(_) => Type::Color,
            Value::Object(_) => Type::Object,
            Value::Array(items) => Type::array_n(array_item_type(items), items.len()),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_color(&self) -> Option<Color> {
        match self {
            Value::Color(c) => Some(*c),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }
}

/// Item type shared by every element of an array value, or `Value` when the
/// elements are mixed or not of a primitive kind (nested arrays stay `Value`,
/// since their lengths may differ).
fn array_item_type(items: &[Value]) -> Type {
    let mut item = None;
    for value in items {
        let ty = match value {
            Value::Null => Type::Null,
            Value::Boolean(_) => Type::Boolean,
            Value::Number(_) => Type::Number,
            Value::String(_) => Type::String,
            Value::Object(_) => Type::Object,
            _ => return Type::Value,
        };
        match &item {
            None => item = Some(ty),
            Some(seen) if *seen == ty => {}
            Some(_) => return Type::Value,
        }
    }
    item.unwrap_or(Type::Value)
}

/// The map-properties bag passed to every evaluation.
#[derive(Debug, Clone, Copy, Default)]
pub struct Globals {
    pub zoom: f64,
}

/// A map feature: the property bag the `get`/`has` operators read, plus
/// geometry type and id for the corresponding context operators.
#[derive(Debug, Clone, Default)]
pub struct Feature {
    pub properties: BTreeMap<String, Value>,
    pub geometry_type: Option<String>,
    pub id: Option<Value>,
}

impl Feature {
    /// Build from a GeoJSON-shaped value: `properties`, `geometry.type`, `id`.
    pub fn from_geojson(json: &Json) -> Feature {
        let properties = json
            .get("properties")
            .and_then(Json::as_object)
            .map(|map| {
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect()
            })
            .unwrap_or_default();
        let geometry_type = json
            .pointer("/geometry/type")
            .and_then(Json::as_str)
            .map(str::to_owned);
        let id = json.get("id").map(Value::from_json);
        Feature {
            properties,
            geometry_type,
            id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_round_trip_for_plain_data() {
        // Float-formed numbers so JSON number representations compare equal.
        let raw = json!({"a": [1.5, 2.5, "x"], "b": {"nested": true}, "c": null});
        let value = Value::from_json(&raw);
        assert_eq!(value.to_json(), raw);
    }

    #[test]
    fn uniform_arrays_get_a_precise_type() {
        let value = Value::from_json(&json!([1, 2, 3]));
        assert_eq!(value.type_of(), Type::array_n(Type::Number, 3));
    }

    #[test]
    fn mixed_arrays_fall_back_to_value_items() {
        let value = Value::from_json(&json!([1, "x"]));
        assert_eq!(value.type_of(), Type::array_n(Type::Value, 2));
    }

    #[test]
    fn null_and_object_items_promote_like_other_primitives() {
        let value = Value::from_json(&json!([null, null]));
        assert_eq!(value.type_of(), Type::array_n(Type::Null, 2));
        let value = Value::from_json(&json!([{"a": 1}, {}]));
        assert_eq!(value.type_of(), Type::array_n(Type::Object, 2));
    }

    #[test]
    fn nested_arrays_stay_value_items() {
        let value = Value::from_json(&json!([[1], [2, 3]]));
        assert_eq!(value.type_of(), Type::array_n(Type::Value, 2));
    }

    #[test]
    fn empty_array_has_value_items_and_zero_length() {
        let value = Value::from_json(&json!([]));
        assert_eq!(value.type_of(), Type::array_n(Type::Value, 0));
    }

    #[test]
    fn feature_from_geojson() {
        let feature = Feature::from_geojson(&json!({
            "id": 7,
            "geometry": {"type": "Point", "coordinates": [0, 0]},
            "properties": {"name": "X"}
        }));
        assert_eq!(
            feature.properties.get("name"),
            Some(&Value::String("X".to_owned()))
        );
        assert_eq!(feature.geometry_type.as_deref(), Some("Point"));
        assert_eq!(feature.id, Some(Value::Number(7.0)));
    }
}
