//! Serde helpers that keep NaN and ±Infinity distinguishable in JSON.
//!
//! `serde_json` writes non-finite floats as `null`, which erases the
//! difference between "not computable" and "missing". Fields annotated with
//! `#[serde(with = "eval_core::sentinel")]` are written as `"NaN"`,
//! `"Infinity"` or `"-Infinity"` instead, and read back from either form.
//! A JSON `null` decodes to NaN.

use std::collections::BTreeMap;

use serde::ser::SerializeMap;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

pub const NAN: &str = "NaN";
pub const INFINITY: &str = "Infinity";
pub const NEG_INFINITY: &str = "-Infinity";

pub fn serialize<S>(value: &f64, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match sentinel_str(*value) {
        Some(text) => serializer.serialize_str(text),
        None => serializer.serialize_f64(*value),
    }
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Repr>::deserialize(deserializer)? {
        None => Ok(f64::NAN),
        Some(Repr::Number(value)) => Ok(value),
        Some(Repr::Text(text)) => parse_sentinel(&text).ok_or_else(|| {
            de::Error::custom(format!(
                "expected a number or a NaN/Infinity sentinel, got {text:?}"
            ))
        }),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Repr {
    Number(f64),
    Text(String),
}

/// The string form of a non-finite value, `None` for finite values.
pub fn sentinel_str(value: f64) -> Option<&'static str> {
    if value.is_nan() {
        Some(NAN)
    } else if value == f64::INFINITY {
        Some(INFINITY)
    } else if value == f64::NEG_INFINITY {
        Some(NEG_INFINITY)
    } else {
        None
    }
}

/// Parse a sentinel string (or a numeric string) back into a float.
pub fn parse_sentinel(text: &str) -> Option<f64> {
    match text.trim() {
        NAN | "nan" => Some(f64::NAN),
        INFINITY | "+Infinity" | "inf" => Some(f64::INFINITY),
        NEG_INFINITY | "-inf" => Some(f64::NEG_INFINITY),
        other => other.parse::<f64>().ok(),
    }
}

/// Convert a float into a JSON value, encoding non-finite values as strings.
pub fn to_json(value: f64) -> Value {
    match sentinel_str(value) {
        Some(text) => Value::String(text.to_string()),
        None => serde_json::Number::from_f64(value)
            .map(Value::Number)
            .unwrap_or(Value::Null),
    }
}

/// Newtype carrying the sentinel encoding, for floats nested in containers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sentinel(pub f64);

impl Serialize for Sentinel {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serialize(&self.0, serializer)
    }
}

impl<'de> Deserialize<'de> for Sentinel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserialize(deserializer).map(Sentinel)
    }
}

/// `#[serde(with = "eval_core::sentinel::map")]` for `BTreeMap<String, f64>`.
pub mod map {
    use super::*;

    pub fn serialize<S>(map: &BTreeMap<String, f64>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut out = serializer.serialize_map(Some(map.len()))?;
        for (key, value) in map {
            out.serialize_entry(key, &Sentinel(*value))?;
        }
        out.end()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BTreeMap<String, f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = BTreeMap::<String, Sentinel>::deserialize(deserializer)?;
        Ok(raw.into_iter().map(|(k, v)| (k, v.0)).collect())
    }
}

/// `#[serde(with = "eval_core::sentinel::vec")]` for `Vec<f64>`.
pub mod vec {
    use super::*;

    pub fn serialize<S>(values: &[f64], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(values.iter().map(|v| Sentinel(*v)))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Vec::<Sentinel>::deserialize(deserializer)?;
        Ok(raw.into_iter().map(|v| v.0).collect())
    }
}
