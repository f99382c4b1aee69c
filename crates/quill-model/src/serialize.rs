use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ModelError;
use crate::validate::check_document;
use crate::value::{Document, Value};

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) => {
                // Whole numbers render without a fractional part.
                if n.fract() == 0.0 && *n >= i64::MIN as f64 && *n <= i64::MAX as f64 {
                    serializer.serialize_i64(*n as i64)
                } else {
                    serializer.serialize_f64(*n)
                }
            }
            Value::String(s) => serializer.serialize_str(s),
            Value::Date(ms) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("$$date", ms)?;
                map.end()
            }
            Value::Array(items) => serializer.collect_seq(items),
            Value::Object(doc) => serializer.collect_map(doc),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = serde_json::Value::deserialize(deserializer)?;
        from_json(raw).map_err(D::Error::custom)
    }
}

fn from_json(raw: serde_json::Value) -> Result<Value, String> {
    Ok(match raw {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => {
            let n = n
                .as_f64()
                .ok_or_else(|| format!("unrepresentable number: {n}"))?;
            if !n.is_finite() {
                return Err("document numbers must be finite".to_string());
            }
            Value::Number(n)
        }
        serde_json::Value::String(s) => Value::String(s),
        serde_json::Value::Array(items) => {
            let converted = items
                .into_iter()
                .map(from_json)
                .collect::<Result<Vec<_>, _>>()?;
            Value::Array(converted)
        }
        serde_json::Value::Object(map) => {
            if map.len() == 1 {
                if let Some(ms) = map.get("$$date") {
                    let ms = ms
                        .as_i64()
                        .or_else(|| ms.as_f64().map(|f| f as i64))
                        .ok_or("$$date requires a millisecond timestamp")?;
                    return Ok(Value::Date(ms));
                }
            }
            let mut doc = Document::new();
            for (key, value) in map {
                doc.insert(key, from_json(value)?);
            }
            Value::Object(doc)
        }
    })
}

/// Serialize a document to its single-line JSON record form.
///
/// Key validation is re-run here so an invalid document can never reach the
/// data file, whatever path produced it.
pub fn serialize_doc(doc: &Document) -> Result<String, ModelError> {
    check_document(doc)?;
    Ok(serde_json::to_string(&Value::Object(doc.clone()))?)
}

/// Parse one record line back into a document.
pub fn deserialize_doc(line: &str) -> Result<Document, ModelError> {
    match serde_json::from_str::<Value>(line)? {
        Value::Object(doc) => Ok(doc),
        other => Err(ModelError::Serialization(format!(
            "record is not a document: {other:?}"
        ))),
    }
}
