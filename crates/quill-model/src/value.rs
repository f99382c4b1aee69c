use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// A document is a string-keyed map of values. The map is ordered so that
/// serialization and object comparison are deterministic.
pub type Document = BTreeMap<String, Value>;

/// A single document value.
///
/// Dates carry a millisecond timestamp; on disk they are tagged as
/// `{"$$date": <ms>}` so they survive the JSON round trip.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Date(i64),
    Array(Vec<Value>),
    Object(Document),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<Value>> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Document> {
        match self {
            Value::Object(doc) => Some(doc),
            _ => None,
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Value::Array(_))
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    /// True for the types the comparison operators accept: strings, numbers
    /// and dates. Booleans, arrays and objects are not range-comparable.
    pub fn is_comparable(&self) -> bool {
        matches!(self, Value::String(_) | Value::Number(_) | Value::Date(_))
    }
}

/// Milliseconds since the Unix epoch, for `Value::Date`.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// The `_id` of a document, when present and a string.
pub fn doc_id(doc: &Document) -> Option<&str> {
    doc.get("_id").and_then(Value::as_str)
}

// ── Conversions ─────────────────────────────────────────────────

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
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

impl From<Document> for Value {
    fn from(doc: Document) -> Self {
        Value::Object(doc)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::Array(items.into_iter().map(Into::into).collect())
    }
}

/// Build a [`Document`] literal.
///
/// ```
/// use quill_model::{doc, Value};
///
/// let d = doc! { "name": "Acme", "revenue": 50000.0, "active": true };
/// assert_eq!(d.get("name"), Some(&Value::String("Acme".into())));
/// ```
#[macro_export]
macro_rules! doc {
    () => { $crate::Document::new() };
    ($($key:literal : $value:expr),+ $(,)?) => {{
        let mut document = $crate::Document::new();
        $( document.insert(($key).to_string(), $crate::Value::from($value)); )+
        document
    }};
}

/// Build a [`Value::Array`] literal from heterogeneous values.
#[macro_export]
macro_rules! array {
    () => { $crate::Value::Array(Vec::new()) };
    ($($value:expr),+ $(,)?) => {
        $crate::Value::Array(vec![$( $crate::Value::from($value) ),+])
    };
}
