use crate::error::ModelError;
use crate::value::{Document, Value};

/// Check that every key in the document obeys the naming rules:
///
/// - no key contains `.` (reserved for dot-path access),
/// - no key begins with `$`, except the sentinel forms used in persisted
///   meta-records: `$$date` (tagging a date value), `$$deleted` (tombstone),
///   `$$indexCreated` and `$$indexRemoved`.
pub fn check_document(doc: &Document) -> Result<(), ModelError> {
    for (key, value) in doc {
        check_key(key, value)?;
        check_value(value)?;
    }
    Ok(())
}

fn check_value(value: &Value) -> Result<(), ModelError> {
    match value {
        Value::Object(doc) => check_document(doc),
        Value::Array(items) => {
            for item in items {
                check_value(item)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn check_key(key: &str, value: &Value) -> Result<(), ModelError> {
    if key.starts_with('$') {
        let sentinel = (key == "$$date" && matches!(value, Value::Number(_)))
            || (key == "$$deleted" && matches!(value, Value::Bool(true)))
            || key == "$$indexCreated"
            || key == "$$indexRemoved";
        if !sentinel {
            return Err(ModelError::InvalidKey(key.to_string()));
        }
    }
    if key.contains('.') {
        return Err(ModelError::InvalidKey(key.to_string()));
    }
    Ok(())
}
