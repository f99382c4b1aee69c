use std::cmp::Ordering;

use regex::Regex;

use crate::compare::{are_comparable, compare_things, things_equal};
use crate::error::ModelError;
use crate::path::get_dot_value;
use crate::value::{Document, Value};

/// Evaluate a query document against a document.
///
/// Top-level keys are either logical operators (`$or`, `$and`, `$not`) or
/// field clauses combined with AND. Field clauses match structurally, through
/// operator documents, or element-wise when the field resolves to an array.
pub fn match_query(doc: &Document, query: &Document) -> Result<bool, ModelError> {
    for (key, value) in query {
        if key.starts_with('$') {
            if !apply_logical(doc, key, value)? {
                return Ok(false);
            }
        } else if !match_clause(doc, key, value)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn apply_logical(doc: &Document, op: &str, arg: &Value) -> Result<bool, ModelError> {
    match op {
        "$or" => {
            let subqueries = logical_array(op, arg)?;
            for sub in subqueries {
                if match_query(doc, sub)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        "$and" => {
            let subqueries = logical_array(op, arg)?;
            for sub in subqueries {
                if !match_query(doc, sub)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        "$not" => match arg {
            Value::Object(sub) => Ok(!match_query(doc, sub)?),
            _ => Err(ModelError::InvalidQuery(
                "$not operand must be a query document".to_string(),
            )),
        },
        "$where" => Err(ModelError::InvalidQuery(
            "$where predicates are attached with Cursor::matching, not query data".to_string(),
        )),
        _ => Err(ModelError::InvalidQuery(format!(
            "unknown logical operator {op}"
        ))),
    }
}

fn logical_array<'q>(op: &str, arg: &'q Value) -> Result<Vec<&'q Document>, ModelError> {
    let items = arg
        .as_array()
        .ok_or_else(|| ModelError::InvalidQuery(format!("{op} operator used without an array")))?;
    items
        .iter()
        .map(|item| {
            item.as_object().ok_or_else(|| {
                ModelError::InvalidQuery(format!("{op} operands must be query documents"))
            })
        })
        .collect()
}

fn match_clause(doc: &Document, field: &str, query_value: &Value) -> Result<bool, ModelError> {
    let field_value = get_dot_value(doc, field);
    match_candidate(field_value.as_ref(), query_value, false)
}

/// Match a single already-resolved value against a query value, with the
/// full field-clause semantics (used by `$pull`).
pub(crate) fn match_field_value(
    field_value: Option<&Value>,
    query_value: &Value,
) -> Result<bool, ModelError> {
    match_candidate(field_value, query_value, false)
}

/// Match one resolved field value against one query value.
///
/// When the field holds an array and `as_whole` is unset, the clause matches
/// if any element does, unless the query value is itself an array (full
/// equality) or carries an array-specific operator, in which case the array
/// is treated as a single value.
fn match_candidate(
    field_value: Option<&Value>,
    query_value: &Value,
    as_whole: bool,
) -> Result<bool, ModelError> {
    if let Some(Value::Array(elements)) = field_value {
        if !as_whole {
            if query_value.is_array() {
                return match_candidate(field_value, query_value, true);
            }
            if let Value::Object(q) = query_value {
                if q.keys().any(|k| k == "$size" || k == "$elemMatch") {
                    return match_candidate(field_value, query_value, true);
                }
            }
            for element in elements {
                if match_candidate(Some(element), query_value, false)? {
                    return Ok(true);
                }
            }
            return Ok(false);
        }
    }

    if let Value::Object(q) = query_value {
        let operator_keys = q.keys().filter(|k| k.starts_with('$')).count();
        if operator_keys > 0 {
            if operator_keys != q.len() {
                return Err(ModelError::InvalidQuery(
                    "you cannot mix operators and normal fields".to_string(),
                ));
            }
            for (op, arg) in q {
                if !apply_comparison(op, field_value, arg)? {
                    return Ok(false);
                }
            }
            return Ok(true);
        }
    }

    Ok(things_equal(field_value, Some(query_value)))
}

fn apply_comparison(
    op: &str,
    field_value: Option<&Value>,
    arg: &Value,
) -> Result<bool, ModelError> {
    match op {
        "$lt" => Ok(ordered(field_value, arg, |ord| ord == Ordering::Less)),
        "$lte" => Ok(ordered(field_value, arg, |ord| ord != Ordering::Greater)),
        "$gt" => Ok(ordered(field_value, arg, |ord| ord == Ordering::Greater)),
        "$gte" => Ok(ordered(field_value, arg, |ord| ord != Ordering::Less)),
        "$ne" => match field_value {
            None => Ok(true),
            some => Ok(!things_equal(some, Some(arg))),
        },
        "$in" => {
            let candidates = operator_array("$in", arg)?;
            Ok(candidates
                .iter()
                .any(|candidate| things_equal(field_value, Some(candidate))))
        }
        "$nin" => {
            let candidates = operator_array("$nin", arg)?;
            Ok(!candidates
                .iter()
                .any(|candidate| things_equal(field_value, Some(candidate))))
        }
        "$regex" => {
            let pattern = arg.as_str().ok_or_else(|| {
                ModelError::InvalidQuery("$regex operator called without a pattern".to_string())
            })?;
            let regex = Regex::new(pattern)
                .map_err(|e| ModelError::InvalidQuery(format!("bad $regex pattern: {e}")))?;
            match field_value {
                Some(Value::String(s)) => Ok(regex.is_match(s)),
                _ => Ok(false),
            }
        }
        "$exists" => Ok(query_truthy(arg) == field_value.is_some()),
        "$size" => {
            let n = integer_arg("$size", arg)?;
            match field_value {
                Some(Value::Array(items)) => Ok(items.len() as i64 == n),
                _ => Ok(false),
            }
        }
        "$elemMatch" => {
            let sub = arg.as_object().ok_or_else(|| {
                ModelError::InvalidQuery("$elemMatch operand must be a query document".to_string())
            })?;
            match field_value {
                Some(Value::Array(items)) => {
                    for item in items {
                        if let Value::Object(element) = item {
                            if match_query(element, sub)? {
                                return Ok(true);
                            }
                        }
                    }
                    Ok(false)
                }
                _ => Ok(false),
            }
        }
        _ => Err(ModelError::InvalidQuery(format!(
            "unknown comparison operator {op}"
        ))),
    }
}

fn ordered(field_value: Option<&Value>, arg: &Value, pred: fn(Ordering) -> bool) -> bool {
    match field_value {
        Some(v) if are_comparable(v, arg) => pred(compare_things(Some(v), Some(arg))),
        _ => false,
    }
}

fn operator_array<'q>(op: &str, arg: &'q Value) -> Result<&'q Vec<Value>, ModelError> {
    arg.as_array()
        .ok_or_else(|| ModelError::InvalidQuery(format!("{op} operator called without an array")))
}

fn integer_arg(op: &str, arg: &Value) -> Result<i64, ModelError> {
    match arg {
        Value::Number(n) if n.fract() == 0.0 => Ok(*n as i64),
        _ => Err(ModelError::InvalidQuery(format!(
            "{op} operator called without an integer"
        ))),
    }
}

/// JS-style truthiness for `$exists` arguments, with the empty string
/// counting as exists-true.
fn query_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => *n != 0.0 && !n.is_nan(),
        Value::String(_) => true,
        Value::Date(_) | Value::Array(_) | Value::Object(_) => true,
    }
}
