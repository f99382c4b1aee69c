use std::cmp::Ordering;

use crate::compare::compare_things;
use crate::error::ModelError;
use crate::matcher::match_field_value;
use crate::validate::check_document;
use crate::value::{Document, Value};

/// Apply an update document to a document, producing the new version.
///
/// An update with no `$`-modifiers is a full replacement (the `_id` is
/// carried over). An update made only of modifiers applies each of them
/// under dot paths. Mixing the two forms is an error, as is any update
/// whose result changes `_id` or breaks the key rules.
pub fn modify(doc: &Document, update: &Document) -> Result<Document, ModelError> {
    let modifiers = update.keys().filter(|k| k.starts_with('$')).count();
    if modifiers > 0 && modifiers != update.len() {
        return Err(ModelError::MixedFieldsAndModifiers);
    }

    let new_doc = if modifiers > 0 {
        apply_modifiers(doc, update)?
    } else {
        replace_document(doc, update)
    };

    if doc.get("_id") != new_doc.get("_id") {
        return Err(ModelError::IdImmutable);
    }
    check_document(&new_doc)?;
    Ok(new_doc)
}

fn replace_document(doc: &Document, update: &Document) -> Document {
    let mut new_doc = update.clone();
    if !new_doc.contains_key("_id") {
        if let Some(id) = doc.get("_id") {
            new_doc.insert("_id".to_string(), id.clone());
        }
    }
    new_doc
}

fn apply_modifiers(doc: &Document, update: &Document) -> Result<Document, ModelError> {
    let mut new_doc = doc.clone();
    for (modifier, arg) in update {
        let fields = arg.as_object().ok_or_else(|| {
            ModelError::InvalidModifier(format!("modifier {modifier}'s argument must be an object"))
        })?;
        for (path, operand) in fields {
            let parts: Vec<&str> = path.split('.').collect();
            apply_in_object(&mut new_doc, &parts, modifier, operand)?;
        }
    }
    Ok(new_doc)
}

/// What a last-step operator decided to do with its slot.
enum Action {
    Set(Value),
    Remove,
    Nothing,
}

fn apply_in_object(
    doc: &mut Document,
    parts: &[&str],
    modifier: &str,
    operand: &Value,
) -> Result<(), ModelError> {
    let Some((head, rest)) = parts.split_first() else {
        return Err(ModelError::InvalidModifier("empty field path".to_string()));
    };

    if rest.is_empty() {
        let action = last_step(modifier, doc.get(*head), operand)?;
        match action {
            Action::Set(value) => {
                doc.insert((*head).to_string(), value);
            }
            Action::Remove => {
                doc.remove(*head);
            }
            Action::Nothing => {}
        }
        return Ok(());
    }

    match doc.get_mut(*head) {
        Some(Value::Object(sub)) => apply_in_object(sub, rest, modifier, operand),
        Some(Value::Array(items)) => apply_in_array(items, rest, modifier, operand),
        Some(_) => Err(ModelError::InvalidModifier(format!(
            "cannot traverse the scalar field {head}"
        ))),
        None => {
            // $unset of a missing path is a no-op; everything else creates
            // the intermediate objects.
            if modifier == "$unset" {
                return Ok(());
            }
            doc.insert((*head).to_string(), Value::Object(Document::new()));
            match doc.get_mut(*head) {
                Some(Value::Object(sub)) => apply_in_object(sub, rest, modifier, operand),
                _ => unreachable!("freshly inserted object"),
            }
        }
    }
}

fn apply_in_array(
    items: &mut Vec<Value>,
    parts: &[&str],
    modifier: &str,
    operand: &Value,
) -> Result<(), ModelError> {
    let Some((head, rest)) = parts.split_first() else {
        return Err(ModelError::InvalidModifier("empty field path".to_string()));
    };
    let index: usize = head.parse().map_err(|_| {
        ModelError::InvalidModifier(format!("cannot address array elements with the key {head}"))
    })?;
    if index >= items.len() {
        return Err(ModelError::InvalidModifier(format!(
            "array index {index} out of bounds"
        )));
    }

    if rest.is_empty() {
        let action = last_step(modifier, Some(&items[index]), operand)?;
        match action {
            Action::Set(value) => items[index] = value,
            // Removing an array element leaves a null in its position.
            Action::Remove => items[index] = Value::Null,
            Action::Nothing => {}
        }
        return Ok(());
    }

    match &mut items[index] {
        Value::Object(sub) => apply_in_object(sub, rest, modifier, operand),
        Value::Array(nested) => apply_in_array(nested, rest, modifier, operand),
        _ => Err(ModelError::InvalidModifier(format!(
            "cannot traverse the scalar element at index {index}"
        ))),
    }
}

fn last_step(
    modifier: &str,
    current: Option<&Value>,
    operand: &Value,
) -> Result<Action, ModelError> {
    match modifier {
        "$set" => Ok(Action::Set(operand.clone())),
        "$unset" => match current {
            Some(_) => Ok(Action::Remove),
            None => Ok(Action::Nothing),
        },
        "$inc" => {
            let amount = operand.as_number().ok_or_else(|| {
                ModelError::InvalidModifier("$inc modifier used with a non-number".to_string())
            })?;
            match current {
                None => Ok(Action::Set(Value::Number(amount))),
                Some(Value::Number(n)) => Ok(Action::Set(Value::Number(n + amount))),
                Some(_) => Err(ModelError::InvalidModifier(
                    "cannot use the $inc modifier on non-number fields".to_string(),
                )),
            }
        }
        "$min" => match current {
            None => Ok(Action::Set(operand.clone())),
            Some(v) => {
                if compare_things(Some(operand), Some(v)) == Ordering::Less {
                    Ok(Action::Set(operand.clone()))
                } else {
                    Ok(Action::Nothing)
                }
            }
        },
        "$max" => match current {
            None => Ok(Action::Set(operand.clone())),
            Some(v) => {
                if compare_things(Some(operand), Some(v)) == Ordering::Greater {
                    Ok(Action::Set(operand.clone()))
                } else {
                    Ok(Action::Nothing)
                }
            }
        },
        "$push" => apply_push(current, operand),
        "$addToSet" => apply_add_to_set(current, operand),
        "$pop" => apply_pop(current, operand),
        "$pull" => apply_pull(current, operand),
        _ => Err(ModelError::InvalidModifier(format!(
            "unknown modifier {modifier}"
        ))),
    }
}

fn current_array(current: Option<&Value>, modifier: &str) -> Result<Vec<Value>, ModelError> {
    match current {
        None => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items.clone()),
        Some(_) => Err(ModelError::InvalidModifier(format!(
            "cannot use {modifier} on a non-array field"
        ))),
    }
}

fn apply_push(current: Option<&Value>, operand: &Value) -> Result<Action, ModelError> {
    let mut items = current_array(current, "$push")?;

    if let Some(spec) = operand.as_object() {
        if spec.contains_key("$each") || spec.contains_key("$slice") {
            if spec.keys().any(|k| k != "$each" && k != "$slice") {
                return Err(ModelError::InvalidModifier(
                    "$push can only use $each and $slice".to_string(),
                ));
            }
            // $slice without $each behaves as if $each were empty.
            let each: &[Value] = match spec.get("$each") {
                Some(Value::Array(values)) => values,
                Some(_) => {
                    return Err(ModelError::InvalidModifier(
                        "$each requires an array value".to_string(),
                    ))
                }
                None => &[],
            };
            items.extend(each.iter().cloned());

            if let Some(slice) = spec.get("$slice") {
                let n = match slice {
                    Value::Number(n) if n.fract() == 0.0 => *n as i64,
                    _ => {
                        return Err(ModelError::InvalidModifier(
                            "$slice requires an integer value".to_string(),
                        ))
                    }
                };
                if n == 0 {
                    items.clear();
                } else if n > 0 {
                    items.truncate(n as usize);
                } else {
                    let keep = (-n) as usize;
                    if items.len() > keep {
                        items.drain(..items.len() - keep);
                    }
                }
            }
            return Ok(Action::Set(Value::Array(items)));
        }
    }

    items.push(operand.clone());
    Ok(Action::Set(Value::Array(items)))
}

fn apply_add_to_set(current: Option<&Value>, operand: &Value) -> Result<Action, ModelError> {
    let mut items = current_array(current, "$addToSet")?;

    let to_add: Vec<&Value> = if let Some(spec) = operand.as_object() {
        if spec.contains_key("$each") {
            if spec.len() != 1 {
                return Err(ModelError::InvalidModifier(
                    "$addToSet can only use $each".to_string(),
                ));
            }
            match spec.get("$each") {
                Some(Value::Array(values)) => values.iter().collect(),
                _ => {
                    return Err(ModelError::InvalidModifier(
                        "$each requires an array value".to_string(),
                    ))
                }
            }
        } else {
            vec![operand]
        }
    } else {
        vec![operand]
    };

    let mut changed = false;
    for value in to_add {
        let present = items
            .iter()
            .any(|item| compare_things(Some(item), Some(value)) == Ordering::Equal);
        if !present {
            items.push(value.clone());
            changed = true;
        }
    }

    if changed || current.is_none() {
        Ok(Action::Set(Value::Array(items)))
    } else {
        Ok(Action::Nothing)
    }
}

fn apply_pop(current: Option<&Value>, operand: &Value) -> Result<Action, ModelError> {
    let items = match current {
        Some(Value::Array(items)) => items,
        _ => {
            return Err(ModelError::InvalidModifier(
                "cannot $pop an element from a non-array field".to_string(),
            ))
        }
    };
    let direction = match operand {
        Value::Number(n) if n.fract() == 0.0 => *n as i64,
        _ => {
            return Err(ModelError::InvalidModifier(
                "$pop requires an integer value".to_string(),
            ))
        }
    };

    if direction == 0 || items.is_empty() {
        return Ok(Action::Nothing);
    }
    let mut popped = items.clone();
    if direction > 0 {
        popped.pop();
    } else {
        popped.remove(0);
    }
    Ok(Action::Set(Value::Array(popped)))
}

fn apply_pull(current: Option<&Value>, operand: &Value) -> Result<Action, ModelError> {
    let items = match current {
        Some(Value::Array(items)) => items,
        _ => {
            return Err(ModelError::InvalidModifier(
                "cannot $pull an element from a non-array field".to_string(),
            ))
        }
    };

    let mut kept = Vec::with_capacity(items.len());
    for item in items {
        if !match_field_value(Some(item), operand)? {
            kept.push(item.clone());
        }
    }
    Ok(Action::Set(Value::Array(kept)))
}
