use crate::value::{Document, Value};

/// Resolve a dot path (`"a.b.c"`) against a document.
///
/// Numeric segments index into arrays. A non-numeric segment applied to an
/// array projects the remaining path over each element and yields an array
/// of the results. Returns `None` when the path does not resolve, the
/// "undefined" of the query language.
pub fn get_dot_value(doc: &Document, path: &str) -> Option<Value> {
    if path.is_empty() {
        return Some(Value::Object(doc.clone()));
    }
    let parts: Vec<&str> = path.split('.').collect();
    resolve_object(doc, &parts)
}

fn resolve_object(doc: &Document, parts: &[&str]) -> Option<Value> {
    match parts {
        [] => Some(Value::Object(doc.clone())),
        [head, rest @ ..] => resolve_value(doc.get(*head)?, rest),
    }
}

fn resolve_value(value: &Value, parts: &[&str]) -> Option<Value> {
    let Some((head, rest)) = parts.split_first() else {
        return Some(value.clone());
    };
    match value {
        Value::Object(doc) => resolve_object(doc, parts),
        Value::Array(items) => {
            if let Ok(index) = head.parse::<usize>() {
                items.get(index).and_then(|el| resolve_value(el, rest))
            } else {
                // Project the remaining path over the elements. Elements that
                // do not resolve are dropped; nested arrays do not re-project.
                let projected: Vec<Value> = items
                    .iter()
                    .filter_map(|el| match el {
                        Value::Array(_) => None,
                        _ => resolve_value(el, parts),
                    })
                    .collect();
                Some(Value::Array(projected))
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{array, doc};

    #[test]
    fn resolves_nested_fields() {
        let d = doc! { "address": doc! { "city": doc! { "name": "Austin" } } };
        assert_eq!(
            get_dot_value(&d, "address.city.name"),
            Some(Value::String("Austin".into()))
        );
        assert_eq!(get_dot_value(&d, "address.city.zip"), None);
        assert_eq!(get_dot_value(&d, "missing"), None);
    }

    #[test]
    fn empty_path_yields_document() {
        let d = doc! { "a": 1 };
        assert_eq!(get_dot_value(&d, ""), Some(Value::Object(d.clone())));
    }

    #[test]
    fn numeric_segments_index_arrays() {
        let d = doc! { "tags": array!["red", "green", "blue"] };
        assert_eq!(
            get_dot_value(&d, "tags.1"),
            Some(Value::String("green".into()))
        );
        assert_eq!(get_dot_value(&d, "tags.9"), None);
    }

    #[test]
    fn non_numeric_segments_project_over_arrays() {
        let d = doc! {
            "items": array![doc! { "price": 5 }, doc! { "price": 7 }, doc! { "name": "x" }]
        };
        assert_eq!(
            get_dot_value(&d, "items.price"),
            Some(array![5, 7])
        );
    }

    #[test]
    fn projection_descends_through_objects() {
        let d = doc! {
            "orders": array![
                doc! { "lines": array![doc! { "sku": "a" }] },
                doc! { "lines": array![doc! { "sku": "b" }, doc! { "sku": "c" }] }
            ]
        };
        assert_eq!(
            get_dot_value(&d, "orders.lines.sku"),
            Some(array![array!["a"], array!["b", "c"]])
        );
    }

    #[test]
    fn scalar_mid_path_is_undefined() {
        let d = doc! { "a": 5 };
        assert_eq!(get_dot_value(&d, "a.b"), None);
    }
}
