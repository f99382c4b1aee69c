use std::cmp::Ordering;

use crate::value::Value;

/// Caller-supplied string comparator, used for locale-sensitive sorts.
pub type StringComparator = dyn Fn(&str, &str) -> Ordering + Send + Sync;

/// Rank of a value's type in the canonical order:
/// undefined < null < number < string < boolean < date < array < object.
/// `undefined` (a missing field) is handled by the `Option` layer.
fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Bool(_) => 4,
        Value::Date(_) => 5,
        Value::Array(_) => 6,
        Value::Object(_) => 7,
    }
}

/// Total order over possibly-missing values, with the default string order.
pub fn compare_things(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    compare_things_with(a, b, None)
}

/// Total order over possibly-missing values.
///
/// A missing field (`None`) sorts before everything. Within a type the
/// natural order applies; `strings` overrides string comparison when given.
pub fn compare_things_with(
    a: Option<&Value>,
    b: Option<&Value>,
    strings: Option<&StringComparator>,
) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => compare_values(a, b, strings),
    }
}

fn compare_values(a: &Value, b: &Value, strings: Option<&StringComparator>) -> Ordering {
    let rank_order = type_rank(a).cmp(&type_rank(b));
    if rank_order != Ordering::Equal {
        return rank_order;
    }

    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Number(x), Value::Number(y)) => x.total_cmp(y),
        (Value::String(x), Value::String(y)) => match strings {
            Some(cmp) => cmp(x, y),
            None => x.cmp(y),
        },
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Date(x), Value::Date(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (ex, ey) in x.iter().zip(y.iter()) {
                let ord = compare_values(ex, ey, strings);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(x), Value::Object(y)) => {
            // Values compared pairwise in each object's own sorted key
            // order; ties broken by size.
            for (vx, vy) in x.values().zip(y.values()) {
                let ord = compare_values(vx, vy, strings);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        // Ranks matched, so the pair is same-typed.
        _ => Ordering::Equal,
    }
}

/// Structural equality.
///
/// Differs from the ordering: a missing field is never equal to anything,
/// including another missing field, and an array is never equal to a
/// non-array. Dates are equal iff their timestamps match.
pub fn things_equal(a: Option<&Value>, b: Option<&Value>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => values_equal(a, b),
        _ => false,
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => x == y,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Date(x), Value::Date(y)) => x == y,
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(ex, ey)| values_equal(ex, ey))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter().all(|(key, vx)| match y.get(key) {
                    Some(vy) => values_equal(vx, vy),
                    None => false,
                })
        }
        _ => false,
    }
}

/// Whether two values can be range-compared (`$lt` and friends): both must
/// be strings, both numbers, or both dates.
pub fn are_comparable(a: &Value, b: &Value) -> bool {
    a.is_comparable() && b.is_comparable() && type_rank(a) == type_rank(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{array, doc};

    fn ord(a: &Value, b: &Value) -> Ordering {
        compare_things(Some(a), Some(b))
    }

    #[test]
    fn type_ranking() {
        let ordered = [
            Value::Null,
            Value::Number(99999.0),
            Value::String("zzz".into()),
            Value::Bool(false),
            Value::Date(0),
            array![1],
            Value::Object(doc! { "a": 1 }),
        ];
        for pair in ordered.windows(2) {
            assert_eq!(ord(&pair[0], &pair[1]), Ordering::Less);
        }
    }

    #[test]
    fn missing_sorts_first() {
        assert_eq!(compare_things(None, Some(&Value::Null)), Ordering::Less);
        assert_eq!(compare_things(None, None), Ordering::Equal);
    }

    #[test]
    fn natural_orders_within_types() {
        assert_eq!(ord(&Value::Number(1.0), &Value::Number(2.0)), Ordering::Less);
        assert_eq!(
            ord(&Value::String("abc".into()), &Value::String("abd".into())),
            Ordering::Less
        );
        assert_eq!(ord(&Value::Bool(false), &Value::Bool(true)), Ordering::Less);
        assert_eq!(ord(&Value::Date(5), &Value::Date(9)), Ordering::Less);
    }

    #[test]
    fn arrays_compare_lexicographically() {
        assert_eq!(ord(&array![1, 2], &array![1, 3]), Ordering::Less);
        assert_eq!(ord(&array![1, 2], &array![1, 2, 0]), Ordering::Less);
        assert_eq!(ord(&array![2], &array![1, 9, 9]), Ordering::Greater);
    }

    #[test]
    fn objects_compare_by_sorted_values_then_size() {
        let a = Value::Object(doc! { "a": 1, "b": 2 });
        let b = Value::Object(doc! { "a": 1, "b": 3 });
        assert_eq!(ord(&a, &b), Ordering::Less);

        let small = Value::Object(doc! { "a": 1 });
        let big = Value::Object(doc! { "a": 1, "b": 0 });
        assert_eq!(ord(&small, &big), Ordering::Less);
    }

    #[test]
    fn custom_string_comparator() {
        let rev: &StringComparator = &|a: &str, b: &str| b.cmp(a);
        assert_eq!(
            compare_things_with(
                Some(&Value::String("a".into())),
                Some(&Value::String("b".into())),
                Some(rev),
            ),
            Ordering::Greater
        );
    }

    #[test]
    fn missing_never_equal() {
        assert!(!things_equal(None, None));
        assert!(!things_equal(None, Some(&Value::Null)));
    }

    #[test]
    fn dates_equal_by_timestamp() {
        assert!(things_equal(Some(&Value::Date(42)), Some(&Value::Date(42))));
        assert!(!things_equal(Some(&Value::Date(42)), Some(&Value::Number(42.0))));
    }

    #[test]
    fn arrays_never_equal_scalars() {
        assert!(!things_equal(Some(&array![5]), Some(&Value::Number(5.0))));
        assert!(things_equal(Some(&array![5, "a"]), Some(&array![5, "a"])));
        assert!(!things_equal(Some(&array![5, "a"]), Some(&array![5])));
    }

    #[test]
    fn objects_equal_by_keys_and_values() {
        let a = Value::Object(doc! { "x": 1, "y": doc! { "z": "deep" } });
        let b = Value::Object(doc! { "y": doc! { "z": "deep" }, "x": 1 });
        assert!(things_equal(Some(&a), Some(&b)));

        let c = Value::Object(doc! { "x": 1, "y": doc! { "z": "other" } });
        assert!(!things_equal(Some(&a), Some(&c)));
    }

    #[test]
    fn comparability_is_same_type_only() {
        assert!(are_comparable(&Value::Number(1.0), &Value::Number(2.0)));
        assert!(are_comparable(&Value::Date(1), &Value::Date(2)));
        assert!(!are_comparable(&Value::Number(1.0), &Value::String("1".into())));
        assert!(!are_comparable(&Value::Bool(true), &Value::Bool(false)));
    }
}
