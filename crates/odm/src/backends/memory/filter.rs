//! Query filter evaluation for the in-memory store

use std::cmp::Ordering;

use bson::{Bson, Document};
use regex::RegexBuilder;

use crate::error::{ModelResult, StorageError};

/// Resolve a dotted path inside a document
pub(crate) fn lookup<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut parts = path.split('.');
    let first = parts.next()?;
    let mut current = doc.get(first)?;

    for part in parts {
        current = match current {
            Bson::Document(inner) => inner.get(part)?,
            Bson::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

/// Check whether a document satisfies a filter
pub(crate) fn matches(doc: &Document, filter: &Document) -> ModelResult<bool> {
    for (key, condition) in filter {
        let satisfied = match key.as_str() {
            "$and" => {
                let mut all = true;
                for clause in clauses(key, condition)? {
                    if !matches(doc, clause)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" => any_clause(doc, key, condition)?,
            "$nor" => !any_clause(doc, key, condition)?,
            op if op.starts_with('$') => {
                return Err(unsupported(op));
            }
            path => matches_field(lookup(doc, path), condition)?,
        };

        if !satisfied {
            return Ok(false);
        }
    }

    Ok(true)
}

fn any_clause(doc: &Document, key: &str, condition: &Bson) -> ModelResult<bool> {
    for clause in clauses(key, condition)? {
        if matches(doc, clause)? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn clauses<'a>(key: &str, condition: &'a Bson) -> ModelResult<Vec<&'a Document>> {
    let invalid = || StorageError::Operation(format!("{} requires an array of documents", key));
    match condition {
        Bson::Array(items) => items
            .iter()
            .map(|item| item.as_document().ok_or_else(invalid))
            .collect::<Result<Vec<_>, _>>()
            .map_err(Into::into),
        _ => Err(invalid().into()),
    }
}

fn is_operator_document(condition: &Bson) -> Option<&Document> {
    match condition {
        Bson::Document(doc) if doc.keys().next().is_some_and(|k| k.starts_with('$')) => Some(doc),
        _ => None,
    }
}

fn matches_field(value: Option<&Bson>, condition: &Bson) -> ModelResult<bool> {
    let Some(operators) = is_operator_document(condition) else {
        return Ok(equals(value, condition));
    };

    for (op, operand) in operators {
        let satisfied = match op.as_str() {
            "$eq" => equals(value, operand),
            "$ne" => !equals(value, operand),
            "$gt" => compares(value, operand, |o| o == Ordering::Greater),
            "$gte" => compares(value, operand, |o| o != Ordering::Less),
            "$lt" => compares(value, operand, |o| o == Ordering::Less),
            "$lte" => compares(value, operand, |o| o != Ordering::Greater),
            "$in" => in_list(value, op, operand)?,
            "$nin" => !in_list(value, op, operand)?,
            "$exists" => {
                let wanted = match operand {
                    Bson::Boolean(flag) => *flag,
                    Bson::Int32(n) => *n != 0,
                    Bson::Int64(n) => *n != 0,
                    _ => true,
                };
                value.is_some() == wanted
            }
            "$regex" => regex_matches(value, operand, operators.get_str("$options").unwrap_or(""))?,
            "$options" => true,
            "$not" => !matches_field(value, operand)?,
            other => return Err(unsupported(other)),
        };

        if !satisfied {
            return Ok(false);
        }
    }

    Ok(true)
}

/// Equality with array membership and null-matches-missing semantics
fn equals(value: Option<&Bson>, target: &Bson) -> bool {
    match value {
        None => matches!(target, Bson::Null),
        Some(Bson::Array(items)) if !matches!(target, Bson::Array(_)) => {
            items.iter().any(|item| values_equal(item, target))
        }
        Some(value) => values_equal(value, target),
    }
}

fn values_equal(left: &Bson, right: &Bson) -> bool {
    match (as_number(left), as_number(right)) {
        (Some(a), Some(b)) => a == b,
        _ => left == right,
    }
}

fn compares(value: Option<&Bson>, operand: &Bson, accept: impl Fn(Ordering) -> bool) -> bool {
    match value {
        Some(Bson::Array(items)) => items
            .iter()
            .any(|item| compare_values(item, operand).is_some_and(&accept)),
        Some(value) => compare_values(value, operand).is_some_and(accept),
        None => false,
    }
}

fn in_list(value: Option<&Bson>, op: &str, operand: &Bson) -> ModelResult<bool> {
    match operand {
        Bson::Array(candidates) => Ok(candidates.iter().any(|candidate| equals(value, candidate))),
        _ => Err(StorageError::Operation(format!("{} requires an array", op)).into()),
    }
}

fn regex_matches(value: Option<&Bson>, pattern: &Bson, options: &str) -> ModelResult<bool> {
    let (source, flags) = match pattern {
        Bson::String(source) => (source.as_str(), options),
        Bson::RegularExpression(regex) => (regex.pattern.as_str(), regex.options.as_str()),
        _ => return Err(StorageError::Operation("$regex requires a string".to_string()).into()),
    };

    let regex = RegexBuilder::new(source)
        .case_insensitive(flags.contains('i'))
        .multi_line(flags.contains('m'))
        .build()
        .map_err(|e| StorageError::Operation(format!("invalid $regex: {}", e)))?;

    Ok(match value {
        Some(Bson::String(text)) => regex.is_match(text),
        Some(Bson::Array(items)) => items
            .iter()
            .any(|item| matches!(item, Bson::String(text) if regex.is_match(text))),
        _ => false,
    })
}

fn as_number(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(f64::from(*n)),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(n) => Some(*n),
        _ => None,
    }
}

/// Compare two values of the same kind
pub(crate) fn compare_values(left: &Bson, right: &Bson) -> Option<Ordering> {
    if let (Some(a), Some(b)) = (as_number(left), as_number(right)) {
        return a.partial_cmp(&b);
    }

    match (left, right) {
        (Bson::String(a), Bson::String(b)) => Some(a.cmp(b)),
        (Bson::Boolean(a), Bson::Boolean(b)) => Some(a.cmp(b)),
        (Bson::DateTime(a), Bson::DateTime(b)) => Some(a.cmp(b)),
        (Bson::ObjectId(a), Bson::ObjectId(b)) => Some(a.bytes().cmp(&b.bytes())),
        (Bson::Null, Bson::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

/// Total order used when sorting, ranking values by type first
pub(crate) fn sort_order(left: Option<&Bson>, right: Option<&Bson>) -> Ordering {
    fn rank(value: Option<&Bson>) -> u8 {
        match value {
            None | Some(Bson::Null) | Some(Bson::Undefined) => 0,
            Some(Bson::Int32(_)) | Some(Bson::Int64(_)) | Some(Bson::Double(_)) => 1,
            Some(Bson::String(_)) => 2,
            Some(Bson::Document(_)) => 3,
            Some(Bson::Array(_)) => 4,
            Some(Bson::ObjectId(_)) => 5,
            Some(Bson::Boolean(_)) => 6,
            Some(Bson::DateTime(_)) => 7,
            Some(_) => 8,
        }
    }

    match (left, right) {
        (Some(a), Some(b)) => compare_values(a, b).unwrap_or_else(|| rank(left).cmp(&rank(right))),
        _ => rank(left).cmp(&rank(right)),
    }
}

/// Sort documents in place by a `{field: 1 | -1}` sort document
pub(crate) fn sort_documents(documents: &mut [Document], sort: &Document) {
    documents.sort_by(|a, b| {
        for (path, direction) in sort {
            let order = sort_order(lookup(a, path), lookup(b, path));
            let descending = matches!(direction, Bson::Int32(n) if *n < 0)
                || matches!(direction, Bson::Int64(n) if *n < 0)
                || matches!(direction, Bson::Double(n) if *n < 0.0);
            let order = if descending { order.reverse() } else { order };
            if order != Ordering::Equal {
                return order;
            }
        }
        Ordering::Equal
    });
}

/// Apply an inclusion or exclusion projection
pub(crate) fn project(doc: Document, projection: &Document) -> Document {
    let truthy = |value: &Bson| match value {
        Bson::Boolean(flag) => *flag,
        Bson::Int32(n) => *n != 0,
        Bson::Int64(n) => *n != 0,
        Bson::Double(n) => *n != 0.0,
        _ => true,
    };

    let inclusive = projection
        .iter()
        .any(|(key, value)| key != "_id" && truthy(value));
    let keep_id = projection.get("_id").map_or(true, truthy);

    doc.into_iter()
        .filter(|(key, _)| {
            if key == "_id" {
                keep_id
            } else if inclusive {
                projection.get(key).is_some_and(truthy)
            } else {
                projection.get(key).map_or(true, |value| truthy(value))
            }
        })
        .collect()
}

fn unsupported(op: &str) -> crate::error::ModelError {
    StorageError::Unsupported(format!("query operator {}", op)).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn sample() -> Document {
        doc! {
            "name": "ada",
            "age": 36,
            "score": 9.5,
            "tags": ["math", "engines"],
            "address": { "city": "London" },
        }
    }

    #[test]
    fn test_equality_and_paths() {
        let doc = sample();
        assert!(matches(&doc, &doc! { "name": "ada" }).unwrap());
        assert!(matches(&doc, &doc! { "address.city": "London" }).unwrap());
        assert!(matches(&doc, &doc! { "tags": "math" }).unwrap());
        assert!(matches(&doc, &doc! { "age": 36.0 }).unwrap());
        assert!(matches(&doc, &doc! { "missing": Bson::Null }).unwrap());
        assert!(!matches(&doc, &doc! { "name": "bob" }).unwrap());
    }

    #[test]
    fn test_operators() {
        let doc = sample();
        assert!(matches(&doc, &doc! { "age": { "$gt": 30, "$lte": 36_i64 } }).unwrap());
        assert!(!matches(&doc, &doc! { "age": { "$lt": 30 } }).unwrap());
        assert!(matches(&doc, &doc! { "name": { "$in": ["bob", "ada"] } }).unwrap());
        assert!(matches(&doc, &doc! { "name": { "$nin": ["bob"] } }).unwrap());
        assert!(matches(&doc, &doc! { "missing": { "$exists": false } }).unwrap());
        assert!(matches(&doc, &doc! { "name": { "$regex": "^A", "$options": "i" } }).unwrap());
        assert!(matches(&doc, &doc! { "age": { "$not": { "$gt": 40 } } }).unwrap());
    }

    #[test]
    fn test_logical_operators() {
        let doc = sample();
        assert!(matches(&doc, &doc! { "$or": [{ "name": "bob" }, { "age": 36 }] }).unwrap());
        assert!(!matches(&doc, &doc! { "$and": [{ "name": "ada" }, { "age": 1 }] }).unwrap());
        assert!(matches(&doc, &doc! { "$nor": [{ "name": "bob" }] }).unwrap());
    }

    #[test]
    fn test_unknown_operator_is_unsupported() {
        let err = matches(&sample(), &doc! { "age": { "$where": "x" } }).unwrap_err();
        assert!(matches!(err, crate::error::ModelError::Storage(StorageError::Unsupported(_))));
    }

    #[test]
    fn test_sort_and_project() {
        let mut docs = vec![doc! { "n": 2, "s": "b" }, doc! { "n": 1, "s": "a" }, doc! { "s": "c" }];
        sort_documents(&mut docs, &doc! { "n": -1 });
        assert_eq!(docs[0].get_i32("n").unwrap(), 2);
        assert!(docs[2].get("n").is_none());

        let projected = project(doc! { "_id": 1, "a": 1, "b": 2 }, &doc! { "a": 1 });
        assert_eq!(projected, doc! { "_id": 1, "a": 1 });

        let excluded = project(doc! { "_id": 1, "a": 1, "b": 2 }, &doc! { "b": 0, "_id": 0 });
        assert_eq!(excluded, doc! { "a": 1 });
    }
}
