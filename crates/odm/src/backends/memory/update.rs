//! Update operator application for the in-memory store

use bson::{Bson, Document};

use crate::error::{ModelResult, StorageError};

/// Check whether an update document uses operators rather than replacement
pub(crate) fn is_operator_update(update: &Document) -> bool {
    update.keys().next().is_some_and(|key| key.starts_with('$'))
}

/// Apply an operator update to a stored document
pub(crate) fn apply_update(doc: &mut Document, update: &Document) -> ModelResult<()> {
    if !is_operator_update(update) {
        return Err(StorageError::Operation("update document requires atomic operators".to_string()).into());
    }

    for (op, fields) in update {
        let fields = fields
            .as_document()
            .ok_or_else(|| StorageError::Operation(format!("{} requires a document", op)))?;

        for (path, value) in fields {
            if path == "_id" {
                if lookup_ref(doc, path) != Some(value) {
                    return Err(StorageError::Operation("the _id field is immutable".to_string()).into());
                }
                continue;
            }

            match op.as_str() {
                "$set" => set_path(doc, path, value.clone())?,
                "$unset" => {
                    unset_path(doc, path);
                }
                "$inc" => {
                    let current = lookup_ref(doc, path).cloned().unwrap_or(Bson::Int32(0));
                    set_path(doc, path, add(&current, value, path)?)?;
                }
                "$push" => {
                    let mut items = match lookup_ref(doc, path) {
                        Some(Bson::Array(items)) => items.clone(),
                        None => Vec::new(),
                        Some(_) => {
                            return Err(StorageError::Operation(format!("{} is not an array", path)).into())
                        }
                    };
                    items.push(value.clone());
                    set_path(doc, path, Bson::Array(items))?;
                }
                other => {
                    return Err(StorageError::Unsupported(format!("update operator {}", other)).into());
                }
            }
        }
    }

    Ok(())
}

/// Replace the content of a stored document, keeping its identifier
pub(crate) fn replace(doc: &mut Document, replacement: &Document) -> ModelResult<()> {
    if is_operator_update(replacement) {
        return Err(StorageError::Operation("replacement document must not contain operators".to_string()).into());
    }

    let id = doc.get("_id").cloned();
    if let (Some(id), Some(new_id)) = (&id, replacement.get("_id")) {
        if id != new_id {
            return Err(StorageError::Operation("the _id field is immutable".to_string()).into());
        }
    }

    let mut next = Document::new();
    if let Some(id) = id {
        next.insert("_id", id);
    }
    for (key, value) in replacement {
        if key != "_id" {
            next.insert(key.clone(), value.clone());
        }
    }
    *doc = next;
    Ok(())
}

fn lookup_ref<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    super::filter::lookup(doc, path)
}

fn set_path(doc: &mut Document, path: &str, value: Bson) -> ModelResult<()> {
    match path.split_once('.') {
        None => {
            doc.insert(path, value);
            Ok(())
        }
        Some((head, rest)) => {
            let child = doc
                .entry(head.to_string())
                .or_insert_with(|| Bson::Document(Document::new()));
            match child {
                Bson::Document(inner) => set_path(inner, rest, value),
                _ => Err(StorageError::Operation(format!("cannot create field in non-document `{}`", head)).into()),
            }
        }
    }
}

fn unset_path(doc: &mut Document, path: &str) -> Option<Bson> {
    match path.split_once('.') {
        None => doc.remove(path),
        Some((head, rest)) => match doc.get_mut(head) {
            Some(Bson::Document(inner)) => unset_path(inner, rest),
            _ => None,
        },
    }
}

fn add(current: &Bson, delta: &Bson, path: &str) -> ModelResult<Bson> {
    let sum = match (current, delta) {
        (Bson::Int32(a), Bson::Int32(b)) => a
            .checked_add(*b)
            .map(Bson::Int32)
            .unwrap_or_else(|| Bson::Int64(i64::from(*a) + i64::from(*b))),
        (Bson::Int32(a), Bson::Int64(b)) => Bson::Int64(i64::from(*a) + b),
        (Bson::Int64(a), Bson::Int32(b)) => Bson::Int64(a + i64::from(*b)),
        (Bson::Int64(a), Bson::Int64(b)) => Bson::Int64(a + b),
        (Bson::Double(a), Bson::Double(b)) => Bson::Double(a + b),
        (Bson::Double(a), Bson::Int32(b)) => Bson::Double(a + f64::from(*b)),
        (Bson::Double(a), Bson::Int64(b)) => Bson::Double(a + *b as f64),
        (Bson::Int32(a), Bson::Double(b)) => Bson::Double(f64::from(*a) + b),
        (Bson::Int64(a), Bson::Double(b)) => Bson::Double(*a as f64 + b),
        _ => {
            return Err(StorageError::Operation(format!("cannot apply $inc to non-numeric field `{}`", path)).into())
        }
    };
    Ok(sum)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn test_set_unset_inc_push() {
        let mut doc = doc! { "_id": 1, "a": 1, "b": "x", "n": { "c": 2 } };
        apply_update(
            &mut doc,
            &doc! {
                "$set": { "b": "y", "n.d": 3 },
                "$unset": { "a": "" },
                "$inc": { "n.c": 5, "fresh": 2 },
                "$push": { "list": "item" },
            },
        )
        .unwrap();

        assert_eq!(
            doc,
            doc! { "_id": 1, "b": "y", "n": { "c": 7, "d": 3 }, "fresh": 2, "list": ["item"] }
        );
    }

    #[test]
    fn test_id_is_immutable() {
        let mut doc = doc! { "_id": 1, "a": 1 };
        assert!(apply_update(&mut doc, &doc! { "$set": { "_id": 2 } }).is_err());
        assert!(apply_update(&mut doc, &doc! { "$set": { "_id": 1, "a": 2 } }).is_ok());
        assert_eq!(doc.get_i32("a").unwrap(), 2);
    }

    #[test]
    fn test_replace_keeps_id() {
        let mut doc = doc! { "_id": 1, "a": 1 };
        replace(&mut doc, &doc! { "b": 2 }).unwrap();
        assert_eq!(doc, doc! { "_id": 1, "b": 2 });
        assert!(replace(&mut doc, &doc! { "$set": { "b": 3 } }).is_err());
    }

    #[test]
    fn test_plain_document_is_not_an_update() {
        let mut doc = doc! { "_id": 1 };
        assert!(apply_update(&mut doc, &doc! { "a": 1 }).is_err());
    }
}
