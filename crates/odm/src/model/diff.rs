//! Snapshot diffing for minimal updates

use bson::{doc, Bson, Document};

use super::core_trait::ID_KEY;

/// Update document turning `snapshot` into `current`
///
/// Changed and new top-level keys are `$set` whole, keys missing from
/// `current` are `$unset`, equal keys are skipped. The identifier is never
/// part of an update. Returns `None` when nothing changed.
pub fn changes(snapshot: &Document, current: &Document) -> Option<Document> {
    let mut set = Document::new();
    let mut unset = Document::new();

    for (key, value) in current {
        if key == ID_KEY {
            continue;
        }
        if snapshot.get(key) != Some(value) {
            set.insert(key.clone(), value.clone());
        }
    }

    for key in snapshot.keys() {
        if key != ID_KEY && !current.contains_key(key) {
            unset.insert(key.clone(), Bson::String(String::new()));
        }
    }

    if set.is_empty() && unset.is_empty() {
        return None;
    }

    let mut update = doc! {};
    if !set.is_empty() {
        update.insert("$set", set);
    }
    if !unset.is_empty() {
        update.insert("$unset", unset);
    }
    Some(update)
}
