//! Import key remapping.
//!
//! Imported records get fresh local keys; the tokens a document used for
//! them are only meaningful inside that document. [`IdMap`] records token
//! to key per kind as records are inserted, and [`remap_refs`] rewrites a
//! document's references through it.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::model::{map_refs, EntityKind, Key};

/// Document token → fresh key, per entity kind.
#[derive(Debug, Default)]
pub struct IdMap {
    maps: HashMap<EntityKind, HashMap<String, Key>>,
}

impl IdMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, kind: EntityKind, token: impl Into<String>, key: Key) {
        self.maps.entry(kind).or_default().insert(token.into(), key);
    }

    #[must_use]
    pub fn resolve(&self, kind: EntityKind, token: &str) -> Option<&Key> {
        self.maps.get(&kind).and_then(|m| m.get(token))
    }

    #[must_use]
    pub fn count(&self, kind: EntityKind) -> usize {
        self.maps.get(&kind).map_or(0, HashMap::len)
    }
}

/// Rewrite the reference tokens in `doc` to the keys in `map`.
///
/// A token with no entry is dropped: an optional reference becomes null, an
/// element of a list reference is removed. Returns how many were dropped.
pub fn remap_refs(kind: EntityKind, doc: &mut Map<String, Value>, map: &IdMap) -> usize {
    let mut dropped = 0;
    map_refs(kind, doc, |field, value| {
        let resolved = value
            .as_str()
            .and_then(|token| map.resolve(field.target, token))
            .map(Key::to_json);
        if resolved.is_none() {
            dropped += 1;
        }
        resolved
    });
    dropped
}
