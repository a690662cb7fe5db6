//! Conversion between cached entities and remote rows.
//!
//! Cached documents carry references as tagged [`Key`] JSON. Remote rows
//! carry plain remote id strings. A local key can never cross this
//! boundary: converting an entity that still points at an unpromoted
//! record fails with [`Error::UnresolvedReference`].

use serde_json::{Map, Value};

use super::{map_refs, Entity, Key, TRIP_REF};
use crate::error::{Error, Result};
use crate::remote::{RemoteError, Row};

/// Field changes for an update: top-level field name to new value.
pub type Patch = Map<String, Value>;

/// Serialize an entity into a JSON object.
pub fn to_document<T: Entity>(fields: &T) -> Result<Map<String, Value>> {
    match serde_json::to_value(fields)? {
        Value::Object(map) => Ok(map),
        other => Err(Error::Other(format!(
            "{} did not serialize to an object: {other}",
            T::KIND
        ))),
    }
}

/// Parse a cached JSON document back into an entity.
pub fn from_document<T: Entity>(doc: Map<String, Value>) -> Result<T> {
    Ok(serde_json::from_value(Value::Object(doc))?)
}

/// Build the row sent to the remote store for `fields`.
pub fn to_remote_row<T: Entity>(fields: &T) -> Result<Row> {
    let mut row = to_document(fields)?;
    let mut unresolved = None;
    map_refs(T::KIND, &mut row, |field, value| match Key::from_json(&value) {
        Some(Key::Remote(id)) => Some(Value::String(id)),
        _ => {
            unresolved.get_or_insert(field.name);
            None
        }
    });
    match unresolved {
        Some(field) => Err(Error::UnresolvedReference {
            kind: T::KIND,
            field,
        }),
        None => Ok(row),
    }
}

/// Split a remote row into its id and the entity it describes.
///
/// Unknown server columns are ignored.
pub fn from_remote_row<T: Entity>(mut row: Row) -> Result<(String, T)> {
    let id = match row.remove("id") {
        Some(Value::String(id)) if !id.is_empty() => id,
        Some(Value::Number(n)) => n.to_string(),
        _ => {
            return Err(RemoteError::Decode(format!("{} row without an id", T::KIND)).into());
        }
    };
    map_refs(T::KIND, &mut row, |_, value| match value {
        Value::String(s) => Some(Key::Remote(s).to_json()),
        Value::Number(n) => Some(Key::Remote(n.to_string()).to_json()),
        _ => None,
    });
    let fields = serde_json::from_value(Value::Object(row))
        .map_err(|e| RemoteError::Decode(format!("{} row {id}: {e}", T::KIND)))?;
    Ok((id, fields))
}

/// Apply a field patch to an entity.
///
/// The owning trip cannot be changed, and every patched field must exist on
/// the entity.
pub fn apply_patch<T: Entity>(current: &T, patch: &Patch) -> Result<T> {
    let mut doc = to_document(current)?;
    for (name, value) in patch {
        if name == TRIP_REF {
            return Err(Error::InvalidArgument(format!(
                "{} cannot be moved to another trip",
                T::KIND
            )));
        }
        if !doc.contains_key(name) {
            return Err(Error::InvalidArgument(format!(
                "{} has no field '{name}'",
                T::KIND
            )));
        }
        doc.insert(name.clone(), value.clone());
    }
    serde_json::from_value(Value::Object(doc))
        .map_err(|e| Error::InvalidArgument(format!("invalid {} patch: {e}", T::KIND)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Expense, PackingItem};
    use serde_json::json;

    #[test]
    fn test_remote_row_flattens_keys() {
        let mut expense = Expense::new(Key::remote("T1"), "Dinner", 42.5);
        expense.payer_id = Some(Key::remote("P1"));
        expense.charged_to = vec![Key::remote("P1"), Key::remote("P2")];

        let row = to_remote_row(&expense).unwrap();
        assert_eq!(row["trip_id"], json!("T1"));
        assert_eq!(row["payer_id"], json!("P1"));
        assert_eq!(row["charged_to"], json!(["P1", "P2"]));
    }

    #[test]
    fn test_local_reference_is_unresolved() {
        let mut expense = Expense::new(Key::remote("T1"), "Dinner", 1.0);
        expense.payer_id = Some(Key::Local(3));
        let err = to_remote_row(&expense).unwrap_err();
        assert!(matches!(
            err,
            Error::UnresolvedReference {
                field: "payer_id",
                ..
            }
        ));
    }

    #[test]
    fn test_from_remote_row_tags_keys() {
        let row = json!({
            "id": "E1",
            "trip_id": "T1",
            "title": "Taxi",
            "amount": 12.0,
            "payer_id": null,
            "charged_to": ["P1"],
            "created_at": "2026-01-01T00:00:00Z",
        });
        let (id, expense): (String, Expense) =
            from_remote_row(row.as_object().cloned().unwrap()).unwrap();
        assert_eq!(id, "E1");
        assert_eq!(expense.trip_id, Key::remote("T1"));
        assert_eq!(expense.payer_id, None);
        assert_eq!(expense.charged_to, vec![Key::remote("P1")]);
    }

    #[test]
    fn test_from_remote_row_requires_id() {
        let row = json!({"trip_id": "T1", "title": "Socks"});
        let err = from_remote_row::<PackingItem>(row.as_object().cloned().unwrap()).unwrap_err();
        assert!(matches!(err, Error::Remote(RemoteError::Decode(_))));
    }

    #[test]
    fn test_patch_rules() {
        let item = PackingItem::new(Key::Local(1), "Socks", 0);

        let mut patch = Patch::new();
        patch.insert("completed".into(), json!(true));
        let updated = apply_patch(&item, &patch).unwrap();
        assert!(updated.completed);
        assert_eq!(updated.title, "Socks");

        let mut bad = Patch::new();
        bad.insert("trip_id".into(), json!({"local": 2}));
        assert!(apply_patch(&item, &bad).is_err());

        let mut unknown = Patch::new();
        unknown.insert("weight".into(), json!(3));
        assert!(apply_patch(&item, &unknown).is_err());
    }
}
