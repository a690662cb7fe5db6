//! Record identity.
//!
//! Every record is addressed by a [`Key`]: either the cache-assigned local
//! row id, or the identifier issued by the remote store. The variant is
//! carried explicitly, so nothing ever has to guess which key space an id
//! belongs to from its shape.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identity of a record in either key space.
///
/// Serialized as `{"local": 7}` or `{"remote": "9f2c..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Key {
    /// Auto-incremented row id in the local cache. Never sent to the remote store.
    Local(i64),
    /// Server-issued identifier. Immutable once assigned.
    Remote(String),
}

impl Key {
    /// Shorthand for a remote key.
    pub fn remote(id: impl Into<String>) -> Self {
        Self::Remote(id.into())
    }

    #[must_use]
    pub const fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }

    /// The remote identifier, if this key lives in the remote key space.
    #[must_use]
    pub fn remote_id(&self) -> Option<&str> {
        match self {
            Self::Remote(id) => Some(id),
            Self::Local(_) => None,
        }
    }

    /// The local row id, if this key lives in the local key space.
    #[must_use]
    pub const fn local_id(&self) -> Option<i64> {
        match self {
            Self::Local(id) => Some(*id),
            Self::Remote(_) => None,
        }
    }

    /// JSON form used inside cached documents.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Local(id) => serde_json::json!({ "local": id }),
            Self::Remote(id) => serde_json::json!({ "remote": id }),
        }
    }

    /// Parse the JSON form produced by [`Key::to_json`].
    #[must_use]
    pub fn from_json(value: &Value) -> Option<Self> {
        Self::deserialize(value).ok()
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(id) => write!(f, "local:{id}"),
            Self::Remote(id) => write!(f, "remote:{id}"),
        }
    }
}

impl FromStr for Key {
    type Err = String;

    /// Accepts `local:<n>`, `remote:<id>`, or a bare remote id.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("empty key".to_string());
        }
        if let Some(rest) = s.strip_prefix("local:") {
            return rest
                .parse::<i64>()
                .map(Self::Local)
                .map_err(|_| format!("invalid local key: {s}"));
        }
        let id = s.strip_prefix("remote:").unwrap_or(s);
        if id.is_empty() {
            return Err(format!("invalid remote key: {s}"));
        }
        Ok(Self::Remote(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_shape() {
        assert_eq!(Key::Local(3).to_json(), serde_json::json!({"local": 3}));
        assert_eq!(
            Key::remote("R9").to_json(),
            serde_json::json!({"remote": "R9"})
        );
        assert_eq!(
            Key::from_json(&serde_json::json!({"remote": "R9"})),
            Some(Key::remote("R9"))
        );
        assert_eq!(Key::from_json(&serde_json::json!("R9")), None);
    }

    #[test]
    fn test_parse_cli_forms() {
        assert_eq!("local:12".parse::<Key>().unwrap(), Key::Local(12));
        assert_eq!("remote:abc".parse::<Key>().unwrap(), Key::remote("abc"));
        assert_eq!("abc".parse::<Key>().unwrap(), Key::remote("abc"));
        assert!("local:x".parse::<Key>().is_err());
        assert!("".parse::<Key>().is_err());
    }

    #[test]
    fn test_accessors() {
        let key = Key::Local(4);
        assert_eq!(key.local_id(), Some(4));
        assert_eq!(key.remote_id(), None);
        assert!(!key.is_remote());
        assert_eq!(key.to_string(), "local:4");
    }
}
