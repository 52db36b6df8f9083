use super::phid::Phid;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Old/new payload of a transaction.
///
/// The JSON form is untagged so edit scripts can write plain literals:
/// `null`, `true`, `3`, `"name"`, `["a", "b"]` or `{"+": ["PHID-..."]}`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
    List(Vec<String>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn phids<'a>(phids: impl IntoIterator<Item = &'a Phid>) -> Self {
        Self::List(phids.into_iter().map(|p| p.to_string()).collect())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Int(i) => Some(*i != 0),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    /// True for null and for text that is empty after trimming.
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Parses a list value as a PHID set; `Null` is the empty set.
    pub fn to_phid_set(&self) -> Option<BTreeSet<Phid>> {
        match self {
            Self::Null => Some(BTreeSet::new()),
            Self::List(items) => items.iter().map(|s| Phid::parse(s).ok()).collect(),
            _ => None,
        }
    }

    /// Short human form used in rendered titles.
    pub fn display(&self) -> String {
        match self {
            Self::Null => "none".to_string(),
            Self::Bool(b) => b.to_string(),
            Self::Int(i) => i.to_string(),
            Self::Text(s) => s.clone(),
            Self::List(items) => items.join(", "),
            Self::Map(map) => serde_json::to_string(map).unwrap_or_default(),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_untagged_json_literals() {
        let parsed: Vec<Value> =
            serde_json::from_str(r#"[null, true, 3, "x", ["a"], {"+": ["b"]}]"#).unwrap();
        assert_eq!(parsed[0], Value::Null);
        assert_eq!(parsed[1], Value::Bool(true));
        assert_eq!(parsed[2], Value::Int(3));
        assert_eq!(parsed[3], Value::text("x"));
        assert_eq!(parsed[4], Value::List(vec!["a".into()]));
        assert_eq!(
            parsed[5].as_map().unwrap().get("+"),
            Some(&Value::List(vec!["b".into()]))
        );
    }

    #[test]
    fn test_blank_values() {
        assert!(Value::Null.is_blank());
        assert!(Value::text("   ").is_blank());
        assert!(!Value::text("a").is_blank());
        assert!(!Value::Bool(false).is_blank());
    }

    #[test]
    fn test_phid_set_rejects_invalid_entries() {
        let ok = Value::List(vec!["PHID-USER-a".into(), "PHID-USER-a".into()]);
        assert_eq!(ok.to_phid_set().unwrap().len(), 1);
        let bad = Value::List(vec!["nope".into()]);
        assert!(bad.to_phid_set().is_none());
    }
}
