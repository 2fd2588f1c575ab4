use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identifier of a persisted row: a sequence integer or a UUID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RowId {
    Seq(i64),
    Uuid(Uuid),
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowId::Seq(n) => write!(f, "{}", n),
            RowId::Uuid(u) => write!(f, "{}", u),
        }
    }
}

impl FromStr for RowId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(n) = s.parse::<i64>() {
            return Ok(RowId::Seq(n));
        }
        Uuid::parse_str(s)
            .map(RowId::Uuid)
            .map_err(|_| format!("'{}' is neither a sequence id nor a UUID", s))
    }
}

impl From<i64> for RowId {
    fn from(n: i64) -> Self {
        RowId::Seq(n)
    }
}

impl From<Uuid> for RowId {
    fn from(u: Uuid) -> Self {
        RowId::Uuid(u)
    }
}

/// A single stored field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Null,
    Integer(i64),
    Text(String),
    Boolean(bool),
    Id(RowId),
    IdSet(Vec<RowId>),
}

impl Value {
    /// Text value, or `Null` when the input is empty or whitespace.
    pub fn optional_text(s: &str) -> Self {
        if s.trim().is_empty() {
            Value::Null
        } else {
            Value::Text(s.to_string())
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_id(&self) -> Option<&RowId> {
        match self {
            Value::Id(id) => Some(id),
            _ => None,
        }
    }

    /// Row ids this value points at, for foreign key checks.
    pub fn referenced_ids(&self) -> Vec<&RowId> {
        match self {
            Value::Id(id) => vec![id],
            Value::IdSet(ids) => ids.iter().collect(),
            _ => Vec::new(),
        }
    }

    /// Whether this value contains `needle`, treating `IdSet` as a set.
    pub fn contains(&self, needle: &Value) -> bool {
        match (self, needle) {
            (Value::IdSet(ids), Value::Id(id)) => ids.contains(id),
            _ => self == needle,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Integer(_) => "INTEGER",
            Value::Text(_) => "TEXT",
            Value::Boolean(_) => "BOOLEAN",
            Value::Id(_) => "ID",
            Value::IdSet(_) => "ID[]",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Integer(n) => write!(f, "{}", n),
            Value::Text(s) => write!(f, "'{}'", s),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Id(id) => write!(f, "{}", id),
            Value::IdSet(ids) => {
                let parts: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<RowId> for Value {
    fn from(id: RowId) -> Self {
        Value::Id(id)
    }
}

impl From<&RowId> for Value {
    fn from(id: &RowId) -> Self {
        Value::Id(id.clone())
    }
}

impl From<Vec<RowId>> for Value {
    fn from(ids: Vec<RowId>) -> Self {
        Value::IdSet(ids)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_id_parse() {
        assert_eq!("42".parse::<RowId>().unwrap(), RowId::Seq(42));

        let u = Uuid::new_v4();
        assert_eq!(u.to_string().parse::<RowId>().unwrap(), RowId::Uuid(u));

        assert!("tmp-17".parse::<RowId>().is_err());
    }

    #[test]
    fn test_row_id_untagged_serde() {
        let seq: RowId = serde_json::from_str("7").unwrap();
        assert_eq!(seq, RowId::Seq(7));

        let u = Uuid::new_v4();
        let parsed: RowId = serde_json::from_str(&format!("\"{}\"", u)).unwrap();
        assert_eq!(parsed, RowId::Uuid(u));
    }

    #[test]
    fn test_optional_text_normalizes_empty() {
        assert_eq!(Value::optional_text(""), Value::Null);
        assert_eq!(Value::optional_text("   "), Value::Null);
        assert_eq!(Value::optional_text("x"), Value::Text("x".into()));
    }

    #[test]
    fn test_id_set_contains() {
        let set = Value::IdSet(vec![RowId::Seq(1), RowId::Seq(3)]);
        assert!(set.contains(&Value::Id(RowId::Seq(3))));
        assert!(!set.contains(&Value::Id(RowId::Seq(2))));
        assert_eq!(set.referenced_ids().len(), 2);
    }
}
