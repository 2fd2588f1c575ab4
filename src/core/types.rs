use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::{RowId, Value};

pub type Fields = BTreeMap<String, Value>;

/// Named collections (tables) the reconciliation engine touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Companies,
    Sectors,
    Roles,
    Units,
    Collaborators,
    Forms,
}

impl Collection {
    pub const ALL: [Collection; 6] = [
        Collection::Companies,
        Collection::Sectors,
        Collection::Roles,
        Collection::Units,
        Collection::Collaborators,
        Collection::Forms,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Companies => "companies",
            Collection::Sectors => "sectors",
            Collection::Roles => "roles",
            Collection::Units => "units",
            Collection::Collaborators => "collaborators",
            Collection::Forms => "forms",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored row: its surrogate id plus named fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RowId,
    pub fields: Fields,
}

impl Record {
    pub fn new(id: RowId, fields: Fields) -> Self {
        Self { id, fields }
    }

    /// Field lookup; the pseudo-column `id` yields the row id.
    pub fn get(&self, column: &str) -> Option<Value> {
        if column == "id" {
            return Some(Value::Id(self.id.clone()));
        }
        self.fields.get(column).cloned()
    }

    pub fn text(&self, column: &str) -> Option<&str> {
        self.fields.get(column).and_then(Value::as_text)
    }
}
