use crate::core::{Record, RowId, Value};

/// A single equality or membership predicate on one column.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(String, Value),
    In(String, Vec<Value>),
}

impl Condition {
    pub fn column(&self) -> &str {
        match self {
            Condition::Eq(column, _) | Condition::In(column, _) => column,
        }
    }

    fn matches(&self, record: &Record) -> bool {
        let field = record.get(self.column()).unwrap_or(Value::Null);
        match self {
            Condition::Eq(_, expected) => field.contains(expected),
            Condition::In(_, candidates) => candidates.iter().any(|c| field.contains(c)),
        }
    }
}

/// Conjunction of conditions. An empty filter matches every row.
///
/// ```
/// use orgsync::storage::Filter;
///
/// let filter = Filter::new().eq("name", "Ops").eq("archived", false);
/// assert_eq!(filter.conditions().len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn by_id(id: &RowId) -> Self {
        Self::new().eq("id", id)
    }

    pub fn eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.conditions
            .push(Condition::Eq(column.to_string(), value.into()));
        self
    }

    /// Membership test. An empty candidate list matches nothing.
    pub fn is_in<I, V>(mut self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values = values.into_iter().map(Into::into).collect();
        self.conditions.push(Condition::In(column.to_string(), values));
        self
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.conditions.iter().all(|c| c.matches(record))
    }
}
