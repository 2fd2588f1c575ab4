// ============================================================================
// Identity Classification
// ============================================================================
//
// Decides whether an identifier coming from a client-edited tree names a
// persisted row or a placeholder for a row that does not exist yet.
//
// Clients mint placeholders from the wall clock (milliseconds since epoch),
// so any positive integer below that magnitude is taken to be a database
// sequence id. A sequence that grows past the threshold would be
// misclassified as a placeholder and re-inserted; explicit tags avoid this.
//
// ============================================================================

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::RowId;

/// Smallest value treated as a client-side placeholder.
pub const PLACEHOLDER_ID_THRESHOLD: i64 = 1_000_000_000_000;

lazy_static! {
    static ref UUID_SHAPE: Regex = Regex::new(
        r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$"
    )
    .unwrap();
}

/// Explicit classification of an identifier.
///
/// Serialized as `{"persisted": 12}` or `{"pending": "tmp-1"}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Identity {
    Persisted(RowId),
    Pending(String),
}

impl Identity {
    pub fn persisted(&self) -> Option<&RowId> {
        match self {
            Identity::Persisted(id) => Some(id),
            Identity::Pending(_) => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Identity::Pending(_))
    }
}

/// Identifier as received from the client.
///
/// Tagged identities are taken as-is; bare numbers and strings go through
/// the shape heuristic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClientId {
    Tagged(Identity),
    Number(i64),
    Text(String),
}

impl ClientId {
    /// Canonical client-side key, used to link collaborators to units.
    pub fn key(&self) -> String {
        match self {
            ClientId::Tagged(Identity::Persisted(id)) => id.to_string(),
            ClientId::Tagged(Identity::Pending(key)) => key.clone(),
            ClientId::Number(n) => n.to_string(),
            ClientId::Text(s) => s.trim().to_string(),
        }
    }
}

impl From<i64> for ClientId {
    fn from(n: i64) -> Self {
        ClientId::Number(n)
    }
}

impl From<&str> for ClientId {
    fn from(s: &str) -> Self {
        ClientId::Text(s.to_string())
    }
}

impl From<RowId> for ClientId {
    fn from(id: RowId) -> Self {
        ClientId::Tagged(Identity::Persisted(id))
    }
}

pub fn is_uuid_shaped(s: &str) -> bool {
    UUID_SHAPE.is_match(s)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityClassifier {
    threshold: i64,
}

impl IdentityClassifier {
    pub fn new(threshold: i64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> i64 {
        self.threshold
    }

    pub fn classify(&self, id: &ClientId) -> Identity {
        match id {
            ClientId::Tagged(identity) => identity.clone(),
            ClientId::Number(n) => self.classify_number(*n),
            ClientId::Text(s) => self.classify_text(s),
        }
    }

    /// Classification of an optional id; a missing id is always pending.
    pub fn classify_opt(&self, id: Option<&ClientId>) -> Identity {
        match id {
            Some(id) => self.classify(id),
            None => Identity::Pending(String::new()),
        }
    }

    fn classify_number(&self, n: i64) -> Identity {
        if n > 0 && n < self.threshold {
            Identity::Persisted(RowId::Seq(n))
        } else {
            Identity::Pending(n.to_string())
        }
    }

    fn classify_text(&self, s: &str) -> Identity {
        let s = s.trim();
        if is_uuid_shaped(s)
            && let Ok(uuid) = Uuid::parse_str(s)
        {
            return Identity::Persisted(RowId::Uuid(uuid));
        }
        match s.parse::<i64>() {
            Ok(n) => self.classify_number(n),
            Err(_) => Identity::Pending(s.to_string()),
        }
    }
}

impl Default for IdentityClassifier {
    fn default() -> Self {
        Self::new(PLACEHOLDER_ID_THRESHOLD)
    }
}

/// Classify with the default threshold.
pub fn classify(id: &ClientId) -> Identity {
    IdentityClassifier::default().classify(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_boundary() {
        assert_eq!(
            classify(&ClientId::Number(999_999_999_999)),
            Identity::Persisted(RowId::Seq(999_999_999_999))
        );
        assert_eq!(
            classify(&ClientId::Number(1_700_000_000_000)),
            Identity::Pending("1700000000000".into())
        );
        assert!(classify(&ClientId::Number(PLACEHOLDER_ID_THRESHOLD)).is_pending());
    }

    #[test]
    fn test_small_ids_are_persisted() {
        assert_eq!(classify(&ClientId::Number(1)), Identity::Persisted(RowId::Seq(1)));
        assert!(classify(&ClientId::Number(0)).is_pending());
        assert!(classify(&ClientId::Number(-4)).is_pending());
    }

    #[test]
    fn test_uuid_is_persisted() {
        let u = Uuid::new_v4();
        assert_eq!(
            classify(&ClientId::Text(u.to_string())),
            Identity::Persisted(RowId::Uuid(u))
        );
        assert_eq!(
            classify(&ClientId::Text(u.to_string().to_uppercase())),
            Identity::Persisted(RowId::Uuid(u))
        );
    }

    #[test]
    fn test_numeric_strings_follow_number_rule() {
        assert_eq!(classify(&ClientId::from("42")), Identity::Persisted(RowId::Seq(42)));
        assert!(classify(&ClientId::from("1700000000000")).is_pending());
        assert_eq!(classify(&ClientId::from("tmp-3")), Identity::Pending("tmp-3".into()));
    }

    #[test]
    fn test_tagged_ids_bypass_heuristic() {
        let large: ClientId = serde_json::from_str(r#"{"persisted": 5000000000000}"#).unwrap();
        assert_eq!(classify(&large), Identity::Persisted(RowId::Seq(5_000_000_000_000)));

        let small: ClientId = serde_json::from_str(r#"{"pending": "7"}"#).unwrap();
        assert_eq!(classify(&small), Identity::Pending("7".into()));
    }

    #[test]
    fn test_untagged_forms_deserialize() {
        let n: ClientId = serde_json::from_str("17").unwrap();
        assert_eq!(n, ClientId::Number(17));
        let s: ClientId = serde_json::from_str(r#""abc""#).unwrap();
        assert_eq!(s, ClientId::Text("abc".into()));
    }

    #[test]
    fn test_key_is_shared_between_number_and_text() {
        assert_eq!(ClientId::Number(5).key(), ClientId::from("5").key());
        assert_eq!(ClientId::from(RowId::Seq(5)).key(), "5");
    }

    #[test]
    fn test_custom_threshold() {
        let classifier = IdentityClassifier::new(100);
        assert!(classifier.classify(&ClientId::Number(150)).is_pending());
        assert_eq!(classifier.threshold(), 100);
    }
}
