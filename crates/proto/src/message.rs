use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Identity assigned to an accepted connection.
///
/// Opaque printable token; the only key correlating a live transport, its
/// back-channel entry, and every event emitted for it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    /// Returns the raw connection identifier string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ConnectionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Request headers captured at accept time, keyed by canonical header name.
pub type MultiValueHeaders = BTreeMap<String, Vec<String>>;

/// Collapses multi-value headers to their first value per name.
pub fn first_values(headers: &MultiValueHeaders) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, values)| values.first().map(|v| (name.clone(), v.clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_id_displays_raw_value() {
        let id = ConnectionId::from("abc=");
        assert_eq!(id.to_string(), "abc=");
        assert_eq!(id.as_str(), "abc=");
    }

    #[test]
    fn connection_id_serializes_as_plain_string() {
        let json = serde_json::to_string(&ConnectionId::from("xyz")).expect("serialize");
        assert_eq!(json, "\"xyz\"");
    }

    #[test]
    fn first_values_skips_empty_entries() {
        let mut headers = MultiValueHeaders::new();
        headers.insert("Accept".into(), vec!["a".into(), "b".into()]);
        headers.insert("Empty".into(), vec![]);

        let single = first_values(&headers);
        assert_eq!(single.get("Accept").map(String::as_str), Some("a"));
        assert!(!single.contains_key("Empty"));
    }
}
