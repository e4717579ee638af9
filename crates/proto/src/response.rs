use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The only status code the bridge treats as success.
pub const STATUS_OK: u16 = 200;

/// Handler response, shaped like a proxy integration response.
///
/// The bridge only inspects `status_code`; headers and body are accepted so
/// handlers written for a managed gateway can return them unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyResponse {
    pub status_code: u16,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: String,
}

impl ProxyResponse {
    /// A `200` response with no body.
    pub fn ok() -> Self {
        Self::with_status(STATUS_OK)
    }

    /// An empty response carrying `status_code`.
    pub fn with_status(status_code: u16) -> Self {
        Self {
            status_code,
            headers: BTreeMap::new(),
            body: String::new(),
        }
    }

    /// Sets the response body.
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Whether the status marks success.
    pub fn is_ok(&self) -> bool {
        self.status_code == STATUS_OK
    }
}
