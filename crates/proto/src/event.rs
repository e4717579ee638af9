use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ProtoError;
use crate::message::{ConnectionId, MultiValueHeaders, first_values};

/// Lifecycle event kind delivered to the handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventType {
    /// Connection accepted; the handler may reject it.
    Connect,
    /// Connection is going away.
    Disconnect,
    /// Text frame received from the client.
    Message,
}

impl EventType {
    /// Wire name of the event kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Connect => "CONNECT",
            EventType::Disconnect => "DISCONNECT",
            EventType::Message => "MESSAGE",
        }
    }

    /// Route key a managed gateway would select for this kind.
    pub fn route_key(&self) -> &'static str {
        match self {
            EventType::Connect => "$connect",
            EventType::Disconnect => "$disconnect",
            EventType::Message => "$default",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventType {
    type Err = ProtoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CONNECT" => Ok(EventType::Connect),
            "DISCONNECT" => Ok(EventType::Disconnect),
            "MESSAGE" => Ok(EventType::Message),
            other => Err(ProtoError::InvalidEventType(other.to_string())),
        }
    }
}

/// Per-event request metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    /// Identity of the connection this event belongs to.
    pub connection_id: ConnectionId,
    /// Lifecycle kind.
    pub event_type: EventType,
    /// `$connect`, `$disconnect` or `$default`.
    pub route_key: String,
    /// Fresh identifier for this single event.
    pub request_id: String,
    /// Accept time of the connection, epoch milliseconds.
    pub connected_at: i64,
    /// Synthesis time of this event, epoch milliseconds.
    pub request_time_epoch: i64,
    /// Always `IN`: events only flow from client to handler.
    pub message_direction: String,
    /// Deployment stage name.
    pub stage: String,
}

/// Lifecycle or message event passed to the handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebsocketEvent {
    pub request_context: RequestContext,
    /// First value of each captured header.
    pub headers: BTreeMap<String, String>,
    /// Headers of the upgrade request, shared by every event of the connection.
    pub multi_value_headers: MultiValueHeaders,
    /// Exact text payload for `MESSAGE`, empty otherwise.
    pub body: String,
}

/// Stage name reported in every event.
pub const LOCAL_STAGE: &str = "local";

impl WebsocketEvent {
    /// Builds an event from identity, kind, body and headers.
    ///
    /// The body is stored as given; no trimming or re-encoding happens.
    pub fn new(
        connection_id: ConnectionId,
        event_type: EventType,
        body: impl Into<String>,
        multi_value_headers: MultiValueHeaders,
    ) -> Self {
        let now = Utc::now().timestamp_millis();
        Self::with_connected_at(connection_id, event_type, body, multi_value_headers, now)
    }

    fn with_connected_at(
        connection_id: ConnectionId,
        event_type: EventType,
        body: impl Into<String>,
        multi_value_headers: MultiValueHeaders,
        connected_at: i64,
    ) -> Self {
        Self {
            request_context: RequestContext {
                connection_id,
                event_type,
                route_key: event_type.route_key().to_string(),
                request_id: Uuid::new_v4().to_string(),
                connected_at,
                request_time_epoch: Utc::now().timestamp_millis(),
                message_direction: "IN".to_string(),
                stage: LOCAL_STAGE.to_string(),
            },
            headers: first_values(&multi_value_headers),
            multi_value_headers,
            body: body.into(),
        }
    }

    /// Identity of the originating connection.
    pub fn connection_id(&self) -> &ConnectionId {
        &self.request_context.connection_id
    }

    /// Lifecycle kind of this event.
    pub fn event_type(&self) -> EventType {
        self.request_context.event_type
    }
}

/// Accept-time facts shared by every event of one connection.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    connection_id: ConnectionId,
    headers: MultiValueHeaders,
    connected_at: i64,
}

impl ConnectionInfo {
    /// Captures identity and headers at accept time.
    pub fn new(connection_id: ConnectionId, headers: MultiValueHeaders) -> Self {
        Self {
            connection_id,
            headers,
            connected_at: Utc::now().timestamp_millis(),
        }
    }

    /// Identity of the connection.
    pub fn connection_id(&self) -> &ConnectionId {
        &self.connection_id
    }

    /// Headers captured at accept time.
    pub fn headers(&self) -> &MultiValueHeaders {
        &self.headers
    }

    /// `CONNECT` event for this connection.
    pub fn connect_event(&self) -> WebsocketEvent {
        self.event(EventType::Connect, String::new())
    }

    /// `MESSAGE` event carrying `body` unmodified.
    pub fn message_event(&self, body: impl Into<String>) -> WebsocketEvent {
        self.event(EventType::Message, body)
    }

    /// `DISCONNECT` event for this connection.
    pub fn disconnect_event(&self) -> WebsocketEvent {
        self.event(EventType::Disconnect, String::new())
    }

    fn event(&self, event_type: EventType, body: impl Into<String>) -> WebsocketEvent {
        WebsocketEvent::with_connected_at(
            self.connection_id.clone(),
            event_type,
            body,
            self.headers.clone(),
            self.connected_at,
        )
    }
}
