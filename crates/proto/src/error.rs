use std::time::Duration;

use thiserror::Error;

use crate::message::ConnectionId;

/// Top-level error type
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration loading/validation error.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Gateway bootstrap/runtime error.
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// Duplex transport error.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Handler invocation error.
    #[error("Handler error: {0}")]
    Handler(#[from] HandlerError),

    /// Management API error.
    #[error("Management error: {0}")]
    Management(#[from] ManagementError),

    /// Internal protocol type error.
    #[error("Proto error: {0}")]
    Proto(#[from] ProtoError),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A field has an invalid value and reason.
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    /// Filesystem read error.
    #[error("IO error reading config: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parse error.
    #[error("TOML parse error: {0}")]
    Toml(String),
}

/// Gateway errors
#[derive(Debug, Error)]
pub enum GatewayError {
    /// No connection identity could be generated.
    #[error("Identity generation failed: {0}")]
    Identity(String),

    /// Listener could not be bound.
    #[error("Bind failed: {0}")]
    Bind(String),

    /// HTTP server loop failed.
    #[error("Server error: {0}")]
    Serve(String),
}

/// Duplex transport errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Protocol upgrade failed.
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// Reading the next frame failed.
    #[error("Read failed: {0}")]
    Read(String),

    /// Writing a frame failed.
    #[error("Write failed: {0}")]
    Write(String),

    /// The connection is already closed.
    #[error("Connection closed")]
    Closed,
}

/// Handler invocation errors
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The handler returned an error.
    #[error("{0}")]
    Failed(String),

    /// The handler returned a non-OK status code.
    #[error("status code: {0}")]
    Status(u16),

    /// The handler did not finish before its deadline.
    #[error("Handler timed out after {0:?}")]
    Timeout(Duration),

    /// The handler panicked.
    #[error("Handler panicked: {0}")]
    Panicked(String),

    /// A management API call made by the handler failed.
    #[error(transparent)]
    Management(#[from] ManagementError),
}

impl HandlerError {
    /// Wraps any displayable failure as a handler error.
    pub fn failed(reason: impl std::fmt::Display) -> Self {
        HandlerError::Failed(reason.to_string())
    }
}

/// Management API errors
#[derive(Debug, Error)]
pub enum ManagementError {
    /// The target connection is not open (or no longer open).
    ///
    /// Callers should stop retrying when they see this.
    #[error("Gone: connection {0} is not connected")]
    Gone(ConnectionId),

    /// The connection is open but writing to it failed.
    #[error("Write to connection failed: {0}")]
    Write(#[from] TransportError),

    /// The caller's context expired before the write started; nothing was sent.
    #[error("Deadline exceeded")]
    DeadlineExceeded,
}

impl ManagementError {
    /// Whether this is the distinguished "connection gone" condition.
    pub fn is_gone(&self) -> bool {
        matches!(self, ManagementError::Gone(_))
    }
}

/// Internal proto errors
#[derive(Debug, Error)]
pub enum ProtoError {
    /// Invalid event type string value.
    #[error("Invalid event type: {0}")]
    InvalidEventType(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displays_config_error_variant() {
        let err = ConfigError::InvalidValue {
            field: "handler.timeout_secs".to_string(),
            reason: "must be positive".to_string(),
        };
        assert!(err.to_string().contains("Invalid value for handler.timeout_secs"));
    }

    #[test]
    fn wraps_gateway_error_into_top_level_error() {
        let err: Error = GatewayError::Bind("in use".to_string()).into();
        assert!(err.to_string().contains("Gateway error"));
    }

    #[test]
    fn status_error_mentions_code() {
        let err = HandlerError::Status(502);
        assert_eq!(err.to_string(), "status code: 502");
    }

    #[test]
    fn gone_is_distinguished_from_write_failures() {
        let gone = ManagementError::Gone(ConnectionId::from("abc"));
        assert!(gone.is_gone());
        assert!(gone.to_string().contains("abc"));

        let write: ManagementError = TransportError::Closed.into();
        assert!(!write.is_gone());
    }

    #[test]
    fn handler_error_wraps_management_error_transparently() {
        let err: HandlerError = ManagementError::DeadlineExceeded.into();
        assert_eq!(err.to_string(), "Deadline exceeded");
    }

    #[test]
    fn wraps_transport_and_proto_errors() {
        let transport: Error = TransportError::Read("reset".to_string()).into();
        assert!(transport.to_string().contains("Transport error"));

        let proto: Error = ProtoError::InvalidEventType("PING".to_string()).into();
        assert!(proto.to_string().contains("Proto error"));
    }
}
