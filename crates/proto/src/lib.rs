//! Shared types for the WebSocket-to-handler bridge.
//!
//! This crate defines the lifecycle event and response shapes passed to
//! handlers, the invocation context, the management-API contract, and the
//! strongly-typed error enums shared across the workspace.

pub mod context;
pub mod error;
pub mod event;
pub mod management;
pub mod message;
pub mod response;

/// Re-export of the handler invocation context.
pub use context::InvocationContext;
/// Re-export of all error types.
pub use error::*;
/// Re-export of lifecycle event types.
pub use event::{ConnectionInfo, EventType, RequestContext, WebsocketEvent};
/// Re-export of the management-API contract and its input/output types.
pub use management::{
    DeleteConnectionInput, DeleteConnectionOutput, GetConnectionInput, GetConnectionOutput,
    ManagementApi, OperationRequest, PostToConnectionInput, PostToConnectionOutput,
};
/// Re-export of connection identity and header types.
pub use message::{ConnectionId, MultiValueHeaders, first_values};
/// Re-export of the handler response type.
pub use response::{ProxyResponse, STATUS_OK};
