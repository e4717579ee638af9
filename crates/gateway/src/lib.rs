//! WebSocket-to-handler bridge.
//!
//! Accepts WebSocket connections, turns their lifecycle into `CONNECT`,
//! `MESSAGE` and `DISCONNECT` events for a single handler, and lets that
//! handler push data back to any open connection through a management client.

pub mod identity;
pub mod invoker;
pub mod management;
pub mod registry;
pub mod server;
pub mod session;
pub mod transport;
mod ws;

/// Connection identity generation.
pub use identity::generate_connection_id;
/// Handler contract and bounded invoker.
pub use invoker::{HANDLER_TIMEOUT, HandlerInvoker, LambdaHandler, handler_fn};
/// Management-API facade.
pub use management::ManagementClient;
/// Back-channel registry.
pub use registry::{BackChannel, BackChannelRegistry, Registration};
/// axum server wiring.
pub use server::WebsocketAdapter;
/// Per-connection session loop.
pub use session::{
    ConnectionSession, INTERNAL_SERVER_ERROR, SessionEnd, SessionState, SessionSummary,
};
/// Transport abstraction and in-memory implementation.
pub use transport::{Frame, FrameReader, FrameWriter, MemoryPeer, MemoryTransport, Transport};
