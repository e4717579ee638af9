//! Management-API contract for pushing data back to open connections.
//!
//! The trait mirrors the capability set of a managed gateway's connection
//! management client so handler code written against it runs unchanged
//! locally. Implementations are free to support only part of it.

use std::marker::PhantomData;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::InvocationContext;
use crate::error::ManagementError;
use crate::message::ConnectionId;

/// Payload to send to one connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostToConnectionInput {
    pub connection_id: ConnectionId,
    /// Delivered to the peer as a single text frame.
    pub data: String,
}

impl PostToConnectionInput {
    pub fn new(connection_id: ConnectionId, data: impl Into<String>) -> Self {
        Self {
            connection_id,
            data: data.into(),
        }
    }
}

/// Result of a successful post.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostToConnectionOutput {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetConnectionInput {
    pub connection_id: ConnectionId,
}

/// Connection metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetConnectionOutput {
    pub connected_at: Option<i64>,
    pub last_active_at: Option<i64>,
    pub source_ip: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteConnectionInput {
    pub connection_id: ConnectionId,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteConnectionOutput {}

/// A prepared, not yet sent, operation.
#[derive(Debug)]
pub struct OperationRequest<O> {
    pub operation: &'static str,
    _output: PhantomData<fn() -> O>,
}

impl<O> OperationRequest<O> {
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            _output: PhantomData,
        }
    }
}

/// Connection management operations available to handlers.
#[async_trait]
pub trait ManagementApi: Send + Sync {
    /// Sends `input.data` to the connection.
    ///
    /// Fails with [`ManagementError::Gone`] when the connection is not open.
    async fn post_to_connection(
        &self,
        input: PostToConnectionInput,
    ) -> Result<PostToConnectionOutput, ManagementError>;

    /// Same as [`ManagementApi::post_to_connection`], bounded by `ctx`.
    async fn post_to_connection_with_context(
        &self,
        ctx: &InvocationContext,
        input: PostToConnectionInput,
    ) -> Result<PostToConnectionOutput, ManagementError>;

    fn post_to_connection_request(
        &self,
        input: PostToConnectionInput,
    ) -> OperationRequest<PostToConnectionOutput>;

    async fn get_connection(
        &self,
        input: GetConnectionInput,
    ) -> Result<GetConnectionOutput, ManagementError>;

    async fn get_connection_with_context(
        &self,
        ctx: &InvocationContext,
        input: GetConnectionInput,
    ) -> Result<GetConnectionOutput, ManagementError>;

    fn get_connection_request(
        &self,
        input: GetConnectionInput,
    ) -> OperationRequest<GetConnectionOutput>;

    async fn delete_connection(
        &self,
        input: DeleteConnectionInput,
    ) -> Result<DeleteConnectionOutput, ManagementError>;

    async fn delete_connection_with_context(
        &self,
        ctx: &InvocationContext,
        input: DeleteConnectionInput,
    ) -> Result<DeleteConnectionOutput, ManagementError>;

    fn delete_connection_request(
        &self,
        input: DeleteConnectionInput,
    ) -> OperationRequest<DeleteConnectionOutput>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_input_serializes_with_camel_case() {
        let input = PostToConnectionInput::new(ConnectionId::from("c1"), "hello");
        let json = serde_json::to_value(&input).expect("serialize");
        assert_eq!(json["connectionId"], "c1");
        assert_eq!(json["data"], "hello");
    }

    #[test]
    fn operation_request_keeps_operation_name() {
        let req = OperationRequest::<DeleteConnectionOutput>::new("DeleteConnection");
        assert_eq!(req.operation, "DeleteConnection");
    }
}
