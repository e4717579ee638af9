//! Management-API facade over the back-channel registry.
//!
//! Supported: `post_to_connection` and `post_to_connection_with_context`.
//! The latter fails with `DeadlineExceeded` only when the frame was never
//! sent, so retrying on that error cannot duplicate a message.
//! Everything else in [`ManagementApi`] aborts the process when called;
//! those operations only exist so handler code typed against the full
//! client contract compiles and runs against this bridge.

use std::sync::Arc;

use async_trait::async_trait;
use proto::{
    DeleteConnectionInput, DeleteConnectionOutput, GetConnectionInput, GetConnectionOutput,
    InvocationContext, ManagementApi, ManagementError, OperationRequest, PostToConnectionInput,
    PostToConnectionOutput,
};
use tracing::{debug, error};

use crate::registry::BackChannelRegistry;

/// Local implementation of the connection management client.
#[derive(Debug, Clone)]
pub struct ManagementClient {
    registry: Arc<BackChannelRegistry>,
}

impl ManagementClient {
    pub fn new(registry: Arc<BackChannelRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl ManagementApi for ManagementClient {
    async fn post_to_connection(
        &self,
        input: PostToConnectionInput,
    ) -> Result<PostToConnectionOutput, ManagementError> {
        let written = self
            .registry
            .lookup_and_write(&input.connection_id, input.data)
            .await?;
        debug!(connection_id = %input.connection_id, bytes = written, "Posted to connection");
        Ok(PostToConnectionOutput {})
    }

    async fn post_to_connection_with_context(
        &self,
        ctx: &InvocationContext,
        input: PostToConnectionInput,
    ) -> Result<PostToConnectionOutput, ManagementError> {
        let written = self
            .registry
            .lookup_and_write_before(&input.connection_id, input.data, ctx.deadline())
            .await?;
        debug!(connection_id = %input.connection_id, bytes = written, "Posted to connection");
        Ok(PostToConnectionOutput {})
    }

    fn post_to_connection_request(
        &self,
        _input: PostToConnectionInput,
    ) -> OperationRequest<PostToConnectionOutput> {
        unsupported("PostToConnectionRequest")
    }

    async fn get_connection(
        &self,
        _input: GetConnectionInput,
    ) -> Result<GetConnectionOutput, ManagementError> {
        unsupported("GetConnection")
    }

    async fn get_connection_with_context(
        &self,
        _ctx: &InvocationContext,
        _input: GetConnectionInput,
    ) -> Result<GetConnectionOutput, ManagementError> {
        unsupported("GetConnectionWithContext")
    }

    fn get_connection_request(
        &self,
        _input: GetConnectionInput,
    ) -> OperationRequest<GetConnectionOutput> {
        unsupported("GetConnectionRequest")
    }

    async fn delete_connection(
        &self,
        _input: DeleteConnectionInput,
    ) -> Result<DeleteConnectionOutput, ManagementError> {
        unsupported("DeleteConnection")
    }

    async fn delete_connection_with_context(
        &self,
        _ctx: &InvocationContext,
        _input: DeleteConnectionInput,
    ) -> Result<DeleteConnectionOutput, ManagementError> {
        unsupported("DeleteConnectionWithContext")
    }

    fn delete_connection_request(
        &self,
        _input: DeleteConnectionInput,
    ) -> OperationRequest<DeleteConnectionOutput> {
        unsupported("DeleteConnectionRequest")
    }
}

/// Calling an operation outside the supported set is a programming error.
fn unsupported(operation: &'static str) -> ! {
    error!(operation, "Management operation not implemented, aborting");
    std::process::abort()
}
