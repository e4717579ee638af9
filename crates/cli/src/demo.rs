//! Built-in handler served by `wsgate serve`.

use gateway::{LambdaHandler, ManagementClient, handler_fn};
use proto::{
    EventType, HandlerError, ManagementApi, PostToConnectionInput, ProxyResponse, WebsocketEvent,
};
use tracing::info;

/// Answers every `MESSAGE` with `reply` on the sending connection.
pub fn reply_handler(client: ManagementClient, reply: String) -> LambdaHandler {
    handler_fn(move |_ctx, event: WebsocketEvent| {
        let client = client.clone();
        let reply = reply.clone();
        async move {
            let connection_id = event.connection_id().clone();
            match event.event_type() {
                EventType::Connect => info!(connection_id = %connection_id, "Client connected"),
                EventType::Disconnect => {
                    info!(connection_id = %connection_id, "Client disconnected")
                }
                EventType::Message => {
                    let input = PostToConnectionInput::new(connection_id, reply);
                    if let Err(e) = client.post_to_connection(input).await {
                        return Err(HandlerError::from(e));
                    }
                }
            }
            Ok(ProxyResponse::ok())
        }
    })
}
