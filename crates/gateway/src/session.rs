//! Per-connection lifecycle: CONNECT, message loop, DISCONNECT.

use std::sync::Arc;
use std::time::Duration;

use proto::{
    ConnectionId, ConnectionInfo, GatewayError, HandlerError, MultiValueHeaders, TransportError,
};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::identity::generate_connection_id;
use crate::invoker::HandlerInvoker;
use crate::registry::{BackChannel, BackChannelRegistry};
use crate::transport::{Frame, FrameReader, FrameWriter, Transport};

/// Text frame sent to the peer when a `MESSAGE` invocation fails.
pub const INTERNAL_SERVER_ERROR: &str = r#"{"message": "Internal server error"}"#;

/// How long a closing session waits for queued writes to drain.
const WRITER_DRAIN_GRACE: Duration = Duration::from_secs(5);

/// States of a connection session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Accepting,
    Connected,
    Reading,
    Closing,
    Closed,
}

/// Why a session ended.
#[derive(Debug)]
pub enum SessionEnd {
    /// The `CONNECT` invocation failed; the connection never became live.
    Rejected(HandlerError),
    /// The peer closed the connection.
    PeerClosed,
    /// Reading the next frame failed.
    ReadFailed(TransportError),
    /// The peer sent a frame kind other than text.
    ProtocolViolation { kind: &'static str },
    /// Reporting a failed `MESSAGE` invocation to the peer failed.
    ReportFailed(TransportError),
}

/// Outcome of [`ConnectionSession::run`].
#[derive(Debug)]
pub struct SessionSummary {
    pub connection_id: ConnectionId,
    pub end: SessionEnd,
}

/// Drives one accepted connection through its whole lifecycle.
pub struct ConnectionSession<T: Transport> {
    transport: T,
    headers: MultiValueHeaders,
    invoker: HandlerInvoker,
    registry: Arc<BackChannelRegistry>,
    state: SessionState,
}

impl<T: Transport> ConnectionSession<T> {
    /// Creates a session for an accepted transport and its request headers.
    pub fn new(
        transport: T,
        headers: MultiValueHeaders,
        invoker: HandlerInvoker,
        registry: Arc<BackChannelRegistry>,
    ) -> Self {
        Self {
            transport,
            headers,
            invoker,
            registry,
            state: SessionState::Accepting,
        }
    }

    /// Runs the session until the connection is closed.
    ///
    /// Returns an error only when no identity could be generated, in which
    /// case no event was emitted. Once `CONNECT` succeeds, `DISCONNECT` is
    /// invoked exactly once on every exit path.
    pub async fn run(mut self) -> Result<SessionSummary, GatewayError> {
        let connection_id = generate_connection_id()?;
        let info = ConnectionInfo::new(connection_id.clone(), std::mem::take(&mut self.headers));
        let (mut reader, mut writer) = self.transport.split();

        if let Err(err) = self.invoker.invoke(info.connect_event()).await {
            warn!(connection_id = %connection_id, error = %err, "CONNECT rejected");
            if let Err(e) = writer.close().await {
                debug!(connection_id = %connection_id, error = %e, "Transport close failed");
            }
            transition(&mut self.state, SessionState::Closed, &connection_id);
            return Ok(SessionSummary {
                connection_id,
                end: SessionEnd::Rejected(err),
            });
        }

        transition(&mut self.state, SessionState::Connected, &connection_id);
        let (channel, writer_task) = BackChannel::spawn(writer, connection_id.clone());
        let registration = self.registry.register(connection_id.clone(), channel.clone());
        info!(connection_id = %connection_id, "Connection established");

        transition(&mut self.state, SessionState::Reading, &connection_id);
        let end = read_messages(&mut reader, &info, &self.invoker, &channel).await;

        // Single cleanup path for every way out of the read loop.
        transition(&mut self.state, SessionState::Closing, &connection_id);
        registration.release();
        if let Err(err) = self.invoker.invoke(info.disconnect_event()).await {
            warn!(connection_id = %connection_id, error = %err, "DISCONNECT handler failed");
        }
        drop(channel);
        drop(reader);
        finish_writer(writer_task, &connection_id).await;

        transition(&mut self.state, SessionState::Closed, &connection_id);
        info!(connection_id = %connection_id, end = ?end, "Connection closed");
        Ok(SessionSummary { connection_id, end })
    }
}

async fn read_messages<R: FrameReader>(
    reader: &mut R,
    info: &ConnectionInfo,
    invoker: &HandlerInvoker,
    channel: &BackChannel,
) -> SessionEnd {
    let connection_id = info.connection_id();
    loop {
        let text = match reader.read_frame().await {
            Ok(Some(Frame::Text(text))) => text,
            Ok(Some(frame)) => {
                warn!(
                    connection_id = %connection_id,
                    kind = frame.kind(),
                    "Unsupported frame kind"
                );
                return SessionEnd::ProtocolViolation { kind: frame.kind() };
            }
            Ok(None) => return SessionEnd::PeerClosed,
            Err(e) => {
                debug!(connection_id = %connection_id, error = %e, "Read failed");
                return SessionEnd::ReadFailed(e);
            }
        };

        if let Err(err) = invoker.invoke(info.message_event(text)).await {
            warn!(connection_id = %connection_id, error = %err, "MESSAGE handler failed");
            if let Err(e) = channel.write_text(INTERNAL_SERVER_ERROR).await {
                warn!(connection_id = %connection_id, error = %e, "Error report write failed");
                return SessionEnd::ReportFailed(e);
            }
        }
    }
}

async fn finish_writer(mut writer_task: JoinHandle<()>, connection_id: &ConnectionId) {
    match tokio::time::timeout(WRITER_DRAIN_GRACE, &mut writer_task).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(connection_id = %connection_id, error = %e, "Writer task failed"),
        Err(_) => {
            warn!(connection_id = %connection_id, "Writer did not drain in time, aborting");
            writer_task.abort();
        }
    }
}

fn transition(state: &mut SessionState, next: SessionState, connection_id: &ConnectionId) {
    debug!(connection_id = %connection_id, from = ?state, to = ?next, "Session state");
    *state = next;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoker::handler_fn;
    use crate::transport::{MemoryPeer, memory_pair};
    use proto::{EventType, ProxyResponse, WebsocketEvent};
    use tokio::sync::mpsc;

    type Recorded = mpsc::UnboundedReceiver<WebsocketEvent>;

    /// Handler recording every event; fails `CONNECT` when `reject_connect`
    /// and `MESSAGE` bodies equal to `"fail"`.
    fn recording_invoker(reject_connect: bool) -> (HandlerInvoker, Recorded) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handler = handler_fn(move |_ctx, event: WebsocketEvent| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(event.clone());
                match event.event_type() {
                    EventType::Connect if reject_connect => Ok(ProxyResponse::with_status(401)),
                    EventType::Message if event.body == "fail" => {
                        Err(HandlerError::failed("message failed"))
                    }
                    _ => Ok(ProxyResponse::ok()),
                }
            }
        });
        (HandlerInvoker::new(handler), rx)
    }

    fn headers() -> MultiValueHeaders {
        let mut headers = MultiValueHeaders::new();
        headers.insert("X-Client".into(), vec!["test".into()]);
        headers
    }

    fn drain(rx: &mut Recorded) -> Vec<WebsocketEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn kinds(events: &[WebsocketEvent]) -> Vec<EventType> {
        events.iter().map(WebsocketEvent::event_type).collect()
    }

    fn run_session(
        invoker: HandlerInvoker,
        registry: &Arc<BackChannelRegistry>,
    ) -> (JoinHandle<SessionSummary>, MemoryPeer) {
        let (transport, peer) = memory_pair();
        let session = ConnectionSession::new(transport, headers(), invoker, Arc::clone(registry));
        let handle = tokio::spawn(async move { session.run().await.expect("identity") });
        (handle, peer)
    }

    #[tokio::test]
    async fn connect_then_disconnect_on_peer_close() {
        let registry = BackChannelRegistry::shared();
        let (invoker, mut rx) = recording_invoker(false);
        let (handle, mut peer) = run_session(invoker, &registry);

        peer.close();
        let summary = handle.await.expect("session task");

        assert!(matches!(summary.end, SessionEnd::PeerClosed));
        let events = drain(&mut rx);
        assert_eq!(kinds(&events), vec![EventType::Connect, EventType::Disconnect]);
        assert_eq!(events[0].connection_id(), &summary.connection_id);
        assert_eq!(events[1].connection_id(), &summary.connection_id);
        assert_eq!(events[1].multi_value_headers, headers());
        assert!(registry.is_empty());
        assert_eq!(peer.recv().await, None);
    }

    #[tokio::test]
    async fn rejected_connect_never_registers_or_disconnects() {
        let registry = BackChannelRegistry::shared();
        let (invoker, mut rx) = recording_invoker(true);
        let (handle, mut peer) = run_session(invoker, &registry);

        let summary = handle.await.expect("session task");

        assert!(matches!(
            summary.end,
            SessionEnd::Rejected(HandlerError::Status(401))
        ));
        assert_eq!(kinds(&drain(&mut rx)), vec![EventType::Connect]);
        assert!(registry.is_empty());
        assert_eq!(peer.recv().await, None);
    }

    #[tokio::test]
    async fn messages_are_delivered_in_order_between_connect_and_disconnect() {
        let registry = BackChannelRegistry::shared();
        let (invoker, mut rx) = recording_invoker(false);
        let (handle, mut peer) = run_session(invoker, &registry);

        peer.send_text("one");
        peer.send_text(" two ");
        peer.send_text("three");
        peer.close();
        handle.await.expect("session task");

        let events = drain(&mut rx);
        assert_eq!(
            kinds(&events),
            vec![
                EventType::Connect,
                EventType::Message,
                EventType::Message,
                EventType::Message,
                EventType::Disconnect,
            ]
        );
        let bodies: Vec<_> = events[1..4].iter().map(|e| e.body.as_str()).collect();
        assert_eq!(bodies, vec!["one", " two ", "three"]);
    }

    #[tokio::test]
    async fn failed_message_reports_error_and_keeps_reading() {
        let registry = BackChannelRegistry::shared();
        let (invoker, mut rx) = recording_invoker(false);
        let (handle, mut peer) = run_session(invoker, &registry);

        peer.send_text("fail");
        assert_eq!(
            peer.recv().await,
            Some(Frame::Text(INTERNAL_SERVER_ERROR.to_string()))
        );

        peer.send_text("after");
        peer.close();
        let summary = handle.await.expect("session task");

        assert!(matches!(summary.end, SessionEnd::PeerClosed));
        let events = drain(&mut rx);
        assert_eq!(events.len(), 4);
        assert_eq!(events[2].body, "after");
    }

    #[tokio::test]
    async fn binary_frame_ends_session_without_error_payload() {
        let registry = BackChannelRegistry::shared();
        let (invoker, mut rx) = recording_invoker(false);
        let (handle, mut peer) = run_session(invoker, &registry);

        peer.send_binary(vec![0u8, 1, 2]);
        let summary = handle.await.expect("session task");

        assert!(matches!(
            summary.end,
            SessionEnd::ProtocolViolation { kind: "binary" }
        ));
        assert_eq!(
            kinds(&drain(&mut rx)),
            vec![EventType::Connect, EventType::Disconnect]
        );
        assert_eq!(peer.recv().await, None);
    }

    #[tokio::test]
    async fn read_error_still_disconnects() {
        let registry = BackChannelRegistry::shared();
        let (invoker, mut rx) = recording_invoker(false);
        let (handle, peer) = run_session(invoker, &registry);

        peer.fail_read(TransportError::Read("connection reset".to_string()));
        let summary = handle.await.expect("session task");

        assert!(matches!(summary.end, SessionEnd::ReadFailed(_)));
        assert_eq!(
            kinds(&drain(&mut rx)),
            vec![EventType::Connect, EventType::Disconnect]
        );
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn failed_error_report_ends_session() {
        let registry = BackChannelRegistry::shared();
        let (invoker, mut rx) = recording_invoker(false);
        let (handle, mut peer) = run_session(invoker, &registry);

        peer.stop_reading();
        peer.send_text("fail");
        let summary = handle.await.expect("session task");

        assert!(matches!(summary.end, SessionEnd::ReportFailed(_)));
        assert_eq!(
            kinds(&drain(&mut rx)),
            vec![EventType::Connect, EventType::Message, EventType::Disconnect]
        );
    }

    #[tokio::test]
    async fn entry_exists_only_while_session_is_live() {
        let registry = BackChannelRegistry::shared();
        let (tx, mut connected) = mpsc::unbounded_channel();
        let handler = handler_fn(move |_ctx, event: WebsocketEvent| {
            let tx = tx.clone();
            async move {
                if event.event_type() == EventType::Connect {
                    let _ = tx.send(event.connection_id().clone());
                }
                Ok(ProxyResponse::ok())
            }
        });
        let (handle, mut peer) = run_session(HandlerInvoker::new(handler), &registry);

        let connection_id = connected.recv().await.expect("connect seen");
        // Registration follows CONNECT; a pushed frame proves it is in place.
        let mut written = Err(proto::ManagementError::Gone(connection_id.clone()));
        for _ in 0..50 {
            written = registry.lookup_and_write(&connection_id, "push").await;
            if written.is_ok() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(written.expect("registered while live"), 4);
        assert_eq!(peer.recv().await, Some(Frame::Text("push".to_string())));

        peer.close();
        handle.await.expect("session task");
        let err = registry
            .lookup_and_write(&connection_id, "late")
            .await
            .expect_err("closed session must be gone");
        assert!(err.is_gone());
    }

    #[tokio::test]
    async fn disconnect_handler_sees_connection_already_gone() {
        let registry = BackChannelRegistry::shared();
        let (tx, mut outcome) = mpsc::unbounded_channel();
        let lookup_registry = Arc::clone(&registry);
        let handler = handler_fn(move |_ctx, event: WebsocketEvent| {
            let tx = tx.clone();
            let registry = Arc::clone(&lookup_registry);
            async move {
                if event.event_type() == EventType::Disconnect {
                    let result = registry.lookup_and_write(event.connection_id(), "bye").await;
                    let _ = tx.send(result.map_err(|e| e.is_gone()));
                }
                Ok(ProxyResponse::ok())
            }
        });
        let (handle, mut peer) = run_session(HandlerInvoker::new(handler), &registry);

        peer.close();
        handle.await.expect("session task");
        assert_eq!(outcome.recv().await, Some(Err(true)));
    }

    #[tokio::test]
    async fn slow_message_handler_is_reported_like_an_error() {
        let registry = BackChannelRegistry::shared();
        let handler = handler_fn(|_ctx, event: WebsocketEvent| async move {
            if event.body == "slow" {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            Ok(ProxyResponse::ok())
        });
        let invoker = HandlerInvoker::new(handler).with_timeout(Duration::from_millis(50));
        let (handle, mut peer) = run_session(invoker, &registry);

        peer.send_text("slow");
        assert_eq!(
            peer.recv().await,
            Some(Frame::Text(INTERNAL_SERVER_ERROR.to_string()))
        );
        peer.close();
        let summary = handle.await.expect("session task");
        assert!(matches!(summary.end, SessionEnd::PeerClosed));
    }

    #[tokio::test]
    async fn handler_panicking_before_its_future_still_disconnects() {
        use crate::invoker::{HandlerFuture, LambdaHandler};

        let registry = BackChannelRegistry::shared();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handler: LambdaHandler = Arc::new(
            move |_ctx: proto::InvocationContext, event: WebsocketEvent| -> HandlerFuture {
                let _ = tx.send(event.clone());
                if event.event_type() == EventType::Message {
                    panic!("handler failed to build its future");
                }
                Box::pin(async { Ok(ProxyResponse::ok()) })
            },
        );
        let (handle, mut peer) = run_session(HandlerInvoker::new(handler), &registry);

        peer.send_text("boom");
        assert_eq!(
            peer.recv().await,
            Some(Frame::Text(INTERNAL_SERVER_ERROR.to_string()))
        );
        peer.close();
        let summary = handle.await.expect("session task must not panic");

        assert!(matches!(summary.end, SessionEnd::PeerClosed));
        assert_eq!(
            kinds(&drain(&mut rx)),
            vec![EventType::Connect, EventType::Message, EventType::Disconnect]
        );
        assert!(registry.is_empty());
    }
}
