//! Back-channel registry: connection identity → ordered write sink.
//!
//! Every open connection owns one writer task that drains a queue of text
//! frames into the transport. The registry maps identities to the sending
//! side of those queues behind a single lock. A lookup-then-write enqueues
//! its frame while holding the lock, so a concurrent deregister either
//! happens first (the caller sees `Gone`) or after the frame is already
//! queued ahead of the writer's shutdown. The lock is never held across the
//! transport write itself.
//!
//! A frame may carry a deadline. The writer drops it unsent if the deadline
//! has passed by the time the frame reaches the front of the queue; a write
//! that has already started always runs to completion.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use proto::{ConnectionId, ManagementError, TransportError};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::transport::FrameWriter;

type WriteOutcome = Result<usize, ManagementError>;

struct OutboundFrame {
    payload: String,
    deadline: Option<Instant>,
    done: oneshot::Sender<WriteOutcome>,
}

/// Ordered write sink for one connection.
#[derive(Clone)]
pub struct BackChannel {
    tx: mpsc::UnboundedSender<OutboundFrame>,
}

impl BackChannel {
    /// Spawns the writer task owning `writer`.
    ///
    /// The task exits and closes the transport once every clone of the
    /// returned channel is dropped and the queue is drained.
    pub fn spawn<W: FrameWriter>(
        mut writer: W,
        connection_id: ConnectionId,
    ) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<OutboundFrame>();
        let handle = tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                if frame.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                    debug!(connection_id = %connection_id, "Dropping frame past its deadline");
                    let _ = frame.done.send(Err(ManagementError::DeadlineExceeded));
                    continue;
                }
                let result = writer
                    .write_text(&frame.payload)
                    .await
                    .map(|()| frame.payload.len());
                if let Err(e) = &result {
                    debug!(connection_id = %connection_id, error = %e, "Frame write failed");
                }
                let _ = frame.done.send(result.map_err(ManagementError::Write));
            }
            if let Err(e) = writer.close().await {
                debug!(connection_id = %connection_id, error = %e, "Transport close failed");
            }
        });
        (Self { tx }, handle)
    }

    /// Writes `payload` as one text frame and returns the bytes written.
    pub async fn write_text(&self, payload: impl Into<String>) -> Result<usize, TransportError> {
        let done = self.enqueue(payload.into(), None)?;
        match Self::outcome(done).await {
            Ok(written) => Ok(written),
            Err(ManagementError::Write(e)) => Err(e),
            Err(_) => Err(TransportError::Closed),
        }
    }

    fn enqueue(
        &self,
        payload: String,
        deadline: Option<Instant>,
    ) -> Result<oneshot::Receiver<WriteOutcome>, TransportError> {
        let (done, outcome) = oneshot::channel();
        self.tx
            .send(OutboundFrame {
                payload,
                deadline,
                done,
            })
            .map_err(|_| TransportError::Closed)?;
        Ok(outcome)
    }

    async fn outcome(done: oneshot::Receiver<WriteOutcome>) -> WriteOutcome {
        done.await.map_err(|_| ManagementError::Write(TransportError::Closed))?
    }

    fn same_channel(&self, other: &BackChannel) -> bool {
        self.tx.same_channel(&other.tx)
    }
}

impl std::fmt::Debug for BackChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackChannel")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

/// Shared map of currently reachable connections.
#[derive(Debug, Default)]
pub struct BackChannelRegistry {
    channels: Mutex<HashMap<ConnectionId, BackChannel>>,
}

impl BackChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry ready to be shared between sessions and clients.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Installs `channel` under `connection_id`.
    ///
    /// The returned guard deregisters the entry when released or dropped.
    pub fn register(
        self: &Arc<Self>,
        connection_id: ConnectionId,
        channel: BackChannel,
    ) -> Registration {
        let previous = self
            .channels
            .lock()
            .insert(connection_id.clone(), channel.clone());
        if previous.is_some() {
            warn!(connection_id = %connection_id, "Replaced an existing back-channel entry");
        }
        debug!(connection_id = %connection_id, "Registered back-channel");
        Registration {
            registry: Arc::clone(self),
            connection_id,
            channel,
            released: false,
        }
    }

    /// Removes any entry under `connection_id`; returns whether one existed.
    pub fn deregister(&self, connection_id: &ConnectionId) -> bool {
        let removed = self.channels.lock().remove(connection_id).is_some();
        if removed {
            debug!(connection_id = %connection_id, "Deregistered back-channel");
        }
        removed
    }

    /// Writes `payload` to the connection registered under `connection_id`.
    ///
    /// Returns the number of bytes written, [`ManagementError::Gone`] when
    /// no connection is registered, or [`ManagementError::Write`] when the
    /// transport write fails.
    pub async fn lookup_and_write(
        &self,
        connection_id: &ConnectionId,
        payload: impl Into<String>,
    ) -> Result<usize, ManagementError> {
        let done = self.lookup_and_enqueue(connection_id, payload.into(), None)?;
        BackChannel::outcome(done).await
    }

    /// Like [`lookup_and_write`](Self::lookup_and_write), but the frame is
    /// dropped unsent with [`ManagementError::DeadlineExceeded`] if its write
    /// has not started by `deadline`.
    pub async fn lookup_and_write_before(
        &self,
        connection_id: &ConnectionId,
        payload: impl Into<String>,
        deadline: Instant,
    ) -> Result<usize, ManagementError> {
        if Instant::now() >= deadline {
            return Err(ManagementError::DeadlineExceeded);
        }
        let done = self.lookup_and_enqueue(connection_id, payload.into(), Some(deadline))?;
        BackChannel::outcome(done).await
    }

    fn lookup_and_enqueue(
        &self,
        connection_id: &ConnectionId,
        payload: String,
        deadline: Option<Instant>,
    ) -> Result<oneshot::Receiver<WriteOutcome>, ManagementError> {
        let channels = self.channels.lock();
        let channel = channels
            .get(connection_id)
            .ok_or_else(|| ManagementError::Gone(connection_id.clone()))?;
        Ok(channel.enqueue(payload, deadline)?)
    }

    /// Whether `connection_id` is currently reachable.
    pub fn contains(&self, connection_id: &ConnectionId) -> bool {
        self.channels.lock().contains_key(connection_id)
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.channels.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.lock().is_empty()
    }

    fn remove_if_same(&self, connection_id: &ConnectionId, channel: &BackChannel) -> bool {
        let mut channels = self.channels.lock();
        match channels.get(connection_id) {
            Some(current) if current.same_channel(channel) => {
                channels.remove(connection_id);
                true
            }
            _ => false,
        }
    }
}

/// Keeps a back-channel entry alive; removes it when released or dropped.
pub struct Registration {
    registry: Arc<BackChannelRegistry>,
    connection_id: ConnectionId,
    channel: BackChannel,
    released: bool,
}

impl Registration {
    pub fn connection_id(&self) -> &ConnectionId {
        &self.connection_id
    }

    /// Removes the entry now.
    pub fn release(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if self
            .registry
            .remove_if_same(&self.connection_id, &self.channel)
        {
            debug!(connection_id = %self.connection_id, "Deregistered back-channel");
        }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.remove();
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("connection_id", &self.connection_id)
            .field("released", &self.released)
            .finish()
    }
}
