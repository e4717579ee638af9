//! Duplex transport abstraction consumed by connection sessions.
//!
//! A session only needs to read the next frame, write a text frame and
//! close. Handshake, framing and ping/pong stay inside the transport.

use async_trait::async_trait;
use proto::TransportError;
use tokio::sync::mpsc;

/// A data frame read from the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

impl Frame {
    /// Short name of the frame kind, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Text(_) => "text",
            Frame::Binary(_) => "binary",
        }
    }
}

/// Read half of a duplex connection.
#[async_trait]
pub trait FrameReader: Send + 'static {
    /// Reads the next data frame; `Ok(None)` once the peer closed.
    async fn read_frame(&mut self) -> Result<Option<Frame>, TransportError>;
}

/// Write half of a duplex connection.
#[async_trait]
pub trait FrameWriter: Send + 'static {
    /// Sends `payload` as one text frame.
    async fn write_text(&mut self, payload: &str) -> Result<(), TransportError>;

    /// Closes the connection.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// An accepted duplex connection that can be split into halves.
pub trait Transport: Send + 'static {
    type Reader: FrameReader;
    type Writer: FrameWriter;

    fn split(self) -> (Self::Reader, Self::Writer);
}

// ─── In-memory transport ───────────────────────────────────

/// Creates a connected in-memory transport and its peer end.
pub fn memory_pair() -> (MemoryTransport, MemoryPeer) {
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    (
        MemoryTransport {
            inbound: inbound_rx,
            outbound: outbound_tx,
        },
        MemoryPeer {
            inbound: Some(inbound_tx),
            outbound: outbound_rx,
        },
    )
}

/// Server side of an in-memory connection.
pub struct MemoryTransport {
    inbound: mpsc::UnboundedReceiver<Result<Frame, TransportError>>,
    outbound: mpsc::UnboundedSender<Frame>,
}

impl Transport for MemoryTransport {
    type Reader = MemoryReader;
    type Writer = MemoryWriter;

    fn split(self) -> (MemoryReader, MemoryWriter) {
        (
            MemoryReader {
                inbound: self.inbound,
            },
            MemoryWriter {
                outbound: Some(self.outbound),
            },
        )
    }
}

pub struct MemoryReader {
    inbound: mpsc::UnboundedReceiver<Result<Frame, TransportError>>,
}

#[async_trait]
impl FrameReader for MemoryReader {
    async fn read_frame(&mut self) -> Result<Option<Frame>, TransportError> {
        self.inbound.recv().await.transpose()
    }
}

pub struct MemoryWriter {
    outbound: Option<mpsc::UnboundedSender<Frame>>,
}

#[async_trait]
impl FrameWriter for MemoryWriter {
    async fn write_text(&mut self, payload: &str) -> Result<(), TransportError> {
        let outbound = self.outbound.as_ref().ok_or(TransportError::Closed)?;
        outbound
            .send(Frame::Text(payload.to_string()))
            .map_err(|_| TransportError::Write("peer stopped reading".to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.outbound.take();
        Ok(())
    }
}

/// Client side of an in-memory connection.
pub struct MemoryPeer {
    inbound: Option<mpsc::UnboundedSender<Result<Frame, TransportError>>>,
    outbound: mpsc::UnboundedReceiver<Frame>,
}

impl MemoryPeer {
    /// Sends a text frame to the server.
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.push(Ok(Frame::Text(text.into())))
    }

    /// Sends a binary frame to the server.
    pub fn send_binary(&self, data: impl Into<Vec<u8>>) -> bool {
        self.push(Ok(Frame::Binary(data.into())))
    }

    /// Makes the server's next read fail with `err`.
    pub fn fail_read(&self, err: TransportError) -> bool {
        self.push(Err(err))
    }

    /// Closes the client-to-server direction; the server reads end-of-stream.
    pub fn close(&mut self) {
        self.inbound.take();
    }

    /// Stops accepting frames; subsequent server writes fail.
    pub fn stop_reading(&mut self) {
        self.outbound.close();
    }

    /// Receives the next frame written by the server, `None` once it closed.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.outbound.recv().await
    }

    fn push(&self, item: Result<Frame, TransportError>) -> bool {
        self.inbound
            .as_ref()
            .is_some_and(|tx| tx.send(item).is_ok())
    }
}
