//! [`Transport`] binding for axum WebSockets.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use proto::TransportError;

use crate::transport::{Frame, FrameReader, FrameWriter, Transport};

impl Transport for WebSocket {
    type Reader = WsReader;
    type Writer = WsWriter;

    fn split(self) -> (WsReader, WsWriter) {
        let (sink, stream) = StreamExt::split(self);
        (WsReader(stream), WsWriter(sink))
    }
}

pub struct WsReader(SplitStream<WebSocket>);

#[async_trait]
impl FrameReader for WsReader {
    async fn read_frame(&mut self) -> Result<Option<Frame>, TransportError> {
        loop {
            match self.0.next().await {
                None | Some(Ok(Message::Close(_))) => return Ok(None),
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(Frame::Text(text.as_str().to_owned())));
                }
                Some(Ok(Message::Binary(data))) => return Ok(Some(Frame::Binary(data.to_vec()))),
                // Pongs are queued by the socket itself.
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                Some(Err(e)) => return Err(TransportError::Read(e.to_string())),
            }
        }
    }
}

pub struct WsWriter(SplitSink<WebSocket, Message>);

#[async_trait]
impl FrameWriter for WsWriter {
    async fn write_text(&mut self, payload: &str) -> Result<(), TransportError> {
        self.0
            .send(Message::Text(payload.to_owned().into()))
            .await
            .map_err(|e| TransportError::Write(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.0
            .close()
            .await
            .map_err(|e| TransportError::Write(e.to_string()))
    }
}
