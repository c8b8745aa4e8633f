//! Streaming request bodies.
//!
//! A [`BodyProducer`] writes the request body into a [`BodySink`] while the
//! request is in flight. Producers that know their length get a
//! `Content-Length` header; the rest are sent chunked.

use crate::error::{AgentError, Result};
use bytes::Bytes;
use futures::channel::mpsc;
use futures::future::BoxFuture;
use futures::SinkExt;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, StreamBody};
use hyper::body::Frame;

/// Body frames flowing from a producer to the connection.
type FrameResult = std::result::Result<Frame<Bytes>, AgentError>;

/// Number of chunks buffered between the producer and the connection.
const SINK_BUFFER: usize = 8;

/// Source of a request body.
pub trait BodyProducer: Send + 'static {
    /// Total length in bytes, or `None` if unknown (sent chunked).
    fn length(&self) -> Option<u64>;

    /// Write the whole body into `sink`.
    ///
    /// Returning an error aborts the request body; the request then fails.
    fn produce(self: Box<Self>, sink: BodySink) -> BoxFuture<'static, Result<()>>;
}

/// Where a [`BodyProducer`] writes its bytes.
pub struct BodySink {
    tx: mpsc::Sender<FrameResult>,
}

impl BodySink {
    /// Write one chunk. Waits while the connection is not keeping up.
    ///
    /// # Errors
    ///
    /// [`AgentError::Body`] if the request was abandoned and nothing will
    /// read the chunk.
    pub async fn write(&mut self, chunk: Bytes) -> Result<()> {
        if chunk.is_empty() {
            return Ok(());
        }
        self.tx
            .send(Ok(Frame::data(chunk)))
            .await
            .map_err(|_| AgentError::Body("request body receiver dropped".to_string()))
    }
}

/// In-memory body with a known length.
#[derive(Debug, Clone)]
pub struct BytesProducer {
    data: Bytes,
}

impl BytesProducer {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }
}

impl BodyProducer for BytesProducer {
    fn length(&self) -> Option<u64> {
        Some(self.data.len() as u64)
    }

    fn produce(self: Box<Self>, mut sink: BodySink) -> BoxFuture<'static, Result<()>> {
        Box::pin(async move { sink.write(self.data).await })
    }
}

/// Request body type handed to hyper.
pub(crate) type RequestBody = UnsyncBoxBody<Bytes, AgentError>;

/// An empty request body.
pub(crate) fn empty() -> RequestBody {
    Empty::<Bytes>::new().map_err(|never| match never {}).boxed_unsync()
}

/// Turn a producer into a streaming body plus the future that drives it.
///
/// The driver must be spawned; a producer failure is forwarded into the body
/// stream so the connection sees the error and aborts the request.
pub(crate) fn stream(producer: Box<dyn BodyProducer>) -> (RequestBody, BoxFuture<'static, ()>) {
    let (tx, rx) = mpsc::channel::<FrameResult>(SINK_BUFFER);
    let mut err_tx = tx.clone();

    let driver = Box::pin(async move {
        if let Err(e) = producer.produce(BodySink { tx }).await {
            let _ = err_tx.send(Err(e)).await;
        }
    });

    (StreamBody::new(rx).boxed_unsync(), driver)
}
