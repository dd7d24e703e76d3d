//! Message streams over an async byte stream.
//!
//! Reads decode complete messages with [`MessageCodec`]; partial input is
//! buffered until the rest arrives. Writes encode one message per call and
//! flush it, so concurrent writers never interleave partial frames.

use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::future::BoxFuture;
use futures_util::{FutureExt, SinkExt, StreamExt};
use muxprims_frame::{FrameConfig, Message, MessageCodec};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, trace};

use crate::connection::{MessageInput, MessageOutput};
use crate::error::{Result, TransportError};

/// Decoding half of a framed connection.
pub struct FramedInput<R> {
    inner: Mutex<FramedRead<R, MessageCodec>>,
    ended: AtomicBool,
}

impl<R: AsyncRead + Unpin + Send> FramedInput<R> {
    pub fn new(reader: R, config: FrameConfig) -> Self {
        Self {
            inner: Mutex::new(FramedRead::new(reader, MessageCodec::with_config(config))),
            ended: AtomicBool::new(false),
        }
    }

    async fn next(&self) -> Result<Option<Message>> {
        if self.ended.load(Ordering::Acquire) {
            return Ok(None);
        }

        let mut inner = self.inner.lock().await;
        match inner.next().await {
            Some(Ok(message)) => {
                trace!(fields = message.fields().len(), blobs = message.blobs().len(), "decoded message");
                Ok(Some(message))
            }
            Some(Err(err)) => {
                self.ended.store(true, Ordering::Release);
                debug!(%err, "framed input failed");
                Err(err.into())
            }
            None => {
                self.ended.store(true, Ordering::Release);
                Ok(None)
            }
        }
    }
}

impl<R: AsyncRead + Unpin + Send> MessageInput for FramedInput<R> {
    fn read(&self) -> BoxFuture<'_, Result<Option<Message>>> {
        self.next().boxed()
    }
}

/// Encoding half of a framed connection.
pub struct FramedOutput<W> {
    inner: Mutex<Option<FramedWrite<W, MessageCodec>>>,
}

impl<W: AsyncWrite + Unpin + Send> FramedOutput<W> {
    pub fn new(writer: W, config: FrameConfig) -> Self {
        Self {
            inner: Mutex::new(Some(FramedWrite::new(writer, MessageCodec::with_config(config)))),
        }
    }

    async fn send(&self, message: Message) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let sink = inner.as_mut().ok_or(TransportError::OutputClosed)?;
        sink.send(message).await?;
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        let Some(mut sink) = self.inner.lock().await.take() else {
            return Ok(());
        };
        sink.close().await?;
        Ok(())
    }
}

impl<W: AsyncWrite + Unpin + Send> MessageOutput for FramedOutput<W> {
    fn write(&self, message: Message) -> BoxFuture<'_, Result<()>> {
        self.send(message).boxed()
    }

    fn close(&self) -> BoxFuture<'_, Result<()>> {
        self.shutdown().boxed()
    }
}
