//! In-process unbounded message queue.
//!
//! A pipe decouples a producer that must never wait (the dispatch loop) from
//! a consumer that may be slow (a channel reader). Writes never suspend.

use std::sync::Mutex;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use muxprims_frame::Message;
use tokio::sync::mpsc;

use crate::connection::{MessageInput, MessageOutput};
use crate::error::{Result, TransportError};
use crate::lock;

/// Create a connected reader/writer pair.
pub fn pipe() -> (PipeReader, PipeWriter) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        PipeReader {
            rx: tokio::sync::Mutex::new(rx),
        },
        PipeWriter {
            tx: Mutex::new(Some(tx)),
        },
    )
}

/// Consuming end of a [`pipe`].
#[derive(Debug)]
pub struct PipeReader {
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Message>>,
}

impl PipeReader {
    /// Wait for the next message; `None` once the writer closed and the
    /// queue is drained, and on every read after that.
    pub async fn recv(&self) -> Option<Message> {
        self.rx.lock().await.recv().await
    }
}

impl MessageInput for PipeReader {
    fn read(&self) -> BoxFuture<'_, Result<Option<Message>>> {
        async move { Ok(self.recv().await) }.boxed()
    }
}

/// Producing end of a [`pipe`].
#[derive(Debug)]
pub struct PipeWriter {
    tx: Mutex<Option<mpsc::UnboundedSender<Message>>>,
}

impl PipeWriter {
    /// Enqueue a message without waiting.
    pub fn send(&self, message: Message) -> Result<()> {
        let tx = lock(&self.tx);
        let tx = tx.as_ref().ok_or(TransportError::OutputClosed)?;
        tx.send(message).map_err(|_| TransportError::OutputClosed)
    }

    /// Enqueue the end-of-stream marker. Idempotent.
    pub fn close(&self) {
        lock(&self.tx).take();
    }

    /// Whether [`close`](Self::close) was called.
    pub fn is_closed(&self) -> bool {
        lock(&self.tx).is_none()
    }
}

impl MessageOutput for PipeWriter {
    fn write(&self, message: Message) -> BoxFuture<'_, Result<()>> {
        async move { self.send(message) }.boxed()
    }

    fn close(&self) -> BoxFuture<'_, Result<()>> {
        async move {
            PipeWriter::close(self);
            Ok(())
        }
        .boxed()
    }
}
