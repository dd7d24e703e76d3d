use std::fmt;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use muxprims_frame::{FrameConfig, Message};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::{Result, TransportError};
use crate::framed::{FramedInput, FramedOutput};
use crate::pipe::pipe;
use crate::resource::{self, Lifecycle, Resource};

/// The reading half of a connection.
///
/// A single consumer reads messages in order; once the stream ends, every
/// further read returns `Ok(None)`.
pub trait MessageInput: Send + Sync {
    /// Next message, or `None` once the stream has ended.
    fn read(&self) -> BoxFuture<'_, Result<Option<Message>>>;
}

/// The writing half of a connection.
pub trait MessageOutput: Send + Sync {
    /// Send one message.
    fn write(&self, message: Message) -> BoxFuture<'_, Result<()>>;

    /// Close the stream. Idempotent.
    fn close(&self) -> BoxFuture<'_, Result<()>>;
}

/// A paired input and output stream with an acquire/release lifecycle.
///
/// Releasing a connection closes its output.
pub struct Connection {
    input: Arc<dyn MessageInput>,
    output: Arc<dyn MessageOutput>,
    lifecycle: Lifecycle,
}

impl Connection {
    /// Pair an input and an output stream.
    pub fn new(input: Arc<dyn MessageInput>, output: Arc<dyn MessageOutput>) -> Self {
        Self {
            input,
            output,
            lifecycle: Lifecycle::new("connection"),
        }
    }

    /// A loopback connection over one [`pipe`]: reads return what was written.
    pub fn pipe() -> Self {
        let (reader, writer) = pipe();
        Self::new(Arc::new(reader), Arc::new(writer))
    }

    /// Two in-process connections wired to each other.
    pub fn pair() -> (Self, Self) {
        let (left_reader, left_writer) = pipe();
        let (right_reader, right_writer) = pipe();
        (
            Self::new(Arc::new(right_reader), Arc::new(left_writer)),
            Self::new(Arc::new(left_reader), Arc::new(right_writer)),
        )
    }

    /// A connection carrying encoded messages over a byte stream.
    pub fn framed<T>(io: T) -> Self
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        Self::framed_with_config(io, FrameConfig::default())
    }

    /// Like [`framed`](Self::framed), with explicit codec configuration.
    pub fn framed_with_config<T>(io: T, config: FrameConfig) -> Self
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(io);
        Self::new(
            Arc::new(FramedInput::new(read_half, config.clone())),
            Arc::new(FramedOutput::new(write_half, config)),
        )
    }

    /// The input stream, for consumers that outlive a single borrow.
    pub fn input(&self) -> Arc<dyn MessageInput> {
        Arc::clone(&self.input)
    }

    /// Acquire the connection.
    pub async fn acquire(&self) -> Result<()> {
        resource::acquire(self).await
    }

    /// Release the connection, closing its output.
    pub async fn release(&self) -> Result<()> {
        resource::release(self, false).await
    }

    /// Whether the connection is acquired.
    pub fn is_acquired(&self) -> bool {
        self.lifecycle.is_acquired()
    }

    /// Read the next message, `None` at end of stream.
    pub async fn read(&self) -> Result<Option<Message>> {
        self.lifecycle.ensure_acquired()?;
        self.input.read().await
    }

    /// Write one message.
    pub async fn write(&self, message: Message) -> Result<()> {
        self.lifecycle.ensure_acquired()?;
        self.output.write(message).await
    }

    /// Close the output stream.
    pub async fn close(&self) -> Result<()> {
        self.lifecycle.ensure_acquired()?;
        self.output.close().await
    }
}

impl Resource for Connection {
    type Error = TransportError;

    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    async fn on_acquire(&self) -> Result<()> {
        Ok(())
    }

    async fn on_release(&self) -> Result<()> {
        self.output.close().await
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("lifecycle", &self.lifecycle)
            .finish_non_exhaustive()
    }
}
