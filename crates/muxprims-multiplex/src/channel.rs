use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use muxprims_frame::Message;
use muxprims_transport::{resource, Connection, Lifecycle, Release, Resource, TransportError};
use tracing::debug;

use crate::envelope::{self, FrameKind};
use crate::error::{MuxError, Result};
use crate::lock;
use crate::multiplexer::MuxInner;

/// A named duplex stream multiplexed over a [`Multiplexer`](crate::Multiplexer).
///
/// Inbound messages are buffered in an unbounded queue, so a slow reader
/// never stalls the other channels. Once closed locally, both reads and
/// writes fail with [`MuxError::ConnectionReset`]. Once closed by the peer,
/// writes fail and reads drain what was buffered before returning `None`.
#[derive(Clone)]
pub struct Channel {
    inner: Arc<ChannelInner>,
}

pub(crate) struct ChannelInner {
    me: Weak<ChannelInner>,
    name: String,
    mux: Weak<MuxInner>,
    closed: AtomicBool,
    remote_closed: AtomicBool,
    ingress: Mutex<Option<Arc<Connection>>>,
    egress: Mutex<Option<Arc<ChannelOutputStream>>>,
    lifecycle: Lifecycle,
}

impl Channel {
    pub(crate) fn new(name: String, mux: Weak<MuxInner>) -> Self {
        let inner = Arc::new_cyclic(|me| ChannelInner {
            me: me.clone(),
            name,
            mux,
            closed: AtomicBool::new(false),
            remote_closed: AtomicBool::new(false),
            ingress: Mutex::new(None),
            egress: Mutex::new(None),
            lifecycle: Lifecycle::new("channel"),
        });
        Self { inner }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Register the channel with its multiplexer.
    ///
    /// Fails with [`MuxError::DuplicateChannel`] if the name is taken and
    /// leaves the existing registration alone.
    pub async fn acquire(&self) -> Result<()> {
        resource::acquire(&*self.inner).await
    }

    /// Close the channel if still open, then unregister it.
    pub async fn release(&self) -> Result<()> {
        resource::release(&*self.inner, false).await
    }

    pub fn is_acquired(&self) -> bool {
        self.inner.lifecycle.is_acquired()
    }

    /// Whether the channel was closed locally or by the peer.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire) || self.inner.remote_closed.load(Ordering::Acquire)
    }

    /// Next inbound message, `None` once the peer closed the channel.
    pub async fn read(&self) -> Result<Option<Message>> {
        self.inner.lifecycle.ensure_acquired()?;
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(self.inner.reset());
        }
        let ingress = self.inner.ingress()?;
        Ok(ingress.read().await?)
    }

    pub async fn write(&self, message: Message) -> Result<()> {
        self.inner.lifecycle.ensure_acquired()?;
        if self.is_closed() {
            return Err(self.inner.reset());
        }
        let egress = lock(&self.inner.egress)
            .clone()
            .ok_or(TransportError::NotAcquired("channel output"))?;
        egress.write(message).await
    }

    /// Close the channel and tell the peer. Idempotent.
    pub async fn close(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let egress = lock(&self.inner.egress).clone();
        match egress {
            Some(egress) => egress.close().await,
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("name", &self.inner.name)
            .field("closed", &self.inner.closed.load(Ordering::Acquire))
            .field("remote_closed", &self.inner.remote_closed.load(Ordering::Acquire))
            .field("lifecycle", &self.inner.lifecycle)
            .finish_non_exhaustive()
    }
}

impl ChannelInner {
    fn reset(&self) -> MuxError {
        MuxError::ConnectionReset(self.name.clone())
    }

    fn mux(&self) -> Result<Arc<MuxInner>> {
        self.mux
            .upgrade()
            .ok_or(MuxError::Transport(TransportError::NotAcquired("multiplexer")))
    }

    fn ingress(&self) -> Result<Arc<Connection>> {
        lock(&self.ingress)
            .clone()
            .ok_or(MuxError::Transport(TransportError::NotAcquired("channel input")))
    }

    /// Queue a message from the peer.
    pub(crate) async fn deliver(&self, message: Message) {
        let Ok(ingress) = self.ingress() else {
            debug!(channel = %self.name, "dropping message for a channel that is not set up");
            return;
        };
        if let Err(err) = ingress.write(message).await {
            debug!(channel = %self.name, %err, "dropping message for a closed channel");
        }
    }

    /// The peer closed the channel: end the inbound queue and never send a
    /// close frame back. The caller already removed the registration.
    pub(crate) async fn remote_close(&self) {
        self.remote_closed.store(true, Ordering::Release);
        if let Ok(ingress) = self.ingress() {
            let _ = ingress.close().await;
        }
    }

    async fn end_ingress(&self) {
        if let Ok(ingress) = self.ingress() {
            let _ = ingress.close().await;
        }
    }

    fn unregister(&self) {
        if let Some(mux) = self.mux.upgrade() {
            mux.unregister(&self.name, self);
        }
    }
}

impl Resource for ChannelInner {
    type Error = MuxError;

    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    async fn on_acquire(&self) -> Result<()> {
        let mux = self.mux()?;
        mux.lifecycle.ensure_acquired()?;
        if self.closed.load(Ordering::Acquire) || self.remote_closed.load(Ordering::Acquire) {
            return Err(self.reset());
        }

        let ingress = Arc::new(Connection::pipe());
        ingress.acquire().await?;
        *lock(&self.ingress) = Some(Arc::clone(&ingress));
        self.lifecycle.register(ingress);

        let me = self.me.upgrade().ok_or(TransportError::NotAcquired("channel"))?;
        mux.register(&self.name, me)?;

        let egress = Arc::new(ChannelOutputStream::new(self.me.clone()));
        resource::acquire(&*egress).await?;
        *lock(&self.egress) = Some(Arc::clone(&egress));
        self.lifecycle.register(egress);

        let observed: Weak<dyn Release> = self.me.clone();
        mux.lifecycle.observe(observed);
        debug!(channel = %self.name, "channel acquired");
        Ok(())
    }

    async fn on_release(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        self.unregister();
        if let Some(mux) = self.mux.upgrade() {
            mux.lifecycle.forget(self);
        }
        lock(&self.ingress).take();
        lock(&self.egress).take();
        debug!(channel = %self.name, "channel released");
        Ok(())
    }
}

/// Outgoing side of a channel: wraps writes in message frames and sends the
/// closing frame exactly once.
pub(crate) struct ChannelOutputStream {
    channel: Weak<ChannelInner>,
    closed: AtomicBool,
    lifecycle: Lifecycle,
}

impl ChannelOutputStream {
    fn new(channel: Weak<ChannelInner>) -> Self {
        Self {
            channel,
            closed: AtomicBool::new(false),
            lifecycle: Lifecycle::new("channel output"),
        }
    }

    fn channel(&self) -> Result<Arc<ChannelInner>> {
        self.channel
            .upgrade()
            .ok_or(MuxError::Transport(TransportError::NotAcquired("channel")))
    }

    async fn write(&self, message: Message) -> Result<()> {
        self.lifecycle.ensure_acquired()?;
        let channel = self.channel()?;
        if self.closed.load(Ordering::Acquire) {
            return Err(channel.reset());
        }
        channel.mux()?.write(envelope::wrap(&channel.name, message)).await
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let Ok(channel) = self.channel() else {
            return Ok(());
        };

        channel.unregister();
        channel.end_ingress().await;

        if channel.remote_closed.load(Ordering::Acquire) {
            return Ok(());
        }
        match channel.mux() {
            Ok(mux) if mux.is_usable() => {
                mux.write(envelope::signal(&channel.name, FrameKind::Close)).await
            }
            _ => Ok(()),
        }
    }
}

impl Resource for ChannelOutputStream {
    type Error = MuxError;

    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    async fn on_acquire(&self) -> Result<()> {
        Ok(())
    }

    async fn on_release(&self) -> Result<()> {
        self.close().await
    }
}
