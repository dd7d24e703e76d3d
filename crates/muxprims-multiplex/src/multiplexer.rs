use std::collections::HashMap;
use std::fmt;
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, Weak};

use muxprims_frame::Message;
use muxprims_transport::{resource, Connection, Lifecycle, ReaderTask, Release, Resource, TransportError};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::channel::{Channel, ChannelInner};
use crate::config::MultiplexerConfig;
use crate::envelope::{self, FrameKind, Inbound};
use crate::error::{MuxError, Result};
use crate::lock;

/// Named logical channels over one physical [`Connection`].
///
/// Acquiring the multiplexer acquires the connection and starts a background
/// dispatch loop; releasing it releases every open channel, stops the loop
/// and releases the connection. Handles are cheap to clone.
///
/// ```no_run
/// # async fn demo(conn: muxprims_transport::Connection) -> muxprims_multiplex::Result<()> {
/// use muxprims_frame::Message;
/// use muxprims_multiplex::Multiplexer;
///
/// let mux = Multiplexer::new(conn);
/// mux.acquire().await?;
///
/// let video = mux.connect("video");
/// video.acquire().await?;
/// video.write(Message::default().with_field("ping", 1)).await?;
/// let reply = video.read().await?;
/// # let _ = reply;
/// mux.release().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Multiplexer {
    inner: Arc<MuxInner>,
}

pub(crate) struct MuxInner {
    me: Weak<MuxInner>,
    parent: Arc<Connection>,
    config: MultiplexerConfig,
    streams: Mutex<HashMap<String, Arc<ChannelInner>>>,
    write_lock: tokio::sync::Mutex<()>,
    closed: watch::Sender<bool>,
    shutdown: watch::Sender<bool>,
    pub(crate) lifecycle: Lifecycle,
}

impl Multiplexer {
    /// Multiplex over `parent` with default configuration.
    pub fn new(parent: Connection) -> Self {
        Self::with_config(parent, MultiplexerConfig::default())
    }

    /// Multiplex over `parent`.
    pub fn with_config(parent: Connection, config: MultiplexerConfig) -> Self {
        let inner = Arc::new_cyclic(|me| MuxInner {
            me: me.clone(),
            parent: Arc::new(parent),
            config,
            streams: Mutex::new(HashMap::new()),
            write_lock: tokio::sync::Mutex::new(()),
            closed: watch::Sender::new(false),
            shutdown: watch::Sender::new(false),
            lifecycle: Lifecycle::new("multiplexer"),
        });
        Self { inner }
    }

    pub fn config(&self) -> &MultiplexerConfig {
        &self.inner.config
    }

    /// Acquire the connection and start dispatching inbound frames.
    pub async fn acquire(&self) -> Result<()> {
        resource::acquire(&*self.inner).await
    }

    /// Release every channel, stop dispatching and release the connection.
    pub async fn release(&self) -> Result<()> {
        resource::release(&*self.inner, false).await
    }

    pub fn is_acquired(&self) -> bool {
        self.inner.lifecycle.is_acquired()
    }

    /// Create a channel named `name`. The channel still has to be acquired;
    /// only an acquired channel is released along with the multiplexer.
    pub fn connect(&self, name: impl Into<String>) -> Channel {
        Channel::new(name.into(), self.inner.me.clone())
    }

    /// Write one frame to the connection. Frames are written whole, in the
    /// order callers obtain the write lock.
    pub async fn write(&self, message: Message) -> Result<()> {
        self.inner.write(message).await
    }

    /// Close the connection's output. Writes afterwards fail.
    pub async fn close(&self) -> Result<()> {
        self.inner.close().await
    }

    /// Whether [`close`](Self::close) has completed.
    pub fn is_closed(&self) -> bool {
        *self.inner.closed.borrow()
    }

    /// Whether the peer ended the connection.
    pub fn is_shutdown(&self) -> bool {
        *self.inner.shutdown.borrow()
    }

    /// Wait until [`close`](Self::close) has completed.
    pub async fn wait_closed(&self) {
        let mut closed = self.inner.closed.subscribe();
        let _ = closed.wait_for(|closed| *closed).await;
    }

    /// Wait until the peer ends the connection.
    pub async fn wait_shutdown(&self) {
        let mut shutdown = self.inner.shutdown.subscribe();
        let _ = shutdown.wait_for(|shutdown| *shutdown).await;
    }

    /// Names of the currently registered channels, sorted.
    pub fn channel_names(&self) -> Vec<String> {
        let mut names: Vec<String> = lock(&self.inner.streams).keys().cloned().collect();
        names.sort();
        names
    }

    /// Whether a channel named `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        lock(&self.inner.streams).contains_key(name)
    }
}

impl fmt::Debug for Multiplexer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Multiplexer")
            .field("channels", &self.channel_names())
            .field("closed", &self.is_closed())
            .field("shutdown", &self.is_shutdown())
            .field("lifecycle", &self.inner.lifecycle)
            .finish_non_exhaustive()
    }
}

impl MuxInner {
    /// Acquired and not closed.
    pub(crate) fn is_usable(&self) -> bool {
        self.lifecycle.is_acquired() && !*self.closed.borrow()
    }

    pub(crate) async fn write(&self, message: Message) -> Result<()> {
        self.lifecycle.ensure_acquired()?;
        let _guard = self.write_lock.lock().await;
        if *self.closed.borrow() {
            return Err(TransportError::OutputClosed.into());
        }
        self.parent.write(message).await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.lifecycle.ensure_acquired()?;
        let _guard = self.write_lock.lock().await;
        if *self.closed.borrow() {
            return Ok(());
        }
        self.parent.close().await?;
        self.closed.send_replace(true);
        info!("multiplexer closed");
        Ok(())
    }

    pub(crate) fn register(&self, name: &str, channel: Arc<ChannelInner>) -> Result<()> {
        let mut streams = lock(&self.streams);
        if streams.contains_key(name) {
            return Err(MuxError::DuplicateChannel(name.to_string()));
        }
        if let Some(max) = self.config.max_channels {
            if streams.len() >= max {
                return Err(MuxError::ChannelLimit(max));
            }
        }
        streams.insert(name.to_string(), channel);
        Ok(())
    }

    /// Remove `name` if it still maps to `channel`.
    pub(crate) fn unregister(&self, name: &str, channel: &ChannelInner) {
        let mut streams = lock(&self.streams);
        if streams
            .get(name)
            .is_some_and(|registered| std::ptr::eq(Arc::as_ptr(registered), channel))
        {
            streams.remove(name);
        }
    }

    fn lookup(&self, name: &str) -> Option<Arc<ChannelInner>> {
        lock(&self.streams).get(name).cloned()
    }

    async fn reply(&self, target: &str, kind: FrameKind) {
        if let Err(err) = self.write(envelope::signal(target, kind)).await {
            debug!(channel = %target, kind = kind.as_str(), %err, "could not answer frame");
        }
    }

    async fn dispatch(&self, item: Option<Message>) -> ControlFlow<()> {
        if !self.lifecycle.is_acquired() {
            return ControlFlow::Continue(());
        }

        let Some(frame) = item else {
            self.shutdown.send_replace(true);
            info!("peer ended the connection");
            return ControlFlow::Break(());
        };

        match Inbound::decode(frame, self.config.strict_frame_types) {
            Inbound::BadTarget => {
                warn!("dropping frame with a non-string target");
            }
            Inbound::Closed { target, kind } => {
                let removed = lock(&self.streams).remove(&target);
                match removed {
                    Some(channel) => {
                        debug!(channel = %target, kind = kind.as_str(), "channel closed by peer");
                        channel.remote_close().await;
                    }
                    None => debug!(channel = %target, kind = kind.as_str(), "close for unknown channel"),
                }
            }
            Inbound::Message { target, payload } => match (self.lookup(&target), payload) {
                (None, _) => {
                    debug!(channel = %target, "message for unknown channel");
                    self.reply(&target, FrameKind::Close).await;
                }
                (Some(_), None) => {
                    debug!(channel = %target, "message without payload");
                    self.reply(&target, FrameKind::Illegal).await;
                }
                (Some(channel), Some(message)) => channel.deliver(message).await,
            },
            Inbound::Unknown { target, kind } => {
                debug!(channel = %target, %kind, "unrecognized frame type");
                let answer = if self.lookup(&target).is_some() {
                    FrameKind::Illegal
                } else {
                    FrameKind::Close
                };
                self.reply(&target, answer).await;
            }
        }
        ControlFlow::Continue(())
    }
}

impl Resource for MuxInner {
    type Error = MuxError;

    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    async fn on_acquire(&self) -> Result<()> {
        self.parent.acquire().await?;
        self.closed.send_replace(false);
        self.shutdown.send_replace(false);

        let me = self.me.clone();
        let task = Arc::new(ReaderTask::new(self.parent.input(), move |item| {
            let me = me.clone();
            async move {
                match me.upgrade() {
                    Some(mux) => mux.dispatch(item).await,
                    None => ControlFlow::Break(()),
                }
            }
        }));
        task.acquire().await?;
        self.lifecycle.register(task);

        let observed: Weak<dyn Release> = self.me.clone();
        self.parent.lifecycle().observe(observed);
        debug!("multiplexer acquired");
        Ok(())
    }

    async fn on_release(&self) -> Result<()> {
        self.parent.release().await?;
        debug!("multiplexer released");
        Ok(())
    }
}
