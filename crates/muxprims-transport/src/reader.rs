use std::fmt;
use std::future::Future;
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex};

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use muxprims_frame::Message;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::connection::MessageInput;
use crate::error::{Result, TransportError};
use crate::lock;
use crate::resource::{self, Lifecycle, Resource};

type Callback = Box<dyn FnMut(Option<Message>) -> BoxFuture<'static, ControlFlow<()>> + Send>;

/// Background loop feeding every item of an input stream to a callback.
///
/// The loop is spawned on acquire and aborted on release. It stops on its
/// own after delivering end-of-stream or when the callback breaks. A failing
/// input is logged and delivered as end-of-stream. A task runs at most once.
pub struct ReaderTask {
    pending: Mutex<Option<(Arc<dyn MessageInput>, Callback)>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    lifecycle: Lifecycle,
}

impl ReaderTask {
    pub fn new<F, Fut>(input: Arc<dyn MessageInput>, mut callback: F) -> Self
    where
        F: FnMut(Option<Message>) -> Fut + Send + 'static,
        Fut: Future<Output = ControlFlow<()>> + Send + 'static,
    {
        let callback: Callback = Box::new(move |item| callback(item).boxed());
        Self {
            pending: Mutex::new(Some((input, callback))),
            handle: Mutex::new(None),
            lifecycle: Lifecycle::new("reader task"),
        }
    }

    pub async fn acquire(&self) -> Result<()> {
        resource::acquire(self).await
    }

    pub async fn release(&self) -> Result<()> {
        resource::release(self, false).await
    }

    /// Whether the loop has been spawned and not yet stopped.
    pub fn is_running(&self) -> bool {
        lock(&self.handle)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

async fn run(input: Arc<dyn MessageInput>, mut callback: Callback) {
    loop {
        let item = match input.read().await {
            Ok(item) => item,
            Err(err) => {
                warn!(%err, "reader input failed");
                None
            }
        };
        let ended = item.is_none();
        if callback(item).await.is_break() || ended {
            break;
        }
    }
    debug!("reader task stopped");
}

impl Resource for ReaderTask {
    type Error = TransportError;

    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    async fn on_acquire(&self) -> Result<()> {
        let (input, callback) = lock(&self.pending)
            .take()
            .ok_or(TransportError::Spent(self.lifecycle.kind()))?;
        *lock(&self.handle) = Some(tokio::spawn(run(input, callback)));
        Ok(())
    }

    async fn on_release(&self) -> Result<()> {
        if let Some(handle) = lock(&self.handle).take() {
            handle.abort();
        }
        Ok(())
    }
}

impl fmt::Debug for ReaderTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReaderTask")
            .field("running", &self.is_running())
            .field("lifecycle", &self.lifecycle)
            .finish_non_exhaustive()
    }
}
