//! Cooperative acquire/release lifecycle with cascading children.
//!
//! Every resource embeds a [`Lifecycle`] and implements [`Resource`] to supply
//! its acquire and release hooks. [`acquire`] and [`release`] drive the state
//! machine:
//!
//! - `acquire` is a no-op on an acquired resource, and also while another
//!   caller's acquire is still in progress. If the hook fails, every
//!   child registered during the attempt is released before the error is
//!   returned.
//! - `release` is a no-op on a released resource unless forced, and a no-op
//!   while the same resource is already releasing. Children are released
//!   most-recently-registered first, then the release hook runs.
//!
//! Children come in two flavours: owned ([`Lifecycle::register`]) and
//! observed ([`Lifecycle::observe`]). Observed children are released with the
//! parent only if something else still keeps them alive; dead ones are
//! pruned whenever another child is observed.

use std::fmt;
use std::future::Future;
use std::ptr;
use std::sync::{Arc, Mutex, Weak};

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tracing::{debug, trace, warn};

use crate::error::{Result, TransportError};
use crate::lock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Released,
    Acquiring,
    Acquired,
    Releasing,
}

enum Child {
    Owned(Arc<dyn Release>),
    Observed(Weak<dyn Release>),
}

impl Child {
    fn resolve(self) -> Option<Arc<dyn Release>> {
        match self {
            Child::Owned(child) => Some(child),
            Child::Observed(child) => child.upgrade(),
        }
    }

    fn is_alive(&self) -> bool {
        match self {
            Child::Owned(_) => true,
            Child::Observed(child) => child.strong_count() > 0,
        }
    }

    fn points_to(&self, target: *const ()) -> bool {
        match self {
            Child::Owned(child) => ptr::addr_eq(Arc::as_ptr(child), target),
            Child::Observed(child) => ptr::addr_eq(child.as_ptr(), target),
        }
    }
}

/// Lifecycle state and child registry embedded in every resource.
pub struct Lifecycle {
    kind: &'static str,
    state: Mutex<State>,
    children: Mutex<Vec<Child>>,
}

impl Lifecycle {
    /// Create the lifecycle of a released resource. `kind` names the
    /// resource in errors and logs.
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            state: Mutex::new(State::Released),
            children: Mutex::new(Vec::new()),
        }
    }

    /// The resource kind given at construction.
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Whether the resource may currently be used.
    ///
    /// A resource counts as acquired from the start of its acquire hook until
    /// its release hook has finished.
    pub fn is_acquired(&self) -> bool {
        *lock(&self.state) != State::Released
    }

    /// Guard for every operation other than acquire/release.
    pub fn ensure_acquired(&self) -> Result<()> {
        if self.is_acquired() {
            Ok(())
        } else {
            Err(TransportError::NotAcquired(self.kind))
        }
    }

    /// Tie `child`'s lifetime to this resource: releasing this resource
    /// releases `child`.
    pub fn register(&self, child: Arc<dyn Release>) {
        lock(&self.children).push(Child::Owned(child));
    }

    /// Like [`register`](Self::register), without keeping `child` alive.
    /// Observed children that were dropped meanwhile are pruned.
    pub fn observe(&self, child: Weak<dyn Release>) {
        let mut children = lock(&self.children);
        children.retain(Child::is_alive);
        children.push(Child::Observed(child));
    }

    /// Drop every registration of `child`.
    pub fn forget<T: ?Sized>(&self, child: &T) {
        let target = child as *const T as *const ();
        lock(&self.children).retain(|registered| !registered.points_to(target));
    }

    /// Number of registered children, dropped observed ones included.
    pub fn child_count(&self) -> usize {
        lock(&self.children).len()
    }

    fn begin_acquire(&self) -> bool {
        let mut state = lock(&self.state);
        if *state != State::Released {
            return false;
        }
        *state = State::Acquiring;
        true
    }

    fn begin_release(&self, force: bool) -> bool {
        let mut state = lock(&self.state);
        match *state {
            State::Releasing => false,
            State::Released if !force => false,
            _ => {
                *state = State::Releasing;
                true
            }
        }
    }

    fn finish(&self, next: State) {
        *lock(&self.state) = next;
    }

    fn take_children(&self) -> Vec<Child> {
        std::mem::take(&mut *lock(&self.children))
    }
}

impl fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifecycle")
            .field("kind", &self.kind)
            .field("state", &*lock(&self.state))
            .field("children", &lock(&self.children).len())
            .finish()
    }
}

/// A resource with type-specific acquire and release hooks.
pub trait Resource: Send + Sync + 'static {
    /// Error returned by the hooks.
    type Error: fmt::Display + Send;

    /// The embedded lifecycle.
    fn lifecycle(&self) -> &Lifecycle;

    /// Set the resource up. Runs at most once per acquire/release cycle.
    fn on_acquire(&self) -> impl Future<Output = std::result::Result<(), Self::Error>> + Send;

    /// Tear the resource down, after all of its children were released.
    fn on_release(&self) -> impl Future<Output = std::result::Result<(), Self::Error>> + Send;
}

/// Object-safe view of a resource, used for child registration.
pub trait Release: Send + Sync {
    /// Release without forcing; failures are logged, not returned.
    fn release_boxed(&self) -> BoxFuture<'_, ()>;
}

impl<R: Resource> Release for R {
    fn release_boxed(&self) -> BoxFuture<'_, ()> {
        async move {
            if let Err(err) = release(self, false).await {
                warn!(resource = self.lifecycle().kind(), %err, "child resource failed to release");
            }
        }
        .boxed()
    }
}

/// Acquire `resource`.
///
/// Returns `Ok(())` at once when the resource is acquired or another caller
/// is still acquiring it; in the latter case the acquire hook may not have
/// finished yet. Callers sharing a resource acquire it once, up front.
pub async fn acquire<R: Resource>(resource: &R) -> std::result::Result<(), R::Error> {
    let lifecycle = resource.lifecycle();
    if !lifecycle.begin_acquire() {
        return Ok(());
    }

    trace!(resource = lifecycle.kind(), "acquiring");
    match resource.on_acquire().await {
        Ok(()) => {
            lifecycle.finish(State::Acquired);
            Ok(())
        }
        Err(err) => {
            debug!(resource = lifecycle.kind(), %err, "acquire failed");
            release_children(lifecycle).await;
            lifecycle.finish(State::Released);
            Err(err)
        }
    }
}

/// Release `resource` and, first, all of its children.
pub async fn release<R: Resource>(resource: &R, force: bool) -> std::result::Result<(), R::Error> {
    let lifecycle = resource.lifecycle();
    if !lifecycle.begin_release(force) {
        return Ok(());
    }

    trace!(resource = lifecycle.kind(), force, "releasing");
    release_children(lifecycle).await;
    let result = resource.on_release().await;
    lifecycle.finish(State::Released);
    result
}

async fn release_children(lifecycle: &Lifecycle) {
    let children = lifecycle.take_children();
    for child in children.into_iter().rev() {
        if let Some(child) = child.resolve() {
            child.release_boxed().await;
        }
    }
}
