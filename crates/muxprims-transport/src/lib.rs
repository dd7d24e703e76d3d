//! Resource lifecycle and message connections.
//!
//! Everything in muxprims that must be set up and torn down implements
//! [`Resource`]: connections, pipes wrapped as connections, reader tasks and,
//! one layer up, multiplexers and channels. A [`Connection`] is a pair of
//! message streams, backed either by an in-process [`pipe`] or by an async
//! byte stream carrying the muxprims wire codec.

pub mod connection;
pub mod error;
pub mod framed;
pub mod pipe;
pub mod reader;
pub mod resource;

pub use connection::{Connection, MessageInput, MessageOutput};
pub use error::{Result, TransportError};
pub use framed::{FramedInput, FramedOutput};
pub use pipe::{pipe, PipeReader, PipeWriter};
pub use reader::ReaderTask;
pub use resource::{acquire, release, Lifecycle, Release, Resource};

/// Lock a std mutex, recovering the guard if a holder panicked.
#[doc(hidden)]
pub fn lock<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}
