use muxprims_frame::FrameError;

/// Errors that can occur in transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The resource was used before `acquire()` or after `release()`.
    #[error("{0} is not acquired")]
    NotAcquired(&'static str),

    /// A one-shot resource was acquired a second time.
    #[error("{0} cannot be restarted")]
    Spent(&'static str),

    /// The output stream has already been closed.
    #[error("output stream closed")]
    OutputClosed,

    /// A message could not be encoded or decoded.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
