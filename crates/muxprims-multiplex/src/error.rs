use muxprims_transport::TransportError;

/// Errors that can occur in multiplexer and channel operations.
#[derive(Debug, thiserror::Error)]
pub enum MuxError {
    /// Lifecycle or connection error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A channel with this name is already registered.
    #[error("channel {0:?} is already registered")]
    DuplicateChannel(String),

    /// The channel was closed locally or by the peer.
    #[error("channel {0:?} was reset")]
    ConnectionReset(String),

    /// Registering another channel would exceed the configured limit.
    #[error("channel limit of {0} reached")]
    ChannelLimit(usize),
}

pub type Result<T> = std::result::Result<T, MuxError>;
