/// Errors that can occur during message encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame header contains an invalid magic number.
    #[error("invalid frame magic (expected 0x594D \"YM\")")]
    InvalidMagic,

    /// The body exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The message carries more blobs than the codec accepts.
    #[error("too many blobs ({count}, max {max})")]
    TooManyBlobs { count: usize, max: usize },

    /// The body does not match the lengths announced in it.
    #[error("malformed frame body: {0}")]
    Malformed(&'static str),

    /// The fields section is not valid JSON.
    #[error("message fields are not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The fields section is valid JSON but not an object.
    #[error("message fields must be a JSON object")]
    NotAnObject,

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
