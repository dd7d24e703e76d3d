//! Message model and length-prefixed wire codec.
//!
//! This is the lowest layer of muxprims. Every message is framed with:
//! - A 2-byte magic number ("YM") for stream synchronization
//! - A 4-byte little-endian body length
//! - A 2-byte little-endian blob count
//!
//! The body carries the JSON-encoded fields followed by the raw blobs.

pub mod codec;
pub mod error;
pub mod message;

pub use codec::{
    decode_message, encode_message, FrameConfig, MessageCodec, DEFAULT_MAX_BLOBS,
    DEFAULT_MAX_PAYLOAD, HEADER_SIZE,
};
pub use error::{FrameError, Result};
pub use message::{Fields, Message};
