//! Named logical channels over one message connection.
//!
//! A [`Multiplexer`] owns a physical [`Connection`](muxprims_transport::Connection)
//! and routes every inbound frame to the [`Channel`] named by its `target`
//! field. Each channel behaves like a connection of its own: it is acquired
//! and released, read from and written to, and closed with a handshake frame
//! that tells the peer to stop sending. See [`envelope`] for the frame layout.

pub mod channel;
pub mod config;
pub mod envelope;
pub mod error;
pub mod multiplexer;

pub use channel::Channel;
pub use config::MultiplexerConfig;
pub use envelope::FrameKind;
pub use error::{MuxError, Result};
pub use multiplexer::Multiplexer;

pub(crate) use muxprims_transport::lock;
