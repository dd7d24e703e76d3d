//! Named message channels multiplexed over a single connection.
//!
//! muxprims carries many independent, ordered message streams over one
//! reliable connection. Each stream is a named channel with its own
//! acquire/release lifecycle and closing handshake.
//!
//! # Crate Structure
//!
//! - [`frame`]: Message model and the length-prefixed wire codec
//! - [`transport`]: Resource lifecycle, connections, pipes and reader tasks
//! - [`multiplex`]: Multiplexer and channels (behind `multiplex` feature)
//! - [`script`]: Script environment collaborator (behind `script` feature)

/// Re-export frame types.
pub mod frame {
    pub use muxprims_frame::*;
}

/// Re-export transport types.
pub mod transport {
    pub use muxprims_transport::*;
}

/// Re-export multiplexer types (requires `multiplex` feature).
#[cfg(feature = "multiplex")]
pub mod multiplex {
    pub use muxprims_multiplex::*;
}

/// Re-export script types (requires `script` feature).
#[cfg(feature = "script")]
pub mod script {
    pub use muxprims_script::*;
}
