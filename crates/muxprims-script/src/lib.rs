//! Script environments as an acquirable collaborator.
//!
//! A [`Script`] wraps an execution environment that can run code, keeps a
//! string-keyed configuration map and exposes the clips its code produced as
//! opaque [`ClipHandle`]s. [`EngineScript`] adapts any synchronous [`Engine`]
//! to that interface.

pub mod engine;
pub mod error;
pub mod script;

pub use engine::{ClipHandle, Code, Engine};
pub use error::{Result, ScriptError};
pub use script::{EngineScript, Outputs, Script, CORE_PREFIX};

pub(crate) use muxprims_transport::lock;
