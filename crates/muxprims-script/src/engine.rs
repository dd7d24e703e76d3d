use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

use crate::error::Result;

/// Source code handed to an engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Code {
    Text(String),
    Bytes(Vec<u8>),
}

impl Code {
    /// The raw source bytes.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Code::Text(text) => text.as_bytes(),
            Code::Bytes(bytes) => bytes,
        }
    }
}

impl From<&str> for Code {
    fn from(text: &str) -> Self {
        Code::Text(text.to_string())
    }
}

impl From<String> for Code {
    fn from(text: String) -> Self {
        Code::Text(text)
    }
}

impl From<Vec<u8>> for Code {
    fn from(bytes: Vec<u8>) -> Self {
        Code::Bytes(bytes)
    }
}

impl From<&[u8]> for Code {
    fn from(bytes: &[u8]) -> Self {
        Code::Bytes(bytes.to_vec())
    }
}

/// Opaque reference to a clip owned by an engine.
///
/// Only the engine that issued a handle can interpret it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClipHandle(u64);

impl ClipHandle {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for ClipHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClipHandle({:#x})", self.0)
    }
}

/// A synchronous script execution environment.
///
/// Calls are made from async code, so implementations should return
/// promptly.
pub trait Engine: Send + Sync + 'static {
    /// Whether the environment still exists.
    fn is_alive(&self) -> bool;

    /// Current core settings, unprefixed (`"num_threads"`, ...).
    fn core_settings(&self) -> Result<BTreeMap<String, Value>>;

    /// Change one core setting.
    fn set_core_setting(&self, key: &str, value: &Value) -> Result<()>;

    /// Execute `code` inside the environment.
    fn run(&self, code: &Code) -> Result<Value>;

    /// Clips registered as outputs, by output name.
    fn outputs(&self) -> Result<BTreeMap<String, ClipHandle>>;
}
