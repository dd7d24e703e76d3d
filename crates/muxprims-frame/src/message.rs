use bytes::Bytes;
use serde_json::{Map, Value};

use crate::error::{FrameError, Result};

/// Structured message fields. Key order carries no meaning.
pub type Fields = Map<String, Value>;

/// The unit exchanged over every connection: key/value fields plus an
/// ordered list of binary blobs.
///
/// Messages are immutable once built; the `with_*` helpers consume and
/// return a new value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Message {
    fields: Fields,
    blobs: Vec<Bytes>,
}

impl Message {
    /// Create a message from fields and blobs.
    pub fn new(fields: Fields, blobs: Vec<Bytes>) -> Self {
        Self { fields, blobs }
    }

    /// Create a message without blobs.
    pub fn from_fields(fields: Fields) -> Self {
        Self::new(fields, Vec::new())
    }

    /// Create a message from a JSON object value.
    ///
    /// Fails if `value` is not an object.
    pub fn from_json(value: Value) -> Result<Self> {
        match value {
            Value::Object(fields) => Ok(Self::from_fields(fields)),
            _ => Err(FrameError::NotAnObject),
        }
    }

    /// Return a copy of this message with one more field.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Return a copy of this message with one more blob appended.
    pub fn with_blob(mut self, blob: impl Into<Bytes>) -> Self {
        self.blobs.push(blob.into());
        self
    }

    /// The message fields.
    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    /// Look up a single field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// The attached blobs, in order.
    pub fn blobs(&self) -> &[Bytes] {
        &self.blobs
    }

    /// Split the message into its fields and blobs.
    pub fn into_parts(self) -> (Fields, Vec<Bytes>) {
        (self.fields, self.blobs)
    }
}

impl From<Fields> for Message {
    fn from(fields: Fields) -> Self {
        Self::from_fields(fields)
    }
}
