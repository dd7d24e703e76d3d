//! Multiplexing envelope carried on the physical connection.
//!
//! Every frame is a [`Message`] whose fields are:
//!
//! ```text
//! {
//!   "target":  "<channel name>",
//!   "type":    "message" | "close" | "illegal",
//!   "payload": { ...inner fields... }      // "message" frames only
//! }
//! ```
//!
//! The blobs of the frame are the blobs of the inner message, unchanged.

use muxprims_frame::{Fields, Message};
use serde_json::Value;

pub const TARGET: &str = "target";
pub const TYPE: &str = "type";
pub const PAYLOAD: &str = "payload";

/// Frame type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Application data for the target channel.
    Message,
    /// The sender closed the target channel.
    Close,
    /// The sender rejected a frame for the target channel.
    Illegal,
}

impl FrameKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FrameKind::Message => "message",
            FrameKind::Close => "close",
            FrameKind::Illegal => "illegal",
        }
    }

    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "message" => Some(FrameKind::Message),
            "close" => Some(FrameKind::Close),
            "illegal" => Some(FrameKind::Illegal),
            _ => None,
        }
    }
}

/// Wrap an application message for `target`.
pub fn wrap(target: &str, message: Message) -> Message {
    let (fields, blobs) = message.into_parts();
    let mut outer = Fields::new();
    outer.insert(TARGET.into(), Value::from(target));
    outer.insert(TYPE.into(), Value::from(FrameKind::Message.as_str()));
    outer.insert(PAYLOAD.into(), Value::Object(fields));
    Message::new(outer, blobs)
}

/// A `close` or `illegal` frame for `target`. These never carry a payload.
pub fn signal(target: &str, kind: FrameKind) -> Message {
    Message::from_fields(Fields::new())
        .with_field(TARGET, target)
        .with_field(TYPE, kind.as_str())
}

/// An inbound frame, classified.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// A `message` frame. `payload` is `None` when it was missing or not an
    /// object.
    Message {
        target: String,
        payload: Option<Message>,
    },
    /// A `close` or `illegal` frame.
    Closed { target: String, kind: FrameKind },
    /// A frame whose `type` is not recognized.
    Unknown { target: String, kind: String },
    /// A frame whose `target` is not a string.
    BadTarget,
}

impl Inbound {
    /// Classify `frame`. A missing `target` means `""` and a missing `type`
    /// means `message`. With `strict` off, unrecognized types are read as
    /// `message`.
    pub fn decode(frame: Message, strict: bool) -> Self {
        let (mut fields, blobs) = frame.into_parts();

        let target = match fields.remove(TARGET) {
            None => String::new(),
            Some(Value::String(target)) => target,
            Some(_) => return Inbound::BadTarget,
        };

        let kind = match fields.get(TYPE) {
            None => Ok(FrameKind::Message),
            Some(Value::String(tag)) => FrameKind::parse(tag).ok_or_else(|| tag.clone()),
            Some(other) => Err(other.to_string()),
        };
        let kind = match kind {
            Ok(kind) => kind,
            Err(_) if !strict => FrameKind::Message,
            Err(kind) => return Inbound::Unknown { target, kind },
        };

        match kind {
            FrameKind::Message => {
                let payload = match fields.remove(PAYLOAD) {
                    Some(Value::Object(inner)) => Some(Message::new(inner, blobs)),
                    _ => None,
                };
                Inbound::Message { target, payload }
            }
            kind => Inbound::Closed { target, kind },
        }
    }
}
