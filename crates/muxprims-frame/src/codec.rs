use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde_json::Value;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{FrameError, Result};
use crate::message::Message;

/// Frame header: magic (2) + body length (4) + blob count (2) = 8 bytes.
pub const HEADER_SIZE: usize = 8;

/// Magic bytes: "YM" (0x59 0x4D).
pub const MAGIC: [u8; 2] = [0x59, 0x4D];

/// Default maximum body size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// Default maximum number of blobs per message.
pub const DEFAULT_MAX_BLOBS: usize = 1024;

/// Every body section (fields, each blob) is prefixed with its length.
const SECTION_PREFIX: usize = 4;

/// Configuration for the message codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameConfig {
    /// Maximum body size in bytes. Default: 16 MiB.
    pub max_payload_size: usize,
    /// Maximum number of blobs per message. Default: 1024.
    pub max_blobs: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            max_blobs: DEFAULT_MAX_BLOBS,
        }
    }
}

/// Encode a message into the wire format.
///
/// Wire format:
/// ```text
/// ┌────────────┬────────────┬────────────┬──────────────────────────────────────┐
/// │ Magic (2B) │ Length     │ Blobs      │ Body (Length bytes)                  │
/// │ 0x59 0x4D  │ (4B LE)    │ (2B LE)    │ len(4B LE) fields-json               │
/// │ "YM"       │            │            │ { len(4B LE) blob } x Blobs          │
/// └────────────┴────────────┴────────────┴──────────────────────────────────────┘
/// ```
pub fn encode_message(message: &Message, dst: &mut BytesMut) -> Result<()> {
    let fields = serde_json::to_vec(message.fields())?;
    let blobs = message.blobs();

    if blobs.len() > u16::MAX as usize {
        return Err(FrameError::TooManyBlobs {
            count: blobs.len(),
            max: u16::MAX as usize,
        });
    }

    let body_len = SECTION_PREFIX
        + fields.len()
        + blobs
            .iter()
            .map(|blob| SECTION_PREFIX + blob.len())
            .sum::<usize>();
    if body_len > u32::MAX as usize {
        return Err(FrameError::PayloadTooLarge {
            size: body_len,
            max: u32::MAX as usize,
        });
    }

    dst.reserve(HEADER_SIZE + body_len);
    dst.put_slice(&MAGIC);
    dst.put_u32_le(body_len as u32);
    dst.put_u16_le(blobs.len() as u16);
    put_section(dst, &fields);
    for blob in blobs {
        put_section(dst, blob);
    }
    Ok(())
}

/// Decode a message from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer.
pub fn decode_message(src: &mut BytesMut, config: &FrameConfig) -> Result<Option<Message>> {
    if src.len() < HEADER_SIZE {
        return Ok(None); // Need more data
    }

    if src[0..2] != MAGIC {
        return Err(FrameError::InvalidMagic);
    }

    let body_len = u32::from_le_bytes([src[2], src[3], src[4], src[5]]) as usize;
    let blob_count = u16::from_le_bytes([src[6], src[7]]) as usize;

    if body_len > config.max_payload_size {
        return Err(FrameError::PayloadTooLarge {
            size: body_len,
            max: config.max_payload_size,
        });
    }
    if blob_count > config.max_blobs {
        return Err(FrameError::TooManyBlobs {
            count: blob_count,
            max: config.max_blobs,
        });
    }

    let total = HEADER_SIZE + body_len;
    if src.len() < total {
        src.reserve(total - src.len());
        return Ok(None); // Need more data
    }

    src.advance(HEADER_SIZE);
    let mut body = src.split_to(body_len).freeze();

    let fields = match serde_json::from_slice::<Value>(&take_section(&mut body)?)? {
        Value::Object(fields) => fields,
        _ => return Err(FrameError::NotAnObject),
    };
    let mut blobs = Vec::with_capacity(blob_count);
    for _ in 0..blob_count {
        blobs.push(take_section(&mut body)?);
    }
    if body.has_remaining() {
        return Err(FrameError::Malformed("trailing bytes after last blob"));
    }

    Ok(Some(Message::new(fields, blobs)))
}

fn put_section(dst: &mut BytesMut, section: &[u8]) {
    dst.put_u32_le(section.len() as u32);
    dst.put_slice(section);
}

fn take_section(body: &mut Bytes) -> Result<Bytes> {
    if body.remaining() < SECTION_PREFIX {
        return Err(FrameError::Malformed("truncated section length"));
    }
    let len = body.get_u32_le() as usize;
    if body.remaining() < len {
        return Err(FrameError::Malformed("section longer than frame body"));
    }
    Ok(body.split_to(len))
}

/// `tokio_util` codec carrying [`Message`]s over a byte stream.
#[derive(Debug, Clone, Default)]
pub struct MessageCodec {
    config: FrameConfig,
}

impl MessageCodec {
    /// Create a codec with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a codec with explicit configuration.
    pub fn with_config(config: FrameConfig) -> Self {
        Self { config }
    }

    /// Current codec configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>> {
        decode_message(src, &self.config)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Message>> {
        match self.decode(src)? {
            Some(message) => Ok(Some(message)),
            None if src.is_empty() => Ok(None),
            None => Err(FrameError::ConnectionClosed),
        }
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<()> {
        if item.blobs().len() > self.config.max_blobs {
            return Err(FrameError::TooManyBlobs {
                count: item.blobs().len(),
                max: self.config.max_blobs,
            });
        }

        let start = dst.len();
        encode_message(&item, dst)?;

        let body_len = dst.len() - start - HEADER_SIZE;
        if body_len > self.config.max_payload_size {
            dst.truncate(start);
            return Err(FrameError::PayloadTooLarge {
                size: body_len,
                max: self.config.max_payload_size,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;
    use serde_json::json;
    use tokio_util::codec::FramedRead;

    use super::*;

    fn ping() -> Message {
        Message::from_json(json!({"cmd": "ping"})).unwrap()
    }

    #[test]
    fn test_encode_decode_with_blobs() {
        let mut buf = BytesMut::new();
        let msg = ping()
            .with_blob(Bytes::from_static(b"frame-0"))
            .with_blob(Bytes::new())
            .with_blob(Bytes::from_static(b"frame-2"));

        encode_message(&msg, &mut buf).unwrap();

        let decoded = decode_message(&mut buf, &FrameConfig::default())
            .unwrap()
            .unwrap();

        assert_eq!(decoded, msg);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_incomplete_header() {
        let mut buf = BytesMut::from(&[0x59, 0x4D, 0x00][..]);
        let result = decode_message(&mut buf, &FrameConfig::default()).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_decode_incomplete_body() {
        let mut buf = BytesMut::new();
        encode_message(&ping(), &mut buf).unwrap();
        buf.truncate(HEADER_SIZE + 2);

        let result = decode_message(&mut buf, &FrameConfig::default()).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_decode_invalid_magic() {
        let mut buf = BytesMut::from(&[0xFF, 0xFF, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00][..]);
        let result = decode_message(&mut buf, &FrameConfig::default());
        assert!(matches!(result, Err(FrameError::InvalidMagic)));
    }

    #[test]
    fn test_decode_payload_too_large() {
        let mut buf = BytesMut::new();
        buf.put_slice(&MAGIC);
        buf.put_u32_le(1024 * 1024 * 32); // 32 MiB
        buf.put_u16_le(0);

        let result = decode_message(&mut buf, &FrameConfig::default());
        assert!(matches!(result, Err(FrameError::PayloadTooLarge { .. })));
    }

    #[test]
    fn test_decode_too_many_blobs() {
        let mut buf = BytesMut::new();
        buf.put_slice(&MAGIC);
        buf.put_u32_le(4);
        buf.put_u16_le(9);

        let cfg = FrameConfig {
            max_blobs: 8,
            ..FrameConfig::default()
        };
        let result = decode_message(&mut buf, &cfg);
        assert!(matches!(
            result,
            Err(FrameError::TooManyBlobs { count: 9, max: 8 })
        ));
    }

    #[test]
    fn test_decode_rejects_non_object_fields() {
        let mut buf = BytesMut::new();
        let json = b"[1,2]";
        buf.put_slice(&MAGIC);
        buf.put_u32_le((SECTION_PREFIX + json.len()) as u32);
        buf.put_u16_le(0);
        put_section(&mut buf, json);

        let result = decode_message(&mut buf, &FrameConfig::default());
        assert!(matches!(result, Err(FrameError::NotAnObject)));
    }

    #[test]
    fn test_decode_rejects_blob_past_body() {
        let mut buf = BytesMut::new();
        let json = b"{}";
        buf.put_slice(&MAGIC);
        buf.put_u32_le((SECTION_PREFIX * 2 + json.len()) as u32);
        buf.put_u16_le(1);
        put_section(&mut buf, json);
        buf.put_u32_le(64); // blob claims more bytes than the body holds

        let result = decode_message(&mut buf, &FrameConfig::default());
        assert!(matches!(result, Err(FrameError::Malformed(_))));
    }

    #[test]
    fn test_decode_rejects_trailing_bytes() {
        let mut buf = BytesMut::new();
        let json = b"{}";
        buf.put_slice(&MAGIC);
        buf.put_u32_le((SECTION_PREFIX + json.len() + 3) as u32);
        buf.put_u16_le(0);
        put_section(&mut buf, json);
        buf.put_slice(b"xyz");

        let result = decode_message(&mut buf, &FrameConfig::default());
        assert!(matches!(result, Err(FrameError::Malformed(_))));
    }

    #[test]
    fn test_multiple_messages() {
        let mut buf = BytesMut::new();
        let second = Message::from_json(json!({"cmd": "pong"})).unwrap();
        encode_message(&ping(), &mut buf).unwrap();
        encode_message(&second, &mut buf).unwrap();

        let cfg = FrameConfig::default();
        let m1 = decode_message(&mut buf, &cfg).unwrap().unwrap();
        let m2 = decode_message(&mut buf, &cfg).unwrap().unwrap();

        assert_eq!(m1, ping());
        assert_eq!(m2, second);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_empty_message() {
        let mut buf = BytesMut::new();
        encode_message(&Message::default(), &mut buf).unwrap();

        let decoded = decode_message(&mut buf, &FrameConfig::default())
            .unwrap()
            .unwrap();
        assert!(decoded.fields().is_empty());
        assert!(decoded.blobs().is_empty());
    }

    #[test]
    fn codec_rejects_oversized_message_without_writing() {
        let mut codec = MessageCodec::with_config(FrameConfig {
            max_payload_size: 16,
            ..FrameConfig::default()
        });
        let mut buf = BytesMut::new();
        let msg = ping().with_blob(vec![0xAB; 64]);

        let err = codec.encode(msg, &mut buf).unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { .. }));
        assert!(buf.is_empty());
    }

    #[test]
    fn codec_decode_eof_mid_frame() {
        let mut codec = MessageCodec::new();
        let mut buf = BytesMut::new();
        encode_message(&ping(), &mut buf).unwrap();
        buf.truncate(buf.len() - 1);

        let err = codec.decode_eof(&mut buf).unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[tokio::test]
    async fn framed_read_yields_messages_then_ends() {
        let mut wire = BytesMut::new();
        let mut codec = MessageCodec::new();
        codec
            .encode(ping().with_blob(Bytes::from_static(b"raw")), &mut wire)
            .unwrap();
        codec.encode(ping(), &mut wire).unwrap();

        let bytes = wire.freeze();
        let mut framed = FramedRead::new(&bytes[..], MessageCodec::new());

        let first = framed.next().await.unwrap().unwrap();
        assert_eq!(first.blobs()[0].as_ref(), b"raw");
        let second = framed.next().await.unwrap().unwrap();
        assert!(second.blobs().is_empty());
        assert!(framed.next().await.is_none());
    }
}
