use std::collections::HashMap;
use std::time::Duration;

use muxprims::frame::Message;
use muxprims::multiplex::{MuxError, Multiplexer};
use muxprims::transport::{Connection, TransportError};
use serde_json::{json, Value};
use tokio::time::timeout;

const CHANNELS: usize = 8;
const PER_CHANNEL: u64 = 50;

fn frame(value: Value) -> Message {
    Message::from_json(value).unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_channel_writes_produce_whole_frames() {
    let (mux_io, peer_io) = tokio::io::duplex(4 * 1024);
    let mux = Multiplexer::new(Connection::framed(mux_io));
    let peer = Connection::framed(peer_io);
    mux.acquire().await.unwrap();
    peer.acquire().await.unwrap();

    let mut writers = Vec::new();
    for index in 0..CHANNELS {
        let channel = mux.connect(format!("ch{index}"));
        channel.acquire().await.unwrap();
        writers.push(tokio::spawn(async move {
            for seq in 0..PER_CHANNEL {
                let message = frame(json!({ "seq": seq })).with_blob(vec![index as u8; 700]);
                channel.write(message).await.unwrap();
            }
            channel
        }));
    }

    let mut next_seq: HashMap<String, u64> = HashMap::new();
    for _ in 0..CHANNELS as u64 * PER_CHANNEL {
        let sent = timeout(Duration::from_secs(5), peer.read())
            .await
            .expect("frame should arrive")
            .unwrap()
            .expect("stream should be open");

        assert_eq!(sent.get("type"), Some(&json!("message")));
        let target = sent.get("target").and_then(Value::as_str).unwrap().to_string();
        let seq = sent.get("payload").and_then(|p| p.get("seq")).and_then(Value::as_u64).unwrap();
        let expected = next_seq.entry(target.clone()).or_default();
        assert_eq!(seq, *expected, "frames for {target} out of order");
        *expected += 1;

        let index: u8 = target.trim_start_matches("ch").parse().unwrap();
        assert_eq!(sent.blobs().len(), 1);
        assert_eq!(sent.blobs()[0].len(), 700);
        assert!(sent.blobs()[0].iter().all(|byte| *byte == index));
    }
    assert_eq!(next_seq.len(), CHANNELS);
    assert!(next_seq.values().all(|count| *count == PER_CHANNEL));

    for writer in writers {
        writer.await.unwrap();
    }
    mux.release().await.unwrap();
}

#[tokio::test]
async fn framed_ping_pong_with_blobs() {
    let (left_io, right_io) = tokio::io::duplex(64 * 1024);
    let client = Multiplexer::new(Connection::framed(left_io));
    let server = Multiplexer::new(Connection::framed(right_io));
    client.acquire().await.unwrap();
    server.acquire().await.unwrap();

    let server_video = server.connect("video");
    server_video.acquire().await.unwrap();
    let client_video = client.connect("video");
    client_video.acquire().await.unwrap();

    let ping = frame(json!({ "ping": 1 })).with_blob(vec![0xAAu8; 16]);
    client_video.write(ping.clone()).await.unwrap();
    assert_eq!(server_video.read().await.unwrap(), Some(ping));

    let pong = frame(json!({ "pong": 1 }));
    server_video.write(pong.clone()).await.unwrap();
    assert_eq!(client_video.read().await.unwrap(), Some(pong));

    client_video.release().await.unwrap();
    assert_eq!(server_video.read().await.unwrap(), None);
    assert!(!server.contains("video"));
    assert!(!client.contains("video"));

    client.release().await.unwrap();
    timeout(Duration::from_secs(1), server.wait_shutdown())
        .await
        .expect("server should see the connection end");
    server.release().await.unwrap();
}

#[tokio::test]
async fn slow_reader_does_not_block_other_channels() {
    let (left, right) = Connection::pair();
    let client = Multiplexer::new(left);
    let server = Multiplexer::new(right);
    client.acquire().await.unwrap();
    server.acquire().await.unwrap();

    let slow = server.connect("slow");
    slow.acquire().await.unwrap();
    let fast = server.connect("fast");
    fast.acquire().await.unwrap();

    let slow_out = client.connect("slow");
    slow_out.acquire().await.unwrap();
    let fast_out = client.connect("fast");
    fast_out.acquire().await.unwrap();

    for n in 0..100 {
        slow_out.write(frame(json!({ "n": n }))).await.unwrap();
    }
    fast_out.write(frame(json!({ "n": "fast" }))).await.unwrap();

    // Nothing has read "slow" yet.
    assert_eq!(
        timeout(Duration::from_secs(1), fast.read()).await.unwrap().unwrap(),
        Some(frame(json!({ "n": "fast" })))
    );
    for n in 0..100 {
        assert_eq!(slow.read().await.unwrap(), Some(frame(json!({ "n": n }))));
    }
}

#[tokio::test]
async fn write_after_close_is_rejected() {
    let (left, _right) = Connection::pair();
    let mux = Multiplexer::new(left);
    mux.acquire().await.unwrap();
    let channel = mux.connect("A");
    channel.acquire().await.unwrap();

    mux.close().await.unwrap();

    assert!(matches!(
        channel.write(Message::default()).await,
        Err(MuxError::Transport(TransportError::OutputClosed))
    ));
    assert!(matches!(
        mux.write(Message::default()).await,
        Err(MuxError::Transport(TransportError::OutputClosed))
    ));
}
