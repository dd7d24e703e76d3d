//! Multi-channel example: two multiplexers over an in-memory byte stream.
//!
//! The server echoes every message it gets on the `command` and `data`
//! channels; the client sends one message on each and prints the replies.
//!
//! Run with:
//!   RUST_LOG=debug cargo run --example multi-channel

use muxprims::frame::Message;
use muxprims::multiplex::{Channel, Multiplexer};
use muxprims::transport::Connection;
use tracing::info;
use tracing_subscriber::EnvFilter;

async fn echo(channel: Channel) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    while let Some(message) = channel.read().await? {
        info!(channel = channel.name(), fields = ?message.fields(), "[server] echoing");
        channel.write(message).await?;
    }
    channel.release().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false)
        .init();

    let (client_io, server_io) = tokio::io::duplex(64 * 1024);

    let server = Multiplexer::new(Connection::framed(server_io));
    server.acquire().await?;
    let mut echoes = Vec::new();
    for name in ["command", "data"] {
        let channel = server.connect(name);
        channel.acquire().await?;
        echoes.push(tokio::spawn(echo(channel)));
    }

    let client = Multiplexer::new(Connection::framed(client_io));
    client.acquire().await?;

    let command = client.connect("command");
    command.acquire().await?;
    command
        .write(Message::default().with_field("action", "ping"))
        .await?;
    if let Some(reply) = command.read().await? {
        info!(fields = ?reply.fields(), "[client] command reply");
    }

    let data = client.connect("data");
    data.acquire().await?;
    data.write(Message::default().with_field("len", 23).with_blob(&b"bulk payload bytes here"[..]))
        .await?;
    if let Some(reply) = data.read().await? {
        info!(blobs = reply.blobs().len(), "[client] data reply");
    }

    // Releasing the client closes both channels, which ends both echo loops.
    client.release().await?;
    for task in echoes {
        task.await??;
    }
    server.release().await?;
    Ok(())
}
