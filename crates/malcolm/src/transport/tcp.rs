// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! TCP binding.
//!
//! Wire format:
//! ```text
//! +----------------+-------------------+
//! | Length (4B BE) | JSON payload      |
//! +----------------+-------------------+
//! ```
//!
//! Zero-length and oversized inbound frames close the connection. Outbound
//! frames failing the same checks are dropped.

use super::{ClientEndpoint, PeerId, PeerTable, ServerEndpoint, TransportEvent};
use crate::error::{Error, Result};
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Read one frame.
///
/// Returns `Ok(None)` if the connection is closed gracefully.
pub async fn read_frame<R>(reader: &mut R, max_message_size: usize) -> Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len == 0 {
        return Err(Error::Protocol("Empty message".into()));
    }
    if len > max_message_size {
        return Err(Error::Protocol(format!(
            "Message too large: {} > {}",
            len, max_message_size
        )));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(Some(body))
}

/// Write one frame and flush.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8], max_message_size: usize) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if payload.is_empty() {
        return Err(Error::Protocol("Empty message".into()));
    }
    if payload.len() > max_message_size {
        return Err(Error::Protocol(format!(
            "Message too large: {} > {}",
            payload.len(),
            max_message_size
        )));
    }

    let len = payload.len() as u32;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Write one queued frame. A frame refused by the length checks is logged
/// and dropped; only an I/O failure is returned.
async fn write_queued<W>(
    writer: &mut W,
    payload: &[u8],
    max_message_size: usize,
    label: &(dyn std::fmt::Display + Sync),
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    match write_frame(writer, payload, max_message_size).await {
        Err(Error::Protocol(reason)) => {
            warn!("[{}] Dropping outbound frame: {}", label, reason);
            Ok(())
        }
        other => other,
    }
}

/// Bind `address` and start accepting peers.
pub async fn listen(address: &str, max_message_size: usize) -> Result<ServerEndpoint> {
    let listener = TcpListener::bind(address).await?;
    let local_addr = listener.local_addr()?;
    info!("Listening on tcp://{}", local_addr);

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let peers: PeerTable = Arc::new(DashMap::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(accept_loop(
        listener,
        events_tx,
        peers.clone(),
        shutdown_rx,
        max_message_size,
    ));

    Ok(ServerEndpoint::new(
        events_rx,
        peers,
        shutdown_tx,
        Some(local_addr),
    ))
}

async fn accept_loop(
    listener: TcpListener,
    events: mpsc::UnboundedSender<TransportEvent>,
    peers: PeerTable,
    mut shutdown: watch::Receiver<bool>,
    max_message_size: usize,
) {
    let mut next_peer = 0u64;
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, peer_addr)) => {
                        let peer = PeerId::from_counter(next_peer);
                        next_peer += 1;
                        info!("[{}] New connection from {}", peer, peer_addr);
                        tokio::spawn(handle_connection(
                            stream,
                            peer_addr,
                            peer,
                            events.clone(),
                            peers.clone(),
                            shutdown.clone(),
                            max_message_size,
                        ));
                    }
                    Err(e) => warn!("Accept error: {}", e),
                }
            }
            _ = shutdown.changed() => {
                debug!("Accept loop shutting down");
                break;
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    peer: PeerId,
    events: mpsc::UnboundedSender<TransportEvent>,
    peers: PeerTable,
    mut shutdown: watch::Receiver<bool>,
    max_message_size: usize,
) {
    let _ = stream.set_nodelay(true);
    let (mut reader, mut writer) = stream.into_split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Vec<u8>>();
    peers.insert(peer.clone(), outbound_tx);

    let writer_peer = peer.clone();
    tokio::spawn(async move {
        while let Some(payload) = outbound_rx.recv().await {
            let written = write_queued(&mut writer, &payload, max_message_size, &writer_peer).await;
            if let Err(e) = written {
                warn!("[{}] Failed to send frame: {}", writer_peer, e);
                break;
            }
        }
        let _ = writer.shutdown().await;
    });

    if events.send(TransportEvent::Connected(peer.clone())).is_err() {
        peers.remove(&peer);
        return;
    }

    loop {
        tokio::select! {
            result = read_frame(&mut reader, max_message_size) => {
                match result {
                    Ok(Some(payload)) => {
                        if events.send(TransportEvent::Message(peer.clone(), payload)).is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        info!("[{}] Connection closed: {}", peer, peer_addr);
                        break;
                    }
                    Err(e) => {
                        warn!("[{}] Read error from {}: {}", peer, peer_addr, e);
                        break;
                    }
                }
            }
            _ = shutdown.changed() => {
                debug!("[{}] Connection handler shutting down", peer);
                break;
            }
        }
    }

    peers.remove(&peer);
    let _ = events.send(TransportEvent::Disconnected(peer));
}

/// Connect to a server at `address`.
pub async fn connect(address: &str, max_message_size: usize) -> Result<ClientEndpoint> {
    let stream = TcpStream::connect(address).await?;
    let _ = stream.set_nodelay(true);
    debug!("Connected to tcp://{}", address);

    let (mut reader, mut writer) = stream.into_split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let (closed_tx, closed_rx) = watch::channel(false);

    let mut closed = closed_rx.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                payload = outbound_rx.recv() => {
                    let Some(payload) = payload else { break };
                    let written =
                        write_queued(&mut writer, &payload, max_message_size, &"server").await;
                    if let Err(e) = written {
                        warn!("Failed to send frame: {}", e);
                        break;
                    }
                }
                _ = closed.changed() => break,
            }
        }
        let _ = writer.shutdown().await;
    });

    let mut closed = closed_rx;
    tokio::spawn(async move {
        loop {
            tokio::select! {
                result = read_frame(&mut reader, max_message_size) => {
                    match result {
                        Ok(Some(payload)) => {
                            if inbound_tx.send(payload).is_err() {
                                break;
                            }
                        }
                        Ok(None) => {
                            debug!("Server closed the connection");
                            break;
                        }
                        Err(e) => {
                            warn!("Read error: {}", e);
                            break;
                        }
                    }
                }
                _ = closed.changed() => break,
            }
        }
    });

    Ok(ClientEndpoint::new(outbound_tx, inbound_rx, closed_tx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_frame_roundtrip() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        write_frame(&mut a, br#"{"type":"Ready","device":"d"}"#, 1024)
            .await
            .unwrap();
        let frame = read_frame(&mut b, 1024).await.unwrap().unwrap();
        assert_eq!(frame, br#"{"type":"Ready","device":"d"}"#);

        drop(a);
        assert!(read_frame(&mut b, 1024).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_frame_limits() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        a.write_all(&0u32.to_be_bytes()).await.unwrap();
        let err = read_frame(&mut b, 1024).await.unwrap_err();
        assert_eq!(err.to_string(), "Protocol error: Empty message");

        a.write_all(&2048u32.to_be_bytes()).await.unwrap();
        let err = read_frame(&mut b, 1024).await.unwrap_err();
        assert_eq!(err.to_string(), "Protocol error: Message too large: 2048 > 1024");

        let err = write_frame(&mut a, &[0u8; 16], 8).await.unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[tokio::test]
    async fn test_listen_connect_disconnect() {
        let mut server = listen("127.0.0.1:0", 1024).await.unwrap();
        let addr = server.local_addr().unwrap().to_string();
        let mut client = connect(&addr, 1024).await.unwrap();

        let peer = match timeout(Duration::from_secs(5), server.recv()).await.unwrap() {
            Some(TransportEvent::Connected(peer)) => peer,
            other => panic!("Unexpected event: {:?}", other),
        };

        client.send(b"ping".to_vec()).unwrap();
        match timeout(Duration::from_secs(5), server.recv()).await.unwrap() {
            Some(TransportEvent::Message(from, payload)) => {
                assert_eq!(from, peer);
                assert_eq!(payload, b"ping");
            }
            other => panic!("Unexpected event: {:?}", other),
        }

        server.sender().send(&peer, b"pong".to_vec()).unwrap();
        let reply = timeout(Duration::from_secs(5), client.recv()).await.unwrap();
        assert_eq!(reply.unwrap(), b"pong");

        client.close();
        match timeout(Duration::from_secs(5), server.recv()).await.unwrap() {
            Some(TransportEvent::Disconnected(from)) => assert_eq!(from, peer),
            other => panic!("Unexpected event: {:?}", other),
        }
        assert!(!server.sender().is_connected(&peer));
    }

    #[tokio::test]
    async fn test_oversized_outbound_frame_is_dropped() {
        let mut server = listen("127.0.0.1:0", 64).await.unwrap();
        let addr = server.local_addr().unwrap().to_string();
        let mut client = connect(&addr, 64).await.unwrap();
        let peer = match timeout(Duration::from_secs(5), server.recv()).await.unwrap() {
            Some(TransportEvent::Connected(peer)) => peer,
            other => panic!("Unexpected event: {:?}", other),
        };

        server.sender().send(&peer, vec![b'x'; 128]).unwrap();
        server.sender().send(&peer, b"after".to_vec()).unwrap();
        let reply = timeout(Duration::from_secs(5), client.recv()).await.unwrap();
        assert_eq!(reply.unwrap(), b"after");

        client.send(vec![b'y'; 128]).unwrap();
        client.send(b"still open".to_vec()).unwrap();
        match timeout(Duration::from_secs(5), server.recv()).await.unwrap() {
            Some(TransportEvent::Message(from, payload)) => {
                assert_eq!(from, peer);
                assert_eq!(payload, b"still open");
            }
            other => panic!("Unexpected event: {:?}", other),
        }
    }
}
