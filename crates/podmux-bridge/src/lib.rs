// SPDX-License-Identifier: Apache-2.0

//! Rewrites loopback URLs used by host tooling so sandboxed containers can
//! reach them through a host-gateway hostname, backed by a raw TCP
//! bidirectional pipe per bridged port.
//!
//! Accept-loop shape grounded on the dual-listener pattern in the
//! `oddjobs` daemon listener; bidirectional byte piping uses
//! `tokio::io::copy_bidirectional` directly rather than the request/response
//! handling that listener does per connection.

pub mod url;

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub use url::{parse_loopback, LoopbackUrl};

struct BridgeEntry {
    bridge_port: u16,
    acceptor: JoinHandle<()>,
}

/// Holds a `targetPort -> BridgeEntry` map; at most one acceptor per
/// distinct target port.
pub struct LoopbackBridge {
    gateway_hostname: String,
    entries: DashMap<u16, BridgeEntry>,
    in_flight: DashMap<u16, Arc<Mutex<()>>>,
}

impl LoopbackBridge {
    pub fn new(gateway_hostname: String) -> Self {
        Self {
            gateway_hostname,
            entries: DashMap::new(),
            in_flight: DashMap::new(),
        }
    }

    /// Parse each URL, discard non-loopback/non-http entries, dedupe target
    /// ports, and ensure a bridge exists for each. Ports that fail to bind
    /// are skipped with a warning rather than failing the whole batch.
    pub async fn ensure_for_base_urls(&self, urls: &[String]) -> Vec<u16> {
        let mut ports = HashSet::new();
        for u in urls {
            if let Some(parsed) = parse_loopback(u) {
                ports.insert(parsed.port);
            }
        }

        let mut bridged = Vec::new();
        for port in ports {
            match self.ensure_bridge(port).await {
                Ok(bridge_port) => bridged.push(bridge_port),
                Err(err) => warn!(target_port = port, %err, "failed to bind loopback bridge"),
            }
        }
        bridged
    }

    /// Returns the existing bridge port for `target_port`, or binds a new
    /// listener on `0.0.0.0:0` and starts its accept loop. Concurrent
    /// callers for the same port are coalesced onto a single acceptor.
    pub async fn ensure_bridge(&self, target_port: u16) -> std::io::Result<u16> {
        if let Some(entry) = self.entries.get(&target_port) {
            return Ok(entry.bridge_port);
        }

        let lock = self
            .in_flight
            .entry(target_port)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        if let Some(entry) = self.entries.get(&target_port) {
            self.in_flight.remove(&target_port);
            return Ok(entry.bridge_port);
        }

        let listener = TcpListener::bind("0.0.0.0:0").await?;
        let bridge_port = listener.local_addr()?.port();
        let acceptor = tokio::spawn(accept_loop(listener, target_port));

        self.entries.insert(
            target_port,
            BridgeEntry {
                bridge_port,
                acceptor,
            },
        );
        self.in_flight.remove(&target_port);
        Ok(bridge_port)
    }

    /// If `url` is loopback and bridged, rewrite it to the gateway hostname
    /// and bridge port; otherwise return it unchanged.
    pub fn rewrite_for_host_gateway(&self, url_str: &str) -> String {
        match parse_loopback(url_str) {
            Some(parsed) => match self.entries.get(&parsed.port) {
                Some(entry) => {
                    url::rewrite_for_host_gateway(url_str, &self.gateway_hostname, entry.bridge_port)
                }
                None => url_str.to_string(),
            },
            None => url_str.to_string(),
        }
    }

    /// Snapshot and clear the entry and in-flight maps, aborting all
    /// acceptors. Connections already accepted are left to finish on their
    /// own; only the listeners are torn down.
    pub fn shutdown(&self) {
        let keys: Vec<u16> = self.entries.iter().map(|e| *e.key()).collect();
        for key in keys {
            if let Some((_, entry)) = self.entries.remove(&key) {
                entry.acceptor.abort();
            }
        }
        self.in_flight.clear();
    }

    pub fn bridged_port_count(&self) -> usize {
        self.entries.len()
    }
}

async fn accept_loop(listener: TcpListener, target_port: u16) {
    loop {
        match listener.accept().await {
            Ok((inbound, _addr)) => {
                tokio::spawn(pipe_connection(inbound, target_port));
            }
            Err(err) => {
                warn!(target_port, %err, "loopback bridge accept failed, stopping acceptor");
                break;
            }
        }
    }
}

async fn pipe_connection(mut inbound: TcpStream, target_port: u16) {
    let mut outbound = match TcpStream::connect(("127.0.0.1", target_port)).await {
        Ok(s) => s,
        Err(err) => {
            debug!(target_port, %err, "loopback bridge upstream connect failed");
            return;
        }
    };

    if let Err(err) = tokio::io::copy_bidirectional(&mut inbound, &mut outbound).await {
        debug!(target_port, %err, "loopback bridge connection ended with error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn spawn_echo_server() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            loop {
                let (mut socket, _) = match listener.accept().await {
                    Ok(s) => s,
                    Err(_) => break,
                };
                tokio::spawn(async move {
                    let mut buf = [0u8; 1024];
                    loop {
                        match socket.read(&mut buf).await {
                            Ok(0) | Err(_) => break,
                            Ok(n) => {
                                if socket.write_all(&buf[..n]).await.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                });
            }
        });
        port
    }

    #[tokio::test]
    async fn ensure_bridge_pipes_bytes_bidirectionally() {
        let target_port = spawn_echo_server().await;
        let bridge = LoopbackBridge::new("host.internal".into());
        let bridge_port = bridge.ensure_bridge(target_port).await.unwrap();

        let mut conn = TcpStream::connect(("127.0.0.1", bridge_port)).await.unwrap();
        conn.write_all(b"hello").await.unwrap();
        let mut buf = [0u8; 5];
        conn.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");
    }

    #[tokio::test]
    async fn ensure_bridge_is_idempotent_for_same_port() {
        let target_port = spawn_echo_server().await;
        let bridge = LoopbackBridge::new("host.internal".into());
        let first = bridge.ensure_bridge(target_port).await.unwrap();
        let second = bridge.ensure_bridge(target_port).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(bridge.bridged_port_count(), 1);
    }

    #[tokio::test]
    async fn ensure_for_base_urls_dedupes_and_skips_non_loopback() {
        let target_port = spawn_echo_server().await;
        let bridge = LoopbackBridge::new("host.internal".into());
        let urls = vec![
            format!("http://localhost:{target_port}/a"),
            format!("http://127.0.0.1:{target_port}/b"),
            "http://example.com:9999".to_string(),
        ];
        let bridged = bridge.ensure_for_base_urls(&urls).await;
        assert_eq!(bridged.len(), 1);
        assert_eq!(bridge.bridged_port_count(), 1);
    }

    #[tokio::test]
    async fn rewrite_for_host_gateway_uses_bridged_port() {
        let target_port = spawn_echo_server().await;
        let bridge = LoopbackBridge::new("host.internal".into());
        let bridge_port = bridge.ensure_bridge(target_port).await.unwrap();

        let rewritten = bridge.rewrite_for_host_gateway(&format!("http://localhost:{target_port}/x"));
        assert_eq!(rewritten, format!("http://host.internal:{bridge_port}/x"));
    }

    #[tokio::test]
    async fn rewrite_leaves_unbridged_loopback_url_unchanged() {
        let bridge = LoopbackBridge::new("host.internal".into());
        let url = "http://localhost:59999/x";
        assert_eq!(bridge.rewrite_for_host_gateway(url), url);
    }

    #[tokio::test]
    async fn shutdown_clears_entries_and_aborts_acceptors() {
        let target_port = spawn_echo_server().await;
        let bridge = LoopbackBridge::new("host.internal".into());
        bridge.ensure_bridge(target_port).await.unwrap();
        bridge.shutdown();
        assert_eq!(bridge.bridged_port_count(), 0);
    }
}
