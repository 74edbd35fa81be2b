//! UDP discovery of the orchestrator endpoint.
//!
//! The orchestrator answers a probe datagram with its gRPC port. A tracker
//! broadcasts the probe and builds the endpoint from the source address of
//! the first valid reply.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

use crate::error::{FleetError, Result};

pub const PROBE: &[u8] = b"SIMFLEET_DISCOVER";
const REPLY_PREFIX: &str = "SIMFLEET_ORCHESTRATOR ";

pub fn encode_reply(grpc_port: u16) -> Vec<u8> {
    format!("{}{}", REPLY_PREFIX, grpc_port).into_bytes()
}

/// gRPC port carried by a responder reply.
pub fn parse_reply(datagram: &[u8]) -> Option<u16> {
    std::str::from_utf8(datagram)
        .ok()?
        .strip_prefix(REPLY_PREFIX)?
        .trim()
        .parse()
        .ok()
}

/// Orchestrator-side responder.
pub struct DiscoveryResponder {
    socket: UdpSocket,
    grpc_port: u16,
}

impl DiscoveryResponder {
    pub async fn bind(addr: SocketAddr, grpc_port: u16) -> Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self { socket, grpc_port })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Answer probes until `shutdown` fires. Anything that is not a probe is ignored.
    pub async fn run(self, shutdown: CancellationToken) {
        let reply = encode_reply(self.grpc_port);
        let mut buf = [0u8; 256];

        tracing::info!(addr = ?self.socket.local_addr().ok(), grpc_port = self.grpc_port, "Discovery responder started");

        loop {
            let (len, peer) = tokio::select! {
                _ = shutdown.cancelled() => break,
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok(received) => received,
                    Err(e) => {
                        tracing::warn!(error = %e, "Discovery receive failed");
                        continue;
                    }
                },
            };

            if &buf[..len] != PROBE {
                tracing::trace!(peer = %peer, "Ignoring non-probe datagram");
                continue;
            }

            tracing::debug!(peer = %peer, "Answering discovery probe");
            if let Err(e) = self.socket.send_to(&reply, peer).await {
                tracing::warn!(peer = %peer, error = %e, "Discovery reply failed");
            }
        }

        tracing::debug!("Discovery responder stopped");
    }
}

/// Broadcast a probe on `port` and return the orchestrator endpoint
/// (`http://host:port`).
pub async fn discover(port: u16, timeout: Duration, attempts: u32) -> Result<String> {
    discover_at(
        SocketAddr::from((Ipv4Addr::BROADCAST, port)),
        timeout,
        attempts,
    )
    .await
}

/// Probe `target`, which may be a broadcast or a unicast address.
pub async fn discover_at(target: SocketAddr, timeout: Duration, attempts: u32) -> Result<String> {
    let socket = UdpSocket::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))).await?;
    socket.set_broadcast(true)?;

    let mut buf = [0u8; 256];
    for attempt in 1..=attempts.max(1) {
        tracing::debug!(target = %target, attempt, "Sending discovery probe");
        socket.send_to(PROBE, target).await?;

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let received = tokio::time::timeout_at(deadline, socket.recv_from(&mut buf)).await;
            let Ok(received) = received else {
                break;
            };
            let (len, responder) = received?;

            if let Some(grpc_port) = parse_reply(&buf[..len]) {
                let endpoint = format!("http://{}:{}", responder.ip(), grpc_port);
                tracing::info!(endpoint = %endpoint, "Orchestrator discovered");
                return Ok(endpoint);
            }
        }
    }

    Err(FleetError::Discovery(format!(
        "no orchestrator answered on {} after {} attempt(s)",
        target,
        attempts.max(1)
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_carries_port() {
        assert_eq!(parse_reply(&encode_reply(50051)), Some(50051));
        assert_eq!(parse_reply(b"SIMFLEET_ORCHESTRATOR nope"), None);
        assert_eq!(parse_reply(PROBE), None);
    }
}
