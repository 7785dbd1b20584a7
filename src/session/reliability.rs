use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
#[cfg(test)] use mockall::automock;

use crate::session::transport::Transport;

/// Contract of the external reliability engine: retransmission,
///  fragmentation / reassembly and ordered delivery happen behind this
///  boundary, this crate only consumes the decoded output.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ReliabilityDecoder: Send + Sync {
    /// decodes one raw post-handshake datagram into zero or more application
    ///  payloads, each starting with its type byte
    async fn decode(&mut self, datagram: &[u8]) -> anyhow::Result<Vec<Bytes>>;
}

/// Creates one decoder per established peer session. The transport handle is
///  passed through so the engine can send acks and retransmissions on the
///  shared socket.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DecoderFactory: Send + Sync {
    async fn create(&self, transport: Arc<dyn Transport>, peer_addr: SocketAddr) -> Box<dyn ReliabilityDecoder>;
}
