use std::fmt::{Debug, Formatter};
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Mutex;

use crate::session::reliability::{DecoderFactory, ReliabilityDecoder};
use crate::session::transport::{DatagramHandler, Transport};

/// Test transport that records every send instead of touching a socket.
///  Tests feed datagrams by calling `handle_datagram` on the role under test
///  directly, so `recv_loop` never runs.
pub struct RecordingTransport {
    local: SocketAddr,
    sent: Mutex<Vec<(SocketAddr, Vec<u8>)>>,
}

impl Debug for RecordingTransport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "RecordingTransport{{local:{}}}", self.local)
    }
}

impl RecordingTransport {
    pub fn new() -> RecordingTransport {
        RecordingTransport {
            local: SocketAddr::from_str("127.0.0.1:7777").unwrap(),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub async fn sent(&self) -> Vec<(SocketAddr, Vec<u8>)> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, to: SocketAddr, buf: &[u8]) -> anyhow::Result<()> {
        self.sent.lock().await.push((to, buf.to_vec()));
        Ok(())
    }

    async fn recv_loop(&self, _handler: Arc<dyn DatagramHandler>) -> anyhow::Result<()> {
        Ok(())
    }

    fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.local)
    }

    fn cancel_recv_loop(&self) {}
}

/// Decoder that returns every raw datagram unchanged as a single payload.
struct IdentityDecoder;

#[async_trait]
impl ReliabilityDecoder for IdentityDecoder {
    async fn decode(&mut self, datagram: &[u8]) -> anyhow::Result<Vec<Bytes>> {
        Ok(vec![Bytes::copy_from_slice(datagram)])
    }
}

pub struct IdentityDecoderFactory;

#[async_trait]
impl DecoderFactory for IdentityDecoderFactory {
    async fn create(&self, _transport: Arc<dyn Transport>, _peer_addr: SocketAddr) -> Box<dyn ReliabilityDecoder> {
        Box::new(IdentityDecoder)
    }
}

/// Decoder whose `decode` always fails, for fault isolation tests.
struct FailingDecoder;

#[async_trait]
impl ReliabilityDecoder for FailingDecoder {
    async fn decode(&mut self, _datagram: &[u8]) -> anyhow::Result<Vec<Bytes>> {
        anyhow::bail!("decoder blew up")
    }
}

pub struct FailingDecoderFactory;

#[async_trait]
impl DecoderFactory for FailingDecoderFactory {
    async fn create(&self, _transport: Arc<dyn Transport>, _peer_addr: SocketAddr) -> Box<dyn ReliabilityDecoder> {
        Box::new(FailingDecoder)
    }
}
