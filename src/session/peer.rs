use std::fmt::{Debug, Formatter};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::SystemTime;

use bytes::Bytes;

use crate::session::reliability::{DecoderFactory, ReliabilityDecoder};
use crate::session::transport::Transport;

/// Per-peer state, created exactly once when the handshake with that peer
///  completes. The session exclusively owns its reliability decoder; the
///  socket is shared with the top-level client / server object.
pub struct PeerSession {
    peer_addr: SocketAddr,
    transport: Arc<dyn Transport>,
    decoder: Box<dyn ReliabilityDecoder>,
    established_at: SystemTime,
    shared_secret: String,
}

impl Debug for PeerSession {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "PeerSession{{peer:{}}}", self.peer_addr)
    }
}

impl PeerSession {
    pub(crate) async fn establish(
        factory: &dyn DecoderFactory,
        transport: Arc<dyn Transport>,
        peer_addr: SocketAddr,
        shared_secret: &str,
    ) -> PeerSession {
        let decoder = factory.create(transport.clone(), peer_addr).await;

        PeerSession {
            peer_addr,
            transport,
            decoder,
            established_at: SystemTime::now(),
            shared_secret: shared_secret.to_string(),
        }
    }

    /// decodes one raw datagram into the application payloads it carries
    pub async fn decode(&mut self, datagram: &[u8]) -> anyhow::Result<Vec<Bytes>> {
        self.decoder.decode(datagram).await
    }

    /// sends one raw datagram to this session's peer on the shared socket
    pub async fn send(&self, buf: &[u8]) -> anyhow::Result<()> {
        self.transport.send(self.peer_addr, buf).await
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn established_at(&self) -> SystemTime {
        self.established_at
    }

    /// advisory only - the secret is held but never verified against the peer
    pub fn shared_secret(&self) -> &str {
        &self.shared_secret
    }
}
