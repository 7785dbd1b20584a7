use std::fmt::{Debug, Formatter};
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{error, info, trace, warn};

use crate::protocol::messages::handshake_request;
use crate::session::dispatcher::PacketDispatcher;
use crate::session::peer::PeerSession;
use crate::session::reliability::DecoderFactory;
use crate::session::transport::{DatagramHandler, Transport, UdpTransport};
use crate::session::{classify, DatagramClass};

/// Handshake progress as seen by callers.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ConnectionState {
    Unconnected,
    AwaitingReply,
    Connected,
}

enum HandshakeState {
    Unconnected,
    AwaitingReply,
    Connected(PeerSession),
}

/// Connection-initiating role: sends the handshake request on construction,
///  waits for the reply, then feeds every datagram through the peer session's
///  decoder and fans the payloads out via the dispatcher.
pub struct Client {
    server_addr: SocketAddr,
    shared_secret: String,
    state: RwLock<HandshakeState>,
    dispatcher: Arc<PacketDispatcher>,
    transport: Arc<dyn Transport>,
    factory: Arc<dyn DecoderFactory>,
}

impl Debug for Client {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Client{{server:{}}}", self.server_addr)
    }
}

impl Client {
    /// binds an ephemeral local socket and initiates the handshake
    pub async fn connect(
        server_addr: SocketAddr,
        shared_secret: &str,
        factory: Arc<dyn DecoderFactory>,
    ) -> anyhow::Result<Client> {
        let local: SocketAddr = if server_addr.is_ipv4() {
            SocketAddr::from_str("0.0.0.0:0")?
        } else {
            SocketAddr::from_str("[::]:0")?
        };
        let transport = Arc::new(UdpTransport::bind(local).await?);
        Self::connect_via(transport, server_addr, shared_secret, factory).await
    }

    /// initiates the handshake on an existing transport
    pub async fn connect_via(
        transport: Arc<dyn Transport>,
        server_addr: SocketAddr,
        shared_secret: &str,
        factory: Arc<dyn DecoderFactory>,
    ) -> anyhow::Result<Client> {
        let client = Client {
            server_addr,
            shared_secret: shared_secret.to_string(),
            state: RwLock::new(HandshakeState::Unconnected),
            dispatcher: Arc::new(PacketDispatcher::new()),
            transport,
            factory,
        };

        client.transport.send(server_addr, &handshake_request()).await?;
        *client.state.write().await = HandshakeState::AwaitingReply;
        info!("sent handshake request to {}", server_addr);

        Ok(client)
    }

    /// Drives the receive loop. Socket-level errors are logged and the loop
    ///  is re-entered - unlike the server, the client keeps running on socket
    ///  faults. Returns once the loop is cancelled via [Client::shutdown].
    pub async fn run(self: Arc<Self>) {
        loop {
            let handler: Arc<dyn DatagramHandler> = self.clone();
            match self.transport.recv_loop(handler).await {
                Ok(()) => {
                    info!("client receive loop stopped");
                    return;
                }
                Err(e) => {
                    error!("socket error in client receive loop: {:#} - continuing", e);
                }
            }
        }
    }

    pub fn shutdown(&self) {
        self.transport.cancel_recv_loop();
    }

    pub async fn state(&self) -> ConnectionState {
        match &*self.state.read().await {
            HandshakeState::Unconnected => ConnectionState::Unconnected,
            HandshakeState::AwaitingReply => ConnectionState::AwaitingReply,
            HandshakeState::Connected(_) => ConnectionState::Connected,
        }
    }

    pub fn dispatcher(&self) -> &Arc<PacketDispatcher> {
        &self.dispatcher
    }

    pub fn server_addr(&self) -> SocketAddr {
        self.server_addr
    }

    async fn on_datagram(&self, buf: &[u8], sender: SocketAddr) {
        match classify(buf) {
            DatagramClass::HandshakeReply => {
                let mut state = self.state.write().await;
                match &*state {
                    HandshakeState::AwaitingReply => {
                        let session = PeerSession::establish(
                            self.factory.as_ref(),
                            self.transport.clone(),
                            sender,
                            &self.shared_secret,
                        )
                        .await;
                        *state = HandshakeState::Connected(session);
                        info!("connection to {} established", sender);
                    }
                    _ => {
                        warn!("unexpected handshake reply from {} - dropping", sender);
                    }
                }
            }
            DatagramClass::PostHandshake => {
                let payloads = {
                    let mut state = self.state.write().await;
                    match &mut *state {
                        HandshakeState::Connected(session) => match session.decode(buf).await {
                            Ok(payloads) => payloads,
                            Err(e) => {
                                warn!("error decoding datagram from {}: {:#} - dropping", sender, e);
                                return;
                            }
                        },
                        _ => {
                            warn!("application datagram from {} before handshake completed - dropping", sender);
                            return;
                        }
                    }
                };

                trace!("decoded {} payload(s) from {}", payloads.len(), sender);
                for payload in &payloads {
                    self.dispatcher.dispatch(payload, sender).await;
                }
            }
            DatagramClass::HandshakeRequest => {
                warn!("handshake request from {} received by initiator - dropping", sender);
            }
        }
    }
}

#[async_trait]
impl DatagramHandler for Client {
    async fn handle_datagram(&self, buf: &[u8], sender: SocketAddr) {
        self.on_datagram(buf, sender).await;
    }
}

#[cfg(test)]
mod test {
    use std::net::SocketAddr;
    use std::str::FromStr;

    use tokio::sync::Mutex;

    use super::*;
    use crate::session::dispatcher::PacketHandler;
    use crate::session::test_util::{FailingDecoderFactory, IdentityDecoderFactory, RecordingTransport};

    fn server_addr() -> SocketAddr {
        SocketAddr::from_str("127.0.0.1:5555").unwrap()
    }

    async fn connected_client(transport: Arc<RecordingTransport>) -> Client {
        let client = Client::connect_via(
            transport,
            server_addr(),
            "secret",
            Arc::new(IdentityDecoderFactory),
        )
        .await
        .unwrap();
        client.handle_datagram(&[10], server_addr()).await;
        client
    }

    #[tokio::test]
    async fn test_connect_sends_handshake_request() {
        let transport = Arc::new(RecordingTransport::new());
        let client = Client::connect_via(
            transport.clone(),
            server_addr(),
            "secret",
            Arc::new(IdentityDecoderFactory),
        )
        .await
        .unwrap();

        assert_eq!(client.state().await, ConnectionState::AwaitingReply);
        assert_eq!(transport.sent().await, vec![(server_addr(), vec![9, 0])]);
    }

    #[tokio::test]
    async fn test_handshake_reply_establishes_session() {
        let transport = Arc::new(RecordingTransport::new());
        let client = connected_client(transport).await;
        assert_eq!(client.state().await, ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_payloads_are_dispatched() {
        struct Collecting {
            seen: Arc<Mutex<Vec<Vec<u8>>>>,
        }
        #[async_trait]
        impl PacketHandler for Collecting {
            async fn handle(&self, payload: &[u8], _sender: SocketAddr) -> anyhow::Result<()> {
                self.seen.lock().await.push(payload.to_vec());
                Ok(())
            }
        }

        let transport = Arc::new(RecordingTransport::new());
        let client = connected_client(transport).await;

        let seen = Arc::new(Mutex::new(Vec::new()));
        client
            .dispatcher()
            .register(83, Arc::new(Collecting { seen: seen.clone() }))
            .await;

        client.handle_datagram(&[83, 1, 2], server_addr()).await;
        assert_eq!(*seen.lock().await, vec![vec![1, 2]]);
    }

    #[tokio::test]
    async fn test_application_datagram_before_handshake_is_dropped() {
        let transport = Arc::new(RecordingTransport::new());
        let client = Client::connect_via(
            transport,
            server_addr(),
            "secret",
            Arc::new(IdentityDecoderFactory),
        )
        .await
        .unwrap();

        client.handle_datagram(&[83, 1, 2], server_addr()).await;
        assert_eq!(client.state().await, ConnectionState::AwaitingReply);
    }

    #[tokio::test]
    async fn test_duplicate_reply_keeps_first_session() {
        let transport = Arc::new(RecordingTransport::new());
        let client = connected_client(transport).await;

        client.handle_datagram(&[10], server_addr()).await;
        assert_eq!(client.state().await, ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_decode_failure_is_isolated() {
        let transport = Arc::new(RecordingTransport::new());
        let client = Client::connect_via(
            transport,
            server_addr(),
            "secret",
            Arc::new(FailingDecoderFactory),
        )
        .await
        .unwrap();
        client.handle_datagram(&[10], server_addr()).await;

        // must not panic, must not tear down the session
        client.handle_datagram(&[83, 1], server_addr()).await;
        assert_eq!(client.state().await, ConnectionState::Connected);
    }
}
