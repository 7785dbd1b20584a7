use std::collections::hash_map::Entry;
use std::fmt::{Debug, Formatter};
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use tokio::sync::RwLock;
use tracing::{debug, error, info, trace, warn};

use crate::protocol::messages::handshake_reply;
use crate::session::dispatcher::PacketDispatcher;
use crate::session::peer::PeerSession;
use crate::session::reliability::DecoderFactory;
use crate::session::transport::{DatagramHandler, Transport, UdpTransport};
use crate::session::{classify, DatagramClass};

/// Connection-accepting role: always listening, one peer session per remote
///  address. A handshake request from a new address creates the session and
///  answers with the handshake reply; datagrams from established peers run
///  through their session's decoder and the dispatcher.
pub struct Server {
    shared_secret: String,
    connections: RwLock<FxHashMap<SocketAddr, PeerSession>>,
    dispatcher: Arc<PacketDispatcher>,
    transport: Arc<dyn Transport>,
    factory: Arc<dyn DecoderFactory>,
}

impl Debug for Server {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Server{{local:{:?}}}", self.transport.local_addr())
    }
}

impl Server {
    pub async fn bind(
        listen_addr: SocketAddr,
        shared_secret: &str,
        factory: Arc<dyn DecoderFactory>,
    ) -> anyhow::Result<Server> {
        let transport = Arc::new(UdpTransport::bind(listen_addr).await?);
        Ok(Self::with_transport(transport, shared_secret, factory))
    }

    pub fn with_transport(
        transport: Arc<dyn Transport>,
        shared_secret: &str,
        factory: Arc<dyn DecoderFactory>,
    ) -> Server {
        Server {
            shared_secret: shared_secret.to_string(),
            connections: Default::default(),
            dispatcher: Arc::new(PacketDispatcher::new()),
            transport,
            factory,
        }
    }

    /// Drives the receive loop. A socket-level error is fatal for the
    ///  accepting role: it is logged, the loop ends with `Err`, and no
    ///  further peers are accepted.
    pub async fn run(self: Arc<Self>) -> anyhow::Result<()> {
        info!("server listening on {:?}", self.transport.local_addr()?);

        let handler: Arc<dyn DatagramHandler> = self.clone();
        match self.transport.recv_loop(handler).await {
            Ok(()) => {
                info!("server receive loop stopped");
                Ok(())
            }
            Err(e) => {
                error!("socket error in server receive loop - shutting down listener: {:#}", e);
                Err(e)
            }
        }
    }

    pub fn shutdown(&self) {
        self.transport.cancel_recv_loop();
    }

    pub fn dispatcher(&self) -> &Arc<PacketDispatcher> {
        &self.dispatcher
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn has_connection(&self, addr: SocketAddr) -> bool {
        self.connections.read().await.contains_key(&addr)
    }

    /// Explicit removal path for a peer's session; returns whether a session
    ///  existed. The protocol itself never removes sessions.
    pub async fn disconnect(&self, addr: SocketAddr) -> bool {
        let removed = self.connections.write().await.remove(&addr);
        if removed.is_some() {
            info!("removed session for {}", addr);
        }
        removed.is_some()
    }

    async fn on_datagram(&self, buf: &[u8], sender: SocketAddr) {
        match classify(buf) {
            DatagramClass::HandshakeRequest => {
                match self.connections.write().await.entry(sender) {
                    Entry::Occupied(_) => {
                        // idempotent handshake: the peer probably missed our
                        //  reply, so answer again but keep the session
                        debug!("duplicate handshake request from {} - resending reply", sender);
                    }
                    Entry::Vacant(e) => {
                        let session = PeerSession::establish(
                            self.factory.as_ref(),
                            self.transport.clone(),
                            sender,
                            &self.shared_secret,
                        )
                        .await;
                        e.insert(session);
                        info!("established session with {}", sender);
                    }
                }

                if let Err(e) = self.transport.send(sender, &handshake_reply()).await {
                    error!("error sending handshake reply to {}: {:#}", sender, e);
                }
            }
            DatagramClass::PostHandshake => {
                let payloads = {
                    let mut connections = self.connections.write().await;
                    match connections.get_mut(&sender) {
                        Some(session) => match session.decode(buf).await {
                            Ok(payloads) => payloads,
                            Err(e) => {
                                warn!("error decoding datagram from {}: {:#} - dropping", sender, e);
                                return;
                            }
                        },
                        None => {
                            warn!("datagram from unconnected peer {} - dropping", sender);
                            return;
                        }
                    }
                };

                trace!("decoded {} payload(s) from {}", payloads.len(), sender);
                for payload in &payloads {
                    self.dispatcher.dispatch(payload, sender).await;
                }
            }
            DatagramClass::HandshakeReply => {
                warn!("handshake reply from {} received by acceptor - dropping", sender);
            }
        }
    }
}

#[async_trait]
impl DatagramHandler for Server {
    async fn handle_datagram(&self, buf: &[u8], sender: SocketAddr) {
        self.on_datagram(buf, sender).await;
    }
}
