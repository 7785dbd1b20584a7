use std::fmt::Debug;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tracing::{error, trace, warn};

pub const MAX_DATAGRAM_SIZE: usize = 1472; //TODO make this configurable

/// Decouples socket I/O from session logic. The top-level client / server
///  object exclusively owns the transport; peer sessions share it through
///  non-owning `Arc` handles. Dropping the last handle closes the socket.
#[async_trait]
pub trait Transport: Debug + Send + Sync {
    async fn send(&self, to: SocketAddr, buf: &[u8]) -> anyhow::Result<()>;

    /// Receives datagrams one at a time and hands each to the handler,
    ///  waiting for it to complete before reading the next. Returns `Ok` only
    ///  when the loop was cancelled; a socket-level receive error ends the
    ///  loop with `Err` and leaves fatality to the caller.
    async fn recv_loop(&self, handler: Arc<dyn DatagramHandler>) -> anyhow::Result<()>;

    fn local_addr(&self) -> anyhow::Result<SocketAddr>;

    fn cancel_recv_loop(&self);
}

#[async_trait]
pub trait DatagramHandler: Send + Sync {
    async fn handle_datagram(&self, buf: &[u8], sender: SocketAddr);
}

pub struct UdpTransport {
    socket: UdpSocket,
    cancel_sender: broadcast::Sender<()>,
}

impl Debug for UdpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "UdpTransport{{local:{:?}}}", self.socket.local_addr())
    }
}

impl UdpTransport {
    pub async fn bind(addr: SocketAddr) -> anyhow::Result<UdpTransport> {
        let (cancel_sender, _) = broadcast::channel(1);

        Ok(UdpTransport {
            socket: UdpSocket::bind(addr).await?,
            cancel_sender,
        })
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn send(&self, to: SocketAddr, buf: &[u8]) -> anyhow::Result<()> {
        self.socket.send_to(buf, to).await?;
        Ok(())
    }

    async fn recv_loop(&self, handler: Arc<dyn DatagramHandler>) -> anyhow::Result<()> {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE + 1];
        let mut cancel_receiver = self.cancel_sender.subscribe();

        trace!("starting UDP receive loop");

        loop {
            tokio::select! {
                r = self.socket.recv_from(&mut buf) => {
                    match r {
                        Ok((len, sender)) => {
                            if len > MAX_DATAGRAM_SIZE {
                                warn!("received datagram from {} exceeding {} bytes - skipping", sender, MAX_DATAGRAM_SIZE);
                                continue;
                            }
                            handler.handle_datagram(&buf[..len], sender).await;
                        }
                        Err(e) => {
                            error!(error = ?e, "error receiving from datagram socket");
                            return Err(e.into());
                        }
                    }
                }
                _ = cancel_receiver.recv() => break,
            }
        }

        Ok(())
    }

    fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    fn cancel_recv_loop(&self) {
        if let Err(err) = self.cancel_sender.send(()) {
            warn!(?err, "error cancelling receive loop");
        }
    }
}
