use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::protocol::messages::message_name;

#[async_trait]
pub trait PacketHandler: Send + Sync + 'static {
    async fn handle(&self, payload: &[u8], sender: SocketAddr) -> anyhow::Result<()>;
}

/// Fans a decoded application payload out to the handlers registered for its
///  leading type byte. Multiple handlers per type are permitted and invoked
///  synchronously in registration order.
#[derive(Default)]
pub struct PacketDispatcher {
    handlers: RwLock<FxHashMap<u8, Vec<Arc<dyn PacketHandler>>>>,
}

impl PacketDispatcher {
    pub fn new() -> PacketDispatcher {
        PacketDispatcher {
            handlers: Default::default(),
        }
    }

    pub async fn register(&self, message_type: u8, handler: Arc<dyn PacketHandler>) {
        self.handlers
            .write()
            .await
            .entry(message_type)
            .or_default()
            .push(handler);
    }

    /// removes all handlers registered for the given type
    pub async fn deregister(&self, message_type: u8) {
        self.handlers.write().await.remove(&message_type);
    }

    /// Reads exactly one leading byte as the type tag and invokes every
    ///  handler registered for it with the remaining payload. A payload
    ///  without any handler is dropped silently - that is regular operation,
    ///  not an error. A handler returning `Err` aborts processing of this
    ///  payload; the event loop is unaffected.
    pub async fn dispatch(&self, payload: &[u8], sender: SocketAddr) {
        let Some((&message_type, body)) = payload.split_first() else {
            warn!("empty payload from {} - dropping", sender);
            return;
        };

        let handlers = match self.handlers.read().await.get(&message_type) {
            Some(handlers) => handlers.clone(),
            None => {
                debug!(
                    "no handler registered for {} ({}) - dropping payload from {}",
                    message_name(message_type),
                    message_type,
                    sender
                );
                return;
            }
        };

        for handler in handlers {
            if let Err(e) = handler.handle(body, sender).await {
                warn!(
                    "handler for {} ({}) failed on payload from {}: {:#} - aborting this payload",
                    message_name(message_type),
                    message_type,
                    sender,
                    e
                );
                return;
            }
        }
    }
}
