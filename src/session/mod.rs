pub mod client;
pub mod dispatcher;
pub mod peer;
pub mod reliability;
pub mod server;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_util;

use crate::protocol::messages::MessageType;

/// Raw datagram classification, shared by both handshake roles.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) enum DatagramClass {
    HandshakeRequest,
    HandshakeReply,
    PostHandshake,
}

/// A datagram is handshake traffic iff it matches a handshake message
///  byte-exactly: `[OpenConnectionRequest, reserved]` or
///  `[OpenConnectionReply]`. Everything else - including an empty datagram -
///  is left to the reliability decoder. The rule is driven by the type tag
///  plus the exact message length, so reliability-layer framing that happens
///  to start with the same byte value but has a different length cannot be
///  misclassified.
pub(crate) fn classify(buf: &[u8]) -> DatagramClass {
    match buf.first().copied().map(MessageType::try_from) {
        Some(Ok(MessageType::OpenConnectionRequest)) if buf.len() == 2 => {
            DatagramClass::HandshakeRequest
        }
        Some(Ok(MessageType::OpenConnectionReply)) if buf.len() == 1 => {
            DatagramClass::HandshakeReply
        }
        _ => DatagramClass::PostHandshake,
    }
}
