use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Well-known message type ids, sent as the leading byte of handshake
///  datagrams and of every decoded application payload. Application-defined
///  payload types start at
///  [MessageType::UserMessageStart].
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum MessageType {
    InternalPing = 0,
    ConnectedPong = 3,
    ConnectionRequest = 4,
    OpenConnectionRequest = 9,
    OpenConnectionReply = 10,
    DisconnectNotification = 19,
    UserMessageStart = 83,
}

/// reserved / protocol version byte in the handshake request
pub const HANDSHAKE_RESERVED: u8 = 0x00;

pub fn handshake_request() -> [u8; 2] {
    [MessageType::OpenConnectionRequest.into(), HANDSHAKE_RESERVED]
}

pub fn handshake_reply() -> [u8; 1] {
    [MessageType::OpenConnectionReply.into()]
}

/// reverse lookup for diagnostics - never fails, unknown ids get a
///  placeholder name
pub fn message_name(id: u8) -> String {
    match MessageType::try_from(id) {
        Ok(t) => format!("{:?}", t),
        Err(_) => format!("Unknown(0x{:02x})", id),
    }
}
