use std::net::SocketAddr;

use thiserror::Error;

/// Errors surfaced by the RakNet core. Codec and protocol errors are
/// recoverable at the datagram boundary (logged and dropped); endpoint
/// lifecycle errors are fatal to the whole endpoint.
#[derive(Debug, Error)]
pub enum RakNetError {
    #[error("malformed field while decoding: {0}")]
    MalformedField(&'static str),

    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),

    #[error("channel {0} is out of range (max {max})", max = crate::reliability::MAX_CHANNELS - 1)]
    InvalidChannel(u8),

    #[error("invalid reliability value {0}")]
    InvalidReliability(u8),

    #[error("configured mtu {0} is below the floor of {floor}", floor = crate::config::MINIMUM_MTU)]
    MtuExceeded(usize),

    #[error("no connected peer for {0:?}")]
    NotConnected(Recipient),

    #[error("endpoint is already running")]
    AlreadyRunning,

    #[error("endpoint is not running")]
    NotRunning,

    #[error("socket error: {0}")]
    SocketError(#[from] std::io::Error),

    #[error("peer at {0} timed out")]
    Timeout(SocketAddr),

    #[error("peer at {0} exceeded the packet-rate cap")]
    Flood(SocketAddr),
}

pub type Result<T> = std::result::Result<T, RakNetError>;

/// Identifies a peer for `send_message`/error reporting: by its address,
/// its RakNet GUID, or a direct entity handle once one has been resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Recipient {
    Address(SocketAddr),
    Guid(u64),
}

impl std::fmt::Display for Recipient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Recipient::Address(addr) => write!(f, "{addr}"),
            Recipient::Guid(guid) => write!(f, "guid:{guid:016x}"),
        }
    }
}
