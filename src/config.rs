use std::time::Duration;

/// Lower bound on `maximum_transfer_unit`, per spec: below this a datagram
/// cannot carry even the smallest handshake message.
pub const MINIMUM_MTU: usize = 400;

/// Default upper bound on `maximum_transfer_unit` when the host does not
/// override it.
pub const DEFAULT_MAXIMUM_MTU: usize = 1492;

/// Runtime configuration recognized by the endpoint. Replaces the
/// teacher's hardcoded MCPE MOTD fields and scattered `protocol::`
/// constants with a single struct the host application builds once and
/// hands to `Endpoint::bind`/`RakSocket::connect`.
#[derive(Debug, Clone)]
pub struct RakNetConfig {
    /// Local UDP address to bind to. `None` binds the wildcard address on
    /// an ephemeral port.
    pub bind_address: Option<String>,

    /// Upper bound on a single datagram's size, at least [`MINIMUM_MTU`].
    pub maximum_transfer_unit: usize,

    /// Server-side connection cap. `None` means unlimited.
    pub max_connections: Option<usize>,

    /// Opaque bytes the server echoes back in `UnconnectedPong` replies.
    pub identifier: Vec<u8>,

    /// If false, `UnconnectedPing` (without the open-connections-only
    /// variant) is never answered.
    pub broadcasting_enabled: bool,

    /// Idle time before a peer is disconnected for timeout.
    pub timeout: Duration,

    /// Datagrams-per-second cap before a peer's IP is blocked for flooding.
    pub max_packets_per_second: u32,

    /// How long a flooding IP stays in the blocked set.
    pub flood_block_duration: Duration,
}

impl Default for RakNetConfig {
    fn default() -> Self {
        Self {
            bind_address: None,
            maximum_transfer_unit: DEFAULT_MAXIMUM_MTU,
            max_connections: Some(1000),
            identifier: Vec::new(),
            broadcasting_enabled: true,
            timeout: Duration::from_secs(10),
            max_packets_per_second: 100,
            flood_block_duration: Duration::from_secs(10),
        }
    }
}

impl RakNetConfig {
    /// Validates the mtu floor; everything else in the struct is valid by
    /// construction (a host can always pick a degenerate value, but the
    /// mtu is the one field the wire format can't tolerate below the
    /// floor).
    pub fn validate(&self) -> Result<(), crate::error::RakNetError> {
        if self.maximum_transfer_unit < MINIMUM_MTU {
            return Err(crate::error::RakNetError::MtuExceeded(
                self.maximum_transfer_unit,
            ));
        }

        Ok(())
    }
}
