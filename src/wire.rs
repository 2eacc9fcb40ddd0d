//! The handshake/discovery message set and the connected protocol messages
//! carried as encapsulated payloads (spec §4.5, §6). Generalized from the
//! teacher's `protocol::message::build_message!` macro, which depended on
//! the unresolvable `binary`/`binary_derive` git crates; this rebuilds the
//! same "one enum, one `id()`, one `encode`/`decode`" shape directly on
//! top of [`crate::codec`].

use std::io::Cursor;
use std::net::SocketAddr;

use byteorder::{ReadBytesExt, BE};
use bytes::{Buf, BufMut, BytesMut};

use crate::codec;
use crate::error::RakNetError;

/// Offline messages fill unused system-address slots with this, mirroring
/// the teacher's `INTERNAL_ADDRESS` convention.
pub const UNASSIGNED_ADDRESS: &str = "255.255.255.255:19132";

/// RakNet's historical internal-address slot count (teacher pins 20 for
/// MCPE; vanilla RakNet uses 10 — 20 is the superset, extra slots are
/// simply unassigned).
pub const SYSTEM_ADDRESS_COUNT: usize = 20;

pub const UNCONNECTED_PING: u8 = 0x01;
pub const UNCONNECTED_PING_OPEN_CONNECTIONS: u8 = 0x02;
pub const UNCONNECTED_PONG: u8 = 0x1c;
pub const OPEN_CONNECTION_REQUEST_1: u8 = 0x05;
pub const OPEN_CONNECTION_REPLY_1: u8 = 0x06;
pub const OPEN_CONNECTION_REQUEST_2: u8 = 0x07;
pub const OPEN_CONNECTION_REPLY_2: u8 = 0x08;
pub const ALREADY_CONNECTED: u8 = 0x12;
pub const INCOMPATIBLE_PROTOCOL_VERSION: u8 = 0x19;
pub const NO_FREE_INCOMING_CONNECTIONS: u8 = 0x14;
pub const CONNECTION_BANNED: u8 = 0x17;
pub const CONNECTED_PING: u8 = 0x00;
pub const CONNECTED_PONG: u8 = 0x03;
pub const CONNECTION_REQUEST: u8 = 0x09;
pub const CONNECTION_REQUEST_ACCEPTED: u8 = 0x10;
pub const NEW_INCOMING_CONNECTION: u8 = 0x13;
pub const DISCONNECTION_NOTIFICATION: u8 = 0x15;
pub const DETECT_LOST_CONNECTIONS: u8 = 0x04;

/// The negotiated RakNet protocol version this crate speaks.
pub const PROTOCOL_VERSION: u8 = 11;

fn unassigned() -> SocketAddr {
    UNASSIGNED_ADDRESS.parse().expect("valid fallback address")
}

fn write_system_addresses(buf: &mut BytesMut, addresses: &[SocketAddr]) {
    for i in 0..SYSTEM_ADDRESS_COUNT {
        let addr = addresses.get(i).copied().unwrap_or_else(unassigned);
        codec::write_address(buf, addr);
    }
}

fn read_system_addresses(reader: &mut Cursor<&[u8]>) -> Result<Vec<SocketAddr>, RakNetError> {
    let mut addresses = Vec::with_capacity(SYSTEM_ADDRESS_COUNT);
    for _ in 0..SYSTEM_ADDRESS_COUNT {
        addresses.push(codec::read_address(reader)?);
    }
    Ok(addresses)
}

/// The full handshake/discovery and connected-protocol message set (spec
/// §6). Every variant round-trips through [`Message::encode`]/
/// [`Message::decode`] byte-exact.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    UnconnectedPing {
        send_timestamp: u64,
        client_guid: u64,
    },
    UnconnectedPingOpenConnections {
        send_timestamp: u64,
        client_guid: u64,
    },
    UnconnectedPong {
        send_timestamp: u64,
        server_guid: u64,
        identifier: Vec<u8>,
    },
    OpenConnectionRequest1 {
        protocol_version: u8,
        padding_len: usize,
    },
    OpenConnectionReply1 {
        server_guid: u64,
        server_mtu: u16,
    },
    OpenConnectionRequest2 {
        server_address: SocketAddr,
        client_mtu: u16,
        client_guid: u64,
    },
    OpenConnectionReply2 {
        server_guid: u64,
        client_address: SocketAddr,
        mtu: u16,
    },
    AlreadyConnected {
        server_guid: u64,
    },
    IncompatibleProtocolVersion {
        server_protocol: u8,
        server_guid: u64,
    },
    NoFreeIncomingConnections {
        server_guid: u64,
    },
    ConnectionBanned {
        server_guid: u64,
    },
    ConnectionRequest {
        client_guid: u64,
        request_timestamp: u64,
    },
    ConnectionRequestAccepted {
        client_address: SocketAddr,
        system_addresses: Vec<SocketAddr>,
        request_timestamp: u64,
        accept_timestamp: u64,
    },
    NewIncomingConnection {
        server_address: SocketAddr,
        system_addresses: Vec<SocketAddr>,
        request_timestamp: u64,
        accept_timestamp: u64,
    },
    ConnectedPing {
        client_timestamp: u64,
    },
    ConnectedPong {
        client_timestamp: u64,
        server_timestamp: u64,
    },
    DetectLostConnections,
    DisconnectionNotification,
}

impl Message {
    pub fn id(&self) -> u8 {
        match self {
            Message::UnconnectedPing { .. } => UNCONNECTED_PING,
            Message::UnconnectedPingOpenConnections { .. } => UNCONNECTED_PING_OPEN_CONNECTIONS,
            Message::UnconnectedPong { .. } => UNCONNECTED_PONG,
            Message::OpenConnectionRequest1 { .. } => OPEN_CONNECTION_REQUEST_1,
            Message::OpenConnectionReply1 { .. } => OPEN_CONNECTION_REPLY_1,
            Message::OpenConnectionRequest2 { .. } => OPEN_CONNECTION_REQUEST_2,
            Message::OpenConnectionReply2 { .. } => OPEN_CONNECTION_REPLY_2,
            Message::AlreadyConnected { .. } => ALREADY_CONNECTED,
            Message::IncompatibleProtocolVersion { .. } => INCOMPATIBLE_PROTOCOL_VERSION,
            Message::NoFreeIncomingConnections { .. } => NO_FREE_INCOMING_CONNECTIONS,
            Message::ConnectionBanned { .. } => CONNECTION_BANNED,
            Message::ConnectionRequest { .. } => CONNECTION_REQUEST,
            Message::ConnectionRequestAccepted { .. } => CONNECTION_REQUEST_ACCEPTED,
            Message::NewIncomingConnection { .. } => NEW_INCOMING_CONNECTION,
            Message::ConnectedPing { .. } => CONNECTED_PING,
            Message::ConnectedPong { .. } => CONNECTED_PONG,
            Message::DetectLostConnections => DETECT_LOST_CONNECTIONS,
            Message::DisconnectionNotification => DISCONNECTION_NOTIFICATION,
        }
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.id());

        match self {
            Message::UnconnectedPing {
                send_timestamp,
                client_guid,
            }
            | Message::UnconnectedPingOpenConnections {
                send_timestamp,
                client_guid,
            } => {
                buf.put_u64(*send_timestamp);
                codec::write_magic(buf);
                codec::write_guid(buf, *client_guid);
            }
            Message::UnconnectedPong {
                send_timestamp,
                server_guid,
                identifier,
            } => {
                buf.put_u64(*send_timestamp);
                codec::write_guid(buf, *server_guid);
                codec::write_magic(buf);
                buf.put_u16(identifier.len() as u16);
                buf.put_slice(identifier);
            }
            Message::OpenConnectionRequest1 {
                protocol_version,
                padding_len,
            } => {
                codec::write_magic(buf);
                buf.put_u8(*protocol_version);
                buf.put_bytes(0, *padding_len);
            }
            Message::OpenConnectionReply1 {
                server_guid,
                server_mtu,
            } => {
                codec::write_magic(buf);
                codec::write_guid(buf, *server_guid);
                buf.put_u8(0); // secure: always disabled, spec non-goal "authentication"
                buf.put_u16(*server_mtu);
            }
            Message::OpenConnectionRequest2 {
                server_address,
                client_mtu,
                client_guid,
            } => {
                codec::write_magic(buf);
                codec::write_address(buf, *server_address);
                buf.put_u16(*client_mtu);
                codec::write_guid(buf, *client_guid);
            }
            Message::OpenConnectionReply2 {
                server_guid,
                client_address,
                mtu,
            } => {
                codec::write_magic(buf);
                codec::write_guid(buf, *server_guid);
                codec::write_address(buf, *client_address);
                buf.put_u16(*mtu);
                buf.put_u8(0); // secure
            }
            Message::AlreadyConnected { server_guid }
            | Message::NoFreeIncomingConnections { server_guid }
            | Message::ConnectionBanned { server_guid } => {
                codec::write_magic(buf);
                codec::write_guid(buf, *server_guid);
            }
            Message::IncompatibleProtocolVersion {
                server_protocol,
                server_guid,
            } => {
                buf.put_u8(*server_protocol);
                codec::write_magic(buf);
                codec::write_guid(buf, *server_guid);
            }
            Message::ConnectionRequest {
                client_guid,
                request_timestamp,
            } => {
                codec::write_guid(buf, *client_guid);
                buf.put_u64(*request_timestamp);
                buf.put_u8(0); // secure
            }
            Message::ConnectionRequestAccepted {
                client_address,
                system_addresses,
                request_timestamp,
                accept_timestamp,
            } => {
                codec::write_address(buf, *client_address);
                buf.put_i16(0); // system index, unused beyond wire compatibility
                write_system_addresses(buf, system_addresses);
                buf.put_u64(*request_timestamp);
                buf.put_u64(*accept_timestamp);
            }
            Message::NewIncomingConnection {
                server_address,
                system_addresses,
                request_timestamp,
                accept_timestamp,
            } => {
                codec::write_address(buf, *server_address);
                write_system_addresses(buf, system_addresses);
                buf.put_u64(*request_timestamp);
                buf.put_u64(*accept_timestamp);
            }
            Message::ConnectedPing { client_timestamp } => {
                buf.put_u64(*client_timestamp);
            }
            Message::ConnectedPong {
                client_timestamp,
                server_timestamp,
            } => {
                buf.put_u64(*client_timestamp);
                buf.put_u64(*server_timestamp);
            }
            Message::DetectLostConnections | Message::DisconnectionNotification => {}
        }
    }

    pub fn decode(buf: &[u8]) -> Result<Self, RakNetError> {
        let mut reader = Cursor::new(buf);
        let id = reader
            .read_u8()
            .map_err(|_| RakNetError::MalformedField("empty message buffer"))?;

        let message = match id {
            UNCONNECTED_PING => {
                let send_timestamp = reader
                    .read_u64_field()?;
                codec::read_magic(&mut reader)?;
                let client_guid = codec::read_guid(&mut reader)?;
                Message::UnconnectedPing {
                    send_timestamp,
                    client_guid,
                }
            }
            UNCONNECTED_PING_OPEN_CONNECTIONS => {
                let send_timestamp = reader.read_u64_field()?;
                codec::read_magic(&mut reader)?;
                let client_guid = codec::read_guid(&mut reader)?;
                Message::UnconnectedPingOpenConnections {
                    send_timestamp,
                    client_guid,
                }
            }
            UNCONNECTED_PONG => {
                let send_timestamp = reader.read_u64_field()?;
                let server_guid = codec::read_guid(&mut reader)?;
                codec::read_magic(&mut reader)?;
                let len = reader.read_u16_field()? as usize;
                if reader.remaining() < len {
                    return Err(RakNetError::MalformedField("truncated identifier"));
                }
                let start = reader.position() as usize;
                let identifier = reader.get_ref()[start..start + len].to_vec();
                reader.advance(len);
                Message::UnconnectedPong {
                    send_timestamp,
                    server_guid,
                    identifier,
                }
            }
            OPEN_CONNECTION_REQUEST_1 => {
                codec::read_magic(&mut reader)?;
                let protocol_version = reader.read_u8_field()?;
                let padding_len = reader.remaining();
                Message::OpenConnectionRequest1 {
                    protocol_version,
                    padding_len,
                }
            }
            OPEN_CONNECTION_REPLY_1 => {
                codec::read_magic(&mut reader)?;
                let server_guid = codec::read_guid(&mut reader)?;
                let _secure = reader.read_u8_field()?;
                let server_mtu = reader.read_u16_field()?;
                Message::OpenConnectionReply1 {
                    server_guid,
                    server_mtu,
                }
            }
            OPEN_CONNECTION_REQUEST_2 => {
                codec::read_magic(&mut reader)?;
                let server_address = codec::read_address(&mut reader)?;
                let client_mtu = reader.read_u16_field()?;
                let client_guid = codec::read_guid(&mut reader)?;
                Message::OpenConnectionRequest2 {
                    server_address,
                    client_mtu,
                    client_guid,
                }
            }
            OPEN_CONNECTION_REPLY_2 => {
                codec::read_magic(&mut reader)?;
                let server_guid = codec::read_guid(&mut reader)?;
                let client_address = codec::read_address(&mut reader)?;
                let mtu = reader.read_u16_field()?;
                let _secure = reader.read_u8_field()?;
                Message::OpenConnectionReply2 {
                    server_guid,
                    client_address,
                    mtu,
                }
            }
            ALREADY_CONNECTED => {
                codec::read_magic(&mut reader)?;
                let server_guid = codec::read_guid(&mut reader)?;
                Message::AlreadyConnected { server_guid }
            }
            NO_FREE_INCOMING_CONNECTIONS => {
                codec::read_magic(&mut reader)?;
                let server_guid = codec::read_guid(&mut reader)?;
                Message::NoFreeIncomingConnections { server_guid }
            }
            CONNECTION_BANNED => {
                codec::read_magic(&mut reader)?;
                let server_guid = codec::read_guid(&mut reader)?;
                Message::ConnectionBanned { server_guid }
            }
            INCOMPATIBLE_PROTOCOL_VERSION => {
                let server_protocol = reader.read_u8_field()?;
                codec::read_magic(&mut reader)?;
                let server_guid = codec::read_guid(&mut reader)?;
                Message::IncompatibleProtocolVersion {
                    server_protocol,
                    server_guid,
                }
            }
            CONNECTION_REQUEST => {
                let client_guid = codec::read_guid(&mut reader)?;
                let request_timestamp = reader.read_u64_field()?;
                let _secure = reader.read_u8_field()?;
                Message::ConnectionRequest {
                    client_guid,
                    request_timestamp,
                }
            }
            CONNECTION_REQUEST_ACCEPTED => {
                let client_address = codec::read_address(&mut reader)?;
                let _system_index = reader.read_u16_field()?;
                let system_addresses = read_system_addresses(&mut reader)?;
                let request_timestamp = reader.read_u64_field()?;
                let accept_timestamp = reader.read_u64_field()?;
                Message::ConnectionRequestAccepted {
                    client_address,
                    system_addresses,
                    request_timestamp,
                    accept_timestamp,
                }
            }
            NEW_INCOMING_CONNECTION => {
                let server_address = codec::read_address(&mut reader)?;
                let system_addresses = read_system_addresses(&mut reader)?;
                let request_timestamp = reader.read_u64_field()?;
                let accept_timestamp = reader.read_u64_field()?;
                Message::NewIncomingConnection {
                    server_address,
                    system_addresses,
                    request_timestamp,
                    accept_timestamp,
                }
            }
            CONNECTED_PING => {
                let client_timestamp = reader.read_u64_field()?;
                Message::ConnectedPing { client_timestamp }
            }
            CONNECTED_PONG => {
                let client_timestamp = reader.read_u64_field()?;
                let server_timestamp = reader.read_u64_field()?;
                Message::ConnectedPong {
                    client_timestamp,
                    server_timestamp,
                }
            }
            DETECT_LOST_CONNECTIONS => Message::DetectLostConnections,
            DISCONNECTION_NOTIFICATION => Message::DisconnectionNotification,
            _ => return Err(RakNetError::MalformedField("unknown message id")),
        };

        Ok(message)
    }
}

trait ReadField {
    fn read_u64_field(&mut self) -> Result<u64, RakNetError>;
    fn read_u16_field(&mut self) -> Result<u16, RakNetError>;
    fn read_u8_field(&mut self) -> Result<u8, RakNetError>;
}

impl ReadField for Cursor<&[u8]> {
    fn read_u64_field(&mut self) -> Result<u64, RakNetError> {
        use byteorder::ReadBytesExt;
        self.read_u64::<BE>()
            .map_err(|_| RakNetError::MalformedField("truncated u64"))
    }

    fn read_u16_field(&mut self) -> Result<u16, RakNetError> {
        use byteorder::ReadBytesExt;
        self.read_u16::<BE>()
            .map_err(|_| RakNetError::MalformedField("truncated u16"))
    }

    fn read_u8_field(&mut self) -> Result<u8, RakNetError> {
        use byteorder::ReadBytesExt;
        self.read_u8()
            .map_err(|_| RakNetError::MalformedField("truncated u8"))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn unconnected_ping_round_trips() {
        let msg = Message::UnconnectedPing {
            send_timestamp: 12345,
            client_guid: 0xDEAD_BEEF,
        };
        let mut buf = BytesMut::new();
        msg.encode(&mut buf);
        assert_eq!(Message::decode(&buf).unwrap(), msg);
    }

    #[test]
    fn open_connection_reply_1_round_trips() {
        let msg = Message::OpenConnectionReply1 {
            server_guid: 42,
            server_mtu: 1400,
        };
        let mut buf = BytesMut::new();
        msg.encode(&mut buf);
        assert_eq!(Message::decode(&buf).unwrap(), msg);
    }

    #[test]
    fn connection_request_accepted_round_trips() {
        // `write_system_addresses` always pads to `SYSTEM_ADDRESS_COUNT`
        // entries on encode, so a decoded message never has fewer than
        // that many — compare the fields the caller actually controls
        // instead of asserting full `Message` equality against a
        // shorter input vector.
        let msg = Message::ConnectionRequestAccepted {
            client_address: "127.0.0.1:12345".parse().unwrap(),
            system_addresses: vec!["127.0.0.1:1".parse().unwrap()],
            request_timestamp: 1,
            accept_timestamp: 2,
        };
        let mut buf = BytesMut::new();
        msg.encode(&mut buf);

        match Message::decode(&buf).unwrap() {
            Message::ConnectionRequestAccepted {
                client_address,
                system_addresses,
                request_timestamp,
                accept_timestamp,
            } => {
                assert_eq!(client_address, "127.0.0.1:12345".parse().unwrap());
                assert_eq!(system_addresses.len(), SYSTEM_ADDRESS_COUNT);
                assert_eq!(system_addresses[0], "127.0.0.1:1".parse().unwrap());
                assert_eq!(request_timestamp, 1);
                assert_eq!(accept_timestamp, 2);
            }
            other => panic!("expected ConnectionRequestAccepted, got {other:?}"),
        }
    }

    #[test]
    fn supplemental_offline_ids_round_trip() {
        for msg in [
            Message::AlreadyConnected { server_guid: 1 },
            Message::NoFreeIncomingConnections { server_guid: 2 },
            Message::ConnectionBanned { server_guid: 3 },
        ] {
            let mut buf = BytesMut::new();
            msg.encode(&mut buf);
            assert_eq!(Message::decode(&buf).unwrap(), msg);
        }
    }

    #[test]
    fn unknown_id_is_malformed_field() {
        let buf = [0xAAu8];
        assert!(matches!(
            Message::decode(&buf),
            Err(RakNetError::MalformedField(_))
        ));
    }
}
