//! Pure wire-format encode/decode functions (spec §4.1, "Packet Codec").
//!
//! No I/O and no knowledge of datagrams, peers, or reliability lives here —
//! only fixed-width integers, 24-bit "triads," length-prefixed strings,
//! address records, and the handshake magic cookie.

use std::io::{Cursor, Read};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use byteorder::{ByteOrder, ReadBytesExt, WriteBytesExt};
use bytes::{Buf, BufMut, BytesMut};

use crate::error::RakNetError;

/// The 16-byte sequence every offline RakNet message opens with.
pub const MAGIC: [u8; 16] = [
    0x00, 0xFF, 0xFF, 0x00, 0xFE, 0xFE, 0xFE, 0xFE, 0xFD, 0xFD, 0xFD, 0xFD, 0x12, 0x34, 0x56, 0x78,
];

/// Writes the magic cookie.
pub fn write_magic(buf: &mut BytesMut) {
    buf.put_slice(&MAGIC);
}

/// Reads and validates the magic cookie.
pub fn read_magic(buf: &mut Cursor<&[u8]>) -> Result<(), RakNetError> {
    if buf.remaining() < MAGIC.len() {
        return Err(RakNetError::MalformedField("truncated magic cookie"));
    }

    let start = buf.position() as usize;
    let end = start + MAGIC.len();
    let matches = buf.get_ref()[start..end] == MAGIC;
    buf.advance(MAGIC.len());

    if !matches {
        return Err(RakNetError::MalformedField("magic cookie mismatch"));
    }

    Ok(())
}

/// Writes a 24-bit little-endian "triad" — the width used for every
/// datagram sequence number and per-message index on the wire.
pub fn write_u24<O: ByteOrder>(buf: &mut BytesMut, value: u32) {
    let mut tmp = [0u8; 3];
    O::write_u24(&mut tmp, value);
    buf.put_slice(&tmp);
}

/// Reads a 24-bit triad.
pub fn read_u24<O: ByteOrder>(buf: &mut Cursor<&[u8]>) -> Result<u32, RakNetError> {
    buf.read_u24::<O>()
        .map_err(|_| RakNetError::MalformedField("truncated u24"))
}

/// Writes a length-prefixed UTF-8 string; `O` picks the byte order of the
/// 16-bit length prefix (some fields are big-endian, some little-endian —
/// spec §4.1 leaves this per-field).
pub fn write_prefixed_string<O: ByteOrder>(buf: &mut BytesMut, value: &str) {
    let bytes = value.as_bytes();
    let mut len = [0u8; 2];
    O::write_u16(&mut len, bytes.len() as u16);
    buf.put_slice(&len);
    buf.put_slice(bytes);
}

/// Reads a length-prefixed UTF-8 string.
pub fn read_prefixed_string<O: ByteOrder>(buf: &mut Cursor<&[u8]>) -> Result<String, RakNetError> {
    let len = buf
        .read_u16::<O>()
        .map_err(|_| RakNetError::MalformedField("truncated string length"))? as usize;

    if buf.remaining() < len {
        return Err(RakNetError::MalformedField("truncated string body"));
    }

    let start = buf.position() as usize;
    let end = start + len;
    let bytes = &buf.get_ref()[start..end];
    buf.advance(len);

    String::from_utf8(bytes.to_vec()).map_err(|_| RakNetError::MalformedField("string is not utf-8"))
}

/// Writes an address record: 1-byte family tag, address bytes with every
/// byte bitwise-inverted, 10 IPv6 pad bytes, 2-byte big-endian port.
pub fn write_address(buf: &mut BytesMut, addr: SocketAddr) {
    match addr.ip() {
        IpAddr::V4(ip) => {
            buf.put_u8(4);
            for b in ip.octets() {
                buf.put_u8(!b);
            }
            buf.put_u16(addr.port());
        }
        IpAddr::V6(ip) => {
            buf.put_u8(6);
            for b in ip.octets() {
                buf.put_u8(!b);
            }
            buf.put_slice(&[0u8; 10]);
            buf.put_u16(addr.port());
        }
    }
}

/// Reads an address record.
pub fn read_address(buf: &mut Cursor<&[u8]>) -> Result<SocketAddr, RakNetError> {
    let family = buf
        .read_u8()
        .map_err(|_| RakNetError::MalformedField("truncated address family"))?;

    match family {
        4 => {
            let mut octets = [0u8; 4];
            buf.read_exact(&mut octets)
                .map_err(|_| RakNetError::MalformedField("truncated ipv4 address"))?;
            for b in octets.iter_mut() {
                *b = !*b;
            }
            let port = buf
                .read_u16::<byteorder::BE>()
                .map_err(|_| RakNetError::MalformedField("truncated port"))?;
            Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::from(octets)), port))
        }
        6 => {
            let mut octets = [0u8; 16];
            buf.read_exact(&mut octets)
                .map_err(|_| RakNetError::MalformedField("truncated ipv6 address"))?;
            for b in octets.iter_mut() {
                *b = !*b;
            }
            buf.advance(10);
            let port = buf
                .read_u16::<byteorder::BE>()
                .map_err(|_| RakNetError::MalformedField("truncated port"))?;
            Ok(SocketAddr::new(IpAddr::V6(Ipv6Addr::from(octets)), port))
        }
        _ => Err(RakNetError::MalformedField("invalid address family tag")),
    }
}

/// Writes a 64-bit big-endian GUID.
pub fn write_guid(buf: &mut BytesMut, guid: u64) {
    buf.put_u64(guid);
}

/// Reads a 64-bit big-endian GUID.
pub fn read_guid(buf: &mut Cursor<&[u8]>) -> Result<u64, RakNetError> {
    buf.read_u64::<byteorder::BE>()
        .map_err(|_| RakNetError::MalformedField("truncated guid"))
}

#[cfg(test)]
mod test {
    use super::*;
    use byteorder::LE;

    #[test]
    fn triad_round_trips() {
        let mut buf = BytesMut::new();
        write_u24::<LE>(&mut buf, 0x00ABCDEF & 0x00FF_FFFF);
        let mut reader = Cursor::new(&buf[..]);
        assert_eq!(read_u24::<LE>(&mut reader).unwrap(), 0x00ABCDEF & 0x00FF_FFFF);
    }

    #[test]
    fn magic_round_trips() {
        let mut buf = BytesMut::new();
        write_magic(&mut buf);
        let mut reader = Cursor::new(&buf[..]);
        assert!(read_magic(&mut reader).is_ok());
    }

    #[test]
    fn magic_mismatch_is_malformed_field() {
        let mut buf = BytesMut::new();
        buf.put_slice(&[0u8; 16]);
        let mut reader = Cursor::new(&buf[..]);
        assert!(matches!(
            read_magic(&mut reader),
            Err(RakNetError::MalformedField(_))
        ));
    }

    #[test]
    fn ipv4_address_round_trips() {
        let addr: SocketAddr = "127.0.0.1:19132".parse().unwrap();
        let mut buf = BytesMut::new();
        write_address(&mut buf, addr);
        let mut reader = Cursor::new(&buf[..]);
        assert_eq!(read_address(&mut reader).unwrap(), addr);
    }

    #[test]
    fn ipv6_address_round_trips() {
        let addr: SocketAddr = "[::1]:19132".parse().unwrap();
        let mut buf = BytesMut::new();
        write_address(&mut buf, addr);
        let mut reader = Cursor::new(&buf[..]);
        assert_eq!(read_address(&mut reader).unwrap(), addr);
    }

    #[test]
    fn address_inverts_bytes_on_wire() {
        let addr: SocketAddr = "255.0.255.0:0".parse().unwrap();
        let mut buf = BytesMut::new();
        write_address(&mut buf, addr);
        // family tag, then inverted octets
        assert_eq!(buf[1], 0x00);
        assert_eq!(buf[2], 0xFF);
        assert_eq!(buf[3], 0x00);
        assert_eq!(buf[4], 0xFF);
    }

    #[test]
    fn string_round_trips() {
        let mut buf = BytesMut::new();
        write_prefixed_string::<byteorder::BE>(&mut buf, "hello raknet");
        let mut reader = Cursor::new(&buf[..]);
        assert_eq!(
            read_prefixed_string::<byteorder::BE>(&mut reader).unwrap(),
            "hello raknet"
        );
    }

    #[test]
    fn guid_round_trips() {
        let mut buf = BytesMut::new();
        write_guid(&mut buf, 0x0123_4567_89AB_CDEF);
        let mut reader = Cursor::new(&buf[..]);
        assert_eq!(read_guid(&mut reader).unwrap(), 0x0123_4567_89AB_CDEF);
    }
}
