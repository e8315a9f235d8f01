extern crate byteorder;

use std::fmt;
use std::fmt::{Display, Formatter};

use thiserror::Error;

use crate::tftp::shared::ack_packet::AckPacket;
use crate::tftp::shared::data_packet::DataPacket;
use crate::tftp::shared::err_packet::ErrorPacket;
use crate::tftp::shared::request_packet::ReadRequestPacket;

pub mod ack_packet;
pub mod block;
pub mod data_channel;
pub mod data_packet;
pub mod err_packet;
pub mod request_packet;

/// Length of the OpCode field in bytes.
const OP_LEN: usize = 1;
/// Stride size for reading / writing files.
pub const STRIDE_SIZE: usize = 512;
/// Largest datagram either side will read off the wire.
pub const MAX_DATAGRAM: usize = 1472;
/// Op code for Read Request
pub const OP_RRQ: u8 = 0x01;
/// Op code for Data packet
pub const OP_DATA: u8 = 0x03;
/// Op code for ACK packet
pub const OP_ACK: u8 = 0x04;
/// Op code for Error packet
pub const OP_ERR: u8 = 0x05;

#[derive(Debug, Eq, PartialEq, Clone)]
pub enum TFTPPacket {
    RRQ(ReadRequestPacket),
    DATA(DataPacket),
    ACK(AckPacket),
    ERR(ErrorPacket),
}

impl TFTPPacket {
    pub fn op(&self) -> u8 {
        match self {
            TFTPPacket::RRQ(_) => OP_RRQ,
            TFTPPacket::DATA(_) => OP_DATA,
            TFTPPacket::ACK(_) => OP_ACK,
            TFTPPacket::ERR(_) => OP_ERR,
        }
    }
}

impl Display for TFTPPacket {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            TFTPPacket::RRQ(p) => write!(f, "RRQ [{}]", p.filename_lossy()),
            TFTPPacket::DATA(p) => write!(f, "DATA [{}] {}B", p.blk(), p.len()),
            TFTPPacket::ACK(p) => write!(f, "ACK [{}]", p.blk()),
            TFTPPacket::ERR(p) => write!(f, "ERR: {}", p.message_lossy()),
        }
    }
}

impl Serializable for TFTPPacket {
    fn serialize(self) -> Vec<u8> {
        match self {
            TFTPPacket::RRQ(p) => p.serialize(),
            TFTPPacket::DATA(p) => p.serialize(),
            TFTPPacket::ACK(p) => p.serialize(),
            TFTPPacket::ERR(p) => p.serialize(),
        }
    }
}

pub trait Serializable {
    fn serialize(self) -> Vec<u8>;
}

pub trait Deserializable {
    fn deserialize(buf: &[u8]) -> Result<TFTPPacket, TFTPParseError>;
}

/// Decodes a raw datagram by dispatching on its first byte.
///
/// Anything that is not a well-formed packet comes back as an `Err`;
/// an open UDP port sees plenty of those, so callers drop them and keep going.
pub fn parse_udp_packet(buf: &[u8]) -> Result<TFTPPacket, TFTPParseError> {
    match buf.first() {
        None => Err(TFTPParseError::Empty),
        Some(&OP_RRQ) => ReadRequestPacket::deserialize(buf),
        Some(&OP_DATA) => DataPacket::deserialize(buf),
        Some(&OP_ACK) => AckPacket::deserialize(buf),
        Some(&OP_ERR) => ErrorPacket::deserialize(buf),
        Some(&op) => Err(TFTPParseError::BadOpCode(op)),
    }
}

#[derive(Debug, Error, Eq, PartialEq)]
pub enum TFTPParseError {
    #[error("empty datagram")]
    Empty,
    #[error("bad OP code [{0}]")]
    BadOpCode(u8),
    #[error("packet with OP code [{op}] truncated to {len} bytes")]
    Truncated { op: u8, len: usize },
    #[error("invalid data length [{0}]")]
    DataTooLong(usize),
}
