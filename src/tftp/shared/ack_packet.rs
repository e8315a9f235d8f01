/// ACK packets acknowledge DATA packets.
/// the opcode is 4.
///
/// The block number in an ACK echoes
/// the block number of the DATA packet being acknowledged.
/// It is a single unsigned byte, so an ACK is always two bytes long.
use std::io::Cursor;

use crate::tftp::shared::{Deserializable, Serializable, TFTPPacket, TFTPParseError, OP_ACK};

use super::byteorder::ReadBytesExt;

const ACK_LEN: usize = 2;

#[derive(Debug, Eq, PartialEq, Clone)]
pub struct AckPacket {
    op: u8,
    blk: u8,
}

impl AckPacket {
    pub fn new(blk: u8) -> Self {
        AckPacket { op: OP_ACK, blk }
    }

    pub fn blk(&self) -> u8 {
        self.blk
    }
}

impl Serializable for AckPacket {
    fn serialize(self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(ACK_LEN);
        buf.push(self.op);
        buf.push(self.blk);

        buf
    }
}

impl Deserializable for AckPacket {
    fn deserialize(buf: &[u8]) -> Result<TFTPPacket, TFTPParseError> {
        let mut rdr = Cursor::new(buf);
        let op = rdr.read_u8().map_err(|_| TFTPParseError::Empty)?;

        if op != OP_ACK {
            return Err(TFTPParseError::BadOpCode(op));
        }

        let blk = rdr.read_u8().map_err(|_| TFTPParseError::Truncated {
            op,
            len: buf.len(),
        })?;

        Ok(TFTPPacket::ACK(AckPacket::new(blk)))
    }
}
