/// DATA packets carry one block of the file, the opcode is 3.
///
/// The block number is a single unsigned byte and the payload is
/// whatever follows it, up to STRIDE_SIZE bytes. A payload shorter
/// than STRIDE_SIZE (possibly empty) marks the last block.
use std::io::Cursor;

use crate::tftp::shared::{
    Deserializable, Serializable, TFTPPacket, TFTPParseError, OP_DATA, OP_LEN, STRIDE_SIZE,
};

use super::byteorder::ReadBytesExt;

const BLK_NUM_LEN: usize = 1;
const HEADER_LEN: usize = OP_LEN + BLK_NUM_LEN;

#[derive(Debug, Eq, PartialEq, Clone)]
pub struct DataPacket {
    op: u8,
    blk: u8,
    data: Vec<u8>,
}

impl DataPacket {
    pub fn new(blk: u8, data: Vec<u8>) -> Self {
        debug_assert!(data.len() <= STRIDE_SIZE, "DATA payload over one stride");
        DataPacket {
            op: OP_DATA,
            blk,
            data,
        }
    }

    pub fn blk(&self) -> u8 {
        self.blk
    }

    pub fn data(self) -> Vec<u8> {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// A block shorter than a full stride ends the transfer.
    pub fn is_last(&self) -> bool {
        self.data.len() < STRIDE_SIZE
    }
}

impl Serializable for DataPacket {
    fn serialize(self) -> Vec<u8> {
        let mut buf: Vec<u8> = Vec::with_capacity(HEADER_LEN + self.len());
        buf.push(self.op);
        buf.push(self.blk);
        buf.extend_from_slice(&self.data);

        buf
    }
}

impl Deserializable for DataPacket {
    fn deserialize(buf: &[u8]) -> Result<TFTPPacket, TFTPParseError> {
        let mut rdr = Cursor::new(buf);
        let op = rdr.read_u8().map_err(|_| TFTPParseError::Empty)?;

        if OP_DATA != op {
            return Err(TFTPParseError::BadOpCode(op));
        }

        let blk = rdr.read_u8().map_err(|_| TFTPParseError::Truncated {
            op,
            len: buf.len(),
        })?;
        let data = &buf[HEADER_LEN..];

        if data.len() > STRIDE_SIZE {
            return Err(TFTPParseError::DataTooLong(data.len()));
        }

        Ok(TFTPPacket::DATA(DataPacket::new(blk, data.to_vec())))
    }
}

/// Builds the wire bytes of a DATA packet straight from a borrowed chunk.
///
/// The server keeps these bytes around to retransmit the same block.
pub fn encode_block(blk: u8, chunk: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_LEN + chunk.len());
    buf.push(OP_DATA);
    buf.push(blk);
    buf.extend_from_slice(chunk);

    buf
}
