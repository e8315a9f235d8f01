use std::borrow::Cow;

use crate::tftp::shared::{Deserializable, Serializable, TFTPPacket, TFTPParseError, OP_LEN, OP_RRQ};

/// A read request names the file to download.
///
/// Only one transfer mode exists, so unlike a full TFTP request there is
/// no mode string and no terminator: the filename is every byte after
/// the opcode.
#[derive(Debug, Eq, PartialEq, Clone)]
pub struct ReadRequestPacket {
    op: u8,
    filename: Vec<u8>,
}

impl ReadRequestPacket {
    pub fn new(filename: &str) -> ReadRequestPacket {
        ReadRequestPacket::from_bytes(filename.as_bytes().to_vec())
    }

    pub fn from_bytes(filename: Vec<u8>) -> ReadRequestPacket {
        ReadRequestPacket {
            op: OP_RRQ,
            filename,
        }
    }

    pub fn filename(&self) -> &[u8] {
        &self.filename
    }

    pub fn filename_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.filename)
    }
}

impl Serializable for ReadRequestPacket {
    fn serialize(self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(OP_LEN + self.filename.len());
        buf.push(self.op);
        buf.extend_from_slice(&self.filename);
        buf
    }
}

impl Deserializable for ReadRequestPacket {
    fn deserialize(buf: &[u8]) -> Result<TFTPPacket, TFTPParseError> {
        let (&op, filename) = buf.split_first().ok_or(TFTPParseError::Empty)?;
        if op != OP_RRQ {
            return Err(TFTPParseError::BadOpCode(op));
        }

        Ok(TFTPPacket::RRQ(ReadRequestPacket::from_bytes(
            filename.to_vec(),
        )))
    }
}
