/// ERROR packet terminates a transfer, the opcode is 5.
/// The error message is intended for human consumption and takes up
/// the rest of the datagram; there is no error code and no terminator.
use std::borrow::Cow;

use crate::tftp::shared::{Deserializable, Serializable, TFTPPacket, TFTPParseError, OP_ERR, OP_LEN};

#[derive(Debug, Eq, PartialEq, Clone)]
pub struct ErrorPacket {
    op: u8,
    err: Vec<u8>,
}

impl ErrorPacket {
    pub fn new(msg: &str) -> Self {
        ErrorPacket::from_bytes(msg.as_bytes().to_vec())
    }

    pub fn from_bytes(err: Vec<u8>) -> Self {
        ErrorPacket { op: OP_ERR, err }
    }

    /// The reply to a read request naming a file the server doesn't have.
    pub fn file_not_found(file_name: &str) -> Self {
        ErrorPacket::new(&format!("{} was not found.", file_name))
    }

    pub fn err(&self) -> &[u8] {
        &self.err
    }

    pub fn message_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.err)
    }
}

impl Serializable for ErrorPacket {
    fn serialize(self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(OP_LEN + self.err.len());
        buf.push(self.op);
        buf.extend_from_slice(&self.err);
        buf
    }
}

impl Deserializable for ErrorPacket {
    fn deserialize(buf: &[u8]) -> Result<TFTPPacket, TFTPParseError> {
        let (&op, msg) = buf.split_first().ok_or(TFTPParseError::Empty)?;

        if op != OP_ERR {
            return Err(TFTPParseError::BadOpCode(op));
        }

        Ok(TFTPPacket::ERR(ErrorPacket::from_bytes(msg.to_vec())))
    }
}
