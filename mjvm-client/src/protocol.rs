// MJVM debugger wire protocol
//
// Request:  opcode (1 byte) + payload
// Reply:    echoed opcode (1 byte) + status (1 byte) + payload
//
// Unlike class files, every multi-byte field on the wire is little-endian.

use crate::commands::{opcodes, reply_status};
use crate::line_info::ResolveError;
use bytes::BufMut;
use thiserror::Error;

pub type DebugResult<T> = Result<T, DebuggerError>;

#[derive(Debug, Error)]
pub enum DebuggerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("No reply to opcode {opcode} within {timeout_ms} ms")]
    Timeout { opcode: u8, timeout_ms: u64 },

    #[error("Device rejected opcode {opcode} with status {status}")]
    Rejected { opcode: u8, status: u8 },

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Not connected")]
    NotConnected,

    #[error("Device is not stopped")]
    NotStopped,

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("Step did not leave the line after {0} instructions")]
    StepLimit(u32),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub const REPLY_HEADER_SIZE: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandPacket {
    pub opcode: u8,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyPacket {
    pub opcode: u8,
    pub status: u8,
    pub data: Vec<u8>,
}

impl CommandPacket {
    pub fn new(opcode: u8) -> Self {
        Self {
            opcode,
            data: Vec::new(),
        }
    }

    /// Append a string as the device expects it:
    /// length (2), checksum (2), bytes, NUL pad
    pub fn put_string(&mut self, value: &str) {
        self.data.put_u16_le(value.len() as u16);
        self.data.put_u16_le(checksum(value));
        self.data.put_slice(value.as_bytes());
        self.data.put_u8(0);
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(1 + self.data.len());
        buf.put_u8(self.opcode);
        buf.put_slice(&self.data);
        buf
    }
}

impl ReplyPacket {
    pub fn decode(buf: &[u8]) -> DebugResult<Self> {
        if buf.len() < REPLY_HEADER_SIZE {
            return Err(DebuggerError::Protocol(format!(
                "Reply too short: {} bytes",
                buf.len()
            )));
        }

        Ok(Self {
            opcode: buf[0],
            status: buf[1],
            data: buf[REPLY_HEADER_SIZE..].to_vec(),
        })
    }

    pub fn is_error(&self) -> bool {
        self.status != reply_status::OK
    }

    /// Check the reply answers `opcode` and reports success
    pub fn check(&self, opcode: u8) -> DebugResult<()> {
        if self.opcode != opcode {
            return Err(DebuggerError::Protocol(format!(
                "Reply to {} echoes {}",
                opcodes::name(opcode),
                opcodes::name(self.opcode)
            )));
        }
        if self.is_error() {
            return Err(DebuggerError::Rejected {
                opcode,
                status: self.status,
            });
        }
        Ok(())
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// Additive checksum over the UTF-16 code units, truncated to 16 bits
pub fn checksum(value: &str) -> u16 {
    value
        .encode_utf16()
        .fold(0u16, |sum, unit| sum.wrapping_add(unit))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_byte_command() {
        let packet = CommandPacket::new(opcodes::RUN);
        assert_eq!(packet.encode(), vec![5]);
    }

    #[test]
    fn test_little_endian_encoding() {
        let mut packet = CommandPacket::new(opcodes::READ_STACK_TRACE);
        packet.data.put_u32_le(0x12345678);
        let encoded = packet.encode();

        assert_eq!(encoded, vec![1, 0x78, 0x56, 0x34, 0x12]);
        // NOT big-endian
        assert_ne!(&encoded[1..], &[0x12, 0x34, 0x56, 0x78]);
    }

    #[test]
    fn test_put_string_layout() {
        let mut packet = CommandPacket::new(opcodes::ADD_BREAKPOINT);
        packet.put_string("Main");

        // 'M' + 'a' + 'i' + 'n' = 77 + 97 + 105 + 110 = 389 = 0x0185
        assert_eq!(
            packet.data,
            vec![4, 0, 0x85, 0x01, b'M', b'a', b'i', b'n', 0]
        );
    }

    #[test]
    fn test_checksum_wraps() {
        assert_eq!(checksum(""), 0);
        assert_eq!(checksum("()V"), 40 + 41 + 86);

        // 700 * 'z' (122) = 85400, which wraps to 85400 - 65536
        let long = "z".repeat(700);
        assert_eq!(checksum(&long), (85400 - 65536) as u16);
    }

    #[test]
    fn test_reply_decode_and_check() {
        let reply = ReplyPacket::decode(&[0, 0, 0x03]).unwrap();
        assert_eq!(reply.opcode, opcodes::READ_STATUS);
        assert_eq!(reply.data(), &[0x03]);
        assert!(reply.check(opcodes::READ_STATUS).is_ok());

        assert!(matches!(
            reply.check(opcodes::RUN),
            Err(DebuggerError::Protocol(_))
        ));

        let rejected = ReplyPacket::decode(&[6, 1]).unwrap();
        assert!(matches!(
            rejected.check(opcodes::STOP),
            Err(DebuggerError::Rejected { opcode: 6, status: 1 })
        ));
    }

    #[test]
    fn test_reply_too_short() {
        assert!(ReplyPacket::decode(&[5]).is_err());
    }
}
