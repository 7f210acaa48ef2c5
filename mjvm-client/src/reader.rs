// Helper functions for reading byte buffers
//
// Class files are big-endian and read through a cursor; device replies are
// little-endian and read through `&mut &[u8]` helpers.

use crate::classfile::{ClassFileError, ClassFileResult};
use crate::protocol::{DebugResult, DebuggerError};
use bytes::Buf;

/// Forward-only cursor over a class-file buffer.
#[derive(Debug, Clone)]
pub struct ClassReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ClassReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, len: usize) -> ClassFileResult<&'a [u8]> {
        if self.remaining() < len {
            return Err(ClassFileError::UnexpectedEof {
                offset: self.pos,
                needed: len,
            });
        }
        let bytes = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    pub fn read_u8(&mut self) -> ClassFileResult<u8> {
        Ok(self.take(1)?.get_u8())
    }

    pub fn read_u16(&mut self) -> ClassFileResult<u16> {
        Ok(self.take(2)?.get_u16())
    }

    pub fn read_u32(&mut self) -> ClassFileResult<u32> {
        Ok(self.take(4)?.get_u32())
    }

    pub fn read_u64(&mut self) -> ClassFileResult<u64> {
        Ok(self.take(8)?.get_u64())
    }

    pub fn read_bytes(&mut self, len: usize) -> ClassFileResult<&'a [u8]> {
        self.take(len)
    }

    pub fn skip(&mut self, len: usize) -> ClassFileResult<()> {
        self.take(len).map(|_| ())
    }
}

/// Read a u8
pub fn read_u8(buf: &mut &[u8]) -> DebugResult<u8> {
    if buf.remaining() < 1 {
        return Err(DebuggerError::Protocol("Not enough data for u8".to_string()));
    }
    Ok(buf.get_u8())
}

/// Read a little-endian u16
pub fn read_u16_le(buf: &mut &[u8]) -> DebugResult<u16> {
    if buf.remaining() < 2 {
        return Err(DebuggerError::Protocol("Not enough data for u16".to_string()));
    }
    Ok(buf.get_u16_le())
}

/// Read a little-endian u32
pub fn read_u32_le(buf: &mut &[u8]) -> DebugResult<u32> {
    if buf.remaining() < 4 {
        return Err(DebuggerError::Protocol("Not enough data for u32".to_string()));
    }
    Ok(buf.get_u32_le())
}

/// Read a device string (2-byte length, 2 reserved bytes, UTF-8 bytes)
pub fn read_device_string(buf: &mut &[u8]) -> DebugResult<String> {
    let len = read_u16_le(buf)? as usize;
    let _reserved = read_u16_le(buf)?;

    if buf.remaining() < len {
        return Err(DebuggerError::Protocol(format!(
            "Not enough data for string: expected {}, got {}",
            len,
            buf.remaining()
        )));
    }

    let bytes = &buf[..len];
    buf.advance(len);

    String::from_utf8(bytes.to_vec())
        .map_err(|e| DebuggerError::Protocol(format!("Invalid UTF-8 in string: {}", e)))
}

/// Skip the NUL terminator the device writes after a string, if present
pub fn skip_terminator(buf: &mut &[u8]) {
    if buf.first() == Some(&0) {
        buf.advance(1);
    }
}
