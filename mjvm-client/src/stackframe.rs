// Stack frame commands
//
// READ_STACK_TRACE request: index (4)
// Reply payload: index (4), pc (4), class, method, descriptor
// where each string is length (2), reserved (2), bytes, optional NUL.

use crate::commands::opcodes;
use crate::connection::MjvmDebugger;
use crate::protocol::{CommandPacket, DebugResult, DebuggerError};
use crate::reader::{read_device_string, read_u32_le, skip_terminator};
use crate::types::StackFrame;
use bytes::BufMut;

/// Frame as the device reports it, before source resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawStackFrame {
    pub index: u32,
    pub pc: u32,
    pub class_name: String,
    pub method_name: String,
    pub descriptor: String,
}

impl RawStackFrame {
    pub fn decode(mut data: &[u8]) -> DebugResult<Self> {
        let index = read_u32_le(&mut data)?;
        let pc = read_u32_le(&mut data)?;
        let class_name = read_device_string(&mut data)?;
        skip_terminator(&mut data);
        let method_name = read_device_string(&mut data)?;
        skip_terminator(&mut data);
        let descriptor = read_device_string(&mut data)?;

        Ok(Self {
            index,
            pc,
            class_name,
            method_name,
            descriptor,
        })
    }
}

impl MjvmDebugger {
    /// Frame at `index`; the top frame is served from cache while the device
    /// stays halted
    pub async fn stack_frame(&mut self, index: u32) -> DebugResult<StackFrame> {
        if index != 0 {
            return self.read_stack_frame(index).await;
        }
        if let Some(frame) = self.session.top_frame().await {
            return Ok(frame);
        }

        let frame = self.read_stack_frame(0).await?;
        self.session.store_frames(vec![frame.clone()]).await;
        Ok(frame)
    }

    /// The device only exposes the executing frame, so this is the top frame
    pub async fn stack_frames(&mut self) -> DebugResult<Vec<StackFrame>> {
        if let Some(frames) = self.session.frames().await {
            return Ok(frames);
        }

        let frames = vec![self.read_stack_frame(0).await?];
        self.session.store_frames(frames.clone()).await;
        Ok(frames)
    }

    pub(crate) async fn read_stack_frame(&self, index: u32) -> DebugResult<StackFrame> {
        let channel = self.channel()?;
        let mut packet = CommandPacket::new(opcodes::READ_STACK_TRACE);
        packet.data.put_u32_le(index);

        let reply = channel.command(packet).await?;
        let raw = RawStackFrame::decode(reply.data())?;
        if raw.index != index {
            return Err(DebuggerError::Protocol(format!(
                "Asked for frame {}, device answered frame {}",
                index, raw.index
            )));
        }

        let info = self
            .resolver
            .resolve_from_pc(raw.pc, &raw.class_name, &raw.method_name, &raw.descriptor)?;

        Ok(StackFrame {
            index: raw.index,
            pc: raw.pc,
            class_name: info.class_name,
            method_name: info.method_name,
            descriptor: info.descriptor,
            source_path: info.source_path,
            line: info.line,
        })
    }
}
