// Breakpoint commands
//
// ADD_BREAKPOINT / REMOVE_BREAKPOINT payload:
//   pc (4), class name, method name, descriptor
// each string as length (2), checksum (2), bytes, NUL.

use crate::commands::opcodes;
use crate::connection::MjvmDebugger;
use crate::line_info::DebugLineInfo;
use crate::protocol::{CommandPacket, DebugResult};
use crate::types::BreakpointUpdate;
use bytes::BufMut;
use tracing::{debug, info};

pub fn breakpoint_packet(opcode: u8, breakpoint: &DebugLineInfo) -> CommandPacket {
    let mut packet = CommandPacket::new(opcode);
    packet.data.put_u32_le(breakpoint.pc);
    packet.put_string(&breakpoint.class_name.replace('\\', "/"));
    packet.put_string(&breakpoint.method_name);
    packet.put_string(&breakpoint.descriptor);
    packet
}

impl MjvmDebugger {
    /// Make the breakpoints for `source_path` match `lines`.
    ///
    /// Every line is resolved before anything is sent. Commands go out one at
    /// a time; a failure leaves earlier commands applied and the local list
    /// reflects exactly what the device acknowledged.
    pub async fn set_breakpoints(
        &mut self,
        lines: &[u32],
        source_path: &str,
    ) -> DebugResult<BreakpointUpdate> {
        let channel = self.channel()?.clone();

        let mut requested: Vec<u32> = Vec::with_capacity(lines.len());
        for &line in lines {
            if !requested.contains(&line) {
                requested.push(line);
            }
        }

        let to_remove: Vec<DebugLineInfo> = self
            .breakpoints
            .iter()
            .filter(|bp| bp.source_path == source_path && !requested.contains(&bp.line))
            .cloned()
            .collect();

        let to_add = requested
            .iter()
            .filter(|&&line| {
                !self
                    .breakpoints
                    .iter()
                    .any(|bp| bp.same_breakpoint(source_path, line))
            })
            .map(|&line| self.resolver.resolve_from_line(line, source_path))
            .collect::<Result<Vec<_>, _>>()?;

        let mut update = BreakpointUpdate::default();

        for bp in to_remove {
            debug!("Removing breakpoint {}:{} (pc {})", bp.source_path, bp.line, bp.pc);
            channel
                .command(breakpoint_packet(opcodes::REMOVE_BREAKPOINT, &bp))
                .await?;
            self.breakpoints.retain(|installed| installed != &bp);
            update.removed += 1;
        }

        for bp in to_add {
            debug!(
                "Adding breakpoint {}:{} at {}.{}{} pc {}",
                bp.source_path, bp.line, bp.class_name, bp.method_name, bp.descriptor, bp.pc
            );
            channel
                .command(breakpoint_packet(opcodes::ADD_BREAKPOINT, &bp))
                .await?;
            self.breakpoints.push(bp);
            update.added += 1;
        }

        info!(
            "Breakpoints for {}: {} added, {} removed",
            source_path, update.added, update.removed
        );
        Ok(update)
    }

    pub async fn remove_all_breakpoints(&mut self) -> DebugResult<()> {
        let channel = self.channel()?.clone();
        channel
            .command(CommandPacket::new(opcodes::REMOVE_ALL_BREAKPOINTS))
            .await?;
        self.breakpoints.clear();
        info!("All breakpoints removed");
        Ok(())
    }
}
