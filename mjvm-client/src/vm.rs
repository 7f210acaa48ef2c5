// Execution control
//
// Run, stop and stepping. The cached status decides whether a command is
// needed at all.

use crate::commands::{opcodes, status_bits};
use crate::connection::MjvmDebugger;
use crate::eventloop::refresh_status;
use crate::protocol::{CommandPacket, DebugResult, DebuggerError};
use crate::types::StackFrame;
use tokio::time::Instant;
use tracing::{debug, info};

impl MjvmDebugger {
    /// Resume execution (RUN). No-op when the device is already running.
    pub async fn run(&mut self) -> DebugResult<()> {
        let channel = self.channel()?.clone();
        if !self.session.status().is_stopped() {
            debug!("Device already running");
            return Ok(());
        }

        self.session.invalidate_frames().await;
        self.session.clear_bits(status_bits::HIT_BREAKPOINT);
        channel.command(CommandPacket::new(opcodes::RUN)).await?;
        self.session.clear_bits(status_bits::STOP);

        info!("Device running");
        Ok(())
    }

    /// Halt execution (STOP) and wait until the device reports it stopped
    pub async fn stop(&mut self) -> DebugResult<()> {
        let channel = self.channel()?.clone();
        if self.session.status().is_stopped() {
            debug!("Device already stopped");
            return Ok(());
        }

        channel.command(CommandPacket::new(opcodes::STOP)).await?;
        self.wait_stop().await?;

        info!("Device stopped");
        Ok(())
    }

    /// Step until execution leaves the current source line. Returns the
    /// frame where stepping ended.
    pub async fn step_in(&mut self) -> DebugResult<StackFrame> {
        self.channel()?;
        if !self.session.status().is_stopped() {
            return Err(DebuggerError::NotStopped);
        }

        let baseline = self.stack_frame(0).await?;
        let limit = self.config.max_step_instructions;
        for step in 1..=limit {
            let frame = self.single_step().await?;
            // Identical pc means the device made no progress; stop there too
            if !frame.same_line(&baseline) || frame == baseline {
                debug!(
                    "Step in finished after {} instructions at {}:{}",
                    step, frame.source_path, frame.line
                );
                self.session.store_frames(vec![frame.clone()]).await;
                return Ok(frame);
            }
        }

        Err(DebuggerError::StepLimit(limit))
    }

    /// Execute one instruction and read the new top frame
    async fn single_step(&mut self) -> DebugResult<StackFrame> {
        let channel = self.channel()?.clone();
        self.session.invalidate_frames().await;
        self.session.clear_bits(status_bits::HIT_BREAKPOINT);

        channel.command(CommandPacket::new(opcodes::SINGLE_STEP)).await?;
        self.wait_stop().await?;
        self.read_stack_frame(0).await
    }

    /// Poll until the stop bit is set, bounded by the response timeout
    async fn wait_stop(&self) -> DebugResult<()> {
        let deadline = Instant::now() + self.config.response_timeout();

        loop {
            if self.session.status().is_stopped() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(DebuggerError::Timeout {
                    opcode: opcodes::READ_STATUS,
                    timeout_ms: self.config.response_timeout_ms,
                });
            }

            tokio::time::sleep(self.config.stop_poll_interval()).await;

            let channel = self.channel()?;
            let permit = channel.gate().acquire().await?;
            refresh_status(channel, &permit, &self.session, self.event_sender()).await?;
        }
    }
}
