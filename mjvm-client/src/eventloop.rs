// MJVM event loop
//
// Replies carry no correlation id: the gate keeps one command in flight and
// the reader task hands whatever arrives to the single pending waiter.
// A second task polls READ_STATUS and turns status transitions into events.

use crate::commands::opcodes;
use crate::connection::SessionState;
use crate::events::{DebuggerEvent, EventSender};
use crate::gate::{Gate, GatePermit};
use crate::protocol::{CommandPacket, DebugResult, DebuggerError, ReplyPacket};
use crate::types::{DeviceStatus, StatusChange};
use bytes::BytesMut;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Replies are a few dozen bytes; a stack frame with long names is the largest
const READ_BUFFER_SIZE: usize = 1024;

/// Write side of the connection plus the slot for the one awaited reply
#[derive(Debug)]
pub(crate) struct Channel {
    gate: Gate,
    writer: Mutex<OwnedWriteHalf>,
    pending: Mutex<Option<oneshot::Sender<Vec<u8>>>>,
    response_timeout: Duration,
    connected: AtomicBool,
}

impl Channel {
    pub(crate) fn new(writer: OwnedWriteHalf, response_timeout: Duration) -> Self {
        Self {
            gate: Gate::exclusive(),
            writer: Mutex::new(writer),
            pending: Mutex::new(None),
            response_timeout,
            connected: AtomicBool::new(true),
        }
    }

    pub(crate) fn gate(&self) -> &Gate {
        &self.gate
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Send raw bytes and wait for the reply
    pub(crate) async fn send(&self, request: &[u8]) -> DebugResult<Vec<u8>> {
        let permit = self.gate.acquire().await?;
        self.exchange(&permit, request).await
    }

    /// Send a command and validate the reply against its opcode
    pub(crate) async fn command(&self, packet: CommandPacket) -> DebugResult<ReplyPacket> {
        let permit = self.gate.acquire().await?;
        self.command_with(&permit, packet).await
    }

    pub(crate) async fn command_with(
        &self,
        permit: &GatePermit,
        packet: CommandPacket,
    ) -> DebugResult<ReplyPacket> {
        let raw = self.exchange(permit, &packet.encode()).await?;
        let reply = ReplyPacket::decode(&raw)?;
        reply.check(packet.opcode)?;
        Ok(reply)
    }

    /// One write and one reply. Holding the permit is what makes the
    /// pending slot unambiguous.
    async fn exchange(&self, _permit: &GatePermit, request: &[u8]) -> DebugResult<Vec<u8>> {
        if !self.is_connected() {
            return Err(DebuggerError::ConnectionClosed);
        }
        let opcode = request.first().copied().unwrap_or_default();
        let (reply_tx, reply_rx) = oneshot::channel();
        *self.pending.lock().await = Some(reply_tx);

        debug!("Sending {} ({} bytes)", opcodes::name(opcode), request.len());
        if let Err(e) = self.write(request).await {
            error!("Failed to write {}: {}", opcodes::name(opcode), e);
            self.pending.lock().await.take();
            return Err(DebuggerError::Io(e));
        }

        match tokio::time::timeout(self.response_timeout, reply_rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(DebuggerError::ConnectionClosed),
            Err(_) => {
                self.pending.lock().await.take();
                warn!(
                    "No reply to {} within {:?}",
                    opcodes::name(opcode),
                    self.response_timeout
                );
                Err(DebuggerError::Timeout {
                    opcode,
                    timeout_ms: self.response_timeout.as_millis() as u64,
                })
            }
        }
    }

    async fn write(&self, request: &[u8]) -> std::io::Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(request).await?;
        writer.flush().await
    }

    /// Hand a received chunk to the waiting command
    async fn deliver(&self, reply: Vec<u8>) {
        match self.pending.lock().await.take() {
            Some(tx) => {
                tx.send(reply).ok();
            }
            None => warn!("Dropping {} unexpected bytes from device", reply.len()),
        }
    }

    /// Mark the channel closed and fail every waiter. Returns false if it
    /// was already closed.
    pub(crate) async fn mark_closed(&self) -> bool {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return false;
        }
        self.gate.close();
        self.pending.lock().await.take();
        true
    }

    /// Close from our side. Returns false if the device had already gone.
    pub(crate) async fn shutdown(&self) -> bool {
        let was_open = self.mark_closed().await;
        if let Err(e) = self.writer.lock().await.shutdown().await {
            debug!("Shutdown of write half failed: {}", e);
        }
        was_open
    }
}

/// Background tasks belonging to one connection
#[derive(Debug)]
pub(crate) struct EventLoopHandle {
    reader_task: JoinHandle<()>,
    poll_task: JoinHandle<()>,
}

impl EventLoopHandle {
    pub(crate) fn shutdown(&self) {
        self.poll_task.abort();
        self.reader_task.abort();
    }
}

impl Drop for EventLoopHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Start the reader and status-poll tasks
pub(crate) fn spawn_event_loop(
    reader: OwnedReadHalf,
    channel: Arc<Channel>,
    session: Arc<SessionState>,
    events: EventSender,
    poll_interval: Duration,
) -> EventLoopHandle {
    let reader_task = tokio::spawn(reader_loop(reader, channel.clone(), events.clone()));
    let poll_task = tokio::spawn(status_poll_loop(channel, session, events, poll_interval));
    EventLoopHandle {
        reader_task,
        poll_task,
    }
}

async fn reader_loop(mut reader: OwnedReadHalf, channel: Arc<Channel>, events: EventSender) {
    info!("Event loop started");
    let mut buf = BytesMut::with_capacity(READ_BUFFER_SIZE);

    loop {
        buf.reserve(READ_BUFFER_SIZE);
        match reader.read_buf(&mut buf).await {
            Ok(0) => {
                info!("Device closed the connection");
                break;
            }
            Ok(n) => {
                debug!("Received {} bytes", n);
                let reply = buf.split().to_vec();
                channel.deliver(reply).await;
            }
            Err(e) => {
                error!("Failed to read from device: {}", e);
                if channel.is_connected() {
                    events.emit(DebuggerEvent::ConnectionError {
                        message: e.to_string(),
                    });
                }
                break;
            }
        }
    }

    if channel.mark_closed().await {
        events.emit(DebuggerEvent::ConnectionClosed);
    }
    info!("Event loop shutting down");
}

async fn status_poll_loop(
    channel: Arc<Channel>,
    session: Arc<SessionState>,
    events: EventSender,
    period: Duration,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        if !channel.is_connected() {
            break;
        }
        // Never queue behind a command in progress
        let Some(permit) = channel.gate().try_acquire() else {
            debug!("Command in flight, skipping status poll");
            continue;
        };
        match refresh_status(&channel, &permit, &session, &events).await {
            Ok(_) => {}
            Err(DebuggerError::ConnectionClosed) => break,
            Err(e) => debug!("Status poll failed: {}", e),
        }
    }
    debug!("Status poll stopped");
}

/// Read the device status and publish whatever changed. Events go out
/// before the permit is released, so before the next poll can start.
pub(crate) async fn refresh_status(
    channel: &Channel,
    permit: &GatePermit,
    session: &SessionState,
    events: &EventSender,
) -> DebugResult<DeviceStatus> {
    let reply = channel
        .command_with(permit, CommandPacket::new(opcodes::READ_STATUS))
        .await?;
    let bits = *reply
        .data()
        .first()
        .ok_or_else(|| DebuggerError::Protocol("Status reply has no payload".to_string()))?;

    let status = DeviceStatus(bits);
    let change: StatusChange = session.apply_status(status);
    if change.frames_stale {
        session.invalidate_frames().await;
    }
    if change.breakpoint_hit {
        info!("Breakpoint hit");
        events.emit(DebuggerEvent::BreakpointHit);
    }
    Ok(status)
}
