// MJVM connection management
//
// Owns the TCP stream, the session state shared with the background tasks,
// and the breakpoints the device has acknowledged.

use crate::config::DebuggerConfig;
use crate::eventloop::{spawn_event_loop, Channel, EventLoopHandle};
use crate::events::{event_channel, DebuggerEvent, EventSender, EventStream};
use crate::line_info::{DebugLineInfo, LineResolver};
use crate::protocol::{DebugResult, DebuggerError};
use crate::types::{ConnectionState, DeviceStatus, StackFrame, StatusChange};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Status bitmask and frame cache, written by both the session and the poll task
#[derive(Debug)]
pub(crate) struct SessionState {
    status: AtomicU8,
    frames: Mutex<Option<Vec<StackFrame>>>,
}

impl SessionState {
    fn new() -> Self {
        Self {
            status: AtomicU8::new(DeviceStatus::INITIAL.bits()),
            frames: Mutex::new(None),
        }
    }

    pub(crate) fn status(&self) -> DeviceStatus {
        DeviceStatus(self.status.load(Ordering::SeqCst))
    }

    pub(crate) fn apply_status(&self, status: DeviceStatus) -> StatusChange {
        let old = DeviceStatus(self.status.swap(status.bits(), Ordering::SeqCst));
        StatusChange::between(old, status)
    }

    pub(crate) fn clear_bits(&self, bits: u8) {
        self.status.fetch_and(!bits, Ordering::SeqCst);
    }

    pub(crate) async fn frames(&self) -> Option<Vec<StackFrame>> {
        self.frames.lock().await.clone()
    }

    pub(crate) async fn top_frame(&self) -> Option<StackFrame> {
        self.frames
            .lock()
            .await
            .as_ref()
            .and_then(|frames| frames.first().cloned())
    }

    pub(crate) async fn store_frames(&self, frames: Vec<StackFrame>) {
        *self.frames.lock().await = Some(frames);
    }

    pub(crate) async fn invalidate_frames(&self) {
        if self.frames.lock().await.take().is_some() {
            debug!("Stack frame cache invalidated");
        }
    }

    async fn reset(&self) {
        self.status.store(DeviceStatus::INITIAL.bits(), Ordering::SeqCst);
        self.invalidate_frames().await;
    }
}

#[derive(Debug)]
struct Link {
    channel: Arc<Channel>,
    tasks: EventLoopHandle,
}

/// Debug session against one MJVM device
#[derive(Debug)]
pub struct MjvmDebugger {
    pub(crate) config: DebuggerConfig,
    pub(crate) resolver: LineResolver,
    link: Option<Link>,
    pub(crate) session: Arc<SessionState>,
    pub(crate) breakpoints: Vec<DebugLineInfo>,
    event_tx: EventSender,
    events: EventStream,
}

impl MjvmDebugger {
    pub fn new(config: DebuggerConfig, resolver: LineResolver) -> Self {
        let (event_tx, events) = event_channel();
        Self {
            config,
            resolver,
            link: None,
            session: Arc::new(SessionState::new()),
            breakpoints: Vec::new(),
            event_tx,
            events,
        }
    }

    /// Session whose resolver derives source paths from `config.source_root`
    pub fn from_config(config: DebuggerConfig) -> Self {
        let resolver = match &config.source_root {
            Some(root) => LineResolver::with_source_root(root),
            None => LineResolver::new(),
        };
        Self::new(config, resolver)
    }

    /// Connect to the configured device. An existing connection is closed first.
    pub async fn connect(&mut self) -> DebugResult<()> {
        self.disconnect().await;

        let host = self.config.host.clone();
        let port = self.config.port;
        info!("Connecting to MJVM device at {}:{}", host, port);

        let stream = TcpStream::connect((host.as_str(), port)).await?;
        stream.set_nodelay(true)?;

        self.session.reset().await;
        self.breakpoints.clear();

        let (reader, writer) = stream.into_split();
        let channel = Arc::new(Channel::new(writer, self.config.response_timeout()));
        let tasks = spawn_event_loop(
            reader,
            channel.clone(),
            self.session.clone(),
            self.event_tx.clone(),
            self.config.status_poll_interval(),
        );
        self.link = Some(Link { channel, tasks });

        info!("Connected to MJVM device");
        Ok(())
    }

    /// Stop polling and close the stream. Safe to call when not connected.
    pub async fn disconnect(&mut self) {
        let Some(link) = self.link.take() else {
            return;
        };
        link.tasks.shutdown();
        if link.channel.shutdown().await {
            self.event_tx.emit(DebuggerEvent::ConnectionClosed);
        }

        self.session.reset().await;
        self.breakpoints.clear();
        info!("Disconnected from MJVM device");
    }

    pub fn is_connected(&self) -> bool {
        self.link
            .as_ref()
            .is_some_and(|link| link.channel.is_connected())
    }

    pub fn state(&self) -> ConnectionState {
        if self.is_connected() {
            ConnectionState::from_status(self.session.status())
        } else {
            ConnectionState::Disconnected
        }
    }

    /// Last status reported by the device
    pub fn status(&self) -> DeviceStatus {
        self.session.status()
    }

    /// Breakpoints currently installed on the device
    pub fn breakpoints(&self) -> &[DebugLineInfo] {
        &self.breakpoints
    }

    pub fn config(&self) -> &DebuggerConfig {
        &self.config
    }

    pub fn resolver(&self) -> &LineResolver {
        &self.resolver
    }

    pub fn resolver_mut(&mut self) -> &mut LineResolver {
        &mut self.resolver
    }

    /// Send raw command bytes and return the raw reply
    pub async fn send_command(&self, request: &[u8]) -> DebugResult<Vec<u8>> {
        self.channel()?.send(request).await
    }

    pub fn events(&self) -> EventStream {
        self.events.clone()
    }

    pub async fn recv_event(&self) -> Option<DebuggerEvent> {
        self.events.recv().await
    }

    pub async fn try_recv_event(&self) -> Option<DebuggerEvent> {
        self.events.try_recv().await
    }

    pub(crate) fn channel(&self) -> DebugResult<&Arc<Channel>> {
        match &self.link {
            Some(link) if link.channel.is_connected() => Ok(&link.channel),
            _ => Err(DebuggerError::NotConnected),
        }
    }

    pub(crate) fn event_sender(&self) -> &EventSender {
        &self.event_tx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_new_session_is_disconnected() {
        let debugger = MjvmDebugger::new(DebuggerConfig::default(), LineResolver::new());
        assert_eq!(debugger.state(), ConnectionState::Disconnected);
        assert_eq!(debugger.status(), DeviceStatus::INITIAL);
        assert!(debugger.breakpoints().is_empty());
        assert!(matches!(
            debugger.send_command(&[0]).await,
            Err(DebuggerError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_disconnect_when_never_connected() {
        let mut debugger = MjvmDebugger::from_config(DebuggerConfig::default());
        debugger.disconnect().await;
        debugger.disconnect().await;
        assert_eq!(debugger.try_recv_event().await, None);
    }

    #[tokio::test]
    async fn test_session_state_transitions() {
        let session = SessionState::new();
        session
            .store_frames(vec![StackFrame {
                index: 0,
                pc: 3,
                class_name: "demo/Blink".to_string(),
                method_name: "main".to_string(),
                descriptor: "([Ljava/lang/String;)V".to_string(),
                source_path: "demo/Blink.java".to_string(),
                line: 5,
            }])
            .await;
        assert_eq!(session.top_frame().await.map(|f| f.pc), Some(3));

        let change = session.apply_status(DeviceStatus(0));
        assert!(change.stop_toggled);
        assert!(!session.status().is_stopped());

        session.clear_bits(crate::commands::status_bits::STOP);
        session.reset().await;
        assert_eq!(session.status(), DeviceStatus::INITIAL);
        assert!(session.frames().await.is_none());
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Bind then drop to get a port nobody listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let config = DebuggerConfig {
            port,
            ..DebuggerConfig::default()
        };
        let mut debugger = MjvmDebugger::from_config(config);
        assert!(matches!(debugger.connect().await, Err(DebuggerError::Io(_))));
        assert_eq!(debugger.state(), ConnectionState::Disconnected);
    }
}
