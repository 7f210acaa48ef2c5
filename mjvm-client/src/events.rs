// Debugger notifications
//
// Delivered over a channel instead of callbacks. Each status transition
// produces at most one event, sent before the next poll is issued.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{error, warn};

/// Events are small and rare; this only fills if nobody is listening
const EVENT_CHANNEL_SIZE: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum DebuggerEvent {
    BreakpointHit,
    ConnectionError { message: String },
    ConnectionClosed,
}

/// Sending half kept by the debugger and its background tasks
#[derive(Debug, Clone)]
pub(crate) struct EventSender {
    tx: mpsc::Sender<DebuggerEvent>,
}

impl EventSender {
    pub(crate) fn emit(&self, event: DebuggerEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                error!("Event channel full, dropping {:?}", event);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("Event receiver dropped, future events will be discarded");
            }
        }
    }
}

/// Receiving half; clones share the same queue
#[derive(Debug, Clone)]
pub struct EventStream {
    rx: Arc<Mutex<mpsc::Receiver<DebuggerEvent>>>,
}

impl EventStream {
    /// Wait for the next event
    pub async fn recv(&self) -> Option<DebuggerEvent> {
        self.rx.lock().await.recv().await
    }

    /// Take an event if one is queued
    pub async fn try_recv(&self) -> Option<DebuggerEvent> {
        self.rx.lock().await.try_recv().ok()
    }
}

pub(crate) fn event_channel() -> (EventSender, EventStream) {
    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
    (
        EventSender { tx },
        EventStream {
            rx: Arc::new(Mutex::new(rx)),
        },
    )
}
