//! Local fan-out of decoded stream data as notification events.

use std::sync::{Arc, RwLock};

use tokio::sync::mpsc;
use tracing::debug;

use crate::entity::{Event, Frame};

/// Event kind carried by frames received on the live stream.
pub const SAMPLE_EVENT_KIND: &str = "sample";

/// Decoded data attached to a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Frame(Frame),
    Event(Event),
}

/// One notification delivered to every registered listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationEvent {
    pub kind: String,
    pub payload: Payload,
}

impl NotificationEvent {
    pub fn new(kind: impl Into<String>, payload: Payload) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }

    /// A live stream frame.
    pub fn sample(frame: Frame) -> Self {
        Self::new(SAMPLE_EVENT_KIND, Payload::Frame(frame))
    }

    pub fn frame(&self) -> Option<&Frame> {
        match &self.payload {
            Payload::Frame(frame) => Some(frame),
            Payload::Event(_) => None,
        }
    }
}

/// Receives notifications. Called synchronously on the dispatching task.
pub trait Listener: Send + Sync {
    fn on_event(&self, event: &NotificationEvent);
}

impl<F> Listener for F
where
    F: Fn(&NotificationEvent) + Send + Sync,
{
    fn on_event(&self, event: &NotificationEvent) {
        self(event)
    }
}

/// Listener that forwards every event into an unbounded channel.
pub struct ChannelListener {
    tx: mpsc::UnboundedSender<NotificationEvent>,
}

impl ChannelListener {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<NotificationEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Listener for ChannelListener {
    fn on_event(&self, event: &NotificationEvent) {
        if self.tx.send(event.clone()).is_err() {
            debug!(kind = %event.kind, "Channel listener receiver dropped");
        }
    }
}

/// Registry of listeners; dispatches each event to all of them in
/// registration order.
#[derive(Default, Clone)]
pub struct Notifier {
    listeners: Arc<RwLock<Vec<Arc<dyn Listener>>>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: impl Listener + 'static) {
        self.listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(Arc::new(listener));
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn notify(&self, event: &NotificationEvent) {
        // Snapshot so listeners may subscribe others while being called.
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        for listener in listeners {
            listener.on_event(event);
        }
    }
}
