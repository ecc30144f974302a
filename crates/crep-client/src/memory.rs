//! In-process connection for tests and embedding.
//!
//! [`MemoryConnection`] plays the transport: the test drives connection
//! state with `connect`/`disconnect`, injects server events with
//! [`MemoryConnection::deliver`], and inspects what the client sent.

use std::sync::RwLock;

use tokio::sync::{broadcast, watch};
use tracing::{debug, info};

use crep_protocol::{ClientMessage, DeviceInfo, ServerMessage};

use crate::connection::{ConnectionClient, ConnectionEvent, ConnectionState};
use crate::error::{ClientError, ClientResult};

const DEFAULT_CAPACITY: usize = 256;

/// An in-memory [`ConnectionClient`].
///
/// Messages sent while disconnected are refused with
/// [`ClientError::NotConnected`], as a real socket would drop them.
pub struct MemoryConnection {
    events: broadcast::Sender<ConnectionEvent>,
    state: RwLock<ConnectionState>,
    sent: watch::Sender<Vec<ClientMessage>>,
    device: DeviceInfo,
}

impl MemoryConnection {
    /// Create a disconnected connection with the default event buffer.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a disconnected connection whose event stream buffers up to
    /// `capacity` events per receiver.
    pub fn with_capacity(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        let (sent, _) = watch::channel(Vec::new());
        Self {
            events,
            state: RwLock::new(ConnectionState::disconnected()),
            sent,
            device: DeviceInfo::default(),
        }
    }

    /// The device info reported in the connected state.
    pub fn with_device(mut self, device: DeviceInfo) -> Self {
        self.device = device;
        self
    }

    /// Inject an event as if the server had sent it.
    pub fn deliver(&self, message: ServerMessage) {
        debug!(event = message.name(), "delivering server event");
        // No receivers simply means nobody is listening yet.
        let _ = self.events.send(ConnectionEvent::Message(message));
    }

    /// Every message sent so far, oldest first.
    pub fn sent(&self) -> Vec<ClientMessage> {
        self.sent.borrow().clone()
    }

    /// Return and forget every message sent so far.
    pub fn take_sent(&self) -> Vec<ClientMessage> {
        let mut taken = Vec::new();
        self.sent.send_modify(|sent| taken = std::mem::take(sent));
        taken
    }

    /// Wait until at least `count` messages have been sent (counting from
    /// the last [`MemoryConnection::take_sent`]) and return them all.
    pub async fn wait_for_sent(&self, count: usize) -> Vec<ClientMessage> {
        let mut rx = self.sent.subscribe();
        let sent = rx
            .wait_for(|sent| sent.len() >= count)
            .await
            .map(|sent| sent.clone());
        // The sender lives in `self`, so it cannot have been dropped.
        sent.unwrap_or_else(|_| self.sent())
    }

    fn set_state(&self, state: ConnectionState) {
        match self.state.write() {
            Ok(mut guard) => *guard = state.clone(),
            Err(poisoned) => *poisoned.into_inner() = state.clone(),
        }
        let _ = self.events.send(ConnectionEvent::State(state));
    }
}

impl Default for MemoryConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionClient for MemoryConnection {
    fn state(&self) -> ConnectionState {
        match self.state.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    fn send(&self, message: ClientMessage) -> ClientResult<()> {
        if !self.is_connected() {
            return Err(ClientError::NotConnected);
        }
        debug!(event = message.name(), "sent client event");
        self.sent.send_modify(|sent| sent.push(message));
        Ok(())
    }

    fn connect(&self) {
        if self.is_connected() {
            return;
        }
        info!("memory connection up");
        self.set_state(ConnectionState::connected(self.device.clone()));
    }

    fn disconnect(&self) {
        if !self.is_connected() {
            return;
        }
        info!("memory connection down");
        self.set_state(ConnectionState::disconnected());
    }
}
