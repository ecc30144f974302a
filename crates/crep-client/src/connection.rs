use tokio::sync::broadcast;

use crep_protocol::{ClientMessage, DeviceInfo, ServerMessage};

use crate::error::ClientResult;

/// Whether the connection is up, and who the server says we are.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConnectionState {
    pub connected: bool,
    pub info: Option<DeviceInfo>,
}

impl ConnectionState {
    pub fn connected(info: DeviceInfo) -> Self {
        Self {
            connected: true,
            info: Some(info),
        }
    }

    pub fn disconnected() -> Self {
        Self::default()
    }
}

/// Everything a connection reports, in the order it happened.
///
/// State transitions and inbound messages share one stream so a listener
/// sees them interleaved exactly as the transport delivered them.
#[derive(Clone, Debug, PartialEq)]
pub enum ConnectionEvent {
    State(ConnectionState),
    Message(ServerMessage),
}

/// A bidirectional named-event connection to a repository server.
///
/// Implementations own the transport. Sending is fire-and-forget; replies
/// and acknowledgements arrive as [`ConnectionEvent::Message`]s on every
/// receiver handed out by [`ConnectionClient::events`].
pub trait ConnectionClient: Send + Sync + 'static {
    /// The current connection state.
    fn state(&self) -> ConnectionState;

    /// A new receiver for every event from this point on.
    fn events(&self) -> broadcast::Receiver<ConnectionEvent>;

    /// Send one event. Fails if the connection is down.
    fn send(&self, message: ClientMessage) -> ClientResult<()>;

    /// Bring the connection up.
    fn connect(&self);

    /// Take the connection down.
    fn disconnect(&self);

    fn is_connected(&self) -> bool {
        self.state().connected
    }
}
