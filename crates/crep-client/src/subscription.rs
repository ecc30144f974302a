//! Watch tasks and the subscriptions that own them.
//!
//! A watch is "send on (re)connect, forward matching events, send a final
//! message on dispose". Each one runs as a spawned task over its own
//! receiver of the connection's event stream, so it sees state changes and
//! messages in exactly the order the transport delivered them.
//!
//! If a task falls so far behind that its receiver overflows, it re-sends
//! its watch messages and, where the watch supports it, hands the
//! subscriber a resync item in place of the lost events.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crep_protocol::{ClientMessage, ServerMessage};

use crate::connection::{ConnectionClient, ConnectionEvent};

type OnConnected = Box<dyn FnMut() -> Vec<ClientMessage> + Send>;
type OnMessage<T> = Box<dyn FnMut(ServerMessage) -> Option<T> + Send>;
type OnResync<T> = Box<dyn FnMut(u64) -> T + Send>;

/// What a watch task does. Built by the client for each kind of watch.
pub(crate) struct Watch<T> {
    /// Name used in log lines.
    pub label: String,
    /// Messages to send each time the connection comes up.
    pub on_connected: OnConnected,
    /// Map an inbound message to an output item, or `None` to skip it.
    pub on_message: OnMessage<T>,
    /// Item telling the subscriber that `n` events were skipped, if the
    /// watch has one.
    pub on_resync: Option<OnResync<T>>,
    /// Sent when the subscription is dropped, if connected.
    pub unwatch: Option<ClientMessage>,
}

/// A live watch. Items arrive through [`Subscription::recv`].
///
/// Dropping the subscription stops its task and, if the connection is up,
/// sends the matching unwatch message. Must be created inside a Tokio
/// runtime.
pub struct Subscription<T> {
    rx: mpsc::Receiver<T>,
    task: JoinHandle<()>,
    on_drop: Option<Box<dyn FnOnce() + Send>>,
}

impl<T> Subscription<T> {
    /// The next item, or `None` once the connection's event stream closed.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// The next item if one is already buffered.
    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Stop watching. Equivalent to dropping the subscription.
    pub fn unsubscribe(self) {}
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.task.abort();
        if let Some(on_drop) = self.on_drop.take() {
            on_drop();
        }
    }
}

impl<T> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("finished", &self.task.is_finished())
            .finish()
    }
}

/// Start a watch task.
pub(crate) fn spawn_watch<C, T>(connection: Arc<C>, buffer: usize, watch: Watch<T>) -> Subscription<T>
where
    C: ConnectionClient,
    T: Send + 'static,
{
    // Subscribe before spawning so no transition between now and the
    // task's first poll is missed.
    let events = connection.events();
    let (tx, rx) = mpsc::channel(buffer.max(1));
    let Watch {
        label,
        on_connected,
        on_message,
        on_resync,
        unwatch,
    } = watch;

    let task = tokio::spawn(run_watch(
        connection.clone(),
        events,
        label.clone(),
        on_connected,
        on_message,
        on_resync,
        tx,
    ));

    let on_drop: Option<Box<dyn FnOnce() + Send>> = unwatch.map(|message| {
        Box::new(move || {
            if !connection.is_connected() {
                return;
            }
            info!(watch = %label, "unwatching");
            if let Err(e) = connection.send(message) {
                debug!(watch = %label, error = %e, "unwatch not sent");
            }
        }) as Box<dyn FnOnce() + Send>
    });

    Subscription { rx, task, on_drop }
}

async fn run_watch<C, T>(
    connection: Arc<C>,
    mut events: broadcast::Receiver<ConnectionEvent>,
    label: String,
    mut on_connected: OnConnected,
    mut on_message: OnMessage<T>,
    mut on_resync: Option<OnResync<T>>,
    tx: mpsc::Sender<T>,
) where
    C: ConnectionClient,
{
    let mut connected = connection.is_connected();
    if connected {
        send_all(connection.as_ref(), on_connected(), &label);
    }

    loop {
        let event = tokio::select! {
            _ = tx.closed() => break,
            event = events.recv() => event,
        };
        match event {
            Ok(ConnectionEvent::State(state)) => {
                if state.connected && !connected {
                    info!(watch = %label, "connected; sending watch");
                    send_all(connection.as_ref(), on_connected(), &label);
                }
                connected = state.connected;
            }
            Ok(ConnectionEvent::Message(message)) => {
                if let Some(item) = on_message(message) {
                    if tx.send(item).await.is_err() {
                        break;
                    }
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                // Skipped events may include state changes and acks. Take the
                // state from the connection and watch again so the server
                // replays what was missed.
                warn!(watch = %label, skipped, "event stream lagged; resyncing");
                connected = connection.is_connected();
                if connected {
                    send_all(connection.as_ref(), on_connected(), &label);
                }
                if let Some(on_resync) = on_resync.as_mut() {
                    if tx.send(on_resync(skipped)).await.is_err() {
                        break;
                    }
                }
            }
            Err(RecvError::Closed) => break,
        }
    }
    debug!(watch = %label, "watch task finished");
}

fn send_all<C: ConnectionClient>(connection: &C, messages: Vec<ClientMessage>, label: &str) {
    for message in messages {
        let name = message.name();
        if let Err(e) = connection.send(message) {
            // Whatever was not sent goes out again on the next connect.
            debug!(watch = %label, event = name, error = %e, "send failed");
            return;
        }
    }
}
