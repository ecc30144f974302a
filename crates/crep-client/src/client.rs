use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crep_protocol::{
    AddAtomsEvent, BranchActionEvent, BranchInfoEvent, ClientMessage, CommitEvent, DeviceInfo,
    ServerMessage,
};
use crep_store::CausalRepoCommit;
use crep_types::ObjectId;
use crep_weave::Atom;

use crate::config::ClientConfig;
use crate::connection::{ConnectionClient, ConnectionEvent, ConnectionState};
use crate::error::{ClientError, ClientResult};
use crate::pending::PendingAtoms;
use crate::subscription::{spawn_watch, Subscription, Watch};

/// An item from a branch watch.
#[derive(Clone, Debug, PartialEq)]
pub enum BranchUpdate {
    /// Atoms added to (and hashes removed from) the branch.
    Atoms {
        atoms: Vec<Atom>,
        removed_atoms: Vec<ObjectId>,
    },
    /// A device-to-device action routed through the branch.
    Event { action: Value },
    /// `skipped` server events were lost because the subscriber fell
    /// behind. The branch has been watched again, so the server replays
    /// its atoms; local state built from earlier updates may be stale.
    Resync { skipped: u64 },
}

/// An item from [`CausalRepoClient::watch_branches`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BranchesUpdate {
    Loaded(String),
    Unloaded(String),
}

/// An item from [`CausalRepoClient::watch_devices`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeviceUpdate {
    Connected { branch: String, device: DeviceInfo },
    Disconnected { branch: String, device: DeviceInfo },
}

type PendingMap = Arc<Mutex<HashMap<String, PendingAtoms>>>;

/// The repository protocol over a [`ConnectionClient`].
///
/// Cloning is cheap; clones share the connection and the pending-atoms
/// bookkeeping. Watch methods spawn a task and so must be called inside a
/// Tokio runtime.
pub struct CausalRepoClient<C> {
    connection: Arc<C>,
    config: ClientConfig,
    pending: PendingMap,
    forced_offline: Arc<AtomicBool>,
}

impl<C> Clone for CausalRepoClient<C> {
    fn clone(&self) -> Self {
        Self {
            connection: self.connection.clone(),
            config: self.config.clone(),
            pending: self.pending.clone(),
            forced_offline: self.forced_offline.clone(),
        }
    }
}

impl<C: ConnectionClient> CausalRepoClient<C> {
    pub fn new(connection: Arc<C>) -> Self {
        Self::with_config(connection, ClientConfig::default())
    }

    pub fn with_config(connection: Arc<C>, config: ClientConfig) -> Self {
        Self {
            connection,
            config,
            pending: Arc::default(),
            forced_offline: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn connection(&self) -> &Arc<C> {
        &self.connection
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Watch a branch.
    ///
    /// On every transition to connected the task sends `repo/watch_branch`
    /// followed by everything still pending for the branch. Atoms and
    /// actions for the branch are forwarded in delivery order, and
    /// acknowledgements clear the pending set. If events are lost to a slow
    /// subscriber the watch is re-sent and [`BranchUpdate::Resync`] is
    /// yielded in their place.
    pub fn watch_branch(&self, branch: &str) -> Subscription<BranchUpdate> {
        info!(branch, "watching branch");
        let on_connected = {
            let branch = branch.to_string();
            let pending = self.pending.clone();
            let batch_size = self.config.resend_batch_size;
            move || {
                let mut messages = vec![ClientMessage::WatchBranch(branch.clone())];
                let resend = match pending.lock() {
                    Ok(map) => map
                        .get(&branch)
                        .map(|p| p.resend_events(&branch, batch_size))
                        .unwrap_or_default(),
                    Err(_) => {
                        warn!(branch = %branch, "pending atoms lock poisoned; skipping resend");
                        Vec::new()
                    }
                };
                if !resend.is_empty() {
                    debug!(branch = %branch, messages = resend.len(), "re-sending pending atoms");
                }
                messages.extend(resend.into_iter().map(ClientMessage::AddAtoms));
                messages
            }
        };
        let on_message = {
            let branch = branch.to_string();
            let pending = self.pending.clone();
            move |message: ServerMessage| match message {
                ServerMessage::AddAtoms(event) if event.branch == branch => {
                    Some(BranchUpdate::Atoms {
                        atoms: event.atoms.unwrap_or_default(),
                        removed_atoms: event.removed_atoms.unwrap_or_default(),
                    })
                }
                ServerMessage::AtomsReceived(event) if event.branch == branch => {
                    match pending.lock() {
                        Ok(mut map) => {
                            if let Some(p) = map.get_mut(&branch) {
                                let acked = p.acknowledge(&event.hashes);
                                debug!(branch = %branch, acked, remaining = p.len(), "atoms acknowledged");
                            }
                        }
                        Err(_) => warn!(branch = %branch, "pending atoms lock poisoned; ack dropped"),
                    }
                    None
                }
                ServerMessage::ReceiveEvent(event) if event.branch == branch => {
                    Some(BranchUpdate::Event {
                        action: event.action,
                    })
                }
                _ => None,
            }
        };
        self.spawn(Watch {
            label: format!("branch:{branch}"),
            on_connected: Box::new(on_connected),
            on_message: Box::new(on_message),
            on_resync: Some(Box::new(|skipped: u64| BranchUpdate::Resync { skipped })),
            unwatch: Some(ClientMessage::UnwatchBranch(branch.to_string())),
        })
    }

    /// Send atoms (and removals) to a branch.
    ///
    /// Everything is recorded as pending before anything is sent. While
    /// offline nothing is sent; a branch watch re-sends it on reconnect.
    ///
    /// Acknowledgements are only read by a live [`watch_branch`] for the
    /// same branch. Atoms acknowledged while no watch is running stay
    /// pending and are sent again by the next watch, which the server
    /// treats as a no-op. Delivery is at least once.
    ///
    /// [`watch_branch`]: CausalRepoClient::watch_branch
    pub fn add_atoms(
        &self,
        branch: &str,
        atoms: Vec<Atom>,
        removed_atoms: Vec<ObjectId>,
    ) -> ClientResult<()> {
        if atoms.is_empty() && removed_atoms.is_empty() {
            return Ok(());
        }
        {
            let mut map = self.lock_pending()?;
            let pending = map.entry(branch.to_string()).or_default();
            for atom in &atoms {
                pending.record_added(atom.clone());
            }
            for hash in &removed_atoms {
                pending.record_removed(*hash);
            }
        }

        let mut event = AddAtomsEvent::new(branch);
        if !atoms.is_empty() {
            event = event.with_atoms(atoms);
        }
        if !removed_atoms.is_empty() {
            event = event.with_removed(removed_atoms);
        }
        self.send_if_connected(ClientMessage::AddAtoms(event))
    }

    /// How many atoms and removals for `branch` await acknowledgement.
    pub fn pending_count(&self, branch: &str) -> usize {
        self.lock_pending()
            .map(|map| map.get(branch).map_or(0, PendingAtoms::len))
            .unwrap_or(0)
    }

    /// Route an arbitrary action to the other devices on a branch.
    pub fn send_event(&self, branch: &str, action: Value) -> ClientResult<()> {
        self.connection
            .send(ClientMessage::SendEvent(BranchActionEvent {
                branch: branch.to_string(),
                action,
            }))
    }

    /// Watch branches being loaded and unloaded on the server.
    pub fn watch_branches(&self) -> Subscription<BranchesUpdate> {
        info!("watching branches");
        self.spawn(Watch {
            label: "branches".to_string(),
            on_connected: Box::new(|| vec![ClientMessage::WatchBranches]),
            on_message: Box::new(|message: ServerMessage| match message {
                ServerMessage::LoadBranch(e) => Some(BranchesUpdate::Loaded(e.branch)),
                ServerMessage::UnloadBranch(e) => Some(BranchesUpdate::Unloaded(e.branch)),
                _ => None,
            }),
            on_resync: None,
            unwatch: Some(ClientMessage::UnwatchBranches),
        })
    }

    /// Watch devices connecting to and disconnecting from branches.
    pub fn watch_devices(&self) -> Subscription<DeviceUpdate> {
        info!("watching devices");
        self.spawn(Watch {
            label: "devices".to_string(),
            on_connected: Box::new(|| vec![ClientMessage::WatchDevices]),
            on_message: Box::new(|message: ServerMessage| match message {
                ServerMessage::DeviceConnectedToBranch(e) => Some(DeviceUpdate::Connected {
                    branch: e.branch,
                    device: e.device,
                }),
                ServerMessage::DeviceDisconnectedFromBranch(e) => {
                    Some(DeviceUpdate::Disconnected {
                        branch: e.branch,
                        device: e.device,
                    })
                }
                _ => None,
            }),
            on_resync: None,
            unwatch: Some(ClientMessage::UnwatchDevices),
        })
    }

    /// Watch commits appended to a branch.
    pub fn watch_commits(&self, branch: &str) -> Subscription<Vec<CausalRepoCommit>> {
        info!(branch, "watching commits");
        let watched = branch.to_string();
        let on_connected = {
            let branch = branch.to_string();
            move || vec![ClientMessage::WatchCommits(branch.clone())]
        };
        self.spawn(Watch {
            label: format!("commits:{branch}"),
            on_connected: Box::new(on_connected),
            on_message: Box::new(move |message: ServerMessage| match message {
                ServerMessage::AddCommits(e) if e.branch == watched => Some(e.commits),
                _ => None,
            }),
            on_resync: None,
            unwatch: Some(ClientMessage::UnwatchCommits(branch.to_string())),
        })
    }

    /// Ask whether a branch exists. Waits for the connection, then resolves
    /// with the first reply for this branch.
    pub async fn branch_info(&self, branch: &str) -> ClientResult<BranchInfoEvent> {
        self.request(ClientMessage::BranchInfo(branch.to_string()), |message| {
            match message {
                ServerMessage::BranchInfo(info) if info.branch == branch => Some(info),
                _ => None,
            }
        })
        .await
    }

    /// List the server's branches. Waits for the connection, then resolves
    /// with the first reply.
    pub async fn branches(&self) -> ClientResult<Vec<String>> {
        self.request(ClientMessage::Branches, |message| match message {
            ServerMessage::Branches(e) => Some(e.branches),
            _ => None,
        })
        .await
    }

    /// Ask the server to commit a branch's current state. Waits for the
    /// connection; no reply is expected.
    pub async fn commit(&self, branch: &str, message: &str) -> ClientResult<()> {
        let mut events = self.connection.events();
        self.send_when_connected(
            &mut events,
            ClientMessage::Commit(CommitEvent {
                branch: branch.to_string(),
                message: message.to_string(),
            }),
        )
        .await
    }

    /// Take the connection down (or bring it back) without touching any
    /// subscription or pending state.
    pub fn set_forced_offline(&self, offline: bool) {
        self.forced_offline.store(offline, Ordering::SeqCst);
        if offline {
            info!("forcing connection offline");
            self.connection.disconnect();
        } else {
            info!("releasing forced offline");
            self.connection.connect();
        }
    }

    pub fn is_forced_offline(&self) -> bool {
        self.forced_offline.load(Ordering::SeqCst)
    }

    fn spawn<T: Send + 'static>(&self, watch: Watch<T>) -> Subscription<T> {
        spawn_watch(
            self.connection.clone(),
            self.config.subscription_buffer,
            watch,
        )
    }

    fn lock_pending(&self) -> ClientResult<MutexGuard<'_, HashMap<String, PendingAtoms>>> {
        self.pending
            .lock()
            .map_err(|_| ClientError::LockPoisoned("pending atoms".into()))
    }

    fn send_if_connected(&self, message: ClientMessage) -> ClientResult<()> {
        if !self.connection.is_connected() {
            debug!(event = message.name(), "offline; deferring to reconnect");
            return Ok(());
        }
        match self.connection.send(message) {
            Err(ClientError::NotConnected) => {
                debug!("connection dropped during send; deferring to reconnect");
                Ok(())
            }
            other => other,
        }
    }

    async fn request<T>(
        &self,
        message: ClientMessage,
        mut matches: impl FnMut(ServerMessage) -> Option<T>,
    ) -> ClientResult<T> {
        let mut events = self.connection.events();
        self.send_when_connected(&mut events, message).await?;
        loop {
            match events.recv().await {
                Ok(ConnectionEvent::Message(message)) => {
                    if let Some(reply) = matches(message) {
                        return Ok(reply);
                    }
                }
                Ok(ConnectionEvent::State(_)) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event stream lagged while awaiting reply");
                }
                Err(RecvError::Closed) => return Err(ClientError::ConnectionClosed),
            }
        }
    }

    async fn send_when_connected(
        &self,
        events: &mut broadcast::Receiver<ConnectionEvent>,
        message: ClientMessage,
    ) -> ClientResult<()> {
        loop {
            wait_connected(self.connection.as_ref(), events).await?;
            match self.connection.send(message.clone()) {
                Err(ClientError::NotConnected) => continue,
                other => return other,
            }
        }
    }
}

async fn wait_connected<C: ConnectionClient>(
    connection: &C,
    events: &mut broadcast::Receiver<ConnectionEvent>,
) -> ClientResult<()> {
    if connection.is_connected() {
        return Ok(());
    }
    loop {
        match events.recv().await {
            Ok(ConnectionEvent::State(state)) if state.connected => return Ok(()),
            Ok(_) => {}
            Err(RecvError::Lagged(_)) => {
                if connection.is_connected() {
                    return Ok(());
                }
            }
            Err(RecvError::Closed) => return Err(ClientError::ConnectionClosed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryConnection;
    use crep_types::{AtomId, SiteId};
    use serde_json::json;

    fn atom(timestamp: u64) -> Atom {
        let id = AtomId::new(SiteId::new("a").unwrap(), timestamp, 0);
        Atom::new(id, None, json!(timestamp)).unwrap()
    }

    #[test]
    fn add_atoms_offline_only_records() {
        let conn = Arc::new(MemoryConnection::new());
        let client = CausalRepoClient::new(conn.clone());
        client.add_atoms("b", vec![atom(1), atom(2)], vec![]).unwrap();
        assert_eq!(client.pending_count("b"), 2);
        assert!(conn.sent().is_empty());
    }

    #[test]
    fn add_atoms_online_sends_one_message() {
        let conn = Arc::new(MemoryConnection::new());
        conn.connect();
        let client = CausalRepoClient::new(conn.clone());
        let a1 = atom(1);
        let removed = ObjectId::from_bytes(b"gone");
        client.add_atoms("b", vec![a1.clone()], vec![removed]).unwrap();
        assert_eq!(
            conn.sent(),
            vec![ClientMessage::AddAtoms(
                AddAtomsEvent::new("b")
                    .with_atoms(vec![a1])
                    .with_removed(vec![removed])
            )]
        );
        assert_eq!(client.pending_count("b"), 2);
    }

    #[test]
    fn empty_add_is_a_no_op() {
        let conn = Arc::new(MemoryConnection::new());
        conn.connect();
        let client = CausalRepoClient::new(conn.clone());
        client.add_atoms("b", vec![], vec![]).unwrap();
        assert!(conn.sent().is_empty());
        assert_eq!(client.pending_count("b"), 0);
    }

    #[test]
    fn send_event_requires_connection() {
        let conn = Arc::new(MemoryConnection::new());
        let client = CausalRepoClient::new(conn.clone());
        assert!(matches!(
            client.send_event("b", json!({"k": 1})),
            Err(ClientError::NotConnected)
        ));
        conn.connect();
        client.send_event("b", json!({"k": 1})).unwrap();
        assert_eq!(conn.sent()[0].name(), crep_protocol::events::SEND_EVENT);
    }

    #[test]
    fn forced_offline_toggles_connection() {
        let conn = Arc::new(MemoryConnection::new());
        conn.connect();
        let client = CausalRepoClient::new(conn.clone());
        client.set_forced_offline(true);
        assert!(client.is_forced_offline());
        assert!(!client.connection_state().connected);
        client.set_forced_offline(false);
        assert!(!client.is_forced_offline());
        assert!(client.connection_state().connected);
    }
}
