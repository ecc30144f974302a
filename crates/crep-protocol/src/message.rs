use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crep_store::CausalRepoCommit;
use crep_types::ObjectId;
use crep_weave::Atom;

pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Event names as they appear on the wire.
pub mod events {
    pub const WATCH_BRANCH: &str = "repo/watch_branch";
    pub const UNWATCH_BRANCH: &str = "repo/unwatch_branch";
    pub const ADD_ATOMS: &str = "repo/add_atoms";
    pub const ATOMS_RECEIVED: &str = "repo/atoms_received";
    pub const SEND_EVENT: &str = "repo/send_event";
    pub const RECEIVE_EVENT: &str = "repo/receive_event";
    pub const WATCH_BRANCHES: &str = "repo/watch_branches";
    pub const UNWATCH_BRANCHES: &str = "repo/unwatch_branches";
    pub const LOAD_BRANCH: &str = "repo/load_branch";
    pub const UNLOAD_BRANCH: &str = "repo/unload_branch";
    pub const WATCH_DEVICES: &str = "repo/watch_devices";
    pub const UNWATCH_DEVICES: &str = "repo/unwatch_devices";
    pub const DEVICE_CONNECTED_TO_BRANCH: &str = "repo/device_connected_to_branch";
    pub const DEVICE_DISCONNECTED_FROM_BRANCH: &str = "repo/device_disconnected_from_branch";
    pub const BRANCH_INFO: &str = "repo/branch_info";
    pub const BRANCHES: &str = "repo/branches";
    pub const COMMIT: &str = "repo/commit";
    pub const WATCH_COMMITS: &str = "repo/watch_commits";
    pub const UNWATCH_COMMITS: &str = "repo/unwatch_commits";
    pub const ADD_COMMITS: &str = "repo/add_commits";
}

/// Events a client sends to the server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", content = "data")]
pub enum ClientMessage {
    #[serde(rename = "repo/watch_branch")]
    WatchBranch(String),
    #[serde(rename = "repo/unwatch_branch")]
    UnwatchBranch(String),
    #[serde(rename = "repo/add_atoms")]
    AddAtoms(AddAtomsEvent),
    #[serde(rename = "repo/send_event")]
    SendEvent(BranchActionEvent),
    #[serde(rename = "repo/watch_branches")]
    WatchBranches,
    #[serde(rename = "repo/unwatch_branches")]
    UnwatchBranches,
    #[serde(rename = "repo/watch_devices")]
    WatchDevices,
    #[serde(rename = "repo/unwatch_devices")]
    UnwatchDevices,
    #[serde(rename = "repo/branch_info")]
    BranchInfo(String),
    #[serde(rename = "repo/branches")]
    Branches,
    #[serde(rename = "repo/commit")]
    Commit(CommitEvent),
    #[serde(rename = "repo/watch_commits")]
    WatchCommits(String),
    #[serde(rename = "repo/unwatch_commits")]
    UnwatchCommits(String),
}

impl ClientMessage {
    pub fn name(&self) -> &'static str {
        match self {
            Self::WatchBranch(_) => events::WATCH_BRANCH,
            Self::UnwatchBranch(_) => events::UNWATCH_BRANCH,
            Self::AddAtoms(_) => events::ADD_ATOMS,
            Self::SendEvent(_) => events::SEND_EVENT,
            Self::WatchBranches => events::WATCH_BRANCHES,
            Self::UnwatchBranches => events::UNWATCH_BRANCHES,
            Self::WatchDevices => events::WATCH_DEVICES,
            Self::UnwatchDevices => events::UNWATCH_DEVICES,
            Self::BranchInfo(_) => events::BRANCH_INFO,
            Self::Branches => events::BRANCHES,
            Self::Commit(_) => events::COMMIT,
            Self::WatchCommits(_) => events::WATCH_COMMITS,
            Self::UnwatchCommits(_) => events::UNWATCH_COMMITS,
        }
    }

    /// Returns `true` if `name` is a client-to-server event.
    pub fn is_known(name: &str) -> bool {
        matches!(
            name,
            events::WATCH_BRANCH
                | events::UNWATCH_BRANCH
                | events::ADD_ATOMS
                | events::SEND_EVENT
                | events::WATCH_BRANCHES
                | events::UNWATCH_BRANCHES
                | events::WATCH_DEVICES
                | events::UNWATCH_DEVICES
                | events::BRANCH_INFO
                | events::BRANCHES
                | events::COMMIT
                | events::WATCH_COMMITS
                | events::UNWATCH_COMMITS
        )
    }
}

/// Events the server sends to a client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", content = "data")]
pub enum ServerMessage {
    #[serde(rename = "repo/add_atoms")]
    AddAtoms(AddAtomsEvent),
    #[serde(rename = "repo/atoms_received")]
    AtomsReceived(AtomsReceivedEvent),
    #[serde(rename = "repo/receive_event")]
    ReceiveEvent(BranchActionEvent),
    #[serde(rename = "repo/load_branch")]
    LoadBranch(BranchEvent),
    #[serde(rename = "repo/unload_branch")]
    UnloadBranch(BranchEvent),
    #[serde(rename = "repo/device_connected_to_branch")]
    DeviceConnectedToBranch(DeviceBranchEvent),
    #[serde(rename = "repo/device_disconnected_from_branch")]
    DeviceDisconnectedFromBranch(DeviceBranchEvent),
    #[serde(rename = "repo/branch_info")]
    BranchInfo(BranchInfoEvent),
    #[serde(rename = "repo/branches")]
    Branches(BranchesEvent),
    #[serde(rename = "repo/add_commits")]
    AddCommits(AddCommitsEvent),
}

impl ServerMessage {
    pub fn name(&self) -> &'static str {
        match self {
            Self::AddAtoms(_) => events::ADD_ATOMS,
            Self::AtomsReceived(_) => events::ATOMS_RECEIVED,
            Self::ReceiveEvent(_) => events::RECEIVE_EVENT,
            Self::LoadBranch(_) => events::LOAD_BRANCH,
            Self::UnloadBranch(_) => events::UNLOAD_BRANCH,
            Self::DeviceConnectedToBranch(_) => events::DEVICE_CONNECTED_TO_BRANCH,
            Self::DeviceDisconnectedFromBranch(_) => events::DEVICE_DISCONNECTED_FROM_BRANCH,
            Self::BranchInfo(_) => events::BRANCH_INFO,
            Self::Branches(_) => events::BRANCHES,
            Self::AddCommits(_) => events::ADD_COMMITS,
        }
    }

    /// The branch this event concerns, if it is branch-scoped.
    pub fn branch(&self) -> Option<&str> {
        match self {
            Self::AddAtoms(e) => Some(&e.branch),
            Self::AtomsReceived(e) => Some(&e.branch),
            Self::ReceiveEvent(e) => Some(&e.branch),
            Self::LoadBranch(e) | Self::UnloadBranch(e) => Some(&e.branch),
            Self::DeviceConnectedToBranch(e) | Self::DeviceDisconnectedFromBranch(e) => {
                Some(&e.branch)
            }
            Self::BranchInfo(e) => Some(&e.branch),
            Self::AddCommits(e) => Some(&e.branch),
            Self::Branches(_) => None,
        }
    }

    /// Returns `true` if `name` is a server-to-client event.
    pub fn is_known(name: &str) -> bool {
        matches!(
            name,
            events::ADD_ATOMS
                | events::ATOMS_RECEIVED
                | events::RECEIVE_EVENT
                | events::LOAD_BRANCH
                | events::UNLOAD_BRANCH
                | events::DEVICE_CONNECTED_TO_BRANCH
                | events::DEVICE_DISCONNECTED_FROM_BRANCH
                | events::BRANCH_INFO
                | events::BRANCHES
                | events::ADD_COMMITS
        )
    }
}

/// Atoms added to (and removed from) a branch.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AddAtomsEvent {
    pub branch: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub atoms: Option<Vec<Atom>>,
    #[serde(
        rename = "removedAtoms",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub removed_atoms: Option<Vec<ObjectId>>,
}

impl AddAtomsEvent {
    pub fn new(branch: impl Into<String>) -> Self {
        Self {
            branch: branch.into(),
            ..Default::default()
        }
    }

    pub fn with_atoms(mut self, atoms: Vec<Atom>) -> Self {
        self.atoms = Some(atoms);
        self
    }

    pub fn with_removed(mut self, hashes: Vec<ObjectId>) -> Self {
        self.removed_atoms = Some(hashes);
        self
    }
}

/// Acknowledgement that the server persisted atoms.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtomsReceivedEvent {
    pub branch: String,
    pub hashes: Vec<ObjectId>,
}

/// An application action routed through a branch to other devices.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BranchActionEvent {
    pub branch: String,
    pub action: Value,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchEvent {
    pub branch: String,
}

/// What the server knows about a connected device.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    #[serde(default)]
    pub claims: BTreeMap<String, String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceBranchEvent {
    pub branch: String,
    pub device: DeviceInfo,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchInfoEvent {
    pub branch: String,
    pub exists: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchesEvent {
    pub branches: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitEvent {
    pub branch: String,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddCommitsEvent {
    pub branch: String,
    pub commits: Vec<CausalRepoCommit>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn add_atoms_uses_camel_case_removed_atoms() {
        let hash = ObjectId::from_bytes(b"gone");
        let msg = ClientMessage::AddAtoms(AddAtomsEvent::new("main").with_removed(vec![hash]));
        let encoded = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            encoded,
            json!({
                "name": "repo/add_atoms",
                "data": { "branch": "main", "removedAtoms": [hash.to_hex()] }
            })
        );
    }

    #[test]
    fn branch_name_payloads_are_bare_strings() {
        let encoded = serde_json::to_value(ClientMessage::WatchBranch("main".into())).unwrap();
        assert_eq!(encoded, json!({ "name": "repo/watch_branch", "data": "main" }));
    }

    #[test]
    fn payloadless_events_omit_data() {
        let encoded = serde_json::to_value(ClientMessage::WatchDevices).unwrap();
        assert_eq!(encoded, json!({ "name": "repo/watch_devices" }));
        let decoded: ClientMessage =
            serde_json::from_value(json!({ "name": "repo/branches" })).unwrap();
        assert_eq!(decoded, ClientMessage::Branches);
    }

    #[test]
    fn branch_info_differs_by_direction() {
        let request = serde_json::to_value(ClientMessage::BranchInfo("main".into())).unwrap();
        assert_eq!(request["data"], json!("main"));

        let response: ServerMessage = serde_json::from_value(json!({
            "name": "repo/branch_info",
            "data": { "branch": "main", "exists": true }
        }))
        .unwrap();
        assert_eq!(response.branch(), Some("main"));
        assert_eq!(response.name(), events::BRANCH_INFO);
    }

    #[test]
    fn device_info_tolerates_missing_fields() {
        let msg: ServerMessage = serde_json::from_value(json!({
            "name": "repo/device_connected_to_branch",
            "data": { "branch": "main", "device": {} }
        }))
        .unwrap();
        match msg {
            ServerMessage::DeviceConnectedToBranch(e) => assert_eq!(e.device, DeviceInfo::default()),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn names_match_serde_tags() {
        let messages = [
            ClientMessage::UnwatchBranch("b".into()),
            ClientMessage::SendEvent(BranchActionEvent {
                branch: "b".into(),
                action: json!({"type": "ping"}),
            }),
            ClientMessage::Commit(CommitEvent {
                branch: "b".into(),
                message: "m".into(),
            }),
            ClientMessage::WatchCommits("b".into()),
            ClientMessage::UnwatchBranches,
        ];
        for msg in messages {
            let encoded = serde_json::to_value(&msg).unwrap();
            assert_eq!(encoded["name"], json!(msg.name()));
            assert!(ClientMessage::is_known(msg.name()));
        }
        assert!(!ServerMessage::is_known(events::WATCH_BRANCH));
        assert!(ServerMessage::is_known(events::ADD_COMMITS));
    }
}
