//! Wire protocol for the causal repo.
//!
//! Every exchange between a client and a repository server is a named
//! event with a JSON payload. Client-to-server events are
//! [`ClientMessage`]s and server-to-client events are [`ServerMessage`]s;
//! `repo/add_atoms`, `repo/branch_info` and `repo/branches` appear in both
//! directions. [`EventCodec`] frames one event as `{"name", "data"}`.

pub mod codec;
pub mod error;
pub mod message;

pub use codec::EventCodec;
pub use error::{ProtocolError, ProtocolResult};
pub use message::{
    events, AddAtomsEvent, AddCommitsEvent, AtomsReceivedEvent, BranchActionEvent, BranchEvent,
    BranchInfoEvent, BranchesEvent, ClientMessage, CommitEvent, DeviceBranchEvent, DeviceInfo,
    ServerMessage, MAX_MESSAGE_SIZE,
};
