//! Client side of the causal repo protocol.
//!
//! [`CausalRepoClient`] layers the repository protocol over any
//! [`ConnectionClient`]: a bidirectional, named-event connection with
//! connection-state notifications. Each watch (branch, branch list,
//! devices, commits) is a [`Subscription`] backed by one spawned task that
//! re-sends its watch request on every reconnect and sends the matching
//! unwatch when dropped.
//!
//! Atoms sent with [`CausalRepoClient::add_atoms`] stay pending until the
//! server acknowledges them with `repo/atoms_received`. Whatever is still
//! pending is re-sent each time the connection comes back, so a client
//! that drops mid-send never loses atoms.
//!
//! [`RemoteWeave`] ties one local [`Weave`](crep_weave::Weave) to a branch.

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod memory;
pub mod pending;
pub mod subscription;
pub mod sync;

pub use client::{BranchUpdate, BranchesUpdate, CausalRepoClient, DeviceUpdate};
pub use config::ClientConfig;
pub use connection::{ConnectionClient, ConnectionEvent, ConnectionState};
pub use error::{ClientError, ClientResult};
pub use memory::MemoryConnection;
pub use pending::PendingAtoms;
pub use subscription::Subscription;
pub use sync::{ApplyResult, RemoteWeave};
