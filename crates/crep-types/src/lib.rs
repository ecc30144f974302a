//! Foundation types for the causal repo.
//!
//! This crate provides the identity and addressing types shared by every
//! other crate in the workspace: the weave, the atom index, the object store
//! and the client protocol all speak in these terms.
//!
//! # Key Types
//!
//! - [`ObjectId`]: Content hash of an atom, index, commit or audit record (BLAKE3)
//! - [`SiteId`]: Identity of an independent author/replica
//! - [`AtomId`]: `(site, timestamp, priority)` identity of a single atom

pub mod atom_id;
pub mod error;
pub mod object;
pub mod site;

pub use atom_id::AtomId;
pub use error::TypeError;
pub use object::ObjectId;
pub use site::SiteId;
