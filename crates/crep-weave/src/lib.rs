//! Causal tree weave for the causal repo.
//!
//! An [`Atom`] is the immutable unit of change: an identity, the id of the
//! atom it is attached to (its cause), a payload, and a deterministic hash
//! over all three. A [`Weave`] linearizes atoms into the single depth-first
//! order every replica agrees on, no matter the order atoms arrive in.
//!
//! Insertion never fails loudly: every outcome is either the accepted atom
//! or an [`AtomRejection`] that hands the atom back with a
//! [`RejectionReason`], so out-of-order deliveries can simply be retried.

pub mod atom;
pub mod error;
pub mod weave;

pub use atom::{atom, atom_hash, atom_matches_checksum, Atom};
pub use error::{AtomRejection, RejectionReason, WeaveError, WeaveResult};
pub use weave::{Descendants, ImportResult, Weave, WeaveIter};
