//! Atom indexes for the causal repo.
//!
//! An [`AtomIndex`] records which atoms, at which hashes, make up one state
//! of a weave, and rolls that set up into a single content hash. Two
//! indexes with the same hash describe the same atoms, which makes
//! "did anything change?" a single comparison and lets [`calculate_diff`]
//! skip the set difference entirely in the common case.

pub mod diff;
pub mod index;

pub use diff::{calculate_diff, IndexDiff};
pub use index::{create_index, AtomIndex};
