//! Hashing primitives for the causal repo.
//!
//! Provides domain-separated BLAKE3 hashing for every content-addressed
//! record kind and hash chain verification for commit histories.
//!
//! All crypto operations wrap established libraries: no custom cryptography.

pub mod chain;
pub mod hasher;

pub use chain::{ChainError, ChainLink, HashChainVerifier};
pub use hasher::{ContentHasher, HasherError};
