//! Cryptographic primitives for Strand repositories.
//!
//! Provides domain-separated BLAKE3 hashing for block addresses and Ed25519
//! signing/verification for commits.
//!
//! All crypto operations wrap established libraries; there is no custom cryptography.

pub mod hasher;
pub mod signer;

pub use hasher::ContentHasher;
pub use signer::{Signature, SignatureError, Signer, SigningKey, VerifyingKey};
