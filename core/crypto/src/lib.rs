//! Cryptographic primitives for credvault.
//!
//! This module provides:
//! - Password-based key derivation (PBKDF2-HMAC-SHA256 or Argon2id)
//! - Key-committing authenticated encryption using XChaCha20-Poly1305
//! - Text envelopes for storing encrypted secrets as strings
//! - Key types with automatic zeroization
//!
//! # Security Guarantees
//! - All key material is automatically zeroized on drop
//! - No plaintext or key material is ever logged
//! - Key commitments are compared in constant time

pub mod aead;
pub mod envelope;
pub mod kdf;
pub mod keys;

pub use aead::{open, seal};
pub use envelope::{decrypt, encrypt};
pub use kdf::{derive_key, generate_salt, KdfParams, DEFAULT_PBKDF2_ITERATIONS};
pub use keys::{DerivedKey, Salt, DEFAULT_SALT_LENGTH, KEY_LENGTH};
