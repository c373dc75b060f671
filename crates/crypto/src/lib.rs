//! Cryptographic primitives for NUS title content.
//!
//! This crate wraps the RustCrypto AES, CBC and SHA implementations behind
//! the handful of operations the title format needs:
//!
//! - **Keys** ([`Key`]) parsed from hex or raw bytes, redacted in debug output
//! - **IV derivation** for title keys ([`iv_from_title_id`]) and contents
//!   ([`iv_from_index`])
//! - **Chunked CBC** ([`CbcDecryptor`]) that keeps chaining across chunk
//!   boundaries, so callers can stream arbitrarily large contents
//! - **Digests** ([`Sha1Digest`], [`Sha1Hasher`], [`sha256`])
//!
//! Key material is never stored globally; every function takes the key it
//! operates with.
//!
//! Encryption is only available with the `mock` feature, which exists for
//! building test fixtures in other crates.

mod chain;
mod digest;
pub mod error;
mod key;

#[cfg(feature = "mock")]
pub use crate::chain::encrypt_in_place;
pub use crate::chain::{
    BLOCK_SIZE, CbcDecryptor, Iv, ZERO_IV, align_to_block, decrypt_in_place, iv_from_index, iv_from_title_id,
};
pub use crate::digest::{SHA1_SIZE, SHA256_SIZE, Sha1Digest, Sha1Hasher, sha256};
pub use crate::key::{KEY_SIZE, Key};
