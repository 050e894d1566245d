//! SHA-512 digest engine with optional random salt.
//!
//! # Overview
//!
//! [`digest`] hashes the input alone when the salt length is zero, which makes
//! the output reproducible. With a positive salt length, that many bytes of
//! OS entropy are appended to the input before hashing, so two calls with the
//! same input produce different digests.
//!
//! Salt comes from the operating system's CSPRNG. If it cannot be read the
//! process is aborted.

use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest as _, Sha512};

/// Salt length used when a caller asks for salting without a size.
///
/// Matches the SHA-512 output size.
pub const DEFAULT_SALT_LENGTH: usize = 64;

/// Size of a SHA-512 digest in bytes.
pub const DIGEST_LENGTH: usize = 64;

/// Errors raised while producing a digest.
#[derive(Debug, thiserror::Error)]
pub enum DigestError {
    /// The OS random source could not provide salt bytes.
    #[error("Entropy source unavailable: {0}")]
    EntropyUnavailable(#[from] rand::Error),
}

/// A digest together with the salt that went into it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaltedDigest {
    /// Salt appended to the input; empty when unsalted.
    pub salt: Vec<u8>,
    /// SHA-512 of `input || salt`.
    pub digest: Vec<u8>,
}

/// Hash `input`, mixing in `salt_length` random bytes when non-zero.
///
/// Returns only the digest. Use [`salted_digest`] when the salt must be kept.
///
/// Aborts the process if the entropy source fails.
#[must_use]
pub fn digest(input: &[u8], salt_length: usize) -> Vec<u8> {
    salted_digest(input, salt_length).digest
}

/// Hash `input` with `salt_length` random bytes and return both.
///
/// Aborts the process if the entropy source fails.
#[must_use]
pub fn salted_digest(input: &[u8], salt_length: usize) -> SaltedDigest {
    match try_salted_digest(input, salt_length) {
        Ok(result) => result,
        Err(e) => {
            log::error!("{e}; refusing to produce an unsalted digest");
            std::process::abort();
        }
    }
}

/// Fallible form of [`salted_digest`].
///
/// # Errors
///
/// Returns [`DigestError::EntropyUnavailable`] if salt bytes cannot be read.
pub fn try_salted_digest(input: &[u8], salt_length: usize) -> Result<SaltedDigest, DigestError> {
    let salt = generate_salt(salt_length)?;
    Ok(SaltedDigest {
        digest: hash_with_salt(input, &salt),
        salt,
    })
}

/// SHA-512 of `input` followed by `salt`.
///
/// Deterministic; used to verify a stored digest when its salt is known.
#[must_use]
pub fn hash_with_salt(input: &[u8], salt: &[u8]) -> Vec<u8> {
    let mut hasher = Sha512::new();
    hasher.update(input);
    if !salt.is_empty() {
        hasher.update(salt);
    }
    hasher.finalize().to_vec()
}

fn generate_salt(length: usize) -> Result<Vec<u8>, DigestError> {
    let mut salt = vec![0u8; length];
    if length > 0 {
        OsRng.try_fill_bytes(&mut salt)?;
    }
    Ok(salt)
}
