//! SHA-512 credential verification for reserved nicknames.
//!
//! The configuration carries a `nickname = <128-hex-char SHA-512>` table.
//! A nickname appearing in the table is *reserved*: a connecting client using
//! it must identify within the identify deadline, and JOIN is refused until
//! it does. Verification hashes the candidate password and compares it with
//! the stored digest in constant time.

use sha2::{Digest, Sha512};
use std::collections::HashMap;
use subtle::ConstantTimeEq;
use thiserror::Error;

/// Length of a SHA-512 digest in bytes.
pub const DIGEST_LEN: usize = 64;

/// Why a stored passhash string was rejected at load time.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PasshashError {
    /// The hex string was not exactly 128 characters.
    #[error("length of a passhash must be 128 characters")]
    BadLength,
    /// The string contained a non-hex character.
    #[error("passhash contains a non-hexadecimal character")]
    BadDigit,
}

/// Outcome of a credential check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// The password matches the stored digest.
    Ok,
    /// No password is known for the nickname.
    UnknownNick,
    /// The password does not match.
    BadPassword,
}

/// Reserved-nickname digest table, keyed by lower-cased nickname.
#[derive(Debug, Default, Clone)]
pub struct PassTable {
    digests: HashMap<String, [u8; DIGEST_LEN]>,
}

impl PassTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a digest for a (lower-cased) nickname.
    pub fn insert(&mut self, nick_lc: String, digest: [u8; DIGEST_LEN]) {
        self.digests.insert(nick_lc, digest);
    }

    /// Whether the nickname is reserved.
    pub fn is_reserved(&self, nick_lc: &str) -> bool {
        self.digests.contains_key(nick_lc)
    }

    /// Check a candidate password against the stored digest.
    pub fn verify(&self, nick_lc: &str, password: &str) -> VerifyOutcome {
        let Some(stored) = self.digests.get(nick_lc) else {
            return VerifyOutcome::UnknownNick;
        };

        let digest = Sha512::digest(password.as_bytes());
        if bool::from(digest.as_slice().ct_eq(stored)) {
            VerifyOutcome::Ok
        } else {
            VerifyOutcome::BadPassword
        }
    }
}

/// Decode a 128-character hex passhash into a binary digest.
pub fn decode_passhash(hex: &str) -> Result<[u8; DIGEST_LEN], PasshashError> {
    if hex.len() != 2 * DIGEST_LEN {
        return Err(PasshashError::BadLength);
    }

    let mut digest = [0u8; DIGEST_LEN];
    let bytes = hex.as_bytes();
    for (i, out) in digest.iter_mut().enumerate() {
        let hi = hex_value(bytes[2 * i]).ok_or(PasshashError::BadDigit)?;
        let lo = hex_value(bytes[2 * i + 1]).ok_or(PasshashError::BadDigit)?;
        *out = (hi << 4) | lo;
    }
    Ok(digest)
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // SHA-512 of "wonderland".
    const ALICE_HASH: &str = "92ed1f0dfa10ad6b5a81d10560711b8d0f5cf5582221c7c14c7cbd594958c730b46a491979aa6f79de57d53237ff363d88464d141071ca52af31c63382f6c7a6";

    fn table() -> PassTable {
        let mut table = PassTable::new();
        table.insert("alice".to_string(), decode_passhash(ALICE_HASH).unwrap());
        table
    }

    #[test]
    fn test_verify_correct_password() {
        assert_eq!(table().verify("alice", "wonderland"), VerifyOutcome::Ok);
    }

    #[test]
    fn test_verify_wrong_password() {
        assert_eq!(
            table().verify("alice", "Wonderland"),
            VerifyOutcome::BadPassword
        );
    }

    #[test]
    fn test_verify_unknown_nick() {
        assert_eq!(
            table().verify("bob", "wonderland"),
            VerifyOutcome::UnknownNick
        );
    }

    #[test]
    fn test_reserved_lookup() {
        let table = table();
        assert!(table.is_reserved("alice"));
        assert!(!table.is_reserved("bob"));
    }

    #[test]
    fn test_decode_rejects_bad_length() {
        assert_eq!(decode_passhash("abcd"), Err(PasshashError::BadLength));
    }

    #[test]
    fn test_decode_rejects_bad_digit() {
        let bad = "g".repeat(128);
        assert_eq!(decode_passhash(&bad), Err(PasshashError::BadDigit));
    }

    #[test]
    fn test_decode_round_trip() {
        let digest = decode_passhash(ALICE_HASH).unwrap();
        assert_eq!(digest[0], 0x92);
        assert_eq!(digest[63], 0xa6);
    }
}
