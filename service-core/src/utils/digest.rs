use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// SHA-256 of `input`, rendered as 64 lowercase hex characters.
pub fn sha256_hex(input: &[u8]) -> String {
    hex::encode(Sha256::digest(input))
}

/// Compare two byte strings without short-circuiting on the first mismatch.
///
/// Inputs of different length compare unequal immediately, so only the length
/// is observable through timing.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.ct_eq(b).into()
}
