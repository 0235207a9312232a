use std::num::NonZeroU32;

use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;

const OUTPUT_LEN: usize = 32;

/// Per-account salt length in bytes.
pub const SALT_LEN: usize = 64;

/// Derive the stored credential hash with PBKDF2-HMAC-SHA256 and a per-account salt.
///
/// Zero iterations are treated as one.
pub fn hash_password(secret: &[u8], salt: &[u8], iterations: u32) -> Vec<u8> {
    let mut out = vec![0u8; OUTPUT_LEN];
    pbkdf2_hmac::<Sha256>(secret, salt, iterations.max(1), &mut out);
    out
}

pub fn verify_password_hash(secret: &[u8], salt: &[u8], expected: &[u8], iterations: u32) -> bool {
    let Some(iterations) = NonZeroU32::new(iterations) else {
        return false;
    };
    if expected.len() != OUTPUT_LEN {
        return false;
    }

    // Derive and constant-time compare.
    let mut out = vec![0u8; OUTPUT_LEN];
    pbkdf2_hmac::<Sha256>(secret, salt, iterations.get(), &mut out);
    subtle::ConstantTimeEq::ct_eq(out.as_ref(), expected).into()
}

/// Spend the same PBKDF2 work as a real check when there is no stored hash.
///
/// Always false.
pub fn verify_against_dummy(secret: &[u8], iterations: u32) -> bool {
    const DUMMY_SALT: [u8; SALT_LEN] = [0x5a; SALT_LEN];
    verify_password_hash(secret, &DUMMY_SALT, &[0u8; OUTPUT_LEN], iterations.max(1))
}
