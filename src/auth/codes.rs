//! One-time numeric codes for password reset and email verification.
//!
//! Only the SHA-256 digest of a code is ever stored; the plaintext leaves the
//! process exclusively through the mailer.

use rand::{rngs::OsRng, Rng};
use sha2::{Digest, Sha256};
use time::Duration;

/// How long a freshly issued code stays usable.
pub const CODE_TTL: Duration = Duration::minutes(10);

const CODE_MIN: u32 = 100_000;
const CODE_MAX: u32 = 999_999;

pub struct GeneratedCode {
    pub plain: String,
    pub hash: String,
}

pub fn generate() -> GeneratedCode {
    let plain = OsRng.gen_range(CODE_MIN..=CODE_MAX).to_string();
    let hash = digest(&plain);
    GeneratedCode { plain, hash }
}

pub fn digest(code: &str) -> String {
    hex::encode(Sha256::digest(code.trim().as_bytes()))
}
