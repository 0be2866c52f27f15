use std::fmt;

use anyhow::Context;
use tracing::error;

/// bcrypt work factor for stored passwords.
#[cfg(not(test))]
pub const HASH_COST: u32 = 12;
#[cfg(test)]
pub const HASH_COST: u32 = 4;

/// A bcrypt password hash. Only the hasher and the store's row mapping can
/// build one, so a plaintext password can never reach a store.
#[derive(Clone, PartialEq, Eq)]
pub struct HashedPassword(String);

impl HashedPassword {
    pub(crate) fn from_stored(hash: String) -> Self {
        Self(hash)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for HashedPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HashedPassword(..)")
    }
}

/// bcrypt is CPU bound, so hashing runs on the blocking pool.
pub async fn hash_password(plain: &str) -> anyhow::Result<HashedPassword> {
    let plain = plain.to_owned();
    let hash = tokio::task::spawn_blocking(move || bcrypt::hash(plain, HASH_COST))
        .await
        .context("join hash task")?
        .map_err(|e| {
            error!(error = %e, "bcrypt hash error");
            e
        })
        .context("hash password")?;
    Ok(HashedPassword(hash))
}

pub async fn verify_password(plain: &str, hash: &HashedPassword) -> anyhow::Result<bool> {
    let plain = plain.to_owned();
    let hash = hash.0.clone();
    tokio::task::spawn_blocking(move || bcrypt::verify(plain, &hash))
        .await
        .context("join verify task")?
        .map_err(|e| {
            error!(error = %e, "bcrypt parse hash error");
            e
        })
        .context("verify password")
}
