use std::{fmt, str::FromStr};

use time::OffsetDateTime;
use uuid::Uuid;

use super::codes;

/// Which account operation a pending code authorizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChallengeKind {
    PasswordReset,
    EmailVerify,
}

impl ChallengeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChallengeKind::PasswordReset => "password_reset",
            ChallengeKind::EmailVerify => "email_verify",
        }
    }
}

impl fmt::Display for ChallengeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChallengeKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "password_reset" => Ok(ChallengeKind::PasswordReset),
            "email_verify" => Ok(ChallengeKind::EmailVerify),
            other => anyhow::bail!("unknown challenge kind {other:?}"),
        }
    }
}

/// An outstanding one-time code for a user, at most one per kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingChallenge {
    pub user_id: Uuid,
    pub kind: ChallengeKind,
    pub code_hash: String,
    pub expires_at: OffsetDateTime,
    pub verified: bool,
}

impl PendingChallenge {
    /// A new, unverified challenge expiring `CODE_TTL` after `now`.
    pub fn issue(user_id: Uuid, kind: ChallengeKind, code_hash: String, now: OffsetDateTime) -> Self {
        Self {
            user_id,
            kind,
            code_hash,
            expires_at: now + codes::CODE_TTL,
            verified: false,
        }
    }

    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        now >= self.expires_at
    }

    /// True when `code` hashes to the stored digest and the challenge is live.
    pub fn accepts(&self, code: &str, now: OffsetDateTime) -> bool {
        !self.is_expired(now) && codes::digest(code) == self.code_hash
    }
}
