use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    auth::{
        challenge::{ChallengeKind, PendingChallenge},
        password::HashedPassword,
    },
    error::{AppError, FieldError},
    users::model::{NewUser, User, UserChanges},
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Persistence contract for user records.
///
/// Implementations reject a second record with the same email with
/// [`AppError::Conflict`], atomically.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create(&self, new: NewUser) -> Result<User, AppError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError>;
    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<User>, AppError>;
    async fn update(&self, id: Uuid, changes: UserChanges) -> Result<Option<User>, AppError>;
    async fn set_password(
        &self,
        id: Uuid,
        password: HashedPassword,
        changed_at: OffsetDateTime,
    ) -> Result<Option<User>, AppError>;
    async fn set_active(&self, id: Uuid, active: bool) -> Result<bool, AppError>;
    async fn mark_email_verified(&self, id: Uuid) -> Result<bool, AppError>;
    /// Hard delete. Pending challenges of the user go with it.
    async fn delete(&self, id: Uuid) -> Result<Option<User>, AppError>;
}

/// Pending one-time codes, one per `(user, kind)`.
#[async_trait]
pub trait ChallengeStore: Send + Sync {
    /// Insert or replace the user's challenge of this kind.
    async fn put(&self, challenge: PendingChallenge) -> Result<(), AppError>;
    async fn get(&self, user_id: Uuid, kind: ChallengeKind)
        -> Result<Option<PendingChallenge>, AppError>;
    /// Mark the live challenge with this digest verified and return its owner.
    async fn verify_code(
        &self,
        kind: ChallengeKind,
        code_hash: &str,
        now: OffsetDateTime,
    ) -> Result<Option<Uuid>, AppError>;
    /// Remove and return the user's challenge only if it is verified and live.
    async fn consume_verified(
        &self,
        user_id: Uuid,
        kind: ChallengeKind,
        now: OffsetDateTime,
    ) -> Result<Option<PendingChallenge>, AppError>;
    async fn clear(&self, user_id: Uuid, kind: ChallengeKind) -> Result<(), AppError>;
}

pub(crate) fn email_taken() -> AppError {
    AppError::Conflict("E-mail already in use".into())
}

/// Record-level checks every store applies before writing.
pub(crate) fn check_record(name: Option<&str>, email: Option<&str>) -> Result<(), AppError> {
    let mut errors = Vec::new();
    if name.is_some_and(|n| n.trim().is_empty()) {
        errors.push(FieldError::new("name", "Name is required"));
    }
    match email {
        Some(e) if e.trim().is_empty() => errors.push(FieldError::new("email", "Email is required")),
        Some(e) if !crate::validation::is_valid_email(e) => {
            errors.push(FieldError::new("email", "Invalid email format"))
        }
        _ => {}
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(errors))
    }
}
