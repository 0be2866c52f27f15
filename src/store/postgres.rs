use anyhow::Context;
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};
use time::OffsetDateTime;
use tracing::error;
use uuid::Uuid;

use super::{check_record, email_taken, ChallengeStore, UserStore};
use crate::{
    auth::{
        challenge::{ChallengeKind, PendingChallenge},
        password::HashedPassword,
    },
    error::AppError,
    users::model::{NewUser, User, UserChanges},
};

const USER_COLUMNS: &str = "id, name, slug, email, phone, password_hash, profile_image, role, \
     active, email_verified, password_changed_at, created_at, updated_at";

/// sqlx-backed store for both users and pending challenges.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .context("connect to database")?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[derive(Debug, FromRow)]
struct UserRow {
    id: Uuid,
    name: String,
    slug: String,
    email: String,
    phone: Option<String>,
    password_hash: String,
    profile_image: Option<String>,
    role: String,
    active: bool,
    email_verified: bool,
    password_changed_at: Option<OffsetDateTime>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl TryFrom<UserRow> for User {
    type Error = AppError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: row.id,
            name: row.name,
            slug: row.slug,
            email: row.email,
            phone: row.phone,
            password: HashedPassword::from_stored(row.password_hash),
            profile_image: row.profile_image,
            role: row.role.parse()?,
            active: row.active,
            email_verified: row.email_verified,
            password_changed_at: row.password_changed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ChallengeRow {
    user_id: Uuid,
    kind: String,
    code_hash: String,
    expires_at: OffsetDateTime,
    verified: bool,
}

impl TryFrom<ChallengeRow> for PendingChallenge {
    type Error = AppError;

    fn try_from(row: ChallengeRow) -> Result<Self, Self::Error> {
        Ok(PendingChallenge {
            user_id: row.user_id,
            kind: row.kind.parse()?,
            code_hash: row.code_hash,
            expires_at: row.expires_at,
            verified: row.verified,
        })
    }
}

fn db_error(e: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db) = &e {
        match db.code().as_deref() {
            Some("23505") => return email_taken(),
            // FK violation: challenge for a user that no longer exists
            Some("23503") => return AppError::NotFound("User no longer exists".into()),
            _ => {}
        }
    }
    error!(error = ?e, "postgres query failed");
    AppError::Internal(e.into())
}

fn into_user(row: Option<UserRow>) -> Result<Option<User>, AppError> {
    row.map(User::try_from).transpose()
}

#[async_trait]
impl UserStore for PgStore {
    async fn create(&self, new: NewUser) -> Result<User, AppError> {
        check_record(Some(&new.name), Some(&new.email))?;
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            INSERT INTO users (name, slug, email, phone, password_hash, profile_image, role)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&new.name)
        .bind(&new.slug)
        .bind(&new.email)
        .bind(&new.phone)
        .bind(new.password.as_str())
        .bind(&new.profile_image)
        .bind(new.role.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(db_error)?;
        row.try_into()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;
        into_user(row)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;
        into_user(row)
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<User>, AppError> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            SELECT {USER_COLUMNS}
            FROM users
            ORDER BY created_at ASC, id ASC
            LIMIT $1 OFFSET $2
            "#
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        rows.into_iter().map(User::try_from).collect()
    }

    async fn update(&self, id: Uuid, changes: UserChanges) -> Result<Option<User>, AppError> {
        check_record(changes.name.as_deref(), changes.email.as_deref())?;
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            UPDATE users SET
                name = COALESCE($2, name),
                slug = COALESCE($3, slug),
                email = COALESCE($4, email),
                phone = COALESCE($5, phone),
                profile_image = COALESCE($6, profile_image),
                role = COALESCE($7, role),
                updated_at = now()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(changes.name)
        .bind(changes.slug)
        .bind(changes.email)
        .bind(changes.phone)
        .bind(changes.profile_image)
        .bind(changes.role.map(|r| r.as_str()))
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;
        into_user(row)
    }

    async fn set_password(
        &self,
        id: Uuid,
        password: HashedPassword,
        changed_at: OffsetDateTime,
    ) -> Result<Option<User>, AppError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            UPDATE users
            SET password_hash = $2, password_changed_at = $3, updated_at = $3
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(password.as_str())
        .bind(changed_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;
        into_user(row)
    }

    async fn set_active(&self, id: Uuid, active: bool) -> Result<bool, AppError> {
        let res = sqlx::query("UPDATE users SET active = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(active)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(res.rows_affected() == 1)
    }

    async fn mark_email_verified(&self, id: Uuid) -> Result<bool, AppError> {
        let res = sqlx::query(
            "UPDATE users SET email_verified = TRUE, updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(res.rows_affected() == 1)
    }

    async fn delete(&self, id: Uuid) -> Result<Option<User>, AppError> {
        // account_challenges rows go with it via ON DELETE CASCADE
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "DELETE FROM users WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;
        into_user(row)
    }
}

#[async_trait]
impl ChallengeStore for PgStore {
    async fn put(&self, challenge: PendingChallenge) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO account_challenges (user_id, kind, code_hash, expires_at, verified)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id, kind) DO UPDATE
            SET code_hash = EXCLUDED.code_hash,
                expires_at = EXCLUDED.expires_at,
                verified = EXCLUDED.verified
            "#,
        )
        .bind(challenge.user_id)
        .bind(challenge.kind.as_str())
        .bind(&challenge.code_hash)
        .bind(challenge.expires_at)
        .bind(challenge.verified)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn get(
        &self,
        user_id: Uuid,
        kind: ChallengeKind,
    ) -> Result<Option<PendingChallenge>, AppError> {
        let row = sqlx::query_as::<_, ChallengeRow>(
            r#"
            SELECT user_id, kind, code_hash, expires_at, verified
            FROM account_challenges
            WHERE user_id = $1 AND kind = $2
            "#,
        )
        .bind(user_id)
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;
        row.map(PendingChallenge::try_from).transpose()
    }

    async fn verify_code(
        &self,
        kind: ChallengeKind,
        code_hash: &str,
        now: OffsetDateTime,
    ) -> Result<Option<Uuid>, AppError> {
        let user_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            UPDATE account_challenges SET verified = TRUE
            WHERE (user_id, kind) = (
                SELECT user_id, kind FROM account_challenges
                WHERE kind = $1 AND code_hash = $2 AND expires_at > $3
                ORDER BY expires_at DESC
                LIMIT 1
                FOR UPDATE
            )
            RETURNING user_id
            "#,
        )
        .bind(kind.as_str())
        .bind(code_hash)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(user_id)
    }

    async fn consume_verified(
        &self,
        user_id: Uuid,
        kind: ChallengeKind,
        now: OffsetDateTime,
    ) -> Result<Option<PendingChallenge>, AppError> {
        let row = sqlx::query_as::<_, ChallengeRow>(
            r#"
            DELETE FROM account_challenges
            WHERE user_id = $1 AND kind = $2 AND verified AND expires_at > $3
            RETURNING user_id, kind, code_hash, expires_at, verified
            "#,
        )
        .bind(user_id)
        .bind(kind.as_str())
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;
        row.map(PendingChallenge::try_from).transpose()
    }

    async fn clear(&self, user_id: Uuid, kind: ChallengeKind) -> Result<(), AppError> {
        sqlx::query("DELETE FROM account_challenges WHERE user_id = $1 AND kind = $2")
            .bind(user_id)
            .bind(kind.as_str())
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }
}
