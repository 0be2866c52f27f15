use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::password::HashedPassword;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            other => anyhow::bail!("Invalid role {other:?}"),
        }
    }
}

/// Stored user record. Deliberately not `Serialize`: responses go through
/// [`PublicUser`].
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub email: String,
    pub phone: Option<String>,
    pub password: HashedPassword,
    pub profile_image: Option<String>,
    pub role: Role,
    pub active: bool,
    pub email_verified: bool,
    pub password_changed_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl User {
    /// Whether the password was replaced after a token issued at `iat_ms` (unix milliseconds).
    pub fn password_changed_after(&self, iat_ms: i64) -> bool {
        self.password_changed_at
            .map(|at| at.unix_timestamp_nanos() / 1_000_000 > iat_ms as i128)
            .unwrap_or(false)
    }
}

/// Input for a new record. `slug` is derived by the caller from `name`.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub slug: String,
    pub email: String,
    pub phone: Option<String>,
    pub password: HashedPassword,
    pub profile_image: Option<String>,
    pub role: Role,
}

/// Partial update; `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub profile_image: Option<String>,
    pub role: Option<Role>,
}

/// Public part of the user returned to the client.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub email: String,
    pub phone: Option<String>,
    pub profile_image: Option<String>,
    pub role: Role,
    pub active: bool,
    pub email_verified: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub password_changed_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<&User> for PublicUser {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            name: u.name.clone(),
            slug: u.slug.clone(),
            email: u.email.clone(),
            phone: u.phone.clone(),
            profile_image: u.profile_image.clone(),
            role: u.role,
            active: u.active,
            email_verified: u.email_verified,
            password_changed_at: u.password_changed_at,
            created_at: u.created_at,
            updated_at: u.updated_at,
        }
    }
}

impl From<User> for PublicUser {
    fn from(u: User) -> Self {
        PublicUser::from(&u)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::HashedPassword;

    fn sample() -> User {
        let now = OffsetDateTime::now_utc();
        User {
            id: Uuid::new_v4(),
            name: "Alice".into(),
            slug: "alice".into(),
            email: "a@x.com".into(),
            phone: None,
            password: HashedPassword::from_stored("$2b$04$stored".into()),
            profile_image: None,
            role: Role::User,
            active: true,
            email_verified: false,
            password_changed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn public_user_never_carries_the_hash() {
        let user = sample();
        let json = serde_json::to_value(PublicUser::from(&user)).unwrap();
        let obj = json.as_object().unwrap();
        assert!(!obj.contains_key("password"));
        assert!(!json.to_string().contains(user.password.as_str()));
        assert_eq!(json["email"], "a@x.com");
        assert_eq!(json["role"], "user");
        assert_eq!(json["emailVerified"], false);
        assert!(json["passwordChangedAt"].is_null());
    }

    #[test]
    fn password_change_is_compared_in_milliseconds() {
        let mut user = sample();
        assert!(!user.password_changed_after(0));

        let changed = OffsetDateTime::from_unix_timestamp_nanos(1_700_000_000_500_000_000).unwrap();
        user.password_changed_at = Some(changed);
        assert!(user.password_changed_after(1_700_000_000_000));
        assert!(user.password_changed_after(1_700_000_000_499));
        assert!(!user.password_changed_after(1_700_000_000_500));
        assert!(!user.password_changed_after(1_700_000_001_000));
    }

    #[test]
    fn role_parses_closed_set() {
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!("user".parse::<Role>().unwrap(), Role::User);
        assert!("root".parse::<Role>().is_err());
        assert_eq!(Role::default(), Role::User);
    }
}
