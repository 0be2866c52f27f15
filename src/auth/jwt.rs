use std::time::Duration;

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    config::JwtConfig,
    error::AppError,
    state::AppState,
    users::model::{Role, User},
};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub iat: usize,
    /// Issue time in unix milliseconds, compared against password changes.
    pub iat_ms: i64,
    pub exp: usize,
    pub iss: String,
    pub aud: String,
}

pub fn unix_millis(at: OffsetDateTime) -> i64 {
    (at.unix_timestamp_nanos() / 1_000_000) as i64
}

#[derive(Clone)]
pub struct JwtKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub issuer: String,
    pub audience: String,
    pub ttl: Duration,
}

impl From<&JwtConfig> for JwtKeys {
    fn from(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            ttl: Duration::from_secs((cfg.ttl_minutes.max(0) as u64) * 60),
        }
    }
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        JwtKeys::from(&state.config.jwt)
    }
}

impl JwtKeys {
    pub fn issue(&self, user_id: Uuid) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let exp = now + TimeDuration::seconds(self.ttl.as_secs() as i64);
        let claims = Claims {
            sub: user_id,
            iat: now.unix_timestamp() as usize,
            iat_ms: unix_millis(now),
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(user_id = %user_id, "jwt signed");
        Ok(token)
    }

    pub fn verify(&self, token: &str) -> anyhow::Result<Claims> {
        let mut validation = Validation::default();
        validation.leeway = 0;
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        debug!(user_id = %data.claims.sub, "jwt verified");
        Ok(data.claims)
    }
}

/// The authenticated caller, loaded fresh from the store on every request.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let unauthorized =
            || AppError::Auth("You are not logged in, please log in to get access".into());

        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(unauthorized)?;
        let token = header
            .strip_prefix("Bearer ")
            .or_else(|| header.strip_prefix("bearer "))
            .ok_or_else(unauthorized)?;

        let keys = JwtKeys::from_ref(state);
        let claims = keys.verify(token).map_err(|e| {
            warn!(error = %e, "invalid or expired token");
            AppError::Auth("Invalid or expired token".into())
        })?;

        let user = state.users.find_by_id(claims.sub).await?.ok_or_else(|| {
            AppError::Auth("The user that belongs to this token no longer exists".into())
        })?;
        if user.password_changed_after(claims.iat_ms) {
            return Err(AppError::Auth(
                "User recently changed password, please log in again".into(),
            ));
        }

        Ok(AuthUser(user))
    }
}

/// Gate for role-restricted operations.
pub fn require_role(caller: &AuthUser, role: Role) -> Result<(), AppError> {
    if caller.0.role == role {
        Ok(())
    } else {
        warn!(user_id = %caller.0.id, required = %role, "role check failed");
        Err(AppError::Forbidden(
            "You are not allowed to access this route".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::password::hash_password,
        users::model::NewUser,
    };
    use axum::http::Request;

    fn keys(secret: &str, issuer: &str, audience: &str) -> JwtKeys {
        JwtKeys::from(&JwtConfig {
            secret: secret.into(),
            issuer: issuer.into(),
            audience: audience.into(),
            ttl_minutes: 5,
        })
    }

    #[test]
    fn sign_and_verify_token() {
        let keys = keys("dev-secret", "test-issuer", "test-aud");
        let user_id = Uuid::new_v4();
        let token = keys.issue(user_id).expect("sign");
        let claims = keys.verify(&token).expect("verify");
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.iss, "test-issuer");
        assert_eq!(claims.aud, "test-aud");
        assert_eq!(claims.exp - claims.iat, 300);
    }

    #[test]
    fn verify_rejects_wrong_secret_issuer_or_audience() {
        let good = keys("same-secret", "iss", "aud");
        let token = good.issue(Uuid::new_v4()).unwrap();
        assert!(keys("other-secret", "iss", "aud").verify(&token).is_err());
        assert!(keys("same-secret", "bad-iss", "aud").verify(&token).is_err());
        assert!(keys("same-secret", "iss", "bad-aud").verify(&token).is_err());
    }

    #[test]
    fn verify_rejects_tampered_and_expired_tokens() {
        let keys = keys("dev-secret", "iss", "aud");
        let mut token = keys.issue(Uuid::new_v4()).unwrap();
        token.push('x');
        assert!(keys.verify(&token).is_err());

        let past = OffsetDateTime::now_utc() - TimeDuration::hours(2);
        let claims = Claims {
            sub: Uuid::new_v4(),
            iat: past.unix_timestamp() as usize,
            iat_ms: unix_millis(past),
            exp: (past + TimeDuration::minutes(5)).unix_timestamp() as usize,
            iss: "iss".into(),
            aud: "aud".into(),
        };
        let expired = encode(&Header::default(), &claims, &keys.encoding).unwrap();
        assert!(keys.verify(&expired).is_err());
    }

    async fn extract(state: &AppState, auth: Option<String>) -> Result<AuthUser, AppError> {
        let mut req = Request::builder().uri("/");
        if let Some(value) = auth {
            req = req.header(AUTHORIZATION, value);
        }
        let (mut parts, _) = req.body(()).unwrap().into_parts();
        AuthUser::from_request_parts(&mut parts, state).await
    }

    async fn seed(state: &AppState) -> User {
        state
            .users
            .create(NewUser {
                name: "Alice".into(),
                slug: "alice".into(),
                email: "a@x.com".into(),
                phone: None,
                password: hash_password("secret1").await.unwrap(),
                profile_image: None,
                role: Role::User,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn extractor_loads_the_caller() {
        let state = AppState::fake();
        let user = seed(&state).await;
        let token = JwtKeys::from_ref(&state).issue(user.id).unwrap();

        let AuthUser(found) = extract(&state, Some(format!("Bearer {token}"))).await.unwrap();
        assert_eq!(found.id, user.id);

        assert!(matches!(extract(&state, None).await, Err(AppError::Auth(_))));
        assert!(matches!(
            extract(&state, Some(format!("Token {token}"))).await,
            Err(AppError::Auth(_))
        ));
    }

    #[tokio::test]
    async fn extractor_rejects_deleted_users_and_stale_tokens() {
        let state = AppState::fake();
        let user = seed(&state).await;
        let token = JwtKeys::from_ref(&state).issue(user.id).unwrap();

        let later = OffsetDateTime::now_utc() + TimeDuration::seconds(5);
        state
            .users
            .set_password(user.id, hash_password("another1").await.unwrap(), later)
            .await
            .unwrap();
        let err = extract(&state, Some(format!("Bearer {token}"))).await.unwrap_err();
        assert!(err.to_string().contains("recently changed password"));

        state.users.delete(user.id).await.unwrap();
        let err = extract(&state, Some(format!("Bearer {token}"))).await.unwrap_err();
        assert!(err.to_string().contains("no longer exists"));
    }

    #[tokio::test]
    async fn token_issued_a_millisecond_before_a_password_change_is_stale() {
        let state = AppState::fake();
        let user = seed(&state).await;
        let keys = JwtKeys::from_ref(&state);
        let token = keys.issue(user.id).unwrap();
        let claims = keys.verify(&token).unwrap();

        let changed = OffsetDateTime::from_unix_timestamp_nanos(
            (claims.iat_ms as i128 + 1) * 1_000_000,
        )
        .unwrap();
        state
            .users
            .set_password(user.id, hash_password("another1").await.unwrap(), changed)
            .await
            .unwrap();

        let err = extract(&state, Some(format!("Bearer {token}"))).await.unwrap_err();
        assert!(err.to_string().contains("recently changed password"));
    }

    #[tokio::test]
    async fn require_role_forbids_plain_users() {
        let state = AppState::fake();
        let mut user = seed(&state).await;
        assert!(matches!(
            require_role(&AuthUser(user.clone()), Role::Admin),
            Err(AppError::Forbidden(_))
        ));
        user.role = Role::Admin;
        assert!(require_role(&AuthUser(user), Role::Admin).is_ok());
    }
}
