use axum::extract::FromRef;
use time::OffsetDateTime;
use tracing::{error, info, warn};

use crate::{
    auth::{
        challenge::{ChallengeKind, PendingChallenge},
        codes,
        dto::{LoginRequest, ResetPasswordRequest, SignupRequest, VerifyEmailRequest},
        jwt::JwtKeys,
        password::{hash_password, verify_password},
    },
    config::EmailVerifyMode,
    error::AppError,
    mail::{templates, MailMessage},
    state::AppState,
    users::model::{NewUser, Role, User},
    validation::{normalize_email, slugify, Validator},
};

const BAD_CREDENTIALS: &str = "Incorrect email or password";

pub(crate) fn issue_token(st: &AppState, user: &User) -> Result<String, AppError> {
    Ok(JwtKeys::from_ref(st).issue(user.id)?)
}

async fn user_by_email(st: &AppState, email: &str) -> Result<User, AppError> {
    st.users
        .find_by_email(email)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("There is no user with that email {email}")))
}

fn email_field(raw: &str) -> Result<String, AppError> {
    let email = normalize_email(raw);
    Validator::new().email("email", &email).finish()?;
    Ok(email)
}

pub async fn signup(st: &AppState, req: SignupRequest) -> Result<User, AppError> {
    let email = normalize_email(&req.email);
    Validator::new()
        .name("name", &req.name)
        .email("email", &email)
        .password("password", &req.password)
        .confirmation("passwordConfirm", &req.password, &req.password_confirm)
        .finish()?;

    if st.users.find_by_email(&email).await?.is_some() {
        warn!(%email, "email already registered");
        return Err(AppError::Conflict("E-mail already in use".into()));
    }

    let name = req.name.trim().to_string();
    let user = st
        .users
        .create(NewUser {
            slug: slugify(&name),
            name,
            email,
            phone: req.phone.filter(|p| !p.trim().is_empty()),
            password: hash_password(&req.password).await?,
            profile_image: None,
            role: Role::User,
        })
        .await?;

    info!(user_id = %user.id, "user signed up");
    Ok(user)
}

/// Unknown email and wrong password fail identically.
pub async fn login(st: &AppState, req: LoginRequest) -> Result<(User, String), AppError> {
    let email = normalize_email(&req.email);
    Validator::new()
        .email("email", &email)
        .required("password", &req.password, "Password required")
        .finish()?;

    let Some(user) = st.users.find_by_email(&email).await? else {
        warn!("login unknown email");
        return Err(AppError::Auth(BAD_CREDENTIALS.into()));
    };
    if !verify_password(&req.password, &user.password).await? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(AppError::Auth(BAD_CREDENTIALS.into()));
    }

    let token = issue_token(st, &user)?;
    info!(user_id = %user.id, "user logged in");
    Ok((user, token))
}

/// Store a fresh challenge and mail its code; a failed send drops the challenge.
async fn issue_challenge(
    st: &AppState,
    user: &User,
    kind: ChallengeKind,
    compose: fn(&str, &str, &str, &str) -> MailMessage,
) -> Result<(), AppError> {
    let code = codes::generate();
    st.challenges
        .put(PendingChallenge::issue(
            user.id,
            kind,
            code.hash,
            OffsetDateTime::now_utc(),
        ))
        .await?;

    let message = compose(&user.email, &user.name, &st.config.company_name, &code.plain);
    if let Err(e) = st.mailer.send(&message).await {
        error!(user_id = %user.id, %kind, error = ?e, "code delivery failed");
        st.challenges.clear(user.id, kind).await?;
        return Err(AppError::Delivery("There is an error in sending email".into()));
    }

    info!(user_id = %user.id, %kind, "code sent");
    Ok(())
}

pub async fn send_verify_email_code(st: &AppState, email: &str) -> Result<(), AppError> {
    let email = email_field(email)?;
    let user = user_by_email(st, &email).await?;
    issue_challenge(st, &user, ChallengeKind::EmailVerify, templates::email_verification).await
}

/// Marks the email verified and returns a fresh token.
pub async fn verify_email(st: &AppState, req: VerifyEmailRequest) -> Result<String, AppError> {
    let email = email_field(&req.email)?;
    let user = user_by_email(st, &email).await?;
    let not_verified = || AppError::invalid("code", "Email verification code not verified");

    let kind = ChallengeKind::EmailVerify;
    let pending = st.challenges.get(user.id, kind).await?.ok_or_else(not_verified)?;
    if st.config.email_verify_mode == EmailVerifyMode::Strict {
        let code = req.code.as_deref().unwrap_or_default();
        if code.trim().is_empty() || !pending.accepts(code, OffsetDateTime::now_utc()) {
            warn!(user_id = %user.id, "email verification code rejected");
            return Err(not_verified());
        }
    }

    st.users.mark_email_verified(user.id).await?;
    st.challenges.clear(user.id, kind).await?;
    info!(user_id = %user.id, "email verified");
    issue_token(st, &user)
}

pub async fn forgot_password(st: &AppState, email: &str) -> Result<(), AppError> {
    let email = email_field(email)?;
    let user = user_by_email(st, &email).await?;
    issue_challenge(st, &user, ChallengeKind::PasswordReset, templates::password_reset).await
}

pub async fn verify_pass_reset_code(st: &AppState, reset_code: &str) -> Result<(), AppError> {
    Validator::new()
        .required("resetCode", reset_code, "Reset code required")
        .finish()?;

    let user_id = st
        .challenges
        .verify_code(
            ChallengeKind::PasswordReset,
            &codes::digest(reset_code),
            OffsetDateTime::now_utc(),
        )
        .await?
        .ok_or_else(|| AppError::invalid("resetCode", "Reset code invalid or expired"))?;

    info!(%user_id, "reset code verified");
    Ok(())
}

/// Consumes the verified reset challenge, so a second call fails.
pub async fn reset_password(st: &AppState, req: ResetPasswordRequest) -> Result<String, AppError> {
    let email = normalize_email(&req.email);
    Validator::new()
        .email("email", &email)
        .password("newPassword", &req.new_password)
        .finish()?;
    let user = user_by_email(st, &email).await?;

    let now = OffsetDateTime::now_utc();
    if st
        .challenges
        .consume_verified(user.id, ChallengeKind::PasswordReset, now)
        .await?
        .is_none()
    {
        warn!(user_id = %user.id, "reset attempted without verified code");
        return Err(AppError::invalid("resetCode", "Reset code not verified"));
    }

    let user = st
        .users
        .set_password(user.id, hash_password(&req.new_password).await?, now)
        .await?
        .ok_or_else(|| AppError::no_document(user.id))?;

    info!(user_id = %user.id, "password reset");
    issue_token(st, &user)
}
