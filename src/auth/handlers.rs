use axum::{
    extract::State,
    http::StatusCode,
    routing::{post, put},
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::{
        dto::{
            AuthResponse, DataResponse, EmailRequest, LoginRequest, ResetPasswordRequest,
            SignupRequest, StatusResponse, TokenResponse, VerifyEmailRequest,
            VerifyResetCodeRequest,
        },
        services,
    },
    error::AppError,
    extract::AppJson,
    state::AppState,
    users::model::PublicUser,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/signup", post(signup))
        .route("/auth/login", post(login))
        .route("/auth/sendVerifyEmail", post(send_verify_email))
        .route("/auth/verifyEmail", post(verify_email))
        .route("/auth/forgotPassword", post(forgot_password))
        .route("/auth/verifyResetCode", post(verify_reset_code))
        .route("/auth/resetPassword", put(reset_password))
}

#[instrument(skip(state, payload))]
pub async fn signup(
    State(state): State<AppState>,
    AppJson(payload): AppJson<SignupRequest>,
) -> Result<(StatusCode, Json<DataResponse<PublicUser>>), AppError> {
    let user = services::signup(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(DataResponse::success(user.into()))))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    AppJson(payload): AppJson<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let (user, token) = services::login(&state, payload).await?;
    Ok(Json(AuthResponse {
        data: user.into(),
        token,
    }))
}

#[instrument(skip(state, payload))]
pub async fn send_verify_email(
    State(state): State<AppState>,
    AppJson(payload): AppJson<EmailRequest>,
) -> Result<Json<StatusResponse>, AppError> {
    services::send_verify_email_code(&state, &payload.email).await?;
    Ok(Json(StatusResponse::message(
        "Email verification code sent to email",
    )))
}

#[instrument(skip(state, payload))]
pub async fn verify_email(
    State(state): State<AppState>,
    AppJson(payload): AppJson<VerifyEmailRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    let token = services::verify_email(&state, payload).await?;
    Ok(Json(TokenResponse::success(token)))
}

#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    AppJson(payload): AppJson<EmailRequest>,
) -> Result<Json<StatusResponse>, AppError> {
    services::forgot_password(&state, &payload.email).await?;
    Ok(Json(StatusResponse::message("Reset code sent to email")))
}

#[instrument(skip(state, payload))]
pub async fn verify_reset_code(
    State(state): State<AppState>,
    AppJson(payload): AppJson<VerifyResetCodeRequest>,
) -> Result<Json<StatusResponse>, AppError> {
    services::verify_pass_reset_code(&state, &payload.reset_code).await?;
    Ok(Json(StatusResponse::success()))
}

#[instrument(skip(state, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    AppJson(payload): AppJson<ResetPasswordRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    let token = services::reset_password(&state, payload).await?;
    Ok(Json(TokenResponse::success(token)))
}
