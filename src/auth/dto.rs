use serde::{Deserialize, Serialize};

use crate::users::model::PublicUser;

/// Request body for signup.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub password_confirm: String,
    pub phone: Option<String>,
}

/// Request body for login.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Body of `sendVerifyEmail` and `forgotPassword`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct EmailRequest {
    pub email: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct VerifyEmailRequest {
    pub email: String,
    pub code: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VerifyResetCodeRequest {
    pub reset_code: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub email: String,
    pub new_password: String,
}

/// `{status, data}`
#[derive(Debug, Serialize)]
pub struct DataResponse<T> {
    pub status: &'static str,
    pub data: T,
}

impl<T> DataResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            status: "Success",
            data,
        }
    }
}

/// `{data, token}` returned by login and own password change.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub data: PublicUser,
    pub token: String,
}

/// `{status, token}`
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub status: &'static str,
    pub token: String,
}

impl TokenResponse {
    pub fn success(token: String) -> Self {
        Self {
            status: "Success",
            token,
        }
    }
}

/// `{status}` with an optional human message.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
}

impl StatusResponse {
    pub fn success() -> Self {
        Self {
            status: "Success",
            message: None,
        }
    }

    pub fn message(message: &'static str) -> Self {
        Self {
            status: "Success",
            message: Some(message),
        }
    }
}
