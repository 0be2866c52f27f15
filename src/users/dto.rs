use serde::{Deserialize, Serialize};

use super::model::Role;

pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Pagination {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}
fn default_limit() -> i64 { 20 }

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            offset: 0,
        }
    }
}

impl Pagination {
    pub fn clamped(self) -> (i64, i64) {
        (self.limit.clamp(1, MAX_PAGE_SIZE), self.offset.max(0))
    }
}

/// Self-service profile edit. Email, role and password are not editable here.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UpdateMeRequest {
    pub name: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChangeMyPasswordRequest {
    pub password: String,
    pub password_confirm: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub password_confirm: String,
    pub phone: Option<String>,
    pub role: Option<Role>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub role: Option<Role>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChangeUserPasswordRequest {
    pub current_password: String,
    pub password: String,
    pub password_confirm: String,
}

#[derive(Debug, Serialize)]
pub struct DataBody<T> {
    pub data: T,
}

#[derive(Debug, Serialize)]
pub struct ListBody<T> {
    pub results: usize,
    pub data: Vec<T>,
}
