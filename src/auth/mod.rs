use crate::state::AppState;
use axum::Router;

pub mod challenge;
pub mod codes;
pub mod dto;
pub mod handlers;
pub mod jwt;
pub mod password;
pub mod services;

pub use jwt::{require_role, AuthUser};

pub fn router() -> Router<AppState> {
    handlers::auth_routes()
}
