use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    routing::{delete, get, put},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use super::{
    dto::{
        ChangeMyPasswordRequest, ChangeUserPasswordRequest, CreateUserRequest, DataBody, ListBody,
        Pagination, UpdateMeRequest, UpdateUserRequest,
    },
    form::UserForm,
    model::{PublicUser, Role},
    services,
};
use crate::{
    auth::{
        dto::{AuthResponse, StatusResponse},
        require_role, AuthUser,
    },
    error::AppError,
    extract::{AppJson, AppPath, AppQuery},
    images::services::MAX_UPLOAD_BYTES,
    state::AppState,
};

type UserBody = Json<DataBody<PublicUser>>;

fn body(user: impl Into<PublicUser>) -> UserBody {
    Json(DataBody { data: user.into() })
}

pub fn me_routes() -> Router<AppState> {
    Router::new()
        .route("/users/getMe", get(get_me))
        .route("/users/changeMyPassword", put(change_my_password))
        .route("/users/updateMe", put(update_me))
        .route("/users/deleteMe", delete(delete_me))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route("/users/:id", get(get_user).put(update_user).delete(delete_user))
        .route("/users/changePassword/:id", put(change_user_password))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(me_routes())
        .merge(admin_routes())
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
}

// --- self-service ---

#[instrument(skip(state, caller), fields(user_id = %caller.0.id))]
pub async fn get_me(State(state): State<AppState>, caller: AuthUser) -> Result<UserBody, AppError> {
    Ok(body(services::get_user(&state, caller.0.id).await?))
}

#[instrument(skip(state, caller, payload), fields(user_id = %caller.0.id))]
pub async fn change_my_password(
    State(state): State<AppState>,
    caller: AuthUser,
    AppJson(payload): AppJson<ChangeMyPasswordRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let (user, token) = services::change_my_password(&state, &caller.0, payload).await?;
    Ok(Json(AuthResponse {
        data: user.into(),
        token,
    }))
}

#[instrument(skip(state, caller, form), fields(user_id = %caller.0.id))]
pub async fn update_me(
    State(state): State<AppState>,
    caller: AuthUser,
    form: UserForm<UpdateMeRequest>,
) -> Result<UserBody, AppError> {
    let user = services::update_me(&state, &caller.0, form.fields, form.image).await?;
    Ok(body(user))
}

#[instrument(skip(state, caller), fields(user_id = %caller.0.id))]
pub async fn delete_me(
    State(state): State<AppState>,
    caller: AuthUser,
) -> Result<Json<StatusResponse>, AppError> {
    services::deactivate_me(&state, &caller.0).await?;
    Ok(Json(StatusResponse::success()))
}

// --- admin ---

#[instrument(skip(state, caller))]
pub async fn list_users(
    State(state): State<AppState>,
    caller: AuthUser,
    AppQuery(page): AppQuery<Pagination>,
) -> Result<Json<ListBody<PublicUser>>, AppError> {
    require_role(&caller, Role::Admin)?;
    let users = services::list_users(&state, page).await?;
    let data: Vec<PublicUser> = users.into_iter().map(PublicUser::from).collect();
    Ok(Json(ListBody {
        results: data.len(),
        data,
    }))
}

#[instrument(skip(state, caller))]
pub async fn get_user(
    State(state): State<AppState>,
    caller: AuthUser,
    AppPath(id): AppPath<Uuid>,
) -> Result<UserBody, AppError> {
    require_role(&caller, Role::Admin)?;
    Ok(body(services::get_user(&state, id).await?))
}

#[instrument(skip(state, caller, form))]
pub async fn create_user(
    State(state): State<AppState>,
    caller: AuthUser,
    form: UserForm<CreateUserRequest>,
) -> Result<(StatusCode, UserBody), AppError> {
    require_role(&caller, Role::Admin)?;
    let user = services::create_user(&state, form.fields, form.image).await?;
    Ok((StatusCode::CREATED, body(user)))
}

#[instrument(skip(state, caller, form))]
pub async fn update_user(
    State(state): State<AppState>,
    caller: AuthUser,
    AppPath(id): AppPath<Uuid>,
    form: UserForm<UpdateUserRequest>,
) -> Result<UserBody, AppError> {
    require_role(&caller, Role::Admin)?;
    Ok(body(services::update_user(&state, id, form.fields, form.image).await?))
}

#[instrument(skip(state, caller))]
pub async fn delete_user(
    State(state): State<AppState>,
    caller: AuthUser,
    AppPath(id): AppPath<Uuid>,
) -> Result<StatusCode, AppError> {
    require_role(&caller, Role::Admin)?;
    services::delete_user(&state, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, caller, payload))]
pub async fn change_user_password(
    State(state): State<AppState>,
    caller: AuthUser,
    AppPath(id): AppPath<Uuid>,
    AppJson(payload): AppJson<ChangeUserPasswordRequest>,
) -> Result<UserBody, AppError> {
    require_role(&caller, Role::Admin)?;
    Ok(body(services::change_user_password(&state, id, payload).await?))
}
