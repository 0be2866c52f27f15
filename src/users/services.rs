use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    dto::{
        ChangeMyPasswordRequest, ChangeUserPasswordRequest, CreateUserRequest, Pagination,
        UpdateMeRequest, UpdateUserRequest,
    },
    model::{NewUser, User, UserChanges},
};
use crate::{
    auth::{
        password::{hash_password, verify_password},
        services::issue_token,
    },
    error::AppError,
    images::services::{remove_profile_image, store_profile_image, UploadedImage},
    state::AppState,
    validation::{normalize_email, slugify, Validator},
};

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

async fn store_image(st: &AppState, image: Option<UploadedImage>) -> Result<Option<String>, AppError> {
    match image {
        Some(image) => Ok(Some(store_profile_image(st, image).await?)),
        None => Ok(None),
    }
}

/// Applies `changes` and cleans up images: the new one if the write failed,
/// the previous one once it has been replaced.
async fn apply_changes(
    st: &AppState,
    id: Uuid,
    changes: UserChanges,
    previous_image: Option<String>,
) -> Result<User, AppError> {
    let new_image = changes.profile_image.clone();
    let result = st.users.update(id, changes).await;

    match (&result, new_image) {
        (Ok(Some(_)), Some(_)) => {
            if let Some(old) = previous_image {
                remove_profile_image(st, &old).await;
            }
        }
        (_, Some(fresh)) => remove_profile_image(st, &fresh).await,
        _ => {}
    }
    result?.ok_or_else(|| AppError::no_document(id))
}

pub async fn get_user(st: &AppState, id: Uuid) -> Result<User, AppError> {
    st.users
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::no_document(id))
}

/// Returns the updated record and a fresh token; older tokens stop working.
pub async fn change_my_password(
    st: &AppState,
    caller: &User,
    req: ChangeMyPasswordRequest,
) -> Result<(User, String), AppError> {
    Validator::new()
        .password("password", &req.password)
        .confirmation("passwordConfirm", &req.password, &req.password_confirm)
        .finish()?;

    let user = st
        .users
        .set_password(caller.id, hash_password(&req.password).await?, OffsetDateTime::now_utc())
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    let token = issue_token(st, &user)?;
    info!(user_id = %user.id, "password changed");
    Ok((user, token))
}

pub async fn update_me(
    st: &AppState,
    caller: &User,
    req: UpdateMeRequest,
    image: Option<UploadedImage>,
) -> Result<User, AppError> {
    let name = non_blank(req.name);
    let mut v = Validator::new();
    if let Some(name) = &name {
        v.name("name", name);
    }
    v.finish()?;

    let changes = UserChanges {
        slug: name.as_deref().map(slugify),
        name,
        phone: non_blank(req.phone),
        profile_image: store_image(st, image).await?,
        ..Default::default()
    };
    let user = apply_changes(st, caller.id, changes, caller.profile_image.clone()).await?;
    info!(user_id = %user.id, "profile updated");
    Ok(user)
}

pub async fn deactivate_me(st: &AppState, caller: &User) -> Result<(), AppError> {
    if !st.users.set_active(caller.id, false).await? {
        return Err(AppError::NotFound("User not found".into()));
    }
    info!(user_id = %caller.id, "account deactivated");
    Ok(())
}

pub async fn list_users(st: &AppState, page: Pagination) -> Result<Vec<User>, AppError> {
    let (limit, offset) = page.clamped();
    st.users.list(limit, offset).await
}

pub async fn create_user(
    st: &AppState,
    req: CreateUserRequest,
    image: Option<UploadedImage>,
) -> Result<User, AppError> {
    let email = normalize_email(&req.email);
    Validator::new()
        .name("name", &req.name)
        .email("email", &email)
        .password("password", &req.password)
        .confirmation("passwordConfirm", &req.password, &req.password_confirm)
        .finish()?;

    let name = req.name.trim().to_string();
    let password = hash_password(&req.password).await?;
    let profile_image = store_image(st, image).await?;
    let created = st
        .users
        .create(NewUser {
            slug: slugify(&name),
            name,
            email,
            phone: non_blank(req.phone),
            password,
            profile_image: profile_image.clone(),
            role: req.role.unwrap_or_default(),
        })
        .await;

    match created {
        Ok(user) => {
            info!(user_id = %user.id, role = %user.role, "user created by admin");
            Ok(user)
        }
        Err(e) => {
            if let Some(fresh) = profile_image {
                remove_profile_image(st, &fresh).await;
            }
            Err(e)
        }
    }
}

pub async fn update_user(
    st: &AppState,
    id: Uuid,
    req: UpdateUserRequest,
    image: Option<UploadedImage>,
) -> Result<User, AppError> {
    let name = non_blank(req.name);
    let email = req.email.as_deref().map(normalize_email);
    let mut v = Validator::new();
    if let Some(name) = &name {
        v.name("name", name);
    }
    if let Some(email) = &email {
        v.email("email", email);
    }
    v.finish()?;

    let existing = get_user(st, id).await?;
    let changes = UserChanges {
        slug: name.as_deref().map(slugify),
        name,
        email,
        phone: non_blank(req.phone),
        role: req.role,
        profile_image: store_image(st, image).await?,
    };
    let user = apply_changes(st, id, changes, existing.profile_image).await?;
    info!(user_id = %user.id, "user updated by admin");
    Ok(user)
}

/// Hard delete; the stored profile image is removed best effort.
pub async fn delete_user(st: &AppState, id: Uuid) -> Result<(), AppError> {
    let user = st
        .users
        .delete(id)
        .await?
        .ok_or_else(|| AppError::no_document(id))?;
    if let Some(image) = &user.profile_image {
        remove_profile_image(st, image).await;
    }
    info!(user_id = %id, "user deleted");
    Ok(())
}

/// `currentPassword` is checked against the target record, not the caller.
pub async fn change_user_password(
    st: &AppState,
    id: Uuid,
    req: ChangeUserPasswordRequest,
) -> Result<User, AppError> {
    let mut v = Validator::new();
    v.required("currentPassword", &req.current_password, "You must enter your current password")
        .required("passwordConfirm", &req.password_confirm, "You must enter the password confirm");
    if req.password.is_empty() {
        v.fail("password", "You must enter new password");
    } else {
        v.password("password", &req.password);
    }
    v.finish()?;

    let target = get_user(st, id).await?;
    if !verify_password(&req.current_password, &target.password).await? {
        warn!(user_id = %id, "admin password change with wrong current password");
        return Err(AppError::invalid("currentPassword", "Incorrect current password"));
    }
    Validator::new()
        .confirmation("passwordConfirm", &req.password, &req.password_confirm)
        .finish()?;

    let user = st
        .users
        .set_password(id, hash_password(&req.password).await?, OffsetDateTime::now_utc())
        .await?
        .ok_or_else(|| AppError::no_document(id))?;
    info!(user_id = %id, "password changed by admin");
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::{
            dto::{LoginRequest, SignupRequest},
            services as auth,
        },
        users::model::Role,
    };
    use bytes::Bytes;

    async fn alice(st: &AppState) -> User {
        auth::signup(
            st,
            SignupRequest {
                name: "Alice".into(),
                email: "a@x.com".into(),
                password: "secret1".into(),
                password_confirm: "secret1".into(),
                phone: None,
            },
        )
        .await
        .unwrap()
    }

    fn png() -> UploadedImage {
        UploadedImage {
            body: Bytes::from_static(b"png"),
            content_type: "image/png".into(),
        }
    }

    fn login(email: &str, password: &str) -> LoginRequest {
        LoginRequest {
            email: email.into(),
            password: password.into(),
        }
    }

    #[tokio::test]
    async fn own_password_change_invalidates_old_password() {
        let st = AppState::fake();
        let user = alice(&st).await;

        let (updated, token) = change_my_password(
            &st,
            &user,
            ChangeMyPasswordRequest {
                password: "secret2".into(),
                password_confirm: "secret2".into(),
            },
        )
        .await
        .unwrap();

        assert!(updated.password_changed_at.is_some());
        assert!(!token.is_empty());
        assert!(matches!(
            auth::login(&st, login("a@x.com", "secret1")).await,
            Err(AppError::Auth(_))
        ));
        auth::login(&st, login("a@x.com", "secret2")).await.unwrap();
    }

    #[tokio::test]
    async fn update_me_rederives_slug_and_replaces_image() {
        let (st, storage) = AppState::fake_with_storage();
        let user = alice(&st).await;

        let first = update_me(&st, &user, UpdateMeRequest::default(), Some(png()))
            .await
            .unwrap();
        let first_image = first.profile_image.clone().unwrap();

        let second = update_me(
            &st,
            &first,
            UpdateMeRequest {
                name: Some("Alice Liddell".into()),
                phone: Some("+96170000000".into()),
            },
            Some(png()),
        )
        .await
        .unwrap();

        assert_eq!(second.slug, "alice-liddell");
        assert_eq!(second.email, "a@x.com");
        assert_eq!(second.phone.as_deref(), Some("+96170000000"));
        let second_image = second.profile_image.clone().unwrap();
        assert_ne!(first_image, second_image);
        assert_eq!(storage.keys(), vec![format!("users/{second_image}")]);
    }

    #[tokio::test]
    async fn deactivate_is_soft() {
        let st = AppState::fake();
        let user = alice(&st).await;
        deactivate_me(&st, &user).await.unwrap();
        let stored = get_user(&st, user.id).await.unwrap();
        assert!(!stored.active);
    }

    #[tokio::test]
    async fn admin_create_update_delete() {
        let (st, storage) = AppState::fake_with_storage();
        let created = create_user(
            &st,
            CreateUserRequest {
                name: "Bob Builder".into(),
                email: "Bob@X.com".into(),
                password: "secret1".into(),
                password_confirm: "secret1".into(),
                phone: None,
                role: Some(Role::Admin),
            },
            Some(png()),
        )
        .await
        .unwrap();
        assert_eq!(created.email, "bob@x.com");
        assert_eq!(created.role, Role::Admin);
        assert!(created.profile_image.is_some());

        alice(&st).await;
        let err = update_user(
            &st,
            created.id,
            UpdateUserRequest {
                email: Some("a@x.com".into()),
                ..Default::default()
            },
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let updated = update_user(
            &st,
            created.id,
            UpdateUserRequest {
                name: Some("Robert".into()),
                role: Some(Role::User),
                ..Default::default()
            },
            None,
        )
        .await
        .unwrap();
        assert_eq!(updated.slug, "robert");
        assert_eq!(updated.role, Role::User);

        delete_user(&st, created.id).await.unwrap();
        assert!(storage.keys().is_empty());
        let err = delete_user(&st, created.id).await.unwrap_err();
        assert_eq!(err.to_string(), format!("No document for this id {}", created.id));
    }

    #[tokio::test]
    async fn failed_update_discards_uploaded_image() {
        let (st, storage) = AppState::fake_with_storage();
        let a = alice(&st).await;
        let b = create_user(
            &st,
            CreateUserRequest {
                name: "Bob".into(),
                email: "b@x.com".into(),
                password: "secret1".into(),
                password_confirm: "secret1".into(),
                ..Default::default()
            },
            None,
        )
        .await
        .unwrap();

        let err = update_user(
            &st,
            b.id,
            UpdateUserRequest {
                email: Some(a.email.clone()),
                ..Default::default()
            },
            Some(png()),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert!(storage.keys().is_empty());
    }

    #[tokio::test]
    async fn admin_password_change_checks_target_current_password() {
        let st = AppState::fake();
        let target = alice(&st).await;
        let req = |current: &str| ChangeUserPasswordRequest {
            current_password: current.into(),
            password: "newpass1".into(),
            password_confirm: "newpass1".into(),
        };

        let err = change_user_password(&st, target.id, req("wrong")).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let missing = Uuid::new_v4();
        let err = change_user_password(&st, missing, req("secret1")).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let updated = change_user_password(&st, target.id, req("secret1")).await.unwrap();
        assert!(updated.password_changed_at.is_some());
        auth::login(&st, login("a@x.com", "newpass1")).await.unwrap();
    }

    #[tokio::test]
    async fn list_is_paginated() {
        let st = AppState::fake();
        for i in 0..3 {
            create_user(
                &st,
                CreateUserRequest {
                    name: format!("User {i}"),
                    email: format!("u{i}@x.com"),
                    password: "secret1".into(),
                    password_confirm: "secret1".into(),
                    ..Default::default()
                },
                None,
            )
            .await
            .unwrap();
        }
        assert_eq!(list_users(&st, Pagination::default()).await.unwrap().len(), 3);
        let page = list_users(&st, Pagination { limit: 2, offset: 2 }).await.unwrap();
        assert_eq!(page.len(), 1);
    }
}
