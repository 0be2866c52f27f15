use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;
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

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    emails: HashMap<String, Uuid>, // email -> user_id
    challenges: HashMap<(Uuid, ChallengeKind), PendingChallenge>,
}

/// Process-local store used when no database is configured, and by tests.
///
/// One mutex guards all tables so the email index and the records never
/// disagree, which is what makes duplicate signups fail atomically.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create(&self, new: NewUser) -> Result<User, AppError> {
        check_record(Some(&new.name), Some(&new.email))?;
        let mut t = self.tables.lock().await;
        if t.emails.contains_key(&new.email) {
            return Err(email_taken());
        }
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            name: new.name,
            slug: new.slug,
            email: new.email,
            phone: new.phone,
            password: new.password,
            profile_image: new.profile_image,
            role: new.role,
            active: true,
            email_verified: false,
            password_changed_at: None,
            created_at: now,
            updated_at: now,
        };
        t.emails.insert(user.email.clone(), user.id);
        t.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        Ok(self.tables.lock().await.users.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let t = self.tables.lock().await;
        Ok(t.emails.get(email).and_then(|id| t.users.get(id)).cloned())
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<User>, AppError> {
        let t = self.tables.lock().await;
        let mut users: Vec<User> = t.users.values().cloned().collect();
        users.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(users
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn update(&self, id: Uuid, changes: UserChanges) -> Result<Option<User>, AppError> {
        check_record(changes.name.as_deref(), changes.email.as_deref())?;
        let mut t = self.tables.lock().await;
        if !t.users.contains_key(&id) {
            return Ok(None);
        }
        if let Some(email) = &changes.email {
            if t.emails.get(email).is_some_and(|owner| *owner != id) {
                return Err(email_taken());
            }
        }

        let Tables { users, emails, .. } = &mut *t;
        let Some(user) = users.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(email) = changes.email {
            emails.remove(&user.email);
            emails.insert(email.clone(), id);
            user.email = email;
        }
        if let Some(name) = changes.name {
            user.name = name;
        }
        if let Some(slug) = changes.slug {
            user.slug = slug;
        }
        if let Some(phone) = changes.phone {
            user.phone = Some(phone);
        }
        if let Some(image) = changes.profile_image {
            user.profile_image = Some(image);
        }
        if let Some(role) = changes.role {
            user.role = role;
        }
        user.updated_at = OffsetDateTime::now_utc();
        Ok(Some(user.clone()))
    }

    async fn set_password(
        &self,
        id: Uuid,
        password: HashedPassword,
        changed_at: OffsetDateTime,
    ) -> Result<Option<User>, AppError> {
        let mut t = self.tables.lock().await;
        Ok(t.users.get_mut(&id).map(|user| {
            user.password = password;
            user.password_changed_at = Some(changed_at);
            user.updated_at = changed_at;
            user.clone()
        }))
    }

    async fn set_active(&self, id: Uuid, active: bool) -> Result<bool, AppError> {
        let mut t = self.tables.lock().await;
        Ok(t.users
            .get_mut(&id)
            .map(|user| {
                user.active = active;
                user.updated_at = OffsetDateTime::now_utc();
            })
            .is_some())
    }

    async fn mark_email_verified(&self, id: Uuid) -> Result<bool, AppError> {
        let mut t = self.tables.lock().await;
        Ok(t.users
            .get_mut(&id)
            .map(|user| {
                user.email_verified = true;
                user.updated_at = OffsetDateTime::now_utc();
            })
            .is_some())
    }

    async fn delete(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let mut t = self.tables.lock().await;
        let removed = t.users.remove(&id);
        if let Some(user) = &removed {
            t.emails.remove(&user.email);
            t.challenges.retain(|(owner, _), _| *owner != id);
        }
        Ok(removed)
    }
}

#[async_trait]
impl ChallengeStore for MemoryStore {
    async fn put(&self, challenge: PendingChallenge) -> Result<(), AppError> {
        let mut t = self.tables.lock().await;
        if !t.users.contains_key(&challenge.user_id) {
            return Err(AppError::no_document(challenge.user_id));
        }
        t.challenges
            .insert((challenge.user_id, challenge.kind), challenge);
        Ok(())
    }

    async fn get(
        &self,
        user_id: Uuid,
        kind: ChallengeKind,
    ) -> Result<Option<PendingChallenge>, AppError> {
        Ok(self.tables.lock().await.challenges.get(&(user_id, kind)).cloned())
    }

    async fn verify_code(
        &self,
        kind: ChallengeKind,
        code_hash: &str,
        now: OffsetDateTime,
    ) -> Result<Option<Uuid>, AppError> {
        let mut t = self.tables.lock().await;
        let found = t
            .challenges
            .values_mut()
            .filter(|c| c.kind == kind && c.code_hash == code_hash && !c.is_expired(now))
            .max_by_key(|c| c.expires_at);
        Ok(found.map(|c| {
            c.verified = true;
            c.user_id
        }))
    }

    async fn consume_verified(
        &self,
        user_id: Uuid,
        kind: ChallengeKind,
        now: OffsetDateTime,
    ) -> Result<Option<PendingChallenge>, AppError> {
        let mut t = self.tables.lock().await;
        let key = (user_id, kind);
        let usable = t
            .challenges
            .get(&key)
            .is_some_and(|c| c.verified && !c.is_expired(now));
        Ok(if usable { t.challenges.remove(&key) } else { None })
    }

    async fn clear(&self, user_id: Uuid, kind: ChallengeKind) -> Result<(), AppError> {
        self.tables.lock().await.challenges.remove(&(user_id, kind));
        Ok(())
    }
}
