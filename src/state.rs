use std::sync::Arc;

use tracing::warn;

use crate::config::AppConfig;
use crate::mail::{LogMailer, Mailer, SmtpMailer};
use crate::storage::{self, StorageClient};
use crate::store::{ChallengeStore, MemoryStore, PgStore, UserStore};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: Arc<dyn UserStore>,
    pub challenges: Arc<dyn ChallengeStore>,
    pub mailer: Arc<dyn Mailer>,
    pub storage: Arc<dyn StorageClient>,
    /// Present when backed by Postgres, for migrations.
    pub db: Option<sqlx::PgPool>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let users: Arc<dyn UserStore>;
        let challenges: Arc<dyn ChallengeStore>;
        let mut db = None;
        match &config.database_url {
            Some(url) => {
                let pg = Arc::new(PgStore::connect(url).await?);
                db = Some(pg.pool().clone());
                users = pg.clone();
                challenges = pg;
            }
            None => {
                warn!("DATABASE_URL not set; using in-memory store, data is lost on restart");
                let mem = Arc::new(MemoryStore::new());
                users = mem.clone();
                challenges = mem;
            }
        }

        let mailer: Arc<dyn Mailer> = match &config.smtp {
            Some(smtp) => Arc::new(SmtpMailer::new(smtp, &config.company_name)?),
            None => {
                warn!("SMTP_HOST not set; account codes are written to the log (development only)");
                Arc::new(LogMailer)
            }
        };

        let storage = storage::from_config(&config.storage).await?;

        Ok(Self {
            config,
            users,
            challenges,
            mailer,
            storage,
            db,
        })
    }
}

#[cfg(test)]
impl AppState {
    pub fn fake() -> Self {
        Self::fake_with(Arc::new(crate::mail::testing::RecordingMailer::default())).0
    }

    pub fn fake_with_mailer(mailer: Arc<dyn Mailer>) -> Self {
        Self::fake_with(mailer).0
    }

    pub fn fake_with_storage() -> (Self, Arc<storage::testing::MemoryStorage>) {
        Self::fake_with(Arc::new(crate::mail::testing::RecordingMailer::default()))
    }

    fn fake_with(mailer: Arc<dyn Mailer>) -> (Self, Arc<storage::testing::MemoryStorage>) {
        use crate::config::{EmailVerifyMode, JwtConfig, StorageConfig};

        let config = Arc::new(AppConfig {
            database_url: None,
            jwt: JwtConfig {
                secret: "test".into(),
                issuer: "test".into(),
                audience: "test".into(),
                ttl_minutes: 5,
            },
            company_name: "Userbase".into(),
            email_verify_mode: EmailVerifyMode::Strict,
            smtp: None,
            storage: StorageConfig::Local {
                root: "uploads".into(),
            },
        });

        let store = Arc::new(MemoryStore::new());
        let storage = Arc::new(storage::testing::MemoryStorage::default());
        let state = Self {
            config,
            users: store.clone(),
            challenges: store,
            mailer,
            storage: storage.clone(),
            db: None,
        };
        (state, storage)
    }

    pub fn with_verify_mode(mut self, mode: crate::config::EmailVerifyMode) -> Self {
        let mut config = (*self.config).clone();
        config.email_verify_mode = mode;
        self.config = Arc::new(config);
        self
    }
}
