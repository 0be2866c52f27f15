use std::{path::PathBuf, str::FromStr};

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

/// How strictly `verifyEmail` checks the submitted code.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmailVerifyMode {
    /// The code must match the stored digest and be unexpired.
    #[default]
    Strict,
    /// Only an outstanding verification challenge is required.
    Presence,
}

impl FromStr for EmailVerifyMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "presence" => Ok(Self::Presence),
            other => anyhow::bail!("EMAIL_VERIFY_MODE must be strict or presence, got {other:?}"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
}

#[derive(Debug, Clone, Deserialize)]
pub enum StorageConfig {
    S3 {
        endpoint: String,
        bucket: String,
        access_key: String,
        secret_key: String,
        region: String,
    },
    Local {
        root: PathBuf,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub jwt: JwtConfig,
    pub company_name: String,
    pub email_verify_mode: EmailVerifyMode,
    pub smtp: Option<SmtpConfig>,
    pub storage: StorageConfig,
}

fn var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(key) {
        Some(v) => v.parse().with_context(|| format!("invalid {key}: {v:?}")),
        None => Ok(default),
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let secret = var("JWT_SECRET").context("JWT_SECRET must be set and non-empty")?;
        let jwt = JwtConfig {
            secret,
            issuer: var("JWT_ISSUER").unwrap_or_else(|| "userbase".into()),
            audience: var("JWT_AUDIENCE").unwrap_or_else(|| "userbase-clients".into()),
            ttl_minutes: parsed("JWT_TTL_MINUTES", 60)?,
        };

        let email_verify_mode = match var("EMAIL_VERIFY_MODE") {
            Some(v) => v.parse()?,
            None => EmailVerifyMode::default(),
        };

        let smtp = match var("SMTP_HOST") {
            Some(host) => Some(SmtpConfig {
                host,
                port: parsed("SMTP_PORT", 587)?,
                username: var("SMTP_USERNAME"),
                password: var("SMTP_PASSWORD"),
                from: var("SMTP_FROM").context("SMTP_FROM is required when SMTP_HOST is set")?,
            }),
            None => None,
        };

        let storage = match var("MINIO_ENDPOINT") {
            Some(endpoint) => StorageConfig::S3 {
                endpoint,
                bucket: var("MINIO_BUCKET").context("MINIO_BUCKET is required")?,
                access_key: var("MINIO_ACCESS_KEY").context("MINIO_ACCESS_KEY is required")?,
                secret_key: var("MINIO_SECRET_KEY").context("MINIO_SECRET_KEY is required")?,
                region: var("MINIO_REGION").unwrap_or_else(|| "us-east-1".into()),
            },
            None => StorageConfig::Local {
                root: var("UPLOADS_DIR").unwrap_or_else(|| "uploads".into()).into(),
            },
        };

        Ok(Self {
            database_url: var("DATABASE_URL"),
            jwt,
            company_name: var("COMPANY_NAME").unwrap_or_else(|| "Userbase".into()),
            email_verify_mode,
            smtp,
            storage,
        })
    }
}
