use crate::domain::UserEmail;
use secrecy::{ExposeSecret, Secret};
use sqlx::postgres::{PgConnectOptions, PgSslMode};

#[derive(serde::Deserialize, Clone)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub application: ApplicationSettings,
    pub relay: RelaySettings,
    pub storage: StorageSettings,
    pub tokens: TokenSettings,
}

#[derive(serde::Deserialize, Clone)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
    pub jwt_secret: Secret<String>,
    #[serde(default = "default_token_ttl_seconds")]
    pub token_ttl_seconds: i64,
}

fn default_token_ttl_seconds() -> i64 {
    24 * 60 * 60
}

impl ApplicationSettings {
    pub fn token_ttl(&self) -> time::Duration {
        time::Duration::seconds(self.token_ttl_seconds)
    }
}

#[derive(serde::Deserialize, Clone)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: Secret<String>,
    pub port: u16,
    pub host: String,
    pub database_name: String,
    #[serde(default)]
    pub require_ssl: bool,
}

impl DatabaseSettings {
    pub fn without_db(&self) -> PgConnectOptions {
        let ssl_mode = if self.require_ssl {
            PgSslMode::Require
        } else {
            PgSslMode::Prefer
        };

        PgConnectOptions::new()
            .host(&self.host)
            .username(&self.username)
            .password(self.password.expose_secret())
            .port(self.port)
            .ssl_mode(ssl_mode)
    }

    pub fn with_db(&self) -> PgConnectOptions {
        self.without_db().database(&self.database_name)
    }
}

#[derive(serde::Deserialize, Clone)]
pub struct RelaySettings {
    pub base_url: String,
    pub auth_key: Secret<String>,
    pub project_id: String,
    pub sender_email: String,
    pub timeout_milliseconds: u64,
}

impl RelaySettings {
    pub fn sender(&self) -> Result<UserEmail, String> {
        UserEmail::parse(self.sender_email.clone())
    }

    pub fn project_id(&self) -> crate::relay::ProjectId {
        crate::relay::ProjectId::new(self.project_id.clone())
    }

    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timeout_milliseconds)
    }

    pub fn client(&self) -> Result<crate::relay::Client, anyhow::Error> {
        let sender = self.sender().map_err(|err| anyhow::anyhow!(err))?;

        let client = crate::relay::Client::new(
            self.base_url.clone(),
            self.project_id(),
            self.auth_key.clone(),
            sender,
            self.timeout(),
        )?;

        Ok(client)
    }
}

#[derive(serde::Deserialize, Clone)]
pub struct StorageSettings {
    pub default_quota_bytes: i64,
    pub max_upload_bytes: usize,
}

#[derive(serde::Deserialize, Clone)]
pub struct TokenSettings {
    pub cleanup_enabled: bool,
    pub cleanup_interval_seconds: u64,
}

impl TokenSettings {
    pub fn cleanup_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.cleanup_interval_seconds)
    }
}

pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    let settings = config::Config::builder()
        .add_source(
            config::File::new("configuration.yml", config::FileFormat::Yaml).required(false),
        )
        .add_source(config::File::new("/etc/tau.yml", config::FileFormat::Yaml).required(false))
        .add_source(
            config::Environment::with_prefix("TAU")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    settings.try_deserialize::<Settings>()
}
