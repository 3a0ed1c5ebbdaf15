//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration file (config/default.toml, config/local.toml)
//! 3. Environment variables (AUTHGATE__*)
//! 4. Deployment environment names (MDB_CONNECT, URL_FRONT, GOOGLE_CLIENT_ID, ...)

use serde::Deserialize;

use crate::error::AppError;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub frontend: FrontendConfig,
    pub session: SessionConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Port number (default: 4000)
    pub port: u16,
    /// Externally visible URL of this service, used to build OAuth callback URLs
    pub public_url: Option<String>,
}

impl ServerConfig {
    /// Get the base URL for callback construction
    ///
    /// Falls back to `http://localhost:{port}` when no public URL is set.
    pub fn base_url(&self) -> String {
        match &self.public_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://localhost:{}", self.port),
        }
    }
}

/// User store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Store connection string (e.g., "sqlite://authgate.db?mode=rwc")
    pub url: String,
}

/// Frontend the service logs users into
#[derive(Debug, Clone, Deserialize)]
pub struct FrontendConfig {
    /// Frontend origin: CORS allow-list entry and post-login redirect target
    pub url: String,
    /// Path under `url` that failed logins are sent to
    pub failure_path: String,
}

impl FrontendConfig {
    /// Where a successful login lands
    pub fn success_url(&self) -> &str {
        &self.url
    }

    /// Where a failed login lands
    pub fn failure_url(&self) -> String {
        format!("{}{}", self.url.trim_end_matches('/'), self.failure_path)
    }

    /// The serialized origin (`scheme://host[:port]`) used for CORS
    pub fn origin(&self) -> Result<String, AppError> {
        let parsed = url::Url::parse(&self.url)
            .map_err(|e| AppError::Config(format!("frontend.url is not a valid URL: {e}")))?;
        Ok(parsed.origin().ascii_serialization())
    }
}

/// Session cookie configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// HMAC key for session and state cookies (32+ bytes)
    pub secret: String,
    /// Session max age in seconds (default: 604800 = 7 days)
    pub max_age: i64,
    /// Set the `Secure` cookie attribute
    pub secure: bool,
    /// `SameSite` cookie attribute
    pub same_site: SameSitePolicy,
    /// How often expired sessions are purged
    pub cleanup_interval_seconds: u64,
}

/// `SameSite` cookie attribute values
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SameSitePolicy {
    Strict,
    Lax,
    None,
}

/// OAuth provider credentials
///
/// A provider is enabled when its section is present.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ProvidersConfig {
    pub google: Option<ProviderCredentials>,
    pub twitter: Option<ProviderCredentials>,
    pub github: Option<ProviderCredentials>,
}

/// Credentials and optional endpoint overrides for one provider
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderCredentials {
    pub client_id: String,
    pub client_secret: String,
    /// Override for the consent screen URL
    pub authorize_url: Option<String>,
    /// Override for the code exchange URL
    pub token_url: Option<String>,
    /// Override for the profile URL
    pub profile_url: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

/// Flat environment names recognized on top of `AUTHGATE__*`.
///
/// When several names map to one key, the first one set wins.
///
/// Twitter logins use OAuth 2.0, so `TWITTER_APIKEY_ID` and
/// `TWITTER_APIKEY_SECRET` must hold the OAuth 2.0 client id and client
/// secret from the developer portal, not the OAuth 1.0a API key pair.
const ENV_OVERRIDES: &[(&str, &[&str])] = &[
    ("database.url", &["MDB_CONNECT"]),
    ("frontend.url", &["URL_FRONT"]),
    ("server.port", &["PORT"]),
    ("server.public_url", &["PUBLIC_URL"]),
    ("session.secret", &["SESSION_SECRET"]),
    ("providers.google.client_id", &["GOOGLE_CLIENT_ID"]),
    ("providers.google.client_secret", &["GOOGLE_CLIENT_SECRET"]),
    (
        "providers.twitter.client_id",
        &["TWITTER_APIKEY_ID", "TWITTER_CLIENT_ID"],
    ),
    (
        "providers.twitter.client_secret",
        &["TWITTER_APIKEY_SECRET", "TWITTER_CLIENT_SECRET"],
    ),
    ("providers.github.client_id", &["GITHUB_CLIENT_ID"]),
    ("providers.github.client_secret", &["GITHUB_CLIENT_SECRET"]),
];

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// A `.env` file in the working directory is read first, if present.
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn load() -> Result<Self, AppError> {
        dotenv::dotenv().ok();
        Self::load_with(|name| std::env::var(name).ok())
    }

    /// Load configuration, resolving the flat deployment names through `env`
    pub fn load_with<F>(env: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        use config::{Config, Environment, File};

        let mut builder = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 4000)?
            .set_default("database.url", "sqlite://authgate.db?mode=rwc")?
            .set_default("frontend.failure_path", "/login")?
            .set_default("session.max_age", 604800)?
            .set_default("session.secure", true)?
            .set_default("session.same_site", "none")?
            .set_default("session.cleanup_interval_seconds", 3600)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix("AUTHGATE")
                    .separator("__")
                    .try_parsing(true),
            );

        for (key, names) in ENV_OVERRIDES {
            let value = names.iter().find_map(|name| env(name));
            builder = builder.set_override_option(*key, value)?;
        }

        let config = builder
            .build()
            .map_err(|e| AppError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| AppError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    pub(crate) fn validate(&self) -> Result<(), AppError> {
        const MIN_SESSION_SECRET_BYTES: usize = 32;

        if self.session.secret.as_bytes().len() < MIN_SESSION_SECRET_BYTES {
            return Err(AppError::Config(format!(
                "session.secret must be at least {} bytes",
                MIN_SESSION_SECRET_BYTES
            )));
        }

        if self.session.max_age <= 0 {
            return Err(AppError::Config(
                "session.max_age must be greater than 0".to_string(),
            ));
        }

        if self.session.same_site == SameSitePolicy::None && !self.session.secure {
            return Err(AppError::Config(
                "session.same_site=none requires session.secure=true".to_string(),
            ));
        }

        let frontend = url::Url::parse(&self.frontend.url)
            .map_err(|e| AppError::Config(format!("frontend.url is not a valid URL: {e}")))?;
        if !matches!(frontend.scheme(), "http" | "https") {
            return Err(AppError::Config(
                "frontend.url must use http or https".to_string(),
            ));
        }

        if !self.frontend.failure_path.starts_with('/') {
            return Err(AppError::Config(
                "frontend.failure_path must start with '/'".to_string(),
            ));
        }

        for (name, credentials) in [
            ("google", &self.providers.google),
            ("twitter", &self.providers.twitter),
            ("github", &self.providers.github),
        ] {
            if let Some(credentials) = credentials {
                if credentials.client_id.trim().is_empty()
                    || credentials.client_secret.trim().is_empty()
                {
                    return Err(AppError::Config(format!(
                        "providers.{name} requires a client_id and client_secret"
                    )));
                }
            }
        }

        if !self.session.secure {
            tracing::warn!(
                frontend = %self.frontend.url,
                "Using insecure session cookies for local development"
            );
        }

        Ok(())
    }
}
