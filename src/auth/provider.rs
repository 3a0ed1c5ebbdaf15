//! OAuth providers
//!
//! Each provider has its own endpoints, scope and profile shape. Profiles
//! are parsed into explicit per-provider variants and normalized into an
//! [`IdentityClaim`] before anything else sees them.

use std::fmt;
use std::str::FromStr;

use axum::http::header::ACCEPT;
use serde::Deserialize;

use crate::config::{ProviderCredentials, ProvidersConfig};
use crate::error::AppError;

/// A supported identity provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    Google,
    Twitter,
    GitHub,
}

impl Provider {
    pub const ALL: [Provider; 3] = [Provider::Google, Provider::Twitter, Provider::GitHub];

    /// Path segment and metric label
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::Google => "google",
            Provider::Twitter => "twitter",
            Provider::GitHub => "github",
        }
    }

    /// User table column holding this provider's external id
    pub fn id_column(self) -> &'static str {
        match self {
            Provider::Google => "google_id",
            Provider::Twitter => "twitter_id",
            Provider::GitHub => "github_id",
        }
    }

    fn endpoints(self) -> Endpoints {
        match self {
            Provider::Google => Endpoints {
                authorize_url: "https://accounts.google.com/o/oauth2/v2/auth",
                token_url: "https://oauth2.googleapis.com/token",
                profile_url: "https://www.googleapis.com/oauth2/v3/userinfo",
                scope: Some("profile"),
                client_auth: ClientAuth::RequestBody,
            },
            Provider::Twitter => Endpoints {
                authorize_url: "https://twitter.com/i/oauth2/authorize",
                token_url: "https://api.twitter.com/2/oauth2/token",
                profile_url: "https://api.twitter.com/2/users/me",
                scope: Some("users.read tweet.read"),
                client_auth: ClientAuth::BasicAuth,
            },
            Provider::GitHub => Endpoints {
                authorize_url: "https://github.com/login/oauth/authorize",
                token_url: "https://github.com/login/oauth/access_token",
                profile_url: "https://api.github.com/user",
                scope: None,
                client_auth: ClientAuth::RequestBody,
            },
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Provider::ALL
            .into_iter()
            .find(|provider| provider.as_str() == s)
            .ok_or(AppError::NotFound)
    }
}

/// How client credentials reach the token endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClientAuth {
    RequestBody,
    BasicAuth,
}

struct Endpoints {
    authorize_url: &'static str,
    token_url: &'static str,
    profile_url: &'static str,
    scope: Option<&'static str>,
    client_auth: ClientAuth,
}

// =============================================================================
// Profiles
// =============================================================================

/// Provider-independent identity handed to the resolver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityClaim {
    pub provider: Provider,
    pub external_id: String,
    pub username: String,
}

/// Google userinfo response
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleProfile {
    #[serde(alias = "id")]
    pub sub: String,
    pub given_name: Option<String>,
    pub name: Option<String>,
}

/// Twitter `users/me` response
#[derive(Debug, Clone, Deserialize)]
pub struct TwitterProfile {
    pub data: TwitterUser,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TwitterUser {
    pub id: String,
    pub username: String,
    pub name: Option<String>,
}

/// GitHub `user` response
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubProfile {
    pub id: u64,
    pub login: String,
    pub name: Option<String>,
}

/// A profile as returned by one provider
#[derive(Debug, Clone)]
pub enum ProviderProfile {
    Google(GoogleProfile),
    Twitter(TwitterProfile),
    GitHub(GitHubProfile),
}

impl ProviderProfile {
    /// Parse a profile response body in `provider`'s shape
    pub fn parse(provider: Provider, body: &[u8]) -> Result<Self, AppError> {
        let parsed = match provider {
            Provider::Google => serde_json::from_slice(body).map(ProviderProfile::Google),
            Provider::Twitter => serde_json::from_slice(body).map(ProviderProfile::Twitter),
            Provider::GitHub => serde_json::from_slice(body).map(ProviderProfile::GitHub),
        };

        parsed.map_err(|e| AppError::Provider(format!("unexpected {provider} profile: {e}")))
    }

    /// Normalize into an identity claim
    ///
    /// Google users are named by their given name, Twitter and GitHub
    /// users by their handle.
    pub fn into_claim(self) -> IdentityClaim {
        match self {
            ProviderProfile::Google(profile) => IdentityClaim {
                provider: Provider::Google,
                external_id: profile.sub,
                username: profile.given_name.or(profile.name).unwrap_or_default(),
            },
            ProviderProfile::Twitter(profile) => IdentityClaim {
                provider: Provider::Twitter,
                external_id: profile.data.id,
                username: profile.data.username,
            },
            ProviderProfile::GitHub(profile) => IdentityClaim {
                provider: Provider::GitHub,
                external_id: profile.id.to_string(),
                username: profile.login,
            },
        }
    }
}

// =============================================================================
// Client
// =============================================================================

/// Token endpoint response
///
/// GitHub reports failures as a 200 with an `error` field.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// A configured OAuth client for one provider
#[derive(Debug, Clone)]
pub struct OAuthClient {
    provider: Provider,
    client_id: String,
    client_secret: String,
    authorize_url: String,
    token_url: String,
    profile_url: String,
    redirect_uri: String,
    scope: Option<&'static str>,
    client_auth: ClientAuth,
}

impl OAuthClient {
    /// Build a client, applying any endpoint overrides from `credentials`
    ///
    /// # Arguments
    /// * `base_url` - Public URL of this service; the callback is
    ///   `{base_url}/auth/{provider}/callback`
    pub fn new(
        provider: Provider,
        credentials: &ProviderCredentials,
        base_url: &str,
    ) -> Result<Self, AppError> {
        let defaults = provider.endpoints();
        let redirect_uri = format!(
            "{}/auth/{}/callback",
            base_url.trim_end_matches('/'),
            provider
        );
        url::Url::parse(&redirect_uri)
            .map_err(|e| AppError::Config(format!("invalid callback URL {redirect_uri}: {e}")))?;

        Ok(Self {
            provider,
            client_id: credentials.client_id.clone(),
            client_secret: credentials.client_secret.clone(),
            authorize_url: credentials
                .authorize_url
                .clone()
                .unwrap_or_else(|| defaults.authorize_url.to_string()),
            token_url: credentials
                .token_url
                .clone()
                .unwrap_or_else(|| defaults.token_url.to_string()),
            profile_url: credentials
                .profile_url
                .clone()
                .unwrap_or_else(|| defaults.profile_url.to_string()),
            redirect_uri,
            scope: defaults.scope,
            client_auth: defaults.client_auth,
        })
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Consent screen URL for a new handshake
    pub fn authorization_url(&self, state: &str, code_challenge: &str) -> Result<String, AppError> {
        let mut url = url::Url::parse(&self.authorize_url).map_err(|e| {
            AppError::Config(format!("invalid {} authorize URL: {e}", self.provider))
        })?;

        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("response_type", "code")
                .append_pair("client_id", &self.client_id)
                .append_pair("redirect_uri", &self.redirect_uri);
            if let Some(scope) = self.scope {
                query.append_pair("scope", scope);
            }
            query
                .append_pair("state", state)
                .append_pair("code_challenge", code_challenge)
                .append_pair("code_challenge_method", "S256");
        }

        Ok(url.into())
    }

    /// Exchange an authorization code for an access token
    pub async fn exchange_code(
        &self,
        http: &reqwest::Client,
        code: &str,
        code_verifier: &str,
    ) -> Result<String, AppError> {
        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("code_verifier", code_verifier),
            ("client_id", self.client_id.as_str()),
        ];

        let mut request = http.post(&self.token_url).header(ACCEPT, "application/json");
        match self.client_auth {
            ClientAuth::RequestBody => form.push(("client_secret", self.client_secret.as_str())),
            ClientAuth::BasicAuth => {
                request = request.basic_auth(&self.client_id, Some(&self.client_secret));
            }
        }

        let response = request.form(&form).send().await?;
        let status = response.status();
        let token: TokenResponse = response.json().await?;

        match token.access_token {
            Some(access_token) if status.is_success() => Ok(access_token),
            _ => Err(AppError::Provider(format!(
                "{} token exchange failed ({}): {}",
                self.provider,
                status,
                token
                    .error_description
                    .or(token.error)
                    .unwrap_or_else(|| "no access token".to_string())
            ))),
        }
    }

    /// Fetch the signed-in user's profile
    pub async fn fetch_profile(
        &self,
        http: &reqwest::Client,
        access_token: &str,
    ) -> Result<ProviderProfile, AppError> {
        let response = http
            .get(&self.profile_url)
            .bearer_auth(access_token)
            .header(ACCEPT, "application/json")
            .send()
            .await?
            .error_for_status()?;

        let body = response.bytes().await?;
        ProviderProfile::parse(self.provider, &body)
    }
}

/// The set of enabled providers, built once at startup
#[derive(Debug, Clone, Default)]
pub struct Providers {
    google: Option<OAuthClient>,
    twitter: Option<OAuthClient>,
    github: Option<OAuthClient>,
}

impl Providers {
    pub fn from_config(config: &ProvidersConfig, base_url: &str) -> Result<Self, AppError> {
        let build = |provider, credentials: &Option<ProviderCredentials>| {
            credentials
                .as_ref()
                .map(|credentials| OAuthClient::new(provider, credentials, base_url))
                .transpose()
        };

        Ok(Self {
            google: build(Provider::Google, &config.google)?,
            twitter: build(Provider::Twitter, &config.twitter)?,
            github: build(Provider::GitHub, &config.github)?,
        })
    }

    /// Client for `provider`, if it is configured
    pub fn get(&self, provider: Provider) -> Option<&OAuthClient> {
        match provider {
            Provider::Google => self.google.as_ref(),
            Provider::Twitter => self.twitter.as_ref(),
            Provider::GitHub => self.github.as_ref(),
        }
    }

    pub fn enabled(&self) -> Vec<Provider> {
        Provider::ALL
            .into_iter()
            .filter(|provider| self.get(*provider).is_some())
            .collect()
    }
}
