//! Session management
//!
//! Sessions live server-side in the `sessions` table. The cookie carries an
//! opaque random token signed with HMAC-SHA256; only a hash of the token is
//! stored, and only the user id is serialized into the session.

use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::config::{SameSitePolicy, SessionConfig};
use crate::data::{Database, SessionRecord, User, UserStore};
use crate::error::AppError;

type HmacSha256 = Hmac<Sha256>;

/// Session cookie name
pub const SESSION_COOKIE: &str = "session";
/// Pending-handshake cookie name
pub const STATE_COOKIE: &str = "oauth_state";

const STATE_COOKIE_PATH: &str = "/auth";
const STATE_COOKIE_MAX_AGE_SECS: i64 = 600;

/// Generate a random URL-safe token (32 bytes of entropy)
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Hash a session token for storage
pub fn hash_token(token: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(token.as_bytes()))
}

/// Sign a value
///
/// Format: `{value}.{base64(hmac_sha256(value))}`
pub fn sign_value(value: &str, secret: &str) -> Result<String, AppError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Internal(anyhow::anyhow!("invalid HMAC key: {e}")))?;
    mac.update(value.as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

    Ok(format!("{}.{}", value, signature))
}

/// Verify a value produced by [`sign_value`]
///
/// # Returns
/// The original value, or `None` if the signature does not match
pub fn verify_value(signed: &str, secret: &str) -> Option<String> {
    let (value, signature_b64) = signed.rsplit_once('.')?;
    let signature = URL_SAFE_NO_PAD.decode(signature_b64).ok()?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(value.as_bytes());
    mac.verify_slice(&signature).ok()?;

    Some(value.to_string())
}

/// Issues, resolves and destroys sessions
#[derive(Debug, Clone)]
pub struct SessionManager {
    secret: String,
    max_age: Duration,
    secure: bool,
    same_site: SameSite,
}

impl SessionManager {
    pub fn new(config: &SessionConfig) -> Self {
        let same_site = match config.same_site {
            SameSitePolicy::Strict => SameSite::Strict,
            SameSitePolicy::Lax => SameSite::Lax,
            SameSitePolicy::None => SameSite::None,
        };

        Self {
            secret: config.secret.clone(),
            max_age: Duration::seconds(config.max_age),
            secure: config.secure,
            same_site,
        }
    }

    /// Start a session for `user` and return its cookie
    pub async fn serialize(&self, db: &Database, user: &User) -> Result<Cookie<'static>, AppError> {
        let token = generate_token();
        let now = Utc::now();

        db.create_session(&SessionRecord {
            id_hash: hash_token(&token),
            user_id: user.id.clone(),
            created_at: now,
            expires_at: now + self.max_age,
        })
        .await?;
        crate::metrics::SESSIONS_CREATED_TOTAL.inc();

        let value = sign_value(&token, &self.secret)?;
        Ok(Cookie::build((SESSION_COOKIE, value))
            .path("/")
            .http_only(true)
            .secure(self.secure)
            .same_site(self.same_site)
            .max_age(time::Duration::seconds(self.max_age.num_seconds()))
            .build())
    }

    /// Resolve the session cookie in `jar` to a user
    ///
    /// Every failure mode (no cookie, bad signature, unknown or expired
    /// session, user gone, store error) yields `None`.
    pub async fn deserialize(&self, db: &Database, jar: &CookieJar) -> Option<User> {
        let token = self.session_token(jar)?;

        let user_id = match db.get_session_user_id(&hash_token(&token), Utc::now()).await {
            Ok(user_id) => user_id?,
            Err(error) => {
                tracing::warn!(%error, "Session lookup failed; treating request as anonymous");
                return None;
            }
        };

        match db.get_user(&user_id).await {
            Ok(Some(user)) => Some(user),
            Ok(None) => {
                tracing::debug!(user_id = %user_id, "Session refers to a missing user");
                None
            }
            Err(error) => {
                tracing::warn!(%error, "User lookup failed; treating request as anonymous");
                None
            }
        }
    }

    /// End the session in `jar`, if any, and clear its cookie
    ///
    /// The cookie is cleared even when the store cannot delete the row.
    pub async fn destroy(&self, db: &Database, jar: CookieJar) -> CookieJar {
        if jar.get(SESSION_COOKIE).is_none() {
            return jar;
        }

        if let Some(token) = self.session_token(&jar) {
            match db.delete_session(&hash_token(&token)).await {
                Ok(true) => tracing::info!("Session destroyed"),
                Ok(false) => tracing::debug!("Logout for an unknown session"),
                Err(error) => {
                    tracing::warn!(%error, "Session delete failed; clearing cookie anyway")
                }
            }
        }

        jar.remove(self.removal_cookie(SESSION_COOKIE, "/"))
    }

    /// Signed cookie holding a pending handshake
    pub fn state_cookie(&self, value: &str) -> Result<Cookie<'static>, AppError> {
        let value = sign_value(value, &self.secret)?;
        Ok(Cookie::build((STATE_COOKIE, value))
            .path(STATE_COOKIE_PATH)
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .max_age(time::Duration::seconds(STATE_COOKIE_MAX_AGE_SECS))
            .build())
    }

    /// Verified value of the pending-handshake cookie
    pub fn read_state_cookie(&self, jar: &CookieJar) -> Option<String> {
        jar.get(STATE_COOKIE)
            .and_then(|cookie| verify_value(cookie.value(), &self.secret))
    }

    /// Cookie that clears the pending-handshake cookie
    pub fn state_removal_cookie(&self) -> Cookie<'static> {
        self.removal_cookie(STATE_COOKIE, STATE_COOKIE_PATH)
    }

    fn session_token(&self, jar: &CookieJar) -> Option<String> {
        jar.get(SESSION_COOKIE)
            .and_then(|cookie| verify_value(cookie.value(), &self.secret))
    }

    fn removal_cookie(&self, name: &'static str, path: &'static str) -> Cookie<'static> {
        Cookie::build(name)
            .path(path)
            .secure(self.secure)
            .http_only(true)
            .build()
    }
}
