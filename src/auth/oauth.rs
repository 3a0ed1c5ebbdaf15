//! OAuth redirect controller
//!
//! Implements the authorization code flow (with PKCE) against each
//! configured provider, plus logout.

use axum::{
    Router,
    extract::{Path, Query, State},
    http::{StatusCode, header::LOCATION},
    response::{IntoResponse, Response},
    routing::get,
};
use axum_extra::extract::CookieJar;
use serde::Deserialize;

use super::identity::resolve_identity;
use super::pkce::PkcePair;
use super::provider::{IdentityClaim, OAuthClient, Provider};
use super::session::generate_token;
use crate::AppState;
use crate::error::AppError;
use crate::metrics::observe_login;

/// Create authentication router
///
/// Routes:
/// - GET /auth/logout - End the session
/// - GET /auth/{provider} - Redirect to the provider
/// - GET /auth/{provider}/callback - OAuth callback
pub fn auth_router() -> Router<AppState> {
    Router::new()
        .route("/auth/logout", get(logout))
        .route("/auth/:provider", get(begin_login))
        .route("/auth/:provider/callback", get(finish_login))
}

/// 302 Found to `location`
fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(LOCATION, location.to_string())]).into_response()
}

/// Handshake state carried in the signed `oauth_state` cookie
#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingLogin {
    provider: Provider,
    state: String,
    code_verifier: String,
}

impl PendingLogin {
    fn encode(&self) -> String {
        format!("{}:{}:{}", self.provider, self.state, self.code_verifier)
    }

    fn decode(value: &str) -> Option<Self> {
        let mut parts = value.splitn(3, ':');
        let provider = parts.next()?.parse().ok()?;
        let state = parts.next()?.to_string();
        let code_verifier = parts.next()?.to_string();

        Some(Self {
            provider,
            state,
            code_verifier,
        })
    }
}

fn enabled_client(state: &AppState, provider: &str) -> Result<OAuthClient, AppError> {
    let provider: Provider = provider.parse()?;
    state.providers.get(provider).cloned().ok_or_else(|| {
        tracing::debug!(provider = %provider, "Login attempted with unconfigured provider");
        AppError::NotFound
    })
}

// =============================================================================
// Initiation
// =============================================================================

/// GET /auth/{provider}
///
/// Redirects the browser to the provider's consent screen.
///
/// # Steps
/// 1. Generate CSRF state token and PKCE verifier
/// 2. Store both in a signed cookie
/// 3. Redirect to the provider with client_id, redirect_uri, scope, state
async fn begin_login(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    let client = enabled_client(&state, &provider)?;

    let pkce = PkcePair::generate();
    let pending = PendingLogin {
        provider: client.provider(),
        state: generate_token(),
        code_verifier: pkce.code_verifier,
    };

    let location = client.authorization_url(&pending.state, &pkce.code_challenge)?;
    let cookie = state.sessions.state_cookie(&pending.encode())?;

    tracing::debug!(provider = %pending.provider, "Redirecting to provider");
    Ok((jar.add(cookie), found(&location)))
}

// =============================================================================
// Callback
// =============================================================================

/// Query parameters from the provider callback
#[derive(Debug, Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// GET /auth/{provider}/callback
///
/// # Steps
/// 1. Verify CSRF state against the signed cookie
/// 2. Exchange code for access token
/// 3. Fetch the provider profile
/// 4. Find or create the local user
/// 5. Create session and set cookie
/// 6. Redirect to the frontend
///
/// Handshake failures redirect to the frontend's failure path with no
/// session. Store failures while resolving the user are returned as errors;
/// the handshake cookie is cleared either way.
async fn finish_login(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(query): Query<CallbackQuery>,
    jar: CookieJar,
) -> Result<Response, AppError> {
    let client = enabled_client(&state, &provider)?;
    let provider = client.provider();

    let pending = state
        .sessions
        .read_state_cookie(&jar)
        .and_then(|value| PendingLogin::decode(&value));
    let jar = jar.remove(state.sessions.state_removal_cookie());

    let claim = match handshake(&state, &client, &query, pending).await {
        Ok(claim) => claim,
        Err(error) => {
            tracing::warn!(provider = %provider, %error, "OAuth handshake failed");
            observe_login(provider.as_str(), "failure");
            return Ok((jar, found(&state.config.frontend.failure_url())).into_response());
        }
    };

    let user = match resolve_identity(state.db.as_ref(), &claim).await {
        Ok(user) => user,
        Err(error) => {
            observe_login(provider.as_str(), "error");
            return Ok((jar, error).into_response());
        }
    };

    let cookie = state.sessions.serialize(&state.db, &user).await?;
    observe_login(provider.as_str(), "success");
    tracing::info!(provider = %provider, user_id = %user.id, "User logged in");

    Ok((jar.add(cookie), found(state.config.frontend.success_url())).into_response())
}

async fn handshake(
    state: &AppState,
    client: &OAuthClient,
    query: &CallbackQuery,
    pending: Option<PendingLogin>,
) -> Result<IdentityClaim, AppError> {
    if let Some(error) = &query.error {
        return Err(AppError::Provider(format!(
            "{} returned error: {}",
            client.provider(),
            error
        )));
    }

    let pending = pending.ok_or(AppError::Unauthorized)?;
    let (Some(code), Some(returned_state)) = (&query.code, &query.state) else {
        return Err(AppError::Validation(
            "callback is missing code or state".to_string(),
        ));
    };

    if pending.provider != client.provider() || pending.state != *returned_state {
        return Err(AppError::Unauthorized);
    }

    let access_token = client
        .exchange_code(&state.http_client, code, &pending.code_verifier)
        .await?;
    let profile = client
        .fetch_profile(&state.http_client, &access_token)
        .await?;

    Ok(profile.into_claim())
}

// =============================================================================
// Logout
// =============================================================================

/// GET /auth/logout
///
/// Destroys the session if there is one and always answers.
async fn logout(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    let jar = state.sessions.destroy(&state.db, jar).await;
    (jar, "done")
}
