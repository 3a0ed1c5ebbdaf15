//! Principal middleware
//!
//! Resolves the session cookie on every request and attaches the
//! authenticated user (or its absence) to the request extensions.

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use axum_extra::extract::CookieJar;

use crate::AppState;
use crate::data::User;

/// Middleware attaching the principal to every request
///
/// # Usage
/// ```ignore
/// let app = Router::new()
///     .route("/getuser", ...)
///     .layer(middleware::from_fn_with_state(state, attach_principal));
/// ```
pub async fn attach_principal(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let jar = CookieJar::from_headers(request.headers());
    let user = state.sessions.deserialize(&state.db, &jar).await;

    request.extensions_mut().insert(MaybeUser(user));

    next.run(request).await
}

/// Optional current user extractor
///
/// Returns `None` if not authenticated, instead of an error.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<User>);

#[async_trait]
impl<S> FromRequestParts<S> for MaybeUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(principal) = parts.extensions.get::<MaybeUser>().cloned() {
            return Ok(principal);
        }

        let app_state = AppState::from_ref(state);
        let jar = CookieJar::from_headers(&parts.headers);
        let principal = MaybeUser(app_state.sessions.deserialize(&app_state.db, &jar).await);
        parts.extensions.insert(principal.clone());

        Ok(principal)
    }
}
