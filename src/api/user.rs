//! Liveness and current-user endpoints

use axum::{
    Json, Router,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};

use crate::AppState;
use crate::auth::MaybeUser;

/// Create the public router
///
/// Routes:
/// - GET / - Fixed greeting
/// - GET /getuser - Current session principal, if any
pub fn user_router() -> Router<AppState> {
    Router::new()
        .route("/", get(greeting))
        .route("/getuser", get(get_user))
}

async fn greeting() -> &'static str {
    "Hello World!"
}

/// GET /getuser
///
/// Returns the user JSON, or an empty 200 when nobody is signed in.
async fn get_user(MaybeUser(user): MaybeUser) -> Response {
    match user {
        Some(user) => Json(user).into_response(),
        None => StatusCode::OK.into_response(),
    }
}
