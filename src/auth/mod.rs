//! OAuth authentication
//!
//! Handles:
//! - Google, Twitter and GitHub OAuth flows
//! - Find-or-create of local users
//! - Server-side session management
//! - Principal middleware

mod identity;
mod middleware;
mod oauth;
mod pkce;
pub mod provider;
pub mod session;

pub use identity::resolve_identity;
pub use middleware::{MaybeUser, attach_principal};
pub use oauth::auth_router;
pub use provider::{IdentityClaim, OAuthClient, Provider, ProviderProfile, Providers};
pub use session::{SESSION_COOKIE, STATE_COOKIE, SessionManager};
