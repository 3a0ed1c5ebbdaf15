//! Data models
//!
//! Rust structs representing database entities.
//! Users are keyed by ULID; timestamps use chrono.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::{IdentityClaim, Provider};

// =============================================================================
// User
// =============================================================================

/// A locally known identity
///
/// At most one provider id is populated in practice. Each provider id
/// column is unique in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub google_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub twitter_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github_id: Option<String>,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Build a new, not yet persisted user from a claim
    pub fn from_claim(claim: &IdentityClaim) -> Self {
        let mut user = Self {
            id: ulid::Ulid::new().to_string(),
            google_id: None,
            twitter_id: None,
            github_id: None,
            username: claim.username.clone(),
            created_at: Utc::now(),
        };

        let external_id = Some(claim.external_id.clone());
        match claim.provider {
            Provider::Google => user.google_id = external_id,
            Provider::Twitter => user.twitter_id = external_id,
            Provider::GitHub => user.github_id = external_id,
        }

        user
    }

    /// The external id this user holds for `provider`, if any
    pub fn external_id(&self, provider: Provider) -> Option<&str> {
        match provider {
            Provider::Google => self.google_id.as_deref(),
            Provider::Twitter => self.twitter_id.as_deref(),
            Provider::GitHub => self.github_id.as_deref(),
        }
    }
}

// =============================================================================
// Session
// =============================================================================

/// Server-side session row
///
/// Only the hash of the cookie token is stored.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SessionRecord {
    pub id_hash: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}
