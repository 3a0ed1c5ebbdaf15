//! User store seam
//!
//! The identity resolver and session manager only see this trait, so
//! they can be exercised against a mock store.

use async_trait::async_trait;

use super::models::User;
use crate::auth::{IdentityClaim, Provider};
use crate::error::AppError;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Find the user holding `external_id` for `provider`
    async fn find_by_external_id(
        &self,
        provider: Provider,
        external_id: &str,
    ) -> Result<Option<User>, AppError>;

    /// Atomically create a user for `claim` unless one already exists
    ///
    /// Returns the new record when this call created it, `None` when a
    /// record for the (provider, external id) pair was already present.
    async fn create_if_absent(&self, claim: &IdentityClaim) -> Result<Option<User>, AppError>;

    /// Get a user by store-assigned id
    async fn get_user(&self, id: &str) -> Result<Option<User>, AppError>;
}
