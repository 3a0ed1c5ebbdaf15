//! Identity resolution
//!
//! Finds or creates the local user for a provider identity.

use anyhow::anyhow;

use super::provider::IdentityClaim;
use crate::data::{User, UserStore};
use crate::error::AppError;

/// Find or create the user for `claim`
///
/// The returned user is always the persisted record. If another request
/// creates the same identity between our lookup and insert, the insert is
/// a no-op and the winner's record is returned.
///
/// # Errors
/// Store failures propagate unchanged.
pub async fn resolve_identity(
    store: &dyn UserStore,
    claim: &IdentityClaim,
) -> Result<User, AppError> {
    if let Some(user) = store
        .find_by_external_id(claim.provider, &claim.external_id)
        .await?
    {
        tracing::debug!(provider = %claim.provider, user_id = %user.id, "Known identity");
        return Ok(user);
    }

    if let Some(user) = store.create_if_absent(claim).await? {
        tracing::info!(
            provider = %claim.provider,
            user_id = %user.id,
            username = %user.username,
            "User created"
        );
        crate::metrics::USERS_CREATED_TOTAL
            .with_label_values(&[claim.provider.as_str()])
            .inc();
        crate::metrics::USERS_TOTAL.inc();
        return Ok(user);
    }

    tracing::debug!(provider = %claim.provider, "Identity created concurrently; re-fetching");
    store
        .find_by_external_id(claim.provider, &claim.external_id)
        .await?
        .ok_or_else(|| {
            AppError::Internal(anyhow!(
                "{} identity vanished after conflicting insert",
                claim.provider
            ))
        })
}
