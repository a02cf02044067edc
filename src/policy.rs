//! Pricing policy resolution.
//!
//! Exactly one policy governs a calculation. Specificity wins: a policy
//! scoped to the release beats one scoped to its genre, which beats the
//! global default. Within a scope the most recently created active policy
//! applies, so operators can roll out a replacement without deleting the
//! old one.

use crate::error::Result;
use crate::models::{PolicyScope, PricingPolicy};
use crate::storage::Storage;

/// Finds the policy governing a release, walking release > genre > global.
/// Returns `None` only when not even a global policy is configured.
pub fn resolve_policy(
    storage: &dyn Storage,
    release_id: i64,
    genre: Option<&str>,
) -> Result<Option<PricingPolicy>> {
    let release_key = release_id.to_string();
    if let Some(policy) = storage.find_active_policy(PolicyScope::Release, Some(&release_key))? {
        log::debug!("Release {} priced by release policy {}", release_id, policy.id);
        return Ok(Some(policy));
    }
    if let Some(genre) = genre {
        if let Some(policy) = storage.find_active_policy(PolicyScope::Genre, Some(genre))? {
            log::debug!(
                "Release {} priced by genre policy {} ({})",
                release_id,
                policy.id,
                genre
            );
            return Ok(Some(policy));
        }
    }
    storage.find_active_policy(PolicyScope::Global, None)
}
