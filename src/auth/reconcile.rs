//! Account reconciliation
//!
//! Decides whether a federated login belongs to a first-time or a returning
//! user, and keeps the identity-provider session and the profile store
//! consistent with each other: a signed-in session without a stored profile
//! must never survive this step.

use crate::Result;
use crate::error::Error;
use crate::profile::{ProfileStore, UserProfile};
use super::identity::FederatedIdentity;
use super::session::SessionHandle;

/// Resolve a federated identity to its user profile
///
/// For a returning user the stored profile wins outright; the name and email
/// carried by this login are discarded. A fresh uid gets a new profile with
/// defaults. The anomaly of a uid that exists but cannot be loaded is fatal,
/// since creating a replacement here could shadow real account state.
pub async fn reconcile(
    store: &dyn ProfileStore,
    session: &SessionHandle,
    identity: &FederatedIdentity,
) -> Result<UserProfile> {
    if store.exists(&identity.uid).await? {
        match store.get(&identity.uid).await? {
            Some(profile) => {
                tracing::debug!(uid = %profile.uid, "returning user, loaded stored profile");
                Ok(profile)
            }
            None => {
                session.clear();
                Err(Error::ProfileMissing(format!(
                    "uid {} passed the existence check but has no profile",
                    identity.uid
                )))
            }
        }
    } else {
        tracing::info!(uid = %identity.uid, "first login, creating profile");
        let profile = UserProfile::new(&identity.uid, &identity.email, &identity.display_name);
        persist_new_profile(store, session, profile).await
    }
}

/// Persist a freshly created profile, rolling back the session on failure
///
/// Shared by the federated and the email/password registration paths.
pub(crate) async fn persist_new_profile(
    store: &dyn ProfileStore,
    session: &SessionHandle,
    profile: UserProfile,
) -> Result<UserProfile> {
    if let Err(e) = store.save(&profile).await {
        tracing::warn!(uid = %profile.uid, "profile save failed, rolling back session");
        session.clear();
        return Err(e);
    }
    Ok(profile)
}
