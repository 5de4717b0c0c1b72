use super::session::SessionClient;
use crate::types::Role;

/// Resolves the role recorded in the identity's profile.
/// Lookup failures fall back to [`Role::User`]; administrator access is never
/// granted by default.
pub async fn resolve_role(client: &SessionClient, identity_id: &str) -> Role {
    match client.profile_role(identity_id).await {
        Ok(raw) => Role::from_profile(raw.as_deref()),
        Err(e) => {
            tracing::warn!("Profile lookup failed for {identity_id}, using least privilege: {e}");
            Role::User
        }
    }
}
