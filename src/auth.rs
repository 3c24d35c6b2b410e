//! Request identity: a bearer token is digested and looked up in the
//! sessions table; the matching user row resolves to role and permissions
//! through the cached-user metadata adapter.

use crate::roles::{CachedUser, RoleInfo, SessionClaims};
use crate::store_db::{GatewayDb, UserRow};
use crate::util::token_digest;

pub(crate) const DEFAULT_ROLE: &str = "team_member";

#[derive(Debug, Clone)]
pub(crate) struct Identity {
    pub(crate) user_id: String,
    pub(crate) email: String,
    pub(crate) info: RoleInfo,
}

impl Identity {
    /// Client-side variant: identity from the locally cached user object.
    pub(crate) fn from_user(user: &UserRow) -> Self {
        let info = RoleInfo::from_source(&CachedUser { user });
        Identity {
            user_id: user.id.clone(),
            email: user.email.clone(),
            info,
        }
    }

    /// Role string for the identity headers; unset roles forward the default.
    pub(crate) fn header_role(&self) -> &'static str {
        match self.info.role {
            Some(role) => role.as_str(),
            None => DEFAULT_ROLE,
        }
    }
}

/// Strip a `Bearer` prefix if present; raw tokens are accepted too.
pub(crate) fn bearer_token(header_value: &str) -> Option<&str> {
    let value = header_value.trim();
    let token = match value.split_once(' ') {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest.trim(),
        Some(_) => return None,
        None => value,
    };
    if token.is_empty() { None } else { Some(token) }
}

/// Resolve the authenticated identity for a request, or None. The session
/// row is projected into request-scoped claims and resolved through the
/// server-side metadata adapter.
pub(crate) fn authenticate(db: &GatewayDb, authorization: Option<&str>) -> Option<Identity> {
    let token = bearer_token(authorization?)?;
    let user = db.session_user(&token_digest(token))?;
    let claims = SessionClaims {
        claims: serde_json::json!({
            "unsafe_metadata": user.user_metadata.clone(),
            "metadata": user.provider_metadata.clone(),
        }),
    };
    Some(Identity {
        user_id: user.id.clone(),
        email: user.email.clone(),
        info: RoleInfo::from_source(&claims),
    })
}

/// Create a session for the user and hand back the raw token (shown once).
pub(crate) fn issue_token(db: &GatewayDb, user_id: &str) -> Result<String, Box<dyn std::error::Error>> {
    if db.user_get(user_id).is_none() {
        return Err(format!("unknown user: {user_id}").into());
    }
    let token = crate::util::mint_session_token(user_id);
    db.session_create(&token_digest(&token), user_id)?;
    Ok(token)
}
