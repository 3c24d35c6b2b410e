//! Roles, permissions, and the access gate.
//!
//! The permission table and hierarchy are static. Role resolution is one pure
//! function over an abstract metadata source, instantiated with two adapters:
//! the cached user object (client-side reads) and request-scoped session
//! claims (server-side reads). Both tolerate missing metadata and resolve to
//! "no role" rather than an error.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::store_db::UserRow;

// ── Role ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum Role {
    Admin,
    Writer,
    Producer,
    StoryboardArtist,
    Director,
    TeamMember,
}

impl Role {
    #[allow(dead_code)]
    pub(crate) const ALL: [Role; 6] = [
        Self::Admin,
        Self::Writer,
        Self::Producer,
        Self::StoryboardArtist,
        Self::Director,
        Self::TeamMember,
    ];

    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Writer => "writer",
            Self::Producer => "producer",
            Self::StoryboardArtist => "storyboard_artist",
            Self::Director => "director",
            Self::TeamMember => "team_member",
        }
    }

    pub(crate) fn parse(name: &str) -> Option<Self> {
        match name.trim() {
            "admin" => Some(Self::Admin),
            "writer" => Some(Self::Writer),
            "producer" => Some(Self::Producer),
            "storyboard_artist" => Some(Self::StoryboardArtist),
            "director" => Some(Self::Director),
            "team_member" => Some(Self::TeamMember),
            _ => None,
        }
    }

    /// Higher rank = broader authority.
    pub(crate) fn rank(&self) -> u8 {
        match self {
            Self::Admin => 5,
            Self::Producer => 4,
            Self::Director => 3,
            Self::Writer => 2,
            Self::StoryboardArtist => 2,
            Self::TeamMember => 1,
        }
    }

    /// Default permission list for the role.
    pub(crate) fn permissions(&self) -> &'static [&'static str] {
        match self {
            Self::Admin => &[
                "projects:create",
                "projects:edit",
                "projects:delete",
                "projects:view",
                "scripts:create",
                "scripts:edit",
                "scripts:delete",
                "scripts:view",
                "storyboards:create",
                "storyboards:edit",
                "storyboards:delete",
                "storyboards:view",
                "users:manage",
                "settings:manage",
                "analytics:view",
            ],
            Self::Writer => &[
                "scripts:create",
                "scripts:edit",
                "scripts:view",
                "projects:view",
            ],
            Self::Producer => &[
                "projects:create",
                "projects:edit",
                "projects:view",
                "scripts:view",
                "storyboards:view",
                "analytics:view",
                "users:view",
            ],
            Self::StoryboardArtist => &[
                "storyboards:create",
                "storyboards:edit",
                "storyboards:view",
                "scripts:view",
                "projects:view",
            ],
            Self::Director => &[
                "projects:edit",
                "projects:view",
                "scripts:view",
                "scripts:edit",
                "storyboards:view",
                "storyboards:edit",
                "analytics:view",
            ],
            Self::TeamMember => &["projects:view", "scripts:view", "storyboards:view"],
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub(crate) fn has_higher_role(user_role: Role, required_role: Role) -> bool {
    user_role.rank() >= required_role.rank()
}

// ── Metadata sources ─────────────────────────────────────────────────────

/// Abstract lookup over the two metadata buckets a user carries.
/// User-editable metadata wins over provider-managed metadata, so a
/// self-selected role takes effect until the provider assigns one.
pub(crate) trait MetadataSource {
    fn user_value(&self, key: &str) -> Option<Value>;
    fn provider_value(&self, key: &str) -> Option<Value>;
}

/// Client-side variant: reads the locally cached user object.
pub(crate) struct CachedUser<'a> {
    pub(crate) user: &'a UserRow,
}

impl MetadataSource for CachedUser<'_> {
    fn user_value(&self, key: &str) -> Option<Value> {
        self.user.user_metadata.get(key).cloned()
    }

    fn provider_value(&self, key: &str) -> Option<Value> {
        self.user.provider_metadata.get(key).cloned()
    }
}

/// Server-side variant: reads request-scoped session claims, where both
/// buckets arrive nested in one claims object.
pub(crate) struct SessionClaims {
    pub(crate) claims: Value,
}

impl MetadataSource for SessionClaims {
    fn user_value(&self, key: &str) -> Option<Value> {
        self.claims.get("unsafe_metadata")?.get(key).cloned()
    }

    fn provider_value(&self, key: &str) -> Option<Value> {
        self.claims.get("metadata")?.get(key).cloned()
    }
}

pub(crate) fn resolve_role(source: &dyn MetadataSource) -> Option<Role> {
    let raw = source
        .user_value("role")
        .or_else(|| source.provider_value("role"))?;
    raw.as_str().and_then(Role::parse)
}

/// Explicit permission list when the metadata carries one, else the resolved
/// role's default table, else empty.
pub(crate) fn resolve_permissions(source: &dyn MetadataSource) -> Vec<String> {
    let explicit = source
        .user_value("permissions")
        .or_else(|| source.provider_value("permissions"));
    if let Some(list) = explicit.as_ref().and_then(|v| v.as_array()) {
        return list
            .iter()
            .filter_map(|v| v.as_str())
            .map(|s| s.to_string())
            .collect();
    }
    match resolve_role(source) {
        Some(role) => role.permissions().iter().map(|p| p.to_string()).collect(),
        None => Vec::new(),
    }
}

pub(crate) fn resolve_projects(source: &dyn MetadataSource) -> Vec<String> {
    source
        .user_value("projects")
        .or_else(|| source.provider_value("projects"))
        .and_then(|v| {
            v.as_array().map(|list| {
                list.iter()
                    .filter_map(|v| v.as_str())
                    .map(|s| s.to_string())
                    .collect()
            })
        })
        .unwrap_or_default()
}

// ── Resolved role info ───────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub(crate) struct RoleInfo {
    pub(crate) role: Option<Role>,
    pub(crate) permissions: Vec<String>,
    pub(crate) projects: Vec<String>,
}

impl RoleInfo {
    pub(crate) fn from_source(source: &dyn MetadataSource) -> Self {
        RoleInfo {
            role: resolve_role(source),
            permissions: resolve_permissions(source),
            projects: resolve_projects(source),
        }
    }

    pub(crate) fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }

    /// Admins and producers see every project; everyone else needs an entry
    /// in their project list.
    pub(crate) fn has_project_access(&self, project_id: &str) -> bool {
        if matches!(self.role, Some(Role::Admin) | Some(Role::Producer)) {
            return true;
        }
        self.projects.iter().any(|p| p == project_id)
    }
}

// Convenience predicates for embedding callers.
#[allow(dead_code)]
impl RoleInfo {
    pub(crate) fn has_role(&self, required: Role) -> bool {
        self.role == Some(required)
    }

    pub(crate) fn has_any_permission(&self, list: &[&str]) -> bool {
        list.iter().any(|p| self.has_permission(p))
    }

    pub(crate) fn has_higher_role(&self, required: Role) -> bool {
        match self.role {
            Some(role) => has_higher_role(role, required),
            None => false,
        }
    }

    pub(crate) fn is_admin(&self) -> bool {
        self.role == Some(Role::Admin)
    }

    pub(crate) fn is_writer(&self) -> bool {
        self.role == Some(Role::Writer)
    }

    pub(crate) fn is_producer(&self) -> bool {
        self.role == Some(Role::Producer)
    }

    pub(crate) fn is_director(&self) -> bool {
        self.role == Some(Role::Director)
    }

    pub(crate) fn is_storyboard_artist(&self) -> bool {
        self.role == Some(Role::StoryboardArtist)
    }

    pub(crate) fn is_team_member(&self) -> bool {
        self.role == Some(Role::TeamMember)
    }
}

/// Gate input: role data may still be loading when a decision is requested.
#[derive(Debug, Clone)]
pub(crate) enum RoleResolution {
    #[allow(dead_code)]
    Loading,
    Ready(RoleInfo),
}

// ── Access gate ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum PermissionMode {
    #[default]
    Any,
    All,
}

impl PermissionMode {
    pub(crate) fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "any" => Some(Self::Any),
            "all" => Some(Self::All),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct AccessGate {
    pub(crate) allowed_roles: Vec<Role>,
    pub(crate) required_permissions: Vec<String>,
    pub(crate) mode: PermissionMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GateDecision {
    /// Role data not yet resolved; render the loading placeholder.
    Loading,
    Allow,
    /// Render the caller-supplied fallback (default: nothing).
    Deny,
}

impl AccessGate {
    #[allow(dead_code)]
    pub(crate) fn roles(allowed: &[Role]) -> Self {
        AccessGate {
            allowed_roles: allowed.to_vec(),
            ..Default::default()
        }
    }

    #[allow(dead_code)]
    pub(crate) fn permissions(required: &[&str], mode: PermissionMode) -> Self {
        AccessGate {
            required_permissions: required.iter().map(|p| p.to_string()).collect(),
            mode,
            ..Default::default()
        }
    }

    pub(crate) fn decide(&self, resolution: &RoleResolution) -> GateDecision {
        let info = match resolution {
            RoleResolution::Loading => return GateDecision::Loading,
            RoleResolution::Ready(info) => info,
        };

        let role_ok = self.allowed_roles.is_empty()
            || info
                .role
                .map(|role| self.allowed_roles.contains(&role))
                .unwrap_or(false);

        let permissions_ok = self.required_permissions.is_empty()
            || match self.mode {
                PermissionMode::All => self
                    .required_permissions
                    .iter()
                    .all(|p| info.has_permission(p)),
                PermissionMode::Any => self
                    .required_permissions
                    .iter()
                    .any(|p| info.has_permission(p)),
            };

        if role_ok && permissions_ok {
            GateDecision::Allow
        } else {
            GateDecision::Deny
        }
    }
}
