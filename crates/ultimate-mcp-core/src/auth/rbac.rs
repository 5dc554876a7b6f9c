// crates/ultimate-mcp-core/src/auth/rbac.rs
// ============================================================================
// Module: Role-Based Authorization
// Description: Static role→permission table and the allow decision function.
// Purpose: Answer (roles, permission) → allow/deny from a literal constant.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! The permission table is a literal constant, totally enumerated, with no
//! dynamic grants. Higher roles are strict supersets of lower roles; the
//! superset property is asserted by tests so the table cannot silently
//! regress.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Roles
// ============================================================================

/// Platform roles carried in token claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Read-only access plus lint and graph queries.
    Viewer,
    /// Viewer plus execution, tests, and generation.
    Developer,
    /// Developer plus graph writes and system administration.
    Admin,
}

impl Role {
    /// Parses a wire role label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "viewer" => Some(Self::Viewer),
            "developer" => Some(Self::Developer),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }

    /// Returns the stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Viewer => "viewer",
            Self::Developer => "developer",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Permissions
// ============================================================================

/// Permission resource classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionResource {
    /// Tool invocation surface.
    Tools,
    /// Graph persistence surface.
    Graph,
    /// System administration surface.
    System,
}

/// Permission actions within a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionAction {
    /// Read tool metadata.
    Read,
    /// Run the lint tool.
    Lint,
    /// Run the execution tool.
    Execute,
    /// Run the test tool.
    Test,
    /// Run the generation tool.
    Generate,
    /// Run read-only graph queries.
    Query,
    /// Upsert graph nodes and relationships.
    Upsert,
    /// Delete graph data.
    Delete,
    /// Administrative operations (revocation, configuration).
    Admin,
}

/// A `(resource, action)` pair, the atom of authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Permission {
    /// Resource class.
    pub resource: PermissionResource,
    /// Action within the resource.
    pub action: PermissionAction,
}

impl Permission {
    /// Creates a permission.
    #[must_use]
    pub const fn new(resource: PermissionResource, action: PermissionAction) -> Self {
        Self {
            resource,
            action,
        }
    }

    /// `tools:read`
    pub const TOOLS_READ: Self = Self::new(PermissionResource::Tools, PermissionAction::Read);
    /// `tools:lint`
    pub const TOOLS_LINT: Self = Self::new(PermissionResource::Tools, PermissionAction::Lint);
    /// `tools:execute`
    pub const TOOLS_EXECUTE: Self = Self::new(PermissionResource::Tools, PermissionAction::Execute);
    /// `tools:test`
    pub const TOOLS_TEST: Self = Self::new(PermissionResource::Tools, PermissionAction::Test);
    /// `tools:generate`
    pub const TOOLS_GENERATE: Self =
        Self::new(PermissionResource::Tools, PermissionAction::Generate);
    /// `graph:query`
    pub const GRAPH_QUERY: Self = Self::new(PermissionResource::Graph, PermissionAction::Query);
    /// `graph:upsert`
    pub const GRAPH_UPSERT: Self = Self::new(PermissionResource::Graph, PermissionAction::Upsert);
    /// `graph:delete`
    pub const GRAPH_DELETE: Self = Self::new(PermissionResource::Graph, PermissionAction::Delete);
    /// `system:admin`
    pub const SYSTEM_ADMIN: Self = Self::new(PermissionResource::System, PermissionAction::Admin);

    /// Returns the stable `resource:action` label used in audit attributes.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match (self.resource, self.action) {
            (PermissionResource::Tools, PermissionAction::Read) => "tools:read",
            (PermissionResource::Tools, PermissionAction::Lint) => "tools:lint",
            (PermissionResource::Tools, PermissionAction::Execute) => "tools:execute",
            (PermissionResource::Tools, PermissionAction::Test) => "tools:test",
            (PermissionResource::Tools, PermissionAction::Generate) => "tools:generate",
            (PermissionResource::Graph, PermissionAction::Query) => "graph:query",
            (PermissionResource::Graph, PermissionAction::Upsert) => "graph:upsert",
            (PermissionResource::Graph, PermissionAction::Delete) => "graph:delete",
            (PermissionResource::System, PermissionAction::Admin) => "system:admin",
            _ => "unknown",
        }
    }
}

// ============================================================================
// SECTION: Permission Table
// ============================================================================

/// Permissions granted to the viewer role.
const VIEWER_PERMISSIONS: &[Permission] =
    &[Permission::TOOLS_READ, Permission::TOOLS_LINT, Permission::GRAPH_QUERY];

/// Permissions granted to the developer role beyond viewer.
const DEVELOPER_EXTRA: &[Permission] = &[
    Permission::TOOLS_EXECUTE,
    Permission::TOOLS_TEST,
    Permission::TOOLS_GENERATE,
];

/// Permissions granted to the admin role beyond developer.
const ADMIN_EXTRA: &[Permission] = &[
    Permission::GRAPH_UPSERT,
    Permission::GRAPH_DELETE,
    Permission::SYSTEM_ADMIN,
];

/// Returns the full permission set for a role.
#[must_use]
pub fn permissions_for(role: Role) -> Vec<Permission> {
    let mut granted: Vec<Permission> = VIEWER_PERMISSIONS.to_vec();
    if matches!(role, Role::Developer | Role::Admin) {
        granted.extend_from_slice(DEVELOPER_EXTRA);
    }
    if matches!(role, Role::Admin) {
        granted.extend_from_slice(ADMIN_EXTRA);
    }
    granted
}

/// Returns true when the union of role permissions contains the requested
/// permission. An empty role list never allows anything.
#[must_use]
pub fn allow(roles: &[Role], permission: Permission) -> bool {
    roles.iter().any(|role| permissions_for(*role).contains(&permission))
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions.")]

    use super::Permission;
    use super::Role;
    use super::allow;
    use super::permissions_for;

    const ALL_PERMISSIONS: [Permission; 9] = [
        Permission::TOOLS_READ,
        Permission::TOOLS_LINT,
        Permission::TOOLS_EXECUTE,
        Permission::TOOLS_TEST,
        Permission::TOOLS_GENERATE,
        Permission::GRAPH_QUERY,
        Permission::GRAPH_UPSERT,
        Permission::GRAPH_DELETE,
        Permission::SYSTEM_ADMIN,
    ];

    #[test]
    fn viewer_grants_match_table() {
        for permission in ALL_PERMISSIONS {
            let expected = matches!(
                permission.label(),
                "tools:read" | "tools:lint" | "graph:query"
            );
            assert_eq!(allow(&[Role::Viewer], permission), expected, "{}", permission.label());
        }
    }

    #[test]
    fn developer_grants_match_table() {
        for permission in ALL_PERMISSIONS {
            let expected = matches!(
                permission.label(),
                "tools:read"
                    | "tools:lint"
                    | "tools:execute"
                    | "tools:test"
                    | "tools:generate"
                    | "graph:query"
            );
            assert_eq!(allow(&[Role::Developer], permission), expected, "{}", permission.label());
        }
    }

    #[test]
    fn admin_grants_everything() {
        for permission in ALL_PERMISSIONS {
            assert!(allow(&[Role::Admin], permission), "{}", permission.label());
        }
    }

    #[test]
    fn higher_roles_are_strict_supersets() {
        let viewer = permissions_for(Role::Viewer);
        let developer = permissions_for(Role::Developer);
        let admin = permissions_for(Role::Admin);
        assert!(viewer.iter().all(|permission| developer.contains(permission)));
        assert!(developer.iter().all(|permission| admin.contains(permission)));
        assert!(developer.len() > viewer.len());
        assert!(admin.len() > developer.len());
    }

    #[test]
    fn empty_role_list_denies_everything() {
        for permission in ALL_PERMISSIONS {
            assert!(!allow(&[], permission));
        }
    }

    #[test]
    fn role_labels_round_trip() {
        for role in [Role::Viewer, Role::Developer, Role::Admin] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("superuser"), None);
    }
}
