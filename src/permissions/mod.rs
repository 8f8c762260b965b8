//! Permissions — slug catalog, role defaults, wildcard matching and the
//! per-request checker.
//!
//! Slugs are `resource:action[:detail]`. A granted `resource:*` covers every
//! slug of that resource and `*:*` covers everything.

pub mod middleware;

use std::sync::Arc;

use crate::error::DatabaseError;
use crate::store::Directory;
use crate::tenancy::model::UserRole;

pub use middleware::{PermissionGate, Principal, USER_ID_HEADER};

/// Grants every permission.
pub const SUPER_WILDCARD: &str = "*:*";

pub const SYSTEM_PERMISSIONS: &[&str] = &[
    "admin:access",
    "users:manage",
    "users:view",
    "roles:manage",
    "permissions:manage",
    "permission-groups:manage",
    "permission-groups:view",
    "permissions:assign",
    "permissions:revoke",
    "system:logs:view",
    "system:settings:manage",
    "system:performance:view",
    "system:performance:manage",
];

pub const WORKSPACE_PERMISSIONS: &[&str] = &[
    "workspace:create",
    "workspace:update",
    "workspace:delete",
    "workspace:members:manage",
    "workspace:members:view",
    "workspace:modules:manage",
    "workspace:modules:view",
    "workspace:permissions:manage",
    "workspace:permissions:view",
    "workspace:roles:manage",
    "workspace:activity:view",
    "workspace:templates:manage",
    "workspace:templates:view",
    "workspace:integrations:manage",
    "workspace:performance:view",
];

pub const MODULE_PERMISSIONS: &[&str] = &[
    "module:access",
    "module:configure",
    "module:data:create",
    "module:data:read",
    "module:data:update",
    "module:data:delete",
    "module:install",
    "module:uninstall",
    "module:update",
    "module:publish",
    "module:permissions:manage",
    "module:permissions:view",
    "module:data:export",
    "module:data:import",
    "module:performance:view",
];

const MANAGER_PERMISSIONS: &[&str] = &[
    "workspace:update",
    "workspace:members:manage",
    "workspace:members:view",
    "workspace:modules:manage",
    "workspace:modules:view",
    "workspace:permissions:view",
    "workspace:activity:view",
    "workspace:templates:view",
    "workspace:performance:view",
    "module:access",
    "module:configure",
    "module:data:create",
    "module:data:read",
    "module:data:update",
    "module:data:delete",
    "module:install",
    "module:uninstall",
    "module:update",
    "module:permissions:view",
    "module:data:export",
    "module:data:import",
    "module:performance:view",
];

const USER_PERMISSIONS: &[&str] = &[
    "workspace:members:view",
    "workspace:modules:view",
    "workspace:activity:view",
    "workspace:templates:view",
    "workspace:performance:view",
    "module:access",
    "module:data:create",
    "module:data:read",
    "module:data:update",
    "module:data:export",
    "module:performance:view",
];

/// Slugs a role holds without any explicit grant.
pub fn role_defaults(role: UserRole) -> Vec<&'static str> {
    match role {
        UserRole::Admin => SYSTEM_PERMISSIONS
            .iter()
            .chain(WORKSPACE_PERMISSIONS)
            .chain(MODULE_PERMISSIONS)
            .copied()
            .chain(std::iter::once(SUPER_WILDCARD))
            .collect(),
        UserRole::Manager => MANAGER_PERMISSIONS.to_vec(),
        UserRole::User => USER_PERMISSIONS.to_vec(),
    }
}

// ── Slug matching ───────────────────────────────────────────────────

fn resource_of(slug: &str) -> &str {
    slug.split(':').next().unwrap_or(slug)
}

/// Whether `granted` covers `required`: exact match, `resource:*` or `*:*`.
pub fn has_permission<S: AsRef<str>>(granted: &[S], required: &str) -> bool {
    let resource_wildcard = format!("{}:*", resource_of(required));
    granted.iter().any(|g| {
        let g = g.as_ref();
        g == required || g == SUPER_WILDCARD || g == resource_wildcard
    })
}

pub fn has_any_permission<S: AsRef<str>>(granted: &[S], required: &[&str]) -> bool {
    required.iter().any(|r| has_permission(granted, r))
}

pub fn has_all_permissions<S: AsRef<str>>(granted: &[S], required: &[&str]) -> bool {
    required.iter().all(|r| has_permission(granted, r))
}

/// Granted slugs that belong to `resource`.
pub fn resource_permissions<'a, S: AsRef<str>>(granted: &'a [S], resource: &str) -> Vec<&'a str> {
    let prefix = format!("{resource}:");
    granted
        .iter()
        .map(|g| g.as_ref())
        .filter(|g| g.starts_with(&prefix))
        .collect()
}

pub fn can_perform_action<S: AsRef<str>>(granted: &[S], resource: &str, action: &str) -> bool {
    has_permission(granted, &format!("{resource}:{action}"))
}

// ── Checker ─────────────────────────────────────────────────────────

/// Answers "may this user do that here?" against the directory. Results are
/// computed per call and never cached.
#[derive(Clone)]
pub struct PermissionChecker {
    directory: Arc<dyn Directory>,
}

impl PermissionChecker {
    pub fn new(directory: Arc<dyn Directory>) -> Self {
        Self { directory }
    }

    pub fn directory(&self) -> &Arc<dyn Directory> {
        &self.directory
    }

    pub async fn has_permission(
        &self,
        user_id: &str,
        slug: &str,
        workspace_id: Option<&str>,
    ) -> Result<bool, DatabaseError> {
        let Some(user) = self.directory.get_user(user_id).await? else {
            return Ok(false);
        };
        if user.is_admin {
            return Ok(true);
        }
        if has_permission(&role_defaults(user.role), slug) {
            return Ok(true);
        }

        let Some(workspace_id) = workspace_id else {
            return Ok(false);
        };
        match self.directory.get_member(workspace_id, user_id).await? {
            Some(member) => Ok(has_permission(&role_defaults(member.role), slug)),
            None => Ok(false),
        }
    }

    pub async fn has_any(
        &self,
        user_id: &str,
        slugs: &[&str],
        workspace_id: Option<&str>,
    ) -> Result<bool, DatabaseError> {
        for slug in slugs {
            if self.has_permission(user_id, slug, workspace_id).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub async fn has_all(
        &self,
        user_id: &str,
        slugs: &[&str],
        workspace_id: Option<&str>,
    ) -> Result<bool, DatabaseError> {
        for slug in slugs {
            if !self.has_permission(user_id, slug, workspace_id).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Admins see every workspace; others only those they belong to.
    pub async fn can_access_workspace(
        &self,
        user_id: &str,
        workspace_id: &str,
    ) -> Result<bool, DatabaseError> {
        let Some(user) = self.directory.get_user(user_id).await? else {
            return Ok(false);
        };
        if user.is_admin {
            return Ok(true);
        }
        Ok(self
            .directory
            .get_member(workspace_id, user_id)
            .await?
            .is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LibSqlBackend;
    use crate::tenancy::model::{Organization, User, Workspace, WorkspaceMember};

    #[test]
    fn exact_and_wildcard_matching() {
        let granted = ["module:data:read", "workspace:*"];
        assert!(has_permission(&granted, "module:data:read"));
        assert!(!has_permission(&granted, "module:data:delete"));
        assert!(has_permission(&granted, "workspace:members:manage"));
        assert!(has_permission(&["*:*"], "anything:at:all"));
        assert!(!has_permission::<&str>(&[], "module:access"));
    }

    #[test]
    fn any_all_and_resource_helpers() {
        let granted = vec!["module:access".to_string(), "module:data:read".to_string()];
        assert!(has_any_permission(&granted, &["users:manage", "module:access"]));
        assert!(!has_all_permissions(&granted, &["users:manage", "module:access"]));
        assert!(has_all_permissions(&granted, &["module:access", "module:data:read"]));
        assert_eq!(
            resource_permissions(&granted, "module"),
            vec!["module:access", "module:data:read"]
        );
        assert!(can_perform_action(&granted, "module", "access"));
        assert!(!can_perform_action(&granted, "workspace", "create"));
    }

    #[test]
    fn role_defaults_are_layered() {
        let admin = role_defaults(UserRole::Admin);
        assert!(admin.contains(&"users:manage"));
        assert!(admin.contains(&SUPER_WILDCARD));

        let manager = role_defaults(UserRole::Manager);
        assert!(has_permission(&manager, "workspace:members:manage"));
        assert!(!has_permission(&manager, "workspace:create"));

        let user = role_defaults(UserRole::User);
        assert!(has_permission(&user, "workspace:members:view"));
        assert!(!has_permission(&user, "workspace:members:manage"));
    }

    async fn fixture() -> (PermissionChecker, Arc<LibSqlBackend>, Workspace) {
        let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let org = Organization::new("Acme", "acme");
        db.create_organization(&org).await.unwrap();
        let ws = Workspace::new(&org.id, "Ops", "ops");
        db.create_workspace(&ws).await.unwrap();
        (PermissionChecker::new(db.clone()), db, ws)
    }

    #[tokio::test]
    async fn unknown_user_has_nothing() {
        let (checker, _, _) = fixture().await;
        assert!(!checker.has_permission("ghost", "module:access", None).await.unwrap());
    }

    #[tokio::test]
    async fn admin_flag_grants_everything() {
        let (checker, db, _) = fixture().await;
        let admin = User::new("root@acme.io", "Root", UserRole::User).with_admin(true);
        db.create_user(&admin).await.unwrap();
        assert!(checker.has_permission(&admin.id, "users:manage", None).await.unwrap());
    }

    #[tokio::test]
    async fn workspace_membership_decides_scoped_checks() {
        let (checker, db, ws) = fixture().await;
        let member = User::new("m@acme.io", "Member", UserRole::User);
        let outsider = User::new("o@acme.io", "Outsider", UserRole::User);
        db.create_user(&member).await.unwrap();
        db.create_user(&outsider).await.unwrap();
        db.add_member(&WorkspaceMember::new(&ws.id, &member.id, UserRole::Manager))
            .await
            .unwrap();

        // Not in USER defaults, granted through the MANAGER membership.
        assert!(checker
            .has_permission(&member.id, "workspace:members:manage", Some(&ws.id))
            .await
            .unwrap());
        assert!(!checker
            .has_permission(&outsider.id, "workspace:members:manage", Some(&ws.id))
            .await
            .unwrap());
        assert!(!checker
            .has_permission(&member.id, "workspace:members:manage", None)
            .await
            .unwrap());

        assert!(checker.can_access_workspace(&member.id, &ws.id).await.unwrap());
        assert!(!checker.can_access_workspace(&outsider.id, &ws.id).await.unwrap());
    }

    #[tokio::test]
    async fn any_and_all_variants() {
        let (checker, db, _) = fixture().await;
        let user = User::new("u@acme.io", "U", UserRole::User);
        db.create_user(&user).await.unwrap();
        assert!(checker
            .has_any(&user.id, &["users:manage", "module:access"], None)
            .await
            .unwrap());
        assert!(!checker
            .has_all(&user.id, &["users:manage", "module:access"], None)
            .await
            .unwrap());
    }
}
