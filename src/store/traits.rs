//! Storage traits — key/value "local storage" and the tenancy directory.

use async_trait::async_trait;

use crate::error::DatabaseError;
use crate::tenancy::model::{Organization, User, Workspace, WorkspaceMember};

/// String-keyed blob storage, overwritten wholesale on each write.
///
/// Values are opaque JSON strings; there is no versioning.
#[async_trait]
pub trait LocalStorage: Send + Sync {
    /// Read the blob stored under `key`.
    async fn get_item(&self, key: &str) -> Result<Option<String>, DatabaseError>;

    /// Overwrite the blob stored under `key`.
    async fn set_item(&self, key: &str, value: &str) -> Result<(), DatabaseError>;

    /// Remove `key`. Removing a missing key is not an error.
    async fn remove_item(&self, key: &str) -> Result<(), DatabaseError>;
}

/// Persistence for organizations, workspaces, users and memberships.
#[async_trait]
pub trait Directory: Send + Sync {
    // ── Organizations ───────────────────────────────────────────────

    /// Insert an organization. Duplicate id or slug is a constraint error.
    async fn create_organization(&self, org: &Organization) -> Result<(), DatabaseError>;

    async fn get_organization(&self, id: &str) -> Result<Option<Organization>, DatabaseError>;

    async fn list_organizations(&self) -> Result<Vec<Organization>, DatabaseError>;

    /// Update name and slug of an existing organization.
    async fn update_organization(&self, org: &Organization) -> Result<(), DatabaseError>;

    /// Delete an organization. Fails while it still owns workspaces.
    async fn delete_organization(&self, id: &str) -> Result<bool, DatabaseError>;

    // ── Workspaces ──────────────────────────────────────────────────

    /// Insert a workspace. Its organization must exist.
    async fn create_workspace(&self, workspace: &Workspace) -> Result<(), DatabaseError>;

    async fn get_workspace(&self, id: &str) -> Result<Option<Workspace>, DatabaseError>;

    async fn list_workspaces(&self, organization_id: &str) -> Result<Vec<Workspace>, DatabaseError>;

    async fn update_workspace(&self, workspace: &Workspace) -> Result<(), DatabaseError>;

    /// Delete a workspace and its memberships.
    async fn delete_workspace(&self, id: &str) -> Result<bool, DatabaseError>;

    // ── Users ───────────────────────────────────────────────────────

    async fn create_user(&self, user: &User) -> Result<(), DatabaseError>;

    async fn get_user(&self, id: &str) -> Result<Option<User>, DatabaseError>;

    async fn list_users(&self) -> Result<Vec<User>, DatabaseError>;

    // ── Membership ──────────────────────────────────────────────────

    /// Add (or re-role) a member. Both workspace and user must exist.
    async fn add_member(&self, member: &WorkspaceMember) -> Result<(), DatabaseError>;

    async fn remove_member(&self, workspace_id: &str, user_id: &str) -> Result<bool, DatabaseError>;

    async fn get_member(
        &self,
        workspace_id: &str,
        user_id: &str,
    ) -> Result<Option<WorkspaceMember>, DatabaseError>;

    async fn list_members(&self, workspace_id: &str) -> Result<Vec<WorkspaceMember>, DatabaseError>;
}
