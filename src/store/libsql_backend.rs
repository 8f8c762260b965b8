//! libSQL backend — implements `LocalStorage` and `Directory`.
//!
//! Supports local file and in-memory databases. A single connection is
//! reused for all operations.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info, warn};

use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::{Directory, LocalStorage};
use crate::tenancy::model::{Organization, User, UserRole, Workspace, WorkspaceMember};

/// libSQL database backend.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db).await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests and ephemeral runs).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;
        Self::from_database(db).await
    }

    async fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        migrations::run_migrations(&conn).await?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Run a `SELECT COUNT(*)`-style query and report whether it is non-zero.
    async fn exists(&self, sql: &str, args: impl libsql::params::IntoParams) -> Result<bool, DatabaseError> {
        let mut rows = self
            .conn()
            .query(sql, args)
            .await
            .map_err(|e| DatabaseError::Query(format!("exists: {e}")))?;
        match rows.next().await {
            Ok(Some(row)) => Ok(row.get::<i64>(0).unwrap_or(0) > 0),
            Ok(None) => Ok(false),
            Err(e) => Err(DatabaseError::Query(format!("exists: {e}"))),
        }
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Map a write failure, distinguishing constraint violations.
fn write_error(op: &str, e: libsql::Error) -> DatabaseError {
    let text = e.to_string();
    if text.contains("UNIQUE") || text.contains("constraint") {
        DatabaseError::Constraint(format!("{op}: {text}"))
    } else {
        DatabaseError::Query(format!("{op}: {text}"))
    }
}

fn parse_role(s: &str) -> UserRole {
    s.parse().unwrap_or_default()
}

const ORG_COLUMNS: &str = "id, name, slug, created_at, updated_at";
const WORKSPACE_COLUMNS: &str = "id, organization_id, name, slug, created_at, updated_at";
const USER_COLUMNS: &str = "id, email, name, role, is_admin, created_at";
const MEMBER_COLUMNS: &str = "workspace_id, user_id, role, joined_at";

fn row_to_org(row: &libsql::Row) -> Result<Organization, libsql::Error> {
    let created: String = row.get(3)?;
    let updated: String = row.get(4)?;
    Ok(Organization {
        id: row.get(0)?,
        name: row.get(1)?,
        slug: row.get(2)?,
        created_at: parse_datetime(&created),
        updated_at: parse_datetime(&updated),
    })
}

fn row_to_workspace(row: &libsql::Row) -> Result<Workspace, libsql::Error> {
    let created: String = row.get(4)?;
    let updated: String = row.get(5)?;
    Ok(Workspace {
        id: row.get(0)?,
        organization_id: row.get(1)?,
        name: row.get(2)?,
        slug: row.get(3)?,
        created_at: parse_datetime(&created),
        updated_at: parse_datetime(&updated),
    })
}

fn row_to_user(row: &libsql::Row) -> Result<User, libsql::Error> {
    let role: String = row.get(3)?;
    let is_admin: i64 = row.get(4)?;
    let created: String = row.get(5)?;
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        name: row.get(2)?,
        role: parse_role(&role),
        is_admin: is_admin != 0,
        created_at: parse_datetime(&created),
    })
}

fn row_to_member(row: &libsql::Row) -> Result<WorkspaceMember, libsql::Error> {
    let role: String = row.get(2)?;
    let joined: String = row.get(3)?;
    Ok(WorkspaceMember {
        workspace_id: row.get(0)?,
        user_id: row.get(1)?,
        role: parse_role(&role),
        joined_at: parse_datetime(&joined),
    })
}

/// Drain a result set through a row mapper.
async fn collect_rows<T>(
    mut rows: libsql::Rows,
    op: &str,
    map: fn(&libsql::Row) -> Result<T, libsql::Error>,
) -> Result<Vec<T>, DatabaseError> {
    let mut out = Vec::new();
    loop {
        match rows.next().await {
            Ok(Some(row)) => {
                out.push(map(&row).map_err(|e| DatabaseError::Query(format!("{op} row parse: {e}")))?)
            }
            Ok(None) => break,
            Err(e) => return Err(DatabaseError::Query(format!("{op}: {e}"))),
        }
    }
    Ok(out)
}

// ── LocalStorage ────────────────────────────────────────────────────

#[async_trait]
impl LocalStorage for LibSqlBackend {
    async fn get_item(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        let mut rows = self
            .conn()
            .query("SELECT value FROM kv_store WHERE key = ?1", params![key])
            .await
            .map_err(|e| DatabaseError::Query(format!("get_item: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let value: String = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("get_item row parse: {e}")))?;
                Ok(Some(value))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_item: {e}"))),
        }
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, value, Utc::now().to_rfc3339()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("set_item: {e}")))?;
        debug!(key = key, bytes = value.len(), "Local storage item written");
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<(), DatabaseError> {
        self.conn()
            .execute("DELETE FROM kv_store WHERE key = ?1", params![key])
            .await
            .map_err(|e| DatabaseError::Query(format!("remove_item: {e}")))?;
        Ok(())
    }
}

// ── Directory ───────────────────────────────────────────────────────

#[async_trait]
impl Directory for LibSqlBackend {
    async fn create_organization(&self, org: &Organization) -> Result<(), DatabaseError> {
        if self
            .exists(
                "SELECT COUNT(*) FROM organizations WHERE slug = ?1",
                params![org.slug.as_str()],
            )
            .await?
        {
            return Err(DatabaseError::Constraint(format!(
                "organization slug '{}' already exists",
                org.slug
            )));
        }

        self.conn()
            .execute(
                &format!("INSERT INTO organizations ({ORG_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5)"),
                params![
                    org.id.as_str(),
                    org.name.as_str(),
                    org.slug.as_str(),
                    org.created_at.to_rfc3339(),
                    org.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| write_error("create_organization", e))?;
        debug!(id = %org.id, slug = %org.slug, "Organization created");
        Ok(())
    }

    async fn get_organization(&self, id: &str) -> Result<Option<Organization>, DatabaseError> {
        let rows = self
            .conn()
            .query(
                &format!("SELECT {ORG_COLUMNS} FROM organizations WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_organization: {e}")))?;
        Ok(collect_rows(rows, "get_organization", row_to_org).await?.pop())
    }

    async fn list_organizations(&self) -> Result<Vec<Organization>, DatabaseError> {
        let rows = self
            .conn()
            .query(
                &format!("SELECT {ORG_COLUMNS} FROM organizations ORDER BY created_at ASC, name ASC"),
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_organizations: {e}")))?;
        collect_rows(rows, "list_organizations", row_to_org).await
    }

    async fn update_organization(&self, org: &Organization) -> Result<(), DatabaseError> {
        if self
            .exists(
                "SELECT COUNT(*) FROM organizations WHERE slug = ?1 AND id != ?2",
                params![org.slug.as_str(), org.id.as_str()],
            )
            .await?
        {
            return Err(DatabaseError::Constraint(format!(
                "organization slug '{}' already exists",
                org.slug
            )));
        }

        let changed = self
            .conn()
            .execute(
                "UPDATE organizations SET name = ?1, slug = ?2, updated_at = ?3 WHERE id = ?4",
                params![
                    org.name.as_str(),
                    org.slug.as_str(),
                    Utc::now().to_rfc3339(),
                    org.id.as_str(),
                ],
            )
            .await
            .map_err(|e| write_error("update_organization", e))?;
        if changed == 0 {
            return Err(DatabaseError::NotFound {
                entity: "organization".into(),
                id: org.id.clone(),
            });
        }
        Ok(())
    }

    async fn delete_organization(&self, id: &str) -> Result<bool, DatabaseError> {
        if self
            .exists(
                "SELECT COUNT(*) FROM workspaces WHERE organization_id = ?1",
                params![id],
            )
            .await?
        {
            return Err(DatabaseError::Constraint(format!(
                "organization {id} still owns workspaces"
            )));
        }
        let changed = self
            .conn()
            .execute("DELETE FROM organizations WHERE id = ?1", params![id])
            .await
            .map_err(|e| write_error("delete_organization", e))?;
        Ok(changed > 0)
    }

    async fn create_workspace(&self, workspace: &Workspace) -> Result<(), DatabaseError> {
        if !self
            .exists(
                "SELECT COUNT(*) FROM organizations WHERE id = ?1",
                params![workspace.organization_id.as_str()],
            )
            .await?
        {
            return Err(DatabaseError::Constraint(format!(
                "organization {} does not exist",
                workspace.organization_id
            )));
        }
        if self
            .exists(
                "SELECT COUNT(*) FROM workspaces WHERE organization_id = ?1 AND slug = ?2",
                params![workspace.organization_id.as_str(), workspace.slug.as_str()],
            )
            .await?
        {
            return Err(DatabaseError::Constraint(format!(
                "workspace slug '{}' already exists in organization",
                workspace.slug
            )));
        }

        self.conn()
            .execute(
                &format!(
                    "INSERT INTO workspaces ({WORKSPACE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
                ),
                params![
                    workspace.id.as_str(),
                    workspace.organization_id.as_str(),
                    workspace.name.as_str(),
                    workspace.slug.as_str(),
                    workspace.created_at.to_rfc3339(),
                    workspace.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| write_error("create_workspace", e))?;
        debug!(id = %workspace.id, org = %workspace.organization_id, "Workspace created");
        Ok(())
    }

    async fn get_workspace(&self, id: &str) -> Result<Option<Workspace>, DatabaseError> {
        let rows = self
            .conn()
            .query(
                &format!("SELECT {WORKSPACE_COLUMNS} FROM workspaces WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_workspace: {e}")))?;
        Ok(collect_rows(rows, "get_workspace", row_to_workspace).await?.pop())
    }

    async fn list_workspaces(&self, organization_id: &str) -> Result<Vec<Workspace>, DatabaseError> {
        let rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {WORKSPACE_COLUMNS} FROM workspaces WHERE organization_id = ?1
                     ORDER BY created_at ASC, name ASC"
                ),
                params![organization_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_workspaces: {e}")))?;
        collect_rows(rows, "list_workspaces", row_to_workspace).await
    }

    async fn update_workspace(&self, workspace: &Workspace) -> Result<(), DatabaseError> {
        if self
            .exists(
                "SELECT COUNT(*) FROM workspaces WHERE organization_id = ?1 AND slug = ?2 AND id != ?3",
                params![
                    workspace.organization_id.as_str(),
                    workspace.slug.as_str(),
                    workspace.id.as_str()
                ],
            )
            .await?
        {
            return Err(DatabaseError::Constraint(format!(
                "workspace slug '{}' already exists in organization",
                workspace.slug
            )));
        }

        let changed = self
            .conn()
            .execute(
                "UPDATE workspaces SET name = ?1, slug = ?2, updated_at = ?3 WHERE id = ?4",
                params![
                    workspace.name.as_str(),
                    workspace.slug.as_str(),
                    Utc::now().to_rfc3339(),
                    workspace.id.as_str(),
                ],
            )
            .await
            .map_err(|e| write_error("update_workspace", e))?;
        if changed == 0 {
            return Err(DatabaseError::NotFound {
                entity: "workspace".into(),
                id: workspace.id.clone(),
            });
        }
        Ok(())
    }

    async fn delete_workspace(&self, id: &str) -> Result<bool, DatabaseError> {
        let tx = self
            .conn()
            .transaction()
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_workspace begin: {e}")))?;

        // Members and workspace go together or not at all.
        let result = async {
            tx.execute(
                "DELETE FROM workspace_members WHERE workspace_id = ?1",
                params![id],
            )
            .await
            .map_err(|e| write_error("delete_workspace members", e))?;
            tx.execute("DELETE FROM workspaces WHERE id = ?1", params![id])
                .await
                .map_err(|e| write_error("delete_workspace", e))
        }
        .await;

        match result {
            Ok(changed) => {
                tx.commit()
                    .await
                    .map_err(|e| DatabaseError::Query(format!("delete_workspace commit: {e}")))?;
                Ok(changed > 0)
            }
            Err(e) => {
                if let Err(rb) = tx.rollback().await {
                    warn!(workspace_id = id, error = %rb, "Rollback failed");
                }
                Err(e)
            }
        }
    }

    async fn create_user(&self, user: &User) -> Result<(), DatabaseError> {
        if self
            .exists(
                "SELECT COUNT(*) FROM users WHERE email = ?1",
                params![user.email.as_str()],
            )
            .await?
        {
            return Err(DatabaseError::Constraint(format!(
                "user email '{}' already exists",
                user.email
            )));
        }

        self.conn()
            .execute(
                &format!("INSERT INTO users ({USER_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"),
                params![
                    user.id.as_str(),
                    user.email.as_str(),
                    user.name.as_str(),
                    user.role.as_str(),
                    if user.is_admin { 1i64 } else { 0i64 },
                    user.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| write_error("create_user", e))?;
        Ok(())
    }

    async fn get_user(&self, id: &str) -> Result<Option<User>, DatabaseError> {
        let rows = self
            .conn()
            .query(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_user: {e}")))?;
        Ok(collect_rows(rows, "get_user", row_to_user).await?.pop())
    }

    async fn list_users(&self) -> Result<Vec<User>, DatabaseError> {
        let rows = self
            .conn()
            .query(
                &format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at ASC, email ASC"),
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_users: {e}")))?;
        collect_rows(rows, "list_users", row_to_user).await
    }

    async fn add_member(&self, member: &WorkspaceMember) -> Result<(), DatabaseError> {
        if !self
            .exists(
                "SELECT COUNT(*) FROM workspaces WHERE id = ?1",
                params![member.workspace_id.as_str()],
            )
            .await?
        {
            return Err(DatabaseError::Constraint(format!(
                "workspace {} does not exist",
                member.workspace_id
            )));
        }
        if !self
            .exists(
                "SELECT COUNT(*) FROM users WHERE id = ?1",
                params![member.user_id.as_str()],
            )
            .await?
        {
            return Err(DatabaseError::Constraint(format!(
                "user {} does not exist",
                member.user_id
            )));
        }

        self.conn()
            .execute(
                &format!(
                    "INSERT INTO workspace_members ({MEMBER_COLUMNS}) VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(workspace_id, user_id) DO UPDATE SET role = excluded.role"
                ),
                params![
                    member.workspace_id.as_str(),
                    member.user_id.as_str(),
                    member.role.as_str(),
                    member.joined_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| write_error("add_member", e))?;
        Ok(())
    }

    async fn remove_member(&self, workspace_id: &str, user_id: &str) -> Result<bool, DatabaseError> {
        let changed = self
            .conn()
            .execute(
                "DELETE FROM workspace_members WHERE workspace_id = ?1 AND user_id = ?2",
                params![workspace_id, user_id],
            )
            .await
            .map_err(|e| write_error("remove_member", e))?;
        Ok(changed > 0)
    }

    async fn get_member(
        &self,
        workspace_id: &str,
        user_id: &str,
    ) -> Result<Option<WorkspaceMember>, DatabaseError> {
        let rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {MEMBER_COLUMNS} FROM workspace_members WHERE workspace_id = ?1 AND user_id = ?2"
                ),
                params![workspace_id, user_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_member: {e}")))?;
        Ok(collect_rows(rows, "get_member", row_to_member).await?.pop())
    }

    async fn list_members(&self, workspace_id: &str) -> Result<Vec<WorkspaceMember>, DatabaseError> {
        let rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {MEMBER_COLUMNS} FROM workspace_members WHERE workspace_id = ?1
                     ORDER BY joined_at ASC, user_id ASC"
                ),
                params![workspace_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_members: {e}")))?;
        collect_rows(rows, "list_members", row_to_member).await
    }
}
