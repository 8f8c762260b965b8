//! REST endpoints for organizations, workspaces, users and memberships.
//!
//! With enforcement on, every handler checks the caller's permission slug and
//! workspace handlers additionally require membership (admins bypass both).

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

use super::model::{Organization, User, UserRole, Workspace, WorkspaceMember, slugify};
use crate::error::{AuthError, DatabaseError};
use crate::permissions::{PermissionChecker, PermissionGate, Principal};
use crate::store::Directory;

/// Shared state for tenancy routes.
#[derive(Clone)]
pub struct TenancyState {
    pub directory: Arc<dyn Directory>,
    pub checker: PermissionChecker,
    pub enforce: bool,
}

type Caller = Result<Principal, AuthError>;

impl TenancyState {
    /// Require `slug`, scoped to `workspace_id` when given.
    async fn authorize(
        &self,
        caller: &Caller,
        slug: &'static str,
        workspace_id: Option<&str>,
    ) -> Result<(), ApiError> {
        if !self.enforce {
            return Ok(());
        }
        let principal = match caller {
            Ok(p) => p,
            Err(_) => return Err(AuthError::Unauthenticated.into()),
        };
        let scoped = Principal {
            user_id: principal.user_id.clone(),
            workspace_id: workspace_id.map(str::to_string).or(principal.workspace_id.clone()),
        };
        PermissionGate::new(self.checker.clone(), slug).check(&scoped).await?;

        if let Some(ws) = workspace_id {
            if !self.checker.can_access_workspace(&principal.user_id, ws).await? {
                return Err(AuthError::Forbidden.into());
            }
        }
        Ok(())
    }

    async fn visible(&self, caller: &Caller, workspace_id: &str) -> Result<bool, ApiError> {
        if !self.enforce {
            return Ok(true);
        }
        match caller {
            Ok(p) => Ok(self.checker.can_access_workspace(&p.user_id, workspace_id).await?),
            Err(_) => Err(AuthError::Unauthenticated.into()),
        }
    }
}

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Database(DatabaseError),
    Auth(AuthError),
}

impl From<DatabaseError> for ApiError {
    fn from(e: DatabaseError) -> Self {
        ApiError::Database(e)
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        ApiError::Auth(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(json!({"error": message}))).into_response()
            }
            ApiError::Auth(e) => e.into_response(),
            ApiError::Database(e) => {
                let status = match &e {
                    DatabaseError::NotFound { .. } => StatusCode::NOT_FOUND,
                    DatabaseError::Constraint(_) => StatusCode::CONFLICT,
                    _ => {
                        error!(error = %e, "Directory query failed");
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                };
                (status, Json(json!({"error": e.to_string()}))).into_response()
            }
        }
    }
}

fn not_found(entity: &str, id: &str) -> ApiError {
    ApiError::Database(DatabaseError::NotFound {
        entity: entity.to_string(),
        id: id.to_string(),
    })
}

/// Explicit slug, or one derived from the name.
fn pick_slug(name: &str, slug: Option<String>) -> Result<String, ApiError> {
    let slug = slug.map(|s| slugify(&s)).unwrap_or_else(|| slugify(name));
    if slug.is_empty() {
        return Err(ApiError::BadRequest("slug must contain letters or digits".into()));
    }
    Ok(slug)
}

fn required(field: &str, value: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::BadRequest(format!("{field} is required")));
    }
    Ok(())
}

// ── Bodies ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct NameAndSlug {
    name: String,
    #[serde(default)]
    slug: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Rename {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    slug: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateWorkspace {
    organization_id: String,
    name: String,
    #[serde(default)]
    slug: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WorkspaceFilter {
    organization_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddMember {
    user_id: String,
    #[serde(default)]
    role: UserRole,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateUser {
    email: String,
    name: String,
    #[serde(default)]
    role: UserRole,
    #[serde(default)]
    is_admin: bool,
}

// ── Organizations ───────────────────────────────────────────────────

/// GET /api/organizations
async fn list_organizations(State(state): State<TenancyState>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.directory.list_organizations().await?))
}

/// POST /api/organizations
async fn create_organization(
    State(state): State<TenancyState>,
    Json(body): Json<NameAndSlug>,
) -> Result<impl IntoResponse, ApiError> {
    required("name", &body.name)?;
    let org = Organization::new(body.name.trim(), pick_slug(&body.name, body.slug)?);
    state.directory.create_organization(&org).await?;
    info!(id = %org.id, slug = %org.slug, "Organization created");
    Ok((StatusCode::CREATED, Json(org)))
}

/// GET /api/organizations/{id}
async fn get_organization(
    State(state): State<TenancyState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    match state.directory.get_organization(&id).await? {
        Some(org) => Ok(Json(org)),
        None => Err(not_found("organization", &id)),
    }
}

/// PUT /api/organizations/{id}
async fn update_organization(
    State(state): State<TenancyState>,
    Path(id): Path<String>,
    Json(body): Json<Rename>,
) -> Result<impl IntoResponse, ApiError> {
    let Some(mut org) = state.directory.get_organization(&id).await? else {
        return Err(not_found("organization", &id));
    };
    if let Some(name) = body.name {
        required("name", &name)?;
        org.name = name.trim().to_string();
    }
    if let Some(slug) = body.slug {
        org.slug = pick_slug(&org.name, Some(slug))?;
    }
    org.updated_at = chrono::Utc::now();
    state.directory.update_organization(&org).await?;
    Ok(Json(org))
}

/// DELETE /api/organizations/{id}
async fn delete_organization(
    State(state): State<TenancyState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    if state.directory.delete_organization(&id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found("organization", &id))
    }
}

// ── Workspaces ──────────────────────────────────────────────────────

/// GET /api/workspaces?organizationId=..
///
/// Only workspaces the caller can access are listed.
async fn list_workspaces(
    State(state): State<TenancyState>,
    caller: Caller,
    Query(filter): Query<WorkspaceFilter>,
) -> Result<impl IntoResponse, ApiError> {
    let mut visible = Vec::new();
    for ws in state.directory.list_workspaces(&filter.organization_id).await? {
        if state.visible(&caller, &ws.id).await? {
            visible.push(ws);
        }
    }
    Ok(Json(visible))
}

/// POST /api/workspaces
///
/// The caller becomes an ADMIN member of the new workspace.
async fn create_workspace(
    State(state): State<TenancyState>,
    caller: Caller,
    Json(body): Json<CreateWorkspace>,
) -> Result<impl IntoResponse, ApiError> {
    state.authorize(&caller, "workspace:create", None).await?;
    required("name", &body.name)?;

    let ws = Workspace::new(
        body.organization_id,
        body.name.trim(),
        pick_slug(&body.name, body.slug)?,
    );
    state.directory.create_workspace(&ws).await?;

    if state.enforce {
        if let Ok(principal) = &caller {
            let owner = WorkspaceMember::new(&ws.id, &principal.user_id, UserRole::Admin);
            state.directory.add_member(&owner).await?;
        }
    }

    info!(id = %ws.id, organization_id = %ws.organization_id, "Workspace created");
    Ok((StatusCode::CREATED, Json(ws)))
}

/// GET /api/workspaces/{id}
async fn get_workspace(
    State(state): State<TenancyState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let Some(ws) = state.directory.get_workspace(&id).await? else {
        return Err(not_found("workspace", &id));
    };
    if !state.visible(&caller, &id).await? {
        return Err(AuthError::Forbidden.into());
    }
    Ok(Json(ws))
}

/// PUT /api/workspaces/{id}
async fn update_workspace(
    State(state): State<TenancyState>,
    caller: Caller,
    Path(id): Path<String>,
    Json(body): Json<Rename>,
) -> Result<impl IntoResponse, ApiError> {
    let Some(mut ws) = state.directory.get_workspace(&id).await? else {
        return Err(not_found("workspace", &id));
    };
    state.authorize(&caller, "workspace:update", Some(&id)).await?;

    if let Some(name) = body.name {
        required("name", &name)?;
        ws.name = name.trim().to_string();
    }
    if let Some(slug) = body.slug {
        ws.slug = pick_slug(&ws.name, Some(slug))?;
    }
    ws.updated_at = chrono::Utc::now();
    state.directory.update_workspace(&ws).await?;
    Ok(Json(ws))
}

/// DELETE /api/workspaces/{id}
async fn delete_workspace(
    State(state): State<TenancyState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    if state.directory.get_workspace(&id).await?.is_none() {
        return Err(not_found("workspace", &id));
    }
    state.authorize(&caller, "workspace:delete", Some(&id)).await?;
    state.directory.delete_workspace(&id).await?;
    info!(id = %id, "Workspace deleted");
    Ok(StatusCode::NO_CONTENT)
}

// ── Members ─────────────────────────────────────────────────────────

/// GET /api/workspaces/{id}/members
async fn list_members(
    State(state): State<TenancyState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    if state.directory.get_workspace(&id).await?.is_none() {
        return Err(not_found("workspace", &id));
    }
    state.authorize(&caller, "workspace:members:view", Some(&id)).await?;
    Ok(Json(state.directory.list_members(&id).await?))
}

/// POST /api/workspaces/{id}/members
async fn add_member(
    State(state): State<TenancyState>,
    caller: Caller,
    Path(id): Path<String>,
    Json(body): Json<AddMember>,
) -> Result<impl IntoResponse, ApiError> {
    if state.directory.get_workspace(&id).await?.is_none() {
        return Err(not_found("workspace", &id));
    }
    state.authorize(&caller, "workspace:members:manage", Some(&id)).await?;

    let member = WorkspaceMember::new(&id, body.user_id, body.role);
    state.directory.add_member(&member).await?;
    info!(workspace_id = %id, user_id = %member.user_id, role = %member.role, "Member added");
    Ok((StatusCode::CREATED, Json(member)))
}

/// DELETE /api/workspaces/{id}/members/{user_id}
async fn remove_member(
    State(state): State<TenancyState>,
    caller: Caller,
    Path((id, user_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    state.authorize(&caller, "workspace:members:manage", Some(&id)).await?;
    if state.directory.remove_member(&id, &user_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found("workspace member", &user_id))
    }
}

// ── Users ───────────────────────────────────────────────────────────

/// GET /api/users
async fn list_users(
    State(state): State<TenancyState>,
    caller: Caller,
) -> Result<impl IntoResponse, ApiError> {
    state.authorize(&caller, "users:view", None).await?;
    Ok(Json(state.directory.list_users().await?))
}

/// POST /api/users
async fn create_user(
    State(state): State<TenancyState>,
    caller: Caller,
    Json(body): Json<CreateUser>,
) -> Result<impl IntoResponse, ApiError> {
    state.authorize(&caller, "users:manage", None).await?;
    required("email", &body.email)?;
    required("name", &body.name)?;

    let user = User::new(body.email.trim(), body.name.trim(), body.role).with_admin(body.is_admin);
    state.directory.create_user(&user).await?;
    info!(id = %user.id, role = %user.role, "User created");
    Ok((StatusCode::CREATED, Json(user)))
}

/// GET /api/users/{id}
///
/// Callers may always read themselves.
async fn get_user(
    State(state): State<TenancyState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let is_self = caller.as_ref().is_ok_and(|p| p.user_id == id);
    if !is_self {
        state.authorize(&caller, "users:view", None).await?;
    }
    match state.directory.get_user(&id).await? {
        Some(user) => Ok(Json(user)),
        None => Err(not_found("user", &id)),
    }
}

/// Build the tenancy routes. Organization management is admin-only when
/// permissions are enforced.
pub fn tenancy_routes(state: TenancyState) -> Router {
    let organizations = Router::new()
        .route(
            "/api/organizations",
            get(list_organizations).post(create_organization),
        )
        .route(
            "/api/organizations/{id}",
            get(get_organization)
                .put(update_organization)
                .delete(delete_organization),
        )
        .with_state(state.clone());
    let organizations = if state.enforce {
        PermissionGate::new(state.checker.clone(), "admin:access").protect(organizations)
    } else {
        organizations
    };

    let rest = Router::new()
        .route("/api/workspaces", get(list_workspaces).post(create_workspace))
        .route(
            "/api/workspaces/{id}",
            get(get_workspace).put(update_workspace).delete(delete_workspace),
        )
        .route("/api/workspaces/{id}/members", get(list_members).post(add_member))
        .route("/api/workspaces/{id}/members/{user_id}", delete(remove_member))
        .route("/api/users", get(list_users).post(create_user))
        .route("/api/users/{id}", get(get_user))
        .with_state(state);

    organizations.merge(rest)
}
