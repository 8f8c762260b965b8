//! Request guards — caller identity and slug-gated routes.

use axum::Router;
use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::middleware::{self, Next};
use axum::response::Response;
use tracing::debug;

use super::PermissionChecker;
use crate::error::AuthError;

/// Header carrying the authenticated user id (set by the upstream auth proxy).
pub const USER_ID_HEADER: &str = "x-user-id";

/// Optional header scoping a check to one workspace.
pub const WORKSPACE_ID_HEADER: &str = "x-workspace-id";

/// The caller of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: String,
    pub workspace_id: Option<String>,
}

fn header_value(parts: &Parts, name: &str) -> Option<String> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl<S: Send + Sync> FromRequestParts<S> for Principal {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = header_value(parts, USER_ID_HEADER).ok_or(AuthError::Unauthenticated)?;
        Ok(Principal {
            user_id,
            workspace_id: header_value(parts, WORKSPACE_ID_HEADER),
        })
    }
}

/// Route guard requiring one permission slug.
#[derive(Clone)]
pub struct PermissionGate {
    checker: PermissionChecker,
    slug: &'static str,
}

impl PermissionGate {
    pub fn new(checker: PermissionChecker, slug: &'static str) -> Self {
        Self { checker, slug }
    }

    pub fn slug(&self) -> &'static str {
        self.slug
    }

    pub async fn check(&self, principal: &Principal) -> Result<(), AuthError> {
        let allowed = self
            .checker
            .has_permission(&principal.user_id, self.slug, principal.workspace_id.as_deref())
            .await?;
        if allowed {
            Ok(())
        } else {
            debug!(user_id = %principal.user_id, slug = self.slug, "Permission denied");
            Err(AuthError::Forbidden)
        }
    }

    /// Guard every route of `router`.
    pub fn protect(self, router: Router) -> Router {
        router.route_layer(middleware::from_fn_with_state(self, require_permission))
    }
}

async fn require_permission(
    State(gate): State<PermissionGate>,
    principal: Principal,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    gate.check(&principal).await?;
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request as HttpRequest, StatusCode};
    use axum::routing::get;
    use tower::ServiceExt;

    use crate::store::{Directory, LibSqlBackend};
    use crate::tenancy::model::{User, UserRole};

    async fn guarded(slug: &'static str) -> (Router, Arc<LibSqlBackend>) {
        let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let gate = PermissionGate::new(PermissionChecker::new(db.clone()), slug);
        let router = gate.protect(Router::new().route("/secret", get(|| async { "ok" })));
        (router, db)
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn missing_header_is_unauthorized() {
        let (router, _) = guarded("users:manage").await;
        let response = router
            .oneshot(
                HttpRequest::builder()
                    .uri("/secret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["message"], "Unauthorized");
    }

    #[tokio::test]
    async fn insufficient_role_is_forbidden() {
        let (router, db) = guarded("users:manage").await;
        let user = User::new("u@acme.io", "U", UserRole::User);
        db.create_user(&user).await.unwrap();

        let response = router
            .oneshot(
                HttpRequest::builder()
                    .uri("/secret")
                    .header(USER_ID_HEADER, &user.id)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_json(response).await["message"], "Forbidden");
    }

    #[tokio::test]
    async fn granted_role_passes_through() {
        let (router, db) = guarded("module:access").await;
        let user = User::new("u@acme.io", "U", UserRole::User);
        db.create_user(&user).await.unwrap();

        let response = router
            .oneshot(
                HttpRequest::builder()
                    .uri("/secret")
                    .header(USER_ID_HEADER, &user.id)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
