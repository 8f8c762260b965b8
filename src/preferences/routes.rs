//! REST endpoints for theme and sidebar preferences.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;

use super::{PreferencesStore, Theme};
use crate::error::StoreError;

/// Shared state for preference routes.
#[derive(Clone)]
pub struct PreferencesState {
    pub prefs: Arc<PreferencesStore>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PreferencesView {
    theme: Theme,
    sidebar_collapsed: bool,
}

#[derive(Debug, Deserialize)]
struct ThemeBody {
    theme: Theme,
}

#[derive(Debug, Deserialize)]
struct SidebarBody {
    collapsed: bool,
}

fn storage_failure(e: StoreError) -> Response {
    error!(error = %e, "Preference storage failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": format!("Failed to store preference: {e}")})),
    )
        .into_response()
}

/// GET /api/preferences
async fn get_preferences(State(state): State<PreferencesState>) -> Response {
    let theme = match state.prefs.theme().await {
        Ok(t) => t,
        Err(e) => return storage_failure(e),
    };
    match state.prefs.sidebar_collapsed().await {
        Ok(sidebar_collapsed) => Json(PreferencesView {
            theme,
            sidebar_collapsed,
        })
        .into_response(),
        Err(e) => storage_failure(e),
    }
}

/// PUT /api/preferences/theme
async fn set_theme(State(state): State<PreferencesState>, Json(body): Json<ThemeBody>) -> Response {
    match state.prefs.set_theme(body.theme).await {
        Ok(()) => Json(json!({"theme": body.theme})).into_response(),
        Err(e) => storage_failure(e),
    }
}

/// POST /api/preferences/theme/toggle
async fn toggle_theme(State(state): State<PreferencesState>) -> Response {
    match state.prefs.toggle_theme().await {
        Ok(theme) => Json(json!({"theme": theme})).into_response(),
        Err(e) => storage_failure(e),
    }
}

/// PUT /api/preferences/sidebar
async fn set_sidebar(
    State(state): State<PreferencesState>,
    Json(body): Json<SidebarBody>,
) -> Response {
    match state.prefs.set_sidebar_collapsed(body.collapsed).await {
        Ok(()) => Json(json!({"sidebarCollapsed": body.collapsed})).into_response(),
        Err(e) => storage_failure(e),
    }
}

/// POST /api/preferences/sidebar/toggle
async fn toggle_sidebar(State(state): State<PreferencesState>) -> Response {
    match state.prefs.toggle_sidebar().await {
        Ok(collapsed) => Json(json!({"sidebarCollapsed": collapsed})).into_response(),
        Err(e) => storage_failure(e),
    }
}

/// Build the preference routes.
pub fn preferences_routes(state: PreferencesState) -> Router {
    Router::new()
        .route("/api/preferences", get(get_preferences))
        .route("/api/preferences/theme", put(set_theme))
        .route("/api/preferences/theme/toggle", post(toggle_theme))
        .route("/api/preferences/sidebar", put(set_sidebar))
        .route("/api/preferences/sidebar/toggle", post(toggle_sidebar))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::body::Body;
    use axum::http::{Request as HttpRequest, header};
    use tower::ServiceExt;

    use crate::store::MemoryStorage;

    fn router(storage: Arc<MemoryStorage>) -> Router {
        preferences_routes(PreferencesState {
            prefs: Arc::new(PreferencesStore::new(storage)),
        })
    }

    fn request(method: &str, uri: &str, body: Option<&str>) -> HttpRequest<Body> {
        let builder = HttpRequest::builder().method(method).uri(uri);
        match body {
            Some(b) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(b.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn call(router: Router, req: HttpRequest<Body>) -> (StatusCode, serde_json::Value) {
        let response = router.oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
        };
        (status, json)
    }

    #[tokio::test]
    async fn defaults_then_toggles() {
        let storage = Arc::new(MemoryStorage::new());
        let (status, json) = call(router(storage.clone()), request("GET", "/api/preferences", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["theme"], "light");
        assert_eq!(json["sidebarCollapsed"], false);

        let (_, json) = call(router(storage.clone()), request("POST", "/api/preferences/theme/toggle", None)).await;
        assert_eq!(json["theme"], "dark");
        let (_, json) = call(router(storage.clone()), request("POST", "/api/preferences/sidebar/toggle", None)).await;
        assert_eq!(json["sidebarCollapsed"], true);

        let (_, json) = call(router(storage), request("GET", "/api/preferences", None)).await;
        assert_eq!(json["theme"], "dark");
        assert_eq!(json["sidebarCollapsed"], true);
    }

    #[tokio::test]
    async fn explicit_values_and_bad_theme() {
        let storage = Arc::new(MemoryStorage::new());
        let (status, json) = call(
            router(storage.clone()),
            request("PUT", "/api/preferences/theme", Some(r#"{"theme":"cyberpunk"}"#)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["theme"], "cyberpunk");

        let (status, _) = call(
            router(storage.clone()),
            request("PUT", "/api/preferences/theme", Some(r#"{"theme":"neon"}"#)),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (_, json) = call(
            router(storage.clone()),
            request("PUT", "/api/preferences/sidebar", Some(r#"{"collapsed":true}"#)),
        )
        .await;
        assert_eq!(json["sidebarCollapsed"], true);

        let (_, json) = call(router(storage), request("GET", "/api/preferences", None)).await;
        assert_eq!(json["theme"], "cyberpunk");
    }

    #[tokio::test]
    async fn write_failure_is_500() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set_fail_writes(true);
        let (status, json) = call(router(storage), request("POST", "/api/preferences/theme/toggle", None)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(json["error"].as_str().unwrap().starts_with("Failed to store preference"));
    }
}
