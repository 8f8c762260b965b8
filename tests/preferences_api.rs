//! Integration tests for the preference endpoints over real HTTP.
//!
//! Preferences are stored in a libsql file so a second server over the same
//! database sees what the first one wrote.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::time::timeout;

use cauldron_assist::preferences::{PreferencesState, PreferencesStore, preferences_routes};
use cauldron_assist::store::LibSqlBackend;

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Start the preference API over the database at `db_path`, return the base url.
async fn start_server(db_path: &Path) -> String {
    let db = Arc::new(LibSqlBackend::new_local(db_path).await.unwrap());
    let app = preferences_routes(PreferencesState {
        prefs: Arc::new(PreferencesStore::new(db)),
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    format!("http://127.0.0.1:{port}")
}

async fn post(base: &str, path: &str) -> Value {
    reqwest::Client::new()
        .post(format!("{base}{path}"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

async fn get(base: &str) -> Value {
    reqwest::get(format!("{base}/api/preferences"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

#[tokio::test]
async fn theme_cycles_and_sidebar_toggles() {
    timeout(TEST_TIMEOUT, async {
        let dir = tempfile::tempdir().unwrap();
        let base = start_server(&dir.path().join("prefs.db")).await;

        let prefs = get(&base).await;
        assert_eq!(prefs["theme"], "light");
        assert_eq!(prefs["sidebarCollapsed"], false);

        let themes: Vec<Value> = [
            post(&base, "/api/preferences/theme/toggle").await,
            post(&base, "/api/preferences/theme/toggle").await,
            post(&base, "/api/preferences/theme/toggle").await,
        ]
        .into_iter()
        .map(|v| v["theme"].clone())
        .collect();
        assert_eq!(themes, vec![json!("dark"), json!("cyberpunk"), json!("light")]);

        assert_eq!(post(&base, "/api/preferences/sidebar/toggle").await["sidebarCollapsed"], true);
        assert_eq!(post(&base, "/api/preferences/sidebar/toggle").await["sidebarCollapsed"], false);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn preferences_survive_restart() {
    timeout(TEST_TIMEOUT, async {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("prefs.db");

        {
            let base = start_server(&db_path).await;
            let resp = reqwest::Client::new()
                .put(format!("{base}/api/preferences/theme"))
                .json(&json!({"theme": "cyberpunk"}))
                .send()
                .await
                .unwrap();
            assert_eq!(resp.status(), 200);
            post(&base, "/api/preferences/sidebar/toggle").await;
        }

        let base = start_server(&db_path).await;
        let prefs = get(&base).await;
        assert_eq!(prefs["theme"], "cyberpunk");
        assert_eq!(prefs["sidebarCollapsed"], true);
    })
    .await
    .expect("test timed out");
}
