//! Integration tests for the assistant session API.
//!
//! The full assistant stack runs on a random port: libsql-backed session
//! store, dispatcher and the in-process agent bridge driven by a shell script.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::time::timeout;

use cauldron_assist::assistant::backend::ProcessBackend;
use cauldron_assist::assistant::dispatcher::ERROR_REPLY;
use cauldron_assist::assistant::{
    AssistantState, ContextResolver, ConversationRenderer, Dispatcher, SessionStore,
    assistant_routes,
};
use cauldron_assist::bridge::AgentProcess;
use cauldron_assist::config::BridgeConfig;
use cauldron_assist::store::LibSqlBackend;

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(10);

const REPLYING_AGENT: &str = r#"cat >/dev/null
echo '{"delim":"start"}'
echo '{"content":"Hi "}'
echo '{"content":"there"}'
echo '{"delim":"end","response":{"messages":[{"role":"assistant","content":"Hi there"}]}}'
"#;

/// Start the assistant API over the database at `db_path`, return the base url.
async fn start_server(dir: &Path, db_path: &Path, script: &str) -> String {
    std::fs::write(dir.join("agent.sh"), script).unwrap();
    let agent = Arc::new(AgentProcess::new(BridgeConfig {
        agent_dir: dir.to_path_buf(),
        interpreter: "sh".into(),
        swarm_script: PathBuf::from("agent.sh"),
        langgraph_script: PathBuf::from("agent.sh"),
        timeout: Duration::from_secs(5),
    }));

    let db = Arc::new(LibSqlBackend::new_local(db_path).await.unwrap());
    let store = SessionStore::open(db).await.unwrap();
    let dispatcher = Dispatcher::new(
        store.clone(),
        Arc::new(ProcessBackend::new(agent, "llama3-70b-8192")),
        Duration::from_secs(5),
    );
    let app = assistant_routes(AssistantState {
        store,
        dispatcher: Arc::new(dispatcher),
        resolver: Arc::new(ContextResolver::with_defaults()),
        renderer: Arc::new(ConversationRenderer::new()),
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

async fn send(base: &str, content: &str) -> Value {
    reqwest::Client::new()
        .post(format!("{base}/api/assistant/messages"))
        .json(&json!({ "content": content }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

#[tokio::test]
async fn message_round_trip_through_agent() {
    timeout(TEST_TIMEOUT, async {
        let dir = tempfile::tempdir().unwrap();
        let base = start_server(dir.path(), &dir.path().join("a.db"), REPLYING_AGENT).await;

        let messages = send(&base, "hello").await;
        let messages = messages.as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(messages[0]["content"], "hello");
        assert_eq!(messages[1]["role"], "assistant");
        assert_eq!(messages[1]["content"], "Hi there");
        assert_eq!(messages[1]["type"], "markdown");

        let session: Value = reqwest::get(format!("{base}/api/assistant/session"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(session["isLoading"], false);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn agent_failure_becomes_error_message() {
    timeout(TEST_TIMEOUT, async {
        let dir = tempfile::tempdir().unwrap();
        let base = start_server(
            dir.path(),
            &dir.path().join("a.db"),
            "cat >/dev/null; echo 'model offline' >&2; exit 2",
        )
        .await;

        let messages = send(&base, "hello").await;
        let last = messages.as_array().unwrap().last().unwrap().clone();
        assert_eq!(last["role"], "assistant");
        assert_eq!(last["content"], ERROR_REPLY);
        assert_eq!(last["type"], "error");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn blank_message_changes_nothing() {
    timeout(TEST_TIMEOUT, async {
        let dir = tempfile::tempdir().unwrap();
        let base = start_server(dir.path(), &dir.path().join("a.db"), REPLYING_AGENT).await;

        let resp = reqwest::Client::new()
            .post(format!("{base}/api/assistant/messages"))
            .json(&json!({ "content": " \t " }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 202);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["ignored"], true);
        let session: Value = reqwest::get(format!("{base}/api/assistant/session"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert!(session["messages"].as_array().unwrap().is_empty());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn conversation_and_context_survive_restart() {
    timeout(TEST_TIMEOUT, async {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("session.db");

        {
            let base = start_server(dir.path(), &db_path, REPLYING_AGENT).await;
            let context: Value = reqwest::Client::new()
                .put(format!("{base}/api/assistant/context"))
                .json(&json!({"path": "/workspaces/42/settings"}))
                .send()
                .await
                .unwrap()
                .json()
                .await
                .unwrap();
            assert!(context["context"].as_str().unwrap().starts_with("Workspaces"));
            send(&base, "remember me").await;

            // The UI flag is not persisted.
            reqwest::Client::new()
                .post(format!("{base}/api/assistant/toggle"))
                .send()
                .await
                .unwrap();
        }

        let db = Arc::new(LibSqlBackend::new_local(&db_path).await.unwrap());
        let reopened = SessionStore::open(db).await.unwrap();
        let session = reopened.snapshot().await;
        assert_eq!(session.messages.len(), 2);
        assert_eq!(session.messages[0].content, "remember me");
        assert!(
            session
                .current_module_context
                .as_deref()
                .unwrap()
                .starts_with("Workspaces")
        );
        assert!(!session.is_open);
        assert!(!session.is_loading);
    })
    .await
    .expect("test timed out");
}
