//! Tests for groundloop-tools: registry, state/service/workspace tools and the remote bridge

use axum::extract::{Path as AxumPath, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use groundloop_core::config::{BridgeConfig, ServiceConfig, VerifyConfig};
use groundloop_core::StateStore;
use groundloop_tools::*;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

async fn fresh_state(dir: &tempfile::TempDir) -> Arc<StateStore> {
    Arc::new(StateStore::load(dir.path().join("state.json")).await)
}

fn workspace_ctx(dir: &tempfile::TempDir, state: Arc<StateStore>) -> ToolContext {
    ToolContext::new(state, dir.path()).with_verify(VerifyConfig {
        command: "true".into(),
        timeout_secs: 10,
    })
}

// ===========================================================================
// ToolResult / ToolRegistry
// ===========================================================================

#[test]
fn tool_result_error_prefix() {
    let r = ToolResult::error("boom");
    assert!(r.is_error());
    assert_eq!(r.to_content_string(), "Error: boom");
    assert_eq!(ToolResult::text("ok").to_content_string(), "ok");
}

struct PanicTool;

#[async_trait::async_trait]
impl Tool for PanicTool {
    fn name(&self) -> &str {
        "explode"
    }
    fn description(&self) -> &str {
        "always panics"
    }
    fn input_schema(&self) -> Value {
        json!({"type": "object"})
    }
    async fn execute(&self, _args: Value) -> ToolResult {
        panic!("kaboom")
    }
}

struct NamedTool(&'static str);

#[async_trait::async_trait]
impl Tool for NamedTool {
    fn name(&self) -> &str {
        self.0
    }
    fn description(&self) -> &str {
        "static test tool"
    }
    fn input_schema(&self) -> Value {
        json!({"type": "object"})
    }
    async fn execute(&self, _args: Value) -> ToolResult {
        ToolResult::text(self.0)
    }
}

#[tokio::test]
async fn registry_rejects_duplicates_and_keeps_order() {
    let mut reg = ToolRegistry::new();
    reg.register(NamedTool("b")).unwrap();
    reg.register(NamedTool("a")).unwrap();
    let err = reg.register(NamedTool("b")).unwrap_err();
    assert!(matches!(err, RegistryError::Duplicate(ref n) if n == "b"));
    assert_eq!(reg.list(), vec!["b", "a"]);
    assert_eq!(reg.definitions().len(), 2);
}

#[tokio::test]
async fn registry_unknown_tool_is_error_result() {
    let reg = ToolRegistry::new();
    let result = reg.execute("nonexistent", json!({})).await;
    assert!(result.is_error());
    assert!(result.to_content_string().contains("not found"));
}

#[tokio::test]
async fn registry_catches_panicking_tool() {
    let mut reg = ToolRegistry::new();
    reg.register(PanicTool).unwrap();
    reg.register(NamedTool("after")).unwrap();

    let result = reg.execute("explode", json!({})).await;
    assert!(result.is_error());
    let text = result.to_content_string();
    assert!(text.contains("tool 'explode' panicked"), "{}", text);
    assert!(text.contains("kaboom"));

    // The registry is still usable afterwards.
    let after = reg.execute("after", json!({})).await;
    assert_eq!(after.to_content_string(), "after");
}

#[tokio::test]
async fn static_registry_groups() {
    let dir = tempfile::tempdir().unwrap();
    let state = fresh_state(&dir).await;
    let ctx = workspace_ctx(&dir, state);

    let reg = create_static_registry(&ctx, &["state".into()]).unwrap();
    assert_eq!(reg.list(), vec!["inspect_state", "save_credential", "set_status"]);

    let reg = create_static_registry(&ctx, &["state".into(), "workspace".into()]).unwrap();
    for name in ["read_file", "write_file", "list_files", "run_verification"] {
        assert!(reg.contains(name), "missing {}", name);
    }
    for def in reg.definitions() {
        assert!(!def.description.is_empty());
        assert!(def.input_schema.is_object());
    }

    let err = create_static_registry(&ctx, &["service".into()]).err().unwrap();
    assert!(matches!(err, RegistryError::GroupUnavailable { .. }));
}

// ===========================================================================
// State tools
// ===========================================================================

#[tokio::test]
async fn save_credential_then_inspect() {
    let dir = tempfile::tempdir().unwrap();
    let state = fresh_state(&dir).await;
    let reg = create_static_registry(&workspace_ctx(&dir, state.clone()), &[]).unwrap();

    let saved = reg.execute("save_credential", json!({"value": "  sk-abc "})).await;
    assert!(!saved.is_error(), "{}", saved.to_content_string());
    assert_eq!(state.snapshot().await.credential.as_deref(), Some("sk-abc"));

    let shown = reg.execute("inspect_state", json!({})).await;
    assert!(shown.to_content_string().contains("\"credential\": \"sk-abc\""));

    let on_disk = std::fs::read_to_string(dir.path().join("state.json")).unwrap();
    assert!(on_disk.contains("sk-abc"));
}

#[tokio::test]
async fn save_credential_requires_value() {
    let dir = tempfile::tempdir().unwrap();
    let state = fresh_state(&dir).await;
    let reg = create_static_registry(&workspace_ctx(&dir, state), &[]).unwrap();

    assert!(reg.execute("save_credential", json!({})).await.is_error());
    assert!(reg.execute("save_credential", json!({"value": "   "})).await.is_error());
}

#[tokio::test]
async fn set_status_stores_and_clears() {
    let dir = tempfile::tempdir().unwrap();
    let state = fresh_state(&dir).await;
    let reg = create_static_registry(&workspace_ctx(&dir, state.clone()), &[]).unwrap();

    let r = reg
        .execute("set_status", json!({"key": "phase", "value": "drafting"}))
        .await;
    assert!(!r.is_error());
    assert_eq!(state.snapshot().await.extra.get("phase"), Some(&json!("drafting")));

    reg.execute("set_status", json!({"key": "phase", "value": null}))
        .await;
    assert!(state.snapshot().await.extra.get("phase").is_none());
}

#[tokio::test]
async fn set_status_refuses_reserved_keys() {
    let dir = tempfile::tempdir().unwrap();
    let state = fresh_state(&dir).await;
    let reg = create_static_registry(&workspace_ctx(&dir, state.clone()), &[]).unwrap();

    let r = reg
        .execute("set_status", json!({"key": "credential", "value": "x"}))
        .await;
    assert!(r.is_error());
    assert!(state.snapshot().await.credential.is_none());
}

#[tokio::test]
async fn state_flush_failure_is_reported_as_text() {
    let dir = tempfile::tempdir().unwrap();
    // A regular file where the state directory should be.
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, "not a dir").unwrap();
    let state = Arc::new(StateStore::load(blocker.join("state.json")).await);
    let reg = create_static_registry(&ToolContext::new(state.clone(), dir.path()), &[]).unwrap();

    let r = reg.execute("save_credential", json!({"value": "k"})).await;
    assert!(r.is_error());
    assert!(r.to_content_string().contains("Failed to persist"));
    assert!(state.snapshot().await.credential.is_none());
}

// ===========================================================================
// Workspace tools
// ===========================================================================

#[tokio::test]
async fn write_then_read_file() {
    let dir = tempfile::tempdir().unwrap();
    let state = fresh_state(&dir).await;
    let reg =
        create_static_registry(&workspace_ctx(&dir, state), &["workspace".into()]).unwrap();

    let w = reg
        .execute("write_file", json!({"path": "src/deep/notes.md", "content": "hello"}))
        .await;
    assert!(!w.is_error(), "{}", w.to_content_string());
    assert!(dir.path().join("src/deep/notes.md").exists());

    let r = reg.execute("read_file", json!({"path": "src/deep/notes.md"})).await;
    assert_eq!(r.to_content_string(), "hello");

    // `file_path` is accepted as an alias.
    let r = reg.execute("read_file", json!({"file_path": "src/deep/notes.md"})).await;
    assert_eq!(r.to_content_string(), "hello");
}

#[tokio::test]
async fn read_missing_file_is_not_found_message() {
    let dir = tempfile::tempdir().unwrap();
    let state = fresh_state(&dir).await;
    let reg =
        create_static_registry(&workspace_ctx(&dir, state), &["workspace".into()]).unwrap();

    let r = reg.execute("read_file", json!({"path": "nope.txt"})).await;
    assert!(!r.is_error());
    assert!(r.to_content_string().contains("File not found: nope.txt"));
}

#[tokio::test]
async fn file_tools_refuse_escapes() {
    let dir = tempfile::tempdir().unwrap();
    let state = fresh_state(&dir).await;
    let reg =
        create_static_registry(&workspace_ctx(&dir, state), &["workspace".into()]).unwrap();

    let r = reg.execute("read_file", json!({"path": "../../etc/passwd"})).await;
    assert!(r.is_error());
    assert!(r.to_content_string().contains("escapes the workspace"));

    let r = reg.execute("read_file", json!({"path": "/etc/passwd"})).await;
    assert!(r.is_error());

    let r = reg
        .execute("write_file", json!({"path": "../outside.txt", "content": "x"}))
        .await;
    assert!(r.is_error());
    assert!(!dir.path().parent().unwrap().join("outside.txt").exists());
}

#[cfg(unix)]
#[tokio::test]
async fn file_tools_refuse_symlinks_leaving_the_workspace() {
    let dir = tempfile::tempdir().unwrap();
    let outside = tempfile::tempdir().unwrap();
    std::fs::write(outside.path().join("secret.txt"), "TOP SECRET").unwrap();
    std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();
    std::os::unix::fs::symlink(
        outside.path().join("missing.txt"),
        dir.path().join("dangling.txt"),
    )
    .unwrap();

    let state = fresh_state(&dir).await;
    let reg =
        create_static_registry(&workspace_ctx(&dir, state), &["workspace".into()]).unwrap();

    let r = reg.execute("read_file", json!({"path": "link/secret.txt"})).await;
    assert!(r.is_error());
    assert!(!r.to_content_string().contains("TOP SECRET"));

    let r = reg
        .execute("write_file", json!({"path": "link/planted.txt", "content": "x"}))
        .await;
    assert!(r.is_error());
    assert!(!outside.path().join("planted.txt").exists());

    let r = reg
        .execute("write_file", json!({"path": "dangling.txt", "content": "x"}))
        .await;
    assert!(r.is_error());
    assert!(!outside.path().join("missing.txt").exists());
}

#[cfg(unix)]
#[tokio::test]
async fn symlinks_within_the_workspace_still_work() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("real")).unwrap();
    std::fs::write(dir.path().join("real/a.txt"), "inside").unwrap();
    std::os::unix::fs::symlink(dir.path().join("real"), dir.path().join("alias")).unwrap();

    let state = fresh_state(&dir).await;
    let reg =
        create_static_registry(&workspace_ctx(&dir, state), &["workspace".into()]).unwrap();

    let r = reg.execute("read_file", json!({"path": "alias/a.txt"})).await;
    assert_eq!(r.to_content_string(), "inside");

    let w = reg
        .execute("write_file", json!({"path": "alias/new/b.txt", "content": "b"}))
        .await;
    assert!(!w.is_error(), "{}", w.to_content_string());
    assert!(dir.path().join("real/new/b.txt").exists());
}

#[tokio::test]
async fn list_files_with_and_without_pattern() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("src")).unwrap();
    std::fs::create_dir_all(dir.path().join("target/debug")).unwrap();
    std::fs::create_dir_all(dir.path().join(".git")).unwrap();
    std::fs::write(dir.path().join("src/lib.rs"), "").unwrap();
    std::fs::write(dir.path().join("src/main.rs"), "").unwrap();
    std::fs::write(dir.path().join("README.md"), "").unwrap();
    std::fs::write(dir.path().join("target/debug/out"), "").unwrap();
    std::fs::write(dir.path().join(".git/HEAD"), "").unwrap();

    let state = Arc::new(StateStore::with_state(
        dir.path().join("elsewhere/state.json"),
        Default::default(),
    ));
    let reg =
        create_static_registry(&workspace_ctx(&dir, state), &["workspace".into()]).unwrap();

    let all = reg.execute("list_files", json!({})).await.to_content_string();
    assert_eq!(all, "README.md\nsrc/lib.rs\nsrc/main.rs");

    let rs = reg
        .execute("list_files", json!({"pattern": "**/*.rs"}))
        .await
        .to_content_string();
    assert_eq!(rs, "src/lib.rs\nsrc/main.rs");

    let none = reg
        .execute("list_files", json!({"pattern": "*.toml"}))
        .await
        .to_content_string();
    assert_eq!(none, "No files found");
}

#[tokio::test]
async fn verification_pass_and_fail() {
    let dir = tempfile::tempdir().unwrap();

    let pass = tools::verify::RunVerificationTool::new(
        dir.path(),
        &VerifyConfig {
            command: "echo all good".into(),
            timeout_secs: 10,
        },
    );
    let r = pass.execute(json!({})).await.to_content_string();
    assert!(r.starts_with("PASSED"), "{}", r);
    assert!(r.contains("all good"));

    let fail = tools::verify::RunVerificationTool::new(
        dir.path(),
        &VerifyConfig {
            command: "echo broken >&2; exit 3".into(),
            timeout_secs: 10,
        },
    );
    let r = fail.execute(json!({})).await.to_content_string();
    assert!(r.starts_with("FAILED (exit code 3)"), "{}", r);
    assert!(r.contains("broken"));
}

#[tokio::test]
async fn verification_runs_in_workspace_and_times_out() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("marker.txt"), "").unwrap();

    let ls = tools::verify::RunVerificationTool::new(
        dir.path(),
        &VerifyConfig {
            command: "ls".into(),
            timeout_secs: 10,
        },
    );
    assert!(ls.execute(json!({})).await.to_content_string().contains("marker.txt"));

    let slow = tools::verify::RunVerificationTool::new(
        dir.path(),
        &VerifyConfig {
            command: "sleep 5".into(),
            timeout_secs: 1,
        },
    );
    let r = slow.execute(json!({})).await;
    assert!(r.is_error());
    assert!(r.to_content_string().contains("timed out"));
}

// ===========================================================================
// Service tools against a mock HTTP server
// ===========================================================================

#[derive(Clone, Default)]
struct MockService {
    auth_headers: Arc<Mutex<Vec<Option<String>>>>,
    register_body: Arc<Mutex<Value>>,
}

impl MockService {
    fn record(&self, headers: &HeaderMap) {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        self.auth_headers.lock().unwrap().push(auth);
    }
}

async fn mock_register(
    State(mock): State<MockService>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    mock.record(&headers);
    *mock.register_body.lock().unwrap() = body.clone();
    if body["name"] == "taken" {
        return (StatusCode::CONFLICT, Json(json!({"error": "name taken"})));
    }
    if body["name"] == "keyless" {
        return (StatusCode::OK, Json(json!({"agent": {"name": "keyless"}})));
    }
    (
        StatusCode::CREATED,
        Json(json!({
            "agent": {"api_key": "sk-live-1", "claim_url": "https://svc/claim/abc"}
        })),
    )
}

async fn mock_list(
    State(mock): State<MockService>,
    headers: HeaderMap,
    Query(q): Query<HashMap<String, String>>,
) -> Json<Value> {
    mock.record(&headers);
    Json(json!({"posts": [{"id": 1}], "sort": q.get("sort"), "limit": q.get("limit")}))
}

async fn mock_search(
    State(mock): State<MockService>,
    headers: HeaderMap,
    Query(q): Query<HashMap<String, String>>,
) -> Json<Value> {
    mock.record(&headers);
    Json(json!({"results": [], "q": q.get("q")}))
}

async fn mock_create(
    State(mock): State<MockService>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    mock.record(&headers);
    if headers.get("authorization").is_none() {
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "login first"})));
    }
    (StatusCode::CREATED, Json(json!({"id": 42, "title": body["title"]})))
}

async fn mock_comment(
    State(mock): State<MockService>,
    headers: HeaderMap,
    AxumPath(post_id): AxumPath<String>,
) -> Json<Value> {
    mock.record(&headers);
    Json(json!({"ok": true, "post": post_id}))
}

async fn start_mock_service() -> (String, MockService) {
    let mock = MockService::default();
    let app = Router::new()
        .route("/agents/register", post(mock_register))
        .route("/posts", get(mock_list).post(mock_create))
        .route("/search", get(mock_search))
        .route("/posts/:post_id/comments", post(mock_comment))
        .with_state(mock.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), mock)
}

async fn service_registry(
    dir: &tempfile::TempDir,
    base_url: String,
) -> (ToolRegistry, Arc<StateStore>) {
    let state = fresh_state(dir).await;
    let service = ServiceClient::new(
        ServiceConfig {
            base_url,
            timeout_secs: 5,
            ..Default::default()
        },
        state.clone(),
    )
    .unwrap();
    let ctx = ToolContext::new(state.clone(), dir.path()).with_service(Arc::new(service));
    let reg = create_static_registry(&ctx, &["state".into(), "service".into()]).unwrap();
    (reg, state)
}

#[tokio::test]
async fn register_persists_credential_and_reports_activation_url() {
    let (base, mock) = start_mock_service().await;
    let dir = tempfile::tempdir().unwrap();
    let (reg, state) = service_registry(&dir, base).await;

    let r = reg
        .execute("register", json!({"name": "groundling", "description": "a test agent"}))
        .await;
    assert!(!r.is_error(), "{}", r.to_content_string());
    let text = r.to_content_string();
    assert!(text.contains("groundling"));
    assert!(text.contains("https://svc/claim/abc"));

    let s = state.snapshot().await;
    assert_eq!(s.credential.as_deref(), Some("sk-live-1"));
    assert_eq!(s.identity.as_deref(), Some("groundling"));
    assert_eq!(s.activation_url.as_deref(), Some("https://svc/claim/abc"));

    let sent = mock.register_body.lock().unwrap().clone();
    assert_eq!(sent, json!({"name": "groundling", "description": "a test agent"}));
    // Unauthenticated before registration.
    assert_eq!(mock.auth_headers.lock().unwrap()[0], None);
}

#[tokio::test]
async fn register_failures_are_diagnostic_text() {
    let (base, _mock) = start_mock_service().await;
    let dir = tempfile::tempdir().unwrap();
    let (reg, state) = service_registry(&dir, base).await;

    let r = reg
        .execute("register", json!({"name": "taken", "description": "d"}))
        .await;
    assert!(r.is_error());
    assert!(r.to_content_string().contains("409"));

    let r = reg
        .execute("register", json!({"name": "keyless", "description": "d"}))
        .await;
    assert!(r.is_error());
    assert!(r.to_content_string().contains("no credential"));

    assert!(state.snapshot().await.credential.is_none());
}

#[tokio::test]
async fn authenticated_actions_send_bearer_and_timestamp_state() {
    let (base, mock) = start_mock_service().await;
    let dir = tempfile::tempdir().unwrap();
    let (reg, state) = service_registry(&dir, base).await;

    // Without a credential the service refuses and nothing is stamped.
    let denied = reg
        .execute("create_post", json!({"title": "t", "content": "c"}))
        .await;
    assert!(denied.is_error());
    assert!(denied.to_content_string().contains("401"));
    assert!(state.snapshot().await.last_action_timestamp.is_none());

    reg.execute("save_credential", json!({"value": "sk-saved"}))
        .await;

    let created = reg
        .execute(
            "create_post",
            json!({"title": "hello", "content": "world", "channel": "general"}),
        )
        .await;
    assert!(!created.is_error(), "{}", created.to_content_string());
    assert!(created.to_content_string().contains("42"));
    let stamped = state.snapshot().await.last_action_timestamp;
    assert!(stamped.is_some());

    let commented = reg
        .execute("add_comment", json!({"post_id": "42", "content": "nice"}))
        .await;
    assert!(commented.to_content_string().contains("\"post\":\"42\""));
    assert!(state.snapshot().await.last_action_timestamp >= stamped);

    let headers = mock.auth_headers.lock().unwrap().clone();
    assert_eq!(headers.last().unwrap().as_deref(), Some("Bearer sk-saved"));
}

#[tokio::test]
async fn comment_post_id_stays_one_path_segment() {
    let (base, _mock) = start_mock_service().await;
    let dir = tempfile::tempdir().unwrap();
    let (reg, _state) = service_registry(&dir, base).await;

    let r = reg
        .execute("add_comment", json!({"post_id": "../x", "content": "hi"}))
        .await;
    assert!(!r.is_error(), "{}", r.to_content_string());
    assert!(r.to_content_string().contains("\"post\":\"../x\""));

    let r = reg
        .execute("add_comment", json!({"post_id": "..", "content": "hi"}))
        .await;
    assert!(r.is_error());
    assert!(r.to_content_string().contains("Invalid post_id"));
}

#[tokio::test]
async fn read_only_service_tools_pass_query() {
    let (base, _mock) = start_mock_service().await;
    let dir = tempfile::tempdir().unwrap();
    let (reg, state) = service_registry(&dir, base).await;

    let listed = reg
        .execute("list_items", json!({"sort": "new", "limit": 5}))
        .await
        .to_content_string();
    assert!(listed.contains("\"sort\":\"new\""));
    assert!(listed.contains("\"limit\":\"5\""));

    let found = reg
        .execute("search", json!({"query": "rust loops"}))
        .await
        .to_content_string();
    assert!(found.contains("rust loops"));

    assert!(reg.get("list_items").unwrap().is_read_only());
    assert!(state.snapshot().await.last_action_timestamp.is_none());
}

#[tokio::test]
async fn unreachable_service_is_error_text() {
    let dir = tempfile::tempdir().unwrap();
    let (reg, _state) = service_registry(&dir, "http://127.0.0.1:9".into()).await;

    let r = reg.execute("list_items", json!({})).await;
    assert!(r.is_error());
    assert!(r.to_content_string().contains("127.0.0.1:9"));
}

// ===========================================================================
// Remote tool bridge over an in-process provider
// ===========================================================================

/// A fake provider speaking newline-delimited JSON-RPC on one end of a duplex pipe.
fn fake_provider(tools: Value) -> LineTransport {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let (server_read, mut server_write) = tokio::io::split(server);

    tokio::spawn(async move {
        let mut lines = BufReader::new(server_read).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let msg: Value = serde_json::from_str(&line).unwrap();
            let Some(id) = msg.get("id").cloned() else {
                continue;
            };
            let params = &msg["params"];
            let reply = match msg["method"].as_str().unwrap_or_default() {
                "initialize" => json!({"result": {"protocolVersion": "2024-11-05", "capabilities": {}}}),
                "tools/list" => json!({"result": {"tools": tools}}),
                "tools/call" => match params["name"].as_str().unwrap_or_default() {
                    "echo" => json!({"result": {
                        "content": [{"type": "text", "text": params["arguments"]["text"]}]
                    }}),
                    "fail" => json!({"result": {
                        "content": [{"type": "text", "text": "bad input"}], "isError": true
                    }}),
                    "silent" => json!({"result": {"content": []}}),
                    "hang" => continue,
                    other => json!({"error": {"code": -32602, "message": format!("unknown tool {}", other)}}),
                },
                _ => json!({"error": {"code": -32601, "message": "method not found"}}),
            };
            let mut reply = reply;
            reply["jsonrpc"] = json!("2.0");
            reply["id"] = id;
            let line = format!("{}\n", reply);
            if server_write.write_all(line.as_bytes()).await.is_err() {
                break;
            }
        }
    });

    let (client_read, client_write) = tokio::io::split(client);
    LineTransport::from_io(client_read, client_write, Duration::from_millis(500))
}

async fn connected_bridge(tools: Value) -> RemoteToolBridge {
    let transport = fake_provider(tools);
    transport.initialize().await.unwrap();
    let mut bridge = RemoteToolBridge::new(Arc::new(transport));
    bridge.discover().await.unwrap();
    bridge
}

fn static_only(dir: &tempfile::TempDir, state: Arc<StateStore>) -> ToolRegistry {
    create_static_registry(&ToolContext::new(state, dir.path()), &["state".into()]).unwrap()
}

#[tokio::test]
async fn bridge_with_zero_tools_leaves_static_registry() {
    let dir = tempfile::tempdir().unwrap();
    let mut reg = static_only(&dir, fresh_state(&dir).await);
    let before = reg.list().iter().map(|s| s.to_string()).collect::<Vec<_>>();

    let bridge = connected_bridge(json!([])).await;
    assert_eq!(bridge.register_into(&mut reg), 0);
    assert_eq!(reg.list(), before);
}

#[tokio::test]
async fn bridge_echo_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let mut reg = static_only(&dir, fresh_state(&dir).await);
    let before = reg.len();

    let bridge = connected_bridge(json!([{
        "name": "echo",
        "description": "Echo text back",
        "inputSchema": {"type": "object", "properties": {"text": {"type": "string"}}}
    }]))
    .await;
    assert_eq!(bridge.register_into(&mut reg), 1);
    assert_eq!(reg.len(), before + 1);

    let r = reg.execute("echo", json!({"text": "ping-7f3a"})).await;
    assert!(!r.is_error(), "{}", r.to_content_string());
    assert_eq!(r.to_content_string(), "ping-7f3a");
}

#[tokio::test]
async fn bridge_result_shapes() {
    let dir = tempfile::tempdir().unwrap();
    let mut reg = static_only(&dir, fresh_state(&dir).await);
    let bridge = connected_bridge(json!([
        {"name": "fail"},
        {"name": "silent", "parameters": ["a", "b"]},
        {"name": "missing"},
        {"name": "hang"}
    ]))
    .await;
    assert_eq!(bridge.register_into(&mut reg), 4);

    let failed = reg.execute("fail", json!({})).await;
    assert!(failed.is_error());
    assert_eq!(failed.to_content_string(), "Error: bad input");

    let silent = reg.execute("silent", json!({})).await;
    assert_eq!(silent.to_content_string(), "(no output)");
    let schema = reg.get("silent").unwrap().input_schema();
    assert_eq!(schema["properties"]["a"]["type"], "string");

    let missing = reg.execute("missing", json!({})).await;
    assert!(missing.is_error());
    assert!(missing.to_content_string().contains("unknown tool missing"));

    let hung = reg.execute("hang", json!({})).await;
    assert!(hung.is_error());
    assert!(hung.to_content_string().contains("timed out"));

    let bad_args = reg.execute("fail", json!("not an object")).await;
    assert!(bad_args.to_content_string().contains("must be an object"));
}

#[tokio::test]
async fn bridge_skips_names_taken_by_static_tools() {
    let dir = tempfile::tempdir().unwrap();
    let mut reg = static_only(&dir, fresh_state(&dir).await);
    let bridge = connected_bridge(json!([{"name": "inspect_state"}, {"name": "echo"}])).await;

    assert_eq!(bridge.register_into(&mut reg), 1);
    assert!(reg.get("inspect_state").unwrap().is_read_only());
}

#[tokio::test]
async fn transport_reports_closed_connection() {
    let (client, server) = tokio::io::duplex(1024);
    drop(server);
    let (r, w) = tokio::io::split(client);
    let transport = LineTransport::from_io(r, w, Duration::from_millis(500));

    let err = transport.initialize().await.unwrap_err();
    assert!(matches!(err, BridgeError::Closed), "{:?}", err);
}

#[tokio::test]
async fn bridge_connect_without_provider_fails() {
    let err = RemoteToolBridge::connect(&BridgeConfig::default())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, BridgeError::NotConfigured));

    let err = RemoteToolBridge::connect(&BridgeConfig {
        command: Some("/definitely/not/a/provider".into()),
        ..Default::default()
    })
    .await
    .err()
    .unwrap();
    assert!(matches!(err, BridgeError::Spawn { .. }));

    let err = RemoteToolBridge::connect(&BridgeConfig {
        address: Some("127.0.0.1:9".into()),
        timeout_secs: 2,
        ..Default::default()
    })
    .await
    .err()
    .unwrap();
    assert!(matches!(err, BridgeError::Connect { .. }));
}
