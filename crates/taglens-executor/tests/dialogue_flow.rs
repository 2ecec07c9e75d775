use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, routing::post, Json, Router};
use serde_json::{json, Value};
use taglens_core::{Role, Task, TaskResult};
use taglens_executor::{
    CodeServerEndpoint, ConfigStore, DialogueEngine, LlmProfile, ResultStore, TaskRegistry,
    EXHAUSTED_VERDICT,
};
use tempfile::TempDir;

/// Chat endpoint that walks a script of assistant replies, repeating the
/// final entry once the script runs out.
struct ScriptedLlm {
    replies: Vec<String>,
    calls: AtomicUsize,
}

async fn chat_completions(
    State(llm): State<Arc<ScriptedLlm>>,
    Json(_request): Json<Value>,
) -> Json<Value> {
    let call = llm.calls.fetch_add(1, Ordering::SeqCst);
    let reply = llm
        .replies
        .get(call)
        .or_else(|| llm.replies.last())
        .cloned()
        .unwrap_or_default();
    Json(json!({
        "choices": [{"message": {"role": "assistant", "content": reply}}]
    }))
}

async fn serve(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

async fn start_llm(replies: Vec<&str>) -> (SocketAddr, Arc<ScriptedLlm>) {
    let llm = Arc::new(ScriptedLlm {
        replies: replies.into_iter().map(str::to_string).collect(),
        calls: AtomicUsize::new(0),
    });
    let router = Router::new()
        .route("/chat/completions", post(chat_completions))
        .with_state(Arc::clone(&llm));
    (serve(router).await, llm)
}

async fn start_code_server(symbol_body: Value, refs_body: Value) -> SocketAddr {
    let router = Router::new()
        .route(
            "/api/get_symbol",
            post(move |_: Json<Value>| {
                let body = symbol_body.clone();
                async move { Json(body) }
            }),
        )
        .route(
            "/api/find_refs",
            post(move |_: Json<Value>| {
                let body = refs_body.clone();
                async move { Json(body) }
            }),
        );
    serve(router).await
}

struct Harness {
    _dir: TempDir,
    registry: Arc<TaskRegistry>,
    results_dir: std::path::PathBuf,
}

impl Harness {
    async fn start(llm_addr: SocketAddr, code_addr: SocketAddr) -> Self {
        let dir = TempDir::new().unwrap();
        let config = Arc::new(ConfigStore::load(dir.path().join("config.json")).unwrap());
        config
            .upsert_llm(LlmProfile {
                name: "stub-llm".into(),
                api_key: "test-key".into(),
                base_url: format!("http://{llm_addr}"),
                model: "stub-model".into(),
            })
            .unwrap();
        config
            .upsert_code_server(CodeServerEndpoint {
                name: "stub-cis".into(),
                url: format!("{}:{}", code_addr.ip(), code_addr.port()),
            })
            .unwrap();

        let results_dir = dir.path().join("results");
        let results = Arc::new(ResultStore::new(&results_dir));
        let registry = TaskRegistry::start(DialogueEngine::new(config, results));

        Self {
            _dir: dir,
            registry,
            results_dir,
        }
    }

    async fn submit(&self, id: &str) {
        self.registry
            .submit(Task {
                id: id.into(),
                system_prompt: "你是代码审计助手。".into(),
                user_prompt: "分析这个函数。".into(),
                code_server_name: "stub-cis".into(),
                llm_config_name: "stub-llm".into(),
            })
            .await
            .unwrap();
    }

    async fn wait_for_results(&self, id: &str) -> Vec<TaskResult> {
        let path = self.results_dir.join(format!("{id}.json"));
        for _ in 0..100 {
            // The file appears before its content settles; retry on a
            // torn read.
            if let Ok(bytes) = std::fs::read(&path) {
                if let Ok(results) = serde_json::from_slice(&bytes) {
                    return results;
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("no result file for task {id}");
    }
}

#[tokio::test]
async fn terminal_nothave_persists_single_result() {
    let (llm_addr, llm) = start_llm(vec![r#"{"tag":"tsj_nothave","response":"ok"}"#]).await;
    let code_addr = start_code_server(json!({}), json!({})).await;
    let harness = Harness::start(llm_addr, code_addr).await;

    harness.submit("t-nothave").await;
    let results = harness.wait_for_results("t-nothave").await;

    assert_eq!(results.len(), 1);
    let result = &results[0];
    assert!(!result.has_problem_info);
    assert!(result.problem_info.is_null());
    assert_eq!(result.response.as_deref(), Some("ok"));
    assert_eq!(result.conversation.len(), 3);
    assert_eq!(result.conversation[0].role, Role::System);
    assert!(result.conversation[0].content.ends_with("请使用工具调用获取代码信息并分析问题。"));
    assert_eq!(result.conversation[2].role, Role::Assistant);
    assert_eq!(llm.calls.load(Ordering::SeqCst), 1);

    // Finished tasks leave the pending list.
    for _ in 0..100 {
        if !harness.registry.contains("t-nothave") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(!harness.registry.contains("t-nothave"));
}

#[tokio::test]
async fn tool_turn_then_have_builds_five_message_transcript() {
    let (llm_addr, _llm) = start_llm(vec![
        r#"{"tag":"tsj_next","requests":[{"command":"get_symbol","sym_name":"foo"}],"response":"need"}"#,
        r#"{"tag":"tsj_have","problem_info":{"problem_type":"leak","context":"foo"},"response":"found"}"#,
    ])
    .await;
    let symbol_body = json!({
        "status": "success",
        "res_list": [{
            "name": "foo",
            "kind": "function",
            "line": 1,
            "end": 3,
            "content": "int foo(){\n  return 0;\n}",
            "file": "a.c"
        }]
    });
    let code_addr = start_code_server(symbol_body.clone(), json!({})).await;
    let harness = Harness::start(llm_addr, code_addr).await;

    harness.submit("t-have").await;
    let results = harness.wait_for_results("t-have").await;

    assert_eq!(results.len(), 1);
    let result = &results[0];
    assert!(result.has_problem_info);
    assert_eq!(result.problem_info["problem_type"], json!("leak"));
    assert_eq!(result.response.as_deref(), Some("found"));

    let conversation = &result.conversation;
    assert_eq!(conversation.len(), 5);
    assert_eq!(conversation[2].role, Role::Assistant);
    // The tool response body lands verbatim as a user message.
    assert_eq!(conversation[3].role, Role::User);
    let tool_payload: Value = serde_json::from_str(&conversation[3].content).unwrap();
    assert_eq!(tool_payload, symbol_body);
    assert_eq!(conversation[4].role, Role::Assistant);
}

#[tokio::test]
async fn turn_exhaustion_is_flagged_for_review() {
    let (llm_addr, llm) = start_llm(vec![r#"{"tag":"tsj_next","requests":[]}"#]).await;
    let code_addr = start_code_server(json!({}), json!({})).await;
    let harness = Harness::start(llm_addr, code_addr).await;

    harness.submit("t-exhaust").await;
    let results = harness.wait_for_results("t-exhaust").await;

    assert_eq!(results.len(), 1);
    let result = &results[0];
    assert!(result.has_problem_info);
    assert_eq!(result.problem_info, json!(EXHAUSTED_VERDICT));
    assert!(result.response.is_none());
    // 2 seed messages + 5 assistant turns, no tool messages.
    assert_eq!(result.conversation.len(), 7);
    assert_eq!(llm.calls.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn unknown_llm_profile_aborts_without_result() {
    let (llm_addr, _llm) = start_llm(vec![r#"{"tag":"tsj_nothave"}"#]).await;
    let code_addr = start_code_server(json!({}), json!({})).await;
    let harness = Harness::start(llm_addr, code_addr).await;

    harness
        .registry
        .submit(Task {
            id: "t-noconfig".into(),
            system_prompt: String::new(),
            user_prompt: String::new(),
            code_server_name: "stub-cis".into(),
            llm_config_name: "no-such-profile".into(),
        })
        .await
        .unwrap();

    // The task drains from the pending list without producing a file.
    for _ in 0..100 {
        if !harness.registry.contains("t-noconfig") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(!harness.registry.contains("t-noconfig"));
    assert!(!harness.results_dir.join("t-noconfig.json").exists());
}
