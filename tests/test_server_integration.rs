use kraang::config::Config;
use kraang::server::{JsonRpcResponse, Server, METHOD_NOT_FOUND};
use kraang::storage::SqliteStore;
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;

fn server(dir: &TempDir) -> Server {
    let store = SqliteStore::open(&dir.path().join("kraang.db")).expect("Failed to open store");
    let mut config = Config::default();
    config.sessions.projects_dir = Some(dir.path().join("projects"));
    Server::new(Arc::new(store), config)
}

fn call(id: u64, tool: &str, arguments: Value) -> String {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": { "name": tool, "arguments": arguments }
    })
    .to_string()
}

/// Run a whole stdio exchange and return the responses in order
async fn exchange(server: &Server, requests: &[String]) -> Vec<JsonRpcResponse> {
    let input = requests.join("\n") + "\n";
    let mut output = Vec::new();
    server
        .serve(input.as_bytes(), &mut output)
        .await
        .expect("serve failed");

    String::from_utf8(output)
        .expect("non UTF-8 output")
        .lines()
        .map(|line| serde_json::from_str(line).expect("response is not JSON-RPC"))
        .collect()
}

fn tool_text(response: &JsonRpcResponse) -> (&str, bool) {
    let result = response.result.as_ref().expect("tool call has no result");
    (
        result["content"][0]["text"].as_str().expect("no text content"),
        result["isError"].as_bool().expect("no isError flag"),
    )
}

#[tokio::test]
async fn test_full_agent_session() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let server = server(&dir);

    let requests = vec![
        json!({"jsonrpc": "2.0", "id": 1, "method": "initialize",
               "params": {"protocolVersion": "2024-11-05", "capabilities": {},
                          "clientInfo": {"name": "test", "version": "0"}}})
        .to_string(),
        json!({"jsonrpc": "2.0", "method": "notifications/initialized"}).to_string(),
        json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}).to_string(),
        call(
            3,
            "remember",
            json!({"title": "Cache invalidation", "content": "Purge the CDN after every deploy.",
                   "tags": ["ops", "cdn"], "category": "runbook"}),
        ),
        call(4, "recall", json!({"query": "CDN purge", "scope": "notes"})),
        call(5, "forget", json!({"title": "cache invalidation"})),
        call(6, "recall", json!({"query": "CDN purge"})),
        call(7, "remember", json!({"title": "Cache Invalidation", "content": "Purge the CDN and warm it."})),
        call(8, "status", json!({})),
        call(9, "read_session", json!({"session_id": "deadbeef"})),
    ];

    let responses = exchange(&server, &requests).await;
    assert_eq!(responses.len(), 9, "notification must not be answered");

    let init = responses[0].result.as_ref().expect("initialize failed");
    assert_eq!(init["serverInfo"]["name"], "kraang");
    assert!(init["capabilities"]["tools"].is_object());

    let tools = responses[1].result.as_ref().expect("tools/list failed");
    assert_eq!(tools["tools"].as_array().map(Vec::len), Some(5));
    for tool in tools["tools"].as_array().into_iter().flatten() {
        assert_eq!(tool["inputSchema"]["type"], "object");
    }

    let (text, is_error) = tool_text(&responses[2]);
    assert!(!is_error);
    assert!(text.starts_with("Created \"Cache invalidation\""));

    let (text, _) = tool_text(&responses[3]);
    assert!(text.contains("Cache invalidation"), "recall output: {}", text);

    let (text, is_error) = tool_text(&responses[4]);
    assert!(!is_error);
    assert!(text.contains("hidden from search"));

    let (text, _) = tool_text(&responses[5]);
    assert_eq!(text, "No results found for \"CDN purge\".");

    let (text, _) = tool_text(&responses[6]);
    assert!(text.starts_with("Updated"));

    let (text, _) = tool_text(&responses[7]);
    assert!(text.contains("1 total (1 active, 0 forgotten)"), "status output: {}", text);

    let (text, is_error) = tool_text(&responses[8]);
    assert!(is_error);
    assert_eq!(text, "Session \"deadbeef\" not found.");

    println!("✓ {} responses over stdio", responses.len());
}

#[tokio::test]
async fn test_protocol_level_errors_keep_ids() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let server = server(&dir);

    let requests = vec![
        "this is not json".to_string(),
        json!({"jsonrpc": "2.0", "id": "abc", "method": "prompts/list"}).to_string(),
        json!({"jsonrpc": "2.0", "id": 7, "method": "ping"}).to_string(),
    ];
    let responses = exchange(&server, &requests).await;

    assert_eq!(responses.len(), 3);
    assert_eq!(responses[0].id, Value::Null);
    assert!(responses[0].error.is_some());
    assert_eq!(responses[1].id, json!("abc"));
    assert_eq!(
        responses[1].error.as_ref().map(|e| e.code),
        Some(METHOD_NOT_FOUND)
    );
    assert_eq!(responses[2].id, json!(7));
    assert_eq!(responses[2].result, Some(json!({})));
}

#[tokio::test]
async fn test_tool_errors_are_results() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let server = server(&dir);

    let requests = vec![
        call(1, "remember", json!({"title": "", "content": "x"})),
        call(2, "forget", json!({"title": "x", "relevance": -0.5})),
        call(3, "recall", json!({"query": "x", "scope": "everything"})),
        call(4, "nonexistent", json!({})),
    ];
    let responses = exchange(&server, &requests).await;

    assert_eq!(responses.len(), 4);
    for response in &responses {
        assert!(response.error.is_none());
        let (_, is_error) = tool_text(response);
        assert!(is_error);
    }
    assert_eq!(
        tool_text(&responses[1]).0,
        "Error: relevance must be between 0.0 and 1.0, got -0.5."
    );
}
