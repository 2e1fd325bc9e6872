//! End-to-end stdio session test
//!
//! Exercises the complete flow: settings TOML -> tool catalogue -> MCP
//! session over a line stream, with the real Karate runner reading an
//! on-disk project.

use orch_dispatch::Dispatcher;
use orch_mcp::{McpServer, Profile, build_registry};
use orch_providers::Settings;
use orch_test_utils::KarateProject;
use serde_json::{Value, json};

/// Karate project with two features and one finished report
fn setup_project() -> KarateProject {
    KarateProject::new()
        .feature("users/get.feature", &["get user", "get missing user"])
        .feature("auth.feature", &["login"])
        .report(
            "users.json",
            &json!([{
                "elements": [
                    { "status": "passed" },
                    { "status": "failed" },
                    { "status": "passed" }
                ]
            }])
            .to_string(),
        )
}

fn settings_for(project: &KarateProject) -> Settings {
    let toml = format!(
        "[dispatch]\ndefault_timeout_secs = 5\n\n[karate]\nbase_path = {:?}\n",
        project.root().display().to_string()
    );
    Settings::parse(&toml).unwrap()
}

async fn run_session(server: &McpServer, lines: &[Value]) -> Vec<Value> {
    let input: String = lines.iter().map(|l| format!("{l}\n")).collect();
    let mut output = Vec::new();
    server.serve(input.as_bytes(), &mut output).await.unwrap();

    String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

#[test]
fn test_settings_point_at_project() {
    let project = setup_project();
    let settings = settings_for(&project);

    assert_eq!(settings.karate.base_path, project.root());
    assert_eq!(settings.karate.features_path(), project.features_dir());
    assert_eq!(settings.karate.reports_path(), project.reports_dir());
}

#[tokio::test]
async fn test_karate_session_over_stdio() {
    let project = setup_project();
    let settings = settings_for(&project);

    let registry = build_registry(&settings, Profile::Karate).unwrap();
    let server = McpServer::new(
        Dispatcher::new(registry).with_default_timeout(settings.dispatch.default_timeout()),
    );

    let responses = run_session(
        &server,
        &[
            json!({"jsonrpc": "2.0", "id": 1, "method": "initialize",
                   "params": {"protocolVersion": "2024-11-05",
                              "clientInfo": {"name": "it", "version": "1"}}}),
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
            json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}),
            json!({"jsonrpc": "2.0", "id": 3, "method": "tools/call",
                   "params": {"name": "list_karate_features", "arguments": {}}}),
            json!({"tool": "get_test_results", "arguments": {"detailed": false}}),
            json!({"tool": "list_karate_features", "arguments": {"pattern": "users/*.feature"}}),
        ],
    )
    .await;

    // The notification gets no line
    assert_eq!(responses.len(), 5);

    assert_eq!(responses[0]["id"], 1);
    assert_eq!(responses[0]["result"]["protocolVersion"], "2024-11-05");

    let names: Vec<&str> = responses[1]["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(
        names,
        vec!["run_karate_test", "list_karate_features", "get_test_results"]
    );

    let listed = &responses[2]["result"];
    assert_eq!(listed["isError"], false);
    assert_eq!(listed["structuredContent"]["ok"], true);
    assert_eq!(listed["structuredContent"]["result"]["count"], 2);
    let paths: Vec<&str> = listed["structuredContent"]["result"]["features"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["path"].as_str().unwrap())
        .collect();
    assert_eq!(paths, vec!["auth.feature", "users/get.feature"]);

    let results = &responses[3];
    assert_eq!(results["ok"], true);
    assert_eq!(results["result"]["total_scenarios"], 3);
    assert_eq!(results["result"]["passed_scenarios"], 2);
    assert_eq!(results["result"]["failed_scenarios"], 1);

    let filtered = &responses[4];
    assert_eq!(filtered["result"]["count"], 1);
    assert_eq!(
        filtered["result"]["features"][0]["scenarios"],
        json!(["get user", "get missing user"])
    );
}

#[tokio::test]
async fn test_browser_tools_absent_from_karate_session() {
    let project = setup_project();
    let settings = settings_for(&project);
    let server = McpServer::new(Dispatcher::new(
        build_registry(&settings, Profile::Karate).unwrap(),
    ));

    let responses = run_session(
        &server,
        &[json!({"tool": "playwright_navigate", "arguments": {"url": "https://example.com"}})],
    )
    .await;

    assert_eq!(responses[0]["ok"], false);
    assert_eq!(responses[0]["error"]["kind"], "UnknownTool");
}

/// True once `pid` has exited (reaped or left as a zombie)
#[cfg(target_os = "linux")]
fn process_gone(pid: &str) -> bool {
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => stat
            .rsplit_once(')')
            .is_some_and(|(_, rest)| rest.trim_start().starts_with('Z')),
        Err(_) => true,
    }
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_tool_timeout_kills_maven() {
    let project = setup_project();
    let pid_file = project.root().join("mvn.pid");
    // `sh test <options>` stands in for `mvn test <options>`
    std::fs::write(
        project.root().join("test"),
        format!("echo $$ > {:?}\nexec sleep 30\n", pid_file.display().to_string()),
    )
    .unwrap();

    let mut settings = settings_for(&project);
    settings.karate.mvn_command = "sh".to_string();
    settings.karate.process_timeout_secs = 30;
    settings
        .dispatch
        .tool_timeouts
        .insert("run_karate_test".to_string(), 1);

    let dispatcher = Dispatcher::new(build_registry(&settings, Profile::Karate).unwrap());
    let result = dispatcher
        .dispatch_value(&json!({"tool": "run_karate_test", "arguments": {"feature_path": "auth.feature"}}))
        .await;

    let failure = result.failure().unwrap();
    assert_eq!(failure.kind.as_str(), "Timeout");

    let pid = std::fs::read_to_string(&pid_file).unwrap().trim().to_string();
    let mut gone = false;
    for _ in 0..50 {
        if process_gone(&pid) {
            gone = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }
    assert!(gone, "maven stand-in {pid} still running after the call timed out");
}
