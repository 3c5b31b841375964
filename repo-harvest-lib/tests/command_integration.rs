//! Drives the command-line entry point against a mock API.

use repo_harvest_lib::Host;
use serde_json::json;
use std::io::Write;
use std::path::Path;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Debug, Default)]
struct CaptureHost {
    output: Vec<u8>,
    error: Vec<u8>,
    exit_code: Option<i32>,
}

impl Host for CaptureHost {
    fn output(&mut self) -> impl Write {
        &mut self.output
    }

    fn error(&mut self) -> impl Write {
        &mut self.error
    }

    fn exit(&mut self, code: i32) {
        self.exit_code = Some(code);
    }
}

impl CaptureHost {
    fn output_text(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }
}

async fn mock_api() -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rate_limit"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-ratelimit-remaining", "4999")
                .insert_header("x-ratelimit-reset", "4102444800")
                .set_body_json(json!({})),
        )
        .mount(&server)
        .await;

    let items: Vec<_> = [(11, "one", 70), (12, "two", 60)]
        .into_iter()
        .map(|(id, name, stars)| {
            json!({ "id": id, "name": name, "owner": { "login": "acme" }, "stargazers_count": stars, "default_branch": "main" })
        })
        .collect();

    Mock::given(method("GET"))
        .and(path("/search/repositories"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "total_count": 2, "items": items.clone() })))
        .mount(&server)
        .await;

    for item in items {
        let name = item["name"].as_str().unwrap().to_string();
        Mock::given(method("GET"))
            .and(path(format!("/repos/acme/{name}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(item))
            .mount(&server)
            .await;
    }

    server
}

fn args(command: &str, root: &Path, config: &Path, extra: &[&str]) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "repo-harvest".into(),
        command.into(),
        "--config".into(),
        config.display().to_string(),
        "--data-dir".into(),
        root.join("data").display().to_string(),
        "--cache-dir".into(),
        root.join("cache").display().to_string(),
    ];
    args.extend(extra.iter().map(ToString::to_string));
    args
}

#[tokio::test]
async fn search_then_metadata_then_status() {
    let server = mock_api().await;
    let tmp = tempfile::tempdir().unwrap();
    let config = tmp.path().join("harvest.toml");
    std::fs::write(
        &config,
        format!(
            "api_base_url = \"{}\"\nmax_retries = 0\ncore_min_interval = \"1ms\"\nsearch_min_interval = \"1ms\"\n",
            server.uri()
        ),
    )
    .unwrap();

    let mut host = CaptureHost::default();
    repo_harvest_lib::run(&mut host, args("search", tmp.path(), &config, &["-l", "rust", "--min-stars", "50"]))
        .await
        .unwrap();
    assert!(host.output_text().contains("search rust: 2 found, 2 new"), "{}", host.output_text());

    repo_harvest_lib::run(&mut host, args("metadata", tmp.path(), &config, &["-l", "rust"]))
        .await
        .unwrap();

    let mut status = CaptureHost::default();
    repo_harvest_lib::run(&mut status, args("status", tmp.path(), &config, &["-l", "rust"]))
        .await
        .unwrap();
    let text = status.output_text();
    let row = text.lines().find(|l| l.starts_with("rust")).unwrap();
    let cells: Vec<&str> = row.split_whitespace().collect();
    assert_eq!(&cells[..3], &["rust", "2", "2"]);
    assert_eq!(host.exit_code, None);
}

#[tokio::test]
async fn rejected_token_exits_with_status_one() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rate_limit"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let tmp = tempfile::tempdir().unwrap();
    let config = tmp.path().join("harvest.toml");
    std::fs::write(&config, format!("api_base_url = \"{}\"\nmax_retries = 0\n", server.uri())).unwrap();

    let mut host = CaptureHost::default();
    let result = repo_harvest_lib::run(
        &mut host,
        args("search", tmp.path(), &config, &["-l", "rust", "--github-token", "bad"]),
    )
    .await;

    assert!(result.is_err());
    assert_eq!(host.exit_code, Some(1));
    assert!(String::from_utf8_lossy(&host.error).contains("rejected the supplied token"));
}
