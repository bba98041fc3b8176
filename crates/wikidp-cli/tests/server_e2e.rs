//! Spawns `wikidp serve` and talks raw HTTP to it.
//!
//! Remote services point at a closed local port so nothing leaves the
//! machine: routes that need Wikidata exercise the failure paths, local
//! routes (health, schemas, write validation) exercise the happy paths.

use std::fs;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

const UNREACHABLE: &str = "http://127.0.0.1:9/unreachable";

fn wikidp_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_wikidp"))
}

struct ChildGuard {
    child: Child,
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn wikidp(dir: &Path) -> Command {
    let mut cmd = Command::new(wikidp_bin());
    cmd.current_dir(dir)
        .env("WIKIDP_CONFIG", "default")
        .env("WIKIDP_SPARQL_URL", UNREACHABLE)
        .env("WIKIDP_API_URL", UNREACHABLE)
        .env("WIKIDP_SCHEMA_DIR", dir.join("schemas"))
        .env_remove("WIKIDP_CONFIG_FILE")
        .env_remove("WIKIDP_BOT_USER")
        .env_remove("WIKIDP_BOT_PASSWORD")
        .env_remove("WIKIDP_OAUTH_TOKEN")
        .env_remove("WIKIDP_LOG_FILE")
        .env_remove("RUST_LOG");
    cmd
}

fn write_schemas(dir: &Path) {
    let schemas = dir.join("schemas");
    fs::create_dir_all(schemas.join("formats")).expect("create schemas/");
    fs::write(
        schemas.join("empty_schema.json"),
        r#"{"type": "Schema", "shapes": []}"#,
    )
    .expect("write schema");
    fs::write(
        schemas.join("formats/file_format.json"),
        r#"{"type": "Schema", "shapes": [{"id": "format", "expression": {"type": "EachOf", "expressions": [
            {"type": "TripleConstraint", "predicate": "http://www.wikidata.org/prop/direct/P1163"},
            {"type": "TripleConstraint", "predicate": "http://www.wikidata.org/prop/direct/P2748"}
        ]}}]}"#,
    )
    .expect("write schema");
}

fn start_server(dir: &Path) -> (ChildGuard, String) {
    let ready_file = dir.join("build/ready.json");
    let child = wikidp(dir)
        .arg("serve")
        .arg("--listen")
        .arg("127.0.0.1:0")
        .arg("--ready-file")
        .arg(&ready_file)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn wikidp serve");
    let guard = ChildGuard { child };

    let deadline = Instant::now() + Duration::from_secs(10);
    while !ready_file.exists() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(50));
    }
    assert!(ready_file.exists(), "server did not write ready file");

    let ready_text = fs::read_to_string(&ready_file).expect("read ready file");
    let ready_json: serde_json::Value = serde_json::from_str(&ready_text).expect("parse ready json");
    let addr = ready_json["addr"]
        .as_str()
        .expect("ready.addr is string")
        .to_string();
    (guard, addr)
}

fn http(addr: &str, method: &str, path: &str, body: &[u8]) -> (u16, String) {
    let mut stream = TcpStream::connect(addr).expect("connect");
    stream
        .set_read_timeout(Some(Duration::from_secs(30)))
        .ok();
    stream
        .set_write_timeout(Some(Duration::from_secs(5)))
        .ok();

    let request = format!(
        "{method} {path} HTTP/1.1\r\nHost: {addr}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );
    stream.write_all(request.as_bytes()).expect("write request");
    stream.write_all(body).expect("write body");
    stream.flush().ok();

    let mut response_bytes = Vec::new();
    stream
        .read_to_end(&mut response_bytes)
        .expect("read response");
    let response = String::from_utf8_lossy(&response_bytes);

    let status = response
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(0);
    let (_, body_text) = response
        .split_once("\r\n\r\n")
        .unwrap_or(("", response.as_ref()));
    (status, body_text.to_string())
}

fn http_json(addr: &str, method: &str, path: &str, body: &[u8]) -> (u16, serde_json::Value) {
    let (status, text) = http(addr, method, path, body);
    let json = serde_json::from_str(&text)
        .unwrap_or_else(|e| panic!("{method} {path}: not JSON ({e}): {text}"));
    (status, json)
}

#[test]
fn serve_local_routes() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_schemas(dir.path());
    let (_guard, addr) = start_server(dir.path());

    let (status, body) = http(&addr, "GET", "/healthz", b"");
    assert_eq!(status, 200);
    assert_eq!(body, "ok\n");

    let (status, body) = http(&addr, "GET", "/api/", b"");
    assert_eq!(status, 200);
    assert_eq!(body, "Welcome to the WikiDP API");

    let (status, listing) = http_json(&addr, "GET", "/api/schemas", b"");
    assert_eq!(status, 200, "{listing}");
    let names: Vec<&str> = listing
        .as_array()
        .expect("listing is an array")
        .iter()
        .filter_map(|e| e["name"].as_str())
        .collect();
    assert_eq!(names, vec!["empty_schema.json", "formats"]);
    assert_eq!(listing[1]["type"], "directory");
    assert_eq!(listing[1]["files"][0]["label"], "File Format");

    // No property ids, so no query is sent.
    let (status, checklist) =
        http_json(&addr, "GET", "/api/schema/empty_schema.json/properties", b"");
    assert_eq!(status, 200, "{checklist}");
    assert_eq!(checklist, serde_json::json!([]));

    let (status, err) = http_json(&addr, "GET", "/api/schema/missing.json/properties", b"");
    assert_eq!(status, 404, "{err}");

    let (status, err) = http_json(&addr, "GET", "/api/not-a-route", b"");
    assert_eq!(status, 404);
    assert_eq!(err["error"], "not found");
}

#[test]
fn serve_rejects_bad_writes() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_schemas(dir.path());
    let (_guard, addr) = start_server(dir.path());

    let (status, err) = http_json(&addr, "POST", "/api/Q2195/claims/write", b"{not json");
    assert_eq!(status, 400, "{err}");
    assert!(err["error"].as_str().is_some());

    // Well-formed, but no credentials are configured.
    let drafts = br#"[{"pid": "P1163", "value": "image/jpeg", "type": "String"}]"#;
    let (status, err) = http_json(&addr, "POST", "/api/Q2195/claims/write", drafts);
    assert_eq!(status, 503, "{err}");

    let (status, _) = http_json(&addr, "GET", "/api/Q2195/claims/write", b"");
    assert_eq!(status, 404);
}

#[test]
fn serve_reports_unreachable_services() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_schemas(dir.path());
    let (_guard, addr) = start_server(dir.path());

    // Entity fetch failures read as a missing item.
    let (status, err) = http_json(&addr, "GET", "/api/Q2195", b"");
    assert_eq!(status, 404, "{err}");

    let (status, err) = http_json(&addr, "GET", "/api/formats", b"");
    assert_eq!(status, 502, "{err}");

    let (status, err) = http_json(&addr, "GET", "/api/schema/formats/file_format.json/properties", b"");
    assert_eq!(status, 502, "{err}");
}

#[test]
fn config_command_masks_secrets() {
    let dir = tempfile::tempdir().expect("tempdir");
    let output = wikidp(dir.path())
        .env("WIKIDP_BOT_USER", "Archivist@wikidp")
        .env("WIKIDP_BOT_PASSWORD", "hunter2")
        .env("WIKIDP_LANG", "de")
        .arg("config")
        .output()
        .expect("run wikidp config");
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(!stdout.contains("hunter2"));
    let json: serde_json::Value = serde_json::from_str(&stdout).expect("config is JSON");
    assert_eq!(json["config"]["bot_user"], "Archivist@wikidp");
    assert_eq!(json["config"]["bot_password"], "********");
    assert_eq!(json["wikibase_language"], "de,en");
    assert_eq!(json["ui_languages"].as_array().map(Vec::len), Some(16));
}
