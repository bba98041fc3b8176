//! Drives the HTTP clients against a scripted local action API.
//!
//! The stub answers one request per connection, in order, and records
//! the method, decoded parameters and authorization header of each.

use std::collections::BTreeMap;
use std::io::{ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use wikidp_portal::{
    ClaimValue, ClaimWriter, HttpClaimWriter, HttpKnowledgeBase, KnowledgeBase, PortalError,
    WriteAuth,
};

const TIMEOUT: Duration = Duration::from_secs(10);
const USER_AGENT: &str = "wikidp-tests/0.1";

#[derive(Debug)]
struct Recorded {
    method: String,
    params: BTreeMap<String, String>,
    authorization: Option<String>,
}

impl Recorded {
    fn param(&self, key: &str) -> &str {
        self.params.get(key).map(String::as_str).unwrap_or("")
    }

    /// `GET query:csrf`, `POST wbcreateclaim` and so on.
    fn call(&self) -> String {
        match self.param("action") {
            "query" => format!("{} query:{}", self.method, self.param("type")),
            action => format!("{} {action}", self.method),
        }
    }
}

struct StubApi {
    url: String,
    handle: JoinHandle<Vec<Recorded>>,
}

impl StubApi {
    fn start(script: Vec<(u16, Value)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind stub");
        listener.set_nonblocking(true).expect("nonblocking listener");
        let url = format!("http://{}/w/api.php", listener.local_addr().expect("addr"));

        let handle = std::thread::spawn(move || {
            let deadline = Instant::now() + TIMEOUT;
            let mut recorded = Vec::new();
            for (status, body) in script {
                let stream = loop {
                    match listener.accept() {
                        Ok((stream, _)) => break Some(stream),
                        Err(e) if e.kind() == ErrorKind::WouldBlock && Instant::now() < deadline => {
                            std::thread::sleep(Duration::from_millis(10));
                        }
                        Err(_) => break None,
                    }
                };
                let Some(mut stream) = stream else { break };
                stream.set_nonblocking(false).expect("blocking stream");
                stream.set_read_timeout(Some(TIMEOUT)).ok();
                recorded.push(read_request(&mut stream));
                respond(&mut stream, status, &body);
            }
            recorded
        });
        Self { url, handle }
    }

    fn finish(self) -> Vec<Recorded> {
        self.handle.join().expect("stub thread")
    }
}

fn read_request(stream: &mut TcpStream) -> Recorded {
    let mut bytes = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        if let Some(pos) = bytes.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        let n = stream.read(&mut chunk).expect("read request");
        assert!(n > 0, "client closed before sending headers");
        bytes.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&bytes[..header_end]).to_string();
    let mut lines = head.lines();
    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let target = parts.next().unwrap_or_default().to_string();

    let mut content_length = 0usize;
    let mut authorization = None;
    for line in lines {
        let Some((name, value)) = line.split_once(':') else { continue };
        match name.trim().to_ascii_lowercase().as_str() {
            "content-length" => content_length = value.trim().parse().unwrap_or(0),
            "authorization" => authorization = Some(value.trim().to_string()),
            _ => {}
        }
    }

    while bytes.len() < header_end + content_length {
        let n = stream.read(&mut chunk).expect("read body");
        assert!(n > 0, "client closed mid-body");
        bytes.extend_from_slice(&chunk[..n]);
    }

    let mut params = BTreeMap::new();
    if let Some((_, query)) = target.split_once('?') {
        params.extend(url::form_urlencoded::parse(query.as_bytes()).into_owned());
    }
    params.extend(
        url::form_urlencoded::parse(&bytes[header_end..header_end + content_length]).into_owned(),
    );

    Recorded { method, params, authorization }
}

fn respond(stream: &mut TcpStream, status: u16, body: &Value) {
    let body = body.to_string();
    let response = format!(
        "HTTP/1.1 {status} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(response.as_bytes()).expect("write response");
    stream.flush().ok();
}

fn ok(body: Value) -> (u16, Value) {
    (200, body)
}

fn bot_writer(url: &str) -> HttpClaimWriter {
    let auth = WriteAuth::BotPassword {
        user: "Archivist@wikidp".to_string(),
        password: "s3cret".to_string(),
    };
    HttpClaimWriter::new(url, auth, USER_AGENT, TIMEOUT).expect("writer")
}

#[test]
fn bot_login_precedes_the_first_write_and_badtoken_refreshes() {
    let stub = StubApi::start(vec![
        ok(json!({"query": {"tokens": {"logintoken": "login-1+\\"}}})),
        ok(json!({"login": {"result": "Success", "lgusername": "Archivist"}})),
        ok(json!({"query": {"tokens": {"csrftoken": "stale+\\"}}})),
        ok(json!({"error": {"code": "badtoken", "info": "Invalid CSRF token."}})),
        ok(json!({"query": {"tokens": {"logintoken": "login-2+\\"}}})),
        ok(json!({"login": {"result": "Success", "lgusername": "Archivist"}})),
        ok(json!({"query": {"tokens": {"csrftoken": "fresh+\\"}}})),
        ok(json!({"success": 1, "claim": {"id": "Q2195$A1B2", "mainsnak": {}}})),
        ok(json!({"success": 1, "claim": {"id": "Q2195$C3D4", "mainsnak": {}}})),
    ]);
    let writer = bot_writer(&stub.url);

    let mime = ClaimValue::String("image/jpeg".to_string());
    let first = writer
        .create_claim("Q2195", "P1163", &mime, "via WikiDP")
        .expect("first claim");
    assert_eq!(first, "Q2195$A1B2");

    // The refreshed token stays cached for the next write.
    let second = writer
        .create_claim("Q2195", "P1163", &mime, "via WikiDP")
        .expect("second claim");
    assert_eq!(second, "Q2195$C3D4");

    let requests = stub.finish();
    let calls: Vec<String> = requests.iter().map(Recorded::call).collect();
    assert_eq!(
        calls,
        vec![
            "GET query:login",
            "POST login",
            "GET query:csrf",
            "POST wbcreateclaim",
            "GET query:login",
            "POST login",
            "GET query:csrf",
            "POST wbcreateclaim",
            "POST wbcreateclaim",
        ]
    );

    let login = &requests[1];
    assert_eq!(login.param("lgname"), "Archivist@wikidp");
    assert_eq!(login.param("lgpassword"), "s3cret");
    assert_eq!(login.param("lgtoken"), "login-1+\\");
    assert_eq!(requests[5].param("lgtoken"), "login-2+\\");

    let rejected = &requests[3];
    assert_eq!(rejected.param("token"), "stale+\\");
    assert_eq!(rejected.param("bot"), "1");
    assert_eq!(rejected.param("entity"), "Q2195");
    assert_eq!(rejected.param("property"), "P1163");
    assert_eq!(rejected.param("snaktype"), "value");
    assert_eq!(rejected.param("summary"), "via WikiDP");
    let value: Value = serde_json::from_str(rejected.param("value")).expect("value is JSON");
    assert_eq!(value, json!("image/jpeg"));

    assert_eq!(requests[7].param("token"), "fresh+\\");
    assert_eq!(requests[8].param("token"), "fresh+\\");
    assert!(requests.iter().all(|r| r.authorization.is_none()));
}

#[test]
fn failed_login_is_a_write_error() {
    let stub = StubApi::start(vec![
        ok(json!({"query": {"tokens": {"logintoken": "login-1+\\"}}})),
        ok(json!({"login": {"result": "Failed", "reason": "Incorrect username or password."}})),
    ]);
    let writer = bot_writer(&stub.url);

    let err = writer
        .create_claim("Q2195", "P1163", &ClaimValue::String("x".to_string()), "s")
        .expect_err("login fails");
    match err {
        PortalError::Write(msg) => assert!(msg.contains("Failed"), "{msg}"),
        other => panic!("expected write error, got {other:?}"),
    }

    let calls: Vec<String> = stub.finish().iter().map(Recorded::call).collect();
    assert_eq!(calls, vec!["GET query:login", "POST login"]);
}

#[test]
fn oauth_writes_skip_login_and_send_the_bearer_token() {
    let stub = StubApi::start(vec![
        ok(json!({"query": {"tokens": {"csrftoken": "csrf+\\"}}})),
        ok(json!({"success": 1, "claim": {"id": "Q2195$E5F6"}})),
        ok(json!({"success": 1})),
        ok(json!({"error": {"code": "permissiondenied", "info": "blocked"}})),
    ]);
    let auth = WriteAuth::OAuthToken("owner-token".to_string());
    let writer = HttpClaimWriter::new(&stub.url, auth, USER_AGENT, TIMEOUT).expect("writer");

    let claim = writer
        .create_claim("Q2195", "P1163", &ClaimValue::String("image/jpeg".to_string()), "s")
        .expect("claim");
    assert_eq!(claim, "Q2195$E5F6");
    writer
        .set_qualifier(&claim, "P1545", &ClaimValue::String("1".to_string()))
        .expect("qualifier");
    let refs = vec![("P248".to_string(), ClaimValue::Item(28_841_847))];
    let err = writer.set_reference(&claim, &refs).expect_err("denied");
    assert!(matches!(err, PortalError::Write(ref msg) if msg.starts_with("permissiondenied")));

    let requests = stub.finish();
    let calls: Vec<String> = requests.iter().map(Recorded::call).collect();
    assert_eq!(
        calls,
        vec!["GET query:csrf", "POST wbcreateclaim", "POST wbsetqualifier", "POST wbsetreference"]
    );
    assert!(requests
        .iter()
        .all(|r| r.authorization.as_deref() == Some("Bearer owner-token")));
    assert_eq!(requests[1].param("bot"), "");
    assert_eq!(requests[2].param("claim"), "Q2195$E5F6");
    assert_eq!(requests[3].param("statement"), "Q2195$E5F6");
    let snaks: Value = serde_json::from_str(requests[3].param("snaks")).expect("snaks JSON");
    assert_eq!(snaks["P248"][0]["property"], "P248");
}

#[test]
fn entity_lookup_handles_missing_and_redirected_ids() {
    let stub = StubApi::start(vec![
        ok(json!({"entities": {"Q999999999": {"id": "Q999999999", "missing": ""}}})),
        ok(json!({"error": {"code": "no-such-entity", "info": "Could not find an entity"}})),
        ok(json!({"entities": {"Q2195": {"id": "Q2195", "type": "item", "claims": {}}}})),
        ok(json!({"entities": {"Q42": {"id": "Q42", "type": "item"}}})),
        ok(json!({"error": {"code": "maxlag", "info": "Waiting for a database server"}})),
        (500, json!({"error": "boom"})),
    ]);
    let kb = HttpKnowledgeBase::new(&stub.url, USER_AGENT, TIMEOUT).expect("kb");

    assert_eq!(kb.entity_json("Q999999999").expect("missing"), None);
    assert_eq!(kb.entity_json("Q-1").expect("no such entity"), None);

    // Q5000001 redirects to Q2195; the API answers with the target.
    let redirected = kb.entity_json("Q5000001").expect("redirect").expect("target entity");
    assert_eq!(redirected["id"], "Q2195");

    let direct = kb.entity_json("Q42").expect("direct").expect("entity");
    assert_eq!(direct["id"], "Q42");

    assert!(matches!(
        kb.entity_json("Q42"),
        Err(PortalError::KnowledgeBase(ref msg)) if msg.starts_with("maxlag")
    ));
    assert!(kb.entity_json("Q42").is_err());

    let requests = stub.finish();
    assert_eq!(requests.len(), 6);
    assert!(requests.iter().all(|r| r.method == "GET"));
    assert!(requests.iter().all(|r| r.param("action") == "wbgetentities"));
    let ids: Vec<&str> = requests.iter().map(|r| r.param("ids")).collect();
    assert_eq!(ids, vec!["Q999999999", "Q-1", "Q5000001", "Q42", "Q42", "Q42"]);
}
