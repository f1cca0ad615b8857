use parking_lot::Mutex;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use tsflow_runner::seeq::{
    normalize, AnalyticsClient, Credential, DateInput, Grid, SearchHit, SeeqError, SensorRecord,
    ServerProbe, TimeRange, Value,
};
use tsflow_runner::{Config, Runner, SeeqClient};

const TOKEN: &str = "token-abc123";

struct StubResponse {
    status: u16,
    headers: Vec<(&'static str, String)>,
    body: String,
}

impl StubResponse {
    fn json(status: u16, body: &str) -> Self {
        Self {
            status,
            headers: vec![("content-type", "application/json".to_string())],
            body: body.to_string(),
        }
    }
}

type Requests = Arc<Mutex<Vec<String>>>;

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

fn content_length(head: &str) -> usize {
    head.lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse().ok())
        .unwrap_or(0)
}

/// Minimal HTTP/1.1 server answering each request through `route(method, target)`.
async fn spawn_stub<F>(route: F) -> (String, Requests)
where
    F: Fn(&str, &str) -> StubResponse + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests: Requests = Arc::new(Mutex::new(Vec::new()));
    let log = requests.clone();
    let route = Arc::new(route);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let route = route.clone();
            let log = log.clone();
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let mut chunk = [0u8; 4096];
                loop {
                    let n = socket.read(&mut chunk).await.unwrap_or(0);
                    if n == 0 {
                        break;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                    if let Some(end) = find_header_end(&buf) {
                        let head = String::from_utf8_lossy(&buf[..end]).to_string();
                        if buf.len() >= end + 4 + content_length(&head) {
                            break;
                        }
                    }
                }

                let text = String::from_utf8_lossy(&buf).to_string();
                let request_line = text.lines().next().unwrap_or_default().to_string();
                let mut parts = request_line.split_whitespace();
                let method = parts.next().unwrap_or_default();
                let target = parts.next().unwrap_or_default();
                let response = route(method, target);
                log.lock().push(text.clone());

                let mut out = format!(
                    "HTTP/1.1 {} Stub\r\ncontent-length: {}\r\nconnection: close\r\n",
                    response.status,
                    response.body.len()
                );
                for (name, value) in &response.headers {
                    out.push_str(&format!("{}: {}\r\n", name, value));
                }
                out.push_str("\r\n");
                out.push_str(&response.body);
                let _ = socket.write_all(out.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (format!("http://{}", addr), requests)
}

fn historian(method: &str, target: &str) -> StubResponse {
    match (method, target) {
        ("POST", "/api/auth/login") => {
            let mut response =
                StubResponse::json(200, r#"{"username":"analyst","name":"Ana Lyst"}"#);
            response.headers.push(("x-sq-auth", TOKEN.to_string()));
            response
        }
        ("GET", t) if t.starts_with("/api/items") && t.contains("TEMP.1") => StubResponse::json(
            200,
            r#"{"items":[{"id":"id-temp","name":"TEMP.1","type":"StoredSignal","description":"Reactor temperature"}]}"#,
        ),
        ("GET", t) if t.starts_with("/api/items") && t.contains("BROKEN") => {
            StubResponse::json(500, r#"{"statusMessage":"index offline"}"#)
        }
        ("GET", t) if t.starts_with("/api/items") => StubResponse::json(200, r#"{"items":[]}"#),
        ("GET", t) if t.starts_with("/api/signals/id-temp/samples") => StubResponse::json(
            200,
            r#"{"samples":[{"key":"2025-09-01T00:00:00Z","value":1.5},{"key":"2025-09-01T00:15:00Z","value":null}]}"#,
        ),
        ("GET", t) if t.starts_with("/api/signals/id-flow/samples") => StubResponse::json(
            200,
            r#"{"samples":[{"key":"2025-09-01T00:15:00Z","value":7}]}"#,
        ),
        ("GET", "/api/status") => StubResponse::json(200, r#"{"version":"R64.1.2"}"#),
        _ => StubResponse::json(404, r#"{"statusMessage":"not found"}"#),
    }
}

fn found(id: &str, name: &str) -> SensorRecord {
    SensorRecord::found(
        SearchHit {
            id: id.to_string(),
            name: name.to_string(),
            item_type: "StoredSignal".to_string(),
            description: None,
        },
        name,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn credential(server: &str) -> Credential {
        Credential::new(server, "analyst", "s3cret")
    }

    /// Logs in, searches and pulls against the stub server.
    #[tokio::test]
    async fn test_login_search_and_pull() {
        let (server, requests) = spawn_stub(historian).await;
        let client = SeeqClient::new(Config::default());

        let identity = client.login(&credential(&server)).await.unwrap();
        assert_eq!(identity.as_deref(), Some("analyst"));
        assert!(client.is_connected());

        let login_request = requests.lock()[0].clone();
        assert!(login_request.contains(r#""authProviderClass":"Auth""#));
        assert!(login_request.contains(r#""authProviderId":"Seeq""#));

        let hits = client.search("TEMP.1", "StoredSignal").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "id-temp");
        assert_eq!(hits[0].description.as_deref(), Some("Reactor temperature"));
        let search_request = requests.lock()[1].clone();
        assert!(search_request.contains(&format!("x-sq-auth: {}", TOKEN)));
        assert!(search_request.contains("types=StoredSignal"));
        assert!(search_request.contains("limit=1000"));

        let range = TimeRange {
            start: normalize(&DateInput::from("2025-09-01"), None).unwrap(),
            end: normalize(&DateInput::from("2025-09-02"), None).unwrap(),
            grid: "15min".parse::<Grid>().unwrap(),
        };
        let sensors = vec![
            found("id-temp", "TEMP.1"),
            SensorRecord::not_found("GHOST"),
            found("id-flow", "FLOW.2"),
        ];
        let table = client.pull(&sensors, &range).await.unwrap();

        assert_eq!(table.columns, vec!["TEMP.1".to_string(), "FLOW.2".to_string()]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[0][0], Value::Float(1.5));
        assert!(matches!(table.rows[0][1], Value::Float(f) if f.is_nan()));
        assert!(matches!(table.rows[1][0], Value::Float(f) if f.is_nan()));
        assert_eq!(table.rows[1][1], Value::Float(7.0));

        let pulls: Vec<String> = requests
            .lock()
            .iter()
            .filter(|r| r.contains("/samples"))
            .cloned()
            .collect();
        assert_eq!(pulls.len(), 2);
        assert!(pulls.iter().all(|r| r.contains("period=15min")));
    }

    /// No matches is an empty list, not an error.
    #[tokio::test]
    async fn test_search_without_matches() {
        let (server, _) = spawn_stub(historian).await;
        let client = SeeqClient::new(Config::default());
        client.login(&credential(&server)).await.unwrap();

        let hits = client.search("UNKNOWN.X", "StoredSignal").await.unwrap();
        assert!(hits.is_empty());
    }

    /// Non-2xx responses keep the status and body.
    #[tokio::test]
    async fn test_server_errors_surface_status() {
        let (server, _) = spawn_stub(historian).await;
        let client = SeeqClient::new(Config::default());
        client.login(&credential(&server)).await.unwrap();

        match client.search("BROKEN", "StoredSignal").await.unwrap_err() {
            SeeqError::ServerError { status, body, .. } => {
                assert_eq!(status, 500);
                assert!(body.unwrap_or_default().contains("index offline"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    /// Rejected credentials are an authentication failure.
    #[tokio::test]
    async fn test_rejected_login() {
        let (server, _) = spawn_stub(|_: &str, _: &str| {
            StubResponse::json(401, r#"{"statusMessage":"Invalid username or password"}"#)
        })
        .await;
        let client = SeeqClient::new(Config::default());

        let err = client.login(&credential(&server)).await.unwrap_err();
        assert!(matches!(err, SeeqError::AuthenticationFailed { .. }));
        assert!(err.to_string().contains("Invalid username or password"));
        assert!(!client.is_connected());
    }

    /// A 200 without a session token grants no identity.
    #[tokio::test]
    async fn test_login_without_token() {
        let (server, _) =
            spawn_stub(|_: &str, _: &str| StubResponse::json(200, r#"{"username":"analyst"}"#)).await;
        let client = SeeqClient::new(Config::default());

        assert_eq!(client.login(&credential(&server)).await.unwrap(), None);
        assert!(!client.is_connected());
    }

    /// Probe results for reachable, failing and non-JSON servers.
    #[tokio::test]
    async fn test_server_probe() {
        let probe = ServerProbe::new(&Config::default());

        let (server, _) = spawn_stub(historian).await;
        let reachable = probe.test_connection(&server).await;
        assert!(reachable.success);
        assert_eq!(reachable.message, "Server is reachable");
        let info = probe.get_server_info(&server).await;
        assert_eq!(
            info.get("server_info").and_then(|v| v.get("version")),
            Some(&Value::from("R64.1.2"))
        );

        let (down, _) = spawn_stub(|_: &str, _: &str| StubResponse::json(503, "")).await;
        let unavailable = probe.test_connection(&down).await;
        assert!(!unavailable.success);
        assert_eq!(unavailable.message, "Server responded with status code: 503");
        assert_eq!(unavailable.get("status_code"), Some(&Value::Int(503)));

        let (html, _) = spawn_stub(|_: &str, _: &str| StubResponse {
            status: 200,
            headers: vec![("content-type", "text/html".to_string())],
            body: "<html>status ok</html>".to_string(),
        })
        .await;
        let raw = probe.get_server_info(&html).await;
        assert!(raw.success);
        assert_eq!(raw.message, "Server responded but response is not JSON");
    }

    /// Nothing listening on the port.
    #[tokio::test]
    async fn test_probe_connection_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let probe = ServerProbe::new(&Config::default());
        let envelope = probe.test_connection(&format!("http://{}", addr)).await;
        assert!(!envelope.success);
        assert_eq!(envelope.message, "Cannot connect to server - connection refused");
        assert_eq!(envelope.error.as_deref(), Some("ConnectionError"));
    }

    fn assert_auth_envelope(envelope: &tsflow_runner::Envelope) {
        assert!(!envelope.success);
        assert_eq!(envelope.error.as_deref(), Some("Authentication required"));
        let details = envelope.get("auth_details").unwrap();
        assert_eq!(details.get("success"), Some(&Value::Bool(false)));
    }

    /// A login that hits a server fault reports as an authentication failure.
    #[tokio::test]
    async fn test_login_server_error_envelope() {
        let (server, _) = spawn_stub(|_: &str, _: &str| {
            StubResponse::json(500, r#"{"statusMessage":"database offline"}"#)
        })
        .await;
        let config = Config::default();
        let mut runner = Runner::new(SeeqClient::new(config.clone()), &config);

        let args = serde_json::json!([["TEMP.1"], server, "analyst", "s3cret"]).to_string();
        let envelope = runner.dispatch("searchSensorsOnly", &args).await.unwrap();
        assert_auth_envelope(&envelope);
        assert!(envelope.message.contains("500"));
        assert!(!runner.session().is_authenticated());
    }

    /// An unparseable server URL never reaches the network.
    #[tokio::test]
    async fn test_login_with_invalid_url_envelope() {
        let config = Config::default();
        let mut runner = Runner::new(SeeqClient::new(config.clone()), &config);

        let envelope = runner
            .dispatch("authenticate", r#"["not a url", "analyst", "s3cret"]"#)
            .await
            .unwrap();
        assert_auth_envelope(&envelope);
        assert!(envelope.message.contains("relative URL without a base"));
    }
}
