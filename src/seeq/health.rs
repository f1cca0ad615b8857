// health.rs

use reqwest::{Client, StatusCode};
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::{debug, info};

use crate::constants::STATUS_PATH;
use crate::seeq::envelope::Envelope;
use crate::seeq::error::{Result, SeeqError};
use crate::seeq::types::Value;
use crate::seeq::validation::Validator;
use crate::types::Config;

/// How a status request ended, before it is turned into an envelope.
#[derive(Debug)]
pub enum ProbeResult {
    Responded { status: u16, body: String },
    Refused,
    TimedOut,
    Failed(String),
}

impl ProbeResult {
    fn from_error(err: SeeqError) -> Self {
        match err {
            SeeqError::Http(e) if e.is_timeout() => ProbeResult::TimedOut,
            SeeqError::Http(e) if e.is_connect() => ProbeResult::Refused,
            other => ProbeResult::Failed(other.to_string()),
        }
    }

    /// Envelope for a reachability test.
    pub fn into_connection_envelope(self) -> Envelope {
        match self {
            ProbeResult::Responded { status, .. } if status == StatusCode::OK.as_u16() => {
                Envelope::ok("Server is reachable").with("status_code", status)
            }
            ProbeResult::Responded { status, .. } => Envelope::fail(
                format!("Server responded with status code: {}", status),
                format!("HTTP {}", status),
            )
            .with("status_code", status),
            ProbeResult::Refused => Envelope::fail(
                "Cannot connect to server - connection refused",
                "ConnectionError",
            ),
            ProbeResult::TimedOut => Envelope::fail("Connection timeout", "Timeout"),
            ProbeResult::Failed(reason) => {
                Envelope::fail(format!("Connection test failed: {}", reason), reason)
            }
        }
    }

    /// Envelope for a server-info request. Non-JSON bodies are returned raw.
    pub fn into_info_envelope(self) -> Envelope {
        match self {
            ProbeResult::Responded { status, body } if status == StatusCode::OK.as_u16() => {
                match serde_json::from_str::<JsonValue>(&body) {
                    Ok(info) => Envelope::ok("Server information retrieved")
                        .with("server_info", Value::from(info)),
                    Err(_) => Envelope::ok("Server responded but response is not JSON").with(
                        "server_info",
                        Value::mapping(vec![(
                            "raw_response",
                            Value::from(body),
                        )]),
                    ),
                }
            }
            ProbeResult::Responded { status, .. } => Envelope::fail(
                format!("Server responded with status code: {}", status),
                format!("HTTP {}", status),
            )
            .with("status_code", status),
            ProbeResult::Refused => Envelope::fail(
                "Failed to get server info: connection refused",
                "ConnectionError",
            ),
            ProbeResult::TimedOut => {
                Envelope::fail("Failed to get server info: connection timeout", "Timeout")
            }
            ProbeResult::Failed(reason) => {
                Envelope::fail(format!("Failed to get server info: {}", reason), reason)
            }
        }
    }
}

/// Unauthenticated GET against the server's status endpoint.
#[derive(Debug, Clone)]
pub struct ServerProbe {
    timeout: Duration,
}

impl ServerProbe {
    pub fn new(config: &Config) -> Self {
        Self {
            timeout: config.probe_timeout(),
        }
    }

    async fn fetch_status(&self, server_url: &str) -> Result<(u16, String)> {
        let url = Validator::server_url(server_url)?.join(STATUS_PATH)?;
        let client = Client::builder().timeout(self.timeout).build()?;
        debug!(%url, "probing server");
        let response = client.get(url).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok((status, body))
    }

    pub async fn probe(&self, server_url: &str) -> ProbeResult {
        match self.fetch_status(server_url).await {
            Ok((status, body)) => {
                info!(server = server_url, status, "server responded");
                ProbeResult::Responded { status, body }
            }
            Err(e) => {
                debug!(server = server_url, error = %e, "probe failed");
                ProbeResult::from_error(e)
            }
        }
    }

    pub async fn test_connection(&self, server_url: &str) -> Envelope {
        self.probe(server_url).await.into_connection_envelope()
    }

    pub async fn get_server_info(&self, server_url: &str) -> Envelope {
        self.probe(server_url).await.into_info_envelope()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn responded(status: u16, body: &str) -> ProbeResult {
        ProbeResult::Responded {
            status,
            body: body.to_string(),
        }
    }

    #[test]
    fn test_connection_status_interpretation() {
        let ok = responded(200, "").into_connection_envelope();
        assert!(ok.success);
        assert_eq!(ok.message, "Server is reachable");
        assert_eq!(ok.get("status_code"), Some(&Value::Int(200)));

        let not_found = responded(404, "").into_connection_envelope();
        assert!(!not_found.success);
        assert_eq!(not_found.message, "Server responded with status code: 404");
        assert_eq!(not_found.get("status_code"), Some(&Value::Int(404)));
    }

    #[test]
    fn test_transport_failures() {
        let refused = ProbeResult::Refused.into_connection_envelope();
        assert_eq!(refused.message, "Cannot connect to server - connection refused");
        assert_eq!(refused.error.as_deref(), Some("ConnectionError"));

        let timeout = ProbeResult::TimedOut.into_connection_envelope();
        assert_eq!(timeout.message, "Connection timeout");
        assert_eq!(timeout.error.as_deref(), Some("Timeout"));
    }

    #[test]
    fn test_server_info_json_and_raw_bodies() {
        let info = responded(200, r#"{"version":"R64.1"}"#).into_info_envelope();
        assert!(info.success);
        assert_eq!(
            info.get("server_info").and_then(|v| v.get("version")),
            Some(&Value::from("R64.1"))
        );

        let raw = responded(200, "<html>ok</html>").into_info_envelope();
        assert!(raw.success);
        assert_eq!(raw.message, "Server responded but response is not JSON");
        assert_eq!(
            raw.get("server_info").and_then(|v| v.get("raw_response")),
            Some(&Value::from("<html>ok</html>"))
        );
    }

    #[tokio::test]
    async fn test_invalid_url_fails_without_network() {
        let probe = ServerProbe::new(&Config::default());
        let envelope = probe.test_connection("not a url").await;
        assert!(!envelope.success);
        assert!(envelope.message.starts_with("Connection test failed:"));
    }
}
