// client.rs

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use futures::future::join_all;
use parking_lot::RwLock;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use tracing::{debug, info};
use url::Url;

use crate::constants::{AUTH_HEADER, AUTH_PROVIDER_CLASS, ITEMS_PATH, LOGIN_PATH};
use crate::seeq::error::{Result, SeeqError};
use crate::seeq::types::{Credential, SearchHit, SensorRecord, Table, TimeRange, Value};
use crate::seeq::validation::Validator;
use crate::types::Config;

/// The remote analytics service, as seen by the orchestrator.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AnalyticsClient: Send + Sync {
    /// Logs in and returns the user's identity, or `None` when the server grants no session.
    async fn login(&self, credential: &Credential) -> Result<Option<String>>;

    /// Items whose name matches `name`, restricted to `item_type`.
    async fn search(&self, name: &str, item_type: &str) -> Result<Vec<SearchHit>>;

    /// Samples for every found sensor, aligned into one table.
    async fn pull(&self, sensors: &[SensorRecord], range: &TimeRange) -> Result<Table>;
}

#[derive(Debug, Clone)]
struct Connection {
    http: Client,
    base_url: Url,
    token: String,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ItemsResponse {
    #[serde(default)]
    items: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SamplesResponse {
    #[serde(default)]
    samples: Vec<Sample>,
}

#[derive(Debug, Deserialize)]
struct Sample {
    key: JsonValue,
    #[serde(default)]
    value: JsonValue,
}

impl Sample {
    fn into_point(self) -> Result<(DateTime<Utc>, Value)> {
        let at = match &self.key {
            JsonValue::String(s) => DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|_| SeeqError::DateParse { input: s.clone() })?,
            JsonValue::Number(n) => n
                .as_i64()
                .map(|nanos| Utc.timestamp_nanos(nanos))
                .ok_or_else(|| SeeqError::DateParse {
                    input: n.to_string(),
                })?,
            other => {
                return Err(SeeqError::DateParse {
                    input: other.to_string(),
                })
            }
        };
        let value = match self.value {
            JsonValue::Null => Value::Float(f64::NAN),
            JsonValue::Number(n) => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            other => Value::from(other),
        };
        Ok((at, value))
    }
}

/// HTTP implementation of [`AnalyticsClient`] against the server's REST API.
#[derive(Debug)]
pub struct SeeqClient {
    config: Config,
    connection: RwLock<Option<Connection>>,
}

impl SeeqClient {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            connection: RwLock::new(None),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection.read().is_some()
    }

    fn connection(&self) -> Result<Connection> {
        self.connection.read().clone().ok_or_else(|| {
            SeeqError::authentication_required("Not logged in. Call authenticate first.")
        })
    }

    fn http_client(&self, ignore_tls: bool) -> Result<Client> {
        Ok(Client::builder()
            .timeout(self.config.timeout())
            .danger_accept_invalid_certs(ignore_tls)
            .build()?)
    }

    /// Appends `path` to the server base and encodes `params` as the query string.
    pub fn build_url(base: &Url, path: &str, params: &[(&str, &str)]) -> Result<Url> {
        let mut url = base.join(path)?;
        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(params);
        }
        Ok(url)
    }

    async fn check_status(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.ok().filter(|b| !b.is_empty());
        Err(SeeqError::server_error(status.as_u16(), body))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, conn: &Connection, url: Url) -> Result<T> {
        debug!(%url, "GET");
        let response = conn
            .http
            .get(url)
            .header(AUTH_HEADER, &conn.token)
            .send()
            .await?;
        let response = Self::check_status(response).await?;
        Ok(response.json::<T>().await?)
    }

    async fn fetch_samples(
        &self,
        conn: &Connection,
        id: &str,
        range: &TimeRange,
    ) -> Result<Vec<(DateTime<Utc>, Value)>> {
        let start = range.start.to_rfc3339();
        let end = range.end.to_rfc3339();
        let path = format!("api/signals/{}/samples", id);
        let url = Self::build_url(
            &conn.base_url,
            &path,
            &[
                ("start", start.as_str()),
                ("end", end.as_str()),
                ("period", range.grid.as_str()),
            ],
        )?;
        let body: SamplesResponse = self.get_json(conn, url).await?;
        body.samples.into_iter().map(Sample::into_point).collect()
    }
}

#[async_trait]
impl AnalyticsClient for SeeqClient {
    async fn login(&self, credential: &Credential) -> Result<Option<String>> {
        let base_url = Validator::server_url(&credential.server_url)?;
        let http = self.http_client(credential.ignore_tls)?;
        let url = Self::build_url(&base_url, LOGIN_PATH, &[])?;

        let payload = json!({
            "username": credential.access_key,
            "password": credential.secret,
            "authProviderClass": AUTH_PROVIDER_CLASS,
            "authProviderId": credential.auth_provider,
        });

        debug!(server = %base_url, provider = %credential.auth_provider, "logging in");
        let response = http
            .post(url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| SeeqError::AuthenticationFailed {
                message: format!("Could not reach {}", credential.base_url()),
                source: Some(Box::new(e)),
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            *self.connection.write() = None;
            return Err(SeeqError::authentication_failed(if body.is_empty() {
                format!("server rejected credentials (status {})", status.as_u16())
            } else {
                body
            }));
        }
        let response = Self::check_status(response).await?;

        let token = response
            .headers()
            .get(AUTH_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let Some(token) = token else {
            *self.connection.write() = None;
            return Ok(None);
        };

        let user: LoginResponse = response.json().await.unwrap_or(LoginResponse {
            username: None,
            name: None,
        });
        let identity = user
            .username
            .or(user.name)
            .unwrap_or_else(|| credential.access_key.clone());

        *self.connection.write() = Some(Connection {
            http,
            base_url,
            token,
        });
        info!(user = %identity, "logged in");
        Ok(Some(identity))
    }

    async fn search(&self, name: &str, item_type: &str) -> Result<Vec<SearchHit>> {
        let conn = self.connection()?;
        let filter = format!("name~={}", name);
        let limit = self.config.search_limit.to_string();
        let url = Self::build_url(
            &conn.base_url,
            ITEMS_PATH,
            &[
                ("filters", filter.as_str()),
                ("types", item_type),
                ("limit", limit.as_str()),
            ],
        )?;
        let body: ItemsResponse = self.get_json(&conn, url).await?;
        debug!(sensor = name, hits = body.items.len(), "search complete");
        Ok(body.items)
    }

    async fn pull(&self, sensors: &[SensorRecord], range: &TimeRange) -> Result<Table> {
        let conn = self.connection()?;
        let wanted: Vec<(&str, &str)> = sensors
            .iter()
            .filter_map(|s| s.id.as_deref().map(|id| (s.name.as_str(), id)))
            .collect();

        let fetches = wanted
            .iter()
            .map(|(_, id)| self.fetch_samples(&conn, id, range));
        let results = join_all(fetches).await;

        let mut series = Vec::with_capacity(wanted.len());
        for ((name, _), samples) in wanted.into_iter().zip(results) {
            series.push((name.to_string(), samples?));
        }
        Ok(Table::from_series(range.start.zone(), series))
    }
}
