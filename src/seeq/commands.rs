// commands.rs

use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

use crate::error::AppError;
use crate::seeq::client::AnalyticsClient;
use crate::seeq::envelope::Envelope;
use crate::seeq::error::SeeqError;
use crate::seeq::health::ServerProbe;
use crate::seeq::orchestrator::{Orchestrator, PullRequest};
use crate::seeq::session::Session;
use crate::seeq::types::Value;
use crate::seeq::validation::ArgList;
use crate::types::Config;

/// Operations the host may invoke by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Authenticate,
    CheckAuthStatus,
    SearchSensorsOnly,
    SearchAndPullSensors,
    TestConnection,
    GetServerInfo,
}

impl Operation {
    pub const ALL: [Operation; 6] = [
        Operation::Authenticate,
        Operation::CheckAuthStatus,
        Operation::SearchSensorsOnly,
        Operation::SearchAndPullSensors,
        Operation::TestConnection,
        Operation::GetServerInfo,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Operation::Authenticate => "authenticate",
            Operation::CheckAuthStatus => "checkAuthStatus",
            Operation::SearchSensorsOnly => "searchSensorsOnly",
            Operation::SearchAndPullSensors => "searchAndPullSensors",
            Operation::TestConnection => "testConnection",
            Operation::GetServerInfo => "getServerInfo",
        }
    }

    /// Older hosts call operations by these names.
    pub fn alias(&self) -> &'static str {
        match self {
            Operation::Authenticate => "authenticate_seeq",
            Operation::CheckAuthStatus => "check_auth_status",
            Operation::SearchSensorsOnly => "search_sensors_only",
            Operation::SearchAndPullSensors => "search_and_pull_sensors",
            Operation::TestConnection => "test_connection",
            Operation::GetServerInfo => "get_server_info",
        }
    }

    pub fn max_args(&self) -> usize {
        match self {
            Operation::Authenticate => 5,
            Operation::CheckAuthStatus => 0,
            Operation::SearchSensorsOnly => 6,
            Operation::SearchAndPullSensors => 10,
            Operation::TestConnection | Operation::GetServerInfo => 1,
        }
    }
}

impl FromStr for Operation {
    type Err = SeeqError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::ALL
            .into_iter()
            .find(|op| op.name() == s || op.alias() == s)
            .ok_or_else(|| SeeqError::UnknownOperation(s.to_string()))
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Owns the client and the session for the lifetime of one process.
pub struct Runner<C: AnalyticsClient> {
    client: C,
    session: Session,
    probe: ServerProbe,
}

impl<C: AnalyticsClient> Runner<C> {
    pub fn new(client: C, config: &Config) -> Self {
        Self {
            client,
            session: Session::new(),
            probe: ServerProbe::new(config),
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Resolves `name`, decodes `args_json` and runs the operation.
    ///
    /// Operation failures come back as failure envelopes; `Err` is reserved for
    /// arguments that cannot be decoded at all.
    pub async fn dispatch(&mut self, name: &str, args_json: &str) -> Result<Envelope, AppError> {
        let operation = match name.parse::<Operation>() {
            Ok(op) => op,
            Err(e) => {
                debug!(operation = name, "unknown operation");
                return Ok(Envelope::from_error(&e));
            }
        };
        let args = ArgList::parse(args_json)?;
        self.run(operation, &args).await
    }

    pub async fn run(&mut self, operation: Operation, args: &ArgList) -> Result<Envelope, AppError> {
        args.expect_at_most(operation.max_args(), operation.name())?;
        debug!(%operation, args = args.len(), "running operation");

        let envelope = match operation {
            Operation::Authenticate => self.authenticate(args).await?,
            Operation::CheckAuthStatus => self.check_auth_status(),
            Operation::SearchSensorsOnly => self.search_sensors_only(args).await?,
            Operation::SearchAndPullSensors => self.search_and_pull_sensors(args).await?,
            Operation::TestConnection => {
                let url = args.required_str(0, "url")?;
                self.probe.test_connection(&url).await
            }
            Operation::GetServerInfo => {
                let url = args.required_str(0, "url")?;
                self.probe.get_server_info(&url).await
            }
        };

        info!(%operation, success = envelope.success, "operation finished");
        Ok(envelope)
    }

    async fn authenticate(&mut self, args: &ArgList) -> Result<Envelope, AppError> {
        args.required_str(0, "url")?;
        args.required_str(1, "accessKey")?;
        args.required_str(2, "secret")?;
        let credential = match args.credential(0)? {
            Some(credential) => credential,
            None => {
                return Ok(Envelope::from_error(&SeeqError::authentication_required(
                    "Authentication credentials are required",
                )))
            }
        };
        let server_url = credential.base_url().to_string();

        Ok(match self.session.authenticate(&self.client, credential).await {
            Ok(user) => Envelope::ok(format!("Successfully authenticated as {}", user))
                .with("user", user)
                .with("server_url", server_url),
            Err(e) => Envelope::from_error(&e),
        })
    }

    fn check_auth_status(&self) -> Envelope {
        let user = self.session.identity();
        let message = match user {
            Some(user) => format!("Authenticated as {}", user),
            None => "Not authenticated".to_string(),
        };
        Envelope::ok(message)
            .with("isAuthenticated", self.session.is_authenticated())
            .with("user", Value::from(user))
    }

    async fn search_sensors_only(&mut self, args: &ArgList) -> Result<Envelope, AppError> {
        let names = args.string_list(0, "sensorNames")?;
        let credential = args.credential(1)?;

        let mut orchestrator = Orchestrator::new(&self.client, &mut self.session);
        Ok(match orchestrator.search_only(&names, credential).await {
            Ok(outcome) => Envelope::ok(format!(
                "Search completed for {} sensors",
                outcome.sensor_count
            ))
            .with("search_results", outcome.search_results)
            .with("sensor_count", outcome.sensor_count),
            Err(e) => Envelope::from_error(&e),
        })
    }

    async fn search_and_pull_sensors(&mut self, args: &ArgList) -> Result<Envelope, AppError> {
        let request = PullRequest {
            sensor_names: args.string_list(0, "sensorNames")?,
            start: args.date(1),
            end: args.date(2),
            grid: args.optional_str(3, "grid")?,
            timezone: args.optional_str(4, "timezone")?,
            credential: args.credential(5)?,
        };

        let mut orchestrator = Orchestrator::new(&self.client, &mut self.session);
        Ok(match orchestrator.search_and_pull(request).await {
            Ok(outcome) => Envelope::ok(format!(
                "Successfully pulled data for {} sensors",
                outcome.sensor_count
            ))
            .with("search_results", outcome.search_results)
            .with("data", outcome.data)
            .with("data_columns", outcome.data_columns)
            .with("data_index", outcome.data_index)
            .with("sensor_count", outcome.sensor_count)
            .with("time_range", outcome.time_range),
            Err(e) => Envelope::from_error(&e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seeq::client::MockAnalyticsClient;
    use pretty_assertions::assert_eq;

    fn runner(client: MockAnalyticsClient) -> Runner<MockAnalyticsClient> {
        Runner::new(client, &Config::default())
    }

    #[test]
    fn test_operation_names_and_aliases() {
        for op in Operation::ALL {
            assert_eq!(op.name().parse::<Operation>().unwrap(), op);
            assert_eq!(op.alias().parse::<Operation>().unwrap(), op);
        }
        assert!(matches!(
            "dropTables".parse::<Operation>(),
            Err(SeeqError::UnknownOperation(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_operation_envelope() {
        let mut runner = runner(MockAnalyticsClient::new());
        let envelope = runner.dispatch("dropTables", "[]").await.unwrap();
        assert!(!envelope.success);
        assert_eq!(envelope.error.as_deref(), Some("Unknown function: dropTables"));
    }

    #[tokio::test]
    async fn test_malformed_arguments_are_invocation_errors() {
        let mut runner = runner(MockAnalyticsClient::new());
        assert!(matches!(
            runner.dispatch("checkAuthStatus", "{not json").await,
            Err(AppError::MalformedArguments(_))
        ));
        assert!(matches!(
            runner.dispatch("checkAuthStatus", r#"["extra"]"#).await,
            Err(AppError::InvalidArgument { .. })
        ));
        assert!(matches!(
            runner.dispatch("searchSensorsOnly", r#"["TEMP.1"]"#).await,
            Err(AppError::InvalidArgument { name: "sensorNames", .. })
        ));
    }

    #[tokio::test]
    async fn test_authenticate_then_check_status() {
        let mut client = MockAnalyticsClient::new();
        client
            .expect_login()
            .times(1)
            .returning(|_| Ok(Some("alice".to_string())));
        let mut runner = runner(client);

        let status = runner.dispatch("checkAuthStatus", "[]").await.unwrap();
        assert_eq!(status.get("isAuthenticated"), Some(&Value::Bool(false)));
        assert_eq!(status.get("user"), Some(&Value::Null));

        let envelope = runner
            .dispatch("authenticate", r#"["https://example.seeq.tech/", "key", "secret"]"#)
            .await
            .unwrap();
        assert!(envelope.success);
        assert_eq!(envelope.get("user"), Some(&Value::from("alice")));
        assert_eq!(
            envelope.get("server_url"),
            Some(&Value::from("https://example.seeq.tech"))
        );

        let status = runner.dispatch("check_auth_status", "[]").await.unwrap();
        assert_eq!(status.get("isAuthenticated"), Some(&Value::Bool(true)));
        assert_eq!(status.message, "Authenticated as alice");
    }

    #[tokio::test]
    async fn test_failed_authentication_envelope() {
        let mut client = MockAnalyticsClient::new();
        client
            .expect_login()
            .returning(|_| Err(SeeqError::authentication_failed("invalid access key")));
        let mut runner = runner(client);

        let envelope = runner
            .dispatch("authenticate_seeq", r#"["https://s", "key", "wrong", "Seeq", false]"#)
            .await
            .unwrap();
        assert!(!envelope.success);
        assert_eq!(envelope.error.as_deref(), Some("Authentication required"));
        assert!(envelope.get("auth_details").is_some());
        assert!(!runner.session().is_authenticated());
    }

    #[tokio::test]
    async fn test_search_without_session_or_credentials() {
        let mut runner = runner(MockAnalyticsClient::new());
        let envelope = runner
            .dispatch("searchSensorsOnly", r#"[["TEMP.1"]]"#)
            .await
            .unwrap();
        assert!(!envelope.success);
        assert_eq!(envelope.error.as_deref(), Some("Authentication required"));
    }
}
