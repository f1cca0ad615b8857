// session.rs

use tracing::{debug, info, warn};

use crate::seeq::client::AnalyticsClient;
use crate::seeq::error::{Result, SeeqError};
use crate::seeq::types::Credential;

/// Authentication state for one process. Owned by the runner; never persisted.
#[derive(Debug, Default)]
pub struct Session {
    identity: Option<String>,
    credential: Option<Credential>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }

    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    pub fn clear(&mut self) {
        self.identity = None;
        self.credential = None;
    }

    /// Logs in with `credential`. Any failure leaves the session unauthenticated.
    pub async fn authenticate<C>(&mut self, client: &C, credential: Credential) -> Result<&str>
    where
        C: AnalyticsClient + ?Sized,
    {
        self.clear();
        match client.login(&credential).await {
            Ok(Some(identity)) => {
                info!(user = %identity, server = %credential.base_url(), "authenticated");
                self.credential = Some(credential);
                Ok(self.identity.insert(identity).as_str())
            }
            Ok(None) => {
                warn!(server = %credential.base_url(), "login returned no user");
                Err(SeeqError::authentication_failed("Login returned no user"))
            }
            Err(e @ SeeqError::AuthenticationFailed { .. })
            | Err(e @ SeeqError::AuthenticationRequired { .. }) => {
                warn!(server = %credential.base_url(), error = %e, "login rejected");
                Err(e)
            }
            Err(e) => {
                warn!(server = %credential.base_url(), error = %e, "login failed");
                Err(SeeqError::AuthenticationFailed {
                    message: e.to_string(),
                    source: Some(Box::new(e)),
                })
            }
        }
    }

    /// Reuses the current login when it already covers `credential`, otherwise logs in.
    pub async fn ensure<C>(&mut self, client: &C, credential: Option<Credential>) -> Result<&str>
    where
        C: AnalyticsClient + ?Sized,
    {
        match credential {
            Some(credential) => {
                let reusable = self.is_authenticated()
                    && self
                        .credential
                        .as_ref()
                        .map(|current| current.same_account(&credential))
                        .unwrap_or(false);
                if reusable {
                    debug!("reusing authenticated session");
                    return self.identity().ok_or_else(|| {
                        SeeqError::authentication_required("Authentication credentials are required")
                    });
                }
                self.authenticate(client, credential).await
            }
            None => self.identity().ok_or_else(|| {
                SeeqError::authentication_required(
                    "Not authenticated and no credentials provided",
                )
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seeq::client::MockAnalyticsClient;
    use pretty_assertions::assert_eq;

    fn credential() -> Credential {
        Credential::new("https://example.seeq.tech", "key", "secret")
    }

    #[tokio::test]
    async fn test_authenticate_records_identity() {
        let mut client = MockAnalyticsClient::new();
        client
            .expect_login()
            .times(1)
            .returning(|_| Ok(Some("alice".to_string())));

        let mut session = Session::new();
        assert_eq!(session.authenticate(&client, credential()).await.unwrap(), "alice");
        assert!(session.is_authenticated());
        assert_eq!(session.credential().map(|c| c.access_key.as_str()), Some("key"));
    }

    #[tokio::test]
    async fn test_missing_identity_is_a_failure() {
        let mut client = MockAnalyticsClient::new();
        client.expect_login().returning(|_| Ok(None));

        let mut session = Session::new();
        let err = session.authenticate(&client, credential()).await.unwrap_err();
        assert!(matches!(err, SeeqError::AuthenticationFailed { .. }));
        assert!(!session.is_authenticated());
    }

    #[tokio::test]
    async fn test_ensure_reuses_matching_session() {
        let mut client = MockAnalyticsClient::new();
        client
            .expect_login()
            .times(1)
            .returning(|_| Ok(Some("alice".to_string())));

        let mut session = Session::new();
        session.ensure(&client, Some(credential())).await.unwrap();
        // Second call with the same account must not log in again.
        assert_eq!(session.ensure(&client, Some(credential())).await.unwrap(), "alice");
        assert_eq!(session.ensure(&client, None).await.unwrap(), "alice");
    }

    #[tokio::test]
    async fn test_ensure_without_credential_or_session_fails() {
        let client = MockAnalyticsClient::new();
        let mut session = Session::new();
        let err = session.ensure(&client, None).await.unwrap_err();
        assert!(matches!(err, SeeqError::AuthenticationRequired { .. }));
    }

    #[tokio::test]
    async fn test_failed_login_clears_previous_session() {
        let mut client = MockAnalyticsClient::new();
        let mut seq = mockall::Sequence::new();
        client
            .expect_login()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(Some("alice".to_string())));
        client
            .expect_login()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(SeeqError::authentication_failed("bad key")));

        let mut session = Session::new();
        session.ensure(&client, Some(credential())).await.unwrap();
        let other = Credential::new("https://example.seeq.tech", "other", "secret");
        assert!(session.ensure(&client, Some(other)).await.is_err());
        assert!(!session.is_authenticated());
    }

    #[tokio::test]
    async fn test_changed_secret_logs_in_again() {
        let mut client = MockAnalyticsClient::new();
        client
            .expect_login()
            .times(2)
            .returning(|_| Ok(Some("alice".to_string())));

        let mut session = Session::new();
        session.ensure(&client, Some(credential())).await.unwrap();
        let rotated = Credential::new("https://example.seeq.tech", "key", "rotated");
        session.ensure(&client, Some(rotated)).await.unwrap();
        assert_eq!(session.credential().map(|c| c.secret.as_str()), Some("rotated"));
    }

    #[tokio::test]
    async fn test_server_failure_during_login_is_an_auth_failure() {
        let mut client = MockAnalyticsClient::new();
        client
            .expect_login()
            .returning(|_| Err(SeeqError::server_error(500, Some("boom".to_string()))));

        let mut session = Session::new();
        let err = session.authenticate(&client, credential()).await.unwrap_err();
        assert!(matches!(err, SeeqError::AuthenticationFailed { source: Some(_), .. }));
        assert_eq!(err.code(), "Authentication required");
        assert!(err.to_string().contains("status code: 500"));
        assert!(!session.is_authenticated());
    }

    #[tokio::test]
    async fn test_invalid_server_url_is_an_auth_failure() {
        let mut client = MockAnalyticsClient::new();
        client
            .expect_login()
            .returning(|_| Err(SeeqError::from(url::ParseError::RelativeUrlWithoutBase)));

        let mut session = Session::new();
        let err = session
            .authenticate(&client, Credential::new("not a url", "key", "secret"))
            .await
            .unwrap_err();
        assert!(matches!(err, SeeqError::AuthenticationFailed { .. }));
        assert!(err.traceback().contains("Caused by: relative URL without a base"));
    }
}
