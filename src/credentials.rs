//! Session credentials and the STS-backed credential broker.
//!
//! Long-lived identity material is exchanged for a time-bounded session credential on every
//! call. Nothing is cached here, each call opens its own STS client and drops it on return.

use crate::{CredentialError, IdentitySettings};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_sts::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use chrono::{DateTime, Utc};
use std::fmt;
use tracing::{debug, warn};

/// Temporary access key / secret / session token triple issued by the identity service.
///
/// Immutable. A refresh produces a new instance.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionCredential {
    access_key_id: String,
    secret_access_key: String,
    session_token: String,
    expiry: DateTime<Utc>,
}

impl SessionCredential {
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: impl Into<String>,
        expiry: DateTime<Utc>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: session_token.into(),
            expiry,
        }
    }

    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    pub fn secret_access_key(&self) -> &str {
        &self.secret_access_key
    }

    pub fn session_token(&self) -> &str {
        &self.session_token
    }

    pub fn expiry(&self) -> DateTime<Utc> {
        self.expiry
    }

    /// Whether the credential is still valid at `now`
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry > now
    }
}

impl fmt::Debug for SessionCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCredential")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &"<redacted>")
            .field("expiry", &self.expiry)
            .finish()
    }
}

/// Supplier of fresh session credentials.
///
/// The token generator calls this once per derivation, so every bearer token is signed with
/// a credential obtained for that refresh.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Exchange identity material for a session credential
    ///
    /// No retry is performed; callers decide the retry policy.
    async fn acquire_session_credential(&self) -> Result<SessionCredential, CredentialError>;
}

/// Credential broker backed by AWS STS `GetSessionToken`
pub struct StsCredentialBroker {
    identity: IdentitySettings,
    region: String,
    duration_secs: i32,
}

impl StsCredentialBroker {
    pub fn new(identity: IdentitySettings, region: impl Into<String>, duration_secs: i32) -> Self {
        Self {
            identity,
            region: region.into(),
            duration_secs,
        }
    }

    pub fn from_config(config: &crate::ConnectorConfig) -> Self {
        Self::new(
            config.identity.clone(),
            config.region.clone(),
            config.credentials.session_duration_secs,
        )
    }

    async fn sts_client(&self) -> aws_sdk_sts::Client {
        let static_identity = Credentials::new(
            &self.identity.access_key_id,
            &self.identity.secret_access_key,
            None,
            None,
            "msk-connect-static",
        );
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(self.region.clone()))
            .credentials_provider(static_identity)
            .load()
            .await;
        aws_sdk_sts::Client::new(&sdk_config)
    }
}

impl fmt::Debug for StsCredentialBroker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StsCredentialBroker")
            .field("identity", &self.identity)
            .field("region", &self.region)
            .field("duration_secs", &self.duration_secs)
            .finish()
    }
}

#[async_trait]
impl CredentialProvider for StsCredentialBroker {
    async fn acquire_session_credential(&self) -> Result<SessionCredential, CredentialError> {
        // Scoped to this call: the client and its connections are dropped on every exit path
        let client = self.sts_client().await;

        let response = client
            .get_session_token()
            .duration_seconds(self.duration_secs)
            .send()
            .await
            .map_err(classify_sdk_error)?;

        let credentials = response.credentials().ok_or_else(|| {
            CredentialError::MissingCredentials("GetSessionToken response had no credentials".into())
        })?;

        let expiry = DateTime::<Utc>::from_timestamp(credentials.expiration().secs(), 0)
            .ok_or_else(|| {
                CredentialError::MissingCredentials("credential expiration out of range".into())
            })?;

        debug!(
            access_key_id = credentials.access_key_id(),
            expiry = %expiry,
            "acquired session credential"
        );

        Ok(SessionCredential::new(
            credentials.access_key_id(),
            credentials.secret_access_key(),
            credentials.session_token(),
            expiry,
        ))
    }
}

/// Map an AWS SDK failure onto the credential error taxonomy
pub(crate) fn classify_sdk_error<E, R>(err: SdkError<E, R>) -> CredentialError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: fmt::Debug,
{
    match &err {
        SdkError::ServiceError(service_err) => {
            let code = service_err.err().code().unwrap_or("Unknown").to_string();
            let message = service_err
                .err()
                .message()
                .unwrap_or("no message")
                .to_string();
            if code.contains("Throttl") || code == "RequestLimitExceeded" {
                warn!(code = %code, "identity service throttled");
                CredentialError::Throttled(message)
            } else {
                CredentialError::Rejected { code, message }
            }
        }
        _ => CredentialError::Unreachable(DisplayErrorContext(&err).to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_credential_validity() {
        let now = Utc::now();
        let cred = SessionCredential::new("ASIA1", "s", "t", now + Duration::hours(2));
        assert!(cred.is_valid_at(now));
        assert!(!cred.is_valid_at(now + Duration::hours(2)));
        assert!(!cred.is_valid_at(now + Duration::hours(3)));
    }

    #[test]
    fn test_credential_debug_redacts() {
        let cred = SessionCredential::new("ASIA1", "top-secret", "tok-123", Utc::now());
        let rendered = format!("{:?}", cred);
        assert!(rendered.contains("ASIA1"));
        assert!(!rendered.contains("top-secret"));
        assert!(!rendered.contains("tok-123"));
    }

    #[test]
    fn test_broker_debug_redacts_identity() {
        let broker = StsCredentialBroker::new(
            IdentitySettings {
                access_key_id: "AKID".into(),
                secret_access_key: "long-lived-secret".into(),
            },
            "eu-west-2",
            7200,
        );
        let rendered = format!("{:?}", broker);
        assert!(!rendered.contains("long-lived-secret"));
        assert!(rendered.contains("eu-west-2"));
    }
}
