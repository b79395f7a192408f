//! MSK IAM bearer token derivation.
//!
//! A token is a SigV4-presigned `kafka-cluster:Connect` request against
//! `kafka.<region>.amazonaws.com`, base64url-encoded without padding. The same clock reading
//! is used to check the session credential, to sign, and to compute the token expiry.

use crate::{CredentialProvider, SessionCredential, TokenError};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

const SERVICE: &str = "kafka-cluster";
const ACTION: &str = "kafka-cluster:Connect";
const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const USER_AGENT: &str = concat!("msk-connect-core/", env!("CARGO_PKG_VERSION"));

/// Presigned URL validity. MSK rejects tokens older than this.
pub const TOKEN_VALIDITY_SECS: i64 = 900;

/// RFC 3986 unreserved characters stay as-is, everything else is escaped
const URI_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Short-lived credential string presented to the broker's OAUTHBEARER mechanism.
///
/// Handed to the client once per refresh and never cached.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken {
    value: String,
    expiry_timestamp_millis: i64,
}

impl BearerToken {
    pub fn new(value: impl Into<String>, expiry_timestamp_millis: i64) -> Self {
        Self {
            value: value.into(),
            expiry_timestamp_millis,
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Absolute expiry in milliseconds since the Unix epoch
    pub fn expiry_timestamp_millis(&self) -> i64 {
        self.expiry_timestamp_millis
    }

    pub fn into_parts(self) -> (String, i64) {
        (self.value, self.expiry_timestamp_millis)
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerToken")
            .field("value", &"<redacted>")
            .field("expiry_timestamp_millis", &self.expiry_timestamp_millis)
            .finish()
    }
}

/// Wall-clock source shared by validity checks and signing
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The system clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Derives bearer tokens from freshly supplied session credentials
pub struct TokenGenerator {
    credentials: Arc<dyn CredentialProvider>,
    region: String,
    clock: Arc<dyn Clock>,
}

impl TokenGenerator {
    pub fn new(credentials: Arc<dyn CredentialProvider>, region: impl Into<String>) -> Self {
        Self::with_clock(credentials, region, Arc::new(SystemClock))
    }

    pub fn with_clock(
        credentials: Arc<dyn CredentialProvider>,
        region: impl Into<String>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            credentials,
            region: region.into(),
            clock,
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Obtain a fresh credential and derive a token from it
    pub async fn derive_token(&self) -> Result<BearerToken, TokenError> {
        let credential = self.credentials.acquire_session_credential().await?;
        let now = self.clock.now();
        sign_token(&credential, &self.region, now)
    }
}

/// Build the bearer token for `credential` at instant `now`
///
/// Fails when the credential is no longer valid at `now`. The returned expiry never exceeds
/// the credential's own expiry.
pub fn sign_token(
    credential: &SessionCredential,
    region: &str,
    now: DateTime<Utc>,
) -> Result<BearerToken, TokenError> {
    if !credential.is_valid_at(now) {
        return Err(TokenError::ExpiredCredential {
            expired_at_ms: credential.expiry().timestamp_millis(),
            now_ms: now.timestamp_millis(),
        });
    }
    if region.is_empty() {
        return Err(TokenError::Signing("region is empty".into()));
    }

    let host = format!("kafka.{}.amazonaws.com", region);
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date_stamp = now.format("%Y%m%d").to_string();
    let scope = format!("{}/{}/{}/aws4_request", date_stamp, region, SERVICE);

    let mut params: Vec<(&str, String)> = vec![
        ("Action", ACTION.to_string()),
        ("X-Amz-Algorithm", ALGORITHM.to_string()),
        (
            "X-Amz-Credential",
            format!("{}/{}", credential.access_key_id(), scope),
        ),
        ("X-Amz-Date", amz_date.clone()),
        ("X-Amz-Expires", TOKEN_VALIDITY_SECS.to_string()),
        ("X-Amz-SignedHeaders", "host".to_string()),
    ];
    if !credential.session_token().is_empty() {
        params.push(("X-Amz-Security-Token", credential.session_token().to_string()));
    }
    params.sort_by(|a, b| a.0.cmp(b.0));

    let canonical_query = encode_query(&params);
    let canonical_request = format!(
        "GET\n/\n{}\nhost:{}\n\nhost\n{}",
        canonical_query,
        host,
        hex::encode(Sha256::digest(b""))
    );
    let string_to_sign = format!(
        "{}\n{}\n{}\n{}",
        ALGORITHM,
        amz_date,
        scope,
        hex::encode(Sha256::digest(canonical_request.as_bytes()))
    );

    let signing_key = derive_signing_key(credential.secret_access_key(), &date_stamp, region)?;
    let signature = hex::encode(hmac(&signing_key, string_to_sign.as_bytes())?);

    let url = format!(
        "https://{}/?{}&X-Amz-Signature={}&User-Agent={}",
        host,
        canonical_query,
        signature,
        utf8_percent_encode(USER_AGENT, URI_ENCODE_SET)
    );

    let signed_until = now + Duration::seconds(TOKEN_VALIDITY_SECS);
    let expiry = signed_until.min(credential.expiry());

    debug!(region, expiry_ms = expiry.timestamp_millis(), "derived bearer token");

    Ok(BearerToken::new(
        URL_SAFE_NO_PAD.encode(url.as_bytes()),
        expiry.timestamp_millis(),
    ))
}

fn encode_query(params: &[(&str, String)]) -> String {
    params
        .iter()
        .map(|(k, v)| {
            format!(
                "{}={}",
                utf8_percent_encode(k, URI_ENCODE_SET),
                utf8_percent_encode(v, URI_ENCODE_SET)
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}

fn hmac(key: &[u8], data: &[u8]) -> Result<Vec<u8>, TokenError> {
    let mut mac =
        HmacSha256::new_from_slice(key).map_err(|e| TokenError::Signing(e.to_string()))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn derive_signing_key(secret: &str, date_stamp: &str, region: &str) -> Result<Vec<u8>, TokenError> {
    let k_date = hmac(format!("AWS4{}", secret).as_bytes(), date_stamp.as_bytes())?;
    let k_region = hmac(&k_date, region.as_bytes())?;
    let k_service = hmac(&k_region, SERVICE.as_bytes())?;
    hmac(&k_service, b"aws4_request")
}
