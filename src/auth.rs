//! OAUTHBEARER refresh callback.
//!
//! librdkafka asks for a token synchronously, on its own background thread, whenever the
//! current one is missing or close to expiry. Token derivation is async (STS round trip), so
//! the adapter runs it on a dedicated worker thread bound to the tokio runtime, waits for it
//! with a deadline, and always commits exactly one outcome into the client: a token or a
//! failure reason.

use crate::{BearerToken, ConnectorMetrics, TokenError, TokenGenerator};
use rdkafka::client::{ClientContext, OAuthToken};
use rdkafka::error::KafkaError;
use std::cell::RefCell;
use std::error::Error;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, error, warn};

/// The client-side auth state the adapter writes into
pub trait TokenSink {
    /// Install a freshly derived token
    fn install_token(&self, token: BearerToken);

    /// Record that the refresh failed; the client retries the callback later
    fn install_failure(&self, reason: String);
}

/// Terminal outcome of one refresh
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Installed { expiry_timestamp_millis: i64 },
    Failed(String),
}

impl RefreshOutcome {
    pub fn is_installed(&self) -> bool {
        matches!(self, RefreshOutcome::Installed { .. })
    }
}

/// Bridges the client's synchronous refresh callback to async token derivation
pub struct AuthCallbackAdapter {
    generator: Arc<TokenGenerator>,
    runtime: Handle,
    timeout: Duration,
    metrics: Option<Arc<ConnectorMetrics>>,
}

impl AuthCallbackAdapter {
    /// `runtime` must outlive the clients this adapter is installed into
    pub fn new(generator: Arc<TokenGenerator>, runtime: Handle, timeout: Duration) -> Self {
        Self {
            generator,
            runtime,
            timeout,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<ConnectorMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Derive a token and commit the outcome into `sink`
    ///
    /// Must not be called from a tokio worker thread. Never panics past this boundary and
    /// always calls exactly one of `install_token` / `install_failure`.
    pub fn on_token_refresh<S: TokenSink + ?Sized>(&self, sink: &S) -> RefreshOutcome {
        match self.derive_blocking() {
            Ok(token) => {
                let expiry_timestamp_millis = token.expiry_timestamp_millis();
                debug!(expiry_ms = expiry_timestamp_millis, "installing refreshed token");
                sink.install_token(token);
                if let Some(metrics) = &self.metrics {
                    metrics.record_token_refresh(true);
                }
                RefreshOutcome::Installed {
                    expiry_timestamp_millis,
                }
            }
            Err(err) => {
                let reason = err.to_string();
                warn!(error = %reason, "token refresh failed");
                sink.install_failure(reason.clone());
                if let Some(metrics) = &self.metrics {
                    metrics.record_token_refresh(false);
                }
                RefreshOutcome::Failed(reason)
            }
        }
    }

    fn derive_blocking(&self) -> Result<BearerToken, TokenError> {
        let generator = self.generator.clone();
        let runtime = self.runtime.clone();
        let timeout = self.timeout;

        let (tx, rx) = mpsc::channel();
        // Detached: a derivation that ignores the deadline only holds this worker
        thread::Builder::new()
            .name("msk-token-refresh".to_string())
            .spawn(move || {
                let result = runtime.block_on(async move {
                    tokio::time::timeout(timeout, generator.derive_token()).await
                });
                let _ = tx.send(result.unwrap_or_else(|_elapsed| {
                    Err(TokenError::Timeout(timeout.as_millis() as u64))
                }));
            })
            .map_err(|e| TokenError::Worker(e.to_string()))?;

        match rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(TokenError::Timeout(timeout.as_millis() as u64)),
            Err(RecvTimeoutError::Disconnected) => {
                Err(TokenError::Worker("token refresh worker panicked".to_string()))
            }
        }
    }
}

/// Single-use sink collecting the adapter's outcome for librdkafka
#[derive(Default)]
struct OutcomeSlot {
    outcome: RefCell<Option<Result<BearerToken, String>>>,
}

impl TokenSink for OutcomeSlot {
    fn install_token(&self, token: BearerToken) {
        *self.outcome.borrow_mut() = Some(Ok(token));
    }

    fn install_failure(&self, reason: String) {
        *self.outcome.borrow_mut() = Some(Err(reason));
    }
}

/// Kafka client context that answers OAUTHBEARER refresh requests through the adapter
///
/// Installed into both the admin client and the producer.
#[derive(Clone)]
pub struct AuthClientContext {
    adapter: Arc<AuthCallbackAdapter>,
    principal_name: String,
}

impl AuthClientContext {
    pub fn new(adapter: Arc<AuthCallbackAdapter>, principal_name: impl Into<String>) -> Self {
        Self {
            adapter,
            principal_name: principal_name.into(),
        }
    }
}

impl ClientContext for AuthClientContext {
    const ENABLE_REFRESH_OAUTH_TOKEN: bool = true;

    fn generate_oauth_token(
        &self,
        _oauthbearer_config: Option<&str>,
    ) -> Result<OAuthToken, Box<dyn Error>> {
        let slot = OutcomeSlot::default();
        self.adapter.on_token_refresh(&slot);

        match slot.outcome.into_inner() {
            Some(Ok(token)) => {
                let (token, lifetime_ms) = token.into_parts();
                Ok(OAuthToken {
                    token,
                    principal_name: self.principal_name.clone(),
                    lifetime_ms,
                })
            }
            Some(Err(reason)) => Err(reason.into()),
            None => Err("token refresh produced no outcome".into()),
        }
    }

    fn error(&self, error: KafkaError, reason: &str) {
        error!(error = %error, reason, "kafka client error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CredentialError, CredentialProvider, SessionCredential};
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StaticProvider;

    #[async_trait]
    impl CredentialProvider for StaticProvider {
        async fn acquire_session_credential(&self) -> Result<SessionCredential, CredentialError> {
            Ok(SessionCredential::new(
                "ASIA",
                "secret",
                "tok",
                Utc::now() + ChronoDuration::hours(2),
            ))
        }
    }

    struct RejectingProvider;

    #[async_trait]
    impl CredentialProvider for RejectingProvider {
        async fn acquire_session_credential(&self) -> Result<SessionCredential, CredentialError> {
            Err(CredentialError::Rejected {
                code: "InvalidClientTokenId".into(),
                message: "The security token included in the request is invalid".into(),
            })
        }
    }

    struct HangingProvider;

    #[async_trait]
    impl CredentialProvider for HangingProvider {
        async fn acquire_session_credential(&self) -> Result<SessionCredential, CredentialError> {
            tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
            Err(CredentialError::Unreachable("unreachable".into()))
        }
    }

    /// Holds its thread instead of yielding to the runtime
    struct ThreadBlockingProvider;

    #[async_trait]
    impl CredentialProvider for ThreadBlockingProvider {
        async fn acquire_session_credential(&self) -> Result<SessionCredential, CredentialError> {
            std::thread::sleep(std::time::Duration::from_secs(3));
            Err(CredentialError::Unreachable("unreachable".into()))
        }
    }

    struct PanickingProvider;

    #[async_trait]
    impl CredentialProvider for PanickingProvider {
        async fn acquire_session_credential(&self) -> Result<SessionCredential, CredentialError> {
            panic!("provider bug");
        }
    }

    #[derive(Default)]
    struct CountingSink {
        tokens: AtomicUsize,
        failures: AtomicUsize,
    }

    impl TokenSink for CountingSink {
        fn install_token(&self, _token: BearerToken) {
            self.tokens.fetch_add(1, Ordering::SeqCst);
        }

        fn install_failure(&self, _reason: String) {
            self.failures.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn adapter(
        rt: &tokio::runtime::Runtime,
        provider: Arc<dyn CredentialProvider>,
        timeout: Duration,
    ) -> AuthCallbackAdapter {
        let generator = Arc::new(TokenGenerator::new(provider, "us-east-1"));
        AuthCallbackAdapter::new(generator, rt.handle().clone(), timeout)
    }

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap()
    }

    #[test]
    fn test_success_installs_token_once() {
        let rt = runtime();
        let adapter = adapter(&rt, Arc::new(StaticProvider), Duration::from_secs(5));
        let sink = CountingSink::default();

        let outcome = adapter.on_token_refresh(&sink);
        assert!(outcome.is_installed());
        assert_eq!(sink.tokens.load(Ordering::SeqCst), 1);
        assert_eq!(sink.failures.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_credential_error_installs_failure() {
        let rt = runtime();
        let adapter = adapter(&rt, Arc::new(RejectingProvider), Duration::from_secs(5));
        let sink = CountingSink::default();

        let outcome = adapter.on_token_refresh(&sink);
        match outcome {
            RefreshOutcome::Failed(reason) => assert!(reason.contains("InvalidClientTokenId")),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(sink.tokens.load(Ordering::SeqCst), 0);
        assert_eq!(sink.failures.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_timeout_installs_failure() {
        let rt = runtime();
        let adapter = adapter(&rt, Arc::new(HangingProvider), Duration::from_millis(50));
        let sink = CountingSink::default();

        let outcome = adapter.on_token_refresh(&sink);
        assert_eq!(
            outcome,
            RefreshOutcome::Failed(TokenError::Timeout(50).to_string())
        );
        assert_eq!(sink.failures.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_timeout_bounds_thread_blocking_provider() {
        let rt = runtime();
        let adapter = adapter(
            &rt,
            Arc::new(ThreadBlockingProvider),
            Duration::from_millis(50),
        );
        let sink = CountingSink::default();

        let start = std::time::Instant::now();
        let outcome = adapter.on_token_refresh(&sink);
        let elapsed = start.elapsed();

        assert_eq!(
            outcome,
            RefreshOutcome::Failed(TokenError::Timeout(50).to_string())
        );
        assert!(elapsed < Duration::from_secs(1), "blocked for {:?}", elapsed);
        assert_eq!(sink.tokens.load(Ordering::SeqCst), 0);
        assert_eq!(sink.failures.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_worker_panic_installs_failure() {
        let rt = runtime();
        let adapter = adapter(&rt, Arc::new(PanickingProvider), Duration::from_secs(5));
        let sink = CountingSink::default();

        let outcome = adapter.on_token_refresh(&sink);
        assert!(!outcome.is_installed());
        assert_eq!(sink.tokens.load(Ordering::SeqCst), 0);
        assert_eq!(sink.failures.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_client_context_maps_outcomes() {
        let rt = runtime();

        let ok = AuthClientContext::new(
            Arc::new(adapter(&rt, Arc::new(StaticProvider), Duration::from_secs(5))),
            "principal",
        );
        let token = ok.generate_oauth_token(None).unwrap();
        assert_eq!(token.principal_name, "principal");
        assert!(token.lifetime_ms > Utc::now().timestamp_millis());
        assert!(!token.token.is_empty());

        let failing = AuthClientContext::new(
            Arc::new(adapter(&rt, Arc::new(RejectingProvider), Duration::from_secs(5))),
            "",
        );
        let err = failing.generate_oauth_token(None).err().unwrap();
        assert!(err.to_string().contains("credential acquisition failed"));
    }
}
