//! Shared dependencies, error types, and telemetry wiring for the CLI.

use std::fmt::{self, Display, Formatter};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use cpmgmt_core::{
    CommandDispatcher, Connector, FileFingerprintStore, FingerprintStore, SessionError,
};
use cpmgmt_transport::{ClientOptions, WebApiConnector};
use reqwest::{Client, Url};
use serde::Serialize;

use crate::cli::Settings;

const TELEMETRY_ENDPOINT_ENV: &str = "CPMGMT_TELEMETRY_ENDPOINT";

/// CLI-level error type to distinguish validation from operational failures.
#[derive(Debug)]
pub(crate) enum CliError {
    Validation(String),
    Failure(anyhow::Error),
}

/// Convenience alias for functions returning a `CliError`.
pub(crate) type CliResult<T> = Result<T, CliError>;

impl CliError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn failure(error: impl Into<anyhow::Error>) -> Self {
        Self::Failure(error.into())
    }

    pub(crate) const fn exit_code(&self) -> i32 {
        match self {
            Self::Validation(_) => 2,
            Self::Failure(_) => 3,
        }
    }

    pub(crate) fn display_message(&self) -> String {
        match self {
            Self::Validation(message) => message.clone(),
            Self::Failure(error) => format!("{error:#}"),
        }
    }
}

impl Display for CliError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str("cli error")
    }
}

impl std::error::Error for CliError {}

impl From<SessionError> for CliError {
    fn from(err: SessionError) -> Self {
        if is_input_problem(&err) {
            Self::Validation(err.to_string())
        } else {
            Self::Failure(anyhow::Error::msg(err.to_string()))
        }
    }
}

/// Errors the caller can fix by changing the invocation.
const fn is_input_problem(err: &SessionError) -> bool {
    matches!(
        err,
        SessionError::InvalidPayload { .. }
            | SessionError::MissingSessionData
            | SessionError::InvalidSessionData { .. }
            | SessionError::MissingFingerprint { .. }
    )
}

/// Dependencies constructed from resolved settings.
#[derive(Clone)]
pub(crate) struct CliDependencies {
    pub(crate) dispatcher: CommandDispatcher,
}

impl CliDependencies {
    pub(crate) fn new(connector: Arc<dyn Connector>, store: Arc<dyn FingerprintStore>) -> Self {
        Self {
            dispatcher: CommandDispatcher::new(connector, store),
        }
    }

    /// Web API transport tagged with `trace_id` and a file-backed
    /// fingerprint store.
    pub(crate) fn from_settings(settings: &Settings, trace_id: &str) -> Self {
        let connector = WebApiConnector::new(ClientOptions {
            timeout: settings.timeout,
            request_id: Some(trace_id.to_string()),
        });
        let store = FileFingerprintStore::new(settings.fingerprint_store.clone());
        Self::new(Arc::new(connector), Arc::new(store))
    }
}

/// Telemetry emitter used to forward CLI outcomes.
#[derive(Clone)]
pub(crate) struct TelemetryEmitter {
    pub(crate) client: Client,
    pub(crate) endpoint: Url,
}

impl TelemetryEmitter {
    #[must_use]
    pub(crate) fn from_env() -> Option<Self> {
        let endpoint = std::env::var(TELEMETRY_ENDPOINT_ENV).ok()?;
        let endpoint = endpoint.parse().ok()?;
        let client = Client::builder()
            .timeout(Duration::from_secs(2))
            .build()
            .ok()?;
        Some(Self { client, endpoint })
    }

    pub(crate) async fn emit(
        &self,
        trace_id: &str,
        command: &str,
        outcome: &str,
        exit_code: i32,
        message: Option<&str>,
    ) {
        let event = TelemetryEvent {
            command,
            outcome,
            trace_id,
            exit_code,
            message,
            timestamp_ms: timestamp_now_ms(),
        };

        if let Err(err) = self
            .client
            .post(self.endpoint.clone())
            .json(&event)
            .send()
            .await
        {
            tracing::debug!(error = %err, "telemetry emit failed");
        }
    }
}

#[derive(Serialize)]
struct TelemetryEvent<'a> {
    command: &'a str,
    outcome: &'a str,
    trace_id: &'a str,
    exit_code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
    timestamp_ms: u64,
}

/// Millisecond timestamp helper for telemetry.
#[must_use]
pub(crate) fn timestamp_now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use cpmgmt_core::StoreError;
    use httpmock::MockServer;
    use httpmock::prelude::*;

    #[test]
    fn input_problems_map_to_validation_exit_code() {
        let cases = [
            SessionError::InvalidPayload {
                reason: "expected a mapping".into(),
            },
            SessionError::MissingSessionData,
            SessionError::InvalidSessionData {
                reason: "not structured data".into(),
            },
            SessionError::MissingFingerprint {
                host: "192.0.2.10".into(),
            },
        ];
        for err in cases {
            let message = err.to_string();
            let cli = CliError::from(err);
            assert_eq!(cli.exit_code(), 2);
            assert_eq!(cli.display_message(), message);
        }
    }

    #[test]
    fn operational_failures_map_to_failure_exit_code() {
        let cases = [
            SessionError::UntrustedServer {
                host: "192.0.2.10".into(),
                live: "AA:BB".into(),
            },
            SessionError::LoginFailed {
                message: "bad credentials".into(),
            },
            SessionError::Store(StoreError::Poisoned),
        ];
        for err in cases {
            let message = err.to_string();
            let cli = CliError::from(err);
            assert_eq!(cli.exit_code(), 3);
            assert_eq!(cli.display_message(), message);
        }
    }

    #[test]
    fn timestamp_is_after_epoch() {
        assert!(timestamp_now_ms() > 0);
    }

    #[tokio::test]
    async fn telemetry_emitter_emits_event() -> Result<()> {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/telemetry")
                .header("content-type", "application/json");
            then.status(200);
        });

        let emitter = TelemetryEmitter {
            client: Client::new(),
            endpoint: format!("{}/telemetry", server.base_url())
                .parse()
                .map_err(|_| anyhow::anyhow!("invalid URL"))?,
        };

        emitter
            .emit("trace", "publish", "error", 3, Some("remote failure"))
            .await;

        mock.assert();
        Ok(())
    }

    #[tokio::test]
    async fn telemetry_failures_are_swallowed() -> Result<()> {
        let emitter = TelemetryEmitter {
            client: Client::new(),
            endpoint: "http://127.0.0.1:9/telemetry".parse()?,
        };
        emitter.emit("trace", "login", "success", 0, None).await;
        Ok(())
    }
}
