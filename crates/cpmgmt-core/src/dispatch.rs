//! Login and command dispatch.
//!
//! # Design
//! - One invocation walks `payload normalized -> trust verified ->
//!   eligibility checked -> dispatched -> succeeded | failed`. Each step
//!   hands an immutable value to the next; the final [`Outcome`] is built
//!   once, at the end.
//! - Login is its own path: it creates a session instead of using one and
//!   is never subject to dry-run eligibility.
//! - Any fatal error raised after trust is established unwinds the remote
//!   session (discard, then logout) before it is returned. The dry-run skip
//!   path discards only, so the session stays usable.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::api::{ConnectionTarget, Connector, DEFAULT_SESSION_TIMEOUT_SECS, LoginRequest};
use crate::error::{SessionError, SessionResult};
use crate::fingerprint::Fingerprint;
use crate::payload::parse_payload;
use crate::policy::{self, DispatchPlan, RunMode};
use crate::store::FingerprintStore;
use crate::token::{DEFAULT_API_CONTEXT, DEFAULT_PORT, SessionToken};
use crate::trust::{TrustVerifier, TrustedConnection};
use crate::unwind::FailureUnwinder;

/// Management host used by login when the payload names none.
pub const DEFAULT_MANAGEMENT_HOST: &str = "127.0.0.1";

/// Inputs of a `login` invocation.
#[derive(Debug, Clone)]
pub struct LoginInvocation {
    /// Textual payload with credentials and connection details.
    pub payload: Option<String>,
    /// Fingerprint the caller chooses to trust for the management host.
    pub fingerprint: Option<Fingerprint>,
    /// Web API context to record in the session.
    pub api_context: String,
    /// Web API version to record in the session.
    pub api_version: Option<String>,
}

impl LoginInvocation {
    /// Login with `payload` on the default context.
    #[must_use]
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            payload: Some(payload.into()),
            fingerprint: None,
            api_context: DEFAULT_API_CONTEXT.to_string(),
            api_version: None,
        }
    }
}

/// Inputs of any invocation other than `login`.
#[derive(Debug, Clone)]
pub struct CommandInvocation {
    /// Remote command name, e.g. `add-host`.
    pub command: String,
    /// Textual payload; absent means an empty mapping.
    pub payload: Option<String>,
    /// Encoded session token from a prior login.
    pub session_data: Option<String>,
    /// Fingerprint overriding the one recorded in the session token.
    pub fingerprint: Option<Fingerprint>,
    /// API version overriding the one recorded in the session token.
    pub api_version: Option<String>,
    /// Whether effects are committed.
    pub mode: RunMode,
}

impl CommandInvocation {
    /// Live invocation of `command` without payload or session data.
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            payload: None,
            session_data: None,
            fingerprint: None,
            api_version: None,
            mode: RunMode::Live,
        }
    }
}

/// Successful result of an invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outcome {
    /// Response data, or the session token for login.
    pub response: Value,
    /// Whether the invocation changed server state.
    pub changed: bool,
}

/// Runs login and command invocations against the management server.
#[derive(Clone)]
pub struct CommandDispatcher {
    connector: Arc<dyn Connector>,
    verifier: TrustVerifier,
}

impl CommandDispatcher {
    /// Dispatcher creating transports through `connector` and keeping
    /// trusted fingerprints in `store`.
    #[must_use]
    pub fn new(connector: Arc<dyn Connector>, store: Arc<dyn FingerprintStore>) -> Self {
        Self {
            connector,
            verifier: TrustVerifier::new(store),
        }
    }

    /// Verify the server, log in, and return the new session token as the
    /// response. `changed` is always `false`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidPayload`] for missing or malformed
    /// credentials, trust failures from [`TrustVerifier::verify`], and
    /// [`SessionError::LoginFailed`] when the server rejects the login.
    pub async fn login(&self, invocation: &LoginInvocation) -> SessionResult<Outcome> {
        let payload = invocation
            .payload
            .as_deref()
            .map(parse_payload)
            .transpose()?
            .ok_or_else(|| SessionError::invalid_payload("login requires credentials"))?;
        let details = LoginDetails::from_payload(&payload)?;
        debug!(host = %details.host, "login payload normalized");

        let target = ConnectionTarget {
            host: details.host,
            port: details.port,
            context: invocation.api_context.clone(),
            api_version: invocation.api_version.clone(),
        };
        let connection = self
            .trusted_connection(&target, invocation.fingerprint.as_ref())
            .await?;

        let reply = connection.login(&details.request).await?;
        if !reply.success {
            return Err(SessionError::LoginFailed {
                message: reply
                    .error_message
                    .unwrap_or_else(|| "server rejected the credentials".to_string()),
            });
        }
        let session_id = reply
            .sid
            .filter(|sid| !sid.is_empty())
            .ok_or_else(|| SessionError::LoginFailed {
                message: "server returned no session id".to_string(),
            })?;

        let token = SessionToken {
            server_host: target.host,
            server_port: target.port,
            domain: details.request.domain,
            session_id,
            fingerprint: connection.fingerprint().clone(),
            api_context: target.context,
            api_version: target.api_version,
        };
        info!(host = %token.server_host, port = token.server_port, "session established");
        Ok(Outcome {
            response: token.to_value(),
            changed: false,
        })
    }

    /// Run a command inside the session carried by `invocation`.
    ///
    /// # Errors
    ///
    /// Returns any [`SessionError`]. Fatal errors raised after trust is
    /// established are returned only after the session was discarded and
    /// logged out;
    /// [`SessionError::CheckModeUnavailable`] is returned after a discard
    /// and leaves the session usable.
    pub async fn run(&self, invocation: &CommandInvocation) -> SessionResult<Outcome> {
        let command = invocation.command.as_str();
        let payload = match invocation.payload.as_deref() {
            Some(text) => parse_payload(text)?,
            None => policy::empty_payload(),
        };
        debug!(command, "payload normalized");

        let token = SessionToken::decode(invocation.session_data.as_deref())?;
        let target = token.target(invocation.api_version.as_deref());
        let candidate = invocation.fingerprint.as_ref().unwrap_or(&token.fingerprint);
        let connection = self.trusted_connection(&target, Some(candidate)).await?;
        debug!(command, host = %target.host, "trust verified");

        let outcome = execute(
            &connection,
            &token.session_id,
            command,
            payload,
            invocation.mode,
        )
        .await;
        if let Some(err) = outcome.as_ref().err().filter(|err| err.is_fatal()) {
            warn!(command, host = %target.host, error = %err, "unwinding session after failure");
            FailureUnwinder::new(&connection, &token.session_id)
                .discard_and_logout()
                .await;
        }
        outcome
    }

    async fn trusted_connection(
        &self,
        target: &ConnectionTarget,
        supplied: Option<&Fingerprint>,
    ) -> SessionResult<TrustedConnection> {
        let api = self
            .connector
            .connect(target)
            .map_err(|source| SessionError::transport("connect", source))?;
        self.verifier.verify(api, target, supplied).await
    }
}

async fn execute(
    connection: &TrustedConnection,
    session_id: &str,
    requested: &str,
    payload: Value,
    mode: RunMode,
) -> SessionResult<Outcome> {
    let (command, payload) = match policy::plan(requested, payload, mode)? {
        DispatchPlan::Run { command, payload } => (command, payload),
        DispatchPlan::Skip { publish } => {
            info!(command = requested, "command unavailable in check mode; discarding");
            FailureUnwinder::new(connection, session_id)
                .discard_only()
                .await;
            return Err(SessionError::CheckModeUnavailable {
                command: requested.to_string(),
                publish,
            });
        }
    };
    debug!(command = %command, requested, "eligibility checked");

    info!(command = %command, dry_run = mode.is_dry_run(), "dispatching command");
    let result = connection.call(session_id, &command, &payload).await?;
    if !result.success {
        return Err(SessionError::RemoteCommandFailed {
            payload: payload.to_string(),
            error_message: result.error_message,
            command,
        });
    }

    let changed = policy::is_change(&command, result.success, mode);
    debug!(command = %command, changed, "command succeeded");
    Ok(Outcome {
        response: result.data,
        changed,
    })
}

struct LoginDetails {
    host: String,
    port: u16,
    request: LoginRequest,
}

impl LoginDetails {
    fn from_payload(payload: &Value) -> SessionResult<Self> {
        let user = text_field(payload, &["username", "user"])
            .ok_or_else(|| SessionError::invalid_payload("login requires 'username' or 'user'"))?;
        let password = text_field(payload, &["password", "pass"])
            .ok_or_else(|| SessionError::invalid_payload("login requires 'password' or 'pass'"))?;
        let host = text_field(payload, &["management"])
            .unwrap_or_else(|| DEFAULT_MANAGEMENT_HOST.to_string());
        let port = match payload.get("port").filter(|value| !value.is_null()) {
            None => DEFAULT_PORT,
            Some(value) => integer_field(value)
                .filter(|port| *port > 0)
                .and_then(|port| u16::try_from(port).ok())
                .ok_or_else(|| {
                    SessionError::invalid_payload(format!("'port' must be a valid port, got {value}"))
                })?,
        };
        let session_timeout = match payload.get("session-timeout").filter(|value| !value.is_null()) {
            None => DEFAULT_SESSION_TIMEOUT_SECS,
            Some(value) => integer_field(value)
                .and_then(|secs| u64::try_from(secs).ok())
                .ok_or_else(|| {
                    SessionError::invalid_payload(format!(
                        "'session-timeout' must be a number of seconds, got {value}"
                    ))
                })?,
        };

        Ok(Self {
            host,
            port,
            request: LoginRequest {
                user,
                password,
                domain: text_field(payload, &["domain"]),
                session_timeout,
            },
        })
    }
}

fn text_field(payload: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| payload.get(*key))
        .find_map(|value| match value {
            Value::String(text) => Some(text.clone()),
            Value::Number(number) => Some(number.to_string()),
            _ => None,
        })
}

fn integer_field(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}
