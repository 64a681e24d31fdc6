//! Transport collaborator contract.
//!
//! The session layer never speaks HTTP itself. It consumes the three
//! capabilities of [`ManagementApi`] and obtains an instance per target from
//! a [`Connector`].

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::error::TransportError;
use crate::fingerprint::Fingerprint;
use crate::token::{DEFAULT_API_CONTEXT, DEFAULT_PORT};

/// Session timeout forwarded with login when the caller gives none.
pub const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 600;

/// Remote Web API endpoint an invocation talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionTarget {
    /// Management server host.
    pub host: String,
    /// Management server port.
    pub port: u16,
    /// Web API context path segment.
    pub context: String,
    /// Optional API version path segment.
    pub api_version: Option<String>,
}

impl ConnectionTarget {
    /// Target on the default port and context.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            context: DEFAULT_API_CONTEXT.to_string(),
            api_version: None,
        }
    }

    /// Path of `command` below the server root, e.g. `/web_api/v1.8/show-hosts`.
    #[must_use]
    pub fn command_path(&self, command: &str) -> String {
        let context = self.context.trim_matches('/');
        match self.api_version.as_deref().filter(|v| !v.is_empty()) {
            Some(version) => format!("/{context}/v{version}/{command}"),
            None => format!("/{context}/{command}"),
        }
    }

    /// `host:port` authority used in URLs and log fields.
    #[must_use]
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Credentials and options sent with the `login` call.
#[derive(Clone, Serialize)]
pub struct LoginRequest {
    /// Administrator name.
    pub user: String,
    /// Administrator password.
    pub password: String,
    /// Domain to log in to on multi-domain servers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// Idle timeout requested for the session, in seconds.
    #[serde(rename = "session-timeout")]
    pub session_timeout: u64,
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("domain", &self.domain)
            .field("session_timeout", &self.session_timeout)
            .finish()
    }
}

/// Server answer to `login`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginReply {
    /// Whether the server accepted the credentials.
    pub success: bool,
    /// Session identifier issued on success.
    pub sid: Option<String>,
    /// Server-provided reason on failure.
    pub error_message: Option<String>,
}

/// Authentication carried by every call made inside an established session.
#[derive(Clone)]
pub struct SessionAuth {
    /// Session identifier sent as `X-chkp-sid`.
    pub session_id: String,
    /// Verified server fingerprint the channel is pinned to.
    pub fingerprint: Fingerprint,
}

impl fmt::Debug for SessionAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionAuth")
            .field("session_id", &"<redacted>")
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}

/// Result of a remote command. `changed` is never part of it; the
/// dispatcher derives that.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandResult {
    /// Whether the server reported success.
    pub success: bool,
    /// Response body.
    pub data: Value,
    /// Server-provided reason on failure.
    pub error_message: Option<String>,
}

impl CommandResult {
    /// Successful result carrying `data`.
    #[must_use]
    pub const fn ok(data: Value) -> Self {
        Self {
            success: true,
            data,
            error_message: None,
        }
    }

    /// Failed result with the server's reason.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: Value::Null,
            error_message: Some(message.into()),
        }
    }
}

/// Capabilities consumed from the remote management API.
#[async_trait]
pub trait ManagementApi: Send + Sync {
    /// Fingerprint of the certificate the server presents right now.
    async fn server_fingerprint(&self) -> Result<Fingerprint, TransportError>;

    /// Open a session over a channel pinned to `pinned`.
    async fn login(
        &self,
        pinned: &Fingerprint,
        request: &LoginRequest,
    ) -> Result<LoginReply, TransportError>;

    /// Run `command` with `payload` inside the session described by `auth`.
    async fn api_call(
        &self,
        auth: &SessionAuth,
        command: &str,
        payload: &Value,
    ) -> Result<CommandResult, TransportError>;
}

/// Builds a [`ManagementApi`] for a target.
pub trait Connector: Send + Sync {
    /// Prepare a client for `target`. No network traffic happens here.
    ///
    /// # Errors
    ///
    /// Returns an error when the client cannot be constructed.
    fn connect(&self, target: &ConnectionTarget) -> Result<Box<dyn ManagementApi>, TransportError>;
}
