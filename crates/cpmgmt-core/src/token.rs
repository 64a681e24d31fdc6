//! Session token codec.
//!
//! # Design
//! - A token is immutable: login produces one, every later invocation only
//!   decodes it. Nothing here mutates or refreshes a session.
//! - The wire shape is `{url, domain, sid, fingerprint, context, api_version}`
//!   so tokens stay readable by tooling that already echoes them around.
//! - `url` folds host and port together; [`ServerAddress::parse`] is the one
//!   place that splits it back apart.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::ConnectionTarget;
use crate::error::{SessionError, SessionResult};
use crate::fingerprint::Fingerprint;
use crate::payload::normalize_payload;

/// Port used when a stored URL carries no usable port.
pub const DEFAULT_PORT: u16 = 443;

/// API context used when none is configured.
pub const DEFAULT_API_CONTEXT: &str = "web_api";

/// Host and port recovered from a stored server URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerAddress {
    /// Host name or address, without scheme, path, or port.
    pub host: String,
    /// TCP port; [`DEFAULT_PORT`] when absent or not a positive integer.
    pub port: u16,
}

impl ServerAddress {
    /// Decompose a stored URL.
    ///
    /// The scheme is dropped by splitting on `//`, the path by keeping
    /// everything before the first `/`, and the remainder is split on `:`
    /// into host and port.
    #[must_use]
    pub fn parse(url: &str) -> Self {
        let remainder = if url.contains("//") {
            url.split("//").nth(1).unwrap_or_default()
        } else {
            url
        };
        let authority = remainder.split('/').next().unwrap_or_default();
        let mut segments = authority.split(':');
        let host = segments.next().unwrap_or_default().to_string();
        let port = segments
            .next()
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .filter(|port| *port > 0)
            .and_then(|port| u16::try_from(port).ok())
            .unwrap_or(DEFAULT_PORT);
        Self { host, port }
    }

    /// The `host:port` form stored in tokens.
    #[must_use]
    pub fn to_url(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Authenticated session state carried by the caller between invocations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionToken {
    /// Management server host.
    pub server_host: String,
    /// Management server port.
    pub server_port: u16,
    /// Domain the session is logged in to, for multi-domain servers.
    pub domain: Option<String>,
    /// Session identifier issued by the server at login.
    pub session_id: String,
    /// Fingerprint that was verified when the session was established.
    pub fingerprint: Fingerprint,
    /// Web API context path segment.
    pub api_context: String,
    /// Web API version pinned for the session.
    pub api_version: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct TokenWire {
    url: String,
    #[serde(default)]
    domain: Option<String>,
    sid: String,
    fingerprint: Fingerprint,
    #[serde(default = "default_context")]
    context: String,
    #[serde(default)]
    api_version: Option<String>,
}

fn default_context() -> String {
    DEFAULT_API_CONTEXT.to_string()
}

impl SessionToken {
    /// Structured form of the token, suitable for embedding in a response.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let wire = TokenWire {
            url: self.address().to_url(),
            domain: self.domain.clone(),
            sid: self.session_id.clone(),
            fingerprint: self.fingerprint.clone(),
            context: self.api_context.clone(),
            api_version: self.api_version.clone(),
        };
        serde_json::to_value(wire).unwrap_or(Value::Null)
    }

    /// Opaque string form handed back to the caller.
    #[must_use]
    pub fn encode(&self) -> String {
        self.to_value().to_string()
    }

    /// Decode session data produced by [`SessionToken::encode`] or echoed
    /// back inside a `{"response": ...}` result wrapper.
    ///
    /// # Errors
    ///
    /// [`SessionError::MissingSessionData`] when `data` is absent or blank,
    /// [`SessionError::InvalidSessionData`] when it is not a token.
    pub fn decode(data: Option<&str>) -> SessionResult<Self> {
        let text = data
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .ok_or(SessionError::MissingSessionData)?;

        let mut value = parse_structured(text).ok_or_else(|| invalid("not structured data"))?;
        if let Some(inner) = value.get_mut("response").map(Value::take) {
            value = inner;
        }
        if let Some(nested) = value.as_str().map(str::to_owned) {
            value = parse_structured(&nested)
                .ok_or_else(|| invalid("response field is not structured data"))?;
        }

        let wire: TokenWire =
            serde_json::from_value(value).map_err(|err| invalid(err.to_string()))?;
        let address = ServerAddress::parse(&wire.url);
        Ok(Self {
            server_host: address.host,
            server_port: address.port,
            domain: wire.domain,
            session_id: wire.sid,
            fingerprint: wire.fingerprint,
            api_context: wire.context,
            api_version: wire.api_version,
        })
    }

    /// Host and port of the server this token belongs to.
    #[must_use]
    pub fn address(&self) -> ServerAddress {
        ServerAddress {
            host: self.server_host.clone(),
            port: self.server_port,
        }
    }

    /// Connection target for this session, optionally overriding the
    /// stored API version for a single invocation.
    #[must_use]
    pub fn target(&self, api_version_override: Option<&str>) -> ConnectionTarget {
        ConnectionTarget {
            host: self.server_host.clone(),
            port: self.server_port,
            context: self.api_context.clone(),
            api_version: api_version_override
                .map(str::to_string)
                .or_else(|| self.api_version.clone()),
        }
    }
}

fn parse_structured(text: &str) -> Option<Value> {
    serde_json::from_str(text)
        .or_else(|_| serde_json::from_str(&normalize_payload(text)))
        .ok()
}

fn invalid(reason: impl Into<String>) -> SessionError {
    SessionError::InvalidSessionData {
        reason: reason.into(),
    }
}
