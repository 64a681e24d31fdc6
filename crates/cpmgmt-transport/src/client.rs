//! Web API client over reqwest.
//!
//! Every request made after trust is established goes through a client whose
//! TLS configuration is pinned to the verified fingerprint. Requests are JSON
//! `POST`s to `https://{host}:{port}/{context}/[v{version}/]{command}`.

use std::time::Duration;

use async_trait::async_trait;
use cpmgmt_core::{
    CommandResult, ConnectionTarget, Connector, Fingerprint, LoginReply, LoginRequest,
    ManagementApi, SessionAuth, TransportError,
};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::tls::{FingerprintVerifier, probe_fingerprint};

pub(crate) const HEADER_SESSION_ID: &str = "X-chkp-sid";
pub(crate) const HEADER_REQUEST_ID: &str = "x-request-id";

/// Transport settings shared by every client a connector creates.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Per-request timeout, also applied to the fingerprint handshake.
    pub timeout: Duration,
    /// Trace identifier sent as `x-request-id`.
    pub request_id: Option<String>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            request_id: None,
        }
    }
}

/// [`Connector`] creating [`WebApiClient`]s.
#[derive(Debug, Clone, Default)]
pub struct WebApiConnector {
    options: ClientOptions,
}

impl WebApiConnector {
    /// Connector applying `options` to every client.
    #[must_use]
    pub const fn new(options: ClientOptions) -> Self {
        Self { options }
    }
}

impl Connector for WebApiConnector {
    fn connect(&self, target: &ConnectionTarget) -> Result<Box<dyn ManagementApi>, TransportError> {
        Ok(Box::new(WebApiClient::new(target, self.options.clone())?))
    }
}

/// HTTPS client for one management server.
#[derive(Debug, Clone)]
pub struct WebApiClient {
    target: ConnectionTarget,
    options: ClientOptions,
    base_url: Url,
}

impl WebApiClient {
    /// Client for `target`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Client`] when the target does not form a
    /// valid URL.
    pub fn new(target: &ConnectionTarget, options: ClientOptions) -> Result<Self, TransportError> {
        let base_url = Url::parse(&format!("https://{}", target.authority())).map_err(|err| {
            TransportError::Client {
                message: format!("invalid server address '{}': {err}", target.authority()),
            }
        })?;
        Ok(Self {
            target: target.clone(),
            options,
            base_url,
        })
    }

    #[cfg(test)]
    fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = base_url;
        self
    }

    fn endpoint(&self, command: &str) -> Result<Url, TransportError> {
        self.base_url
            .join(&self.target.command_path(command))
            .map_err(|err| TransportError::Client {
                message: format!("invalid endpoint for '{command}': {err}"),
            })
    }

    fn pinned_client(&self, fingerprint: &Fingerprint) -> Result<Client, TransportError> {
        let tls = FingerprintVerifier::client_config(FingerprintVerifier::pinned(
            fingerprint.clone(),
        ))?;

        let mut default_headers = HeaderMap::new();
        if let Some(request_id) = &self.options.request_id {
            let value = HeaderValue::from_str(request_id).map_err(|_| TransportError::Client {
                message: "trace identifier contains invalid characters".to_string(),
            })?;
            default_headers.insert(HEADER_REQUEST_ID, value);
        }

        Client::builder()
            .use_preconfigured_tls(tls)
            .timeout(self.options.timeout)
            .default_headers(default_headers)
            .build()
            .map_err(|err| TransportError::Client {
                message: format!("failed to build HTTP client: {err}"),
            })
    }

    async fn post<B: Serialize + Sync>(
        &self,
        fingerprint: &Fingerprint,
        command: &str,
        session_id: Option<&str>,
        body: &B,
    ) -> Result<(StatusCode, Value), TransportError> {
        let url = self.endpoint(command)?;
        let request_error = |message: String| TransportError::Request {
            endpoint: url.to_string(),
            message,
        };

        let mut request = self
            .pinned_client(fingerprint)?
            .post(url.clone())
            .json(body);
        if let Some(session_id) = session_id {
            request = request.header(HEADER_SESSION_ID, session_id);
        }

        let response = request
            .send()
            .await
            .map_err(|err| request_error(err.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| request_error(err.to_string()))?;
        debug!(command, status = status.as_u16(), "web api call completed");

        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            match serde_json::from_str(&text) {
                Ok(value) => value,
                Err(_) if !status.is_success() => Value::String(text),
                Err(err) => {
                    return Err(TransportError::Decode {
                        endpoint: url.to_string(),
                        message: err.to_string(),
                    });
                }
            }
        };
        Ok((status, body))
    }
}

fn error_message(status: StatusCode, body: &Value) -> String {
    body.get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| body.as_str().map(str::to_string))
        .unwrap_or_else(|| format!("request failed with status {status}"))
}

#[async_trait]
impl ManagementApi for WebApiClient {
    async fn server_fingerprint(&self) -> Result<Fingerprint, TransportError> {
        probe_fingerprint(&self.target.host, self.target.port, self.options.timeout).await
    }

    async fn login(
        &self,
        pinned: &Fingerprint,
        request: &LoginRequest,
    ) -> Result<LoginReply, TransportError> {
        let (status, body) = self.post(pinned, "login", None, request).await?;
        if !status.is_success() {
            return Ok(LoginReply {
                success: false,
                sid: None,
                error_message: Some(error_message(status, &body)),
            });
        }
        Ok(LoginReply {
            success: true,
            sid: body.get("sid").and_then(Value::as_str).map(str::to_string),
            error_message: None,
        })
    }

    async fn api_call(
        &self,
        auth: &SessionAuth,
        command: &str,
        payload: &Value,
    ) -> Result<CommandResult, TransportError> {
        let (status, body) = self
            .post(&auth.fingerprint, command, Some(&auth.session_id), payload)
            .await?;
        if status.is_success() {
            Ok(CommandResult::ok(body))
        } else {
            Ok(CommandResult {
                success: false,
                error_message: Some(error_message(status, &body)),
                data: body,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use httpmock::MockServer;
    use httpmock::prelude::*;
    use serde_json::json;

    fn client(server: &MockServer, target: ConnectionTarget) -> Result<WebApiClient> {
        let options = ClientOptions {
            timeout: Duration::from_secs(5),
            request_id: Some("trace-1".into()),
        };
        Ok(WebApiClient::new(&target, options)?.with_base_url(server.base_url().parse()?))
    }

    fn auth() -> SessionAuth {
        SessionAuth {
            session_id: "sid-7".into(),
            fingerprint: Fingerprint::new("AA:BB"),
        }
    }

    #[test]
    fn new_builds_https_base_url() -> Result<()> {
        let mut target = ConnectionTarget::new("mgmt.example.com");
        target.port = 4434;
        let client = WebApiClient::new(&target, ClientOptions::default())?;
        assert_eq!(
            client.endpoint("login")?.as_str(),
            "https://mgmt.example.com:4434/web_api/login"
        );
        Ok(())
    }

    #[tokio::test]
    async fn login_posts_credentials_and_reads_sid() -> Result<()> {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/web_api/v1.8/login")
                .header(HEADER_REQUEST_ID, "trace-1")
                .json_body(json!({"user": "admin", "password": "pw", "session-timeout": 600}));
            then.status(200).json_body(json!({"sid": "abc", "api-server-version": "1.8"}));
        });

        let mut target = ConnectionTarget::new("mgmt");
        target.api_version = Some("1.8".into());
        let request = LoginRequest {
            user: "admin".into(),
            password: "pw".into(),
            domain: None,
            session_timeout: 600,
        };
        let reply = client(&server, target)?
            .login(&Fingerprint::new("AA"), &request)
            .await?;

        mock.assert();
        assert!(reply.success);
        assert_eq!(reply.sid.as_deref(), Some("abc"));
        Ok(())
    }

    #[tokio::test]
    async fn rejected_login_reports_server_message() -> Result<()> {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST).path("/web_api/login");
            then.status(400)
                .json_body(json!({"code": "err_login_failed", "message": "Authentication to server failed."}));
        });

        let request = LoginRequest {
            user: "admin".into(),
            password: "bad".into(),
            domain: Some("Global".into()),
            session_timeout: 600,
        };
        let reply = client(&server, ConnectionTarget::new("mgmt"))?
            .login(&Fingerprint::new("AA"), &request)
            .await?;

        assert!(!reply.success);
        assert_eq!(reply.sid, None);
        assert_eq!(
            reply.error_message.as_deref(),
            Some("Authentication to server failed.")
        );
        Ok(())
    }

    #[tokio::test]
    async fn api_call_sends_session_header_and_payload() -> Result<()> {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/web_api/add-host")
                .header("x-chkp-sid", "sid-7")
                .json_body(json!({"name": "h", "ip-address": "1.2.3.4"}));
            then.status(200).json_body(json!({"uid": "u-1", "name": "h"}));
        });

        let result = client(&server, ConnectionTarget::new("mgmt"))?
            .api_call(&auth(), "add-host", &json!({"name": "h", "ip-address": "1.2.3.4"}))
            .await?;

        mock.assert();
        assert!(result.success);
        assert_eq!(result.data["uid"], "u-1");
        assert_eq!(result.error_message, None);
        Ok(())
    }

    #[tokio::test]
    async fn api_call_error_status_is_unsuccessful_result() -> Result<()> {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST).path("/web_api/set-host");
            then.status(404)
                .json_body(json!({"code": "generic_err_object_not_found", "message": "Requested object [h] not found"}));
        });

        let result = client(&server, ConnectionTarget::new("mgmt"))?
            .api_call(&auth(), "set-host", &json!({"name": "h"}))
            .await?;

        assert!(!result.success);
        assert_eq!(
            result.error_message.as_deref(),
            Some("Requested object [h] not found")
        );
        Ok(())
    }

    #[tokio::test]
    async fn api_call_plain_text_error_is_kept() -> Result<()> {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST).path("/web_api/discard");
            then.status(500).body("internal failure");
        });

        let result = client(&server, ConnectionTarget::new("mgmt"))?
            .api_call(&auth(), "discard", &json!({}))
            .await?;

        assert!(!result.success);
        assert_eq!(result.error_message.as_deref(), Some("internal failure"));
        Ok(())
    }

    #[tokio::test]
    async fn undecodable_success_body_is_decode_error() -> Result<()> {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST).path("/web_api/show-hosts");
            then.status(200).body("<html>not json</html>");
        });

        let result = client(&server, ConnectionTarget::new("mgmt"))?
            .api_call(&auth(), "show-hosts", &json!({}))
            .await;
        assert!(matches!(result, Err(TransportError::Decode { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn unreachable_server_is_request_error() -> Result<()> {
        let target = ConnectionTarget::new("127.0.0.1");
        let options = ClientOptions {
            timeout: Duration::from_secs(2),
            request_id: None,
        };
        let client = WebApiClient::new(&target, options)?
            .with_base_url("http://127.0.0.1:9".parse()?);
        let result = client.api_call(&auth(), "show-hosts", &json!({})).await;
        assert!(matches!(result, Err(TransportError::Request { .. })));
        Ok(())
    }
}
