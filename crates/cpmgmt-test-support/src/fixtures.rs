//! Canned session tokens and payloads.

use cpmgmt_core::{DEFAULT_API_CONTEXT, Fingerprint, SessionToken};

/// Fingerprint the default mock server presents.
pub const SERVER_FINGERPRINT: &str = "7D:FE:DE:01:9A:44:C3:10:55:AB:0E:22:91:6F:3C:B8:70:0D:E4:19";

/// A fingerprint that matches no mock server.
pub const FOREIGN_FINGERPRINT: &str = "00:11:22:33:44:55:66:77:88:99:AA:BB:CC:DD:EE:FF:00:11:22:33";

/// Host used by fixtures.
pub const MANAGEMENT_HOST: &str = "192.0.2.10";

/// Session token for [`MANAGEMENT_HOST`] pinned to [`SERVER_FINGERPRINT`].
#[must_use]
pub fn session_token() -> SessionToken {
    SessionToken {
        server_host: MANAGEMENT_HOST.to_string(),
        server_port: 443,
        domain: None,
        session_id: "fixture-sid".to_string(),
        fingerprint: Fingerprint::new(SERVER_FINGERPRINT),
        api_context: DEFAULT_API_CONTEXT.to_string(),
        api_version: None,
    }
}

/// Encoded form of [`session_token`] wrapped the way results are echoed
/// back by automation tools.
#[must_use]
pub fn echoed_session_data() -> String {
    serde_json::json!({ "changed": false, "response": session_token().to_value() }).to_string()
}

/// Single-quoted login payload for [`MANAGEMENT_HOST`].
#[must_use]
pub fn login_payload() -> String {
    format!("{{'username': 'admin', 'password': 'secret', 'management': '{MANAGEMENT_HOST}', 'domain': None}}")
}
