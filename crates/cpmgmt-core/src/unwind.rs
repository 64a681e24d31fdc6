//! Best-effort cleanup of a remote session after a fatal condition.

use tracing::{debug, warn};

use crate::policy::empty_payload;
use crate::trust::TrustedConnection;

const DISCARD_COMMAND: &str = "discard";
const LOGOUT_COMMAND: &str = "logout";

/// Leaves an established session clean before an error is reported.
///
/// Cleanup never fails: a call that errors or reports `success = false`
/// is logged and the next step still runs. The caller reports the
/// original error afterwards.
pub struct FailureUnwinder<'a> {
    connection: &'a TrustedConnection,
    session_id: &'a str,
}

impl<'a> FailureUnwinder<'a> {
    /// Unwinder for `session_id` on a verified connection.
    #[must_use]
    pub const fn new(connection: &'a TrustedConnection, session_id: &'a str) -> Self {
        Self {
            connection,
            session_id,
        }
    }

    /// Discard pending changes, then invalidate the session.
    pub async fn discard_and_logout(&self) {
        self.best_effort(DISCARD_COMMAND).await;
        self.best_effort(LOGOUT_COMMAND).await;
    }

    /// Discard pending changes and keep the session usable.
    pub async fn discard_only(&self) {
        self.best_effort(DISCARD_COMMAND).await;
    }

    async fn best_effort(&self, command: &str) {
        let host = self.connection.target().host.as_str();
        match self
            .connection
            .call(self.session_id, command, &empty_payload())
            .await
        {
            Ok(result) if result.success => debug!(host, command, "session cleanup call succeeded"),
            Ok(result) => warn!(
                host,
                command,
                error = result.error_message.as_deref().unwrap_or("unknown"),
                "session cleanup call rejected"
            ),
            Err(err) => warn!(host, command, error = %err, "session cleanup call failed"),
        }
    }
}
