//! Message-protocol rejections.

use rogalik_token::{AuthFailure, ErrorKind};
use serde::Serialize;

/// Close code for a payload the server will not accept (bad credentials).
pub const INVALID_PAYLOAD: u16 = 1007;
/// Close code for a server-side failure.
pub const INTERNAL_ERROR: u16 = 1011;

/// Error sent back on a message connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{code}: {reason}")]
pub struct MessageRejection {
    pub code: u16,
    pub reason: &'static str,
}

impl From<AuthFailure> for MessageRejection {
    fn from(failure: AuthFailure) -> Self {
        let code = if failure.is_credential_failure() {
            INVALID_PAYLOAD
        } else {
            INTERNAL_ERROR
        };
        Self {
            code,
            reason: failure.reason(),
        }
    }
}

/// Maps failures to [`MessageRejection`].
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageKind;

impl ErrorKind for MessageKind {
    type Error = MessageRejection;

    fn reject(&self, failure: AuthFailure) -> MessageRejection {
        failure.into()
    }
}
