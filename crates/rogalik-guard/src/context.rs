//! Where a token comes from, and how failures are shaped.
//!
//! An invocation context declares both through [`AuthContext`]: an HTTP
//! request reads the `Authorization` header and fails with a status code,
//! a message reads its `jwt` field and fails with a close code. The
//! validation itself never looks at which one it got.

use http::HeaderMap;
use http::header::AUTHORIZATION;
use rogalik_token::{BEARER_PREFIX, ErrorKind};
use serde_json::Value;

use crate::{HttpKind, MessageKind};

/// The capability a protected operation's input must provide.
pub trait AuthContext: Send + 'static {
    /// How failures are reported for this context.
    type Kind: ErrorKind + 'static;

    /// The presented credential in `Bearer <token>` form, or whatever the
    /// client sent if it is malformed. Empty if nothing was sent.
    fn bearer(&self) -> String;

    /// The error kind validation failures are mapped through.
    fn error_kind(&self) -> Self::Kind;
}

/// An HTTP-style invocation, identified by its request headers.
#[derive(Debug, Clone, Default)]
pub struct HttpContext {
    headers: HeaderMap,
}

impl HttpContext {
    pub fn new(headers: HeaderMap) -> Self {
        Self { headers }
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

impl From<HeaderMap> for HttpContext {
    fn from(headers: HeaderMap) -> Self {
        Self::new(headers)
    }
}

impl AuthContext for HttpContext {
    type Kind = HttpKind;

    fn bearer(&self) -> String {
        authorization(&self.headers).to_owned()
    }

    fn error_kind(&self) -> HttpKind {
        HttpKind
    }
}

/// Value of the `Authorization` header, or `""` if absent or not ASCII.
pub fn authorization(headers: &HeaderMap) -> &str {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
}

/// A message-style invocation: a JSON payload carrying its token in `jwt`.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageContext {
    payload: Value,
}

impl MessageContext {
    pub fn new(payload: Value) -> Self {
        Self { payload }
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn into_payload(self) -> Value {
        self.payload
    }
}

impl AuthContext for MessageContext {
    type Kind = MessageKind;

    /// Reformats the `jwt` field as `Bearer <jwt>`. A missing or non-string
    /// field yields a bare prefix, which validation rejects as missing.
    fn bearer(&self) -> String {
        let jwt = self
            .payload
            .get("jwt")
            .and_then(Value::as_str)
            .unwrap_or_default();
        format!("{BEARER_PREFIX}{jwt}")
    }

    fn error_kind(&self) -> MessageKind {
        MessageKind
    }
}

#[cfg(test)]
mod tests {
    use http::HeaderValue;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_http_reads_authorization_header() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(HttpContext::new(headers).bearer(), "Bearer abc");
    }

    #[test]
    fn test_http_without_header_is_empty() {
        assert_eq!(HttpContext::default().bearer(), "");
    }

    #[test]
    fn test_message_reformats_jwt_field() {
        let ctx = MessageContext::new(json!({"action": "move", "jwt": "abc"}));
        assert_eq!(ctx.bearer(), "Bearer abc");
    }

    #[test]
    fn test_message_without_jwt_is_bare_prefix() {
        assert_eq!(MessageContext::new(json!({})).bearer(), "Bearer ");
        assert_eq!(MessageContext::new(json!({"jwt": 5})).bearer(), "Bearer ");
        assert_eq!(MessageContext::new(json!("text")).bearer(), "Bearer ");
    }
}
