//! Bearer token enforcement for Rogalik handlers.
//!
//! A protected operation is any handler taking an [`AuthContext`]. The
//! context says where the token lives and how a failure should look;
//! [`protect`] does the rest:
//!
//! | Context | Token source | Failure |
//! |---------|--------------|---------|
//! | [`HttpContext`] | `Authorization` header | [`HttpRejection`] (401/403/503) |
//! | [`MessageContext`] | `jwt` payload field | [`MessageRejection`] (1007/1011) |
//!
//! For axum routers, [`require_bearer`] and the [`Claims`] extractor do
//! the same job as middleware.

mod context;
mod message;
mod protect;
mod web;

pub use context::{AuthContext, HttpContext, MessageContext, authorization};
pub use message::{INTERNAL_ERROR, INVALID_PAYLOAD, MessageKind, MessageRejection};
pub use protect::{Rejection, protect};
pub use web::{Claims, HttpKind, HttpRejection, require_bearer};
