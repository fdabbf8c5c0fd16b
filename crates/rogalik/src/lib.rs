//! # Rogalik
//!
//! Authentication and signing key lifecycle for game services that run as
//! many identical instances behind a load balancer.
//!
//! Instances share nothing but an external cache. That cache holds the RSA
//! key pair tokens are signed with (private half encrypted at rest) and
//! the list of revoked tokens, so any instance can verify what any other
//! issued and a logout takes effect everywhere.
//!
//! ## Crates
//!
//! | Crate | Role |
//! |-------|------|
//! | `rogalik-cache` | [`SharedCache`] trait, in-memory and Redis backends, retry policy |
//! | `rogalik-keys` | key pair creation under a cross-instance lock, at-rest encryption |
//! | `rogalik-token` | issue, validate and revoke tokens |
//! | `rogalik-guard` | enforce tokens on HTTP and message handlers |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rogalik::prelude::*;
//!
//! # async fn run() -> Result<(), RogalikError> {
//! let settings = Settings::load("rogalik.toml")?;
//! let auth = AuthSystem::builder().settings(settings).build().await?;
//!
//! let mut claims = ClaimSet::new();
//! claims.insert("sub".into(), "player-1".into());
//! let token = auth.create_token(claims).await?;
//!
//! let claims = auth
//!     .validate_token(&format!("Bearer {token}"), PlainKind)
//!     .await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `redis`: connect to Redis when `cache.local = false`

mod config;
mod error;
mod observability;
mod system;

pub use config::{AuthSettings, CacheSettings, ConfigError, ENV_PREFIX, Settings};
pub use error::RogalikError;
pub use observability::init_tracing;
pub use system::{AuthSystem, AuthSystemBuilder};

pub use rogalik_cache::{CacheError, CachePolicy, MemoryCache, ResilientCache, SharedCache};
pub use rogalik_guard as guard;
pub use rogalik_keys::{KeyError, KeyPairStatus};
pub use rogalik_token::{
    Algorithm, AuthFailure, ClaimSet, ErrorKind, PlainKind, TokenError, TokenService,
    TokenSettings,
};

/// Common imports for services using Rogalik.
pub mod prelude {
    pub use crate::guard::{
        AuthContext, Claims, HttpContext, HttpRejection, MessageContext, MessageRejection,
        protect, require_bearer,
    };
    pub use crate::{
        AuthFailure, AuthSystem, ClaimSet, ErrorKind, PlainKind, RogalikError, Settings,
        TokenService, init_tracing,
    };
}
