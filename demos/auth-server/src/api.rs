//! HTTP routes: login, logout, and a protected profile endpoint.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router, middleware};
use rogalik::guard::authorization;
use rogalik::prelude::*;
use serde::Serialize;

#[derive(Serialize)]
struct TokenResponse {
    access_token: String,
    token_type: &'static str,
}

pub fn router(auth: AuthSystem) -> Router {
    let protected = Router::new()
        .route("/me", get(me))
        .route_layer(middleware::from_fn_with_state(
            auth.tokens().clone(),
            require_bearer,
        ));

    Router::new()
        .route("/login", post(login))
        .route("/logout", post(logout))
        .merge(protected)
        .with_state(auth)
}

/// Password every demo account shares. Stands in for an account store;
/// a real service verifies the subject's own credentials here.
pub const DEMO_PASSWORD: &str = "rogalik-demo";

/// Issues a token for the posted claims once `password` checks out. The
/// password is removed before signing.
async fn login(
    State(auth): State<AuthSystem>,
    Json(mut claims): Json<ClaimSet>,
) -> Result<Json<TokenResponse>, HttpRejection> {
    let password = claims.remove("password");
    if password.as_ref().and_then(|p| p.as_str()) != Some(DEMO_PASSWORD) {
        tracing::warn!("login refused: bad credentials");
        return Err(AuthFailure::MissingCredentials.into());
    }

    let access_token = auth.create_token(claims).await.map_err(|err| {
        tracing::warn!(error = %err, "login refused");
        HttpRejection::from(err.failure())
    })?;
    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer",
    }))
}

async fn logout(
    State(auth): State<AuthSystem>,
    headers: HeaderMap,
) -> Result<StatusCode, HttpRejection> {
    auth.logout(authorization(&headers)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn me(Claims(claims): Claims) -> Json<ClaimSet> {
    Json(claims)
}
