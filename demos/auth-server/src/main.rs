mod api;
mod socket;

use rogalik::prelude::*;
use tokio::net::TcpListener;

use crate::socket::SocketServer;

const HTTP_ADDR: &str = "0.0.0.0:8080";
const SOCKET_ADDR: &str = "0.0.0.0:8081";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let settings = match std::env::args().nth(1) {
        Some(path) => Settings::load(path)?,
        None => Settings::from_env()?,
    };
    let auth = AuthSystem::builder().settings(settings).build().await?;

    let sockets = SocketServer::bind(SOCKET_ADDR, auth.tokens().clone()).await?;
    tokio::spawn(sockets.run());

    let listener = TcpListener::bind(HTTP_ADDR).await?;
    tracing::info!(addr = HTTP_ADDR, "HTTP endpoint listening");
    axum::serve(listener, api::router(auth)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use futures_util::{SinkExt, StreamExt};
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tokio_tungstenite::tungstenite::Message;
    use tower::ServiceExt;

    const KEY: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

    async fn auth() -> AuthSystem {
        let mut settings = Settings::default();
        settings.auth.symmetric_key = KEY.into();
        AuthSystem::builder().settings(settings).build().await.unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn with_bearer(method: &str, uri: &str, token: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    // =========================================================================
    // HTTP
    // =========================================================================

    #[tokio::test]
    async fn test_login_me_logout() {
        let app = api::router(auth().await);

        let response = app
            .clone()
            .oneshot(post_json(
                "/login",
                json!({"sub": "ada", "level": 7, "password": api::DEMO_PASSWORD}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["token_type"], "bearer");
        let token = body["access_token"].as_str().unwrap().to_owned();

        let response = app
            .clone()
            .oneshot(with_bearer("GET", "/me", &token))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let me = json_body(response).await;
        assert_eq!(me["sub"], "ada");
        assert_eq!(me["level"], 7);
        assert!(me.get("password").is_none());

        let response = app
            .clone()
            .oneshot(with_bearer("POST", "/logout", &token))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app.oneshot(with_bearer("GET", "/me", &token)).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(json_body(response).await["detail"], "revoked");
    }

    #[tokio::test]
    async fn test_login_without_subject_is_unauthorized() {
        let app = api::router(auth().await);
        let response = app
            .oneshot(post_json(
                "/login",
                json!({"level": 7, "password": api::DEMO_PASSWORD}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_login_with_wrong_password_is_unauthorized() {
        let app = api::router(auth().await);
        for body in [
            json!({"sub": "ada"}),
            json!({"sub": "ada", "password": "guess"}),
            json!({"sub": "ada", "password": 42}),
        ] {
            let response = app.clone().oneshot(post_json("/login", body)).await.unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
            assert_eq!(json_body(response).await["detail"], "missing credentials");
        }
    }

    // =========================================================================
    // WebSocket
    // =========================================================================

    async fn start_sockets(auth: &AuthSystem) -> String {
        let server = SocketServer::bind("127.0.0.1:0", auth.tokens().clone())
            .await
            .unwrap();
        let addr = server.local_addr().unwrap().to_string();
        tokio::spawn(server.run());
        addr
    }

    #[tokio::test]
    async fn test_socket_whoami_then_unauthenticated_close() {
        let auth = auth().await;
        let addr = start_sockets(&auth).await;
        let token = auth
            .create_token(json!({"sub": "ada"}).as_object().unwrap().clone())
            .await
            .unwrap();

        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
            .await
            .unwrap();

        let request = json!({"action": "whoami", "jwt": token});
        ws.send(Message::text(request.to_string())).await.unwrap();
        let reply = ws.next().await.unwrap().unwrap();
        let reply: Value = serde_json::from_str(reply.to_text().unwrap()).unwrap();
        assert_eq!(reply["sub"], "ada");

        let request = json!({"action": "whoami"});
        ws.send(Message::text(request.to_string())).await.unwrap();
        match ws.next().await.unwrap().unwrap() {
            Message::Close(Some(frame)) => {
                assert_eq!(u16::from(frame.code), 1007);
                assert_eq!(frame.reason.as_str(), "missing credentials");
            }
            other => panic!("expected close frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_socket_rejects_invalid_json_without_closing() {
        let auth = auth().await;
        let addr = start_sockets(&auth).await;
        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
            .await
            .unwrap();

        ws.send(Message::text("not json")).await.unwrap();
        let reply = ws.next().await.unwrap().unwrap();
        let reply: Value = serde_json::from_str(reply.to_text().unwrap()).unwrap();
        assert_eq!(reply["error"], "invalid json");
    }
}
