//! Local control server
//!
//! Stands in for the UI collaborator: it starts and stops the session and
//! renders its connection state, speaking flag and last error.

use axum::{
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::UiConfig;
use crate::error::{Error, Result};
use crate::session::LiveSession;
use crate::ui::{handlers, websocket};

/// Shared handler state
pub struct AppState {
    pub session: Arc<LiveSession>,
}

/// Build the router
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/status", get(handlers::get_status))
        .route("/api/devices", get(handlers::get_devices))
        .route("/api/session/start", post(handlers::start_session))
        .route("/api/session/stop", post(handlers::stop_session))
        .route("/ws", get(websocket::ws_handler))
        .layer(cors)
        .with_state(state)
}

/// HTTP + WebSocket server for the control UI
pub struct WebServer {
    addr: SocketAddr,
    state: Arc<AppState>,
}

impl WebServer {
    pub fn new(config: &UiConfig, session: Arc<LiveSession>) -> Result<Self> {
        let addr: SocketAddr = format!("{}:{}", config.bind_address, config.http_port)
            .parse()
            .map_err(|e| Error::Config(format!("invalid UI bind address: {}", e)))?;
        Ok(Self {
            addr,
            state: Arc::new(AppState { session }),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Serve until `shutdown` resolves
    pub async fn run(self, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("Control UI listening on http://{}", listener.local_addr()?);

        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(shutdown)
            .await?;
        Ok(())
    }

    /// Serve on a background task
    pub fn start_background(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(self.run(shutdown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::testing::{FakeConnector, FakeDevices};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn app(config: AppConfig) -> (Arc<LiveSession>, Router) {
        let session = Arc::new(LiveSession::new(
            config,
            Arc::new(FakeDevices::new()),
            Arc::new(FakeConnector::new()),
        ));
        let router = router(Arc::new(AppState {
            session: session.clone(),
        }));
        (session, router)
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn keyed() -> AppConfig {
        let mut config = AppConfig::default();
        config.live.api_key = Some("test-key".into());
        config
    }

    #[tokio::test]
    async fn test_status_starts_closed() {
        let (_session, app) = app(keyed());
        let response = app
            .oneshot(Request::get("/api/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["state"], "closed");
        assert_eq!(body["data"]["remote_speaking"], false);
    }

    #[tokio::test]
    async fn test_start_without_credential_is_bad_request() {
        let (session, app) = app(AppConfig::default());
        let response = app
            .oneshot(
                Request::post("/api/session/start")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = json_body(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error_kind"], "initialization_error");
        assert!(body["error"].as_str().unwrap().contains("No API key"));
        assert_eq!(session.status().state, crate::session::ConnectionState::Error);
    }

    #[tokio::test]
    async fn test_start_then_stop() {
        let (_session, app) = app(keyed());

        let response = app
            .clone()
            .oneshot(
                Request::post("/api/session/start")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["data"]["state"], "connecting");

        let response = app
            .oneshot(Request::post("/api/session/stop").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["data"]["state"], "closed");
    }

    #[test]
    fn test_bad_bind_address_rejected() {
        let session = Arc::new(LiveSession::new(
            AppConfig::default(),
            Arc::new(FakeDevices::new()),
            Arc::new(FakeConnector::new()),
        ));
        let config = UiConfig {
            enabled: true,
            bind_address: "not an address".into(),
            http_port: 8080,
        };
        assert!(WebServer::new(&config, session).is_err());
    }
}
