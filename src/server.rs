use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::relay;
use crate::state::AppState;
use crate::ws;

/// Full application router: page session socket, relay, static page
pub fn router(state: Arc<AppState>) -> Router {
    let static_dir = state.server.static_dir.clone();
    let relay_routes = relay::router(state.relay.clone());

    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/health", get(|| async { "ok" }))
        .with_state(state)
        .merge(relay_routes)
        .fallback_service(ServeDir::new(static_dir))
        // Pages hosted elsewhere post to the relay cross-origin
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::relay::Relay;
    use crate::session::SessionConfig;
    use crate::testing::{recording_reporter, FixedGeo};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn app() -> Router {
        let state = AppState::new(
            ServerConfig::default(),
            SessionConfig::default(),
            Arc::new(FixedGeo::tashkent()),
            recording_reporter(),
            Relay::new(None),
        );
        router(Arc::new(state))
    }

    #[tokio::test]
    async fn test_health() {
        let response = app()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_relay_is_mounted() {
        let response = app()
            .oneshot(
                Request::post("/api/notify")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"type":"💝 Страница открыта"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_ws_requires_upgrade() {
        let response = app()
            .oneshot(Request::get("/ws").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(response.status().is_client_error());
    }
}
