//! Router assembly: HTTP endpoints, WebSocket upgrade, static files, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;
pub mod ws;

/// Build the application router with:
/// - WebSocket at `/ws` (one training run per connection)
/// - REST-ish API under `/api/v1/...`
/// - Static SPA from `./static` with index fallback
/// - CORS (allow any origin/method/headers); tighten for production
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    let static_service = ServeDir::new("./static")
        .append_index_html_on_directories(true)
        .not_found_service(ServeFile::new("./static/index.html"));

    Router::new()
        .route("/ws", get(ws::ws_upgrade))
        .route("/api/v1/health", get(http::http_health))
        .route("/api/v1/trainees/:trainee_id/progress", get(http::http_get_progress))
        .route("/api/v1/sessions", post(http::http_post_session))
        // One segment name for all three so the path matcher accepts them side by side:
        // a run id for the live view/actions, a stored session id for responses.
        .route("/api/v1/sessions/:id", get(http::http_get_session))
        .route("/api/v1/sessions/:id/actions", post(http::http_post_action))
        .route("/api/v1/sessions/:id/responses", get(http::http_get_responses))
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .fallback_service(static_service)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::config::TrainerConfig;
    use crate::oracle::LocalOracle;
    use crate::store::InMemoryStore;

    fn app() -> Router {
        let state = AppState::with_parts(
            TrainerConfig::default(),
            Arc::new(InMemoryStore::default()),
            Arc::new(LocalOracle::default()),
        );
        build_router(Arc::new(state))
    }

    async fn json_body(res: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(res.into_body(), 64 * 1024).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn health_is_ok() {
        let res = app().oneshot(Request::get("/api/v1/health").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(json_body(res).await, serde_json::json!({"ok": true}));
    }

    #[tokio::test]
    async fn locked_level_maps_to_bad_request() {
        let req = post_json(
            "/api/v1/sessions",
            serde_json::json!({"traineeId": "t9", "mode": "learn", "level": 4, "vertical": "leadgen"}),
        );
        let res = app().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body = json_body(res).await;
        assert_eq!(body["retryable"], serde_json::json!(false));
    }

    #[tokio::test]
    async fn unknown_run_is_not_found() {
        let req = post_json("/api/v1/sessions/missing/actions", serde_json::json!({"action": "pause"}));
        let res = app().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn progress_lists_five_levels() {
        let res = app()
            .oneshot(Request::get("/api/v1/trainees/t1/progress").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = json_body(res).await;
        assert_eq!(body["levels"].as_array().map(Vec::len), Some(5));
        // A new trainee can only play level 1.
        assert_eq!(body["levels"][0]["locked"], serde_json::json!(false));
        assert_eq!(body["levels"][1]["locked"], serde_json::json!(true));
        assert_eq!(body["levels"][4]["locked"], serde_json::json!(true));
    }

    #[tokio::test]
    async fn started_session_is_created_and_viewable() {
        let router = app();
        let req = post_json(
            "/api/v1/sessions",
            serde_json::json!({"traineeId": "t1", "mode": "practice", "level": 1, "vertical": "ecommerce"}),
        );
        let res = router.clone().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        let body = json_body(res).await;
        let run_id = body["runId"].as_str().unwrap().to_string();
        assert_eq!(body["config"]["timerDurationSeconds"], serde_json::json!(1500));
        assert_eq!(body["config"]["mode"], serde_json::json!("practice"));

        let res = router
            .oneshot(Request::get(format!("/api/v1/sessions/{run_id}")).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }
}
