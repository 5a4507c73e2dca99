//! Read-only JSON dashboard.
//!
//! # Routes
//! - `GET /api/status`: overall health summary
//! - `GET /api/targets`: every target with its current state
//! - `GET /api/targets/{key}`: state, statistics and recent alerts
//! - `GET /api/targets/{key}/history?limit=N`: recent outcomes, oldest first
//! - `GET /api/targets/{key}/uptime?window_secs=S`: uptime ratio
//! - `GET /api/alerts?limit=N&target=K`: alert history, newest first

pub mod auth;
pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{middleware, routing::get, Router};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::lifecycle::ShutdownSignal;
use crate::monitor::MonitorView;

use self::auth::bearer_auth;
use self::handlers::*;

#[derive(Clone)]
pub struct DashboardState {
    pub view: MonitorView,
    pub api_key: Option<Arc<str>>,
}

pub fn setup_dashboard_router(view: MonitorView, api_key: Option<String>) -> Router {
    let state = DashboardState {
        view,
        api_key: api_key.filter(|k| !k.is_empty()).map(Arc::from),
    };

    Router::new()
        .route("/api/status", get(get_status))
        .route("/api/targets", get(get_targets))
        .route("/api/targets/{key}", get(get_target))
        .route("/api/targets/{key}/history", get(get_history))
        .route("/api/targets/{key}/uptime", get(get_uptime))
        .route("/api/alerts", get(get_alerts))
        .layer(middleware::from_fn_with_state(state.clone(), bearer_auth))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the dashboard until `shutdown` fires.
pub async fn serve(
    addr: SocketAddr,
    router: Router,
    mut shutdown: ShutdownSignal,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(address = %listener.local_addr()?, "Dashboard listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.recv().await })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::AlertLog;
    use crate::health::outcome::Outcome;
    use crate::store::ResultStore;
    use crate::target::{CheckSpec, SharedRegistry, Target};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::time::Duration;
    use tower::ServiceExt;

    fn view() -> MonitorView {
        let registry = SharedRegistry::default();
        registry
            .replace(vec![Target::new(
                "api",
                CheckSpec::Tcp { address: "127.0.0.1:80".into() },
                Duration::from_secs(10),
                Duration::from_secs(1),
            )])
            .unwrap();
        let store = Arc::new(ResultStore::new(10));
        store.register("api");
        for ms in [5, 6, 7] {
            store.append("api", Arc::new(Outcome::success(Duration::from_millis(ms), None)));
        }
        MonitorView::new(registry, store, Arc::new(AlertLog::default()))
    }

    async fn get_json(router: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_routes() {
        let router = setup_dashboard_router(view(), None);

        let (status, body) = get_json(router.clone(), "/api/targets").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["key"], "api");
        assert_eq!(body[0]["uptime_percentage"], 100.0);

        let (_, body) = get_json(router.clone(), "/api/targets/api/history?limit=2").await;
        assert_eq!(body.as_array().unwrap().len(), 2);
        assert_eq!(body[1]["latency_ms"], 7.0);

        let (_, body) = get_json(router.clone(), "/api/targets/api/uptime").await;
        assert_eq!(body["uptime_ratio"], 1.0);

        let (_, body) = get_json(router.clone(), "/api/status").await;
        assert_eq!(body["total_targets"], 1);

        let (status, _) = get_json(router, "/api/targets/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_bearer_auth() {
        let router = setup_dashboard_router(view(), Some("secret".into()));

        let (status, _) = get_json(router.clone(), "/api/status").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/api/status")
                    .header("Authorization", "Bearer secret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
