use std::time::Instant;

use axum::{
    body::Body, extract::MatchedPath, http::Request, middleware::Next, response::IntoResponse,
    routing::get, Router,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Health check and scrape endpoints, hit often enough to drown the API routes in the request metrics.
const UNTRACKED_PATHS: &[&str] = &["/metrics", "/_readiness", "/_liveness"];

/// Add the `/metrics` endpoint to a Router and record HTTP metrics for every route in it.
/// Installs the global recorder, so it must only be called once per process.
pub fn setup_metrics_routes(router: Router) -> Router {
    let recorder_handle = setup_metrics_recorder();

    router
        .route(
            "/metrics",
            get(move || std::future::ready(recorder_handle.render())),
        )
        .layer(axum::middleware::from_fn(track_metrics))
}

pub fn setup_metrics_recorder() -> PrometheusHandle {
    const EXPONENTIAL_SECONDS: &[f64] = &[
        0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
    ];

    PrometheusBuilder::new()
        .set_buckets(EXPONENTIAL_SECONDS)
        .expect("bucket list is not empty")
        .install_recorder()
        .expect("failed to install prometheus recorder")
}

/// The label to record a request under. Matched routes are used over raw URIs so that ids in
/// paths like `/tickets/:ticket_id` don't create one series per ticket.
fn path_label(req: &Request<Body>) -> Option<String> {
    let path = match req.extensions().get::<MatchedPath>() {
        Some(matched_path) => matched_path.as_str(),
        None => req.uri().path(),
    };

    if UNTRACKED_PATHS.contains(&path) {
        None
    } else {
        Some(path.to_owned())
    }
}

/// Middleware to record some common HTTP metrics
/// Someday tower-http might provide a metrics middleware: https://github.com/tower-rs/tower-http/issues/57
pub async fn track_metrics(req: Request<Body>, next: Next) -> impl IntoResponse {
    let Some(path) = path_label(&req) else {
        return next.run(req).await;
    };

    let start = Instant::now();
    let method = req.method().to_string();

    let response = next.run(req).await;

    let labels = [
        ("method", method),
        ("path", path),
        ("status", response.status().as_u16().to_string()),
    ];

    metrics::counter!("http_requests_total", &labels).increment(1);
    metrics::histogram!("http_requests_duration_seconds", &labels)
        .record(start.elapsed().as_secs_f64());

    response
}
