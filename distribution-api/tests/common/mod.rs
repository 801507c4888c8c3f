use anyhow::Result;
use axum::{
    body::Body,
    http::{self, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt; // for `collect`
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::Value;
use tower::ServiceExt; // for `oneshot`

use distribution_api::handlers::{add_routes, AppState};
use distribution_common::distribution::Distributor;
use distribution_common::memstore::MemoryStore;

pub const MAX_BODY_SIZE: usize = 1_000_000;

/// A router backed by a fresh MemoryStore and a seeded Distributor.
pub struct TestApp {
    router: Router,
}

impl TestApp {
    pub fn new() -> Self {
        let state = AppState::with_distributor(
            MemoryStore::new(),
            Distributor::with_rng(StdRng::seed_from_u64(7)),
        );

        Self {
            router: add_routes(Router::new(), state, MAX_BODY_SIZE, 100),
        }
    }

    pub async fn send(
        &self,
        method: http::Method,
        uri: &str,
        body: Option<Value>,
    ) -> Result<(StatusCode, Value)> {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(http::header::CONTENT_TYPE, "application/json");
        let request = match body {
            Some(body) => request.body(Body::from(body.to_string()))?,
            None => request.body(Body::empty())?,
        };

        let response = self.router.clone().oneshot(request).await?;
        let status = response.status();
        let bytes = response.into_body().collect().await?.to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)?
        };

        Ok((status, json))
    }

    pub async fn get(&self, uri: &str) -> Result<(StatusCode, Value)> {
        self.send(http::Method::GET, uri, None).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> Result<(StatusCode, Value)> {
        self.send(http::Method::POST, uri, Some(body)).await
    }

    pub async fn patch(&self, uri: &str, body: Value) -> Result<(StatusCode, Value)> {
        self.send(http::Method::PATCH, uri, Some(body)).await
    }

    /// Create an operator and return its id.
    pub async fn create_operator(&self, name: &str, max_load: i64) -> Result<i64> {
        let (status, body) = self
            .post(
                "/operators/",
                serde_json::json!({"name": name, "max_load": max_load}),
            )
            .await?;
        assert_eq!(status, StatusCode::OK);

        Ok(body["id"].as_i64().expect("operator id"))
    }

    /// Create a source and return its id.
    pub async fn create_source(&self, name: &str) -> Result<i64> {
        let (status, body) = self
            .post("/sources/", serde_json::json!({ "name": name }))
            .await?;
        assert_eq!(status, StatusCode::OK);

        Ok(body["id"].as_i64().expect("source id"))
    }
}
