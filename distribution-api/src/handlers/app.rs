use std::sync::Arc;

use axum::{extract::DefaultBodyLimit, routing, Router};
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::trace::TraceLayer;

use distribution_common::distribution::Distributor;
use distribution_common::store::DistributionStore;

use super::{leads, operators, sources, tickets};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DistributionStore + Send + Sync>,
    pub distributor: Arc<Distributor>,
}

impl AppState {
    pub fn new<S: DistributionStore + Send + Sync + 'static>(store: S) -> Self {
        Self::with_distributor(store, Distributor::new())
    }

    pub fn with_distributor<S: DistributionStore + Send + Sync + 'static>(
        store: S,
        distributor: Distributor,
    ) -> Self {
        Self {
            store: Arc::new(store),
            distributor: Arc::new(distributor),
        }
    }
}

pub fn add_routes(
    router: Router,
    state: AppState,
    max_body_size: usize,
    concurrency_limit: usize,
) -> Router {
    let api = Router::new()
        .route(
            "/operators/",
            routing::get(operators::list_operators).post(operators::post_operator),
        )
        .route("/operators/:operator_id", routing::patch(operators::patch_operator))
        .route(
            "/sources/",
            routing::get(sources::list_sources).post(sources::post_source),
        )
        .route(
            "/sources/:source_id/operators/",
            routing::get(sources::list_source_operators),
        )
        .route(
            "/sources/:source_id/assign-operators/",
            routing::post(sources::post_assign_operators),
        )
        .route(
            "/tickets/",
            routing::get(tickets::list_tickets).post(tickets::post_ticket),
        )
        .route("/tickets/:ticket_id", routing::patch(tickets::patch_ticket))
        .route("/leads/", routing::get(leads::list_leads))
        .with_state(state)
        // Router::layer wraps every route separately: the permits must be shared between them
        // for the limit to hold across the whole API.
        .layer(GlobalConcurrencyLimitLayer::new(concurrency_limit))
        .layer(DefaultBodyLimit::max(max_body_size));

    router
        .route("/", routing::get(index))
        .route("/_readiness", routing::get(index))
        .route("/_liveness", routing::get(index)) // No async loop for now, just check axum health
        .merge(api)
        .layer(TraceLayer::new_for_http())
}

pub async fn index() -> &'static str {
    "lead distribution api"
}
