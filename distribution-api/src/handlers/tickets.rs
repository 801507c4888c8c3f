use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde_derive::{Deserialize, Serialize};
use tracing::{debug, info};

use distribution_common::models::{LeadSummary, NewLead, NewTicket, Source, Ticket, TicketStatus};
use distribution_common::store::DistributionStore;

use super::app::AppState;
use super::operators::{with_current_load, OperatorResponse};
use crate::error::ApiError;

/// The body of a request made to create a Ticket.
#[derive(Deserialize, Serialize, Debug, PartialEq, Clone)]
pub struct TicketPostRequestBody {
    pub lead_external_id: String,
    pub source_id: i64,

    #[serde(default)]
    pub phone: Option<String>,

    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Deserialize, Serialize, Debug, PartialEq, Clone)]
pub struct TicketPatchRequestBody {
    pub status: TicketStatus,
}

#[derive(Deserialize, Serialize, Debug, PartialEq, Clone)]
pub struct TicketResponse {
    pub id: i64,
    pub lead_id: i64,
    pub source_id: i64,
    pub operator_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub status: TicketStatus,
    pub lead: LeadSummary,
    pub source: Source,
    pub operator: Option<OperatorResponse>,
}

impl TicketResponse {
    fn new(
        ticket: Ticket,
        lead: LeadSummary,
        source: Source,
        operator: Option<OperatorResponse>,
    ) -> Self {
        Self {
            id: ticket.id,
            lead_id: ticket.lead_id,
            source_id: ticket.source_id,
            operator_id: ticket.operator_id,
            created_at: ticket.created_at,
            status: ticket.status,
            lead,
            source,
            operator,
        }
    }
}

/// Load everything a Ticket references to build its response.
async fn expand_ticket<S>(store: &S, ticket: Ticket) -> Result<TicketResponse, ApiError>
where
    S: DistributionStore + Sync + ?Sized,
{
    let lead = store.get_lead(ticket.lead_id).await?.ok_or_else(|| {
        ApiError::MissingReference(format!(
            "ticket {} references missing lead {}",
            ticket.id, ticket.lead_id
        ))
    })?;
    let source = store.get_source(ticket.source_id).await?.ok_or_else(|| {
        ApiError::MissingReference(format!(
            "ticket {} references missing source {}",
            ticket.id, ticket.source_id
        ))
    })?;
    let operator = match ticket.operator_id {
        Some(operator_id) => {
            let operator = store.get_operator(operator_id).await?.ok_or_else(|| {
                ApiError::MissingReference(format!(
                    "ticket {} references missing operator {}",
                    ticket.id, operator_id
                ))
            })?;
            Some(with_current_load(store, operator).await?)
        }
        None => None,
    };

    Ok(TicketResponse::new(ticket, lead, source, operator))
}

/// Create a Ticket for a lead coming from a source, assigning it to an available operator.
///
/// A ticket for which no operator is available is created unassigned. The lead is resolved
/// before the source is checked, so a request for an unknown source may still create it.
pub async fn post_ticket(
    State(state): State<AppState>,
    Json(payload): Json<TicketPostRequestBody>,
) -> Result<Json<TicketResponse>, ApiError> {
    debug!("received payload: {:?}", payload);

    if payload.lead_external_id.is_empty() {
        return Err(ApiError::invalid("lead_external_id must not be empty"));
    }

    let lead = state
        .store
        .find_or_create_lead(NewLead {
            external_id: payload.lead_external_id,
            phone: payload.phone,
            email: payload.email,
        })
        .await?;

    let source = state
        .store
        .get_source(payload.source_id)
        .await?
        .ok_or(ApiError::SourceNotFound(payload.source_id))?;

    let operator = state
        .distributor
        .assign(state.store.as_ref(), source.id)
        .await?;

    let ticket = state
        .store
        .create_ticket(NewTicket {
            lead_id: lead.id,
            source_id: source.id,
            operator_id: operator.as_ref().map(|operator| operator.id),
        })
        .await?;

    let assigned = if operator.is_some() { "true" } else { "false" };
    metrics::counter!("distribution_tickets_created_total", "assigned" => assigned).increment(1);
    info!(
        ticket_id = ticket.id,
        lead_id = lead.id,
        source_id = source.id,
        operator_id = ticket.operator_id,
        "created ticket"
    );

    Ok(Json(expand_ticket(state.store.as_ref(), ticket).await?))
}

pub async fn list_tickets(
    State(state): State<AppState>,
) -> Result<Json<Vec<TicketResponse>>, ApiError> {
    let tickets = state.store.list_tickets().await?;

    let mut response = Vec::with_capacity(tickets.len());
    for ticket in tickets {
        response.push(expand_ticket(state.store.as_ref(), ticket).await?);
    }

    Ok(Json(response))
}

/// Move a Ticket to another status. Closing a ticket frees a slot of its operator.
pub async fn patch_ticket(
    State(state): State<AppState>,
    Path(ticket_id): Path<i64>,
    Json(payload): Json<TicketPatchRequestBody>,
) -> Result<Json<TicketResponse>, ApiError> {
    debug!("received payload: {:?}", payload);

    let ticket = state
        .store
        .update_ticket_status(ticket_id, payload.status)
        .await?
        .ok_or(ApiError::TicketNotFound(ticket_id))?;
    info!(ticket_id, status = %ticket.status, "updated ticket status");

    Ok(Json(expand_ticket(state.store.as_ref(), ticket).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::{
        body::Body,
        http::{self, Request, StatusCode},
        Router,
    };
    use distribution_common::memstore::MemoryStore;
    use http_body_util::BodyExt; // for `collect`
    use tower::ServiceExt; // for `call`, `oneshot`, and `ready`

    use crate::handlers::app::add_routes;

    fn ticket_request(body: &str) -> Request<Body> {
        Request::builder()
            .method(http::Method::POST)
            .uri("/tickets/")
            .header(http::header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_owned()))
            .unwrap()
    }

    #[tokio::test]
    async fn ticket_unknown_source() {
        let app = add_routes(
            Router::new(),
            AppState::new(MemoryStore::new()),
            1_000_000,
            10,
        );

        let response = app
            .oneshot(ticket_request(
                r#"{"lead_external_id": "lead-1", "source_id": 1}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn ticket_without_operators_is_unassigned() {
        let store = MemoryStore::new();
        store.create_source("web-form").await.unwrap();
        let app = add_routes(Router::new(), AppState::new(store), 1_000_000, 10);

        let response = app
            .oneshot(ticket_request(
                r#"{"lead_external_id": "lead-1", "source_id": 1, "phone": "+100000"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let ticket: TicketResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(ticket.operator_id, None);
        assert_eq!(ticket.operator, None);
        assert_eq!(ticket.status, TicketStatus::New);
        assert_eq!(ticket.lead.lead.external_id, "lead-1");
        assert_eq!(ticket.lead.lead.phone.as_deref(), Some("+100000"));
        assert_eq!(ticket.lead.tickets_count, 1);
        assert_eq!(ticket.source.name, "web-form");
    }

    #[tokio::test]
    async fn ticket_payload_bad_requests() {
        let app = add_routes(
            Router::new(),
            AppState::new(MemoryStore::new()),
            1_000_000,
            10,
        );

        let response = app
            .clone()
            .oneshot(ticket_request(r#"{"lead_external_id": "", "source_id": 1}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .clone()
            .oneshot(ticket_request(r#"{"source_id": 1}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let response = app.oneshot(ticket_request("x")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn ticket_payload_body_too_large() {
        const MAX_BODY_SIZE: usize = 1_000;
        let app = add_routes(
            Router::new(),
            AppState::new(MemoryStore::new()),
            MAX_BODY_SIZE,
            10,
        );

        let long_id = "a".repeat(MAX_BODY_SIZE + 1);
        let payload = format!(r#"{{"lead_external_id": "{}", "source_id": 1}}"#, long_id);

        let response = app.oneshot(ticket_request(&payload)).await.unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn patch_unknown_ticket() {
        let app = add_routes(
            Router::new(),
            AppState::new(MemoryStore::new()),
            1_000_000,
            10,
        );

        let response = app
            .oneshot(
                Request::builder()
                    .method(http::Method::PATCH)
                    .uri("/tickets/7")
                    .header(http::header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"status": "closed"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn patch_ticket_rejects_unknown_status() {
        let app = add_routes(
            Router::new(),
            AppState::new(MemoryStore::new()),
            1_000_000,
            10,
        );

        let response = app
            .oneshot(
                Request::builder()
                    .method(http::Method::PATCH)
                    .uri("/tickets/1")
                    .header(http::header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"status": "done"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
