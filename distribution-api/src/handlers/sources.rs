use std::collections::HashSet;

use axum::{
    extract::{Path, State},
    Json,
};
use serde_derive::{Deserialize, Serialize};
use tracing::{debug, info};

use distribution_common::models::{Assignment, NewAssignment, Source, DEFAULT_WEIGHT};

use super::app::AppState;
use crate::error::ApiError;

/// The body of a request made to create a Source.
#[derive(Deserialize, Serialize, Debug, PartialEq, Clone)]
pub struct SourcePostRequestBody {
    pub name: String,
}

/// One entry of the list replacing the operators assigned to a Source.
#[derive(Deserialize, Serialize, Debug, PartialEq, Clone)]
pub struct AssignmentRequestBody {
    pub operator_id: i64,

    #[serde(default = "default_weight")]
    pub weight: i32,
}

fn default_weight() -> i32 {
    DEFAULT_WEIGHT
}

#[derive(Deserialize, Serialize, Debug, PartialEq)]
pub struct MessageResponse {
    pub message: String,
}

pub async fn post_source(
    State(state): State<AppState>,
    Json(payload): Json<SourcePostRequestBody>,
) -> Result<Json<Source>, ApiError> {
    debug!("received payload: {:?}", payload);

    let name = payload.name.trim();
    if name.is_empty() {
        return Err(ApiError::invalid("source name must not be empty"));
    }

    let source = state.store.create_source(name).await?;
    info!(source_id = source.id, "created source");

    Ok(Json(source))
}

pub async fn list_sources(State(state): State<AppState>) -> Result<Json<Vec<Source>>, ApiError> {
    Ok(Json(state.store.list_sources().await?))
}

pub async fn list_source_operators(
    State(state): State<AppState>,
    Path(source_id): Path<i64>,
) -> Result<Json<Vec<Assignment>>, ApiError> {
    state
        .store
        .get_source(source_id)
        .await?
        .ok_or(ApiError::SourceNotFound(source_id))?;

    Ok(Json(state.store.list_assignments(source_id).await?))
}

/// Replace every operator assigned to a source with the ones in the payload.
pub async fn post_assign_operators(
    State(state): State<AppState>,
    Path(source_id): Path<i64>,
    Json(payload): Json<Vec<AssignmentRequestBody>>,
) -> Result<Json<MessageResponse>, ApiError> {
    debug!("received payload: {:?}", payload);

    state
        .store
        .get_source(source_id)
        .await?
        .ok_or(ApiError::SourceNotFound(source_id))?;

    let mut seen = HashSet::with_capacity(payload.len());
    let mut assignments = Vec::with_capacity(payload.len());

    for assignment in payload {
        if assignment.weight <= 0 {
            return Err(ApiError::invalid(format!(
                "weight for operator {} must be positive",
                assignment.operator_id
            )));
        }
        if !seen.insert(assignment.operator_id) {
            return Err(ApiError::invalid(format!(
                "operator {} is assigned more than once",
                assignment.operator_id
            )));
        }
        if state
            .store
            .get_operator(assignment.operator_id)
            .await?
            .is_none()
        {
            return Err(ApiError::invalid(format!(
                "operator {} does not exist",
                assignment.operator_id
            )));
        }

        assignments.push(NewAssignment {
            operator_id: assignment.operator_id,
            weight: assignment.weight,
        });
    }

    let assigned = state
        .store
        .replace_assignments(source_id, &assignments)
        .await?;
    info!(source_id, operators = assigned.len(), "replaced source operators");

    Ok(Json(MessageResponse {
        message: "Operators assigned successfully".to_owned(),
    }))
}
