use axum::{
    extract::{Path, State},
    Json,
};
use serde_derive::{Deserialize, Serialize};
use tracing::{debug, info};

use distribution_common::models::{NewOperator, Operator, OperatorUpdate, DEFAULT_MAX_LOAD};
use distribution_common::store::{DistributionStore, StoreResult};

use super::app::AppState;
use crate::error::ApiError;

/// The body of a request made to create an Operator.
#[derive(Deserialize, Serialize, Debug, PartialEq, Clone)]
pub struct OperatorPostRequestBody {
    pub name: String,

    #[serde(default = "default_is_active")]
    pub is_active: bool,

    #[serde(default = "default_max_load")]
    pub max_load: i32,
}

fn default_is_active() -> bool {
    true
}

fn default_max_load() -> i32 {
    DEFAULT_MAX_LOAD
}

/// The body of a request made to toggle an Operator. Omitted fields are left unchanged.
#[derive(Deserialize, Serialize, Debug, PartialEq, Clone, Default)]
pub struct OperatorPatchRequestBody {
    pub is_active: Option<bool>,
    pub max_load: Option<i32>,
}

#[derive(Deserialize, Serialize, Debug, PartialEq, Clone)]
pub struct OperatorResponse {
    #[serde(flatten)]
    pub operator: Operator,
    pub current_load: i64,
}

/// Pair an Operator with its current number of open tickets.
pub async fn with_current_load<S>(store: &S, operator: Operator) -> StoreResult<OperatorResponse>
where
    S: DistributionStore + Sync + ?Sized,
{
    let current_load = store.count_open_tickets(operator.id).await?;

    Ok(OperatorResponse {
        operator,
        current_load,
    })
}

fn validate_max_load(max_load: i32) -> Result<(), ApiError> {
    if max_load < 0 {
        return Err(ApiError::invalid("max_load must not be negative"));
    }
    Ok(())
}

pub async fn post_operator(
    State(state): State<AppState>,
    Json(payload): Json<OperatorPostRequestBody>,
) -> Result<Json<OperatorResponse>, ApiError> {
    debug!("received payload: {:?}", payload);

    let name = payload.name.trim();
    if name.is_empty() {
        return Err(ApiError::invalid("operator name must not be empty"));
    }
    validate_max_load(payload.max_load)?;

    let operator = state
        .store
        .create_operator(NewOperator {
            name: name.to_owned(),
            is_active: payload.is_active,
            max_load: payload.max_load,
        })
        .await?;
    info!(operator_id = operator.id, "created operator");

    Ok(Json(OperatorResponse {
        operator,
        current_load: 0,
    }))
}

pub async fn list_operators(
    State(state): State<AppState>,
) -> Result<Json<Vec<OperatorResponse>>, ApiError> {
    let operators = state.store.list_operators().await?;

    let mut response = Vec::with_capacity(operators.len());
    for operator in operators {
        response.push(with_current_load(state.store.as_ref(), operator).await?);
    }

    Ok(Json(response))
}

pub async fn patch_operator(
    State(state): State<AppState>,
    Path(operator_id): Path<i64>,
    Json(payload): Json<OperatorPatchRequestBody>,
) -> Result<Json<OperatorResponse>, ApiError> {
    debug!("received payload: {:?}", payload);

    if let Some(max_load) = payload.max_load {
        validate_max_load(max_load)?;
    }

    let operator = state
        .store
        .update_operator(
            operator_id,
            OperatorUpdate {
                is_active: payload.is_active,
                max_load: payload.max_load,
            },
        )
        .await?
        .ok_or(ApiError::OperatorNotFound(operator_id))?;
    info!(
        operator_id,
        is_active = operator.is_active,
        max_load = operator.max_load,
        "updated operator"
    );

    Ok(Json(with_current_load(state.store.as_ref(), operator).await?))
}
