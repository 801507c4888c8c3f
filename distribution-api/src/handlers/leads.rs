use axum::{extract::State, Json};

use distribution_common::models::LeadSummary;

use super::app::AppState;
use crate::error::ApiError;

pub async fn list_leads(State(state): State<AppState>) -> Result<Json<Vec<LeadSummary>>, ApiError> {
    Ok(Json(state.store.list_leads().await?))
}
