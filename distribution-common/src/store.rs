use async_trait::async_trait;
use thiserror::Error;

use crate::models::{
    Assignment, Lead, LeadSummary, NewAssignment, NewLead, NewOperator, NewTicket, Operator,
    OperatorUpdate, Source, Ticket, TicketStatus,
};

/// Enumeration of errors for operations with a DistributionStore.
/// Errors can originate from sqlx and are wrapped by us to provide additional context.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("connection failed with: {error}")]
    ConnectionError { error: sqlx::Error },
    #[error("{command} query failed with: {error}")]
    QueryError { command: String, error: sqlx::Error },
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// The reads needed to decide which operators can take a ticket.
///
/// Implementations must answer `count_open_tickets` from the tickets themselves on every call:
/// a cached load lets operators be assigned past their `max_load`.
#[async_trait]
pub trait AssignmentStore {
    /// All assignments of a source, in insertion order.
    async fn list_assignments(&self, source_id: i64) -> StoreResult<Vec<Assignment>>;

    async fn get_operator(&self, operator_id: i64) -> StoreResult<Option<Operator>>;

    /// Number of tickets assigned to an operator that are `new` or `in_progress`.
    async fn count_open_tickets(&self, operator_id: i64) -> StoreResult<i64>;
}

/// Everything the API needs on top of `AssignmentStore` to manage operators, sources, leads
/// and tickets.
#[async_trait]
pub trait DistributionStore: AssignmentStore {
    async fn create_operator(&self, operator: NewOperator) -> StoreResult<Operator>;

    /// Returns `None` if no operator exists with `operator_id`.
    async fn update_operator(
        &self,
        operator_id: i64,
        update: OperatorUpdate,
    ) -> StoreResult<Option<Operator>>;

    async fn list_operators(&self) -> StoreResult<Vec<Operator>>;

    async fn create_source(&self, name: &str) -> StoreResult<Source>;

    async fn get_source(&self, source_id: i64) -> StoreResult<Option<Source>>;

    async fn list_sources(&self) -> StoreResult<Vec<Source>>;

    /// Delete every assignment of `source_id` and insert `assignments` in its place.
    /// The caller is expected to have validated weights and references.
    async fn replace_assignments(
        &self,
        source_id: i64,
        assignments: &[NewAssignment],
    ) -> StoreResult<Vec<Assignment>>;

    /// Return the Lead identified by `lead.external_id`, creating it if it doesn't exist.
    async fn find_or_create_lead(&self, lead: NewLead) -> StoreResult<Lead>;

    /// A Lead with the number of tickets created for it.
    async fn get_lead(&self, lead_id: i64) -> StoreResult<Option<LeadSummary>>;

    async fn list_leads(&self) -> StoreResult<Vec<LeadSummary>>;

    async fn create_ticket(&self, ticket: NewTicket) -> StoreResult<Ticket>;

    /// Returns `None` if no ticket exists with `ticket_id`.
    async fn update_ticket_status(
        &self,
        ticket_id: i64,
        status: TicketStatus,
    ) -> StoreResult<Option<Ticket>>;

    async fn list_tickets(&self) -> StoreResult<Vec<Ticket>>;
}
