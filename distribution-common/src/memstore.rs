//! An in-memory DistributionStore.
//!
//! Used to test the assignment engine without a database, and to run the API locally with
//! `IN_MEMORY_STORE=true`. Nothing is persisted across restarts.
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;

use crate::models::{
    Assignment, Lead, LeadSummary, NewAssignment, NewLead, NewOperator, NewTicket, Operator,
    OperatorUpdate, Source, Ticket, TicketStatus,
};
use crate::store::{AssignmentStore, DistributionStore, StoreResult};

#[derive(Default)]
struct Tables {
    operators: Vec<Operator>,
    sources: Vec<Source>,
    assignments: Vec<Assignment>,
    leads: Vec<Lead>,
    tickets: Vec<Ticket>,
    last_assignment_id: i64,
}

impl Tables {
    fn summarize(&self, lead: &Lead) -> LeadSummary {
        LeadSummary {
            lead: lead.clone(),
            tickets_count: self
                .tickets
                .iter()
                .filter(|ticket| ticket.lead_id == lead.id)
                .count() as i64,
        }
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        // Every mutation below is applied in full before the guard is dropped, so the data is
        // still consistent if another holder panicked.
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn next_id(len: usize) -> i64 {
    len as i64 + 1
}

#[async_trait]
impl AssignmentStore for MemoryStore {
    async fn list_assignments(&self, source_id: i64) -> StoreResult<Vec<Assignment>> {
        Ok(self
            .tables()
            .assignments
            .iter()
            .filter(|assignment| assignment.source_id == source_id)
            .cloned()
            .collect())
    }

    async fn get_operator(&self, operator_id: i64) -> StoreResult<Option<Operator>> {
        Ok(self
            .tables()
            .operators
            .iter()
            .find(|operator| operator.id == operator_id)
            .cloned())
    }

    async fn count_open_tickets(&self, operator_id: i64) -> StoreResult<i64> {
        let count = self
            .tables()
            .tickets
            .iter()
            .filter(|ticket| ticket.operator_id == Some(operator_id) && ticket.status.is_open())
            .count();

        Ok(count as i64)
    }
}

#[async_trait]
impl DistributionStore for MemoryStore {
    async fn create_operator(&self, operator: NewOperator) -> StoreResult<Operator> {
        let mut tables = self.tables();
        let operator = Operator {
            id: next_id(tables.operators.len()),
            name: operator.name,
            is_active: operator.is_active,
            max_load: operator.max_load,
        };
        tables.operators.push(operator.clone());

        Ok(operator)
    }

    async fn update_operator(
        &self,
        operator_id: i64,
        update: OperatorUpdate,
    ) -> StoreResult<Option<Operator>> {
        let mut tables = self.tables();
        let Some(operator) = tables
            .operators
            .iter_mut()
            .find(|operator| operator.id == operator_id)
        else {
            return Ok(None);
        };

        if let Some(is_active) = update.is_active {
            operator.is_active = is_active;
        }
        if let Some(max_load) = update.max_load {
            operator.max_load = max_load;
        }

        Ok(Some(operator.clone()))
    }

    async fn list_operators(&self) -> StoreResult<Vec<Operator>> {
        Ok(self.tables().operators.clone())
    }

    async fn create_source(&self, name: &str) -> StoreResult<Source> {
        let mut tables = self.tables();
        let source = Source {
            id: next_id(tables.sources.len()),
            name: name.to_owned(),
        };
        tables.sources.push(source.clone());

        Ok(source)
    }

    async fn get_source(&self, source_id: i64) -> StoreResult<Option<Source>> {
        Ok(self
            .tables()
            .sources
            .iter()
            .find(|source| source.id == source_id)
            .cloned())
    }

    async fn list_sources(&self) -> StoreResult<Vec<Source>> {
        Ok(self.tables().sources.clone())
    }

    async fn replace_assignments(
        &self,
        source_id: i64,
        assignments: &[NewAssignment],
    ) -> StoreResult<Vec<Assignment>> {
        let mut tables = self.tables();
        tables
            .assignments
            .retain(|assignment| assignment.source_id != source_id);

        let mut inserted = Vec::with_capacity(assignments.len());
        for assignment in assignments {
            tables.last_assignment_id += 1;
            let assignment = Assignment {
                id: tables.last_assignment_id,
                source_id,
                operator_id: assignment.operator_id,
                weight: assignment.weight,
            };
            tables.assignments.push(assignment.clone());
            inserted.push(assignment);
        }

        Ok(inserted)
    }

    async fn find_or_create_lead(&self, lead: NewLead) -> StoreResult<Lead> {
        let mut tables = self.tables();
        if let Some(existing) = tables
            .leads
            .iter()
            .find(|existing| existing.external_id == lead.external_id)
        {
            return Ok(existing.clone());
        }

        let lead = Lead {
            id: next_id(tables.leads.len()),
            external_id: lead.external_id,
            phone: lead.phone,
            email: lead.email,
            created_at: Utc::now(),
        };
        tables.leads.push(lead.clone());

        Ok(lead)
    }

    async fn get_lead(&self, lead_id: i64) -> StoreResult<Option<LeadSummary>> {
        let tables = self.tables();

        Ok(tables
            .leads
            .iter()
            .find(|lead| lead.id == lead_id)
            .map(|lead| tables.summarize(lead)))
    }

    async fn list_leads(&self) -> StoreResult<Vec<LeadSummary>> {
        let tables = self.tables();

        Ok(tables.leads.iter().map(|lead| tables.summarize(lead)).collect())
    }

    async fn create_ticket(&self, ticket: NewTicket) -> StoreResult<Ticket> {
        let mut tables = self.tables();
        let ticket = Ticket {
            id: next_id(tables.tickets.len()),
            lead_id: ticket.lead_id,
            source_id: ticket.source_id,
            operator_id: ticket.operator_id,
            created_at: Utc::now(),
            status: TicketStatus::New,
        };
        tables.tickets.push(ticket.clone());

        Ok(ticket)
    }

    async fn update_ticket_status(
        &self,
        ticket_id: i64,
        status: TicketStatus,
    ) -> StoreResult<Option<Ticket>> {
        let mut tables = self.tables();

        Ok(tables
            .tickets
            .iter_mut()
            .find(|ticket| ticket.id == ticket_id)
            .map(|ticket| {
                ticket.status = status;
                ticket.clone()
            }))
    }

    async fn list_tickets(&self) -> StoreResult<Vec<Ticket>> {
        Ok(self.tables().tickets.clone())
    }
}
