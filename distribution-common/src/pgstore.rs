//! A DistributionStore implemented on top of PostgreSQL tables.
//! The schema lives in the workspace `migrations` directory.
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::instrument;

use crate::models::{
    Assignment, Lead, LeadSummary, NewAssignment, NewLead, NewOperator, NewTicket, Operator,
    OperatorUpdate, Source, Ticket, TicketStatus,
};
use crate::store::{AssignmentStore, DistributionStore, StoreError, StoreResult};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

fn query_error(command: &str) -> impl FnOnce(sqlx::Error) -> StoreError + '_ {
    move |error| StoreError::QueryError {
        command: command.to_owned(),
        error,
    }
}

impl PgStore {
    /// Initialize a new PgStore connecting to the database at `url`.
    pub async fn new(url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|error| StoreError::ConnectionError { error })?;

        Ok(Self { pool })
    }

    /// Initialize a new PgStore from an existing pool, mostly useful for tests.
    pub fn new_from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create or update the schema by running all pending migrations.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../migrations").run(&self.pool).await
    }
}

#[async_trait]
impl AssignmentStore for PgStore {
    #[instrument(skip(self))]
    async fn list_assignments(&self, source_id: i64) -> StoreResult<Vec<Assignment>> {
        sqlx::query_as(
            r#"
SELECT
    id, source_id, operator_id, weight
FROM
    source_operators
WHERE
    source_id = $1
ORDER BY
    id
            "#,
        )
        .bind(source_id)
        .fetch_all(&self.pool)
        .await
        .map_err(query_error("SELECT"))
    }

    #[instrument(skip(self))]
    async fn get_operator(&self, operator_id: i64) -> StoreResult<Option<Operator>> {
        sqlx::query_as("SELECT id, name, is_active, max_load FROM operators WHERE id = $1")
            .bind(operator_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error("SELECT"))
    }

    #[instrument(skip(self))]
    async fn count_open_tickets(&self, operator_id: i64) -> StoreResult<i64> {
        sqlx::query_scalar(
            r#"
SELECT
    COUNT(*)
FROM
    tickets
WHERE
    operator_id = $1
    AND status IN ('new'::ticket_status, 'in_progress'::ticket_status)
            "#,
        )
        .bind(operator_id)
        .fetch_one(&self.pool)
        .await
        .map_err(query_error("SELECT"))
    }
}

#[async_trait]
impl DistributionStore for PgStore {
    #[instrument(skip_all)]
    async fn create_operator(&self, operator: NewOperator) -> StoreResult<Operator> {
        sqlx::query_as(
            r#"
INSERT INTO operators
    (name, is_active, max_load)
VALUES
    ($1, $2, $3)
RETURNING
    id, name, is_active, max_load
            "#,
        )
        .bind(&operator.name)
        .bind(operator.is_active)
        .bind(operator.max_load)
        .fetch_one(&self.pool)
        .await
        .map_err(query_error("INSERT"))
    }

    #[instrument(skip(self))]
    async fn update_operator(
        &self,
        operator_id: i64,
        update: OperatorUpdate,
    ) -> StoreResult<Option<Operator>> {
        sqlx::query_as(
            r#"
UPDATE
    operators
SET
    is_active = COALESCE($2, is_active),
    max_load = COALESCE($3, max_load)
WHERE
    id = $1
RETURNING
    id, name, is_active, max_load
            "#,
        )
        .bind(operator_id)
        .bind(update.is_active)
        .bind(update.max_load)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_error("UPDATE"))
    }

    async fn list_operators(&self) -> StoreResult<Vec<Operator>> {
        sqlx::query_as("SELECT id, name, is_active, max_load FROM operators ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(query_error("SELECT"))
    }

    #[instrument(skip(self))]
    async fn create_source(&self, name: &str) -> StoreResult<Source> {
        sqlx::query_as("INSERT INTO sources (name) VALUES ($1) RETURNING id, name")
            .bind(name)
            .fetch_one(&self.pool)
            .await
            .map_err(query_error("INSERT"))
    }

    async fn get_source(&self, source_id: i64) -> StoreResult<Option<Source>> {
        sqlx::query_as("SELECT id, name FROM sources WHERE id = $1")
            .bind(source_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error("SELECT"))
    }

    async fn list_sources(&self) -> StoreResult<Vec<Source>> {
        sqlx::query_as("SELECT id, name FROM sources ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(query_error("SELECT"))
    }

    #[instrument(skip(self, assignments), fields(count = assignments.len()))]
    async fn replace_assignments(
        &self,
        source_id: i64,
        assignments: &[NewAssignment],
    ) -> StoreResult<Vec<Assignment>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(query_error("BEGIN"))?;

        sqlx::query("DELETE FROM source_operators WHERE source_id = $1")
            .bind(source_id)
            .execute(&mut *tx)
            .await
            .map_err(query_error("DELETE"))?;

        let mut inserted = Vec::with_capacity(assignments.len());
        for assignment in assignments {
            let row: Assignment = sqlx::query_as(
                r#"
INSERT INTO source_operators
    (source_id, operator_id, weight)
VALUES
    ($1, $2, $3)
RETURNING
    id, source_id, operator_id, weight
                "#,
            )
            .bind(source_id)
            .bind(assignment.operator_id)
            .bind(assignment.weight)
            .fetch_one(&mut *tx)
            .await
            .map_err(query_error("INSERT"))?;

            inserted.push(row);
        }

        tx.commit().await.map_err(query_error("COMMIT"))?;

        Ok(inserted)
    }

    #[instrument(skip_all, fields(external_id = %lead.external_id))]
    async fn find_or_create_lead(&self, lead: NewLead) -> StoreResult<Lead> {
        // The no-op update makes RETURNING yield the existing row on conflict, so concurrent
        // requests for the same external_id settle on a single lead.
        sqlx::query_as(
            r#"
INSERT INTO leads
    (external_id, phone, email)
VALUES
    ($1, $2, $3)
ON CONFLICT (external_id) DO UPDATE SET
    external_id = EXCLUDED.external_id
RETURNING
    id, external_id, phone, email, created_at
            "#,
        )
        .bind(&lead.external_id)
        .bind(&lead.phone)
        .bind(&lead.email)
        .fetch_one(&self.pool)
        .await
        .map_err(query_error("INSERT"))
    }

    async fn get_lead(&self, lead_id: i64) -> StoreResult<Option<LeadSummary>> {
        sqlx::query_as(
            r#"
SELECT
    leads.id, leads.external_id, leads.phone, leads.email, leads.created_at,
    COUNT(tickets.id) AS tickets_count
FROM
    leads
    LEFT JOIN tickets ON tickets.lead_id = leads.id
WHERE
    leads.id = $1
GROUP BY
    leads.id
            "#,
        )
        .bind(lead_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_error("SELECT"))
    }

    async fn list_leads(&self) -> StoreResult<Vec<LeadSummary>> {
        sqlx::query_as(
            r#"
SELECT
    leads.id, leads.external_id, leads.phone, leads.email, leads.created_at,
    COUNT(tickets.id) AS tickets_count
FROM
    leads
    LEFT JOIN tickets ON tickets.lead_id = leads.id
GROUP BY
    leads.id
ORDER BY
    leads.id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(query_error("SELECT"))
    }

    #[instrument(skip(self))]
    async fn create_ticket(&self, ticket: NewTicket) -> StoreResult<Ticket> {
        sqlx::query_as(
            r#"
INSERT INTO tickets
    (lead_id, source_id, operator_id, created_at, status)
VALUES
    ($1, $2, $3, NOW(), $4)
RETURNING
    id, lead_id, source_id, operator_id, created_at, status
            "#,
        )
        .bind(ticket.lead_id)
        .bind(ticket.source_id)
        .bind(ticket.operator_id)
        .bind(TicketStatus::New)
        .fetch_one(&self.pool)
        .await
        .map_err(query_error("INSERT"))
    }

    #[instrument(skip(self))]
    async fn update_ticket_status(
        &self,
        ticket_id: i64,
        status: TicketStatus,
    ) -> StoreResult<Option<Ticket>> {
        sqlx::query_as(
            r#"
UPDATE
    tickets
SET
    status = $2
WHERE
    id = $1
RETURNING
    id, lead_id, source_id, operator_id, created_at, status
            "#,
        )
        .bind(ticket_id)
        .bind(status)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_error("UPDATE"))
    }

    async fn list_tickets(&self) -> StoreResult<Vec<Ticket>> {
        sqlx::query_as(
            "SELECT id, lead_id, source_id, operator_id, created_at, status FROM tickets ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(query_error("SELECT"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seed_source_with_operator(store: &PgStore, max_load: i32) -> (Source, Operator) {
        let operator = store
            .create_operator(NewOperator {
                name: "alice".to_owned(),
                is_active: true,
                max_load,
            })
            .await
            .unwrap();
        let source = store.create_source("telegram-bot").await.unwrap();
        store
            .replace_assignments(
                source.id,
                &[NewAssignment {
                    operator_id: operator.id,
                    weight: 10,
                }],
            )
            .await
            .unwrap();

        (source, operator)
    }

    #[sqlx::test(migrations = "../migrations")]
    #[ignore = "requires a postgres database at DATABASE_URL"]
    async fn test_count_open_tickets_ignores_closed(db: PgPool) {
        let store = PgStore::new_from_pool(db);
        let (source, operator) = seed_source_with_operator(&store, 5).await;
        let lead = store
            .find_or_create_lead(NewLead {
                external_id: "lead-1".to_owned(),
                phone: None,
                email: None,
            })
            .await
            .unwrap();

        let mut tickets = Vec::new();
        for _ in 0..3 {
            let ticket = store
                .create_ticket(NewTicket {
                    lead_id: lead.id,
                    source_id: source.id,
                    operator_id: Some(operator.id),
                })
                .await
                .unwrap();
            tickets.push(ticket);
        }
        assert_eq!(store.count_open_tickets(operator.id).await.unwrap(), 3);

        store
            .update_ticket_status(tickets[0].id, TicketStatus::InProgress)
            .await
            .unwrap();
        store
            .update_ticket_status(tickets[1].id, TicketStatus::Closed)
            .await
            .unwrap();

        assert_eq!(store.count_open_tickets(operator.id).await.unwrap(), 2);
    }

    #[sqlx::test(migrations = "../migrations")]
    #[ignore = "requires a postgres database at DATABASE_URL"]
    async fn test_find_or_create_lead_is_idempotent(db: PgPool) {
        let store = PgStore::new_from_pool(db);

        let first = store
            .find_or_create_lead(NewLead {
                external_id: "lead-42".to_owned(),
                phone: Some("+100000".to_owned()),
                email: None,
            })
            .await
            .unwrap();
        let second = store
            .find_or_create_lead(NewLead {
                external_id: "lead-42".to_owned(),
                phone: Some("+200000".to_owned()),
                email: Some("lead@example.com".to_owned()),
            })
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(second.phone.as_deref(), Some("+100000"));
        assert_eq!(store.list_leads().await.unwrap().len(), 1);
    }

    #[sqlx::test(migrations = "../migrations")]
    #[ignore = "requires a postgres database at DATABASE_URL"]
    async fn test_replace_assignments_drops_previous_set(db: PgPool) {
        let store = PgStore::new_from_pool(db);
        let (source, first) = seed_source_with_operator(&store, 5).await;
        let second = store.create_operator(NewOperator::new("bob")).await.unwrap();

        let replaced = store
            .replace_assignments(
                source.id,
                &[NewAssignment {
                    operator_id: second.id,
                    weight: 3,
                }],
            )
            .await
            .unwrap();

        let assignments = store.list_assignments(source.id).await.unwrap();
        assert_eq!(assignments, replaced);
        assert_eq!(assignments.len(), 1);
        assert_eq!(assignments[0].operator_id, second.id);
        assert_ne!(assignments[0].operator_id, first.id);
        assert_eq!(assignments[0].weight, 3);
    }

    #[sqlx::test(migrations = "../migrations")]
    #[ignore = "requires a postgres database at DATABASE_URL"]
    async fn test_update_operator_only_touches_given_fields(db: PgPool) {
        let store = PgStore::new_from_pool(db);
        let operator = store.create_operator(NewOperator::new("carol")).await.unwrap();

        let updated = store
            .update_operator(
                operator.id,
                OperatorUpdate {
                    is_active: Some(false),
                    max_load: None,
                },
            )
            .await
            .unwrap()
            .unwrap();

        assert!(!updated.is_active);
        assert_eq!(updated.max_load, operator.max_load);
        assert!(store
            .update_operator(operator.id + 1000, OperatorUpdate::default())
            .await
            .unwrap()
            .is_none());
    }
}
