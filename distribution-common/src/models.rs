use std::fmt;
use std::str::FromStr;

use chrono::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Weight given to an operator for a source when none is provided.
pub const DEFAULT_WEIGHT: i32 = 10;
/// Maximum concurrent load given to an operator when none is provided.
pub const DEFAULT_MAX_LOAD: i32 = 5;

#[derive(Error, Debug, PartialEq, Eq)]
#[error("{0} is not a valid TicketStatus")]
pub struct ParseTicketStatusError(pub String);

/// Enumeration of possible statuses for a Ticket.
/// New: A ticket that was just created and possibly assigned to an operator.
/// InProgress: A ticket that an operator is currently handling.
/// Closed: A ticket that was handled. Closed tickets don't count towards an operator's load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "ticket_status")]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    New,
    InProgress,
    Closed,
}

impl TicketStatus {
    /// Open tickets are the ones that occupy a slot of the assigned operator.
    pub const OPEN: [TicketStatus; 2] = [TicketStatus::New, TicketStatus::InProgress];

    pub fn is_open(&self) -> bool {
        Self::OPEN.contains(self)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::New => "new",
            TicketStatus::InProgress => "in_progress",
            TicketStatus::Closed => "closed",
        }
    }
}

/// Allow casting TicketStatus from strings.
impl FromStr for TicketStatus {
    type Err = ParseTicketStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(TicketStatus::New),
            "in_progress" => Ok(TicketStatus::InProgress),
            "closed" => Ok(TicketStatus::Closed),
            invalid => Err(ParseTicketStatusError(invalid.to_owned())),
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Operator {
    pub id: i64,
    pub name: String,
    pub is_active: bool,
    pub max_load: i32,
}

impl Operator {
    /// Whether an operator with `current_load` open tickets can take one more.
    pub fn has_capacity(&self, current_load: i64) -> bool {
        current_load < i64::from(self.max_load)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOperator {
    pub name: String,
    pub is_active: bool,
    pub max_load: i32,
}

impl NewOperator {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            is_active: true,
            max_load: DEFAULT_MAX_LOAD,
        }
    }
}

/// A partial update of an Operator. Fields left as `None` are not modified.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperatorUpdate {
    pub is_active: Option<bool>,
    pub max_load: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Source {
    pub id: i64,
    pub name: String,
}

/// The weight an operator is given when distributing tickets of a source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Assignment {
    pub id: i64,
    pub source_id: i64,
    pub operator_id: i64,
    pub weight: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewAssignment {
    pub operator_id: i64,
    pub weight: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Lead {
    pub id: i64,
    pub external_id: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Contact details used to create a Lead if none exists yet for `external_id`.
/// An existing Lead is returned unmodified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLead {
    pub external_id: String,
    pub phone: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct LeadSummary {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub lead: Lead,
    pub tickets_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Ticket {
    pub id: i64,
    pub lead_id: i64,
    pub source_id: i64,
    pub operator_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub status: TicketStatus,
}

/// A NewTicket to be persisted. Tickets always start as `TicketStatus::New`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewTicket {
    pub lead_id: i64,
    pub source_id: i64,
    pub operator_id: Option<i64>,
}
