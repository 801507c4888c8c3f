mod app;
mod leads;
mod operators;
mod sources;
mod tickets;

pub use app::{add_routes, AppState};
pub use operators::{OperatorPatchRequestBody, OperatorPostRequestBody, OperatorResponse};
pub use sources::{AssignmentRequestBody, MessageResponse, SourcePostRequestBody};
pub use tickets::{TicketPatchRequestBody, TicketPostRequestBody, TicketResponse};
