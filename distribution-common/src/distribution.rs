//! Assignment of tickets to operators.
//!
//! Picking an operator happens in two steps:
//!   - `find_available` resolves which operators assigned to a source can take a ticket right
//!     now: they must be active and under their `max_load`.
//!   - `select_operator` picks one of them at random, proportionally to their weight.
//!
//! `Distributor` composes both for callers. The load read and the ticket insert that follows
//! are not atomic: two concurrent requests may pick the same operator and push it over its
//! `max_load`. This is soft load balancing, not admission control.
use std::sync::{Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use tracing::{debug, info, instrument, warn};

use crate::models::Operator;
use crate::store::{AssignmentStore, StoreResult};

/// An operator that can take a ticket, with the weight it was given for the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub operator: Operator,
    pub weight: u64,
}

/// The operators of a source that can take a ticket right now.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Availability {
    pub candidates: Vec<Candidate>,
    pub total_weight: u64,
}

impl Availability {
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// Find the operators assigned to `source_id` that are active and under their load ceiling.
///
/// Candidates keep the order of the source's assignments. An empty result means no operator
/// is available now, which is not an error. Store failures are returned unchanged.
#[instrument(skip(store))]
pub async fn find_available<S>(store: &S, source_id: i64) -> StoreResult<Availability>
where
    S: AssignmentStore + Sync + ?Sized,
{
    let assignments = store.list_assignments(source_id).await?;
    let mut availability = Availability::default();

    for assignment in assignments {
        let Some(operator) = store.get_operator(assignment.operator_id).await? else {
            warn!(
                operator_id = assignment.operator_id,
                "skipping assignment to missing operator"
            );
            continue;
        };

        if !operator.is_active {
            continue;
        }

        let current_load = store.count_open_tickets(operator.id).await?;
        if !operator.has_capacity(current_load) {
            debug!(
                operator_id = operator.id,
                current_load,
                max_load = operator.max_load,
                "operator is at capacity"
            );
            continue;
        }

        // Weights are validated as positive on write; anything else carries no probability.
        let weight = u64::try_from(assignment.weight).unwrap_or(0);
        availability.total_weight += weight;
        availability.candidates.push(Candidate { operator, weight });
    }

    Ok(availability)
}

/// Pick one candidate with probability `weight / total_weight`.
///
/// Draws `r` uniformly in `[1, total_weight]` and returns the first candidate whose cumulative
/// weight reaches `r`. When `total_weight` is zero, or the walk ends without a match, the first
/// candidate is returned. Only an empty list yields `None`.
pub fn select_operator<'a, R: Rng>(
    candidates: &'a [Candidate],
    total_weight: u64,
    rng: &mut R,
) -> Option<&'a Operator> {
    let first = candidates.first()?;

    // Assumed tie-break: with the default weight this should be unreachable.
    if total_weight == 0 {
        return Some(&first.operator);
    }

    let r = rng.gen_range(1..=total_weight);
    let mut cumulative = 0;

    for candidate in candidates {
        cumulative += candidate.weight;
        if cumulative >= r {
            return Some(&candidate.operator);
        }
    }

    Some(&first.operator)
}

/// Assigns tickets of a source to one of its available operators.
pub struct Distributor {
    rng: Mutex<Box<dyn RngCore + Send>>,
}

impl Default for Distributor {
    fn default() -> Self {
        Self::new()
    }
}

impl Distributor {
    /// A Distributor drawing from an entropy-seeded generator.
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// A Distributor drawing from `rng`, e.g. a seeded generator for reproducible selection.
    pub fn with_rng<R: RngCore + Send + 'static>(rng: R) -> Self {
        Self {
            rng: Mutex::new(Box::new(rng)),
        }
    }

    /// Pick the operator that should handle a new ticket of `source_id`.
    ///
    /// `None` means no operator is available now: the ticket should be created unassigned.
    /// No capacity is reserved for the returned operator.
    #[instrument(skip(self, store))]
    pub async fn assign<S>(&self, store: &S, source_id: i64) -> StoreResult<Option<Operator>>
    where
        S: AssignmentStore + Sync + ?Sized,
    {
        let availability = find_available(store, source_id).await?;
        metrics::histogram!("distribution_candidates").record(availability.candidates.len() as f64);

        let selected = {
            // The guard is dropped before anything else is awaited.
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            select_operator(&availability.candidates, availability.total_weight, &mut *rng)
                .cloned()
        };

        match &selected {
            Some(operator) => {
                metrics::counter!("distribution_assignments_total", "outcome" => "assigned")
                    .increment(1);
                info!(
                    operator_id = operator.id,
                    candidates = availability.candidates.len(),
                    "assigned operator"
                );
            }
            None => {
                metrics::counter!("distribution_assignments_total", "outcome" => "unassigned")
                    .increment(1);
                info!("no operator available");
            }
        }

        Ok(selected)
    }
}
