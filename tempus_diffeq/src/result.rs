use serde::{Deserialize, Serialize};

use crate::{saving::ResultStorage, state::OdeState};

/// Step statistics accumulated over one integration. Counters only ever
/// increase while the solver runs.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepStats {
    /// Number of accepted steps.
    pub accepted: usize,
    /// Number of rejected step attempts.
    pub rejected: usize,
    /// Total right-hand-side evaluations.
    pub function_evals: usize,
}

/// The output of one integration: the final time and state, the accumulated
/// step statistics, and whatever trajectory storage was requested.
#[derive(Debug)]
pub struct OdeSolution<State: OdeState> {
    /// Final time; equals the end of the requested span on success.
    pub t: f64,
    /// Final state.
    pub y: State,
    pub stats: StepStats,
    pub storage: ResultStorage<State>,
}
