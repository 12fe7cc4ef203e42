use indicatif::ProgressBar;
use rand::{Rng, SeedableRng, rngs::SmallRng};
use rayon::prelude::*;

use crate::{
    OdeError, OdeModel, OdeProblem,
    result::OdeSolution,
    saving::SaveMethod,
    solvers::RungeKuttaMethod,
    state::OdeState,
    stepping::AdaptiveStepControl,
};

/// Runs many independent integrations of sampled problems in parallel.
///
/// Each run draws its model and initial state from the user's sampler with a
/// run-specific RNG derived from the ensemble seed, so a given seed
/// reproduces the whole ensemble regardless of thread scheduling. Tableaus
/// are shared read-only across runs; every run owns its stepping state.
#[derive(Clone, Copy, Debug)]
pub struct EnsembleSolver {
    method: RungeKuttaMethod,
    nruns: usize,
    seed: u64,
}

impl EnsembleSolver {
    pub fn new(method: RungeKuttaMethod, nruns: usize) -> Self {
        let mut rng = rand::rng();
        Self {
            method,
            nruns,
            seed: rng.random::<u64>(),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Per-run seeds drawn sequentially so run `i` is independent of how the
    /// runs are scheduled.
    fn run_seeds(&self) -> Vec<u64> {
        let mut rng = SmallRng::seed_from_u64(self.seed);
        (0..self.nruns).map(|_| rng.random::<u64>()).collect()
    }

    /// Solves every sampled problem with adaptive stepping, returning the
    /// solutions in run order. The first failing run aborts the ensemble.
    pub fn solve_adaptive<Sampler, Model, State>(
        &self,
        sampler: Sampler,
        tspan: (f64, f64),
        control: AdaptiveStepControl,
    ) -> Result<Vec<OdeSolution<State>>, OdeError>
    where
        Sampler: Fn(usize, &mut SmallRng) -> (Model, State) + Send + Sync,
        Model: OdeModel<State = State>,
        State: OdeState + Send + Sync,
    {
        let bar = ProgressBar::new(self.nruns as u64);
        let results = self
            .run_seeds()
            .into_par_iter()
            .enumerate()
            .map(|(run, seed)| {
                let mut rng = SmallRng::seed_from_u64(seed);
                let (model, x0) = sampler(run, &mut rng);
                let mut problem = OdeProblem::new(model, tspan, x0)?;
                let solution = problem.solve_adaptive(self.method, control, SaveMethod::Memory)?;
                bar.inc(1);
                Ok(solution)
            })
            .collect::<Result<Vec<_>, OdeError>>();
        bar.finish();
        results
    }

    /// Solves every sampled problem with a constant step, returning the
    /// solutions in run order.
    pub fn solve_fixed<Sampler, Model, State>(
        &self,
        sampler: Sampler,
        tspan: (f64, f64),
        dt: f64,
    ) -> Result<Vec<OdeSolution<State>>, OdeError>
    where
        Sampler: Fn(usize, &mut SmallRng) -> (Model, State) + Send + Sync,
        Model: OdeModel<State = State>,
        State: OdeState + Send + Sync,
    {
        let bar = ProgressBar::new(self.nruns as u64);
        let results = self
            .run_seeds()
            .into_par_iter()
            .enumerate()
            .map(|(run, seed)| {
                let mut rng = SmallRng::seed_from_u64(seed);
                let (model, x0) = sampler(run, &mut rng);
                let mut problem = OdeProblem::new(model, tspan, x0)?;
                let solution = problem.solve_fixed(self.method, dt, SaveMethod::Memory)?;
                bar.inc(1);
                Ok(solution)
            })
            .collect::<Result<Vec<_>, OdeError>>();
        bar.finish();
        results
    }
}
