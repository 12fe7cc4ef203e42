//! Explicit Runge-Kutta time integration for ordinary differential equations.
//!
//! A [`ButcherTableau`](tableau::ButcherTableau) describes one explicit
//! scheme as tabulated coefficients; [`RungeKutta`](rk::RungeKutta) turns a
//! tableau plus a right-hand side into single steps, with or without an
//! embedded error estimate; [`OdeProblem`] drives repeated stepping, fixed
//! or adaptive, from the start of a time span to its end.

use std::fmt::Debug;

use thiserror::Error;

pub mod ensemble;
pub mod result;
pub mod rk;
pub mod saving;
pub mod solvers;
pub mod state;
pub mod stepping;
pub mod tableau;

use crate::{
    result::OdeSolution,
    saving::{MemoryResult, ResultStorage, SaveMethod, StateWriter},
    solvers::RungeKuttaMethod,
    state::OdeState,
    stepping::{AdaptiveStepControl, FixedStepControl},
};

/// Trait for defining a dynamical system model that can be numerically
/// integrated.
///
/// Types implementing this trait must define how to compute the derivative
/// (or RHS function) of the ODE at a given time and state.
pub trait OdeModel: Debug {
    type State: OdeState;

    /// Compute the derivative at time `t` and state `x`, storing the result
    /// in `dx`. `stage` identifies the evaluation within the current step;
    /// it is informational and may be ignored.
    fn f(
        &mut self,
        t: f64,
        x: &Self::State,
        dx: &mut Self::State,
        stage: usize,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Failures of the integration core.
///
/// Only step rejection under adaptive control is recoverable, and it is
/// handled internally (and counted); everything here surfaces to the caller.
#[derive(Debug, Error)]
pub enum OdeError {
    /// The time span must be two distinct, finite times.
    #[error("tspan must be two distinct, finite times")]
    InvalidTimeSpan,
    /// Error-controlled stepping was requested from a method that has no
    /// embedded error estimate. A caller mistake, never retried.
    #[error("method '{method}' has no embedded error estimate")]
    NotAdaptive { method: &'static str },
    /// Adaptive rejection shrank the step below the precision floor without
    /// reaching an acceptable error.
    #[error("step size underflow at t = {t} (dt = {dt:e})")]
    StepSizeUnderflow { t: f64, dt: f64 },
    /// The step budget ran out before the end of the span.
    #[error("maximum number of step attempts ({max_steps}) reached at t = {t}")]
    MaxStepsReached { t: f64, max_steps: usize },
    /// The right-hand side produced a non-finite derivative.
    #[error("non-finite derivative at t = {t} (dt = {dt:e})")]
    NonFiniteDerivative { t: f64, dt: f64 },
    /// The right-hand side itself failed.
    #[error("right-hand side failed at t = {t} (dt = {dt:e}): {source}")]
    RightHandSide {
        t: f64,
        dt: f64,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("failed to write results: {0}")]
    Save(#[from] csv::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A validated initial-value problem: model, time span, and initial state.
///
/// Immutable once built apart from the model itself, which the solvers
/// borrow mutably while evaluating derivatives.
#[derive(Debug)]
pub struct OdeProblem<Model, State>
where
    Model: OdeModel<State = State>,
    State: OdeState,
{
    model: Model,
    tspan: (f64, f64),
    x0: State,
}

impl<Model, State> OdeProblem<Model, State>
where
    Model: OdeModel<State = State>,
    State: OdeState,
{
    /// Creates a new problem, validating the time span.
    pub fn new(model: Model, tspan: (f64, f64), x0: State) -> Result<Self, OdeError> {
        if !tspan.0.is_finite() || !tspan.1.is_finite() || tspan.0 == tspan.1 {
            return Err(OdeError::InvalidTimeSpan);
        }
        Ok(Self { model, tspan, x0 })
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn tspan(&self) -> (f64, f64) {
        self.tspan
    }

    pub fn x0(&self) -> &State {
        &self.x0
    }

    /// Minimum usable step size for the working precision, used to detect
    /// step-size underflow during adaptive retry.
    ///
    /// With `use_end_time` the floor scales with the magnitude of the span's
    /// endpoints, so spans far from the origin cannot request steps below
    /// the local spacing of representable times.
    pub fn dtmin(&self, use_end_time: bool) -> f64 {
        if use_end_time {
            let scale = self.tspan.0.abs().max(self.tspan.1.abs()).max(1.0);
            scale * f64::EPSILON
        } else {
            f64::EPSILON
        }
    }

    /// Integrates over the span with a constant step `dt`, clamping the
    /// final step so the result lands exactly on the end of the span.
    pub fn solve_fixed(
        &mut self,
        method: RungeKuttaMethod,
        dt: f64,
        save_method: SaveMethod,
    ) -> Result<OdeSolution<State>, OdeError> {
        let dtmin = self.dtmin(true);
        if !dt.is_finite() || dt.abs() < dtmin {
            return Err(OdeError::StepSizeUnderflow { t: self.tspan.0, dt });
        }

        let span = (self.tspan.1 - self.tspan.0).abs();
        let n = (span / dt.abs()).ceil() as usize + 1;
        let mut storage = self.storage(save_method, n)?;

        let control = FixedStepControl::new(dt);
        let (t, y, stats) = method.solve_fixed(
            &mut self.model,
            &self.x0,
            self.tspan,
            &control,
            dtmin,
            &mut storage,
        )?;

        storage.truncate()?;
        Ok(OdeSolution { t, y, stats, storage })
    }

    /// Integrates over the span under adaptive step-size control.
    pub fn solve_adaptive(
        &mut self,
        method: RungeKuttaMethod,
        mut control: AdaptiveStepControl,
        save_method: SaveMethod,
    ) -> Result<OdeSolution<State>, OdeError> {
        let span = (self.tspan.1 - self.tspan.0).abs();
        let n = if let Some(max_dt) = control.max_dt {
            (span / max_dt).ceil() as usize + 1
        } else {
            // conservative allocation: one save per unit of time
            span.ceil() as usize + 1
        };
        let mut storage = self.storage(save_method, n)?;

        let dtmin = self.dtmin(true);
        let (t, y, stats) = method.solve_adaptive(
            &mut self.model,
            &self.x0,
            self.tspan,
            &mut control,
            dtmin,
            &mut storage,
        )?;

        storage.truncate()?;
        Ok(OdeSolution { t, y, stats, storage })
    }

    fn storage(
        &self,
        save_method: SaveMethod,
        n: usize,
    ) -> Result<ResultStorage<State>, OdeError> {
        // cap the preallocation; the memory buffer grows on demand anyway
        let n = n.min(1 << 20);
        Ok(match save_method {
            SaveMethod::Memory => ResultStorage::Memory(MemoryResult::new(n)),
            SaveMethod::File(path) => {
                ResultStorage::File(StateWriter::create(&path, &self.x0)?)
            }
            SaveMethod::None => ResultStorage::None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{StateArray, StateVector};
    use approx::assert_relative_eq;

    #[derive(Debug)]
    struct Decay;

    impl OdeModel for Decay {
        type State = StateArray<1>;

        fn f(
            &mut self,
            _t: f64,
            x: &StateArray<1>,
            dx: &mut StateArray<1>,
            _stage: usize,
        ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            dx[0] = -x[0];
            Ok(())
        }
    }

    #[derive(Debug)]
    struct VectorDecay;

    impl OdeModel for VectorDecay {
        type State = StateVector;

        fn f(
            &mut self,
            _t: f64,
            x: &StateVector,
            dx: &mut StateVector,
            _stage: usize,
        ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            for i in 0..x.len() {
                dx[i] = -x[i];
            }
            Ok(())
        }
    }

    fn decay_problem() -> OdeProblem<Decay, StateArray<1>> {
        OdeProblem::new(Decay, (0.0, 1.0), StateArray::new([1.0])).unwrap()
    }

    /// Global error of a fixed-step integration of du/dt = -u over [0, 1].
    fn global_error(method: RungeKuttaMethod, dt: f64) -> f64 {
        let solution = decay_problem()
            .solve_fixed(method, dt, SaveMethod::None)
            .unwrap();
        (solution.y[0] - (-1.0f64).exp()).abs()
    }

    #[test]
    fn test_tspan_must_be_two_distinct_finite_times() {
        let err = OdeProblem::new(Decay, (1.0, 1.0), StateArray::new([1.0])).unwrap_err();
        assert!(matches!(err, OdeError::InvalidTimeSpan));
        let err =
            OdeProblem::new(Decay, (0.0, f64::INFINITY), StateArray::new([1.0])).unwrap_err();
        assert!(matches!(err, OdeError::InvalidTimeSpan));
    }

    #[test]
    fn test_order_of_convergence_under_step_halving() {
        // global error must scale as O(h^p): halving h divides the error
        // by roughly 2^p
        for (method, order) in [
            (RungeKuttaMethod::Feuler, 1),
            (RungeKuttaMethod::Midpoint, 2),
            (RungeKuttaMethod::Heun, 2),
            (RungeKuttaMethod::Rk4, 4),
        ] {
            let coarse = global_error(method, 0.02);
            let fine = global_error(method, 0.01);
            let ratio = coarse / fine;
            let expected = 2.0f64.powi(order);
            assert!(
                (ratio / expected - 1.0).abs() < 0.25,
                "{method:?}: expected error ratio near {expected}, got {ratio}"
            );
        }
    }

    #[test]
    fn test_final_time_is_exact_with_clamped_last_step() {
        // 0.3 does not divide 1.0; the last step must be clamped
        let solution = decay_problem()
            .solve_fixed(RungeKuttaMethod::Rk4, 0.3, SaveMethod::Memory)
            .unwrap();
        assert_eq!(solution.t, 1.0);
        assert_relative_eq!(solution.y[0], (-1.0f64).exp(), epsilon = 1e-4);
        let ResultStorage::Memory(result) = &solution.storage else {
            panic!("memory storage requested");
        };
        // x0 saved up front, then four steps: 0.3, 0.6, 0.9, 1.0
        assert_eq!(result.len(), 5);
        assert_eq!(result.t[4], 1.0);
        assert_eq!(solution.stats.accepted, 4);
    }

    #[test]
    fn test_adaptive_reaches_end_time_exactly() {
        let solution = decay_problem()
            .solve_adaptive(
                RungeKuttaMethod::DoPri45,
                AdaptiveStepControl::default(),
                SaveMethod::Memory,
            )
            .unwrap();
        assert_eq!(solution.t, 1.0);
        assert_relative_eq!(solution.y[0], (-1.0f64).exp(), epsilon = 1e-4);
        assert!(solution.stats.accepted > 0);
    }

    #[test]
    fn test_adaptive_rejects_and_retries_with_smaller_steps() {
        // a large initial step with tight tolerances forces rejections
        let control = AdaptiveStepControl::default()
            .with_rel_tol(1e-10)
            .with_abs_tol(1e-10)
            .with_init_dt(0.5);
        let solution = decay_problem()
            .solve_adaptive(RungeKuttaMethod::Rk23, control, SaveMethod::None)
            .unwrap();
        assert!(solution.stats.rejected > 0);
        assert_eq!(solution.t, 1.0);
        assert_relative_eq!(solution.y[0], (-1.0f64).exp(), epsilon = 1e-6);
    }

    #[test]
    fn test_unreachable_tolerance_underflows_step_size() {
        let control = AdaptiveStepControl::default()
            .with_rel_tol(1e-300)
            .with_abs_tol(1e-300);
        let err = decay_problem()
            .solve_adaptive(RungeKuttaMethod::DoPri45, control, SaveMethod::None)
            .unwrap_err();
        assert!(matches!(err, OdeError::StepSizeUnderflow { .. }));
    }

    #[test]
    fn test_adaptive_drive_of_fixed_method_is_usage_error() {
        let err = decay_problem()
            .solve_adaptive(
                RungeKuttaMethod::Rk4,
                AdaptiveStepControl::default(),
                SaveMethod::None,
            )
            .unwrap_err();
        assert!(matches!(err, OdeError::NotAdaptive { method: "rk4" }));
    }

    #[test]
    fn test_backward_span_integration() {
        // integrate du/dt = -u backward from t=1, u=1/e to t=0
        let mut problem =
            OdeProblem::new(Decay, (1.0, 0.0), StateArray::new([(-1.0f64).exp()])).unwrap();
        let solution = problem
            .solve_fixed(RungeKuttaMethod::Rk4, 0.01, SaveMethod::None)
            .unwrap();
        assert_eq!(solution.t, 0.0);
        assert_relative_eq!(solution.y[0], 1.0, epsilon = 1e-8);
    }

    #[test]
    fn test_scalar_promotion_drives_vector_state() {
        let mut problem = OdeProblem::new(VectorDecay, (0.0, 1.0), StateVector::from(1.0)).unwrap();
        let solution = problem
            .solve_fixed(RungeKuttaMethod::Rk4, 0.05, SaveMethod::None)
            .unwrap();
        assert_eq!(solution.y.len(), 1);
        assert_relative_eq!(solution.y[0], (-1.0f64).exp(), epsilon = 1e-8);
    }

    #[test]
    fn test_fsal_saves_one_evaluation_per_step() {
        let solution = decay_problem()
            .solve_fixed(RungeKuttaMethod::DoPri45, 0.1, SaveMethod::None)
            .unwrap();
        // 10 steps: 7 evaluations for the first, 6 for each reuse
        assert_eq!(solution.stats.accepted, 10);
        assert_eq!(solution.stats.function_evals, 7 + 9 * 6);
    }

    #[test]
    fn test_dtmin_scales_with_endpoint_magnitude() {
        let problem = OdeProblem::new(Decay, (0.0, 1e6), StateArray::new([1.0])).unwrap();
        assert!(problem.dtmin(true) >= 1e6 * f64::EPSILON);
        assert_eq!(problem.dtmin(false), f64::EPSILON);
    }

    #[test]
    fn test_zero_step_size_is_rejected() {
        let err = decay_problem()
            .solve_fixed(RungeKuttaMethod::Rk4, 0.0, SaveMethod::None)
            .unwrap_err();
        assert!(matches!(err, OdeError::StepSizeUnderflow { .. }));
    }

    #[test]
    fn test_csv_saving_records_trajectory() {
        let dir = std::env::temp_dir().join("tempus_diffeq_solve_csv");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("decay.csv");

        decay_problem()
            .solve_fixed(RungeKuttaMethod::Rk4, 0.25, SaveMethod::File(path.clone()))
            .unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines[0], "t,x0");
        // header plus x0 plus four steps
        assert_eq!(lines.len(), 6);
        assert!(lines[5].starts_with("1,"));
    }
}
