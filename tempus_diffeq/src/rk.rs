use std::array;

use tolerance::Tolerance;

use crate::{
    OdeError, OdeModel,
    result::StepStats,
    saving::ResultStorage,
    state::OdeState,
    stepping::{AdaptiveStepControl, FixedStepControl},
    tableau::{ButcherTableau, ErrorWeights},
};

// preallocated buffers for intermediate calculations
struct RkBuffers<State, const STAGES: usize> {
    /// Stage derivatives.
    k: [State; STAGES],
    /// Stage input under construction.
    state: State,
    /// Scratch for scaled derivative terms.
    derivative: State,
}

impl<State: OdeState, const STAGES: usize> Default for RkBuffers<State, STAGES> {
    fn default() -> Self {
        Self {
            k: array::from_fn(|_| State::default()),
            state: State::default(),
            derivative: State::default(),
        }
    }
}

/// target += dt * sum(w[s] * k[s]), accumulated through `scratch` so nothing
/// allocates.
fn accumulate<State: OdeState, const STAGES: usize>(
    target: &mut State,
    scratch: &mut State,
    k: &[State; STAGES],
    w: &[f64; STAGES],
    dt: f64,
) {
    for s in 0..STAGES {
        scratch.clone_from(&k[s]);
        *scratch *= w[s] * dt;
        *target += &*scratch;
    }
}

/// Mutable stepping context for one integration: current time, step size,
/// state, stage cache, and counters. One `RungeKutta` belongs to exactly one
/// integration; the tableau it holds is a shared, immutable constant.
pub struct RungeKutta<State: OdeState, const STAGES: usize> {
    /// Current time.
    t: f64,
    /// Current step size, signed consistent with the direction of integration.
    dt: f64,
    /// Current accepted state.
    x: State,
    /// Proposal produced by the last step attempt.
    y: State,
    /// Error estimate of the last step attempt.
    y_err: State,
    tableau: ButcherTableau<STAGES>,
    tolerances: State::Tolerance,
    buffers: RkBuffers<State, STAGES>,
    /// Whether `k[last]` from the previous accepted step may serve as this
    /// step's first stage.
    fsal_ready: bool,
    stats: StepStats,
}

impl<State: OdeState, const STAGES: usize> RungeKutta<State, STAGES> {
    pub fn new(tableau: ButcherTableau<STAGES>) -> Self {
        Self {
            t: 0.0,
            dt: 0.0,
            x: State::default(),
            y: State::default(),
            y_err: State::default(),
            tableau,
            tolerances: State::Tolerance::default(),
            buffers: RkBuffers::default(),
            fsal_ready: false,
            stats: StepStats::default(),
        }
    }

    /// Installs per-component tolerance overrides for adaptive error control.
    pub fn with_tolerances(mut self, tolerances: State::Tolerance) -> Self {
        self.tolerances = tolerances;
        self
    }

    pub fn tableau(&self) -> &ButcherTableau<STAGES> {
        &self.tableau
    }

    pub fn time(&self) -> f64 {
        self.t
    }

    pub fn state(&self) -> &State {
        &self.x
    }

    pub fn stats(&self) -> StepStats {
        self.stats
    }

    /// Consumes the stepper, returning the final time, state, and statistics.
    pub fn finish(self) -> (f64, State, StepStats) {
        (self.t, self.x, self.stats)
    }

    /// Seeds the stepping context. All buffers are shaped from `x0`, so
    /// dynamically sized states never reallocate during stepping.
    pub fn init(&mut self, t0: f64, dt: f64, x0: &State) {
        self.t = t0;
        self.dt = dt;
        self.x.clone_from(x0);
        self.y.clone_from(x0);
        self.y_err.clone_from(x0);
        self.buffers.state.clone_from(x0);
        self.buffers.derivative.clone_from(x0);
        for k in &mut self.buffers.k {
            k.clone_from(x0);
        }
        self.fsal_ready = false;
        self.stats = StepStats::default();
    }

    /// Evaluates the stage derivatives for a step from `(t, x)` with the
    /// current `dt`. Stage `s` depends only on stages `0..s`, so this is a
    /// plain indexed accumulation.
    fn eval_stages<Model: OdeModel<State = State>>(
        &mut self,
        model: &mut Model,
    ) -> Result<(), OdeError> {
        let (t, dt) = (self.t, self.dt);
        let a = self.tableau.a;
        let c = self.tableau.c;

        if self.fsal_ready && self.tableau.is_fsal() {
            // the previous accepted step evaluated its last stage at exactly
            // this (t, x); move it into slot 0 instead of recomputing
            self.buffers.k.swap(0, STAGES - 1);
        } else {
            model
                .f(t, &self.x, &mut self.buffers.k[0], 0)
                .map_err(|source| OdeError::RightHandSide { t, dt, source })?;
            self.stats.function_evals += 1;
            if !self.buffers.k[0].is_finite() {
                return Err(OdeError::NonFiniteDerivative { t, dt });
            }
        }

        for s in 1..STAGES {
            // in place construction of the stage input
            self.buffers.state *= 0.0;
            for i in 0..s {
                self.buffers.derivative.clone_from(&self.buffers.k[i]);
                self.buffers.derivative *= a[s][i];
                self.buffers.state += &self.buffers.derivative;
            }
            self.buffers.state *= dt;
            self.buffers.state += &self.x;

            let t_s = t + c[s] * dt;
            model
                .f(t_s, &self.buffers.state, &mut self.buffers.k[s], s)
                .map_err(|source| OdeError::RightHandSide { t: t_s, dt, source })?;
            self.stats.function_evals += 1;
            if !self.buffers.k[s].is_finite() {
                return Err(OdeError::NonFiniteDerivative { t: t_s, dt });
            }
        }

        Ok(())
    }

    /// One step of size `dt`: computes the proposal `y` from `x` using the
    /// primary weights. Acceptance is the driver's decision.
    pub fn step<Model: OdeModel<State = State>>(
        &mut self,
        model: &mut Model,
    ) -> Result<(), OdeError> {
        self.eval_stages(model)?;

        let b = self.tableau.b;
        self.y.clone_from(&self.x);
        accumulate(
            &mut self.y,
            &mut self.buffers.derivative,
            &self.buffers.k,
            &b,
            self.dt,
        );
        Ok(())
    }

    /// One step of size `dt` with an embedded error estimate. Fails with a
    /// usage error, touching no state, when the tableau is not adaptive.
    pub fn step_with_error<Model: OdeModel<State = State>>(
        &mut self,
        model: &mut Model,
    ) -> Result<(), OdeError> {
        let Some(error) = self.tableau.error else {
            return Err(OdeError::NotAdaptive {
                method: self.tableau.name,
            });
        };

        self.step(model)?;

        self.y_err *= 0.0;
        match error {
            ErrorWeights::Embedded { b2, .. } => {
                let mut w = [0.0; STAGES];
                for s in 0..STAGES {
                    w[s] = self.tableau.b[s] - b2[s];
                }
                accumulate(
                    &mut self.y_err,
                    &mut self.buffers.derivative,
                    &self.buffers.k,
                    &w,
                    self.dt,
                );
            }
            ErrorWeights::Direct { e, .. } => {
                accumulate(
                    &mut self.y_err,
                    &mut self.buffers.derivative,
                    &self.buffers.k,
                    &e,
                    self.dt,
                );
            }
        }
        Ok(())
    }

    /// Scaled norm of the last error estimate; <= 1 means the attempt
    /// satisfies the tolerances.
    pub fn error_norm(&self, rel_tol: f64, abs_tol: f64) -> f64 {
        self.tolerances
            .compute_error(&self.y, &self.x, &self.y_err, rel_tol, abs_tol)
    }

    /// Advances `t` and adopts the proposal. The last stage derivative stays
    /// cached for FSAL reuse.
    pub fn accept(&mut self) {
        self.t += self.dt;
        std::mem::swap(&mut self.x, &mut self.y);
        self.fsal_ready = true;
        self.stats.accepted += 1;
    }

    /// Discards the proposal without advancing; the stage cache is
    /// invalidated so the next attempt recomputes every stage.
    pub fn reject(&mut self) {
        self.fsal_ready = false;
        self.stats.rejected += 1;
    }

    /// Advances from `t0` to `t1` with a constant step, accepting every step.
    /// The final step is clamped so the integration lands exactly on `t1`.
    pub fn solve_fixed<Model: OdeModel<State = State>>(
        &mut self,
        model: &mut Model,
        x0: &State,
        tspan: (f64, f64),
        control: &FixedStepControl,
        dtmin: f64,
        storage: &mut ResultStorage<State>,
    ) -> Result<(), OdeError> {
        let (t0, t1) = tspan;
        let dir = (t1 - t0).signum();

        if !control.dt.is_finite() || control.dt.abs() < dtmin {
            return Err(OdeError::StepSizeUnderflow { t: t0, dt: control.dt });
        }

        self.init(t0, control.dt.abs() * dir, x0);
        storage.save(t0, x0)?;

        while (t1 - self.t) * dir > 0.0 {
            let remaining = t1 - self.t;
            let mut last = false;
            if remaining.abs() <= self.dt.abs() {
                self.dt = remaining;
                last = true;
            }

            self.step(model)?;
            self.accept();
            if last {
                // land exactly on the end of the span
                self.t = t1;
            }
            storage.save(self.t, &self.x)?;
        }
        Ok(())
    }

    /// Advances from `t0` to `t1` under adaptive error control: a step is
    /// accepted iff the scaled error norm is <= 1; rejected attempts shrink
    /// `dt` and retry without advancing. Shrinking below `dtmin` is fatal.
    pub fn solve_adaptive<Model: OdeModel<State = State>>(
        &mut self,
        model: &mut Model,
        x0: &State,
        tspan: (f64, f64),
        control: &mut AdaptiveStepControl,
        dtmin: f64,
        storage: &mut ResultStorage<State>,
    ) -> Result<(), OdeError> {
        if !self.tableau.is_adaptive() {
            return Err(OdeError::NotAdaptive {
                method: self.tableau.name,
            });
        }

        let (t0, t1) = tspan;
        let dir = (t1 - t0).signum();
        let order = self.tableau.order;

        self.init(t0, control.initial_dt(tspan) * dir, x0);
        storage.save(t0, x0)?;

        let mut attempts = 0usize;
        while (t1 - self.t) * dir > 0.0 {
            attempts += 1;
            if attempts > control.max_steps {
                return Err(OdeError::MaxStepsReached {
                    t: self.t,
                    max_steps: control.max_steps,
                });
            }

            let remaining = t1 - self.t;
            let mut last = false;
            if remaining.abs() <= self.dt.abs() {
                self.dt = remaining;
                last = true;
            }

            self.step_with_error(model)?;
            let error = self.error_norm(control.rel_tol, control.abs_tol);
            let dt_abs = self.dt.abs();

            if error <= 1.0 {
                self.accept();
                if last {
                    // land exactly on the end of the span
                    self.t = t1;
                }
                storage.save(self.t, &self.x)?;
                self.dt = control.next_step(dt_abs, error, order) * dir;
            } else {
                self.reject();
                let mut next = control.next_step(dt_abs, error, order);
                if next >= dt_abs {
                    // a rejected step must shrink regardless of clamps
                    next = 0.5 * dt_abs;
                }
                if next < dtmin {
                    return Err(OdeError::StepSizeUnderflow { t: self.t, dt: next });
                }
                self.dt = next * dir;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StateArray;
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

    #[test]
    fn test_feuler_single_step_is_exact() {
        let mut rk = RungeKutta::new(ButcherTableau::<1>::FEULER);
        rk.init(0.0, 0.1, &StateArray::new([1.0]));
        rk.step(&mut Decay).unwrap();
        assert_eq!(rk.y[0], 0.9);
    }

    #[test]
    fn test_rk4_single_step_matches_analytic() {
        let mut rk = RungeKutta::new(ButcherTableau::<4>::RK4);
        rk.init(0.0, 0.1, &StateArray::new([1.0]));
        rk.step(&mut Decay).unwrap();
        assert_relative_eq!(rk.y[0], (-0.1f64).exp(), epsilon = 1e-6);
        assert_eq!(rk.stats.function_evals, 4);
    }

    #[test]
    fn test_step_with_error_on_fixed_tableau_is_usage_error() {
        let x0 = StateArray::new([1.0]);
        let mut rk = RungeKutta::new(ButcherTableau::<4>::RK4);
        rk.init(0.0, 0.1, &x0);
        let err = rk.step_with_error(&mut Decay).unwrap_err();
        assert!(matches!(err, OdeError::NotAdaptive { method: "rk4" }));
        // no evaluation happened and no state moved
        assert_eq!(rk.stats.function_evals, 0);
        assert_eq!(rk.t, 0.0);
        assert_eq!(rk.x[0], 1.0);
    }

    #[test]
    fn test_embedded_error_estimate_differences_weight_rows() {
        let mut rk = RungeKutta::new(ButcherTableau::<7>::DOPRI45);
        rk.init(0.0, 0.1, &StateArray::new([1.0]));
        rk.step_with_error(&mut Decay).unwrap();
        // 5th order proposal is essentially exact for this step size
        assert_relative_eq!(rk.y[0], (-0.1f64).exp(), epsilon = 1e-9);
        // error estimate is small but nonzero
        assert!(rk.y_err[0].abs() > 0.0);
        assert!(rk.y_err[0].abs() < 1e-7);
    }

    #[test]
    fn test_direct_error_weights_match_embedded_difference() {
        let embedded = ButcherTableau::<2>::RK12;
        let ErrorWeights::Embedded { order, b2 } = embedded.error.unwrap() else {
            panic!("rk12 is an embedded pair");
        };
        let mut e = [0.0; 2];
        for s in 0..2 {
            e[s] = embedded.b[s] - b2[s];
        }
        let direct = ButcherTableau::<2> {
            error: Some(ErrorWeights::Direct { order, e }),
            ..embedded
        };

        let x0 = StateArray::new([1.0]);
        let mut rk_embedded = RungeKutta::new(embedded);
        rk_embedded.init(0.0, 0.1, &x0);
        rk_embedded.step_with_error(&mut Decay).unwrap();

        let mut rk_direct = RungeKutta::new(direct);
        rk_direct.init(0.0, 0.1, &x0);
        rk_direct.step_with_error(&mut Decay).unwrap();

        assert_relative_eq!(rk_embedded.y_err[0], rk_direct.y_err[0], max_relative = 1e-14);
        assert_relative_eq!(rk_embedded.y[0], rk_direct.y[0], max_relative = 1e-14);
    }

    #[test]
    fn test_fsal_reuses_last_stage_after_acceptance() {
        let mut rk = RungeKutta::new(ButcherTableau::<7>::DOPRI45);
        rk.init(0.0, 0.1, &StateArray::new([1.0]));

        rk.step_with_error(&mut Decay).unwrap();
        assert_eq!(rk.stats.function_evals, 7);

        rk.accept();
        rk.step_with_error(&mut Decay).unwrap();
        // first stage reused from the previous step's last stage
        assert_eq!(rk.stats.function_evals, 13);

        rk.reject();
        rk.step_with_error(&mut Decay).unwrap();
        // rejection invalidated the cache; all stages recomputed
        assert_eq!(rk.stats.function_evals, 20);
    }

    #[test]
    fn test_fsal_reuse_matches_recomputation() {
        let x0 = StateArray::new([1.0]);

        let mut with_cache = RungeKutta::new(ButcherTableau::<7>::DOPRI45);
        with_cache.init(0.0, 0.1, &x0);
        with_cache.step_with_error(&mut Decay).unwrap();
        with_cache.accept();
        with_cache.step_with_error(&mut Decay).unwrap();

        let mut without_cache = RungeKutta::new(ButcherTableau::<7>::DOPRI45);
        without_cache.init(0.0, 0.1, &x0);
        without_cache.step_with_error(&mut Decay).unwrap();
        without_cache.accept();
        without_cache.fsal_ready = false;
        without_cache.step_with_error(&mut Decay).unwrap();

        assert_eq!(with_cache.y[0], without_cache.y[0]);
    }

    #[derive(Debug)]
    struct BlowsUp;

    impl OdeModel for BlowsUp {
        type State = StateArray<1>;

        fn f(
            &mut self,
            _t: f64,
            x: &StateArray<1>,
            dx: &mut StateArray<1>,
            _stage: usize,
        ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            dx[0] = x[0] / 0.0;
            Ok(())
        }
    }

    #[test]
    fn test_non_finite_derivative_is_tagged_with_step_context() {
        let mut rk = RungeKutta::new(ButcherTableau::<4>::RK4);
        rk.init(2.0, 0.25, &StateArray::new([1.0]));
        let err = rk.step(&mut BlowsUp).unwrap_err();
        match err {
            OdeError::NonFiniteDerivative { t, dt } => {
                assert_eq!(t, 2.0);
                assert_eq!(dt, 0.25);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[derive(Debug)]
    struct Fails;

    impl OdeModel for Fails {
        type State = StateArray<1>;

        fn f(
            &mut self,
            _t: f64,
            _x: &StateArray<1>,
            _dx: &mut StateArray<1>,
            _stage: usize,
        ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            Err("lookup table exhausted".into())
        }
    }

    #[test]
    fn test_rhs_failure_propagates_with_step_context() {
        let mut rk = RungeKutta::new(ButcherTableau::<1>::FEULER);
        rk.init(1.5, 0.1, &StateArray::new([1.0]));
        let err = rk.step(&mut Fails).unwrap_err();
        match err {
            OdeError::RightHandSide { t, dt, source } => {
                assert_eq!(t, 1.5);
                assert_eq!(dt, 0.1);
                assert!(source.to_string().contains("lookup table"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
