//! Step size control strategies for the ODE solvers.
//!
//! - `FixedStepControl`: constant step size, every step accepted.
//! - `AdaptiveStepControl`: adjusts the step size from the scaled error
//!   estimate of an embedded pair; a step is accepted iff that error is <= 1.

use serde::{Deserialize, Serialize};

/// Fixed-step control configuration.
#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
pub struct FixedStepControl {
    /// Constant step size magnitude; the solver signs it to match the
    /// direction of integration.
    pub dt: f64,
}

impl FixedStepControl {
    pub fn new(dt: f64) -> Self {
        Self { dt }
    }
}

/// Adaptive step size controller.
///
/// Uses an internal method (basic or PID) to adjust step size based on
/// normalized error. Provides absolute and relative tolerance configuration.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct AdaptiveStepControl {
    method: AdaptiveStepMethod,
    /// Relative tolerance used for error estimation.
    pub rel_tol: f64,
    /// Absolute tolerance used for error estimation.
    pub abs_tol: f64,
    /// Optional minimum allowed step size (applied when growing).
    pub min_dt: Option<f64>,
    /// Optional maximum allowed step size.
    pub max_dt: Option<f64>,
    /// Optional initial step size; defaults to a fraction of the span.
    pub init_dt: Option<f64>,
    /// Upper bound on total step attempts before the solver gives up.
    pub max_steps: usize,
}

impl Default for AdaptiveStepControl {
    fn default() -> Self {
        Self {
            method: AdaptiveStepMethod::Basic(BasicStepControl::default()),
            rel_tol: 1e-3,
            abs_tol: 1e-6,
            min_dt: None,
            max_dt: None,
            init_dt: None,
            max_steps: 100_000,
        }
    }
}

impl AdaptiveStepControl {
    pub fn with_abs_tol(mut self, abs_tol: f64) -> Self {
        self.abs_tol = abs_tol;
        self
    }

    pub fn with_rel_tol(mut self, rel_tol: f64) -> Self {
        self.rel_tol = rel_tol;
        self
    }

    pub fn with_min_dt(mut self, min_dt: f64) -> Self {
        self.min_dt = Some(min_dt);
        self
    }

    pub fn with_max_dt(mut self, max_dt: f64) -> Self {
        self.max_dt = Some(max_dt);
        self
    }

    pub fn with_init_dt(mut self, init_dt: f64) -> Self {
        self.init_dt = Some(init_dt);
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_method(mut self, method: AdaptiveStepMethod) -> Self {
        self.method = method;
        self
    }

    /// Initial step size magnitude for a span, when the user did not supply one.
    pub fn initial_dt(&self, tspan: (f64, f64)) -> f64 {
        let span = (tspan.1 - tspan.0).abs();
        let mut dt = self.init_dt.unwrap_or(span / 100.0);
        if let Some(max_dt) = self.max_dt {
            dt = dt.min(max_dt);
        }
        dt
    }

    /// Computes the next step size magnitude from the current one and the
    /// scaled error of the attempt.
    ///
    /// - `dt`: current step size magnitude
    /// - `error`: scaled RMS error (<= 1 means the attempt was accepted)
    /// - `order`: order of the advancing solution
    pub fn next_step(&mut self, dt: f64, error: f64, order: usize) -> f64 {
        let factor = match &mut self.method {
            AdaptiveStepMethod::Basic(basic) => basic.factor(error, order),
            AdaptiveStepMethod::Pid(pid) => pid.factor(error),
        };

        let mut new_dt = dt * factor;

        if let Some(min_dt) = self.min_dt {
            new_dt = new_dt.max(min_dt);
        }
        if let Some(max_dt) = self.max_dt {
            new_dt = new_dt.min(max_dt);
        }

        new_dt
    }
}

/// Enum for selecting the adaptive step control algorithm.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub enum AdaptiveStepMethod {
    /// Elementary controller: `safety * error^(-1/(order+1))`, clamped.
    Basic(BasicStepControl),
    /// PID-controlled step size adaptation over the recent error history.
    Pid(StepPidControl),
}

/// The standard single-term controller for embedded pairs.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct BasicStepControl {
    /// Safety factor applied to the predicted step.
    pub safety: f64,
    /// Smallest allowed ratio `dt_new / dt`.
    pub min_factor: f64,
    /// Largest allowed ratio `dt_new / dt`.
    pub max_factor: f64,
}

impl Default for BasicStepControl {
    fn default() -> Self {
        Self {
            safety: 0.9,
            min_factor: 0.2,
            max_factor: 5.0,
        }
    }
}

impl BasicStepControl {
    fn factor(&self, error: f64, order: usize) -> f64 {
        if error == 0.0 {
            return self.max_factor;
        }
        let factor = self.safety * error.powf(-1.0 / (order as f64 + 1.0));
        factor.clamp(self.min_factor, self.max_factor)
    }
}

/// PID controller for adaptive step size control.
///
/// Allows fine-grained control over how the step size changes in response
/// to recent error estimates.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct StepPidControl {
    kp: f64,
    ki: f64,
    kd: f64,
    min_growth: Option<f64>,
    max_growth: Option<f64>,
    err_now: f64,
    err_prev: f64,
    err_prevprev: f64,
}

impl Default for StepPidControl {
    fn default() -> Self {
        Self {
            kp: 0.6,
            ki: 0.01,
            kd: 0.175,
            min_growth: Some(0.1),
            max_growth: Some(5.0),
            err_now: 1.0,
            err_prev: 1.0,
            err_prevprev: 1.0,
        }
    }
}

impl StepPidControl {
    pub fn new(
        kp: f64,
        ki: f64,
        kd: f64,
        min_growth: Option<f64>,
        max_growth: Option<f64>,
    ) -> Self {
        Self {
            kp,
            ki,
            kd,
            min_growth,
            max_growth,
            err_now: 1.0,
            err_prev: 1.0,
            err_prevprev: 1.0,
        }
    }

    /// Step ratio from PID control of the recent error history. Errors above
    /// 1 shrink the step, errors below 1 grow it.
    fn factor(&mut self, err_now: f64) -> f64 {
        self.err_prevprev = self.err_prev;
        self.err_prev = self.err_now;
        self.err_now = err_now;

        const EPS: f64 = 1e-14;
        let e0 = self.err_now.max(EPS);
        let e1 = self.err_prev.max(EPS);
        let e2 = self.err_prevprev.max(EPS);

        let mut factor = (1.0 / e0).powf(self.kp)
            * (e1 / e0).powf(self.kd)
            * (e2 / e1).powf(self.ki);

        if let Some(min_growth) = self.min_growth {
            factor = factor.max(min_growth);
        }
        if let Some(max_growth) = self.max_growth {
            factor = factor.min(max_growth);
        }

        factor
    }
}
