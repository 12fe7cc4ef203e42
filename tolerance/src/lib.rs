use serde::{Deserialize, Serialize};

/// Absolute/relative tolerance pair for a single scalar component.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Tolerances {
    abs_tol: f64,
    rel_tol: f64,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            rel_tol: 1e-3,
            abs_tol: 1e-6,
        }
    }
}

impl Tolerances {
    pub fn new(rel_tol: f64, abs_tol: f64) -> Self {
        Self { rel_tol, abs_tol }
    }

    pub fn compute_error(&self, y: f64, y_prev: f64, y_err: f64) -> f64 {
        compute_error(y, y_prev, y_err, self.rel_tol, self.abs_tol)
    }
}

/// Error norm for a full state, used by adaptive solvers to accept or reject
/// a step. Implementations return a scaled norm where values <= 1.0 mean the
/// step satisfies the tolerances.
pub trait Tolerance: Default {
    type State;

    fn compute_error(
        &self,
        y: &Self::State,
        y_prev: &Self::State,
        y_err: &Self::State,
        rel_tol: f64,
        abs_tol: f64,
    ) -> f64;
}

/// Scaled error for one component: `|err| / (abs_tol + rel_tol * max(|y|, |y_prev|))`.
/// A result of 1.0 means the component error sits exactly at tolerance.
pub fn compute_error(y: f64, y_prev: f64, y_err: f64, rel_tol: f64, abs_tol: f64) -> f64 {
    let scale = abs_tol + rel_tol * y.abs().max(y_prev.abs());
    y_err.abs() / scale
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_component_error_at_tolerance() {
        // error equal to abs_tol with a zero state sits exactly at 1.0
        let err = compute_error(0.0, 0.0, 1e-6, 1e-3, 1e-6);
        assert_relative_eq!(err, 1.0);
    }

    #[test]
    fn test_component_error_relative_scaling() {
        // for large states the relative term dominates the scale
        let err = compute_error(1000.0, 1000.0, 1.0, 1e-3, 1e-6);
        assert_relative_eq!(err, 1.0, max_relative = 1e-5);
    }

    #[test]
    fn test_tolerances_uses_larger_magnitude() {
        let tol = Tolerances::new(0.1, 0.0);
        // scale picks max(|y|, |y_prev|) = 2.0 -> scale = 0.2
        assert_relative_eq!(tol.compute_error(2.0, 1.0, 0.1), 0.5);
        assert_relative_eq!(tol.compute_error(1.0, 2.0, 0.1), 0.5);
    }
}
