use std::{
    fmt::Write,
    ops::{AddAssign, Deref, DerefMut, MulAssign},
};

use tolerance::{Tolerance, Tolerances, compute_error};

use super::OdeState;

/// A dynamic-sized vector type for use in ODE solvers.
///
/// Unlike `StateArray`, this type supports arbitrary lengths and stores its
/// data in a `Vec<f64>`.
#[derive(Clone, Debug, Default)]
pub struct StateVector {
    value: Vec<f64>,
    /// Cached length of the vector to avoid repeated calls to `.len()`.
    n: usize,
}

impl StateVector {
    pub fn new(value: Vec<f64>) -> Self {
        let n = value.len();
        Self { value, n }
    }
}

impl From<Vec<f64>> for StateVector {
    fn from(value: Vec<f64>) -> Self {
        Self::new(value)
    }
}

/// A bare scalar initial value is promoted to a one-element vector so that
/// downstream arithmetic can assume at least one dimension.
impl From<f64> for StateVector {
    fn from(value: f64) -> Self {
        Self::new(vec![value])
    }
}

impl AddAssign<&Self> for StateVector {
    /// # Panics
    ///
    /// Panics if the vectors have different lengths.
    fn add_assign(&mut self, rhs: &Self) {
        if self.n != rhs.n {
            panic!("state vectors do not have same length")
        }
        for i in 0..self.n {
            self.value[i] += rhs.value[i];
        }
    }
}

impl MulAssign<f64> for StateVector {
    fn mul_assign(&mut self, rhs: f64) {
        for i in 0..self.n {
            self.value[i] *= rhs;
        }
    }
}

impl Deref for StateVector {
    type Target = Vec<f64>;

    fn deref(&self) -> &Self::Target {
        &self.value
    }
}

impl DerefMut for StateVector {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.value
    }
}

impl OdeState for StateVector {
    type Tolerance = StateVectorTolerances;

    fn is_finite(&self) -> bool {
        self.value.iter().all(|v| v.is_finite())
    }

    fn headers(&self) -> Vec<String> {
        (0..self.n).map(|i| format!("x{i}")).collect()
    }

    fn format_record(&self, buffer: &mut [String]) {
        for i in 0..self.n {
            buffer[i].clear();
            write!(buffer[i], "{}", self.value[i]).unwrap();
        }
    }
}

/// Stores optional component-wise tolerance overrides for a `StateVector`.
///
/// Components beyond the configured overrides fall back to the solver's
/// global relative and absolute tolerances.
#[derive(Default)]
pub struct StateVectorTolerances(pub Vec<Option<Tolerances>>);

impl Tolerance for StateVectorTolerances {
    type State = StateVector;

    /// Root-mean-square of the per-component scaled errors.
    fn compute_error(
        &self,
        y: &StateVector,
        y_prev: &StateVector,
        y_err: &StateVector,
        rel_tol: f64,
        abs_tol: f64,
    ) -> f64 {
        let n = y.len();
        if n == 0 {
            return 0.0;
        }

        let mut sum_squared_errors = 0.0;

        for i in 0..n {
            let component_error = match self.0.get(i).copied().flatten() {
                Some(tol) => tol.compute_error(y[i], y_prev[i], y_err[i]),
                None => compute_error(y[i], y_prev[i], y_err[i], rel_tol, abs_tol),
            };
            sum_squared_errors += component_error * component_error;
        }

        (sum_squared_errors / n as f64).sqrt()
    }
}
