use std::{
    fmt::Write,
    ops::{AddAssign, Deref, DerefMut, MulAssign},
};

use tolerance::{Tolerance, Tolerances, compute_error};

use super::OdeState;

/// A fixed-size array wrapper representing a generic state vector with `N`
/// f64 components.
///
/// This type is commonly used as a concrete state for ODE solvers.
#[derive(Clone, Copy, Debug)]
pub struct StateArray<const N: usize>([f64; N]);

impl<const N: usize> StateArray<N> {
    pub fn new(array: [f64; N]) -> Self {
        Self(array)
    }
}

impl<const N: usize> Default for StateArray<N> {
    fn default() -> Self {
        Self([0.0; N])
    }
}

impl<const N: usize> AddAssign<&Self> for StateArray<N> {
    fn add_assign(&mut self, rhs: &Self) {
        for i in 0..N {
            self.0[i] += rhs.0[i];
        }
    }
}

impl<const N: usize> MulAssign<f64> for StateArray<N> {
    fn mul_assign(&mut self, rhs: f64) {
        for i in 0..N {
            self.0[i] *= rhs;
        }
    }
}

impl<const N: usize> Deref for StateArray<N> {
    type Target = [f64; N];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<const N: usize> DerefMut for StateArray<N> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl<const N: usize> OdeState for StateArray<N> {
    type Tolerance = StateArrayTolerances<N>;

    fn is_finite(&self) -> bool {
        self.0.iter().all(|v| v.is_finite())
    }

    fn headers(&self) -> Vec<String> {
        (0..N).map(|i| format!("x{i}")).collect()
    }

    fn format_record(&self, buffer: &mut [String]) {
        for i in 0..N {
            buffer[i].clear();
            write!(buffer[i], "{}", self.0[i]).unwrap();
        }
    }
}

/// Stores optional per-element tolerance overrides for a `StateArray`.
///
/// If an entry is `None`, the solver's global absolute and relative
/// tolerances are used for that component.
pub struct StateArrayTolerances<const N: usize>(pub [Option<Tolerances>; N]);

impl<const N: usize> Default for StateArrayTolerances<N> {
    fn default() -> Self {
        Self([None; N])
    }
}

impl<const N: usize> Tolerance for StateArrayTolerances<N> {
    type State = StateArray<N>;

    /// Root-mean-square of the per-component scaled errors.
    fn compute_error(
        &self,
        y: &StateArray<N>,
        y_prev: &StateArray<N>,
        y_err: &StateArray<N>,
        rel_tol: f64,
        abs_tol: f64,
    ) -> f64 {
        if N == 0 {
            return 0.0;
        }

        let mut sum_squared_errors = 0.0;

        for (i, tol) in self.0.iter().enumerate() {
            let component_error = if let Some(tol) = tol {
                tol.compute_error(y.0[i], y_prev.0[i], y_err.0[i])
            } else {
                compute_error(y.0[i], y_prev.0[i], y_err.0[i], rel_tol, abs_tol)
            };

            sum_squared_errors += component_error * component_error;
        }

        (sum_squared_errors / N as f64).sqrt()
    }
}
