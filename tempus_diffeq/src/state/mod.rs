//! State types for use in the ODE solvers.
//!
//! A state only needs in-place elementwise arithmetic (`+=` with a borrowed
//! state, `*=` with a scalar); the stepper never allocates per step. The
//! associated `Tolerance` supplies the scaled error norm used for adaptive
//! step acceptance.

use std::{
    fmt::Debug,
    ops::{AddAssign, MulAssign},
};
use tolerance::Tolerance;

pub mod state_array;
pub mod state_vector;

pub use state_array::{StateArray, StateArrayTolerances};
pub use state_vector::{StateVector, StateVectorTolerances};

/// Trait representing an integrable state for use in ODE solvers.
///
/// The derivative of a state is represented by the state type itself, so a
/// single set of buffers covers stages, proposals, and error estimates.
pub trait OdeState: Clone + Debug + Default + MulAssign<f64> + 'static
where
    for<'a> Self: AddAssign<&'a Self>,
{
    /// The tolerance model associated with the state, used for error estimation.
    type Tolerance: Tolerance<State = Self>;

    /// True iff every component is a finite number.
    fn is_finite(&self) -> bool;

    /// Column names for CSV output, excluding the leading time column.
    fn headers(&self) -> Vec<String>;

    /// Formats each component into its slot in `buffer`.
    fn format_record(&self, buffer: &mut [String]);
}
