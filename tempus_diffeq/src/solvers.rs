use serde::{Deserialize, Serialize};

use crate::{
    OdeError, OdeModel,
    result::StepStats,
    rk::RungeKutta,
    saving::ResultStorage,
    state::OdeState,
    stepping::{AdaptiveStepControl, FixedStepControl},
    tableau::ButcherTableau,
};

/// The named explicit Runge-Kutta methods available for direct selection.
/// Each variant dispatches to a pre-built tableau constant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RungeKuttaMethod {
    /// Forward Euler, order 1.
    Feuler,
    /// Explicit midpoint, order 2.
    Midpoint,
    /// Heun's method, order 2.
    Heun,
    /// Classical Runge-Kutta, order 4.
    Rk4,
    /// Heun-Euler 2(1) embedded pair.
    Rk12,
    /// Bogacki-Shampine 2(3) embedded pair.
    Rk23,
    /// Runge-Kutta-Fehlberg 4(5) embedded pair.
    Fehlberg45,
    /// Dormand-Prince 5(4) embedded pair.
    DoPri45,
}

impl RungeKuttaMethod {
    pub fn name(&self) -> &'static str {
        match self {
            RungeKuttaMethod::Feuler => ButcherTableau::<1>::FEULER.name,
            RungeKuttaMethod::Midpoint => ButcherTableau::<2>::MIDPOINT.name,
            RungeKuttaMethod::Heun => ButcherTableau::<2>::HEUN.name,
            RungeKuttaMethod::Rk4 => ButcherTableau::<4>::RK4.name,
            RungeKuttaMethod::Rk12 => ButcherTableau::<2>::RK12.name,
            RungeKuttaMethod::Rk23 => ButcherTableau::<4>::RK23.name,
            RungeKuttaMethod::Fehlberg45 => ButcherTableau::<6>::FEHLBERG45.name,
            RungeKuttaMethod::DoPri45 => ButcherTableau::<7>::DOPRI45.name,
        }
    }

    /// Order of the solution the method advances.
    pub fn order(&self) -> usize {
        match self {
            RungeKuttaMethod::Feuler => ButcherTableau::<1>::FEULER.order,
            RungeKuttaMethod::Midpoint => ButcherTableau::<2>::MIDPOINT.order,
            RungeKuttaMethod::Heun => ButcherTableau::<2>::HEUN.order,
            RungeKuttaMethod::Rk4 => ButcherTableau::<4>::RK4.order,
            RungeKuttaMethod::Rk12 => ButcherTableau::<2>::RK12.order,
            RungeKuttaMethod::Rk23 => ButcherTableau::<4>::RK23.order,
            RungeKuttaMethod::Fehlberg45 => ButcherTableau::<6>::FEHLBERG45.order,
            RungeKuttaMethod::DoPri45 => ButcherTableau::<7>::DOPRI45.order,
        }
    }

    /// True iff the method carries an embedded error estimate.
    pub fn is_adaptive(&self) -> bool {
        match self {
            RungeKuttaMethod::Feuler => ButcherTableau::<1>::FEULER.is_adaptive(),
            RungeKuttaMethod::Midpoint => ButcherTableau::<2>::MIDPOINT.is_adaptive(),
            RungeKuttaMethod::Heun => ButcherTableau::<2>::HEUN.is_adaptive(),
            RungeKuttaMethod::Rk4 => ButcherTableau::<4>::RK4.is_adaptive(),
            RungeKuttaMethod::Rk12 => ButcherTableau::<2>::RK12.is_adaptive(),
            RungeKuttaMethod::Rk23 => ButcherTableau::<4>::RK23.is_adaptive(),
            RungeKuttaMethod::Fehlberg45 => ButcherTableau::<6>::FEHLBERG45.is_adaptive(),
            RungeKuttaMethod::DoPri45 => ButcherTableau::<7>::DOPRI45.is_adaptive(),
        }
    }

    /// Fixed-step integration over `tspan`. Works for every method; adaptive
    /// tableaus just advance their primary solution.
    pub fn solve_fixed<Model, State>(
        &self,
        model: &mut Model,
        x0: &State,
        tspan: (f64, f64),
        control: &FixedStepControl,
        dtmin: f64,
        storage: &mut ResultStorage<State>,
    ) -> Result<(f64, State, StepStats), OdeError>
    where
        Model: OdeModel<State = State>,
        State: OdeState,
    {
        match self {
            RungeKuttaMethod::Feuler => {
                let mut solver = RungeKutta::new(ButcherTableau::<1>::FEULER);
                solver.solve_fixed(model, x0, tspan, control, dtmin, storage)?;
                Ok(solver.finish())
            }
            RungeKuttaMethod::Midpoint => {
                let mut solver = RungeKutta::new(ButcherTableau::<2>::MIDPOINT);
                solver.solve_fixed(model, x0, tspan, control, dtmin, storage)?;
                Ok(solver.finish())
            }
            RungeKuttaMethod::Heun => {
                let mut solver = RungeKutta::new(ButcherTableau::<2>::HEUN);
                solver.solve_fixed(model, x0, tspan, control, dtmin, storage)?;
                Ok(solver.finish())
            }
            RungeKuttaMethod::Rk4 => {
                let mut solver = RungeKutta::new(ButcherTableau::<4>::RK4);
                solver.solve_fixed(model, x0, tspan, control, dtmin, storage)?;
                Ok(solver.finish())
            }
            RungeKuttaMethod::Rk12 => {
                let mut solver = RungeKutta::new(ButcherTableau::<2>::RK12);
                solver.solve_fixed(model, x0, tspan, control, dtmin, storage)?;
                Ok(solver.finish())
            }
            RungeKuttaMethod::Rk23 => {
                let mut solver = RungeKutta::new(ButcherTableau::<4>::RK23);
                solver.solve_fixed(model, x0, tspan, control, dtmin, storage)?;
                Ok(solver.finish())
            }
            RungeKuttaMethod::Fehlberg45 => {
                let mut solver = RungeKutta::new(ButcherTableau::<6>::FEHLBERG45);
                solver.solve_fixed(model, x0, tspan, control, dtmin, storage)?;
                Ok(solver.finish())
            }
            RungeKuttaMethod::DoPri45 => {
                let mut solver = RungeKutta::new(ButcherTableau::<7>::DOPRI45);
                solver.solve_fixed(model, x0, tspan, control, dtmin, storage)?;
                Ok(solver.finish())
            }
        }
    }

    /// Adaptive integration over `tspan`. Fails with a usage error for
    /// methods without an embedded error estimate.
    pub fn solve_adaptive<Model, State>(
        &self,
        model: &mut Model,
        x0: &State,
        tspan: (f64, f64),
        control: &mut AdaptiveStepControl,
        dtmin: f64,
        storage: &mut ResultStorage<State>,
    ) -> Result<(f64, State, StepStats), OdeError>
    where
        Model: OdeModel<State = State>,
        State: OdeState,
    {
        match self {
            RungeKuttaMethod::Feuler => {
                let mut solver = RungeKutta::new(ButcherTableau::<1>::FEULER);
                solver.solve_adaptive(model, x0, tspan, control, dtmin, storage)?;
                Ok(solver.finish())
            }
            RungeKuttaMethod::Midpoint => {
                let mut solver = RungeKutta::new(ButcherTableau::<2>::MIDPOINT);
                solver.solve_adaptive(model, x0, tspan, control, dtmin, storage)?;
                Ok(solver.finish())
            }
            RungeKuttaMethod::Heun => {
                let mut solver = RungeKutta::new(ButcherTableau::<2>::HEUN);
                solver.solve_adaptive(model, x0, tspan, control, dtmin, storage)?;
                Ok(solver.finish())
            }
            RungeKuttaMethod::Rk4 => {
                let mut solver = RungeKutta::new(ButcherTableau::<4>::RK4);
                solver.solve_adaptive(model, x0, tspan, control, dtmin, storage)?;
                Ok(solver.finish())
            }
            RungeKuttaMethod::Rk12 => {
                let mut solver = RungeKutta::new(ButcherTableau::<2>::RK12);
                solver.solve_adaptive(model, x0, tspan, control, dtmin, storage)?;
                Ok(solver.finish())
            }
            RungeKuttaMethod::Rk23 => {
                let mut solver = RungeKutta::new(ButcherTableau::<4>::RK23);
                solver.solve_adaptive(model, x0, tspan, control, dtmin, storage)?;
                Ok(solver.finish())
            }
            RungeKuttaMethod::Fehlberg45 => {
                let mut solver = RungeKutta::new(ButcherTableau::<6>::FEHLBERG45);
                solver.solve_adaptive(model, x0, tspan, control, dtmin, storage)?;
                Ok(solver.finish())
            }
            RungeKuttaMethod::DoPri45 => {
                let mut solver = RungeKutta::new(ButcherTableau::<7>::DOPRI45);
                solver.solve_adaptive(model, x0, tspan, control, dtmin, storage)?;
                Ok(solver.finish())
            }
        }
    }
}
