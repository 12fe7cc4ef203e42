use tempus_diffeq::{
    OdeModel, OdeProblem,
    saving::{ResultStorage, SaveMethod},
    solvers::RungeKuttaMethod,
    state::StateArray,
    stepping::AdaptiveStepControl,
};

#[derive(Debug)]
struct Lorenz {
    sigma: f64,
    rho: f64,
    beta: f64,
}

impl OdeModel for Lorenz {
    type State = StateArray<3>;

    fn f(
        &mut self,
        _t: f64,
        x: &StateArray<3>,
        dx: &mut StateArray<3>,
        _stage: usize,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        dx[0] = self.sigma * (x[1] - x[0]);
        dx[1] = x[0] * (self.rho - x[2]) - x[1];
        dx[2] = x[0] * x[1] - self.beta * x[2];
        Ok(())
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let model = Lorenz {
        sigma: 10.,
        rho: 28.,
        beta: 8. / 3.,
    };

    let x0 = StateArray::new([1.0, 0.0, 0.0]);
    let mut problem = OdeProblem::new(model, (0.0, 30.0), x0)?;

    let control = AdaptiveStepControl::default()
        .with_rel_tol(1e-6)
        .with_abs_tol(1e-8);
    let solution = problem.solve_adaptive(RungeKuttaMethod::DoPri45, control, SaveMethod::Memory)?;

    if let ResultStorage::Memory(result) = &solution.storage {
        for i in 0..result.len() {
            if result.t[i] - result.t[i].floor() < 1e-3 {
                println!(
                    "{:10.6}     {:10.6}     {:10.6}     {:10.6}",
                    result.t[i], result.y[i][0], result.y[i][1], result.y[i][2]
                );
            }
        }
    }
    println!(
        "accepted: {}   rejected: {}   f evals: {}",
        solution.stats.accepted, solution.stats.rejected, solution.stats.function_evals
    );
    Ok(())
}
