use tempus_diffeq::{
    OdeModel, OdeProblem,
    saving::{ResultStorage, SaveMethod},
    solvers::RungeKuttaMethod,
    state::StateArray,
};

#[derive(Debug)]
struct Decay {
    rate: f64,
}

impl OdeModel for Decay {
    type State = StateArray<1>;

    fn f(
        &mut self,
        _t: f64,
        x: &StateArray<1>,
        dx: &mut StateArray<1>,
        _stage: usize,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        dx[0] = -self.rate * x[0];
        Ok(())
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let model = Decay { rate: 1.0 };
    let x0 = StateArray::new([1.0]);

    let mut problem = OdeProblem::new(model, (0.0, 5.0), x0)?;
    let solution = problem.solve_fixed(RungeKuttaMethod::Rk4, 0.1, SaveMethod::Memory)?;

    if let ResultStorage::Memory(result) = &solution.storage {
        for i in 0..result.len() {
            println!(
                "{:10.6}     {:10.6}     {:10.6}",
                result.t[i],
                result.y[i][0],
                (-result.t[i]).exp()
            );
        }
    }
    println!(
        "accepted: {}   f evals: {}",
        solution.stats.accepted, solution.stats.function_evals
    );
    Ok(())
}
