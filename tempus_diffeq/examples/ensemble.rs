use rand::{Rng, rngs::SmallRng};
use tempus_diffeq::{
    OdeModel,
    ensemble::EnsembleSolver,
    solvers::RungeKuttaMethod,
    state::StateArray,
    stepping::AdaptiveStepControl,
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
    let solver = EnsembleSolver::new(RungeKuttaMethod::DoPri45, 100).with_seed(12345);

    let solutions = solver.solve_adaptive(
        |_run, rng: &mut SmallRng| {
            // decay rate drawn uniformly from [0.5, 1.5)
            let rate = 0.5 + rng.random::<f64>();
            (Decay { rate }, StateArray::new([1.0]))
        },
        (0.0, 1.0),
        AdaptiveStepControl::default(),
    )?;

    let mean: f64 = solutions.iter().map(|s| s.y[0]).sum::<f64>() / solutions.len() as f64;
    println!("runs: {}   mean final value: {:.6}", solutions.len(), mean);
    Ok(())
}
