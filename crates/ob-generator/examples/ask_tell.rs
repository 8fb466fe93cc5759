use ob_generator::{Generator, GeneratorConfig};
use ob_types::{AnalyzedParameter, Dtype, Evaluation, Objective, Trial, VaryingParameter};

/// Shifted sphere with an integer offset; `c` is kept below 1 by an outcome
/// constraint.
fn evaluate(trial: &mut Trial) -> Result<(), Box<dyn std::error::Error>> {
    let x0 = trial.value_of("x0").map(|v| v.as_f64()).unwrap_or_default();
    let x1 = trial.value_of("x1").map(|v| v.as_f64()).unwrap_or_default();
    let f = (x0 - 0.3).powi(2) + (x1 - 2.0).powi(2);
    let c = x0 + 0.1 * x1;
    trial.complete(
        vec![Evaluation::new("f", f)],
        vec![Evaluation::new("c", c)],
    )?;
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = GeneratorConfig::new()
        .with_n_init(6)
        .with_seed(42)
        .with_save_model(false)
        .with_outcome_constraints(vec!["c <= 1".to_string()]);
    let varying = vec![
        VaryingParameter::new("x0", -1.0, 1.0)?,
        VaryingParameter::new("x1", 0.0, 5.0)?.with_dtype(Dtype::Int64),
    ];
    let mut generator = Generator::new(
        config,
        varying,
        vec![Objective::minimize("f")],
        vec![AnalyzedParameter::new("c")],
    )?;

    // One evaluation made before the generator existed.
    let mut history = vec![Trial::with_values(
        0,
        vec!["x0".to_string(), "x1".to_string()],
        vec![0.0.into(), 1i64.into()],
    )?];
    evaluate(&mut history[0])?;
    generator.incorporate_history(&mut history)?;
    println!(
        "Quasi-random trials left after history: {}",
        generator.remaining_init_trials()
    );

    for _ in 0..10 {
        let mut trials = generator.ask(2)?;
        for trial in trials.iter_mut() {
            evaluate(trial)?;
        }
        generator.tell(&mut trials)?;
    }

    match generator.best_values("f")? {
        Some(best) => println!("Best point after {} evaluations: {best:?}", generator.n_evaluated()),
        None => println!("No feasible point found"),
    }
    Ok(())
}
