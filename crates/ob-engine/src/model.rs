//! Incumbent-based surrogate used by the model step of [`LocalEngine`].
//!
//! Fitting keeps the best feasible observation (one objective) or the
//! Pareto front (several objectives). Proposals perturb a random incumbent,
//! with an occasional uniform draw to keep exploring.
//!
//! [`LocalEngine`]: crate::local::LocalEngine

use rand::Rng;

use ob_types::{ParameterValue, Parameterization};

use crate::experiment::{Experiment, FixedFeatures, ObservedPoint, ParameterKind, SearchSpace};
use crate::generation::ModelOptions;
use crate::pareto::pareto_front_indices;

const EXPLORATION_WEIGHT: f64 = 0.1;
/// Perturbation half-width as a fraction of each parameter range.
const PERTURBATION: f64 = 0.1;

#[derive(Debug, Clone, Default)]
pub struct IncumbentModel {
    incumbents: Vec<Parameterization>,
    n_observations: usize,
}

impl IncumbentModel {
    /// Fit on the experiment's completed trials. `None` without usable data.
    pub fn fit(experiment: &Experiment, options: &ModelOptions) -> Option<Self> {
        let space = &experiment.search_space;
        let observed: Vec<ObservedPoint> = experiment
            .observed_points()
            .into_iter()
            .filter(|p| options.fit_out_of_design || space.contains(&p.parameters))
            .collect();
        if observed.is_empty() {
            return None;
        }
        let n_observations = observed.len();

        let feasible: Vec<&ObservedPoint> = observed
            .iter()
            .filter(|p| experiment.is_feasible(p.trial_index))
            .collect();
        let pool: Vec<&ObservedPoint> = if feasible.is_empty() {
            observed.iter().collect()
        } else {
            feasible
        };

        let minimize: Vec<bool> = experiment.objectives.iter().map(|o| o.minimize).collect();
        let values: Vec<Vec<f64>> = pool
            .iter()
            .map(|p| {
                experiment
                    .objectives
                    .iter()
                    .map(|o| p.objectives[&o.name])
                    .collect()
            })
            .collect();

        let incumbents = pareto_front_indices(&values, &minimize)
            .into_iter()
            .map(|i| pool[i].parameters.clone())
            .collect();

        Some(Self {
            incumbents,
            n_observations,
        })
    }

    pub fn incumbents(&self) -> &[Parameterization] {
        &self.incumbents
    }

    pub fn n_observations(&self) -> usize {
        self.n_observations
    }

    pub fn propose<R: Rng>(
        &self,
        rng: &mut R,
        space: &SearchSpace,
        fixed: Option<&FixedFeatures>,
    ) -> Parameterization {
        let base = if self.incumbents.is_empty() || rng.gen::<f64>() < EXPLORATION_WEIGHT {
            None
        } else {
            Some(&self.incumbents[rng.gen_range(0..self.incumbents.len())])
        };

        let mut point = Parameterization::new();
        for param in &space.parameters {
            if let Some(v) = fixed.and_then(|f| f.get(&param.name)) {
                point.insert(param.name.clone(), param.cast(v));
                continue;
            }
            let value = match base.and_then(|b| b.get(&param.name)) {
                Some(v) => {
                    let range = param.upper() - param.lower();
                    match param.kind {
                        ParameterKind::Float => {
                            let noise = rng.gen_range(-PERTURBATION..PERTURBATION) * range;
                            ParameterValue::Float(
                                (v.as_f64() + noise).clamp(param.lower(), param.upper()),
                            )
                        }
                        ParameterKind::Int => {
                            let width = (PERTURBATION * range).round().max(1.0) as i64;
                            let delta = rng.gen_range(-width..=width);
                            let lo = param.lower().ceil() as i64;
                            let hi = param.upper().floor() as i64;
                            ParameterValue::Int((v.as_f64().round() as i64 + delta).clamp(lo, hi))
                        }
                    }
                }
                None => param.scale(rng.gen::<f64>()),
            };
            point.insert(param.name.clone(), value);
        }
        point
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::{ExperimentSpec, Observation, RangeParameterSpec, RawData, TrialSource};
    use ob_types::Objective;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn experiment(objectives: Vec<Objective>) -> Experiment {
        Experiment::from_spec(ExperimentSpec {
            parameters: vec![
                RangeParameterSpec {
                    name: "x".into(),
                    kind: ParameterKind::Float,
                    bounds: [0.0, 1.0],
                    is_fidelity: false,
                    target_value: None,
                },
                RangeParameterSpec {
                    name: "n".into(),
                    kind: ParameterKind::Int,
                    bounds: [0.0, 10.0],
                    is_fidelity: false,
                    target_value: None,
                },
            ],
            objectives,
            ..Default::default()
        })
        .unwrap()
    }

    fn add(exp: &mut Experiment, x: f64, n: i64, outcomes: &[(&str, f64)]) {
        let params: Parameterization = [
            ("x".to_string(), ParameterValue::Float(x)),
            ("n".to_string(), ParameterValue::Int(n)),
        ]
        .into_iter()
        .collect();
        let idx = exp.add_trial(params, TrialSource::Attached);
        let data: RawData = outcomes
            .iter()
            .map(|(k, v)| (k.to_string(), Observation::new(*v, None)))
            .collect();
        exp.trial_mut(idx).unwrap().complete(data).unwrap();
    }

    #[test]
    fn no_data_no_model() {
        let exp = experiment(vec![Objective::minimize("f")]);
        assert!(IncumbentModel::fit(&exp, &ModelOptions::default()).is_none());
    }

    #[test]
    fn single_objective_keeps_best() {
        let mut exp = experiment(vec![Objective::maximize("f")]);
        add(&mut exp, 0.1, 1, &[("f", 1.0)]);
        add(&mut exp, 0.9, 9, &[("f", 3.0)]);
        let model = IncumbentModel::fit(&exp, &ModelOptions::default()).unwrap();
        assert_eq!(model.n_observations(), 2);
        assert_eq!(model.incumbents().len(), 1);
        assert_eq!(model.incumbents()[0]["x"], ParameterValue::Float(0.9));
    }

    #[test]
    fn out_of_design_points_are_skipped_unless_enabled() {
        let mut exp = experiment(vec![Objective::minimize("f")]);
        add(&mut exp, 5.0, 1, &[("f", -10.0)]);
        add(&mut exp, 0.5, 1, &[("f", 0.0)]);

        let model = IncumbentModel::fit(&exp, &ModelOptions::default()).unwrap();
        assert_eq!(model.n_observations(), 1);
        assert_eq!(model.incumbents()[0]["x"], ParameterValue::Float(0.5));

        let options = ModelOptions {
            fit_out_of_design: true,
            ..Default::default()
        };
        let model = IncumbentModel::fit(&exp, &options).unwrap();
        assert_eq!(model.n_observations(), 2);
        assert_eq!(model.incumbents()[0]["x"], ParameterValue::Float(5.0));
    }

    #[test]
    fn proposals_stay_in_bounds_and_respect_fixed_features() {
        let mut exp = experiment(vec![Objective::minimize("f"), Objective::minimize("g")]);
        add(&mut exp, 0.0, 0, &[("f", 1.0), ("g", 5.0)]);
        add(&mut exp, 1.0, 10, &[("f", 5.0), ("g", 1.0)]);
        let model = IncumbentModel::fit(&exp, &ModelOptions::default()).unwrap();
        assert_eq!(model.incumbents().len(), 2);

        let mut fixed = FixedFeatures::new();
        fixed.insert("n", 4.0);
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..200 {
            let p = model.propose(&mut rng, &exp.search_space, Some(&fixed));
            let x = p["x"].as_f64();
            assert!((0.0..=1.0).contains(&x));
            assert_eq!(p["n"], ParameterValue::Int(4));
        }
    }
}
