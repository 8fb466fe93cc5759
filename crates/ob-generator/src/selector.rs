//! Best-value lookup for single- and multi-objective runs.

use ob_engine::{ObservedPoint, OptimizationEngine};
use ob_types::{config_error, Objective, ObResult, Parameterization};

/// Point of `front` with the extremal value of `objective`. Ties keep the
/// first occurrence.
pub fn select_extremal<'a>(
    front: &'a [ObservedPoint],
    objective: &Objective,
) -> Option<&'a ObservedPoint> {
    let mut best: Option<(&ObservedPoint, f64)> = None;
    for point in front {
        let Some(&value) = point.objectives.get(&objective.name) else {
            continue;
        };
        let better = match best {
            None => true,
            Some((_, current)) if objective.minimize => value < current,
            Some((_, current)) => value > current,
        };
        if better {
            best = Some((point, value));
        }
    }
    best.map(|(point, _)| point)
}

/// Parameter values of the best point for `objective`, or `None` when
/// nothing has been observed yet.
pub fn best_values<E: OptimizationEngine>(
    engine: &E,
    objectives: &[Objective],
    objective: &str,
) -> ObResult<Option<Parameterization>> {
    let target = objectives
        .iter()
        .find(|o| o.name == objective)
        .ok_or_else(|| {
            let available: Vec<&str> = objectives.iter().map(|o| o.name.as_str()).collect();
            config_error!("objective {objective} not found, available objectives are {available:?}")
        })?;

    if objectives.len() > 1 {
        let front = engine.pareto_optimal_parameters()?;
        Ok(select_extremal(&front, target).map(|p| p.parameters.clone()))
    } else {
        Ok(engine.best_parameters()?.map(|p| p.parameters))
    }
}
