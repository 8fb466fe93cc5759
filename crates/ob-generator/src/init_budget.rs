//! Quasi-random initialization budget.
//!
//! Externally attached evaluations count towards the exploration phase, so
//! every non-failed attached trial shrinks the Sobol step by one.

use tracing::{debug, info};

use ob_engine::{CriterionKind, GenerationStrategy};

/// Quasi-random trials still to be generated by the current step. Zero once
/// the plan has moved past the quasi-random phase.
pub fn remaining(strategy: &GenerationStrategy) -> usize {
    let step = strategy.current_step();
    if !step.is_quasi_random() {
        return 0;
    }
    step.remaining_trials().unwrap_or(0)
}

/// Shrink the current quasi-random step by one trial. Returns `false`
/// without touching anything when there is nothing left to shrink.
pub fn consume_attached(strategy: &mut GenerationStrategy) -> bool {
    if remaining(strategy) == 0 {
        debug!("No quasi-random trials left; initialization budget unchanged");
        return false;
    }

    let step = strategy.current_step_mut();
    step.num_trials = step.num_trials.map(|n| n.saturating_sub(1));
    // Trial count and its transition threshold move together, otherwise the
    // step would wait for trials it will never generate.
    if let Some(criterion) = step.criterion_mut(CriterionKind::TrialCount) {
        criterion.threshold = criterion.threshold.saturating_sub(1);
    }
    let left = step.remaining_trials().unwrap_or(0);

    if strategy.maybe_move_to_next_step() {
        info!(
            "Initialization budget used up by attached trials; moved to step {}",
            strategy.current_index()
        );
    } else {
        debug!("Initialization budget reduced, {} quasi-random trials left", left);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use ob_engine::{GenerationStep, ModelKind, ModelOptions};

    fn threshold(strategy: &GenerationStrategy) -> usize {
        strategy
            .current_step()
            .criterion(CriterionKind::TrialCount)
            .map(|c| c.threshold)
            .unwrap_or(0)
    }

    #[test]
    fn decrements_count_and_threshold_together() {
        let mut gs = GenerationStrategy::sobol_then_surrogate(3, ModelOptions::default());
        assert!(consume_attached(&mut gs));
        assert_eq!(gs.current_step().num_trials, Some(2));
        assert_eq!(threshold(&gs), 2);
        assert_eq!(remaining(&gs), 2);
    }

    #[test]
    fn advances_when_budget_reaches_zero() {
        let mut gs = GenerationStrategy::sobol_then_surrogate(1, ModelOptions::default());
        assert!(consume_attached(&mut gs));
        assert_eq!(gs.current_index(), 1);
        assert_eq!(gs.steps()[0].num_trials, Some(0));
        assert_eq!(remaining(&gs), 0);

        // Past the quasi-random phase nothing changes.
        assert!(!consume_attached(&mut gs));
        assert_eq!(gs.steps()[0].num_trials, Some(0));
    }

    #[test]
    fn generated_trials_limit_the_adjustment() {
        let mut gs = GenerationStrategy::sobol_then_surrogate(2, ModelOptions::default());
        gs.current_step_mut().trials_generated = 1;
        assert!(consume_attached(&mut gs));
        assert_eq!(gs.current_index(), 1);
        assert!(!consume_attached(&mut gs));
        assert_eq!(gs.steps()[0].num_trials, Some(1));
    }

    #[test]
    fn non_quasi_random_step_is_untouched() {
        let options = ModelOptions::default();
        let steps = vec![
            GenerationStep::new(ModelKind::Surrogate, Some(5), options),
            GenerationStep::new(ModelKind::Sobol, None, options),
        ];
        let mut gs = GenerationStrategy::new("model-first", steps).unwrap();
        assert!(!consume_attached(&mut gs));
        assert_eq!(gs.current_step().num_trials, Some(5));
        assert_eq!(threshold(&gs), 5);
    }
}
