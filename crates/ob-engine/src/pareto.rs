//! Pareto dominance over observed objective vectors.

/// Returns `true` if `a` Pareto-dominates `b`: at least as good in every
/// objective and strictly better in one. `minimize[k]` gives the direction
/// of objective `k`.
pub fn dominates(a: &[f64], b: &[f64], minimize: &[bool]) -> bool {
    debug_assert_eq!(a.len(), b.len());
    debug_assert_eq!(a.len(), minimize.len());

    let mut strictly_better = false;
    for ((&av, &bv), &min) in a.iter().zip(b).zip(minimize) {
        let (better, worse) = if min {
            (av < bv, av > bv)
        } else {
            (av > bv, av < bv)
        };
        if worse {
            return false;
        }
        if better {
            strictly_better = true;
        }
    }
    strictly_better
}

/// Indices of the non-dominated vectors, in ascending order.
pub fn pareto_front_indices(values: &[Vec<f64>], minimize: &[bool]) -> Vec<usize> {
    (0..values.len())
        .filter(|&i| {
            !values
                .iter()
                .enumerate()
                .any(|(j, other)| j != i && dominates(other, &values[i], minimize))
        })
        .collect()
}
