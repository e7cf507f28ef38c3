//! Binomial checkpointing arithmetic (Griewank & Walther, revolve).

/// Number of steps that can be reversed with `s` forward recomputations per
/// step and `c` snapshot slots: `C(s + c, c)`, or `s + 1` with no slots.
///
/// # Example
///
/// ```
/// use adjoint_checkpoint::schedule::revolve::beta;
///
/// assert_eq!(beta(0, 3), 1);
/// assert_eq!(beta(4, 0), 5);
/// assert_eq!(beta(2, 2), 6);
/// ```
pub fn beta(s: usize, c: usize) -> usize {
    if c == 0 {
        return s + 1;
    }
    if s == 0 {
        return 1;
    }
    let mut result = 1usize;
    for i in 0..c {
        result = result.saturating_mul(s + c - i);
        result /= i + 1;
    }
    result
}

/// Distance to the next snapshot when reversing `steps` blocks with `c`
/// free slots.
///
/// Always in `1..steps` for `steps >= 2`.
pub fn optimal_advance(steps: usize, c: usize) -> usize {
    if c == 0 || steps <= 1 {
        return steps;
    }
    let mut t = 1usize;
    while beta(t, c) < steps {
        t += 1;
    }
    beta(t - 1, c - 1).clamp(1, steps - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_beta_base_cases() {
        assert_eq!(beta(0, 0), 1);
        assert_eq!(beta(3, 0), 4);
        assert_eq!(beta(0, 5), 1);
        assert_eq!(beta(1, 1), 2);
        assert_eq!(beta(3, 2), 10);
    }

    #[test]
    fn test_optimal_advance_range() {
        for steps in 2..60 {
            for c in 1..6 {
                let m = optimal_advance(steps, c);
                assert!(m >= 1 && m < steps, "steps={} c={} m={}", steps, c, m);
            }
        }
    }

    #[test]
    fn test_optimal_advance_degenerate() {
        assert_eq!(optimal_advance(1, 3), 1);
        assert_eq!(optimal_advance(7, 0), 7);
    }

    #[test]
    fn test_optimal_advance_one_slot() {
        // beta(t, 1) = t + 1 >= 10 gives t = 9; advance = beta(8, 0) = 9.
        assert_eq!(optimal_advance(10, 1), 9);
    }
}
