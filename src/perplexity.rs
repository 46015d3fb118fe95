//! §4.8 Kneser-Ney continuation-probability perplexity over a decoded token
//! sequence and its backing [`Lattice`].

use crate::lattice::Lattice;

/// Absolute discount subtracted from every observed bigram count.
const DISCOUNT: f64 = 0.75;

/// Floor applied to any probability before taking its logarithm, so a
/// never-observed continuation doesn't produce `-inf`.
const PROBABILITY_FLOOR: f64 = 1e-12;

/// Result of scoring a token sequence (§4.8): the number of adjacent
/// transitions actually scored, the mean log-probability per transition,
/// and the corresponding perplexity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerplexityResult {
    pub transitions: usize,
    pub avg_log_prob: f64,
    pub perplexity: f64,
}

pub struct Perplexity;

impl Perplexity {
    /// Continuation probability of `to` given `from`, under Kneser-Ney
    /// absolute discounting (§4.8): `c = strength(from)`, `T = degree(from)`,
    /// `r = edge.weight` (0 if absent), backing off to `to`'s continuation
    /// share (the fraction of all distinct edges in the lattice terminating
    /// at `to`) when `from` has never been observed at all.
    fn continuation_probability(lattice: &Lattice, from: u32, to: u32) -> f64 {
        let c = lattice.strength(from) as f64;
        let backoff = lattice.continuation_share(to);

        if c <= 0.0 {
            return backoff.max(PROBABILITY_FLOOR);
        }

        let t = lattice.out_degree(from).unwrap_or(0) as f64;
        let r = lattice.get_edge(from, to).map(|e| e.count).unwrap_or(0) as f64;

        let discounted = (r - DISCOUNT).max(0.0) / c;
        let lambda = (DISCOUNT * t) / c;
        (discounted + lambda * backoff).max(PROBABILITY_FLOOR)
    }

    /// Score `tokens` against `lattice`'s learned bigram statistics (§4.8).
    /// Empty input has no tokens to score at all and yields `NaN` for both
    /// `avg_log_prob` and `perplexity` (§8 scenario 1). A single non-empty
    /// token has no transition to score either, but "perplexity >= 1 for any
    /// non-empty `ids`" (§8) still must hold: an empty product of
    /// probabilities has `avg_log_prob = 0`, so `perplexity = exp(-0) = 1`,
    /// the same convention as an empty sum contributing nothing.
    pub fn compute(lattice: &Lattice, tokens: &[u32]) -> PerplexityResult {
        if tokens.is_empty() {
            return PerplexityResult {
                transitions: 0,
                avg_log_prob: f64::NAN,
                perplexity: f64::NAN,
            };
        }
        if tokens.len() == 1 {
            return PerplexityResult {
                transitions: 0,
                avg_log_prob: 0.0,
                perplexity: 1.0,
            };
        }

        let mut total = 0.0;
        let mut transitions = 0usize;
        for window in tokens.windows(2) {
            total += Self::continuation_probability(lattice, window[0], window[1]).ln();
            transitions += 1;
        }

        let avg_log_prob = total / transitions as f64;
        PerplexityResult {
            transitions,
            avg_log_prob,
            perplexity: (-avg_log_prob).exp(),
        }
    }

    /// Convenience accessor for just the mean log-probability.
    pub fn avg_log_prob(lattice: &Lattice, tokens: &[u32]) -> f64 {
        Self::compute(lattice, tokens).avg_log_prob
    }

    /// Convenience accessor for just the perplexity value.
    pub fn perplexity(lattice: &Lattice, tokens: &[u32]) -> f64 {
        Self::compute(lattice, tokens).perplexity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LatticeConfig;

    #[test]
    fn empty_input_yields_nan() {
        let lattice = Lattice::new(LatticeConfig::default());
        let result = Perplexity::compute(&lattice, &[]);
        assert_eq!(result.transitions, 0);
        assert!(result.avg_log_prob.is_nan());
        assert!(result.perplexity.is_nan());
        assert!(Perplexity::avg_log_prob(&lattice, &[]).is_nan());
        assert!(Perplexity::perplexity(&lattice, &[]).is_nan());
    }

    /// A single non-empty token has no transition to score, but the
    /// non-empty-input invariant (perplexity >= 1) still must hold, so this
    /// is `1.0`, not `NaN`.
    #[test]
    fn single_token_input_yields_perplexity_of_one() {
        let mut lattice = Lattice::new(LatticeConfig::default());
        let a = lattice.get_or_create_token(b"a");
        let result = Perplexity::compute(&lattice, &[a]);
        assert_eq!(result.transitions, 0);
        assert_eq!(result.avg_log_prob, 0.0);
        assert_eq!(result.perplexity, 1.0);
    }

    #[test]
    fn repeated_bigram_has_lower_perplexity_than_unseen() {
        let mut lattice = Lattice::new(LatticeConfig::default());
        let a = lattice.get_or_create_token(b"a");
        let b = lattice.get_or_create_token(b"b");
        let c = lattice.get_or_create_token(b"c");
        let occurrences: Vec<u32> = (0..50).flat_map(|_| [a, b]).collect();
        let pairs: Vec<(u32, u32)> = (0..50).map(|_| (a, b)).collect();
        lattice.batch_ingest(&occurrences, &pairs).unwrap();

        let seen_perplexity = Perplexity::perplexity(&lattice, &[a, b]);
        let unseen_perplexity = Perplexity::perplexity(&lattice, &[a, c]);
        assert!(seen_perplexity < unseen_perplexity);
    }

    #[test]
    fn perplexity_is_never_negative_or_nan_for_nonempty_input() {
        let mut lattice = Lattice::new(LatticeConfig::default());
        let a = lattice.get_or_create_token(b"a");
        let b = lattice.get_or_create_token(b"b");
        lattice.batch_ingest(&[a, b, a, b], &[(a, b), (b, a), (a, b)]).unwrap();
        let p = Perplexity::perplexity(&lattice, &[a, b, a, b]);
        assert!(p.is_finite());
        assert!(p > 0.0);
    }
}
