use itertools::Itertools;
use tracing::trace;

use super::{speculate, Evaluation, ScoringStrategy};
use crate::{
    automaton::{Automaton, State, StateId},
    math::{chi_square_sf, normal_two_sided_p},
};

const DEFAULT_ALPHA: f64 = 0.05;
const DEFAULT_MIN_TRAFFIC: u32 = 5;

/// How the samples passing through a state continue: one entry for ending in the state and
/// one per outgoing symbol.
fn outcomes(state: &State) -> Vec<u32> {
    std::iter::once(state.weight())
        .chain(state.edge_counts().iter().copied())
        .collect()
}

/// Observed outcome distributions of one folded pair, `None` if either side has too little
/// traffic to be tested.
fn observe_pair(red: &State, blue: &State, min_traffic: u32) -> Option<[Vec<u32>; 2]> {
    (red.traffic() >= min_traffic && blue.traffic() >= min_traffic)
        .then(|| [outcomes(red), outcomes(blue)])
}

/// Pearson's chi-square statistic for homogeneity of two outcome distributions, together with
/// its degrees of freedom. Outcomes seen on neither side do not count.
fn chi_square(pair: &[Vec<u32>; 2]) -> (f64, f64) {
    let totals = [
        pair[0].iter().sum::<u32>() as f64,
        pair[1].iter().sum::<u32>() as f64,
    ];
    let grand = totals[0] + totals[1];
    if totals[0] == 0.0 || totals[1] == 0.0 {
        return (0.0, 0.0);
    }
    let mut statistic = 0.0;
    let mut columns = 0usize;
    for (&r, &b) in pair[0].iter().zip(&pair[1]) {
        let column = f64::from(r) + f64::from(b);
        if column == 0.0 {
            continue;
        }
        columns += 1;
        for (observed, total) in [(f64::from(r), totals[0]), (f64::from(b), totals[1])] {
            let expected = total * column / grand;
            statistic += (observed - expected).powi(2) / expected;
        }
    }
    (statistic, columns.saturating_sub(1) as f64)
}

/// Runs the speculative merge, collects the distributions of all sufficiently busy folded
/// pairs and turns them into a p-value with `combine`. The merge is accepted if the p-value is
/// at least `alpha`, the score is the negated p-value.
fn test_merge<F>(
    automaton: &mut Automaton,
    red: StateId,
    blue: StateId,
    alpha: f64,
    min_traffic: u32,
    combine: F,
) -> Option<Evaluation>
where
    F: FnOnce(&[[Vec<u32>; 2]]) -> f64,
{
    let mut pairs = Vec::new();
    let agreement = speculate(
        automaton,
        red,
        blue,
        |r, b| pairs.extend(observe_pair(r, b, min_traffic)),
        |_, agreement| Some(agreement),
    )?;
    let p = combine(&pairs);
    trace!(
        "{} tested pairs for {blue:?} into {red:?} give p = {p:.4}",
        pairs.len()
    );
    (p >= alpha).then(|| Evaluation::new(-p, -i64::from(agreement)))
}

macro_rules! statistical_strategy {
    ($(#[$meta:meta])* $name:ident, $combine:path) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug)]
        pub struct $name {
            /// Significance level, merges with a smaller p-value are rejected.
            pub alpha: f64,
            /// Folded pairs where either state has less traffic are not tested.
            pub min_traffic: u32,
        }

        impl Default for $name {
            fn default() -> Self {
                Self {
                    alpha: DEFAULT_ALPHA,
                    min_traffic: DEFAULT_MIN_TRAFFIC,
                }
            }
        }

        impl $name {
            pub fn new(alpha: f64, min_traffic: u32) -> Self {
                Self { alpha, min_traffic }
            }
        }

        impl ScoringStrategy for $name {
            fn score_merge(
                &mut self,
                automaton: &mut Automaton,
                red: StateId,
                blue: StateId,
            ) -> Option<Evaluation> {
                test_merge(automaton, red, blue, self.alpha, self.min_traffic, $combine)
            }

            fn evaluate(&mut self, automaton: &Automaton) -> f64 {
                automaton.size() as f64
            }
        }
    };
}

statistical_strategy!(
    /// Sums the chi-square statistics and degrees of freedom of all tested pairs into a single
    /// test.
    ChiSquare,
    combined_chi_square
);

statistical_strategy!(
    /// Tests every pair on its own and combines the p-values with Fisher's method.
    Fisher,
    fisher
);

statistical_strategy!(
    /// Compares the frequency of every outcome with a two-proportion z-test and reports the
    /// smallest p-value.
    Normal,
    smallest_z_test
);

fn combined_chi_square(pairs: &[[Vec<u32>; 2]]) -> f64 {
    let (statistic, df) = pairs
        .iter()
        .map(chi_square)
        .fold((0.0, 0.0), |(s, d), (ps, pd)| (s + ps, d + pd));
    chi_square_sf(statistic, df)
}

fn fisher(pairs: &[[Vec<u32>; 2]]) -> f64 {
    let p_values = pairs
        .iter()
        .map(chi_square)
        .filter(|(_, df)| *df > 0.0)
        .map(|(statistic, df)| chi_square_sf(statistic, df).max(f64::MIN_POSITIVE))
        .collect_vec();
    if p_values.is_empty() {
        return 1.0;
    }
    let statistic = -2.0 * p_values.iter().map(|p| p.ln()).sum::<f64>();
    chi_square_sf(statistic, 2.0 * p_values.len() as f64)
}

fn smallest_z_test(pairs: &[[Vec<u32>; 2]]) -> f64 {
    pairs
        .iter()
        .flat_map(|[red, blue]| {
            let n_red = f64::from(red.iter().sum::<u32>());
            let n_blue = f64::from(blue.iter().sum::<u32>());
            red.iter().zip(blue).filter_map(move |(&r, &b)| {
                if n_red == 0.0 || n_blue == 0.0 {
                    return None;
                }
                let pooled = (f64::from(r) + f64::from(b)) / (n_red + n_blue);
                let error = (pooled * (1.0 - pooled) * (1.0 / n_red + 1.0 / n_blue)).sqrt();
                (error > 0.0).then(|| {
                    let z = (f64::from(r) / n_red - f64::from(b) / n_blue) / error;
                    normal_two_sided_p(z)
                })
            })
        })
        .fold(1.0, f64::min)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{scoring::Score, Sample};

    fn repeated(words: &[(&str, usize)]) -> Vec<Sample> {
        words
            .iter()
            .flat_map(|(w, n)| std::iter::repeat(crate::tests::word(w)).take(*n))
            .map(Sample::accept)
            .collect()
    }

    #[test]
    fn chi_square_of_identical_distributions_is_zero() {
        let pair = [vec![3, 6, 0], vec![1, 2, 0]];
        let (statistic, df) = chi_square(&pair);
        assert!(statistic.abs() < 1e-12);
        assert_eq!(df, 1.0);
        assert!((combined_chi_square(&[pair.clone()]) - 1.0).abs() < 1e-9);
        assert_eq!(fisher(&[]), 1.0);
        assert_eq!(smallest_z_test(&[pair]), 1.0);
    }

    #[test]
    fn rejects_different_futures() {
        // after `a` most samples stop, after `b` most samples continue with `b`
        let samples = repeated(&[("a", 20), ("ab", 1), ("b", 1), ("bb", 20)]);
        let mut automaton = Automaton::build(2, &samples).unwrap();
        let root = automaton.root();
        let a = automaton.run(&crate::tests::word("a")).unwrap();
        let b = automaton.run(&crate::tests::word("b")).unwrap();

        for strategy in [
            &mut ChiSquare::default() as &mut dyn ScoringStrategy,
            &mut Fisher::default(),
            &mut Normal::default(),
        ] {
            assert_eq!(strategy.score_candidate(&mut automaton, Some(a), b), None);
            // too little traffic in `ab` and `bb` to test anything but the fold of `a` and `b`
            assert_eq!(automaton.size(), 5);
        }

        // the root stops nothing and continues with both symbols, so it differs from `a` too
        let mut lenient = ChiSquare::new(0.0, 1);
        let evaluation = lenient
            .score_candidate(&mut automaton, Some(root), a)
            .unwrap();
        assert!(evaluation.score <= Score::new(0.0));
    }

    #[test]
    fn accepts_similar_futures() {
        let samples = repeated(&[("a", 10), ("ab", 10), ("b", 10), ("bb", 10)]);
        let mut automaton = Automaton::build(2, &samples).unwrap();
        let a = automaton.run(&crate::tests::word("a")).unwrap();
        let b = automaton.run(&crate::tests::word("b")).unwrap();
        for strategy in [
            &mut ChiSquare::default() as &mut dyn ScoringStrategy,
            &mut Fisher::default(),
            &mut Normal::default(),
        ] {
            let evaluation = strategy.score_candidate(&mut automaton, Some(a), b).unwrap();
            assert!(evaluation.score.value() <= -DEFAULT_ALPHA);
        }
    }
}
