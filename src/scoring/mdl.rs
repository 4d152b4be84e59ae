use std::borrow::Cow;

use super::{speculate, Evaluation, ScoringStrategy};
use crate::{
    automaton::{Automaton, StateId},
    math::LogTable,
};

/// Minimum description length: the number of bits needed to encode the automaton plus the
/// number of bits needed to single out the labeled samples among all strings of the same length
/// the automaton accepts (or rejects).
///
/// Scoring needs the per-length count tables, which [`ScoringStrategy::prepare`] switches on.
#[derive(Clone, Debug, Default)]
pub struct Mdl {
    logs: LogTable,
}

impl Mdl {
    pub fn with_log_table(logs: LogTable) -> Self {
        Self { logs }
    }

    /// Bits for the transition structure of an automaton with `states` states over an alphabet of
    /// `alphabet_size` symbols: `(n+1)·(1 + log2|Σ|·(n+1)) − log2(n!)`.
    pub fn automaton_cost(&self, states: usize, alphabet_size: usize) -> f64 {
        let n = states as f64;
        let sigma = (alphabet_size.max(1)) as f64;
        (n + 1.0) * (1.0 + sigma.log2() * (n + 1.0)) - self.logs.log2_factorial(n)
    }

    /// Bits for the samples given the automaton, summed over all sample lengths and both labels.
    pub fn data_cost(&self, automaton: &Automaton) -> f64 {
        let automaton = if automaton.counts().is_some() {
            Cow::Borrowed(automaton)
        } else {
            let mut counted = automaton.clone();
            counted.track_counts(true);
            Cow::Owned(counted)
        };
        let Some(counts) = automaton.counts() else {
            return 0.0;
        };
        let root = automaton.root();
        let limit = counts.max_length();
        let positives = automaton.positives_by_length();
        let negatives = automaton.negatives_by_length();
        (0..=limit)
            .map(|length| {
                let k_accepting = positives.get(length).copied().unwrap_or(0);
                let k_rejecting = negatives.get(length).copied().unwrap_or(0);
                self.logs
                    .log2_binomial(counts.accepting(length, root), f64::from(k_accepting))
                    + self
                        .logs
                        .log2_binomial(counts.rejecting(length, root), f64::from(k_rejecting))
            })
            .sum()
    }
}

impl ScoringStrategy for Mdl {
    fn prepare(&mut self, automaton: &mut Automaton) {
        automaton.track_counts(true);
    }

    fn score_merge(
        &mut self,
        automaton: &mut Automaton,
        red: StateId,
        blue: StateId,
    ) -> Option<Evaluation> {
        speculate(automaton, red, blue, |_, _| {}, |merged, agreement| {
            Some(Evaluation::new(self.evaluate(merged), -i64::from(agreement)))
        })
    }

    fn evaluate(&mut self, automaton: &Automaton) -> f64 {
        self.automaton_cost(automaton.size(), automaton.alphabet_size()) + self.data_cost(automaton)
    }
}
