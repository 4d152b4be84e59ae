use super::{speculate, Evaluation, ScoringStrategy};
use crate::automaton::{Automaton, StateId};

/// Prefers merges that leave the fewest states. Ties are broken by label agreement.
#[derive(Clone, Copy, Debug, Default)]
pub struct StateCount;

impl ScoringStrategy for StateCount {
    fn score_merge(
        &mut self,
        automaton: &mut Automaton,
        red: StateId,
        blue: StateId,
    ) -> Option<Evaluation> {
        speculate(automaton, red, blue, |_, _| {}, |merged, agreement| {
            Some(Evaluation::new(merged.size() as f64, -i64::from(agreement)))
        })
    }

    fn evaluate(&mut self, automaton: &Automaton) -> f64 {
        automaton.size() as f64
    }
}

/// Prefers merges that leave the fewest edges. Ties are broken by label agreement.
#[derive(Clone, Copy, Debug, Default)]
pub struct EdgeCount;

impl ScoringStrategy for EdgeCount {
    fn score_merge(
        &mut self,
        automaton: &mut Automaton,
        red: StateId,
        blue: StateId,
    ) -> Option<Evaluation> {
        speculate(automaton, red, blue, |_, _| {}, |merged, agreement| {
            Some(Evaluation::new(
                merged.edge_count() as f64,
                -i64::from(agreement),
            ))
        })
    }

    fn evaluate(&mut self, automaton: &Automaton) -> f64 {
        automaton.edge_count() as f64
    }
}

/// Evidence driven state merging: a merge scores the negated number of folded state pairs that
/// carried the same label. Merges with less agreement than `lower_bound` are rejected.
#[derive(Clone, Copy, Debug)]
pub struct LabelAgreement {
    pub lower_bound: u32,
}

impl Default for LabelAgreement {
    fn default() -> Self {
        Self { lower_bound: 1 }
    }
}

impl LabelAgreement {
    pub fn with_lower_bound(lower_bound: u32) -> Self {
        Self { lower_bound }
    }
}

impl ScoringStrategy for LabelAgreement {
    fn score_merge(
        &mut self,
        automaton: &mut Automaton,
        red: StateId,
        blue: StateId,
    ) -> Option<Evaluation> {
        let lower_bound = self.lower_bound;
        speculate(automaton, red, blue, |_, _| {}, |_, agreement| {
            (agreement >= lower_bound).then(|| Evaluation::new(-f64::from(agreement), 0))
        })
    }

    fn evaluate(&mut self, automaton: &Automaton) -> f64 {
        automaton.size() as f64
    }
}
