use thiserror::Error;

use super::{Automaton, StateId};
use crate::sample::Sample;

/// Describes the first inconsistency found by [`Automaton::check_consistency`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConsistencyError {
    #[error("{live} states are marked alive but {reachable} are reachable")]
    LiveCount { live: usize, reachable: usize },
    #[error("reachable state {0:?} is not alive")]
    DeadReachable(StateId),
    #[error("state {0:?} is both accepting and rejecting")]
    Contradiction(StateId),
    #[error("state {state:?} claims parent {parent:?}, which has no edge to it")]
    Parent { state: StateId, parent: StateId },
    #[error("productivity of {0:?} differs from a recomputation")]
    Productive(StateId),
    #[error("count tables differ from a recomputation at state {state:?}, length {length}")]
    Counts { state: StateId, length: usize },
    #[error("sample {0:?} is not classified according to its label")]
    Misclassified(Sample),
}

impl Automaton {
    /// Expensive self check: verifies the bookkeeping of the automaton against a from-scratch
    /// recomputation and checks that every labeled sample is still classified as labeled.
    /// Meant for tests and debugging, the search never calls it.
    pub fn check_consistency<'a, I>(&self, samples: I) -> Result<(), ConsistencyError>
    where
        I: IntoIterator<Item = &'a Sample>,
    {
        let order = self.reachable();
        if order.len() != self.live {
            return Err(ConsistencyError::LiveCount {
                live: self.live,
                reachable: order.len(),
            });
        }
        for &id in &order {
            let state = &self.states[id.index()];
            if !state.alive {
                return Err(ConsistencyError::DeadReachable(id));
            }
            if state.accepting && state.rejecting {
                return Err(ConsistencyError::Contradiction(id));
            }
            if let Some(parent) = state.parent {
                let linked = self.states[parent.index()]
                    .children
                    .iter()
                    .any(|&c| c == Some(id));
                if !linked {
                    return Err(ConsistencyError::Parent { state: id, parent });
                }
            }
        }

        let mut fresh = self.clone();
        fresh.recompute_derived();
        if self.config.track_productive {
            if let Some(&id) = order
                .iter()
                .find(|id| fresh.state(**id).productive() != self.state(**id).productive())
            {
                return Err(ConsistencyError::Productive(id));
            }
        }
        if let (Some(ours), Some(theirs)) = (self.counts(), fresh.counts()) {
            for &id in &order {
                for length in 0..=ours.max_length() {
                    if ours.accepting(length, id) != theirs.accepting(length, id)
                        || ours.rejecting(length, id) != theirs.rejecting(length, id)
                    {
                        return Err(ConsistencyError::Counts { state: id, length });
                    }
                }
            }
        }

        for sample in samples {
            if let Some(expected) = sample.label.classification() {
                if self.classify(&sample.symbols) != Some(expected) {
                    return Err(ConsistencyError::Misclassified(sample.clone()));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::{automaton::ConsistencyError, tests::word, Automaton, Sample};

    #[test]
    fn detects_misclassification() {
        let samples = vec![
            Sample::accept(word("ab")),
            Sample::accept(word("b")),
            Sample::reject(word("")),
        ];
        let mut automaton = Automaton::build(2, &samples).unwrap();
        assert_eq!(automaton.check_consistency(&samples), Ok(()));

        let root = automaton.root();
        let a = automaton.run(&word("a")).unwrap();
        automaton.merge(root, a).unwrap();
        assert_eq!(automaton.check_consistency(&samples), Ok(()));

        let wrong = vec![Sample::reject(word("ab"))];
        assert!(matches!(
            automaton.check_consistency(&wrong),
            Err(ConsistencyError::Misclassified(_))
        ));
    }
}
