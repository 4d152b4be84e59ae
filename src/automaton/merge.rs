use bit_set::BitSet;
use thiserror::Error;
use tracing::{trace, warn};

use super::{Automaton, State, StateId, UndoInfo, UndoRecord};

/// Returned when a merge is explicitly requested but would force some state to be accepting
/// and rejecting at the same time.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Error)]
#[error("merging {blue:?} into {red:?} leads to a state that is both accepting and rejecting")]
pub struct ConflictingMerge {
    pub red: StateId,
    pub blue: StateId,
}

/// Outcome of [`Automaton::tree_merge`].
#[derive(Debug)]
#[must_use]
pub struct Merge {
    /// Number of folded state pairs that already carried the same label before the union.
    pub agreement: u32,
    /// Whether the fold ran into an accepting/rejecting clash. The automaton is only
    /// consistent again after [`Automaton::undo_merge`] has been called on `undo`.
    pub conflict: bool,
    /// The undo log, present if it was requested.
    pub undo: Option<UndoInfo>,
}

impl Merge {
    pub fn is_conflict(&self) -> bool {
        self.conflict
    }
}

struct Fold {
    log: Option<Vec<UndoRecord>>,
    agreement: u32,
    touched: Vec<StateId>,
}

impl Fold {
    fn record(&mut self, record: impl FnOnce() -> UndoRecord) {
        if let Some(log) = self.log.as_mut() {
            log.push(record());
        }
    }
}

impl Automaton {
    /// Folds the tree rooted at `blue` into `red`.
    ///
    /// The edge from `blue`'s parent is redirected to `red`, then both states are folded
    /// recursively: successors that exist on both sides are folded into each other, successors
    /// that only exist on the blue side are attached to the red side. Labels are united, weights
    /// and traffic summed. `blue` must be the root of a subtree that is still a tree and must not
    /// be an ancestor of `red`, which is what the red/blue frontier guarantees.
    ///
    /// A conflict aborts the fold immediately. If `want_undo` is set, the caller must then
    /// call [`Automaton::undo_merge`]; pairs that are already known to conflict are rejected
    /// before anything is touched.
    pub fn tree_merge(&mut self, red: StateId, blue: StateId, want_undo: bool) -> Merge {
        self.tree_merge_observed(red, blue, want_undo, |_, _| {})
    }

    /// Like [`Automaton::tree_merge`], but calls `observe` with the red-side and blue-side state
    /// of every folded pair before the two are united.
    pub fn tree_merge_observed<F>(
        &mut self,
        red: StateId,
        blue: StateId,
        want_undo: bool,
        mut observe: F,
    ) -> Merge
    where
        F: FnMut(&State, &State),
    {
        let log = if want_undo {
            Some(self.pool.take())
        } else {
            None
        };
        let scalars = (self.live, self.cached_score, self.productive_counts);
        let into_undo = |log: Option<Vec<UndoRecord>>| {
            log.map(|records| UndoInfo {
                records,
                live: scalars.0,
                cached_score: scalars.1,
                productive_counts: scalars.2,
            })
        };

        if red == blue
            || !self.states[red.index()].alive
            || !self.states[blue.index()].alive
            || self.states[blue.index()].conflicts.contains(&red)
        {
            trace!("skipping merge of {blue:?} into {red:?}, known to be impossible");
            return Merge {
                agreement: 0,
                conflict: true,
                undo: into_undo(log),
            };
        }

        let mut fold = Fold {
            log,
            agreement: 0,
            touched: Vec::new(),
        };
        self.cached_score = None;

        if let Some(parent) = self.states[blue.index()].parent {
            let parent_state = &self.states[parent.index()];
            if let Some(symbol) = parent_state
                .children
                .iter()
                .position(|&c| c == Some(blue))
            {
                let count = parent_state.edge_counts[symbol];
                self.set_edge(&mut fold, parent, symbol, Some(red), count);
                fold.touched.push(parent);
            }
        }

        let ok = self.fold(red, blue, &mut fold, &mut observe);
        if !ok {
            let conflicts = &mut self.states[blue.index()].conflicts;
            if !conflicts.contains(&red) {
                conflicts.push(red);
            }
            trace!("merging {blue:?} into {red:?} conflicts");
            return Merge {
                agreement: fold.agreement,
                conflict: true,
                undo: into_undo(fold.log),
            };
        }

        let Fold {
            mut log,
            agreement,
            touched,
        } = fold;
        self.refresh_after_merge(log.as_mut(), &touched);
        Merge {
            agreement,
            conflict: false,
            undo: into_undo(log),
        }
    }

    fn set_edge(
        &mut self,
        fold: &mut Fold,
        state: StateId,
        symbol: usize,
        target: Option<StateId>,
        count: u32,
    ) {
        let slot = &mut self.states[state.index()];
        let (old_target, old_count) = (slot.children[symbol], slot.edge_counts[symbol]);
        fold.record(|| UndoRecord::Edge {
            state,
            symbol,
            target: old_target,
            count: old_count,
        });
        slot.children[symbol] = target;
        slot.edge_counts[symbol] = count;
    }

    fn save_fields(&self, fold: &mut Fold, state: StateId) {
        let fields = self.states[state.index()].fields();
        fold.record(|| UndoRecord::Fields(state, fields));
    }

    /// Folds pairs from a work list until it is empty or a pair conflicts. Pairs that touch a
    /// dead state or fold a state into itself count as conflicts, they only come up when `blue`
    /// was not the root of a proper subtree.
    fn fold<F>(&mut self, red: StateId, blue: StateId, fold: &mut Fold, observe: &mut F) -> bool
    where
        F: FnMut(&State, &State),
    {
        let mut pending = vec![(red, blue)];
        while let Some((red, blue)) = pending.pop() {
            let (r, b) = (&self.states[red.index()], &self.states[blue.index()]);
            if red == blue || !r.alive || !b.alive {
                warn!("cannot fold {blue:?} into {red:?}, the folded states do not form a tree");
                return false;
            }
            observe(r, b);
            if (r.accepting && b.rejecting) || (r.rejecting && b.accepting) {
                return false;
            }
            if (r.accepting && b.accepting) || (r.rejecting && b.rejecting) {
                fold.agreement += 1;
            }

            self.save_fields(fold, red);
            self.save_fields(fold, blue);
            let b = self.states[blue.index()].fields();
            let r = &mut self.states[red.index()];
            r.accepting |= b.accepting;
            r.rejecting |= b.rejecting;
            r.weight += b.weight;
            r.traffic += b.traffic;
            r.depth = r.depth.min(b.depth);
            self.states[blue.index()].alive = false;
            self.live -= 1;
            fold.touched.push(red);

            let first = pending.len();
            for symbol in 0..self.alphabet_size {
                let Some(blue_child) = self.states[blue.index()].children[symbol] else {
                    continue;
                };
                let blue_count = self.states[blue.index()].edge_counts[symbol];
                let red_count = self.states[red.index()].edge_counts[symbol];
                match self.states[red.index()].children[symbol] {
                    Some(red_child) => {
                        self.set_edge(fold, red, symbol, Some(red_child), red_count + blue_count);
                        pending.push((red_child, blue_child));
                    }
                    None => {
                        self.set_edge(fold, red, symbol, Some(blue_child), blue_count);
                        self.save_fields(fold, blue_child);
                        self.states[blue_child.index()].parent = Some(red);
                    }
                }
            }
            // smaller symbols first
            pending[first..].reverse();
        }
        true
    }

    /// Reverts a merge by replaying its records in reverse and recycles the record buffer.
    pub fn undo_merge(&mut self, undo: UndoInfo) {
        let UndoInfo {
            mut records,
            live,
            cached_score,
            productive_counts,
        } = undo;
        while let Some(record) = records.pop() {
            match record {
                UndoRecord::Fields(state, fields) => self.states[state.index()].restore(fields),
                UndoRecord::Edge {
                    state,
                    symbol,
                    target,
                    count,
                } => {
                    let slot = &mut self.states[state.index()];
                    slot.children[symbol] = target;
                    slot.edge_counts[symbol] = count;
                }
                UndoRecord::Productive(state, productive) => {
                    self.states[state.index()].productive = productive;
                }
                UndoRecord::Column {
                    state,
                    accepting,
                    rejecting,
                } => {
                    if let Some(tables) = self.counts.as_mut() {
                        tables.restore_column(state, &accepting, &rejecting);
                    }
                }
                UndoRecord::Tables(tables) => self.counts = Some(tables),
            }
        }
        self.live = live;
        self.cached_score = cached_score;
        self.productive_counts = productive_counts;
        self.pool.give(records);
    }

    /// Permanently folds `blue` into `red`, for callers outside the search loop. Returns the
    /// label agreement of the merge, or an error that leaves the automaton untouched.
    pub fn merge(&mut self, red: StateId, blue: StateId) -> Result<u32, ConflictingMerge> {
        if self.is_tree_ancestor(blue, red) {
            warn!("refusing to fold {blue:?} into its own descendant {red:?}");
            return Err(ConflictingMerge { red, blue });
        }
        if !self.is_proper_subtree(blue) {
            warn!("refusing to fold {blue:?}, it does not root a proper subtree");
            return Err(ConflictingMerge { red, blue });
        }
        let Merge {
            agreement,
            conflict,
            undo,
        } = self.tree_merge(red, blue, true);
        match undo {
            Some(undo) if conflict => {
                self.undo_merge(undo);
                Err(ConflictingMerge { red, blue })
            }
            Some(undo) => {
                self.pool.give(undo.records);
                Ok(agreement)
            }
            None if conflict => Err(ConflictingMerge { red, blue }),
            None => Ok(agreement),
        }
    }

    /// Checks that the states reachable from `blue` form a tree hanging off `blue`'s parent:
    /// every edge below `blue` leads to a fresh state whose tree parent is the edge's source,
    /// and no live state outside the tree points into it.
    fn is_proper_subtree(&self, blue: StateId) -> bool {
        if !self.states[blue.index()].alive || self.states[blue.index()].parent.is_none() {
            return false;
        }
        let mut members = BitSet::with_capacity(self.states.len());
        members.insert(blue.index());
        let mut stack = vec![blue];
        while let Some(id) = stack.pop() {
            for (_, child) in self.states[id.index()].edges() {
                if self.states[child.index()].parent != Some(id) || !members.insert(child.index())
                {
                    return false;
                }
                stack.push(child);
            }
        }
        let mut incoming = vec![0u32; self.states.len()];
        for state in self.states.iter().filter(|s| s.alive) {
            for (_, child) in state.edges() {
                if members.contains(child.index()) {
                    incoming[child.index()] += 1;
                }
            }
        }
        members.iter().all(|i| incoming[i] == 1)
    }

    /// Checks whether `ancestor` lies on the chain of tree parents starting at `state`.
    fn is_tree_ancestor(&self, ancestor: StateId, state: StateId) -> bool {
        let mut current = Some(state);
        for _ in 0..self.states.len() {
            match current {
                Some(id) if id == ancestor => return true,
                Some(id) => current = self.states[id.index()].parent,
                None => return false,
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        automaton::{AutomatonConfig, StateId},
        tests::{positives, word},
        Automaton, Sample,
    };

    fn snapshot(automaton: &Automaton) -> String {
        let mut out = format!(
            "{} {:?} {:?} {} {}\n",
            automaton.size(),
            automaton.cached_score("fixed"),
            automaton.counts(),
            automaton.productive_count(true),
            automaton.productive_count(false)
        );
        for id in automaton.reachable() {
            let state = automaton.state(id);
            out.push_str(&format!(
                "{id:?} {state:?} {:?} {:?}\n",
                state.edge_counts(),
                state.parent()
            ));
        }
        out
    }

    fn mixed_sample() -> Vec<Sample> {
        vec![
            Sample::accept(word("ab")),
            Sample::accept(word("aab")),
            Sample::accept(word("b")),
            Sample::reject(word("a")),
            Sample::reject(word("aa")),
            Sample::reject(word("ba")),
            Sample::accept(word("bab")),
            Sample::reject(word("bb")),
        ]
    }

    #[test_log::test]
    fn undo_restores_everything() {
        for incremental in [true, false] {
            let config = AutomatonConfig::default()
                .with_counts(true)
                .with_incremental_counts(incremental);
            let mut automaton = Automaton::build_with(2, &mixed_sample(), config).unwrap();
            automaton.set_cached_score("fixed", 42.0);
            let before = snapshot(&automaton);
            let root = automaton.root();
            for blue in automaton.reachable().into_iter().skip(1) {
                if automaton.state(blue).parent() != Some(root) {
                    continue;
                }
                let merge = automaton.tree_merge(root, blue, true);
                assert!(automaton.cached_score("fixed").is_none() || merge.conflict);
                automaton.undo_merge(merge.undo.unwrap());
                assert_eq!(snapshot(&automaton), before);
            }
        }
    }

    #[test]
    fn conflicting_merge_mutates_nothing_observable() {
        let mut automaton = Automaton::build(2, &mixed_sample()).unwrap();
        let before = snapshot(&automaton);
        let root = automaton.root();
        let b = automaton.run(&word("b")).unwrap();
        // folding `b` into the root makes the root accepting, and the rejected `bb` ends up
        // being folded into the root as well
        let merge = automaton.tree_merge(root, b, true);
        assert!(merge.conflict);
        automaton.undo_merge(merge.undo.unwrap());
        assert_eq!(snapshot(&automaton), before);
        assert_eq!(automaton.state(b).known_conflicts(), &[root]);

        // the memo makes the second attempt fail before anything is touched
        let merge = automaton.tree_merge(root, b, true);
        assert!(merge.conflict);
        assert!(merge.undo.as_ref().unwrap().is_empty());
        automaton.undo_merge(merge.undo.unwrap());

        assert_eq!(
            automaton.merge(root, b),
            Err(crate::automaton::ConflictingMerge { red: root, blue: b })
        );
        assert_eq!(snapshot(&automaton), before);
    }

    #[test]
    fn folding_creates_loops_and_counts_agreement() {
        let samples = positives(&["aaab", "aaaaab", "aaabc"]);
        let mut automaton = Automaton::build(3, &samples).unwrap();
        let root = automaton.root();
        let a = automaton.run(&word("a")).unwrap();
        let agreement = automaton.merge(root, a).unwrap();
        assert_eq!(agreement, 1);
        assert_eq!(automaton.size(), 3);
        assert_eq!(automaton.successor(root, 0), Some(root));
        for w in ["aaab", "aaaaab", "aaabc", "b", "bc", "aaaaaaaab"] {
            assert!(automaton.recognize(&word(w)), "{w} should be accepted");
        }
        assert!(!automaton.recognize(&word("")));
        assert_eq!(automaton.reachable().len(), automaton.size());
        let b = automaton.successor(root, 1).unwrap();
        assert_eq!(automaton.state(b).weight(), 2);
        assert_eq!(automaton.state(b).edge_count(2), 1);
    }

    #[test]
    fn refuses_to_fold_into_descendant() {
        let samples = positives(&["ab"]);
        let mut automaton = Automaton::build(2, &samples).unwrap();
        let a = automaton.run(&word("a")).unwrap();
        let ab = automaton.run(&word("ab")).unwrap();
        assert!(automaton.merge(ab, a).is_err());
        assert!(automaton.merge(StateId(0), StateId(0)).is_err());
        assert_eq!(automaton.size(), 3);
    }

    #[test]
    fn refuses_blue_states_with_loops() {
        let samples = positives(&["ab", "ba"]);
        let mut automaton = Automaton::build(2, &samples).unwrap();
        let a = automaton.run(&word("a")).unwrap();
        let b = automaton.run(&word("b")).unwrap();
        let ab = automaton.run(&word("ab")).unwrap();
        automaton.merge(a, ab).unwrap();
        assert_eq!(automaton.successor(a, 1), Some(a));
        let before = snapshot(&automaton);
        assert_eq!(
            automaton.merge(b, a),
            Err(crate::automaton::ConflictingMerge { red: b, blue: a })
        );
        assert_eq!(snapshot(&automaton), before);
        assert_eq!(automaton.size(), 4);
        assert_eq!(automaton.reachable().len(), 4);
        assert_eq!(automaton.check_consistency(&samples), Ok(()));
    }

    #[test]
    fn folding_two_loops_stops() {
        let samples = positives(&["aa", "ba"]);
        let mut automaton = Automaton::build(2, &samples).unwrap();
        let a = automaton.run(&word("a")).unwrap();
        let b = automaton.run(&word("b")).unwrap();
        let aa = automaton.run(&word("aa")).unwrap();
        let ba = automaton.run(&word("ba")).unwrap();
        automaton.merge(a, aa).unwrap();
        automaton.merge(b, ba).unwrap();
        let before = snapshot(&automaton);
        assert!(automaton.merge(a, b).is_err());
        assert_eq!(snapshot(&automaton), before);

        // the raw fold reaches the folded `b` again through its loop and gives up
        let merge = automaton.tree_merge(a, b, true);
        assert!(merge.conflict);
        automaton.undo_merge(merge.undo.unwrap());
        assert_eq!(snapshot(&automaton), before);
        assert_eq!(automaton.check_consistency(&samples), Ok(()));
    }

    #[test]
    fn folds_long_chains() {
        let n = 10_000;
        let samples = vec![Sample::accept(vec![0; n]), Sample::reject(vec![0; n - 2])];
        let mut automaton = Automaton::build(1, &samples).unwrap();
        let root = automaton.root();
        let a = automaton.successor(root, 0).unwrap();
        let merge = automaton.tree_merge(root, a, true);
        assert!(merge.conflict);
        automaton.undo_merge(merge.undo.unwrap());
        assert_eq!(automaton.size(), n + 1);
        assert_eq!(automaton.check_consistency(&samples), Ok(()));

        let samples = vec![Sample::accept(vec![0; n]), Sample::accept(vec![0; n - 1])];
        let mut automaton = Automaton::build(1, &samples).unwrap();
        let a = automaton.successor(root, 0).unwrap();
        assert_eq!(automaton.merge(root, a), Ok(1));
        assert_eq!(automaton.size(), 1);
        assert!(automaton.recognize(&[0, 0, 0]));
        assert_eq!(automaton.check_consistency(&samples), Ok(()));
    }

    #[test]
    fn incremental_and_full_counts_agree() {
        let samples = mixed_sample();
        let full = AutomatonConfig::default()
            .with_counts(true)
            .with_incremental_counts(false);
        let mut incremental =
            Automaton::build_with(2, &samples, full.with_incremental_counts(true)).unwrap();
        let mut reference = Automaton::build_with(2, &samples, full).unwrap();
        let root = incremental.root();
        let a = incremental.run(&word("a")).unwrap();
        let aa = incremental.run(&word("aa")).unwrap();

        assert!(incremental.merge(a, aa).is_ok());
        assert!(reference.merge(a, aa).is_ok());
        let mut recomputed = incremental.clone();
        recomputed.recompute_derived();
        for automaton in [&reference, &recomputed] {
            for id in incremental.reachable() {
                for length in 0..=incremental.max_sample_length() {
                    let counts = incremental.counts().unwrap();
                    let other = automaton.counts().unwrap();
                    assert_eq!(counts.accepting(length, id), other.accepting(length, id));
                    assert_eq!(counts.rejecting(length, id), other.rejecting(length, id));
                }
            }
        }
        assert_eq!(incremental.successor(a, 0), Some(a));
        assert!(incremental.state(root).productive().accepting());
    }
}
