use std::collections::VecDeque;

use bit_set::BitSet;
use tracing::trace;

use super::{Automaton, Productive, State, StateId, UndoRecord};

/// Two parallel tables indexed by `[length][state]`. Entry `accepting[l][q]` is the number of
/// strings of length `l` that lead from `q` to an accepting state, and `rejecting[l][q]` the
/// same for rejecting states. Counts are kept as `f64` since they grow exponentially with the
/// length; all entries are integral.
#[derive(Clone, Debug, PartialEq)]
pub struct CountTables {
    accepting: Vec<Vec<f64>>,
    rejecting: Vec<Vec<f64>>,
}

impl CountTables {
    fn zeroed(max_length: usize, states: usize) -> Self {
        Self {
            accepting: vec![vec![0.0; states]; max_length + 1],
            rejecting: vec![vec![0.0; states]; max_length + 1],
        }
    }

    /// Largest length for which counts are kept.
    pub fn max_length(&self) -> usize {
        self.accepting.len() - 1
    }

    /// Number of strings of length `length` leading from `state` to an accepting state.
    pub fn accepting(&self, length: usize, state: StateId) -> f64 {
        self.accepting[length][state.index()]
    }

    /// Number of strings of length `length` leading from `state` to a rejecting state.
    pub fn rejecting(&self, length: usize, state: StateId) -> f64 {
        self.rejecting[length][state.index()]
    }

    fn column(&self, state: StateId) -> (Box<[f64]>, Box<[f64]>) {
        let q = state.index();
        (
            self.accepting.iter().map(|row| row[q]).collect(),
            self.rejecting.iter().map(|row| row[q]).collect(),
        )
    }

    pub(crate) fn restore_column(&mut self, state: StateId, accepting: &[f64], rejecting: &[f64]) {
        let q = state.index();
        for (row, value) in self.accepting.iter_mut().zip(accepting) {
            row[q] = *value;
        }
        for (row, value) in self.rejecting.iter_mut().zip(rejecting) {
            row[q] = *value;
        }
    }
}

impl Automaton {
    /// Recomputes productivity flags and (if tracked) the count tables from scratch.
    pub(crate) fn recompute_derived(&mut self) {
        let order = self.reachable();
        if self.config.track_productive {
            let predecessors = self.predecessors(&order);
            let flags = self.compute_productive(&order, &predecessors);
            self.productive_counts = [0, 0];
            for &id in &order {
                let flag = flags[id.index()];
                self.count_productive(flag);
                self.states[id.index()].productive = flag;
            }
        }
        if self.config.track_counts {
            let mut tables = CountTables::zeroed(self.max_sample_length, self.states.len());
            self.fill_counts(&mut tables, &order);
            self.counts = Some(tables);
        } else {
            self.counts = None;
        }
    }

    fn count_productive(&mut self, flag: Productive) {
        if flag.accepting() {
            self.productive_counts[0] += 1;
        }
        if flag.rejecting() {
            self.productive_counts[1] += 1;
        }
    }

    /// Parent sets of all reachable states, indexed by arena position.
    pub(crate) fn predecessors(&self, order: &[StateId]) -> Vec<Vec<StateId>> {
        let mut predecessors = vec![Vec::new(); self.states.len()];
        for &id in order {
            for (_, child) in self.states[id.index()].edges() {
                predecessors[child.index()].push(id);
            }
        }
        predecessors
    }

    /// Backward reachability from accepting and rejecting states.
    pub(crate) fn compute_productive(
        &self,
        order: &[StateId],
        predecessors: &[Vec<StateId>],
    ) -> Vec<Productive> {
        let mut flags = vec![Productive::NONE; self.states.len()];
        for (flag, is_target) in [
            (Productive::ACCEPTING, State::is_accepting as fn(&State) -> bool),
            (Productive::REJECTING, State::is_rejecting as fn(&State) -> bool),
        ] {
            let mut queue: VecDeque<StateId> = order
                .iter()
                .copied()
                .filter(|id| is_target(&self.states[id.index()]))
                .collect();
            let mut seen = BitSet::with_capacity(self.states.len());
            for id in &queue {
                seen.insert(id.index());
            }
            while let Some(id) = queue.pop_front() {
                flags[id.index()] = flags[id.index()].with(flag);
                for &pred in &predecessors[id.index()] {
                    if seen.insert(pred.index()) {
                        queue.push_back(pred);
                    }
                }
            }
        }
        flags
    }

    /// Fills the columns of `states` layer by layer. Columns of all other states must already
    /// be correct since they are read but not written.
    fn fill_counts(&self, tables: &mut CountTables, states: &[StateId]) {
        for &id in states {
            let state = &self.states[id.index()];
            tables.accepting[0][id.index()] = f64::from(u8::from(state.accepting));
            tables.rejecting[0][id.index()] = f64::from(u8::from(state.rejecting));
        }
        for length in 1..tables.accepting.len() {
            for table in [&mut tables.accepting, &mut tables.rejecting] {
                let (previous, current) = table.split_at_mut(length);
                let previous = &previous[length - 1];
                let current = &mut current[0];
                for &id in states {
                    current[id.index()] = self.states[id.index()]
                        .edges()
                        .map(|(_, child)| previous[child.index()])
                        .sum();
                }
            }
        }
    }

    /// Brings the derived data up to date after a successful fold. `touched` holds every state
    /// whose label or outgoing edges changed; all modifications are logged if `log` is given.
    pub(crate) fn refresh_after_merge(
        &mut self,
        mut log: Option<&mut Vec<UndoRecord>>,
        touched: &[StateId],
    ) {
        if !self.config.track_productive && !self.config.track_counts {
            return;
        }
        let order = self.reachable();
        let predecessors = self.predecessors(&order);

        if self.config.track_productive {
            let flags = self.compute_productive(&order, &predecessors);
            self.productive_counts = [0, 0];
            for &id in &order {
                let flag = flags[id.index()];
                self.count_productive(flag);
                let state = &mut self.states[id.index()];
                if state.productive != flag {
                    if let Some(log) = log.as_mut() {
                        log.push(UndoRecord::Productive(id, state.productive));
                    }
                    state.productive = flag;
                }
            }
        }

        if self.config.track_counts {
            let mut tables = match self.counts.take() {
                Some(tables) => tables,
                None => CountTables::zeroed(self.max_sample_length, self.states.len()),
            };
            if self.config.incremental_counts {
                let affected = self.ancestor_closure(touched, &predecessors);
                trace!(
                    "incrementally recounting {} of {} states",
                    affected.len(),
                    order.len()
                );
                if let Some(log) = log.as_mut() {
                    for &id in &affected {
                        let (accepting, rejecting) = tables.column(id);
                        log.push(UndoRecord::Column {
                            state: id,
                            accepting,
                            rejecting,
                        });
                    }
                }
                self.fill_counts(&mut tables, &affected);
            } else {
                if let Some(log) = log.as_mut() {
                    log.push(UndoRecord::Tables(tables.clone()));
                }
                self.fill_counts(&mut tables, &order);
            }
            self.counts = Some(tables);
        }
    }

    /// All live states from which one of `touched` can be reached, including `touched` itself.
    fn ancestor_closure(&self, touched: &[StateId], predecessors: &[Vec<StateId>]) -> Vec<StateId> {
        let mut seen = BitSet::with_capacity(self.states.len());
        let mut closure = Vec::new();
        let mut queue: VecDeque<StateId> = VecDeque::new();
        for &id in touched {
            if self.states[id.index()].alive && seen.insert(id.index()) {
                queue.push_back(id);
            }
        }
        while let Some(id) = queue.pop_front() {
            closure.push(id);
            for &pred in &predecessors[id.index()] {
                if seen.insert(pred.index()) {
                    queue.push_back(pred);
                }
            }
        }
        closure
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        automaton::{AutomatonConfig, StateId},
        tests::{positives, word},
        Automaton, Sample,
    };

    #[test]
    fn counts_of_prefix_tree() {
        let samples = positives(&["ab", "aa", "b"]);
        let config = AutomatonConfig::default().with_counts(true);
        let pta = Automaton::build_with(2, &samples, config).unwrap();
        let counts = pta.counts().unwrap();
        assert_eq!(counts.max_length(), 2);
        assert_eq!(counts.accepting(2, pta.root()), 2.0);
        assert_eq!(counts.accepting(1, pta.root()), 1.0);
        assert_eq!(counts.accepting(0, pta.root()), 0.0);
        let a = pta.run(&word("a")).unwrap();
        assert_eq!(counts.accepting(1, a), 2.0);
        assert_eq!(counts.rejecting(1, a), 0.0);
    }

    #[test]
    fn productivity_follows_labels() {
        let samples = vec![
            Sample::accept(word("ab")),
            Sample::reject(word("b")),
            Sample::new(crate::Label::Unknown, word("aa")),
        ];
        let pta = Automaton::build(2, &samples).unwrap();
        let root = pta.state(pta.root()).productive();
        assert!(root.accepting() && root.rejecting());
        let a = pta.state(pta.run(&word("a")).unwrap()).productive();
        assert!(a.accepting() && !a.rejecting());
        let aa = pta.state(pta.run(&word("aa")).unwrap()).productive();
        assert_eq!(aa, crate::automaton::Productive::NONE);
        assert_eq!(pta.productive_count(true), 3);
        assert_eq!(pta.productive_count(false), 2);
        assert_eq!(pta.state(StateId(0)).productive(), root);
    }
}
