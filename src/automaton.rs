use std::collections::VecDeque;

use itertools::Itertools;
use owo_colors::OwoColorize;
use thiserror::Error;
use tracing::{debug, trace};

use crate::sample::{Label, Sample, SymbolId};

mod state;
pub use state::{Productive, State, StateId};
pub(crate) use state::StateFields;

mod undo;
pub use undo::UndoInfo;
pub(crate) use undo::{UndoPool, UndoRecord};

mod merge;
pub use merge::{ConflictingMerge, Merge};

mod derived;
pub use derived::CountTables;

mod check;
pub use check::ConsistencyError;

mod text;
pub use text::{ParseError, TextMode};

mod table;

/// Errors that can occur when building a prefix-tree automaton from samples.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum BuildError {
    #[error("sample {index} ({sample:?}) is labeled both accepted and rejected")]
    ConflictingLabels { index: usize, sample: Sample },
    #[error("sample {index} uses symbol {symbol} but the alphabet only has {alphabet_size} symbols")]
    SymbolOutOfRange {
        index: usize,
        symbol: SymbolId,
        alphabet_size: usize,
    },
}

/// Switches that decide which derived data an [`Automaton`] keeps up to date across merges.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AutomatonConfig {
    /// Maintain the productivity flags of all states.
    pub track_productive: bool,
    /// Maintain the per-length recognition count tables.
    pub track_counts: bool,
    /// Refresh the count tables only for the ancestor closure of the states a merge touched,
    /// instead of recomputing them for every state.
    pub incremental_counts: bool,
}

impl Default for AutomatonConfig {
    fn default() -> Self {
        Self {
            track_productive: true,
            track_counts: false,
            incremental_counts: true,
        }
    }
}

impl AutomatonConfig {
    pub fn with_productive(mut self, track: bool) -> Self {
        self.track_productive = track;
        self
    }

    pub fn with_counts(mut self, track: bool) -> Self {
        self.track_counts = track;
        self
    }

    pub fn with_incremental_counts(mut self, incremental: bool) -> Self {
        self.incremental_counts = incremental;
        self
    }
}

/// A mutable deterministic automaton stored as an arena of [`State`]s.
///
/// The automaton starts out as the prefix tree of a sample (see [`Automaton::build`]) and is
/// then shrunk by folding states into each other with [`Automaton::tree_merge`]. Folded states
/// stay in the arena but are no longer alive; [`Automaton::compact`] produces a copy whose ids
/// are dense again. Every state has at most one successor per symbol at all times.
#[derive(Clone)]
pub struct Automaton {
    alphabet_size: usize,
    states: Vec<State>,
    root: StateId,
    live: usize,
    max_sample_length: usize,
    positives_by_length: Vec<u32>,
    negatives_by_length: Vec<u32>,
    productive_counts: [usize; 2],
    counts: Option<CountTables>,
    cached_score: Option<(&'static str, f64)>,
    config: AutomatonConfig,
    pool: UndoPool,
}

impl Automaton {
    /// Creates an automaton consisting of an unlabeled root only.
    pub fn new(alphabet_size: usize) -> Self {
        Self::with_config(alphabet_size, AutomatonConfig::default())
    }

    pub fn with_config(alphabet_size: usize, config: AutomatonConfig) -> Self {
        let mut automaton = Self {
            alphabet_size,
            states: vec![State::new(alphabet_size, None, 0)],
            root: StateId(0),
            live: 1,
            max_sample_length: 0,
            positives_by_length: vec![0],
            negatives_by_length: vec![0],
            productive_counts: [0, 0],
            counts: None,
            cached_score: None,
            config,
            pool: UndoPool::default(),
        };
        automaton.recompute_derived();
        automaton
    }

    /// Builds the prefix-tree automaton of `samples`: one state per distinct prefix, where a
    /// sample sharing a prefix with an earlier one reuses the existing states.
    pub fn build<'a, I>(alphabet_size: usize, samples: I) -> Result<Self, BuildError>
    where
        I: IntoIterator<Item = &'a Sample>,
    {
        Self::build_with(alphabet_size, samples, AutomatonConfig::default())
    }

    /// Like [`Automaton::build`] but with an explicit configuration.
    pub fn build_with<'a, I>(
        alphabet_size: usize,
        samples: I,
        config: AutomatonConfig,
    ) -> Result<Self, BuildError>
    where
        I: IntoIterator<Item = &'a Sample>,
    {
        let mut automaton = Self::with_config(alphabet_size, config);
        let mut positives = vec![0u32; 1];
        let mut negatives = vec![0u32; 1];

        for (index, sample) in samples.into_iter().enumerate() {
            if let Some(&symbol) = sample
                .symbols
                .iter()
                .find(|&&s| s as usize >= alphabet_size)
            {
                return Err(BuildError::SymbolOutOfRange {
                    index,
                    symbol,
                    alphabet_size,
                });
            }

            let mut current = automaton.root;
            automaton.states[current.index()].traffic += 1;
            for (depth, &symbol) in sample.symbols.iter().enumerate() {
                let symbol = symbol as usize;
                automaton.states[current.index()].edge_counts[symbol] += 1;
                let next = match automaton.states[current.index()].children[symbol] {
                    Some(next) => next,
                    None => {
                        let next = automaton.push_state(Some(current), depth as u32 + 1);
                        automaton.states[current.index()].children[symbol] = Some(next);
                        next
                    }
                };
                automaton.states[next.index()].traffic += 1;
                current = next;
            }

            let length = sample.len();
            if positives.len() <= length {
                positives.resize(length + 1, 0);
                negatives.resize(length + 1, 0);
            }
            automaton.max_sample_length = automaton.max_sample_length.max(length);

            let state = &mut automaton.states[current.index()];
            state.weight += 1;
            match sample.label {
                Label::Accept => {
                    if state.rejecting {
                        return Err(BuildError::ConflictingLabels {
                            index,
                            sample: sample.clone(),
                        });
                    }
                    if !state.accepting {
                        state.accepting = true;
                        positives[length] += 1;
                    }
                }
                Label::Reject => {
                    if state.accepting {
                        return Err(BuildError::ConflictingLabels {
                            index,
                            sample: sample.clone(),
                        });
                    }
                    if !state.rejecting {
                        state.rejecting = true;
                        negatives[length] += 1;
                    }
                }
                Label::Unknown => {}
            }
        }

        automaton.positives_by_length = positives;
        automaton.negatives_by_length = negatives;
        automaton.recompute_derived();
        debug!(
            "built prefix tree with {} states, maximal sample length {}",
            automaton.size().bold(),
            automaton.max_sample_length
        );
        Ok(automaton)
    }

    fn push_state(&mut self, parent: Option<StateId>, depth: u32) -> StateId {
        let id = StateId::from_index(self.states.len());
        self.states.push(State::new(self.alphabet_size, parent, depth));
        self.live += 1;
        id
    }

    pub fn alphabet_size(&self) -> usize {
        self.alphabet_size
    }

    pub fn root(&self) -> StateId {
        self.root
    }

    /// Number of live states.
    pub fn size(&self) -> usize {
        self.live
    }

    /// Number of slots in the arena, including states that were folded away.
    pub fn arena_len(&self) -> usize {
        self.states.len()
    }

    pub fn config(&self) -> AutomatonConfig {
        self.config
    }

    /// Length of the longest sample the automaton was built from.
    pub fn max_sample_length(&self) -> usize {
        self.max_sample_length
    }

    /// Number of distinct accepted samples of each length.
    pub fn positives_by_length(&self) -> &[u32] {
        &self.positives_by_length
    }

    /// Number of distinct rejected samples of each length.
    pub fn negatives_by_length(&self) -> &[u32] {
        &self.negatives_by_length
    }

    /// Returns the state with the given id.
    ///
    /// # Panics
    /// If `id` does not belong to this automaton's arena.
    pub fn state(&self, id: StateId) -> &State {
        &self.states[id.index()]
    }

    /// Returns the state with the given id, or `None` if it is out of bounds.
    pub fn get(&self, id: StateId) -> Option<&State> {
        self.states.get(id.index())
    }

    pub fn successor(&self, id: StateId, symbol: usize) -> Option<StateId> {
        self.states.get(id.index()).and_then(|s| s.child(symbol))
    }

    /// Returns the live states reachable from the root in breadth-first order.
    pub fn reachable(&self) -> Vec<StateId> {
        let mut seen = bit_set::BitSet::with_capacity(self.states.len());
        let mut order = Vec::with_capacity(self.live);
        let mut queue = VecDeque::from([self.root]);
        seen.insert(self.root.index());
        while let Some(id) = queue.pop_front() {
            order.push(id);
            for (_, child) in self.states[id.index()].edges() {
                if seen.insert(child.index()) {
                    queue.push_back(child);
                }
            }
        }
        order
    }

    /// Number of edges between reachable states.
    pub fn edge_count(&self) -> usize {
        self.reachable()
            .into_iter()
            .map(|id| self.states[id.index()].edges().count())
            .sum()
    }

    /// Number of reachable states from which an accepting (`true`) or rejecting (`false`)
    /// state can be reached.
    pub fn productive_count(&self, accepting: bool) -> usize {
        self.productive_counts[usize::from(!accepting)]
    }

    /// Cached whole-automaton score, if the strategy identified by `key` computed it. Every
    /// mutation clears the cache.
    pub fn cached_score(&self, key: &str) -> Option<f64> {
        self.cached_score
            .filter(|(cached, _)| *cached == key)
            .map(|(_, score)| score)
    }

    /// Caches `score` for the strategy identified by `key`, replacing any other cached score.
    pub fn set_cached_score(&mut self, key: &'static str, score: f64) {
        self.cached_score = Some((key, score));
    }

    /// The per-length recognition count tables, if they are tracked.
    pub fn counts(&self) -> Option<&CountTables> {
        self.counts.as_ref()
    }

    /// Runs `symbols` from the root and returns the state that is reached, or `None` if an edge is missing.
    pub fn run(&self, symbols: &[SymbolId]) -> Option<StateId> {
        symbols.iter().try_fold(self.root, |current, &symbol| {
            self.successor(current, symbol as usize)
        })
    }

    /// Returns the classification of `symbols`: `Some(true)` if the reached state is accepting,
    /// `Some(false)` if it is rejecting and `None` if the run is unsuccessful or ends in an
    /// unlabeled state.
    pub fn classify(&self, symbols: &[SymbolId]) -> Option<bool> {
        self.run(symbols)
            .and_then(|state| self.states[state.index()].label())
    }

    /// Returns true if and only if `symbols` leads to an accepting state.
    pub fn recognize(&self, symbols: &[SymbolId]) -> bool {
        self.classify(symbols) == Some(true)
    }

    /// Enables or disables tracking of the count tables, recomputing them if necessary.
    pub fn track_counts(&mut self, track: bool) {
        if self.config.track_counts != track {
            self.config.track_counts = track;
            self.recompute_derived();
        }
    }

    /// Returns a copy of `self` that only contains the reachable states, renumbered in
    /// breadth-first order so that the root gets id `0`. Red/blue bookkeeping of a search does
    /// not survive compaction.
    pub fn compact(&self) -> Automaton {
        let order = self.reachable();
        let mut renaming = vec![None; self.states.len()];
        for (new, old) in order.iter().enumerate() {
            renaming[old.index()] = Some(StateId::from_index(new));
        }
        let rename = |id: StateId| renaming[id.index()];

        let states = order
            .iter()
            .map(|old| {
                let state = &self.states[old.index()];
                let mut renamed = state.clone();
                renamed.children = state
                    .children
                    .iter()
                    .map(|c| c.and_then(rename))
                    .collect();
                renamed.parent = state.parent.and_then(rename);
                renamed.conflicts.clear();
                renamed
            })
            .collect_vec();
        trace!(
            "compacted arena of {} slots into {} states",
            self.states.len(),
            states.len()
        );

        let mut compacted = Automaton {
            alphabet_size: self.alphabet_size,
            live: states.len(),
            states,
            root: StateId(0),
            max_sample_length: self.max_sample_length,
            positives_by_length: self.positives_by_length.clone(),
            negatives_by_length: self.negatives_by_length.clone(),
            productive_counts: [0, 0],
            counts: None,
            cached_score: None,
            config: self.config,
            pool: UndoPool::default(),
        };
        compacted.recompute_derived();
        compacted
    }

    /// Assembles an automaton from raw parts. States not reachable from `root` are dropped,
    /// tree parents and depths are replaced by a breadth-first spanning tree.
    pub(crate) fn from_states(
        alphabet_size: usize,
        mut states: Vec<State>,
        root: StateId,
        config: AutomatonConfig,
    ) -> Automaton {
        for state in states.iter_mut() {
            state.parent = None;
            state.depth = 0;
        }
        let mut seen = bit_set::BitSet::with_capacity(states.len());
        let mut queue = VecDeque::from([root]);
        seen.insert(root.index());
        while let Some(id) = queue.pop_front() {
            let depth = states[id.index()].depth;
            let children = states[id.index()].edges().collect_vec();
            for (_, child) in children {
                if seen.insert(child.index()) {
                    let state = &mut states[child.index()];
                    state.parent = Some(id);
                    state.depth = depth + 1;
                    queue.push_back(child);
                }
            }
        }

        let automaton = Automaton {
            alphabet_size,
            live: states.len(),
            states,
            root,
            max_sample_length: 0,
            positives_by_length: vec![0],
            negatives_by_length: vec![0],
            productive_counts: [0, 0],
            counts: None,
            cached_score: None,
            config,
            pool: UndoPool::default(),
        };
        automaton.compact()
    }

    /// Carries the sample statistics of `other` over to `self`, used when an automaton is
    /// rebuilt from another one (for example after minimization).
    pub(crate) fn inherit_sample_statistics(&mut self, other: &Automaton) {
        self.max_sample_length = other.max_sample_length;
        self.positives_by_length = other.positives_by_length.clone();
        self.negatives_by_length = other.negatives_by_length.clone();
        self.config = other.config;
        self.recompute_derived();
    }
}

impl std::fmt::Debug for Automaton {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Automaton with {} live states, root {:?}\n{}",
            self.live,
            self.root,
            self.transition_table()
        )
    }
}
