use itertools::Itertools;
use owo_colors::OwoColorize;
use tracing::{debug, trace};

use crate::{
    automaton::{Automaton, State, StateId},
    math::{Map, Partition},
};

/// Result of the partition refinement. Block ids index into `blocks`, `find` maps every
/// reachable state (and the implicit sink, which has the last index) to its block.
struct Refinement {
    order: Vec<StateId>,
    blocks: Vec<Vec<usize>>,
    find: Vec<usize>,
}

impl Refinement {
    fn sink(&self) -> usize {
        self.order.len()
    }

    fn sink_block(&self) -> usize {
        self.find[self.sink()]
    }
}

impl Automaton {
    /// Runs Hopcroft's partition refinement on the reachable part of `self`. Missing transitions
    /// lead to an implicit unlabeled sink, so two states are equivalent if and only if they
    /// classify every string the same way (accepted, rejected or unknown).
    fn refine(&self) -> Refinement {
        let order = self.reachable();
        let n = order.len();
        let sink = n;
        let k = self.alphabet_size();
        let mut position = vec![usize::MAX; self.arena_len()];
        for (i, id) in order.iter().enumerate() {
            position[id.index()] = i;
        }
        let target = |i: usize, symbol: usize| -> usize {
            if i == sink {
                return sink;
            }
            self.state(order[i])
                .child(symbol)
                .map_or(sink, |t| position[t.index()])
        };

        let mut inverse: Vec<Vec<usize>> = vec![vec![]; (n + 1) * k];
        for i in 0..=n {
            for symbol in 0..k {
                inverse[target(i, symbol) * k + symbol].push(i);
            }
        }

        let mut initial: [Vec<usize>; 3] = Default::default();
        for i in 0..=n {
            let class = match (i != sink).then(|| self.state(order[i]).label()).flatten() {
                Some(true) => 0,
                Some(false) => 1,
                None => 2,
            };
            initial[class].push(i);
        }

        let mut blocks: Vec<Vec<usize>> = Vec::new();
        let mut find = vec![0usize; n + 1];
        let mut queued: Vec<bool> = Vec::new();
        let mut worklist: Vec<usize> = Vec::new();
        for members in initial.into_iter().filter(|b| !b.is_empty()) {
            let id = blocks.len();
            for &i in &members {
                find[i] = id;
            }
            blocks.push(members);
            queued.push(true);
            worklist.push(id);
        }

        let mut hits: Map<usize, Vec<usize>> = Map::default();
        let mut marked = vec![false; n + 1];
        while let Some(splitter) = worklist.pop() {
            queued[splitter] = false;
            let members = blocks[splitter].clone();
            for symbol in 0..k {
                hits.clear();
                for &j in &members {
                    for &i in &inverse[j * k + symbol] {
                        if !marked[i] {
                            marked[i] = true;
                            hits.entry(find[i]).or_default().push(i);
                        }
                    }
                }
                for (&block, inside) in hits.iter() {
                    if inside.len() == blocks[block].len() {
                        for &i in inside {
                            marked[i] = false;
                        }
                        continue;
                    }
                    let (kept, moved): (Vec<usize>, Vec<usize>) =
                        blocks[block].iter().partition(|&&i| marked[i]);
                    for &i in inside {
                        marked[i] = false;
                    }
                    let new = blocks.len();
                    for &i in &moved {
                        find[i] = new;
                    }
                    trace!(
                        "splitting block of {} states into {} and {}",
                        blocks[block].len(),
                        kept.len(),
                        moved.len()
                    );
                    let smaller = if kept.len() <= moved.len() { block } else { new };
                    blocks[block] = kept;
                    blocks.push(moved);
                    queued.push(false);
                    if queued[block] {
                        queued[new] = true;
                        worklist.push(new);
                    } else {
                        queued[smaller] = true;
                        worklist.push(smaller);
                    }
                }
            }
        }

        Refinement {
            order,
            blocks,
            find,
        }
    }

    /// Groups the reachable states of `self` into classes of language-equivalent states.
    /// States from which neither an accepting nor a rejecting state is reachable form one
    /// class (if there are any).
    pub fn equivalence_classes(&self) -> Partition<StateId> {
        let refinement = self.refine();
        let sink = refinement.sink();
        Partition::new(refinement.blocks.iter().map(|block| {
            block
                .iter()
                .filter(|&&i| i != sink)
                .map(|&i| refinement.order[i])
                .collect_vec()
        }))
    }

    /// Returns the minimal automaton with the same three-valued classification as `self`.
    ///
    /// Equivalent states are collapsed into one, whose weight and traffic are the sums over the
    /// class. States that behave like the implicit sink are removed together with their
    /// incoming edges, except for the root which is always kept. Sample statistics and the
    /// configuration carry over.
    pub fn minimize(&self) -> Automaton {
        let refinement = self.refine();
        let sink_block = refinement.sink_block();
        let root_block = refinement.find[0];
        let mut position = vec![0; self.arena_len()];
        for (i, id) in refinement.order.iter().enumerate() {
            position[id.index()] = i;
        }

        // new index per surviving block, the root's block comes first
        let mut renaming: Vec<Option<usize>> = vec![None; refinement.blocks.len()];
        let mut states: Vec<State> = Vec::new();
        for i in 0..refinement.order.len() {
            let block = refinement.find[i];
            if renaming[block].is_none() && (block != sink_block || block == root_block) {
                renaming[block] = Some(states.len());
                states.push(State::new(self.alphabet_size(), None, 0));
            }
        }

        for (i, &id) in refinement.order.iter().enumerate() {
            let block = refinement.find[i];
            let Some(new) = renaming[block] else {
                continue;
            };
            let old = self.state(id);
            let state = &mut states[new];
            state.accepting |= old.is_accepting();
            state.rejecting |= old.is_rejecting();
            state.weight += old.weight();
            state.traffic += old.traffic();
            for (symbol, child) in old.edges() {
                let child_block = refinement.find[position[child.index()]];
                if child_block == sink_block {
                    continue;
                }
                if let Some(target) = renaming[child_block] {
                    state.children[symbol] = Some(StateId::from_index(target));
                    state.edge_counts[symbol] += old.edge_count(symbol);
                }
            }
        }

        let mut minimized = Automaton::from_states(
            self.alphabet_size(),
            states,
            StateId::from_index(0),
            self.config(),
        );
        minimized.inherit_sample_statistics(self);
        debug!(
            "minimized automaton from {} to {} states",
            self.size(),
            minimized.size().bold()
        );
        minimized
    }
}
