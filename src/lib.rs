//! Passive learning of deterministic finite automata by state merging.
//!
//! Labeled example strings (see [`Sample`]) are first arranged in a prefix-tree automaton,
//! which is then generalized by repeatedly folding states into each other. The search follows
//! the red/blue frontier scheme: red states are committed to stay distinct, blue states are
//! the not yet red successors of red states. In every step each blue state is either merged
//! into a compatible red state or promoted to red, until no blue state remains.
//!
//! Which merge is taken is decided by a [`scoring::ScoringStrategy`], which ranks the candidate
//! merges, together with a [`search::Guidance`], which picks one of the ranked candidates. The
//! built-in strategies rank by description length, by state or edge count, by label agreement
//! (evidence driven state merging) and by a number of statistical compatibility tests.
//!
//! ```
//! use dfa_inference::prelude::*;
//!
//! let mut symbols = SymbolTable::new();
//! let samples = ["aaab", "aaaaab", "aaabc"]
//!     .into_iter()
//!     .map(|w| Sample::accept(symbols.intern_chars(w)))
//!     .collect::<Vec<_>>();
//! let pta = Automaton::build(symbols.len(), &samples).unwrap();
//! let learned = fold(
//!     pta,
//!     &mut LabelAgreement::default(),
//!     &mut Greedy,
//!     &SearchConfig::default(),
//! )
//! .unwrap();
//! assert!(samples.iter().all(|s| learned.recognize(&s.symbols)));
//! assert!(!learned.recognize(&[]));
//! ```

/// The prelude is supposed to make using this package easier. Including everything, i.e.
/// `use dfa_inference::prelude::*;` should be enough to use the package.
pub mod prelude {
    pub use super::{
        automaton::{
            Automaton, AutomatonConfig, BuildError, ConflictingMerge, StateId, TextMode,
        },
        sample::{Label, Sample, SymbolId, SymbolTable},
        scoring::{
            ChiSquare, EdgeCount, Fisher, LabelAgreement, Mdl, Normal, Score, ScoringStrategy,
            StateCount, StrategyKind,
        },
        search::{
            fold, fold_best, options, BluePick, Choice, Greedy, Guidance, Replay, SearchConfig,
            SearchError,
        },
    };
    #[cfg(feature = "random")]
    pub use super::search::Random;
}

/// Mathematical helpers: collection aliases, partitions and the special functions used by
/// the scoring strategies.
pub mod math;

/// Labeled samples and the symbol table that interns their tokens.
pub mod sample;
pub use sample::{Label, Sample, SymbolId, SymbolTable};

/// The mutable automaton store together with the merge and undo machinery.
pub mod automaton;
pub use automaton::{Automaton, AutomatonConfig, StateId};

/// Partition refinement minimization.
pub mod minimize;

/// Scoring strategies that rank candidate merges.
pub mod scoring;

/// The red/blue search driver and the guidance that steers it.
pub mod search;
pub use search::{fold, fold_best, options};

#[cfg(test)]
pub(crate) mod tests {
    use itertools::Itertools;

    use crate::{Sample, SymbolId};

    /// Maps `a` to 0, `b` to 1 and so on.
    pub fn word(w: &str) -> Vec<SymbolId> {
        w.bytes().map(|b| (b - b'a') as SymbolId).collect()
    }

    pub fn positives(words: &[&str]) -> Vec<Sample> {
        words.iter().map(|w| Sample::accept(word(w))).collect()
    }

    /// All words over the first `alphabet` symbols up to length `max_length`.
    pub fn all_words(alphabet: u32, max_length: usize) -> Vec<Vec<SymbolId>> {
        let mut layer: Vec<Vec<SymbolId>> = vec![vec![]];
        let mut words = layer.clone();
        for _ in 0..max_length {
            layer = layer
                .iter()
                .cartesian_product(0..alphabet)
                .map(|(w, s)| w.iter().copied().chain([s]).collect_vec())
                .collect_vec();
            words.extend(layer.iter().cloned());
        }
        words
    }
}
