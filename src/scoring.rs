use std::{cmp::Ordering, fmt::Display, str::FromStr};

use thiserror::Error;
use tracing::trace;

use crate::automaton::{Automaton, State, StateId};

mod count;
pub use count::{EdgeCount, LabelAgreement, StateCount};

mod mdl;
pub use mdl::Mdl;

mod statistical;
pub use statistical::{ChiSquare, Fisher, Normal};

/// A candidate score where smaller is better. Scores are totally ordered through
/// [`f64::total_cmp`]; a NaN handed to [`Score::new`] becomes [`Score::CONFLICT`] and negative
/// zero becomes zero.
#[derive(Clone, Copy, Debug, Default)]
pub struct Score(f64);

impl Score {
    /// Reported for merges that are impossible, worse than every other score.
    pub const CONFLICT: Score = Score(f64::MAX);
    /// Better than every other score.
    pub const MIN: Score = Score(f64::MIN);

    pub fn new(value: f64) -> Self {
        if value.is_nan() {
            Self::CONFLICT
        } else {
            Self(value + 0.0)
        }
    }

    pub fn value(self) -> f64 {
        self.0
    }

    pub fn is_conflict(self) -> bool {
        self == Self::CONFLICT
    }
}

impl PartialEq for Score {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Score {}

impl PartialOrd for Score {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Score {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl Display for Score {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_conflict() {
            write!(f, "conflict")
        } else {
            write!(f, "{:.3}", self.0)
        }
    }
}

/// The rating of a single candidate: the score itself plus an auxiliary value that breaks
/// ties between equal scores (smaller is better as well).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct Evaluation {
    pub score: Score,
    pub aux: i64,
}

impl Evaluation {
    /// What promotions are rated with unless a strategy says otherwise.
    pub const PROMOTION: Evaluation = Evaluation {
        score: Score::MIN,
        aux: 0,
    };

    pub fn new(score: f64, aux: i64) -> Self {
        Self {
            score: Score::new(score),
            aux,
        }
    }
}

/// Ranks the candidates of a search and rates whole automata.
///
/// Exactly one strategy is active during a search. Candidate scoring is speculative: the
/// strategy may mutate the automaton to evaluate a merge but must leave it exactly as it
/// found it, which [`speculate`] takes care of.
pub trait ScoringStrategy {
    /// Called once before a search starts, for example to enable derived data the strategy
    /// relies on.
    fn prepare(&mut self, _automaton: &mut Automaton) {}

    /// Rates the candidate of merging `blue` into `red`, or of promoting `blue` if `red` is
    /// `None`. Returns `None` if the candidate must not be taken.
    fn score_candidate(
        &mut self,
        automaton: &mut Automaton,
        red: Option<StateId>,
        blue: StateId,
    ) -> Option<Evaluation> {
        match red {
            Some(red) => self.score_merge(automaton, red, blue),
            None => self.score_promotion(automaton, blue),
        }
    }

    /// Rates merging `blue` into `red`, `None` means the merge is rejected.
    fn score_merge(
        &mut self,
        automaton: &mut Automaton,
        red: StateId,
        blue: StateId,
    ) -> Option<Evaluation>;

    /// Rates promoting `blue` to red.
    fn score_promotion(&mut self, _automaton: &mut Automaton, _blue: StateId) -> Option<Evaluation> {
        Some(Evaluation::PROMOTION)
    }

    /// Computes the score of the whole automaton, smaller is better.
    fn evaluate(&mut self, automaton: &Automaton) -> f64;

    /// Identifies the strategy in the automaton's score cache. Strategies of the same type share
    /// cached scores.
    fn cache_key(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Like [`ScoringStrategy::evaluate`], but served from and stored in the automaton's score
    /// cache, which every mutation clears.
    fn score_automaton(&mut self, automaton: &mut Automaton) -> f64 {
        let key = self.cache_key();
        if let Some(score) = automaton.cached_score(key) {
            return score;
        }
        let score = self.evaluate(automaton);
        automaton.set_cached_score(key, score);
        score
    }
}

/// Folds `blue` into `red`, hands the merged automaton and the label agreement of the merge
/// to `evaluate` and reverts the merge afterwards. Folded pairs are passed to `observe`.
/// Returns `None` without calling `evaluate` if the merge conflicts.
pub fn speculate<O, F, T>(
    automaton: &mut Automaton,
    red: StateId,
    blue: StateId,
    observe: O,
    evaluate: F,
) -> Option<T>
where
    O: FnMut(&State, &State),
    F: FnOnce(&Automaton, u32) -> Option<T>,
{
    let merge = automaton.tree_merge_observed(red, blue, true, observe);
    let result = if merge.conflict {
        None
    } else {
        evaluate(automaton, merge.agreement)
    };
    if let Some(undo) = merge.undo {
        automaton.undo_merge(undo);
    }
    result
}

/// Returned when a strategy name is not known.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
#[error("unknown scoring strategy `{0}`")]
pub struct UnknownStrategy(pub String);

/// All built-in strategies behind a single type, so that the strategy can be chosen at
/// runtime, for example from a name.
#[derive(Clone, Debug)]
pub enum StrategyKind {
    Mdl(Mdl),
    StateCount(StateCount),
    EdgeCount(EdgeCount),
    LabelAgreement(LabelAgreement),
    ChiSquare(ChiSquare),
    Fisher(Fisher),
    Normal(Normal),
}

impl StrategyKind {
    pub fn name(&self) -> &'static str {
        match self {
            StrategyKind::Mdl(_) => "mdl",
            StrategyKind::StateCount(_) => "states",
            StrategyKind::EdgeCount(_) => "edges",
            StrategyKind::LabelAgreement(_) => "agreement",
            StrategyKind::ChiSquare(_) => "chi2",
            StrategyKind::Fisher(_) => "fisher",
            StrategyKind::Normal(_) => "normal",
        }
    }

    fn inner(&mut self) -> &mut dyn ScoringStrategy {
        match self {
            StrategyKind::Mdl(s) => s,
            StrategyKind::StateCount(s) => s,
            StrategyKind::EdgeCount(s) => s,
            StrategyKind::LabelAgreement(s) => s,
            StrategyKind::ChiSquare(s) => s,
            StrategyKind::Fisher(s) => s,
            StrategyKind::Normal(s) => s,
        }
    }
}

impl Default for StrategyKind {
    fn default() -> Self {
        StrategyKind::LabelAgreement(LabelAgreement::default())
    }
}

impl FromStr for StrategyKind {
    type Err = UnknownStrategy;

    /// Parses a strategy name, ignoring case. Strategies are created with their default
    /// parameters.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = match s.trim().to_ascii_lowercase().as_str() {
            "mdl" | "description-length" => StrategyKind::Mdl(Mdl::default()),
            "states" | "state-count" => StrategyKind::StateCount(StateCount),
            "edges" | "edge-count" => StrategyKind::EdgeCount(EdgeCount),
            "agreement" | "edsm" | "label-agreement" => {
                StrategyKind::LabelAgreement(LabelAgreement::default())
            }
            "chi2" | "chi-square" => StrategyKind::ChiSquare(ChiSquare::default()),
            "fisher" => StrategyKind::Fisher(Fisher::default()),
            "normal" | "z" => StrategyKind::Normal(Normal::default()),
            _ => return Err(UnknownStrategy(s.to_string())),
        };
        trace!("selected scoring strategy {}", kind.name());
        Ok(kind)
    }
}

impl ScoringStrategy for StrategyKind {
    fn prepare(&mut self, automaton: &mut Automaton) {
        self.inner().prepare(automaton)
    }

    fn score_candidate(
        &mut self,
        automaton: &mut Automaton,
        red: Option<StateId>,
        blue: StateId,
    ) -> Option<Evaluation> {
        self.inner().score_candidate(automaton, red, blue)
    }

    fn score_merge(
        &mut self,
        automaton: &mut Automaton,
        red: StateId,
        blue: StateId,
    ) -> Option<Evaluation> {
        self.inner().score_merge(automaton, red, blue)
    }

    fn score_promotion(&mut self, automaton: &mut Automaton, blue: StateId) -> Option<Evaluation> {
        self.inner().score_promotion(automaton, blue)
    }

    fn evaluate(&mut self, automaton: &Automaton) -> f64 {
        self.inner().evaluate(automaton)
    }

    fn cache_key(&self) -> &'static str {
        match self {
            StrategyKind::Mdl(s) => s.cache_key(),
            StrategyKind::StateCount(s) => s.cache_key(),
            StrategyKind::EdgeCount(s) => s.cache_key(),
            StrategyKind::LabelAgreement(s) => s.cache_key(),
            StrategyKind::ChiSquare(s) => s.cache_key(),
            StrategyKind::Fisher(s) => s.cache_key(),
            StrategyKind::Normal(s) => s.cache_key(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scores_are_totally_ordered() {
        let mut scores = vec![
            Score::new(f64::NAN),
            Score::new(1.5),
            Score::MIN,
            Score::new(-3.0),
            Score::CONFLICT,
        ];
        scores.sort();
        assert_eq!(
            scores,
            vec![
                Score::MIN,
                Score::new(-3.0),
                Score::new(1.5),
                Score::CONFLICT,
                Score::CONFLICT
            ]
        );
        assert!(Score::new(f64::NAN).is_conflict());
        assert!(Evaluation::new(1.0, -2) < Evaluation::new(1.0, -1));
        assert_eq!(Score::CONFLICT.to_string(), "conflict");
    }

    #[test]
    fn cached_scores_stay_with_their_strategy() {
        let samples = crate::tests::positives(&["aaab", "aaaaab", "aaabc"]);
        let mut automaton = Automaton::build(3, &samples).unwrap();
        let mdl = Mdl::default().score_automaton(&mut automaton);
        assert!(mdl > 9.0);
        assert_eq!(StateCount.score_automaton(&mut automaton), 9.0);
        assert_eq!(EdgeCount.score_automaton(&mut automaton), 8.0);
        assert_eq!(automaton.cached_score(Mdl::default().cache_key()), None);

        // a dispatching strategy shares the cache slot of the strategy it wraps
        let mut kind = "mdl".parse::<StrategyKind>().unwrap();
        assert_eq!(kind.cache_key(), Mdl::default().cache_key());
        assert_eq!(kind.score_automaton(&mut automaton), mdl);
        assert_eq!(automaton.cached_score(Mdl::default().cache_key()), Some(mdl));
        assert_eq!(StateCount.score_automaton(&mut automaton), 9.0);
    }

    #[test]
    fn parses_strategy_names() {
        for (name, expected) in [
            ("mdl", "mdl"),
            ("EDSM", "agreement"),
            ("state-count", "states"),
            ("edges", "edges"),
            ("chi2", "chi2"),
            ("fisher", "fisher"),
            (" z ", "normal"),
        ] {
            assert_eq!(name.parse::<StrategyKind>().unwrap().name(), expected);
        }
        assert_eq!(
            "blue".parse::<StrategyKind>().unwrap_err(),
            UnknownStrategy("blue".to_string())
        );
    }
}
