use bit_set::BitSet;
use itertools::Itertools;
use owo_colors::OwoColorize;
use thiserror::Error;
use tracing::{debug, info, trace};

use crate::{
    automaton::{Automaton, ConflictingMerge, StateId},
    scoring::{Evaluation, ScoringStrategy},
};

mod choice;
pub use choice::Choice;

mod guidance;
#[cfg(feature = "random")]
pub use guidance::Random;
pub use guidance::{Greedy, Guidance, Replay};

mod blue;
pub use blue::{BluePick, UnknownBluePick};

/// Errors that abort a search.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Error)]
pub enum SearchError {
    /// A candidate that was scored as viable turned out to conflict when it was applied.
    #[error(transparent)]
    Conflict(#[from] ConflictingMerge),
    #[error("no search runs were requested")]
    NoRuns,
}

/// Settings of a single search run.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SearchConfig {
    /// Stop after this many steps even if blue states remain.
    pub max_steps: Option<usize>,
    /// Offer only the candidates of one blue state per step.
    pub blue_pick: Option<BluePick>,
    /// Minimize the result; otherwise it is only compacted.
    pub minimize: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_steps: None,
            blue_pick: None,
            minimize: true,
        }
    }
}

impl SearchConfig {
    pub fn with_max_steps(mut self, steps: usize) -> Self {
        self.max_steps = Some(steps);
        self
    }

    pub fn with_blue_pick(mut self, pick: BluePick) -> Self {
        self.blue_pick = Some(pick);
        self
    }

    pub fn with_minimize(mut self, minimize: bool) -> Self {
        self.minimize = minimize;
        self
    }
}

/// The result of a finished search.
#[derive(Clone, Debug)]
pub struct Outcome {
    pub automaton: Automaton,
    /// The index taken in every step, feed it to [`Replay`] to repeat the run.
    pub decisions: Vec<usize>,
    /// The strategy's score of the final automaton.
    pub score: f64,
}

/// The red/blue state merging search.
///
/// Red states are committed to stay distinct, blue states are the successors of red states
/// that are not red themselves. Every blue state has a candidate for every red state it can be
/// merged into, or a single promotion candidate if there is none. Each step ranks the
/// candidates, lets the guidance pick one and applies it.
pub struct Search<'a, S: ?Sized, G: ?Sized> {
    automaton: Automaton,
    strategy: &'a mut S,
    guidance: &'a mut G,
    config: SearchConfig,
    red: Vec<StateId>,
    is_red: BitSet,
    blue: Vec<StateId>,
    candidates: Vec<Choice>,
    exposed: Vec<Choice>,
    decisions: Vec<usize>,
    steps: usize,
}

impl<'a, S, G> Search<'a, S, G>
where
    S: ScoringStrategy + ?Sized,
    G: Guidance + ?Sized,
{
    /// Starts a search on `automaton`, usually a freshly built prefix tree. The root is the only
    /// red state.
    pub fn new(
        mut automaton: Automaton,
        strategy: &'a mut S,
        guidance: &'a mut G,
        config: SearchConfig,
    ) -> Self {
        strategy.prepare(&mut automaton);
        let root = automaton.root();
        let mut is_red = BitSet::with_capacity(automaton.arena_len());
        is_red.insert(root.index());
        let mut search = Self {
            automaton,
            strategy,
            guidance,
            config,
            red: vec![root],
            is_red,
            blue: Vec::new(),
            candidates: Vec::new(),
            exposed: Vec::new(),
            decisions: Vec::new(),
            steps: 0,
        };
        search.rebuild();
        search
    }

    pub fn automaton(&self) -> &Automaton {
        &self.automaton
    }

    pub fn red(&self) -> &[StateId] {
        &self.red
    }

    pub fn blue(&self) -> &[StateId] {
        &self.blue
    }

    /// All current candidates, unordered.
    pub fn candidates(&self) -> &[Choice] {
        &self.candidates
    }

    /// The decisions taken so far.
    pub fn decisions(&self) -> &[usize] {
        &self.decisions
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Returns true if no blue state is left or the step budget is used up.
    pub fn is_done(&self) -> bool {
        self.blue.is_empty() || self.config.max_steps.is_some_and(|max| self.steps >= max)
    }

    /// The non-red successors of red states, in order of the red states and symbols.
    fn frontier(&self) -> Vec<StateId> {
        let mut seen = BitSet::with_capacity(self.automaton.arena_len());
        let mut blue = Vec::new();
        for &red in &self.red {
            for (_, child) in self.automaton.state(red).edges() {
                if !self.is_red.contains(child.index()) && seen.insert(child.index()) {
                    blue.push(child);
                }
            }
        }
        blue
    }

    /// Adds the viable merges of `blue` into the red states from position `from` on.
    fn add_merges(&mut self, blue: StateId, from: usize) -> bool {
        let mut any = false;
        for position in from..self.red.len() {
            let red = self.red[position];
            if let Some(evaluation) =
                self.strategy
                    .score_candidate(&mut self.automaton, Some(red), blue)
            {
                let choice = Choice::new(Some(red), blue, evaluation);
                trace!("candidate {choice:?}");
                self.candidates.push(choice);
                any = true;
            }
        }
        any
    }

    fn add_promotion(&mut self, blue: StateId) {
        let evaluation = self
            .strategy
            .score_candidate(&mut self.automaton, None, blue)
            .unwrap_or(Evaluation::PROMOTION);
        self.candidates.push(Choice::new(None, blue, evaluation));
    }

    fn generate(&mut self, blue: StateId) {
        if !self.add_merges(blue, 0) {
            self.add_promotion(blue);
        }
    }

    /// Recomputes the frontier and scores every blue state against every red state.
    fn rebuild(&mut self) {
        self.blue = self.frontier();
        self.candidates.clear();
        for position in 0..self.blue.len() {
            self.generate(self.blue[position]);
        }
        trace!(
            "{} red, {} blue states and {} candidates",
            self.red.len(),
            self.blue.len(),
            self.candidates.len()
        );
    }

    /// Collects the candidates offered in the next step, best first.
    fn expose(&mut self) {
        self.exposed.clear();
        match self.config.blue_pick {
            Some(rule) if !self.blue.is_empty() => {
                let picked = rule.pick(&self.automaton, &self.blue, &self.candidates);
                self.exposed
                    .extend(self.candidates.iter().filter(|c| c.blue == picked));
            }
            _ => self.exposed.extend_from_slice(&self.candidates),
        }
        self.exposed.sort();
    }

    /// The candidates the guidance chooses from in the next step, best first.
    pub fn ranked(&mut self) -> &[Choice] {
        self.expose();
        &self.exposed
    }

    /// Performs one step. Returns `false` if the search was already done.
    pub fn step(&mut self) -> Result<bool, SearchError> {
        if self.is_done() {
            return Ok(false);
        }
        self.expose();
        let n = self.exposed.len();
        if n == 0 {
            return Ok(false);
        }
        let decision = self.guidance.decision(n);
        let index = if decision < n { decision } else { 0 };
        self.decisions.push(index);
        let choice = self.exposed[index];
        debug!("step {}: {choice:?}", self.steps.bold());
        self.apply(choice)?;
        self.steps += 1;
        Ok(true)
    }

    fn apply(&mut self, choice: Choice) -> Result<(), SearchError> {
        match choice.red {
            Some(red) => {
                self.automaton.merge(red, choice.blue)?;
                self.rebuild();
            }
            None => self.promote(choice.blue),
        }
        Ok(())
    }

    /// Turns `blue` red. Nothing in the automaton changes, so the scores of the remaining blue
    /// states stay valid and only need to be extended by the new red state.
    fn promote(&mut self, blue: StateId) {
        self.red.push(blue);
        self.is_red.insert(blue.index());
        self.candidates.retain(|c| c.blue != blue);

        let old = std::mem::take(&mut self.blue);
        let frontier = self.frontier();
        let newest = self.red.len() - 1;
        for &b in old.iter().filter(|&&b| b != blue) {
            if self.add_merges(b, newest) {
                self.candidates
                    .retain(|c| !(c.blue == b && c.is_promotion()));
            }
        }
        for &b in frontier.iter().filter(|b| !old.contains(b)) {
            self.generate(b);
        }
        self.blue = frontier;
    }

    /// Runs until the search is done.
    pub fn run(&mut self) -> Result<(), SearchError> {
        while self.step()? {}
        Ok(())
    }

    /// Compacts (and if configured, minimizes) the automaton and scores it.
    pub fn finish(self) -> Outcome {
        let mut automaton = if self.config.minimize {
            self.automaton.minimize()
        } else {
            self.automaton.compact()
        };
        let score = self.strategy.score_automaton(&mut automaton);
        info!(
            "search finished after {} steps with {} states, score {:.3}",
            self.steps,
            automaton.size().green(),
            score
        );
        Outcome {
            automaton,
            decisions: self.decisions,
            score,
        }
    }
}

/// Runs a complete search on `automaton` and returns the result along with the decisions taken.
pub fn run<S, G>(
    automaton: Automaton,
    strategy: &mut S,
    guidance: &mut G,
    config: &SearchConfig,
) -> Result<Outcome, SearchError>
where
    S: ScoringStrategy + ?Sized,
    G: Guidance + ?Sized,
{
    let mut search = Search::new(automaton, strategy, guidance, *config);
    search.run()?;
    Ok(search.finish())
}

/// Generalizes `automaton` by state merging until no blue state is left or the step budget of
/// `config` is used up.
pub fn fold<S, G>(
    automaton: Automaton,
    strategy: &mut S,
    guidance: &mut G,
    config: &SearchConfig,
) -> Result<Automaton, SearchError>
where
    S: ScoringStrategy + ?Sized,
    G: Guidance + ?Sized,
{
    run(automaton, strategy, guidance, config).map(|outcome| outcome.automaton)
}

/// Follows `guidance` until it is exhausted and returns the best `keep_percent` percent of the
/// candidates at that point, without applying any of them. Candidates that tie with the last
/// kept one are kept as well.
///
/// The returned choices refer to states of the automaton reached by replaying the guidance on
/// `automaton`; as long as nothing is compacted, those ids are stable.
pub fn options<S, G>(
    automaton: &Automaton,
    strategy: &mut S,
    guidance: &mut G,
    keep_percent: f64,
) -> Result<Vec<Choice>, SearchError>
where
    S: ScoringStrategy + ?Sized,
    G: Guidance + ?Sized,
{
    let mut search = Search::new(automaton.clone(), strategy, guidance, SearchConfig::default());
    while !search.guidance.is_exhausted() {
        if !search.step()? {
            break;
        }
    }
    let ranked = search.ranked();
    if ranked.is_empty() {
        return Ok(Vec::new());
    }
    let wanted = (ranked.len() as f64 * keep_percent.clamp(0.0, 100.0) / 100.0).ceil() as usize;
    let keep = wanted.clamp(1, ranked.len());
    let cutoff = ranked[keep - 1].score;
    let kept = ranked
        .iter()
        .enumerate()
        .take_while(|(i, c)| *i < keep || c.score == cutoff)
        .map(|(_, c)| *c)
        .collect_vec();
    debug!("keeping {} of {} options", kept.len(), ranked.len());
    Ok(kept)
}

/// Runs one search per guidance and returns the outcome with the lowest score. Ties go to the
/// earlier run.
pub fn fold_best<S, G, I>(
    automaton: &Automaton,
    strategy: &mut S,
    guidances: I,
    config: &SearchConfig,
) -> Result<Outcome, SearchError>
where
    S: ScoringStrategy + ?Sized,
    G: Guidance,
    I: IntoIterator<Item = G>,
{
    let mut best: Option<Outcome> = None;
    for (i, mut guidance) in guidances.into_iter().enumerate() {
        let outcome = run(automaton.clone(), strategy, &mut guidance, config)?;
        trace!("run {i} ended with score {:.3}", outcome.score);
        if best.as_ref().map_or(true, |b| outcome.score < b.score) {
            best = Some(outcome);
        }
    }
    best.ok_or(SearchError::NoRuns)
}
