use std::{
    fmt::{Result as FmtResult, Write},
    str::FromStr,
};

use bit_set::BitSet;
use thiserror::Error;
use tracing::trace;

use super::{Automaton, AutomatonConfig, Productive, State, StateId};
use crate::math::Map;

/// Selects which states [`Automaton::to_text`] emits.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum TextMode {
    /// Reachable states from which an accepting state can be reached, plus the root.
    #[default]
    Accepting,
    /// Every reachable state, annotated with its productivity and with rejecting labels.
    All,
}

/// Errors raised while reading an automaton from its line-tagged text form.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum ParseError {
    #[error("line {line}: expected `T<alphabet size>` header, found `{content}`")]
    MissingHeader { line: usize, content: String },
    #[error("input is empty")]
    Empty,
    #[error("line {line}: unexpected tag in `{content}`")]
    UnexpectedTag { line: usize, content: String },
    #[error("line {line}: malformed number in `{content}`")]
    BadNumber { line: usize, content: String },
    #[error("line {line}: start state declared a second time in `{content}`")]
    DuplicateStart { line: usize, content: String },
    #[error("line {line}: state declared a second time in `{content}`")]
    DuplicateState { line: usize, content: String },
    #[error("line {line}: edge from undeclared state in `{content}`")]
    UndeclaredSource { line: usize, content: String },
    #[error("line {line}: `{content}` refers to undeclared state {state}")]
    UndeclaredState {
        line: usize,
        content: String,
        state: u32,
    },
    #[error("line {line}: symbol out of range in `{content}`")]
    SymbolOutOfRange { line: usize, content: String },
    #[error("line {line}: state labeled both accepting and rejecting in `{content}`")]
    ContradictoryLabel { line: usize, content: String },
    #[error("line {line}: second edge for the same symbol in `{content}`")]
    Nondeterministic { line: usize, content: String },
    #[error("no start state declared")]
    MissingStart,
}

impl Automaton {
    /// Writes the line-tagged text form of `self` into `w`. Ids in the output are arena ids, so
    /// they need not be dense.
    pub fn write_text<W: Write>(&self, w: &mut W, mode: TextMode) -> FmtResult {
        let order = self.reachable();
        let untracked = (!self.config.track_productive).then(|| {
            let predecessors = self.predecessors(&order);
            self.compute_productive(&order, &predecessors)
        });
        let productive = |id: StateId| match &untracked {
            Some(flags) => flags[id.index()],
            None => self.states[id.index()].productive,
        };
        let kept = |id: StateId| {
            id == self.root || mode == TextMode::All || productive(id).accepting()
        };

        writeln!(w, "T{}", self.alphabet_size)?;
        writeln!(w, "S{}", self.root)?;
        for &id in order.iter().filter(|id| kept(**id)) {
            let state = &self.states[id.index()];
            match mode {
                TextMode::Accepting => writeln!(w, "N{id}")?,
                TextMode::All => writeln!(w, "N{id}({:?})", productive(id))?,
            }
            if state.accepting {
                writeln!(w, "A{id}")?;
            }
            if state.rejecting && mode == TextMode::All {
                writeln!(w, "R{id}")?;
            }
            for (symbol, target) in state.edges().filter(|(_, t)| kept(*t)) {
                writeln!(w, "E{id}:{symbol}:{target}")?;
            }
        }
        Ok(())
    }

    /// Returns the text form of `self`, see [`Automaton::write_text`].
    pub fn to_text(&self, mode: TextMode) -> String {
        let mut out = String::new();
        // writing into a String cannot fail
        let _ = self.write_text(&mut out, mode);
        trace!("produced text form of automaton\n{out}");
        out
    }

    /// Parses the text form produced by [`Automaton::to_text`]. Blank lines are skipped. The
    /// result is a fresh, compacted automaton; sample statistics are not part of the format and
    /// start out empty.
    pub fn from_text(input: &str) -> Result<Automaton, ParseError> {
        Self::from_text_with(input, AutomatonConfig::default())
    }

    pub fn from_text_with(input: &str, config: AutomatonConfig) -> Result<Automaton, ParseError> {
        let mut lines = input
            .lines()
            .enumerate()
            .map(|(i, l)| (i + 1, l.trim()))
            .filter(|(_, l)| !l.is_empty());

        let (line, content) = lines.next().ok_or(ParseError::Empty)?;
        let alphabet_size: usize = match content.strip_prefix('T') {
            Some(rest) => number(line, content, rest)?,
            None => {
                return Err(ParseError::MissingHeader {
                    line,
                    content: content.to_string(),
                })
            }
        };

        let mut states: Vec<State> = Vec::new();
        let mut ids: Map<u32, StateId> = Map::default();
        let mut start: Option<(usize, String, u32)> = None;
        let mut pending: Vec<(usize, String, StateId, usize, u32)> = Vec::new();
        let mut edges = BitSet::new();

        let declared = |ids: &Map<u32, StateId>, line: usize, content: &str, raw: u32| {
            ids.get(&raw)
                .copied()
                .ok_or_else(|| ParseError::UndeclaredState {
                    line,
                    content: content.to_string(),
                    state: raw,
                })
        };

        for (line, content) in lines {
            let (tag, rest) = content.split_at(content.chars().next().map_or(0, char::len_utf8));
            match tag {
                "S" => {
                    if start.is_some() {
                        return Err(ParseError::DuplicateStart {
                            line,
                            content: content.to_string(),
                        });
                    }
                    start = Some((line, content.to_string(), number(line, content, rest)?));
                }
                "N" => {
                    let raw = match rest.find('(') {
                        Some(open) if rest.ends_with(')') => &rest[..open],
                        Some(_) => {
                            return Err(ParseError::BadNumber {
                                line,
                                content: content.to_string(),
                            })
                        }
                        None => rest,
                    };
                    let raw: u32 = number(line, content, raw)?;
                    if ids.contains_key(&raw) {
                        return Err(ParseError::DuplicateState {
                            line,
                            content: content.to_string(),
                        });
                    }
                    ids.insert(raw, StateId::from_index(states.len()));
                    states.push(State::new(alphabet_size, None, 0));
                }
                "A" | "R" => {
                    let id = declared(&ids, line, content, number(line, content, rest)?)?;
                    let state = &mut states[id.index()];
                    if tag == "A" {
                        state.accepting = true;
                    } else {
                        state.rejecting = true;
                    }
                    if state.accepting && state.rejecting {
                        return Err(ParseError::ContradictoryLabel {
                            line,
                            content: content.to_string(),
                        });
                    }
                }
                "E" => {
                    let mut parts = rest.splitn(3, ':');
                    let mut field = || -> Result<u32, ParseError> {
                        number(line, content, parts.next().unwrap_or_default())
                    };
                    let (from, symbol, to) = (field()?, field()?, field()?);
                    let from = ids
                        .get(&from)
                        .copied()
                        .ok_or_else(|| ParseError::UndeclaredSource {
                            line,
                            content: content.to_string(),
                        })?;
                    let symbol = symbol as usize;
                    if symbol >= alphabet_size {
                        return Err(ParseError::SymbolOutOfRange {
                            line,
                            content: content.to_string(),
                        });
                    }
                    if !edges.insert(from.index() * alphabet_size + symbol) {
                        return Err(ParseError::Nondeterministic {
                            line,
                            content: content.to_string(),
                        });
                    }
                    pending.push((line, content.to_string(), from, symbol, to));
                }
                _ => {
                    return Err(ParseError::UnexpectedTag {
                        line,
                        content: content.to_string(),
                    })
                }
            }
        }

        for (line, content, from, symbol, to) in pending {
            let to = declared(&ids, line, &content, to)?;
            let state = &mut states[from.index()];
            state.children[symbol] = Some(to);
        }
        let (line, content, raw) = start.ok_or(ParseError::MissingStart)?;
        let root = declared(&ids, line, &content, raw)?;

        let automaton = Automaton::from_states(alphabet_size, states, root, config);
        trace!("parsed automaton with {} states", automaton.size());
        Ok(automaton)
    }
}

impl FromStr for Automaton {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Automaton::from_text(s)
    }
}

fn number<N: FromStr>(line: usize, content: &str, raw: &str) -> Result<N, ParseError> {
    raw.trim().parse().map_err(|_| ParseError::BadNumber {
        line,
        content: content.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{tests::word, Sample};

    fn sample() -> Vec<Sample> {
        vec![
            Sample::accept(word("ab")),
            Sample::accept(word("b")),
            Sample::reject(word("a")),
            Sample::reject(word("bb")),
            Sample::reject(word("aa")),
        ]
    }

    #[test]
    fn writes_accepting_part() {
        let automaton = Automaton::build(2, &sample()).unwrap();
        let text = automaton.to_text(TextMode::Accepting);
        let a = automaton.run(&word("a")).unwrap();
        let aa = automaton.run(&word("aa")).unwrap();
        assert!(text.starts_with("T2\nS0\nN0\n"));
        assert!(text.contains(&format!("N{a}\n")));
        assert!(!text.contains(&format!("N{aa}")));
        assert!(!text.contains("R"));

        let all = automaton.to_text(TextMode::All);
        assert!(all.contains("N0(AR)\n"));
        assert!(all.contains(&format!("N{aa}(R)\nR{aa}\n")));
    }

    #[test_log::test]
    fn round_trip_preserves_classification() {
        let samples = sample();
        let mut automaton = Automaton::build(2, &samples).unwrap();
        let root = automaton.root();
        let b = automaton.run(&word("b")).unwrap();
        let ab = automaton.run(&word("ab")).unwrap();
        automaton.merge(b, ab).unwrap();
        assert_eq!(automaton.successor(root, 1), Some(b));

        let all = Automaton::from_text(&automaton.to_text(TextMode::All)).unwrap();
        assert_eq!(all.size(), automaton.size());
        for s in &samples {
            assert_eq!(all.classify(&s.symbols), automaton.classify(&s.symbols));
        }
        assert_eq!(all.check_consistency(&samples), Ok(()));

        let accepting: Automaton = automaton.to_text(TextMode::Accepting).parse().unwrap();
        for s in &samples {
            assert_eq!(accepting.recognize(&s.symbols), automaton.recognize(&s.symbols));
        }
        assert_eq!(accepting.size(), 3);
    }

    #[test]
    fn round_trip_without_tracked_productivity() {
        let samples = vec![Sample::accept(word("ab")), Sample::accept(word("b"))];
        let config = AutomatonConfig::default().with_productive(false);
        let automaton = Automaton::build_with(2, &samples, config).unwrap();
        let text = automaton.to_text(TextMode::Accepting);
        assert_eq!(text.lines().filter(|l| l.starts_with('N')).count(), 4);

        let parsed = Automaton::from_text_with(&text, config).unwrap();
        assert_eq!(parsed.size(), 4);
        for s in &samples {
            assert!(parsed.recognize(&s.symbols));
        }
        assert!(!parsed.recognize(&word("a")));

        let all = automaton.to_text(TextMode::All);
        assert!(all.contains("N0(A)\n"));
        assert_eq!(all, Automaton::build(2, &samples).unwrap().to_text(TextMode::All));
    }

    #[test]
    fn reports_malformed_input() {
        assert!(matches!(Automaton::from_text(""), Err(ParseError::Empty)));
        assert!(matches!(
            Automaton::from_text("S0\nT2"),
            Err(ParseError::MissingHeader { line: 1, .. })
        ));
        assert!(matches!(
            Automaton::from_text("T2\nS0\nN0\nX0"),
            Err(ParseError::UnexpectedTag { line: 4, .. })
        ));
        assert!(matches!(
            Automaton::from_text("T2\nS0\nS1\nN0"),
            Err(ParseError::DuplicateStart { line: 3, .. })
        ));
        assert!(matches!(
            Automaton::from_text("T2\nS0\nN0\nE1:0:0"),
            Err(ParseError::UndeclaredSource { line: 4, .. })
        ));
        assert!(matches!(
            Automaton::from_text("T2\nS0\nN0\nE0:0:7"),
            Err(ParseError::UndeclaredState { line: 4, state: 7, .. })
        ));
        assert!(matches!(
            Automaton::from_text("T2\nS0\nN0\nE0:x:0"),
            Err(ParseError::BadNumber { line: 4, .. })
        ));
        assert!(matches!(
            Automaton::from_text("T2\nS0\nN0\nE0:2:0"),
            Err(ParseError::SymbolOutOfRange { .. })
        ));
        assert!(matches!(
            Automaton::from_text("T2\nS0\nN0\nN1\nE0:1:0\nE0:1:1"),
            Err(ParseError::Nondeterministic { line: 6, .. })
        ));
        assert!(matches!(
            Automaton::from_text("T2\nN0"),
            Err(ParseError::MissingStart)
        ));
        assert!(matches!(
            Automaton::from_text("T2\nS0\nN0\nA0\nR0"),
            Err(ParseError::ContradictoryLabel { line: 5, .. })
        ));

        let parsed = Automaton::from_text("T1\n\nS5\nN5\nN9(A)\nA9\nE5:0:9\nE9:0:5\n").unwrap();
        assert_eq!(parsed.size(), 2);
        assert!(parsed.recognize(&[0]));
        assert!(!parsed.recognize(&[0, 0]));
        assert!(parsed.recognize(&[0, 0, 0]));
    }
}
