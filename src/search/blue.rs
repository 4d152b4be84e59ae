use std::str::FromStr;

use thiserror::Error;

use super::Choice;
use crate::automaton::{Automaton, StateId};

/// Restricts every search step to the candidates of a single blue state.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum BluePick {
    /// The first blue state in frontier order.
    #[default]
    First,
    /// The blue state with the fewest viable merges, so forced promotions happen first.
    FewestMerges,
    /// The blue state that the most samples pass through.
    MostTraffic,
    /// The blue state closest to the root.
    Shallowest,
}

impl BluePick {
    /// Picks one of `blue`, which must be non-empty and in frontier order. `candidates` holds
    /// the candidates of all blue states. Ties go to the blue state that comes first.
    pub fn pick(self, automaton: &Automaton, blue: &[StateId], candidates: &[Choice]) -> StateId {
        let first = blue[0];
        let best_by = |key: &dyn Fn(StateId) -> i64| {
            blue.iter()
                .copied()
                .enumerate()
                .min_by_key(|&(i, b)| (key(b), i))
                .map_or(first, |(_, b)| b)
        };
        match self {
            BluePick::First => first,
            BluePick::FewestMerges => best_by(&|b| {
                candidates
                    .iter()
                    .filter(|c| c.blue == b && !c.is_promotion())
                    .count() as i64
            }),
            BluePick::MostTraffic => best_by(&|b| -i64::from(automaton.state(b).traffic())),
            BluePick::Shallowest => best_by(&|b| i64::from(automaton.state(b).depth())),
        }
    }
}

/// Returned when a blue picking rule name is not known.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
#[error("unknown blue picking rule `{0}`")]
pub struct UnknownBluePick(pub String);

impl FromStr for BluePick {
    type Err = UnknownBluePick;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "first" => Ok(BluePick::First),
            "fewest" | "fewest-merges" => Ok(BluePick::FewestMerges),
            "traffic" | "most-traffic" => Ok(BluePick::MostTraffic),
            "shallow" | "shallowest" => Ok(BluePick::Shallowest),
            _ => Err(UnknownBluePick(s.to_string())),
        }
    }
}
