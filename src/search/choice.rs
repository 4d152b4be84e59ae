use std::fmt::Debug;

use owo_colors::OwoColorize;

use crate::{
    automaton::StateId,
    scoring::{Evaluation, Score},
};

/// A candidate step of the search: merge `blue` into `red`, or promote `blue` if `red` is
/// `None`.
///
/// Choices are ordered by score, then by the auxiliary value, then by red state (promotions
/// first) and finally by blue state, which is also the order in which the search offers them to
/// its guidance.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd)]
pub struct Choice {
    pub score: Score,
    pub aux: i64,
    pub red: Option<StateId>,
    pub blue: StateId,
}

impl Choice {
    pub fn new(red: Option<StateId>, blue: StateId, evaluation: Evaluation) -> Self {
        Self {
            score: evaluation.score,
            aux: evaluation.aux,
            red,
            blue,
        }
    }

    pub fn is_promotion(&self) -> bool {
        self.red.is_none()
    }
}

impl Debug for Choice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.red {
            Some(red) => write!(f, "{:?} into {red:?}", self.blue)?,
            None => write!(f, "promote {:?}", self.blue.green())?,
        }
        write!(f, " [{} / {}]", self.score, self.aux)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn promotions_come_first_among_equals() {
        let even = Evaluation::new(2.0, 0);
        let mut choices = vec![
            Choice::new(Some(StateId(0)), StateId(4), even),
            Choice::new(Some(StateId(1)), StateId(3), Evaluation::new(2.0, -1)),
            Choice::new(None, StateId(5), even),
            Choice::new(Some(StateId(0)), StateId(2), even),
            Choice::new(None, StateId(9), Evaluation::PROMOTION),
            Choice::new(Some(StateId(0)), StateId(1), Evaluation::new(f64::NAN, 0)),
        ];
        choices.sort();
        let order = choices.iter().map(|c| (c.red, c.blue.0)).collect::<Vec<_>>();
        assert_eq!(
            order,
            vec![
                (None, 9),
                (Some(StateId(1)), 3),
                (None, 5),
                (Some(StateId(0)), 2),
                (Some(StateId(0)), 4),
                (Some(StateId(0)), 1),
            ]
        );
        assert!(choices[0].is_promotion());
        assert_eq!(format!("{:?}", choices[3]), "q2 into q0 [2.000 / 0]");
    }
}
