/// A source of decisions for the search.
///
/// In every step the search ranks its candidates and asks the guidance for
/// [`Guidance::decision`]`(n)` with `n` the number of candidates on offer. Any value in `0..n`
/// selects that candidate, `n` (or anything larger) asks for the default, which is the best
/// ranked candidate at index 0.
pub trait Guidance {
    fn decision(&mut self, n: usize) -> usize;

    /// Returns true once the guidance has no opinion left, from then on every decision is the
    /// default.
    fn is_exhausted(&self) -> bool;
}

impl<G: Guidance + ?Sized> Guidance for &mut G {
    fn decision(&mut self, n: usize) -> usize {
        (**self).decision(n)
    }

    fn is_exhausted(&self) -> bool {
        (**self).is_exhausted()
    }
}

/// Always takes the best ranked candidate.
#[derive(Clone, Copy, Debug, Default)]
pub struct Greedy;

impl Guidance for Greedy {
    fn decision(&mut self, n: usize) -> usize {
        n
    }

    fn is_exhausted(&self) -> bool {
        true
    }
}

/// Replays a recorded sequence of decisions, then falls back to the default.
#[derive(Clone, Debug, Default)]
pub struct Replay {
    decisions: Vec<usize>,
    position: usize,
}

impl Replay {
    pub fn new(decisions: impl IntoIterator<Item = usize>) -> Self {
        Self {
            decisions: decisions.into_iter().collect(),
            position: 0,
        }
    }

    /// Number of decisions not yet replayed.
    pub fn remaining(&self) -> usize {
        self.decisions.len() - self.position
    }
}

impl Guidance for Replay {
    fn decision(&mut self, n: usize) -> usize {
        match self.decisions.get(self.position) {
            Some(&decision) => {
                self.position += 1;
                decision
            }
            None => n,
        }
    }

    fn is_exhausted(&self) -> bool {
        self.position >= self.decisions.len()
    }
}

/// Picks uniformly among the best `width` candidates for a limited number of steps, then
/// behaves greedily. Runs are reproducible from the seed.
#[cfg(feature = "random")]
#[derive(Clone, Debug)]
pub struct Random {
    rng: fastrand::Rng,
    width: usize,
    remaining: Option<usize>,
}

#[cfg(feature = "random")]
impl Random {
    /// Random decisions among all candidates in every step.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: fastrand::Rng::with_seed(seed),
            width: usize::MAX,
            remaining: None,
        }
    }

    /// Only the best `width` candidates are considered, `0` is treated like `1`.
    pub fn with_width(mut self, width: usize) -> Self {
        self.width = width.max(1);
        self
    }

    /// Only the first `steps` decisions are random.
    pub fn with_steps(mut self, steps: usize) -> Self {
        self.remaining = Some(steps);
        self
    }
}

#[cfg(feature = "random")]
impl Guidance for Random {
    fn decision(&mut self, n: usize) -> usize {
        if self.is_exhausted() || n == 0 {
            return n;
        }
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= 1;
        }
        self.rng.usize(..n.min(self.width))
    }

    fn is_exhausted(&self) -> bool {
        self.remaining == Some(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replay_then_default() {
        let mut replay = Replay::new([2, 0]);
        assert!(!replay.is_exhausted());
        assert_eq!(replay.decision(5), 2);
        assert_eq!(replay.remaining(), 1);
        assert_eq!(replay.decision(5), 0);
        assert!(replay.is_exhausted());
        assert_eq!(replay.decision(5), 5);
        assert_eq!(Greedy.decision(3), 3);
    }

    #[cfg(feature = "random")]
    #[test]
    fn random_is_reproducible() {
        let draw = |seed| {
            let mut random = Random::new(seed).with_width(3).with_steps(10);
            (0..12).map(|_| random.decision(7)).collect::<Vec<_>>()
        };
        let first = draw(17);
        assert_eq!(first, draw(17));
        assert!(first[..10].iter().all(|&d| d < 3));
        assert_eq!(&first[10..], &[7, 7]);
    }
}
