use std::{collections::BTreeSet, f64::consts::PI, hash::Hash};

/// Type alias for maps, we use this to hide which type of `HashMap` we are actually using.
pub type Map<K, V> = fxhash::FxHashMap<K, V>;

/// Represents a bijective mapping between `L` and `R`, that is a mapping which associates
/// each `L` with precisely one `R` and vice versa.
pub type Bijection<L, R> = bimap::BiHashMap<L, R>;

/// A partition groups elements of type `I` into disjoint classes. The minimizer produces
/// one of these to describe which states of an automaton are equivalent.
#[derive(Debug, Clone)]
pub struct Partition<I: Hash + Eq>(Vec<BTreeSet<I>>);

impl<I: Hash + Eq> std::ops::Deref for Partition<I> {
    type Target = Vec<BTreeSet<I>>;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<'a, I: Hash + Eq> IntoIterator for &'a Partition<I> {
    type Item = &'a BTreeSet<I>;
    type IntoIter = std::slice::Iter<'a, BTreeSet<I>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl<I: Hash + Eq> PartialEq for Partition<I> {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|o| other.contains(o))
    }
}
impl<I: Hash + Eq> Eq for Partition<I> {}

impl<I: Hash + Eq + Ord> Partition<I> {
    /// Returns the size of the partition, i.e. the number of classes.
    pub fn size(&self) -> usize {
        self.0.len()
    }

    /// Builds a new partition from an iterator that yields iterators
    /// which yield elements of type `I`. Empty classes are dropped.
    pub fn new<X: IntoIterator<Item = I>, Y: IntoIterator<Item = X>>(iter: Y) -> Self {
        Self(
            iter.into_iter()
                .map(|it| it.into_iter().collect::<BTreeSet<_>>())
                .filter(|class| !class.is_empty())
                .collect(),
        )
    }

    /// Returns the class that contains `element`, if any.
    pub fn class_of(&self, element: &I) -> Option<&BTreeSet<I>> {
        self.0.iter().find(|class| class.contains(element))
    }
}

const LANCZOS_G: f64 = 7.0;
const LANCZOS: [f64; 9] = [
    0.999_999_999_999_809_9,
    676.520_368_121_885_1,
    -1_259.139_216_722_402_8,
    771.323_428_777_653_1,
    -176.615_029_162_140_6,
    12.507_343_278_686_905,
    -0.138_571_095_265_720_12,
    9.984_369_578_019_572e-6,
    1.505_632_735_149_311_6e-7,
];

/// Natural logarithm of the gamma function, Lanczos approximation.
pub fn ln_gamma(x: f64) -> f64 {
    if x < 0.5 {
        // reflection formula
        PI.ln() - (PI * x).sin().abs().ln() - ln_gamma(1.0 - x)
    } else {
        let x = x - 1.0;
        let t = x + LANCZOS_G + 0.5;
        let series = LANCZOS
            .iter()
            .enumerate()
            .skip(1)
            .fold(LANCZOS[0], |acc, (i, c)| acc + c / (x + i as f64));
        0.5 * (2.0 * PI).ln() + (x + 0.5) * t.ln() - t + series.ln()
    }
}

const GAMMA_ITERATIONS: usize = 500;
const GAMMA_EPSILON: f64 = 1e-14;
const GAMMA_TINY: f64 = 1e-300;

/// Regularized upper incomplete gamma function `Q(a, x) = Γ(a, x) / Γ(a)`.
pub fn gamma_q(a: f64, x: f64) -> f64 {
    if x <= 0.0 || a <= 0.0 {
        return 1.0;
    }
    let q = if x < a + 1.0 {
        1.0 - gamma_p_series(a, x)
    } else {
        gamma_q_fraction(a, x)
    };
    q.clamp(0.0, 1.0)
}

fn gamma_p_series(a: f64, x: f64) -> f64 {
    let mut denominator = a;
    let mut term = 1.0 / a;
    let mut sum = term;
    for _ in 0..GAMMA_ITERATIONS {
        denominator += 1.0;
        term *= x / denominator;
        sum += term;
        if term.abs() < sum.abs() * GAMMA_EPSILON {
            break;
        }
    }
    sum * (-x + a * x.ln() - ln_gamma(a)).exp()
}

// modified Lentz evaluation of the continued fraction
fn gamma_q_fraction(a: f64, x: f64) -> f64 {
    let mut b = x + 1.0 - a;
    let mut c = 1.0 / GAMMA_TINY;
    let mut d = 1.0 / b;
    let mut h = d;
    for i in 1..GAMMA_ITERATIONS {
        let i = i as f64;
        let an = -i * (i - a);
        b += 2.0;
        d = an * d + b;
        if d.abs() < GAMMA_TINY {
            d = GAMMA_TINY;
        }
        c = b + an / c;
        if c.abs() < GAMMA_TINY {
            c = GAMMA_TINY;
        }
        d = 1.0 / d;
        let delta = d * c;
        h *= delta;
        if (delta - 1.0).abs() < GAMMA_EPSILON {
            break;
        }
    }
    (-x + a * x.ln() - ln_gamma(a)).exp() * h
}

/// Survival function of the chi-square distribution with `df` degrees of freedom,
/// i.e. the probability of observing a statistic of at least `statistic`.
pub fn chi_square_sf(statistic: f64, df: f64) -> f64 {
    if df <= 0.0 || statistic <= 0.0 {
        return 1.0;
    }
    gamma_q(df / 2.0, statistic / 2.0)
}

/// Complementary error function, Chebyshev approximation with fractional error below `1.2e-7`.
pub fn erfc(x: f64) -> f64 {
    let z = x.abs();
    let t = 1.0 / (1.0 + 0.5 * z);
    let poly = -z * z - 1.265_512_23
        + t * (1.000_023_68
            + t * (0.374_091_96
                + t * (0.096_784_18
                    + t * (-0.186_288_06
                        + t * (0.278_868_07
                            + t * (-1.135_203_98
                                + t * (1.488_515_87 + t * (-0.822_152_23 + t * 0.170_872_77))))))));
    let ans = t * poly.exp();
    if x >= 0.0 {
        ans
    } else {
        2.0 - ans
    }
}

/// Two-sided p-value of a standard normal statistic `z`.
pub fn normal_two_sided_p(z: f64) -> f64 {
    erfc(z.abs() / std::f64::consts::SQRT_2).clamp(0.0, 1.0)
}

/// Default number of precomputed entries in a [`LogTable`].
pub const DEFAULT_LOG_TABLE_SIZE: usize = 4096;

/// Precomputed cumulative base-2 logarithms, `table[n] = log2(n!)`. Arguments beyond the
/// table fall back to [`ln_gamma`].
#[derive(Debug, Clone)]
pub struct LogTable {
    log2_factorial: Vec<f64>,
}

impl Default for LogTable {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_TABLE_SIZE)
    }
}

impl LogTable {
    /// Precomputes `log2(n!)` for all `n < size`.
    pub fn new(size: usize) -> Self {
        let mut log2_factorial = Vec::with_capacity(size.max(1));
        log2_factorial.push(0.0);
        for n in 1..size.max(1) {
            let previous = log2_factorial[n - 1];
            log2_factorial.push(previous + (n as f64).log2());
        }
        Self { log2_factorial }
    }

    /// Returns the number of precomputed entries.
    pub fn len(&self) -> usize {
        self.log2_factorial.len()
    }

    /// Returns true if nothing is precomputed, which never happens for tables built with [`LogTable::new`].
    pub fn is_empty(&self) -> bool {
        self.log2_factorial.is_empty()
    }

    /// Computes `log2(n!)`.
    pub fn log2_factorial(&self, n: f64) -> f64 {
        if n <= 1.0 {
            return 0.0;
        }
        if n.fract() == 0.0 && n < self.log2_factorial.len() as f64 {
            return self.log2_factorial[n as usize];
        }
        ln_gamma(n + 1.0) / std::f64::consts::LN_2
    }

    /// Computes `log2(C(n, k))`. Degenerate arguments (`k <= 0` or `k >= n`) yield zero.
    pub fn log2_binomial(&self, n: f64, k: f64) -> f64 {
        if k <= 0.0 || k >= n || !n.is_finite() {
            return 0.0;
        }
        self.log2_factorial(n) - self.log2_factorial(k) - self.log2_factorial(n - k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64, eps: f64) -> bool {
        (a - b).abs() < eps
    }

    #[test]
    fn ln_gamma_matches_factorials() {
        assert!(close(ln_gamma(1.0), 0.0, 1e-10));
        assert!(close(ln_gamma(5.0), 24f64.ln(), 1e-10));
        assert!(close(ln_gamma(11.0), 3_628_800f64.ln(), 1e-9));
        assert!(close(ln_gamma(0.5), PI.sqrt().ln(), 1e-10));
    }

    #[test]
    fn log_table_agrees_with_gamma_beyond_its_size() {
        let table = LogTable::new(16);
        let from_table = table.log2_factorial(15.0);
        let from_gamma = ln_gamma(16.0) / std::f64::consts::LN_2;
        assert!(close(from_table, from_gamma, 1e-9));
        assert!(close(table.log2_binomial(20.0, 10.0), 184_756f64.log2(), 1e-8));
        assert_eq!(table.log2_binomial(7.0, 7.0), 0.0);
        assert_eq!(table.log2_binomial(7.0, 0.0), 0.0);
    }

    #[test]
    fn chi_square_survival() {
        // P(X >= 3.841) for one degree of freedom is the classic 5% threshold
        assert!(close(chi_square_sf(3.841_458_8, 1.0), 0.05, 1e-5));
        assert!(close(chi_square_sf(5.991_464_5, 2.0), 0.05, 1e-6));
        assert!(close(chi_square_sf(18.307_038, 10.0), 0.05, 1e-6));
        assert_eq!(chi_square_sf(0.0, 3.0), 1.0);
    }

    #[test]
    fn normal_p_values() {
        assert!(close(normal_two_sided_p(1.959_964), 0.05, 1e-6));
        assert!(close(normal_two_sided_p(0.0), 1.0, 1e-6));
        assert!(close(erfc(-1.0), 2.0 - erfc(1.0), 1e-12));
    }

    #[test]
    fn partition_drops_empty_classes() {
        let partition = Partition::new([vec![1, 2], vec![], vec![3]]);
        assert_eq!(partition.size(), 2);
        assert_eq!(partition.class_of(&2).map(|c| c.len()), Some(2));
        assert_eq!(partition, Partition::new([vec![3], vec![2, 1]]));
    }
}
