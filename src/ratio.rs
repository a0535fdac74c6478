use crate::eval::Error;

// Fractions are reduced from their shortest decimal form. Anything finer than this is rounded so
// that the denominator stays well inside u64.
const MAX_DECIMALS: usize = 9;

/// A fraction in lowest terms: `ratio` out of every `total`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ratio {
    pub ratio: u64,
    pub total: u64,
}

impl Ratio {
    pub fn new(ratio: u64, total: u64) -> Self {
        Ratio { ratio, total }
    }
}

pub(crate) fn gcd(a: u64, b: u64) -> u64 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

pub(crate) fn lcm(a: u64, b: u64) -> u64 {
    if a == 0 || b == 0 {
        return 0;
    }
    a / gcd(a, b) * b
}

/// Approximates `fraction` (expected in `[0, 1]`) as a ratio in lowest terms.
///
/// The denominator is the power of ten implied by the number of decimal digits in the shortest
/// representation of `fraction`, so `0.25` becomes `25/100` before reduction to `1/4`. Values
/// outside `[0, 1]` are clamped and `NaN` is treated as zero.
pub fn ratio_from_fraction(fraction: f64) -> Ratio {
    let fraction = if fraction.is_nan() {
        0.0
    } else {
        fraction.clamp(0.0, 1.0)
    };

    let repr = fraction.to_string();
    let decimals = repr
        .split_once('.')
        .map(|(_, digits)| digits.len())
        .unwrap_or(0)
        .min(MAX_DECIMALS);

    let denominator = 10_u64.pow(decimals as u32);
    let numerator = (fraction * denominator as f64).round() as u64;
    let divisor = gcd(numerator, denominator);

    Ratio::new(numerator / divisor, denominator / divisor)
}

/// Expresses a list of weights as whole-number ratios over a common denominator.
///
/// Each weight is first reduced to a ratio of the sum of all weights. Starting from the largest
/// per-weight denominator, the common denominator is doubled until every ratio scales to a whole
/// number; if doubling alone can never get there, the least common multiple is used instead.
pub fn normalize_ratios(weights: &[f64]) -> Result<Vec<u64>, Error> {
    let sum: f64 = weights.iter().sum();
    if !(sum > 0.0) {
        return Err(Error::EmptyRatio);
    }

    let ratios: Vec<Ratio> = weights
        .iter()
        .map(|weight| ratio_from_fraction(weight / sum))
        .collect();

    let least_common = ratios.iter().fold(1, |acc, r| lcm(acc, r.total));
    let mut denominator = ratios.iter().map(|r| r.total).max().unwrap_or(1);
    while ratios.iter().any(|r| denominator % r.total != 0) {
        if denominator >= least_common {
            denominator = least_common;
            break;
        }
        denominator *= 2;
    }

    Ok(ratios
        .iter()
        .map(|r| r.ratio * (denominator / r.total))
        .collect())
}
