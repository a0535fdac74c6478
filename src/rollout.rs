use std::collections::HashMap;
use std::convert::Infallible;

use log::debug;
use parking_lot::Mutex;
use serde::Deserialize;
use sha1::{Digest, Sha1};

use crate::ratio::ratio_from_fraction;

const BUCKET_SCALE: f64 = 0x0FFF_FFFF_FFFF_FFFF_u64 as f64;

/// Group name used when a rollout is not scoped to any group.
pub const DEFAULT_GROUP: &str = "default";

/// RolloutDecider decides whether a single evaluation falls inside a partial rollout.
///
/// `percentage` is in `[0, 100]`. Implementations must return `false` for `0` and `true` for
/// `100` regardless of the key; [rollout] enforces this before delegating, so callers going
/// through it never reach a strategy with either edge value.
///
/// Any `Fn(&str, f64, Option<&str>) -> bool` closure is a decider. Deciders are called
/// synchronously on the evaluating thread; anything asynchronous must be resolved beforehand.
pub trait RolloutDecider: Send + Sync {
    /// Decide whether `key` (optionally scoped to `group`) is inside `percentage`.
    fn decide(&self, key: &str, percentage: f64, group: Option<&str>) -> bool;

    /// Forget any state accumulated by previous decisions.
    fn reset(&self) {}
}

impl<F> RolloutDecider for F
where
    F: Fn(&str, f64, Option<&str>) -> bool + Send + Sync,
{
    fn decide(&self, key: &str, percentage: f64, group: Option<&str>) -> bool {
        self(key, percentage, group)
    }
}

/// Applies the 0/100 short-circuit, then asks `decider`.
pub fn rollout(
    decider: &dyn RolloutDecider,
    key: &str,
    percentage: f64,
    group: Option<&str>,
) -> bool {
    match edge_decision(percentage) {
        Some(decision) => decision,
        None => decider.decide(key, percentage, group),
    }
}

fn edge_decision(percentage: f64) -> Option<bool> {
    if percentage >= 100.0 {
        Some(true)
    } else if percentage <= 0.0 || percentage.is_nan() {
        Some(false)
    } else {
        None
    }
}

/// Stateless rollout based on a SHA-1 hash of the key and group.
///
/// The same key, group and percentage always produce the same decision, so a given user stays on
/// the same side of a rollout across processes.
#[derive(Clone, Copy, Debug, Default)]
pub struct HashRollout;

impl HashRollout {
    /// Returns the bucket in `[0, 100]` that `key` and `group` hash to.
    pub fn bucket(key: &str, group: Option<&str>) -> u8 {
        let mut hash = Sha1::new();
        hash.update(key.as_bytes());
        hash.update(b"-.-");
        hash.update(group.unwrap_or(DEFAULT_GROUP).as_bytes());

        let digest = hash.finalize();
        let hexhash = base16ct::lower::encode_string(&digest);

        let hexhash_15 = &hexhash[..15]; // yes, 15 chars, not 16
        let numhash = match u64::from_str_radix(hexhash_15, 16) {
            Ok(n) => n,
            Err(_) => return 0,
        };

        (numhash as f64 / BUCKET_SCALE * 100.0).round() as u8
    }
}

impl RolloutDecider for HashRollout {
    fn decide(&self, key: &str, percentage: f64, group: Option<&str>) -> bool {
        if let Some(decision) = edge_decision(percentage) {
            return decision;
        }
        let bucket = HashRollout::bucket(key, group);
        debug!("rollout bucket for {} is {}", key, bucket);
        f64::from(bucket) > 100.0 - percentage
    }
}

#[derive(Debug)]
struct Cycle {
    ratios: Vec<u64>,
    total: u64,
    count: u64,
}

impl Cycle {
    fn new(ratios: Vec<u64>) -> Self {
        let total = ratios.iter().sum();
        Cycle {
            ratios,
            total,
            count: 0,
        }
    }

    // Returns the index of the ratio the current count falls in, then moves the count on.
    fn advance(&mut self) -> usize {
        if self.count >= self.total {
            self.count = 0;
        }

        let mut index = 0;
        let mut previous = 0;
        for (i, ratio) in self.ratios.iter().enumerate() {
            if self.count < previous + ratio {
                index = i;
                break;
            }
            previous += ratio;
        }

        self.count += 1;
        index
    }
}

/// Counters shared by the cycling strategies, keyed by a composite string.
///
/// Each key cycles through `total` calls, handing out bucket `i` for `ratios[i]` consecutive
/// calls before moving to bucket `i + 1`. Entries are never evicted; [RolloutState::reset] drops
/// all of them.
#[derive(Debug, Default)]
pub struct RolloutState {
    cycles: Mutex<HashMap<String, Cycle>>,
}

impl RolloutState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the bucket due for `key`, creating the cycle from `ratios` on first use.
    pub(crate) fn advance<F, E>(&self, key: &str, ratios: F) -> Result<usize, E>
    where
        F: FnOnce() -> Result<Vec<u64>, E>,
    {
        let mut cycles = self.cycles.lock();
        if let Some(cycle) = cycles.get_mut(key) {
            return Ok(cycle.advance());
        }

        let mut cycle = Cycle::new(ratios()?);
        let index = cycle.advance();
        cycles.insert(key.to_string(), cycle);
        Ok(index)
    }

    pub fn reset(&self) {
        self.cycles.lock().clear();
    }

    /// Number of distinct keys tracked.
    pub fn len(&self) -> usize {
        self.cycles.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Stateful rollout that hands out exactly `ratio` positive decisions in every `total`
/// consecutive calls, where `ratio / total` is `percentage / 100` in lowest terms.
///
/// The positive decisions come first in each cycle.
#[derive(Debug, Default)]
pub struct IncrementRollout {
    state: RolloutState,
}

impl IncrementRollout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &RolloutState {
        &self.state
    }
}

impl RolloutDecider for IncrementRollout {
    fn decide(&self, key: &str, percentage: f64, group: Option<&str>) -> bool {
        if let Some(decision) = edge_decision(percentage) {
            return decision;
        }

        let state_key = format!(
            "{}-.-{}-.-{}",
            key,
            group.unwrap_or(DEFAULT_GROUP),
            percentage
        );
        let bucket = self
            .state
            .advance(&state_key, || {
                let ratio = ratio_from_fraction(percentage / 100.0);
                Ok::<_, Infallible>(vec![ratio.ratio, ratio.total - ratio.ratio])
            })
            .unwrap_or_else(|never| match never {});

        bucket == 0
    }

    fn reset(&self) {
        self.state.reset();
    }
}

/// Built-in rollout strategies, selectable from configuration.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum RolloutStrategy {
    #[default]
    Hash,
    Increment,
}

impl RolloutStrategy {
    pub fn build(self) -> Box<dyn RolloutDecider> {
        match self {
            RolloutStrategy::Hash => Box::new(HashRollout),
            RolloutStrategy::Increment => Box::new(IncrementRollout::new()),
        }
    }
}
