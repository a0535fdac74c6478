use itertools::Itertools;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::eval::Error;
use crate::ratio::normalize_ratios;
use crate::rollout::RolloutState;

/// A slice `[from, to)` of the `[0, 100]` range assigned to a variant.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Percentile {
    pub variant: String,
    pub from: f64,
    pub to: f64,
}

impl Percentile {
    pub fn new(variant: impl Into<String>, from: f64, to: f64) -> Self {
        Percentile {
            variant: variant.into(),
            from,
            to,
        }
    }

    pub fn span(&self) -> f64 {
        self.to - self.from
    }
}

/// Checks that `percentiles` partitions `[0, 100]` without gaps or overlaps.
pub fn verify_partition(percentiles: &[Percentile]) -> Result<(), Error> {
    let mut previous_to = 0.0;
    for percentile in percentiles {
        if percentile.from != previous_to {
            return Err(Error::AllocationGap);
        }
        previous_to = percentile.to;
    }
    if previous_to != 100.0 {
        return Err(Error::AllocationIncomplete);
    }
    Ok(())
}

/// AllocationDecider picks the variant a percentile allocation resolves to.
///
/// Any `Fn(&str, &[Percentile], Option<i64>) -> String` closure is a decider. Allocation runs
/// synchronously; there is no async form.
pub trait AllocationDecider: Send + Sync {
    /// Returns the name of the variant allocated for `flag_id`.
    fn allocate(
        &self,
        flag_id: &str,
        percentiles: &[Percentile],
        seed: Option<i64>,
    ) -> Result<String, Error>;

    /// Forget any state accumulated by previous allocations.
    fn reset(&self) {}
}

impl<F> AllocationDecider for F
where
    F: Fn(&str, &[Percentile], Option<i64>) -> String + Send + Sync,
{
    fn allocate(
        &self,
        flag_id: &str,
        percentiles: &[Percentile],
        seed: Option<i64>,
    ) -> Result<String, Error> {
        Ok(self(flag_id, percentiles, seed))
    }
}

/// Cycles through the variants of an allocation in proportion to their spans.
///
/// Spans are normalized to whole-number ratios (30/30/40 becomes 3/3/4), then every run of
/// `3 + 3 + 4` consecutive allocations for the same flag, seed and percentiles hands out the
/// first variant three times, the second three times and the third four times, in that order.
#[derive(Debug, Default)]
pub struct IncrementAllocation {
    state: RolloutState,
}

impl IncrementAllocation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &RolloutState {
        &self.state
    }
}

impl AllocationDecider for IncrementAllocation {
    fn allocate(
        &self,
        flag_id: &str,
        percentiles: &[Percentile],
        seed: Option<i64>,
    ) -> Result<String, Error> {
        let signature = percentiles
            .iter()
            .map(|p| format!("{}:{}:{}", p.variant, p.from, p.to))
            .join(",");
        let state_key = format!("{}-.-{}-.-{}", flag_id, seed.unwrap_or(0), signature);

        let index = self.state.advance(&state_key, || {
            let spans: Vec<f64> = percentiles.iter().map(Percentile::span).collect();
            normalize_ratios(&spans)
        })?;

        let percentile = percentiles.get(index).ok_or(Error::EmptyRatio)?;
        debug!("allocated variant {} for {}", percentile.variant, flag_id);
        Ok(percentile.variant.clone())
    }

    fn reset(&self) {
        self.state.reset();
    }
}
