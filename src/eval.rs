use std::collections::HashMap;

use chrono::{DateTime, Utc};
use log::warn;
use serde::Deserialize;

use crate::allocation::{AllocationDecider, IncrementAllocation};
use crate::filter::{CustomFilterValidator, FilterContext};
use crate::flag::{FeatureFlag, FlagWithFilters, FlagWithVariants, RequirementType};
use crate::rollout::{RolloutDecider, RolloutStrategy};
use crate::store::Store;
use crate::variant::Variant;

/// Error is returned when a flag cannot be evaluated because of a problem in its configuration or
/// a filter the caller has not provided a validator for.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// A percentile does not start where the previous one ended.
    #[error("'From' value of allocation should match 'To' value of previous allocation.")]
    AllocationGap,
    /// The percentiles do not end at 100.
    #[error("All allocations do not add up to a complete 100%.")]
    AllocationIncomplete,
    /// A variant was referenced by name but the flag has no variant with that name.
    #[error("There is no variant in the Feature Flag matching name '{name}'.")]
    MissingVariant { name: String },
    /// A variant flag has an empty variant list.
    #[error("There are no variants in the Feature Flag.")]
    NoVariants,
    /// A variant flag with several variants has no usable allocation.
    #[error("The Feature Flag has no valid allocation.")]
    MissingAllocation,
    /// A filter is neither built in nor handled by a registered custom validator.
    #[error("Custom filter validator is not implemented for '{name}'")]
    UnhandledFilter { name: String },
    /// Weights given to ratio normalization sum to zero.
    #[error("The sum of all ratios should be greater than 0.")]
    EmptyRatio,
}

/// Broad classes of [Error].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// A numeric range in the flag is invalid.
    Range,
    /// The flag refers to something it does not contain.
    Reference,
    /// The flag needs an extension the caller did not provide.
    Unhandled,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::AllocationGap | Error::AllocationIncomplete | Error::EmptyRatio => {
                ErrorKind::Range
            }
            Error::MissingVariant { .. } | Error::NoVariants | Error::MissingAllocation => {
                ErrorKind::Reference
            }
            Error::UnhandledFilter { .. } => ErrorKind::Unhandled,
        }
    }
}

/// The result of evaluating a [FeatureFlag].
#[derive(Clone, Debug, PartialEq)]
pub enum Evaluation<'a> {
    /// Outcome of a filter flag.
    Enabled(bool),
    /// Outcome of a variant flag. None only if an error was handed to
    /// [EvaluationOptions::on_error].
    Variant(Option<&'a Variant>),
}

impl<'a> Evaluation<'a> {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Evaluation::Enabled(enabled) => Some(*enabled),
            Evaluation::Variant(_) => None,
        }
    }

    pub fn variant(&self) -> Option<&'a Variant> {
        match self {
            Evaluation::Enabled(_) => None,
            Evaluation::Variant(variant) => *variant,
        }
    }
}

/// Per-call inputs to an evaluation: who is asking, and optional overrides for the evaluator's
/// strategies.
#[derive(Default)]
pub struct EvaluationOptions<'a> {
    pub users: Vec<String>,
    pub groups: Vec<String>,
    /// Compare users and groups case-insensitively.
    pub ignore_case: bool,
    /// Validators for custom filters, by filter name.
    pub custom_filter_validators: HashMap<String, &'a dyn CustomFilterValidator>,
    /// Overrides the evaluator's rollout strategy for this call.
    pub rollout: Option<&'a dyn RolloutDecider>,
    /// Overrides the evaluator's allocation strategy for this call.
    pub allocation: Option<&'a dyn AllocationDecider>,
    /// When set, errors are passed here instead of being returned, and the evaluation yields
    /// `false` or no variant.
    pub on_error: Option<&'a dyn Fn(&Error)>,
    /// The instant time windows are checked against. Defaults to the current time.
    pub now: Option<DateTime<Utc>>,
}

impl<'a> EvaluationOptions<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.users.push(user.into());
        self
    }

    pub fn users<I, S>(mut self, users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.users.extend(users.into_iter().map(Into::into));
        self
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.groups.push(group.into());
        self
    }

    pub fn groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups.extend(groups.into_iter().map(Into::into));
        self
    }

    pub fn ignore_case(mut self, ignore_case: bool) -> Self {
        self.ignore_case = ignore_case;
        self
    }

    pub fn custom_filter_validator(
        mut self,
        name: impl Into<String>,
        validator: &'a dyn CustomFilterValidator,
    ) -> Self {
        self.custom_filter_validators.insert(name.into(), validator);
        self
    }

    pub fn rollout(mut self, decider: &'a dyn RolloutDecider) -> Self {
        self.rollout = Some(decider);
        self
    }

    pub fn allocation(mut self, decider: &'a dyn AllocationDecider) -> Self {
        self.allocation = Some(decider);
        self
    }

    pub fn on_error(mut self, on_error: &'a dyn Fn(&Error)) -> Self {
        self.on_error = Some(on_error);
        self
    }

    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    fn context<'s>(&'s self, key: &'s str) -> FilterContext<'s> {
        FilterContext {
            key,
            users: &self.users,
            groups: &self.groups,
            ignore_case: self.ignore_case,
        }
    }

    fn handle<T>(&self, result: Result<T, Error>, fallback: T) -> Result<T, Error> {
        match (result, self.on_error) {
            (Err(e), Some(on_error)) => {
                warn!("flag evaluation failed, returning fallback: {}", e);
                on_error(&e);
                Ok(fallback)
            }
            (result, _) => result,
        }
    }
}

/// Selects the built-in strategies an [Evaluator] is created with.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct EvaluatorConfig {
    pub rollout: RolloutStrategy,
    /// Default for [EvaluationOptions::ignore_case] in options made by [Evaluator::options].
    pub ignore_case: bool,
}

/// Evaluates feature flags.
///
/// An evaluator owns its rollout and allocation strategies, including whatever state they keep;
/// two evaluators never share counters. By default partial rollouts are hashed and percentile
/// allocations cycle through their variants.
pub struct Evaluator {
    rollout: Box<dyn RolloutDecider>,
    allocation: Box<dyn AllocationDecider>,
    ignore_case: bool,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl Evaluator {
    pub fn new() -> Self {
        Self::from_config(&EvaluatorConfig::default())
    }

    pub fn from_config(config: &EvaluatorConfig) -> Self {
        Evaluator {
            rollout: config.rollout.build(),
            allocation: Box::new(IncrementAllocation::new()),
            ignore_case: config.ignore_case,
        }
    }

    pub fn with_rollout(mut self, decider: impl RolloutDecider + 'static) -> Self {
        self.rollout = Box::new(decider);
        self
    }

    pub fn with_allocation(mut self, decider: impl AllocationDecider + 'static) -> Self {
        self.allocation = Box::new(decider);
        self
    }

    /// Returns empty options carrying the configured defaults.
    pub fn options<'a>(&self) -> EvaluationOptions<'a> {
        EvaluationOptions::new().ignore_case(self.ignore_case)
    }

    /// Drops all state held by the evaluator's strategies.
    pub fn reset(&self) {
        self.rollout.reset();
        self.allocation.reset();
    }

    /// Evaluates any kind of flag. A missing flag is disabled.
    pub fn evaluate<'f>(
        &self,
        flag: Option<&'f FeatureFlag>,
        options: &EvaluationOptions,
    ) -> Result<Evaluation<'f>, Error> {
        match flag {
            None => Ok(Evaluation::Enabled(false)),
            Some(FeatureFlag::WithFilters(flag)) => self
                .evaluate_filter_flag(Some(flag), options)
                .map(Evaluation::Enabled),
            Some(FeatureFlag::WithVariants(flag)) => self
                .resolve_variant(flag, options)
                .map(Evaluation::Variant),
        }
    }

    /// Looks `id` up in `store` and evaluates it.
    pub fn evaluate_key<'s>(
        &self,
        store: &'s dyn Store,
        id: &str,
        options: &EvaluationOptions,
    ) -> Result<Evaluation<'s>, Error> {
        self.evaluate(store.flag(id), options)
    }

    /// Decides whether a filter flag is on.
    ///
    /// A missing or disabled flag is off, and an enabled flag without filters is on. Otherwise the
    /// flag is on when all of its filters pass (`requirement_type` "All") or at least one does
    /// ("Any", the default). Every filter is evaluated even once the outcome is known.
    pub fn evaluate_filter_flag(
        &self,
        flag: Option<&FlagWithFilters>,
        options: &EvaluationOptions,
    ) -> Result<bool, Error> {
        let flag = match flag {
            Some(flag) if flag.enabled => flag,
            _ => return Ok(false),
        };
        let result = self.evaluate_filters(flag, options);
        options.handle(result, false)
    }

    fn evaluate_filters(
        &self,
        flag: &FlagWithFilters,
        options: &EvaluationOptions,
    ) -> Result<bool, Error> {
        let filters = &flag.conditions.client_filters;
        if filters.is_empty() {
            return Ok(flag.enabled);
        }

        let context = options.context(&flag.id);
        let now = options.now.unwrap_or_else(Utc::now);
        let rollout: &dyn RolloutDecider = match options.rollout {
            Some(rollout) => rollout,
            None => self.rollout.as_ref(),
        };

        let mut valid_filters = 0;
        for filter in filters {
            if filter.validate(&context, now, rollout, &options.custom_filter_validators)? {
                valid_filters += 1;
            }
        }

        Ok(match flag.conditions.requirement_type() {
            RequirementType::All => valid_filters == filters.len(),
            RequirementType::Any => valid_filters > 0,
        })
    }

    /// Resolves a variant flag to one of its variants.
    ///
    /// A flag with a single variant always resolves to it. A disabled flag resolves to
    /// `default_when_disabled`. An enabled flag checks user overrides, then group overrides, then
    /// its percentile allocation, and finally falls back to `default_when_enabled`.
    ///
    /// Returns `Ok(None)` only when an error was handed to [EvaluationOptions::on_error].
    pub fn resolve_variant<'f>(
        &self,
        flag: &'f FlagWithVariants,
        options: &EvaluationOptions,
    ) -> Result<Option<&'f Variant>, Error> {
        let context = options.context(&flag.id);
        let allocation: &dyn AllocationDecider = match options.allocation {
            Some(allocation) => allocation,
            None => self.allocation.as_ref(),
        };
        let result = flag.resolve(&context, allocation).map(Some);
        options.handle(result, None)
    }
}
