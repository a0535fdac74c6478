use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::eval::Error;
use crate::rollout::RolloutDecider;
use crate::targeting::{TargetingFilter, TARGETING_FILTER_NAME};
use crate::time_window::{TimeWindowFilter, TIME_WINDOW_FILTER_NAME};

/// A single entry of a flag's `client_filters`.
///
/// The wire shape is always `{name, parameters}`; a filter is classified as a time window or a
/// targeting filter only when both its name and its parameters have the expected shape. Anything
/// else is a custom filter and needs a [CustomFilterValidator] registered under its name.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(from = "RawClientFilter", into = "RawClientFilter")]
pub enum ClientFilter {
    TimeWindow(TimeWindowFilter),
    Targeting(TargetingFilter),
    Custom(CustomFilter),
}

/// A filter evaluated by caller-supplied code. All parameters are strings.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct CustomFilter {
    pub name: String,
    #[serde(default)]
    pub parameters: HashMap<String, String>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
struct RawClientFilter {
    name: String,
    #[serde(default)]
    parameters: serde_json::Value,
}

impl From<RawClientFilter> for ClientFilter {
    fn from(raw: RawClientFilter) -> Self {
        if raw.name == TIME_WINDOW_FILTER_NAME {
            if let Some(time_window) = TimeWindowFilter::from_parameters(&raw.parameters) {
                return ClientFilter::TimeWindow(time_window);
            }
        }
        if raw.name == TARGETING_FILTER_NAME {
            if let Some(targeting) = TargetingFilter::from_parameters(&raw.parameters) {
                return ClientFilter::Targeting(targeting);
            }
        }

        let parameters = match raw.parameters {
            serde_json::Value::Object(map) => map
                .into_iter()
                .map(|(k, v)| match v {
                    serde_json::Value::String(s) => (k, s),
                    other => (k, other.to_string()),
                })
                .collect(),
            _ => HashMap::new(),
        };
        ClientFilter::Custom(CustomFilter {
            name: raw.name,
            parameters,
        })
    }
}

impl From<ClientFilter> for RawClientFilter {
    fn from(filter: ClientFilter) -> Self {
        let name = filter.name().to_string();
        let parameters = match filter {
            ClientFilter::TimeWindow(time_window) => serde_json::to_value(time_window),
            ClientFilter::Targeting(targeting) => serde_json::to_value(targeting),
            ClientFilter::Custom(custom) => serde_json::to_value(custom.parameters),
        };
        RawClientFilter {
            name,
            parameters: parameters.unwrap_or_default(),
        }
    }
}

/// What a filter is evaluated against: the flag's id and the caller's users and groups.
#[derive(Clone, Copy, Debug)]
pub struct FilterContext<'a> {
    /// Id of the flag being evaluated.
    pub key: &'a str,
    pub users: &'a [String],
    pub groups: &'a [String],
    pub ignore_case: bool,
}

/// CustomFilterValidator decides whether a custom filter passes.
///
/// Any `Fn(&CustomFilter, &FilterContext) -> bool` closure is a validator. Validators are called
/// synchronously during evaluation, so a validator that needs async data must fetch it first.
pub trait CustomFilterValidator: Send + Sync {
    fn validate(&self, filter: &CustomFilter, context: &FilterContext) -> bool;
}

impl<F> CustomFilterValidator for F
where
    F: Fn(&CustomFilter, &FilterContext) -> bool + Send + Sync,
{
    fn validate(&self, filter: &CustomFilter, context: &FilterContext) -> bool {
        self(filter, context)
    }
}

impl ClientFilter {
    pub fn name(&self) -> &str {
        match self {
            ClientFilter::TimeWindow(_) => TIME_WINDOW_FILTER_NAME,
            ClientFilter::Targeting(_) => TARGETING_FILTER_NAME,
            ClientFilter::Custom(custom) => &custom.name,
        }
    }

    pub(crate) fn validate(
        &self,
        context: &FilterContext,
        now: DateTime<Utc>,
        rollout: &dyn RolloutDecider,
        validators: &HashMap<String, &dyn CustomFilterValidator>,
    ) -> Result<bool, Error> {
        match self {
            ClientFilter::TimeWindow(time_window) => Ok(time_window.is_active_at(now)),
            ClientFilter::Targeting(targeting) => Ok(targeting.matches(context, rollout)),
            ClientFilter::Custom(custom) => match validators.get(&custom.name) {
                Some(validator) => Ok(validator.validate(custom, context)),
                None => Err(Error::UnhandledFilter {
                    name: custom.name.clone(),
                }),
            },
        }
    }
}
