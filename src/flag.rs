use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DefaultOnError, DefaultOnNull};

use crate::filter::ClientFilter;
use crate::variant::{Allocation, Variant};

/// A feature flag as delivered by the remote configuration store.
///
/// A flag is either filter based, evaluating to on/off, or variant based, resolving to one of its
/// variants. The JSON form carries no tag: a `conditions` object selects the first, a `variants`
/// list the second.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(untagged)]
pub enum FeatureFlag {
    WithFilters(FlagWithFilters),
    WithVariants(FlagWithVariants),
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FlagWithFilters {
    pub id: String,
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub conditions: Conditions,
}

#[serde_as]
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct Conditions {
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    pub client_filters: Vec<ClientFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirement_type: Option<RequirementType>,
}

/// How the results of a flag's filters are combined.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub enum RequirementType {
    /// Every filter must pass.
    All,
    /// At least one filter must pass.
    #[default]
    Any,
}

#[serde_as]
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FlagWithVariants {
    pub id: String,
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    // A flag with a single variant never looks at its allocation, so a broken one must not stop
    // the flag from loading.
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allocation: Option<Allocation>,
    pub variants: Vec<Variant>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telemetry: Option<Telemetry>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct Telemetry {
    pub enabled: bool,
}

impl FeatureFlag {
    pub fn id(&self) -> &str {
        match self {
            FeatureFlag::WithFilters(flag) => &flag.id,
            FeatureFlag::WithVariants(flag) => &flag.id,
        }
    }

    pub(crate) fn id_mut(&mut self) -> &mut String {
        match self {
            FeatureFlag::WithFilters(flag) => &mut flag.id,
            FeatureFlag::WithVariants(flag) => &mut flag.id,
        }
    }

    pub fn enabled(&self) -> bool {
        match self {
            FeatureFlag::WithFilters(flag) => flag.enabled,
            FeatureFlag::WithVariants(flag) => flag.enabled,
        }
    }

    pub fn display_name(&self) -> Option<&str> {
        match self {
            FeatureFlag::WithFilters(flag) => flag.display_name.as_deref(),
            FeatureFlag::WithVariants(flag) => flag.display_name.as_deref(),
        }
    }

    pub(crate) fn set_display_name(&mut self, display_name: String) {
        match self {
            FeatureFlag::WithFilters(flag) => flag.display_name = Some(display_name),
            FeatureFlag::WithVariants(flag) => flag.display_name = Some(display_name),
        }
    }
}

impl Conditions {
    pub fn requirement_type(&self) -> RequirementType {
        self.requirement_type.unwrap_or_default()
    }
}
