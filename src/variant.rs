use log::debug;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DefaultOnNull, DisplayFromStr, PickFirst};

use crate::allocation::{verify_partition, AllocationDecider, Percentile};
use crate::eval::Error;
use crate::filter::FilterContext;
use crate::flag::FlagWithVariants;
use crate::util::intersects;

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Variant {
    pub name: String,
    #[serde(default)]
    pub configuration_value: serde_json::Value,
}

/// How a variant flag picks its variant when it is enabled, and which variant it falls back to.
#[serde_as]
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct Allocation {
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    pub percentile: Vec<Percentile>,
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub group: Vec<GroupAllocation>,
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub user: Vec<UserAllocation>,
    // The store writes seeds as strings; older payloads use numbers.
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(default)]
    pub default_when_enabled: String,
    #[serde(default)]
    pub default_when_disabled: String,
}

/// Assigns `variant` to every caller in any of `groups`.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct GroupAllocation {
    pub variant: String,
    pub groups: Vec<String>,
}

/// Assigns `variant` to every caller who is one of `users`.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct UserAllocation {
    pub variant: String,
    pub users: Vec<String>,
}

impl FlagWithVariants {
    /// Looks up a variant by name.
    pub fn variant(&self, name: &str) -> Result<&Variant, Error> {
        self.variants
            .iter()
            .find(|v| v.name == name)
            .ok_or_else(|| Error::MissingVariant {
                name: name.to_string(),
            })
    }

    pub(crate) fn resolve(
        &self,
        context: &FilterContext,
        decider: &dyn AllocationDecider,
    ) -> Result<&Variant, Error> {
        let first = self.variants.first().ok_or(Error::NoVariants)?;
        if self.variants.len() == 1 {
            return Ok(first);
        }

        let allocation = self.allocation.as_ref().ok_or(Error::MissingAllocation)?;
        if !self.enabled {
            return self.variant(&allocation.default_when_disabled);
        }

        let user_override = allocation
            .user
            .iter()
            .find(|u| intersects(&u.users, context.users, context.ignore_case));
        if let Some(user_override) = user_override {
            return self.variant(&user_override.variant);
        }

        let group_override = allocation
            .group
            .iter()
            .find(|g| intersects(&g.groups, context.groups, context.ignore_case));
        if let Some(group_override) = group_override {
            return self.variant(&group_override.variant);
        }

        if !allocation.percentile.is_empty() {
            verify_partition(&allocation.percentile)?;
            let name = decider.allocate(&self.id, &allocation.percentile, allocation.seed)?;
            debug!("flag {} allocated to variant {}", self.id, name);
            return self.variant(&name);
        }

        self.variant(&allocation.default_when_enabled)
    }
}
