use itertools::Itertools;
use log::debug;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DefaultOnError};

use crate::filter::FilterContext;
use crate::rollout::{rollout, RolloutDecider};
use crate::util::intersects;

/// Filter name the remote store uses for targeting.
pub const TARGETING_FILTER_NAME: &str = "Microsoft.Targeting";

/// Group name used in rollout ids when the default rollout percentage applies.
pub const DEFAULT_ROLLOUT_GROUP: &str = "-Default-";

const ROLLOUT_ID_SEPARATOR: &str = "=|=";

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct TargetingFilter {
    #[serde(rename = "Audience")]
    pub audience: Audience,
}

/// The users and groups a targeting filter includes or excludes.
///
/// Fields that are missing, null or of the wrong type take their default.
#[serde_as]
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct Audience {
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub default_rollout_percentage: f64,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub exclusion: Option<Exclusion>,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub groups: Vec<GroupRollout>,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub users: Vec<String>,
}

#[serde_as]
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct Exclusion {
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub users: Vec<String>,
}

/// A group's own rollout percentage. A missing percentage rolls out to nobody.
#[serde_as]
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct GroupRollout {
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub name: String,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub rollout_percentage: f64,
}

impl TargetingFilter {
    pub(crate) fn from_parameters(parameters: &serde_json::Value) -> Option<Self> {
        let audience = parameters.get("Audience").filter(|a| a.is_object())?;
        let audience = serde_json::from_value(audience.clone()).unwrap_or_else(|e| {
            debug!("Audience is not a valid targeting audience, using an empty one: {}", e);
            Audience::default()
        });
        Some(TargetingFilter { audience })
    }

    /// Returns true if the context is targeted.
    ///
    /// Exclusions win over inclusions: an excluded user or group is never targeted, even if it is
    /// also listed as included. After that, an included user is always targeted; a user in an
    /// included group is subject to the first matching group's rollout percentage; everyone else
    /// gets the default rollout percentage.
    pub fn matches(&self, context: &FilterContext, decider: &dyn RolloutDecider) -> bool {
        let audience = &self.audience;
        let ignore_case = context.ignore_case;

        if let Some(exclusion) = &audience.exclusion {
            if intersects(&exclusion.users, context.users, ignore_case) {
                return false;
            }
            if intersects(&exclusion.groups, context.groups, ignore_case) {
                return false;
            }
        }

        if intersects(&audience.users, context.users, ignore_case) {
            return true;
        }

        let matching_group = audience
            .groups
            .iter()
            .find(|group| intersects(std::slice::from_ref(&group.name), context.groups, ignore_case));
        if let Some(group) = matching_group {
            let rollout_id = rollout_id(context.key, &group.name, context.users);
            return rollout(decider, &rollout_id, group.rollout_percentage, None);
        }

        let rollout_id = rollout_id(context.key, DEFAULT_ROLLOUT_GROUP, context.users);
        rollout(
            decider,
            &rollout_id,
            audience.default_rollout_percentage,
            None,
        )
    }
}

fn rollout_id(key: &str, group_name: &str, users: &[String]) -> String {
    let users = users.join(",");
    [key, group_name, users.as_str()]
        .iter()
        .filter(|part| !part.is_empty())
        .join(ROLLOUT_ID_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;
    use spectral::prelude::*;
    use test_case::test_case;

    fn users(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn filter(audience: serde_json::Value) -> TargetingFilter {
        TargetingFilter::from_parameters(&json!({ "Audience": audience })).unwrap()
    }

    // Only used for partial percentages; a half-way rollout decides on the percentage alone.
    fn at_least_half(_: &str, percentage: f64, _: Option<&str>) -> bool {
        percentage >= 50.0
    }

    fn context<'a>(users: &'a [String], groups: &'a [String]) -> FilterContext<'a> {
        FilterContext {
            key: "flag",
            users,
            groups,
            ignore_case: false,
        }
    }

    fn check(filter: &TargetingFilter, u: &[&str], g: &[&str], ignore_case: bool) -> bool {
        let (u, g) = (users(u), users(g));
        let context = FilterContext {
            ignore_case,
            ..context(&u, &g)
        };
        filter.matches(&context, &at_least_half)
    }

    #[test]
    fn exclusion_wins_over_inclusion() {
        let f = filter(json!({
            "DefaultRolloutPercentage": 100,
            "Users": ["alice"],
            "Groups": [{"Name": "beta", "RolloutPercentage": 100}],
            "Exclusion": {"Users": ["alice"], "Groups": ["blocked"]}
        }));

        assert!(!check(&f, &["alice"], &[], false));
        assert!(!check(&f, &["bob"], &["beta", "blocked"], false));
        assert!(check(&f, &["bob"], &["beta"], false));
        assert!(check(&f, &["carol"], &[], false));
    }

    #[test]
    fn included_user_is_targeted_regardless_of_default() {
        let f = filter(json!({"DefaultRolloutPercentage": 0, "Users": ["alice"]}));
        assert!(check(&f, &["alice"], &[], false));
        assert!(!check(&f, &["bob"], &[], false));
    }

    #[test_case(100.0, true)]
    #[test_case(0.0, false)]
    #[test_case(60.0, true; "partial rollout delegates")]
    #[test_case(40.0, false; "partial rollout delegates below half")]
    fn first_matching_group_decides(percentage: f64, expected: bool) {
        let f = filter(json!({
            "DefaultRolloutPercentage": 100,
            "Groups": [
                {"Name": "beta", "RolloutPercentage": percentage},
                {"Name": "staff", "RolloutPercentage": 100}
            ]
        }));
        assert_that!(check(&f, &["alice"], &["staff", "beta"], false)).is_equal_to(expected);
    }

    #[test]
    fn unmatched_groups_fall_through_to_default() {
        let f = filter(json!({
            "DefaultRolloutPercentage": 100,
            "Groups": [{"Name": "beta", "RolloutPercentage": 0}]
        }));
        assert!(check(&f, &["alice"], &["gamma"], false));
        assert!(!check(&f, &["alice"], &["beta"], false));
    }

    #[test]
    fn comparisons_respect_ignore_case() {
        let f = filter(json!({
            "DefaultRolloutPercentage": 0,
            "Users": ["Alice"],
            "Exclusion": {"Groups": ["Blocked"]}
        }));
        assert!(!check(&f, &["alice"], &[], false));
        assert!(check(&f, &["alice"], &[], true));
        assert!(check(&f, &["Alice"], &["blocked"], false));
        assert!(!check(&f, &["Alice"], &["blocked"], true));
    }

    #[test]
    fn rollout_ids_include_key_group_and_users() {
        let seen = Mutex::new(Vec::new());
        let recorder = |id: &str, _: f64, group: Option<&str>| -> bool {
            assert!(group.is_none());
            seen.lock().push(id.to_string());
            true
        };

        let f = filter(json!({
            "DefaultRolloutPercentage": 20,
            "Groups": [{"Name": "beta", "RolloutPercentage": 30}]
        }));

        let (alice, beta, none) = (users(&["alice", "bob"]), users(&["beta"]), users(&[]));
        assert!(f.matches(&context(&alice, &beta), &recorder));
        assert!(f.matches(&context(&alice, &none), &recorder));
        assert!(f.matches(&context(&none, &none), &recorder));

        assert_that!(*seen.lock()).is_equal_to(vec![
            "flag=|=beta=|=alice,bob".to_string(),
            "flag=|=-Default-=|=alice,bob".to_string(),
            "flag=|=-Default-".to_string(),
        ]);
    }

    #[test]
    fn audience_tolerates_nulls_and_missing_fields() {
        let f = filter(json!({"Users": null, "Groups": null, "Exclusion": {"Users": null}}));
        assert_that!(f.audience).is_equal_to(Audience {
            exclusion: Some(Exclusion::default()),
            ..Audience::default()
        });
        assert!(!check(&f, &["alice"], &["beta"], false));
    }

    #[test]
    fn audience_must_be_an_object() {
        assert_that!(TargetingFilter::from_parameters(&json!({"Audience": "everyone"}))).is_none();
        assert_that!(TargetingFilter::from_parameters(&json!({"Audience": null}))).is_none();
        assert_that!(TargetingFilter::from_parameters(&json!({}))).is_none();
    }

    #[test]
    fn malformed_audience_fields_take_defaults() {
        let f = filter(json!({
            "Users": 5,
            "DefaultRolloutPercentage": "half",
            "Exclusion": ["alice"],
            "Groups": [{"Name": "beta"}]
        }));
        assert_that!(f.audience).is_equal_to(Audience {
            groups: vec![GroupRollout {
                name: "beta".into(),
                rollout_percentage: 0.0,
            }],
            ..Audience::default()
        });
    }

    #[test]
    fn group_without_percentage_still_targets_included_users() {
        let f = filter(json!({
            "Users": ["alice"],
            "Groups": [{"Name": "beta"}],
            "DefaultRolloutPercentage": 0
        }));
        assert!(check(&f, &["alice"], &[], false));
        assert!(!check(&f, &["bob"], &["beta"], false));
    }
}
