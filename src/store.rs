use std::collections::HashMap;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::flag::FeatureFlag;
use crate::setting::ConfigurationSetting;

/// Store is an interface for a data store that holds feature flags.
///
/// Ordinarily, the only implementation of this interface is [FeatureFlagsRecord], which holds
/// flags loaded from the remote configuration store in memory.
pub trait Store {
    /// Retrieve the flag with id `flag_id`.
    fn flag(&self, flag_id: &str) -> Option<&FeatureFlag>;
}

/// Feature flags keyed by id.
///
/// Serializes as a plain JSON object of id to flag.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(transparent)]
pub struct FeatureFlagsRecord {
    flags: HashMap<String, FeatureFlag>,
}

impl FeatureFlagsRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Converts configuration settings into flags.
    ///
    /// Settings that are not feature flags are ignored; feature flag settings that cannot be
    /// parsed are logged and skipped.
    pub fn from_settings<'a, I>(settings: I) -> Self
    where
        I: IntoIterator<Item = &'a ConfigurationSetting>,
    {
        settings
            .into_iter()
            .filter(|setting| setting.is_feature_flag())
            .filter_map(|setting| match setting.to_feature_flag() {
                Ok(flag) => Some(flag),
                Err(e) => {
                    warn!("skipping feature flag setting {}: {}", setting.key, e);
                    None
                }
            })
            .collect()
    }

    /// Adds `flag` under its id, returning the flag it replaced.
    pub fn insert(&mut self, flag: FeatureFlag) -> Option<FeatureFlag> {
        self.flags.insert(flag.id().to_string(), flag)
    }

    pub fn remove(&mut self, flag_id: &str) -> Option<FeatureFlag> {
        self.flags.remove(flag_id)
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.flags.keys().map(String::as_str)
    }
}

impl FromIterator<FeatureFlag> for FeatureFlagsRecord {
    fn from_iter<T: IntoIterator<Item = FeatureFlag>>(iter: T) -> Self {
        let mut record = FeatureFlagsRecord::new();
        for flag in iter {
            record.insert(flag);
        }
        record
    }
}

impl Store for FeatureFlagsRecord {
    fn flag(&self, flag_id: &str) -> Option<&FeatureFlag> {
        self.flags.get(flag_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setting::FEATURE_FLAG_CONTENT_TYPE;
    use crate::test_common::test_store;
    use serde_json::json;
    use spectral::prelude::*;

    fn setting(key: &str, value: &str, content_type: Option<&str>) -> ConfigurationSetting {
        ConfigurationSetting {
            key: key.to_string(),
            value: Some(value.to_string()),
            content_type: content_type.map(String::from),
        }
    }

    #[test]
    fn record_deserializes_from_object() {
        let record: FeatureFlagsRecord = serde_json::from_value(json!({
            "a": {"id": "a", "enabled": true, "conditions": {"client_filters": []}},
            "b": {"id": "b", "enabled": false, "variants": [{"name": "x"}]}
        }))
        .unwrap();

        assert_that!(record.len()).is_equal_to(2);
        assert_that!(record.flag("a").map(FeatureFlag::enabled)).contains_value(true);
        assert_that!(record.flag("b").map(FeatureFlag::id)).contains_value("b");
        assert_that!(record.flag("c")).is_none();
    }

    #[test]
    fn insert_replaces_by_id() {
        let mut record = test_store();
        let count = record.len();
        let mut flag = record.flag("plainFlag").unwrap().clone();
        flag.set_display_name("Plain".to_string());

        assert_that!(record.insert(flag)).is_some();
        assert_that!(record.len()).is_equal_to(count);
        assert_that!(record.flag("plainFlag").and_then(FeatureFlag::display_name)).contains_value("Plain");

        assert_that!(record.remove("plainFlag")).is_some();
        assert_that!(record.flag("plainFlag")).is_none();
    }

    #[test]
    fn from_settings_skips_other_and_broken_settings() {
        let settings = vec![
            setting(
                ".appconfig.featureflag/Beta",
                r#"{"id": "Beta", "enabled": true, "conditions": {"client_filters": []}}"#,
                Some(FEATURE_FLAG_CONTENT_TYPE),
            ),
            setting(
                ".appconfig.featureflag/Broken",
                r#"{"id": "Broken""#,
                Some(FEATURE_FLAG_CONTENT_TYPE),
            ),
            setting("Color", "blue", None),
        ];

        let record = FeatureFlagsRecord::from_settings(&settings);
        assert_that!(record.ids().collect::<Vec<_>>()).is_equal_to(vec!["Beta"]);
    }
}
