use serde::{Deserialize, Serialize};

use crate::flag::FeatureFlag;

/// Key prefix of configuration settings that hold feature flags.
pub const FEATURE_FLAG_PREFIX: &str = ".appconfig.featureflag/";

/// Content type of configuration settings that hold feature flags.
pub const FEATURE_FLAG_CONTENT_TYPE: &str = "application/vnd.microsoft.appconfig.ff+json;charset=utf-8";

/// Errors converting between configuration settings and feature flags.
#[derive(Debug, thiserror::Error)]
pub enum SettingError {
    #[error(
        "Setting with key {key} is not a valid FeatureFlag setting, make sure to have the correct \
         content-type and a valid non-null value."
    )]
    NotFeatureFlag { key: String },
    #[error("Invalid Feature Flag: {0}")]
    InvalidFlag(#[from] serde_json::Error),
}

/// A raw key-value setting as stored by the remote configuration store.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationSetting {
    pub key: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default, alias = "content_type")]
    pub content_type: Option<String>,
}

impl ConfigurationSetting {
    /// Returns true if the setting has the feature flag content type and a non-empty value.
    pub fn is_feature_flag(&self) -> bool {
        self.content_type.as_deref() == Some(FEATURE_FLAG_CONTENT_TYPE)
            && self.value.as_deref().is_some_and(|v| !v.is_empty())
    }

    /// Parses the setting's value as a feature flag.
    ///
    /// If the key is not the prefix followed by the flag's id, the key (without prefix) becomes
    /// the id and the id from the value is kept as the display name.
    pub fn to_feature_flag(&self) -> Result<FeatureFlag, SettingError> {
        let value = match self.value.as_deref() {
            Some(value) if self.is_feature_flag() => value,
            _ => {
                return Err(SettingError::NotFeatureFlag {
                    key: self.key.clone(),
                })
            }
        };

        let mut flag: FeatureFlag = serde_json::from_str(value)?;
        let expected_key = format!("{}{}", FEATURE_FLAG_PREFIX, flag.id());
        if self.key != expected_key {
            let id = self.key.replacen(FEATURE_FLAG_PREFIX, "", 1);
            let display_name = std::mem::replace(flag.id_mut(), id);
            flag.set_display_name(display_name);
        }
        Ok(flag)
    }

    /// Builds the setting that stores `flag`.
    pub fn from_feature_flag(flag: &FeatureFlag) -> Result<Self, SettingError> {
        Ok(ConfigurationSetting {
            key: format!("{}{}", FEATURE_FLAG_PREFIX, flag.id()),
            value: Some(serde_json::to_string(flag)?),
            content_type: Some(FEATURE_FLAG_CONTENT_TYPE.to_string()),
        })
    }
}
