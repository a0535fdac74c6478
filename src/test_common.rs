#![cfg(test)]

use crate::flag::FeatureFlag;
use crate::store::FeatureFlagsRecord;

const FLAGS: &[&str] = &[
    r#"{
        "id": "plainFlag",
        "description": "",
        "enabled": true,
        "conditions": {"client_filters": []}
    }"#,
    r#"{
        "id": "targetedFlag",
        "enabled": true,
        "conditions": {
            "client_filters": [
                {
                    "name": "Microsoft.Targeting",
                    "parameters": {
                        "Audience": {
                            "Users": ["alice"],
                            "Groups": [],
                            "DefaultRolloutPercentage": 0
                        }
                    }
                }
            ]
        }
    }"#,
    r#"{
        "id": "allFiltersFlag",
        "enabled": true,
        "conditions": {
            "requirement_type": "All",
            "client_filters": [
                {
                    "name": "Microsoft.TimeWindow",
                    "parameters": {
                        "Start": "Mon, 01 Jan 2024 00:00:00 GMT",
                        "End": "2030-12-31T23:59:59Z"
                    }
                },
                {
                    "name": "Microsoft.Targeting",
                    "parameters": {
                        "Audience": {
                            "Users": ["alice"],
                            "Groups": [{"Name": "beta", "RolloutPercentage": 100}],
                            "DefaultRolloutPercentage": 0,
                            "Exclusion": {"Users": [], "Groups": []}
                        }
                    }
                }
            ]
        }
    }"#,
    r#"{
        "id": "partialRolloutFlag",
        "enabled": true,
        "conditions": {
            "client_filters": [
                {
                    "name": "Microsoft.Targeting",
                    "parameters": {
                        "Audience": {
                            "Groups": [{"Name": "beta", "RolloutPercentage": 25}],
                            "DefaultRolloutPercentage": 0
                        }
                    }
                }
            ]
        }
    }"#,
    r#"{
        "id": "customFlag",
        "enabled": true,
        "conditions": {
            "client_filters": [
                {"name": "Contoso.Tier", "parameters": {"Tier": "premium"}}
            ]
        }
    }"#,
    r#"{
        "id": "variantFlag",
        "displayName": "Variant Flag",
        "enabled": true,
        "variants": [
            {"name": "Small", "configuration_value": {"size": 20}},
            {"name": "Large", "configuration_value": {"size": 40}}
        ],
        "allocation": {
            "percentile": [
                {"variant": "Small", "from": 0, "to": 25},
                {"variant": "Large", "from": 25, "to": 100}
            ],
            "user": [{"variant": "Large", "users": ["tester"]}],
            "group": [{"variant": "Small", "groups": ["internal"]}],
            "seed": "12",
            "default_when_enabled": "Small",
            "default_when_disabled": "Small"
        },
        "telemetry": {"enabled": false}
    }"#,
    r#"{
        "id": "singleVariantFlag",
        "enabled": false,
        "variants": [{"name": "Only", "configuration_value": "only"}],
        "allocation": null
    }"#,
];

/// Flags used across test modules, keyed by id.
pub fn test_store() -> FeatureFlagsRecord {
    FLAGS
        .iter()
        .map(|json| serde_json::from_str::<FeatureFlag>(json).unwrap())
        .collect()
}
