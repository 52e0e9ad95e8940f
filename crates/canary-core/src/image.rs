//! Built-in XGBoost serving container lookup.
//!
//! The platform publishes its first-party XGBoost image from a
//! per-region registry account. Regions not listed here need an
//! explicit image URI.

use crate::error::{CoreError, CoreResult};

/// Framework version served by default.
pub const DEFAULT_XGBOOST_VERSION: &str = "1.7-1";

const XGBOOST_REGISTRIES: &[(&str, &str)] = &[
    ("us-east-1", "683313688378"),
    ("us-east-2", "257758044811"),
    ("us-west-1", "746614075791"),
    ("us-west-2", "246618743249"),
    ("ca-central-1", "341280168497"),
    ("eu-west-1", "141502667606"),
    ("eu-west-2", "764974769150"),
    ("eu-central-1", "492215442770"),
    ("ap-south-1", "720646828776"),
    ("ap-northeast-1", "354813040037"),
    ("ap-southeast-1", "121021644041"),
    ("ap-southeast-2", "783357654285"),
];

/// Resolve the XGBoost container image for `region` and `version`.
pub fn xgboost_image_uri(region: &str, version: &str) -> CoreResult<String> {
    let account = XGBOOST_REGISTRIES
        .iter()
        .find(|(r, _)| *r == region)
        .map(|(_, account)| *account)
        .ok_or_else(|| CoreError::UnknownRegion(region.to_string()))?;
    Ok(format!(
        "{account}.dkr.ecr.{region}.amazonaws.com/sagemaker-xgboost:{version}"
    ))
}

/// Use `explicit` when set, otherwise the default XGBoost image.
pub fn resolve_image(explicit: Option<&str>, region: &str) -> CoreResult<String> {
    match explicit {
        Some(uri) if !uri.trim().is_empty() => Ok(uri.trim().to_string()),
        _ => xgboost_image_uri(region, DEFAULT_XGBOOST_VERSION),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn us_east_1_image() {
        assert_eq!(
            xgboost_image_uri("us-east-1", "1.7-1").unwrap(),
            "683313688378.dkr.ecr.us-east-1.amazonaws.com/sagemaker-xgboost:1.7-1"
        );
    }

    #[test]
    fn unknown_region_is_an_error() {
        let err = xgboost_image_uri("mars-north-1", DEFAULT_XGBOOST_VERSION).unwrap_err();
        assert!(matches!(err, CoreError::UnknownRegion(_)));
    }

    #[test]
    fn explicit_image_wins() {
        let uri = resolve_image(Some("123.dkr.ecr.mars-north-1.amazonaws.com/custom:1"), "mars-north-1")
            .unwrap();
        assert_eq!(uri, "123.dkr.ecr.mars-north-1.amazonaws.com/custom:1");
        assert!(resolve_image(Some("  "), "eu-west-1").unwrap().contains("141502667606"));
    }
}
