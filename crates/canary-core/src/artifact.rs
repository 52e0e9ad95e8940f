//! Model artifact location parsing.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Location of a trained model archive in object storage.
///
/// Only `s3://bucket/key` is accepted; the hosting platform cannot pull
/// model data from anywhere else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactUri {
    pub bucket: String,
    pub key: String,
}

impl ArtifactUri {
    pub fn parse(uri: &str) -> CoreResult<Self> {
        let rest = uri
            .trim()
            .strip_prefix("s3://")
            .ok_or_else(|| CoreError::Artifact(format!("{uri} (expected s3://bucket/key)")))?;
        let (bucket, key) = rest
            .split_once('/')
            .ok_or_else(|| CoreError::Artifact(format!("{uri} (missing object key)")))?;
        if bucket.is_empty() || key.is_empty() {
            return Err(CoreError::Artifact(uri.to_string()));
        }
        Ok(ArtifactUri {
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }
}

impl fmt::Display for ArtifactUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}
