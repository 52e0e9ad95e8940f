//! Creating resources under names nobody has taken yet.
//!
//! Generated names are unique within one process. Another run that
//! started in the same second can still hold a name, so creation steps
//! past `AlreadyExists` by asking the generator for the next one.

use std::future::Future;

use tracing::warn;

use canary_platform::{PlatformError, PlatformResult};

use crate::error::RolloutResult;

/// Names tried before giving up.
const NAME_ATTEMPTS: u32 = 5;

/// Create a resource named by `next()`, retrying with a fresh name while
/// the platform reports the name taken. Returns the name that stuck.
pub(crate) async fn create_fresh<N, C, F>(mut next: N, mut create: C) -> RolloutResult<String>
where
    N: FnMut() -> String,
    C: FnMut(String) -> F,
    F: Future<Output = PlatformResult<()>>,
{
    let mut attempt = 1;
    loop {
        let name = next();
        match create(name.clone()).await {
            Ok(()) => return Ok(name),
            Err(PlatformError::AlreadyExists { resource, .. }) if attempt < NAME_ATTEMPTS => {
                warn!(resource, name = %name, "name already taken; trying the next one");
                attempt += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }
}
