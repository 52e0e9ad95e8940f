//! Unique resource naming.
//!
//! Models and endpoint configs are never reused, so every roll needs
//! fresh names. The platform caps names at 63 characters of
//! `[a-zA-Z0-9-]`, so the endpoint prefix is clipped when needed.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

/// Maximum length the platform accepts for model/config names.
pub const MAX_NAME_LEN: usize = 63;

/// Clock source returning whole unix seconds.
pub type Clock = Arc<dyn Fn() -> u64 + Send + Sync>;

/// Kind of resource a name is generated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NameKind {
    /// `<endpoint>-xgb-<secs>`
    Model,
    /// `<endpoint>-canary-ec-<secs>`
    CanaryConfig,
    /// `<endpoint>-ec-<secs>`
    DeployConfig,
}

impl NameKind {
    fn infix(self) -> &'static str {
        match self {
            NameKind::Model => "xgb",
            NameKind::CanaryConfig => "canary-ec",
            NameKind::DeployConfig => "ec",
        }
    }
}

/// Names handed out during the current second, by base name.
#[derive(Default)]
struct Issued {
    second: u64,
    count: HashMap<String, u32>,
}

/// Generates timestamp-suffixed names that stay unique within a second.
///
/// Clones share the same history, so every controller built from one
/// generator (or from [`NameGenerator::shared`]) sees the others' names.
#[derive(Clone)]
pub struct NameGenerator {
    clock: Clock,
    issued: Arc<Mutex<Issued>>,
}

impl std::fmt::Debug for NameGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NameGenerator").finish_non_exhaustive()
    }
}

impl NameGenerator {
    /// Generator backed by the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(epoch_secs))
    }

    /// Generator with an injected clock (for testing).
    pub fn with_clock(clock: Clock) -> Self {
        Self {
            clock,
            issued: Arc::new(Mutex::new(Issued::default())),
        }
    }

    /// Process-wide generator used when callers don't supply one.
    pub fn shared() -> Self {
        static SHARED: OnceLock<NameGenerator> = OnceLock::new();
        SHARED.get_or_init(NameGenerator::new).clone()
    }

    pub fn model_name(&self, endpoint: &str) -> String {
        self.next(endpoint, NameKind::Model)
    }

    pub fn canary_config_name(&self, endpoint: &str) -> String {
        self.next(endpoint, NameKind::CanaryConfig)
    }

    pub fn deploy_config_name(&self, endpoint: &str) -> String {
        self.next(endpoint, NameKind::DeployConfig)
    }

    /// Produce the next name of `kind` for `endpoint`.
    ///
    /// Uniqueness is only guaranteed within this generator's history;
    /// callers creating resources step past names another process took
    /// by asking again.
    pub fn next(&self, endpoint: &str, kind: NameKind) -> String {
        let now = (self.clock)();
        let base = join_clipped(endpoint, &format!("-{}-{now}", kind.infix()));
        let seq = {
            let mut issued = self.issued.lock().unwrap_or_else(PoisonError::into_inner);
            if issued.second != now {
                issued.second = now;
                issued.count.clear();
            }
            let count = issued.count.entry(base.clone()).or_insert(0);
            *count += 1;
            *count
        };

        if seq == 1 {
            base
        } else {
            join_clipped(endpoint, &format!("-{}-{now}-{seq}", kind.infix()))
        }
    }
}

impl Default for NameGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Join prefix and suffix, clipping the prefix to fit `MAX_NAME_LEN`.
fn join_clipped(prefix: &str, suffix: &str) -> String {
    let budget = MAX_NAME_LEN.saturating_sub(suffix.len());
    let mut clipped: String = prefix.chars().take(budget).collect();
    // A trailing hyphen would produce "--" at the join.
    while clipped.ends_with('-') {
        clipped.pop();
    }
    format!("{clipped}{suffix}")
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
