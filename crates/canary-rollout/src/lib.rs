//! Canary rollouts onto hosted inference endpoints.
//!
//! A roll reads the endpoint's live single-variant configuration, creates
//! a fresh model and a two-variant configuration (live variant reweighted
//! to `1 - w`, canary at `w`), repoints the endpoint and waits for the
//! platform to report a terminal status.
//!
//! # Components
//!
//! - **`plan`**: two-variant traffic split construction
//! - **`strategy`**: poll and cleanup policies
//! - **`poller`**: bounded, cancellable wait for a terminal endpoint status
//! - **`ledger`**: resources created during a run, and their cleanup
//! - **`controller`**: the canary roll itself
//! - **`lifecycle`**: initial deploy, teardown and status reports
//! - **`inference`**: test requests through a live endpoint
//!
//! # Endpoint status as observed during a roll
//!
//! ```text
//! Updating ──► Updating (sleep, poll again)
//!          ├─► InService  (success)
//!          └─► Failed     (fatal)
//! ```

pub mod controller;
pub mod error;
pub mod inference;
pub mod ledger;
pub mod lifecycle;
pub mod plan;
pub mod poller;
pub mod strategy;
mod unique;

pub use controller::{CanaryRoll, RollSummary};
pub use error::{RolloutError, RolloutResult};
pub use inference::{InvocationReport, invoke};
pub use ledger::{CreatedResource, Ledger};
pub use lifecycle::{DeploySummary, EndpointReport, TeardownSummary, deploy, describe, teardown};
pub use plan::plan_variants;
pub use poller::{PollOutcome, wait_for_terminal};
pub use strategy::{CleanupPolicy, PollPolicy};
