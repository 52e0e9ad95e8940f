//! canary-core: shared types for rolling model variants onto hosted
//! inference endpoints.
//!
//! Everything in here is platform-agnostic: the endpoint/variant data
//! model, validated roll and deploy configuration, unique resource
//! naming, and container image resolution.

pub mod artifact;
pub mod config;
pub mod error;
pub mod image;
pub mod naming;
pub mod types;

pub use artifact::ArtifactUri;
pub use config::{ConfigFile, DeployConfig, RollConfig};
pub use error::{CoreError, CoreResult};
pub use naming::NameGenerator;
pub use types::*;
