//! canary-platform: control-plane access for hosted inference endpoints.
//!
//! The [`ControlPlane`] trait covers the describe/create/update/delete
//! calls a canary roll needs on endpoints, endpoint configurations and
//! models, plus training-job lookup. [`InferenceRuntime`] sends requests
//! to a live endpoint. Backends:
//!
//! - [`SageMakerPlatform`] and [`SageMakerRuntime`] talk to Amazon
//!   SageMaker through the AWS SDK.
//! - [`InMemoryPlatform`] implements both traits in process and replays
//!   scripted endpoint statuses (for testing).

pub mod error;
pub mod memory;
pub mod plane;
pub mod sagemaker;

pub use error::{PlatformError, PlatformResult};
pub use memory::{Call, InMemoryPlatform};
pub use plane::{ControlPlane, InferenceRuntime, Operation, PlatformFuture};
pub use sagemaker::{SageMakerPlatform, SageMakerRuntime};
