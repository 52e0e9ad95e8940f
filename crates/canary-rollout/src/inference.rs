//! Sending a request through a live endpoint to check what it serves.

use serde_json::Value;
use tracing::{debug, info};

use canary_core::{InvokeRequest, JSON_CONTENT_TYPE};
use canary_platform::InferenceRuntime;

use crate::error::RolloutResult;

/// What came back from one invocation, ready for printing.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct InvocationReport {
    pub endpoint: String,
    /// Variant that answered, if the platform reported one.
    pub variant: Option<String>,
    /// Parsed JSON when the body is JSON, otherwise the raw text.
    pub prediction: Value,
}

/// Invoke an endpoint and report which variant answered.
pub async fn invoke<R: InferenceRuntime + ?Sized>(
    runtime: &R,
    request: &InvokeRequest,
) -> RolloutResult<InvocationReport> {
    debug!(
        endpoint = %request.endpoint,
        target = request.target_variant.as_deref().unwrap_or("weighted"),
        bytes = request.body.len(),
        "invoking endpoint"
    );
    let invocation = runtime.invoke(request).await?;
    let prediction = parse_body(invocation.content_type.as_deref(), &invocation.body);
    info!(
        endpoint = %request.endpoint,
        variant = invocation.invoked_variant.as_deref().unwrap_or("unknown"),
        "endpoint answered"
    );
    Ok(InvocationReport {
        endpoint: request.endpoint.clone(),
        variant: invocation.invoked_variant,
        prediction,
    })
}

fn parse_body(content_type: Option<&str>, body: &str) -> Value {
    let trimmed = body.trim();
    let json_declared = content_type.is_none_or(|ct| ct.starts_with(JSON_CONTENT_TYPE));
    match serde_json::from_str(trimmed) {
        Ok(value) if json_declared => value,
        _ => Value::String(trimmed.to_string()),
    }
}
