//! Two-variant traffic split construction.

use canary_core::{CanaryWeight, Variant};

use crate::error::{RolloutError, RolloutResult};

/// Build the variants for a canary config: `live` reweighted to
/// `1 - weight`, plus `canary_name` serving `new_model` at `weight`.
///
/// Both variants keep the live variant's instance count and type, so the
/// canary gets the same capacity per instance as production.
pub fn plan_variants(
    live: &Variant,
    new_model: &str,
    canary_name: &str,
    weight: CanaryWeight,
) -> RolloutResult<[Variant; 2]> {
    if live.name == canary_name {
        return Err(RolloutError::VariantClash(canary_name.to_string()));
    }

    let old = Variant {
        weight: weight.complement(),
        ..live.clone()
    };
    let canary = Variant {
        name: canary_name.to_string(),
        model_name: new_model.to_string(),
        instance_count: live.instance_count,
        instance_type: live.instance_type.clone(),
        weight: weight.get(),
    };
    Ok([old, canary])
}
