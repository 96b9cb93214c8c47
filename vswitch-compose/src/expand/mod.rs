//! Declarative model to platform spec. All input checks live here so that a model that gets
//! through `validate` can be expanded without a remote round trip failing on bad input.

pub mod host;
pub mod distributed;

use vswitch_compose_schemas::switch_yaml::policy::{
    SecurityPolicy, ShapingParams, TeamingMode, TeamingPolicy, TrafficShapingPolicy, UplinkSet,
};
use vswitch_compose_schemas::switch_yaml::setting::Setting;
use vswitch_compose_schemas::switch_yaml::{SwitchKind, SwitchModel};
use crate::error::ValidationError;
use crate::vsphere::types::{
    DvsCreateSpec, FailureCriteria, HostVirtualSwitchSpec, NicOrderPolicy, NicTeamingPolicySpec,
    SecurityPolicySpec, ShapingPolicySpec,
};

pub use distributed::{expand_distributed, parse_product_version};
pub use host::expand_host;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpandedSpec {
    HostLocal(HostVirtualSwitchSpec),
    Distributed(DvsCreateSpec),
}

pub fn expand(model: &SwitchModel) -> Result<ExpandedSpec, ValidationError> {
    match &model.kind {
        SwitchKind::HostLocal(_) => Ok(ExpandedSpec::HostLocal(expand_host(model)?)),
        SwitchKind::Distributed(_) => Ok(ExpandedSpec::Distributed(expand_distributed(model)?)),
    }
}

/// Checks that only need the model itself. Uplink order is checked against the pool when the
/// pool is declared, otherwise that check waits until the current pool is known.
pub fn validate(model: &SwitchModel) -> Result<(), ValidationError> {
    if model.name.trim().is_empty() {
        return Err(ValidationError::new("name", "must not be empty"));
    }
    check_teaming(&model.teaming, &model.kind)?;
    if let Setting::Override(shaping) = &model.shaping {
        check_shaping(shaping, &model.kind)?;
    }
    if let Setting::Override(order) = &model.uplink_order {
        check_overlap(order)?;
        if let Setting::Override(pool) = &model.uplinks {
            check_uplink_order(order, pool)?;
        }
    }
    if let Setting::Override(pool) = &model.uplinks {
        check_unique("uplinks", pool)?;
    }
    match &model.kind {
        SwitchKind::HostLocal(options) => host::validate_host(model, options),
        SwitchKind::Distributed(options) => distributed::validate_distributed(model, options),
    }
}

fn check_overlap(order: &UplinkSet) -> Result<(), ValidationError> {
    let overlap = order.overlap();
    if !overlap.is_empty() {
        return Err(ValidationError::new(
            "uplink_order",
            format!("{overlap:?} listed as both active and standby"),
        ));
    }
    Ok(())
}

/// Active and standby must not overlap and must only name uplinks from `pool`.
pub(crate) fn check_uplink_order(order: &UplinkSet, pool: &[String]) -> Result<(), ValidationError> {
    check_overlap(order)?;
    let outside = order.outside_of(pool);
    if !outside.is_empty() {
        return Err(ValidationError::new(
            "uplink_order",
            format!("{outside:?} not in the uplink pool {pool:?}"),
        ));
    }
    Ok(())
}

pub(crate) fn check_unique(field: &str, names: &[String]) -> Result<(), ValidationError> {
    for (i, name) in names.iter().enumerate() {
        if names[..i].contains(name) {
            return Err(ValidationError::new(field, format!("{name} listed more than once")));
        }
    }
    Ok(())
}

fn check_teaming(teaming: &TeamingPolicy, kind: &SwitchKind) -> Result<(), ValidationError> {
    match (teaming.policy.as_option(), kind) {
        (Some(TeamingMode::Unrecognized(name)), _) => Err(ValidationError::new(
            "teaming.policy",
            format!("unknown teaming policy {name}"),
        )),
        (Some(TeamingMode::LoadbalanceLoadBased), SwitchKind::HostLocal(_)) => Err(ValidationError::new(
            "teaming.policy",
            "load based teaming is only available on distributed switches",
        )),
        _ => Ok(()),
    }
}

fn check_shaping(shaping: &TrafficShapingPolicy, kind: &SwitchKind) -> Result<(), ValidationError> {
    if !shaping.any_override() {
        return Err(ValidationError::new("shaping", "neither ingress nor egress is declared"));
    }
    if shaping.ingress.is_override() && matches!(kind, SwitchKind::HostLocal(_)) {
        return Err(ValidationError::new("shaping.ingress", "host-local switches only shape egress traffic"));
    }
    for (direction, params) in [("ingress", &shaping.ingress), ("egress", &shaping.egress)] {
        if let Setting::Override(params) = params {
            if params.enabled && params.peak_bandwidth < params.average_bandwidth {
                return Err(ValidationError::new(
                    format!("shaping.{direction}"),
                    format!("peak bandwidth {} is below average bandwidth {}", params.peak_bandwidth, params.average_bandwidth),
                ));
            }
        }
    }
    Ok(())
}

/// The teaming sub-object, `None` when nothing teaming related is declared so the switch keeps
/// inheriting.
pub(crate) fn teaming_spec(teaming: &TeamingPolicy, order: &Setting<UplinkSet>) -> Option<NicTeamingPolicySpec> {
    if !teaming.any_override() && order.is_unset() {
        return None;
    }
    Some(NicTeamingPolicySpec {
        policy: teaming.policy.as_option().and_then(TeamingMode::platform_name),
        notify_switches: teaming.notify_switches.as_option().copied(),
        rolling_order: teaming.failback.as_option().map(|failback| !failback),
        failure_criteria: teaming.check_beacon.as_option()
            .map(|beacon| FailureCriteria { check_beacon: Some(*beacon) }),
        nic_order: order.as_option().map(|o| NicOrderPolicy {
            active_nic: o.active.clone(),
            standby_nic: o.standby.clone(),
        }),
    })
}

pub(crate) fn security_spec(security: &SecurityPolicy) -> Option<SecurityPolicySpec> {
    if !security.any_override() {
        return None;
    }
    Some(SecurityPolicySpec {
        allow_promiscuous: security.allow_promiscuous.as_option().copied(),
        mac_changes: security.allow_mac_changes.as_option().copied(),
        forged_transmits: security.allow_forged_transmits.as_option().copied(),
    })
}

pub(crate) fn shaping_spec(params: &ShapingParams) -> ShapingPolicySpec {
    ShapingPolicySpec {
        enabled: Some(params.enabled),
        average_bandwidth: Some(params.average_bandwidth),
        peak_bandwidth: Some(params.peak_bandwidth),
        burst_size: Some(params.burst_size),
    }
}
