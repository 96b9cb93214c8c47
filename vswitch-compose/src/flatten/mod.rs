//! Platform state back to the declarative model. An absent sub-object reads as `Unset`, a
//! present but empty collection reads as an empty override.

pub mod host;
pub mod distributed;

use vswitch_compose_schemas::switch_yaml::policy::{SecurityPolicy, ShapingParams, TeamingMode, TeamingPolicy, UplinkSet};
use vswitch_compose_schemas::switch_yaml::setting::Setting;
use crate::vsphere::types::{NicTeamingPolicySpec, SecurityPolicySpec, ShapingPolicySpec};

pub use distributed::flatten_distributed;
pub use host::flatten_host;

pub(crate) fn teaming_from(spec: Option<&NicTeamingPolicySpec>) -> TeamingPolicy {
    let Some(spec) = spec else {
        return TeamingPolicy::default();
    };
    TeamingPolicy {
        policy: spec.policy.as_deref().map(TeamingMode::from_platform_name).into(),
        check_beacon: spec.failure_criteria.as_ref().and_then(|c| c.check_beacon).into(),
        notify_switches: spec.notify_switches.into(),
        failback: spec.rolling_order.map(|rolling| !rolling).into(),
    }
}

/// Rebuild the active/standby split. Names missing from the `precedence` list are not uplinks
/// of this switch any more and are dropped.
pub(crate) fn uplink_order_from(spec: Option<&NicTeamingPolicySpec>, precedence: Option<&[String]>) -> Setting<UplinkSet> {
    let Some(order) = spec.and_then(|s| s.nic_order.as_ref()) else {
        return Setting::Unset;
    };
    let keep = |names: &[String]| -> Vec<String> {
        names.iter()
            .filter(|name| {
                let known = precedence.map_or(true, |p| p.contains(*name));
                if !known {
                    tracing::warn!("dropping uplink {name} from the failover order, it is not in the uplink list");
                }
                known
            })
            .cloned()
            .collect()
    };
    Setting::Override(UplinkSet::new(keep(&order.active_nic), keep(&order.standby_nic)))
}

pub(crate) fn security_from(spec: Option<&SecurityPolicySpec>) -> SecurityPolicy {
    let Some(spec) = spec else {
        return SecurityPolicy::default();
    };
    SecurityPolicy {
        allow_promiscuous: spec.allow_promiscuous.into(),
        allow_forged_transmits: spec.forged_transmits.into(),
        allow_mac_changes: spec.mac_changes.into(),
    }
}

pub(crate) fn shaping_params_from(spec: &ShapingPolicySpec) -> ShapingParams {
    ShapingParams {
        enabled: spec.enabled.unwrap_or(false),
        average_bandwidth: spec.average_bandwidth.unwrap_or(0),
        peak_bandwidth: spec.peak_bandwidth.unwrap_or(0),
        burst_size: spec.burst_size.unwrap_or(0),
    }
}
