use vswitch_compose_schemas::switch_yaml::policy::TrafficShapingPolicy;
use vswitch_compose_schemas::switch_yaml::setting::Setting;
use vswitch_compose_schemas::switch_yaml::{HostSwitchOptions, SwitchKind, SwitchModel};
use crate::flatten::{security_from, shaping_params_from, teaming_from, uplink_order_from};
use crate::identity::HostRef;
use crate::vsphere::types::HostVirtualSwitchSpec;

/// Read a host-local switch spec into the model. The host and name are not part of the spec,
/// they come from the identity.
pub fn flatten_host(host: &HostRef, name: &str, spec: &HostVirtualSwitchSpec) -> SwitchModel {
    let bridge = spec.bridge.as_ref();
    let policy = spec.policy.as_ref();
    let teaming = policy.and_then(|p| p.nic_teaming.as_ref());

    let options = HostSwitchOptions {
        host_system_id: host.0.clone(),
        mtu: spec.mtu.into(),
        number_of_ports: spec.num_ports.into(),
        beacon_interval: bridge.and_then(|b| b.beacon_interval).into(),
    };
    SwitchModel {
        name: name.to_string(),
        kind: SwitchKind::HostLocal(options),
        uplinks: bridge.map(|b| b.nic_device.clone()).into(),
        uplink_order: uplink_order_from(teaming, bridge.map(|b| b.nic_device.as_slice())),
        teaming: teaming_from(teaming),
        security: security_from(policy.and_then(|p| p.security.as_ref())),
        shaping: policy.and_then(|p| p.shaping_policy.as_ref())
            .map(|egress| TrafficShapingPolicy {
                ingress: Setting::Unset,
                egress: Setting::Override(shaping_params_from(egress)),
            })
            .into(),
    }
}
