use vswitch_compose_schemas::switch_yaml::distributed::{HostMembership, NetFlowConfig, NetworkResourceControl, NrcVersion};
use vswitch_compose_schemas::switch_yaml::policy::TrafficShapingPolicy;
use vswitch_compose_schemas::switch_yaml::setting::Setting;
use vswitch_compose_schemas::switch_yaml::vlan::{VlanConfig, VlanRange};
use vswitch_compose_schemas::switch_yaml::{DistributedSwitchOptions, SwitchKind, SwitchModel};
use crate::flatten::{security_from, shaping_params_from, teaming_from, uplink_order_from};
use crate::vsphere::types::{DvsConfigInfo, VlanSpec};

const PVLAN_TYPE: &str = "VmwareDistributedVirtualSwitchPvlanSpec";

pub fn flatten_distributed(info: &DvsConfigInfo) -> SwitchModel {
    let config = &info.config;
    let port = config.default_port_config.as_ref();
    let teaming = port.and_then(|p| p.uplink_teaming_policy.as_ref());

    let mut hosts = HostMembership::default();
    for member in &info.hosts {
        hosts.insert(member.host.clone(), member.pnic_devices.clone());
    }
    let netflow = config.ipfix_config.as_ref().map(|ipfix| NetFlowConfig {
        enabled: port.and_then(|p| p.ipfix_enabled).unwrap_or(false),
        collector_ip_address: ipfix.collector_ip_address.clone(),
        collector_port: ipfix.collector_port,
        observation_domain_id: ipfix.observation_domain_id,
        active_flow_timeout: ipfix.active_flow_timeout,
        idle_flow_timeout: ipfix.idle_flow_timeout,
        sampling_rate: ipfix.sampling_rate,
        internal_flows_only: ipfix.internal_flows_only,
        switch_ip_address: config.switch_ip_address.clone().filter(|ip| !ip.is_empty()),
    });
    let resource_control = config.network_resource_management_enabled.map(|enabled| NetworkResourceControl {
        enabled,
        version: config.network_resource_control_version.as_deref()
            .map(NrcVersion::from_platform_name)
            .into(),
        user_defined_pools: config.network_resource_pools.clone().unwrap_or_default(),
        vm_reservation_mbps: config.vm_vnic_reservation_mbps.into(),
    });
    let options = DistributedSwitchOptions {
        hosts,
        vlan: port.and_then(|p| p.vlan.as_ref()).map(vlan_from).into(),
        netflow: netflow.into(),
        resource_control: resource_control.into(),
        version: info.product_version.clone().into(),
        max_mtu: config.max_mtu.into(),
    };

    let ingress = port.and_then(|p| p.in_shaping_policy.as_ref());
    let egress = port.and_then(|p| p.out_shaping_policy.as_ref());
    let shaping = if ingress.is_some() || egress.is_some() {
        Setting::Override(TrafficShapingPolicy {
            ingress: ingress.map(shaping_params_from).into(),
            egress: egress.map(shaping_params_from).into(),
        })
    } else {
        Setting::Unset
    };

    SwitchModel {
        name: info.name.clone(),
        kind: SwitchKind::Distributed(options),
        uplinks: config.uplink_port_name.clone().into(),
        uplink_order: uplink_order_from(teaming, config.uplink_port_name.as_deref()),
        teaming: teaming_from(teaming),
        security: security_from(port.and_then(|p| p.security_policy.as_ref())),
        shaping,
    }
}

fn vlan_from(spec: &VlanSpec) -> VlanConfig {
    match spec {
        VlanSpec::VlanId { vlan_id: 0 } => VlanConfig::Untagged,
        VlanSpec::VlanId { vlan_id } => VlanConfig::Single(*vlan_id),
        VlanSpec::Trunk { vlan_id } => VlanConfig::Trunk(
            vlan_id.iter()
                .map(|r| VlanRange::new(r.start, r.end))
                .collect(),
        ),
        VlanSpec::Pvlan { .. } => VlanConfig::Unrecognized(PVLAN_TYPE.to_string()),
        VlanSpec::Unrecognized { type_name } => {
            tracing::warn!("unknown VLAN spec type {type_name}, it will be shown but cannot be changed");
            VlanConfig::Unrecognized(type_name.clone())
        }
    }
}
