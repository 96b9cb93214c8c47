use std::net::{IpAddr, Ipv4Addr};
use validator::Validate;
use vswitch_compose_schemas::switch_yaml::distributed::{HostMembership, NetFlowConfig, NetworkResourceControl, NrcVersion};
use vswitch_compose_schemas::switch_yaml::setting::Setting;
use vswitch_compose_schemas::switch_yaml::vlan::{VlanConfig, MAX_VLAN_ID};
use vswitch_compose_schemas::switch_yaml::{DistributedSwitchOptions, SwitchKind, SwitchModel};
use crate::default_dvs_uplinks;
use crate::error::ValidationError;
use crate::expand::{check_unique, check_uplink_order, security_spec, shaping_spec, teaming_spec, validate};
use crate::vsphere::types::*;

pub(crate) fn validate_distributed(model: &SwitchModel, options: &DistributedSwitchOptions) -> Result<(), ValidationError> {
    if let Setting::Override(vlan) = &options.vlan {
        check_vlan(vlan)?;
    }
    if let Setting::Override(netflow) = &options.netflow {
        check_netflow(netflow)?;
    }
    if let Setting::Override(rc) = &options.resource_control {
        check_resource_control(rc)?;
    }
    if let Setting::Override(version) = &options.version {
        parse_product_version(version)?;
    }
    if let Setting::Override(0) = options.max_mtu {
        return Err(ValidationError::new("distributed.max_mtu", "must be positive"));
    }
    check_membership(&options.hosts, model.uplinks.as_option().map(Vec::as_slice))
}

fn check_vlan(vlan: &VlanConfig) -> Result<(), ValidationError> {
    match vlan {
        VlanConfig::Untagged => Ok(()),
        VlanConfig::Single(0) => Err(ValidationError::new("distributed.vlan", "VLAN 0 is untagged, declare `untagged` instead")),
        VlanConfig::Single(id) if *id > MAX_VLAN_ID => Err(ValidationError::new(
            "distributed.vlan",
            format!("VLAN {id} is outside 0..={MAX_VLAN_ID}"),
        )),
        VlanConfig::Single(_) => Ok(()),
        VlanConfig::Trunk(ranges) if ranges.is_empty() => Err(ValidationError::new("distributed.vlan", "trunk without any ranges")),
        VlanConfig::Trunk(ranges) => {
            match ranges.iter().find(|r| !r.is_valid()) {
                Some(bad) => Err(ValidationError::new(
                    "distributed.vlan",
                    format!("trunk range {}-{} must have min <= max within 0..={MAX_VLAN_ID}", bad.min_vlan, bad.max_vlan),
                )),
                None => Ok(()),
            }
        }
        VlanConfig::Unrecognized(type_name) => Err(ValidationError::new(
            "distributed.vlan",
            format!("{type_name} VLAN specs can only be read, not declared"),
        )),
    }
}

fn check_netflow(netflow: &NetFlowConfig) -> Result<(), ValidationError> {
    netflow.validate()
        .map_err(|err| ValidationError::new("distributed.netflow", err.to_string().replace('\n', "; ")))?;
    if let Some(collector) = &netflow.collector_ip_address {
        collector.parse::<IpAddr>()
            .map_err(|_| ValidationError::new("distributed.netflow.collector_ip_address", format!("{collector} is not an IP address")))?;
    }
    if let Some(switch_ip) = &netflow.switch_ip_address {
        switch_ip.parse::<Ipv4Addr>()
            .map_err(|_| ValidationError::new("distributed.netflow.switch_ip_address", format!("{switch_ip} is not an IPv4 address")))?;
    }
    Ok(())
}

fn check_resource_control(rc: &NetworkResourceControl) -> Result<(), ValidationError> {
    match rc.version.as_option() {
        Some(NrcVersion::Unrecognized(name)) => {
            return Err(ValidationError::new(
                "distributed.resource_control.version",
                format!("unknown version {name}"),
            ));
        }
        Some(NrcVersion::Version3) if !rc.user_defined_pools.is_empty() => {
            return Err(ValidationError::new(
                "distributed.resource_control.user_defined_pools",
                "user defined pools only exist under version2",
            ));
        }
        _ => {}
    }
    if rc.vm_reservation_mbps.is_override() && rc.version.as_option() != Some(&NrcVersion::Version3) {
        return Err(ValidationError::new(
            "distributed.resource_control.vm_reservation_mbps",
            "VM bandwidth reservation needs version3",
        ));
    }
    Ok(())
}

/// Each host is listed once by construction. Within a host a NIC can only back one uplink,
/// and there cannot be more NICs than uplinks when the pool is known.
fn check_membership(hosts: &HostMembership, pool: Option<&[String]>) -> Result<(), ValidationError> {
    for (host, devices) in hosts.iter() {
        if host.trim().is_empty() {
            return Err(ValidationError::new("distributed.hosts", "empty host reference"));
        }
        check_unique(&format!("distributed.hosts.{host}"), devices)?;
        if let Some(pool) = pool {
            if devices.len() > pool.len() {
                return Err(ValidationError::new(
                    format!("distributed.hosts.{host}"),
                    format!("{} devices but only {} uplinks", devices.len(), pool.len()),
                ));
            }
        }
    }
    Ok(())
}

/// Split a product version such as "6.5.0" into its numeric parts.
pub fn parse_product_version(version: &str) -> Result<Vec<u32>, ValidationError> {
    let parts: Result<Vec<u32>, _> = version.split('.').map(str::parse::<u32>).collect();
    match parts {
        Ok(parts) if !parts.is_empty() => Ok(parts),
        _ => Err(ValidationError::new("distributed.version", format!("{version:?} is not a dotted version number"))),
    }
}

/// Build the create spec for a distributed switch. An undeclared pool is checked against the
/// uplinks the platform will create by default.
pub fn expand_distributed(model: &SwitchModel) -> Result<DvsCreateSpec, ValidationError> {
    validate(model)?;
    let options = distributed_options(model)?;
    let pool = model.uplinks.as_option().cloned().unwrap_or_else(default_dvs_uplinks);
    let config_spec = expand_config(model, options, &pool)?;
    Ok(DvsCreateSpec {
        config_spec,
        product_version: options.version.as_option().cloned(),
    })
}

/// Build a reconfigure spec from the declared fields of `model`, checking uplink references
/// against `pool`, the pool the switch will have once applied. Membership is not part of it.
pub fn expand_reconfigure(model: &SwitchModel, pool: &[String]) -> Result<DvsConfigSpec, ValidationError> {
    validate(model)?;
    let options = distributed_options(model)?;
    let mut spec = expand_config(model, options, pool)?;
    spec.host.clear();
    Ok(spec)
}

pub fn member_spec(host: &str, devices: &[String], operation: MemberOperation) -> DvsHostMemberConfigSpec {
    let backing = match operation {
        MemberOperation::Remove => None,
        MemberOperation::Add | MemberOperation::Edit => Some(PnicBacking {
            pnic_spec: devices.iter()
                .map(|d| PnicSpec { pnic_device: d.clone() })
                .collect(),
        }),
    };
    DvsHostMemberConfigSpec { operation, host: host.to_string(), backing }
}

fn distributed_options(model: &SwitchModel) -> Result<&DistributedSwitchOptions, ValidationError> {
    match &model.kind {
        SwitchKind::Distributed(options) => Ok(options),
        SwitchKind::HostLocal(_) => Err(ValidationError::new("kind", format!("{} is not a distributed switch", model.name))),
    }
}

fn expand_config(model: &SwitchModel, options: &DistributedSwitchOptions, pool: &[String]) -> Result<DvsConfigSpec, ValidationError> {
    if let Setting::Override(order) = &model.uplink_order {
        check_uplink_order(order, pool)?;
    }
    check_membership(&options.hosts, Some(pool))?;

    let shaping = model.shaping.as_option();
    let port = DvsPortSetting {
        vlan: options.vlan.as_option().map(vlan_spec),
        uplink_teaming_policy: teaming_spec(&model.teaming, &model.uplink_order),
        security_policy: security_spec(&model.security),
        in_shaping_policy: shaping.and_then(|s| s.ingress.as_option()).map(shaping_spec),
        out_shaping_policy: shaping.and_then(|s| s.egress.as_option()).map(shaping_spec),
        ipfix_enabled: options.netflow.as_option().map(|n| n.enabled),
    };
    let netflow = options.netflow.as_option();
    let rc = options.resource_control.as_option();

    Ok(DvsConfigSpec {
        name: Some(model.name.clone()),
        uplink_port_name: model.uplinks.as_option().cloned(),
        default_port_config: (port != DvsPortSetting::default()).then_some(port),
        host: options.hosts.iter()
            .map(|(host, devices)| member_spec(host, devices, MemberOperation::Add))
            .collect(),
        ipfix_config: netflow.map(ipfix_config),
        switch_ip_address: netflow.and_then(|n| n.switch_ip_address.clone()),
        network_resource_management_enabled: rc.map(|rc| rc.enabled),
        network_resource_control_version: rc.and_then(|rc| rc.version.as_option())
            .and_then(NrcVersion::platform_name),
        network_resource_pools: rc.filter(|rc| !rc.user_defined_pools.is_empty())
            .map(|rc| rc.user_defined_pools.clone()),
        vm_vnic_reservation_mbps: rc.and_then(|rc| rc.vm_reservation_mbps.as_option().copied()),
        max_mtu: options.max_mtu.as_option().copied(),
    })
}

/// Trunk ranges are merged first, the platform rejects overlapping ranges.
fn vlan_spec(vlan: &VlanConfig) -> VlanSpec {
    match vlan.normalized() {
        VlanConfig::Untagged => VlanSpec::VlanId { vlan_id: 0 },
        VlanConfig::Single(id) => VlanSpec::VlanId { vlan_id: id },
        VlanConfig::Trunk(ranges) => VlanSpec::Trunk {
            vlan_id: ranges.iter()
                .map(|r| NumericRange { start: r.min_vlan, end: r.max_vlan })
                .collect(),
        },
        VlanConfig::Unrecognized(type_name) => VlanSpec::Unrecognized { type_name },
    }
}

fn ipfix_config(netflow: &NetFlowConfig) -> IpfixConfig {
    IpfixConfig {
        collector_ip_address: netflow.collector_ip_address.clone(),
        collector_port: netflow.collector_port,
        observation_domain_id: netflow.observation_domain_id,
        active_flow_timeout: netflow.active_flow_timeout,
        idle_flow_timeout: netflow.idle_flow_timeout,
        sampling_rate: netflow.sampling_rate,
        internal_flows_only: netflow.internal_flows_only,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use vswitch_compose_schemas::switch_yaml::policy::UplinkSet;
    use vswitch_compose_schemas::switch_yaml::vlan::VlanRange;
    use super::*;

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn model(options: DistributedSwitchOptions) -> SwitchModel {
        SwitchModel::new("terraform-test-dvs", SwitchKind::Distributed(options))
    }

    fn options_mut(model: &mut SwitchModel) -> &mut DistributedSwitchOptions {
        match &mut model.kind {
            SwitchKind::Distributed(options) => options,
            SwitchKind::HostLocal(_) => unreachable!(),
        }
    }

    #[test]
    fn test_member_per_host_in_declared_order() {
        let mut hosts = HostMembership::default();
        hosts.insert("host-13", names(&["vmnic3", "vmnic2"]));
        hosts.insert("host-12", names(&["vmnic2"]));
        let spec = expand_distributed(&model(DistributedSwitchOptions { hosts, ..Default::default() })).unwrap();
        let members = &spec.config_spec.host;
        assert_eq!(members.len(), 2);
        assert_eq!(members[0].host, "host-12");
        assert_eq!(members[1].devices(), names(&["vmnic3", "vmnic2"]));
        assert!(members.iter().all(|m| m.operation == MemberOperation::Add));
    }

    #[test]
    fn test_default_pool_used_for_checks() {
        let mut model = model(Default::default());
        model.uplink_order = Setting::Override(UplinkSet::new(names(&["uplink1"]), names(&["uplink5"])));
        let err = expand_distributed(&model).unwrap_err();
        assert!(err.reason.contains("uplink5"));

        model.uplink_order = Setting::Override(UplinkSet::new(names(&["uplink1", "uplink2"]), names(&["uplink4"])));
        let spec = expand_distributed(&model).unwrap();
        assert!(spec.config_spec.uplink_port_name.is_none());
        let order = spec.config_spec.default_port_config.unwrap().uplink_teaming_policy.unwrap().nic_order.unwrap();
        assert_eq!(order.standby_nic, names(&["uplink4"]));
    }

    #[test]
    fn test_too_many_devices_for_pool() {
        let mut model = model(Default::default());
        model.uplinks = Setting::Override(names(&["uplink1"]));
        options_mut(&mut model).hosts.insert("host-12", names(&["vmnic1", "vmnic2"]));
        assert!(validate(&model).is_err());
    }

    #[test]
    fn test_duplicate_device_in_host() {
        let mut model = model(Default::default());
        options_mut(&mut model).hosts.insert("host-12", names(&["vmnic1", "vmnic1"]));
        assert_eq!(validate(&model).unwrap_err().field, "distributed.hosts.host-12");
    }

    #[test]
    fn test_same_device_on_different_hosts() {
        let mut model = model(Default::default());
        options_mut(&mut model).hosts.insert("host-12", names(&["vmnic1"]));
        options_mut(&mut model).hosts.insert("host-13", names(&["vmnic1"]));
        assert!(validate(&model).is_ok());
    }

    #[test]
    fn test_vlan_checks() {
        assert!(check_vlan(&VlanConfig::Single(0)).is_err());
        assert!(check_vlan(&VlanConfig::Single(4095)).is_err());
        assert!(check_vlan(&VlanConfig::Single(100)).is_ok());
        let bad: BTreeSet<_> = vec![VlanRange::new(2000, 1000)].into_iter().collect();
        assert!(check_vlan(&VlanConfig::Trunk(bad)).is_err());
        let out_of_range: BTreeSet<_> = vec![VlanRange::new(4000, 5000)].into_iter().collect();
        assert!(check_vlan(&VlanConfig::Trunk(out_of_range)).is_err());
        assert!(check_vlan(&VlanConfig::Trunk(BTreeSet::new())).is_err());
        assert!(check_vlan(&VlanConfig::Unrecognized("VmwareDistributedVirtualSwitchPvlanSpec".into())).is_err());
    }

    #[test]
    fn test_overlapping_trunk_merged() {
        let ranges: BTreeSet<_> = vec![VlanRange::new(1000, 1999), VlanRange::new(1500, 2500)].into_iter().collect();
        assert_eq!(
            vlan_spec(&VlanConfig::Trunk(ranges)),
            VlanSpec::Trunk { vlan_id: vec![NumericRange { start: 1000, end: 2500 }] }
        );
        assert_eq!(vlan_spec(&VlanConfig::Untagged), VlanSpec::VlanId { vlan_id: 0 });
    }

    #[test]
    fn test_resource_control_versions() {
        let rc = NetworkResourceControl {
            enabled: true,
            version: Setting::Override(NrcVersion::Version3),
            user_defined_pools: names(&["pool-1"]),
            vm_reservation_mbps: Setting::Unset,
        };
        assert!(check_resource_control(&rc).is_err());
        let rc = NetworkResourceControl {
            enabled: true,
            version: Setting::Override(NrcVersion::Version2),
            user_defined_pools: vec![],
            vm_reservation_mbps: Setting::Override(100),
        };
        assert!(check_resource_control(&rc).is_err());
        let rc = NetworkResourceControl {
            enabled: true,
            version: Setting::Override(NrcVersion::Version3),
            user_defined_pools: vec![],
            vm_reservation_mbps: Setting::Override(100),
        };
        assert!(check_resource_control(&rc).is_ok());
    }

    #[test]
    fn test_netflow_addresses() {
        let netflow = NetFlowConfig {
            collector_ip_address: Some("10.0.0.10".into()),
            switch_ip_address: Some("fe80::1".into()),
            ..Default::default()
        };
        assert_eq!(check_netflow(&netflow).unwrap_err().field, "distributed.netflow.switch_ip_address");
        let netflow = NetFlowConfig { idle_flow_timeout: 5, ..Default::default() };
        assert_eq!(check_netflow(&netflow).unwrap_err().field, "distributed.netflow");
    }

    #[test]
    fn test_product_version() {
        assert_eq!(parse_product_version("6.5.0").unwrap(), vec![6, 5, 0]);
        assert!(parse_product_version("6.x").is_err());
        assert!(parse_product_version("").is_err());
    }

    #[test]
    fn test_reconfigure_has_no_members() {
        let mut model = model(Default::default());
        options_mut(&mut model).hosts.insert("host-12", names(&["vmnic1"]));
        let spec = expand_reconfigure(&model, &default_dvs_uplinks()).unwrap();
        assert!(spec.host.is_empty());
        assert_eq!(spec.name.as_deref(), Some("terraform-test-dvs"));
    }
}
