//! Imperative objects in the shape the platform management API uses. An absent sub-object
//! (`None`) means "inherit from the parent" (or "leave unchanged" in a reconfigure), which is
//! not the same as a present but empty one.

use serde::{Deserialize, Serialize};

/// Spec of a host-local virtual switch. The platform only supports replacing it whole.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostVirtualSwitchSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_ports: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bridge: Option<HostBondBridge>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy: Option<HostNetworkPolicy>,
}

/// Physical adapters bonded into a host-local switch, in precedence order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostBondBridge {
    pub nic_device: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub beacon_interval: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostNetworkPolicy {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security: Option<SecurityPolicySpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nic_teaming: Option<NicTeamingPolicySpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shaping_policy: Option<ShapingPolicySpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityPolicySpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_promiscuous: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac_changes: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forged_transmits: Option<bool>,
}

/// Teaming policy. Used as is by host-local switches and as the uplink teaming policy of a
/// distributed switch's default port config.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NicTeamingPolicySpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notify_switches: Option<bool>,
    /// inverse of failback
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rolling_order: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_criteria: Option<FailureCriteria>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nic_order: Option<NicOrderPolicy>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureCriteria {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check_beacon: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NicOrderPolicy {
    #[serde(default)]
    pub active_nic: Vec<String>,
    #[serde(default)]
    pub standby_nic: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShapingPolicySpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_bandwidth: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peak_bandwidth: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub burst_size: Option<u64>,
}

/// VLAN setting of a distributed port config. The platform tags these by type name.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum VlanSpec {
    #[serde(rename = "VmwareDistributedVirtualSwitchVlanIdSpec")]
    VlanId {
        vlan_id: u16,
    },
    #[serde(rename = "VmwareDistributedVirtualSwitchTrunkVlanSpec")]
    Trunk {
        vlan_id: Vec<NumericRange>,
    },
    #[serde(rename = "VmwareDistributedVirtualSwitchPvlanSpec")]
    Pvlan {
        pvlan_id: u32,
    },
    /// a type this crate does not know, the name is kept for display
    #[serde(rename = "Unrecognized")]
    Unrecognized {
        type_name: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct NumericRange {
    pub start: u16,
    pub end: u16,
}

/// Default port configuration of a distributed switch.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DvsPortSetting {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vlan: Option<VlanSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uplink_teaming_policy: Option<NicTeamingPolicySpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security_policy: Option<SecurityPolicySpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_shaping_policy: Option<ShapingPolicySpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub out_shaping_policy: Option<ShapingPolicySpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipfix_enabled: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IpfixConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collector_ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collector_port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observation_domain_id: Option<u64>,
    pub active_flow_timeout: u32,
    pub idle_flow_timeout: u32,
    pub sampling_rate: u32,
    pub internal_flows_only: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberOperation {
    Add,
    Remove,
    Edit,
}

/// Physical NIC backing of a host member, in uplink slot order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PnicBacking {
    pub pnic_spec: Vec<PnicSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PnicSpec {
    pub pnic_device: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DvsHostMemberConfigSpec {
    pub operation: MemberOperation,
    pub host: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backing: Option<PnicBacking>,
}

impl DvsHostMemberConfigSpec {
    pub fn devices(&self) -> Vec<String> {
        self.backing.as_ref()
            .map(|b| b.pnic_spec.iter().map(|p| p.pnic_device.clone()).collect())
            .unwrap_or_default()
    }
}

/// Switch IP a reconfigure sends to clear the flow export source address.
pub const CLEARED_SWITCH_IP: &str = "";

/// Reconfigure spec of a distributed switch. Absent fields are left unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DvsConfigSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// uplink port names in precedence order
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uplink_port_name: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_port_config: Option<DvsPortSetting>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub host: Vec<DvsHostMemberConfigSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipfix_config: Option<IpfixConfig>,
    /// an empty address removes the current one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub switch_ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_resource_management_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_resource_control_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_resource_pools: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vm_vnic_reservation_mbps: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_mtu: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DvsCreateSpec {
    pub config_spec: DvsConfigSpec,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_version: Option<String>,
}

/// A host currently participating in a distributed switch.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DvsHostMember {
    pub host: String,
    pub pnic_devices: Vec<String>,
}

/// Current state of a distributed switch as read from the platform.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DvsConfigInfo {
    pub name: String,
    /// the `host` list of `config` is always empty, members are in `hosts`
    pub config: DvsConfigSpec,
    #[serde(default)]
    pub hosts: Vec<DvsHostMember>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_version: Option<String>,
}

impl From<&DvsCreateSpec> for DvsConfigInfo {
    /// What the platform reports right after creating a switch from `spec`.
    fn from(spec: &DvsCreateSpec) -> Self {
        let mut config = spec.config_spec.clone();
        let hosts = std::mem::take(&mut config.host)
            .into_iter()
            .filter(|m| m.operation != MemberOperation::Remove)
            .map(|m| DvsHostMember { pnic_devices: m.devices(), host: m.host })
            .collect();
        Self {
            name: config.name.clone().unwrap_or_default(),
            config,
            hosts,
            product_version: spec.product_version.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_policy_is_not_serialised() {
        let spec = HostVirtualSwitchSpec {
            bridge: Some(HostBondBridge { nic_device: vec![], beacon_interval: None }),
            ..Default::default()
        };
        let json = serde_json::to_value(&spec).unwrap();
        assert!(json.get("policy").is_none());
        // explicitly empty is kept
        assert_eq!(json["bridge"]["nicDevice"], serde_json::json!([]));
    }

    #[test]
    fn test_vlan_spec_tagging() {
        let trunk = VlanSpec::Trunk { vlan_id: vec![NumericRange { start: 1000, end: 1999 }] };
        let json = serde_json::to_value(&trunk).unwrap();
        assert_eq!(json["type"], "VmwareDistributedVirtualSwitchTrunkVlanSpec");
        let back: VlanSpec = serde_json::from_value(json).unwrap();
        assert_eq!(back, trunk);
    }

    #[test]
    fn test_config_info_from_create_spec() {
        let spec = DvsCreateSpec {
            config_spec: DvsConfigSpec {
                name: Some("dvs".into()),
                host: vec![DvsHostMemberConfigSpec {
                    operation: MemberOperation::Add,
                    host: "host-1".into(),
                    backing: Some(PnicBacking { pnic_spec: vec![PnicSpec { pnic_device: "vmnic1".into() }] }),
                }],
                ..Default::default()
            },
            product_version: Some("6.5.0".into()),
        };
        let info = DvsConfigInfo::from(&spec);
        assert_eq!(info.name, "dvs");
        assert!(info.config.host.is_empty());
        assert_eq!(info.hosts, vec![DvsHostMember { host: "host-1".into(), pnic_devices: vec!["vmnic1".into()] }]);
    }
}
