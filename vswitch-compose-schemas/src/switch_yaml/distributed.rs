use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};
use validator::Validate;
use crate::switch_yaml::setting::Setting;

/// Physical NICs bonded into a distributed switch, keyed by host reference. Device order is
/// significant, the first device takes the first free uplink slot.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(transparent)]
pub struct HostMembership(pub BTreeMap<String, Vec<String>>);

impl HostMembership {
    pub fn devices(&self, host: &str) -> Option<&Vec<String>> {
        self.0.get(host)
    }

    pub fn insert(&mut self, host: impl Into<String>, devices: Vec<String>) {
        self.0.insert(host.into(), devices);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.0.iter()
    }
}

/// Flow export (IPFIX) settings of a distributed switch.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq, Validate)]
#[serde(rename_all = "snake_case")]
pub struct NetFlowConfig {
    /// enable export on the default port configuration
    #[serde(default)]
    pub enabled: bool,
    pub collector_ip_address: Option<String>,
    pub collector_port: Option<u16>,
    pub observation_domain_id: Option<u64>,
    #[serde(default = "default_active_flow_timeout")]
    #[validate(range(min = 60, max = 3600))]
    pub active_flow_timeout: u32,
    #[serde(default = "default_idle_flow_timeout")]
    #[validate(range(min = 10, max = 600))]
    pub idle_flow_timeout: u32,
    #[serde(default)]
    #[validate(range(max = 16384))]
    pub sampling_rate: u32,
    #[serde(default)]
    pub internal_flows_only: bool,
    /// source address for exported records, IPv4 only
    pub switch_ip_address: Option<String>,
}

impl Default for NetFlowConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            collector_ip_address: None,
            collector_port: None,
            observation_domain_id: None,
            active_flow_timeout: default_active_flow_timeout(),
            idle_flow_timeout: default_idle_flow_timeout(),
            sampling_rate: 0,
            internal_flows_only: false,
            switch_ip_address: None,
        }
    }
}

fn default_active_flow_timeout() -> u32 {60}
fn default_idle_flow_timeout() -> u32 {15}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub enum NrcVersion {
    #[serde(rename = "version2")]
    Version2,
    /// needed for category based bandwidth reservation, not compatible with version2 pools
    #[serde(rename = "version3")]
    Version3,
    #[serde(rename = "unrecognized")]
    Unrecognized(String),
}

impl NrcVersion {
    pub fn from_platform_name(name: &str) -> Self {
        match serde_plain::from_str::<NrcVersion>(name) {
            Ok(NrcVersion::Unrecognized(_)) | Err(_) => NrcVersion::Unrecognized(name.to_string()),
            Ok(version) => version,
        }
    }

    pub fn platform_name(&self) -> Option<String> {
        match self {
            NrcVersion::Unrecognized(_) => None,
            known => serde_plain::to_string(known).ok(),
        }
    }
}

/// Network I/O control of a distributed switch.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub struct NetworkResourceControl {
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Setting::is_unset")]
    pub version: Setting<NrcVersion>,
    /// legacy user defined resource pools, version2 only
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub user_defined_pools: Vec<String>,
    /// bandwidth reserved for VM traffic, version3 only
    #[serde(default, skip_serializing_if = "Setting::is_unset")]
    pub vm_reservation_mbps: Setting<u64>,
}
