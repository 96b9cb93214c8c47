pub mod setting;
pub mod policy;
pub mod vlan;
pub mod distributed;

use std::collections::HashSet;
use std::fmt;
use std::fmt::Formatter;
use std::path::Path;
use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use crate::switch_yaml::distributed::*;
use crate::switch_yaml::policy::*;
use crate::switch_yaml::setting::Setting;
use crate::switch_yaml::vlan::VlanConfig;

/// The declarative switch file, a list of switches to reconcile.
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub switches: Vec<SwitchModel>,
}

impl Config {
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let text = tokio::fs::read_to_string(path).await.with_context(|| "Reading switch config file")?;
        let value: Self = serde_yaml::from_str(&text).with_context(|| "Parsing switch config YAML")?;
        value.check_unique_names()?;
        Ok(value)
    }

    pub async fn save_to<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let mut file = File::create(path).await?;
        let to_string = serde_yaml::to_string(&self)?;
        file.write_all(&to_string.into_bytes()).await?;
        Ok(())
    }

    /// Switch names are used as the key in the identity state file, so they must be unique
    /// per kind and host.
    fn check_unique_names(&self) -> anyhow::Result<()> {
        let mut seen = HashSet::new();
        for switch in &self.switches {
            if !seen.insert(switch.state_key()) {
                bail!("switch {} is declared more than once", switch.state_key());
            }
        }
        Ok(())
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&serde_yaml::to_string(&self).map_err(|_| fmt::Error)?)
    }
}

/// Desired state of one virtual switch.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SwitchModel {
    pub name: String,
    // flatten means the kind is given directly as `host_local:` or `distributed:`
    #[serde(flatten)]
    pub kind: SwitchKind,
    /// the uplink pool, physical adapters for host-local switches and uplink port names for
    /// distributed switches
    #[serde(default, skip_serializing_if = "Setting::is_unset")]
    pub uplinks: Setting<Vec<String>>,
    #[serde(default, skip_serializing_if = "Setting::is_unset")]
    pub uplink_order: Setting<UplinkSet>,
    #[serde(default)]
    pub teaming: TeamingPolicy,
    #[serde(default)]
    pub security: SecurityPolicy,
    #[serde(default, skip_serializing_if = "Setting::is_unset")]
    pub shaping: Setting<TrafficShapingPolicy>,
}

impl SwitchModel {
    pub fn new(name: impl Into<String>, kind: SwitchKind) -> Self {
        Self {
            name: name.into(),
            kind,
            uplinks: Setting::Unset,
            uplink_order: Setting::Unset,
            teaming: TeamingPolicy::default(),
            security: SecurityPolicy::default(),
            shaping: Setting::Unset,
        }
    }

    pub fn is_distributed(&self) -> bool {
        matches!(self.kind, SwitchKind::Distributed(_))
    }

    /// Key used to find this switch's identity in the state file.
    pub fn state_key(&self) -> String {
        match &self.kind {
            SwitchKind::HostLocal(host) => format!("{}/{}", host.host_system_id, self.name),
            SwitchKind::Distributed(_) => format!("dvs/{}", self.name),
        }
    }

    /// The model with every inherited policy resolved to what the platform would apply.
    pub fn with_platform_defaults(&self) -> SwitchModel {
        let mut model = self.clone();
        model.teaming = self.teaming.or(&TeamingPolicy::platform_defaults(&self.kind));
        model.security = self.security.or(&SecurityPolicy::platform_defaults(&self.kind));
        model
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SwitchKind {
    HostLocal(HostSwitchOptions),
    Distributed(DistributedSwitchOptions),
}

/// Settings only a switch scoped to one hypervisor host has.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub struct HostSwitchOptions {
    pub host_system_id: String,
    #[serde(default, skip_serializing_if = "Setting::is_unset")]
    pub mtu: Setting<u32>,
    #[serde(default, skip_serializing_if = "Setting::is_unset")]
    pub number_of_ports: Setting<u32>,
    /// beacon probing interval in seconds
    #[serde(default, skip_serializing_if = "Setting::is_unset")]
    pub beacon_interval: Setting<u32>,
}

/// Settings only a distributed switch has.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub struct DistributedSwitchOptions {
    #[serde(default)]
    pub hosts: HostMembership,
    #[serde(default, skip_serializing_if = "Setting::is_unset")]
    pub vlan: Setting<VlanConfig>,
    #[serde(default, skip_serializing_if = "Setting::is_unset")]
    pub netflow: Setting<NetFlowConfig>,
    #[serde(default, skip_serializing_if = "Setting::is_unset")]
    pub resource_control: Setting<NetworkResourceControl>,
    /// product version of the switch, i.e. "6.5.0"
    #[serde(default, skip_serializing_if = "Setting::is_unset")]
    pub version: Setting<String>,
    #[serde(default, skip_serializing_if = "Setting::is_unset")]
    pub max_mtu: Setting<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE: &str = r#"
switches:
  - name: vSwitchTest
    host_local:
      host_system_id: host-12
      mtu: 9000
    uplinks: [vmnic0, vmnic1]
    uplink_order:
      active: [vmnic0]
      standby: [vmnic1]
    teaming:
      policy: failover_explicit
      notify_switches: false
  - name: dvs-test
    distributed:
      hosts:
        host-12: [vmnic2]
        host-13: [vmnic2, vmnic3]
      vlan:
        trunk:
          - min_vlan: 1000
            max_vlan: 1999
    uplinks: [tfup1, tfup2]
"#;

    #[test]
    fn test_parse_example() {
        let config: Config = serde_yaml::from_str(EXAMPLE).unwrap();
        config.check_unique_names().unwrap();
        assert_eq!(config.switches.len(), 2);
        let host = &config.switches[0];
        assert!(!host.is_distributed());
        assert_eq!(host.teaming.policy, Setting::Override(TeamingMode::FailoverExplicit));
        assert_eq!(host.teaming.check_beacon, Setting::Unset);
        assert_eq!(host.teaming.notify_switches, Setting::Override(false));
        assert_eq!(host.state_key(), "host-12/vSwitchTest");
        match &host.kind {
            SwitchKind::HostLocal(opts) => {
                assert_eq!(opts.mtu, Setting::Override(9000));
                assert_eq!(opts.number_of_ports, Setting::Unset);
            }
            SwitchKind::Distributed(_) => panic!("expected host local switch"),
        }
        let dvs = &config.switches[1];
        assert!(dvs.is_distributed());
        match &dvs.kind {
            SwitchKind::Distributed(opts) => {
                assert_eq!(opts.hosts.iter().count(), 2);
                assert!(opts.vlan.is_override());
                assert!(opts.netflow.is_unset());
            }
            SwitchKind::HostLocal(_) => panic!("expected distributed switch"),
        }
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut config: Config = serde_yaml::from_str(EXAMPLE).unwrap();
        let dup = config.switches[1].clone();
        config.switches.push(dup);
        assert!(config.check_unique_names().is_err());
    }

    #[test]
    fn test_platform_defaults_fill_unset_only() {
        let config: Config = serde_yaml::from_str(EXAMPLE).unwrap();
        let effective = config.switches[0].with_platform_defaults();
        assert_eq!(effective.teaming.policy, Setting::Override(TeamingMode::FailoverExplicit));
        assert_eq!(effective.teaming.check_beacon, Setting::Override(false));
        assert_eq!(effective.security.allow_mac_changes, Setting::Override(true));
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let config: Config = serde_yaml::from_str(EXAMPLE).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("switches.yaml");
        config.save_to(&path).await.unwrap();
        let loaded = Config::load_from_file(&path).await.unwrap();
        assert_eq!(loaded.switches, config.switches);
    }
}
