//! A platform kept in memory and persisted as a JSON snapshot. It enforces the same checks the
//! management API does for the calls the reconciler makes, and can be told to fail or stall.

use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use std::time::Duration;
use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;
use crate::default_dvs_uplinks;
use crate::expand::parse_product_version;
use crate::faults::{FaultKind, RemoteFault};
use crate::identity::{HostRef, MoRef};
use crate::platform::SwitchPlatform;
use crate::vsphere::types::*;

pub const DEFAULT_PRODUCT_VERSION: &str = "7.0.0";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct PlatformState {
    /// physical NICs of each host, an empty inventory accepts any host and NIC
    #[serde(default)]
    pub hosts: BTreeMap<String, Vec<String>>,
    /// host reference -> switch name -> spec
    #[serde(default)]
    pub host_switches: BTreeMap<String, BTreeMap<String, HostVirtualSwitchSpec>>,
    /// keyed by managed object reference
    #[serde(default)]
    pub distributed_switches: BTreeMap<String, DvsConfigInfo>,
    #[serde(default)]
    pub next_dvs_id: u64,
    /// prefix of new distributed switch references, "dvs-" when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub moref_prefix: Option<String>,
}

/// What currently holds a physical NIC on a host.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PnicOwner {
    HostSwitch(String),
    Dvs(String),
}

impl PlatformState {
    fn check_host(&self, host: &str) -> Result<(), RemoteFault> {
        if !self.hosts.is_empty() && !self.hosts.contains_key(host) {
            return Err(RemoteFault::new(
                FaultKind::ManagedObjectNotFound { obj: host.to_string() },
                format!("host {host} is not part of the inventory"),
            ));
        }
        Ok(())
    }

    fn pnic_owner(&self, host: &str, device: &str) -> Option<PnicOwner> {
        let host_switch = self.host_switches.get(host).and_then(|switches| {
            switches.iter()
                .find(|(_, spec)| spec.bridge.as_ref().map_or(false, |b| b.nic_device.iter().any(|d| d == device)))
                .map(|(name, _)| PnicOwner::HostSwitch(name.clone()))
        });
        host_switch.or_else(|| {
            self.distributed_switches.iter()
                .find(|(_, info)| info.hosts.iter().any(|m| m.host == host && m.pnic_devices.iter().any(|d| d == device)))
                .map(|(moref, _)| PnicOwner::Dvs(moref.clone()))
        })
    }

    /// Each NIC must exist on the host and can back only one switch there.
    fn check_pnics(&self, host: &str, devices: &[String], claimant: &PnicOwner) -> Result<(), RemoteFault> {
        for device in devices {
            if let Some(pnics) = self.hosts.get(host) {
                if !pnics.contains(device) {
                    return Err(RemoteFault::new(
                        FaultKind::InvalidArgument { property: "pnicDevice".into() },
                        format!("host {host} has no physical NIC {device}"),
                    ));
                }
            }
            match self.pnic_owner(host, device) {
                Some(owner) if &owner != claimant => {
                    return Err(RemoteFault::new(
                        FaultKind::ResourceInUse,
                        format!("{device} on {host} is already used by {owner:?}"),
                    ));
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn check_member(&self, moref: &str, member: &DvsHostMember, uplinks: &[String]) -> Result<(), RemoteFault> {
        self.check_host(&member.host)?;
        if member.pnic_devices.len() > uplinks.len() {
            return Err(RemoteFault::new(
                FaultKind::InvalidArgument { property: "host.backing.pnicSpec".into() },
                format!("{} NICs for {} uplinks on {}", member.pnic_devices.len(), uplinks.len(), member.host),
            ));
        }
        self.check_pnics(&member.host, &member.pnic_devices, &PnicOwner::Dvs(moref.to_string()))
    }

    fn check_dvs(&self, moref: &str, info: &DvsConfigInfo) -> Result<(), RemoteFault> {
        if let Some(other) = self.distributed_switches.iter().find(|(m, i)| m.as_str() != moref && i.name == info.name) {
            return Err(RemoteFault::new(
                FaultKind::DuplicateName { name: info.name.clone() },
                format!("{} already uses the name", other.0),
            ));
        }
        let uplinks = info.config.uplink_port_name.clone().unwrap_or_default();
        let teaming = info.config.default_port_config.as_ref().and_then(|p| p.uplink_teaming_policy.as_ref());
        check_nic_order(teaming, &uplinks, "defaultPortConfig.uplinkTeamingPolicy.uplinkPortOrder")?;
        for member in &info.hosts {
            self.check_member(moref, member, &uplinks)?;
        }
        Ok(())
    }

    fn check_host_switch(&self, host: &str, name: &str, spec: &HostVirtualSwitchSpec) -> Result<(), RemoteFault> {
        self.check_host(host)?;
        let devices = spec.bridge.as_ref().map(|b| b.nic_device.clone()).unwrap_or_default();
        self.check_pnics(host, &devices, &PnicOwner::HostSwitch(name.to_string()))?;
        let teaming = spec.policy.as_ref().and_then(|p| p.nic_teaming.as_ref());
        check_nic_order(teaming, &devices, "policy.nicTeaming.nicOrder")
    }

    fn dvs(&self, dvs: &MoRef) -> Result<&DvsConfigInfo, RemoteFault> {
        self.distributed_switches.get(&dvs.0).ok_or_else(|| dvs_not_found(dvs))
    }
}

fn dvs_not_found(dvs: &MoRef) -> RemoteFault {
    RemoteFault::new(
        FaultKind::ManagedObjectNotFound { obj: dvs.0.clone() },
        format!("distributed switch {dvs} does not exist"),
    )
}

fn host_switch_not_found(host: &HostRef, name: &str) -> RemoteFault {
    RemoteFault::new(FaultKind::NotFound, format!("no virtual switch {name} on {host}"))
}

fn check_nic_order(teaming: Option<&NicTeamingPolicySpec>, uplinks: &[String], property: &str) -> Result<(), RemoteFault> {
    let Some(order) = teaming.and_then(|t| t.nic_order.as_ref()) else {
        return Ok(());
    };
    if let Some(unknown) = order.active_nic.iter().chain(order.standby_nic.iter()).find(|n| !uplinks.contains(n)) {
        return Err(RemoteFault::new(
            FaultKind::InvalidArgument { property: property.to_string() },
            format!("{unknown} is not one of {uplinks:?}"),
        ));
    }
    Ok(())
}

/// Overlay the fields present in a reconfigure spec, absent fields keep their value.
trait Merge {
    fn merge(&mut self, update: &Self);
}

fn merge_field<T: Clone>(target: &mut Option<T>, update: &Option<T>) {
    if let Some(value) = update {
        *target = Some(value.clone());
    }
}

fn merge_nested<T: Merge + Clone>(target: &mut Option<T>, update: &Option<T>) {
    match (target.as_mut(), update) {
        (Some(current), Some(update)) => current.merge(update),
        (None, Some(update)) => *target = Some(update.clone()),
        (_, None) => {}
    }
}

impl Merge for NicTeamingPolicySpec {
    fn merge(&mut self, update: &Self) {
        merge_field(&mut self.policy, &update.policy);
        merge_field(&mut self.notify_switches, &update.notify_switches);
        merge_field(&mut self.rolling_order, &update.rolling_order);
        merge_field(&mut self.failure_criteria, &update.failure_criteria);
        merge_field(&mut self.nic_order, &update.nic_order);
    }
}

impl Merge for SecurityPolicySpec {
    fn merge(&mut self, update: &Self) {
        merge_field(&mut self.allow_promiscuous, &update.allow_promiscuous);
        merge_field(&mut self.mac_changes, &update.mac_changes);
        merge_field(&mut self.forged_transmits, &update.forged_transmits);
    }
}

impl Merge for DvsPortSetting {
    fn merge(&mut self, update: &Self) {
        merge_field(&mut self.vlan, &update.vlan);
        merge_nested(&mut self.uplink_teaming_policy, &update.uplink_teaming_policy);
        merge_nested(&mut self.security_policy, &update.security_policy);
        merge_field(&mut self.in_shaping_policy, &update.in_shaping_policy);
        merge_field(&mut self.out_shaping_policy, &update.out_shaping_policy);
        merge_field(&mut self.ipfix_enabled, &update.ipfix_enabled);
    }
}

impl Merge for DvsConfigSpec {
    /// Members in `host` are applied separately.
    fn merge(&mut self, update: &Self) {
        merge_field(&mut self.name, &update.name);
        merge_field(&mut self.uplink_port_name, &update.uplink_port_name);
        merge_nested(&mut self.default_port_config, &update.default_port_config);
        merge_field(&mut self.ipfix_config, &update.ipfix_config);
        match update.switch_ip_address.as_deref() {
            Some(CLEARED_SWITCH_IP) => self.switch_ip_address = None,
            _ => merge_field(&mut self.switch_ip_address, &update.switch_ip_address),
        }
        merge_field(&mut self.network_resource_management_enabled, &update.network_resource_management_enabled);
        merge_field(&mut self.network_resource_control_version, &update.network_resource_control_version);
        merge_field(&mut self.network_resource_pools, &update.network_resource_pools);
        merge_field(&mut self.vm_vnic_reservation_mbps, &update.vm_vnic_reservation_mbps);
        merge_field(&mut self.max_mtu, &update.max_mtu);
    }
}

fn apply_member(info: &mut DvsConfigInfo, member: &DvsHostMemberConfigSpec) -> Result<(), RemoteFault> {
    let position = info.hosts.iter().position(|m| m.host == member.host);
    match (member.operation, position) {
        (MemberOperation::Add, None) => {
            info.hosts.push(DvsHostMember { host: member.host.clone(), pnic_devices: member.devices() });
        }
        (MemberOperation::Add, Some(_)) => {
            return Err(RemoteFault::new(
                FaultKind::AlreadyExists { name: member.host.clone() },
                format!("{} is already a member of {}", member.host, info.name),
            ));
        }
        (MemberOperation::Edit, Some(i)) => info.hosts[i].pnic_devices = member.devices(),
        (MemberOperation::Remove, Some(i)) => {
            info.hosts.remove(i);
        }
        (MemberOperation::Edit | MemberOperation::Remove, None) => {
            return Err(RemoteFault::new(
                FaultKind::NotFound,
                format!("{} is not a member of {}", member.host, info.name),
            ));
        }
    }
    Ok(())
}

/// One call made against the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub method: &'static str,
    pub target: String,
}

impl RecordedCall {
    pub fn is_mutation(&self) -> bool {
        !matches!(self.method, "host_switch" | "dvs_config")
    }
}

#[derive(Debug, Default)]
struct Inner {
    state: PlatformState,
    faults: VecDeque<(&'static str, RemoteFault)>,
    calls: Vec<RecordedCall>,
    latency: Duration,
}

#[derive(Debug, Default)]
pub struct InMemoryPlatform {
    inner: Mutex<Inner>,
}

impl InMemoryPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: PlatformState) -> Self {
        Self { inner: Mutex::new(Inner { state, ..Default::default() }) }
    }

    /// Load a snapshot, a missing file is an empty platform.
    pub async fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            tracing::warn!("platform state {path:?} does not exist, starting empty");
            return Ok(Self::new());
        }
        let text = tokio::fs::read_to_string(path).await
            .with_context(|| format!("reading platform state {path:?}"))?;
        let state: PlatformState = serde_json::from_str(&text)
            .with_context(|| format!("parsing platform state {path:?}"))?;
        Ok(Self::with_state(state))
    }

    pub async fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(&self.snapshot().await)?;
        tokio::fs::write(path.as_ref(), json).await
            .with_context(|| format!("writing platform state {:?}", path.as_ref()))?;
        Ok(())
    }

    pub async fn snapshot(&self) -> PlatformState {
        self.inner.lock().await.state.clone()
    }

    /// Register a host and its physical NICs in the inventory.
    pub async fn add_host(&self, host: impl Into<String>, pnics: Vec<String>) {
        self.inner.lock().await.state.hosts.insert(host.into(), pnics);
    }

    /// Make the next call to `method` fail with `fault` instead of running.
    pub async fn fail_next(&self, method: &'static str, fault: RemoteFault) {
        self.inner.lock().await.faults.push_back((method, fault));
    }

    /// Delay every call by `latency`.
    pub async fn set_latency(&self, latency: Duration) {
        self.inner.lock().await.latency = latency;
    }

    pub async fn calls(&self) -> Vec<RecordedCall> {
        self.inner.lock().await.calls.clone()
    }

    pub async fn mutations(&self) -> Vec<RecordedCall> {
        self.inner.lock().await.calls.iter()
            .filter(|c| c.is_mutation())
            .cloned()
            .collect()
    }

    pub async fn clear_calls(&self) {
        self.inner.lock().await.calls.clear();
    }

    /// Record the call, wait out any latency and hand back an injected fault.
    async fn begin(&self, method: &'static str, target: String, deadline: Instant) -> Result<(), RemoteFault> {
        let (fault, latency) = {
            let mut inner = self.inner.lock().await;
            inner.calls.push(RecordedCall { method, target });
            let fault = inner.faults.iter()
                .position(|(m, _)| *m == method)
                .and_then(|i| inner.faults.remove(i))
                .map(|(_, fault)| fault);
            (fault, inner.latency)
        };
        if !latency.is_zero() && tokio::time::timeout_at(deadline, tokio::time::sleep(latency)).await.is_err() {
            return Err(RemoteFault::new(FaultKind::Timedout, format!("{method} ran past its deadline")));
        }
        match fault {
            Some(fault) => Err(fault),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl SwitchPlatform for InMemoryPlatform {
    async fn host_switch(&self, host: &HostRef, name: &str, deadline: Instant) -> Result<HostVirtualSwitchSpec, RemoteFault> {
        self.begin("host_switch", format!("{host}/{name}"), deadline).await?;
        let inner = self.inner.lock().await;
        inner.state.host_switches.get(&host.0)
            .and_then(|switches| switches.get(name))
            .cloned()
            .ok_or_else(|| host_switch_not_found(host, name))
    }

    async fn add_host_switch(&self, host: &HostRef, name: &str, spec: &HostVirtualSwitchSpec, deadline: Instant) -> Result<(), RemoteFault> {
        self.begin("add_host_switch", format!("{host}/{name}"), deadline).await?;
        let mut inner = self.inner.lock().await;
        let state = &mut inner.state;
        if state.host_switches.get(&host.0).map_or(false, |s| s.contains_key(name)) {
            return Err(RemoteFault::new(
                FaultKind::AlreadyExists { name: name.to_string() },
                format!("{host} already has a virtual switch {name}"),
            ));
        }
        state.check_host_switch(&host.0, name, spec)?;
        state.host_switches.entry(host.0.clone()).or_default().insert(name.to_string(), spec.clone());
        Ok(())
    }

    async fn update_host_switch(&self, host: &HostRef, name: &str, spec: &HostVirtualSwitchSpec, deadline: Instant) -> Result<(), RemoteFault> {
        self.begin("update_host_switch", format!("{host}/{name}"), deadline).await?;
        let mut inner = self.inner.lock().await;
        let state = &mut inner.state;
        if !state.host_switches.get(&host.0).map_or(false, |s| s.contains_key(name)) {
            return Err(host_switch_not_found(host, name));
        }
        state.check_host_switch(&host.0, name, spec)?;
        state.host_switches.entry(host.0.clone()).or_default().insert(name.to_string(), spec.clone());
        Ok(())
    }

    async fn remove_host_switch(&self, host: &HostRef, name: &str, deadline: Instant) -> Result<(), RemoteFault> {
        self.begin("remove_host_switch", format!("{host}/{name}"), deadline).await?;
        let mut inner = self.inner.lock().await;
        inner.state.host_switches.get_mut(&host.0)
            .and_then(|switches| switches.remove(name))
            .map(|_| ())
            .ok_or_else(|| host_switch_not_found(host, name))
    }

    async fn dvs_config(&self, dvs: &MoRef, deadline: Instant) -> Result<DvsConfigInfo, RemoteFault> {
        self.begin("dvs_config", dvs.0.clone(), deadline).await?;
        let inner = self.inner.lock().await;
        inner.state.dvs(dvs).cloned()
    }

    async fn create_dvs(&self, spec: &DvsCreateSpec, deadline: Instant) -> Result<MoRef, RemoteFault> {
        let name = spec.config_spec.name.clone().unwrap_or_default();
        self.begin("create_dvs", name.clone(), deadline).await?;
        if name.is_empty() {
            return Err(RemoteFault::new(
                FaultKind::InvalidArgument { property: "configSpec.name".into() },
                "a distributed switch needs a name",
            ));
        }
        let mut inner = self.inner.lock().await;
        let state = &mut inner.state;
        let mut info = DvsConfigInfo::from(spec);
        if info.config.uplink_port_name.is_none() {
            info.config.uplink_port_name = Some(default_dvs_uplinks());
        }
        if info.product_version.is_none() {
            info.product_version = Some(DEFAULT_PRODUCT_VERSION.to_string());
        }
        let prefix = state.moref_prefix.as_deref().unwrap_or("dvs-");
        let moref = format!("{prefix}{}", state.next_dvs_id + 1);
        state.check_dvs(&moref, &info)?;
        state.next_dvs_id += 1;
        state.distributed_switches.insert(moref.clone(), info);
        Ok(MoRef(moref))
    }

    async fn reconfigure_dvs(&self, dvs: &MoRef, spec: &DvsConfigSpec, deadline: Instant) -> Result<(), RemoteFault> {
        self.begin("reconfigure_dvs", dvs.0.clone(), deadline).await?;
        let mut inner = self.inner.lock().await;
        let state = &mut inner.state;
        let mut info = state.dvs(dvs)?.clone();
        info.config.merge(spec);
        if let Some(name) = &spec.name {
            info.name = name.clone();
        }
        for member in &spec.host {
            apply_member(&mut info, member)?;
        }
        state.check_dvs(&dvs.0, &info)?;
        state.distributed_switches.insert(dvs.0.clone(), info);
        Ok(())
    }

    async fn add_dvs_host(&self, dvs: &MoRef, member: &DvsHostMemberConfigSpec, deadline: Instant) -> Result<(), RemoteFault> {
        self.begin("add_dvs_host", format!("{dvs}/{}", member.host), deadline).await?;
        let mut inner = self.inner.lock().await;
        let state = &mut inner.state;
        let mut info = state.dvs(dvs)?.clone();
        apply_member(&mut info, &DvsHostMemberConfigSpec { operation: MemberOperation::Add, ..member.clone() })?;
        state.check_dvs(&dvs.0, &info)?;
        state.distributed_switches.insert(dvs.0.clone(), info);
        Ok(())
    }

    async fn remove_dvs_host(&self, dvs: &MoRef, host: &HostRef, deadline: Instant) -> Result<(), RemoteFault> {
        self.begin("remove_dvs_host", format!("{dvs}/{host}"), deadline).await?;
        let mut inner = self.inner.lock().await;
        let state = &mut inner.state;
        let mut info = state.dvs(dvs)?.clone();
        let member = DvsHostMemberConfigSpec { operation: MemberOperation::Remove, host: host.0.clone(), backing: None };
        apply_member(&mut info, &member)?;
        state.distributed_switches.insert(dvs.0.clone(), info);
        Ok(())
    }

    async fn update_dvs_host_nics(&self, dvs: &MoRef, member: &DvsHostMemberConfigSpec, deadline: Instant) -> Result<(), RemoteFault> {
        self.begin("update_dvs_host_nics", format!("{dvs}/{}", member.host), deadline).await?;
        let mut inner = self.inner.lock().await;
        let state = &mut inner.state;
        let mut info = state.dvs(dvs)?.clone();
        apply_member(&mut info, &DvsHostMemberConfigSpec { operation: MemberOperation::Edit, ..member.clone() })?;
        state.check_dvs(&dvs.0, &info)?;
        state.distributed_switches.insert(dvs.0.clone(), info);
        Ok(())
    }

    async fn upgrade_dvs_version(&self, dvs: &MoRef, version: &str, deadline: Instant) -> Result<(), RemoteFault> {
        self.begin("upgrade_dvs_version", format!("{dvs}@{version}"), deadline).await?;
        let mut inner = self.inner.lock().await;
        let state = &mut inner.state;
        let info = state.distributed_switches.get_mut(&dvs.0).ok_or_else(|| dvs_not_found(dvs))?;
        let invalid = |reason: String| RemoteFault::new(FaultKind::InvalidArgument { property: "productSpec.version".into() }, reason);
        let target = parse_product_version(version).map_err(|e| invalid(e.reason))?;
        let current = info.product_version.as_deref().unwrap_or(DEFAULT_PRODUCT_VERSION);
        let current_parts = parse_product_version(current).map_err(|e| invalid(e.reason))?;
        if target < current_parts {
            return Err(invalid(format!("cannot downgrade {dvs} from {current} to {version}")));
        }
        info.product_version = Some(version.to_string());
        Ok(())
    }

    async fn destroy_dvs(&self, dvs: &MoRef, deadline: Instant) -> Result<(), RemoteFault> {
        self.begin("destroy_dvs", dvs.0.clone(), deadline).await?;
        let mut inner = self.inner.lock().await;
        inner.state.distributed_switches.remove(&dvs.0)
            .map(|_| ())
            .ok_or_else(|| dvs_not_found(dvs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expand::distributed::member_spec;
    use crate::faults::FaultClass;

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn far() -> Instant {
        Instant::now() + Duration::from_secs(60)
    }

    fn create_spec(name: &str) -> DvsCreateSpec {
        DvsCreateSpec {
            config_spec: DvsConfigSpec { name: Some(name.into()), ..Default::default() },
            product_version: None,
        }
    }

    #[tokio::test]
    async fn test_create_fills_platform_defaults() {
        let platform = InMemoryPlatform::new();
        let dvs = platform.create_dvs(&create_spec("dvs"), far()).await.unwrap();
        assert_eq!(dvs, MoRef("dvs-1".into()));
        let info = platform.dvs_config(&dvs, far()).await.unwrap();
        assert_eq!(info.config.uplink_port_name, Some(default_dvs_uplinks()));
        assert_eq!(info.product_version.as_deref(), Some(DEFAULT_PRODUCT_VERSION));
    }

    #[tokio::test]
    async fn test_duplicate_dvs_name_conflicts() {
        let platform = InMemoryPlatform::new();
        platform.create_dvs(&create_spec("dvs"), far()).await.unwrap();
        let fault = platform.create_dvs(&create_spec("dvs"), far()).await.unwrap_err();
        assert_eq!(fault.class(), FaultClass::Conflict);
    }

    #[tokio::test]
    async fn test_reconfigure_keeps_absent_fields() {
        let platform = InMemoryPlatform::new();
        let mut spec = create_spec("dvs");
        spec.config_spec.max_mtu = Some(9000);
        let dvs = platform.create_dvs(&spec, far()).await.unwrap();
        let update = DvsConfigSpec { switch_ip_address: Some("10.0.0.1".into()), ..Default::default() };
        platform.reconfigure_dvs(&dvs, &update, far()).await.unwrap();
        let info = platform.dvs_config(&dvs, far()).await.unwrap();
        assert_eq!(info.config.max_mtu, Some(9000));
        assert_eq!(info.config.switch_ip_address.as_deref(), Some("10.0.0.1"));
    }

    #[tokio::test]
    async fn test_nic_order_must_name_uplinks() {
        let platform = InMemoryPlatform::new();
        let dvs = platform.create_dvs(&create_spec("dvs"), far()).await.unwrap();
        let update = DvsConfigSpec {
            default_port_config: Some(DvsPortSetting {
                uplink_teaming_policy: Some(NicTeamingPolicySpec {
                    nic_order: Some(NicOrderPolicy { active_nic: names(&["uplink9"]), standby_nic: vec![] }),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        };
        let fault = platform.reconfigure_dvs(&dvs, &update, far()).await.unwrap_err();
        assert_eq!(fault.class(), FaultClass::Fatal);
    }

    #[tokio::test]
    async fn test_pnic_claimed_twice_on_host() {
        let platform = InMemoryPlatform::new();
        platform.add_host("host-12", names(&["vmnic0", "vmnic1"])).await;
        let a = platform.create_dvs(&create_spec("a"), far()).await.unwrap();
        let b = platform.create_dvs(&create_spec("b"), far()).await.unwrap();
        let member = member_spec("host-12", &names(&["vmnic1"]), MemberOperation::Add);
        platform.add_dvs_host(&a, &member, far()).await.unwrap();
        let fault = platform.add_dvs_host(&b, &member, far()).await.unwrap_err();
        assert_eq!(fault.kind, FaultKind::ResourceInUse);
        let unknown = member_spec("host-99", &names(&["vmnic1"]), MemberOperation::Add);
        let fault = platform.add_dvs_host(&b, &unknown, far()).await.unwrap_err();
        assert_eq!(fault.class(), FaultClass::NotFound);
    }

    #[tokio::test]
    async fn test_host_switch_lifecycle() {
        let platform = InMemoryPlatform::new();
        let host = HostRef("host-12".into());
        let spec = HostVirtualSwitchSpec { mtu: Some(1500), ..Default::default() };
        platform.add_host_switch(&host, "vSwitch1", &spec, far()).await.unwrap();
        assert_eq!(
            platform.add_host_switch(&host, "vSwitch1", &spec, far()).await.unwrap_err().class(),
            FaultClass::Conflict
        );
        assert_eq!(platform.host_switch(&host, "vSwitch1", far()).await.unwrap(), spec);
        platform.remove_host_switch(&host, "vSwitch1", far()).await.unwrap();
        assert_eq!(
            platform.host_switch(&host, "vSwitch1", far()).await.unwrap_err().class(),
            FaultClass::NotFound
        );
    }

    #[tokio::test]
    async fn test_injected_fault_and_latency() {
        let platform = InMemoryPlatform::new();
        platform.fail_next("dvs_config", RemoteFault::new(FaultKind::HostCommunication, "host unreachable")).await;
        let fault = platform.dvs_config(&MoRef("dvs-1".into()), far()).await.unwrap_err();
        assert_eq!(fault.kind, FaultKind::HostCommunication);
        // the injected fault is used once
        let fault = platform.dvs_config(&MoRef("dvs-1".into()), far()).await.unwrap_err();
        assert_eq!(fault.class(), FaultClass::NotFound);

        platform.set_latency(Duration::from_secs(5)).await;
        let soon = Instant::now() + Duration::from_millis(10);
        let fault = platform.dvs_config(&MoRef("dvs-1".into()), soon).await.unwrap_err();
        assert_eq!(fault.kind, FaultKind::Timedout);
        assert_eq!(platform.calls().await.len(), 3);
        assert!(platform.mutations().await.is_empty());
    }

    #[tokio::test]
    async fn test_version_downgrade_refused() {
        let platform = InMemoryPlatform::new();
        let mut spec = create_spec("dvs");
        spec.product_version = Some("6.5.0".into());
        let dvs = platform.create_dvs(&spec, far()).await.unwrap();
        platform.upgrade_dvs_version(&dvs, "7.0.0", far()).await.unwrap();
        assert!(platform.upgrade_dvs_version(&dvs, "6.6.0", far()).await.is_err());
    }

    #[tokio::test]
    async fn test_snapshot_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("platform.json");
        let platform = InMemoryPlatform::new();
        platform.create_dvs(&create_spec("dvs"), far()).await.unwrap();
        platform.save(&path).await.unwrap();

        let loaded = InMemoryPlatform::load(&path).await.unwrap();
        assert_eq!(loaded.snapshot().await, platform.snapshot().await);
        let empty = InMemoryPlatform::load(dir.path().join("missing.json")).await.unwrap();
        assert_eq!(empty.snapshot().await, PlatformState::default());
    }
}
