use std::fmt;
use std::fmt::Formatter;
use vswitch_compose_schemas::switch_yaml::setting::Setting;
use vswitch_compose_schemas::switch_yaml::{DistributedSwitchOptions, SwitchKind, SwitchModel};
use crate::default_dvs_uplinks;
use crate::error::ValidationError;
use crate::expand::distributed::{expand_reconfigure, member_spec};
use crate::expand::{expand_host, parse_product_version};
use crate::identity::{HostRef, MoRef, SwitchIdentity};
use crate::reconcile::diff::{diff_fields, diff_membership, overlay, FieldChange};
use crate::vsphere::types::{DvsConfigSpec, DvsHostMemberConfigSpec, HostVirtualSwitchSpec, MemberOperation, CLEARED_SWITCH_IP};

/// A single remote mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannedOperation {
    ReplaceHostSwitchSpec {
        host: HostRef,
        name: String,
        spec: HostVirtualSwitchSpec,
    },
    RemoveDvsHost {
        dvs: MoRef,
        host: HostRef,
    },
    UpdateDvsHostNics {
        dvs: MoRef,
        member: DvsHostMemberConfigSpec,
    },
    AddDvsHost {
        dvs: MoRef,
        member: DvsHostMemberConfigSpec,
    },
    UpgradeDvsVersion {
        dvs: MoRef,
        version: String,
    },
    ReconfigureDvs {
        dvs: MoRef,
        spec: DvsConfigSpec,
    },
}

impl PlannedOperation {
    pub fn is_membership(&self) -> bool {
        matches!(
            self,
            PlannedOperation::RemoveDvsHost { .. }
                | PlannedOperation::UpdateDvsHostNics { .. }
                | PlannedOperation::AddDvsHost { .. }
        )
    }
}

impl fmt::Display for PlannedOperation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            PlannedOperation::ReplaceHostSwitchSpec { host, name, .. } => write!(f, "replace spec of {name} on {host}"),
            PlannedOperation::RemoveDvsHost { dvs, host } => write!(f, "remove host {host} from {dvs}"),
            PlannedOperation::UpdateDvsHostNics { dvs, member } => {
                write!(f, "set NICs of host {} on {dvs} to {:?}", member.host, member.devices())
            }
            PlannedOperation::AddDvsHost { dvs, member } => {
                write!(f, "add host {} to {dvs} with {:?}", member.host, member.devices())
            }
            PlannedOperation::UpgradeDvsVersion { dvs, version } => write!(f, "upgrade {dvs} to version {version}"),
            PlannedOperation::ReconfigureDvs { dvs, .. } => write!(f, "reconfigure {dvs}"),
        }
    }
}

/// What an update cycle will do. An empty plan means the switch already matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilePlan {
    pub identity: SwitchIdentity,
    pub changes: Vec<FieldChange>,
    pub operations: Vec<PlannedOperation>,
}

impl ReconcilePlan {
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

impl fmt::Display for ReconcilePlan {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "{}: up to date", self.identity);
        }
        writeln!(f, "{}: {} change(s)", self.identity, self.changes.len())?;
        for change in &self.changes {
            writeln!(f, "  ~ {change}")?;
        }
        for (i, operation) in self.operations.iter().enumerate() {
            writeln!(f, "  {}. {operation}", i + 1)?;
        }
        Ok(())
    }
}

/// Work out the operations that take `current` to `desired`. Pure, the caller has already read
/// `current` from the platform.
///
/// A host-local switch gets at most one whole-spec replace. A distributed switch gets one call
/// per host whose membership changed (removals, NIC changes, then additions), then a version
/// upgrade, then one reconfigure for everything else, so the reconfigure sees the final host set.
pub fn plan_update(identity: &SwitchIdentity, desired: &SwitchModel, current: &SwitchModel) -> Result<ReconcilePlan, ValidationError> {
    match (identity, &desired.kind, &current.kind) {
        (SwitchIdentity::HostScoped { host, name }, SwitchKind::HostLocal(options), SwitchKind::HostLocal(_)) => {
            if options.host_system_id != host.0 || desired.name != *name {
                return Err(ValidationError::new(
                    "name",
                    format!("{identity} cannot become {}/{}, host-local switches are replaced not moved", options.host_system_id, desired.name),
                ));
            }
            let merged = overlay(desired, current);
            let changes = diff_fields(&merged, current);
            let mut operations = Vec::new();
            if !changes.is_empty() {
                operations.push(PlannedOperation::ReplaceHostSwitchSpec {
                    host: host.clone(),
                    name: name.clone(),
                    spec: expand_host(&merged)?,
                });
            }
            Ok(ReconcilePlan { identity: identity.clone(), changes, operations })
        }
        (SwitchIdentity::DistributedRef { dvs }, SwitchKind::Distributed(desired_options), SwitchKind::Distributed(current_options)) => {
            plan_distributed(identity, dvs, desired, desired_options, current, current_options)
        }
        _ => Err(ValidationError::new(
            "kind",
            format!("declared switch {} does not match the kind of {identity}", desired.name),
        )),
    }
}

fn plan_distributed(
    identity: &SwitchIdentity,
    dvs: &MoRef,
    desired: &SwitchModel,
    desired_options: &DistributedSwitchOptions,
    current: &SwitchModel,
    current_options: &DistributedSwitchOptions,
) -> Result<ReconcilePlan, ValidationError> {
    let merged = overlay(desired, current);
    let pool = merged.uplinks.as_option().cloned().unwrap_or_else(default_dvs_uplinks);

    // the reconfigure carries what was declared plus a rederived order if the pool moved
    let mut declared = desired.clone();
    if desired.uplink_order.is_unset() && merged.uplink_order != current.uplink_order {
        declared.uplink_order = merged.uplink_order.clone();
    }
    let mut reconfigure = expand_reconfigure(&declared, &pool)?;
    if let SwitchKind::Distributed(merged_options) = &merged.kind {
        clear_dropped(&mut reconfigure, merged_options, current_options);
    }

    let field_changes = diff_fields(&merged, current);
    let membership = diff_membership(&desired_options.hosts, &current_options.hosts);
    // membership runs before the reconfigure, so it sees the pool the switch has now
    let current_pool = current.uplinks.as_option().cloned().unwrap_or_else(default_dvs_uplinks);
    for (host, devices) in membership.changed.iter().chain(&membership.added) {
        if devices.len() > current_pool.len() {
            return Err(ValidationError::new(
                format!("distributed.hosts.{host}"),
                format!(
                    "{} devices but {} has {} uplinks until it is reconfigured, grow the uplink pool first",
                    devices.len(), dvs, current_pool.len(),
                ),
            ));
        }
    }
    let mut changes = membership.changes(&current_options.hosts);
    let mut operations = Vec::new();

    for host in &membership.removed {
        operations.push(PlannedOperation::RemoveDvsHost { dvs: dvs.clone(), host: HostRef(host.clone()) });
    }
    for (host, devices) in &membership.changed {
        operations.push(PlannedOperation::UpdateDvsHostNics {
            dvs: dvs.clone(),
            member: member_spec(host, devices, MemberOperation::Edit),
        });
    }
    for (host, devices) in &membership.added {
        operations.push(PlannedOperation::AddDvsHost {
            dvs: dvs.clone(),
            member: member_spec(host, devices, MemberOperation::Add),
        });
    }

    if let Some(upgrade) = version_upgrade(&desired_options.version, &current_options.version)? {
        changes.push(FieldChange {
            field: "distributed.version".to_string(),
            current: current_options.version.as_option().cloned().unwrap_or_else(|| "unknown".to_string()),
            desired: upgrade.clone(),
        });
        operations.push(PlannedOperation::UpgradeDvsVersion { dvs: dvs.clone(), version: upgrade });
    }

    if !field_changes.is_empty() {
        operations.push(PlannedOperation::ReconfigureDvs { dvs: dvs.clone(), spec: reconfigure });
    }
    changes.extend(field_changes);
    Ok(ReconcilePlan { identity: identity.clone(), changes, operations })
}

/// A reconfigure leaves absent fields alone, so values the declared model drops have to be
/// cleared explicitly.
fn clear_dropped(spec: &mut DvsConfigSpec, merged: &DistributedSwitchOptions, current: &DistributedSwitchOptions) {
    let has_switch_ip = |options: &DistributedSwitchOptions| {
        options.netflow.as_option().is_some_and(|n| n.switch_ip_address.is_some())
    };
    if !has_switch_ip(merged) && has_switch_ip(current) {
        spec.switch_ip_address = Some(CLEARED_SWITCH_IP.to_string());
    }

    let has_pools = |options: &DistributedSwitchOptions| {
        options.resource_control.as_option().is_some_and(|rc| !rc.user_defined_pools.is_empty())
    };
    if merged.resource_control.is_override() && !has_pools(merged) && has_pools(current) {
        spec.network_resource_pools = Some(Vec::new());
    }
}

/// The version to upgrade to, if any. Going backwards is refused.
fn version_upgrade(desired: &Setting<String>, current: &Setting<String>) -> Result<Option<String>, ValidationError> {
    let (Setting::Override(desired), Setting::Override(current)) = (desired, current) else {
        return Ok(None);
    };
    let wanted = parse_product_version(desired)?;
    let have = parse_product_version(current)
        .map_err(|e| ValidationError::new("distributed.version", format!("platform reports {}", e.reason)))?;
    if wanted > have {
        Ok(Some(desired.clone()))
    } else if wanted < have {
        Err(ValidationError::new(
            "distributed.version",
            format!("cannot downgrade from {current} to {desired}"),
        ))
    } else {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use super::*;
    use vswitch_compose_schemas::switch_yaml::distributed::{HostMembership, NetFlowConfig, NetworkResourceControl, NrcVersion};
    use vswitch_compose_schemas::switch_yaml::policy::{TeamingMode, UplinkSet};
    use vswitch_compose_schemas::switch_yaml::vlan::{VlanConfig, VlanRange};
    use vswitch_compose_schemas::switch_yaml::HostSwitchOptions;
    use crate::expand::expand_distributed;
    use crate::flatten::{flatten_distributed, flatten_host};
    use crate::vsphere::types::DvsConfigInfo;

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn host_model() -> SwitchModel {
        let mut model = SwitchModel::new("vSwitch1", SwitchKind::HostLocal(HostSwitchOptions {
            host_system_id: "host-12".into(),
            mtu: Setting::Override(1500),
            ..Default::default()
        }));
        model.uplinks = Setting::Override(names(&["vmnic0", "vmnic1"]));
        model.uplink_order = Setting::Override(UplinkSet::new(names(&["vmnic0"]), names(&["vmnic1"])));
        model
    }

    fn host_id() -> SwitchIdentity {
        SwitchIdentity::host_scoped("host-12", "vSwitch1")
    }

    /// What the platform reports after creating `model`.
    fn dvs_current(model: &SwitchModel) -> SwitchModel {
        let mut info = DvsConfigInfo::from(&expand_distributed(model).unwrap());
        info.config.uplink_port_name.get_or_insert_with(default_dvs_uplinks);
        info.product_version.get_or_insert_with(|| "7.0.0".to_string());
        flatten_distributed(&info)
    }

    fn dvs_model(hosts: &[(&str, &[&str])]) -> SwitchModel {
        let mut membership = HostMembership::default();
        for (host, devices) in hosts {
            membership.insert(*host, names(devices));
        }
        let ranges: BTreeSet<_> = vec![VlanRange::new(1000, 1999)].into_iter().collect();
        SwitchModel::new("terraform-test-dvs", SwitchKind::Distributed(DistributedSwitchOptions {
            hosts: membership,
            vlan: Setting::Override(VlanConfig::Trunk(ranges)),
            ..Default::default()
        }))
    }

    fn options_mut(model: &mut SwitchModel) -> &mut DistributedSwitchOptions {
        match &mut model.kind {
            SwitchKind::Distributed(options) => options,
            SwitchKind::HostLocal(_) => unreachable!(),
        }
    }

    fn dvs_id() -> SwitchIdentity {
        SwitchIdentity::distributed("dvs-1")
    }

    #[test]
    fn test_host_unchanged_is_empty() {
        let desired = host_model();
        let current = flatten_host(&HostRef("host-12".into()), "vSwitch1", &expand_host(&desired).unwrap());
        let plan = plan_update(&host_id(), &desired, &current).unwrap();
        assert!(plan.is_empty());
        assert!(plan.changes.is_empty());
    }

    #[test]
    fn test_host_change_replaces_whole_spec() {
        let current = flatten_host(&HostRef("host-12".into()), "vSwitch1", &expand_host(&host_model()).unwrap());
        // only the mtu is declared, the rest must survive the replace
        let mut desired = SwitchModel::new("vSwitch1", SwitchKind::HostLocal(HostSwitchOptions {
            host_system_id: "host-12".into(),
            mtu: Setting::Override(9000),
            ..Default::default()
        }));
        desired.teaming.policy = Setting::Override(TeamingMode::FailoverExplicit);
        let plan = plan_update(&host_id(), &desired, &current).unwrap();
        assert_eq!(plan.operations.len(), 1);
        match &plan.operations[0] {
            PlannedOperation::ReplaceHostSwitchSpec { spec, .. } => {
                assert_eq!(spec.mtu, Some(9000));
                assert_eq!(spec.bridge.as_ref().unwrap().nic_device, names(&["vmnic0", "vmnic1"]));
                let teaming = spec.policy.as_ref().unwrap().nic_teaming.as_ref().unwrap();
                assert_eq!(teaming.nic_order.as_ref().unwrap().standby_nic, names(&["vmnic1"]));
                assert_eq!(teaming.policy.as_deref(), Some("failover_explicit"));
            }
            other => panic!("unexpected operation {other}"),
        }
        assert_eq!(plan.changes.len(), 2);
    }

    #[test]
    fn test_host_rename_refused() {
        let current = flatten_host(&HostRef("host-12".into()), "vSwitch1", &expand_host(&host_model()).unwrap());
        let mut desired = host_model();
        desired.name = "vSwitch2".into();
        assert!(plan_update(&host_id(), &desired, &current).is_err());
    }

    #[test]
    fn test_dvs_unchanged_is_empty() {
        let desired = dvs_model(&[("host-1", &["vmnic1"]), ("host-2", &["vmnic1"])]);
        let current = dvs_current(&desired);
        assert!(plan_update(&dvs_id(), &desired, &current).unwrap().is_empty());
    }

    #[test]
    fn test_adding_one_host_is_one_call() {
        let before = dvs_model(&[("host-1", &["vmnic1"]), ("host-2", &["vmnic1"])]);
        let current = dvs_current(&before);
        let desired = dvs_model(&[("host-1", &["vmnic1"]), ("host-2", &["vmnic1"]), ("host-3", &["vmnic2"])]);
        let plan = plan_update(&dvs_id(), &desired, &current).unwrap();
        assert_eq!(plan.operations.len(), 1);
        match &plan.operations[0] {
            PlannedOperation::AddDvsHost { member, .. } => {
                assert_eq!(member.host, "host-3");
                assert_eq!(member.devices(), names(&["vmnic2"]));
            }
            other => panic!("unexpected operation {other}"),
        }
        assert!(!plan.operations.iter().any(|op| matches!(op, PlannedOperation::ReconfigureDvs { .. })));
    }

    #[test]
    fn test_membership_before_reconfigure() {
        let before = dvs_model(&[("host-1", &["vmnic1"]), ("host-2", &["vmnic1"])]);
        let current = dvs_current(&before);
        let mut desired = dvs_model(&[("host-2", &["vmnic1", "vmnic2"]), ("host-3", &["vmnic2"])]);
        options_mut(&mut desired).vlan = Setting::Override(VlanConfig::Single(100));
        let plan = plan_update(&dvs_id(), &desired, &current).unwrap();
        let kinds: Vec<String> = plan.operations.iter().map(|op| op.to_string()).collect();
        assert_eq!(kinds, vec![
            "remove host host-1 from dvs-1".to_string(),
            "set NICs of host host-2 on dvs-1 to [\"vmnic1\", \"vmnic2\"]".to_string(),
            "add host host-3 to dvs-1 with [\"vmnic2\"]".to_string(),
            "reconfigure dvs-1".to_string(),
        ]);
        match plan.operations.last() {
            Some(PlannedOperation::ReconfigureDvs { spec, .. }) => assert!(spec.host.is_empty()),
            other => panic!("unexpected operation {other:?}"),
        }
    }

    #[test]
    fn test_trunk_declared_unmerged_is_unchanged() {
        let mut desired = dvs_model(&[]);
        let overlapping: BTreeSet<_> = vec![VlanRange::new(1000, 1500), VlanRange::new(1400, 1999)].into_iter().collect();
        options_mut(&mut desired).vlan = Setting::Override(VlanConfig::Trunk(overlapping));
        let current = dvs_current(&dvs_model(&[]));
        assert!(plan_update(&dvs_id(), &desired, &current).unwrap().is_empty());
    }

    #[test]
    fn test_version_upgrade_and_downgrade() {
        let current = dvs_current(&dvs_model(&[]));
        let mut desired = dvs_model(&[]);
        options_mut(&mut desired).version = Setting::Override("7.0.3".into());
        let plan = plan_update(&dvs_id(), &desired, &current).unwrap();
        assert_eq!(plan.operations, vec![PlannedOperation::UpgradeDvsVersion {
            dvs: MoRef("dvs-1".into()),
            version: "7.0.3".into(),
        }]);

        options_mut(&mut desired).version = Setting::Override("6.5.0".into());
        let err = plan_update(&dvs_id(), &desired, &current).unwrap_err();
        assert_eq!(err.field, "distributed.version");
    }

    #[test]
    fn test_pool_change_rederives_order() {
        let mut before = dvs_model(&[]);
        before.uplink_order = Setting::Override(UplinkSet::new(names(&["uplink1", "uplink2"]), names(&["uplink3"])));
        let current = dvs_current(&before);
        let mut desired = dvs_model(&[]);
        desired.uplinks = Setting::Override(names(&["uplink1", "uplink2"]));
        let plan = plan_update(&dvs_id(), &desired, &current).unwrap();
        match plan.operations.as_slice() {
            [PlannedOperation::ReconfigureDvs { spec, .. }] => {
                assert_eq!(spec.uplink_port_name, Some(names(&["uplink1", "uplink2"])));
                let order = spec.default_port_config.as_ref().unwrap()
                    .uplink_teaming_policy.as_ref().unwrap()
                    .nic_order.as_ref().unwrap();
                assert_eq!(order.active_nic, names(&["uplink1", "uplink2"]));
                assert!(order.standby_nic.is_empty());
            }
            other => panic!("unexpected plan {other:?}"),
        }
    }

    #[test]
    fn test_order_checked_against_current_pool() {
        let mut before = dvs_model(&[]);
        before.uplinks = Setting::Override(names(&["tfup1", "tfup2"]));
        let current = dvs_current(&before);
        let mut desired = dvs_model(&[]);
        desired.uplink_order = Setting::Override(UplinkSet::new(names(&["uplink1"]), vec![]));
        assert_eq!(plan_update(&dvs_id(), &desired, &current).unwrap_err().field, "uplink_order");
    }

    #[test]
    fn test_nics_cannot_outgrow_current_pool() {
        let mut before = dvs_model(&[("host-1", &["vmnic1"])]);
        before.uplinks = Setting::Override(names(&["u1"]));
        let current = dvs_current(&before);
        let mut desired = dvs_model(&[("host-1", &["vmnic1", "vmnic2"])]);
        desired.uplinks = Setting::Override(names(&["u1", "u2"]));
        let err = plan_update(&dvs_id(), &desired, &current).unwrap_err();
        assert_eq!(err.field, "distributed.hosts.host-1");
        assert!(err.reason.contains("grow the uplink pool first"));

        // growing the pool on its own is fine, the NICs can follow in the next run
        let mut grow = before.clone();
        grow.uplinks = Setting::Override(names(&["u1", "u2"]));
        let plan = plan_update(&dvs_id(), &grow, &current).unwrap();
        assert_eq!(plan.operations.len(), 1);
    }

    #[test]
    fn test_dropped_switch_ip_is_cleared() {
        let mut before = dvs_model(&[]);
        options_mut(&mut before).netflow = Setting::Override(NetFlowConfig {
            switch_ip_address: Some("10.0.0.100".into()),
            ..Default::default()
        });
        let current = dvs_current(&before);
        let mut desired = dvs_model(&[]);
        options_mut(&mut desired).netflow = Setting::Override(NetFlowConfig::default());
        let plan = plan_update(&dvs_id(), &desired, &current).unwrap();
        match plan.operations.as_slice() {
            [PlannedOperation::ReconfigureDvs { spec, .. }] => {
                assert_eq!(spec.switch_ip_address.as_deref(), Some(CLEARED_SWITCH_IP));
            }
            other => panic!("unexpected plan {other:?}"),
        }

        // leaving netflow undeclared keeps the address
        let plan = plan_update(&dvs_id(), &dvs_model(&[]), &current).unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn test_dropped_pools_are_cleared() {
        let control = |pools: &[&str]| NetworkResourceControl {
            enabled: true,
            version: Setting::Override(NrcVersion::Version2),
            user_defined_pools: names(pools),
            vm_reservation_mbps: Setting::Unset,
        };
        let mut before = dvs_model(&[]);
        options_mut(&mut before).resource_control = Setting::Override(control(&["pool-1"]));
        let current = dvs_current(&before);
        let mut desired = dvs_model(&[]);
        options_mut(&mut desired).resource_control = Setting::Override(control(&[]));
        let plan = plan_update(&dvs_id(), &desired, &current).unwrap();
        match plan.operations.as_slice() {
            [PlannedOperation::ReconfigureDvs { spec, .. }] => {
                assert_eq!(spec.network_resource_pools, Some(vec![]));
            }
            other => panic!("unexpected plan {other:?}"),
        }
    }

    #[test]
    fn test_kind_mismatch() {
        let current = dvs_current(&dvs_model(&[]));
        assert_eq!(plan_update(&host_id(), &dvs_model(&[]), &current).unwrap_err().field, "kind");
    }
}
