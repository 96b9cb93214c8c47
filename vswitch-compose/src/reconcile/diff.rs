use std::fmt;
use std::fmt::Formatter;
use serde::Serialize;
use vswitch_compose_schemas::switch_yaml::distributed::{HostMembership, NetworkResourceControl};
use vswitch_compose_schemas::switch_yaml::policy::TrafficShapingPolicy;
use vswitch_compose_schemas::switch_yaml::setting::Setting;
use vswitch_compose_schemas::switch_yaml::vlan::VlanConfig;
use vswitch_compose_schemas::switch_yaml::{DistributedSwitchOptions, HostSwitchOptions, SwitchKind, SwitchModel};

/// One field that differs between the current and the desired switch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChange {
    pub field: String,
    pub current: String,
    pub desired: String,
}

impl fmt::Display for FieldChange {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} -> {}", self.field, self.current, self.desired)
    }
}

impl FieldChange {
    fn new(field: impl Into<String>, current: String, desired: String) -> Self {
        Self { field: field.into(), current, desired }
    }
}

fn render<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "<unprintable>".to_string())
}

fn render_setting<T: Serialize>(value: &Setting<T>) -> String {
    match value.as_option() {
        None => "inherited".to_string(),
        Some(value) => render(value),
    }
}

/// The switch as it will be once the desired model is applied. Anything the desired model
/// leaves unset keeps its current value, and membership always comes from the desired model.
pub fn overlay(desired: &SwitchModel, current: &SwitchModel) -> SwitchModel {
    let kind = match (&desired.kind, &current.kind) {
        (SwitchKind::HostLocal(d), SwitchKind::HostLocal(c)) => SwitchKind::HostLocal(HostSwitchOptions {
            host_system_id: d.host_system_id.clone(),
            mtu: d.mtu.or(&c.mtu),
            number_of_ports: d.number_of_ports.or(&c.number_of_ports),
            beacon_interval: d.beacon_interval.or(&c.beacon_interval),
        }),
        (SwitchKind::Distributed(d), SwitchKind::Distributed(c)) => SwitchKind::Distributed(DistributedSwitchOptions {
            hosts: d.hosts.clone(),
            vlan: d.vlan.or(&c.vlan),
            netflow: d.netflow.or(&c.netflow),
            resource_control: match (&d.resource_control, &c.resource_control) {
                (Setting::Override(d), Setting::Override(c)) => Setting::Override(NetworkResourceControl {
                    enabled: d.enabled,
                    version: d.version.or(&c.version),
                    user_defined_pools: d.user_defined_pools.clone(),
                    vm_reservation_mbps: d.vm_reservation_mbps.or(&c.vm_reservation_mbps),
                }),
                (d, c) => d.or(c),
            },
            version: d.version.or(&c.version),
            max_mtu: d.max_mtu.or(&c.max_mtu),
        }),
        (kind, _) => kind.clone(),
    };
    let shaping = match (&desired.shaping, &current.shaping) {
        (Setting::Override(d), Setting::Override(c)) => Setting::Override(TrafficShapingPolicy {
            ingress: d.ingress.or(&c.ingress),
            egress: d.egress.or(&c.egress),
        }),
        (d, c) => d.or(c),
    };

    let uplinks = desired.uplinks.or(&current.uplinks);
    let mut uplink_order = desired.uplink_order.or(&current.uplink_order);
    // a new pool with no declared order keeps the current order minus the dropped uplinks
    if desired.uplink_order.is_unset() && desired.uplinks.is_override() && desired.uplinks != current.uplinks {
        if let (Setting::Override(order), Setting::Override(pool)) = (&current.uplink_order, &uplinks) {
            let rederived = order.rederive(pool);
            if &rederived != order {
                tracing::debug!("uplink pool of {} changed, failover order becomes {rederived:?}", desired.name);
            }
            uplink_order = Setting::Override(rederived);
        }
    }

    SwitchModel {
        name: desired.name.clone(),
        kind,
        uplinks,
        uplink_order,
        teaming: desired.teaming.or(&current.teaming),
        security: desired.security.or(&current.security),
        shaping,
    }
}

fn compare<T: PartialEq + Serialize>(changes: &mut Vec<FieldChange>, field: &str, current: &Setting<T>, merged: &Setting<T>) {
    if current != merged {
        changes.push(FieldChange::new(field, render_setting(current), render_setting(merged)));
    }
}

/// Field differences between `merged` (from `overlay`) and `current`, other than host
/// membership and product version which are planned as their own operations.
pub fn diff_fields(merged: &SwitchModel, current: &SwitchModel) -> Vec<FieldChange> {
    let mut changes = Vec::new();
    if merged.name != current.name {
        changes.push(FieldChange::new("name", render(&current.name), render(&merged.name)));
    }
    compare(&mut changes, "uplinks", &current.uplinks, &merged.uplinks);
    compare(&mut changes, "uplink_order", &current.uplink_order, &merged.uplink_order);
    compare(&mut changes, "teaming.policy", &current.teaming.policy, &merged.teaming.policy);
    compare(&mut changes, "teaming.check_beacon", &current.teaming.check_beacon, &merged.teaming.check_beacon);
    compare(&mut changes, "teaming.notify_switches", &current.teaming.notify_switches, &merged.teaming.notify_switches);
    compare(&mut changes, "teaming.failback", &current.teaming.failback, &merged.teaming.failback);
    compare(&mut changes, "security.allow_promiscuous", &current.security.allow_promiscuous, &merged.security.allow_promiscuous);
    compare(&mut changes, "security.allow_forged_transmits", &current.security.allow_forged_transmits, &merged.security.allow_forged_transmits);
    compare(&mut changes, "security.allow_mac_changes", &current.security.allow_mac_changes, &merged.security.allow_mac_changes);
    compare(&mut changes, "shaping", &current.shaping, &merged.shaping);

    match (&merged.kind, &current.kind) {
        (SwitchKind::HostLocal(m), SwitchKind::HostLocal(c)) => {
            compare(&mut changes, "host_local.mtu", &c.mtu, &m.mtu);
            compare(&mut changes, "host_local.number_of_ports", &c.number_of_ports, &m.number_of_ports);
            compare(&mut changes, "host_local.beacon_interval", &c.beacon_interval, &m.beacon_interval);
        }
        (SwitchKind::Distributed(m), SwitchKind::Distributed(c)) => {
            compare(&mut changes, "distributed.vlan", &normalized_vlan(&c.vlan), &normalized_vlan(&m.vlan));
            compare(&mut changes, "distributed.netflow", &c.netflow, &m.netflow);
            compare(&mut changes, "distributed.resource_control", &c.resource_control, &m.resource_control);
            compare(&mut changes, "distributed.max_mtu", &c.max_mtu, &m.max_mtu);
        }
        _ => changes.push(FieldChange::new("kind", kind_name(&current.kind).into(), kind_name(&merged.kind).into())),
    }
    changes
}

/// Trunk ranges are compared in their merged form.
fn normalized_vlan(vlan: &Setting<VlanConfig>) -> Setting<VlanConfig> {
    vlan.as_option().map(VlanConfig::normalized).into()
}

fn kind_name(kind: &SwitchKind) -> &'static str {
    match kind {
        SwitchKind::HostLocal(_) => "host_local",
        SwitchKind::Distributed(_) => "distributed",
    }
}

/// Hosts to remove, hosts whose NICs change and hosts to add, each sorted by host reference.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MembershipDiff {
    pub removed: Vec<String>,
    pub changed: Vec<(String, Vec<String>)>,
    pub added: Vec<(String, Vec<String>)>,
}

impl MembershipDiff {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.changed.is_empty() && self.added.is_empty()
    }

    pub fn changes(&self, current: &HostMembership) -> Vec<FieldChange> {
        let field = |host: &str| format!("distributed.hosts.{host}");
        let removed = self.removed.iter().map(|host| {
            let devices = current.devices(host).cloned().unwrap_or_default();
            FieldChange::new(field(host), render(&devices), "absent".to_string())
        });
        let changed = self.changed.iter().map(|(host, devices)| {
            let before = current.devices(host).cloned().unwrap_or_default();
            FieldChange::new(field(host), render(&before), render(devices))
        });
        let added = self.added.iter()
            .map(|(host, devices)| FieldChange::new(field(host), "absent".to_string(), render(devices)));
        removed.chain(changed).chain(added).collect()
    }
}

pub fn diff_membership(desired: &HostMembership, current: &HostMembership) -> MembershipDiff {
    let mut diff = MembershipDiff::default();
    for (host, _) in current.iter() {
        if desired.devices(host).is_none() {
            diff.removed.push(host.clone());
        }
    }
    for (host, devices) in desired.iter() {
        match current.devices(host) {
            None => diff.added.push((host.clone(), devices.clone())),
            Some(current_devices) if current_devices != devices => diff.changed.push((host.clone(), devices.clone())),
            Some(_) => {}
        }
    }
    diff
}
