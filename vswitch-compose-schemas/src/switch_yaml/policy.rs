use serde::{Deserialize, Serialize};
use crate::switch_yaml::setting::Setting;
use crate::switch_yaml::SwitchKind;

/// Load balancing/failover algorithm used by a switch's NIC team. The names match what the
/// platform puts on the wire so they can be rendered with `serde_plain`.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq, Hash)]
pub enum TeamingMode {
    #[serde(rename = "loadbalance_srcid")]
    LoadbalanceSrcId,
    #[serde(rename = "loadbalance_srcmac")]
    LoadbalanceSrcMac,
    #[serde(rename = "loadbalance_ip")]
    LoadbalanceIp,
    #[serde(rename = "failover_explicit")]
    FailoverExplicit,
    /// only available on distributed switches
    #[serde(rename = "loadbalance_loadbased")]
    LoadbalanceLoadBased,
    /// a mode reported by a newer platform that this crate does not know about
    #[serde(rename = "unrecognized")]
    Unrecognized(String),
}

impl TeamingMode {
    /// Parse a platform policy name, anything unknown is carried through as `Unrecognized`
    /// rather than failing the read.
    pub fn from_platform_name(name: &str) -> Self {
        match serde_plain::from_str::<TeamingMode>(name) {
            Ok(TeamingMode::Unrecognized(_)) | Err(_) => TeamingMode::Unrecognized(name.to_string()),
            Ok(mode) => mode,
        }
    }

    /// The platform name for this mode, `None` for `Unrecognized` as those can only be read.
    pub fn platform_name(&self) -> Option<String> {
        match self {
            TeamingMode::Unrecognized(_) => None,
            known => serde_plain::to_string(known).ok(),
        }
    }
}

/// NIC teaming settings. Every field can be inherited independently.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub struct TeamingPolicy {
    #[serde(default, skip_serializing_if = "Setting::is_unset")]
    pub policy: Setting<TeamingMode>,
    #[serde(default, skip_serializing_if = "Setting::is_unset")]
    pub check_beacon: Setting<bool>,
    #[serde(default, skip_serializing_if = "Setting::is_unset")]
    pub notify_switches: Setting<bool>,
    /// return traffic to an active uplink once it recovers (the platform stores the inverse,
    /// "rolling order")
    #[serde(default, skip_serializing_if = "Setting::is_unset")]
    pub failback: Setting<bool>,
}

impl TeamingPolicy {
    pub fn any_override(&self) -> bool {
        self.policy.is_override()
            || self.check_beacon.is_override()
            || self.notify_switches.is_override()
            || self.failback.is_override()
    }

    /// What the platform applies when nothing is declared for a switch of this kind.
    pub fn platform_defaults(kind: &SwitchKind) -> Self {
        match kind {
            SwitchKind::HostLocal(_) | SwitchKind::Distributed(_) => Self {
                policy: Setting::Override(TeamingMode::LoadbalanceSrcId),
                check_beacon: Setting::Override(false),
                notify_switches: Setting::Override(true),
                failback: Setting::Override(true),
            },
        }
    }

    pub fn or(&self, fallback: &TeamingPolicy) -> TeamingPolicy {
        TeamingPolicy {
            policy: self.policy.or(&fallback.policy),
            check_beacon: self.check_beacon.or(&fallback.check_beacon),
            notify_switches: self.notify_switches.or(&fallback.notify_switches),
            failback: self.failback.or(&fallback.failback),
        }
    }
}

/// Layer 2 security settings.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub struct SecurityPolicy {
    #[serde(default, skip_serializing_if = "Setting::is_unset")]
    pub allow_promiscuous: Setting<bool>,
    #[serde(default, skip_serializing_if = "Setting::is_unset")]
    pub allow_forged_transmits: Setting<bool>,
    #[serde(default, skip_serializing_if = "Setting::is_unset")]
    pub allow_mac_changes: Setting<bool>,
}

impl SecurityPolicy {
    pub fn any_override(&self) -> bool {
        self.allow_promiscuous.is_override()
            || self.allow_forged_transmits.is_override()
            || self.allow_mac_changes.is_override()
    }

    /// Host-local switches accept forged transmits and MAC changes by default, distributed
    /// switches reject everything.
    pub fn platform_defaults(kind: &SwitchKind) -> Self {
        match kind {
            SwitchKind::HostLocal(_) => Self {
                allow_promiscuous: Setting::Override(false),
                allow_forged_transmits: Setting::Override(true),
                allow_mac_changes: Setting::Override(true),
            },
            SwitchKind::Distributed(_) => Self {
                allow_promiscuous: Setting::Override(false),
                allow_forged_transmits: Setting::Override(false),
                allow_mac_changes: Setting::Override(false),
            },
        }
    }

    pub fn or(&self, fallback: &SecurityPolicy) -> SecurityPolicy {
        SecurityPolicy {
            allow_promiscuous: self.allow_promiscuous.or(&fallback.allow_promiscuous),
            allow_forged_transmits: self.allow_forged_transmits.or(&fallback.allow_forged_transmits),
            allow_mac_changes: self.allow_mac_changes.or(&fallback.allow_mac_changes),
        }
    }
}

/// Active and standby uplinks in failover precedence order. Anything in the declared uplink
/// pool but in neither list is unused.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub struct UplinkSet {
    #[serde(default)]
    pub active: Vec<String>,
    #[serde(default)]
    pub standby: Vec<String>,
}

impl UplinkSet {
    pub fn new(active: Vec<String>, standby: Vec<String>) -> Self {
        Self { active, standby }
    }

    /// Names listed in both active and standby.
    pub fn overlap(&self) -> Vec<&String> {
        self.active.iter()
            .filter(|a| self.standby.contains(a))
            .collect()
    }

    /// Names listed that are not part of `pool`.
    pub fn outside_of<'a>(&'a self, pool: &[String]) -> Vec<&'a String> {
        self.active.iter()
            .chain(self.standby.iter())
            .filter(|n| !pool.contains(n))
            .collect()
    }

    /// Keep only the names still in `pool`. If nothing active is left, every remaining pool
    /// member that is not standby becomes active.
    pub fn rederive(&self, pool: &[String]) -> UplinkSet {
        let active: Vec<String> = self.active.iter()
            .filter(|n| pool.contains(n))
            .cloned()
            .collect();
        let standby: Vec<String> = self.standby.iter()
            .filter(|n| pool.contains(n))
            .cloned()
            .collect();
        if active.is_empty() {
            let active = pool.iter()
                .filter(|n| !standby.contains(n))
                .cloned()
                .collect();
            return UplinkSet { active, standby };
        }
        UplinkSet { active, standby }
    }
}

/// Bandwidth limits for one traffic direction. Bandwidth in bits per second, burst in bytes.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ShapingParams {
    pub enabled: bool,
    #[serde(default)]
    pub average_bandwidth: u64,
    #[serde(default)]
    pub peak_bandwidth: u64,
    #[serde(default)]
    pub burst_size: u64,
}

/// Traffic shaping, ingress and egress are independent. Host-local switches only shape egress.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub struct TrafficShapingPolicy {
    #[serde(default, skip_serializing_if = "Setting::is_unset")]
    pub ingress: Setting<ShapingParams>,
    #[serde(default, skip_serializing_if = "Setting::is_unset")]
    pub egress: Setting<ShapingParams>,
}

impl TrafficShapingPolicy {
    pub fn any_override(&self) -> bool {
        self.ingress.is_override() || self.egress.is_override()
    }
}
