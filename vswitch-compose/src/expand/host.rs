use vswitch_compose_schemas::switch_yaml::setting::Setting;
use vswitch_compose_schemas::switch_yaml::{HostSwitchOptions, SwitchKind, SwitchModel};
use crate::error::ValidationError;
use crate::expand::{check_uplink_order, security_spec, shaping_spec, teaming_spec, validate};
use crate::vsphere::types::{HostBondBridge, HostNetworkPolicy, HostVirtualSwitchSpec};

pub(crate) fn validate_host(_model: &SwitchModel, options: &HostSwitchOptions) -> Result<(), ValidationError> {
    if options.host_system_id.trim().is_empty() {
        return Err(ValidationError::new("host_local.host_system_id", "must not be empty"));
    }
    if let Setting::Override(0) = options.mtu {
        return Err(ValidationError::new("host_local.mtu", "must be positive"));
    }
    if let Setting::Override(0) = options.number_of_ports {
        return Err(ValidationError::new("host_local.number_of_ports", "must be positive"));
    }
    Ok(())
}

/// Build the whole-switch spec for a host-local switch. The bridge is only present when the
/// uplink pool is declared, so an undeclared pool leaves the switch without a bond.
pub fn expand_host(model: &SwitchModel) -> Result<HostVirtualSwitchSpec, ValidationError> {
    validate(model)?;
    let options = match &model.kind {
        SwitchKind::HostLocal(options) => options,
        SwitchKind::Distributed(_) => {
            return Err(ValidationError::new("kind", format!("{} is not a host-local switch", model.name)));
        }
    };
    let pool: &[String] = model.uplinks.as_option().map(Vec::as_slice).unwrap_or(&[]);
    if let Setting::Override(order) = &model.uplink_order {
        check_uplink_order(order, pool)?;
    }
    if options.beacon_interval.is_override() && model.uplinks.is_unset() {
        return Err(ValidationError::new("host_local.beacon_interval", "needs the uplinks the beacon probes"));
    }

    let bridge = model.uplinks.as_option().map(|uplinks| HostBondBridge {
        nic_device: uplinks.clone(),
        beacon_interval: options.beacon_interval.as_option().copied(),
    });
    let policy = HostNetworkPolicy {
        security: security_spec(&model.security),
        nic_teaming: teaming_spec(&model.teaming, &model.uplink_order),
        shaping_policy: model.shaping.as_option()
            .and_then(|shaping| shaping.egress.as_option())
            .map(shaping_spec),
    };
    let has_policy = policy.security.is_some() || policy.nic_teaming.is_some() || policy.shaping_policy.is_some();

    Ok(HostVirtualSwitchSpec {
        num_ports: options.number_of_ports.as_option().copied(),
        mtu: options.mtu.as_option().copied(),
        bridge,
        policy: has_policy.then_some(policy),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use vswitch_compose_schemas::switch_yaml::policy::{SecurityPolicy, TeamingMode, UplinkSet};

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn model() -> SwitchModel {
        SwitchModel::new("vSwitchTerraformTest", SwitchKind::HostLocal(HostSwitchOptions {
            host_system_id: "host-12".into(),
            ..Default::default()
        }))
    }

    #[test]
    fn test_precedence_and_order() {
        let mut model = model();
        model.uplinks = Setting::Override(names(&["tfup1", "tfup2"]));
        model.uplink_order = Setting::Override(UplinkSet::new(names(&["tfup1"]), names(&["tfup2"])));
        let spec = expand_host(&model).unwrap();

        assert_eq!(spec.bridge.unwrap().nic_device, names(&["tfup1", "tfup2"]));
        let teaming = spec.policy.unwrap().nic_teaming.unwrap();
        let order = teaming.nic_order.unwrap();
        assert_eq!(order.active_nic, names(&["tfup1"]));
        assert_eq!(order.standby_nic, names(&["tfup2"]));
        // nothing else about teaming was declared
        assert!(teaming.policy.is_none());
        assert!(teaming.failure_criteria.is_none());
    }

    #[test]
    fn test_bare_switch_has_no_sub_objects() {
        let spec = expand_host(&model()).unwrap();
        assert_eq!(spec, HostVirtualSwitchSpec::default());
    }

    #[test]
    fn test_overrides_are_carried() {
        let mut model = model();
        if let SwitchKind::HostLocal(options) = &mut model.kind {
            options.mtu = Setting::Override(9000);
            options.number_of_ports = Setting::Override(128);
        }
        model.teaming.policy = Setting::Override(TeamingMode::FailoverExplicit);
        model.teaming.check_beacon = Setting::Override(true);
        model.security = SecurityPolicy {
            allow_promiscuous: Setting::Override(true),
            ..Default::default()
        };
        let spec = expand_host(&model).unwrap();
        assert_eq!(spec.mtu, Some(9000));
        assert_eq!(spec.num_ports, Some(128));
        let policy = spec.policy.unwrap();
        let teaming = policy.nic_teaming.unwrap();
        assert_eq!(teaming.policy.as_deref(), Some("failover_explicit"));
        assert_eq!(teaming.failure_criteria.unwrap().check_beacon, Some(true));
        let security = policy.security.unwrap();
        assert_eq!(security.allow_promiscuous, Some(true));
        assert_eq!(security.forged_transmits, None);
    }

    #[test]
    fn test_beacon_interval_needs_bridge() {
        let mut model = model();
        if let SwitchKind::HostLocal(options) = &mut model.kind {
            options.beacon_interval = Setting::Override(1);
        }
        assert!(expand_host(&model).is_err());
        model.uplinks = Setting::Override(names(&["vmnic0"]));
        assert_eq!(expand_host(&model).unwrap().bridge.unwrap().beacon_interval, Some(1));
    }

    #[test]
    fn test_distributed_model_rejected() {
        let model = SwitchModel::new("dvs", SwitchKind::Distributed(Default::default()));
        assert_eq!(expand_host(&model).unwrap_err().field, "kind");
    }
}
