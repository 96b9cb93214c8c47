use std::fmt;
use std::fmt::Formatter;
use serde::{Deserialize, Serialize};
use crate::error::IdentityError;

/// Separates the host reference from the switch name in an encoded host-local identity.
/// Platform references are alphanumeric with dashes and colons so this never clashes with them.
pub const IDENTITY_DELIMITER: char = '|';

/// Opaque reference to a hypervisor host, i.e. "host-12".
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct HostRef(pub String);

/// Opaque managed object reference, i.e. "dvs-20".
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct MoRef(pub String);

impl fmt::Display for HostRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for MoRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of a switch resource. This is the only thing that outlives a reconcile cycle, it
/// is persisted by the caller as the string produced by `encode`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SwitchIdentity {
    HostScoped {
        host: HostRef,
        name: String,
    },
    DistributedRef {
        dvs: MoRef,
    },
}

impl SwitchIdentity {
    pub fn host_scoped(host: impl Into<String>, name: impl Into<String>) -> Self {
        SwitchIdentity::HostScoped { host: HostRef(host.into()), name: name.into() }
    }

    pub fn distributed(dvs: impl Into<String>) -> Self {
        SwitchIdentity::DistributedRef { dvs: MoRef(dvs.into()) }
    }

    pub fn encode(&self) -> Result<String, IdentityError> {
        match self {
            SwitchIdentity::HostScoped { host, name } => {
                for part in [&host.0, name] {
                    if part.contains(IDENTITY_DELIMITER) {
                        return Err(IdentityError::Encoding {
                            value: part.clone(),
                            delimiter: IDENTITY_DELIMITER,
                        });
                    }
                }
                Ok(format!("{}{IDENTITY_DELIMITER}{}", host.0, name))
            }
            SwitchIdentity::DistributedRef { dvs } => {
                // would decode as a host scoped identity otherwise
                if dvs.0.contains(IDENTITY_DELIMITER) {
                    return Err(IdentityError::Encoding {
                        value: dvs.0.clone(),
                        delimiter: IDENTITY_DELIMITER,
                    });
                }
                Ok(dvs.0.clone())
            }
        }
    }

    pub fn decode(encoded: &str) -> Result<Self, IdentityError> {
        if encoded.is_empty() {
            return Err(IdentityError::Malformed {
                encoded: encoded.to_string(),
                reason: "identity is empty".into(),
            });
        }
        let parts: Vec<&str> = encoded.split(IDENTITY_DELIMITER).collect();
        match parts.as_slice() {
            [dvs] => Ok(SwitchIdentity::distributed(*dvs)),
            [host, name] => {
                if host.is_empty() || name.is_empty() {
                    return Err(IdentityError::Malformed {
                        encoded: encoded.to_string(),
                        reason: "host reference and switch name must both be present".into(),
                    });
                }
                Ok(SwitchIdentity::host_scoped(*host, *name))
            }
            _ => Err(IdentityError::Malformed {
                encoded: encoded.to_string(),
                reason: format!("expected at most one '{IDENTITY_DELIMITER}', found {}", parts.len() - 1),
            }),
        }
    }
}

impl fmt::Display for SwitchIdentity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SwitchIdentity::HostScoped { host, name } => write!(f, "host switch {name} on {host}"),
            SwitchIdentity::DistributedRef { dvs } => write!(f, "distributed switch {dvs}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let ids = vec![
            SwitchIdentity::host_scoped("host-12", "vSwitchTest"),
            SwitchIdentity::host_scoped("urn:vmomi:HostSystem:host-12", "vSwitch 1"),
            SwitchIdentity::distributed("dvs-20"),
            SwitchIdentity::distributed("urn:vmomi:VmwareDistributedVirtualSwitch:dvs-20"),
        ];
        for id in ids {
            let encoded = id.encode().unwrap();
            assert_eq!(SwitchIdentity::decode(&encoded).unwrap(), id);
        }
    }

    #[test]
    fn test_encode_rejects_delimiter() {
        let id = SwitchIdentity::host_scoped("host-12", "bad|name");
        assert!(matches!(id.encode(), Err(IdentityError::Encoding { .. })));
        let id = SwitchIdentity::distributed("dvs|20");
        assert!(matches!(id.encode(), Err(IdentityError::Encoding { .. })));
    }

    #[test]
    fn test_decode_without_delimiter_is_distributed() {
        assert_eq!(SwitchIdentity::decode("dvs-20").unwrap(), SwitchIdentity::distributed("dvs-20"));
    }

    #[test]
    fn test_decode_malformed() {
        for bad in ["", "host-1|a|b", "|name", "host-1|"] {
            assert!(
                matches!(SwitchIdentity::decode(bad), Err(IdentityError::Malformed { .. })),
                "{bad} should be malformed"
            );
        }
    }
}
