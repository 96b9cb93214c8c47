use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Formatter;
use std::path::Path;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use vswitch_compose_lib::SwitchIdentity;

/// Encoded switch identities from earlier runs, keyed by the switch's state key. The engine
/// only ever sees the decoded identity.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct IdentityState {
    pub last_updated: String,
    #[serde(default)]
    pub switches: BTreeMap<String, String>,
}

impl IdentityState {
    pub async fn read<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            tracing::debug!("no state file at {:?}, nothing has been created yet", path);
            return Ok(Self::default());
        }
        let text = tokio::fs::read_to_string(path).await
            .with_context(|| format!("reading state file {path:?}"))?;
        let state: Self = serde_json::from_str(&text)
            .with_context(|| format!("parsing state file {path:?}"))?;
        Ok(state)
    }

    pub async fn write<P: AsRef<Path>>(&mut self, path: P) -> anyhow::Result<()> {
        self.last_updated = format!("{:?}", chrono::offset::Local::now());
        let mut output = File::create(path).await?;
        output.write_all(format!("{self}").as_bytes()).await?;
        Ok(())
    }

    pub fn get(&self, key: &str) -> anyhow::Result<Option<SwitchIdentity>> {
        self.switches.get(key)
            .map(|encoded| SwitchIdentity::decode(encoded))
            .transpose()
            .with_context(|| format!("state entry for {key}"))
    }

    pub fn insert(&mut self, key: impl Into<String>, identity: &SwitchIdentity) -> anyhow::Result<()> {
        let encoded = identity.encode()?;
        self.switches.insert(key.into(), encoded);
        Ok(())
    }

    pub fn remove(&mut self, key: &str) {
        self.switches.remove(key);
    }

    /// Every recorded identity, decoded.
    pub fn identities(&self) -> anyhow::Result<Vec<(String, SwitchIdentity)>> {
        self.switches.iter()
            .map(|(key, encoded)| -> anyhow::Result<(String, SwitchIdentity)> {
                let identity = SwitchIdentity::decode(encoded).with_context(|| format!("state entry for {key}"))?;
                Ok((key.clone(), identity))
            })
            .collect()
    }
}

impl fmt::Display for IdentityState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&serde_json::to_string_pretty(&self).map_err(|_| fmt::Error)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_state_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vswitch-compose-state.json");
        let mut state = IdentityState::read(&path).await.unwrap();
        assert!(state.switches.is_empty());

        state.insert("host-12/vSwitch1", &SwitchIdentity::host_scoped("host-12", "vSwitch1")).unwrap();
        state.insert("dvs/terraform-test-dvs", &SwitchIdentity::distributed("dvs-1")).unwrap();
        state.write(&path).await.unwrap();

        let loaded = IdentityState::read(&path).await.unwrap();
        assert_eq!(loaded.switches.get("host-12/vSwitch1").unwrap(), "host-12|vSwitch1");
        assert_eq!(loaded.get("dvs/terraform-test-dvs").unwrap(), Some(SwitchIdentity::distributed("dvs-1")));
        assert_eq!(loaded.identities().unwrap().len(), 2);
    }

    #[test]
    fn test_corrupt_entry_is_an_error() {
        let mut state = IdentityState::default();
        state.switches.insert("bad".into(), "a|b|c".into());
        assert!(state.get("bad").is_err());
        assert!(state.get("missing").unwrap().is_none());
    }
}
