use std::fmt;
use std::fmt::Formatter;
use std::path::{Path, PathBuf};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use crate::VSWITCH_SETTINGS_FOLDER;

/// Engine wide settings. Every remote call is bounded by `api_timeout_secs`, transient faults
/// can be retried by callers up to `transient_retry_attempts` times.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct EngineSettings {
    /// deadline for a single remote call
    #[serde(default = "default_api_timeout_secs")]
    pub api_timeout_secs: u64,
    /// attempts for a call that failed with a transient fault, including the first one
    #[serde(default = "default_transient_retry_attempts")]
    pub transient_retry_attempts: u32,
    /// first backoff delay, doubled on each further attempt
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            api_timeout_secs: default_api_timeout_secs(),
            transient_retry_attempts: default_transient_retry_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

fn default_api_timeout_secs() -> u64 {300}
fn default_transient_retry_attempts() -> u32 {3}
fn default_retry_backoff_ms() -> u64 {500}

impl fmt::Display for EngineSettings {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&serde_json::to_string_pretty(&self).map_err(|_| fmt::Error)?)
    }
}

impl EngineSettings {
    pub fn default_location() -> PathBuf {
        PathBuf::from(format!("{VSWITCH_SETTINGS_FOLDER}config/settings.json"))
    }

    pub async fn write<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let mut output = File::create(path).await?;
        output.write_all(format!("{self}").as_bytes()).await?;
        Ok(())
    }

    /// Read the settings file, a missing file means defaults.
    pub async fn read<P: AsRef<Path>>(path: P) -> anyhow::Result<EngineSettings> {
        let path = path.as_ref();
        tracing::trace!("expected settings json location: {:?}", path);
        if path.is_file() {
            let text = tokio::fs::read_to_string(path).await?;
            let settings: EngineSettings = serde_json::from_str(&text)
                .with_context(|| format!("parsing settings file {path:?}"))?;
            Ok(settings)
        } else {
            tracing::debug!("no settings file at {:?}, using defaults", path);
            Ok(EngineSettings::default())
        }
    }
}
