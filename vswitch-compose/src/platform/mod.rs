pub mod memory;

use std::future::Future;
use std::time::Duration;
use async_trait::async_trait;
use tokio::time::Instant;
use vswitch_compose_schemas::settings::EngineSettings;
use crate::error::RemoteError;
use crate::faults::{retry_transient, FaultKind, RemoteFault, RetryPolicy};
use crate::identity::{HostRef, MoRef};
use crate::vsphere::types::{DvsConfigInfo, DvsConfigSpec, DvsCreateSpec, DvsHostMemberConfigSpec, HostVirtualSwitchSpec};

pub use memory::InMemoryPlatform;

/// The management API calls the reconciler needs. Every call is given the instant it must
/// finish by and reports failures as a structured fault.
///
/// Host-local switches can only be replaced whole. Distributed switches are reconfigured with a
/// partial spec where absent fields stay as they are, and their host membership is changed one
/// host at a time.
#[async_trait]
pub trait SwitchPlatform: Send + Sync {
    async fn host_switch(&self, host: &HostRef, name: &str, deadline: Instant) -> Result<HostVirtualSwitchSpec, RemoteFault>;

    async fn add_host_switch(&self, host: &HostRef, name: &str, spec: &HostVirtualSwitchSpec, deadline: Instant) -> Result<(), RemoteFault>;

    async fn update_host_switch(&self, host: &HostRef, name: &str, spec: &HostVirtualSwitchSpec, deadline: Instant) -> Result<(), RemoteFault>;

    async fn remove_host_switch(&self, host: &HostRef, name: &str, deadline: Instant) -> Result<(), RemoteFault>;

    async fn dvs_config(&self, dvs: &MoRef, deadline: Instant) -> Result<DvsConfigInfo, RemoteFault>;

    /// Create a distributed switch, the platform decides where it lives and returns its reference.
    async fn create_dvs(&self, spec: &DvsCreateSpec, deadline: Instant) -> Result<MoRef, RemoteFault>;

    async fn reconfigure_dvs(&self, dvs: &MoRef, spec: &DvsConfigSpec, deadline: Instant) -> Result<(), RemoteFault>;

    async fn add_dvs_host(&self, dvs: &MoRef, member: &DvsHostMemberConfigSpec, deadline: Instant) -> Result<(), RemoteFault>;

    async fn remove_dvs_host(&self, dvs: &MoRef, host: &HostRef, deadline: Instant) -> Result<(), RemoteFault>;

    async fn update_dvs_host_nics(&self, dvs: &MoRef, member: &DvsHostMemberConfigSpec, deadline: Instant) -> Result<(), RemoteFault>;

    async fn upgrade_dvs_version(&self, dvs: &MoRef, version: &str, deadline: Instant) -> Result<(), RemoteFault>;

    async fn destroy_dvs(&self, dvs: &MoRef, deadline: Instant) -> Result<(), RemoteFault>;
}

/// Per cycle parameters, passed into every reconciler entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileContext {
    /// how long a single remote call may take
    pub api_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for ReconcileContext {
    fn default() -> Self {
        Self::from(&EngineSettings::default())
    }
}

impl From<&EngineSettings> for ReconcileContext {
    fn from(settings: &EngineSettings) -> Self {
        Self {
            api_timeout: Duration::from_secs(settings.api_timeout_secs),
            retry: RetryPolicy::from(settings),
        }
    }
}

impl ReconcileContext {
    pub fn new(api_timeout: Duration, retry: RetryPolicy) -> Self {
        Self { api_timeout, retry }
    }

    /// Run one remote call with a fresh deadline. A call still running at the deadline is
    /// dropped and reported as timed out.
    pub async fn call<T, F, Fut>(&self, operation: &str, f: F) -> Result<T, RemoteFault>
        where
            F: FnOnce(Instant) -> Fut,
            Fut: Future<Output = Result<T, RemoteFault>>,
    {
        let deadline = Instant::now() + self.api_timeout;
        match tokio::time::timeout_at(deadline, f(deadline)).await {
            Ok(result) => result,
            Err(_) => Err(RemoteFault::new(
                FaultKind::Timedout,
                format!("{operation} did not complete within {:?}", self.api_timeout),
            )),
        }
    }

    /// Run a read, retrying transient faults. Mutations go through `call` and are never
    /// retried here.
    pub async fn read<T, F, Fut>(&self, operation: &str, f: F) -> Result<T, RemoteError>
        where
            F: Fn(Instant) -> Fut,
            Fut: Future<Output = Result<T, RemoteFault>>,
    {
        let f = &f;
        retry_transient(&self.retry, operation, move || self.call(operation, f)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::faults::FaultClass;

    #[tokio::test]
    async fn test_deadline_is_transient() {
        let ctx = ReconcileContext::new(Duration::from_millis(10), RetryPolicy::default());
        let result: Result<(), RemoteFault> = ctx.call("read host-12|vSwitch1", |_| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<(), RemoteFault>(())
        }).await;
        let fault = result.unwrap_err();
        assert_eq!(fault.kind, FaultKind::Timedout);
        assert_eq!(fault.class(), FaultClass::Transient);
    }

    #[tokio::test]
    async fn test_deadline_passed_to_call() {
        let ctx = ReconcileContext::new(Duration::from_secs(30), RetryPolicy::default());
        let before = Instant::now();
        let deadline = ctx.call("op", |deadline| async move { Ok::<_, RemoteFault>(deadline) }).await.unwrap();
        assert!(deadline >= before + Duration::from_secs(30));
    }

    #[test]
    fn test_context_from_settings() {
        let settings = EngineSettings { api_timeout_secs: 12, transient_retry_attempts: 5, retry_backoff_ms: 10 };
        let ctx = ReconcileContext::from(&settings);
        assert_eq!(ctx.api_timeout, Duration::from_secs(12));
        assert_eq!(ctx.retry.max_attempts, 5);
    }
}
