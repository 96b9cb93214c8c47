use chrono::{DateTime, Utc};
use tokio::time::Instant;
use crate::error::ApplyError;
use crate::faults::{FaultClass, RemoteFault};
use crate::platform::{ReconcileContext, SwitchPlatform};
use crate::reconcile::plan::{PlannedOperation, ReconcilePlan};

/// Outcome of a fully applied plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyReport {
    pub identity: String,
    pub applied: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ApplyReport {
    pub fn is_noop(&self) -> bool {
        self.applied.is_empty()
    }
}

async fn execute<P: SwitchPlatform + ?Sized>(platform: &P, operation: &PlannedOperation, deadline: Instant) -> Result<(), RemoteFault> {
    match operation {
        PlannedOperation::ReplaceHostSwitchSpec { host, name, spec } => platform.update_host_switch(host, name, spec, deadline).await,
        PlannedOperation::RemoveDvsHost { dvs, host } => {
            match platform.remove_dvs_host(dvs, host, deadline).await {
                Err(fault) if fault.class() == FaultClass::NotFound => {
                    tracing::warn!("host {host} had already left {dvs}: {fault}");
                    Ok(())
                }
                other => other,
            }
        }
        PlannedOperation::UpdateDvsHostNics { dvs, member } => platform.update_dvs_host_nics(dvs, member, deadline).await,
        PlannedOperation::AddDvsHost { dvs, member } => platform.add_dvs_host(dvs, member, deadline).await,
        PlannedOperation::UpgradeDvsVersion { dvs, version } => platform.upgrade_dvs_version(dvs, version, deadline).await,
        PlannedOperation::ReconfigureDvs { dvs, spec } => platform.reconfigure_dvs(dvs, spec, deadline).await,
    }
}

/// Run the plan in order, one call at a time. The first failure stops the cycle, what already
/// ran stays applied and is named in the error along with what was skipped.
pub async fn apply_plan<P: SwitchPlatform + ?Sized>(platform: &P, ctx: &ReconcileContext, plan: &ReconcilePlan) -> Result<ApplyReport, ApplyError> {
    let started_at = Utc::now();
    let mut applied = Vec::with_capacity(plan.operations.len());
    for (i, operation) in plan.operations.iter().enumerate() {
        let description = operation.to_string();
        tracing::info!("{}: {description}", plan.identity);
        if let Err(fault) = ctx.call(&description, |deadline| execute(platform, operation, deadline)).await {
            tracing::error!("{}: {description} failed: {fault}", plan.identity);
            return Err(ApplyError {
                failed: description,
                applied,
                skipped: plan.operations[i + 1..].iter().map(|op| op.to_string()).collect(),
                fault,
            });
        }
        applied.push(description);
    }
    Ok(ApplyReport {
        identity: plan.identity.to_string(),
        applied,
        started_at,
        finished_at: Utc::now(),
    })
}
