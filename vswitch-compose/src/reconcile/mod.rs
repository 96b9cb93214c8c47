//! The update cycle for one switch: read the current state, diff it against the declared
//! model, plan the remote operations and apply them in order.

pub mod diff;
pub mod plan;
pub mod apply;

use std::fmt;
use std::fmt::Formatter;
use futures_util::future::join_all;
use vswitch_compose_schemas::switch_yaml::{SwitchKind, SwitchModel};
use crate::error::{RemoteError, SwitchError};
use crate::expand::{expand_distributed, expand_host, validate};
use crate::faults::FaultClass;
use crate::flatten::{flatten_distributed, flatten_host};
use crate::identity::{HostRef, SwitchIdentity};
use crate::platform::{ReconcileContext, SwitchPlatform};

pub use apply::{apply_plan, ApplyReport};
pub use diff::FieldChange;
pub use plan::{plan_update, PlannedOperation, ReconcilePlan};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleStage {
    Diffing,
    Planning,
    Applying,
    Done,
}

impl fmt::Display for CycleStage {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            CycleStage::Diffing => write!(f, "diffing"),
            CycleStage::Planning => write!(f, "planning"),
            CycleStage::Applying => write!(f, "applying"),
            CycleStage::Done => write!(f, "done"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Created(SwitchIdentity),
    Updated(SwitchIdentity, ApplyReport),
}

impl ReconcileOutcome {
    pub fn identity(&self) -> &SwitchIdentity {
        match self {
            ReconcileOutcome::Created(identity) | ReconcileOutcome::Updated(identity, _) => identity,
        }
    }
}

/// Drives switch resources on a platform. Holds nothing between calls apart from the platform
/// handle and the context, so independent switches can be reconciled at the same time.
pub struct SwitchReconciler<P: SwitchPlatform> {
    platform: P,
    ctx: ReconcileContext,
}

impl<P: SwitchPlatform> SwitchReconciler<P> {
    pub fn new(platform: P, ctx: ReconcileContext) -> Self {
        Self { platform, ctx }
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn context(&self) -> &ReconcileContext {
        &self.ctx
    }

    fn stage(&self, identity: &SwitchIdentity, stage: CycleStage) {
        tracing::debug!("{identity}: {stage}");
    }

    /// Create the switch and return its identity. Nothing is sent when the model is invalid.
    pub async fn create(&self, model: &SwitchModel) -> Result<SwitchIdentity, SwitchError> {
        match &model.kind {
            SwitchKind::HostLocal(options) => {
                let spec = expand_host(model)?;
                let identity = SwitchIdentity::host_scoped(options.host_system_id.clone(), model.name.clone());
                // fail before creating something we could not record
                identity.encode()?;
                let host = HostRef(options.host_system_id.clone());
                tracing::info!("creating {identity}");
                let operation = format!("create {identity}");
                self.ctx.call(&operation, |deadline| self.platform.add_host_switch(&host, &model.name, &spec, deadline)).await
                    .map_err(|fault| RemoteError::new(operation.clone(), fault))?;
                Ok(identity)
            }
            SwitchKind::Distributed(_) => {
                let spec = expand_distributed(model)?;
                tracing::info!("creating distributed switch {}", model.name);
                let operation = format!("create distributed switch {}", model.name);
                let dvs = self.ctx.call(&operation, |deadline| self.platform.create_dvs(&spec, deadline)).await
                    .map_err(|fault| RemoteError::new(operation.clone(), fault))?;
                let identity = SwitchIdentity::DistributedRef { dvs: dvs.clone() };
                if let Err(err) = identity.encode() {
                    // the reference is only known once created, remove what cannot be recorded
                    tracing::warn!("{identity} cannot be recorded, destroying it: {err}");
                    let operation = format!("destroy unrecordable {identity}");
                    if let Err(fault) = self.ctx.call(&operation, |deadline| self.platform.destroy_dvs(&dvs, deadline)).await {
                        tracing::error!("{operation} failed, it has to be removed by hand: {fault}");
                    }
                    return Err(err.into());
                }
                tracing::info!("created {identity}");
                Ok(identity)
            }
        }
    }

    /// Read the switch back as a model. A vanished switch comes back as a `NotFound` class error.
    pub async fn read(&self, identity: &SwitchIdentity) -> Result<SwitchModel, SwitchError> {
        let operation = format!("read {identity}");
        match identity {
            SwitchIdentity::HostScoped { host, name } => {
                let spec = self.ctx.read(&operation, |deadline| self.platform.host_switch(host, name, deadline)).await?;
                Ok(flatten_host(host, name, &spec))
            }
            SwitchIdentity::DistributedRef { dvs } => {
                let info = self.ctx.read(&operation, |deadline| self.platform.dvs_config(dvs, deadline)).await?;
                Ok(flatten_distributed(&info))
            }
        }
    }

    /// Diff and plan without changing anything.
    pub async fn plan(&self, identity: &SwitchIdentity, desired: &SwitchModel) -> Result<ReconcilePlan, SwitchError> {
        validate(desired)?;
        self.stage(identity, CycleStage::Diffing);
        let current = self.read(identity).await?;
        self.stage(identity, CycleStage::Planning);
        let plan = plan_update(identity, desired, &current)?;
        for change in &plan.changes {
            tracing::debug!("{identity}: {change}");
        }
        Ok(plan)
    }

    pub async fn apply(&self, plan: &ReconcilePlan) -> Result<ApplyReport, SwitchError> {
        self.stage(&plan.identity, CycleStage::Applying);
        let report = apply_plan(&self.platform, &self.ctx, plan).await?;
        self.stage(&plan.identity, CycleStage::Done);
        Ok(report)
    }

    /// One full update cycle. An empty plan makes no remote calls past the read.
    pub async fn update(&self, identity: &SwitchIdentity, desired: &SwitchModel) -> Result<ApplyReport, SwitchError> {
        let plan = self.plan(identity, desired).await?;
        if plan.is_empty() {
            tracing::info!("{identity} is up to date");
        }
        self.apply(&plan).await
    }

    /// Delete the switch. One that is already gone counts as deleted.
    pub async fn delete(&self, identity: &SwitchIdentity) -> Result<(), SwitchError> {
        let operation = format!("delete {identity}");
        tracing::info!("deleting {identity}");
        let result = match identity {
            SwitchIdentity::HostScoped { host, name } => {
                self.ctx.call(&operation, |deadline| self.platform.remove_host_switch(host, name, deadline)).await
            }
            SwitchIdentity::DistributedRef { dvs } => {
                self.ctx.call(&operation, |deadline| self.platform.destroy_dvs(dvs, deadline)).await
            }
        };
        match result {
            Ok(()) => Ok(()),
            Err(fault) if fault.class() == FaultClass::NotFound => {
                tracing::warn!("{identity} was already gone: {fault}");
                Ok(())
            }
            Err(fault) => Err(RemoteError::new(operation, fault).into()),
        }
    }

    /// Create the switch when there is no identity for it (or it vanished), update it otherwise.
    pub async fn reconcile(&self, identity: Option<&SwitchIdentity>, desired: &SwitchModel) -> Result<ReconcileOutcome, SwitchError> {
        let Some(identity) = identity else {
            return Ok(ReconcileOutcome::Created(self.create(desired).await?));
        };
        match self.update(identity, desired).await {
            Ok(report) => Ok(ReconcileOutcome::Updated(identity.clone(), report)),
            Err(err) if err.is_not_found() && matches!(err, SwitchError::Remote(_)) => {
                tracing::warn!("{identity} no longer exists, creating it again");
                Ok(ReconcileOutcome::Created(self.create(desired).await?))
            }
            Err(err) => Err(err),
        }
    }

    /// Reconcile independent switches concurrently. Each switch still runs its own cycle in
    /// order. Results come back in input order.
    pub async fn reconcile_all(&self, switches: &[(Option<SwitchIdentity>, SwitchModel)]) -> Vec<Result<ReconcileOutcome, SwitchError>> {
        let cycles = switches.iter()
            .map(|(identity, desired)| self.reconcile(identity.as_ref(), desired));
        join_all(cycles).await
    }
}
