use std::path::PathBuf;
use anyhow::{bail, Context};
use futures::future::join_all;
use vswitch_compose_lib::expand::validate;
use vswitch_compose_lib::platform::memory::InMemoryPlatform;
use vswitch_compose_lib::reconcile::ReconcileOutcome;
use vswitch_compose_lib::{ReconcileContext, SwitchError, SwitchIdentity, SwitchReconciler};
use vswitch_compose_schemas::cli_models::Opts;
use vswitch_compose_schemas::settings::EngineSettings;
use vswitch_compose_schemas::switch_yaml::{Config, SwitchModel};
use crate::state::IdentityState;

/// Everything a command needs: the reconciler over the platform snapshot and the identities
/// recorded by earlier runs.
pub struct Session {
    pub reconciler: SwitchReconciler<InMemoryPlatform>,
    pub state: IdentityState,
    state_path: PathBuf,
    platform_path: PathBuf,
}

impl Session {
    pub async fn open(opts: &Opts) -> anyhow::Result<Self> {
        let settings_path = opts.settings.as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(EngineSettings::default_location);
        let settings = EngineSettings::read(&settings_path).await?;
        tracing::debug!("engine settings = {:?}", settings);

        let platform_path = PathBuf::from(&opts.platform_state);
        let platform = InMemoryPlatform::load(&platform_path).await
            .context("loading platform state")?;
        let state_path = PathBuf::from(&opts.state);
        let state = IdentityState::read(&state_path).await?;
        Ok(Self {
            reconciler: SwitchReconciler::new(platform, ReconcileContext::from(&settings)),
            state,
            state_path,
            platform_path,
        })
    }

    /// Persist the identity state and the platform snapshot.
    pub async fn save(&mut self) -> anyhow::Result<()> {
        self.state.write(&self.state_path).await.context("writing identity state")?;
        self.reconciler.platform().save(&self.platform_path).await.context("writing platform state")?;
        Ok(())
    }
}

pub async fn validate_config(config: &Config) -> anyhow::Result<()> {
    let mut failed = 0;
    for switch in &config.switches {
        match validate(switch) {
            Ok(_) => tracing::info!("{} is valid", switch.state_key()),
            Err(err) => {
                tracing::error!("{}: {}", switch.state_key(), err);
                failed += 1;
            }
        }
    }
    if failed > 0 {
        bail!("{failed} of {} switches failed validation", config.switches.len());
    }
    Ok(())
}

pub async fn plan(session: &Session, config: &Config) -> anyhow::Result<()> {
    for switch in &config.switches {
        let key = switch.state_key();
        match session.state.get(&key)? {
            None => {
                validate(switch).with_context(|| format!("validating {key}"))?;
                println!("{key}: would create");
            }
            Some(identity) => match session.reconciler.plan(&identity, switch).await {
                Ok(plan) if plan.is_empty() => println!("{key}: up to date"),
                Ok(plan) => println!("{key}: {plan}"),
                Err(err) if err.is_not_found() => println!("{key}: {identity} no longer exists, would create"),
                Err(err) => return Err(err).with_context(|| format!("planning {key}")),
            },
        }
    }
    Ok(())
}

pub async fn up(session: &mut Session, config: &Config) -> anyhow::Result<()> {
    let switches: Vec<(Option<SwitchIdentity>, SwitchModel)> = config.switches.iter()
        .map(|switch| -> anyhow::Result<_> { Ok((session.state.get(&switch.state_key())?, switch.clone())) })
        .collect::<anyhow::Result<_>>()?;

    let results = session.reconciler.reconcile_all(&switches).await;
    let mut failed = Vec::new();
    for ((_, switch), result) in switches.iter().zip(results) {
        let key = switch.state_key();
        match result {
            Ok(outcome) => {
                report_outcome(&key, &outcome);
                session.state.insert(&key, outcome.identity())?;
            }
            Err(err) => {
                tracing::error!("{key}: {err} ({:?})", err.class());
                failed.push(key);
            }
        }
    }
    // identities of switches that were created are kept even when others failed
    session.save().await?;
    if !failed.is_empty() {
        bail!("could not reconcile {}", failed.join(", "));
    }
    Ok(())
}

fn report_outcome(key: &str, outcome: &ReconcileOutcome) {
    match outcome {
        ReconcileOutcome::Created(identity) => tracing::info!("{key}: created {identity}"),
        ReconcileOutcome::Updated(_, report) if report.is_noop() => tracing::info!("{key}: up to date"),
        ReconcileOutcome::Updated(identity, report) => {
            let took = report.finished_at - report.started_at;
            tracing::info!("{key}: updated {identity} with {} operations in {}ms", report.applied.len(), took.num_milliseconds());
            for operation in &report.applied {
                tracing::debug!("{key}: {operation}");
            }
        }
    }
}

pub async fn down(session: &mut Session) -> anyhow::Result<()> {
    let mut failed = Vec::new();
    for (key, identity) in session.state.identities()? {
        match session.reconciler.delete(&identity).await {
            Ok(_) => {
                tracing::info!("{key}: deleted {identity}");
                session.state.remove(&key);
            }
            Err(err) => {
                tracing::error!("{key}: {err}");
                failed.push(key);
            }
        }
    }
    session.save().await?;
    if !failed.is_empty() {
        bail!("could not delete {}", failed.join(", "));
    }
    Ok(())
}

pub async fn show(session: &Session) -> anyhow::Result<()> {
    let identities = session.state.identities()?;
    let reads = identities.iter()
        .map(|(_, identity)| session.reconciler.read(identity));
    let results: Vec<Result<SwitchModel, SwitchError>> = join_all(reads).await;

    let mut current = Config::default();
    for ((key, identity), result) in identities.iter().zip(results) {
        match result {
            Ok(model) => current.switches.push(model),
            Err(err) if err.is_not_found() => tracing::warn!("{key}: {identity} no longer exists"),
            Err(err) => return Err(err).with_context(|| format!("reading {key}")),
        }
    }
    print!("{current}");
    Ok(())
}
