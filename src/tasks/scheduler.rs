use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::Result;
use futures::future::OptionFuture;
use rotation_model::{ConfigPatch, NotificationTag};
use tokio::sync::mpsc::Receiver;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::RotationConfig;
use crate::engine::RotationEngine;
use crate::events::{ApplyOutcome, SchedulerCommand, Trigger};
use crate::store::ConfigStore;

type SharedStore = Arc<Mutex<Box<dyn ConfigStore>>>;

struct Scheduler {
    engine: Arc<RotationEngine>,
    store: SharedStore,
    defaults: RotationConfig,
    next_fire: Option<Instant>,
    manual: JoinSet<ApplyOutcome>,
}

/// Drives the engine from a self-rearming timer and from control commands.
///
/// The next period starts only after the previous timer apply finished.
#[instrument(skip_all)]
pub async fn run(
    engine: Arc<RotationEngine>,
    store: Box<dyn ConfigStore>,
    defaults: RotationConfig,
    mut commands: Receiver<SchedulerCommand>,
    cancel: CancellationToken,
) -> Result<()> {
    let mut scheduler = Scheduler {
        engine,
        store: Arc::new(Mutex::new(store)),
        defaults,
        next_fire: None,
        manual: JoinSet::new(),
    };
    let mut timer_apply: Option<JoinHandle<ApplyOutcome>> = None;
    let mut commands_open = true;

    loop {
        let fire_at = scheduler.next_fire;
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("cancel received; stopping scheduler");
                break;
            }

            _ = sleep_until(fire_at.unwrap_or_else(Instant::now)), if fire_at.is_some() && timer_apply.is_none() => {
                scheduler.next_fire = None;
                timer_apply = Some(scheduler.spawn_apply(Trigger::Timer));
            }

            Some(joined) = OptionFuture::from(timer_apply.as_mut()), if timer_apply.is_some() => {
                timer_apply = None;
                log_outcome("timer", joined);
                scheduler.rearm();
            }

            Some(joined) = scheduler.manual.join_next(), if !scheduler.manual.is_empty() => {
                log_outcome("manual", joined);
            }

            command = commands.recv(), if commands_open => match command {
                Some(command) => scheduler.handle(command).await,
                None => {
                    debug!("control channel closed; timer keeps running");
                    commands_open = false;
                }
            },
        }
    }

    scheduler.engine.run_state().set_running(false);
    if let Some(handle) = timer_apply {
        log_outcome("timer", handle.await);
    }
    while let Some(joined) = scheduler.manual.join_next().await {
        log_outcome("manual", joined);
    }
    Ok(())
}

impl Scheduler {
    fn spawn_apply(&self, trigger: Trigger) -> JoinHandle<ApplyOutcome> {
        let engine = Arc::clone(&self.engine);
        tokio::task::spawn_blocking(move || engine.trigger(trigger))
    }

    fn rearm(&mut self) {
        if !self.engine.run_state().is_running() || self.next_fire.is_some() {
            return;
        }
        let interval = self.engine.active_config().interval();
        self.next_fire = Some(Instant::now() + interval);
        debug!(interval = %humantime::format_duration(interval), "timer re-armed");
    }

    async fn handle(&mut self, command: SchedulerCommand) {
        debug!(?command, "scheduler command");
        match command {
            SchedulerCommand::Start(patch) => self.start(patch).await,
            SchedulerCommand::Stop => {
                if self.engine.run_state().set_running(false) {
                    self.next_fire = None;
                    info!("rotation stopped");
                }
            }
            SchedulerCommand::SkipNext => self.skip(Trigger::SkipNext),
            SchedulerCommand::SkipPrevious => self.skip(Trigger::SkipPrevious),
            SchedulerCommand::ConfigChanged(patch) => self.change_config(&patch).await,
            SchedulerCommand::RequestSnapshot => {
                self.engine.publish_snapshot(NotificationTag::UpdateUi);
            }
        }
    }

    /// Configuration is only taken on a cold start.
    async fn start(&mut self, patch: Option<ConfigPatch>) {
        if self.engine.run_state().is_running() {
            if patch.as_ref().is_some_and(|patch| !patch.is_empty()) {
                info!("rotation already running; start configuration ignored");
            } else {
                debug!("rotation already running");
            }
            return;
        }

        let stored = self.load_stored();
        let config = match &patch {
            Some(patch) => stored.patched(patch),
            None => stored,
        };
        self.persist(config.clone()).await;
        self.engine.replace_config(config.clone());
        self.engine.invalidate_catalog();
        self.engine.run_state().set_running(true);
        self.engine.publish_snapshot(NotificationTag::ChangeConf);
        self.next_fire = Some(Instant::now());
        info!(
            folder = %config.folder.display(),
            interval = %humantime::format_duration(config.interval()),
            target = %config.target,
            placement = %config.placement,
            "rotation started"
        );
    }

    fn skip(&mut self, trigger: Trigger) {
        if !self.engine.run_state().is_running() {
            debug!(?trigger, "rotation stopped; skip ignored");
            return;
        }
        let engine = Arc::clone(&self.engine);
        self.manual.spawn_blocking(move || engine.trigger(trigger));
    }

    /// Persisted immediately; the running rotation keeps its parameters until restarted.
    async fn change_config(&mut self, patch: &ConfigPatch) {
        let config = self.load_stored().patched(patch);
        self.persist(config.clone()).await;
        if self.engine.run_state().is_running() {
            info!("rotation running; configuration change takes effect on next start");
        } else {
            self.engine.replace_config(config);
        }
        self.engine.publish_snapshot(NotificationTag::ChangeConf);
    }

    fn load_stored(&self) -> RotationConfig {
        let store = lock_store(&self.store);
        RotationConfig::load(&**store, &self.defaults)
    }

    /// The commit may fsync, so it runs on the blocking pool.
    async fn persist(&self, config: RotationConfig) {
        let store = Arc::clone(&self.store);
        let committed = tokio::task::spawn_blocking(move || {
            let mut store = lock_store(&store);
            config.save(&mut **store);
            store.commit()
        })
        .await;
        match committed {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(error = ?err, "failed to persist rotation settings"),
            Err(err) => error!(error = %err, "settings commit task failed"),
        }
    }
}

fn lock_store(store: &SharedStore) -> MutexGuard<'_, Box<dyn ConfigStore>> {
    store.lock().unwrap_or_else(PoisonError::into_inner)
}

fn log_outcome(origin: &'static str, joined: Result<ApplyOutcome, JoinError>) {
    match joined {
        Ok(ApplyOutcome::Dropped) => debug!(origin, "trigger dropped; apply in flight"),
        Ok(outcome) => debug!(origin, ?outcome, "apply finished"),
        Err(err) => error!(origin, error = %err, "apply task failed"),
    }
}
