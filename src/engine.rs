//! Catalog reconciliation, cursor movement and per-target apply.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rotation_model::{NotificationTag, PlacementMode, StateNotification, TargetMode};
use tracing::{debug, info, instrument, warn};

use crate::bridge::Notifier;
use crate::catalog::{Catalog, CatalogOptions};
use crate::config::RotationConfig;
use crate::cursor::RotationCursor;
use crate::display::DisplayMetrics;
use crate::error::ApplyError;
use crate::events::{ApplyOutcome, Trigger};
use crate::processing::decode::decode_upright;
use crate::processing::fit::{fit, render};
use crate::sink::{Target, WallpaperSink};

/// Process-wide rotation flags, owned by the one engine instance.
#[derive(Debug, Default)]
pub struct RunState {
    running: AtomicBool,
    busy: AtomicBool,
}

impl RunState {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Returns the previous value.
    pub(crate) fn set_running(&self, running: bool) -> bool {
        self.running.swap(running, Ordering::AcqRel)
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Claim the single apply slot, or `None` while another apply holds it.
    pub fn try_begin_apply(&self) -> Option<ApplyGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| ApplyGuard { busy: &self.busy })
    }
}

/// Holds the apply slot until dropped.
#[derive(Debug)]
pub struct ApplyGuard<'a> {
    busy: &'a AtomicBool,
}

impl Drop for ApplyGuard<'_> {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

#[derive(Debug)]
struct EngineState {
    config: RotationConfig,
    /// `None` until first built, or after an explicit invalidation.
    catalog: Option<Catalog>,
    cursor: RotationCursor,
}

#[derive(Debug)]
struct ApplyWork {
    lock_screen: Option<PathBuf>,
    home_screen: Option<PathBuf>,
    placement: PlacementMode,
}

impl EngineState {
    fn current_catalog(&self) -> Option<&Catalog> {
        self.catalog
            .as_ref()
            .filter(|catalog| catalog.source() == self.config.folder.as_path())
    }

    fn image_at(&self, position: usize) -> Option<PathBuf> {
        self.current_catalog()
            .and_then(|catalog| catalog.get(position))
            .map(Path::to_path_buf)
    }

    fn work(&self) -> ApplyWork {
        let len = self.current_catalog().map_or(0, Catalog::len);
        let position = self.cursor.position();
        let target = self.config.target;
        // Home shows the neighbour when both surfaces rotate, so they differ.
        let home_position = match target {
            TargetMode::Both => self.cursor.look_ahead(len),
            _ => position,
        };
        ApplyWork {
            lock_screen: target
                .includes_lock_screen()
                .then(|| self.image_at(position))
                .flatten(),
            home_screen: target
                .includes_home_screen()
                .then(|| self.image_at(home_position))
                .flatten(),
            placement: self.config.placement,
        }
    }

    fn notification(&self, tag: NotificationTag) -> StateNotification {
        StateNotification {
            current_image_path: self.image_at(self.cursor.position()),
            interval_seconds: self.config.interval_seconds.to_string(),
            target_mode: self.config.target.code(),
            placement_mode: i64::from(self.config.placement.divisor()),
            folder_path: self.config.folder.clone(),
            trigger_tag: tag,
        }
    }
}

/// Single-worker wallpaper rotation: at most one apply runs at a time and
/// triggers arriving meanwhile are dropped.
pub struct RotationEngine {
    run_state: RunState,
    catalog_options: CatalogOptions,
    sink: Arc<dyn WallpaperSink>,
    display: Arc<dyn DisplayMetrics>,
    notifier: Notifier,
    state: Mutex<EngineState>,
}

impl RotationEngine {
    pub fn new(
        config: RotationConfig,
        catalog_options: CatalogOptions,
        sink: Arc<dyn WallpaperSink>,
        display: Arc<dyn DisplayMetrics>,
        notifier: Notifier,
    ) -> Self {
        Self {
            run_state: RunState::default(),
            catalog_options,
            sink,
            display,
            notifier,
            state: Mutex::new(EngineState {
                config,
                catalog: None,
                cursor: RotationCursor::new(),
            }),
        }
    }

    pub fn run_state(&self) -> &RunState {
        &self.run_state
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    fn lock_state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn active_config(&self) -> RotationConfig {
        self.lock_state().config.clone()
    }

    /// Swap the rotation parameters; a new folder is picked up on the next apply.
    pub fn replace_config(&self, config: RotationConfig) {
        self.lock_state().config = config;
    }

    /// Force the next apply to rescan the folder and start from its first image.
    pub fn invalidate_catalog(&self) {
        self.lock_state().catalog = None;
    }

    pub fn cursor_position(&self) -> usize {
        self.lock_state().cursor.position()
    }

    pub fn snapshot(&self, tag: NotificationTag) -> StateNotification {
        self.lock_state().notification(tag)
    }

    /// Re-emit the current state without touching the cursor.
    pub fn publish_snapshot(&self, tag: NotificationTag) -> StateNotification {
        let notification = self.snapshot(tag);
        self.notifier.publish(notification.clone());
        notification
    }

    /// Run one apply for `trigger`. Blocks for the decode/render/sink work.
    #[instrument(skip(self))]
    pub fn trigger(&self, trigger: Trigger) -> ApplyOutcome {
        let Some(_slot) = self.run_state.try_begin_apply() else {
            debug!("apply already in flight; trigger dropped");
            return ApplyOutcome::Dropped;
        };

        self.refresh_catalog();
        let work = {
            let mut state = self.lock_state();
            let len = state.current_catalog().map_or(0, Catalog::len);
            let position = state.cursor.advance(trigger.step(), len);
            self.notifier
                .publish(state.notification(NotificationTag::ChangeWallpaper));
            if len == 0 {
                info!(folder = %state.config.folder.display(), "no images available; nothing applied");
                return ApplyOutcome::NoImages;
            }
            debug!(position, images = len, "cursor advanced");
            state.work()
        };

        match self.apply(&work) {
            Ok(()) => ApplyOutcome::Applied {
                lock_screen: work.lock_screen,
                home_screen: work.home_screen,
            },
            Err(err) => {
                let err = anyhow::Error::from(err);
                warn!(error = ?err, "wallpaper apply failed");
                ApplyOutcome::Failed {
                    reason: format!("{err:#}"),
                }
            }
        }
    }

    /// Rescan the folder when the catalog is missing or was built for another
    /// folder. The walk runs without the state lock held.
    fn refresh_catalog(&self) {
        let folder = {
            let state = self.lock_state();
            if state.current_catalog().is_some() {
                return;
            }
            state.config.folder.clone()
        };
        let catalog = Catalog::build(&folder, &self.catalog_options);
        let mut state = self.lock_state();
        if state.config.folder == folder {
            state.catalog = Some(catalog);
            state.cursor.reset();
        } else {
            debug!(folder = %folder.display(), "folder changed during scan; catalog discarded");
        }
    }

    fn apply(&self, work: &ApplyWork) -> Result<(), ApplyError> {
        let (screen_w, screen_h) = self.display.current().portrait_frame();
        let targets = [
            (Target::LockScreen, work.lock_screen.as_deref()),
            (Target::HomeScreen, work.home_screen.as_deref()),
        ];
        for (target, path) in targets {
            let Some(path) = path else { continue };
            let image = decode_upright(path).map_err(|source| ApplyError::Decode {
                path: path.to_path_buf(),
                source,
            })?;
            let canvas = fit(
                image.width(),
                image.height(),
                screen_w,
                screen_h,
                target,
                work.placement,
            )
            .and_then(|plan| render(&image, &plan))
            .map_err(|source| ApplyError::Render { target, source })?;
            self.sink
                .apply(&canvas, target)
                .map_err(|source| ApplyError::Sink { target, source })?;
            info!(
                %target,
                path = %path.display(),
                width = canvas.width(),
                height = canvas.height(),
                "wallpaper applied"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_slot_is_exclusive_until_released() {
        let state = RunState::default();
        let guard = state.try_begin_apply().expect("slot should be free");
        assert!(state.is_busy());
        assert!(state.try_begin_apply().is_none());
        drop(guard);
        assert!(!state.is_busy());
        assert!(state.try_begin_apply().is_some());
    }

    #[test]
    fn running_flag_reports_previous_value() {
        let state = RunState::default();
        assert!(!state.is_running());
        assert!(!state.set_running(true));
        assert!(state.set_running(true));
        assert!(state.set_running(false));
        assert!(!state.is_running());
    }
}
