use std::path::PathBuf;

use rotation_model::ConfigPatch;

/// What asked the engine to change the wallpaper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Timer,
    SkipNext,
    SkipPrevious,
}

impl Trigger {
    /// Cursor step applied before the new image is shown.
    pub const fn step(self) -> i64 {
        match self {
            Self::Timer | Self::SkipNext => 1,
            Self::SkipPrevious => -1,
        }
    }
}

/// Result of one trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Another apply was in flight; nothing happened.
    Dropped,
    /// The catalog is empty; the notification went out but nothing was applied.
    NoImages,
    Applied {
        lock_screen: Option<PathBuf>,
        home_screen: Option<PathBuf>,
    },
    /// The apply was abandoned and logged.
    Failed { reason: String },
}

/// Messages accepted by the scheduler task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerCommand {
    Start(Option<ConfigPatch>),
    Stop,
    SkipNext,
    SkipPrevious,
    ConfigChanged(ConfigPatch),
    RequestSnapshot,
}
