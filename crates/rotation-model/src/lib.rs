use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

pub use control::{ConfigPatch, ControlRequest, ControlResponse};
pub use modes::{PlacementMode, TargetMode};
pub use notification::{NotificationTag, StateNotification};

mod modes {
    use super::*;

    /// Which background surfaces a rotation updates.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(rename_all = "kebab-case")]
    pub enum TargetMode {
        #[default]
        LockScreen,
        HomeScreen,
        Both,
    }

    impl TargetMode {
        const NAMES: &'static [&'static str] = &["lock-screen", "home-screen", "both"];

        /// Integer encoding used by the settings store and state notifications.
        pub const fn code(self) -> i64 {
            match self {
                Self::LockScreen => 1,
                Self::HomeScreen => 2,
                Self::Both => 3,
            }
        }

        pub const fn from_code(code: i64) -> Option<Self> {
            match code {
                1 => Some(Self::LockScreen),
                2 => Some(Self::HomeScreen),
                3 => Some(Self::Both),
                _ => None,
            }
        }

        pub const fn includes_lock_screen(self) -> bool {
            matches!(self, Self::LockScreen | Self::Both)
        }

        pub const fn includes_home_screen(self) -> bool {
            matches!(self, Self::HomeScreen | Self::Both)
        }

        fn as_str(self) -> &'static str {
            match self {
                Self::LockScreen => "lock-screen",
                Self::HomeScreen => "home-screen",
                Self::Both => "both",
            }
        }
    }

    impl fmt::Display for TargetMode {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.as_str())
        }
    }

    impl FromStr for TargetMode {
        type Err = anyhow::Error;

        fn from_str(raw: &str) -> Result<Self> {
            match raw.trim().to_ascii_lowercase().as_str() {
                "lock" | "lock-screen" => Ok(Self::LockScreen),
                "home" | "home-screen" => Ok(Self::HomeScreen),
                "both" => Ok(Self::Both),
                other => Err(anyhow!(
                    "unknown target mode '{other}' (expected one of {})",
                    Self::NAMES.join(", ")
                )),
            }
        }
    }

    /// Horizontal placement policy for the home-screen surface.
    ///
    /// Each mode maps to an ordinal divisor applied to the overflow between
    /// the scaled image width and the screen width.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(rename_all = "kebab-case")]
    pub enum PlacementMode {
        Full,
        #[default]
        Half,
        Third,
        Quarter,
    }

    impl PlacementMode {
        const NAMES: &'static [&'static str] = &["full", "half", "third", "quarter"];

        pub const fn divisor(self) -> u32 {
            match self {
                Self::Full => 1,
                Self::Half => 2,
                Self::Third => 3,
                Self::Quarter => 4,
            }
        }

        pub const fn from_divisor(divisor: i64) -> Option<Self> {
            match divisor {
                1 => Some(Self::Full),
                2 => Some(Self::Half),
                3 => Some(Self::Third),
                4 => Some(Self::Quarter),
                _ => None,
            }
        }

        fn as_str(self) -> &'static str {
            Self::NAMES[(self.divisor() - 1) as usize]
        }
    }

    impl fmt::Display for PlacementMode {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.as_str())
        }
    }

    impl FromStr for PlacementMode {
        type Err = anyhow::Error;

        fn from_str(raw: &str) -> Result<Self> {
            let lowered = raw.trim().to_ascii_lowercase();
            Self::NAMES
                .iter()
                .position(|name| *name == lowered)
                .and_then(|idx| Self::from_divisor(idx as i64 + 1))
                .ok_or_else(|| {
                    anyhow!(
                        "unknown placement mode '{lowered}' (expected one of {})",
                        Self::NAMES.join(", ")
                    )
                })
        }
    }
}

mod notification {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub enum NotificationTag {
        #[serde(rename = "updateUI")]
        UpdateUi,
        #[serde(rename = "changeConf")]
        ChangeConf,
        #[serde(rename = "changeWP")]
        ChangeWallpaper,
    }

    /// One-way state broadcast consumed by presentation layers.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct StateNotification {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub current_image_path: Option<PathBuf>,
        pub interval_seconds: String,
        pub target_mode: i64,
        pub placement_mode: i64,
        pub folder_path: PathBuf,
        pub trigger_tag: NotificationTag,
    }

    impl StateNotification {
        pub fn target(&self) -> Option<TargetMode> {
            TargetMode::from_code(self.target_mode)
        }

        pub fn placement(&self) -> Option<PlacementMode> {
            PlacementMode::from_divisor(self.placement_mode)
        }
    }
}

mod control {
    use super::*;

    /// Optional overrides supplied with a start request or a configuration change.
    #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ConfigPatch {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub interval_seconds: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub folder_path: Option<PathBuf>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub target_mode: Option<TargetMode>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub placement_mode: Option<PlacementMode>,
    }

    impl ConfigPatch {
        pub fn folder(path: impl Into<PathBuf>) -> Self {
            Self {
                folder_path: Some(path.into()),
                ..Self::default()
            }
        }

        pub fn is_empty(&self) -> bool {
            self.interval_seconds.is_none()
                && self.folder_path.is_none()
                && self.target_mode.is_none()
                && self.placement_mode.is_none()
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(tag = "command", rename_all = "kebab-case")]
    pub enum ControlRequest {
        Start {
            #[serde(default, skip_serializing_if = "Option::is_none")]
            config: Option<ConfigPatch>,
        },
        Stop,
        SkipNext,
        SkipPrevious,
        SelectFolder {
            path: PathBuf,
        },
        RequestSnapshot,
        Status,
        Subscribe,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(tag = "status", rename_all = "kebab-case")]
    pub enum ControlResponse {
        Ok,
        Snapshot(StateNotification),
        Error { message: String },
    }

    impl ControlRequest {
        pub fn parse_line(line: &str) -> Result<Self> {
            let line = line.trim_end_matches(['\r', '\n']);
            serde_json::from_str(line).with_context(|| format!("invalid control request {line:?}"))
        }

        pub fn to_line(&self) -> Result<String> {
            Ok(format!("{}\n", serde_json::to_string(self)?))
        }
    }

    impl ControlResponse {
        pub fn parse_line(line: &str) -> Result<Self> {
            let line = line.trim_end_matches(['\r', '\n']);
            serde_json::from_str(line)
                .with_context(|| format!("invalid control response {line:?}"))
        }

        pub fn to_line(&self) -> Result<String> {
            Ok(format!("{}\n", serde_json::to_string(self)?))
        }
    }
}
