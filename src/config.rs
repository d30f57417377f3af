use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use rotation_model::{ConfigPatch, PlacementMode, TargetMode};
use serde::Deserialize;
use tracing::warn;

use crate::catalog::CatalogOptions;
use crate::display::ScreenGeometry;
use crate::store::{
    ConfigStore, KEY_FOLDER, KEY_INTERVAL, KEY_PLACEMENT_MODE, KEY_TARGET_MODE, StoredValue,
};

const APP_DIR: &str = "wallpaper-rotator";

/// Daemon configuration loaded from YAML at startup.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Configuration {
    /// Unix socket the control server listens on.
    #[serde(default = "Configuration::default_control_socket_path")]
    pub control_socket_path: PathBuf,
    /// JSON file backing the persisted rotation settings.
    #[serde(default = "Configuration::default_settings_path")]
    pub settings_path: PathBuf,
    /// Start rotating as soon as the daemon is up.
    #[serde(default = "Configuration::default_autostart")]
    pub autostart: bool,
    pub screen: ScreenGeometry,
    #[serde(default)]
    pub catalog: CatalogOptions,
    #[serde(default)]
    pub sink: SinkConfig,
    /// Values used when a settings key has never been stored.
    #[serde(default)]
    pub defaults: RotationConfig,
}

impl Configuration {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        serde_yaml::from_str(&s).with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Validate runtime invariants that cannot be expressed via serde defaults alone.
    pub fn validated(mut self) -> Result<Self> {
        ensure!(
            self.screen.width > 0 && self.screen.height > 0,
            "screen width and height must be greater than zero"
        );
        ensure!(
            self.defaults.interval_seconds > 0,
            "defaults.interval-seconds must be greater than zero"
        );
        ensure!(
            self.control_socket_path.file_name().is_some(),
            "control-socket-path must name a socket file"
        );
        self.catalog = self.catalog.normalized();
        ensure!(
            self.catalog.extensions.iter().any(|ext| !ext.is_empty()),
            "catalog.extensions must list at least one extension"
        );
        self.catalog.extensions.retain(|ext| !ext.is_empty());
        for (name, command) in [
            ("sink.lock-screen-command", &self.sink.lock_screen_command),
            ("sink.home-screen-command", &self.sink.home_screen_command),
        ] {
            if let Some(argv) = command {
                ensure!(
                    argv.first().is_some_and(|program| !program.trim().is_empty()),
                    "{name} must start with a program name"
                );
            }
        }
        Ok(self)
    }

    pub fn default_control_socket_path() -> PathBuf {
        env::var_os("XDG_RUNTIME_DIR")
            .filter(|dir| !dir.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(env::temp_dir)
            .join(format!("{APP_DIR}.sock"))
    }

    fn default_settings_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(env::temp_dir)
            .join(APP_DIR)
            .join("settings.json")
    }

    const fn default_autostart() -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    #[default]
    Png,
    Jpeg,
}

impl OutputFormat {
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct SinkConfig {
    /// Directory receiving `lock-screen.<ext>` and `home-screen.<ext>`.
    pub output_dir: PathBuf,
    pub format: OutputFormat,
    /// argv run after the lock-screen file is written; `{path}` is substituted.
    pub lock_screen_command: Option<Vec<String>>,
    /// argv run after the home-screen file is written; `{path}` is substituted.
    pub home_screen_command: Option<Vec<String>>,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            output_dir: dirs::cache_dir()
                .unwrap_or_else(env::temp_dir)
                .join(APP_DIR),
            format: OutputFormat::default(),
            lock_screen_command: None,
            home_screen_command: None,
        }
    }
}

/// The rotation parameters the engine runs with.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct RotationConfig {
    pub folder: PathBuf,
    pub interval_seconds: u32,
    pub target: TargetMode,
    pub placement: PlacementMode,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            folder: Self::default_folder(),
            interval_seconds: 300,
            target: TargetMode::default(),
            placement: PlacementMode::default(),
        }
    }
}

impl RotationConfig {
    fn default_folder() -> PathBuf {
        dirs::picture_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("MyMedia")
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.interval_seconds))
    }

    /// Read the persisted settings, falling back to `defaults` per key.
    pub fn load(store: &dyn ConfigStore, defaults: &Self) -> Self {
        let folder = store.get_text(KEY_FOLDER, &defaults.folder.to_string_lossy());
        let interval = store.get_int(KEY_INTERVAL, i64::from(defaults.interval_seconds));
        let target = store.get_int(KEY_TARGET_MODE, defaults.target.code());
        let placement = store.get_int(KEY_PLACEMENT_MODE, i64::from(defaults.placement.divisor()));

        Self {
            folder: if folder.trim().is_empty() {
                defaults.folder.clone()
            } else {
                PathBuf::from(folder)
            },
            interval_seconds: u32::try_from(interval)
                .ok()
                .filter(|secs| *secs > 0)
                .unwrap_or_else(|| {
                    warn!(interval, "stored interval out of range; using default");
                    defaults.interval_seconds
                }),
            target: TargetMode::from_code(target).unwrap_or_else(|| {
                warn!(code = target, "stored target mode unknown; using default");
                defaults.target
            }),
            placement: PlacementMode::from_divisor(placement).unwrap_or_else(|| {
                warn!(divisor = placement, "stored placement mode unknown; using default");
                defaults.placement
            }),
        }
    }

    /// Stage every field into `store`; the caller commits.
    pub fn save(&self, store: &mut dyn ConfigStore) {
        store.put(
            KEY_FOLDER,
            StoredValue::Text(self.folder.to_string_lossy().into_owned()),
        );
        store.put(KEY_INTERVAL, StoredValue::Int(i64::from(self.interval_seconds)));
        store.put(KEY_TARGET_MODE, StoredValue::Int(self.target.code()));
        store.put(
            KEY_PLACEMENT_MODE,
            StoredValue::Int(i64::from(self.placement.divisor())),
        );
    }

    /// Overlay the fields a patch actually carries; blank folders and zero
    /// intervals are ignored.
    #[must_use]
    pub fn patched(&self, patch: &ConfigPatch) -> Self {
        let mut next = self.clone();
        if let Some(folder) = patch
            .folder_path
            .as_ref()
            .filter(|folder| !folder.as_os_str().is_empty())
        {
            next.folder = folder.clone();
        }
        if let Some(secs) = patch.interval_seconds.filter(|secs| *secs > 0) {
            next.interval_seconds = secs;
        }
        if let Some(target) = patch.target_mode {
            next.target = target;
        }
        if let Some(placement) = patch.placement_mode {
            next.placement = placement;
        }
        next
    }
}
