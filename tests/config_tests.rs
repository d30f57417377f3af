use std::path::PathBuf;

use rotation_model::{PlacementMode, TargetMode};
use wallpaper_rotator::config::{Configuration, OutputFormat};
use wallpaper_rotator::display::Orientation;

#[test]
fn parse_minimal_config_uses_defaults() {
    let yaml = r#"
screen:
  width: 1080
  height: 2400
"#;
    let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
    let cfg = cfg.validated().unwrap();
    assert!(cfg.autostart);
    assert_eq!(cfg.screen.orientation, Orientation::Portrait);
    assert_eq!(cfg.catalog.extensions, vec!["jpg", "jpeg"]);
    assert_eq!(cfg.sink.format, OutputFormat::Png);
    assert_eq!(cfg.defaults.interval_seconds, 300);
    assert_eq!(cfg.defaults.target, TargetMode::LockScreen);
    assert_eq!(cfg.defaults.placement, PlacementMode::Half);
    assert!(cfg.defaults.folder.ends_with("MyMedia"));
    assert!(
        cfg.control_socket_path
            .to_string_lossy()
            .ends_with("wallpaper-rotator.sock")
    );
}

#[test]
fn parse_kebab_case_config() {
    let yaml = r#"
control-socket-path: /run/rotator/ctl.sock
settings-path: /var/lib/rotator/settings.json
autostart: false
screen:
  width: 2400
  height: 1080
  orientation: landscape
catalog:
  extensions: [".JPG", png]
sink:
  output-dir: /var/cache/rotator
  format: jpeg
  lock-screen-command: ["set-lock", "{path}"]
defaults:
  folder: /srv/walls
  interval-seconds: 45
  target: both
  placement: quarter
"#;
    let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
    let cfg = cfg.validated().unwrap();
    assert_eq!(cfg.control_socket_path, PathBuf::from("/run/rotator/ctl.sock"));
    assert_eq!(cfg.settings_path, PathBuf::from("/var/lib/rotator/settings.json"));
    assert!(!cfg.autostart);
    assert_eq!(cfg.screen.portrait_frame(), (1080, 2400));
    assert_eq!(cfg.catalog.extensions, vec!["jpg", "png"]);
    assert_eq!(cfg.sink.format, OutputFormat::Jpeg);
    assert_eq!(
        cfg.sink.lock_screen_command,
        Some(vec!["set-lock".to_string(), "{path}".to_string()])
    );
    assert_eq!(cfg.sink.home_screen_command, None);
    assert_eq!(cfg.defaults.folder, PathBuf::from("/srv/walls"));
    assert_eq!(cfg.defaults.interval_seconds, 45);
    assert_eq!(cfg.defaults.target, TargetMode::Both);
    assert_eq!(cfg.defaults.placement, PlacementMode::Quarter);
}

#[test]
fn screen_is_required() {
    assert!(serde_yaml::from_str::<Configuration>("autostart: true\n").is_err());
}

#[test]
fn unknown_keys_are_rejected() {
    let yaml = r#"
screen: { width: 10, height: 10 }
wallpaper-mode: 3
"#;
    assert!(serde_yaml::from_str::<Configuration>(yaml).is_err());
}

fn validation_error(yaml: &str) -> String {
    let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
    format!("{:#}", cfg.validated().unwrap_err())
}

#[test]
fn rejects_zero_screen_dimensions() {
    let err = validation_error("screen: { width: 0, height: 10 }\n");
    assert!(err.contains("screen"), "{err}");
}

#[test]
fn rejects_zero_default_interval() {
    let err = validation_error(
        "screen: { width: 10, height: 10 }\ndefaults: { interval-seconds: 0 }\n",
    );
    assert!(err.contains("interval-seconds"), "{err}");
}

#[test]
fn rejects_empty_extension_list() {
    let err = validation_error("screen: { width: 10, height: 10 }\ncatalog: { extensions: [\"\"] }\n");
    assert!(err.contains("extensions"), "{err}");
}

#[test]
fn rejects_blank_setter_command() {
    let err = validation_error(
        "screen: { width: 10, height: 10 }\nsink: { home-screen-command: [\" \", \"{path}\"] }\n",
    );
    assert!(err.contains("home-screen-command"), "{err}");
}

#[test]
fn rejects_socket_path_without_file_name() {
    let err = validation_error("screen: { width: 10, height: 10 }\ncontrol-socket-path: /\n");
    assert!(err.contains("control-socket-path"), "{err}");
}

#[test]
fn from_yaml_file_reports_path() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("rotator.yaml");
    std::fs::write(&path, "screen: { width: 10, height: 20 }\n").unwrap();
    let cfg = Configuration::from_yaml_file(&path).unwrap();
    assert_eq!(cfg.screen.height, 20);

    let missing = tmp.path().join("missing.yaml");
    let err = Configuration::from_yaml_file(&missing).unwrap_err();
    assert!(format!("{err:#}").contains("missing.yaml"));
}
