use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, bail};
use image::{DynamicImage, ImageFormat, RgbaImage};
use tracing::{debug, info};

use crate::config::{OutputFormat, SinkConfig};

/// One of the two independently settable background surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    LockScreen,
    HomeScreen,
}

impl Target {
    pub const fn file_stem(self) -> &'static str {
        match self {
            Self::LockScreen => "lock-screen",
            Self::HomeScreen => "home-screen",
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_stem())
    }
}

/// Destination for rendered wallpaper canvases.
pub trait WallpaperSink: Send + Sync {
    fn apply(&self, canvas: &RgbaImage, target: Target) -> Result<()>;
}

/// Writes each canvas to `<output-dir>/<target>.<ext>` and optionally hands the
/// file to a desktop-specific setter command.
#[derive(Debug, Clone)]
pub struct FileSink {
    output_dir: PathBuf,
    format: OutputFormat,
    lock_screen_command: Option<Vec<String>>,
    home_screen_command: Option<Vec<String>>,
}

impl FileSink {
    pub fn new(config: &SinkConfig) -> Self {
        Self {
            output_dir: config.output_dir.clone(),
            format: config.format,
            lock_screen_command: config.lock_screen_command.clone(),
            home_screen_command: config.home_screen_command.clone(),
        }
    }

    pub fn output_path(&self, target: Target) -> PathBuf {
        self.output_dir
            .join(format!("{}.{}", target.file_stem(), self.format.extension()))
    }

    fn command_for(&self, target: Target) -> Option<&[String]> {
        match target {
            Target::LockScreen => self.lock_screen_command.as_deref(),
            Target::HomeScreen => self.home_screen_command.as_deref(),
        }
    }

    fn write_atomically(&self, canvas: &RgbaImage, path: &Path) -> Result<()> {
        fs::create_dir_all(&self.output_dir)
            .with_context(|| format!("failed to create {}", self.output_dir.display()))?;
        let tmp = path.with_extension(format!("{}.tmp", self.format.extension()));
        let encoded = match self.format {
            OutputFormat::Png => canvas.save_with_format(&tmp, ImageFormat::Png),
            OutputFormat::Jpeg => DynamicImage::ImageRgba8(canvas.clone())
                .into_rgb8()
                .save_with_format(&tmp, ImageFormat::Jpeg),
        };
        encoded.with_context(|| format!("failed to encode {}", tmp.display()))?;
        fs::rename(&tmp, path).with_context(|| {
            format!("failed to move {} into place at {}", tmp.display(), path.display())
        })
    }
}

impl WallpaperSink for FileSink {
    fn apply(&self, canvas: &RgbaImage, target: Target) -> Result<()> {
        let path = self.output_path(target);
        self.write_atomically(canvas, &path)?;
        debug!(%target, path = %path.display(), "wallpaper written");

        if let Some(argv) = self.command_for(target) {
            run_setter(argv, &path)?;
        }
        Ok(())
    }
}

/// Run `argv`, substituting `{path}` in every argument.
fn run_setter(argv: &[String], path: &Path) -> Result<()> {
    let Some((program, args)) = argv.split_first() else {
        bail!("wallpaper setter command is empty");
    };
    let path = path.to_string_lossy();
    let status = Command::new(program)
        .args(args.iter().map(|arg| arg.replace("{path}", &path)))
        .status()
        .with_context(|| format!("failed to spawn {program}"))?;
    if !status.success() {
        bail!("{program} exited with status {status}");
    }
    info!(program = %program, path = %path, "wallpaper setter completed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn sink(dir: &Path, format: OutputFormat) -> FileSink {
        FileSink::new(&SinkConfig {
            output_dir: dir.join("out"),
            format,
            lock_screen_command: None,
            home_screen_command: None,
        })
    }

    #[test]
    fn writes_png_per_target() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let sink = sink(dir.path(), OutputFormat::Png);
        let canvas = RgbaImage::from_pixel(4, 6, Rgba([5, 6, 7, 255]));

        sink.apply(&canvas, Target::LockScreen)?;
        sink.apply(&canvas, Target::HomeScreen)?;

        let lock = image::open(dir.path().join("out/lock-screen.png"))?;
        assert_eq!((lock.width(), lock.height()), (4, 6));
        assert!(dir.path().join("out/home-screen.png").exists());
        assert!(!dir.path().join("out/lock-screen.png.tmp").exists());
        Ok(())
    }

    #[test]
    fn jpeg_output_drops_alpha() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let sink = sink(dir.path(), OutputFormat::Jpeg);
        let canvas = RgbaImage::from_pixel(8, 8, Rgba([100, 100, 100, 255]));
        sink.apply(&canvas, Target::LockScreen)?;
        let written = image::open(sink.output_path(Target::LockScreen))?;
        assert_eq!(written.color(), image::ColorType::Rgb8);
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn setter_receives_written_path() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let marker = dir.path().join("applied.txt");
        let mut sink = sink(dir.path(), OutputFormat::Png);
        sink.home_screen_command = Some(vec![
            "sh".into(),
            "-c".into(),
            format!("printf '%s' \"$0\" > {}", marker.display()),
            "{path}".into(),
        ]);

        sink.apply(&RgbaImage::new(2, 2), Target::HomeScreen)?;
        let recorded = fs::read_to_string(&marker)?;
        assert_eq!(PathBuf::from(recorded), sink.output_path(Target::HomeScreen));
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn failing_setter_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = sink(dir.path(), OutputFormat::Png);
        sink.lock_screen_command = Some(vec!["false".into()]);
        let err = sink
            .apply(&RgbaImage::new(2, 2), Target::LockScreen)
            .unwrap_err();
        assert!(err.to_string().contains("false"), "{err:#}");
    }
}
