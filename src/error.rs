use std::path::PathBuf;

use thiserror::Error;

use crate::sink::Target;

/// Why a single apply was abandoned. Logged by the engine, never returned to triggers.
#[derive(Debug, Error)]
pub enum ApplyError {
    /// The image file could not be read or decoded.
    #[error("failed to decode {}", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    /// Resizing or composing the canvas failed.
    #[error("failed to render the {target} canvas")]
    Render {
        target: Target,
        #[source]
        source: anyhow::Error,
    },

    /// The wallpaper sink rejected the canvas.
    #[error("wallpaper sink rejected the {target} canvas")]
    Sink {
        target: Target,
        #[source]
        source: anyhow::Error,
    },
}
