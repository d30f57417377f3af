use serde::Deserialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Orientation {
    #[default]
    Portrait,
    Landscape,
}

/// Screen size as currently presented, plus how the device is held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ScreenGeometry {
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub orientation: Orientation,
}

impl ScreenGeometry {
    /// `(width, height)` in the device's natural portrait frame.
    pub const fn portrait_frame(&self) -> (u32, u32) {
        match self.orientation {
            Orientation::Portrait => (self.width, self.height),
            Orientation::Landscape => (self.height, self.width),
        }
    }
}

/// Source of the screen geometry used for each apply.
pub trait DisplayMetrics: Send + Sync {
    fn current(&self) -> ScreenGeometry;
}

impl DisplayMetrics for ScreenGeometry {
    fn current(&self) -> ScreenGeometry {
        *self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn landscape_is_swapped_into_portrait_frame() {
        let screen = ScreenGeometry {
            width: 2400,
            height: 1080,
            orientation: Orientation::Landscape,
        };
        assert_eq!(screen.portrait_frame(), (1080, 2400));
        let upright = ScreenGeometry {
            orientation: Orientation::Portrait,
            ..screen
        };
        assert_eq!(upright.current().portrait_frame(), (2400, 1080));
    }
}
