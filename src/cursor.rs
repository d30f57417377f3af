//! Wrapping rotation position over a catalog.

/// 1-based position of the image most recently shown on the primary surface.
///
/// Position `0` means nothing has been shown since the catalog was (re)built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RotationCursor {
    position: usize,
}

impl RotationCursor {
    #[must_use]
    pub const fn new() -> Self {
        Self { position: 0 }
    }

    #[must_use]
    pub const fn at(position: usize) -> Self {
        Self { position }
    }

    #[must_use]
    pub const fn position(&self) -> usize {
        self.position
    }

    /// Position `delta` steps from the current one.
    ///
    /// Past the end wraps to `1`; at or before zero wraps to the last entry, or
    /// to `1` when the catalog is empty.
    #[must_use]
    pub fn advanced(&self, delta: i64, catalog_len: usize) -> usize {
        let len = i64::try_from(catalog_len).unwrap_or(i64::MAX);
        let current = i64::try_from(self.position).unwrap_or(i64::MAX);
        let next = current.saturating_add(delta);
        if next > len {
            1
        } else if next <= 0 {
            catalog_len.max(1)
        } else {
            // 0 < next <= len, so it fits.
            next as usize
        }
    }

    /// Move `delta` steps and return the new position.
    pub fn advance(&mut self, delta: i64, catalog_len: usize) -> usize {
        self.position = self.advanced(delta, catalog_len);
        self.position
    }

    /// The position one step ahead, without moving.
    #[must_use]
    pub fn look_ahead(&self, catalog_len: usize) -> usize {
        self.advanced(1, catalog_len)
    }

    pub const fn reset(&mut self) {
        self.position = 0;
    }
}
