//! Token layout of the four-level spatial pyramid.
//!
//! Level sizes follow `64:16:4:1`. With `G` transformer patches the levels hold
//! `16G, 4G, G, G/4` tokens, so level 3 lines up one-to-one with the patch
//! tokens.

use std::ops::Range;

use crate::error::{CoreError, Result};

/// Number of pyramid levels.
pub const LEVELS: usize = 4;

/// Relative level sizes in units of `G/4`.
pub const LEVEL_RATIOS: [usize; LEVELS] = [64, 16, 4, 1];

/// Sum of [`LEVEL_RATIOS`].
pub const TOTAL_RATIO: usize = 85;

/// Sizes and offsets of the pyramid levels inside the concatenated token stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PyramidLayout {
    unit: usize,
}

impl PyramidLayout {
    /// Layout for `num_group` transformer patches.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] unless `num_group` is a positive
    /// multiple of 4.
    pub fn new(num_group: usize) -> Result<Self> {
        if num_group == 0 || num_group % 4 != 0 {
            return Err(CoreError::InvalidArgument(format!(
                "num_group must be a positive multiple of 4, got {num_group}"
            )));
        }
        Ok(Self {
            unit: num_group / 4,
        })
    }

    /// Recover the layout from the length of the concatenated token stream.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] unless `total` is a positive
    /// multiple of 85.
    pub fn from_total(total: usize) -> Result<Self> {
        if total == 0 || total % TOTAL_RATIO != 0 {
            return Err(CoreError::InvalidArgument(format!(
                "pyramid token count must be a positive multiple of {TOTAL_RATIO}, got {total}"
            )));
        }
        Ok(Self {
            unit: total / TOTAL_RATIO,
        })
    }

    /// Size of the coarsest level.
    pub fn unit(&self) -> usize {
        self.unit
    }

    /// Number of patches this layout corresponds to.
    pub fn num_group(&self) -> usize {
        self.unit * 4
    }

    /// Token count of every level, finest first.
    pub fn level_sizes(&self) -> [usize; LEVELS] {
        LEVEL_RATIOS.map(|r| r * self.unit)
    }

    /// Token range of `level` (0-based) inside the concatenated stream.
    ///
    /// # Panics
    ///
    /// Panics if `level >= LEVELS`.
    pub fn level_range(&self, level: usize) -> Range<usize> {
        let sizes = self.level_sizes();
        let start: usize = sizes[..level].iter().sum();
        start..start + sizes[level]
    }

    /// Total token count.
    pub fn total(&self) -> usize {
        TOTAL_RATIO * self.unit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_sizes() {
        let layout = PyramidLayout::new(256).unwrap();
        assert_eq!(layout.unit(), 64);
        assert_eq!(layout.level_sizes(), [4096, 1024, 256, 64]);
        assert_eq!(layout.total(), 5440);
        assert_eq!(layout.level_range(0), 0..4096);
        assert_eq!(layout.level_range(2), 5120..5376);
        assert_eq!(layout.level_range(3), 5376..5440);
    }

    #[test]
    fn test_from_total_round_trip() {
        let layout = PyramidLayout::new(8).unwrap();
        assert_eq!(PyramidLayout::from_total(layout.total()).unwrap(), layout);
        assert_eq!(layout.num_group(), 8);
    }

    #[test]
    fn test_invalid_layouts() {
        assert!(PyramidLayout::new(0).is_err());
        assert!(PyramidLayout::new(6).is_err());
        assert!(PyramidLayout::from_total(84).is_err());
        assert!(PyramidLayout::from_total(0).is_err());
    }
}
