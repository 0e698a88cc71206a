//! Pyramid level selection.
//!
//! A level survives when its scale factor lies in
//! `[min_scale_factor, max_scale_factor]`: below the minimum its detail is
//! finer than the derivative keeps, above the maximum a single tile is larger
//! than the image.

use crate::image::{ImageDescriptor, TileLevel};
use crate::scale::{max_scale_factor, LevelRounding};

/// Decides which pyramid levels are materialised for a target image size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelFilter {
    pub target_width: u64,
    pub target_height: u64,
    pub min_scale_factor: u64,
    pub rounding: LevelRounding,
}

impl LevelFilter {
    /// A filter against `target_width`x`target_height`; a missing minimum
    /// scale factor means 1.
    pub fn new(
        target_width: u64,
        target_height: u64,
        min_scale_factor: Option<u64>,
        rounding: LevelRounding,
    ) -> Self {
        Self {
            target_width,
            target_height,
            min_scale_factor: min_scale_factor.unwrap_or(1),
            rounding,
        }
    }

    /// Largest useful scale factor for tiles of the given size.
    pub fn max_scale_factor(&self, tile_width: u64, tile_height: u64) -> u64 {
        max_scale_factor(
            self.target_width,
            self.target_height,
            tile_width,
            tile_height,
            self.rounding,
        )
    }

    pub fn keeps(&self, level: &TileLevel) -> bool {
        level.scale_factor >= self.min_scale_factor
            && level.scale_factor <= self.max_scale_factor(level.tile_width, level.tile_height)
    }

    /// The retained levels, in their original order.
    pub fn retain<'a>(&self, levels: &'a [TileLevel]) -> Vec<&'a TileLevel> {
        levels.iter().filter(|level| self.keeps(level)).collect()
    }
}

/// Source-side selection: which levels of `image` must be fetched to build a
/// derivative downscaled by `min_scale_factor`.
pub fn source_levels(
    image: &ImageDescriptor,
    min_scale_factor: Option<u64>,
    rounding: LevelRounding,
) -> Vec<TileLevel> {
    LevelFilter::new(image.width, image.height, min_scale_factor, rounding)
        .retain(&image.tile_levels)
        .into_iter()
        .copied()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::TileSpec;

    fn level(scale_factor: u64) -> TileLevel {
        TileLevel::new(10_000, 7_500, 512, 512, scale_factor)
    }

    #[test]
    fn test_filter_against_derivative_dimensions() {
        let filter = LevelFilter::new(10_000, 7_500, None, LevelRounding::Floor);
        assert_eq!(filter.max_scale_factor(512, 512), 16);
        assert!(filter.keeps(&level(4)));
        assert!(filter.keeps(&level(16)));
        assert!(!filter.keeps(&level(32)));
    }

    #[test]
    fn test_filter_drops_levels_below_minimum() {
        let filter = LevelFilter::new(20_000, 15_000, Some(2), LevelRounding::Floor);
        let levels: Vec<_> = [1, 2, 4, 8, 16, 32, 64].into_iter().map(level).collect();
        let kept: Vec<u64> = filter.retain(&levels).iter().map(|l| l.scale_factor).collect();
        assert_eq!(kept, vec![2, 4, 8, 16, 32]);
    }

    #[test]
    fn test_ceil_rounding_keeps_one_more_level() {
        let filter = LevelFilter::new(10_000, 7_500, None, LevelRounding::Ceil);
        assert!(filter.keeps(&level(32)));
        assert!(!filter.keeps(&level(64)));
    }

    #[test]
    fn test_source_levels_preserve_order_and_counts() {
        let image = ImageDescriptor::new(
            "https://example.org/img",
            20_000,
            15_000,
            vec![TileSpec::new(512, 512, vec![1, 2, 4, 8, 16, 32, 64])],
        )
        .unwrap();

        let levels = source_levels(&image, Some(2), LevelRounding::Floor);
        let factors: Vec<u64> = levels.iter().map(|l| l.scale_factor).collect();
        assert_eq!(factors, vec![2, 4, 8, 16, 32]);
        // counts are those of the original image grid
        assert_eq!((levels[0].columns, levels[0].rows), (20, 15));
    }
}
