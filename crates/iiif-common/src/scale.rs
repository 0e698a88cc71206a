//! Global downscale planning.
//!
//! A derivative is produced by dropping the most detailed levels of the
//! pyramid, so the only downscale ratios available are powers of two. All
//! snapping to powers of two is done on integers: `f64::log2` followed by
//! `ceil`/`floor` misbehaves exactly at the power-of-two boundaries.

use serde::{Deserialize, Serialize};

use crate::error::{IiifError, IiifResult};

/// Largest width or height a derivative may have unless configured otherwise.
pub const DEFAULT_MAX_IMAGE_DIMENSION: u64 = 16_384;

/// Number of significant bits in `n` (0 for 0).
pub fn bit_length(n: u64) -> u32 {
    u64::BITS - n.leading_zeros()
}

pub fn is_power_of_two(n: u64) -> bool {
    n != 0 && n & (n - 1) == 0
}

/// Smallest power of two that is `>= n`. Returns 1 for 0.
pub fn ceil_power_of_two(n: u64) -> u64 {
    if n <= 1 {
        return 1;
    }
    1 << bit_length(n - 1)
}

/// Largest power of two that is `<= n`. Returns 0 for 0.
pub fn floor_power_of_two(n: u64) -> u64 {
    if n == 0 {
        return 0;
    }
    1 << (bit_length(n) - 1)
}

/// Integer division rounding half up, matching `Math.round(a / b)` for
/// non-negative operands.
pub fn div_round(a: u64, b: u64) -> u64 {
    (a + b / 2) / b
}

pub fn div_ceil(a: u64, b: u64) -> u64 {
    a / b + u64::from(a % b != 0)
}

/// How the per-level maximum scale factor snaps to a power of two.
///
/// `Floor` keeps a level only while its tiles still fit inside the image;
/// `Ceil` also keeps the first level whose single tile overhangs the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LevelRounding {
    #[default]
    Floor,
    Ceil,
}

/// The largest scale factor at which a `tile_width`x`tile_height` tile still
/// covers part of a `target_width`x`target_height` image.
///
/// Never returns less than 1: an image smaller than a single tile still has
/// its full-resolution level.
pub fn max_scale_factor(
    target_width: u64,
    target_height: u64,
    tile_width: u64,
    tile_height: u64,
    rounding: LevelRounding,
) -> u64 {
    let tile_width = tile_width.max(1);
    let tile_height = tile_height.max(1);

    match rounding {
        LevelRounding::Floor => {
            let ratio = (target_width / tile_width).max(target_height / tile_height);
            floor_power_of_two(ratio).max(1)
        }
        LevelRounding::Ceil => {
            let ratio = div_ceil(target_width, tile_width).max(div_ceil(target_height, tile_height));
            ceil_power_of_two(ratio)
        }
    }
}

/// The downscale decision for one image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalePlan {
    pub width: u64,
    pub height: u64,
    pub max_dimension: u64,
    /// `None` when the image already fits and no downscaling happens.
    pub min_scale_factor: Option<u64>,
}

impl ScalePlan {
    /// Plan the downscale for an image of `width`x`height` so that neither
    /// side of the derivative exceeds `max_dimension`.
    pub fn new(width: u64, height: u64, max_dimension: u64) -> IiifResult<Self> {
        if width == 0 || height == 0 {
            return Err(IiifError::InvalidDimensions { width, height });
        }
        if max_dimension == 0 {
            return Err(IiifError::InvalidDimensions {
                width: max_dimension,
                height: max_dimension,
            });
        }

        let longest = width.max(height);
        let min_scale_factor = if longest <= max_dimension {
            None
        } else {
            // smallest power of two p with longest / p <= max_dimension
            Some(ceil_power_of_two(div_ceil(longest, max_dimension)))
        };

        Ok(Self {
            width,
            height,
            max_dimension,
            min_scale_factor,
        })
    }

    /// The divisor applied to every pixel coordinate (1 when not downscaling).
    pub fn factor(&self) -> u64 {
        self.min_scale_factor.unwrap_or(1)
    }

    pub fn is_downscaled(&self) -> bool {
        self.factor() > 1
    }

    /// Rescale an integer pixel quantity into derivative space.
    pub fn scale(&self, value: u64) -> u64 {
        div_round(value, self.factor())
    }

    /// Rescale a (possibly fractional) pixel coordinate into derivative space.
    pub fn scale_coordinate(&self, value: f64) -> f64 {
        (value / self.factor() as f64).round()
    }

    pub fn derivative_width(&self) -> u64 {
        self.scale(self.width)
    }

    pub fn derivative_height(&self) -> u64 {
        self.scale(self.height)
    }

    /// Human readable factor, "none" when the image is not downscaled.
    pub fn describe(&self) -> String {
        match self.min_scale_factor {
            Some(factor) => factor.to_string(),
            None => "none".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_of_two_helpers() {
        assert_eq!(bit_length(0), 0);
        assert_eq!(bit_length(1), 1);
        assert_eq!(bit_length(8), 4);
        assert_eq!(ceil_power_of_two(0), 1);
        assert_eq!(ceil_power_of_two(1), 1);
        assert_eq!(ceil_power_of_two(5), 8);
        assert_eq!(ceil_power_of_two(8), 8);
        assert_eq!(floor_power_of_two(0), 0);
        assert_eq!(floor_power_of_two(19), 16);
        assert_eq!(floor_power_of_two(16), 16);
        assert!(is_power_of_two(1));
        assert!(is_power_of_two(64));
        assert!(!is_power_of_two(0));
        assert!(!is_power_of_two(12));
    }

    #[test]
    fn test_div_round_half_up() {
        assert_eq!(div_round(5, 2), 3);
        assert_eq!(div_round(4, 2), 2);
        assert_eq!(div_round(7, 4), 2);
        assert_eq!(div_round(9, 1), 9);
    }

    #[test]
    fn test_div_ceil_near_u64_max() {
        assert_eq!(div_ceil(5, 4), 2);
        assert_eq!(div_ceil(8, 4), 2);
        assert_eq!(div_ceil(0, 4), 0);
        assert_eq!(div_ceil(1_000, u64::MAX), 1);
        assert_eq!(div_ceil(u64::MAX, 2), 1 << 63);
    }

    #[test]
    fn test_plan_downscales_large_image() {
        let plan = ScalePlan::new(20_000, 15_000, 16_384).unwrap();
        assert_eq!(plan.min_scale_factor, Some(2));
        assert_eq!(plan.derivative_width(), 10_000);
        assert_eq!(plan.derivative_height(), 7_500);
    }

    #[test]
    fn test_plan_keeps_small_image() {
        let plan = ScalePlan::new(8_000, 6_000, 16_384).unwrap();
        assert_eq!(plan.min_scale_factor, None);
        assert_eq!(plan.factor(), 1);
        assert_eq!(plan.describe(), "none");
        assert_eq!((plan.derivative_width(), plan.derivative_height()), (8_000, 6_000));
    }

    #[test]
    fn test_plan_exact_boundaries() {
        // exactly the limit: no downscale
        assert_eq!(ScalePlan::new(16_384, 10, 16_384).unwrap().min_scale_factor, None);
        // one pixel over: factor 2
        assert_eq!(ScalePlan::new(16_385, 10, 16_384).unwrap().min_scale_factor, Some(2));
        // exactly twice the limit: factor 2, not 4
        assert_eq!(ScalePlan::new(32_768, 10, 16_384).unwrap().min_scale_factor, Some(2));
        assert_eq!(ScalePlan::new(32_769, 10, 16_384).unwrap().min_scale_factor, Some(4));
        // tall image drives the factor as well
        assert_eq!(ScalePlan::new(10, 70_000, 16_384).unwrap().min_scale_factor, Some(8));
    }

    #[test]
    fn test_plan_rejects_zero_dimensions() {
        assert!(ScalePlan::new(0, 10, 100).is_err());
        assert!(ScalePlan::new(10, 10, 0).is_err());
    }

    #[test]
    fn test_max_scale_factor_floor() {
        assert_eq!(max_scale_factor(10_000, 7_500, 512, 512, LevelRounding::Floor), 16);
        assert_eq!(max_scale_factor(8_192, 100, 512, 512, LevelRounding::Floor), 16);
        // image smaller than a tile still keeps level 1
        assert_eq!(max_scale_factor(300, 200, 512, 512, LevelRounding::Floor), 1);
    }

    #[test]
    fn test_max_scale_factor_ceil() {
        assert_eq!(max_scale_factor(10_000, 7_500, 512, 512, LevelRounding::Ceil), 32);
        assert_eq!(max_scale_factor(8_192, 100, 512, 512, LevelRounding::Ceil), 16);
        assert_eq!(max_scale_factor(300, 200, 512, 512, LevelRounding::Ceil), 1);
    }

    #[test]
    fn test_scale_coordinate_rounds() {
        let plan = ScalePlan::new(40_000, 100, 16_384).unwrap();
        assert_eq!(plan.factor(), 4);
        assert_eq!(plan.scale_coordinate(10.0), 3.0);
        assert_eq!(plan.scale_coordinate(6.0), 2.0);
        assert_eq!(plan.scale_coordinate(0.0), 0.0);
    }
}
