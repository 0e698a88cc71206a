//! In-memory model of a remote image pyramid, parsed from an IIIF Image API
//! information document (`info.json`).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{IiifError, IiifResult};
use crate::scale::{div_ceil, is_power_of_two};
use crate::tile::TileAddress;

/// One entry of the `tiles` array of an information document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileSpec {
    pub width: u64,
    /// Missing height means square tiles.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u64>,
    #[serde(rename = "scaleFactors", default)]
    pub scale_factors: Vec<u64>,
}

impl TileSpec {
    pub fn new(width: u64, height: u64, scale_factors: Vec<u64>) -> Self {
        Self {
            width,
            height: Some(height),
            scale_factors,
        }
    }

    pub fn tile_height(&self) -> u64 {
        self.height.unwrap_or(self.width)
    }

    /// Scale factors as declared, `[1]` when the entry lists none.
    pub fn effective_scale_factors(&self) -> Vec<u64> {
        if self.scale_factors.is_empty() {
            vec![1]
        } else {
            self.scale_factors.clone()
        }
    }
}

/// One level of the pyramid: a tile size served at one scale factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileLevel {
    pub tile_width: u64,
    pub tile_height: u64,
    pub scale_factor: u64,
    pub columns: u64,
    pub rows: u64,
}

impl TileLevel {
    /// Derive the level grid for an image of `image_width`x`image_height`.
    pub fn new(
        image_width: u64,
        image_height: u64,
        tile_width: u64,
        tile_height: u64,
        scale_factor: u64,
    ) -> Self {
        Self {
            tile_width,
            tile_height,
            scale_factor,
            columns: div_ceil(image_width, tile_width.saturating_mul(scale_factor)).max(1),
            rows: div_ceil(image_height, tile_height.saturating_mul(scale_factor)).max(1),
        }
    }

    /// Number of tiles in this level.
    pub fn tile_count(&self) -> u64 {
        self.columns * self.rows
    }

    /// Every tile of the level, column by column.
    pub fn tiles(&self) -> impl Iterator<Item = TileAddress> + '_ {
        (0..self.columns).flat_map(move |column| {
            (0..self.rows).map(move |row| TileAddress {
                level: *self,
                column,
                row,
            })
        })
    }
}

#[derive(Debug, Deserialize)]
struct RawImageInfo {
    #[serde(rename = "@id")]
    legacy_id: Option<String>,
    id: Option<String>,
    width: Option<u64>,
    height: Option<u64>,
    tiles: Option<Vec<TileSpec>>,
}

/// A remote image: its identifier, dimensions and tile pyramid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageDescriptor {
    pub id: String,
    pub width: u64,
    pub height: u64,
    /// The `tiles` entries as declared by the server.
    pub tiles: Vec<TileSpec>,
    /// One level per (tile entry, scale factor), in document order.
    pub tile_levels: Vec<TileLevel>,
}

impl ImageDescriptor {
    /// Build a descriptor from already known parts.
    pub fn new(id: impl Into<String>, width: u64, height: u64, tiles: Vec<TileSpec>) -> IiifResult<Self> {
        let id = id.into();
        if width == 0 || height == 0 {
            return Err(IiifError::InvalidDimensions { width, height });
        }
        if tiles.is_empty() {
            return Err(IiifError::UnsupportedImage(id));
        }

        let mut tile_levels = Vec::new();
        for spec in &tiles {
            if spec.width == 0 || spec.tile_height() == 0 {
                return Err(IiifError::InvalidDescriptor(format!(
                    "tile size {}x{} in {}",
                    spec.width,
                    spec.tile_height(),
                    id
                )));
            }
            for scale_factor in spec.effective_scale_factors() {
                if !is_power_of_two(scale_factor) {
                    return Err(IiifError::InvalidScaleFactor(scale_factor));
                }
                if spec.width.checked_mul(scale_factor).is_none()
                    || spec.tile_height().checked_mul(scale_factor).is_none()
                {
                    return Err(IiifError::InvalidDescriptor(format!(
                        "tile size {}x{} at scale factor {} overflows in {}",
                        spec.width,
                        spec.tile_height(),
                        scale_factor,
                        id
                    )));
                }
                tile_levels.push(TileLevel::new(
                    width,
                    height,
                    spec.width,
                    spec.tile_height(),
                    scale_factor,
                ));
            }
        }

        Ok(Self {
            id,
            width,
            height,
            tiles,
            tile_levels,
        })
    }

    /// Parse an information document. `fallback_id` is used when the
    /// document carries neither `id` nor `@id`.
    pub fn from_value(value: Value, fallback_id: &str) -> IiifResult<Self> {
        let raw: RawImageInfo = serde_json::from_value(value)?;

        let id = raw
            .id
            .or(raw.legacy_id)
            .unwrap_or_else(|| fallback_id.to_string());
        let id = id.trim_end_matches('/').to_string();

        let width = raw
            .width
            .ok_or_else(|| IiifError::InvalidDescriptor(format!("missing width in {}", id)))?;
        let height = raw
            .height
            .ok_or_else(|| IiifError::InvalidDescriptor(format!("missing height in {}", id)))?;

        let tiles = match raw.tiles {
            Some(tiles) if !tiles.is_empty() => tiles,
            _ => return Err(IiifError::UnsupportedImage(id)),
        };

        Self::new(id, width, height, tiles)
    }

    pub fn from_json(json: &str, fallback_id: &str) -> IiifResult<Self> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_value(value, fallback_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_v2_info() {
        let info = json!({
            "@context": "http://iiif.io/api/image/2/context.json",
            "@id": "https://example.org/iiif/abc",
            "width": 5000,
            "height": 3000,
            "tiles": [{ "width": 512, "scaleFactors": [1, 2, 4, 8] }]
        });

        let image = ImageDescriptor::from_value(info, "unused").unwrap();
        assert_eq!(image.id, "https://example.org/iiif/abc");
        assert_eq!(image.tile_levels.len(), 4);

        let first = image.tile_levels[0];
        assert_eq!(first.tile_height, 512);
        assert_eq!((first.columns, first.rows), (10, 6));

        let last = image.tile_levels[3];
        assert_eq!(last.scale_factor, 8);
        assert_eq!((last.columns, last.rows), (2, 1));
    }

    #[test]
    fn test_parse_v3_info_with_rectangular_tiles() {
        let info = json!({
            "id": "https://example.org/iiif/v3/",
            "type": "ImageService3",
            "width": 1000,
            "height": 1000,
            "tiles": [{ "width": 256, "height": 128, "scaleFactors": [1, 2] }]
        });

        let image = ImageDescriptor::from_value(info, "unused").unwrap();
        assert_eq!(image.id, "https://example.org/iiif/v3");
        assert_eq!(image.tile_levels[0].columns, 4);
        assert_eq!(image.tile_levels[0].rows, 8);
    }

    #[test]
    fn test_missing_tiles_is_unsupported() {
        let info = json!({ "@id": "https://example.org/x", "width": 10, "height": 10 });
        let err = ImageDescriptor::from_value(info, "unused").unwrap_err();
        assert!(err.is_unsupported());

        let info = json!({ "@id": "https://example.org/x", "width": 10, "height": 10, "tiles": [] });
        assert!(ImageDescriptor::from_value(info, "unused").unwrap_err().is_unsupported());
    }

    #[test]
    fn test_rejects_non_power_of_two_scale_factor() {
        let info = json!({
            "@id": "https://example.org/x",
            "width": 10,
            "height": 10,
            "tiles": [{ "width": 256, "scaleFactors": [1, 3] }]
        });
        assert!(matches!(
            ImageDescriptor::from_value(info, "unused"),
            Err(IiifError::InvalidScaleFactor(3))
        ));
    }

    #[test]
    fn test_rejects_overflowing_tile_span() {
        let info = json!({
            "id": "https://example.org/iiif/abc",
            "width": 1000,
            "height": 1000,
            "tiles": [{ "width": 512, "scaleFactors": [1, 4_611_686_018_427_387_904u64] }]
        });
        let err = ImageDescriptor::from_value(info, "").unwrap_err();
        assert!(matches!(err, IiifError::InvalidDescriptor(_)), "{:?}", err);
    }

    #[test]
    fn test_fallback_id_and_default_scale_factor() {
        let info = json!({ "width": 100, "height": 50, "tiles": [{ "width": 64 }] });
        let image = ImageDescriptor::from_value(info, "https://example.org/fallback").unwrap();
        assert_eq!(image.id, "https://example.org/fallback");
        assert_eq!(image.tile_levels.len(), 1);
        assert_eq!(image.tile_levels[0].scale_factor, 1);
    }

    #[test]
    fn test_level_tiles_enumerates_grid() {
        let level = TileLevel::new(1000, 600, 512, 512, 1);
        let tiles: Vec<_> = level.tiles().map(|t| (t.column, t.row)).collect();
        assert_eq!(tiles, vec![(0, 0), (0, 1), (1, 0), (1, 1)]);
        assert_eq!(level.tile_count(), 4);
    }
}
