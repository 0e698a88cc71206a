//! The rewritten image information document for a derivative, and the
//! provenance fields attached to rewritten georeferencing records.

use serde::{Deserialize, Serialize};

use crate::image::{ImageDescriptor, TileLevel};
use crate::levels::LevelFilter;
use crate::scale::{LevelRounding, ScalePlan};

pub const IMAGE_CONTEXT: &str = "http://iiif.io/api/image/2/context.json";
pub const IMAGE_PROTOCOL: &str = "http://iiif.io/api/image";
pub const LEVEL0_PROFILE: &str = "http://iiif.io/api/image/2/level0.json";
/// Service type of the derivative image.
pub const IMAGE_SERVICE_TYPE: &str = "ImageService2";

/// One `tiles` entry of the derivative document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivativeTiles {
    pub width: u64,
    pub height: u64,
    #[serde(rename = "scaleFactors")]
    pub scale_factors: Vec<u64>,
}

/// A level 0 image information document for the local derivative.
///
/// Field order is the serialization order, so equal descriptors always
/// serialize to identical bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivativeDescriptor {
    #[serde(rename = "@context")]
    pub context: String,
    #[serde(rename = "@id")]
    pub id: String,
    pub protocol: String,
    pub profile: Vec<String>,
    pub width: u64,
    pub height: u64,
    pub tiles: Vec<DerivativeTiles>,
}

impl DerivativeDescriptor {
    /// Build the descriptor of the derivative of `image` under `plan`,
    /// served as `local_id`.
    ///
    /// A declared factor `s` is listed when it lies in
    /// `[max(1, min_scale_factor), max_scale_factor]` for the derivative
    /// dimensions and the source level at `s * min_scale_factor` was copied:
    /// that level holds exactly the tiles a client requests at `s`.
    pub fn build(
        image: &ImageDescriptor,
        plan: &ScalePlan,
        local_id: impl Into<String>,
        rounding: LevelRounding,
    ) -> Self {
        let factor = plan.factor();
        let (width, height) = (plan.derivative_width(), plan.derivative_height());
        let source_filter =
            LevelFilter::new(image.width, image.height, plan.min_scale_factor, rounding);
        let derivative_filter = LevelFilter::new(width, height, plan.min_scale_factor, rounding);

        let tiles = image
            .tiles
            .iter()
            .filter_map(|spec| {
                let tile_width = spec.width;
                let tile_height = spec.tile_height();
                let declared = spec.effective_scale_factors();

                let copied = |s: u64| {
                    s.checked_mul(factor).is_some_and(|source_factor| {
                        declared.contains(&source_factor)
                            && source_filter.keeps(&TileLevel::new(
                                image.width,
                                image.height,
                                tile_width,
                                tile_height,
                                source_factor,
                            ))
                    })
                };

                let scale_factors: Vec<u64> = declared
                    .iter()
                    .copied()
                    .filter(|&s| {
                        derivative_filter
                            .keeps(&TileLevel::new(width, height, tile_width, tile_height, s))
                            && copied(s)
                    })
                    .collect();

                (!scale_factors.is_empty()).then_some(DerivativeTiles {
                    width: tile_width,
                    height: tile_height,
                    scale_factors,
                })
            })
            .collect();

        Self {
            context: IMAGE_CONTEXT.to_string(),
            id: local_id.into(),
            protocol: IMAGE_PROTOCOL.to_string(),
            profile: vec![LEVEL0_PROFILE.to_string()],
            width,
            height,
            tiles,
        }
    }

    /// All scale factors listed for tiles of the given size.
    pub fn scale_factors_for(&self, width: u64, height: u64) -> Vec<u64> {
        self.tiles
            .iter()
            .filter(|t| t.width == width && t.height == height)
            .flat_map(|t| t.scale_factors.iter().copied())
            .collect()
    }
}

/// Where a rewritten georeferencing record came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provenance {
    pub source_annotation_url: String,
    pub map_id: String,
    pub image_id: String,
    /// The min scale factor applied, 1 when the image was not downscaled.
    pub scale: u64,
}

impl Provenance {
    pub fn new(
        source_annotation_url: impl Into<String>,
        map_id: impl Into<String>,
        image_id: impl Into<String>,
        plan: &ScalePlan,
    ) -> Self {
        Self {
            source_annotation_url: source_annotation_url.into(),
            map_id: map_id.into(),
            image_id: image_id.into(),
            scale: plan.factor(),
        }
    }
}
