//! IIIF tile requests and their mapping into derivative space.
//!
//! A request is written with the fixed grammar
//! `{region}/{size}/{rotation}/{quality}.{format}`, always with an explicit
//! `x,y,w,h` region and `w,h` size.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{IiifError, IiifResult};
use crate::image::{ImageDescriptor, TileLevel};
use crate::levels::source_levels;
use crate::scale::{div_ceil, div_round, LevelRounding, ScalePlan};

pub const ROTATION: &str = "0";
pub const QUALITY: &str = "default";
pub const FORMAT: &str = "jpg";

/// A rectangle in image pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
    pub x: u64,
    pub y: u64,
    pub width: u64,
    pub height: u64,
}

impl Region {
    /// Divide every coordinate by `factor`, rounding half up.
    pub fn scaled(&self, factor: u64) -> Region {
        Region {
            x: div_round(self.x, factor),
            y: div_round(self.y, factor),
            width: div_round(self.width, factor),
            height: div_round(self.height, factor),
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.x, self.y, self.width, self.height)
    }
}

/// Output pixel size of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: u64,
    pub height: u64,
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.width, self.height)
    }
}

/// An image API request for one tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageRequest {
    pub region: Region,
    pub size: Size,
}

impl ImageRequest {
    /// The request path relative to the image identifier.
    pub fn path(&self) -> String {
        format!(
            "{}/{}/{}/{}.{}",
            self.region, self.size, ROTATION, QUALITY, FORMAT
        )
    }

    /// The fully qualified request URL against `image_id`.
    pub fn url(&self, image_id: &str) -> String {
        format!("{}/{}", image_id.trim_end_matches('/'), self.path())
    }
}

/// One tile of one pyramid level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileAddress {
    pub level: TileLevel,
    pub column: u64,
    pub row: u64,
}

impl TileAddress {
    /// The full-resolution request for this tile of an
    /// `image_width`x`image_height` image. Edge tiles are clipped.
    pub fn request(&self, image_width: u64, image_height: u64) -> IiifResult<ImageRequest> {
        let level = &self.level;
        if self.column >= level.columns || self.row >= level.rows {
            return Err(IiifError::TileOutOfRange {
                column: self.column,
                row: self.row,
                columns: level.columns,
                rows: level.rows,
            });
        }

        let overflow = || {
            IiifError::InvalidDescriptor(format!(
                "tile ({}, {}) of {}x{} tiles at scale factor {} overflows",
                self.column, self.row, level.tile_width, level.tile_height, level.scale_factor
            ))
        };
        let span_x = level.tile_width.checked_mul(level.scale_factor).ok_or_else(overflow)?;
        let span_y = level.tile_height.checked_mul(level.scale_factor).ok_or_else(overflow)?;
        let x = self.column.checked_mul(span_x).ok_or_else(overflow)?;
        let y = self.row.checked_mul(span_y).ok_or_else(overflow)?;

        if x >= image_width || y >= image_height {
            return Err(IiifError::TileOutOfRange {
                column: self.column,
                row: self.row,
                columns: level.columns,
                rows: level.rows,
            });
        }

        let width = span_x.min(image_width - x);
        let height = span_y.min(image_height - y);

        Ok(ImageRequest {
            region: Region {
                x,
                y,
                width,
                height,
            },
            size: Size {
                width: div_ceil(width, level.scale_factor),
                height: div_ceil(height, level.scale_factor),
            },
        })
    }
}

/// Where a tile is fetched from and where it lands in the derivative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileMapping {
    pub address: TileAddress,
    /// Request against the remote, full-resolution image.
    pub source: ImageRequest,
    /// The same tile as a client of the derivative requests it: the region
    /// divided by `min_scale_factor`, served at derivative scale factor
    /// `scale_factor / min_scale_factor`. Full tiles keep the source size;
    /// edge tiles get the size of their rounded region.
    pub derivative: ImageRequest,
}

impl TileMapping {
    pub fn new(
        address: TileAddress,
        image_width: u64,
        image_height: u64,
        min_scale_factor: u64,
    ) -> IiifResult<Self> {
        let min_scale_factor = min_scale_factor.max(1);
        let source = address.request(image_width, image_height)?;

        let region = source.region.scaled(min_scale_factor);
        let derivative_scale_factor = (address.level.scale_factor / min_scale_factor).max(1);
        let derivative = ImageRequest {
            region,
            size: Size {
                width: div_ceil(region.width, derivative_scale_factor),
                height: div_ceil(region.height, derivative_scale_factor),
            },
        };

        Ok(Self {
            address,
            source,
            derivative,
        })
    }

    /// Storage path segment of the downloaded bytes.
    pub fn storage_path(&self) -> String {
        self.derivative.path()
    }

    /// The remote request whose bytes are stored: the source region at the
    /// derivative output size, so the remote server does any resampling.
    pub fn fetch_url(&self, image_id: &str) -> String {
        ImageRequest {
            region: self.source.region,
            size: self.derivative.size,
        }
        .url(image_id)
    }

    /// Rounding can shrink a one or two pixel edge strip to nothing.
    fn is_empty(&self) -> bool {
        self.derivative.region.width == 0 || self.derivative.region.height == 0
    }
}

/// Every tile that must be copied to build the derivative of `image`.
pub fn plan_tiles(
    image: &ImageDescriptor,
    plan: &ScalePlan,
    rounding: LevelRounding,
) -> IiifResult<Vec<TileMapping>> {
    let factor = plan.factor();
    let mut mappings = Vec::new();

    for level in source_levels(image, plan.min_scale_factor, rounding) {
        for address in level.tiles() {
            let mapping = TileMapping::new(address, image.width, image.height, factor)?;
            if !mapping.is_empty() {
                mappings.push(mapping);
            }
        }
    }

    Ok(mappings)
}
