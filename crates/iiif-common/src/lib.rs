//! Common types and planning logic for building size-bounded copies of
//! remote IIIF image pyramids.
//!
//! Everything in this crate is pure: it decides how far an image is scaled
//! down, which pyramid levels survive, where every tile is fetched from and
//! stored, and how georeferencing coordinates follow the image. Fetching and
//! writing bytes is left to the caller.

pub mod derivative;
pub mod error;
pub mod georef;
pub mod id;
pub mod image;
pub mod levels;
pub mod scale;
pub mod tile;

pub use derivative::{DerivativeDescriptor, DerivativeTiles, Provenance};
pub use error::{IiifError, IiifResult};
pub use georef::{GeoreferencedMap, GroundControlPoint, ImageResource, PixelPoint};
pub use id::content_id;
pub use image::{ImageDescriptor, TileLevel, TileSpec};
pub use levels::LevelFilter;
pub use scale::{LevelRounding, ScalePlan, DEFAULT_MAX_IMAGE_DIMENSION};
pub use tile::{plan_tiles, ImageRequest, Region, Size, TileAddress, TileMapping};
