//! Georeferenced map model and its rescaling into derivative space.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::scale::ScalePlan;

/// A point in image pixel space, serialized as `[x, y]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct PixelPoint {
    pub x: f64,
    pub y: f64,
}

impl PixelPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn scaled(&self, plan: &ScalePlan) -> Self {
        Self {
            x: plan.scale_coordinate(self.x),
            y: plan.scale_coordinate(self.y),
        }
    }
}

impl From<[f64; 2]> for PixelPoint {
    fn from([x, y]: [f64; 2]) -> Self {
        Self { x, y }
    }
}

impl From<PixelPoint> for [f64; 2] {
    fn from(point: PixelPoint) -> Self {
        [point.x, point.y]
    }
}

/// A pixel coordinate paired with a geographic `(lon, lat)` coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroundControlPoint {
    pub resource: PixelPoint,
    pub geo: [f64; 2],
}

/// The image a map is drawn on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageResource {
    pub id: String,
    /// Service type, e.g. `ImageService2`.
    pub resource_type: String,
    pub width: u64,
    pub height: u64,
}

/// A map georeferenced on one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoreferencedMap {
    pub id: Option<String>,
    pub resource: ImageResource,
    pub gcps: Vec<GroundControlPoint>,
    pub resource_mask: Vec<PixelPoint>,
    /// Transformation settings, carried through untouched.
    pub transformation: Option<Value>,
}

impl GeoreferencedMap {
    /// A copy of this map moved onto the derivative image: every pixel
    /// coordinate is divided by the plan's factor, geographic coordinates are
    /// left alone.
    pub fn rescaled(&self, plan: &ScalePlan) -> GeoreferencedMap {
        GeoreferencedMap {
            id: self.id.clone(),
            resource: ImageResource {
                width: plan.derivative_width(),
                height: plan.derivative_height(),
                ..self.resource.clone()
            },
            gcps: self
                .gcps
                .iter()
                .map(|gcp| GroundControlPoint {
                    resource: gcp.resource.scaled(plan),
                    geo: gcp.geo,
                })
                .collect(),
            resource_mask: self.resource_mask.iter().map(|p| p.scaled(plan)).collect(),
            transformation: self.transformation.clone(),
        }
    }

    /// Replace the image this map points at.
    pub fn with_resource_id(mut self, id: impl Into<String>, resource_type: impl Into<String>) -> Self {
        self.resource.id = id.into();
        self.resource.resource_type = resource_type.into();
        self
    }

    /// Whether every pixel coordinate lies within the resource bounds.
    pub fn within_bounds(&self) -> bool {
        let width = self.resource.width as f64;
        let height = self.resource.height as f64;
        let inside = |p: &PixelPoint| p.x >= 0.0 && p.y >= 0.0 && p.x <= width && p.y <= height;

        self.gcps.iter().all(|gcp| inside(&gcp.resource)) && self.resource_mask.iter().all(inside)
    }
}
