//! Common test fixtures for derivative planning tests.
//!
//! Image sizes and URLs that represent the scenarios the pipeline has to
//! handle: images above and below the size limit, and source URLs that do and
//! do not follow the single-map grammar.

/// Default size limit for derivatives.
pub const MAX_DIMENSION: u64 = 16_384;

/// Image sizes as `(width, height)`.
pub mod images {
    /// Needs a factor 2 downscale; derivative is 10000x7500.
    pub const LARGE: (u64, u64) = (20_000, 15_000);

    /// Fits as is.
    pub const MEDIUM: (u64, u64) = (8_000, 6_000);

    /// Tall image needing a factor 4 downscale.
    pub const TALL: (u64, u64) = (9_000, 40_000);

    /// Exactly at the limit.
    pub const AT_LIMIT: (u64, u64) = (16_384, 12_000);

    /// Smaller than a single 512 tile.
    pub const TINY: (u64, u64) = (300, 200);
}

/// Source URLs.
pub mod urls {
    pub const ANNOTATIONS_HOST: &str = "https://annotations.example.org";
    pub const IMAGES_HOST: &str = "https://images.example.org/iiif";

    /// Annotation URL for a single map.
    pub fn map_annotation(map_id: &str) -> String {
        format!("{}/maps/{}", ANNOTATIONS_HOST, map_id)
    }

    /// Image service URL.
    pub fn image(name: &str) -> String {
        format!("{}/{}", IMAGES_HOST, name)
    }

    /// A URL that does not identify a single map.
    pub const MANIFEST: &str = "https://annotations.example.org/manifests/1a2b3c";
}
