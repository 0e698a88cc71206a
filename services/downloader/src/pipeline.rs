//! Per-map derivative pipeline.
//!
//! One call to [`Pipeline::process`] takes a single-map annotation URL to a
//! finished derivative: tiles, `info.json`, then the rewritten record. The
//! record is written last, so its presence marks the map complete and a rerun
//! skips it before touching the network.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, OnceLock};

use futures::stream::{self, TryStreamExt};
use iiif_common::derivative::IMAGE_SERVICE_TYPE;
use iiif_common::{
    content_id, plan_tiles, DerivativeDescriptor, ImageDescriptor, Provenance, ScalePlan,
    TileMapping,
};
use regex::Regex;
use tokio::fs;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, instrument, warn};

use crate::annotation::{generate_annotation, parse_annotation, select_map, with_provenance};
use crate::config::DownloaderConfig;
use crate::download::Fetcher;
use crate::error::MapError;
use crate::layout::{write_atomic, write_json, StorageLayout};
use crate::stats::RunStats;

fn map_url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"maps/(?P<map_id>\w+)$").expect("valid regex"))
}

/// A source annotation URL that identifies one map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapSource {
    pub url: String,
    pub map_id: String,
}

impl MapSource {
    pub fn parse(url: &str) -> Result<Self, MapError> {
        let captures = map_url_pattern()
            .captures(url)
            .ok_or_else(|| MapError::MalformedSourceReference(url.to_string()))?;

        Ok(Self {
            url: url.to_string(),
            map_id: captures["map_id"].to_string(),
        })
    }
}

/// What happened to one map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapOutcome {
    Completed {
        map_id: String,
        image_id: String,
        scale: u64,
        tiles: usize,
        /// The image was already built by an earlier map.
        reused_image: bool,
    },
    AlreadyComplete {
        map_id: String,
    },
    /// Dry run: planned but nothing written.
    Planned {
        map_id: String,
        image_id: String,
        scale: u64,
        tiles: usize,
    },
}

impl MapOutcome {
    pub fn map_id(&self) -> &str {
        match self {
            MapOutcome::Completed { map_id, .. }
            | MapOutcome::AlreadyComplete { map_id }
            | MapOutcome::Planned { map_id, .. } => map_id,
        }
    }
}

/// One async lock per image id, so maps sharing an image build it once.
#[derive(Debug, Default)]
pub struct ImageLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ImageLocks {
    pub async fn acquire(&self, image_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.entry(image_id.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }
}

/// Tiles with distinct storage paths, first occurrence kept.
pub fn dedupe_tiles(mappings: Vec<TileMapping>) -> Vec<TileMapping> {
    let mut seen = HashSet::new();
    mappings
        .into_iter()
        .filter(|m| seen.insert(m.storage_path()))
        .collect()
}

pub struct Pipeline {
    config: Arc<DownloaderConfig>,
    layout: StorageLayout,
    fetcher: Arc<dyn Fetcher>,
    stats: Arc<RunStats>,
    image_locks: ImageLocks,
    dry_run: bool,
}

impl Pipeline {
    pub fn new(config: Arc<DownloaderConfig>, fetcher: Arc<dyn Fetcher>, stats: Arc<RunStats>) -> Self {
        let layout = StorageLayout::new(&config.output_dir, &config.base_url);
        Self {
            config,
            layout,
            fetcher,
            stats,
            image_locks: ImageLocks::default(),
            dry_run: false,
        }
    }

    /// Plan every map without transferring or writing anything.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    pub fn stats(&self) -> &Arc<RunStats> {
        &self.stats
    }

    /// Build the derivative for the map at `url`.
    #[instrument(skip(self), fields(map_id = tracing::field::Empty))]
    pub async fn process(&self, url: &str) -> Result<MapOutcome, MapError> {
        let source = MapSource::parse(url)?;
        tracing::Span::current().record("map_id", source.map_id.as_str());

        let record_path = self.layout.annotation_path(&source.map_id);
        if fs::try_exists(&record_path).await? {
            debug!(path = %record_path.display(), "Record exists, map already complete");
            return Ok(MapOutcome::AlreadyComplete {
                map_id: source.map_id,
            });
        }

        let annotation = self.fetcher.fetch_json(&source.url).await?;
        let map = select_map(parse_annotation(&annotation)?, &source.map_id).ok_or_else(|| {
            MapError::UnexpectedFailure(format!("no georeferenced map in {}", source.url))
        })?;

        let resource_id = map.resource.id.clone();
        let image_id = content_id(&resource_id);

        let info = self
            .fetcher
            .fetch_json(&format!("{}/info.json", resource_id))
            .await?;
        let image = ImageDescriptor::from_value(info, &resource_id)?;
        if (image.width, image.height) != (map.resource.width, map.resource.height) {
            warn!(
                image_id = %image_id,
                annotation_width = map.resource.width,
                annotation_height = map.resource.height,
                width = image.width,
                height = image.height,
                "Annotation dimensions differ from image information, using image information"
            );
        }

        let plan = ScalePlan::new(image.width, image.height, self.config.max_image_dimension)?;
        let rounding = self.config.level_rounding;
        let tiles = dedupe_tiles(plan_tiles(&image, &plan, rounding)?);
        let local_id = self.layout.local_image_uri(&image_id);
        let descriptor = DerivativeDescriptor::build(&image, &plan, local_id.as_str(), rounding);

        info!(
            image_id = %image_id,
            width = image.width,
            height = image.height,
            scale = %plan.describe(),
            tiles = tiles.len(),
            "Planned derivative"
        );

        if self.dry_run {
            return Ok(MapOutcome::Planned {
                map_id: source.map_id,
                image_id,
                scale: plan.factor(),
                tiles: tiles.len(),
            });
        }

        let reused_image = {
            let _guard = self.image_locks.acquire(&image_id).await;
            let info_path = self.layout.info_path(&image_id);

            if self.existing_descriptor_matches(&info_path, &descriptor).await {
                info!(image_id = %image_id, "Image already built, reusing tiles");
                true
            } else {
                self.transfer_tiles(&resource_id, &image_id, &tiles).await?;
                write_json(&info_path, &descriptor).await?;
                false
            }
        };

        let rescaled = map
            .rescaled(&plan)
            .with_resource_id(local_id, IMAGE_SERVICE_TYPE);
        if !rescaled.within_bounds() {
            warn!(image_id = %image_id, "Rescaled coordinates fall outside the derivative image");
        }

        let provenance = Provenance::new(source.url.as_str(), source.map_id.as_str(), image_id.as_str(), &plan);
        let record = with_provenance(generate_annotation(&rescaled), &provenance);
        write_json(&record_path, &record).await?;

        Ok(MapOutcome::Completed {
            map_id: source.map_id,
            image_id,
            scale: plan.factor(),
            tiles: tiles.len(),
            reused_image,
        })
    }

    async fn existing_descriptor_matches(
        &self,
        info_path: &Path,
        descriptor: &DerivativeDescriptor,
    ) -> bool {
        match fs::read(info_path).await {
            Ok(bytes) => match serde_json::from_slice::<DerivativeDescriptor>(&bytes) {
                Ok(existing) => &existing == descriptor,
                Err(e) => {
                    warn!(path = %info_path.display(), error = %e, "Unreadable info.json, rebuilding");
                    false
                }
            },
            Err(_) => false,
        }
    }

    async fn transfer_tiles(
        &self,
        resource_id: &str,
        image_id: &str,
        tiles: &[TileMapping],
    ) -> Result<(), MapError> {
        stream::iter(tiles.iter().map(Ok::<_, MapError>))
            .try_for_each_concurrent(self.config.max_concurrent_tiles, |mapping| async move {
                let path = self.layout.tile_path(image_id, &mapping.storage_path());
                let url = mapping.fetch_url(resource_id);

                let bytes = self.fetcher.fetch_bytes(&url).await?;
                write_atomic(&path, &bytes).await?;
                self.stats.record_tile(bytes.len());

                debug!(url = %url, path = %path.display(), bytes = bytes.len(), "Tile stored");
                Ok::<(), MapError>(())
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_map_url() {
        let source = MapSource::parse("https://annotations.allmaps.org/maps/16d5862724595677").unwrap();
        assert_eq!(source.map_id, "16d5862724595677");
    }

    #[test]
    fn test_parse_rejects_non_map_urls() {
        for url in [
            "https://annotations.allmaps.org/manifests/1a2b3c",
            "https://annotations.allmaps.org/maps/",
            "https://annotations.allmaps.org/maps/abc/",
            "https://annotations.allmaps.org/maps/abc?format=json",
        ] {
            let err = MapSource::parse(url).unwrap_err();
            assert_eq!(err.kind(), "malformed_source_reference", "{}", url);
        }
    }

    #[test]
    fn test_dedupe_tiles_keeps_first() {
        let image = ImageDescriptor::new(
            "https://example.org/iiif/img",
            300,
            200,
            vec![
                iiif_common::TileSpec::new(512, 512, vec![1]),
                iiif_common::TileSpec::new(1024, 1024, vec![1]),
            ],
        )
        .unwrap();
        let plan = ScalePlan::new(300, 200, 16_384).unwrap();
        let tiles = plan_tiles(&image, &plan, iiif_common::LevelRounding::Floor).unwrap();
        assert_eq!(tiles.len(), 2);

        let deduped = dedupe_tiles(tiles.clone());
        assert_eq!(deduped, vec![tiles[0]]);
    }

    #[tokio::test]
    async fn test_image_locks_serialise_same_image() {
        let locks = Arc::new(ImageLocks::default());
        let guard = locks.acquire("a").await;

        // a different image is not blocked
        let _other = locks.acquire("b").await;

        let waiting = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire("a").await;
            })
        };
        tokio::task::yield_now().await;
        assert!(!waiting.is_finished());

        drop(guard);
        waiting.await.unwrap();
    }
}
