//! Map scheduler: runs the pipeline over every configured annotation with a
//! bounded number of maps in flight, isolating failures per map.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use futures::future;
use futures::stream::{self, StreamExt};
use tokio::fs;
use tracing::{debug, error, info, warn};

use crate::error::MapError;
use crate::pipeline::{MapOutcome, MapSource, Pipeline};
use crate::stats::RunStats;

pub struct Scheduler {
    pipeline: Arc<Pipeline>,
    max_concurrent: usize,
}

impl Scheduler {
    pub fn new(pipeline: Arc<Pipeline>, max_concurrent: usize) -> Self {
        Self {
            pipeline,
            max_concurrent: max_concurrent.max(1),
        }
    }

    fn stats(&self) -> &RunStats {
        self.pipeline.stats()
    }

    /// Process every URL. Per-map faults are logged and counted as each map
    /// finishes, so an interrupted run still accounts for the maps it
    /// completed; the returned outcomes cover only the maps that did not
    /// fail.
    pub async fn run(&self, urls: &[String]) -> Vec<MapOutcome> {
        info!(maps = urls.len(), max_concurrent = self.max_concurrent, "Starting derivative run");

        let mut outcomes = Vec::new();
        stream::iter(urls.iter().cloned())
            .map(|url| {
                let pipeline = self.pipeline.clone();
                async move {
                    // a panicking map task becomes an UnexpectedFailure
                    let task_url = url.clone();
                    let result = tokio::spawn(async move { pipeline.process(&task_url).await })
                        .await
                        .unwrap_or_else(|e| Err(MapError::UnexpectedFailure(format!("map task failed: {}", e))));
                    (url, result)
                }
            })
            .buffer_unordered(self.max_concurrent)
            .for_each(|(url, result)| {
                if let Some(outcome) = self.record(&url, result) {
                    outcomes.push(outcome);
                }
                future::ready(())
            })
            .await;

        outcomes
    }

    fn record(&self, url: &str, result: Result<MapOutcome, MapError>) -> Option<MapOutcome> {
        match result {
            Ok(outcome) => {
                self.log_outcome(&outcome);
                Some(outcome)
            }
            Err(e) if e.is_skip() => {
                warn!(url = %url, kind = e.kind(), error = %e, "Skipping map");
                self.stats().record_map_skipped(e.kind());
                None
            }
            Err(e) => {
                error!(url = %url, kind = e.kind(), error = %e, "Map failed");
                self.stats().record_map_failed(e.kind());
                None
            }
        }
    }

    fn log_outcome(&self, outcome: &MapOutcome) {
        match outcome {
            MapOutcome::Completed {
                map_id,
                image_id,
                scale,
                tiles,
                reused_image,
            } => {
                info!(
                    map_id = %map_id,
                    image_id = %image_id,
                    scale = scale,
                    tiles = tiles,
                    reused_image = reused_image,
                    "Map complete"
                );
                self.stats().record_map_completed();
            }
            MapOutcome::AlreadyComplete { map_id } => {
                debug!(map_id = %map_id, "Map already complete, skipping");
                self.stats().record_map_already_complete();
            }
            MapOutcome::Planned {
                map_id,
                image_id,
                scale,
                tiles,
            } => {
                info!(map_id = %map_id, image_id = %image_id, scale = scale, tiles = tiles, "Dry run");
            }
        }
    }

    /// Remove records of maps that are no longer configured. Image
    /// directories are left alone since other maps may share them.
    pub async fn prune_stale(&self, urls: &[String]) -> Result<Vec<String>> {
        let keep: HashSet<String> = urls
            .iter()
            .filter_map(|url| MapSource::parse(url).ok())
            .map(|source| source.map_id)
            .collect();

        let dir = self.pipeline.layout().annotations_dir();
        if !fs::try_exists(&dir).await? {
            return Ok(Vec::new());
        }

        let mut removed = Vec::new();
        let mut entries = fs::read_dir(&dir)
            .await
            .with_context(|| format!("Failed to list {}", dir.display()))?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(map_id) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };
            if keep.contains(&map_id) {
                continue;
            }

            fs::remove_file(&path)
                .await
                .with_context(|| format!("Failed to remove {}", path.display()))?;
            info!(map_id = %map_id, "Removed stale record");
            removed.push(map_id);
        }

        removed.sort();
        Ok(removed)
    }
}
