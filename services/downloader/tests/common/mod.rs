//! Common test utilities for downloader tests
//!
//! Provides helpers for:
//! - Serving annotations, info.json documents and tiles from memory
//! - Recording every requested URL
//! - Injecting failing and never-answering URLs
//! - Building a pipeline rooted in a temporary directory

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use downloader::{DownloaderConfig, Fetcher, Pipeline, RunStats, Scheduler, TransferError};
use serde_json::Value;

/// In-memory fetcher. Documents are served by exact URL; any URL ending in
/// `/default.jpg` is a tile whose body is its own URL.
#[derive(Default)]
pub struct MemoryFetcher {
    documents: Mutex<HashMap<String, Bytes>>,
    failing: Mutex<HashSet<String>>,
    hanging: Mutex<HashSet<String>>,
    requests: Mutex<Vec<String>>,
}

impl MemoryFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn serve_json(&self, url: &str, value: &Value) {
        let body = serde_json::to_vec(value).expect("serializable document");
        self.documents
            .lock()
            .unwrap()
            .insert(url.to_string(), Bytes::from(body));
    }

    /// Make every request to `url` fail with HTTP 500.
    pub fn fail(&self, url: &str) {
        self.failing.lock().unwrap().insert(url.to_string());
    }

    /// Make every request to `url` wait forever.
    pub fn hang(&self, url: &str) {
        self.hanging.lock().unwrap().insert(url.to_string());
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn tile_requests(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .filter(|url| url.ends_with("/default.jpg"))
            .collect()
    }

    pub fn clear_requests(&self) {
        self.requests.lock().unwrap().clear();
    }
}

#[async_trait]
impl Fetcher for MemoryFetcher {
    async fn fetch_bytes(&self, url: &str) -> Result<Bytes, TransferError> {
        self.requests.lock().unwrap().push(url.to_string());

        let hangs = self.hanging.lock().unwrap().contains(url);
        if hangs {
            futures::future::pending::<()>().await;
        }

        if self.failing.lock().unwrap().contains(url) {
            return Err(TransferError::Status {
                url: url.to_string(),
                status: 500,
            });
        }
        if let Some(body) = self.documents.lock().unwrap().get(url) {
            return Ok(body.clone());
        }
        if url.ends_with("/default.jpg") {
            return Ok(Bytes::from(url.to_string()));
        }

        Err(TransferError::Status {
            url: url.to_string(),
            status: 404,
        })
    }
}

/// Config rooted at `output_dir` with small concurrency limits.
pub fn test_config(output_dir: &Path, annotations: Vec<String>) -> DownloaderConfig {
    DownloaderConfig {
        annotations,
        output_dir: output_dir.to_path_buf(),
        max_concurrent_maps: 2,
        max_concurrent_tiles: 4,
        ..Default::default()
    }
}

/// A scheduler over `fetcher` and a fresh stats handle.
pub fn scheduler(
    config: DownloaderConfig,
    fetcher: Arc<MemoryFetcher>,
    dry_run: bool,
) -> (Scheduler, Arc<RunStats>) {
    let stats = Arc::new(RunStats::new());
    let max_concurrent = config.max_concurrent_maps;
    let pipeline = Pipeline::new(Arc::new(config), fetcher, stats.clone()).with_dry_run(dry_run);
    (Scheduler::new(Arc::new(pipeline), max_concurrent), stats)
}
