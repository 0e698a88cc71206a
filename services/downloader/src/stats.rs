//! Run statistics.
//!
//! Each event bumps an in-process atomic counter (for the end-of-run summary)
//! and the matching `metrics` counter (for whatever recorder is installed).

use std::sync::atomic::{AtomicU64, Ordering};

use metrics::counter;
use serde::Serialize;

#[derive(Debug, Default)]
pub struct RunStats {
    maps_completed: AtomicU64,
    maps_already_complete: AtomicU64,
    maps_skipped: AtomicU64,
    maps_failed: AtomicU64,
    tiles_downloaded: AtomicU64,
    tile_bytes: AtomicU64,
    transfer_retries: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub maps_completed: u64,
    pub maps_already_complete: u64,
    pub maps_skipped: u64,
    pub maps_failed: u64,
    pub tiles_downloaded: u64,
    pub tile_bytes: u64,
    pub transfer_retries: u64,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_map_completed(&self) {
        self.maps_completed.fetch_add(1, Ordering::Relaxed);
        counter!("maps_completed_total").increment(1);
    }

    pub fn record_map_already_complete(&self) {
        self.maps_already_complete.fetch_add(1, Ordering::Relaxed);
        counter!("maps_already_complete_total").increment(1);
    }

    pub fn record_map_skipped(&self, kind: &'static str) {
        self.maps_skipped.fetch_add(1, Ordering::Relaxed);
        counter!("maps_skipped_total", "kind" => kind).increment(1);
    }

    pub fn record_map_failed(&self, kind: &'static str) {
        self.maps_failed.fetch_add(1, Ordering::Relaxed);
        counter!("maps_failed_total", "kind" => kind).increment(1);
    }

    pub fn record_tile(&self, bytes: usize) {
        self.tiles_downloaded.fetch_add(1, Ordering::Relaxed);
        self.tile_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
        counter!("tiles_downloaded_total").increment(1);
        counter!("tile_bytes_total").increment(bytes as u64);
    }

    pub fn record_retry(&self) {
        self.transfer_retries.fetch_add(1, Ordering::Relaxed);
        counter!("transfer_retries_total").increment(1);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            maps_completed: self.maps_completed.load(Ordering::Relaxed),
            maps_already_complete: self.maps_already_complete.load(Ordering::Relaxed),
            maps_skipped: self.maps_skipped.load(Ordering::Relaxed),
            maps_failed: self.maps_failed.load(Ordering::Relaxed),
            tiles_downloaded: self.tiles_downloaded.load(Ordering::Relaxed),
            tile_bytes: self.tile_bytes.load(Ordering::Relaxed),
            transfer_retries: self.transfer_retries.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let stats = RunStats::new();
        stats.record_tile(100);
        stats.record_tile(50);
        stats.record_map_completed();
        stats.record_map_skipped("unsupported_image");
        stats.record_retry();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.tiles_downloaded, 2);
        assert_eq!(snapshot.tile_bytes, 150);
        assert_eq!(snapshot.maps_completed, 1);
        assert_eq!(snapshot.maps_skipped, 1);
        assert_eq!(snapshot.maps_failed, 0);
        assert_eq!(snapshot.transfer_retries, 1);
    }
}
