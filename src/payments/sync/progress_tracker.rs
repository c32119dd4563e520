//! Progress tracking for a single address scan.
//!
//! This module provides the `ScanProgressTracker`, which counts pages, visited transactions,
//! accepted candidates and rejections while a scan strategy walks an account's history
//! backwards. It also warns every 1000 visited transactions so that an unexpectedly long walk
//! (for example a cursor that no longer matches any stored row) shows up in the logs.

use tracing::{debug, warn};

use crate::payments::SyncSource;

/// Number of visited transactions between two loop warnings.
const LOOP_WARN_INTERVAL: usize = 1000;

/// Service for tracking scan progress
#[derive(Debug, Clone)]
pub struct ScanProgressTracker {
    /// Address under scan, in canonical form
    address: String,
    /// Source the scan reads from
    source: SyncSource,
    /// Pages fetched from the API
    pages_fetched: usize,
    /// Transactions or operations looked at
    visited: usize,
    /// Items that produced a transfer candidate
    candidates: usize,
    /// Items dropped by the decoder
    rejected: usize,
    /// Items seen twice because of overlapping pages
    duplicates: usize,
    /// Oldest logical time visited
    lowest_lt: Option<u64>,
    /// Newest logical time visited
    highest_lt: Option<u64>,
}

impl ScanProgressTracker {
    pub fn new(address: String, source: SyncSource) -> Self {
        Self {
            address,
            source,
            pages_fetched: 0,
            visited: 0,
            candidates: 0,
            rejected: 0,
            duplicates: 0,
            lowest_lt: None,
            highest_lt: None,
        }
    }

    pub fn record_page(&mut self, items: usize) {
        self.pages_fetched += 1;
        debug!(
            "Fetched page {} with {} items for {} from {}",
            self.pages_fetched, items, self.address, self.source
        );
    }

    /// Record a visited item, warning at every `LOOP_WARN_INTERVAL` items.
    pub fn record_visited(&mut self, lt: u64) {
        self.visited += 1;
        self.lowest_lt = Some(self.lowest_lt.map_or(lt, |low| low.min(lt)));
        self.highest_lt = Some(self.highest_lt.map_or(lt, |high| high.max(lt)));

        if self.visited % LOOP_WARN_INTERVAL == 0 {
            warn!(
                iteration = self.visited,
                address = %self.address,
                lt,
                "loop counter"
            );
        }
    }

    pub fn record_candidate(&mut self) {
        self.candidates += 1;
    }

    pub fn record_rejected(&mut self) {
        self.rejected += 1;
    }

    pub fn record_duplicate(&mut self) {
        self.duplicates += 1;
    }

    /// Get scan statistics as a ScanStats struct
    pub fn get_stats(&self) -> ScanStats {
        ScanStats {
            source: self.source,
            pages_fetched: self.pages_fetched,
            visited: self.visited,
            candidates: self.candidates,
            rejected: self.rejected,
            duplicates: self.duplicates,
            lt_range: self.lowest_lt.zip(self.highest_lt),
        }
    }
}

/// Statistics about one scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanStats {
    pub source: SyncSource,
    pub pages_fetched: usize,
    pub visited: usize,
    pub candidates: usize,
    pub rejected: usize,
    pub duplicates: usize,
    pub lt_range: Option<(u64, u64)>,
}

impl ScanStats {
    /// Get a human-readable summary of the scan statistics
    pub fn summary(&self) -> String {
        format!(
            "Scan via {}: {} pages, {} visited, {} candidates, {} rejected{}{}",
            self.source,
            self.pages_fetched,
            self.visited,
            self.candidates,
            self.rejected,
            if self.duplicates == 0 {
                String::new()
            } else {
                format!(", {} overlapping", self.duplicates)
            },
            match self.lt_range {
                Some((low, high)) => format!(" (lt {}..={})", low, high),
                None => String::new(),
            }
        )
    }
}
