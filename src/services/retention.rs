use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::clients::storage::join_remote;
use crate::clients::{DeleteOutcome, RemoteStore, StorageError};
use crate::config::RetentionConfig;
use crate::library::retention::{RetentionBudget, select_evictions_by};
use crate::models::MediaEntry;
use crate::parser::filename::{cover_name, is_cover_file, is_media_file, stream_name};

#[derive(Debug, Clone, Default, Serialize)]
pub struct RetentionReport {
    /// Media files seen in the store.
    pub scanned: usize,

    /// Media plus covers, before eviction.
    pub total_bytes: u64,

    pub evicted: Vec<String>,

    pub freed_bytes: u64,

    /// Evictions whose media delete failed; retried on the next pass.
    pub failed: Vec<String>,
}

/// Keeps the remote store under its byte budgets.
pub struct RetentionService {
    store: Arc<dyn RemoteStore>,
    config: RetentionConfig,
    cover_dir: String,
}

impl RetentionService {
    pub fn new(store: Arc<dyn RemoteStore>, config: RetentionConfig, cover_dir: String) -> Self {
        Self {
            store,
            config,
            cover_dir,
        }
    }

    /// One retention pass: per stream when configured, then global.
    pub async fn enforce(&self) -> Result<RetentionReport, StorageError> {
        let media: Vec<MediaEntry> = self
            .store
            .list_directory("")
            .await?
            .into_iter()
            .filter(|e| !e.is_dir && is_media_file(&e.name))
            .collect();

        let covers = self.cover_sizes().await;
        let weight = |e: &MediaEntry| {
            let cover = covers.get(&cover_name(&e.name)).copied().unwrap_or(0);
            (e.timestamp(), e.size.saturating_add(cover))
        };

        let media_covers: HashSet<String> = media.iter().map(|e| cover_name(&e.name)).collect();
        let orphaned: u64 = covers
            .iter()
            .filter(|(name, _)| !media_covers.contains(*name))
            .map(|(_, size)| *size)
            .sum();

        let mut report = RetentionReport {
            scanned: media.len(),
            total_bytes: media.iter().map(|e| weight(e).1).sum::<u64>() + orphaned,
            ..RetentionReport::default()
        };

        let mut chosen: Vec<&MediaEntry> = Vec::new();

        if self.config.per_stream_max_bytes > 0 {
            let mut by_stream: BTreeMap<&str, Vec<MediaEntry>> = BTreeMap::new();
            for entry in &media {
                by_stream
                    .entry(stream_name(&entry.name))
                    .or_default()
                    .push(entry.clone());
            }

            let budget = RetentionBudget(self.config.per_stream_max_bytes);
            for (stream, entries) in &by_stream {
                let names: HashSet<&str> = select_evictions_by(entries, budget, weight)
                    .into_iter()
                    .map(|e| e.name.as_str())
                    .collect();
                if !names.is_empty() {
                    debug!(stream = %stream, count = names.len(), "Stream over its budget");
                }
                chosen.extend(media.iter().filter(|e| names.contains(e.name.as_str())));
            }
        }

        let remaining: Vec<MediaEntry> = media
            .iter()
            .filter(|e| !chosen.iter().any(|c| c.name == e.name))
            .cloned()
            .collect();

        // covers without a recording still occupy the store
        let global = RetentionBudget(self.config.max_storage_bytes.saturating_sub(orphaned));
        let global_names: HashSet<&str> = select_evictions_by(&remaining, global, weight)
            .into_iter()
            .map(|e| e.name.as_str())
            .collect();
        chosen.extend(media.iter().filter(|e| global_names.contains(e.name.as_str())));

        for entry in chosen {
            let freed = weight(entry).1;
            if self.evict(entry).await {
                report.evicted.push(entry.name.clone());
                report.freed_bytes += freed;
            } else {
                report.failed.push(entry.name.clone());
            }
        }

        if !report.evicted.is_empty() || !report.failed.is_empty() {
            info!(
                evicted = report.evicted.len(),
                failed = report.failed.len(),
                freed_bytes = report.freed_bytes,
                "Retention pass finished"
            );
        }

        Ok(report)
    }

    async fn cover_sizes(&self) -> HashMap<String, u64> {
        match self.store.list_directory(&self.cover_dir).await {
            Ok(entries) => entries
                .into_iter()
                .filter(|e| !e.is_dir && is_cover_file(&e.name))
                .map(|e| (e.name, e.size))
                .collect(),
            Err(e) => {
                warn!(error = %e, dir = %self.cover_dir, "Could not list covers, ignoring their sizes");
                HashMap::new()
            }
        }
    }

    /// Deletes the media and then its cover. Only a failed media delete
    /// counts as a failure.
    async fn evict(&self, entry: &MediaEntry) -> bool {
        match self.store.delete_file(&entry.name).await {
            Ok(DeleteOutcome::Deleted) => {
                info!(file = %entry.name, size = entry.size, "Evicted recording");
            }
            Ok(DeleteOutcome::NotFound) => {
                debug!(file = %entry.name, "Recording already gone");
            }
            Err(e) => {
                warn!(file = %entry.name, error = %e, "Failed to evict recording");
                return false;
            }
        }
        metrics::counter!("retention_evicted_total").increment(1);

        let cover = join_remote(&self.cover_dir, &cover_name(&entry.name));
        match self.store.delete_file(&cover).await {
            Ok(DeleteOutcome::Deleted) => debug!(cover = %cover, "Deleted cover"),
            Ok(DeleteOutcome::NotFound) => debug!(cover = %cover, "No cover to delete"),
            Err(e) => warn!(cover = %cover, error = %e, "Failed to delete cover"),
        }
        true
    }
}
