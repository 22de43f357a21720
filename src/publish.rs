use chrono::{DateTime, Utc};
use dashmap::DashSet;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::PublisherConfig;
use crate::error::{Result, ZoneError};
use crate::metrics::ZoneMetrics;
use crate::model::{ZoneId, ZoneKind, ZoneNode};
use crate::validation::ZoneValidator;
use crate::zone::graph::Visit;
use crate::zone::names::relative_path;
use crate::zone::serial::published_serial;
use crate::zone::synth::EmitMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Success,
    Failed,
    Skipped,
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileStatus::Success => write!(f, "success"),
            FileStatus::Failed => write!(f, "failed"),
            FileStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// Outcome for one zone file in a publish run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileResult {
    pub zone_id: ZoneId,
    pub name: String,
    /// Unknown when the referenced zone no longer exists
    pub kind: Option<ZoneKind>,
    pub status: FileStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Error class for triage, e.g. `validation_failed` or `external_tool`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_output: Option<String>,
}

impl FileResult {
    fn for_node(node: &ZoneNode, status: FileStatus) -> Self {
        Self {
            zone_id: node.id,
            name: node.name.clone(),
            kind: Some(node.kind),
            status,
            file_path: None,
            error: None,
            failure_kind: None,
            validation_output: None,
        }
    }

    fn failed(node: &ZoneNode, err: &ZoneError) -> Self {
        Self {
            error: Some(err.to_string()),
            failure_kind: Some(err.kind().to_string()),
            ..Self::for_node(node, FileStatus::Failed)
        }
    }
}

/// Summary of one publish run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Distinct active masters seen
    pub masters_processed: usize,
    /// Distinct files generated, successful or not
    pub total_files: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub skipped_count: usize,
    /// True only when nothing failed
    pub success: bool,
    pub message: String,
    pub files: Vec<FileResult>,
}

impl PublishReport {
    fn summarize(
        run_id: Uuid,
        started_at: DateTime<Utc>,
        masters_processed: usize,
        files: Vec<FileResult>,
    ) -> Self {
        let count = |status: FileStatus| files.iter().filter(|f| f.status == status).count();
        let success_count = count(FileStatus::Success);
        let failure_count = count(FileStatus::Failed);
        let skipped_count = count(FileStatus::Skipped);

        let mut message = if failure_count == 0 {
            format!("All {} zones published successfully", success_count)
        } else {
            format!(
                "{} zones published, {} failed",
                success_count, failure_count
            )
        };
        if skipped_count > 0 {
            message.push_str(&format!(" ({} skipped)", skipped_count));
        }

        Self {
            run_id,
            started_at,
            finished_at: Utc::now(),
            masters_processed,
            total_files: success_count + failure_count,
            success_count,
            failure_count,
            skipped_count,
            success: failure_count == 0,
            message,
            files,
        }
    }

    pub fn file(&self, zone_id: ZoneId) -> Option<&FileResult> {
        self.files.iter().find(|f| f.zone_id == zone_id)
    }
}

/// A node reached while expanding master closures
#[derive(Debug, Clone)]
enum WorkItem {
    Publish(ZoneNode),
    /// Inactive zone, or an edge pointing at a zone that no longer exists
    Skip {
        zone_id: ZoneId,
        node: Option<ZoneNode>,
        reason: &'static str,
    },
}

impl WorkItem {
    fn zone_id(&self) -> ZoneId {
        match self {
            WorkItem::Publish(node) => node.id,
            WorkItem::Skip { zone_id, .. } => *zone_id,
        }
    }
}

/// One active master and everything it reaches, in traversal order
#[derive(Debug, Clone)]
struct MasterPlan {
    master: ZoneNode,
    closure: Vec<WorkItem>,
}

impl MasterPlan {
    /// Reached includes whose files were not written in this run
    fn failed_includes(&self, results: &HashMap<ZoneId, FileResult>) -> Vec<ZoneId> {
        self.closure
            .iter()
            .filter_map(|item| match item {
                WorkItem::Publish(node) => Some(node.id),
                WorkItem::Skip { .. } => None,
            })
            .filter(|id| {
                results
                    .get(id)
                    .is_some_and(|result| result.status == FileStatus::Failed)
            })
            .collect()
    }
}

/// Writes every active master and its includes below the BIND base directory
pub struct Publisher {
    validator: ZoneValidator,
    config: PublisherConfig,
    metrics: Option<Arc<ZoneMetrics>>,
}

impl Publisher {
    pub fn new(validator: ZoneValidator, config: PublisherConfig) -> Self {
        Self {
            validator,
            config,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<ZoneMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Run one publish batch.
    ///
    /// Configuration and base directory problems abort before any zone is
    /// touched. Per-file failures are recorded in the report and never stop
    /// the batch. Includes are written before the masters that reference
    /// them, and a master is held back when one of its includes failed.
    pub async fn publish(&self, triggered_by: Option<&str>) -> Result<PublishReport> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();

        self.config.validate()?;
        let basedir = self.config.check_publish_target()?.to_path_buf();

        let sources = self.validator.synthesizer().sources();
        let masters = sources.zones.active_masters();
        info!(
            %run_id,
            masters = masters.len(),
            basedir = %basedir.display(),
            "Starting zone publish"
        );

        self.seed_serials(&masters, &basedir).await;
        let plans = self.collect_work(&masters);
        let workers = self.config.publish_workers;

        // Shared includes appear once per referencing master; the claim set
        // lets exactly one occurrence through per run
        let claimed: DashSet<ZoneId> = DashSet::new();
        let mut results: HashMap<ZoneId, FileResult> = stream::iter(
            plans.iter().flat_map(|plan| plan.closure.iter().cloned()),
        )
        .map(|item| self.process(item, Vec::new(), &claimed, &basedir, triggered_by))
        .buffered(workers)
        .filter_map(|result| async move { result })
        .map(|result| (result.zone_id, result))
        .collect()
        .await;

        let master_results: Vec<FileResult> = stream::iter(&plans)
            .map(|plan| {
                let failed = plan.failed_includes(&results);
                self.process(
                    WorkItem::Publish(plan.master.clone()),
                    failed,
                    &claimed,
                    &basedir,
                    triggered_by,
                )
            })
            .buffered(workers)
            .filter_map(|result| async move { result })
            .collect()
            .await;
        results.extend(master_results.into_iter().map(|r| (r.zone_id, r)));

        // Report in traversal order: each master followed by its closure
        let files: Vec<FileResult> = plans
            .iter()
            .flat_map(|plan| {
                std::iter::once(plan.master.id).chain(plan.closure.iter().map(WorkItem::zone_id))
            })
            .filter_map(|id| results.remove(&id))
            .collect();

        let report = PublishReport::summarize(run_id, started_at, masters.len(), files);

        if let Some(metrics) = &self.metrics {
            metrics.record_publish_run(report.success, report.total_files);
        }
        if report.success {
            info!(%run_id, "{}", report.message);
        } else {
            warn!(%run_id, "{}", report.message);
        }

        if let Some(path) = &self.config.report_path {
            if let Err(e) = persist_report(&report, path).await {
                error!(path = %path.display(), "Failed to write publish report: {}", e);
            }
        }

        Ok(report)
    }

    /// Keep new serials above the ones already on disk, so a fresh process
    /// never re-issues a serial secondaries have seen
    async fn seed_serials(&self, masters: &[ZoneNode], basedir: &Path) {
        let serials = self.validator.synthesizer().serials();
        for master in masters {
            let Ok(relative) = relative_path(master) else {
                continue;
            };
            let path = basedir.join(relative);
            match fs::read_to_string(&path).await {
                Ok(text) => {
                    if let Some(serial) = published_serial(&text) {
                        serials.observe(serial);
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %path.display(), "Failed to read published zone file: {}", e);
                }
            }
        }
        debug!(last_serial = serials.last(), "Serial generator seeded");
    }

    /// Every master with its reachable nodes in traversal order.
    ///
    /// Shared nodes appear once per referencing master.
    fn collect_work(&self, masters: &[ZoneNode]) -> Vec<MasterPlan> {
        let sources = self.validator.synthesizer().sources();

        masters
            .iter()
            .map(|master| {
                let mut closure = Vec::new();
                sources.graph.traverse(master.id, |id, _| match sources.zones.zone(id) {
                    Some(node) if node.is_active() => {
                        closure.push(WorkItem::Publish(node));
                        Visit::Expand
                    }
                    Some(node) => {
                        closure.push(WorkItem::Skip {
                            zone_id: id,
                            node: Some(node),
                            reason: "zone is not active",
                        });
                        Visit::Prune
                    }
                    None => {
                        closure.push(WorkItem::Skip {
                            zone_id: id,
                            node: None,
                            reason: "zone not found",
                        });
                        Visit::Prune
                    }
                });
                MasterPlan {
                    master: master.clone(),
                    closure,
                }
            })
            .collect()
    }

    async fn process(
        &self,
        item: WorkItem,
        failed_includes: Vec<ZoneId>,
        claimed: &DashSet<ZoneId>,
        basedir: &Path,
        triggered_by: Option<&str>,
    ) -> Option<FileResult> {
        if !claimed.insert(item.zone_id()) {
            debug!(zone_id = item.zone_id(), "Zone already handled in this run");
            return None;
        }

        let result = match item {
            WorkItem::Publish(node) if !failed_includes.is_empty() => {
                let ids: Vec<String> = failed_includes.iter().map(ZoneId::to_string).collect();
                warn!(
                    zone_id = node.id,
                    failed_includes = %ids.join(","),
                    "Holding back zone file with failed includes"
                );
                let err = ZoneError::DependencyFailed(format!(
                    "{} references failed include(s) {}",
                    node.name,
                    ids.join(", ")
                ));
                FileResult::failed(&node, &err)
            }
            WorkItem::Publish(node) => self.publish_node(&node, basedir, triggered_by).await,
            WorkItem::Skip {
                zone_id,
                node,
                reason,
            } => {
                debug!(zone_id, reason, "Skipping zone");
                FileResult {
                    zone_id,
                    name: node.as_ref().map(|n| n.name.clone()).unwrap_or_default(),
                    kind: node.as_ref().map(|n| n.kind),
                    status: FileStatus::Skipped,
                    file_path: None,
                    error: Some(reason.to_string()),
                    failure_kind: None,
                    validation_output: None,
                }
            }
        };

        if let (Some(metrics), Some(kind)) = (&self.metrics, result.kind) {
            metrics.record_published_file(kind, &result.status.to_string());
        }
        Some(result)
    }

    /// Generate, validate and write one zone file
    async fn publish_node(
        &self,
        node: &ZoneNode,
        basedir: &Path,
        triggered_by: Option<&str>,
    ) -> FileResult {
        let artifact = match self
            .validator
            .synthesizer()
            .generate_node(node, EmitMode::Directive, None)
        {
            Ok(artifact) => artifact,
            Err(e) => {
                warn!(zone_id = node.id, error = %e, "Zone generation failed");
                return FileResult::failed(node, &e);
            }
        };

        let validation = match self
            .validator
            .validate_artifact(node, &artifact, triggered_by)
            .await
        {
            Ok(validation) => validation,
            Err(e) => {
                warn!(zone_id = node.id, error = %e, "Zone validation could not run");
                return FileResult::failed(node, &e);
            }
        };

        if !validation.passed() {
            let err = ZoneError::ValidationFailed(format!("{} did not pass validation", node.name));
            return FileResult {
                validation_output: Some(validation.output),
                ..FileResult::failed(node, &err)
            };
        }

        let target = match relative_path(node) {
            Ok(relative) => basedir.join(relative),
            Err(e) => return FileResult::failed(node, &e),
        };

        if let Err(e) = write_atomic(&target, artifact.content.as_bytes()).await {
            error!(
                zone_id = node.id,
                path = %target.display(),
                "Failed to write zone file: {}", e
            );
            return FileResult::failed(node, &e);
        }

        info!(
            zone_id = node.id,
            zone_name = %node.name,
            file_path = %target.display(),
            "Zone file published"
        );
        FileResult {
            file_path: Some(target),
            ..FileResult::for_node(node, FileStatus::Success)
        }
    }
}

/// Write to a temporary sibling first, then rename into place
async fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let mut temp_path = path.as_os_str().to_owned();
    temp_path.push(".tmp");
    let temp_path = PathBuf::from(temp_path);

    fs::write(&temp_path, data).await?;
    if let Err(e) = fs::rename(&temp_path, path).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(e.into());
    }
    Ok(())
}

async fn persist_report(report: &PublishReport, path: &Path) -> Result<()> {
    let json = serde_json::to_vec_pretty(report)
        .map_err(|e| ZoneError::Io(format!("failed to serialize report: {}", e)))?;
    write_atomic(path, &json).await?;
    debug!(path = %path.display(), "Publish report saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(zone_id: ZoneId, status: FileStatus) -> FileResult {
        FileResult {
            zone_id,
            name: format!("zone{}", zone_id),
            kind: Some(ZoneKind::Include),
            status,
            file_path: None,
            error: None,
            failure_kind: None,
            validation_output: None,
        }
    }

    #[test]
    fn test_summary_all_success() {
        let report = PublishReport::summarize(
            Uuid::new_v4(),
            Utc::now(),
            2,
            vec![file(1, FileStatus::Success), file(2, FileStatus::Success)],
        );
        assert!(report.success);
        assert_eq!(report.total_files, 2);
        assert_eq!(report.message, "All 2 zones published successfully");
    }

    #[test]
    fn test_summary_with_failures_and_skips() {
        let report = PublishReport::summarize(
            Uuid::new_v4(),
            Utc::now(),
            1,
            vec![
                file(1, FileStatus::Success),
                file(2, FileStatus::Failed),
                file(3, FileStatus::Skipped),
            ],
        );
        assert!(!report.success);
        assert_eq!(report.total_files, 2);
        assert_eq!(report.skipped_count, 1);
        assert_eq!(report.message, "1 zones published, 1 failed (1 skipped)");
        assert_eq!(report.file(2).unwrap().status, FileStatus::Failed);
    }

    #[tokio::test]
    async fn test_write_atomic_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested/db.example.com");
        write_atomic(&target, b"$TTL 3600\n").await.unwrap();

        assert_eq!(std::fs::read_to_string(&target).unwrap(), "$TTL 3600\n");
        assert!(!dir.path().join("nested/db.example.com.tmp").exists());
    }
}
