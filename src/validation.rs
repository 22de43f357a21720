use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::checker::ZoneChecker;
use crate::config::PublisherConfig;
use crate::error::{Result, ZoneError};
use crate::metrics::ZoneMetrics;
use crate::model::{ZoneId, ZoneNode};
use crate::zone::names::{bare_domain, relative_path};
use crate::zone::store::ValidationStore;
use crate::zone::synth::{EmitMode, GeneratedArtifact, ZoneSynthesizer};

const SCRATCH_PREFIX: &str = "zonekeeper_validate_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    Passed,
    Failed,
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationStatus::Passed => write!(f, "passed"),
            ValidationStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Stored verdict for one zone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub zone_id: ZoneId,
    pub status: ValidationStatus,
    /// Bounded excerpt of the checker output
    pub output: String,
    /// Retained file holding the full checker output
    pub log_path: Option<PathBuf>,
    /// Opaque caller identity
    pub triggered_by: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl ValidationResult {
    pub fn new(zone_id: ZoneId, status: ValidationStatus, output: impl Into<String>) -> Self {
        Self {
            zone_id,
            status,
            output: output.into(),
            log_path: None,
            triggered_by: None,
            checked_at: Utc::now(),
        }
    }

    pub fn passed(&self) -> bool {
        self.status == ValidationStatus::Passed
    }
}

/// What a validate call produced
#[derive(Debug, Clone, PartialEq)]
pub enum ValidateOutcome {
    /// The check ran inline and its result was stored
    Completed(ValidationResult),
    /// The check was handed to the queue worker; carries the last stored result
    Queued {
        last_known: Option<ValidationResult>,
    },
}

/// Keep the log reference and the first `max_lines` lines of checker output
pub fn summarize_output(log_path: Option<&Path>, output: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = output.lines().collect();
    let kept = lines.len().min(max_lines);

    let mut summary = String::new();
    if let Some(path) = log_path {
        summary.push_str(&format!("Validation log file: {}\n\n", path.display()));
    }
    summary.push_str(&lines[..kept].join("\n"));
    if lines.len() > kept {
        summary.push_str(&format!(
            "\n... ({} more lines, see log file)",
            lines.len() - kept
        ));
    }
    summary
}

/// Runs the external checker against staged zone files and records verdicts
#[derive(Clone)]
pub struct ZoneValidator {
    synthesizer: ZoneSynthesizer,
    checker: Arc<dyn ZoneChecker>,
    store: Arc<dyn ValidationStore>,
    metrics: Option<Arc<ZoneMetrics>>,
    queue: Option<ValidationQueue>,
    scratch_root: PathBuf,
    log_dir: PathBuf,
    keep_scratch: bool,
    excerpt_lines: usize,
}

impl ZoneValidator {
    pub fn new(
        synthesizer: ZoneSynthesizer,
        checker: Arc<dyn ZoneChecker>,
        store: Arc<dyn ValidationStore>,
        config: &PublisherConfig,
    ) -> Self {
        Self {
            synthesizer,
            checker,
            store,
            metrics: None,
            queue: None,
            scratch_root: config.scratch_root.clone(),
            log_dir: config.validation_log_dir.clone(),
            keep_scratch: config.keep_scratch,
            excerpt_lines: config.output_excerpt_lines,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<ZoneMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Route asynchronous validate calls through `queue`
    pub fn with_queue(mut self, queue: ValidationQueue) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn synthesizer(&self) -> &ZoneSynthesizer {
        &self.synthesizer
    }

    /// Validate a zone.
    ///
    /// With `synchronous = false` and a queue attached, the check is handed to
    /// the queue worker and the last stored result comes back immediately.
    /// Without a queue the check always runs inline.
    pub async fn validate(
        &self,
        zone_id: ZoneId,
        synchronous: bool,
        triggered_by: Option<&str>,
    ) -> Result<ValidateOutcome> {
        if !synchronous {
            if let Some(queue) = &self.queue {
                let request = ValidationRequest {
                    zone_id,
                    triggered_by: triggered_by.map(str::to_string),
                };
                if queue.enqueue(request) {
                    return Ok(ValidateOutcome::Queued {
                        last_known: self.store.latest_validation(zone_id),
                    });
                }
                warn!(zone_id, "Validation queue closed, validating inline");
            }
        }

        let result = self.run_and_store(zone_id, triggered_by).await?;
        Ok(ValidateOutcome::Completed(result))
    }

    /// Generate directive content for a zone, check it and store the verdict
    pub async fn run_and_store(
        &self,
        zone_id: ZoneId,
        triggered_by: Option<&str>,
    ) -> Result<ValidationResult> {
        let node = self.synthesizer.sources().zone(zone_id)?;
        let artifact = self
            .synthesizer
            .generate_node(&node, EmitMode::Directive, None)?;
        self.validate_artifact(&node, &artifact, triggered_by).await
    }

    /// Check already generated content for `node` and store the verdict.
    ///
    /// Masters go through the external checker; includes only get a
    /// non-empty check since a fragment cannot be checked on its own.
    pub async fn validate_artifact(
        &self,
        node: &ZoneNode,
        artifact: &GeneratedArtifact,
        triggered_by: Option<&str>,
    ) -> Result<ValidationResult> {
        let mut result = if node.is_master() {
            self.check_master(node, artifact).await?
        } else {
            check_include(node, artifact)
        };
        result.triggered_by = triggered_by.map(str::to_string);

        if let Some(metrics) = &self.metrics {
            metrics.record_validation(node.kind, &result.status.to_string());
        }

        info!(
            zone_id = node.id,
            zone_name = %node.name,
            status = %result.status,
            "Zone validation completed"
        );
        self.store.store_validation(result.clone());
        Ok(result)
    }

    async fn check_master(
        &self,
        node: &ZoneNode,
        artifact: &GeneratedArtifact,
    ) -> Result<ValidationResult> {
        let scratch = tempfile::Builder::new()
            .prefix(SCRATCH_PREFIX)
            .tempdir_in(&self.scratch_root)?;

        let outcome = self.stage_and_check(node, artifact, scratch.path()).await;

        if self.keep_scratch {
            let kept = scratch.keep();
            info!(
                zone_id = node.id,
                path = %kept.display(),
                "Keeping validation scratch directory"
            );
        } else {
            let path = scratch.path().to_path_buf();
            if let Err(e) = scratch.close() {
                error!(
                    zone_id = node.id,
                    path = %path.display(),
                    "Failed to remove validation scratch directory: {}", e
                );
            }
        }

        outcome
    }

    /// Write the master and every reachable include into `scratch`, then run
    /// the checker with `scratch` as working directory
    async fn stage_and_check(
        &self,
        node: &ZoneNode,
        artifact: &GeneratedArtifact,
        scratch: &Path,
    ) -> Result<ValidationResult> {
        let master_file = scratch.join(relative_path(node)?);
        write_staged(&master_file, &artifact.content).await?;

        let sources = self.synthesizer.sources();
        for include in sources.graph.descendants(sources.zones.as_ref(), node.id) {
            let content = self
                .synthesizer
                .generate_node(&include, EmitMode::Directive, None)?;
            write_staged(&scratch.join(relative_path(&include)?), &content.content).await?;
        }

        let zone_name = bare_domain(&node.domain);
        let started = Instant::now();
        let outcome = self.checker.check(&zone_name, &master_file, scratch).await;
        let elapsed = started.elapsed();

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_checker_run("error", elapsed);
                }
                warn!(zone_id = node.id, error = %e, "Zone checker gave no verdict");
                return Err(e);
            }
        };

        let status = if outcome.success {
            ValidationStatus::Passed
        } else {
            ValidationStatus::Failed
        };
        if let Some(metrics) = &self.metrics {
            metrics.record_checker_run(&status.to_string(), elapsed);
        }
        debug!(
            zone_id = node.id,
            exit_code = ?outcome.exit_code,
            elapsed_ms = elapsed.as_millis() as u64,
            "Zone checker finished"
        );

        let log_path = self.retain_log(node.id, &outcome.output).await;
        let mut result = ValidationResult::new(
            node.id,
            status,
            summarize_output(log_path.as_deref(), &outcome.output, self.excerpt_lines),
        );
        result.log_path = log_path;
        Ok(result)
    }

    /// Keep the full checker output for operators; failure only loses the log
    async fn retain_log(&self, zone_id: ZoneId, output: &str) -> Option<PathBuf> {
        let path = self
            .log_dir
            .join(format!("zone_{}_validation_output.txt", zone_id));

        let written = async {
            tokio::fs::create_dir_all(&self.log_dir).await?;
            tokio::fs::write(&path, output).await
        }
        .await;

        match written {
            Ok(()) => Some(path),
            Err(e) => {
                warn!(
                    zone_id,
                    path = %path.display(),
                    "Failed to write validation log: {}", e
                );
                None
            }
        }
    }
}

fn check_include(node: &ZoneNode, artifact: &GeneratedArtifact) -> ValidationResult {
    let lines = artifact
        .content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .count();

    if lines == 0 {
        ValidationResult::new(node.id, ValidationStatus::Failed, "Include file is empty")
    } else {
        ValidationResult::new(
            node.id,
            ValidationStatus::Passed,
            format!(
                "Include file has {} non-empty lines; syntax is checked through its master zones",
                lines
            ),
        )
    }
}

async fn write_staged(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, content).await?;
    Ok(())
}

/// One out-of-band validation job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationRequest {
    pub zone_id: ZoneId,
    pub triggered_by: Option<String>,
}

/// Sending half of the out-of-band validation queue
#[derive(Debug, Clone)]
pub struct ValidationQueue {
    tx: mpsc::UnboundedSender<ValidationRequest>,
}

impl ValidationQueue {
    /// Start a worker that drains the queue with `worker`.
    ///
    /// The worker stops once every queue handle has been dropped.
    pub fn start(worker: ZoneValidator) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<ValidationRequest>();

        let handle = tokio::spawn(async move {
            info!("Validation queue worker started");
            while let Some(request) = rx.recv().await {
                process_request(&worker, request).await;
            }
            info!("Validation queue worker stopped");
        });

        (Self { tx }, handle)
    }

    /// Returns false when the worker is gone
    pub fn enqueue(&self, request: ValidationRequest) -> bool {
        debug!(zone_id = request.zone_id, "Queueing zone validation");
        self.tx.send(request).is_ok()
    }
}

async fn process_request(worker: &ZoneValidator, request: ValidationRequest) {
    let zone_id = request.zone_id;
    match worker
        .run_and_store(zone_id, request.triggered_by.as_deref())
        .await
    {
        Ok(result) => {
            debug!(zone_id, status = %result.status, "Queued validation finished");
        }
        Err(ZoneError::NotFound(_)) => {
            // The zone vanished between enqueue and execution
            warn!(zone_id, "Queued validation for missing zone");
            let mut result =
                ValidationResult::new(zone_id, ValidationStatus::Failed, "Zone file not found");
            result.triggered_by = request.triggered_by;
            worker.store.store_validation(result);
        }
        Err(e) => {
            error!(zone_id, error = %e, "Queued validation could not complete");
        }
    }
}
