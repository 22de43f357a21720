//! Shared fixtures for the zonekeeper integration tests

#![allow(dead_code)] // Not every test file uses every helper

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use zonekeeper::checker::{CheckOutcome, ZoneChecker};
use zonekeeper::config::PublisherConfig;
use zonekeeper::error::{Result, ZoneError};
use zonekeeper::model::{ZoneId, ZoneNode};
use zonekeeper::validation::ZoneValidator;
use zonekeeper::zone::record::{RecordData, ResourceRecord};
use zonekeeper::zone::{IncludeGraph, MemoryCatalog, SerialGenerator, ZoneSources, ZoneSynthesizer};

/// Serial every fixture synthesizer starts after
pub const BASE_SERIAL: u32 = 2025010100;

pub fn a_record(name: &str, address: &str) -> ResourceRecord {
    ResourceRecord::new(
        name,
        RecordData::A {
            address: address.to_string(),
        },
    )
}

pub fn mx_record(name: &str, preference: u16, exchange: &str) -> ResourceRecord {
    ResourceRecord::new(
        name,
        RecordData::Mx {
            preference,
            exchange: exchange.to_string(),
        },
    )
}

/// What the fake checker answers
#[derive(Debug, Clone)]
pub enum Verdict {
    Pass,
    Reject(String),
    /// No verdict, as for a missing binary or a timeout
    Unavailable,
}

/// One recorded checker invocation
#[derive(Debug, Clone)]
pub struct CheckCall {
    pub zone_name: String,
    pub file: PathBuf,
    pub workdir: PathBuf,
    /// Staged master content as seen by the checker
    pub content: String,
    /// Every file present below the working directory, relative to it
    pub staged_files: Vec<String>,
}

/// In-process checker with scripted verdicts per zone name
#[derive(Default)]
pub struct FakeChecker {
    verdicts: Mutex<HashMap<String, Verdict>>,
    calls: Mutex<Vec<CheckCall>>,
}

impl FakeChecker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_verdict(&self, zone_name: &str, verdict: Verdict) {
        self.verdicts.lock().insert(zone_name.to_string(), verdict);
    }

    pub fn calls(&self) -> Vec<CheckCall> {
        self.calls.lock().clone()
    }

    pub fn calls_for(&self, zone_name: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.zone_name == zone_name)
            .count()
    }
}

fn list_files(root: &Path, dir: &Path, out: &mut Vec<String>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            list_files(root, &path, out);
        } else if let Ok(relative) = path.strip_prefix(root) {
            out.push(relative.to_string_lossy().replace('\\', "/"));
        }
    }
}

#[async_trait]
impl ZoneChecker for FakeChecker {
    async fn check(&self, zone_name: &str, file: &Path, workdir: &Path) -> Result<CheckOutcome> {
        let mut staged_files = Vec::new();
        list_files(workdir, workdir, &mut staged_files);
        staged_files.sort();

        self.calls.lock().push(CheckCall {
            zone_name: zone_name.to_string(),
            file: file.to_path_buf(),
            workdir: workdir.to_path_buf(),
            content: std::fs::read_to_string(file).unwrap_or_default(),
            staged_files,
        });

        let verdict = self
            .verdicts
            .lock()
            .get(zone_name)
            .cloned()
            .unwrap_or(Verdict::Pass);

        match verdict {
            Verdict::Pass => Ok(CheckOutcome {
                success: true,
                exit_code: Some(0),
                output: format!("zone {}/IN: loaded serial {}\nOK\n", zone_name, BASE_SERIAL),
            }),
            Verdict::Reject(reason) => Ok(CheckOutcome {
                success: false,
                exit_code: Some(1),
                output: format!("{}\nzone {}/IN: not loaded due to errors.\n", reason, zone_name),
            }),
            Verdict::Unavailable => Err(ZoneError::ExternalTool(
                "checker binary not found: named-checkzone".to_string(),
            )),
        }
    }
}

/// Catalog, graph and directories for one test
pub struct Fixture {
    pub catalog: Arc<MemoryCatalog>,
    pub graph: Arc<IncludeGraph>,
    pub checker: Arc<FakeChecker>,
    pub config: PublisherConfig,
    pub scratch: TempDir,
    pub logs: TempDir,
    pub target: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        let scratch = tempfile::tempdir().expect("scratch dir");
        let logs = tempfile::tempdir().expect("log dir");
        let target = tempfile::tempdir().expect("target dir");

        let config = PublisherConfig {
            bind_basedir: Some(target.path().to_path_buf()),
            scratch_root: scratch.path().to_path_buf(),
            validation_log_dir: logs.path().to_path_buf(),
            checker_timeout: Duration::from_secs(5),
            ..Default::default()
        };

        Self {
            catalog: Arc::new(MemoryCatalog::new()),
            graph: Arc::new(IncludeGraph::new()),
            checker: FakeChecker::new(),
            config,
            scratch,
            logs,
            target,
        }
    }

    pub fn add(&self, zone: ZoneNode) -> ZoneId {
        let id = zone.id;
        self.catalog.insert_zone(zone);
        id
    }

    pub fn attach(&self, parent: ZoneId, include: ZoneId, position: i32) {
        self.graph
            .attach(self.catalog.as_ref(), parent, include, position)
            .expect("attach");
    }

    pub fn sources(&self) -> ZoneSources {
        ZoneSources::from_catalog(self.catalog.clone(), self.graph.clone())
    }

    pub fn synthesizer(&self) -> ZoneSynthesizer {
        ZoneSynthesizer::new(self.sources())
            .with_serials(Arc::new(SerialGenerator::starting_after(BASE_SERIAL)))
            .with_nameservers(self.config.nameservers.clone())
    }

    pub fn validator(&self) -> ZoneValidator {
        ZoneValidator::new(
            self.synthesizer(),
            self.checker.clone(),
            self.catalog.clone(),
            &self.config,
        )
    }

    pub fn validator_with(&self, checker: Arc<dyn ZoneChecker>) -> ZoneValidator {
        ZoneValidator::new(self.synthesizer(), checker, self.catalog.clone(), &self.config)
    }

    /// Entries left in the scratch root
    pub fn scratch_entries(&self) -> usize {
        std::fs::read_dir(self.scratch.path())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    pub fn target_files(&self) -> Vec<String> {
        let mut files = Vec::new();
        list_files(self.target.path(), self.target.path(), &mut files);
        files.sort();
        files
    }
}
