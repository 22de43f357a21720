use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::PublisherConfig;
use crate::error::{Result, ZoneError};

/// Verdict of one checker run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    /// True when the checker exited with status 0
    pub success: bool,
    pub exit_code: Option<i32>,
    /// Combined stdout and stderr
    pub output: String,
}

/// External zone syntax checker.
///
/// Implementations return `Ok` whenever the tool produced a verdict, even a
/// rejecting one. `Err(ZoneError::ExternalTool)` means no verdict could be
/// obtained.
#[async_trait]
pub trait ZoneChecker: Send + Sync {
    async fn check(&self, zone_name: &str, file: &Path, workdir: &Path) -> Result<CheckOutcome>;
}

/// Runs `named-checkzone <zone> <file>` as a subprocess
#[derive(Debug, Clone)]
pub struct NamedCheckzone {
    program: PathBuf,
    timeout: Duration,
}

impl NamedCheckzone {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    pub fn from_config(config: &PublisherConfig) -> Self {
        Self::new(&config.checkzone_path, config.checker_timeout)
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

#[async_trait]
impl ZoneChecker for NamedCheckzone {
    async fn check(&self, zone_name: &str, file: &Path, workdir: &Path) -> Result<CheckOutcome> {
        debug!(
            zone_name,
            file = %file.display(),
            checker = %self.program.display(),
            "Running zone checker"
        );

        let mut command = Command::new(&self.program);
        command
            .arg(zone_name)
            .arg(file)
            .current_dir(workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Dropping the output future on timeout kills the child
        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) if e.kind() == ErrorKind::NotFound => {
                return Err(ZoneError::ExternalTool(format!(
                    "checker binary not found: {}",
                    self.program.display()
                )));
            }
            Ok(Err(e)) => {
                return Err(ZoneError::ExternalTool(format!(
                    "failed to run {}: {}",
                    self.program.display(),
                    e
                )));
            }
            Err(_) => {
                warn!(
                    zone_name,
                    timeout_secs = self.timeout.as_secs_f64(),
                    "Zone checker timed out"
                );
                return Err(ZoneError::ExternalTool(format!(
                    "{} timed out after {:?}",
                    self.program.display(),
                    self.timeout
                )));
            }
        };

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.is_empty() {
            if !combined.is_empty() && !combined.ends_with('\n') {
                combined.push('\n');
            }
            combined.push_str(&stderr);
        }

        // Killed by a signal: no exit code and no verdict
        let exit_code = output.status.code();
        if exit_code.is_none() {
            return Err(ZoneError::ExternalTool(format!(
                "{} terminated abnormally: {}",
                self.program.display(),
                combined.trim()
            )));
        }

        Ok(CheckOutcome {
            success: output.status.success(),
            exit_code,
            output: combined,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_binary_is_external_tool_error() {
        let dir = tempfile::tempdir().unwrap();
        let checker = NamedCheckzone::new(
            dir.path().join("no-such-checker"),
            Duration::from_secs(5),
        );
        let err = checker
            .check("example.com", Path::new("db.example.com"), dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, ZoneError::ExternalTool(_)));
    }

    #[test]
    fn test_from_config() {
        let config = PublisherConfig {
            checkzone_path: PathBuf::from("/usr/sbin/named-checkzone"),
            ..Default::default()
        };
        let checker = NamedCheckzone::from_config(&config);
        assert_eq!(checker.program(), Path::new("/usr/sbin/named-checkzone"));
    }
}
