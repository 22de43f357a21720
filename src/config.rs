use crate::error::ConfigError;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

const ENV_PREFIX: &str = "ZONEKEEPER_";

#[derive(Debug, Clone, PartialEq)]
pub struct PublisherConfig {
    /// Target directory for published zone files (None = publishing disabled)
    pub bind_basedir: Option<PathBuf>,

    /// Path or name of the external zone syntax checker
    pub checkzone_path: PathBuf,

    /// Upper bound on a single checker run
    pub checker_timeout: Duration,

    /// Keep validation scratch directories for debugging
    pub keep_scratch: bool,

    /// Parent directory for validation scratch trees
    pub scratch_root: PathBuf,

    /// Where full checker output is retained
    pub validation_log_dir: PathBuf,

    /// Number of leading checker output lines stored with a result
    pub output_excerpt_lines: usize,

    /// Run validations inline instead of queueing them
    pub validate_sync: bool,

    /// Concurrent files processed by a publish run
    pub publish_workers: usize,

    /// Extra NS hosts emitted after the primary name server
    pub nameservers: Vec<String>,

    /// Where the last publish report is written as JSON (None = not persisted)
    pub report_path: Option<PathBuf>,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        let tmp = std::env::temp_dir();
        Self {
            bind_basedir: None,
            checkzone_path: PathBuf::from("named-checkzone"),
            checker_timeout: Duration::from_secs(30),
            keep_scratch: false,
            validation_log_dir: tmp.join("zonekeeper_validation_logs"),
            scratch_root: tmp,
            output_excerpt_lines: 40,
            validate_sync: false,
            publish_workers: 4,
            nameservers: vec![],
            report_path: None,
        }
    }
}

impl PublisherConfig {
    /// Create a PublisherConfig from environment variables
    /// Returns Err if critical configuration is invalid
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Self::from_env`] but reads variables through `lookup`
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));
        let mut config = Self::default();

        if let Some(basedir) = var("BIND_BASEDIR") {
            let basedir = basedir.trim();
            if !basedir.is_empty() {
                config.bind_basedir = Some(PathBuf::from(basedir));
            }
        }

        if let Some(checker) = var("NAMED_CHECKZONE") {
            if !checker.trim().is_empty() {
                config.checkzone_path = PathBuf::from(checker.trim());
            }
        }

        if let Some(timeout_str) = var("CHECK_TIMEOUT") {
            let timeout_secs = timeout_str
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidTimeout(timeout_str.clone()))?;
            config.checker_timeout = Duration::from_secs(timeout_secs);
        }

        // The legacy job flag still works when the prefixed one is absent
        if let Some(keep) = var("KEEP_TMP").or_else(|| lookup("JOBS_KEEP_TMP")) {
            config.keep_scratch = parse_bool(&keep, false);
        }

        if let Some(scratch) = var("SCRATCH_DIR") {
            if !scratch.trim().is_empty() {
                config.scratch_root = PathBuf::from(scratch.trim());
            }
        }

        if let Some(log_dir) = var("VALIDATION_LOG_DIR") {
            if !log_dir.trim().is_empty() {
                config.validation_log_dir = PathBuf::from(log_dir.trim());
            }
        }

        if let Some(lines) = var("OUTPUT_EXCERPT_LINES") {
            config.output_excerpt_lines = lines
                .trim()
                .parse::<usize>()
                .map_err(|_| ConfigError::InvalidExcerpt(lines.clone()))?;
        }

        if let Some(sync) = var("VALIDATE_SYNC") {
            config.validate_sync = parse_bool(&sync, false);
        }

        if let Some(workers) = var("PUBLISH_WORKERS") {
            config.publish_workers = workers
                .trim()
                .parse::<usize>()
                .map_err(|_| ConfigError::InvalidWorkers(workers.clone()))?;
        }

        if let Some(nameservers) = var("NAMESERVERS") {
            config.nameservers = split_list(&nameservers);
        }

        if let Some(report) = var("REPORT_PATH") {
            let report = report.trim();
            config.report_path = if report.is_empty() || report.eq_ignore_ascii_case("disabled") {
                None
            } else {
                Some(PathBuf::from(report))
            };
        }

        config.validate()?;

        Ok(config)
    }

    /// Parse a full configuration from TOML, starting from defaults
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let value: toml::Value =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        let mut config = Self::default();
        config.apply_partial_update(&value)?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::ParseError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Apply the keys present in `update`, leaving the rest untouched
    pub fn apply_partial_update(&mut self, update: &toml::Value) -> Result<(), ConfigError> {
        let table = update
            .as_table()
            .ok_or_else(|| ConfigError::ParseError("Expected a TOML table".to_string()))?;

        for (key, value) in table {
            match key.as_str() {
                "bind_basedir" => {
                    self.bind_basedir = optional_path(key, value)?;
                }
                "checkzone_path" => {
                    self.checkzone_path = PathBuf::from(expect_str(key, value)?);
                }
                "checker_timeout" => {
                    let secs = expect_int(key, value)?;
                    let secs = u64::try_from(secs)
                        .map_err(|_| ConfigError::InvalidTimeout(secs.to_string()))?;
                    self.checker_timeout = Duration::from_secs(secs);
                }
                "keep_scratch" => {
                    self.keep_scratch = expect_bool(key, value)?;
                }
                "scratch_root" => {
                    self.scratch_root = PathBuf::from(expect_str(key, value)?);
                }
                "validation_log_dir" => {
                    self.validation_log_dir = PathBuf::from(expect_str(key, value)?);
                }
                "output_excerpt_lines" => {
                    let lines = expect_int(key, value)?;
                    self.output_excerpt_lines = usize::try_from(lines)
                        .map_err(|_| ConfigError::InvalidExcerpt(lines.to_string()))?;
                }
                "validate_sync" => {
                    self.validate_sync = expect_bool(key, value)?;
                }
                "publish_workers" => {
                    let workers = expect_int(key, value)?;
                    self.publish_workers = usize::try_from(workers)
                        .map_err(|_| ConfigError::InvalidWorkers(workers.to_string()))?;
                }
                "nameservers" => {
                    self.nameservers = match value {
                        toml::Value::String(s) => split_list(s),
                        toml::Value::Array(items) => items
                            .iter()
                            .filter_map(|v| v.as_str())
                            .map(|s| s.trim().to_string())
                            .filter(|s| !s.is_empty())
                            .collect(),
                        _ => {
                            return Err(ConfigError::ParseError(format!(
                                "{} must be a string or an array of strings",
                                key
                            )));
                        }
                    };
                }
                "report_path" => {
                    self.report_path = optional_path(key, value)?;
                }
                other => {
                    debug!("Ignoring unknown configuration key: {}", other);
                }
            }
        }

        self.validate()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let timeout = self.checker_timeout.as_secs();
        if timeout == 0 {
            return Err(ConfigError::InvalidTimeout(
                "Timeout must be greater than 0".to_string(),
            ));
        }
        if timeout > 600 {
            return Err(ConfigError::InvalidTimeout(
                "Timeout too large (max 600 seconds)".to_string(),
            ));
        }

        if self.publish_workers == 0 || self.publish_workers > 64 {
            return Err(ConfigError::InvalidWorkers(format!(
                "Publish workers must be between 1 and 64, got {}",
                self.publish_workers
            )));
        }

        if self.output_excerpt_lines == 0 {
            return Err(ConfigError::InvalidExcerpt(
                "Excerpt must keep at least one line".to_string(),
            ));
        }

        Ok(())
    }

    /// Publish pre-flight: the base directory must be set, exist and be writable
    pub fn check_publish_target(&self) -> Result<&Path, ConfigError> {
        let basedir = self
            .bind_basedir
            .as_deref()
            .ok_or(ConfigError::BaseDirUnset)?;

        if !basedir.is_dir() {
            return Err(ConfigError::BaseDirMissing(basedir.to_path_buf()));
        }

        // Permission bits lie for root and ACLs; try an actual write
        tempfile::Builder::new()
            .prefix(".zonekeeper_probe_")
            .tempfile_in(basedir)
            .map_err(|_| ConfigError::BaseDirNotWritable(basedir.to_path_buf()))?;

        Ok(basedir)
    }
}

/// Parse a boolean from a string, with a default value for invalid input
pub(crate) fn parse_bool(s: &str, default: bool) -> bool {
    match s.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => true,
        "false" | "0" | "no" | "off" => false,
        _ => default,
    }
}

fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn expect_str<'a>(key: &str, value: &'a toml::Value) -> Result<&'a str, ConfigError> {
    value
        .as_str()
        .ok_or_else(|| ConfigError::ParseError(format!("{} must be a string", key)))
}

fn expect_int(key: &str, value: &toml::Value) -> Result<i64, ConfigError> {
    value
        .as_integer()
        .ok_or_else(|| ConfigError::ParseError(format!("{} must be an integer", key)))
}

fn expect_bool(key: &str, value: &toml::Value) -> Result<bool, ConfigError> {
    match value {
        toml::Value::Boolean(b) => Ok(*b),
        toml::Value::String(s) => Ok(parse_bool(s, false)),
        _ => Err(ConfigError::ParseError(format!("{} must be a boolean", key))),
    }
}

fn optional_path(key: &str, value: &toml::Value) -> Result<Option<PathBuf>, ConfigError> {
    let s = expect_str(key, value)?.trim();
    Ok(if s.is_empty() {
        None
    } else {
        Some(PathBuf::from(s))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = PublisherConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.output_excerpt_lines, 40);
        assert_eq!(config.checkzone_path, PathBuf::from("named-checkzone"));
        assert!(config.bind_basedir.is_none());
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = PublisherConfig::from_lookup(lookup(&[
            ("ZONEKEEPER_BIND_BASEDIR", "/var/named"),
            ("ZONEKEEPER_CHECK_TIMEOUT", "10"),
            ("ZONEKEEPER_PUBLISH_WORKERS", "8"),
            ("ZONEKEEPER_NAMESERVERS", "ns2.example.com, ns3.example.com,"),
            ("ZONEKEEPER_VALIDATE_SYNC", "yes"),
        ]))
        .unwrap();

        assert_eq!(config.bind_basedir, Some(PathBuf::from("/var/named")));
        assert_eq!(config.checker_timeout, Duration::from_secs(10));
        assert_eq!(config.publish_workers, 8);
        assert_eq!(config.nameservers, vec!["ns2.example.com", "ns3.example.com"]);
        assert!(config.validate_sync);
    }

    #[test]
    fn test_legacy_keep_tmp_flag() {
        let config = PublisherConfig::from_lookup(lookup(&[("JOBS_KEEP_TMP", "1")])).unwrap();
        assert!(config.keep_scratch);

        let config = PublisherConfig::from_lookup(lookup(&[
            ("JOBS_KEEP_TMP", "1"),
            ("ZONEKEEPER_KEEP_TMP", "0"),
        ]))
        .unwrap();
        assert!(!config.keep_scratch);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            PublisherConfig::from_lookup(lookup(&[("ZONEKEEPER_CHECK_TIMEOUT", "abc")])),
            Err(ConfigError::InvalidTimeout(_))
        ));
        assert!(matches!(
            PublisherConfig::from_lookup(lookup(&[("ZONEKEEPER_CHECK_TIMEOUT", "0")])),
            Err(ConfigError::InvalidTimeout(_))
        ));
        assert!(matches!(
            PublisherConfig::from_lookup(lookup(&[("ZONEKEEPER_PUBLISH_WORKERS", "100")])),
            Err(ConfigError::InvalidWorkers(_))
        ));
        assert!(matches!(
            PublisherConfig::from_lookup(lookup(&[("ZONEKEEPER_OUTPUT_EXCERPT_LINES", "0")])),
            Err(ConfigError::InvalidExcerpt(_))
        ));
    }

    #[test]
    fn test_partial_update() {
        let mut config = PublisherConfig::default();
        let update: toml::Value = toml::from_str(
            r#"
            checker_timeout = 5
            nameservers = ["ns2.example.com"]
            report_path = "/tmp/report.json"
            "#,
        )
        .unwrap();

        config.apply_partial_update(&update).unwrap();
        assert_eq!(config.checker_timeout, Duration::from_secs(5));
        assert_eq!(config.nameservers, vec!["ns2.example.com"]);
        assert_eq!(config.report_path, Some(PathBuf::from("/tmp/report.json")));
        assert_eq!(config.publish_workers, 4);
    }

    #[test]
    fn test_partial_update_type_mismatch() {
        let mut config = PublisherConfig::default();
        let update: toml::Value = toml::from_str("publish_workers = \"many\"").unwrap();
        assert!(matches!(
            config.apply_partial_update(&update),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_publish_target_checks() {
        let config = PublisherConfig::default();
        assert_eq!(
            config.check_publish_target().unwrap_err(),
            ConfigError::BaseDirUnset
        );

        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing");
        let config = PublisherConfig {
            bind_basedir: Some(missing.clone()),
            ..Default::default()
        };
        assert_eq!(
            config.check_publish_target().unwrap_err(),
            ConfigError::BaseDirMissing(missing)
        );

        let config = PublisherConfig {
            bind_basedir: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        assert_eq!(config.check_publish_target().unwrap(), dir.path());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("true", false));
        assert!(parse_bool("TRUE", false));
        assert!(parse_bool("1", false));
        assert!(parse_bool("yes", false));
        assert!(parse_bool("on", false));

        assert!(!parse_bool("false", true));
        assert!(!parse_bool("0", true));
        assert!(!parse_bool("no", true));
        assert!(!parse_bool("off", true));

        assert!(parse_bool("invalid", true));
        assert!(!parse_bool("invalid", false));
    }
}
