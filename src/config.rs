//! Configuration for the transmission splitter.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Logical bucket name the full bucket name is derived from.
pub const MAIN_BUCKET: &str = "mainBucket";

/// Main configuration for a splitting run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Durable storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Local workspace configuration
    #[serde(default)]
    pub workspace: WorkspaceConfig,

    /// External separation tool configuration
    #[serde(default)]
    pub tool: ToolConfig,

    /// Processing configuration
    #[serde(default)]
    pub processing: ProcessingConfig,
}

/// Durable storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Full bucket name holding all transmissions.
    /// If unset, derived from `SLS_STAGE` and `SERVICE_NAME`.
    #[serde(default)]
    pub bucket: Option<String>,

    /// Local filesystem directory used instead of S3.
    /// Mutually exclusive with offline mode.
    #[serde(default)]
    pub local_path: Option<String>,

    /// Talk to a local S3 emulator instead of AWS
    #[serde(default)]
    pub offline: bool,

    /// Endpoint of the local S3 emulator
    #[serde(default = "default_offline_endpoint")]
    pub offline_endpoint: String,

    /// Region used when it cannot be read from the environment
    #[serde(default = "default_region")]
    pub region: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: None,
            local_path: None,
            offline: false,
            offline_endpoint: default_offline_endpoint(),
            region: default_region(),
        }
    }
}

impl StorageConfig {
    /// Check if storage is the local filesystem.
    pub fn is_local(&self) -> bool {
        self.local_path.is_some()
    }

    /// Fill in the bucket name from the environment if it was not given.
    ///
    /// `lookup` returns the value of an environment variable, treating empty
    /// values as unset.
    pub fn resolve_bucket<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.bucket.is_some() || self.is_local() {
            return Ok(());
        }
        let stage = lookup("SLS_STAGE").filter(|v| !v.is_empty());
        let service = lookup("SERVICE_NAME").filter(|v| !v.is_empty());
        match (stage, service) {
            (Some(stage), Some(service)) => {
                self.bucket = Some(full_bucket_name(&stage, &service, MAIN_BUCKET));
                Ok(())
            }
            _ => anyhow::bail!(
                "No bucket configured: set BUCKET_NAME, or both SLS_STAGE and SERVICE_NAME"
            ),
        }
    }
}

/// Build the deployed bucket name for a logical bucket, e.g. `dev-emptystream-mainBucket`.
pub fn full_bucket_name(stage: &str, service: &str, bucket: &str) -> String {
    format!("{stage}-{service}-{bucket}")
}

/// Local workspace configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Root under which per-job directories are created
    #[serde(default = "default_tmp_root")]
    pub tmp_root: PathBuf,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self { tmp_root: default_tmp_root() }
    }
}

/// External separation tool configuration.
///
/// The tool is run as `<program> <args...> <source path>` inside `working_dir`
/// and is expected to write stems to `<working_dir>/<output_dir>/<job id>/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Executable to launch
    #[serde(default = "default_program")]
    pub program: String,

    /// Arguments placed before the source path
    #[serde(default = "default_args")]
    pub args: Vec<String>,

    /// Working directory of the tool
    #[serde(default = "default_working_dir")]
    pub working_dir: PathBuf,

    /// Output directory of the tool, relative to `working_dir`
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_args(),
            working_dir: default_working_dir(),
            output_dir: default_output_dir(),
        }
    }
}

impl ToolConfig {
    /// Directory the tool writes stems into, before the per-job component.
    pub fn output_root(&self) -> PathBuf {
        self.working_dir.join(&self.output_dir)
    }
}

/// Processing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Log a metrics summary after the run
    #[serde(default = "default_true")]
    pub enable_metrics: bool,

    /// Optional path to save metrics JSON after the run completes
    #[serde(default)]
    pub metrics_output_path: Option<String>,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            enable_metrics: true,
            metrics_output_path: None,
        }
    }
}

impl Config {
    /// Load configuration from a YAML or JSON file.
    /// Format is auto-detected from file extension (.yaml, .yml, or .json).
    pub fn from_file(path: &PathBuf) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        let config: Config = match ext {
            "json" => serde_json::from_str(&contents)?,
            // YAML is a superset of JSON
            _ => serde_yaml::from_str(&contents)?,
        };
        Ok(config)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        match (&self.storage.local_path, &self.storage.bucket, self.storage.offline) {
            (Some(_), _, true) => {
                anyhow::bail!("Cannot use both local_path and offline storage");
            }
            (None, None, _) => {
                anyhow::bail!("Must specify either local_path or a bucket");
            }
            _ => {}
        }

        if self.tool.program.trim().is_empty() {
            anyhow::bail!("Tool program must not be empty");
        }
        if self.tool.output_dir.is_absolute() {
            anyhow::bail!("Tool output_dir must be relative to the tool working directory");
        }
        if self.workspace.tmp_root.as_os_str().is_empty() {
            anyhow::bail!("Workspace tmp_root must not be empty");
        }
        Ok(())
    }
}

// Default value functions for serde
fn default_offline_endpoint() -> String { "http://localhost:4569".to_string() }
fn default_region() -> String { "us-east-1".to_string() }
fn default_tmp_root() -> PathBuf { PathBuf::from("tmp") }
fn default_program() -> String { "python".to_string() }
fn default_args() -> Vec<String> { vec!["-u".to_string(), "-m".to_string(), "demucs".to_string()] }
fn default_working_dir() -> PathBuf { PathBuf::from(".") }
fn default_output_dir() -> PathBuf { PathBuf::from("split/htdemucs") }
fn default_true() -> bool { true }

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_tool_invocation() {
        let tool = ToolConfig::default();
        assert_eq!(tool.program, "python");
        assert_eq!(tool.args, vec!["-u", "-m", "demucs"]);
        assert_eq!(tool.output_root(), PathBuf::from("./split/htdemucs"));
    }

    #[test]
    fn test_from_yaml_fills_defaults() {
        let config = Config::from_yaml(
            r#"
storage:
  bucket: "dev-emptystream-mainBucket"
tool:
  program: "python3"
"#,
        )
        .unwrap();

        assert_eq!(config.storage.bucket.as_deref(), Some("dev-emptystream-mainBucket"));
        assert_eq!(config.storage.offline_endpoint, "http://localhost:4569");
        assert_eq!(config.tool.program, "python3");
        assert_eq!(config.tool.args, vec!["-u", "-m", "demucs"]);
        assert_eq!(config.workspace.tmp_root, PathBuf::from("tmp"));
        assert!(config.processing.enable_metrics);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_resolve_bucket_from_stage_and_service() {
        let mut storage = StorageConfig::default();
        storage
            .resolve_bucket(env(&[("SLS_STAGE", "dev"), ("SERVICE_NAME", "emptystream")]))
            .unwrap();
        assert_eq!(storage.bucket.as_deref(), Some("dev-emptystream-mainBucket"));
    }

    #[test]
    fn test_resolve_bucket_keeps_explicit_bucket() {
        let mut storage = StorageConfig {
            bucket: Some("explicit".to_string()),
            ..Default::default()
        };
        storage.resolve_bucket(env(&[("SLS_STAGE", "dev"), ("SERVICE_NAME", "svc")])).unwrap();
        assert_eq!(storage.bucket.as_deref(), Some("explicit"));
    }

    #[test]
    fn test_resolve_bucket_missing_env() {
        let mut storage = StorageConfig::default();
        assert!(storage.resolve_bucket(env(&[("SLS_STAGE", "dev")])).is_err());
        assert!(storage
            .resolve_bucket(env(&[("SLS_STAGE", ""), ("SERVICE_NAME", "svc")]))
            .is_err());
    }

    #[test]
    fn test_config_validation_invalid() {
        // No destination at all
        assert!(Config::default().validate().is_err());

        // Local path and offline S3 together
        let mut config = Config::default();
        config.storage.local_path = Some("/tmp/store".to_string());
        config.storage.offline = true;
        assert!(config.validate().is_err());

        // Absolute tool output directory
        let mut config = Config::default();
        config.storage.bucket = Some("bucket".to_string());
        config.tool.output_dir = PathBuf::from("/separated");
        assert!(config.validate().is_err());
    }
}
