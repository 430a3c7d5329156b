// src/infra/config.rs — Configuration loading (TOML)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::infra::errors::ToolError;

/// Config file picked up from the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "futhark-tool.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub futhark: FutharkConfig,

    #[serde(default)]
    pub worker: WorkerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FutharkConfig {
    /// Compiler executable, looked up on PATH.
    pub compiler: String,
    /// Compiler backend, e.g. `c`, `multicore`, `opencl`, `cuda`.
    pub backend: String,
    /// Let the backend use its own internal parallelism.
    pub multithreaded: bool,
    /// Directory holding `<module>.fut` sources; compiled servers land next to them.
    pub source_dir: PathBuf,
    /// Passed to the C compiler through the `CFLAGS` environment variable.
    pub cflags: String,
}

impl Default for FutharkConfig {
    fn default() -> Self {
        Self {
            compiler: "futhark".into(),
            backend: "c".into(),
            multithreaded: false,
            source_dir: PathBuf::from("tools/futhark"),
            cflags: "-O3 -march=native -fno-math-errno".into(),
        }
    }
}

impl FutharkConfig {
    /// The backend actually handed to the compiler. Multithreaded runs always
    /// use the `multicore` backend.
    pub fn effective_backend(&self) -> &str {
        if self.multithreaded {
            "multicore"
        } else {
            &self.backend
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Grace period between closing a worker's stdin and killing it.
    pub stop_timeout_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            stop_timeout_ms: 2000,
        }
    }
}

impl WorkerConfig {
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

impl Config {
    /// Load config from `futhark-tool.toml` in the working directory, falling back to defaults.
    pub fn load() -> Result<Self, ToolError> {
        let path = Path::new(DEFAULT_CONFIG_FILE);
        if path.exists() {
            Self::load_from(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ToolError> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| ToolError::Config(format!("{}: {e}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_reasonable() {
        let c = Config::default();
        assert_eq!(c.futhark.compiler, "futhark");
        assert_eq!(c.futhark.backend, "c");
        assert!(!c.futhark.multithreaded);
        assert_eq!(c.futhark.source_dir, PathBuf::from("tools/futhark"));
        assert_eq!(c.futhark.cflags, "-O3 -march=native -fno-math-errno");
        assert_eq!(c.worker.stop_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn test_multithreaded_forces_multicore() {
        let mut f = FutharkConfig::default();
        assert_eq!(f.effective_backend(), "c");
        f.backend = "opencl".into();
        f.multithreaded = true;
        assert_eq!(f.effective_backend(), "multicore");
    }

    #[test]
    fn test_parse_minimal_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.futhark.backend, "c");
        assert_eq!(config.worker.stop_timeout_ms, 2000);
    }

    #[test]
    fn test_parse_partial_section() {
        let toml_str = r#"
[futhark]
backend = "cuda"
source_dir = "/opt/bench/futhark"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.futhark.backend, "cuda");
        assert_eq!(config.futhark.source_dir, PathBuf::from("/opt/bench/futhark"));
        // Unset keys keep their defaults
        assert_eq!(config.futhark.compiler, "futhark");
        assert_eq!(config.worker.stop_timeout_ms, 2000);
    }

    #[test]
    fn test_parse_full_toml() {
        let toml_str = r#"
[futhark]
compiler = "/usr/local/bin/futhark"
backend = "c"
multithreaded = true
source_dir = "fut"
cflags = "-O2"

[worker]
stop_timeout_ms = 50
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.futhark.compiler, "/usr/local/bin/futhark");
        assert!(config.futhark.multithreaded);
        assert_eq!(config.futhark.cflags, "-O2");
        assert_eq!(config.worker.stop_timeout(), Duration::from_millis(50));
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = Config::default();
        let serialized = toml::to_string(&config).unwrap();
        let deserialized: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(deserialized.futhark.cflags, config.futhark.cflags);
        assert_eq!(
            deserialized.worker.stop_timeout_ms,
            config.worker.stop_timeout_ms
        );
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = Config::load_from(Path::new("/nonexistent/futhark-tool.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_invalid_toml_names_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        std::fs::write(&path, "[worker]\nstop_timeout_ms = \"soon\"\n").unwrap();
        let err = Config::load_from(&path).unwrap_err();
        assert!(matches!(err, ToolError::Config(_)));
        assert!(err.to_string().contains(DEFAULT_CONFIG_FILE));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        std::fs::write(&path, "[futhark]\nbackend = \"ispc\"\n").unwrap();
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.futhark.backend, "ispc");
    }
}
