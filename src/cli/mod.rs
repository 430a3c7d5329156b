// src/cli/mod.rs — CLI definition (clap derive)

use std::path::PathBuf;

use clap::Parser;
use serde_json::{json, Value};

use crate::infra::config::Config;

#[derive(Parser, Debug)]
#[command(
    name = "futhark-tool",
    about = "Benchmark tool adapter for Futhark: define/evaluate over line-delimited JSON on stdio",
    version
)]
pub struct Cli {
    /// Futhark backend to compile problem modules with
    #[arg(long)]
    pub backend: Option<String>,

    /// Let the backend run multithreaded (uses the multicore backend)
    #[arg(long)]
    pub multithreaded: bool,

    /// Directory holding the `<module>.fut` sources
    #[arg(long)]
    pub source_dir: Option<PathBuf>,

    /// Config file path (defaults to ./futhark-tool.toml if present)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Log level for stderr output (RUST_LOG takes precedence)
    #[arg(long, default_value = "warn")]
    pub log_level: String,
}

impl Cli {
    /// Apply command-line overrides on top of the loaded config.
    pub fn apply(&self, config: &mut Config) {
        if let Some(ref backend) = self.backend {
            config.futhark.backend = backend.clone();
        }
        if self.multithreaded {
            config.futhark.multithreaded = true;
        }
        if let Some(ref dir) = self.source_dir {
            config.futhark.source_dir = dir.clone();
        }
    }
}

/// The `config` object reported on `start`.
pub fn start_config(config: &Config) -> Value {
    json!({
        "backend": config.futhark.effective_backend(),
        "multithreaded": config.futhark.multithreaded,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["futhark-tool"]);
        assert!(cli.backend.is_none());
        assert!(!cli.multithreaded);
        assert_eq!(cli.log_level, "warn");

        let mut config = Config::default();
        cli.apply(&mut config);
        assert_eq!(
            start_config(&config),
            json!({"backend": "c", "multithreaded": false})
        );
    }

    #[test]
    fn test_overrides() {
        let cli = Cli::parse_from([
            "futhark-tool",
            "--backend",
            "opencl",
            "--source-dir",
            "/srv/fut",
        ]);
        let mut config = Config::default();
        cli.apply(&mut config);
        assert_eq!(config.futhark.backend, "opencl");
        assert_eq!(config.futhark.source_dir, PathBuf::from("/srv/fut"));
    }

    #[test]
    fn test_multithreaded_reports_multicore() {
        let cli = Cli::parse_from(["futhark-tool", "--backend", "c", "--multithreaded"]);
        let mut config = Config::default();
        cli.apply(&mut config);
        assert_eq!(
            start_config(&config),
            json!({"backend": "multicore", "multithreaded": true})
        );
    }
}
