//! Playground configuration
//!
//! Layered, lowest to highest precedence:
//! 1. Built-in defaults
//! 2. Config file (`--config`, `PLAYGROUND_CONFIG_PATH`, or `./playground.toml`)
//! 3. Environment variables (`PLAYGROUND_ARTIFACT__ROOT`, `PLAYGROUND_LOG__LEVEL`, ...)
//! 4. Explicit builder overrides (CLI flags)
//!
//! A `.env` file in the working directory is loaded first.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use config::{Environment, File};
use serde::Deserialize;

pub const DEFAULT_ROOT: &str = "public";
pub const DEFAULT_ARTIFACT: &str = "interpreter.wasm";
pub const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub artifact: ArtifactConfig,
    pub log: LogConfig,
}

/// Where the interpreter artifact lives and how to bring it up
#[derive(Debug, Clone, Deserialize)]
pub struct ArtifactConfig {
    /// Host root the artifact path is resolved against
    pub root: PathBuf,
    pub path: PathBuf,
    /// Export called once to create the interpreter
    pub entry_point: String,
}

impl ArtifactConfig {
    pub fn location(&self) -> PathBuf {
        self.root.join(&self.path)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// Default filter when RUST_LOG is unset
    pub level: String,
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Load with no overrides
    pub fn load() -> Result<Self> {
        Self::builder().build()
    }

    fn validate(&self) -> Result<()> {
        if self.artifact.entry_point.trim().is_empty() {
            bail!("artifact.entry_point must not be empty");
        }
        if self.artifact.path.as_os_str().is_empty() {
            bail!("artifact.path must not be empty");
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config_path: Option<PathBuf>,
    root: Option<PathBuf>,
    artifact: Option<PathBuf>,
    entry_point: Option<String>,
}

impl ConfigBuilder {
    pub fn config_path(mut self, path: Option<PathBuf>) -> Self {
        self.config_path = path;
        self
    }

    pub fn root(mut self, root: Option<PathBuf>) -> Self {
        self.root = root;
        self
    }

    pub fn artifact(mut self, artifact: Option<PathBuf>) -> Self {
        self.artifact = artifact;
        self
    }

    pub fn entry_point(mut self, entry_point: Option<String>) -> Self {
        self.entry_point = entry_point;
        self
    }

    pub fn build(self) -> Result<Config> {
        dotenvy::dotenv().ok();

        let mut builder = config::Config::builder()
            .set_default("artifact.root", DEFAULT_ROOT)?
            .set_default("artifact.path", DEFAULT_ARTIFACT)?
            .set_default("artifact.entry_point", crate::wasm::DEFAULT_ENTRY_POINT)?
            .set_default("log.level", DEFAULT_LOG_LEVEL)?;

        let config_path = self
            .config_path
            .or_else(|| std::env::var("PLAYGROUND_CONFIG_PATH").ok().map(PathBuf::from));
        builder = match config_path {
            Some(path) => builder.add_source(File::from(path).required(true)),
            None => builder.add_source(File::with_name("playground").required(false)),
        };

        builder = builder.add_source(
            Environment::with_prefix("PLAYGROUND")
                .prefix_separator("_")
                .separator("__"),
        );

        if let Some(root) = self.root {
            builder = builder.set_override("artifact.root", root.to_string_lossy().to_string())?;
        }
        if let Some(artifact) = self.artifact {
            builder =
                builder.set_override("artifact.path", artifact.to_string_lossy().to_string())?;
        }
        if let Some(entry_point) = self.entry_point {
            builder = builder.set_override("artifact.entry_point", entry_point)?;
        }

        let config: Config = builder
            .build()
            .context("Failed to load configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;
        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("playground.toml");
        std::fs::write(&path, contents).unwrap();
        (dir, path)
    }

    #[test]
    fn test_defaults() {
        let (_dir, path) = write_config("");

        let config = Config::builder().config_path(Some(path)).build().unwrap();

        assert_eq!(config.artifact.location(), PathBuf::from("public/interpreter.wasm"));
        assert_eq!(config.artifact.entry_point, "create_interpreter");
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_file_values() {
        let (_dir, path) = write_config(
            r#"
            [artifact]
            root = "dist"
            path = "lang.wasm"
            entry_point = "init"

            [log]
            level = "debug"
            "#,
        );

        let config = Config::builder().config_path(Some(path)).build().unwrap();

        assert_eq!(config.artifact.location(), PathBuf::from("dist/lang.wasm"));
        assert_eq!(config.artifact.entry_point, "init");
        assert_eq!(config.log.level, "debug");
    }

    #[test]
    fn test_overrides_beat_file() {
        let (_dir, path) = write_config(
            r#"
            [artifact]
            root = "dist"
            "#,
        );

        let config = Config::builder()
            .config_path(Some(path))
            .root(Some(PathBuf::from("site")))
            .artifact(Some(PathBuf::from("other.wasm")))
            .build()
            .unwrap();

        assert_eq!(config.artifact.location(), PathBuf::from("site/other.wasm"));
    }

    #[test]
    fn test_empty_entry_point_rejected() {
        let (_dir, path) = write_config("");

        let result = Config::builder()
            .config_path(Some(path))
            .entry_point(Some(" ".to_string()))
            .build();

        assert!(result.is_err());
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let dir = tempfile::tempdir().unwrap();

        let result = Config::builder()
            .config_path(Some(dir.path().join("nope.toml")))
            .build();

        assert!(result.is_err());
    }
}
