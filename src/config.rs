//! Adapter settings parsing and validation.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::mode::ProtocolMode;
use crate::models::launch::LaunchOptions;
use crate::protocol::decoder::DecoderOptions;
use crate::{AppError, Result};

fn default_true() -> bool {
    true
}

fn default_debugger() -> Vec<String> {
    vec!["gdb".into(), "--args".into()]
}

fn default_drain_timeout_ms() -> u64 {
    2000
}

/// Adapter settings parsed from a TOML file.
///
/// Relative paths are resolved against the directory holding the file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct AdapterConfig {
    /// When `false` every command is a no-op.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Test executables managed by this adapter.
    #[serde(default)]
    pub executables: Vec<PathBuf>,
    /// Fixed working directory; each executable's own directory when unset.
    #[serde(default)]
    pub working_directory: Option<PathBuf>,
    /// Root for relative source paths reported by discovery.
    #[serde(default)]
    pub build_directory: Option<PathBuf>,
    /// Raise the default log filter to `debug`.
    #[serde(default)]
    pub debug_logging: bool,
    /// Run-mode protocol version spoken by the executables.
    #[serde(default)]
    pub protocol: ProtocolMode,
    /// Treat stray lines inside a test as message lines instead of aborting.
    #[serde(default)]
    pub lenient_messages: bool,
    /// Pass `--adapter_info` to the executables.
    #[serde(default = "default_true")]
    pub adapter_info: bool,
    /// Wrapper command placed before the executable (e.g. `["wine"]`).
    #[serde(default)]
    pub launcher: Vec<String>,
    /// Wrapper command for debug launches.
    #[serde(default = "default_debugger")]
    pub debugger: Vec<String>,
    /// Upper bound on reading leftover stdout after the process exits.
    #[serde(default = "default_drain_timeout_ms")]
    pub drain_timeout_ms: u64,
    /// Variables overlaid on the inherited environment.
    #[serde(default)]
    pub environment: HashMap<String, String>,
    /// Directory relative paths were resolved against.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl AdapterConfig {
    /// Load and validate settings from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read, contains
    /// invalid TOML, or fails validation.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|err| {
            AppError::Config(format!("failed to read {}: {err}", path.display()))
        })?;
        let parent = path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        // Launches change the working directory, so paths must not stay
        // relative to the current one.
        let base_dir = std::path::absolute(parent).map_err(|err| {
            AppError::Config(format!("cannot resolve {}: {err}", parent.display()))
        })?;
        Self::from_toml_str(&raw, &base_dir)
    }

    /// Parse settings from a TOML string, resolving relative paths against
    /// `base_dir`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str, base_dir: &Path) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.base_dir = base_dir.to_path_buf();
        config.resolve_paths();
        config.validate()?;
        Ok(config)
    }

    fn resolve_paths(&mut self) {
        let base = self.base_dir.clone();
        for exe in &mut self.executables {
            *exe = resolve(&base, exe);
        }
        if let Some(dir) = self.working_directory.as_mut() {
            *dir = resolve(&base, dir);
        }
        if let Some(dir) = self.build_directory.as_mut() {
            *dir = resolve(&base, dir);
        }
    }

    /// Check that an enabled adapter names existing executables.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` when no executable is configured, when an
    /// executable is not an existing file, or when a wrapper command is
    /// present but empty.
    pub fn validate(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        if self.executables.is_empty() {
            return Err(AppError::Config("no executables configured".into()));
        }
        for exe in &self.executables {
            if !exe.is_file() {
                return Err(AppError::Config(format!(
                    "executable not found: {}",
                    exe.display()
                )));
            }
        }
        if self.launcher.iter().any(String::is_empty) {
            return Err(AppError::Config("launcher contains an empty word".into()));
        }
        if self.debugger.iter().any(String::is_empty) {
            return Err(AppError::Config("debugger contains an empty word".into()));
        }
        Ok(())
    }

    /// Launch settings shared by every session.
    #[must_use]
    pub fn launch_options(&self) -> LaunchOptions {
        LaunchOptions {
            launcher: self.launcher.clone(),
            debugger: self.debugger.clone(),
            working_directory: self.working_directory.clone(),
            environment: self.environment.clone(),
            adapter_info: self.adapter_info,
        }
    }

    /// Run-mode decoder settings.
    #[must_use]
    pub fn decoder_options(&self) -> DecoderOptions {
        DecoderOptions {
            mode: self.protocol,
            lenient: self.lenient_messages,
        }
    }

    /// Post-exit stdout drain bound.
    #[must_use]
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    /// Map a source path reported by discovery to a path on disk.
    ///
    /// Absolute paths are returned unchanged; relative ones are joined to
    /// `build_directory`, or to the settings directory when unset.
    #[must_use]
    pub fn resolve_source_path(&self, file: &str) -> PathBuf {
        let root = self.build_directory.as_deref().unwrap_or(&self.base_dir);
        resolve(root, Path::new(file))
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
