//! Resolved launch parameters handed to the process supervisor.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::models::outcome::TestSelection;

/// Flag asking the executable to list its tests instead of running them.
pub const DISCOVER_FLAG: &str = "--discover_tests";
/// Flag asking the executable to print per-test progress.
pub const VERBOSE_FLAG: &str = "--verbose";
/// Flag asking the executable to emit adapter-oriented output.
pub const ADAPTER_INFO_FLAG: &str = "--adapter_info";

/// Everything needed to start one test process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Program actually spawned (the executable, or a wrapper's first word).
    pub program: PathBuf,
    /// Arguments passed to `program`, in order.
    pub arguments: Vec<String>,
    /// Working directory of the child.
    pub working_directory: PathBuf,
    /// Variables overlaid on the inherited environment.
    pub environment: HashMap<String, String>,
    /// Whether stdout is piped back to the supervisor.
    pub capture_output: bool,
}

impl LaunchSpec {
    /// Human-readable command line for logs.
    #[must_use]
    pub fn command_line(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.arguments {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Per-adapter launch settings used to derive [`LaunchSpec`]s.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchOptions {
    /// Optional wrapper command placed before the executable.
    pub launcher: Vec<String>,
    /// Wrapper command used for debug launches.
    pub debugger: Vec<String>,
    /// Fixed working directory; the executable's directory when `None`.
    ///
    /// A relative executable is made absolute against the current
    /// directory first, since the child starts elsewhere.
    pub working_directory: Option<PathBuf>,
    /// Environment overlay.
    pub environment: HashMap<String, String>,
    /// Whether to pass [`ADAPTER_INFO_FLAG`].
    pub adapter_info: bool,
}

impl LaunchOptions {
    /// Spec for a discovery session.
    #[must_use]
    pub fn discovery(&self, executable: &Path) -> LaunchSpec {
        let mut flags = vec![DISCOVER_FLAG.to_owned()];
        if self.adapter_info {
            flags.push(ADAPTER_INFO_FLAG.to_owned());
        }
        self.build(&self.launcher, executable, flags, true)
    }

    /// Spec for a run session over `selection`.
    #[must_use]
    pub fn run(&self, executable: &Path, selection: &TestSelection) -> LaunchSpec {
        let mut flags = vec![VERBOSE_FLAG.to_owned()];
        if self.adapter_info {
            flags.push(ADAPTER_INFO_FLAG.to_owned());
        }
        flags.extend(selection.identities().iter().cloned());
        self.build(&self.launcher, executable, flags, true)
    }

    /// Spec for an interactive debug session; output is not captured.
    #[must_use]
    pub fn debug(&self, executable: &Path, selection: &TestSelection) -> LaunchSpec {
        let mut flags = vec![VERBOSE_FLAG.to_owned()];
        flags.extend(selection.identities().iter().cloned());
        self.build(&self.debugger, executable, flags, false)
    }

    fn build(
        &self,
        prefix: &[String],
        executable: &Path,
        flags: Vec<String>,
        capture_output: bool,
    ) -> LaunchSpec {
        let executable =
            std::path::absolute(executable).unwrap_or_else(|_| executable.to_path_buf());
        let executable = executable.as_path();
        let (program, mut arguments) = match prefix.split_first() {
            Some((head, rest)) => {
                let mut args = rest.to_vec();
                args.push(executable.display().to_string());
                (PathBuf::from(head), args)
            }
            None => (executable.to_path_buf(), Vec::new()),
        };
        arguments.extend(flags);

        let working_directory = self.working_directory.clone().unwrap_or_else(|| {
            executable
                .parent()
                .filter(|dir| !dir.as_os_str().is_empty())
                .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
        });

        LaunchSpec {
            program,
            arguments,
            working_directory,
            environment: self.environment.clone(),
            capture_output,
        }
    }
}
