use std::path::PathBuf;
use std::time::Duration;

/// Wall-clock limit for a single `run`. Not negotiable per request.
pub const DEFAULT_EXECUTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for the Python runtime process.
///
/// The runtime is a long-lived interpreter running the embedded pytest
/// harness. It is not hardened beyond process isolation and the
/// coordinator's deadline.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Python interpreter to launch
    pub python: PathBuf,
    /// Root for runtime working directories. Every runtime gets its own
    /// fresh subdirectory, under the system temp dir when unset.
    pub workdir: Option<PathBuf>,
    /// Extra arguments appended to every pytest invocation
    pub pytest_args: Vec<String>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            python: PathBuf::from("python3"),
            workdir: None,
            pytest_args: Vec::new(),
        }
    }
}

impl SandboxConfig {
    pub fn with_python(mut self, python: impl Into<PathBuf>) -> Self {
        self.python = python.into();
        self
    }

    pub fn with_workdir(mut self, workdir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(workdir.into());
        self
    }

    pub fn with_pytest_arg(mut self, arg: impl Into<String>) -> Self {
        self.pytest_args.push(arg.into());
        self
    }
}

/// Configuration for the request coordinator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Deadline for a submitted run before the runtime is torn down
    pub execution_timeout: Duration,
    /// Capacity of the handle → coordinator message channel
    pub mailbox_capacity: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            execution_timeout: DEFAULT_EXECUTION_TIMEOUT,
            mailbox_capacity: 64,
        }
    }
}

impl OrchestratorConfig {
    pub fn with_execution_timeout(mut self, timeout: Duration) -> Self {
        self.execution_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sandbox_config_default() {
        let cfg = SandboxConfig::default();
        assert_eq!(cfg.python, PathBuf::from("python3"));
        assert!(cfg.workdir.is_none());
        assert!(cfg.pytest_args.is_empty());
    }

    #[test]
    fn sandbox_config_builders() {
        let cfg = SandboxConfig::default()
            .with_python("/usr/bin/python3.12")
            .with_workdir("/tmp/run")
            .with_pytest_arg("-x")
            .with_pytest_arg("-p")
            .with_pytest_arg("no:cacheprovider");
        assert_eq!(cfg.python, PathBuf::from("/usr/bin/python3.12"));
        assert_eq!(cfg.workdir, Some(PathBuf::from("/tmp/run")));
        assert_eq!(cfg.pytest_args, vec!["-x", "-p", "no:cacheprovider"]);
    }

    #[test]
    fn orchestrator_config_default() {
        let cfg = OrchestratorConfig::default();
        assert_eq!(cfg.execution_timeout, Duration::from_secs(30));
        assert_eq!(cfg.mailbox_capacity, 64);
    }

    #[test]
    fn orchestrator_config_with_timeout() {
        let cfg = OrchestratorConfig::default().with_execution_timeout(Duration::from_millis(250));
        assert_eq!(cfg.execution_timeout, Duration::from_millis(250));
    }
}
