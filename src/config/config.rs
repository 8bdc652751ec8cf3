use crate::config::types::{HarnessError, Result};
/// Harness configuration loading from a JSON file
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Sandbox policy applied to the process that drives the iteration loop.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SandboxKind {
    /// Common hardening only.
    #[default]
    None,
    /// Common hardening plus a drop to an unprivileged uid/gid.
    Setuid,
    /// Fresh user/pid/uts/net namespaces with a private root.
    Namespace,
}

impl std::str::FromStr for SandboxKind {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(Self::None),
            "setuid" => Ok(Self::Setuid),
            "namespace" => Ok(Self::Namespace),
            other => Err(HarnessError::Config(format!(
                "unknown sandbox '{}' (expected none, setuid or namespace)",
                other
            ))),
        }
    }
}

/// Resource caps applied by every sandbox policy. Core dumps are always
/// disabled and are not configurable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceLimits {
    pub address_space_bytes: u64,
    pub file_size_bytes: u64,
    pub stack_bytes: u64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            address_space_bytes: 128 << 20,
            file_size_bytes: 1 << 20,
            stack_bytes: 1 << 20,
        }
    }
}

/// Full harness configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub sandbox: SandboxKind,
    pub limits: ResourceLimits,
    /// Identity used by the setuid policy (nobody/nogroup by default)
    pub unprivileged_uid: u32,
    pub unprivileged_gid: u32,
    pub iteration_timeout_ms: u64,
    pub poll_interval_ms: u64,
    /// mkdtemp template for the harness work root
    pub workdir_template: String,
    /// Directory the namespace policy builds its private root under
    pub scaffold_dir: PathBuf,
    /// Stop after this many iterations; run forever when unset
    pub max_iterations: Option<u64>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            sandbox: SandboxKind::None,
            limits: ResourceLimits::default(),
            unprivileged_uid: 65534,
            unprivileged_gid: 65534,
            iteration_timeout_ms: 5_000,
            poll_interval_ms: 1,
            workdir_template: "./fuzzbox.XXXXXX".to_string(),
            scaffold_dir: PathBuf::from("./fuzzbox-tmp"),
            max_iterations: None,
        }
    }
}

impl HarnessConfig {
    /// Load configuration from a JSON file; missing fields take defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            HarnessError::Config(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        let config: HarnessConfig = serde_json::from_str(&content)
            .map_err(|e| HarnessError::Config(format!("Failed to parse config JSON: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.iteration_timeout_ms == 0 {
            return Err(HarnessError::Config(
                "iteration_timeout_ms must be non-zero".to_string(),
            ));
        }
        if self.poll_interval_ms > self.iteration_timeout_ms {
            return Err(HarnessError::Config(format!(
                "poll interval {}ms exceeds iteration timeout {}ms",
                self.poll_interval_ms, self.iteration_timeout_ms
            )));
        }
        if !self.workdir_template.ends_with("XXXXXX") {
            return Err(HarnessError::Config(format!(
                "workdir template '{}' must end with XXXXXX",
                self.workdir_template
            )));
        }
        Ok(())
    }

    pub fn iteration_timeout(&self) -> Duration {
        Duration::from_millis(self.iteration_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
