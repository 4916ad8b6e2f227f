//! Engine configuration (skein.toml)
//!
//! Hosts describe granted permissions, resource ceilings, context defaults
//! and worker pool defaults in a TOML file:
//!
//! ```toml
//! [permissions]
//! granted = ["concurrency", "create-mutex"]
//! trusted = false
//!
//! [limits]
//! max_steps = 1000000
//!
//! [context]
//! locale = "en-US"
//! timezone = "UTC"
//!
//! [worker]
//! queue_size = 100
//! job_timeout_ms = 60000
//! ```

use crate::vm::interpreter::ResourceLimits;
use crate::vm::permissions::Permission;
use crate::vm::scheduler::MAX_QUEUE_SIZE;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while loading a configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Permission name not recognized
    #[error("Unknown permission: {0}")]
    UnknownPermission(String),

    /// Out-of-range value
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Defaults applied by `sync.newWorker` and `worker.add`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerDefaults {
    /// Job queue capacity
    pub queue_size: usize,
    /// Per-job timeout when a job sets none
    pub job_timeout: Duration,
}

impl Default for WorkerDefaults {
    fn default() -> Self {
        Self {
            queue_size: 100,
            job_timeout: Duration::from_secs(60),
        }
    }
}

/// Options for creating a root instance
#[derive(Debug, Clone, PartialEq)]
pub struct VmOptions {
    /// Resource ceilings
    pub limits: ResourceLimits,
    /// Trust flag; a trusted instance holds every permission
    pub trusted: bool,
    /// Context locale
    pub locale: String,
    /// Context timezone
    pub timezone: String,
    /// Worker pool defaults
    pub worker: WorkerDefaults,
}

impl Default for VmOptions {
    fn default() -> Self {
        Self {
            limits: ResourceLimits::default(),
            trusted: false,
            locale: "en-US".to_string(),
            timezone: "UTC".to_string(),
            worker: WorkerDefaults::default(),
        }
    }
}

/// Granted permissions, as an array of names or a single
/// space/comma separated string (`granted = "concurrency create-mutex"`)
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum GrantedPermissions {
    /// `["concurrency", "create-mutex"]`
    List(Vec<String>),
    /// `"concurrency, create-mutex"`
    Line(String),
}

impl Default for GrantedPermissions {
    fn default() -> Self {
        GrantedPermissions::List(Vec::new())
    }
}

/// `[permissions]` section
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PermissionsSection {
    /// Granted permission names
    pub granted: GrantedPermissions,
    /// Run root instances as trusted
    pub trusted: bool,
}

/// `[context]` section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ContextSection {
    /// Locale
    pub locale: String,
    /// Timezone
    pub timezone: String,
}

impl Default for ContextSection {
    fn default() -> Self {
        Self {
            locale: "en-US".to_string(),
            timezone: "UTC".to_string(),
        }
    }
}

/// `[worker]` section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerSection {
    /// Default queue capacity
    pub queue_size: usize,
    /// Default job timeout in milliseconds
    pub job_timeout_ms: u64,
}

impl Default for WorkerSection {
    fn default() -> Self {
        let defaults = WorkerDefaults::default();
        Self {
            queue_size: defaults.queue_size,
            job_timeout_ms: defaults.job_timeout.as_millis() as u64,
        }
    }
}

/// Engine configuration file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Permission grants
    pub permissions: PermissionsSection,
    /// Resource ceilings
    pub limits: ResourceLimits,
    /// Execution context defaults
    pub context: ContextSection,
    /// Worker pool defaults
    pub worker: WorkerSection,
}

impl EngineConfig {
    /// Load a configuration file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse a configuration from a string
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate value ranges and permission names
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker.queue_size == 0 || self.worker.queue_size > MAX_QUEUE_SIZE {
            return Err(ConfigError::Invalid(format!(
                "worker.queue_size must be between 1 and {}",
                MAX_QUEUE_SIZE
            )));
        }
        if self.worker.job_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "worker.job_timeout_ms must be positive".to_string(),
            ));
        }
        self.permissions()?;
        Ok(())
    }

    /// Resolve granted names into a permission set
    pub fn permissions(&self) -> Result<Permission, ConfigError> {
        match &self.permissions.granted {
            GrantedPermissions::List(names) => {
                names.iter().try_fold(Permission::NONE, |acc, name| {
                    Permission::from_name(name)
                        .map(|p| acc | p)
                        .ok_or_else(|| ConfigError::UnknownPermission(name.clone()))
                })
            }
            GrantedPermissions::Line(line) => {
                Permission::parse_list(line).map_err(ConfigError::UnknownPermission)
            }
        }
    }

    /// Options for root instances
    pub fn vm_options(&self) -> VmOptions {
        VmOptions {
            limits: self.limits.clone(),
            trusted: self.permissions.trusted,
            locale: self.context.locale.clone(),
            timezone: self.context.timezone.clone(),
            worker: WorkerDefaults {
                queue_size: self.worker.queue_size,
                job_timeout: Duration::from_millis(self.worker.job_timeout_ms),
            },
        }
    }
}
