//! Configuration loading and typed config structures.
//!
//! The canonical configuration lives in `singularity-config.yaml`. This
//! module defines strongly-typed structs that mirror the YAML structure and
//! a loader that reads and validates the file. Every section is optional;
//! missing values fall back to the defaults below.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use singularity_types::Phase;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value parsed but is not usable.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// Explanation of what is wrong with the configuration.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SingularityConfig {
    /// Tick loop and persistence settings.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Durations and sizes of the singularity phases.
    #[serde(default)]
    pub profile: SingularityProfile,

    /// Scenario selection per world.
    #[serde(default)]
    pub scenarios: ScenarioConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl SingularityConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override YAML values:
    /// - `SINGULARITY_TICK_INTERVAL_MS` overrides `engine.tick_interval_ms`
    /// - `SINGULARITY_SNAPSHOT_PATH` overrides `engine.snapshot_path`
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string, apply env overrides, and
    /// validate the result.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yml::from_str(yaml)?;
        config.engine.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would stall or divide the tick loop by zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.tick_interval_ms == 0 {
            return Err(invalid("engine.tick_interval_ms must be at least 1"));
        }
        if self.profile.reset_batch == 0 {
            return Err(invalid("profile.reset_batch must be at least 1"));
        }
        if self.profile.border.step == 0 {
            return Err(invalid("profile.border.step must be at least 1"));
        }
        if self.engine.world_key.is_empty() {
            return Err(invalid("engine.world_key must not be empty"));
        }
        Ok(())
    }
}

fn invalid(reason: &str) -> ConfigError {
    ConfigError::Invalid {
        reason: reason.to_owned(),
    }
}

/// Tick loop configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EngineConfig {
    /// Real-time milliseconds per tick.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Stop after this many ticks (0 = unlimited).
    #[serde(default)]
    pub max_ticks: u64,

    /// Where scheduler snapshots are written on shutdown and read on boot.
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,

    /// Key of the world the engine drives.
    #[serde(default = "default_world_key")]
    pub world_key: String,

    /// Light the fuse as soon as the loop starts.
    #[serde(default = "default_ignite_on_start")]
    pub ignite_on_start: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            max_ticks: 0,
            snapshot_path: default_snapshot_path(),
            world_key: default_world_key(),
            ignite_on_start: default_ignite_on_start(),
        }
    }
}

impl EngineConfig {
    /// Override values from environment variables, if set and parseable.
    pub fn apply_env_overrides(&mut self) {
        if let Some(ms) = std::env::var("SINGULARITY_TICK_INTERVAL_MS")
            .ok()
            .and_then(|val| val.parse().ok())
        {
            self.tick_interval_ms = ms;
        }
        if let Ok(val) = std::env::var("SINGULARITY_SNAPSHOT_PATH") {
            self.snapshot_path = PathBuf::from(val);
        }
    }
}

/// Durations (in ticks) and sizes that shape one singularity cycle.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SingularityProfile {
    /// Length of the fuse countdown.
    #[serde(default = "default_fuse_ticks")]
    pub fuse_ticks: u64,

    /// Time spent collapsing before the core forms.
    #[serde(default = "default_collapse_ticks")]
    pub collapse_ticks: u64,

    /// Time the core stays stable before the ring forms.
    #[serde(default = "default_core_ticks")]
    pub core_ticks: u64,

    /// Lifetime of the accretion ring.
    #[serde(default = "default_ring_ticks")]
    pub ring_ticks: u64,

    /// Time the ring takes to disperse.
    #[serde(default = "default_dissipation_ticks")]
    pub dissipation_ticks: u64,

    /// Units of restoration work queued when the reset begins.
    #[serde(default = "default_reset_work")]
    pub reset_work: u64,

    /// Units of restoration work processed per reset tick.
    #[serde(default = "default_reset_batch")]
    pub reset_batch: u64,

    /// World border behavior.
    #[serde(default)]
    pub border: BorderProfile,
}

impl Default for SingularityProfile {
    fn default() -> Self {
        Self {
            fuse_ticks: default_fuse_ticks(),
            collapse_ticks: default_collapse_ticks(),
            core_ticks: default_core_ticks(),
            ring_ticks: default_ring_ticks(),
            dissipation_ticks: default_dissipation_ticks(),
            reset_work: default_reset_work(),
            reset_batch: default_reset_batch(),
            border: BorderProfile::default(),
        }
    }
}

impl SingularityProfile {
    /// Ticks a timed phase lasts before its handler moves on.
    ///
    /// `Dormant` and `Reset` are not timed and return `None`.
    pub const fn phase_duration(&self, phase: Phase) -> Option<u64> {
        match phase {
            Phase::Fusing => Some(self.fuse_ticks),
            Phase::Collapse => Some(self.collapse_ticks),
            Phase::Core => Some(self.core_ticks),
            Phase::Ring => Some(self.ring_ticks),
            Phase::Dissipation => Some(self.dissipation_ticks),
            Phase::Dormant | Phase::Reset => None,
        }
    }
}

/// Target world-border radius per phase, in blocks.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BorderProfile {
    /// Radius while nothing is happening.
    #[serde(default = "default_radius_wide")]
    pub dormant: u32,
    /// Radius during the fuse.
    #[serde(default = "default_radius_wide")]
    pub fusing: u32,
    /// Radius during the collapse.
    #[serde(default = "default_radius_collapse")]
    pub collapse: u32,
    /// Radius around the stable core.
    #[serde(default = "default_radius_core")]
    pub core: u32,
    /// Radius of the ring.
    #[serde(default = "default_radius_ring")]
    pub ring: u32,
    /// Radius while dissipating.
    #[serde(default = "default_radius_wide")]
    pub dissipation: u32,
    /// Radius during the reset.
    #[serde(default = "default_radius_wide")]
    pub reset: u32,
    /// Maximum blocks the border moves per tick.
    #[serde(default = "default_border_step")]
    pub step: u32,
}

impl Default for BorderProfile {
    fn default() -> Self {
        Self {
            dormant: default_radius_wide(),
            fusing: default_radius_wide(),
            collapse: default_radius_collapse(),
            core: default_radius_core(),
            ring: default_radius_ring(),
            dissipation: default_radius_wide(),
            reset: default_radius_wide(),
            step: default_border_step(),
        }
    }
}

impl BorderProfile {
    /// Target radius for the given phase.
    pub const fn target_for(&self, phase: Phase) -> u32 {
        match phase {
            Phase::Dormant => self.dormant,
            Phase::Fusing => self.fusing,
            Phase::Collapse => self.collapse,
            Phase::Core => self.core,
            Phase::Ring => self.ring,
            Phase::Dissipation => self.dissipation,
            Phase::Reset => self.reset,
        }
    }
}

/// Scenario selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ScenarioConfig {
    /// Scenario used for worlds without an explicit binding. When absent the
    /// first registered scenario is the default.
    #[serde(default)]
    pub default: Option<String>,

    /// World key -> scenario id.
    #[serde(default)]
    pub bindings: BTreeMap<String, String>,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: `text` or `json`.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl LoggingConfig {
    /// Whether structured JSON output was requested.
    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

// ---------------------------------------------------------------------------
// Default value functions (serde default requires named functions)
// ---------------------------------------------------------------------------

const fn default_tick_interval_ms() -> u64 {
    50
}

fn default_snapshot_path() -> PathBuf {
    PathBuf::from("singularity-tasks.json")
}

fn default_world_key() -> String {
    "minecraft:overworld".to_owned()
}

const fn default_ignite_on_start() -> bool {
    true
}

const fn default_fuse_ticks() -> u64 {
    200
}

const fn default_collapse_ticks() -> u64 {
    100
}

const fn default_core_ticks() -> u64 {
    400
}

const fn default_ring_ticks() -> u64 {
    300
}

const fn default_dissipation_ticks() -> u64 {
    200
}

const fn default_reset_work() -> u64 {
    64
}

const fn default_reset_batch() -> u64 {
    4
}

const fn default_radius_wide() -> u32 {
    512
}

const fn default_radius_collapse() -> u32 {
    96
}

const fn default_radius_core() -> u32 {
    48
}

const fn default_radius_ring() -> u32 {
    160
}

const fn default_border_step() -> u32 {
    8
}

fn default_log_level() -> String {
    "info".to_owned()
}

fn default_log_format() -> String {
    "text".to_owned()
}
