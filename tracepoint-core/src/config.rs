//! In-process configuration seeding the initial [`crate::context::DebuggerContext`].
//!
//! There is no persisted or hot-reloaded debugger state: this struct is read
//! once at startup and thereafter every mutation goes through the debugger
//! API. The `config-file` feature lets an embedder load it with the `config`
//! crate from TOML/JSON/env in the same layered fashion as the rest of the
//! ambient stack; without the feature it is just a plain `Default` struct.

use serde::{Deserialize, Serialize};

use crate::breakpoint::SuspendPolicy as CoreSuspendPolicy;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SuspendPolicyConfig {
    Current,
    All,
}

impl From<SuspendPolicyConfig> for CoreSuspendPolicy {
    fn from(value: SuspendPolicyConfig) -> Self {
        match value {
            SuspendPolicyConfig::Current => Self::Current,
            SuspendPolicyConfig::All => Self::All,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub project_roots: Vec<String>,
    pub exclude_patterns: Vec<String>,
    pub use_libraries_filter: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            project_roots: Vec::new(),
            exclude_patterns: Vec::new(),
            use_libraries_filter: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SteppingConfig {
    pub stop_on_entry: bool,
    pub default_suspend_policy: SuspendPolicyConfig,
    /// Whether a step-over keeps tracing a callee with no breakpoints of its
    /// own purely to capture its return value for display at the caller.
    pub show_return_values: bool,
}

impl Default for SteppingConfig {
    fn default() -> Self {
        Self { stop_on_entry: false, default_suspend_policy: SuspendPolicyConfig::Current, show_return_values: false }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExceptionConfig {
    pub same_context_skip: bool,
    /// Master switch for the exit-code skip rule below; when `false` a
    /// `SystemExit` is never skipped on exit-code grounds regardless of
    /// `ignore_system_exit_codes`.
    pub ignore_system_exit: bool,
    /// Exit codes treated as "not interesting" (normal termination) for the
    /// `ignore_system_exit` skip rule.
    pub ignore_system_exit_codes: Vec<i32>,
}

impl Default for ExceptionConfig {
    fn default() -> Self {
        Self { same_context_skip: true, ignore_system_exit: true, ignore_system_exit_codes: vec![0] }
    }
}

/// Top-level configuration for a [`crate::context::DebuggerContext`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TracerConfig {
    pub enabled: bool,
    pub filters: FilterConfig,
    pub stepping: SteppingConfig,
    pub exceptions: ExceptionConfig,
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            filters: FilterConfig::default(),
            stepping: SteppingConfig::default(),
            exceptions: ExceptionConfig::default(),
        }
    }
}

#[cfg(feature = "config-file")]
impl TracerConfig {
    /// Load layered configuration from a file plus `TRACEPOINT_`-prefixed
    /// environment overrides, following the same `config` crate layering
    /// convention used elsewhere in the ambient stack.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read/parsed or does not
    /// deserialize into `TracerConfig`.
    pub fn load(path: &str) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("TRACEPOINT").separator("__"))
            .build()?
            .try_deserialize()
    }
}
