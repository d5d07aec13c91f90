//! Pipeline configuration.
//!
//! This module provides configuration for the compilation pipeline: the
//! toolchain command templates, per-stage timeouts, the workspace root,
//! the supported LLVM versions, and the HTTP bind address.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::toolchain::CommandTemplate;

/// Default compile template: source file to textual LLVM IR.
pub const DEFAULT_COMPILE_COMMAND: &str = "clang-{version} -S -emit-llvm {input} -o {output}";

/// Default pass template: one named pass from the plugin, IR to IR.
pub const DEFAULT_PASS_COMMAND: &str =
    "opt-{version} -load-pass-plugin={plugin} -passes={pass} -S {input} -o {output}";

/// Default link template: final IR to an executable.
pub const DEFAULT_LINK_COMMAND: &str = "clang++-{version} {input} -o {output}";

/// Default execute template: run the linked executable directly.
pub const DEFAULT_EXECUTE_COMMAND: &str = "{input}";

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration for the compilation pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    // Toolchain settings
    /// Template for the initial compilation stage.
    pub compile_command: String,
    /// Template for each obfuscation pass stage.
    pub pass_command: String,
    /// Template for the link stage.
    pub link_command: String,
    /// Template for the execute stage.
    pub execute_command: String,
    /// Path of the pass plugin bound to `{plugin}`.
    pub pass_plugin: String,

    // Version settings
    /// Version used when a request does not name one.
    pub default_llvm_version: String,
    /// Versions a request may select.
    pub allowed_llvm_versions: Vec<String>,

    // Execution settings
    /// Time budget for compile, pass and link stages.
    pub stage_timeout: Duration,
    /// Time budget for running the compiled program.
    pub execute_timeout: Duration,

    // Storage settings
    /// Directory under which per-run workspaces are created.
    pub workspace_root: PathBuf,

    // Server settings
    /// Address the HTTP server binds to.
    pub bind_addr: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            compile_command: DEFAULT_COMPILE_COMMAND.to_string(),
            pass_command: DEFAULT_PASS_COMMAND.to_string(),
            link_command: DEFAULT_LINK_COMMAND.to_string(),
            execute_command: DEFAULT_EXECUTE_COMMAND.to_string(),
            pass_plugin: "/usr/local/lib/libpasses.so".to_string(),

            default_llvm_version: "18".to_string(),
            allowed_llvm_versions: vec!["16".to_string(), "17".to_string(), "18".to_string()],

            stage_timeout: Duration::from_secs(60),
            execute_timeout: Duration::from_secs(10),

            workspace_root: std::env::temp_dir(),

            bind_addr: "0.0.0.0:3000".to_string(),
        }
    }
}

impl PipelineConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `IRFORGE_COMPILE_COMMAND`: Compile template
    /// - `IRFORGE_PASS_COMMAND`: Pass template
    /// - `IRFORGE_LINK_COMMAND`: Link template
    /// - `IRFORGE_EXECUTE_COMMAND`: Execute template (default: `{input}`)
    /// - `IRFORGE_PASS_PLUGIN`: Pass plugin path
    /// - `IRFORGE_DEFAULT_LLVM_VERSION`: Default LLVM version (default: 18)
    /// - `IRFORGE_ALLOWED_LLVM_VERSIONS`: Comma-separated versions (default: 16,17,18)
    /// - `IRFORGE_STAGE_TIMEOUT_SECS`: Compile/pass/link timeout (default: 60)
    /// - `IRFORGE_EXECUTE_TIMEOUT_SECS`: Program run timeout (default: 10)
    /// - `IRFORGE_WORKSPACE_ROOT`: Workspace root (default: system temp dir)
    /// - `IRFORGE_BIND_ADDR`: Bind address (default: 0.0.0.0:3000)
    /// - `PORT`: Port only, used when `IRFORGE_BIND_ADDR` is unset
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable has an invalid value or the
    /// resulting configuration fails validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        // Toolchain settings
        if let Ok(val) = std::env::var("IRFORGE_COMPILE_COMMAND") {
            config.compile_command = val;
        }

        if let Ok(val) = std::env::var("IRFORGE_PASS_COMMAND") {
            config.pass_command = val;
        }

        if let Ok(val) = std::env::var("IRFORGE_LINK_COMMAND") {
            config.link_command = val;
        }

        if let Ok(val) = std::env::var("IRFORGE_EXECUTE_COMMAND") {
            config.execute_command = val;
        }

        if let Ok(val) = std::env::var("IRFORGE_PASS_PLUGIN") {
            config.pass_plugin = val;
        }

        // Version settings
        if let Ok(val) = std::env::var("IRFORGE_DEFAULT_LLVM_VERSION") {
            config.default_llvm_version = val.trim().to_string();
        }

        if let Ok(val) = std::env::var("IRFORGE_ALLOWED_LLVM_VERSIONS") {
            config.allowed_llvm_versions = val
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        // Execution settings
        if let Ok(val) = std::env::var("IRFORGE_STAGE_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "IRFORGE_STAGE_TIMEOUT_SECS")?;
            config.stage_timeout = Duration::from_secs(secs);
        }

        if let Ok(val) = std::env::var("IRFORGE_EXECUTE_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "IRFORGE_EXECUTE_TIMEOUT_SECS")?;
            config.execute_timeout = Duration::from_secs(secs);
        }

        // Storage settings
        if let Ok(val) = std::env::var("IRFORGE_WORKSPACE_ROOT") {
            config.workspace_root = PathBuf::from(val);
        }

        // Server settings
        if let Ok(val) = std::env::var("IRFORGE_BIND_ADDR") {
            config.bind_addr = val;
        } else if let Ok(val) = std::env::var("PORT") {
            let port: u16 = parse_env_value(&val, "PORT")?;
            config.bind_addr = format!("0.0.0.0:{}", port);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Template validation
        validate_template("compile_command", &self.compile_command, &["input", "output"])?;
        validate_template("pass_command", &self.pass_command, &["input", "output", "pass"])?;
        validate_template("link_command", &self.link_command, &["input", "output"])?;
        validate_template("execute_command", &self.execute_command, &["input"])?;

        // Version validation
        if self.allowed_llvm_versions.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "allowed_llvm_versions cannot be empty".to_string(),
            ));
        }

        if let Some(bad) = self
            .allowed_llvm_versions
            .iter()
            .find(|v| !super::request::is_valid_version_tag(v))
        {
            return Err(ConfigError::ValidationFailed(format!(
                "allowed_llvm_versions contains invalid version '{}'",
                bad
            )));
        }

        if !self.allowed_llvm_versions.contains(&self.default_llvm_version) {
            return Err(ConfigError::ValidationFailed(format!(
                "default_llvm_version '{}' is not in allowed_llvm_versions",
                self.default_llvm_version
            )));
        }

        // Execution validation
        if self.stage_timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "stage_timeout must be greater than 0".to_string(),
            ));
        }

        if self.execute_timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "execute_timeout must be greater than 0".to_string(),
            ));
        }

        // Server validation
        if self.bind_addr.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::ValidationFailed(format!(
                "bind_addr '{}' is not a valid socket address",
                self.bind_addr
            )));
        }

        Ok(())
    }

    /// Parses the compile template.
    pub fn compile_template(&self) -> Result<CommandTemplate, ConfigError> {
        parse_template("compile_command", &self.compile_command)
    }

    /// Parses the pass template.
    pub fn pass_template(&self) -> Result<CommandTemplate, ConfigError> {
        parse_template("pass_command", &self.pass_command)
    }

    /// Parses the link template.
    pub fn link_template(&self) -> Result<CommandTemplate, ConfigError> {
        parse_template("link_command", &self.link_command)
    }

    /// Parses the execute template.
    pub fn execute_template(&self) -> Result<CommandTemplate, ConfigError> {
        parse_template("execute_command", &self.execute_command)
    }

    /// Builder method to set the compile template.
    pub fn with_compile_command(mut self, template: impl Into<String>) -> Self {
        self.compile_command = template.into();
        self
    }

    /// Builder method to set the pass template.
    pub fn with_pass_command(mut self, template: impl Into<String>) -> Self {
        self.pass_command = template.into();
        self
    }

    /// Builder method to set the link template.
    pub fn with_link_command(mut self, template: impl Into<String>) -> Self {
        self.link_command = template.into();
        self
    }

    /// Builder method to set the execute template.
    pub fn with_execute_command(mut self, template: impl Into<String>) -> Self {
        self.execute_command = template.into();
        self
    }

    /// Builder method to set the pass plugin path.
    pub fn with_pass_plugin(mut self, plugin: impl Into<String>) -> Self {
        self.pass_plugin = plugin.into();
        self
    }

    /// Builder method to set the default LLVM version.
    pub fn with_default_llvm_version(mut self, version: impl Into<String>) -> Self {
        self.default_llvm_version = version.into();
        self
    }

    /// Builder method to set the allowed LLVM versions.
    pub fn with_allowed_llvm_versions(mut self, versions: Vec<String>) -> Self {
        self.allowed_llvm_versions = versions;
        self
    }

    /// Builder method to set the compile/pass/link timeout.
    pub fn with_stage_timeout(mut self, timeout: Duration) -> Self {
        self.stage_timeout = timeout;
        self
    }

    /// Builder method to set the execute timeout.
    pub fn with_execute_timeout(mut self, timeout: Duration) -> Self {
        self.execute_timeout = timeout;
        self
    }

    /// Builder method to set the workspace root.
    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = root.into();
        self
    }

    /// Builder method to set the bind address.
    pub fn with_bind_addr(mut self, addr: impl Into<String>) -> Self {
        self.bind_addr = addr.into();
        self
    }
}

fn parse_template(key: &str, raw: &str) -> Result<CommandTemplate, ConfigError> {
    CommandTemplate::parse(raw).map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        message: e.to_string(),
    })
}

fn validate_template(key: &str, raw: &str, required: &[&str]) -> Result<(), ConfigError> {
    let template = CommandTemplate::parse(raw)
        .map_err(|e| ConfigError::ValidationFailed(format!("{}: {}", key, e)))?;

    for name in required {
        if !template.uses(name) {
            return Err(ConfigError::ValidationFailed(format!(
                "{} must reference {{{}}}",
                key, name
            )));
        }
    }

    Ok(())
}

/// Parse an environment variable value into a type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}
