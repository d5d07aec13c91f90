//! Compilation requests.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::config::PipelineConfig;
use super::registry;
use crate::error::RequestError;

/// Obfuscation options as sent by callers: a master switch plus one flag
/// per pass option key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObfuscationOptions {
    /// Master switch; when false no pass runs regardless of the flags.
    #[serde(default)]
    pub enabled: bool,
    /// Per-pass flags keyed by option name.
    #[serde(flatten)]
    pub flags: BTreeMap<String, bool>,
}

impl ObfuscationOptions {
    /// Creates options with the master switch off and no flags.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the master switch.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Sets one pass flag.
    pub fn with_flag(mut self, name: impl Into<String>, value: bool) -> Self {
        self.flags.insert(name.into(), value);
        self
    }

    /// Returns true if the flag for `name` is set to true.
    pub fn is_set(&self, name: &str) -> bool {
        self.flags.get(name).copied().unwrap_or(false)
    }
}

/// A validated compilation request. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilationRequest {
    source: String,
    llvm_version: String,
    options: ObfuscationOptions,
}

impl CompilationRequest {
    /// Validates caller input against `config`.
    ///
    /// # Errors
    ///
    /// - [`RequestError::MissingCode`] if `code` is absent or blank.
    /// - [`RequestError::InvalidVersion`] / [`RequestError::UnsupportedVersion`]
    ///   for a malformed or disallowed version tag.
    /// - [`RequestError::UnknownOption`] for a flag not in the pass registry.
    pub fn validate(
        code: Option<String>,
        llvm_version: Option<String>,
        options: ObfuscationOptions,
        config: &PipelineConfig,
    ) -> Result<Self, RequestError> {
        let source = match code {
            Some(code) if !code.trim().is_empty() => code,
            _ => return Err(RequestError::MissingCode),
        };

        let llvm_version = match llvm_version.map(|v| v.trim().to_string()) {
            Some(v) if !v.is_empty() => v,
            _ => config.default_llvm_version.clone(),
        };

        if !is_valid_version_tag(&llvm_version) {
            return Err(RequestError::InvalidVersion(llvm_version));
        }

        if !config.allowed_llvm_versions.contains(&llvm_version) {
            return Err(RequestError::UnsupportedVersion {
                version: llvm_version,
                supported: config.allowed_llvm_versions.join(", "),
            });
        }

        if let Some(unknown) = options.flags.keys().find(|k| registry::lookup(k).is_none()) {
            return Err(RequestError::UnknownOption(unknown.clone()));
        }

        Ok(Self {
            source,
            llvm_version,
            options,
        })
    }

    /// Returns the source text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Returns the toolchain version tag.
    pub fn llvm_version(&self) -> &str {
        &self.llvm_version
    }

    /// Returns the obfuscation options.
    pub fn options(&self) -> &ObfuscationOptions {
        &self.options
    }
}

/// Checks a version tag is safe to splice into a program name: one to
/// three dot-separated numeric components, e.g. `18` or `17.0.6`.
pub fn is_valid_version_tag(tag: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[0-9]{1,3}(\.[0-9]{1,3}){0,2}$").expect("version regex is valid")
    })
    .is_match(tag)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PipelineConfig {
        PipelineConfig::default()
    }

    #[test]
    fn test_validate_defaults_version() {
        let request = CompilationRequest::validate(
            Some("int main(){return 0;}".to_string()),
            None,
            ObfuscationOptions::new(),
            &config(),
        )
        .unwrap();

        assert_eq!(request.llvm_version(), "18");
        assert_eq!(request.source(), "int main(){return 0;}");
        assert!(!request.options().enabled);
    }

    #[test]
    fn test_validate_missing_code() {
        for code in [None, Some(String::new()), Some("  \n\t".to_string())] {
            let err = CompilationRequest::validate(code, None, ObfuscationOptions::new(), &config())
                .unwrap_err();
            assert_eq!(err, RequestError::MissingCode);
        }
    }

    #[test]
    fn test_validate_rejects_injected_version() {
        let err = CompilationRequest::validate(
            Some("int main(){}".to_string()),
            Some("18 && rm -rf /".to_string()),
            ObfuscationOptions::new(),
            &config(),
        )
        .unwrap_err();
        assert!(matches!(err, RequestError::InvalidVersion(_)));
    }

    #[test]
    fn test_validate_rejects_unsupported_version() {
        let err = CompilationRequest::validate(
            Some("int main(){}".to_string()),
            Some("12".to_string()),
            ObfuscationOptions::new(),
            &config(),
        )
        .unwrap_err();
        assert!(matches!(err, RequestError::UnsupportedVersion { .. }));
    }

    #[test]
    fn test_validate_rejects_unknown_option() {
        let options = ObfuscationOptions::new()
            .with_enabled(true)
            .with_flag("pluto_flattening", true)
            .with_flag("pluto_teleport", true);

        let err = CompilationRequest::validate(
            Some("int main(){}".to_string()),
            None,
            options,
            &config(),
        )
        .unwrap_err();
        assert_eq!(err, RequestError::UnknownOption("pluto_teleport".to_string()));
    }

    #[test]
    fn test_options_deserialize_from_wire_shape() {
        let options: ObfuscationOptions = serde_json::from_str(
            r#"{"pluto_substitution": true, "enabled": true, "pluto_flattening": false}"#,
        )
        .unwrap();

        assert!(options.enabled);
        assert!(options.is_set("pluto_substitution"));
        assert!(!options.is_set("pluto_flattening"));
        assert!(!options.is_set("pluto_indirect_call"));
        assert!(!options.flags.contains_key("enabled"));
    }

    #[test]
    fn test_options_enabled_defaults_false() {
        let options: ObfuscationOptions =
            serde_json::from_str(r#"{"pluto_flattening": true}"#).unwrap();
        assert!(!options.enabled);
    }

    #[test]
    fn test_version_tags() {
        assert!(is_valid_version_tag("18"));
        assert!(is_valid_version_tag("17.0.6"));
        assert!(!is_valid_version_tag(""));
        assert!(!is_valid_version_tag("18.0.0.1"));
        assert!(!is_valid_version_tag("v18"));
        assert!(!is_valid_version_tag("18/../../bin/sh"));
    }
}
