//! Command templates for toolchain invocations.
//!
//! A template is a whitespace-separated argv line such as
//! `opt-{version} -load-pass-plugin={plugin} -passes={pass} -S {input} -o {output}`.
//! No shell is involved: the first word is the program and every following
//! word becomes exactly one argument after placeholder substitution, so
//! bound paths containing shell metacharacters are passed through verbatim.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ToolError;

/// Placeholders a template may reference.
pub const PLACEHOLDERS: &[&str] = &["version", "input", "output", "pass", "plugin"];

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{([A-Za-z_]+)\}").expect("placeholder regex is valid"))
}

/// A parsed, validated command template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CommandTemplate {
    raw: String,
    words: Vec<String>,
}

impl CommandTemplate {
    /// Parses a template, rejecting empty lines and unknown placeholders.
    pub fn parse(raw: &str) -> Result<Self, ToolError> {
        let words: Vec<String> = raw.split_whitespace().map(String::from).collect();
        if words.is_empty() {
            return Err(ToolError::InvalidTemplate(
                "command template is empty".to_string(),
            ));
        }

        for caps in placeholder_regex().captures_iter(raw) {
            let name = &caps[1];
            if !PLACEHOLDERS.contains(&name) {
                return Err(ToolError::UnknownPlaceholder {
                    template: raw.to_string(),
                    name: name.to_string(),
                });
            }
        }

        Ok(Self {
            raw: raw.to_string(),
            words,
        })
    }

    /// Returns the template text as configured.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Returns true if the template references `{name}`.
    pub fn uses(&self, name: &str) -> bool {
        placeholder_regex()
            .captures_iter(&self.raw)
            .any(|caps| &caps[1] == name)
    }

    /// Substitutes every placeholder, producing a runnable command.
    pub fn bind(&self, bindings: &Bindings) -> Result<BoundCommand, ToolError> {
        let mut words = self
            .words
            .iter()
            .map(|word| substitute(word, bindings))
            .collect::<Result<Vec<_>, _>>()?
            .into_iter();

        let program = words.next().ok_or_else(|| {
            ToolError::InvalidTemplate("command template is empty".to_string())
        })?;

        Ok(BoundCommand {
            program,
            args: words.collect(),
            current_dir: None,
        })
    }
}

impl fmt::Display for CommandTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl std::str::FromStr for CommandTemplate {
    type Err = ToolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for CommandTemplate {
    type Error = ToolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CommandTemplate> for String {
    fn from(template: CommandTemplate) -> Self {
        template.raw
    }
}

fn substitute(word: &str, bindings: &Bindings) -> Result<String, ToolError> {
    let mut out = String::with_capacity(word.len());
    let mut last = 0;

    for caps in placeholder_regex().captures_iter(word) {
        let whole = caps.get(0).expect("capture group 0 always exists");
        let name = &caps[1];
        let value = bindings
            .get(name)
            .ok_or_else(|| ToolError::UnboundPlaceholder {
                name: name.to_string(),
            })?;
        out.push_str(&word[last..whole.start()]);
        out.push_str(value);
        last = whole.end();
    }

    out.push_str(&word[last..]);
    Ok(out)
}

/// Values for template placeholders.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    values: Vec<(&'static str, String)>,
}

impl Bindings {
    /// Creates an empty set of bindings.
    pub fn new() -> Self {
        Self::default()
    }

    fn set(mut self, name: &'static str, value: String) -> Self {
        self.values.retain(|(k, _)| *k != name);
        self.values.push((name, value));
        self
    }

    /// Binds `{version}`.
    pub fn version(self, version: impl Into<String>) -> Self {
        self.set("version", version.into())
    }

    /// Binds `{input}`.
    pub fn input(self, path: &Path) -> Self {
        self.set("input", path.display().to_string())
    }

    /// Binds `{output}`.
    pub fn output(self, path: &Path) -> Self {
        self.set("output", path.display().to_string())
    }

    /// Binds `{pass}`.
    pub fn pass(self, pass: impl Into<String>) -> Self {
        self.set("pass", pass.into())
    }

    /// Binds `{plugin}`.
    pub fn plugin(self, plugin: impl Into<String>) -> Self {
        self.set("plugin", plugin.into())
    }

    /// Returns the value bound to `name`, if any.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// A fully substituted command, ready to spawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundCommand {
    /// Program to execute.
    pub program: String,
    /// Arguments, one per template word.
    pub args: Vec<String>,
    /// Working directory of the spawned process; inherited when `None`.
    pub current_dir: Option<PathBuf>,
}

impl BoundCommand {
    /// Creates a command directly, bypassing templates.
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            current_dir: None,
        }
    }

    /// Runs the command from `dir`, so relative arguments resolve inside it.
    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }
}

impl fmt::Display for BoundCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}
