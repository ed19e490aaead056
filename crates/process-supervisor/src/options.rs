//! Supervisor configuration

use rotate_log::LoggerConfig;
use rotate_log::factory::clean;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::command::Command;
use crate::error::{Error, HookError, Result};
use crate::{env, template};

/// Callback run against the prepared command just before each spawn
pub type PreStartHook = Arc<dyn Fn(&mut Command) -> std::result::Result<(), HookError> + Send + Sync>;

/// What to run and how to capture its output
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Executable to run; may contain `{tag}` placeholders
    pub execute: String,
    /// Arguments; may contain placeholders
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Working directory, empty for the supervisor's own
    #[serde(skip_serializing_if = "String::is_empty")]
    pub dir: String,
    /// Extra `KEY=VALUE` environment entries; values may contain placeholders
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,
    /// Advisory delay between restarts for an outer orchestrator
    #[serde(with = "crate::duration")]
    pub restart_delay: Duration,
    /// Where to send the child's output, `None` discards it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logger: Option<LoggerConfig>,
    /// Keep unresolved `{tag}` placeholders instead of dropping them
    pub keep_unknown_tags: bool,
    /// Hooks run in order before every spawn
    #[serde(skip)]
    pub pre_start: Vec<PreStartHook>,
}

impl Options {
    /// Options running `execute` with no arguments
    pub fn new(execute: impl Into<String>) -> Self {
        Self {
            execute: execute.into(),
            ..Self::default()
        }
    }

    /// Append an argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the working directory
    pub fn dir(mut self, dir: impl Into<String>) -> Self {
        self.dir = dir.into();
        self
    }

    /// Add a `KEY=VALUE` environment entry
    pub fn env(mut self, entry: impl Into<String>) -> Self {
        self.env.push(entry.into());
        self
    }

    /// Capture output through the given logger configuration
    pub fn logger(mut self, logger: LoggerConfig) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Keep or drop unresolved placeholders
    pub fn keep_unknown_tags(mut self, keep: bool) -> Self {
        self.keep_unknown_tags = keep;
        self
    }

    /// Register a hook run before every spawn
    pub fn pre_start<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut Command) -> std::result::Result<(), HookError> + Send + Sync + 'static,
    {
        self.pre_start.push(Arc::new(hook));
        self
    }

    /// Parse options from YAML text
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).map_err(|e| Error::config(e.to_string()))
    }

    /// Parse options from JSON text
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::config(e.to_string()))
    }

    /// Load options from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("{}: {}", path.display(), e)))?;
        Self::from_yaml_str(&text)
    }

    /// Working directory after placeholder resolution and lexical cleaning
    pub fn working_dir(&self) -> Option<PathBuf> {
        let dir = self.dir.trim();
        if dir.is_empty() {
            return None;
        }
        let dir = template::resolve(dir, &HashMap::new(), self.keep_unknown_tags);
        Some(clean(Path::new(&dir)))
    }

    /// Build the command for one launch.
    ///
    /// Placeholders are re-resolved on every call so a relaunch picks up
    /// environment changes. `{dir}` names the working directory.
    pub fn command(&self) -> Command {
        let dir = self.working_dir();
        let dir_var = dir
            .as_ref()
            .map(|d| d.to_string_lossy().into_owned())
            .unwrap_or_else(|| ".".to_string());
        let vars = HashMap::from([("dir".to_string(), dir_var)]);
        let keep = self.keep_unknown_tags;

        let execute = template::resolve(self.execute.trim(), &vars, keep);
        let args = template::resolve_all(&self.args, &vars, keep);
        let entries = template::resolve_all(&self.env, &vars, keep);

        let mut command = Command::builder(execute)
            .args(args)
            .env_exact(env::inherit(&entries))
            .build();
        if let Some(dir) = dir {
            command.current_dir(dir);
        }
        command
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("execute", &self.execute)
            .field("args", &self.args)
            .field("dir", &self.dir)
            .field("env", &self.env)
            .field("restart_delay", &self.restart_delay)
            .field("logger", &self.logger)
            .field("keep_unknown_tags", &self.keep_unknown_tags)
            .field("pre_start", &format_args!("[{} hooks]", self.pre_start.len()))
            .finish()
    }
}
