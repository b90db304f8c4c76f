// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::batch::{BuildRequest, SharedProperties, requests_for};
use crate::engine::CommandTemplate;
use crate::types::Verbosity;

/// Configuration as read from a TOML file, before validation.
///
/// ```toml
/// [config]
/// concurrency = 2
/// verbosity = "normal"
///
/// [engine]
/// program = "dotnet"
/// args = ["msbuild", "{project}", "-target:{target}", "-nologo"]
///
/// [properties]
/// Configuration = "Debug"
///
/// [[batch]]
/// name = "core"
/// builds = [
///   { project = "resources/project1/CoreApp.csproj", target = "Restore" },
///   { project = "resources/project1/CoreApp.csproj", target = "Build" },
/// ]
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub config: ConfigSection,

    #[serde(default)]
    pub engine: EngineSection,

    /// Global properties passed to every build.
    #[serde(default)]
    pub properties: BTreeMap<String, String>,

    /// Batches from `[[batch]]`, run in file order.
    #[serde(default, rename = "batch")]
    pub batches: Vec<BatchConfig>,

    /// Directory relative project paths are resolved against. Set by the
    /// loader; not part of the file.
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

/// A validated configuration. Construct via `ConfigFile::try_from`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub config: ConfigSection,
    pub engine: EngineSection,
    pub properties: SharedProperties,
    /// Batches with absolute project paths.
    pub batches: Vec<BatchConfig>,
    /// Parsed `[config].timeout`.
    pub timeout: Option<Duration>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        config: ConfigSection,
        engine: EngineSection,
        properties: BTreeMap<String, String>,
        batches: Vec<BatchConfig>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            config,
            engine,
            properties: Arc::new(properties),
            batches,
            timeout,
        }
    }

    /// Effective concurrency for `batch`: its own override, else the global
    /// default.
    pub fn concurrency_for(&self, batch: &BatchConfig) -> usize {
        batch.concurrency.unwrap_or(self.config.concurrency)
    }

    /// One request per build of `batch`, all sharing the global properties.
    pub fn requests_for(&self, batch: &BatchConfig) -> Vec<BuildRequest> {
        requests_for(
            batch.builds.iter().map(|b| (b.project.clone(), b.target.clone())),
            &self.properties,
        )
    }

    pub fn command_template(&self) -> CommandTemplate {
        CommandTemplate::from(&self.engine)
    }

    pub fn batch(&self, name: &str) -> Option<&BatchConfig> {
        self.batches.iter().find(|b| b.name == name)
    }
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// Default concurrency limit (node count) for batches without their own.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Console reporter verbosity.
    #[serde(default)]
    pub verbosity: Verbosity,

    /// Optional per-batch timeout such as `"10m"`.
    #[serde(default)]
    pub timeout: Option<String>,
}

fn default_concurrency() -> usize {
    1
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            verbosity: Verbosity::default(),
            timeout: None,
        }
    }
}

/// `[engine]` section: how to invoke the external build tool.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSection {
    #[serde(default = "default_program")]
    pub program: String,

    /// Arguments; `{project}` and `{target}` are substituted per request.
    #[serde(default = "default_args")]
    pub args: Vec<String>,

    /// Appended once per global property; `{key}` and `{value}` are
    /// substituted.
    #[serde(default = "default_property_arg")]
    pub property_arg: String,

    /// Extra environment for the build tool (e.g. `MSBuildSDKsPath`).
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

fn default_program() -> String {
    "dotnet".to_string()
}

fn default_args() -> Vec<String> {
    ["msbuild", "{project}", "-target:{target}", "-nologo"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_property_arg() -> String {
    "-property:{key}={value}".to_string()
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_args(),
            property_arg: default_property_arg(),
            env: BTreeMap::new(),
        }
    }
}

impl From<&EngineSection> for CommandTemplate {
    fn from(engine: &EngineSection) -> Self {
        CommandTemplate {
            program: engine.program.clone(),
            args: engine.args.clone(),
            property_arg: engine.property_arg.clone(),
            env: engine.env.clone(),
        }
    }
}

/// `[[batch]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchConfig {
    pub name: String,

    /// Overrides `[config].concurrency` for this batch.
    #[serde(default)]
    pub concurrency: Option<usize>,

    #[serde(default)]
    pub builds: Vec<BuildConfig>,
}

/// One `{ project = ..., target = ... }` entry of a batch.
#[derive(Debug, Clone, Deserialize)]
pub struct BuildConfig {
    pub project: PathBuf,

    #[serde(default = "default_target")]
    pub target: String,
}

fn default_target() -> String {
    "Build".to_string()
}
