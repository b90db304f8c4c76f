#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::PathBuf;

use batchbuild::config::{
    BatchConfig, BuildConfig, ConfigFile, ConfigSection, EngineSection, RawConfigFile,
};

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                config: ConfigSection::default(),
                engine: EngineSection::default(),
                properties: BTreeMap::new(),
                batches: Vec::new(),
                base_dir: None,
            },
        }
    }

    pub fn concurrency(mut self, limit: usize) -> Self {
        self.config.config.concurrency = limit;
        self
    }

    pub fn timeout(mut self, timeout: &str) -> Self {
        self.config.config.timeout = Some(timeout.to_string());
        self
    }

    pub fn program(mut self, program: &str) -> Self {
        self.config.engine.program = program.to_string();
        self
    }

    pub fn args(mut self, args: &[&str]) -> Self {
        self.config.engine.args = args.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn property(mut self, key: &str, value: &str) -> Self {
        self.config
            .properties
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.base_dir = Some(dir.into());
        self
    }

    pub fn with_batch(mut self, batch: BatchConfig) -> Self {
        self.config.batches.push(batch);
        self
    }

    /// The unvalidated model, for tests that exercise validation.
    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `BatchConfig`.
pub struct BatchBuilder {
    batch: BatchConfig,
}

impl BatchBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            batch: BatchConfig {
                name: name.to_string(),
                concurrency: None,
                builds: Vec::new(),
            },
        }
    }

    pub fn concurrency(mut self, limit: usize) -> Self {
        self.batch.concurrency = Some(limit);
        self
    }

    pub fn build_target(mut self, project: &str, target: &str) -> Self {
        self.batch.builds.push(BuildConfig {
            project: PathBuf::from(project),
            target: target.to_string(),
        });
        self
    }

    pub fn build(self) -> BatchConfig {
        self.batch
    }
}
