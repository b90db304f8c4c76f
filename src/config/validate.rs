// src/config/validate.rs

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::warn;

use crate::config::model::{BatchConfig, ConfigFile, RawConfigFile};
use crate::errors::{BatchError, Result};
use crate::types::parse_duration;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::BatchError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        let timeout = parse_timeout(&raw)?;
        let base_dir = raw.base_dir.clone().unwrap_or_else(|| PathBuf::from("."));
        let batches = resolve_project_paths(raw.batches, &base_dir)?;

        Ok(ConfigFile::new_unchecked(
            raw.config,
            raw.engine,
            raw.properties,
            batches,
            timeout,
        ))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_batches(cfg)?;
    validate_global_config(cfg)?;
    validate_engine(cfg)?;
    validate_batches(cfg)?;
    Ok(())
}

fn ensure_has_batches(cfg: &RawConfigFile) -> Result<()> {
    if cfg.batches.is_empty() {
        return Err(BatchError::Config(
            "config must contain at least one [[batch]] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_global_config(cfg: &RawConfigFile) -> Result<()> {
    if cfg.config.concurrency == 0 {
        return Err(BatchError::Config(
            "[config].concurrency must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_engine(cfg: &RawConfigFile) -> Result<()> {
    if cfg.engine.program.trim().is_empty() {
        return Err(BatchError::Config(
            "[engine].program must not be empty".to_string(),
        ));
    }
    if !cfg.engine.args.iter().any(|a| a.contains("{project}")) {
        warn!("[engine].args has no {{project}} placeholder; every build gets the same command line");
    }
    Ok(())
}

fn validate_batches(cfg: &RawConfigFile) -> Result<()> {
    let mut seen = HashSet::new();

    for batch in cfg.batches.iter() {
        let name = batch.name.trim();
        if name.is_empty() {
            return Err(BatchError::Config(
                "every [[batch]] needs a non-empty `name`".to_string(),
            ));
        }
        if name != batch.name {
            return Err(BatchError::Config(format!(
                "batch name '{}' has leading or trailing whitespace",
                batch.name
            )));
        }
        if !seen.insert(name) {
            return Err(BatchError::Config(format!(
                "duplicate batch name '{}'",
                name
            )));
        }
        if batch.concurrency == Some(0) {
            return Err(BatchError::Config(format!(
                "batch '{}' has concurrency 0; it must be >= 1",
                name
            )));
        }
        if batch.builds.is_empty() {
            warn!(batch = %name, "batch has no builds; it will be a no-op");
        }
        for build in batch.builds.iter() {
            if build.project.as_os_str().is_empty() {
                return Err(BatchError::Config(format!(
                    "batch '{}' has a build with an empty `project`",
                    name
                )));
            }
            if build.target.trim().is_empty() {
                return Err(BatchError::Config(format!(
                    "batch '{}' has an empty target for project '{}'",
                    name,
                    build.project.display()
                )));
            }
        }
    }
    Ok(())
}

fn parse_timeout(cfg: &RawConfigFile) -> Result<Option<Duration>> {
    cfg.config
        .timeout
        .as_deref()
        .map(|s| {
            parse_duration(s)
                .map_err(|e| BatchError::Config(format!("[config].timeout: {e}")))
        })
        .transpose()
}

/// Make every project path absolute, resolving relative ones against
/// `base_dir`.
fn resolve_project_paths(
    mut batches: Vec<BatchConfig>,
    base_dir: &Path,
) -> Result<Vec<BatchConfig>> {
    for batch in batches.iter_mut() {
        for build in batch.builds.iter_mut() {
            build.project = std::path::absolute(base_dir.join(&build.project))?;
        }
    }
    Ok(batches)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(toml_src: &str) -> RawConfigFile {
        toml::from_str(toml_src).unwrap()
    }

    fn config_error(toml_src: &str) -> String {
        match ConfigFile::try_from(raw(toml_src)) {
            Err(BatchError::Config(msg)) => msg,
            other => panic!("expected a config error, got {other:?}"),
        }
    }

    #[test]
    fn defaults_fill_in_missing_sections() {
        let mut raw = raw(
            r#"
            [[batch]]
            name = "core"
            builds = [{ project = "a/A.csproj" }]
            "#,
        );
        raw.base_dir = Some(PathBuf::from("/work"));

        let cfg = ConfigFile::try_from(raw).unwrap();
        assert_eq!(cfg.config.concurrency, 1);
        assert_eq!(cfg.engine.program, "dotnet");
        assert_eq!(cfg.timeout, None);

        let build = &cfg.batches[0].builds[0];
        assert_eq!(build.target, "Build");
        assert_eq!(build.project, PathBuf::from("/work/a/A.csproj"));
    }

    #[test]
    fn timeout_is_parsed() {
        let cfg = ConfigFile::try_from(raw(
            r#"
            [config]
            timeout = "2m"

            [[batch]]
            name = "core"
            "#,
        ))
        .unwrap();
        assert_eq!(cfg.timeout, Some(Duration::from_secs(120)));
    }

    #[test]
    fn rejects_missing_batches() {
        assert!(config_error("").contains("at least one"));
    }

    #[test]
    fn rejects_zero_concurrency() {
        let msg = config_error(
            r#"
            [config]
            concurrency = 0

            [[batch]]
            name = "core"
            "#,
        );
        assert!(msg.contains("concurrency"));

        let msg = config_error(
            r#"
            [[batch]]
            name = "core"
            concurrency = 0
            "#,
        );
        assert!(msg.contains("core"));
    }

    #[test]
    fn rejects_duplicate_and_blank_batch_names() {
        let msg = config_error(
            r#"
            [[batch]]
            name = "core"

            [[batch]]
            name = "core"
            "#,
        );
        assert!(msg.contains("duplicate"));

        let msg = config_error(
            r#"
            [[batch]]
            name = "  "
            "#,
        );
        assert!(msg.contains("name"));
    }

    #[test]
    fn rejects_padded_batch_names() {
        let msg = config_error(
            r#"
            [[batch]]
            name = "core "

            [[batch]]
            name = "core"
            "#,
        );
        assert!(msg.contains("whitespace"));
        assert!(msg.contains("'core '"));
    }

    #[test]
    fn rejects_empty_target_and_program() {
        let msg = config_error(
            r#"
            [[batch]]
            name = "core"
            builds = [{ project = "A.csproj", target = "" }]
            "#,
        );
        assert!(msg.contains("empty target"));

        let msg = config_error(
            r#"
            [engine]
            program = ""

            [[batch]]
            name = "core"
            "#,
        );
        assert!(msg.contains("program"));
    }

    #[test]
    fn rejects_bad_timeout() {
        let msg = config_error(
            r#"
            [config]
            timeout = "forever"

            [[batch]]
            name = "core"
            "#,
        );
        assert!(msg.contains("timeout"));
    }
}
