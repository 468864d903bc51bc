//! Harness configuration: the environment table and the declarative job table.
//!
//! The whole file is validated before any job runs, so template typos,
//! undefined secrets, and malformed commands are configuration errors rather
//! than mid-run surprises.
use crate::environment::{EnvironmentProfile, VarSource};
use crate::job::{CommandSpec, EvidenceJob, PaginationStyle};
use crate::runner::DEFAULT_TIMEOUT_SECS;
use crate::template::{references, validate_path_template, DEFAULT_PATH_TEMPLATE};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_SCHEMA_VERSION: u32 = 1;
pub const DEFAULT_OUTPUT_ROOT: &str = "/evidence-artifacts";
/// Variable naming the config file when `--config` is absent.
pub const CONFIG_PATH_ENV: &str = "EVIDENCE_CONFIG";

const STARTER_CONFIG: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/templates/starter-config.json"
));

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HarnessConfig {
    pub schema_version: u32,
    #[serde(default = "default_output_root")]
    pub output_root: PathBuf,
    #[serde(default = "default_path_template")]
    pub path_template: String,
    /// Bound on each external call.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    pub environments: Vec<EnvironmentProfile>,
    pub jobs: Vec<EvidenceJob>,
}

fn default_output_root() -> PathBuf {
    PathBuf::from(DEFAULT_OUTPUT_ROOT)
}

fn default_path_template() -> String {
    DEFAULT_PATH_TEMPLATE.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl HarnessConfig {
    pub fn environment(&self, name: &str) -> Option<&EnvironmentProfile> {
        self.environments.iter().find(|env| env.name == name)
    }

    pub fn job(&self, id: &str) -> Option<&EvidenceJob> {
        self.jobs.iter().find(|job| job.id == id)
    }
}

/// Pick the config path: explicit flag, then `EVIDENCE_CONFIG`, then the user config dir.
pub fn resolve_config_path(explicit: Option<&Path>, vars: &dyn VarSource) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    if let Some(path) = vars.var(CONFIG_PATH_ENV).filter(|value| !value.trim().is_empty()) {
        return Ok(PathBuf::from(path));
    }
    let base = dirs::config_dir()
        .or_else(dirs::home_dir)
        .ok_or_else(|| anyhow!("cannot determine a config directory; pass --config"))?;
    Ok(base.join("evidence-harness").join("config.json"))
}

/// Load and validate a config file.
pub fn load_config(path: &Path) -> Result<HarnessConfig> {
    let bytes = fs::read(path).with_context(|| format!("read config {}", path.display()))?;
    let config: HarnessConfig = serde_json::from_slice(&bytes)
        .with_context(|| format!("parse config JSON {}", path.display()))?;
    validate_config(&config).with_context(|| format!("invalid config {}", path.display()))?;
    Ok(config)
}

/// Starter config text written by `evidence init`.
pub fn starter_config() -> &'static str {
    STARTER_CONFIG
}

/// Write the starter config, refusing to clobber an existing file unless `force`.
pub fn write_starter_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        return Err(anyhow!(
            "{} already exists (use --force to overwrite)",
            path.display()
        ));
    }
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    crate::artifact::write_atomic(path, starter_config().as_bytes())
        .with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

/// Validate schema, names, templates, commands, and secret references.
pub fn validate_config(config: &HarnessConfig) -> Result<()> {
    if config.schema_version != CONFIG_SCHEMA_VERSION {
        return Err(anyhow!(
            "unsupported config schema_version {} (expected {CONFIG_SCHEMA_VERSION})",
            config.schema_version
        ));
    }
    if config.timeout_secs == 0 {
        return Err(anyhow!("timeout_secs must be greater than zero"));
    }
    if config.environments.is_empty() {
        return Err(anyhow!("config defines no environments"));
    }
    validate_path_template(&config.path_template).context("path_template")?;

    let mut env_names = BTreeSet::new();
    for env in &config.environments {
        validate_segment(&env.name, "environment name")?;
        if !env_names.insert(env.name.as_str()) {
            return Err(anyhow!("duplicate environment {:?}", env.name));
        }
        if env.region.trim().is_empty() {
            return Err(anyhow!("environment {:?} has an empty region", env.name));
        }
    }

    let mut job_ids = BTreeSet::new();
    for job in &config.jobs {
        validate_segment(&job.id, "job id")?;
        if !job_ids.insert(job.id.as_str()) {
            return Err(anyhow!("duplicate job id {:?}", job.id));
        }
        validate_job(config, job).with_context(|| format!("job {:?}", job.id))?;
    }
    Ok(())
}

fn validate_job(config: &HarnessConfig, job: &EvidenceJob) -> Result<()> {
    if let Some(template) = &job.path_template {
        validate_path_template(template)?;
    }
    if let Some(names) = &job.environments {
        for name in names {
            if config.environment(name).is_none() {
                return Err(anyhow!("references unknown environment {name:?}"));
            }
        }
    }
    if let Some(pointer) = &job.select {
        validate_pointer(pointer, "select")?;
    }

    let referenced = match &job.command {
        CommandSpec::Exec(argv) => {
            argv.to_argv()?;
            Vec::new()
        }
        CommandSpec::Http(request) => {
            if request.url.trim().is_empty() {
                return Err(anyhow!("http url is empty"));
            }
            let mut names = references(&request.url);
            for value in request.headers.values().chain(request.query.values()) {
                names.extend(references(value));
            }
            names
        }
    };
    for env in config
        .environments
        .iter()
        .filter(|env| job.applies_to(&env.name))
    {
        if let Some(name) = referenced.iter().find(|name| !env.defines_reference(name)) {
            return Err(anyhow!(
                "references ${{{name}}} which environment {:?} does not define in secrets",
                env.name
            ));
        }
    }

    if let Some(pagination) = &job.pagination {
        validate_pointer(&pagination.items, "pagination.items")?;
        if pagination.max_pages == 0 {
            return Err(anyhow!("pagination.max_pages must be greater than zero"));
        }
        match (pagination.style, &job.command) {
            (PaginationStyle::Token, command) => {
                let pointer = pagination
                    .next_token
                    .as_deref()
                    .ok_or_else(|| anyhow!("token pagination requires next_token"))?;
                validate_pointer(pointer, "pagination.next_token")?;
                if matches!(command, CommandSpec::Exec(_)) && pagination.token_param.is_none() {
                    return Err(anyhow!("token pagination of a command requires token_param"));
                }
            }
            (PaginationStyle::LinkHeader, CommandSpec::Exec(_)) => {
                return Err(anyhow!("link_header pagination requires an http command"));
            }
            (PaginationStyle::LinkHeader, CommandSpec::Http(_)) => {}
        }
    }
    Ok(())
}

/// Names become path segments, so they must not carry separators or dot-dirs.
fn validate_segment(value: &str, label: &str) -> Result<()> {
    let valid_chars = value
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.'));
    if value.is_empty() || !valid_chars || value == "." || value == ".." {
        return Err(anyhow!(
            "{label} {value:?} must be non-empty and use only letters, digits, '-', '_', '.'"
        ));
    }
    Ok(())
}

fn validate_pointer(pointer: &str, label: &str) -> Result<()> {
    if !pointer.is_empty() && !pointer.starts_with('/') {
        return Err(anyhow!(
            "{label} must be a JSON pointer starting with '/' (got {pointer:?})"
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests;
