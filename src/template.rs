//! Destination path templates and `${secret}` interpolation.
//!
//! Artifact paths are a pure function of environment, date, and job id. Any
//! placeholder left over after substitution is an error, never a literal
//! file name.
use crate::error::EvidenceError;
use chrono::{Datelike, NaiveDate};
use regex::Regex;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

/// Placeholders a path template may use.
pub const PATH_PLACEHOLDERS: &[&str] = &["year", "date", "environment", "job_id", "ext"];

/// Template used when neither the job nor the config sets one.
pub const DEFAULT_PATH_TEMPLATE: &str = "{year}/{environment}/{date}.{job_id}.{ext}";

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{([^{}]*)\}").expect("valid placeholder regex"))
}

fn reference_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([^{}]*)\}").expect("valid reference regex"))
}

/// Values substituted into a path template.
#[derive(Debug, Clone)]
pub struct PathContext<'a> {
    pub date: NaiveDate,
    pub environment: &'a str,
    pub job_id: &'a str,
    pub ext: &'a str,
}

impl PathContext<'_> {
    fn value(&self, placeholder: &str) -> Option<String> {
        match placeholder {
            "year" => Some(self.date.year().to_string()),
            "date" => Some(self.date.format("%Y-%m-%d").to_string()),
            "environment" => Some(self.environment.to_string()),
            "job_id" => Some(self.job_id.to_string()),
            "ext" => Some(self.ext.to_string()),
            _ => None,
        }
    }
}

fn path_error(template: &str, detail: impl Into<String>) -> EvidenceError {
    EvidenceError::PathResolution {
        template: template.to_string(),
        detail: detail.into(),
    }
}

/// Check a template before any job runs.
pub fn validate_path_template(template: &str) -> Result<(), EvidenceError> {
    if template.trim().is_empty() {
        return Err(path_error(template, "template is empty"));
    }
    for caps in placeholder_regex().captures_iter(template) {
        let name = &caps[1];
        if !PATH_PLACEHOLDERS.contains(&name) {
            return Err(path_error(template, format!("unknown placeholder {{{name}}}")));
        }
    }
    let stripped = placeholder_regex().replace_all(template, "x");
    if stripped.contains('{') || stripped.contains('}') {
        return Err(path_error(template, "unbalanced brace"));
    }
    check_relative(template, Path::new(stripped.as_ref()))
}

/// Substitute every placeholder and return the artifact path relative to the output root.
pub fn resolve_path_template(
    template: &str,
    ctx: &PathContext<'_>,
) -> Result<PathBuf, EvidenceError> {
    validate_path_template(template)?;
    let mut unresolved = None;
    let rendered = placeholder_regex().replace_all(template, |caps: &regex::Captures| {
        match ctx.value(&caps[1]) {
            Some(value) => value,
            None => {
                unresolved.get_or_insert_with(|| caps[1].to_string());
                String::new()
            }
        }
    });
    if let Some(name) = unresolved {
        return Err(path_error(template, format!("unresolved placeholder {{{name}}}")));
    }
    let path = PathBuf::from(rendered.as_ref());
    check_relative(template, &path)?;
    if path.file_name().is_none() {
        return Err(path_error(template, "resolves to a directory, not a file"));
    }
    Ok(path)
}

fn check_relative(template: &str, path: &Path) -> Result<(), EvidenceError> {
    let escapes = path.components().any(|component| {
        matches!(
            component,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    });
    if escapes {
        return Err(path_error(
            template,
            "must be a relative path without '..'",
        ));
    }
    Ok(())
}

/// Names referenced as `${name}` in `text`.
pub fn references(text: &str) -> Vec<String> {
    reference_regex()
        .captures_iter(text)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Replace `${name}` references using `lookup`; returns the first unknown name on failure.
pub fn interpolate<'a, F>(text: &str, lookup: F) -> Result<String, String>
where
    F: Fn(&str) -> Option<&'a str>,
{
    let mut missing = None;
    let rendered = reference_regex().replace_all(text, |caps: &regex::Captures| {
        match lookup(&caps[1]) {
            Some(value) => value.to_string(),
            None => {
                missing.get_or_insert_with(|| caps[1].to_string());
                String::new()
            }
        }
    });
    match missing {
        Some(name) => Err(name),
        None => Ok(rendered.into_owned()),
    }
}
