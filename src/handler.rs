//! Turns one `(environment, job)` pair into one written artifact.
use crate::artifact::{self, Artifact};
use crate::environment::ScopedActivation;
#[cfg(test)]
use crate::environment::{activate, EnvironmentProfile, VarSource};
use crate::error::EvidenceError;
use crate::job::{EvidenceJob, PaginationStyle};
use crate::paginate::{drain_items, paginate, token_at};
use crate::runner::{CommandOutput, CommandRunner};
use crate::template::{resolve_path_template, PathContext};
use crate::util::sha256_hex;
use chrono::NaiveDate;
use serde_json::Value;
use std::path::PathBuf;

pub struct EvidenceHandler<R> {
    runner: R,
    output_root: PathBuf,
    date: NaiveDate,
    default_template: String,
}

impl<R: CommandRunner> EvidenceHandler<R> {
    pub fn new(runner: R, output_root: PathBuf, date: NaiveDate, default_template: String) -> Self {
        Self {
            runner,
            output_root,
            date,
            default_template,
        }
    }

    /// Activate `profile` and run `job` under it.
    #[cfg(test)]
    pub fn run(
        &self,
        profile: &EnvironmentProfile,
        vars: &dyn VarSource,
        job: &EvidenceJob,
    ) -> Result<Artifact, EvidenceError> {
        let activation = activate(profile, vars)?;
        self.run_activated(&activation, job)
    }

    /// Absolute destination for `job` in `environment` on this handler's date.
    pub fn destination(&self, environment: &str, job: &EvidenceJob) -> Result<PathBuf, EvidenceError> {
        let template = job
            .path_template
            .as_deref()
            .unwrap_or(self.default_template.as_str());
        let ctx = PathContext {
            date: self.date,
            environment,
            job_id: &job.id,
            ext: job.format.extension(),
        };
        Ok(self.output_root.join(resolve_path_template(template, &ctx)?))
    }

    /// Run `job` under an existing activation.
    ///
    /// Path resolution and directory creation happen before the external
    /// call; the artifact only appears once the full result is in hand.
    pub fn run_activated(
        &self,
        activation: &ScopedActivation,
        job: &EvidenceJob,
    ) -> Result<Artifact, EvidenceError> {
        let path = self.destination(activation.environment(), job)?;
        if let Some(parent) = path.parent() {
            artifact::ensure_dir(parent)?;
        }

        let result = self.collect(activation, job)?;
        let result = match &job.select {
            Some(pointer) => result.pointer(pointer).cloned().ok_or_else(|| {
                EvidenceError::parse(&job.id, format!("result has no value at {pointer:?}"))
            })?,
            None => result,
        };

        let bytes = artifact::render(&result, job.format)?;
        artifact::write_atomic(&path, &bytes)?;

        Ok(Artifact {
            job_id: job.id.clone(),
            environment: activation.environment().to_string(),
            path,
            format: job.format,
            bytes: bytes.len(),
            sha256: sha256_hex(&bytes),
        })
    }

    fn collect(
        &self,
        activation: &ScopedActivation,
        job: &EvidenceJob,
    ) -> Result<Value, EvidenceError> {
        let Some(pagination) = &job.pagination else {
            return Ok(self.runner.run(&job.command, activation)?.body);
        };

        let fetch = |token: Option<&str>| match token {
            None => self.runner.run(&job.command, activation),
            Some(token) => self
                .runner
                .run(&job.command.with_page_token(pagination, token), activation),
        };
        let next = |page: &CommandOutput| match pagination.style {
            PaginationStyle::Token => pagination
                .next_token
                .as_deref()
                .and_then(|pointer| token_at(page, pointer)),
            PaginationStyle::LinkHeader => page.next_link.clone(),
        };
        let drained = drain_items(paginate(fetch, next, pagination.max_pages), &pagination.items)?;
        tracing::debug!(
            job_id = %job.id,
            items = drained.as_array().map_or(0, Vec::len),
            "pagination drained"
        );
        Ok(drained)
    }
}
