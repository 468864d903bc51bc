//! Drives a run across environments and jobs.
//!
//! Credentials for every selected environment are resolved up front; a
//! missing variable is a configuration error and nothing runs. After that,
//! each job failure is recorded and the run continues with the next job.
use crate::config::HarnessConfig;
use crate::environment::{activate, ScopedActivation, VarSource};
use crate::error::EvidenceError;
use crate::handler::EvidenceHandler;
use crate::runner::CommandRunner;
use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;

/// Which environments and jobs to run; empty lists mean all.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub environments: Vec<String>,
    pub jobs: Vec<String>,
}

/// The resolved `(environment, jobs)` plan for a run.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub steps: Vec<(String, Vec<String>)>,
}

impl RunPlan {
    pub fn job_count(&self) -> usize {
        self.steps.iter().map(|(_, jobs)| jobs.len()).sum()
    }
}

/// Resolve a selection against the config, rejecting unknown names.
pub fn plan(config: &HarnessConfig, selection: &Selection) -> Result<RunPlan> {
    for name in &selection.environments {
        if config.environment(name).is_none() {
            return Err(anyhow!("unknown environment {name:?}"));
        }
    }
    for id in &selection.jobs {
        if config.job(id).is_none() {
            return Err(anyhow!("unknown job {id:?}"));
        }
    }

    let mut steps = Vec::new();
    for env in &config.environments {
        if !selection.environments.is_empty() && !selection.environments.contains(&env.name) {
            continue;
        }
        let jobs: Vec<String> = config
            .jobs
            .iter()
            .filter(|job| selection.jobs.is_empty() || selection.jobs.contains(&job.id))
            .filter(|job| job.applies_to(&env.name))
            .map(|job| job.id.clone())
            .collect();
        if !jobs.is_empty() {
            steps.push((env.name.clone(), jobs));
        }
    }
    if steps.is_empty() {
        return Err(anyhow!("selection matches no job in any environment"));
    }
    Ok(RunPlan { steps })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobStatus {
    Succeeded {
        path: PathBuf,
        bytes: usize,
        sha256: String,
    },
    Failed {
        category: String,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobOutcome {
    pub environment: String,
    pub job_id: String,
    #[serde(flatten)]
    pub status: JobStatus,
    pub elapsed_ms: u64,
}

impl JobOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self.status, JobStatus::Succeeded { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub date: NaiveDate,
    pub succeeded: usize,
    pub failed: usize,
    pub outcomes: Vec<JobOutcome>,
}

impl RunSummary {
    fn from_outcomes(date: NaiveDate, outcomes: Vec<JobOutcome>) -> Self {
        let succeeded = outcomes.iter().filter(|outcome| outcome.succeeded()).count();
        Self {
            date,
            succeeded,
            failed: outcomes.len() - succeeded,
            outcomes,
        }
    }

    /// 0 when every job produced its artifact, 1 otherwise.
    pub fn exit_code(&self) -> u8 {
        if self.failed == 0 {
            0
        } else {
            1
        }
    }

    /// Plain-text report, one line per job.
    pub fn render_text(&self, output_root: &std::path::Path) -> String {
        let mut out = String::new();
        out.push_str(&format!("Evidence run {}\n", self.date.format("%Y-%m-%d")));
        for outcome in &self.outcomes {
            match &outcome.status {
                JobStatus::Succeeded { path, bytes, .. } => out.push_str(&format!(
                    "  ok      {:<12} {:<32} {} ({bytes} bytes)\n",
                    outcome.environment,
                    outcome.job_id,
                    crate::util::display_path(path, Some(output_root)),
                )),
                JobStatus::Failed { category, message } => out.push_str(&format!(
                    "  FAILED  {:<12} {:<32} [{category}] {message}\n",
                    outcome.environment, outcome.job_id,
                )),
            }
        }
        out.push_str(&format!(
            "{} succeeded, {} failed\n",
            self.succeeded, self.failed
        ));
        out
    }
}

pub struct Orchestrator<'a, R> {
    config: &'a HarnessConfig,
    handler: EvidenceHandler<R>,
    date: NaiveDate,
}

impl<'a, R: CommandRunner> Orchestrator<'a, R> {
    pub fn new(config: &'a HarnessConfig, runner: R, output_root: PathBuf, date: NaiveDate) -> Self {
        let handler =
            EvidenceHandler::new(runner, output_root, date, config.path_template.clone());
        Self {
            config,
            handler,
            date,
        }
    }

    /// Activate every environment in the plan, failing on the first missing credential.
    pub fn preflight(
        &self,
        plan: &RunPlan,
        vars: &dyn VarSource,
    ) -> Result<Vec<ScopedActivation>, EvidenceError> {
        plan.steps
            .iter()
            .map(|(name, _)| {
                let profile = self.config.environment(name).ok_or_else(|| {
                    EvidenceError::CredentialsMissing {
                        environment: name.clone(),
                        variable: "<unknown environment>".to_string(),
                    }
                })?;
                activate(profile, vars)
            })
            .collect()
    }

    /// Run every planned job, recording one outcome per job.
    pub fn run(&self, plan: &RunPlan, activations: &[ScopedActivation]) -> RunSummary {
        let mut outcomes = Vec::with_capacity(plan.job_count());
        for ((environment, job_ids), activation) in plan.steps.iter().zip(activations) {
            tracing::info!(environment = %environment, jobs = job_ids.len(), "collecting environment");
            for job_id in job_ids {
                let start = Instant::now();
                let result = match self.config.job(job_id) {
                    Some(job) => self.handler.run_activated(activation, job),
                    None => Err(EvidenceError::parse(job_id, "job missing from config")),
                };
                let elapsed_ms = start.elapsed().as_millis() as u64;
                let status = match result {
                    Ok(artifact) => {
                        tracing::info!(
                            environment = %environment,
                            job_id = %job_id,
                            path = %artifact.path.display(),
                            bytes = artifact.bytes,
                            elapsed_ms,
                            "job complete"
                        );
                        JobStatus::Succeeded {
                            path: artifact.path,
                            bytes: artifact.bytes,
                            sha256: artifact.sha256,
                        }
                    }
                    Err(err) => {
                        tracing::warn!(
                            environment = %environment,
                            job_id = %job_id,
                            category = err.category(),
                            error = %err,
                            elapsed_ms,
                            "job failed"
                        );
                        JobStatus::Failed {
                            category: err.category().to_string(),
                            message: err.to_string(),
                        }
                    }
                };
                outcomes.push(JobOutcome {
                    environment: environment.clone(),
                    job_id: job_id.clone(),
                    status,
                    elapsed_ms,
                });
            }
        }
        RunSummary::from_outcomes(self.date, outcomes)
    }
}
