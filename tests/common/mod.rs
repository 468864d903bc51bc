//! Shared test infrastructure for integration tests.

use serde_json::{json, Value};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// Credentials for the `test-env` environment under their conventional names.
pub const TEST_ENV_CREDENTIALS: [(&str, &str); 2] = [
    ("AWS_TEST_ENV_ACCESS_KEY_ID", "AKIATESTENV"),
    ("AWS_TEST_ENV_SECRET_ACCESS_KEY", "test-env-secret"),
];

/// A temp workspace holding a config file and an artifact root.
pub struct Harness {
    pub dir: TempDir,
}

impl Harness {
    /// Write `jobs` into a config with a single `test-env` environment.
    pub fn with_jobs(jobs: Value) -> Self {
        let harness = Self {
            dir: tempfile::tempdir().expect("create temp dir"),
        };
        harness.write_config(&json!({
            "schema_version": 1,
            "output_root": harness.output_root(),
            "timeout_secs": 20,
            "environments": [{"name": "test-env", "region": "us-east-1"}],
            "jobs": jobs
        }));
        harness
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.path().join("config.json")
    }

    pub fn output_root(&self) -> PathBuf {
        self.dir.path().join("artifacts")
    }

    pub fn write_config(&self, config: &Value) {
        let text = serde_json::to_string_pretty(config).expect("serialize config");
        fs::write(self.config_path(), text).expect("write config");
    }

    pub fn artifact(&self, relative: &str) -> PathBuf {
        self.output_root().join(relative)
    }

    /// Run the binary with `args` plus `--config`, a clean environment, and `vars`.
    pub fn run(&self, args: &[&str], vars: &[(&str, &str)]) -> Output {
        let mut command = evidence_command();
        command.args(args).arg("--config").arg(self.config_path());
        for (name, value) in vars {
            command.env(name, value);
        }
        command.output().expect("run evidence")
    }

    /// `collect` on a fixed date with `test-env` credentials present.
    pub fn collect(&self, args: &[&str]) -> Output {
        let mut full = vec!["collect", "--date", "2024-01-15"];
        full.extend_from_slice(args);
        self.run(&full, &TEST_ENV_CREDENTIALS)
    }
}

/// The compiled binary with an environment that only carries `PATH`.
pub fn evidence_command() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_evidence"));
    command.env_clear();
    if let Some(path) = env::var_os("PATH") {
        command.env("PATH", path);
    }
    command
}

/// An exec job whose command prints `script` output via `sh -c`.
pub fn shell_job(id: &str, script: &str) -> Value {
    json!({"id": id, "command": {"exec": ["sh", "-c", script]}})
}

/// An exec job printing `value` as compact JSON.
pub fn printing_job(id: &str, value: &Value) -> Value {
    let script = format!("printf '%s' '{}'", value);
    shell_job(id, &script)
}

pub fn read_json(path: &Path) -> Value {
    let bytes = fs::read(path).unwrap_or_else(|err| panic!("read {}: {err}", path.display()));
    serde_json::from_slice(&bytes).expect("artifact is JSON")
}

pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}
