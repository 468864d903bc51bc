//! Per-environment credentials.
//!
//! Credentials are resolved from named process variables into an explicit
//! [`ScopedActivation`] value. The activation is handed to each external call,
//! which applies it to that call only (child environment or request headers).
//! The harness never writes credentials into its own process environment.
use crate::error::EvidenceError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const ACCESS_KEY_ENV: &str = "AWS_ACCESS_KEY_ID";
pub const SECRET_KEY_ENV: &str = "AWS_SECRET_ACCESS_KEY";
pub const SESSION_TOKEN_ENV: &str = "AWS_SESSION_TOKEN";
pub const DEFAULT_REGION_ENV: &str = "AWS_DEFAULT_REGION";
pub const REGION_ENV: &str = "AWS_REGION";

/// Variables a child inherits from the harness; everything else is cleared.
pub const PASSTHROUGH_VARS: &[&str] = &[
    "PATH",
    "HOME",
    "USER",
    "LANG",
    "LC_ALL",
    "TZ",
    "TMPDIR",
    "SSL_CERT_FILE",
    "SSL_CERT_DIR",
    "HTTPS_PROXY",
    "HTTP_PROXY",
    "NO_PROXY",
    "https_proxy",
    "http_proxy",
    "no_proxy",
];

/// Names resolvable in `${...}` references without a secrets entry.
pub const BUILTIN_REFERENCES: &[&str] = &["environment", "region"];

/// Source of process variables; abstracted so tests never touch `std::env`.
pub trait VarSource {
    fn var(&self, name: &str) -> Option<String>;
}

/// Reads the real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl VarSource for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl VarSource for BTreeMap<String, String> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// A named deployment context with its own credentials and region.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnvironmentProfile {
    pub name: String,
    pub region: String,
    /// Prefix for conventional variable names (`<PROVIDER>_<ENV>_ACCESS_KEY_ID`).
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_key_var: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key_var: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_token_var: Option<String>,
    /// Secret name -> variable holding it, referenced as `${name}` by HTTP jobs.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub secrets: BTreeMap<String, String>,
}

fn default_provider() -> String {
    "AWS".to_string()
}

impl EnvironmentProfile {
    fn conventional_var(&self, suffix: &str) -> String {
        let env_token: String = self
            .name
            .chars()
            .map(|ch| {
                if ch.is_ascii_alphanumeric() {
                    ch.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect();
        format!("{}_{}_{}", self.provider.to_ascii_uppercase(), env_token, suffix)
    }

    pub fn access_key_variable(&self) -> String {
        self.access_key_var
            .clone()
            .unwrap_or_else(|| self.conventional_var("ACCESS_KEY_ID"))
    }

    pub fn secret_key_variable(&self) -> String {
        self.secret_key_var
            .clone()
            .unwrap_or_else(|| self.conventional_var("SECRET_ACCESS_KEY"))
    }

    /// Whether `${name}` can be resolved for this environment.
    pub fn defines_reference(&self, name: &str) -> bool {
        BUILTIN_REFERENCES.contains(&name) || self.secrets.contains_key(name)
    }
}

/// Resolved credentials for one environment.
///
/// Dropping the value is the release; nothing outside it was modified.
pub struct ScopedActivation {
    environment: String,
    region: String,
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
    secrets: BTreeMap<String, String>,
}

impl ScopedActivation {
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Variables to set on a child process for this activation.
    pub fn env_overrides(&self) -> Vec<(&'static str, &str)> {
        let mut vars = vec![
            (ACCESS_KEY_ENV, self.access_key_id.as_str()),
            (SECRET_KEY_ENV, self.secret_access_key.as_str()),
            (DEFAULT_REGION_ENV, self.region.as_str()),
            (REGION_ENV, self.region.as_str()),
        ];
        if let Some(token) = &self.session_token {
            vars.push((SESSION_TOKEN_ENV, token.as_str()));
        }
        vars
    }

    /// Complete environment for a child process: passthrough variables read
    /// from `inherited`, then this activation's overrides.
    pub fn child_env(&self, inherited: &dyn VarSource) -> Vec<(String, String)> {
        let mut vars: Vec<(String, String)> = PASSTHROUGH_VARS
            .iter()
            .filter_map(|name| inherited.var(name).map(|value| (name.to_string(), value)))
            .collect();
        vars.extend(
            self.env_overrides()
                .into_iter()
                .map(|(name, value)| (name.to_string(), value.to_string())),
        );
        vars
    }

    /// Resolve a `${name}` reference.
    pub fn lookup(&self, name: &str) -> Option<&str> {
        match name {
            "environment" => Some(self.environment.as_str()),
            "region" => Some(self.region.as_str()),
            _ => self.secrets.get(name).map(String::as_str),
        }
    }
}

impl fmt::Debug for ScopedActivation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedActivation")
            .field("environment", &self.environment)
            .field("region", &self.region)
            .field("access_key_id", &"<redacted>")
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .field("secrets", &self.secrets.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Resolve every variable the profile requires.
///
/// Fails on the first variable that is unset or blank, naming it, so a
/// misconfigured environment never reaches the external CLI.
pub fn activate(
    profile: &EnvironmentProfile,
    vars: &dyn VarSource,
) -> Result<ScopedActivation, EvidenceError> {
    let require = |variable: String| -> Result<String, EvidenceError> {
        match vars.var(&variable) {
            Some(value) if !value.trim().is_empty() => Ok(value),
            _ => Err(EvidenceError::CredentialsMissing {
                environment: profile.name.clone(),
                variable,
            }),
        }
    };

    let access_key_id = require(profile.access_key_variable())?;
    let secret_access_key = require(profile.secret_key_variable())?;
    let session_token = match &profile.session_token_var {
        Some(variable) => Some(require(variable.clone())?),
        None => None,
    };
    let mut secrets = BTreeMap::new();
    for (name, variable) in &profile.secrets {
        secrets.insert(name.clone(), require(variable.clone())?);
    }

    tracing::debug!(
        environment = %profile.name,
        region = %profile.region,
        secrets = secrets.len(),
        "environment activated"
    );

    Ok(ScopedActivation {
        environment: profile.name.clone(),
        region: profile.region.clone(),
        access_key_id,
        secret_access_key,
        session_token,
        secrets,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(name: &str) -> EnvironmentProfile {
        EnvironmentProfile {
            name: name.to_string(),
            region: "us-east-1".to_string(),
            provider: default_provider(),
            access_key_var: None,
            secret_key_var: None,
            session_token_var: None,
            secrets: BTreeMap::new(),
        }
    }

    fn vars(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn conventional_names_follow_provider_and_environment() {
        let profile = profile("test-env");
        assert_eq!(profile.access_key_variable(), "AWS_TEST_ENV_ACCESS_KEY_ID");
        assert_eq!(
            profile.secret_key_variable(),
            "AWS_TEST_ENV_SECRET_ACCESS_KEY"
        );
    }

    #[test]
    fn activation_exposes_child_overrides() {
        let env = vars(&[
            ("AWS_COMMERCIAL_ACCESS_KEY_ID", "AKIA1"),
            ("AWS_COMMERCIAL_SECRET_ACCESS_KEY", "s3cr3t"),
        ]);
        let activation = activate(&profile("commercial"), &env).unwrap();
        let overrides: BTreeMap<_, _> = activation.env_overrides().into_iter().collect();
        assert_eq!(overrides[ACCESS_KEY_ENV], "AKIA1");
        assert_eq!(overrides[SECRET_KEY_ENV], "s3cr3t");
        assert_eq!(overrides[DEFAULT_REGION_ENV], "us-east-1");
        assert!(!overrides.contains_key(SESSION_TOKEN_ENV));
    }

    #[test]
    fn child_env_drops_other_environments_and_ambient_selectors() {
        let env = vars(&[
            ("AWS_COMMERCIAL_ACCESS_KEY_ID", "AKIA1"),
            ("AWS_COMMERCIAL_SECRET_ACCESS_KEY", "s3cr3t"),
            ("AWS_FEDERAL_SECRET_ACCESS_KEY", "fed-secret"),
            ("AWS_PROFILE", "parent-shell"),
            ("AWS_SESSION_TOKEN", "stale-token"),
            ("PATH", "/usr/bin:/bin"),
            ("HOME", "/home/auditor"),
        ]);
        let activation = activate(&profile("commercial"), &env).unwrap();
        let child: BTreeMap<String, String> = activation.child_env(&env).into_iter().collect();
        let names: Vec<&str> = child.keys().map(String::as_str).collect();
        assert_eq!(
            names,
            vec![
                ACCESS_KEY_ENV,
                DEFAULT_REGION_ENV,
                REGION_ENV,
                SECRET_KEY_ENV,
                "HOME",
                "PATH",
            ]
        );
        assert_eq!(child[SECRET_KEY_ENV], "s3cr3t");
        assert!(!child.values().any(|value| value == "fed-secret"));
    }

    #[test]
    fn missing_secret_names_the_variable() {
        let mut profile = profile("federal");
        profile
            .secrets
            .insert("okta_token".to_string(), "OKTA_FED_TOKEN".to_string());
        let env = vars(&[
            ("AWS_FEDERAL_ACCESS_KEY_ID", "AKIA2"),
            ("AWS_FEDERAL_SECRET_ACCESS_KEY", "x"),
        ]);
        let err = activate(&profile, &env).unwrap_err();
        match err {
            EvidenceError::CredentialsMissing {
                environment,
                variable,
            } => {
                assert_eq!(environment, "federal");
                assert_eq!(variable, "OKTA_FED_TOKEN");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn blank_variable_counts_as_missing() {
        let env = vars(&[
            ("AWS_COMMERCIAL_ACCESS_KEY_ID", "  "),
            ("AWS_COMMERCIAL_SECRET_ACCESS_KEY", "x"),
        ]);
        let err = activate(&profile("commercial"), &env).unwrap_err();
        assert_eq!(err.category(), "credentials_missing");
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let env = vars(&[
            ("AWS_COMMERCIAL_ACCESS_KEY_ID", "AKIAVISIBLE"),
            ("AWS_COMMERCIAL_SECRET_ACCESS_KEY", "hunter2"),
        ]);
        let activation = activate(&profile("commercial"), &env).unwrap();
        let rendered = format!("{activation:?}");
        assert!(!rendered.contains("AKIAVISIBLE"));
        assert!(!rendered.contains("hunter2"));
        assert_eq!(activation.lookup("region"), Some("us-east-1"));
    }
}
