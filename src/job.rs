//! Declarative evidence jobs.
//!
//! A job is data: one external call, where its output lands, and how to
//! serialize it. Jobs are loaded once from config and never mutated.
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default page bound for paginated jobs.
pub const DEFAULT_MAX_PAGES: usize = 1000;

/// One unit of evidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EvidenceJob {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Compliance control ids this evidence supports (e.g. `AC-2`).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub controls: Vec<String>,
    pub command: CommandSpec,
    /// Overrides the config-wide destination template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_template: Option<String>,
    #[serde(default)]
    pub format: OutputFormat,
    /// JSON pointer into the drained result, e.g. `/result`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub select: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<PaginationSpec>,
    /// Restricts the job to these environments; absent means all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environments: Option<Vec<String>>,
}

impl EvidenceJob {
    pub fn applies_to(&self, environment: &str) -> bool {
        match &self.environments {
            Some(names) => names.iter().any(|name| name == environment),
            None => true,
        }
    }
}

/// What to call: a local program or an HTTP endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandSpec {
    Exec(ArgvSpec),
    Http(HttpRequestSpec),
}

impl CommandSpec {
    pub fn kind(&self) -> &'static str {
        match self {
            CommandSpec::Exec(_) => "exec",
            CommandSpec::Http(_) => "http",
        }
    }
}

/// Program arguments, either as a JSON array or a single shell-style line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgvSpec {
    Argv(Vec<String>),
    Line(String),
}

impl ArgvSpec {
    pub fn to_argv(&self) -> Result<Vec<String>> {
        let args = match self {
            ArgvSpec::Argv(args) => args.clone(),
            ArgvSpec::Line(line) => {
                shell_words::split(line).with_context(|| format!("parse command line: {line}"))?
            }
        };
        match args.first() {
            Some(program) if !program.trim().is_empty() => Ok(args),
            _ => Err(anyhow!("command argv is empty")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
}

/// HTTP request descriptor. Values may reference `${name}` secrets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpRequestSpec {
    #[serde(default)]
    pub method: HttpMethod,
    pub url: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub query: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Json,
    Csv,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaginationStyle {
    /// Continuation token in the body, passed back as a flag or query parameter.
    Token,
    /// Next page URL in the `Link` response header.
    LinkHeader,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PaginationSpec {
    pub style: PaginationStyle,
    /// JSON pointer to the item array of each page.
    pub items: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_param: Option<String>,
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
}

fn default_max_pages() -> usize {
    DEFAULT_MAX_PAGES
}

impl CommandSpec {
    /// Build the request for the page following `token`.
    ///
    /// Exec jobs get `<token_param> <token>` appended; HTTP token jobs get a
    /// query parameter; link-header jobs replace the URL and drop the
    /// original query since the link already carries it.
    pub fn with_page_token(&self, pagination: &PaginationSpec, token: &str) -> CommandSpec {
        match (self, pagination.style) {
            (CommandSpec::Exec(argv), _) => {
                let mut args = argv.to_argv().unwrap_or_default();
                if let Some(param) = &pagination.token_param {
                    args.push(param.clone());
                }
                args.push(token.to_string());
                CommandSpec::Exec(ArgvSpec::Argv(args))
            }
            (CommandSpec::Http(request), PaginationStyle::Token) => {
                let mut next = request.clone();
                let param = pagination
                    .token_param
                    .clone()
                    .unwrap_or_else(|| "next_token".to_string());
                next.query.insert(param, token.to_string());
                CommandSpec::Http(next)
            }
            (CommandSpec::Http(request), PaginationStyle::LinkHeader) => {
                let mut next = request.clone();
                next.url = token.to_string();
                next.query.clear();
                CommandSpec::Http(next)
            }
        }
    }
}
