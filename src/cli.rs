//! CLI argument parsing for evidence collection runs.
use clap::{ArgGroup, Parser, Subcommand};
use std::path::PathBuf;

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "evidence",
    version,
    about = "Collect dated compliance evidence from cloud and SaaS environments",
    after_help = "Commands:\n  collect --all                  Run every job in every environment\n  collect --job <ID> --env <ENV> Run selected jobs in selected environments\n  check                          Validate config and credentials without running jobs\n  list                           Show configured environments and jobs\n  init                           Write a starter config\n\nExamples:\n  evidence init --config ./evidence.json\n  evidence check --config ./evidence.json\n  evidence collect --all --date 2024-01-15\n  evidence collect --job iam-users --env federal --summary run.json",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Collect(CollectArgs),
    Check(CheckArgs),
    List(ListArgs),
    Init(InitArgs),
}

/// Collect command inputs for one run.
#[derive(Parser, Debug)]
#[command(
    about = "Run evidence jobs and write dated artifacts",
    group(ArgGroup::new("selection").required(true).args(["job", "all"]))
)]
pub struct CollectArgs {
    /// Job id to run (repeatable)
    #[arg(long = "job", value_name = "ID")]
    pub job: Vec<String>,

    /// Run every configured job
    #[arg(long)]
    pub all: bool,

    /// Restrict the run to these environments (repeatable; default all)
    #[arg(long = "env", value_name = "NAME")]
    pub env: Vec<String>,

    /// Config file (default: $EVIDENCE_CONFIG, then the user config dir)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Override the configured artifact root
    #[arg(long, value_name = "DIR")]
    pub output_root: Option<PathBuf>,

    /// Evidence date (default: today, local time)
    #[arg(long, value_name = "YYYY-MM-DD")]
    pub date: Option<String>,

    /// Also write the run summary as JSON
    #[arg(long, value_name = "PATH")]
    pub summary: Option<PathBuf>,

    /// Emit debug logs
    #[arg(long)]
    pub verbose: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Validate config and credential presence without running jobs")]
pub struct CheckArgs {
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Restrict the credential check to these environments
    #[arg(long = "env", value_name = "NAME")]
    pub env: Vec<String>,

    #[arg(long)]
    pub verbose: bool,
}

#[derive(Parser, Debug)]
#[command(about = "List configured environments and jobs")]
pub struct ListArgs {
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Parser, Debug)]
#[command(about = "Write a starter config")]
pub struct InitArgs {
    /// Destination (default: $EVIDENCE_CONFIG, then the user config dir)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Overwrite an existing config
    #[arg(long)]
    pub force: bool,
}

impl Command {
    pub fn verbose(&self) -> bool {
        match self {
            Command::Collect(args) => args.verbose,
            Command::Check(args) => args.verbose,
            Command::List(_) | Command::Init(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        RootArgs::command().debug_assert();
    }

    #[test]
    fn collect_requires_a_selection() {
        assert!(RootArgs::try_parse_from(["evidence", "collect"]).is_err());
        assert!(RootArgs::try_parse_from(["evidence", "collect", "--all", "--job", "x"]).is_err());
        let args = RootArgs::try_parse_from([
            "evidence", "collect", "--job", "iam-users", "--job", "kms-keys", "--env", "federal",
        ])
        .unwrap();
        let Command::Collect(collect) = args.command else {
            panic!("expected collect");
        };
        assert_eq!(collect.job, vec!["iam-users", "kms-keys"]);
        assert_eq!(collect.env, vec!["federal"]);
        assert!(!collect.all);
    }
}
