use super::*;
use serde_json::json;
use std::collections::BTreeMap;

fn base_config() -> serde_json::Value {
    json!({
        "schema_version": 1,
        "environments": [
            {"name": "commercial", "region": "us-east-1", "secrets": {"okta_token": "OKTA_API_TOKEN"}},
            {"name": "federal", "region": "us-gov-west-1"}
        ],
        "jobs": [
            {"id": "iam-users", "command": {"exec": ["aws", "iam", "list-users"]}}
        ]
    })
}

fn parse(value: serde_json::Value) -> HarnessConfig {
    serde_json::from_value(value).expect("parse config")
}

fn with_job(job: serde_json::Value) -> HarnessConfig {
    let mut value = base_config();
    value["jobs"].as_array_mut().unwrap().push(job);
    parse(value)
}

fn error_text(config: &HarnessConfig) -> String {
    format!("{:#}", validate_config(config).unwrap_err())
}

#[test]
fn defaults_apply() {
    let config = parse(base_config());
    validate_config(&config).unwrap();
    assert_eq!(config.output_root, PathBuf::from(DEFAULT_OUTPUT_ROOT));
    assert_eq!(config.path_template, DEFAULT_PATH_TEMPLATE);
    assert_eq!(config.timeout_secs, DEFAULT_TIMEOUT_SECS);
    assert!(config.job("iam-users").is_some());
    assert!(config.environment("federal").is_some());
}

#[test]
fn starter_config_is_valid() {
    let config: HarnessConfig = serde_json::from_str(starter_config()).unwrap();
    validate_config(&config).unwrap();
    assert!(config.jobs.len() >= 5);
}

#[test]
fn rejects_wrong_schema_version() {
    let mut value = base_config();
    value["schema_version"] = json!(2);
    assert!(error_text(&parse(value)).contains("schema_version"));
}

#[test]
fn rejects_unknown_template_placeholder() {
    let config = with_job(json!({
        "id": "okta-users",
        "command": {"exec": "true"},
        "path_template": "{year}/okta/{current_date}.okta-users.json"
    }));
    assert!(error_text(&config).contains("{current_date}"));
}

#[test]
fn rejects_duplicate_job_ids() {
    let config = with_job(json!({"id": "iam-users", "command": {"exec": "true"}}));
    assert!(error_text(&config).contains("duplicate job id"));
}

#[test]
fn rejects_path_like_names() {
    let mut value = base_config();
    value["environments"][0]["name"] = json!("../prod");
    assert!(error_text(&parse(value)).contains("environment name"));
}

#[test]
fn rejects_secret_missing_in_applicable_environment() {
    let config = with_job(json!({
        "id": "okta-users",
        "command": {"http": {"url": "https://example.okta.com/api/v1/users",
                             "headers": {"Authorization": "SSWS ${okta_token}"}}}
    }));
    let text = error_text(&config);
    assert!(text.contains("okta_token"));
    assert!(text.contains("federal"));
}

#[test]
fn environment_filter_scopes_secret_check() {
    let config = with_job(json!({
        "id": "okta-users",
        "environments": ["commercial"],
        "command": {"http": {"url": "https://example.okta.com/api/v1/users?r=${region}",
                             "headers": {"Authorization": "SSWS ${okta_token}"}}}
    }));
    validate_config(&config).unwrap();
}

#[test]
fn rejects_unknown_environment_filter() {
    let config = with_job(json!({
        "id": "gov-only",
        "environments": ["govcloud"],
        "command": {"exec": "true"}
    }));
    assert!(error_text(&config).contains("govcloud"));
}

#[test]
fn rejects_link_pagination_for_commands() {
    let config = with_job(json!({
        "id": "paged",
        "command": {"exec": "aws iam list-roles"},
        "pagination": {"style": "link_header", "items": "/Roles"}
    }));
    assert!(error_text(&config).contains("http command"));
}

#[test]
fn rejects_token_pagination_without_param_for_commands() {
    let config = with_job(json!({
        "id": "paged",
        "command": {"exec": "aws iam list-roles"},
        "pagination": {"style": "token", "items": "/Roles", "next_token": "/NextToken"}
    }));
    assert!(error_text(&config).contains("token_param"));
}

#[test]
fn rejects_empty_argv() {
    let config = with_job(json!({"id": "empty", "command": {"exec": []}}));
    assert!(error_text(&config).contains("empty"));
}

#[test]
fn rejects_unknown_fields() {
    let mut value = base_config();
    value["jobs"][0]["output_file"] = json!("/tmp/x.json");
    assert!(serde_json::from_value::<HarnessConfig>(value).is_err());
}

#[test]
fn config_path_resolution_order() {
    let mut vars = BTreeMap::new();
    vars.insert(CONFIG_PATH_ENV.to_string(), "/etc/evidence/config.json".to_string());
    assert_eq!(
        resolve_config_path(Some(Path::new("./local.json")), &vars).unwrap(),
        PathBuf::from("./local.json")
    );
    assert_eq!(
        resolve_config_path(None, &vars).unwrap(),
        PathBuf::from("/etc/evidence/config.json")
    );
}

#[test]
fn load_and_init_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.json");
    write_starter_config(&path, false).unwrap();
    assert!(write_starter_config(&path, false).is_err());
    write_starter_config(&path, true).unwrap();
    let config = load_config(&path).unwrap();
    assert!(config.environment("commercial").is_some());
}

#[test]
fn load_reports_parse_errors_with_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, "{ not json").unwrap();
    let text = format!("{:#}", load_config(&path).unwrap_err());
    assert!(text.contains("config.json"));
}
