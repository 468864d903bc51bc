use super::{parse_json_output, CommandOutput, MAX_ERROR_DETAIL_BYTES};
use crate::environment::ScopedActivation;
use crate::error::EvidenceError;
use crate::job::{HttpMethod, HttpRequestSpec};
use crate::template::interpolate;
use crate::util::truncate_string;
use std::time::{Duration, Instant};

/// Upper bound on a single response body.
const MAX_BODY_BYTES: u64 = 64 * 1024 * 1024;

struct ResolvedRequest {
    url: String,
    headers: Vec<(String, String)>,
    query: Vec<(String, String)>,
}

fn resolve(
    request: &HttpRequestSpec,
    activation: &ScopedActivation,
) -> Result<ResolvedRequest, EvidenceError> {
    let render = |text: &str| {
        interpolate(text, |name| activation.lookup(name)).map_err(|name| {
            EvidenceError::CredentialsMissing {
                environment: activation.environment().to_string(),
                variable: format!("${{{name}}}"),
            }
        })
    };
    let url = render(&request.url)?;
    let mut headers = Vec::with_capacity(request.headers.len());
    for (name, value) in &request.headers {
        headers.push((name.clone(), render(value)?));
    }
    let mut query = Vec::with_capacity(request.query.len());
    for (name, value) in &request.query {
        query.push((name.clone(), render(value)?));
    }
    Ok(ResolvedRequest {
        url,
        headers,
        query,
    })
}

/// Send one request and parse the JSON body.
pub(super) fn send(
    request: &HttpRequestSpec,
    activation: &ScopedActivation,
    timeout: Duration,
) -> Result<CommandOutput, EvidenceError> {
    let resolved = resolve(request, activation)?;
    let transport = |detail: String| EvidenceError::Transport {
        target: request.url.clone(),
        detail,
    };

    let agent: ureq::Agent = ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .build()
        .into();

    let start = Instant::now();
    let result = match request.method {
        HttpMethod::Get => {
            let mut builder = agent
                .get(resolved.url.as_str())
                .header("Accept", "application/json");
            for (name, value) in &resolved.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            for (name, value) in &resolved.query {
                builder = builder.query(name, value);
            }
            builder.call()
        }
        HttpMethod::Post => {
            let mut builder = agent
                .post(resolved.url.as_str())
                .header("Accept", "application/json");
            for (name, value) in &resolved.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            for (name, value) in &resolved.query {
                builder = builder.query(name, value);
            }
            match &request.body {
                Some(body) => builder.send_json(body),
                None => builder.send_empty(),
            }
        }
    };
    let mut response = result.map_err(|err| transport(err.to_string()))?;

    let status = response.status();
    let next_link = response
        .headers()
        .get_all("link")
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(next_link_from_header);
    let text = response
        .body_mut()
        .with_config()
        .limit(MAX_BODY_BYTES)
        .read_to_string()
        .map_err(|err| transport(format!("read body: {err}")))?;

    tracing::debug!(
        url = %request.url,
        environment = activation.environment(),
        status = status.as_u16(),
        elapsed_ms = start.elapsed().as_millis(),
        body_bytes = text.len(),
        "http request complete"
    );

    if !status.is_success() {
        return Err(transport(format!(
            "status {}: {}",
            status.as_u16(),
            truncate_string(text.trim(), MAX_ERROR_DETAIL_BYTES)
        )));
    }

    let body = parse_json_output(&request.url, &text)?;
    Ok(CommandOutput { body, next_link })
}

/// Extract the `rel="next"` target from one `Link` header value.
pub(crate) fn next_link_from_header(header: &str) -> Option<String> {
    header.split(',').find_map(|entry| {
        let mut parts = entry.split(';');
        let target = parts.next()?.trim();
        let target = target.strip_prefix('<')?.strip_suffix('>')?;
        let is_next = parts.any(|param| {
            let param = param.trim();
            param
                .strip_prefix("rel=")
                .is_some_and(|rel| rel.trim_matches('"').split_whitespace().any(|r| r == "next"))
        });
        is_next.then(|| target.to_string())
    })
}
