use super::{parse_json_output, CommandOutput, MAX_ERROR_DETAIL_BYTES};
use crate::environment::{ProcessEnv, ScopedActivation};
use crate::error::EvidenceError;
use crate::util::truncate_bytes;
use std::io::Read;
use std::process::{Command, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(25);

fn drain<R: Read + Send + 'static>(mut reader: R) -> JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = reader.read_to_end(&mut buf);
        buf
    })
}

fn join_output(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

/// Spawn `args` with the activation's credentials and wait up to `timeout`.
pub(super) fn run_process(
    args: &[String],
    activation: &ScopedActivation,
    timeout: Duration,
) -> Result<CommandOutput, EvidenceError> {
    let program = args[0].clone();
    let execution = |detail: String| EvidenceError::Execution {
        program: program.clone(),
        detail,
    };

    let resolved = which::which(&program)
        .map_err(|err| execution(format!("not found on PATH: {err}")))?;

    let mut cmd = Command::new(&resolved);
    cmd.args(&args[1..])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    cmd.env_clear().envs(activation.child_env(&ProcessEnv));

    let start = Instant::now();
    let mut child = cmd
        .spawn()
        .map_err(|err| execution(format!("spawn {}: {err}", resolved.display())))?;
    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {}
            Err(err) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(execution(format!("wait: {err}")));
            }
        }
        if start.elapsed() > timeout {
            let _ = child.kill();
            let _ = child.wait();
            // Grandchildren may still hold the pipes; the reader threads are left detached.
            return Err(EvidenceError::Transport {
                target: program.clone(),
                detail: format!("timed out after {}s", timeout.as_secs_f64()),
            });
        }
        std::thread::sleep(POLL_INTERVAL);
    };

    let stdout = join_output(stdout);
    let stderr = join_output(stderr);
    let elapsed_ms = start.elapsed().as_millis();

    tracing::debug!(
        program = %program,
        environment = activation.environment(),
        elapsed_ms,
        stdout_bytes = stdout.len(),
        exit_code = status.code(),
        "process complete"
    );

    if !status.success() {
        let stderr = truncate_bytes(&stderr, MAX_ERROR_DETAIL_BYTES);
        return Err(execution(format!(
            "exit status {}: {}",
            status
                .code()
                .map(|code| code.to_string())
                .unwrap_or_else(|| "signal".to_string()),
            stderr.trim()
        )));
    }

    let text = String::from_utf8(stdout)
        .map_err(|err| EvidenceError::parse(&program, format!("stdout is not UTF-8: {err}")))?;
    let body = parse_json_output(&program, &text)?;
    Ok(CommandOutput::new(body))
}
