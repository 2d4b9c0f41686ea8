//! Helper subprocesses for sensors that are read through an external driver.
#![cfg_attr(not(feature = "hardware"), allow(dead_code))]

use super::HalError;
use std::io::Read;
use std::process::{Child, Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const POLL: Duration = Duration::from_millis(50);

/// Run `command` to completion, killing it once `timeout` has passed.
pub fn output_within(command: &mut Command, timeout: Duration) -> Result<Output, HalError> {
    let program = command.get_program().to_string_lossy().into_owned();
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| HalError::Probe(format!("failed to run {}: {}", program, e)))?;

    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                return Ok(Output {
                    status,
                    stdout: drain(child.stdout.take()),
                    stderr: drain(child.stderr.take()),
                });
            }
            Ok(None) if Instant::now() >= deadline => {
                kill(&mut child, &program);
                return Err(HalError::Probe(format!(
                    "{} did not finish within {}s",
                    program,
                    timeout.as_secs_f64()
                )));
            }
            Ok(None) => thread::sleep(POLL),
            Err(e) => {
                kill(&mut child, &program);
                return Err(HalError::Probe(format!("waiting for {} failed: {}", program, e)));
            }
        }
    }
}

fn drain(pipe: Option<impl Read>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut buf);
    }
    buf
}

fn kill(child: &mut Child, program: &str) {
    if let Err(e) = child.kill() {
        log::warn!("failed to kill {} (pid {}): {}", program, child.id(), e);
    }
    // reap it so no zombie is left behind
    let _ = child.wait();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_output_of_a_quick_command() {
        let output = output_within(Command::new("sh").args(["-c", "echo 51.0"]), Duration::from_secs(5)).unwrap();
        assert!(output.status.success());
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "51.0");
    }

    #[test]
    fn kills_a_hung_command() {
        let started = Instant::now();
        let err = output_within(Command::new("sh").args(["-c", "sleep 30"]), Duration::from_millis(200)).unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(10));
        match err {
            HalError::Probe(message) => assert!(message.contains("did not finish"), "{message}"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn missing_program_is_a_probe_error() {
        let err = output_within(&mut Command::new("/nonexistent/driver"), Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, HalError::Probe(_)));
    }
}
