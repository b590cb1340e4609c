//! Bounded subprocess execution
//!
//! Shared by the scanner bridge and the verifier sandbox. External processes
//! are the only blocking operations in the system; both callers require a
//! hard wall-clock bound with a kill on expiry.

use std::collections::HashMap;
use std::io::Read;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Result from running a bounded external process
#[derive(Debug, Clone)]
pub struct ExecResult {
    /// Whether the process completed (may still have a non-zero exit)
    pub completed: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    /// Whether the wall-clock bound expired and the process was killed
    pub timed_out: bool,
    /// Error message if the process could not be run at all
    pub error: Option<String>,
}

impl ExecResult {
    fn completed(stdout: String, stderr: String, exit_code: i32) -> Self {
        Self {
            completed: true,
            stdout,
            stderr,
            exit_code: Some(exit_code),
            timed_out: false,
            error: None,
        }
    }

    fn failure(error: String) -> Self {
        Self {
            completed: false,
            stdout: String::new(),
            stderr: String::new(),
            exit_code: None,
            timed_out: false,
            error: Some(error),
        }
    }

    fn timeout(name: &str, timeout_secs: u64) -> Self {
        Self {
            completed: false,
            stdout: String::new(),
            stderr: String::new(),
            exit_code: None,
            timed_out: true,
            error: Some(format!("{} timed out after {}s", name, timeout_secs)),
        }
    }

    /// Parse stdout as JSON
    pub fn json_output(&self) -> Option<serde_json::Value> {
        if self.stdout.is_empty() {
            return None;
        }
        serde_json::from_str(&self.stdout).ok()
    }
}

/// Options controlling how a bounded process is launched
#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    pub cwd: Option<std::path::PathBuf>,
    pub env: Option<HashMap<String, String>>,
    /// Start from an empty environment instead of inheriting the parent's
    pub clear_env: bool,
}

/// Run an external process with a wall-clock bound.
///
/// `timeout_secs = 0` means no bound. On expiry the process is killed and a
/// timeout result returned; the caller decides how to degrade.
pub fn run_bounded(
    cmd: &[String],
    name: &str,
    timeout_secs: u64,
    options: &ExecOptions,
) -> ExecResult {
    if cmd.is_empty() {
        return ExecResult::failure("empty command".to_string());
    }

    let program = &cmd[0];
    let args = &cmd[1..];
    debug!("running {}: {} {:?}", name, program, args);

    let mut command = Command::new(program);
    command.args(args);

    if let Some(dir) = &options.cwd {
        command.current_dir(dir);
    }
    if options.clear_env {
        command.env_clear();
        // A scrubbed child still needs to locate its own interpreter
        if let Ok(path) = std::env::var("PATH") {
            command.env("PATH", path);
        }
    }
    if let Some(extra) = &options.env {
        for (key, value) in extra {
            command.env(key, value);
        }
    }

    command.stdin(Stdio::null());
    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());

    let child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            if e.kind() == std::io::ErrorKind::NotFound {
                return ExecResult::failure(format!("{} not found on PATH", name));
            }
            return ExecResult::failure(format!("failed to run {}: {}", name, e));
        }
    };

    if timeout_secs > 0 {
        wait_with_timeout(child, name, timeout_secs)
    } else {
        wait_to_completion(child, name)
    }
}

fn wait_to_completion(child: std::process::Child, name: &str) -> ExecResult {
    match child.wait_with_output() {
        Ok(output) => ExecResult::completed(
            String::from_utf8_lossy(&output.stdout).to_string(),
            String::from_utf8_lossy(&output.stderr).to_string(),
            output.status.code().unwrap_or(-1),
        ),
        Err(e) => ExecResult::failure(format!("failed to wait for {}: {}", name, e)),
    }
}

/// Poll for completion with small sleeps; kill on expiry.
fn wait_with_timeout(mut child: std::process::Child, name: &str, timeout_secs: u64) -> ExecResult {
    let start = Instant::now();
    let timeout = Duration::from_secs(timeout_secs);

    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                let mut stdout = String::new();
                let mut stderr = String::new();
                if let Some(mut out) = child.stdout.take() {
                    let _ = out.read_to_string(&mut stdout);
                }
                if let Some(mut err) = child.stderr.take() {
                    let _ = err.read_to_string(&mut stderr);
                }
                return ExecResult::completed(stdout, stderr, status.code().unwrap_or(-1));
            }
            Ok(None) => {
                if start.elapsed() > timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    warn!("{} timed out after {}s", name, timeout_secs);
                    return ExecResult::timeout(name, timeout_secs);
                }
                std::thread::sleep(Duration::from_millis(50));
            }
            Err(e) => {
                return ExecResult::failure(format!("failed to wait for {}: {}", name, e));
            }
        }
    }
}

/// Check whether a tool responds to `--version`
pub fn is_tool_installed(tool: &str) -> bool {
    Command::new(tool)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_command() {
        let result = run_bounded(&[], "nothing", 5, &ExecOptions::default());
        assert!(!result.completed);
        assert!(result.error.is_some());
    }

    #[test]
    fn test_missing_program() {
        let cmd = vec!["definitely-not-a-real-binary-xyz".to_string()];
        let result = run_bounded(&cmd, "ghost", 5, &ExecOptions::default());
        assert!(!result.completed);
        assert!(result.error.unwrap().contains("not found"));
    }

    #[cfg(unix)]
    #[test]
    fn test_completed_with_output() {
        let cmd = vec!["echo".to_string(), "hello".to_string()];
        let result = run_bounded(&cmd, "echo", 5, &ExecOptions::default());
        assert!(result.completed);
        assert_eq!(result.exit_code, Some(0));
        assert_eq!(result.stdout.trim(), "hello");
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_kills_process() {
        let cmd = vec!["sleep".to_string(), "30".to_string()];
        let result = run_bounded(&cmd, "sleep", 1, &ExecOptions::default());
        assert!(result.timed_out);
        assert!(!result.completed);
    }

    #[test]
    fn test_json_output() {
        let result = ExecResult::completed(r#"{"results": []}"#.into(), String::new(), 0);
        let json = result.json_output().unwrap();
        assert!(json["results"].as_array().unwrap().is_empty());
    }
}
