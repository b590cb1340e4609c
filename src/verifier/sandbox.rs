//! Sandboxed execution of extracted encryption routines
//!
//! The block-repetition probe sometimes has to run attacker-adjacent code:
//! the encryption routine lifted out of a scanned project. That execution is
//! capability-scoped: a synthesized, self-contained driver script runs under
//! `python -I` with a scrubbed environment, inside an ephemeral scratch
//! directory, with an in-driver CPU rlimit and a wall-clock kill on the Rust
//! side. Any failure degrades to an inconclusive attempt.

use crate::exec::{is_tool_installed, run_bounded, ExecOptions};
use crate::models::{CipherCallSite, CodeFragment};
use crate::verifier::oracle::{EncryptionOracle, OracleFailure};
use std::io::Write;
use tracing::debug;

/// Resource bounds for one sandboxed invocation
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Interpreter to invoke, usually `python3`
    pub python: String,
    /// Wall-clock bound enforced by the parent process
    pub wall_secs: u64,
    /// CPU bound set inside the driver via rlimit
    pub cpu_secs: u64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            python: "python3".to_string(),
            wall_secs: 10,
            cpu_secs: 5,
        }
    }
}

/// Runs synthesized driver scripts in a bounded interpreter
pub struct PythonSandbox {
    config: SandboxConfig,
}

impl PythonSandbox {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    /// Whether the configured interpreter exists at all
    pub fn available(&self) -> bool {
        is_tool_installed(&self.config.python)
    }

    /// Execute a driver script and return the ciphertext it printed
    pub fn run_driver(&self, driver: &str) -> Result<Vec<u8>, OracleFailure> {
        let scratch = tempfile::tempdir()
            .map_err(|e| OracleFailure::new(format!("failed to create scratch dir: {}", e)))?;
        let script_path = scratch.path().join("driver.py");

        std::fs::File::create(&script_path)
            .and_then(|mut f| f.write_all(driver.as_bytes()))
            .map_err(|e| OracleFailure::new(format!("failed to write driver: {}", e)))?;

        let cmd = vec![
            self.config.python.clone(),
            "-I".to_string(),
            script_path.to_string_lossy().to_string(),
        ];
        let options = ExecOptions {
            cwd: Some(scratch.path().to_path_buf()),
            env: None,
            clear_env: true,
        };
        let result = run_bounded(&cmd, "sandbox", self.config.wall_secs, &options);

        if result.timed_out {
            return Err(OracleFailure::timeout(format!(
                "driver exceeded {}s wall clock",
                self.config.wall_secs
            )));
        }
        if let Some(error) = result.error {
            return Err(OracleFailure::new(error));
        }
        if result.exit_code != Some(0) {
            let tail: String = result.stderr.lines().rev().take(3).collect::<Vec<_>>().join(" | ");
            return Err(OracleFailure::new(format!(
                "driver exited with {:?}: {}",
                result.exit_code, tail
            )));
        }

        let hex = result
            .stdout
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .map(str::trim)
            .ok_or_else(|| OracleFailure::new("driver produced no output"))?;
        decode_hex(hex).ok_or_else(|| OracleFailure::new("driver output was not hex"))
    }
}

fn decode_hex(s: &str) -> Option<Vec<u8>> {
    // Driver output is attacker-influenced; reject anything but plain hex
    if s.len() % 2 != 0 || !s.is_ascii() {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

/// How the synthesized driver passes arguments to the extracted routine
#[derive(Debug, Clone, PartialEq, Eq)]
enum CallShape {
    PlaintextOnly,
    KeyThenPlaintext,
    PlaintextThenKey,
}

/// A harness plan for one call site: which function to call and how
#[derive(Debug, Clone)]
pub struct Harness {
    function: String,
    shape: CallShape,
}

impl Harness {
    /// Decide whether the call site's enclosing routine can be driven in
    /// isolation. Methods (leading `self`) and signatures with parameters
    /// the prober cannot synthesize are rejected; the verifier then falls
    /// through to the static strategy.
    pub fn plan(site: &CipherCallSite) -> Option<Harness> {
        let function = site.enclosing_function.as_ref()?;
        let params = &function.parameters;
        if params.first().map(String::as_str) == Some("self") {
            return None;
        }

        let shape = match params.len() {
            1 => Some(CallShape::PlaintextOnly),
            2 => {
                let (first, second) = (params[0].as_str(), params[1].as_str());
                if is_key_param(first) && is_plaintext_param(second) {
                    Some(CallShape::KeyThenPlaintext)
                } else if is_plaintext_param(first) && is_key_param(second) {
                    Some(CallShape::PlaintextThenKey)
                } else {
                    None
                }
            }
            _ => None,
        }?;

        Some(Harness {
            function: function.name.clone(),
            shape,
        })
    }

    /// Render the self-contained driver script for one probe invocation
    pub fn driver(&self, fragment: &CodeFragment, plaintext: &[u8], cpu_secs: u64) -> String {
        let call = match self.shape {
            CallShape::PlaintextOnly => format!("{}(_pt)", self.function),
            CallShape::KeyThenPlaintext => format!("{}(_PROBE_KEY, _pt)", self.function),
            CallShape::PlaintextThenKey => format!("{}(_pt, _PROBE_KEY)", self.function),
        };
        let hex = crate::models::hex_lower(plaintext);

        format!(
            "import sys\n\
             import binascii\n\
             try:\n\
             \x20   import resource\n\
             \x20   resource.setrlimit(resource.RLIMIT_CPU, ({cpu}, {cpu}))\n\
             except Exception:\n\
             \x20   pass\n\
             \n\
             {source}\n\
             \n\
             _PROBE_KEY = bytes(range(16))\n\
             _pt = binascii.unhexlify(\"{hex}\")\n\
             _out = {call}\n\
             if isinstance(_out, str):\n\
             \x20   _out = _out.encode()\n\
             sys.stdout.write(binascii.hexlify(bytes(_out)).decode())\n",
            cpu = cpu_secs,
            source = fragment.source,
            hex = hex,
            call = call,
        )
    }
}

fn is_key_param(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower == "k" || lower.contains("key") || lower.contains("secret")
}

fn is_plaintext_param(name: &str) -> bool {
    let lower = name.to_lowercase();
    ["data", "plain", "msg", "message", "text", "pt", "payload", "content", "buf"]
        .iter()
        .any(|hint| lower.contains(hint))
}

/// Oracle backed by the sandbox; each encryption renders and runs a driver
pub struct HarnessOracle<'a> {
    sandbox: &'a PythonSandbox,
    harness: &'a Harness,
    fragment: &'a CodeFragment,
}

impl<'a> HarnessOracle<'a> {
    pub fn new(sandbox: &'a PythonSandbox, harness: &'a Harness, fragment: &'a CodeFragment) -> Self {
        Self {
            sandbox,
            harness,
            fragment,
        }
    }
}

impl EncryptionOracle for HarnessOracle<'_> {
    fn encrypt(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, OracleFailure> {
        let driver = self
            .harness
            .driver(self.fragment, plaintext, self.sandbox.config.cpu_secs);
        debug!(function = %self.harness.function, "running sandboxed probe driver");
        self.sandbox.run_driver(&driver)
    }
}
