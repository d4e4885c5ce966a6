//! # Transform Script Sandbox
//!
//! Operators may supply an `override.js` that performs a final arbitrary
//! transform of the document. The script is untrusted, so it never runs
//! in-process: it executes inside a Node.js subprocess behind a fixed
//! message-passing contract.
//!
//! ## Contract
//!
//! - Request: one JSON object `{config, script}` on the subprocess's
//!   standard input.
//! - The embedded runner evaluates the script source, requires it to
//!   define a `main(config)` entry point, and invokes it. A `main` that
//!   returns `undefined` passes the input document through unchanged.
//! - Response: exactly one JSON-encoded object on standard output. An
//!   array, scalar, or empty output is a fatal validation error.
//! - Non-zero exit: the subprocess's stderr is surfaced verbatim as the
//!   failure reason.
//! - The subprocess is hard-bounded by a wall-clock timeout and killed on
//!   expiry; a timeout is fatal to the run.
//!
//! All fatal errors here abort the pipeline before anything is written.

use std::io::Write;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_yaml::Value;

use crate::error::{Error, Result};
use crate::settings::Runtime;

/// JavaScript harness executed by the interpreter. It owns the contract:
/// read the payload from fd 0, require `main`, validate the return shape,
/// write the result as a single JSON object, exit 2 on violations.
const RUNNER_SOURCE: &str = r#"
const fs = require("fs");

const payload = JSON.parse(fs.readFileSync(0, "utf8"));
const userScript = String(payload.script || "");
const incoming = payload.config || {};

let output = null;
try {
  const runner = new Function(
    "config",
    userScript +
      "\nif (typeof main !== 'function') { throw new Error('override.js must define: const main = (config) => ...'); }\n" +
      "const result = main(config);\n" +
      "return result === undefined ? config : result;"
  );
  output = runner(incoming);
} catch (err) {
  const msg = err && err.stack ? err.stack : String(err);
  console.error(msg);
  process.exit(2);
}

if (typeof output !== "object" || output === null || Array.isArray(output)) {
  console.error("main(config) must return an object config");
  process.exit(2);
}

process.stdout.write(JSON.stringify(output));
"#;

#[derive(Serialize)]
struct Payload<'a> {
    config: &'a Value,
    script: &'a str,
}

/// What a bounded subprocess run produced.
#[derive(Debug)]
struct CapturedOutput {
    success: bool,
    stdout: String,
    stderr: String,
}

/// Run a command to completion with a stdin payload and a wall-clock
/// timeout, capturing stdout and stderr.
///
/// The child owns piped stdio; reader threads drain the output pipes
/// while this thread polls `try_wait` against the deadline. On expiry
/// the child is killed and reaped, and the run fails with
/// [`Error::SandboxTimeout`].
fn run_with_timeout(command: &mut Command, input: &[u8], timeout: Duration) -> Result<CapturedOutput> {
    let mut child = command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                Error::Sandbox {
                    message: format!("node runtime not found: {}", err),
                }
            } else {
                Error::Io(err)
            }
        })?;

    // All three pipes are serviced from dedicated threads so the deadline
    // loop below starts immediately. Draining stdout/stderr here would
    // deadlock against a child that floods its output before reading its
    // input; writing stdin here would block on a full pipe buffer against
    // a child that never reads it, and the timeout would go unchecked for
    // as long as the child lives.
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let stdout_reader = std::thread::spawn(move || read_pipe(stdout));
    let stderr_reader = std::thread::spawn(move || read_pipe(stderr));

    // The writer drops its end after write_all so the child sees EOF. A
    // broken pipe just means the child exited (or was killed) early and
    // the exit status tells the real story.
    let stdin = child.stdin.take();
    let payload = input.to_vec();
    let stdin_writer = std::thread::spawn(move || {
        if let Some(mut stdin) = stdin {
            let _ = stdin.write_all(&payload);
        }
    });

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait()? {
            Some(status) => break status,
            None => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    // Killing the child closes its pipe ends, unblocking
                    // the writer.
                    let _ = stdin_writer.join();
                    return Err(Error::SandboxTimeout {
                        timeout_secs: timeout.as_secs(),
                    });
                }
                std::thread::sleep(Duration::from_millis(10));
            }
        }
    };

    let _ = stdin_writer.join();
    let stdout = stdout_reader.join().unwrap_or_default();
    let stderr = stderr_reader.join().unwrap_or_default();

    Ok(CapturedOutput {
        success: status.success(),
        stdout,
        stderr,
    })
}

fn read_pipe<R: std::io::Read>(pipe: Option<R>) -> String {
    let mut buffer = String::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_string(&mut buffer);
    }
    buffer
}

/// Validate and convert the runner's stdout into a document.
///
/// The payload must parse as JSON and must be an object; anything else
/// is a contract violation.
fn parse_script_output(stdout: &str) -> Result<Value> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Err(Error::Sandbox {
            message: "override script returned empty output".to_string(),
        });
    }

    let parsed: serde_json::Value = serde_json::from_str(trimmed).map_err(|err| Error::Sandbox {
        message: format!("override script output is not valid json: {}", err),
    })?;
    if !parsed.is_object() {
        return Err(Error::Sandbox {
            message: "override script output must be a json object".to_string(),
        });
    }

    serde_yaml::to_value(&parsed).map_err(|err| Error::Sandbox {
        message: format!("override script output could not be converted: {}", err),
    })
}

/// Execute the transform script against the current document.
///
/// An empty or whitespace-only script is a no-op and returns the input
/// unchanged. Any contract violation is fatal to the run.
pub fn apply_script(config: &Value, script_text: &str, runtime: &Runtime) -> Result<Value> {
    let script = script_text.trim();
    if script.is_empty() {
        return Ok(config.clone());
    }

    let payload = serde_json::to_vec(&Payload { config, script })?;

    let mut command = Command::new(&runtime.node_bin);
    command.args(["-e", RUNNER_SOURCE]);
    let output = run_with_timeout(&mut command, &payload, runtime.script_timeout)?;

    if !output.success {
        let stderr = output.stderr.trim();
        let message = if stderr.is_empty() {
            "unknown script execution error".to_string()
        } else {
            stderr.to_string()
        };
        return Err(Error::Sandbox { message });
    }

    parse_script_output(&output.stdout)
}
