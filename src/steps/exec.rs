//! Subprocess steps: `FileExec` and `ScriptRun`.
//!
//! Children run synchronously with the step directory as working directory
//! and the run environment layered over the inherited one. Output is
//! captured; it is shown on failure and otherwise only summarized.

use std::path::Path;
use std::process::{Command, Stdio};

use crate::error::{Error, Result};
use crate::output;
use crate::recipe::Interpreter;

/// Maximum bytes of captured output kept in a failure message
const OUTPUT_TAIL_BYTES: usize = 4096;

fn tail(bytes: &[u8]) -> String {
    let start = bytes.len().saturating_sub(OUTPUT_TAIL_BYTES);
    String::from_utf8_lossy(&bytes[start..]).trim_end().to_string()
}

/// Apply `KEY=VALUE` entries to a command. Entries without `=` are ignored.
pub fn apply_env(cmd: &mut Command, env: &[String]) {
    for entry in env {
        if let Some((key, value)) = entry.split_once('=')
            && !key.is_empty()
        {
            cmd.env(key, value);
        }
    }
}

/// Run a prepared command to completion, failing on a non-zero exit.
pub fn run_command(cmd: &mut Command) -> Result<()> {
    let display = format!("{:?}", cmd);
    let output = cmd
        .stdin(Stdio::null())
        .output()
        .map_err(|e| Error::SubprocessFailed {
            cmd: display.clone(),
            code: None,
            output: format!("failed to start: {}", e),
        })?;

    if !output.status.success() {
        let mut combined = tail(&output.stdout);
        let stderr = tail(&output.stderr);
        if !stderr.is_empty() {
            if !combined.is_empty() {
                combined.push('\n');
            }
            combined.push_str(&stderr);
        }
        return Err(Error::SubprocessFailed {
            cmd: display,
            code: output.status.code(),
            output: combined,
        });
    }

    output::detail(&format!(
        "{} exited 0 ({} bytes stdout, {} bytes stderr)",
        display,
        output.stdout.len(),
        output.stderr.len()
    ));
    Ok(())
}

fn step_command(program: impl AsRef<std::ffi::OsStr>, env: &[String], work_dir: &Path) -> Command {
    let mut cmd = Command::new(program);
    cmd.current_dir(work_dir);
    apply_env(&mut cmd, env);
    cmd.env("PWD", work_dir);
    cmd
}

/// Make a downloaded artifact executable by its owner.
#[cfg(unix)]
pub fn mark_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = std::fs::metadata(path)?.permissions();
    perms.set_mode(perms.mode() | 0o755);
    std::fs::set_permissions(path, perms)?;
    Ok(())
}

#[cfg(not(unix))]
pub fn mark_executable(_path: &Path) -> Result<()> {
    Ok(())
}

/// Run an executable with `args` inside `work_dir`.
pub fn run_file(program: &Path, args: &[String], env: &[String], work_dir: &Path) -> Result<()> {
    let mut cmd = step_command(program, env, work_dir);
    cmd.args(args);
    run_command(&mut cmd)
}

fn script_name(interpreter: Interpreter) -> &'static str {
    match interpreter {
        Interpreter::Powershell => "recipe_script.ps1",
        Interpreter::Shell if cfg!(windows) => "recipe_script.cmd",
        Interpreter::None if cfg!(windows) => "recipe_script.cmd",
        Interpreter::Shell => "recipe_script.sh",
        Interpreter::None => "recipe_script",
    }
}

/// Materialize `body` in `work_dir` and run it through `interpreter`.
///
/// Arguments are passed as separate argv entries after the script, so they
/// are never re-split by the shell.
pub fn run_script(
    body: &str,
    args: &[String],
    interpreter: Interpreter,
    env: &[String],
    work_dir: &Path,
) -> Result<()> {
    let script = work_dir.join(script_name(interpreter));
    std::fs::write(&script, body)?;
    mark_executable(&script)?;

    let mut cmd = match interpreter {
        Interpreter::None => step_command(&script, env, work_dir),
        Interpreter::Shell => {
            let mut cmd = if cfg!(windows) {
                let mut cmd = step_command("cmd.exe", env, work_dir);
                cmd.arg("/c");
                cmd
            } else {
                step_command("/bin/sh", env, work_dir)
            };
            cmd.arg(&script);
            cmd
        }
        Interpreter::Powershell => {
            let program = if cfg!(windows) { "powershell.exe" } else { "pwsh" };
            let mut cmd = step_command(program, env, work_dir);
            cmd.args([
                "-NonInteractive",
                "-NoProfile",
                "-ExecutionPolicy",
                "Bypass",
                "-File",
            ]);
            cmd.arg(&script);
            cmd
        }
    };
    cmd.args(args);
    run_command(&mut cmd)
}
