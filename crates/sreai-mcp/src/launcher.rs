//! Launching local server definitions: one-shot runs and launch checks.

use crate::definition::ServerDefinition;
use crate::env::{merge_env, process_env, runtime_bin_dirs};
use crate::error::McpError;
use crate::process::{self, STDERR_TAIL_BYTES};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// How long a launch check watches a fresh process before declaring it healthy.
pub const LAUNCH_CHECK_WINDOW: Duration = Duration::from_millis(500);

/// Bytes of stdout/stderr included in run summaries.
const LOG_PREVIEW_BYTES: usize = 200;

/// Fully resolved process invocation for a definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    pub program: String,
    /// Definition args followed by per-invocation extras.
    pub args: Vec<String>,
    /// Complete child environment, including entries that are not valid UTF-8.
    pub env: BTreeMap<OsString, OsString>,
    pub workdir: Option<PathBuf>,
}

impl LaunchPlan {
    /// Resolve against the current process environment and bundled runtimes.
    pub fn new(
        definition: &ServerDefinition,
        extra_args: &[String],
        extra_env: &BTreeMap<String, String>,
    ) -> Self {
        Self::with_base_env(definition, extra_args, extra_env, process_env())
    }

    fn with_base_env(
        definition: &ServerDefinition,
        extra_args: &[String],
        extra_env: &BTreeMap<String, String>,
        base_env: BTreeMap<OsString, OsString>,
    ) -> Self {
        let args = definition
            .args
            .iter()
            .chain(extra_args)
            .cloned()
            .collect();
        let env = merge_env(base_env, &definition.env, extra_env, &runtime_bin_dirs());
        let workdir = definition.workdir.trim();
        let workdir = (!workdir.is_empty()).then(|| sreai_config::expand_path(workdir));
        Self {
            program: definition.command.clone(),
            args,
            env,
            workdir,
        }
    }

    /// A command with exactly this plan's environment. Stdio is left to the caller.
    pub fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args).env_clear().envs(&self.env);
        if let Some(dir) = &self.workdir {
            command.current_dir(dir);
        }
        command
    }

    fn log(&self, alias: &str, stdin: Option<&str>) {
        let env_keys: Vec<_> = self.env.keys().map(|k| k.to_string_lossy()).collect();
        tracing::debug!(
            "Launching MCP server '{}': command={} args={:?} workdir={:?} env_keys={:?} stdin={}",
            alias,
            self.program,
            self.args,
            self.workdir,
            env_keys,
            stdin.map(sreai_types::mask_value).unwrap_or_default()
        );
    }
}

/// Per-invocation inputs for [`run_command`].
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    pub extra_args: Vec<String>,
    /// Written to the child's stdin, which is then closed. `None` means null stdin.
    pub stdin: Option<String>,
    pub extra_env: BTreeMap<String, String>,
}

/// Captured output of a finished one-shot run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code; -1 when the process was terminated by a signal.
    pub exit_code: i32,
}

/// Run a definition to completion, capturing stdout and stderr.
///
/// A non-zero exit is an error carrying the full output. Cancelling the token
/// kills the child.
pub async fn run_command(
    alias: &str,
    definition: &ServerDefinition,
    request: RunRequest,
    cancel: &CancellationToken,
) -> Result<RunOutput, McpError> {
    definition.validate()?;
    let plan = LaunchPlan::new(definition, &request.extra_args, &request.extra_env);
    plan.log(alias, request.stdin.as_deref());

    let mut command = plan.command();
    command
        .stdin(if request.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn().map_err(|source| McpError::Launch {
        alias: alias.to_string(),
        source,
    })?;

    let stdin = child.stdin.take();
    let payload = request.stdin.unwrap_or_default();
    let feed = async move {
        if let Some(mut pipe) = stdin {
            if let Err(e) = pipe.write_all(payload.as_bytes()).await {
                tracing::debug!("Failed to write stdin for MCP server: {e}");
            }
        }
    };
    let run = async {
        let ((), output) = tokio::join!(feed, child.wait_with_output());
        output
    };

    let output = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            tracing::debug!("Run of MCP server '{}' cancelled", alias);
            return Err(McpError::Cancelled);
        }
        output = run => output?,
    };

    let result = RunOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        exit_code: output.status.code().unwrap_or(-1),
    };

    if !output.status.success() {
        tracing::debug!(
            "MCP server '{}' exited with {}: stdout={:?} stderr={:?}",
            alias,
            result.exit_code,
            sreai_types::truncate_str(&result.stdout, LOG_PREVIEW_BYTES),
            sreai_types::truncate_str(&result.stderr, LOG_PREVIEW_BYTES)
        );
        return Err(McpError::ProcessExit {
            alias: alias.to_string(),
            code: result.exit_code,
            stderr_tail: sreai_types::tail_str(&result.stderr, STDERR_TAIL_BYTES).to_string(),
            output: Box::new(result),
        });
    }

    tracing::debug!(
        "MCP server '{}' finished: stdout={:?}",
        alias,
        sreai_types::truncate_str(&result.stdout, LOG_PREVIEW_BYTES)
    );
    Ok(result)
}

/// Start a definition and watch it briefly.
///
/// Healthy when the process is still running after [`LAUNCH_CHECK_WINDOW`]
/// (it is then killed) or exits cleanly within it.
pub async fn check_launch(
    alias: &str,
    definition: &ServerDefinition,
    cancel: &CancellationToken,
) -> Result<(), McpError> {
    definition.validate()?;
    let plan = LaunchPlan::new(definition, &[], &BTreeMap::new());
    plan.log(alias, None);

    let process::StdioProcess {
        stdin,
        stdout,
        mut exit,
        mut control,
    } = process::spawn_stdio(alias, &plan)?;

    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(McpError::Cancelled),
        report = exit.wait() => Ok(Some(report)),
        _ = tokio::time::sleep(LAUNCH_CHECK_WINDOW) => Ok(None),
    };
    drop(stdin);
    drop(stdout);

    match outcome {
        Ok(Some(report)) if report.success() => {
            tracing::debug!("MCP server '{}' exited cleanly during launch check", alias);
            Ok(())
        }
        Ok(Some(report)) => {
            let stderr_tail = control.stderr_tail();
            Err(McpError::ProcessExit {
                alias: alias.to_string(),
                code: report.code(),
                output: Box::new(RunOutput {
                    stdout: String::new(),
                    stderr: stderr_tail.clone(),
                    exit_code: report.code(),
                }),
                stderr_tail,
            })
        }
        Ok(None) => {
            tracing::debug!("MCP server '{}' is running, stopping launch check", alias);
            control.kill();
            exit.wait().await;
            Ok(())
        }
        Err(e) => {
            control.kill();
            exit.wait().await;
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;

    fn env(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn os_env(pairs: &[(&str, &str)]) -> BTreeMap<OsString, OsString> {
        pairs
            .iter()
            .map(|(k, v)| (OsString::from(k), OsString::from(v)))
            .collect()
    }

    #[test]
    fn plan_appends_extra_args_and_layers_env() {
        let definition = ServerDefinition::new("node")
            .with_args(["server.js"])
            .with_env("MODE", "definition")
            .with_env("ONLY_DEF", "1")
            .with_workdir("/srv/mcp");
        let plan = LaunchPlan::with_base_env(
            &definition,
            &["--verbose".to_string()],
            &env(&[("MODE", "extra")]),
            os_env(&[("MODE", "base"), ("HOME", "/home/u")]),
        );
        assert_eq!(plan.program, "node");
        assert_eq!(plan.args, vec!["server.js", "--verbose"]);
        assert_eq!(plan.env[OsStr::new("MODE")], "extra");
        assert_eq!(plan.env[OsStr::new("ONLY_DEF")], "1");
        assert_eq!(plan.env[OsStr::new("HOME")], "/home/u");
        assert_eq!(plan.workdir, Some(PathBuf::from("/srv/mcp")));
    }

    #[test]
    fn blank_workdir_inherits() {
        let plan = LaunchPlan::with_base_env(
            &ServerDefinition::new("node").with_workdir("  "),
            &[],
            &BTreeMap::new(),
            BTreeMap::new(),
        );
        assert!(plan.workdir.is_none());
    }

    #[tokio::test]
    async fn empty_command_is_validation_error() {
        let cancel = CancellationToken::new();
        let err = run_command(
            "blank",
            &ServerDefinition::default(),
            RunRequest::default(),
            &cancel,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, McpError::Validation(_)));
    }

    #[tokio::test]
    async fn missing_binary_is_launch_error() {
        let cancel = CancellationToken::new();
        let err = run_command(
            "ghost",
            &ServerDefinition::new("this_command_does_not_exist_xyz123"),
            RunRequest::default(),
            &cancel,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, McpError::Launch { ref alias, .. } if alias == "ghost"));
        assert!(err.to_string().starts_with("unable to execute ghost"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_utf8_environment_reaches_child() {
        use std::os::unix::ffi::OsStrExt;

        let mut base = BTreeMap::new();
        base.insert(
            OsString::from("RAW_BYTES"),
            OsStr::from_bytes(b"a\xffb").to_os_string(),
        );
        if let Some(path) = std::env::var_os("PATH") {
            base.insert(OsString::from("PATH"), path);
        }
        let plan = LaunchPlan::with_base_env(
            &ServerDefinition::new("sh").with_args(["-c", "printf '[%s]' \"${RAW_BYTES-unset}\""]),
            &[],
            &BTreeMap::new(),
            base,
        );

        let output = plan.command().output().await.unwrap();
        assert!(output.status.success());
        assert_eq!(output.stdout, b"[a\xffb]");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stdin_payload_reaches_child() {
        let cancel = CancellationToken::new();
        let output = run_command(
            "cat",
            &ServerDefinition::new("cat"),
            RunRequest {
                stdin: Some("ping\n".into()),
                ..RunRequest::default()
            },
            &cancel,
        )
        .await
        .unwrap();
        assert_eq!(output.stdout, "ping\n");
        assert_eq!(output.exit_code, 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn extra_env_and_args_reach_child() {
        let cancel = CancellationToken::new();
        let output = run_command(
            "env",
            &ServerDefinition::new("sh")
                .with_args(["-c"])
                .with_env("GREETING", "definition"),
            RunRequest {
                extra_args: vec!["echo \"$GREETING $0\"".into(), "arg0".into()],
                extra_env: env(&[("GREETING", "extra")]),
                ..RunRequest::default()
            },
            &cancel,
        )
        .await
        .unwrap();
        assert_eq!(output.stdout, "extra arg0\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn nonzero_exit_carries_output_and_stderr_tail() {
        let cancel = CancellationToken::new();
        let err = run_command(
            "failing",
            &ServerDefinition::new("sh").with_args(["-c", "echo partial; echo 'bad flag' >&2; exit 3"]),
            RunRequest::default(),
            &cancel,
        )
        .await
        .unwrap_err();
        match err {
            McpError::ProcessExit {
                alias,
                code,
                stderr_tail,
                output,
            } => {
                assert_eq!(alias, "failing");
                assert_eq!(code, 3);
                assert_eq!(stderr_tail, "bad flag");
                assert_eq!(output.stdout, "partial\n");
                assert_eq!(output.exit_code, 3);
            }
            other => panic!("Expected ProcessExit, got: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn check_launch_outcomes() {
        let cancel = CancellationToken::new();

        let running = ServerDefinition::new("sleep").with_args(["30"]);
        check_launch("sleeper", &running, &cancel).await.unwrap();

        let clean = ServerDefinition::new("true");
        check_launch("clean", &clean, &cancel).await.unwrap();

        let failing = ServerDefinition::new("sh").with_args(["-c", "echo nope >&2; exit 2"]);
        let err = check_launch("failing", &failing, &cancel).await.unwrap_err();
        assert!(matches!(err, McpError::ProcessExit { code: 2, .. }));
        assert_eq!(err.stderr_tail(), Some("nope"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn check_launch_honors_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = check_launch("sleeper", &ServerDefinition::new("sleep").with_args(["30"]), &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }
}
