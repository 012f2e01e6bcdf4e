//! Process runner
//!
//! Launches a single external program with both output streams captured in
//! memory and waits for it to exit. The runner knows nothing about pipelines:
//! a non-zero exit code is ordinary data in [`ProcessResult`], only a process
//! that could not be started (or supervised) is an error.

use std::fmt;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::engine::error::{RunnerError, UnterminatedQuote};

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// A program and its arguments, built once per invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalCommand {
    program: String,
    args: Vec<String>,
}

impl ExternalCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Build a command from a pre-joined argument string such as
    /// `-filetype=obj -o "out.obj" "in.ll"`.
    pub fn from_command_line(
        program: impl Into<String>,
        line: &str,
    ) -> Result<Self, UnterminatedQuote> {
        Ok(Self::new(program).args(split_args(line)?))
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }
}

impl fmt::Display for ExternalCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " \"{}\"", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Result of one finished invocation.
///
/// Captured output is decoded as UTF-8; invalid byte sequences are replaced
/// with U+FFFD, so only valid UTF-8 output is preserved byte for byte.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessResult {
    pub exit_code: i32,
    pub stderr: String,
    pub stdout: String,
}

impl ProcessResult {
    /// Result of a status-returning call that produced no captured text
    pub fn from_status(exit_code: i32) -> Self {
        Self {
            exit_code,
            stderr: String::new(),
            stdout: String::new(),
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Anything that can run an [`ExternalCommand`] to completion
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, command: &ExternalCommand) -> Result<ProcessResult, RunnerError>;
}

/// Runs commands as OS child processes
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    timeout: Option<Duration>,
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill the child and fail with [`RunnerError::Timeout`] once `timeout` elapses
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, command: &ExternalCommand) -> Result<ProcessResult, RunnerError> {
        let program = command.program().to_string();
        debug!(command = %command, "Launching process");

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(windows)]
        cmd.creation_flags(CREATE_NO_WINDOW);

        // Own process group, so a timeout can take down everything the tool started.
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|source| RunnerError::Launch {
            program: program.clone(),
            source,
        })?;

        let pid = child.id();
        let stderr = child.stderr.take();
        let stdout = child.stdout.take();

        // Both pipes are drained together before the wait; a child that fills
        // one pipe while we block on the other would otherwise never exit.
        let supervise = async {
            let (stderr, stdout) = tokio::try_join!(drain(stderr), drain(stdout))?;
            let status = child.wait().await?;
            Ok::<_, std::io::Error>((status, stderr, stdout))
        };

        let finished = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, supervise).await.ok(),
            None => Some(supervise.await),
        };

        let Some(finished) = finished else {
            let timeout = self.timeout.unwrap_or_default();
            warn!(program = %program, timeout_ms = timeout.as_millis() as u64, "Process timed out, killing it");
            kill_tree(&mut child, pid, &program).await;
            return Err(RunnerError::Timeout { program, timeout });
        };

        let (status, stderr, stdout) =
            finished.map_err(|source| RunnerError::Io {
                program: program.clone(),
                source,
            })?;

        let exit_code = status.code().unwrap_or(-1);
        debug!(program = %program, exit_code, "Process exited");

        Ok(ProcessResult {
            exit_code,
            stderr,
            stdout,
        })
    }
}

/// Kill `child` together with every process it started
async fn kill_tree(child: &mut Child, pid: Option<u32>, program: &str) {
    #[cfg(unix)]
    if let Some(pgid) = pid.and_then(|pid| i32::try_from(pid).ok()) {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        if let Err(e) = killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
            debug!(program, error = %e, "Process group already gone");
        }
    }

    #[cfg(windows)]
    if let Some(pid) = pid {
        let mut taskkill = Command::new("taskkill");
        taskkill
            .args(["/T", "/F", "/PID", &pid.to_string()])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .creation_flags(CREATE_NO_WINDOW);
        if let Err(e) = taskkill.status().await {
            warn!(program, error = %e, "Failed to kill process tree");
        }
    }

    #[cfg(not(any(unix, windows)))]
    let _ = pid;

    if let Err(e) = child.kill().await {
        warn!(program, error = %e, "Failed to kill timed out process");
    }
}

async fn drain<R: AsyncRead + Unpin>(stream: Option<R>) -> std::io::Result<String> {
    let mut buf = Vec::new();
    if let Some(mut stream) = stream {
        stream.read_to_end(&mut buf).await?;
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Split a command line on whitespace.
///
/// Double or single quotes group text into one argument and are removed.
/// Backslashes are literal so Windows paths pass through untouched, and
/// `${{ ... }}` placeholders are kept whole.
pub fn split_args(line: &str) -> Result<Vec<String>, UnterminatedQuote> {
    let chars: Vec<char> = line.chars().collect();
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '"' | '\'' => {
                in_token = true;
                i += 1;
                loop {
                    match chars.get(i) {
                        Some(&q) if q == c => break,
                        Some(&ch) => current.push(ch),
                        None => return Err(UnterminatedQuote(line.to_string())),
                    }
                    i += 1;
                }
            }
            '$' if chars.get(i + 1) == Some(&'{') && chars.get(i + 2) == Some(&'{') => {
                in_token = true;
                while i < chars.len() {
                    current.push(chars[i]);
                    if chars[i] == '}' && chars.get(i + 1) == Some(&'}') {
                        current.push('}');
                        i += 1;
                        break;
                    }
                    i += 1;
                }
            }
            c if c.is_whitespace() => {
                if in_token {
                    args.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            c => {
                in_token = true;
                current.push(c);
            }
        }
        i += 1;
    }

    if in_token {
        args.push(current);
    }

    Ok(args)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> ExternalCommand {
        ExternalCommand::new("sh").arg("-c").arg(script)
    }

    #[test]
    fn test_from_command_line_keeps_quoted_paths() {
        let cmd = ExternalCommand::from_command_line(
            "llc",
            r#"-filetype=obj -o "out dir/main.obj" "main.ll""#,
        )
        .unwrap();

        assert_eq!(cmd.program(), "llc");
        assert_eq!(
            cmd.arguments(),
            &["-filetype=obj", "-o", "out dir/main.obj", "main.ll"]
        );
        assert_eq!(
            cmd.to_string(),
            r#"llc -filetype=obj -o "out dir/main.obj" main.ll"#
        );
    }

    #[test]
    fn test_split_args() {
        assert_eq!(
            split_args(r#"-filetype=obj -o "a b.obj"  'c.ll'"#).unwrap(),
            vec!["-filetype=obj", "-o", "a b.obj", "c.ll"]
        );
        assert_eq!(
            split_args(r"/OUT:C:\out\Main.exe /ENTRY:main").unwrap(),
            vec![r"/OUT:C:\out\Main.exe", "/ENTRY:main"]
        );
        assert_eq!(split_args(r#"a "" b"#).unwrap(), vec!["a", "", "b"]);
        assert!(split_args("   ").unwrap().is_empty());
    }

    #[test]
    fn test_split_keeps_placeholders_whole() {
        assert_eq!(
            split_args("/OUT:${{ output }} ${{ input }} /ENTRY:main").unwrap(),
            vec!["/OUT:${{ output }}", "${{ input }}", "/ENTRY:main"]
        );
    }

    #[test]
    fn test_split_unterminated_quote() {
        let err = split_args(r#"-o "main.obj"#).unwrap_err();
        assert_eq!(err, UnterminatedQuote(r#"-o "main.obj"#.to_string()));
    }

    #[test]
    fn test_result_from_status() {
        let ok = ProcessResult::from_status(0);
        assert!(ok.success());
        assert!(ok.stderr.is_empty());
        assert!(!ProcessResult::from_status(-1).success());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_success_captures_exact_stderr() {
        let result = ProcessRunner::new()
            .run(&sh("echo hello; printf 'warning: unused\\n' >&2"))
            .await
            .unwrap();

        assert_eq!(result.exit_code, 0);
        assert_eq!(result.stderr, "warning: unused\n");
        assert_eq!(result.stdout, "hello\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_invalid_utf8_is_replaced() {
        let result = ProcessRunner::new()
            .run(&sh(r"printf 'bad \377 byte\n' >&2"))
            .await
            .unwrap();

        assert_eq!(result.stderr, "bad \u{FFFD} byte\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_success_with_silent_stderr() {
        let result = ProcessRunner::new().run(&sh("echo quiet")).await.unwrap();
        assert!(result.success());
        assert_eq!(result.stderr, "");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_is_data() {
        let result = ProcessRunner::new()
            .run(&sh("echo 'main.ll:3: bad' >&2; exit 7"))
            .await
            .unwrap();

        assert_eq!(result.exit_code, 7);
        assert_eq!(result.stderr, "main.ll:3: bad\n");
    }

    #[tokio::test]
    async fn test_missing_program_is_launch_failure() {
        let err = ProcessRunner::new()
            .run(&ExternalCommand::new("lx-build-no-such-program-4b1e"))
            .await
            .unwrap_err();

        assert!(err.is_launch_failure());
        assert!(matches!(err, RunnerError::Launch { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_large_output_on_both_streams_does_not_deadlock() {
        const SIZE: usize = 1024 * 1024;
        let script = format!(
            "yes stderr-line | head -c {SIZE} >&2; yes stdout-line | head -c {SIZE}; yes again | head -c {SIZE} >&2"
        );

        let result = tokio::time::timeout(
            Duration::from_secs(60),
            ProcessRunner::new().run(&sh(&script)),
        )
        .await
        .expect("runner deadlocked on large output")
        .unwrap();

        assert_eq!(result.exit_code, 0);
        assert_eq!(result.stdout.len(), SIZE);
        assert_eq!(result.stderr.len(), SIZE * 2);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_child() {
        let runner = ProcessRunner::new().with_timeout(Duration::from_millis(200));
        let err = runner.run(&sh("sleep 10")).await.unwrap_err();

        assert!(matches!(err, RunnerError::Timeout { .. }));
        assert!(!err.is_launch_failure());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_processes_the_child_started() {
        let dir = tempfile::tempdir().unwrap();
        let mark = dir.path().join("written-after-timeout");
        let command = ExternalCommand::new("sh").args([
            "-c".to_string(),
            r#"sh -c 'sleep 1; touch "$1"' helper "$1"; true"#.to_string(),
            "wrapper".to_string(),
            mark.display().to_string(),
        ]);

        let runner = ProcessRunner::new().with_timeout(Duration::from_millis(200));
        let err = runner.run(&command).await.unwrap_err();
        assert!(matches!(err, RunnerError::Timeout { .. }));

        tokio::time::sleep(Duration::from_millis(1800)).await;
        assert!(!mark.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_not_hit_by_fast_process() {
        let runner = ProcessRunner::new().with_timeout(Duration::from_secs(30));
        let result = runner.run(&sh("exit 0")).await.unwrap();
        assert!(result.success());
    }
}
