//! Child-process supervision for workflow steps.
//!
//! Stdout is discarded (volumes are small and uninteresting); stderr is
//! forwarded line by line as it arrives, prefixed with the command name, and
//! a bounded tail of it is kept for the failure diagnostic.
use crate::error::WorkflowError;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// How many trailing stderr lines are kept for the failure diagnostic.
const STDERR_TAIL_LINES: usize = 20;
/// Poll interval while waiting on a child.
const WAIT_POLL: Duration = Duration::from_millis(50);

/// Cancellation signal shared between concurrently supervised children.
/// Tripping it kills every child still being polled against it.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One supervised child: command, arguments, working directory, and an
/// optional deadline for finite steps.
#[derive(Debug, Clone)]
pub struct Launch {
    pub command: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub timeout: Option<Duration>,
}

impl Launch {
    pub fn new(command: impl Into<String>, args: &[&str], cwd: &Path) -> Self {
        Self {
            command: command.into(),
            args: args.iter().map(|arg| (*arg).to_string()).collect(),
            cwd: cwd.to_path_buf(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

enum Outcome {
    Success,
    Cancelled,
    Failed(WorkflowError),
}

/// Run one child to completion. Success is exit code 0; everything else,
/// including spawn failure, a tripped timeout, or cancellation, is a
/// `ProcessExit` error carrying the captured stderr tail.
pub fn run(launch: &Launch, cancel: &CancelToken) -> Result<(), WorkflowError> {
    match supervise(launch, cancel) {
        Outcome::Success => Ok(()),
        Outcome::Cancelled => Err(process_error(launch, "was cancelled", Vec::new())),
        Outcome::Failed(err) => Err(err),
    }
}

/// Supervise several children concurrently. The first failure cancels the
/// survivors and is the error returned; a sibling killed by that
/// cancellation is not itself reported as a failure.
pub fn run_all(launches: &[Launch], cancel: &CancelToken) -> Result<(), WorkflowError> {
    let first_failure = thread::scope(|scope| {
        let handles: Vec<_> = launches
            .iter()
            .map(|launch| {
                scope.spawn(move || {
                    let outcome = supervise(launch, cancel);
                    if matches!(outcome, Outcome::Failed(_)) {
                        cancel.cancel();
                    }
                    (launch, outcome)
                })
            })
            .collect();

        let mut first_failure = None;
        let mut externally_cancelled = None;
        for handle in handles {
            let Ok((launch, outcome)) = handle.join() else {
                continue;
            };
            match outcome {
                Outcome::Success => {}
                Outcome::Cancelled => {
                    // Only meaningful when no sibling failed: then the token
                    // was tripped from outside the group.
                    externally_cancelled
                        .get_or_insert_with(|| process_error(launch, "was cancelled", Vec::new()));
                }
                Outcome::Failed(err) => {
                    first_failure.get_or_insert(err);
                }
            }
        }
        first_failure.or(externally_cancelled)
    });
    match first_failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn supervise(launch: &Launch, cancel: &CancelToken) -> Outcome {
    let mut child = match Command::new(&launch.command)
        .args(&launch.args)
        .current_dir(&launch.cwd)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
    {
        Ok(child) => child,
        Err(err) => {
            return Outcome::Failed(process_error(
                launch,
                &format!("failed to start: {err}"),
                Vec::new(),
            ));
        }
    };
    tracing::debug!(command = %launch.command, pid = child.id(), "spawned child");

    let tail = Arc::new(Mutex::new(Vec::new()));
    let reader = child.stderr.take().map(|stderr| {
        let command = launch.command.clone();
        let tail = Arc::clone(&tail);
        thread::spawn(move || forward_stderr(&command, stderr, &tail))
    });

    let waited = wait_with_deadline(&mut child, launch.timeout, cancel);
    if let Some(handle) = reader {
        let _ = handle.join();
    }
    let tail = tail.lock().map(|lines| lines.clone()).unwrap_or_default();

    match waited {
        Waited::Exited(status) if status.success() => Outcome::Success,
        Waited::Exited(status) => {
            let detail = match status.code() {
                Some(code) => format!("exited with code {code}"),
                None => "was terminated by a signal".to_string(),
            };
            Outcome::Failed(process_error(launch, &detail, tail))
        }
        Waited::TimedOut(timeout) => Outcome::Failed(process_error(
            launch,
            &format!("timed out after {}s", timeout.as_secs_f64()),
            tail,
        )),
        Waited::Cancelled => Outcome::Cancelled,
        Waited::WaitFailed(err) => {
            Outcome::Failed(process_error(launch, &format!("wait failed: {err}"), tail))
        }
    }
}

enum Waited {
    Exited(std::process::ExitStatus),
    TimedOut(Duration),
    Cancelled,
    WaitFailed(std::io::Error),
}

fn wait_with_deadline(child: &mut Child, timeout: Option<Duration>, cancel: &CancelToken) -> Waited {
    let deadline = timeout.map(|timeout| (Instant::now() + timeout, timeout));
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Waited::Exited(status),
            Ok(None) => {}
            Err(err) => return Waited::WaitFailed(err),
        }
        if cancel.is_cancelled() {
            kill_and_reap(child);
            return Waited::Cancelled;
        }
        if let Some((deadline, timeout)) = deadline {
            if Instant::now() >= deadline {
                kill_and_reap(child);
                return Waited::TimedOut(timeout);
            }
        }
        thread::sleep(WAIT_POLL);
    }
}

fn kill_and_reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

fn forward_stderr(command: &str, stderr: ChildStderr, tail: &Mutex<Vec<String>>) {
    let reader = BufReader::new(stderr);
    for line in reader.lines() {
        let Ok(line) = line else { break };
        eprintln!("{command} error :: {line}");
        if let Ok(mut tail) = tail.lock() {
            tail.push(line);
            if tail.len() > STDERR_TAIL_LINES {
                tail.remove(0);
            }
        }
    }
}

fn process_error(launch: &Launch, detail: &str, stderr_tail: Vec<String>) -> WorkflowError {
    WorkflowError::ProcessExit {
        command: launch.command.clone(),
        detail: detail.to_string(),
        stderr_tail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn sh_available() -> bool {
        Path::new("/bin/sh").exists()
    }

    fn sh(script: &str, cwd: &Path) -> Launch {
        Launch::new("/bin/sh", &["-c", script], cwd)
    }

    #[test]
    fn succeeds_on_exit_zero() {
        if !sh_available() {
            return;
        }
        let cwd = env::temp_dir();
        run(&sh("exit 0", &cwd), &CancelToken::new()).expect("exit 0 succeeds");
    }

    #[test]
    fn fails_with_exit_code_in_detail() {
        if !sh_available() {
            return;
        }
        let cwd = env::temp_dir();
        let err = run(&sh("exit 3", &cwd), &CancelToken::new()).expect_err("exit 3 fails");
        let WorkflowError::ProcessExit { detail, .. } = &err else {
            panic!("expected ProcessExit, got {err:?}");
        };
        assert!(detail.contains('3'), "detail: {detail}");
    }

    #[test]
    fn captures_stderr_tail() {
        if !sh_available() {
            return;
        }
        let cwd = env::temp_dir();
        let err = run(&sh("echo boom >&2; exit 1", &cwd), &CancelToken::new())
            .expect_err("nonzero exit fails");
        let WorkflowError::ProcessExit { stderr_tail, .. } = &err else {
            panic!("expected ProcessExit, got {err:?}");
        };
        assert_eq!(stderr_tail, &vec!["boom".to_string()]);
    }

    #[test]
    fn nonexistent_command_is_a_process_error() {
        let cwd = env::temp_dir();
        let launch = Launch::new("definitely-not-a-real-command-9f2c", &[], &cwd);
        let err = run(&launch, &CancelToken::new()).expect_err("spawn fails");
        let WorkflowError::ProcessExit { detail, .. } = &err else {
            panic!("expected ProcessExit, got {err:?}");
        };
        assert!(detail.contains("failed to start"), "detail: {detail}");
    }

    #[test]
    fn timeout_kills_the_child() {
        if !sh_available() {
            return;
        }
        let cwd = env::temp_dir();
        let launch = sh("sleep 30", &cwd).with_timeout(Some(Duration::from_millis(200)));
        let started = Instant::now();
        let err = run(&launch, &CancelToken::new()).expect_err("timeout fails");
        assert!(started.elapsed() < Duration::from_secs(10));
        let WorkflowError::ProcessExit { detail, .. } = &err else {
            panic!("expected ProcessExit, got {err:?}");
        };
        assert!(detail.contains("timed out"), "detail: {detail}");
    }

    #[test]
    fn run_all_cancels_the_survivor_when_one_fails() {
        if !sh_available() {
            return;
        }
        let cwd = env::temp_dir();
        let launches = [sh("sleep 30", &cwd), sh("exit 1", &cwd)];
        let started = Instant::now();
        let err = run_all(&launches, &CancelToken::new()).expect_err("group fails");
        assert!(started.elapsed() < Duration::from_secs(10));
        let WorkflowError::ProcessExit { detail, .. } = &err else {
            panic!("expected ProcessExit, got {err:?}");
        };
        assert!(detail.contains("exited with code 1"), "detail: {detail}");
    }

    #[test]
    fn run_all_succeeds_when_all_exit_zero() {
        if !sh_available() {
            return;
        }
        let cwd = env::temp_dir();
        let launches = [sh("exit 0", &cwd), sh("exit 0", &cwd)];
        run_all(&launches, &CancelToken::new()).expect("both succeed");
    }

    #[test]
    fn external_cancellation_stops_a_running_child() {
        if !sh_available() {
            return;
        }
        let cwd = env::temp_dir();
        let cancel = CancelToken::new();
        let trip = cancel.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(200));
            trip.cancel();
        });
        let started = Instant::now();
        let err = run(&sh("sleep 30", &cwd), &cancel).expect_err("cancelled run fails");
        assert!(started.elapsed() < Duration::from_secs(10));
        let WorkflowError::ProcessExit { detail, .. } = &err else {
            panic!("expected ProcessExit, got {err:?}");
        };
        assert!(detail.contains("cancelled"), "detail: {detail}");
    }
}
