//! Process spawning, bounded capture and process-group teardown.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use warden_tools::CommandLine;

const READ_CHUNK: usize = 8192;

/// Limits applied to one spawned process.
#[derive(Debug, Clone)]
pub(crate) struct RunLimits<'a> {
    pub(crate) budget: Duration,
    pub(crate) kill_grace: Duration,
    pub(crate) output_cap: usize,
    pub(crate) env_allowlist: &'a [String],
}

/// How a process run ended.
#[derive(Debug)]
pub(crate) enum Termination {
    Exited(ExitStatus),
    TimedOut,
    Cancelled,
    SpawnFailed(std::io::Error),
    WaitFailed(std::io::Error),
}

/// Captured result of one process run.
#[derive(Debug)]
pub(crate) struct RunOutput {
    pub(crate) termination: Termination,
    pub(crate) stdout: String,
    pub(crate) stderr: String,
    pub(crate) truncated: bool,
}

impl RunOutput {
    fn without_output(termination: Termination) -> Self {
        Self {
            termination,
            stdout: String::new(),
            stderr: String::new(),
            truncated: false,
        }
    }
}

/// Kills the whole process group unless disarmed.
struct GroupGuard {
    pgid: Option<u32>,
}

impl GroupGuard {
    fn disarm(&mut self) {
        self.pgid = None;
    }
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        if let Some(pgid) = self.pgid {
            debug!(pgid, "guard killing process group");
            signal_group(pgid, GroupSignal::Kill);
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum GroupSignal {
    Terminate,
    Kill,
}

#[cfg(unix)]
fn signal_group(pgid: u32, signal: GroupSignal) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pgid) else {
        return;
    };
    let signal = match signal {
        GroupSignal::Terminate => Signal::SIGTERM,
        GroupSignal::Kill => Signal::SIGKILL,
    };
    // ESRCH means the group is already gone.
    if let Err(e) = killpg(Pid::from_raw(raw), signal)
        && e != nix::errno::Errno::ESRCH
    {
        warn!(pgid, ?signal, error = %e, "failed to signal process group");
    }
}

#[cfg(not(unix))]
fn signal_group(_pgid: u32, _signal: GroupSignal) {}

fn build_command(line: &CommandLine, env_allowlist: &[String]) -> Command {
    let mut cmd = Command::new(&line.program);
    cmd.args(&line.argv)
        .env_clear()
        .envs(
            std::env::vars_os()
                .filter(|(key, _)| env_allowlist.iter().any(|allowed| key.as_os_str() == allowed.as_str())),
        )
        .stdin(if line.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);
    cmd
}

/// Read a stream to EOF, keeping at most `cap` bytes.
async fn read_bounded<R>(reader: Option<R>, cap: usize) -> (Vec<u8>, bool)
where
    R: AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return (Vec::new(), false);
    };
    let mut kept = Vec::new();
    let mut truncated = false;
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                let room = cap.saturating_sub(kept.len());
                let take = n.min(room);
                if take < n {
                    truncated = true;
                }
                kept.extend_from_slice(chunk.get(..take).unwrap_or_default());
            },
            Err(e) => {
                debug!(error = %e, "output stream read failed");
                break;
            },
        }
    }
    (kept, truncated)
}

async fn collect(
    handle: JoinHandle<(Vec<u8>, bool)>,
    grace: Duration,
) -> (String, bool) {
    match tokio::time::timeout(grace, handle).await {
        Ok(Ok((bytes, truncated))) => (String::from_utf8_lossy(&bytes).into_owned(), truncated),
        Ok(Err(e)) => {
            warn!(error = %e, "output reader task failed");
            (String::new(), false)
        },
        Err(_) => {
            warn!("output stream still open after process exit");
            (String::new(), true)
        },
    }
}

/// SIGTERM the group, wait out the grace period, then SIGKILL and reap.
async fn terminate(child: &mut Child, pgid: Option<u32>, grace: Duration) {
    if let Some(pgid) = pgid {
        signal_group(pgid, GroupSignal::Terminate);
    }
    if tokio::time::timeout(grace, child.wait()).await.is_ok() {
        if let Some(pgid) = pgid {
            signal_group(pgid, GroupSignal::Kill);
        }
        return;
    }
    if let Some(pgid) = pgid {
        signal_group(pgid, GroupSignal::Kill);
    }
    if let Err(e) = child.start_kill() {
        debug!(error = %e, "direct kill after group kill failed");
    }
    if let Err(e) = child.wait().await {
        warn!(error = %e, "failed to reap child");
    }
}

/// Spawn `line` and drive it to a terminal state.
pub(crate) async fn run(
    line: &CommandLine,
    limits: RunLimits<'_>,
    cancel: &CancellationToken,
) -> RunOutput {
    let mut child = match build_command(line, limits.env_allowlist).spawn() {
        Ok(child) => child,
        Err(e) => return RunOutput::without_output(Termination::SpawnFailed(e)),
    };
    let pgid = child.id();
    let mut guard = GroupGuard { pgid };
    debug!(program = %line.program, pid = ?pgid, "spawned");

    if let (Some(input), Some(mut stdin)) = (line.stdin.clone(), child.stdin.take()) {
        tokio::spawn(async move {
            if let Err(e) = stdin.write_all(input.as_bytes()).await {
                debug!(error = %e, "stdin write failed");
            }
        });
    }

    let stdout = tokio::spawn(read_bounded(child.stdout.take(), limits.output_cap));
    let stderr = tokio::spawn(read_bounded(child.stderr.take(), limits.output_cap));

    let termination = tokio::select! {
        status = child.wait() => match status {
            Ok(status) => Termination::Exited(status),
            Err(e) => Termination::WaitFailed(e),
        },
        () = tokio::time::sleep(limits.budget) => Termination::TimedOut,
        () = cancel.cancelled() => Termination::Cancelled,
    };

    match termination {
        Termination::Exited(_) | Termination::WaitFailed(_) => {
            // Leader is gone; take down anything it left in the group.
            if let Some(pgid) = pgid {
                signal_group(pgid, GroupSignal::Kill);
            }
        },
        Termination::TimedOut | Termination::Cancelled => {
            terminate(&mut child, pgid, limits.kill_grace).await;
        },
        Termination::SpawnFailed(_) => {},
    }
    guard.disarm();

    let (stdout, out_truncated) = collect(stdout, limits.kill_grace).await;
    let (stderr, err_truncated) = collect(stderr, limits.kill_grace).await;

    RunOutput {
        termination,
        stdout,
        stderr,
        truncated: out_truncated || err_truncated,
    }
}
