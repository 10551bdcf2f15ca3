//! The execution sandbox.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use warden_core::{
    Arguments, CorrelationId, ErrorCode, ExecutionResult, ExecutionStatus, truncate_to_boundary,
};
use warden_tools::{Tool, timeout_override};

use crate::error::SandboxResult;
use crate::journal::{ExecutionState, Journal, JournalEntry};
use crate::limiter::{ConcurrencyLimiter, Overflow};
use crate::process::{self, RunLimits, RunOutput, Termination};

/// Longest stderr excerpt carried in a failure message.
const ERROR_EXCERPT_BYTES: usize = 2048;

/// Sandbox limits.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Concurrency ceiling.
    pub max_concurrent: usize,
    /// Behaviour when every slot is busy.
    pub overflow: Overflow,
    /// Global ceiling on any call's budget.
    pub max_timeout: Duration,
    /// Global per-stream output ceiling, in bytes.
    pub max_output_bytes: usize,
    /// Time between SIGTERM and SIGKILL.
    pub kill_grace: Duration,
    /// Environment variables passed through to children.
    pub env_allowlist: Vec<String>,
    /// Finished executions remembered by the journal.
    pub journal_capacity: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 8,
            overflow: Overflow::Reject,
            max_timeout: Duration::from_secs(120),
            max_output_bytes: 1024 * 1024,
            kill_grace: Duration::from_secs(2),
            env_allowlist: vec!["PATH".into(), "HOME".into(), "LANG".into()],
            journal_capacity: 1024,
        }
    }
}

/// Runs tool invocations as bounded, cancellable child processes.
#[derive(Debug)]
pub struct Sandbox {
    config: SandboxConfig,
    limiter: ConcurrencyLimiter,
    journal: Journal,
}

/// Keeps the journal consistent if the execute future is dropped.
struct Admission<'a> {
    journal: &'a Journal,
    id: &'a CorrelationId,
    settled: bool,
}

impl Admission<'_> {
    fn settle(mut self, state: ExecutionState) {
        self.journal.finish(self.id, state);
        self.settled = true;
    }

    fn withdraw(mut self) {
        self.journal.withdraw(self.id);
        self.settled = true;
    }
}

impl Drop for Admission<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        if self.journal.state(self.id) == Some(ExecutionState::Running) {
            self.journal.finish(self.id, ExecutionState::Failed);
        } else {
            self.journal.withdraw(self.id);
        }
    }
}

impl Sandbox {
    /// Create a sandbox.
    #[must_use]
    pub fn new(config: SandboxConfig) -> Self {
        let limiter = ConcurrencyLimiter::new(config.max_concurrent, config.overflow);
        let journal = Journal::new(config.journal_capacity);
        Self {
            config,
            limiter,
            journal,
        }
    }

    /// Active limits.
    #[must_use]
    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Budget for a call: the smallest of the `timeout_seconds` override,
    /// the tool timeout and the global maximum.
    #[must_use]
    pub fn budget_for(&self, tool: &Tool, args: &Arguments) -> Duration {
        let budget = tool.timeout.min(self.config.max_timeout);
        match timeout_override(args) {
            Some(secs) => budget.min(Duration::from_secs(secs)),
            None => budget,
        }
    }

    /// Per-stream output ceiling for `tool`.
    #[must_use]
    pub fn output_cap_for(&self, tool: &Tool) -> usize {
        tool.max_output_bytes
            .map_or(self.config.max_output_bytes, |cap| {
                cap.min(self.config.max_output_bytes)
            })
    }

    /// Execute `tool` with validated, authorized arguments.
    ///
    /// Process outcomes (non-zero exit, timeout, cancellation, spawn
    /// failure) come back as results. The raw output is left unsanitized.
    ///
    /// # Errors
    ///
    /// Returns [`crate::SandboxError::Backpressure`] when no slot is
    /// available, [`crate::SandboxError::DuplicateExecution`] when the
    /// correlation id is already executing, and
    /// [`crate::SandboxError::Render`] when the arguments do not fill the
    /// tool's templates. None of these spawn a process.
    pub async fn execute(
        &self,
        tool: &Tool,
        args: &Arguments,
        budget: Duration,
        correlation_id: &CorrelationId,
    ) -> SandboxResult<ExecutionResult> {
        let line = tool
            .invocation
            .render(args)
            .map_err(crate::SandboxError::Render)?;
        let budget = budget.min(self.config.max_timeout);

        let token = self.journal.admit(correlation_id)?;
        let admission = Admission {
            journal: &self.journal,
            id: correlation_id,
            settled: false,
        };

        let permit = tokio::select! {
            biased;
            () = token.cancelled() => {
                info!(%correlation_id, tool = %tool.name, "cancelled before start");
                admission.settle(ExecutionState::Cancelled);
                return Ok(cancelled(Duration::ZERO));
            },
            permit = self.limiter.acquire() => match permit {
                Ok(permit) => permit,
                Err(e) => {
                    warn!(%correlation_id, tool = %tool.name, error = %e, "no execution slot");
                    admission.withdraw();
                    return Err(e);
                },
            },
        };

        self.journal.mark_running(correlation_id);
        debug!(
            %correlation_id,
            tool = %tool.name,
            budget_ms = u64::try_from(budget.as_millis()).unwrap_or(u64::MAX),
            "executing"
        );

        let started = Instant::now();
        let output = process::run(
            &line,
            RunLimits {
                budget,
                kill_grace: self.config.kill_grace,
                output_cap: self.output_cap_for(tool),
                env_allowlist: &self.config.env_allowlist,
            },
            &token,
        )
        .await;
        drop(permit);

        let (state, result) = conclude(&line.program, output, budget, started.elapsed());
        info!(
            %correlation_id,
            tool = %tool.name,
            %state,
            exit_code = ?result.exit_code,
            duration_ms = result.duration_ms,
            "execution finished"
        );
        admission.settle(state);
        Ok(result)
    }

    /// Cancel an in-flight execution. Returns whether one was found.
    pub fn cancel(&self, correlation_id: &CorrelationId) -> bool {
        let found = self.journal.cancel(correlation_id);
        if found {
            info!(%correlation_id, "cancellation requested");
        }
        found
    }

    /// Current or last known state of an execution.
    #[must_use]
    pub fn state(&self, correlation_id: &CorrelationId) -> Option<ExecutionState> {
        self.journal.state(correlation_id)
    }

    /// How many times `correlation_id` reached process execution, as far
    /// back as the journal remembers.
    #[must_use]
    pub fn execution_count(&self, correlation_id: &CorrelationId) -> usize {
        self.journal.execution_count(correlation_id)
    }

    /// Executions currently pending or running.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.journal.in_flight()
    }

    /// Free concurrency slots.
    #[must_use]
    pub fn available_slots(&self) -> usize {
        self.limiter.available()
    }

    /// Finished executions, oldest first.
    #[must_use]
    pub fn recent(&self) -> Vec<JournalEntry> {
        self.journal.recent()
    }
}

fn elapsed_ms(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

fn executed(status: ExecutionStatus, output: RunOutput, elapsed: Duration) -> ExecutionResult {
    ExecutionResult {
        status,
        raw_output: output.stdout,
        sanitized_output: String::new(),
        duration_ms: elapsed_ms(elapsed),
        error: None,
        code: None,
        exit_code: None,
        truncated: output.truncated,
        redaction_count: 0,
    }
}

fn cancelled(elapsed: Duration) -> ExecutionResult {
    ExecutionResult::refused(
        ExecutionStatus::Cancelled,
        ErrorCode::ExecutionFailure,
        "execution cancelled",
    )
    .with_duration_ms(elapsed_ms(elapsed))
}

fn stderr_excerpt(stderr: &str) -> &str {
    truncate_to_boundary(stderr.trim(), ERROR_EXCERPT_BYTES)
}

fn conclude(
    program: &str,
    output: RunOutput,
    budget: Duration,
    elapsed: Duration,
) -> (ExecutionState, ExecutionResult) {
    match output.termination {
        Termination::Exited(status) if status.success() => {
            let mut result = executed(ExecutionStatus::Completed, output, elapsed);
            result.exit_code = status.code();
            (ExecutionState::Completed, result)
        },
        Termination::Exited(status) => {
            let code = status.code();
            let detail = stderr_excerpt(&output.stderr).to_owned();
            let message = match (code, detail.is_empty()) {
                (Some(c), true) => format!("process exited with status {c}"),
                (Some(c), false) => format!("process exited with status {c}: {detail}"),
                (None, _) => "process terminated by signal".to_owned(),
            };
            let mut result = executed(ExecutionStatus::Failed, output, elapsed);
            result.exit_code = code;
            result.error = Some(message);
            result.code = Some(ErrorCode::ExecutionFailure);
            (ExecutionState::Failed, result)
        },
        Termination::TimedOut => {
            let mut result = executed(ExecutionStatus::TimedOut, output, elapsed);
            result.error = Some(format!(
                "execution exceeded its {}ms budget",
                budget.as_millis()
            ));
            result.code = Some(ErrorCode::ExecutionTimeout);
            (ExecutionState::TimedOut, result)
        },
        Termination::Cancelled => {
            let mut result = executed(ExecutionStatus::Cancelled, output, elapsed);
            result.error = Some("execution cancelled".to_owned());
            result.code = Some(ErrorCode::ExecutionFailure);
            (ExecutionState::Cancelled, result)
        },
        Termination::SpawnFailed(e) => {
            let result = ExecutionResult::refused(
                ExecutionStatus::Failed,
                ErrorCode::ExecutionFailure,
                format!("failed to start '{program}': {e}"),
            )
            .with_duration_ms(elapsed_ms(elapsed));
            (ExecutionState::Failed, result)
        },
        Termination::WaitFailed(ref e) => {
            let message = format!("failed to wait for '{program}': {e}");
            let mut result = executed(ExecutionStatus::Failed, output, elapsed);
            result.error = Some(message);
            result.code = Some(ErrorCode::ExecutionFailure);
            (ExecutionState::Failed, result)
        },
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::error::SandboxError;
    use serde_json::json;
    use std::sync::Arc;
    use warden_tools::{FieldSpec, InputSchema, Invocation, TIMEOUT_OVERRIDE_FIELD};

    fn tool(name: &str, program: &str, args: &[&str], timeout_secs: u64) -> Tool {
        Tool::new(
            name,
            "",
            InputSchema::new(vec![
                FieldSpec::string("text"),
                FieldSpec::integer(TIMEOUT_OVERRIDE_FIELD),
            ]),
            Duration::from_secs(timeout_secs),
            Invocation::new(program, args, None).unwrap(),
        )
        .unwrap()
    }

    fn args(value: serde_json::Value) -> Arguments {
        value.as_object().cloned().unwrap()
    }

    fn sandbox(max_concurrent: usize) -> Sandbox {
        Sandbox::new(SandboxConfig {
            max_concurrent,
            kill_grace: Duration::from_millis(200),
            env_allowlist: Vec::new(),
            ..SandboxConfig::default()
        })
    }

    #[tokio::test]
    async fn test_completed_execution() {
        let sandbox = sandbox(2);
        let echo = tool("echo", "echo", &["{text}"], 5);
        let id = CorrelationId::from_string("ok-1");
        let result = sandbox
            .execute(&echo, &args(json!({"text": "hi"})), Duration::from_secs(5), &id)
            .await
            .unwrap();
        assert_eq!(result.status, ExecutionStatus::Completed);
        assert_eq!(result.raw_output, "hi\n");
        assert_eq!(result.exit_code, Some(0));
        assert_eq!(sandbox.execution_count(&id), 1);
        assert_eq!(sandbox.state(&id), Some(ExecutionState::Completed));
        assert_eq!(sandbox.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_failed() {
        let sandbox = sandbox(1);
        let fail = tool("fail", "sh", &["-c", "echo boom >&2; exit 3"], 5);
        let result = sandbox
            .execute(&fail, &Arguments::new(), Duration::from_secs(5), &CorrelationId::new())
            .await
            .unwrap();
        assert_eq!(result.status, ExecutionStatus::Failed);
        assert_eq!(result.exit_code, Some(3));
        assert_eq!(result.code, Some(ErrorCode::ExecutionFailure));
        assert!(result.error.unwrap().contains("boom"));
    }

    #[tokio::test]
    async fn test_timeout_reaps_process() {
        let sandbox = sandbox(1);
        let hang = tool("hang", "sleep", &["30"], 5);
        let started = Instant::now();
        let result = sandbox
            .execute(&hang, &Arguments::new(), Duration::from_millis(150), &CorrelationId::new())
            .await
            .unwrap();
        assert_eq!(result.status, ExecutionStatus::TimedOut);
        assert_eq!(result.code, Some(ErrorCode::ExecutionTimeout));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(sandbox.available_slots(), 1);
    }

    #[tokio::test]
    async fn test_budget_is_smallest_limit() {
        let sandbox = Sandbox::new(SandboxConfig {
            max_timeout: Duration::from_secs(20),
            ..SandboxConfig::default()
        });
        let t = tool("t", "true", &[], 30);
        assert_eq!(sandbox.budget_for(&t, &Arguments::new()), Duration::from_secs(20));
        assert_eq!(
            sandbox.budget_for(&t, &args(json!({"timeout_seconds": 3}))),
            Duration::from_secs(3)
        );
    }

    #[tokio::test]
    async fn test_output_cap_uses_smaller_limit() {
        let sandbox = sandbox(1);
        let t = tool("t", "true", &[], 5).with_max_output_bytes(10);
        assert_eq!(sandbox.output_cap_for(&t), 10);
        assert_eq!(sandbox.output_cap_for(&tool("u", "true", &[], 5)), 1024 * 1024);
    }

    #[tokio::test]
    async fn test_cancel_running_execution() {
        let sandbox = Arc::new(sandbox(1));
        let id = CorrelationId::from_string("cancel-me");
        let task = {
            let sandbox = Arc::clone(&sandbox);
            let id = id.clone();
            tokio::spawn(async move {
                let hang = tool("hang", "sleep", &["30"], 60);
                sandbox
                    .execute(&hang, &Arguments::new(), Duration::from_secs(60), &id)
                    .await
            })
        };
        for _ in 0..100 {
            if sandbox.state(&id) == Some(ExecutionState::Running) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(sandbox.cancel(&id));
        let result = task.await.unwrap().unwrap();
        assert_eq!(result.status, ExecutionStatus::Cancelled);
        assert_eq!(sandbox.state(&id), Some(ExecutionState::Cancelled));
        assert!(!sandbox.cancel(&id));
    }

    #[tokio::test]
    async fn test_reject_overflow_is_backpressure() {
        let sandbox = Arc::new(sandbox(1));
        let busy = {
            let sandbox = Arc::clone(&sandbox);
            tokio::spawn(async move {
                let hang = tool("hang", "sleep", &["30"], 60);
                sandbox
                    .execute(
                        &hang,
                        &Arguments::new(),
                        Duration::from_millis(500),
                        &CorrelationId::from_string("busy"),
                    )
                    .await
            })
        };
        while sandbox.available_slots() > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let rejected = CorrelationId::from_string("rejected");
        let err = sandbox
            .execute(
                &tool("echo", "echo", &[], 5),
                &Arguments::new(),
                Duration::from_secs(5),
                &rejected,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::Backpressure(_)));
        assert_eq!(sandbox.execution_count(&rejected), 0);
        assert_eq!(sandbox.state(&rejected), None);

        let busy = busy.await.unwrap().unwrap();
        assert_eq!(busy.status, ExecutionStatus::TimedOut);
    }

    #[tokio::test]
    async fn test_spawn_failure_is_failed() {
        let sandbox = sandbox(1);
        let missing = tool("missing", "/nonexistent/warden-tool", &[], 5);
        let result = sandbox
            .execute(&missing, &Arguments::new(), Duration::from_secs(5), &CorrelationId::new())
            .await
            .unwrap();
        assert_eq!(result.status, ExecutionStatus::Failed);
        assert!(result.error.unwrap().starts_with("failed to start"));
    }
}
