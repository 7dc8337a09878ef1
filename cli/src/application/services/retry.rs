//! Retry policies applied by the remote operation executor.
//!
//! Exactly one policy governs each call site. Poll policies only wrap work
//! that is safe to repeat; create and upload never run under them.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::application::services::session::Timeouts;
use crate::domain::{CloudError, DeployError, TransientSignature};

/// How the executor reacts to a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryPolicy {
    /// Surface the first failure.
    NoRetry,
    /// Re-login once on 401/403 and run the work one more time.
    #[default]
    AuthRetry,
    /// Re-run the work while it fails with `signature`, until `timeout`.
    PollRetry {
        signature: TransientSignature,
        interval: Duration,
        timeout: Duration,
    },
}

impl RetryPolicy {
    /// Staging-aware policy with the default request timeout.
    #[must_use]
    pub fn staging(timeouts: &Timeouts) -> Self {
        Self::staging_within(timeouts, timeouts.request)
    }

    /// Staging-aware policy with a call-site timeout.
    #[must_use]
    pub fn staging_within(timeouts: &Timeouts, timeout: Duration) -> Self {
        Self::PollRetry {
            signature: TransientSignature::StagingNotFinished,
            interval: timeouts.poll_interval,
            timeout,
        }
    }

    /// Policy for configuration changes that race a stop or start.
    #[must_use]
    pub fn stopped_state(timeouts: &Timeouts) -> Self {
        Self::PollRetry {
            signature: TransientSignature::AppStopped,
            interval: timeouts.poll_interval,
            timeout: timeouts.request,
        }
    }
}

/// Decision after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Next {
    Relogin,
    Wait(Duration),
    Fail,
}

/// Per-invocation retry bookkeeping. Never persisted.
#[derive(Debug)]
pub struct RetryContext {
    pub label: String,
    policy: RetryPolicy,
    deadline: Option<Instant>,
    pub attempts: u32,
    relogged: bool,
}

impl RetryContext {
    #[must_use]
    pub fn new(label: &str, policy: RetryPolicy) -> Self {
        let deadline = match policy {
            RetryPolicy::PollRetry { timeout, .. } => Some(Instant::now() + timeout),
            _ => None,
        };
        Self {
            label: label.to_string(),
            policy,
            deadline,
            attempts: 0,
            relogged: false,
        }
    }

    /// Decide what to do about `err` from the latest attempt.
    ///
    /// Poll policies keep waiting until the deadline has passed, so a call
    /// that never recovers fails at or after its timeout, never before.
    pub fn next(&mut self, err: &CloudError) -> Next {
        match self.policy {
            RetryPolicy::NoRetry => Next::Fail,
            RetryPolicy::AuthRetry => {
                if err.is_auth_failure() && !self.relogged {
                    self.relogged = true;
                    Next::Relogin
                } else {
                    Next::Fail
                }
            }
            RetryPolicy::PollRetry {
                signature,
                interval,
                ..
            } => {
                let Some(deadline) = self.deadline else {
                    return Next::Fail;
                };
                let now = Instant::now();
                if !signature.matches(err) || now >= deadline {
                    return Next::Fail;
                }
                Next::Wait(interval.min(deadline - now))
            }
        }
    }
}

/// Sleep for `duration` unless `cancel` fires first.
///
/// # Errors
///
/// Returns `DeployError::Canceled` when canceled.
pub async fn sleep_or_cancel(
    duration: Duration,
    cancel: &CancellationToken,
) -> Result<(), DeployError> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(DeployError::Canceled),
        () = tokio::time::sleep(duration) => Ok(()),
    }
}
