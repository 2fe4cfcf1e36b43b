use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::models::document::{JobId, JobStatus};
use crate::services::backend::JobStatusBackend;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchConfig {
    pub interval: Duration,
    /// Consecutive failed checks tolerated before giving up (0 = never).
    pub max_consecutive_failures: u32,
}

/// About a minute of failed checks at the default interval.
pub const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 20;

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(3000),
            max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
        }
    }
}

/// One observation of a watched job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobProgress {
    pub job_id: JobId,
    pub status: JobStatus,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Set when this poll could not reach the backend; status is the last known one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probe_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JobOutcome {
    Completed,
    Failed { error_message: Option<String> },
    Cancelled,
    Unreachable { last_error: String },
}

/// Polls one job at a constant interval until it completes or fails.
///
/// The cancellation token exists from construction, so `cancel()` is valid
/// before, during and after `watch()`.
pub struct JobStatusWatcher {
    backend: Arc<dyn JobStatusBackend>,
    job_id: JobId,
    config: WatchConfig,
    token: CancellationToken,
    stopped: AtomicBool,
}

impl JobStatusWatcher {
    pub fn new(backend: Arc<dyn JobStatusBackend>, job_id: JobId, config: WatchConfig) -> Self {
        Self::with_token(backend, job_id, config, CancellationToken::new())
    }

    /// Uses a caller-provided token, e.g. a child of a shutdown token.
    pub fn with_token(
        backend: Arc<dyn JobStatusBackend>,
        job_id: JobId,
        config: WatchConfig,
        token: CancellationToken,
    ) -> Self {
        Self {
            backend,
            job_id,
            config,
            token,
            stopped: AtomicBool::new(false),
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn cancel(&self) {
        self.stop();
    }

    /// Cancels the token the first time it is called; later calls do nothing.
    fn stop(&self) -> bool {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.token.cancel();
        true
    }

    /// Polls until a terminal status, reporting every observation to
    /// `on_progress`.
    pub async fn watch<F>(&self, mut on_progress: F) -> JobOutcome
    where
        F: FnMut(&JobProgress) + Send,
    {
        // interval() panics on a zero period.
        let period = self.config.interval.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut current: Option<JobStatus> = None;
        let mut consecutive_failures = 0u32;

        info!("Watching job {} every {:?}", self.job_id, period);

        loop {
            tokio::select! {
                biased;
                _ = self.token.cancelled() => return self.cancelled(),
                _ = ticker.tick() => {}
            }

            let result = tokio::select! {
                biased;
                _ = self.token.cancelled() => return self.cancelled(),
                result = self.backend.job_status(&self.job_id) => result,
            };

            match result {
                Ok(report) => {
                    consecutive_failures = 0;

                    let status = match current {
                        Some(previous) if !previous.can_advance_to(report.status) => {
                            warn!(
                                "Job {} reported {} after {}, keeping {}",
                                self.job_id,
                                report.status.as_str(),
                                previous.as_str(),
                                previous.as_str()
                            );
                            previous
                        }
                        _ => report.status,
                    };
                    current = Some(status);

                    let error_message = if status == JobStatus::Failed {
                        report.error_message
                    } else {
                        None
                    };

                    debug!("Job {} is {}", self.job_id, status.as_str());
                    on_progress(&JobProgress {
                        job_id: self.job_id.clone(),
                        status,
                        progress: status.progress(),
                        error_message: error_message.clone(),
                        probe_error: None,
                    });

                    if status.is_terminal() {
                        self.stop();
                        info!("Job {} reached {}", self.job_id, status.as_str());
                        return match status {
                            JobStatus::Completed => JobOutcome::Completed,
                            _ => JobOutcome::Failed { error_message },
                        };
                    }
                }
                Err(e) => {
                    consecutive_failures += 1;
                    warn!(
                        "Status check for job {} failed ({} in a row): {}",
                        self.job_id, consecutive_failures, e
                    );

                    let status = current.unwrap_or(JobStatus::Pending);
                    on_progress(&JobProgress {
                        job_id: self.job_id.clone(),
                        status,
                        progress: status.progress(),
                        error_message: None,
                        probe_error: Some(e.to_string()),
                    });

                    let limit = self.config.max_consecutive_failures;
                    if e.is_rejection() || (limit > 0 && consecutive_failures >= limit) {
                        self.stop();
                        return JobOutcome::Unreachable {
                            last_error: e.to_string(),
                        };
                    }
                }
            }
        }
    }

    fn cancelled(&self) -> JobOutcome {
        debug!("Watch of job {} cancelled", self.job_id);
        JobOutcome::Cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::document::JobStatusReport;
    use crate::services::backend::{BackendError, MockJobStatusBackend};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::time::Instant;

    fn scripted(statuses: Vec<Result<JobStatusReport, BackendError>>) -> MockJobStatusBackend {
        let calls = statuses.len();
        let script = Mutex::new(VecDeque::from(statuses));
        let mut backend = MockJobStatusBackend::new();
        backend
            .expect_job_status()
            .withf(|job_id| job_id == "doc-1")
            .times(calls)
            .returning(move |_| script.lock().unwrap().pop_front().unwrap());
        backend
    }

    fn ok(status: JobStatus) -> Result<JobStatusReport, BackendError> {
        Ok(JobStatusReport::new(status))
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_until_completed() {
        let backend = scripted(vec![
            ok(JobStatus::Pending),
            ok(JobStatus::Pending),
            ok(JobStatus::Processing),
            ok(JobStatus::Completed),
        ]);
        let watcher = JobStatusWatcher::new(Arc::new(backend), "doc-1".into(), WatchConfig::default());
        let token = watcher.cancellation_token();

        let started = Instant::now();
        let mut seen = Vec::new();
        let outcome = watcher.watch(|p| seen.push(p.progress)).await;

        assert_eq!(outcome, JobOutcome::Completed);
        assert_eq!(seen, vec![10, 10, 50, 100]);
        assert!(token.is_cancelled());
        // First check is immediate, then one per interval.
        assert_eq!(started.elapsed(), Duration::from_millis(9000));

        // Nothing polls after the terminal status; the mock allows exactly four calls.
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(!watcher.stop());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_surfaces_error_immediately() {
        let backend = scripted(vec![
            ok(JobStatus::Processing),
            Ok(JobStatusReport {
                status: JobStatus::Failed,
                error_message: Some("Could not extract text".to_string()),
            }),
        ]);
        let watcher = JobStatusWatcher::new(Arc::new(backend), "doc-1".into(), WatchConfig::default());

        let mut seen = Vec::new();
        let outcome = watcher.watch(|p| seen.push(p.clone())).await;

        assert_eq!(
            outcome,
            JobOutcome::Failed {
                error_message: Some("Could not extract text".to_string())
            }
        );
        assert_eq!(seen.last().map(|p| p.progress), Some(0));
        assert_eq!(
            seen.last().and_then(|p| p.error_message.clone()),
            Some("Could not extract text".to_string())
        );
        assert!(watcher.is_stopped());
    }

    #[tokio::test(start_paused = true)]
    async fn test_regression_is_ignored() {
        let backend = scripted(vec![
            ok(JobStatus::Processing),
            ok(JobStatus::Pending),
            ok(JobStatus::Completed),
        ]);
        let watcher = JobStatusWatcher::new(Arc::new(backend), "doc-1".into(), WatchConfig::default());

        let mut seen = Vec::new();
        watcher.watch(|p| seen.push(p.status)).await;

        assert_eq!(
            seen,
            vec![JobStatus::Processing, JobStatus::Processing, JobStatus::Completed]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_errors_keep_polling() {
        let backend = scripted(vec![
            ok(JobStatus::Pending),
            Err(BackendError::Transport("connection reset".into())),
            ok(JobStatus::Completed),
        ]);
        let watcher = JobStatusWatcher::new(Arc::new(backend), "doc-1".into(), WatchConfig::default());

        let mut seen = Vec::new();
        let outcome = watcher.watch(|p| seen.push(p.clone())).await;

        assert_eq!(outcome, JobOutcome::Completed);
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[1].status, JobStatus::Pending);
        assert!(seen[1].probe_error.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_consecutive_failures() {
        let backend = scripted(vec![
            Err(BackendError::Transport("refused".into())),
            Err(BackendError::Transport("refused".into())),
        ]);
        let config = WatchConfig {
            max_consecutive_failures: 2,
            ..Default::default()
        };
        let watcher = JobStatusWatcher::new(Arc::new(backend), "doc-1".into(), config);

        let outcome = watcher.watch(|_| {}).await;

        assert!(matches!(outcome, JobOutcome::Unreachable { .. }));
        assert!(watcher.is_stopped());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_job_stops_on_first_check() {
        for status in [404, 400] {
            let backend = scripted(vec![Err(BackendError::Status {
                status,
                body: "Document not found".into(),
            })]);
            let watcher =
                JobStatusWatcher::new(Arc::new(backend), "doc-1".into(), WatchConfig::default());

            let mut seen = Vec::new();
            let outcome = watcher.watch(|p| seen.push(p.clone())).await;

            assert!(matches!(outcome, JobOutcome::Unreachable { .. }));
            assert_eq!(seen.len(), 1);
            assert!(seen[0].probe_error.is_some());
            assert!(watcher.is_stopped());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_config_gives_up_on_dead_backend() {
        let mut backend = MockJobStatusBackend::new();
        backend
            .expect_job_status()
            .times(DEFAULT_MAX_CONSECUTIVE_FAILURES as usize)
            .returning(|_| {
                Err(BackendError::Status {
                    status: 503,
                    body: "unavailable".into(),
                })
            });
        let watcher = JobStatusWatcher::new(Arc::new(backend), "doc-1".into(), WatchConfig::default());

        let outcome = watcher.watch(|_| {}).await;

        assert!(matches!(outcome, JobOutcome::Unreachable { .. }));
        // The mock panics on any call past the limit.
        tokio::time::sleep(Duration::from_secs(3600)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_is_clamped() {
        let backend = scripted(vec![ok(JobStatus::Processing), ok(JobStatus::Completed)]);
        let config = WatchConfig {
            interval: Duration::ZERO,
            ..Default::default()
        };
        let watcher = JobStatusWatcher::new(Arc::new(backend), "doc-1".into(), config);

        assert_eq!(watcher.watch(|_| {}).await, JobOutcome::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_first_check() {
        let mut backend = MockJobStatusBackend::new();
        backend.expect_job_status().times(0);
        let watcher = JobStatusWatcher::new(Arc::new(backend), "doc-1".into(), WatchConfig::default());

        watcher.cancel();
        watcher.cancel();

        assert_eq!(watcher.watch(|_| {}).await, JobOutcome::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_while_waiting_for_next_tick() {
        let backend = scripted(vec![ok(JobStatus::Processing)]);
        let watcher = Arc::new(JobStatusWatcher::new(
            Arc::new(backend),
            "doc-1".into(),
            WatchConfig::default(),
        ));

        let task = {
            let watcher = watcher.clone();
            tokio::spawn(async move { watcher.watch(|_| {}).await })
        };
        tokio::time::sleep(Duration::from_millis(1000)).await;
        watcher.cancel();

        assert_eq!(task.await.unwrap(), JobOutcome::Cancelled);
    }
}
