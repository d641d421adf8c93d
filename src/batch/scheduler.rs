use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use super::aggregate::{ResultArena, finalize};
use super::classify::classify;
use super::events::{EventSender, LogKind};
use super::job::{BatchOutcome, BatchRunConfig, Job};
use super::rate_limiter::RateLimiter;
use super::state::{JobMachine, JobState, Step};
use crate::vision::{Extraction, InferenceClient, InferenceError};

/// How a batch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    /// Every job reached a terminal state on its own.
    Completed,
    /// The caller cancelled the run.
    Cancelled,
    /// A job exhausted its rate-limit retries and the run was stopped.
    AbortedRateLimited,
    /// A worker task panicked; the jobs it held are reported as failed.
    WorkerFailed,
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchStatus::Completed => write!(f, "completed"),
            BatchStatus::Cancelled => write!(f, "cancelled"),
            BatchStatus::AbortedRateLimited => write!(f, "aborted: rate limit exceeded"),
            BatchStatus::WorkerFailed => write!(f, "failed: worker crashed"),
        }
    }
}

/// Final result handed back to the caller of [`JobScheduler::run`].
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub run_id: String,
    pub status: BatchStatus,
    /// Non-empty texts in original input order.
    #[serde(skip)]
    pub texts: Vec<String>,
    /// One outcome per input, indexed like the input list.
    #[serde(skip)]
    pub outcomes: Vec<BatchOutcome>,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: i64,
}

impl BatchReport {
    fn new(run_id: String, status: BatchStatus, outcomes: Vec<BatchOutcome>, started_at: DateTime<Utc>) -> Self {
        let finished_at = Utc::now();
        let count = |pred: fn(&BatchOutcome) -> bool| outcomes.iter().filter(|o| pred(o)).count();
        Self {
            run_id,
            status,
            texts: finalize(&outcomes),
            total: outcomes.len(),
            succeeded: count(|o| matches!(o, BatchOutcome::Text(_))),
            failed: count(|o| matches!(o, BatchOutcome::Errored)),
            cancelled: count(|o| matches!(o, BatchOutcome::Cancelled)),
            outcomes,
            started_at,
            finished_at,
            duration_ms: (finished_at - started_at).num_milliseconds(),
        }
    }
}

/// Fixed-size worker pool that drains an ordered list of images.
pub struct JobScheduler {
    client: Arc<dyn InferenceClient>,
    config: BatchRunConfig,
    events: EventSender,
}

impl JobScheduler {
    pub fn new(client: Arc<dyn InferenceClient>, config: BatchRunConfig, events: EventSender) -> Self {
        Self {
            client,
            config,
            events,
        }
    }

    /// Run one batch. The position of each path in `sources` is its job index.
    ///
    /// Cancelling `cancel` stops the batch cooperatively: workers finish the
    /// call they are in (bounded by the per-call timeout) and every job not yet
    /// finished ends as `Cancelled`. A batch-fatal rate-limit stop cancels an
    /// internal child token, so the caller's token is left untouched.
    pub async fn run(&self, sources: Vec<PathBuf>, cancel: &CancellationToken) -> BatchReport {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4().to_string();
        let total = sources.len();

        if total == 0 {
            self.events.log(LogKind::Info, "[!] No images found.");
            return BatchReport::new(run_id, BatchStatus::Completed, Vec::new(), started_at);
        }

        let workers = self.config.workers().min(total);
        let min_gap = self.config.min_gap();
        info!(%run_id, total, workers, min_gap_ms = min_gap.as_millis() as u64, "starting batch");
        self.events
            .log(LogKind::Info, format!("[info] Starting with {workers} worker(s)"));

        let shared = Arc::new(Shared {
            client: self.client.clone(),
            config: self.config.clone(),
            events: self.events.clone(),
            limiter: RateLimiter::new(min_gap, self.config.jitter_max),
            cancel: cancel.child_token(),
            sources,
            next: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            aborted: AtomicBool::new(false),
        });

        let mut set = JoinSet::new();
        for worker in 0..workers {
            let span = info_span!("worker", %run_id, worker);
            set.spawn(shared.clone().work(worker).instrument(span));
        }

        let mut arena = ResultArena::new(total);
        let mut worker_failed = false;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(results) => {
                    for (index, outcome) in results {
                        arena.place(index, outcome);
                    }
                }
                Err(e) => {
                    worker_failed = true;
                    error!(error = %e, "batch worker failed");
                    self.events.log(
                        LogKind::Error,
                        format!("[err] Worker error: {e}; its images are counted as failed"),
                    );
                }
            }
        }

        // Surviving workers drain every index, so slots still empty after a
        // crash belong to the crashed worker.
        let outcomes = if worker_failed {
            arena.into_outcomes_or(BatchOutcome::Errored)
        } else {
            arena.into_outcomes()
        };
        let status = if shared.aborted.load(Ordering::SeqCst) {
            BatchStatus::AbortedRateLimited
        } else if worker_failed {
            BatchStatus::WorkerFailed
        } else if outcomes.contains(&BatchOutcome::Cancelled) {
            BatchStatus::Cancelled
        } else {
            BatchStatus::Completed
        };

        if matches!(status, BatchStatus::Cancelled | BatchStatus::AbortedRateLimited) {
            self.events.log(
                LogKind::Cancelled,
                "[x] Stopped by user or rate limit failure.",
            );
        }

        let report = BatchReport::new(run_id, status, outcomes, started_at);
        info!(
            run_id = %report.run_id,
            %status,
            succeeded = report.succeeded,
            failed = report.failed,
            cancelled = report.cancelled,
            duration_ms = report.duration_ms,
            "batch finished"
        );
        report
    }
}

/// State shared by the workers of one batch.
struct Shared {
    client: Arc<dyn InferenceClient>,
    config: BatchRunConfig,
    events: EventSender,
    limiter: RateLimiter,
    cancel: CancellationToken,
    sources: Vec<PathBuf>,
    /// Next index to claim.
    next: AtomicUsize,
    completed: AtomicUsize,
    aborted: AtomicBool,
}

impl Shared {
    /// Claim jobs in input order until none are left. Once the batch is
    /// cancelled, remaining claims are finalized as `Cancelled` without waiting.
    async fn work(self: Arc<Self>, worker: usize) -> Vec<(usize, BatchOutcome)> {
        let mut results = Vec::new();
        loop {
            let index = self.next.fetch_add(1, Ordering::Relaxed);
            let Some(source) = self.sources.get(index) else {
                break;
            };
            let mut job = Job::new(index, source.clone());
            let outcome = self.process(&mut job).await;
            debug_assert!(job.state.is_terminal());
            debug!(index, history = ?job.state_history, final_state = %job.state, "job finished");
            results.push((index, outcome));
        }
        debug!(worker, jobs = results.len(), "worker done");
        results
    }

    async fn process(&self, job: &mut Job) -> BatchOutcome {
        loop {
            if self.cancel.is_cancelled() {
                return self.cancel_job(job);
            }

            JobMachine::start(job);
            if self.limiter.acquire(&self.cancel).await.is_none() {
                return self.cancel_job(job);
            }

            debug!(index = job.index, file = %job.source.display(), "calling inference endpoint");
            let result = tokio::time::timeout(
                self.config.per_call_timeout,
                self.client.extract(&job.source),
            )
            .await
            .unwrap_or(Err(InferenceError::Timeout));

            let err = match result {
                Ok(extraction) => return self.succeed(job, extraction),
                Err(err) => err,
            };

            match JobMachine::fail(job, classify(&err), &self.config) {
                Step::Backoff { state, delay } => {
                    self.log_backoff(job, state, delay, &err);
                    if !sleep_or_cancel(delay, &self.cancel).await {
                        return self.cancel_job(job);
                    }
                }
                Step::Finish(outcome) => {
                    self.log_failure(job, &err);
                    self.mark_completed();
                    return outcome;
                }
                Step::AbortBatch => {
                    error!(index = job.index, file = %job.source.display(), error = %err, "rate limit retries exhausted, stopping batch");
                    self.events.log(
                        LogKind::Fatal,
                        format!(
                            "[FATAL] {} -> Max rate limit retries exceeded. Stopping process.",
                            job.name()
                        ),
                    );
                    self.aborted.store(true, Ordering::SeqCst);
                    self.cancel.cancel();
                    return BatchOutcome::Errored;
                }
            }
        }
    }

    fn succeed(&self, job: &mut Job, extraction: Extraction) -> BatchOutcome {
        let name = job.name();
        let chars = extraction.text.chars().count();
        let detail = match &extraction.category {
            Some(category) => format!("{chars} chars, {category}"),
            None => format!("{chars} chars"),
        };
        self.events.log(LogKind::Ok, format!("[ok] {name} ({detail})"));
        if let Some(usage) = &extraction.usage {
            let show = |v: Option<u32>| v.map_or_else(|| "?".to_string(), |n| n.to_string());
            self.events.log(
                LogKind::Info,
                format!(
                    "    ↳ tokens: prompt={}, completion={}, total={}",
                    show(usage.prompt_tokens),
                    show(usage.completion_tokens),
                    show(usage.total_tokens)
                ),
            );
        }
        debug!(index = job.index, chars, "job succeeded");

        let outcome = JobMachine::succeed(job, extraction.text);
        self.mark_completed();
        outcome
    }

    fn cancel_job(&self, job: &mut Job) -> BatchOutcome {
        debug!(index = job.index, from = %job.state, "job cancelled");
        self.events
            .log(LogKind::Cancelled, format!("[x] {} cancelled", job.name()));
        JobMachine::cancel(job)
    }

    fn log_backoff(&self, job: &Job, state: JobState, delay: Duration, err: &InferenceError) {
        let name = job.name();
        let wait = format_delay(delay);
        if state == JobState::RateLimitBackoff {
            warn!(index = job.index, retry = job.rate_limit_retry_count, delay_ms = delay.as_millis() as u64, "rate limited");
            self.events.log(
                LogKind::RateLimit,
                format!(
                    "[rate limit] {name} -> Waiting {wait} before retry {}/{}",
                    job.rate_limit_retry_count, self.config.max_rate_limit_retries
                ),
            );
        } else {
            warn!(index = job.index, attempt = job.attempt_count, delay_ms = delay.as_millis() as u64, error = %err, "transient failure");
            self.events.log(
                LogKind::Retry,
                format!(
                    "[retry] {name} -> {err}; retry {}/{} in {wait}",
                    job.attempt_count, self.config.max_transient_retries
                ),
            );
        }
    }

    fn log_failure(&self, job: &Job, err: &InferenceError) {
        let name = job.name();
        let mut line = format!("[err] {name} -> {err}");
        if job.attempt_count > self.config.max_transient_retries {
            line.push_str(&format!(" (gave up after {} retries)", self.config.max_transient_retries));
        }
        if let Some(raw) = err.raw_response() {
            warn!(index = job.index, error = %err, raw = %raw, "job failed");
            line.push_str(&format!("\n    ↳ raw response: {}", truncate(raw, 500)));
        } else {
            warn!(index = job.index, error = %err, "job failed");
        }
        self.events.log(LogKind::Error, line);
    }

    fn mark_completed(&self) {
        let done = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
        self.events.progress(done, self.sources.len());
    }
}

/// Sleep for `delay`, waking early if the batch is cancelled. Returns `false` on cancellation.
async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => true,
        _ = cancel.cancelled() => false,
    }
}

fn format_delay(delay: Duration) -> String {
    if delay < Duration::from_secs(1) {
        format!("{}ms", delay.as_millis())
    } else {
        format!("{:.1}s", delay.as_secs_f64())
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}…", &s[..cut]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::events::{self, BatchEvent};
    use async_trait::async_trait;
    use std::path::Path;
    use tokio::time::Instant;

    type Respond = Box<dyn Fn(&Path, usize) -> Result<Extraction, InferenceError> + Send + Sync>;
    type Delay = Box<dyn Fn(&Path) -> Duration + Send + Sync>;

    struct StubClient {
        calls: AtomicUsize,
        respond: Respond,
        delay: Delay,
    }

    impl StubClient {
        fn new(
            respond: impl Fn(&Path, usize) -> Result<Extraction, InferenceError> + Send + Sync + 'static,
        ) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                respond: Box::new(respond),
                delay: Box::new(|_| Duration::ZERO),
            }
        }

        fn with_delay(mut self, delay: impl Fn(&Path) -> Duration + Send + Sync + 'static) -> Self {
            self.delay = Box::new(delay);
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl InferenceClient for StubClient {
        async fn extract(&self, source: &Path) -> Result<Extraction, InferenceError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let delay = (self.delay)(source);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            (self.respond)(source, n)
        }
    }

    fn stem(path: &Path) -> String {
        path.file_stem().unwrap().to_string_lossy().into_owned()
    }

    fn paths(n: usize) -> Vec<PathBuf> {
        (0..n).map(|i| PathBuf::from(format!("shots/img_{i:03}.png"))).collect()
    }

    fn fast_config(concurrency: usize) -> BatchRunConfig {
        BatchRunConfig {
            concurrency,
            requests_per_minute: 600_000,
            jitter_max: Duration::ZERO,
            max_transient_retries: 3,
            transient_backoff: Duration::from_secs(1),
            max_rate_limit_retries: 2,
            rate_limit_backoff: Duration::from_secs(5),
            rate_limit_backoff_cap: Duration::from_secs(60),
            per_call_timeout: Duration::from_secs(30),
        }
    }

    fn drain(rx: &mut tokio::sync::mpsc::UnboundedReceiver<BatchEvent>) -> Vec<BatchEvent> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev);
        }
        out
    }

    fn count_logs(events: &[BatchEvent], wanted: LogKind) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, BatchEvent::Log { kind, .. } if *kind == wanted))
            .count()
    }

    async fn run_with(
        client: Arc<StubClient>,
        config: BatchRunConfig,
        sources: Vec<PathBuf>,
    ) -> (BatchReport, Vec<BatchEvent>) {
        let (tx, mut rx) = events::channel();
        let scheduler = JobScheduler::new(client, config, tx);
        let report = scheduler.run(sources, &CancellationToken::new()).await;
        drop(scheduler);
        (report, drain(&mut rx))
    }

    #[tokio::test(start_paused = true)]
    async fn output_follows_input_order_for_any_pool_size() {
        let n = 25;
        let expected: Vec<String> = paths(n).iter().map(|p| stem(p)).collect();

        for concurrency in [1, 2, 4, 7, 10] {
            // Later inputs finish first.
            let client = Arc::new(
                StubClient::new(|p, _| Ok(Extraction::text(stem(p)))).with_delay(|p| {
                    let idx: u64 = stem(p)[4..].parse().unwrap();
                    Duration::from_millis(10 * (30 - idx))
                }),
            );
            let (report, _) = run_with(client.clone(), fast_config(concurrency), paths(n)).await;
            assert_eq!(report.status, BatchStatus::Completed);
            assert_eq!(report.texts, expected, "concurrency {concurrency}");
            assert_eq!(client.calls(), n);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn same_output_with_one_or_ten_workers() {
        let make = || Arc::new(StubClient::new(|p, _| Ok(Extraction::text(format!("text of {}", stem(p))))));
        let (one, _) = run_with(make(), fast_config(1), paths(12)).await;
        let (ten, _) = run_with(make(), fast_config(10), paths(12)).await;
        assert_eq!(one.texts, ten.texts);
        assert_eq!(one.outcomes, ten.outcomes);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_input_creates_no_jobs() {
        let client = Arc::new(StubClient::new(|_, _| Ok(Extraction::text("never"))));
        let (report, events) = run_with(client.clone(), fast_config(4), Vec::new()).await;
        assert_eq!(report.status, BatchStatus::Completed);
        assert!(report.texts.is_empty());
        assert_eq!(report.total, 0);
        assert_eq!(client.calls(), 0);
        assert!(!events.iter().any(|e| matches!(e, BatchEvent::Progress { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_text_results_are_dropped() {
        let client = Arc::new(StubClient::new(|p, _| {
            let text = match stem(p).as_str() {
                "a" => "A",
                "b" => "",
                _ => "C",
            };
            Ok(Extraction::text(text))
        }));
        let sources = ["a.png", "b.png", "c.png"].map(PathBuf::from).to_vec();
        let (report, events) = run_with(client, fast_config(3), sources).await;
        assert_eq!(report.texts, vec!["A", "C"]);
        assert_eq!(report.succeeded, 3);
        assert_eq!(report.failed, 0);

        let last_progress = events.iter().rev().find_map(|e| match e {
            BatchEvent::Progress { completed, total } => Some((*completed, *total)),
            _ => None,
        });
        assert_eq!(last_progress, Some((3, 3)));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_recover() {
        let client = Arc::new(StubClient::new(|_, n| {
            if n < 2 {
                Err(InferenceError::Network("connection reset by peer".into()))
            } else {
                Ok(Extraction::text("Zod Rune"))
            }
        }));
        let (report, events) = run_with(client.clone(), fast_config(1), paths(1)).await;
        assert_eq!(report.status, BatchStatus::Completed);
        assert_eq!(report.texts, vec!["Zod Rune"]);
        assert_eq!(client.calls(), 3);
        assert_eq!(count_logs(&events, LogKind::Retry), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_retries_exhausted_fail_only_that_item() {
        let client = Arc::new(StubClient::new(|p, _| {
            if stem(p) == "img_000" {
                Err(InferenceError::Http {
                    status: 500,
                    body: "boom".into(),
                })
            } else {
                Ok(Extraction::text(stem(p)))
            }
        }));
        let mut config = fast_config(1);
        config.max_transient_retries = 2;
        let (report, events) = run_with(client.clone(), config, paths(3)).await;
        assert_eq!(report.status, BatchStatus::Completed);
        assert_eq!(report.texts, vec!["img_001", "img_002"]);
        assert_eq!(report.failed, 1);
        assert_eq!(client.calls(), 3 + 2);
        assert_eq!(count_logs(&events, LogKind::Error), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_rate_limiting_aborts_batch() {
        let client = Arc::new(StubClient::new(|_, _| {
            Err(InferenceError::RateLimited { retry_after: None })
        }));
        let (report, events) = run_with(client.clone(), fast_config(1), paths(3)).await;
        assert_eq!(report.status, BatchStatus::AbortedRateLimited);
        assert!(report.texts.is_empty());
        assert_eq!(client.calls(), 3);
        assert_eq!(count_logs(&events, LogKind::RateLimit), 2);
        assert_eq!(count_logs(&events, LogKind::Fatal), 1);
        assert_eq!(
            report.outcomes,
            vec![
                BatchOutcome::Errored,
                BatchOutcome::Cancelled,
                BatchOutcome::Cancelled
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn abort_keeps_results_finished_before_it() {
        let client = Arc::new(StubClient::new(|p, _| match stem(p).as_str() {
            "img_000" => Ok(Extraction::text("Shako")),
            _ => Err(InferenceError::RateLimited { retry_after: None }),
        }));
        let (report, _) = run_with(client, fast_config(1), paths(3)).await;
        assert_eq!(report.status, BatchStatus::AbortedRateLimited);
        assert_eq!(report.texts, vec!["Shako"]);
        assert_eq!(report.outcomes[2], BatchOutcome::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_backoff_wakes_worker_early() {
        let client = Arc::new(StubClient::new(|_, _| {
            Err(InferenceError::Network("connection refused".into()))
        }));
        let mut config = fast_config(1);
        config.transient_backoff = Duration::from_secs(5);

        let scheduler = JobScheduler::new(client.clone(), config, EventSender::disabled());
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        let report = scheduler.run(paths(1), &cancel).await;
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(report.status, BatchStatus::Cancelled);
        assert_eq!(report.outcomes, vec![BatchOutcome::Cancelled]);
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_before_start_never_calls_client() {
        let client = Arc::new(StubClient::new(|_, _| Ok(Extraction::text("x"))));
        let scheduler = JobScheduler::new(client.clone(), fast_config(4), EventSender::disabled());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = scheduler.run(paths(5), &cancel).await;
        assert_eq!(report.status, BatchStatus::Cancelled);
        assert_eq!(report.cancelled, 5);
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_stop_leaves_caller_token_alone() {
        let client = Arc::new(StubClient::new(|_, _| {
            Err(InferenceError::RateLimited { retry_after: None })
        }));
        let scheduler = JobScheduler::new(client, fast_config(1), EventSender::disabled());
        let cancel = CancellationToken::new();
        let report = scheduler.run(paths(2), &cancel).await;
        assert_eq!(report.status, BatchStatus::AbortedRateLimited);
        assert!(!cancel.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_response_is_not_retried() {
        let client = Arc::new(StubClient::new(|_, _| {
            Err(InferenceError::MalformedResponse {
                reason: "response has no choices".into(),
                raw: r#"{"choices":[]}"#.into(),
            })
        }));
        let (report, events) = run_with(client.clone(), fast_config(1), paths(1)).await;
        assert_eq!(client.calls(), 1);
        assert_eq!(report.failed, 1);
        let logged_raw = events.iter().any(|e| {
            matches!(e, BatchEvent::Log { kind: LogKind::Error, message } if message.contains(r#"{"choices":[]}"#))
        });
        assert!(logged_raw);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_call_hits_per_call_timeout() {
        let client = Arc::new(
            StubClient::new(|_, _| Ok(Extraction::text("too late")))
                .with_delay(|_| Duration::from_secs(600)),
        );
        let mut config = fast_config(1);
        config.per_call_timeout = Duration::from_secs(2);
        config.max_transient_retries = 0;

        let start = Instant::now();
        let (report, _) = run_with(client.clone(), config, paths(1)).await;
        assert!(start.elapsed() < Duration::from_secs(10));
        assert_eq!(report.outcomes, vec![BatchOutcome::Errored]);
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn calls_are_spaced_by_rate_limit() {
        let client = Arc::new(StubClient::new(|p, _| Ok(Extraction::text(stem(p)))));
        let mut config = fast_config(1);
        config.requests_per_minute = 60;

        let start = Instant::now();
        let (report, _) = run_with(client, config, paths(3)).await;
        assert_eq!(report.texts.len(), 3);
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_worker_fails_the_batch_instead_of_cancelling() {
        let client = Arc::new(StubClient::new(|p, _| {
            if stem(p) == "img_001" {
                panic!("decoder exploded");
            }
            Ok(Extraction::text(stem(p)))
        }));
        let (report, events) = run_with(client.clone(), fast_config(2), paths(4)).await;

        assert_eq!(report.status, BatchStatus::WorkerFailed);
        assert_eq!(report.outcomes[1], BatchOutcome::Errored);
        assert_eq!(report.cancelled, 0);
        assert_eq!(client.calls(), 4);
        assert!(report.texts.contains(&"img_003".to_string()));
        assert_eq!(count_logs(&events, LogKind::Error), 1);
        assert_eq!(count_logs(&events, LogKind::Cancelled), 0);
    }

    #[test]
    fn status_display_distinguishes_abort() {
        assert_eq!(BatchStatus::Completed.to_string(), "completed");
        assert_eq!(
            BatchStatus::AbortedRateLimited.to_string(),
            "aborted: rate limit exceeded"
        );
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("ÄÖÜ", 2), "ÄÖ…");
        assert_eq!(truncate("short", 10), "short");
    }
}
