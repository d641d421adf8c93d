use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use crate::batch::{BatchReport, BatchRunConfig, BatchStatus, EventSender, JobScheduler, LogKind, events};
use crate::config::TrackerConfig;
use crate::error::AppError;
use crate::input;
use crate::output::{OutputWriter, SavedOutput};
use crate::ui::BatchProgress;
use crate::vision::{InferenceClient, VisionClient};

/// Exit code for a run cancelled with Ctrl-C.
const EXIT_INTERRUPTED: u8 = 130;

/// What a finished run produced.
#[derive(Debug)]
pub struct RunOutcome {
    pub report: BatchReport,
    pub saved: Option<SavedOutput>,
}

/// Map the batch status to the process exit code.
pub fn exit_code(status: BatchStatus) -> u8 {
    match status {
        BatchStatus::Completed => 0,
        BatchStatus::Cancelled => EXIT_INTERRUPTED,
        BatchStatus::AbortedRateLimited | BatchStatus::WorkerFailed => 1,
    }
}

/// Process every screenshot in `folder` and save the collected tooltips.
///
/// Ctrl-C cancels the batch; texts gathered before the stop are still saved.
pub async fn run_folder(
    config: &TrackerConfig,
    folder: &Path,
    output: Option<&Path>,
    verbose: bool,
) -> Result<RunOutcome> {
    config.validate()?;
    let sources = input::enumerate(folder)?;

    let client = vision_client(config)?;

    let writer = OutputWriter::new(output.unwrap_or(Path::new("")), folder);
    let pipeline = Pipeline {
        client: Arc::new(client),
        batch: config.batch_config(),
        writer,
        verbose,
    };

    let cancel = CancellationToken::new();
    let interrupt = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupt received");
                cancel.cancel();
            }
        }
    });

    let outcome = pipeline.run(sources, cancel).await;
    interrupt.abort();
    outcome
}

fn vision_client(config: &TrackerConfig) -> Result<VisionClient, AppError> {
    Ok(VisionClient::new(
        config.vision_endpoint.clone(),
        config.vision_model.clone(),
        config.api_key.clone(),
        config.request_timeout(),
    )?)
}

/// One configured run: client, batch settings and output destination.
pub struct Pipeline {
    client: Arc<dyn InferenceClient>,
    batch: BatchRunConfig,
    writer: OutputWriter,
    verbose: bool,
}

impl Pipeline {
    /// Run the batch with a live progress bar, then write the results.
    pub async fn run(&self, sources: Vec<PathBuf>, cancel: CancellationToken) -> Result<RunOutcome> {
        let (tx, rx) = events::channel();
        let ui = tokio::spawn(BatchProgress::start(sources.len()).drive(rx));
        let announce = tokio::spawn(announce_stop(cancel.clone(), tx.clone()));

        let scheduler = JobScheduler::new(self.client.clone(), self.batch.clone(), tx);
        let report = scheduler.run(sources, &cancel).await;

        announce.abort();
        // The UI task ends once every sender is gone.
        drop(scheduler);
        let _ = announce.await;
        let progress = ui.await.context("progress display task failed")?;

        progress.finish(&report);
        let saved = self.writer.save(&report.texts)?;
        progress.saved(saved.as_ref());
        if self.verbose {
            progress.print_report(&report);
        }

        Ok(RunOutcome { report, saved })
    }
}

async fn announce_stop(cancel: CancellationToken, events: EventSender) {
    cancel.cancelled().await;
    events.log(LogKind::Info, "[info] Stopping processing...");
}
