//! Interface de terminal do tooltip-ocr: barra de progresso e saída colorida.
//!
//! Usa as crates `indicatif` para a barra de progresso e `console` para
//! estilização com cores. O [`BatchProgress`] consome os [`BatchEvent`]s
//! emitidos pelos workers e imprime as linhas de log acima da barra.

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::batch::{BatchEvent, BatchReport, BatchStatus, LogKind};
use crate::output::SavedOutput;

const BAR_TEMPLATE: &str = "{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {elapsed_precise}";

/// Indicador visual do lote em execução.
pub struct BatchProgress {
    pb: ProgressBar,
    green: Style,
    red: Style,
    fatal: Style,
    yellow: Style,
    cyan: Style,
    dim: Style,
}

impl BatchProgress {
    /// Cria a barra para `total` imagens.
    pub fn start(total: usize) -> Self {
        let pb = ProgressBar::new(total as u64);
        pb.set_style(
            ProgressStyle::with_template(BAR_TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        Self::with_bar(pb)
    }

    #[cfg(test)]
    fn hidden() -> Self {
        Self::with_bar(ProgressBar::hidden())
    }

    fn with_bar(pb: ProgressBar) -> Self {
        Self {
            pb,
            green: Style::new().green(),
            red: Style::new().red(),
            fatal: Style::new().red().bold(),
            yellow: Style::new().yellow(),
            cyan: Style::new().cyan(),
            dim: Style::new().dim(),
        }
    }

    /// Consome eventos até todos os remetentes serem descartados.
    pub async fn drive(self, mut rx: UnboundedReceiver<BatchEvent>) -> Self {
        while let Some(event) = rx.recv().await {
            self.handle(event);
        }
        self
    }

    fn handle(&self, event: BatchEvent) {
        match event {
            BatchEvent::Progress { completed, total } => {
                self.pb.set_length(total as u64);
                self.pb.set_position(completed as u64);
            }
            BatchEvent::Log { kind, message } => {
                self.pb.println(self.style_for(kind).apply_to(message).to_string());
            }
        }
    }

    fn style_for(&self, kind: LogKind) -> &Style {
        match kind {
            LogKind::Info => &self.cyan,
            LogKind::Ok => &self.green,
            LogKind::Retry | LogKind::RateLimit => &self.yellow,
            LogKind::Error => &self.red,
            LogKind::Fatal => &self.fatal,
            LogKind::Cancelled => &self.dim,
        }
    }

    /// Finaliza a barra e exibe o resumo do lote.
    pub fn finish(&self, report: &BatchReport) {
        self.pb.finish_and_clear();
        let style = self.status_style(report.status);
        let mark = match report.status {
            BatchStatus::Completed => "✓",
            BatchStatus::Cancelled => "■",
            BatchStatus::AbortedRateLimited | BatchStatus::WorkerFailed => "✗",
        };
        println!(
            "  {} Batch {}: {} ok, {} failed, {} cancelled of {} ({:.1}s)",
            style.apply_to(mark),
            report.status,
            report.succeeded,
            report.failed,
            report.cancelled,
            report.total,
            report.duration_ms as f64 / 1000.0
        );
    }

    /// Informa onde o resultado foi gravado.
    pub fn saved(&self, saved: Option<&SavedOutput>) {
        match saved {
            None => println!(
                "  {} Processing completed (no valid output).",
                self.yellow.apply_to("[done]")
            ),
            Some(out) if out.fell_back => println!(
                "  {} Write blocked in selected folder. Saved to: {}",
                self.yellow.apply_to("⚠"),
                out.path.display()
            ),
            Some(out) => println!(
                "  {} Saved {} item(s) to: {}",
                self.green.apply_to("✓"),
                out.records,
                out.path.display()
            ),
        }
    }

    /// Imprime o relatório do lote em JSON com estilo colorido.
    pub fn print_report(&self, report: &BatchReport) {
        println!();
        println!(
            "{}",
            self.status_style(report.status).apply_to("─── Batch Report ───")
        );
        println!(
            "{}",
            serde_json::to_string_pretty(report).unwrap_or_default()
        );
    }

    fn status_style(&self, status: BatchStatus) -> &Style {
        match status {
            BatchStatus::Completed => &self.green,
            BatchStatus::Cancelled => &self.yellow,
            BatchStatus::AbortedRateLimited | BatchStatus::WorkerFailed => &self.red,
        }
    }
}
