//! Progress and log notifications emitted by batch workers.
//!
//! Workers push [`BatchEvent`]s into an unbounded channel so a slow listener
//! never blocks them. A closed or disabled channel drops events silently.

use tokio::sync::mpsc;

/// Kind of a human-readable log line; the terminal UI picks a colour per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    Info,
    Ok,
    Retry,
    RateLimit,
    Error,
    Fatal,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchEvent {
    Progress { completed: usize, total: usize },
    Log { kind: LogKind, message: String },
}

/// Cloneable handle workers use to report progress and log lines.
#[derive(Debug, Clone, Default)]
pub struct EventSender {
    tx: Option<mpsc::UnboundedSender<BatchEvent>>,
}

impl EventSender {
    /// A sender that drops everything.
    #[cfg(test)]
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn progress(&self, completed: usize, total: usize) {
        self.send(BatchEvent::Progress { completed, total });
    }

    pub fn log(&self, kind: LogKind, message: impl Into<String>) {
        self.send(BatchEvent::Log {
            kind,
            message: message.into(),
        });
    }

    fn send(&self, event: BatchEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}

pub fn channel() -> (EventSender, mpsc::UnboundedReceiver<BatchEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender { tx: Some(tx) }, rx)
}
