mod aggregate;
pub mod classify;
pub mod events;
mod job;
mod rate_limiter;
mod scheduler;
mod state;

pub use events::{BatchEvent, EventSender, LogKind};
pub use job::{BatchOutcome, BatchRunConfig};
pub use scheduler::{BatchReport, BatchStatus, JobScheduler};
