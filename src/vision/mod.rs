pub mod client;
pub mod error;
pub mod types;

use std::path::Path;

use async_trait::async_trait;

pub use client::VisionClient;
pub use error::InferenceError;
pub use types::Usage;

/// Text extracted from one image, plus whatever the provider reported about the call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    pub text: String,
    /// Tooltip category parsed from the model output, if any.
    pub category: Option<String>,
    pub usage: Option<Usage>,
}

impl Extraction {
    #[cfg(test)]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// Performs one image → text call. Shared across batch workers, so it must be `Send + Sync`.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn extract(&self, source: &Path) -> Result<Extraction, InferenceError>;
}
