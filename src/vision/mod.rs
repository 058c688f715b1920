//! Vision classifier adapter and verdict normalization.

mod gemini;
mod prompt;
mod verdict;

use async_trait::async_trait;

use crate::error::AdapterError;

pub use gemini::GeminiClassifier;
pub use prompt::occupancy_prompt;
pub use verdict::{normalize, parse_verdict, Verdict};

/// Unparsed classifier reply, kept verbatim for the audit trail.
#[derive(Debug, Clone, PartialEq)]
pub struct RawVerdict {
    pub text: String,
}

#[async_trait]
pub trait VisionClassifier: Send + Sync {
    async fn classify(
        &self,
        image: &[u8],
        mime_type: &str,
        prompt: &str,
    ) -> Result<RawVerdict, AdapterError>;
}
