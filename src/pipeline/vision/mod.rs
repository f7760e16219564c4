//! AI vision extraction over label images.
//!
//! Sends label photos to a hosted generative vision model and parses its
//! structured JSON reply into the same extraction shape the local text
//! path produces, so the reconciler can merge the two sources
//! symmetrically.
//!
//! Failure philosophy: only genuine infrastructure problems (missing
//! credentials, every candidate model exhausted on a mandatory call)
//! surface as errors. A malformed or empty model reply is "no answer",
//! and best-effort paths fold every failure into `Ok(None)`.

pub mod client;
pub mod extractor;
pub mod parser;
pub mod prompt;
pub mod types;

pub use client::{GeminiClient, GenerativeClient, MockGenerativeClient};
pub use extractor::VisionExtractor;
pub use types::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VisionError {
    #[error("GEMINI_API_KEY is not set")]
    MissingApiKey,

    #[error("model {model} returned status {status}: {body}")]
    Api {
        model: String,
        status: u16,
        body: String,
    },

    #[error("HTTP transport error: {0}")]
    Transport(String),

    #[error("every candidate model failed: {attempts}")]
    AllModelsFailed { attempts: String },
}
