//! Translation between OpenAI request shapes and queue job parameters.

pub mod aspect_ratio;
pub mod prompt;

pub use aspect_ratio::{normalize, AspectRatio};
pub use prompt::{extract, Extraction};
