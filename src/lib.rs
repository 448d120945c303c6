//! OpenAI-compatible image generation gateway backed by the fal.ai queue API.

pub mod config;
pub mod error;
pub mod fal;
pub mod logger;
pub mod models;
pub mod server;
pub mod translate;

pub use config::{GatewayConfig, PollConfig};
pub use error::{GatewayError, Result};
pub use fal::{JobEngine, ModelBinding, ModelRegistry, QueueTransport};
pub use server::{build_app, AppState, BackgroundTasks};
