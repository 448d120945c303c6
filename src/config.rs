use std::env;
use std::time::Duration;

use crate::error::{GatewayError, Result};

pub const DEFAULT_QUEUE_BASE_URL: &str = "https://queue.fal.run";

#[derive(Debug, Clone)]
pub struct PollConfig {
    pub max_attempts: u32,
    pub interval: Duration,
    /// Number of trailing attempts in which a 5xx status check is fatal.
    pub escalation_window: u32,
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    pub access_key: Option<String>,
    pub fal_api_key: Option<String>,
    pub queue_base_url: String,
    pub default_model: Option<String>,
    pub poll: PollConfig,
}

impl Default for PollConfig {
    fn default() -> Self {
        PollConfig {
            max_attempts: 45,
            interval: Duration::from_millis(2000),
            escalation_window: 4,
        }
    }
}

impl PollConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Self {
        let defaults = Self::default();
        let max_attempts = env::var("FAL_POLL_MAX_ATTEMPTS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.max_attempts);
        let interval = env::var("FAL_POLL_INTERVAL_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.interval);
        let escalation_window = env::var("FAL_POLL_ESCALATION_WINDOW")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.escalation_window);

        PollConfig {
            max_attempts,
            interval,
            escalation_window,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_escalation_window(mut self, window: u32) -> Self {
        self.escalation_window = window;
        self
    }

    /// Whether a 1-based attempt number falls inside the escalation window.
    pub fn in_escalation_window(&self, attempt: u32) -> bool {
        attempt > self.max_attempts.saturating_sub(self.escalation_window)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig {
            host: "127.0.0.1".to_string(),
            port: 8080,
            access_key: None,
            fal_api_key: None,
            queue_base_url: DEFAULT_QUEUE_BASE_URL.to_string(),
            default_model: None,
            poll: PollConfig::default(),
        }
    }
}

impl GatewayConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Self {
        let defaults = Self::default();
        let host = env::var("HOST").unwrap_or(defaults.host);
        let port = env::var("PORT")
            .ok()
            .and_then(|port| port.parse().ok())
            .unwrap_or(defaults.port);
        let access_key = env::var("WORKER_ACCESS_KEY").ok().filter(|s| !s.is_empty());
        let fal_api_key = env::var("FAL_API_KEY").ok().filter(|s| !s.is_empty());
        let queue_base_url = env::var("FAL_QUEUE_BASE_URL").unwrap_or(defaults.queue_base_url);
        let default_model = env::var("DEFAULT_MODEL").ok().filter(|s| !s.is_empty());

        GatewayConfig {
            host,
            port,
            access_key,
            fal_api_key,
            queue_base_url,
            default_model,
            poll: PollConfig::from_env(),
        }
    }

    pub fn with_access_key(mut self, key: impl Into<String>) -> Self {
        self.access_key = Some(key.into());
        self
    }

    pub fn with_fal_api_key(mut self, key: impl Into<String>) -> Self {
        self.fal_api_key = Some(key.into());
        self
    }

    pub fn with_queue_base_url(mut self, url: impl Into<String>) -> Self {
        self.queue_base_url = url.into();
        self
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    pub fn require_access_key(&self) -> Result<&str> {
        self.access_key
            .as_deref()
            .ok_or_else(|| GatewayError::Config("Worker access key not configured.".into()))
    }

    pub fn require_fal_api_key(&self) -> Result<&str> {
        self.fal_api_key
            .as_deref()
            .ok_or_else(|| GatewayError::Config("FAL_API_KEY is not configured.".into()))
    }
}
