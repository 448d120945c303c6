use crate::config::{GatewayConfig, DEFAULT_QUEUE_BASE_URL};
use crate::error::{GatewayError, Result};

pub const DEFAULT_MODEL_ID: &str = "imagen4-preview";

/// Everything needed to drive one client-facing model on the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelBinding {
    pub client_id: String,
    pub submit_endpoint: String,
    pub status_endpoint_base: String,
    pub display_name: String,
}

struct BuiltinModel {
    client_id: &'static str,
    submit_path: &'static str,
    status_path: &'static str,
    display_name: &'static str,
}

const BUILTIN_MODELS: [BuiltinModel; 2] = [
    BuiltinModel {
        client_id: "imagen4-preview",
        submit_path: "/fal-ai/imagen4/preview",
        status_path: "/fal-ai/imagen4",
        display_name: "Imagen4 Preview",
    },
    BuiltinModel {
        client_id: "flux-1.1-pro-ultra",
        submit_path: "/fal-ai/flux-pro/v1.1-ultra",
        status_path: "/fal-ai/flux-pro",
        display_name: "flux-1.1-pro-ultra",
    },
];

/// Fixed client id → binding table. Built once at startup, read-only afterwards.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    bindings: Vec<ModelBinding>,
    default_id: String,
}

impl ModelRegistry {
    pub fn new(bindings: Vec<ModelBinding>, default_id: impl Into<String>) -> Result<Self> {
        let default_id = default_id.into();
        if !bindings.iter().any(|b| b.client_id == default_id) {
            return Err(GatewayError::Config(format!(
                "Default model '{}' is not in the model table",
                default_id
            )));
        }
        Ok(Self {
            bindings,
            default_id,
        })
    }

    pub fn builtin() -> Self {
        Self::with_base_url(DEFAULT_QUEUE_BASE_URL)
    }

    /// Built-in models addressed against another queue host.
    pub fn with_base_url(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        let bindings = BUILTIN_MODELS
            .iter()
            .map(|model| ModelBinding {
                client_id: model.client_id.to_string(),
                submit_endpoint: format!("{}{}", base, model.submit_path),
                status_endpoint_base: format!("{}{}", base, model.status_path),
                display_name: model.display_name.to_string(),
            })
            .collect();
        Self {
            bindings,
            default_id: DEFAULT_MODEL_ID.to_string(),
        }
    }

    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        let registry = Self::with_base_url(&config.queue_base_url);
        match &config.default_model {
            Some(default_id) => Self::new(registry.bindings, default_id.clone()),
            None => Ok(registry),
        }
    }

    pub fn default_id(&self) -> &str {
        &self.default_id
    }

    pub fn list(&self) -> &[ModelBinding] {
        &self.bindings
    }

    pub fn supported_ids(&self) -> Vec<&str> {
        self.bindings.iter().map(|b| b.client_id.as_str()).collect()
    }

    pub fn resolve(&self, requested: Option<&str>) -> Result<&ModelBinding> {
        let client_id: &str = match requested.filter(|id| !id.is_empty()) {
            Some(id) => id,
            None => {
                log::info!("No model specified in request, defaulting to {}", self.default_id);
                self.default_id.as_str()
            }
        };

        self.bindings
            .iter()
            .find(|b| b.client_id == client_id)
            .ok_or_else(|| {
                GatewayError::InvalidRequest(format!(
                    "Unsupported model: {}. Supported models are: {}",
                    client_id,
                    self.supported_ids().join(", ")
                ))
            })
    }
}
