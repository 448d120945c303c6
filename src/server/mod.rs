//! HTTP surface: OpenAI-shaped routes over the fal.ai queue.

pub mod assembler;
pub mod auth;
pub mod handlers;
pub mod tasks;

use std::sync::Arc;

use actix_web::body::MessageBody;
use actix_web::dev::{ServiceFactory, ServiceRequest, ServiceResponse};
use actix_web::{middleware, web, App, HttpServer};

use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};
use crate::fal::{HttpQueueTransport, JobEngine, ModelRegistry};

pub use tasks::BackgroundTasks;

/// Shared by every worker.
pub struct AppState {
    pub config: GatewayConfig,
    pub registry: ModelRegistry,
    pub tasks: BackgroundTasks,
    engine: Option<JobEngine>,
}

impl AppState {
    /// The engine is only built when an API key is configured; requests are
    /// refused with a configuration error otherwise.
    pub fn new(config: GatewayConfig, registry: ModelRegistry, tasks: BackgroundTasks) -> Self {
        let engine = config.fal_api_key.as_ref().map(|key| {
            JobEngine::new(
                Arc::new(HttpQueueTransport::new(key.clone())),
                config.poll.clone(),
            )
        });
        Self {
            config,
            registry,
            tasks,
            engine,
        }
    }

    pub fn with_engine(mut self, engine: JobEngine) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn engine(&self) -> Result<&JobEngine> {
        self.engine
            .as_ref()
            .ok_or_else(|| GatewayError::Config("FAL_API_KEY is not configured.".into()))
    }
}

pub fn build_app(
    state: web::Data<AppState>,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = ServiceResponse<impl MessageBody>,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    App::new()
        .app_data(state)
        .wrap(middleware::from_fn(auth::require_bearer))
        .route("/v1/images/generations", web::post().to(handlers::image_generations))
        .route("/v1/chat/completions", web::post().to(handlers::chat_completions))
        .route("/v1/models", web::get().to(handlers::list_models))
        .default_service(web::to(handlers::not_found))
}

/// Serves until shutdown, then waits for detached stream producers.
pub async fn run(config: GatewayConfig, registry: ModelRegistry) -> std::io::Result<()> {
    let tasks = BackgroundTasks::current();
    let bind = (config.host.clone(), config.port);
    let state = web::Data::new(AppState::new(config, registry, tasks.clone()));

    HttpServer::new(move || build_app(state.clone()))
        .bind(bind)?
        .run()
        .await?;

    tasks.drain().await;
    log::info!("👋 Gateway stopped");
    Ok(())
}
