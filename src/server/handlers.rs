use actix_web::{http::StatusCode, web, HttpResponse};
use serde::de::DeserializeOwned;

use crate::error::{GatewayError, Result};
use crate::fal::{JobEngine, ModelBinding};
use crate::models::{
    ChatCompletionRequest, GenerationRequest, ImageGenerationRequest, ModelCard, ModelList,
    ResponseFormat, DEFAULT_IMAGE_SIZE,
};
use crate::server::assembler;
use crate::server::AppState;
use crate::translate::{self, AspectRatio};

/// Subject used when the user message held nothing but a size directive.
pub const PLACEHOLDER_PROMPT: &str = "image";

pub const HELP_MESSAGE: &str = "Please provide a description for the image. You can also specify a ratio, e.g., 'a cat 比例:16:9' or 'a dog 9:16'.";

fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    serde_json::from_slice(body).map_err(|e| {
        log::debug!("Rejected request body: {}", e);
        GatewayError::InvalidRequest("Invalid JSON body".into())
    })
}

pub async fn image_generations(
    state: web::Data<AppState>,
    body: web::Bytes,
) -> Result<HttpResponse> {
    let request: ImageGenerationRequest = parse_body(&body)?;
    let binding = state.registry.resolve(request.model.as_deref())?;

    let prompt = request
        .prompt
        .as_deref()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| GatewayError::InvalidRequest("Parameter 'prompt' is required.".into()))?;
    let format = ResponseFormat::parse(request.response_format.as_deref())?;
    let engine = state.engine()?;

    let job = GenerationRequest::new(
        prompt,
        request.requested_count(),
        translate::normalize(Some(request.size_or_default())),
    );

    let result = async {
        let images = engine.run(&job, binding).await.into_images()?;
        assembler::assemble_images(images, format, engine.transport().as_ref()).await
    }
    .await;

    match result {
        Ok(data) => Ok(HttpResponse::Ok().json(assembler::image_response(data, &binding.client_id))),
        Err(err) => {
            log::error!(
                "Error in image generation for model {}: {}",
                binding.display_name,
                err
            );
            Err(err)
        }
    }
}

/// Prompt and aspect ratio derived from a chat request.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatJob {
    pub prompt: String,
    pub aspect_ratio: AspectRatio,
}

/// `None` when the conversation carries neither a description nor a size.
pub fn chat_job(request: &ChatCompletionRequest) -> Option<ChatJob> {
    let extraction = request
        .last_user_text()
        .map(|text| translate::extract(&text))?;

    let has_prompt = !extraction.prompt.trim().is_empty();
    if !has_prompt && extraction.size.is_none() {
        return None;
    }

    let prompt = if has_prompt {
        extraction.prompt
    } else {
        PLACEHOLDER_PROMPT.to_string()
    };
    let size = extraction
        .size
        .or_else(|| request.size.clone())
        .unwrap_or_else(|| DEFAULT_IMAGE_SIZE.to_string());

    Some(ChatJob {
        prompt,
        aspect_ratio: translate::normalize(Some(&size)),
    })
}

fn event_stream() -> actix_web::HttpResponseBuilder {
    let mut builder = HttpResponse::Ok();
    builder
        .content_type("text/event-stream")
        .insert_header(("Cache-Control", "no-cache"));
    builder
}

pub async fn chat_completions(
    state: web::Data<AppState>,
    body: web::Bytes,
) -> Result<HttpResponse> {
    let request: ChatCompletionRequest = parse_body(&body)?;
    let binding = state.registry.resolve(request.model.as_deref())?.clone();
    let stream = request.is_stream();

    let Some(job) = chat_job(&request) else {
        if stream {
            let body = assembler::stream_text(&state.tasks, &binding.client_id, HELP_MESSAGE.to_string());
            return Ok(event_stream().streaming(body));
        }
        return Ok(HttpResponse::Ok().json(assembler::chat_completion(
            &binding.client_id,
            HELP_MESSAGE.to_string(),
        )));
    };

    let engine = state.engine()?.clone();
    let generation = GenerationRequest::new(job.prompt.clone(), 1, job.aspect_ratio);

    if stream {
        Ok(event_stream().streaming(stream_generation(&state, engine, binding, generation)))
    } else {
        Ok(complete_generation(engine, &binding, generation).await)
    }
}

fn stream_generation(
    state: &AppState,
    engine: JobEngine,
    binding: ModelBinding,
    generation: GenerationRequest,
) -> impl futures::Stream<Item = std::result::Result<web::Bytes, actix_web::Error>> {
    let model = binding.client_id.clone();
    assembler::stream_reply(&state.tasks, &model, move |sink| async move {
        let name = &binding.display_name;
        sink.content(format!(
            "🎨 Generating image with prompt: \"{}\" and aspect ratio: {} using {}...",
            generation.prompt, generation.aspect_ratio, name
        ))
        .await;

        let text = match engine.run(&generation, &binding).await.into_images() {
            Ok(images) => match images.first() {
                Some(image) => format!("\n\nHere is the image:\n\n![Generated Image]({})", image.url),
                None => format!("\n\nSorry, I couldn't generate the image with {} this time.", name),
            },
            Err(err) => {
                log::error!("Streaming error for model {}: {}", name, err);
                format!("\n\nAn error occurred with {}: {}", name, err)
            }
        };
        sink.content(text).await;
    })
}

async fn complete_generation(
    engine: JobEngine,
    binding: &ModelBinding,
    generation: GenerationRequest,
) -> HttpResponse {
    let name = &binding.display_name;
    let prompt = &generation.prompt;
    let ratio = generation.aspect_ratio;

    match engine.run(&generation, binding).await.into_images() {
        Ok(images) => {
            let content = match images.first() {
                Some(image) => format!(
                    "Generated image with prompt: \"{}\" and aspect ratio: {} using {}\n\n![Generated Image]({})",
                    prompt, ratio, name, image.url
                ),
                None => format!(
                    "Sorry, I couldn't generate image with prompt: \"{}\" and aspect ratio: {} using {}.",
                    prompt, ratio, name
                ),
            };
            HttpResponse::Ok().json(assembler::chat_completion(&binding.client_id, content))
        }
        Err(err) => {
            log::error!("Non-streaming error for model {}: {}", name, err);
            let content = format!(
                "An error occurred for prompt \"{}\" with aspect ratio {} using {}: {}",
                prompt, ratio, name, err
            );
            HttpResponse::build(StatusCode::INTERNAL_SERVER_ERROR)
                .json(assembler::chat_completion(&binding.client_id, content))
        }
    }
}

pub async fn list_models(state: web::Data<AppState>) -> HttpResponse {
    let created = assembler::unix_now();
    let cards = state
        .registry
        .list()
        .iter()
        .map(|binding| ModelCard::new(&binding.client_id, created))
        .collect();
    HttpResponse::Ok().json(ModelList::new(cards))
}

pub async fn not_found() -> Result<HttpResponse> {
    Err(GatewayError::NotFound("Not Found".into()))
}
