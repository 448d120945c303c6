use std::future::Future;
use std::panic::AssertUnwindSafe;

use actix_web::web::Bytes;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use futures::future::try_join_all;
use futures::{FutureExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::{GatewayError, Result};
use crate::fal::QueueTransport;
use crate::models::{
    ChatChoice, ChatCompletion, ChatCompletionChunk, ChatFragment, ChatMessage, GeneratedImage,
    ImageData, ImageGenerationResponse, ResponseFormat, Usage,
};
use crate::server::tasks::BackgroundTasks;

pub const SSE_DONE: &str = "data: [DONE]\n\n";
pub const FINISH_STOP: &str = "stop";

const STREAM_BUFFER: usize = 16;

pub fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// `chatcmpl-` followed by 24 alphanumerics.
pub fn completion_id() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("chatcmpl-{}", &hex[..24])
}

async fn download_b64(transport: &dyn QueueTransport, url: &str) -> Result<String> {
    let failed = || GatewayError::Provider(format!("Failed to download image from Fal.ai: {}", url));
    let reply = transport.download(url).await.map_err(|e| {
        log::error!("Image download error for {}: {}", url, e);
        failed()
    })?;
    if !reply.is_success() {
        log::error!("Image download for {} returned status {}", url, reply.status);
        return Err(failed());
    }
    Ok(BASE64.encode(&reply.body))
}

/// Converts queue images into OpenAI `data` entries. With `b64_json` every image is
/// downloaded; one failed download fails the whole batch.
pub async fn assemble_images(
    images: Vec<GeneratedImage>,
    format: ResponseFormat,
    transport: &dyn QueueTransport,
) -> Result<Vec<ImageData>> {
    match format {
        ResponseFormat::Url => Ok(images
            .into_iter()
            .map(|image| ImageData::Url { url: image.url })
            .collect()),
        ResponseFormat::B64Json => {
            let downloads = images.iter().map(|image| download_b64(transport, &image.url));
            let encoded = try_join_all(downloads).await?;
            Ok(encoded
                .into_iter()
                .map(|b64_json| ImageData::B64Json { b64_json })
                .collect())
        }
    }
}

pub fn image_response(data: Vec<ImageData>, model: &str) -> ImageGenerationResponse {
    ImageGenerationResponse {
        created: unix_now(),
        data,
        model: model.to_string(),
    }
}

/// A complete, non-streamed assistant reply.
pub fn chat_completion(model: &str, content: String) -> ChatCompletion {
    let usage = Usage::estimate(&content);
    ChatCompletion {
        id: completion_id(),
        object: "chat.completion".to_string(),
        created: unix_now(),
        model: model.to_string(),
        choices: vec![ChatChoice {
            index: 0,
            message: ChatMessage {
                role: "assistant".to_string(),
                content,
            },
            finish_reason: FINISH_STOP.to_string(),
        }],
        usage,
    }
}

pub fn chat_chunk(id: &str, model: &str, fragment: ChatFragment) -> ChatCompletionChunk {
    ChatCompletionChunk {
        id: id.to_string(),
        object: "chat.completion.chunk".to_string(),
        created: unix_now(),
        model: model.to_string(),
        choices: vec![fragment.into_choice()],
    }
}

pub fn sse_frame(chunk: &ChatCompletionChunk) -> Bytes {
    let data = serde_json::to_string(chunk).unwrap_or_else(|_| "{}".to_string());
    Bytes::from(format!("data: {}\n\n", data))
}

/// Write side of a streamed reply.
#[derive(Clone)]
struct ChunkWriter {
    tx: mpsc::Sender<Bytes>,
    id: String,
    model: String,
}

impl ChunkWriter {
    async fn write(&self, fragment: ChatFragment) {
        let frame = sse_frame(&chat_chunk(&self.id, &self.model, fragment));
        self.write_raw(frame).await;
    }

    async fn write_raw(&self, frame: Bytes) {
        if self.tx.send(frame).await.is_err() {
            log::debug!("Client went away from stream {}; dropping frame", self.id);
        }
    }
}

/// Handed to a stream producer; it can only append content fragments, so the
/// role opener and the terminal fragment stay in the assembler's hands.
#[derive(Clone)]
pub struct ContentSink {
    writer: ChunkWriter,
}

impl ContentSink {
    pub async fn content(&self, text: impl Into<String>) {
        self.writer.write(ChatFragment::Content(text.into())).await;
    }
}

/// Starts a streamed chat reply whose content comes from `produce`. The producer
/// runs detached on `tasks`; the returned body yields, in order, the role
/// fragment, whatever the producer writes, a `stop` fragment and `[DONE]`.
/// The body ends when the task drops its sender, whichever way the task exits.
pub fn stream_reply<P, Fut>(
    tasks: &BackgroundTasks,
    model: &str,
    produce: P,
) -> impl Stream<Item = std::result::Result<Bytes, actix_web::Error>>
where
    P: FnOnce(ContentSink) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(STREAM_BUFFER);
    let writer = ChunkWriter {
        tx,
        id: completion_id(),
        model: model.to_string(),
    };

    tasks.spawn(async move {
        writer.write(ChatFragment::Role).await;

        let sink = ContentSink {
            writer: writer.clone(),
        };
        if AssertUnwindSafe(produce(sink)).catch_unwind().await.is_err() {
            log::error!("Stream producer for {} panicked", writer.id);
            writer
                .write(ChatFragment::Content(
                    "\n\nAn internal error interrupted image generation.".to_string(),
                ))
                .await;
        }

        writer.write(ChatFragment::Finish(FINISH_STOP.to_string())).await;
        writer.write_raw(Bytes::from_static(SSE_DONE.as_bytes())).await;
    });

    ReceiverStream::new(rx).map(Ok::<Bytes, actix_web::Error>)
}

/// Streams a fixed assistant message.
pub fn stream_text(
    tasks: &BackgroundTasks,
    model: &str,
    text: String,
) -> impl Stream<Item = std::result::Result<Bytes, actix_web::Error>> {
    stream_reply(tasks, model, move |sink| async move {
        sink.content(text).await;
    })
}
