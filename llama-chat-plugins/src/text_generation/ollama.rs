use anyhow::{bail, Result};
use base64::{prelude::BASE64_STANDARD, Engine};
use futures_util::StreamExt;
use llama_chat_core::{
    device::Device,
    dialog::{Content, ContentItem, Dialog, Message, Role},
    errors::BuildError,
    generation::{GenerationConfig, TokenResult, TokenSender},
};
use serde::{Deserialize, Serialize};
use slog::{debug, error, info, Logger};

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// See https://github.com/ollama/ollama/blob/main/docs/api.md#generate-a-chat-completion for more information
#[derive(Debug, Clone, Serialize)]
struct OllamaChatCompletionRequest {
    model: String,
    messages: Vec<OllamaChatMessage>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct OllamaChatMessage {
    role: Role,
    content: String,

    /// base64 encoded images
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
}

impl From<&Message> for OllamaChatMessage {
    fn from(message: &Message) -> Self {
        let (content, images) = match message.content() {
            Content::Text(text) => (text.clone(), vec![]),
            Content::Items(items) => {
                let mut content = String::new();
                let mut images = Vec::new();
                for item in items {
                    match item {
                        ContentItem::Text(text) => content.push_str(text),
                        ContentItem::Media(data) => images.push(BASE64_STANDARD.encode(data)),
                    }
                }
                (content, images)
            }
        };
        Self {
            role: message.role(),
            content,
            images,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct OllamaOptions {
    temperature: f32,
    top_p: f32,

    /// Maximum number of tokens to generate
    num_predict: usize,

    /// Context window size
    num_ctx: usize,

    /// Layers offloaded to the gpu, 0 pins the model to the cpu
    #[serde(skip_serializing_if = "Option::is_none")]
    num_gpu: Option<usize>,
}

/// Message half of a streamed chunk.
/// The role is left undecoded, servers may answer with roles we never send (e.g. "tool").
#[derive(Debug, Clone, Deserialize)]
struct OllamaChatCompletionResponseMessage {
    #[serde(default)]
    content: String,
}

/// One line of a streamed chat completion
#[derive(Debug, Clone, Deserialize)]
struct OllamaChatCompletionChunk {
    #[serde(default)]
    message: Option<OllamaChatCompletionResponseMessage>,

    #[serde(default)]
    done: bool,

    #[serde(default)]
    done_reason: Option<String>,

    #[serde(default)]
    error: Option<String>,
}

/// Splits a byte stream into newline delimited records
#[derive(Debug, Default)]
struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, bytes: &[u8]) -> Vec<Vec<u8>> {
        self.pending.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            if !line.iter().all(u8::is_ascii_whitespace) {
                lines.push(line);
            }
        }
        lines
    }

    /// Whatever is left once the stream ended without a trailing newline
    fn finish(&mut self) -> Option<Vec<u8>> {
        let rest = std::mem::take(&mut self.pending);
        if rest.iter().all(u8::is_ascii_whitespace) {
            None
        } else {
            Some(rest)
        }
    }
}

/// Forward one chunk to the consumer, returns false once nothing more should be read
async fn forward_chunk(chunk: OllamaChatCompletionChunk, tx: &TokenSender) -> Result<bool> {
    if let Some(error) = chunk.error {
        bail!("inference server error: {error}");
    }

    let text = chunk
        .message
        .map(|message| message.content)
        .unwrap_or_default();
    if !text.is_empty() && !tx.send(TokenResult::token(text)).await {
        return Ok(false);
    }

    if chunk.done {
        tx.send(TokenResult::finish()).await;
        return Ok(false);
    }
    Ok(true)
}

/// OllamaClient
/// Streams chat completions from an ollama compatible inference server
#[derive(Debug, Clone)]
pub struct OllamaClient {
    logger: Logger,
    http: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(
        logger: &Logger,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, BuildError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| BuildError::Client(e.to_string()))?;
        Ok(Self {
            logger: logger.clone(),
            http,
            base_url: base_url.into(),
            model: model.into(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.base_url.trim_end_matches('/'))
    }

    /// Stream the completion of `dialog` into `tx`.
    /// Failures are logged and end the stream without a finish marker.
    pub(crate) async fn stream_chat(
        &self,
        request_id: &str,
        dialog: &Dialog,
        config: &GenerationConfig,
        max_seq_len: usize,
        device: &Device,
        tx: TokenSender,
    ) {
        match self
            .try_stream_chat(dialog, config, max_seq_len, device, &tx)
            .await
        {
            Ok(()) => debug!(self.logger, "chat stream closed"; "request_id" => request_id),
            Err(e) => {
                error!(self.logger, "chat stream failed"; "request_id" => request_id, "error" => e.to_string())
            }
        }
    }

    async fn try_stream_chat(
        &self,
        dialog: &Dialog,
        config: &GenerationConfig,
        max_seq_len: usize,
        device: &Device,
        tx: &TokenSender,
    ) -> Result<()> {
        let body = OllamaChatCompletionRequest {
            model: self.model.clone(),
            messages: dialog.iter().map(OllamaChatMessage::from).collect(),
            stream: true,
            options: OllamaOptions {
                temperature: config.temperature(),
                top_p: config.top_p(),
                num_predict: config.max_gen_len(),
                num_ctx: max_seq_len,
                num_gpu: device.is_cpu().then_some(0),
            },
        };
        let resp = self
            .http
            .post(self.chat_url())
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let mut lines = LineBuffer::default();
        let mut bytes = resp.bytes_stream();
        while let Some(chunk) = bytes.next().await {
            for line in lines.push(&chunk?) {
                let chunk = serde_json::from_slice::<OllamaChatCompletionChunk>(&line)?;
                if chunk.done {
                    info!(self.logger, "chat completion done"; "done_reason" => chunk.done_reason.clone());
                }
                if !forward_chunk(chunk, tx).await? {
                    return Ok(());
                }
            }
        }
        if let Some(line) = lines.finish() {
            let chunk = serde_json::from_slice::<OllamaChatCompletionChunk>(&line)?;
            forward_chunk(chunk, tx).await?;
        }
        Ok(())
    }
}
