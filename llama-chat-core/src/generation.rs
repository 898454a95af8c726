use async_channel::{Receiver, Sender};
use serde::{Deserialize, Serialize};

use crate::{dialog::Batch, errors::GenerationError, model_args::ModelArgs};

/// TokenResult
/// One incremental unit of generated output for one dialog.
/// `text` is a delta, concatenating every unfinished result in order yields the full response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResult {
    pub text: String,

    /// Terminal marker, its text is never part of the response
    pub finished: bool,
}

impl TokenResult {
    pub fn token(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            finished: false,
        }
    }

    pub fn finish() -> Self {
        Self {
            text: String::new(),
            finished: true,
        }
    }
}

/// GenerationConfig
/// Per call sampling options, validated on construction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    max_gen_len: usize,
}

impl GenerationConfig {
    pub fn new(temperature: f32, top_p: f32, max_gen_len: usize) -> Result<Self, GenerationError> {
        if !temperature.is_finite() || temperature < 0.0 {
            return Err(GenerationError::InvalidTemperature(temperature));
        }
        if !(top_p > 0.0 && top_p <= 1.0) {
            return Err(GenerationError::InvalidTopP(top_p));
        }
        if max_gen_len == 0 {
            return Err(GenerationError::InvalidMaxGenLen);
        }
        Ok(Self {
            temperature,
            top_p,
            max_gen_len,
        })
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    pub fn top_p(&self) -> f32 {
        self.top_p
    }

    pub fn max_gen_len(&self) -> usize {
        self.max_gen_len
    }
}

/// Create the two halves of one dialog's token stream
pub fn token_channel() -> (TokenSender, TokenStream) {
    let (tx, rx) = async_channel::unbounded();
    (TokenSender { tx }, TokenStream::new(rx))
}

/// Producing half of a token stream, dropping it ends the stream
#[derive(Debug)]
pub struct TokenSender {
    tx: Sender<TokenResult>,
}

impl TokenSender {
    /// Returns false once the consumer has gone away
    pub async fn send(&self, result: TokenResult) -> bool {
        self.tx.send(result).await.is_ok()
    }
}

/// TokenStream
/// A finite, forward only sequence of token results for one dialog.
/// Once a finished result has been handed out the stream yields nothing more.
#[derive(Debug)]
pub struct TokenStream {
    rx: Receiver<TokenResult>,
    finished: bool,
}

impl TokenStream {
    fn new(rx: Receiver<TokenResult>) -> Self {
        Self {
            rx,
            finished: false,
        }
    }

    /// Waits for the next result. `None` means the stream is exhausted.
    pub async fn next(&mut self) -> Option<TokenResult> {
        if self.finished {
            return None;
        }
        let result = self.rx.recv().await.ok()?;
        if result.finished {
            self.finished = true;
        }
        Some(result)
    }
}

/// Generator
/// A handle to a loaded model that can stream chat completions
pub trait Generator {
    /// Capabilities of the loaded model
    fn args(&self) -> &ModelArgs;

    /// Start a chat completion for every dialog in `batch`.
    /// The returned streams match the batch one to one and in order.
    fn chat_completion(
        &self,
        batch: Batch,
        config: &GenerationConfig,
    ) -> impl std::future::Future<Output = Result<Vec<TokenStream>, GenerationError>> + Send;
}
