mod checkpoint;
mod generator;
mod ollama;

pub use checkpoint::{Checkpoint, MAX_SUPPORTED_SEQ_LEN};
pub use generator::{TextGenerator, TextGeneratorArgs};
pub use ollama::{OllamaClient, DEFAULT_OLLAMA_URL};
