use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

/// Reduced precision weight representation requested for the loaded model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuantizationMode {
    #[default]
    None,
    Fp8Mixed,
    Int4Mixed,
}

impl FromStr for QuantizationMode {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "none" => Ok(QuantizationMode::None),
            "fp8_mixed" => Ok(QuantizationMode::Fp8Mixed),
            "int4_mixed" => Ok(QuantizationMode::Int4Mixed),
            other => Err(ConfigError::UnknownQuantizationMode(other.to_string())),
        }
    }
}

impl fmt::Display for QuantizationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            QuantizationMode::None => "none",
            QuantizationMode::Fp8Mixed => "fp8_mixed",
            QuantizationMode::Int4Mixed => "int4_mixed",
        };
        f.write_str(tag)
    }
}

/// ModelArgs
/// Read only description of a loaded model, as found in a checkpoint's `params.json`.
/// `max_seq_len` and `max_batch_size` are overwritten with the limits the generator was built with.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ModelArgs {
    #[serde(default)]
    pub dim: usize,

    #[serde(default)]
    pub n_layers: usize,

    #[serde(default)]
    pub n_heads: usize,

    #[serde(default)]
    pub n_kv_heads: Option<usize>,

    /// -1 in older checkpoints, meaning "take it from the tokenizer"
    #[serde(default)]
    pub vocab_size: Option<i64>,

    #[serde(default)]
    pub max_seq_len: usize,

    #[serde(default)]
    pub max_batch_size: usize,

    /// Size of an image tile in pixels, 0 for text only models
    #[serde(default)]
    pub vision_chunk_size: usize,

    #[serde(default)]
    pub vision_max_num_chunks: usize,

    #[serde(default)]
    pub quantization_mode: QuantizationMode,
}

impl ModelArgs {
    pub fn supports_vision(&self) -> bool {
        self.vision_chunk_size > 0
    }
}
